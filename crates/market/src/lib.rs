//! 行情侧默认实现：进程内报价板（`PriceOracle`）、基于工作日的
//! 简化交易日历（`TradingCalendar`）与 JSON 行情种子装载。

pub mod calendar;
pub mod oracle;
pub mod seed;

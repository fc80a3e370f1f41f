//! 交易执行引擎：委托校验、费用计提、账户与持仓变更、T+1 结算与每日估值。
//!
//! 所有对外能力通过 `mogi_core::trade::port::TradePort` 暴露；
//! 存储、行情、交易日历均为注入的接口，本 crate 不直接依赖任何具体实现。

pub mod locks;
pub mod service;
pub mod settlement;
pub mod valuation;

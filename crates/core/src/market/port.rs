use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;

use super::entity::StockMeta;
use super::error::MarketError;

/// # Summary
/// 行情端口：撮合与估值所需的价格来源抽象。
/// 由外部行情适配器实现（内存报价板、交易所行情源等），
/// 领域层只依赖本 trait，不关心数据从哪里来。
///
/// # Contract
/// - 代码未知或暂无报价返回 `Ok(None)`，调用方据此给出业务错误；
/// - 底层不可用（网络、解析）才返回 `Err(MarketError)`。
#[async_trait]
pub trait PriceOracle: Send + Sync {
    /// # Summary
    /// 查询某只股票的最新成交价。
    ///
    /// # Arguments
    /// * `code` - 股票代码（如 "600519" 或 "300750.SZ"）
    ///
    /// # Returns
    /// * `Ok(Some(price))` - 最新价
    /// * `Ok(None)` - 标的未知或当前无报价
    async fn latest_price(&self, code: &str) -> Result<Option<Decimal>, MarketError>;

    /// # Summary
    /// 查询某只股票在指定自然日的收盘价，用于快照与日收益计算。
    ///
    /// # Arguments
    /// * `code` - 股票代码
    /// * `date` - 收盘价所属自然日
    async fn close_on(&self, code: &str, date: NaiveDate) -> Result<Option<Decimal>, MarketError>;

    /// # Summary
    /// 查询股票静态信息（名称、昨收、是否 ST），供涨跌停区间计算使用。
    async fn stock_meta(&self, code: &str) -> Result<Option<StockMeta>, MarketError>;
}

/// # Summary
/// 交易日历端口：回答"哪天是交易日"。
/// 快照落在最近交易日、日收益对比上一交易日收盘，都经由本 trait 决定，
/// 领域层不内置任何节假日知识。
pub trait TradingCalendar: Send + Sync {
    /// # Summary
    /// 返回不晚于 `date` 的最近一个交易日（`date` 本身是交易日则原样返回）。
    fn latest_trading_day(&self, date: NaiveDate) -> NaiveDate;

    /// # Summary
    /// 返回严格早于 `date` 的上一个交易日。
    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate;
}

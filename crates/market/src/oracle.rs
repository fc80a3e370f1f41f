use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;
use mogi_core::market::entity::StockMeta;
use mogi_core::market::error::MarketError;
use mogi_core::market::port::PriceOracle;
use rust_decimal::Decimal;
use tracing::debug;

/// # Summary
/// 进程内行情报价板，`PriceOracle` 的默认实现。
/// 行情由外部主动发布（种子文件装载、测试脚本或接入的推送源），引擎侧只读。
///
/// # Invariants
/// - 查询从不失败：未发布过的代码或日期返回 `Ok(None)`，
///   `Err` 专属于真实行情源故障（本实现不产生）。
/// - 同代码重复发布直接覆盖，读取方永远看到最后一次发布的值。
#[derive(Default)]
pub struct QuoteBoard {
    // 最新价，Key 为股票代码
    latest: DashMap<String, Decimal>,
    // 历史收盘价，Key 为 (股票代码, 交易日)
    closes: DashMap<(String, NaiveDate), Decimal>,
    // 证券静态信息，Key 为股票代码
    metas: DashMap<String, StockMeta>,
}

impl QuoteBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 发布最新价
    pub fn publish_quote(&self, stock_code: &str, price: Decimal) {
        debug!("行情更新: {} 最新价 {}", stock_code, price);
        self.latest.insert(stock_code.to_string(), price);
    }

    /// 发布某交易日的收盘价
    pub fn publish_close(&self, stock_code: &str, date: NaiveDate, price: Decimal) {
        self.closes.insert((stock_code.to_string(), date), price);
    }

    /// 发布证券静态信息（名称、昨收、ST 标记）
    pub fn publish_meta(&self, meta: StockMeta) {
        self.metas.insert(meta.code.clone(), meta);
    }

    /// 已发布静态信息的证券数量
    pub fn symbol_count(&self) -> usize {
        self.metas.len()
    }
}

#[async_trait]
impl PriceOracle for QuoteBoard {
    async fn latest_price(&self, stock_code: &str) -> Result<Option<Decimal>, MarketError> {
        Ok(self.latest.get(stock_code).map(|entry| *entry.value()))
    }

    async fn close_on(
        &self,
        stock_code: &str,
        date: NaiveDate,
    ) -> Result<Option<Decimal>, MarketError> {
        Ok(self
            .closes
            .get(&(stock_code.to_string(), date))
            .map(|entry| *entry.value()))
    }

    async fn stock_meta(&self, stock_code: &str) -> Result<Option<StockMeta>, MarketError> {
        Ok(self.metas.get(stock_code).map(|entry| entry.value().clone()))
    }
}

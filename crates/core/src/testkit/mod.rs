//! 测试替身：可编程的行情源与交易日历。
//! 仅在 `test-utils` feature 下编译，供引擎与批处理任务的集成测试注入，
//! 不得出现在生产依赖路径上。

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{Datelike, NaiveDate, Weekday};
use dashmap::DashMap;
use rust_decimal::Decimal;

use crate::market::entity::StockMeta;
use crate::market::error::MarketError;
use crate::market::port::{PriceOracle, TradingCalendar};

/// # Summary
/// 可编程行情源。测试中随意设定最新价、历史收盘价与静态信息，
/// 并可切换"断网"模式模拟行情层故障。
#[derive(Default)]
pub struct FakePriceOracle {
    latest: DashMap<String, Decimal>,
    closes: DashMap<(String, NaiveDate), Decimal>,
    metas: DashMap<String, StockMeta>,
    offline: AtomicBool,
}

impl FakePriceOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_price(&self, code: &str, price: Decimal) {
        self.latest.insert(code.to_string(), price);
    }

    /// 移除最新价，模拟"查无此价"
    pub fn clear_price(&self, code: &str) {
        self.latest.remove(code);
    }

    pub fn set_close(&self, code: &str, date: NaiveDate, price: Decimal) {
        self.closes.insert((code.to_string(), date), price);
    }

    pub fn clear_close(&self, code: &str, date: NaiveDate) {
        self.closes.remove(&(code.to_string(), date));
    }

    pub fn set_meta(&self, meta: StockMeta) {
        self.metas.insert(meta.code.clone(), meta);
    }

    /// 断网开关：开启后所有查询返回 `MarketError::Network`
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    fn ensure_online(&self) -> Result<(), MarketError> {
        if self.offline.load(Ordering::SeqCst) {
            Err(MarketError::Network("fake oracle offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl PriceOracle for FakePriceOracle {
    async fn latest_price(&self, code: &str) -> Result<Option<Decimal>, MarketError> {
        self.ensure_online()?;
        Ok(self.latest.get(code).map(|price| *price))
    }

    async fn close_on(&self, code: &str, date: NaiveDate) -> Result<Option<Decimal>, MarketError> {
        self.ensure_online()?;
        Ok(self.closes.get(&(code.to_string(), date)).map(|price| *price))
    }

    async fn stock_meta(&self, code: &str) -> Result<Option<StockMeta>, MarketError> {
        self.ensure_online()?;
        Ok(self.metas.get(code).map(|meta| meta.clone()))
    }
}

/// # Summary
/// 显式给定交易日全集的日历替身。
#[derive(Debug, Default)]
pub struct FakeCalendar {
    trading_days: BTreeSet<NaiveDate>,
}

impl FakeCalendar {
    pub fn new<I>(days: I) -> Self
    where
        I: IntoIterator<Item = NaiveDate>,
    {
        Self { trading_days: days.into_iter().collect() }
    }

    /// 以 [from, to] 区间内的所有周一至周五构造
    pub fn weekdays(from: NaiveDate, to: NaiveDate) -> Self {
        let mut days = BTreeSet::new();
        let mut day = from;
        while day <= to {
            if !matches!(day.weekday(), Weekday::Sat | Weekday::Sun) {
                days.insert(day);
            }
            match day.succ_opt() {
                Some(next) => day = next,
                None => break,
            }
        }
        Self { trading_days: days }
    }
}

impl TradingCalendar for FakeCalendar {
    fn latest_trading_day(&self, date: NaiveDate) -> NaiveDate {
        self.trading_days.range(..=date).next_back().copied().unwrap_or(date)
    }

    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        self.trading_days
            .range(..date)
            .next_back()
            .copied()
            .unwrap_or_else(|| date.pred_opt().unwrap_or(date))
    }
}

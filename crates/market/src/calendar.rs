use chrono::{Datelike, NaiveDate, Weekday};
use mogi_core::market::port::TradingCalendar;
use std::collections::BTreeSet;

/// # Summary
/// 简化版 A 股交易日历：周一至周五为交易日，另行剔除注入的节假日集合。
/// 节假日通常来自配置文件，缺省为空集（即只剔除周末）。
pub struct WeekdayCalendar {
    holidays: BTreeSet<NaiveDate>,
}

impl WeekdayCalendar {
    pub fn new(holidays: impl IntoIterator<Item = NaiveDate>) -> Self {
        Self {
            holidays: holidays.into_iter().collect(),
        }
    }

    fn is_trading_day(&self, date: NaiveDate) -> bool {
        let weekday = date.weekday();
        if weekday == Weekday::Sat || weekday == Weekday::Sun {
            return false;
        }
        !self.holidays.contains(&date)
    }
}

impl TradingCalendar for WeekdayCalendar {
    /// # Logic
    /// 自给定日期向前逐日回退到最近的交易日；给定日期本身是交易日则原样返回。
    /// 连续非交易日有限（长假不过十余天），回看窗口一年绰绰有余。
    fn latest_trading_day(&self, date: NaiveDate) -> NaiveDate {
        let mut cursor = date;
        for _ in 0..366 {
            if self.is_trading_day(cursor) {
                return cursor;
            }
            match cursor.pred_opt() {
                Some(prev) => cursor = prev,
                None => break,
            }
        }
        date
    }

    /// 严格早于给定日期的最近交易日
    fn previous_trading_day(&self, date: NaiveDate) -> NaiveDate {
        match date.pred_opt() {
            Some(prev) => self.latest_trading_day(prev),
            None => date,
        }
    }
}

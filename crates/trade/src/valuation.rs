use std::sync::Arc;

use chrono::NaiveDate;
use mogi_core::common::TimeProvider;
use mogi_core::common::money::{round_cny, round_dp4};
use mogi_core::config::EngineConfig;
use mogi_core::market::port::{PriceOracle, TradingCalendar};
use mogi_core::store::port::BrokerStore;
use mogi_core::trade::entity::{AccountDailySnapshot, Position, UserId};
use mogi_core::trade::port::TradeError;
use rust_decimal::Decimal;
use tracing::{error, info, warn};

use crate::locks::AccountLocks;

/// # Summary
/// 按最新行情重估一组持仓并返回总市值（两位小数）。
/// 行情缺失或行情源故障时沿用持仓内缓存价并打上陈旧标记，绝不按零计值。
pub(crate) async fn refreshed_market_value(
    oracle: &dyn PriceOracle,
    positions: &mut [Position],
) -> Decimal {
    let mut total = Decimal::ZERO;
    for position in positions.iter_mut() {
        match oracle.latest_price(&position.stock_code).await {
            Ok(Some(price)) => position.refresh_price(price, false),
            Ok(None) => {
                warn!("无最新行情，沿用缓存价: {}", position.stock_code);
                let last = position.current_price;
                position.refresh_price(last, true);
            }
            Err(e) => {
                warn!("行情源异常，沿用缓存价: {}: {}", position.stock_code, e);
                let last = position.current_price;
                position.refresh_price(last, true);
            }
        }
        total += position.market_value;
    }
    round_cny(total)
}

/// # Summary
/// 日终估值任务：逐账户计算当日收益（最近交易日收盘 vs 前一交易日收盘，
/// 逐票比较）、重估持仓与账户总值，并落一行当日快照。
/// 另提供盘中高频子任务 `refresh_quotes`，只刷新价格缓存，不触碰日收益。
///
/// # Invariants
/// - 单账户失败仅记录并跳过，不中断整批。
/// - 同一交易日重复运行只覆盖快照，不叠加。
pub struct ValuationJob {
    store: Arc<dyn BrokerStore>,
    oracle: Arc<dyn PriceOracle>,
    calendar: Arc<dyn TradingCalendar>,
    clock: Arc<dyn TimeProvider>,
    locks: Arc<AccountLocks>,
    config: EngineConfig,
}

/// 估值批次的汇总结果
#[derive(Debug, Default, Clone, Copy)]
pub struct ValuationReport {
    // 遍历到的账户数
    pub accounts: usize,
    // 成功写入的快照数
    pub snapshots: usize,
    // 失败并跳过的账户数
    pub failures: usize,
}

impl ValuationJob {
    pub fn new(
        store: Arc<dyn BrokerStore>,
        oracle: Arc<dyn PriceOracle>,
        calendar: Arc<dyn TradingCalendar>,
        clock: Arc<dyn TimeProvider>,
        locks: Arc<AccountLocks>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            oracle,
            calendar,
            clock,
            locks,
            config,
        }
    }

    /// 以"本地今日所在的最近交易日"为快照日运行（周末运行归到周五）
    pub async fn run(&self) -> Result<ValuationReport, TradeError> {
        let today = self.config.local_date(self.clock.now());
        let snapshot_date = self.calendar.latest_trading_day(today);
        self.run_for(snapshot_date).await
    }

    pub async fn run_for(&self, snapshot_date: NaiveDate) -> Result<ValuationReport, TradeError> {
        let users = self.store.list_user_ids().await?;
        let mut report = ValuationReport {
            accounts: users.len(),
            ..Default::default()
        };
        for user in users {
            match self.run_user(&user, snapshot_date).await {
                Ok(true) => report.snapshots += 1,
                Ok(false) => {}
                Err(e) => {
                    report.failures += 1;
                    error!("估值失败，跳过该账户: {} @ {}: {}", user.0, snapshot_date, e);
                }
            }
        }
        info!(
            "估值任务完成: 快照日 {}, 账户 {}, 快照 {}, 失败 {}",
            snapshot_date, report.accounts, report.snapshots, report.failures
        );
        Ok(report)
    }

    /// # Logic
    /// 1. 逐票取快照日与其前一交易日的收盘价，缺价持仓从分子分母同时剔除。
    /// 2. daily_return = Σ 数量 × (今收 − 昨收)；
    ///    daily_return_rate = daily_return / Σ 数量 × 昨收（分母为零则取 0）。
    /// 3. 按最新行情重估持仓并回写行内价格缓存，刷新账户总值。
    /// 4. upsert (user, snapshot_date) 快照行。
    ///
    /// # Returns
    /// * `Ok(true)` - 已写入快照；`Ok(false)` - 账户不存在，跳过。
    pub async fn run_user(
        &self,
        user: &UserId,
        snapshot_date: NaiveDate,
    ) -> Result<bool, TradeError> {
        let _guard = self.locks.acquire(user).await;

        let Some(mut account) = self.store.get_account(user).await? else {
            return Ok(false);
        };
        let mut positions = self.store.list_positions(user).await?;

        let prev_date = self.calendar.previous_trading_day(snapshot_date);
        let mut gain = Decimal::ZERO;
        let mut base = Decimal::ZERO;
        for position in &positions {
            let today_close = self.close_on(&position.stock_code, snapshot_date).await;
            let prev_close = self.close_on(&position.stock_code, prev_date).await;
            match (today_close, prev_close) {
                (Some(today), Some(prev)) => {
                    let quantity = Decimal::from(position.total_quantity);
                    gain += quantity * (today - prev);
                    base += quantity * prev;
                }
                _ => {
                    warn!(
                        "持仓 {} 缺少 {} 或 {} 的收盘价，不计入当日收益",
                        position.stock_code, snapshot_date, prev_date
                    );
                }
            }
        }
        account.daily_return = round_cny(gain);
        account.daily_return_rate = if base.is_zero() {
            Decimal::ZERO
        } else {
            round_dp4(gain / base)
        };

        let total_value = refreshed_market_value(self.oracle.as_ref(), &mut positions).await;
        for position in &positions {
            self.store.save_position(position).await?;
        }
        account.refresh_totals(total_value);
        self.store.save_account(&account).await?;

        let snapshot = AccountDailySnapshot {
            user_id: user.clone(),
            snapshot_date,
            total_assets: account.total_assets,
            available_cash: account.available_cash,
            total_market_value: account.total_market_value,
            daily_return: account.daily_return,
            daily_return_rate: account.daily_return_rate,
            total_return: account.total_return,
            total_return_rate: account.total_return_rate,
            position_count: i64::try_from(positions.len()).unwrap_or(i64::MAX),
            trade_count: account.trade_count,
        };
        self.store.upsert_snapshot(&snapshot).await?;
        info!(
            "快照已写入: {} @ {}, 总资产 {}, 当日收益 {}",
            user.0, snapshot_date, account.total_assets, account.daily_return
        );
        Ok(true)
    }

    /// # Summary
    /// 盘中高频子任务：仅刷新持仓价格缓存与账户市值，
    /// 不计算日收益、不写快照。
    pub async fn refresh_quotes(&self) -> Result<ValuationReport, TradeError> {
        let users = self.store.list_user_ids().await?;
        let mut report = ValuationReport {
            accounts: users.len(),
            ..Default::default()
        };
        for user in users {
            if let Err(e) = self.refresh_user_quotes(&user).await {
                report.failures += 1;
                error!("盘中刷新失败，跳过该账户: {}: {}", user.0, e);
            }
        }
        Ok(report)
    }

    async fn refresh_user_quotes(&self, user: &UserId) -> Result<(), TradeError> {
        let _guard = self.locks.acquire(user).await;
        let Some(mut account) = self.store.get_account(user).await? else {
            return Ok(());
        };
        let mut positions = self.store.list_positions(user).await?;
        if positions.is_empty() {
            return Ok(());
        }
        let total_value = refreshed_market_value(self.oracle.as_ref(), &mut positions).await;
        for position in &positions {
            self.store.save_position(position).await?;
        }
        account.refresh_totals(total_value);
        self.store.save_account(&account).await?;
        Ok(())
    }

    async fn close_on(&self, stock_code: &str, date: NaiveDate) -> Option<Decimal> {
        match self.oracle.close_on(stock_code, date).await {
            Ok(found) => found,
            Err(e) => {
                warn!("收盘价查询失败: {} @ {}: {}", stock_code, date, e);
                None
            }
        }
    }
}

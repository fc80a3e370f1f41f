use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use mogi_core::common::TimeProvider;
use mogi_core::config::EngineConfig;
use mogi_core::store::port::BrokerStore;
use mogi_core::trade::entity::{TradeRecord, UserId};
use mogi_core::trade::port::TradeError;
use tracing::{error, info, warn};

use crate::locks::AccountLocks;

/// # Summary
/// T+1 结算任务：把解禁日已到（含被跳过的历史日期）、尚未结算的买入流水
/// 逐笔解禁到持仓可卖量，并写结算标记。
///
/// # Invariants
/// - 幂等：结算标记是第一道防线（已标记的流水不再出现在待结算集合中），
///   解禁量向总量收敛是第二道防线；同一到期日跑两遍结果一致。
/// - 单笔/单户失败仅记录并跳过，不中断整批。
pub struct SettlementJob {
    store: Arc<dyn BrokerStore>,
    clock: Arc<dyn TimeProvider>,
    locks: Arc<AccountLocks>,
    config: EngineConfig,
}

/// 结算批次的汇总结果
#[derive(Debug, Default, Clone, Copy)]
pub struct SettlementReport {
    // 遍历到的账户数
    pub accounts: usize,
    // 完成结算标记的流水笔数
    pub settled_trades: usize,
    // 实际解禁的股份总数（收敛后）
    pub released_shares: i64,
    // 失败并跳过的流水或账户数
    pub failures: usize,
}

impl SettlementJob {
    pub fn new(
        store: Arc<dyn BrokerStore>,
        clock: Arc<dyn TimeProvider>,
        locks: Arc<AccountLocks>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            clock,
            locks,
            config,
        }
    }

    /// 以本地当日为到期日运行。解禁日落在周末的流水会在下一次运行时一并补上。
    pub async fn run(&self) -> Result<SettlementReport, TradeError> {
        let due = self.config.local_date(self.clock.now());
        self.run_for(due).await
    }

    pub async fn run_for(&self, due: NaiveDate) -> Result<SettlementReport, TradeError> {
        let users = self.store.list_user_ids().await?;
        let mut report = SettlementReport {
            accounts: users.len(),
            ..Default::default()
        };
        for user in users {
            match self.settle_user(&user, due).await {
                Ok(outcome) => {
                    report.settled_trades += outcome.settled_trades;
                    report.released_shares += outcome.released_shares;
                    report.failures += outcome.failures;
                }
                Err(e) => {
                    report.failures += 1;
                    error!("结算失败，跳过该账户: {} (到期日 {}): {}", user.0, due, e);
                }
            }
        }
        info!(
            "结算任务完成: 到期日 {}, 账户 {}, 流水 {}, 解禁 {} 股, 失败 {}",
            due, report.accounts, report.settled_trades, report.released_shares, report.failures
        );
        Ok(report)
    }

    /// # Logic
    /// 持该用户锁，读取到期未结算买入流水，逐笔解禁并标记。
    /// 单笔失败记录上下文后继续处理剩余流水。
    pub async fn settle_user(
        &self,
        user: &UserId,
        due: NaiveDate,
    ) -> Result<SettlementReport, TradeError> {
        let _guard = self.locks.acquire(user).await;

        let due_trades = self.store.unsettled_buys(user, due).await?;
        let mut outcome = SettlementReport::default();
        let now = self.clock.now();
        for trade in due_trades {
            match self.settle_trade(user, &trade, now).await {
                Ok(released) => {
                    outcome.settled_trades += 1;
                    outcome.released_shares += released;
                }
                Err(e) => {
                    outcome.failures += 1;
                    error!(
                        "结算单笔失败: {} 流水 {} (解禁日 {}): {}",
                        user.0, trade.trade_id.0, trade.settlement_date, e
                    );
                }
            }
        }
        if outcome.settled_trades > 0 {
            info!(
                "T+1 结算: {} 处理 {} 笔, 解禁 {} 股",
                user.0, outcome.settled_trades, outcome.released_shares
            );
        }
        Ok(outcome)
    }

    /// 先解禁后标记。持仓已被整体卖出时解禁 0 股，属正常路径，仍写标记。
    async fn settle_trade(
        &self,
        user: &UserId,
        trade: &TradeRecord,
        now: DateTime<Utc>,
    ) -> Result<i64, TradeError> {
        let released = self
            .store
            .release_settled(user, &trade.stock_code, trade.quantity)
            .await?;
        if released < trade.quantity {
            warn!(
                "解禁量收敛: {} {} 申请 {} 实际 {}",
                user.0, trade.stock_code, trade.quantity, released
            );
        }
        self.store.mark_settled(user, &trade.trade_id, now).await?;
        Ok(released)
    }
}

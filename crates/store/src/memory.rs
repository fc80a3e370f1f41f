use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use dashmap::DashMap;
use mogi_core::store::error::StoreError;
use mogi_core::store::port::{
    AccountStore, Page, PositionPatch, PositionStore, SnapshotStore, TradeCommit, TradeFilter,
    TradeLedger,
};
use mogi_core::trade::entity::{
    Account, AccountDailySnapshot, Position, TradeId, TradeRecord, TradeStatus, TradeType, UserId,
};
use tracing::warn;

/// # Summary
/// 四类存储端口的进程内实现，与 SQLite 分片实现行为对齐，
/// 供测试与无持久化需求的临时运行使用。
/// 跨集合的一致性同样依赖上层引擎的按户串行化。
#[derive(Default)]
pub struct MemoryBrokerStore {
    accounts: DashMap<String, Account>,
    // user -> stock_code -> position，BTreeMap 保证列出顺序稳定
    positions: DashMap<String, BTreeMap<String, Position>>,
    trades: DashMap<String, Vec<TradeRecord>>,
    snapshots: DashMap<String, BTreeMap<NaiveDate, AccountDailySnapshot>>,
}

impl MemoryBrokerStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn apply_patch(&self, user: &UserId, patch: &PositionPatch) {
        let mut book = self.positions.entry(user.0.clone()).or_default();
        match patch {
            PositionPatch::Upsert(position) => {
                book.insert(position.stock_code.clone(), position.clone());
            }
            PositionPatch::Remove(stock_code) => {
                book.remove(stock_code);
            }
        }
    }
}

#[async_trait]
impl AccountStore for MemoryBrokerStore {
    async fn get_account(&self, user: &UserId) -> Result<Option<Account>, StoreError> {
        Ok(self.accounts.get(&user.0).map(|a| a.clone()))
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        self.accounts.insert(account.user_id.0.clone(), account.clone());
        Ok(())
    }

    async fn commit_trade(&self, commit: &TradeCommit) -> Result<(), StoreError> {
        let user = &commit.account.user_id;
        self.accounts.insert(user.0.clone(), commit.account.clone());
        self.apply_patch(user, &commit.position);
        self.trades.entry(user.0.clone()).or_default().push(commit.trade.clone());
        Ok(())
    }

    async fn reset(&self, user: &UserId, fresh: &Account) -> Result<(), StoreError> {
        self.positions.remove(&user.0);
        self.trades.remove(&user.0);
        self.accounts.insert(user.0.clone(), fresh.clone());
        Ok(())
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        let mut users: Vec<UserId> =
            self.accounts.iter().map(|entry| UserId(entry.key().clone())).collect();
        users.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(users)
    }
}

#[async_trait]
impl PositionStore for MemoryBrokerStore {
    async fn get_position(
        &self,
        user: &UserId,
        stock_code: &str,
    ) -> Result<Option<Position>, StoreError> {
        Ok(self
            .positions
            .get(&user.0)
            .and_then(|book| book.get(stock_code).cloned()))
    }

    async fn list_positions(&self, user: &UserId) -> Result<Vec<Position>, StoreError> {
        Ok(self
            .positions
            .get(&user.0)
            .map(|book| book.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        self.apply_patch(&position.user_id, &PositionPatch::Upsert(position.clone()));
        Ok(())
    }

    async fn release_settled(
        &self,
        user: &UserId,
        stock_code: &str,
        quantity: i64,
    ) -> Result<i64, StoreError> {
        let Some(mut book) = self.positions.get_mut(&user.0) else {
            return Ok(0);
        };
        let Some(position) = book.get_mut(stock_code) else {
            return Ok(0);
        };
        let released = quantity.min(position.total_quantity - position.available_quantity).max(0);
        if released < quantity {
            warn!(
                "持仓 {} {} 解禁异常: 申请 {} 实际 {}",
                user.0, stock_code, quantity, released
            );
        }
        position.available_quantity += released;
        Ok(released)
    }
}

#[async_trait]
impl TradeLedger for MemoryBrokerStore {
    async fn get_trade(
        &self,
        user: &UserId,
        trade_id: &TradeId,
    ) -> Result<Option<TradeRecord>, StoreError> {
        Ok(self
            .trades
            .get(&user.0)
            .and_then(|rows| rows.iter().find(|t| t.trade_id == *trade_id).cloned()))
    }

    async fn history(
        &self,
        user: &UserId,
        filter: &TradeFilter,
        page: &Page,
    ) -> Result<(Vec<TradeRecord>, u64), StoreError> {
        let mut matched: Vec<TradeRecord> = self
            .trades
            .get(&user.0)
            .map(|rows| {
                rows.iter()
                    .filter(|t| {
                        filter.stock_code.as_ref().is_none_or(|c| &t.stock_code == c)
                            && filter.trade_type.is_none_or(|tt| t.trade_type == tt)
                            && filter.source.is_none_or(|s| t.trade_source == s)
                            && filter.start.is_none_or(|s| t.trade_time >= s)
                            && filter.end.is_none_or(|e| t.trade_time <= e)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        matched.sort_by(|a, b| {
            b.trade_time.cmp(&a.trade_time).then_with(|| b.trade_id.0.cmp(&a.trade_id.0))
        });
        let total = u64::try_from(matched.len()).unwrap_or(u64::MAX);
        let offset = usize::try_from(page.offset()).unwrap_or(usize::MAX);
        let limit = usize::try_from(page.limit()).unwrap_or(usize::MAX);
        let trades: Vec<TradeRecord> = matched.into_iter().skip(offset).take(limit).collect();
        Ok((trades, total))
    }

    async fn unsettled_buys(
        &self,
        user: &UserId,
        due: NaiveDate,
    ) -> Result<Vec<TradeRecord>, StoreError> {
        let mut rows: Vec<TradeRecord> = self
            .trades
            .get(&user.0)
            .map(|trades| {
                trades
                    .iter()
                    .filter(|t| {
                        t.trade_type == TradeType::Buy
                            && t.status == TradeStatus::Filled
                            && t.settlement_date <= due
                            && t.settled_at.is_none()
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        rows.sort_by(|a, b| a.trade_time.cmp(&b.trade_time));
        Ok(rows)
    }

    async fn mark_settled(
        &self,
        user: &UserId,
        trade_id: &TradeId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if let Some(mut rows) = self.trades.get_mut(&user.0) {
            if let Some(trade) = rows.iter_mut().find(|t| t.trade_id == *trade_id) {
                if trade.settled_at.is_none() {
                    trade.settled_at = Some(at);
                }
            }
        }
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for MemoryBrokerStore {
    async fn upsert_snapshot(&self, snapshot: &AccountDailySnapshot) -> Result<(), StoreError> {
        self.snapshots
            .entry(snapshot.user_id.0.clone())
            .or_default()
            .insert(snapshot.snapshot_date, snapshot.clone());
        Ok(())
    }

    async fn snapshot_series(
        &self,
        user: &UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AccountDailySnapshot>, StoreError> {
        Ok(self
            .snapshots
            .get(&user.0)
            .map(|series| {
                series
                    .values()
                    .filter(|s| {
                        from.is_none_or(|f| s.snapshot_date >= f)
                            && to.is_none_or(|t| s.snapshot_date <= t)
                    })
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }
}

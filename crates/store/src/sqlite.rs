use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use mogi_core::market::entity::{Board, Exchange};
use mogi_core::store::error::StoreError;
use mogi_core::store::port::{
    AccountStore, Page, PositionPatch, PositionStore, SnapshotStore, TradeCommit, TradeFilter,
    TradeLedger,
};
use mogi_core::trade::entity::{
    Account, AccountDailySnapshot, AccountStatus, OrderType, Position, TradeId, TradeRecord,
    TradeSource, TradeStatus, TradeType, UserId,
};
use rust_decimal::Decimal;
use sqlx::SqlitePool;
use tracing::warn;

use crate::shard::ShardPools;

const TRADE_COLS: &str = "trade_id, stock_code, trade_type, order_type, quantity, price, amount, \
     commission, stamp_tax, transfer_fee, slippage, total_cost, trade_source, strategy_name, \
     trade_time, settlement_date, status, settled_at";

const SNAPSHOT_COLS: &str = "snapshot_date, total_assets, available_cash, total_market_value, \
     daily_return, daily_return_rate, total_return, total_return_rate, position_count, trade_count";

/// # Summary
/// 四类存储端口的 SQLite 分片实现。金额一律以 TEXT 存储、
/// `Decimal` 精确换算；单笔成交与账户重置在单事务内生效。
///
/// # Invariants
/// - 同一用户的并发写由上层引擎的账户锁串行化，本层只保证事务原子性。
/// - 读路径不会隐式创建分片文件。
pub struct SqliteBrokerStore {
    pools: Arc<ShardPools>,
}

impl SqliteBrokerStore {
    pub fn new(pools: Arc<ShardPools>) -> Self {
        Self { pools }
    }

    async fn pool(&self, user: &UserId) -> Result<SqlitePool, StoreError> {
        self.pools.get_or_init(user).await
    }
}

fn decimal(text: &str) -> Decimal {
    Decimal::from_str(text).unwrap_or_default()
}

#[derive(sqlx::FromRow)]
struct AccountRow {
    user_id: String,
    available_cash: String,
    frozen_cash: String,
    initial_capital: String,
    total_assets: String,
    total_market_value: String,
    daily_return: String,
    daily_return_rate: String,
    total_return: String,
    total_return_rate: String,
    trade_count: i64,
    profit_trades: i64,
    loss_trades: i64,
    win_rate: String,
    status: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl AccountRow {
    fn into_account(self) -> Account {
        Account {
            user_id: UserId(self.user_id),
            available_cash: decimal(&self.available_cash),
            frozen_cash: decimal(&self.frozen_cash),
            initial_capital: decimal(&self.initial_capital),
            total_assets: decimal(&self.total_assets),
            total_market_value: decimal(&self.total_market_value),
            daily_return: decimal(&self.daily_return),
            daily_return_rate: decimal(&self.daily_return_rate),
            total_return: decimal(&self.total_return),
            total_return_rate: decimal(&self.total_return_rate),
            trade_count: self.trade_count,
            profit_trades: self.profit_trades,
            loss_trades: self.loss_trades,
            win_rate: decimal(&self.win_rate),
            status: self.status.parse().unwrap_or(AccountStatus::Active),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct PositionRow {
    stock_code: String,
    stock_name: String,
    total_quantity: i64,
    available_quantity: i64,
    frozen_quantity: i64,
    avg_cost: String,
    current_price: String,
    market_value: String,
    cost_value: String,
    unrealized_pnl: String,
    unrealized_pnl_rate: String,
    position_date: NaiveDate,
    board_type: String,
    market: String,
    price_stale: bool,
}

impl PositionRow {
    fn into_position(self, user: &UserId) -> Position {
        // 枚举列损坏时退回按代码前缀重新推导
        let board_type =
            self.board_type.parse().unwrap_or_else(|_| Board::classify(&self.stock_code));
        let market = self.market.parse().unwrap_or_else(|_| Exchange::classify(&self.stock_code));
        Position {
            user_id: user.clone(),
            stock_code: self.stock_code,
            stock_name: self.stock_name,
            total_quantity: self.total_quantity,
            available_quantity: self.available_quantity,
            frozen_quantity: self.frozen_quantity,
            avg_cost: decimal(&self.avg_cost),
            current_price: decimal(&self.current_price),
            market_value: decimal(&self.market_value),
            cost_value: decimal(&self.cost_value),
            unrealized_pnl: decimal(&self.unrealized_pnl),
            unrealized_pnl_rate: decimal(&self.unrealized_pnl_rate),
            position_date: self.position_date,
            board_type,
            market,
            price_stale: self.price_stale,
        }
    }
}

#[derive(sqlx::FromRow)]
struct TradeRow {
    trade_id: String,
    stock_code: String,
    trade_type: String,
    order_type: String,
    quantity: i64,
    price: String,
    amount: String,
    commission: String,
    stamp_tax: String,
    transfer_fee: String,
    slippage: String,
    total_cost: String,
    trade_source: String,
    strategy_name: Option<String>,
    trade_time: DateTime<Utc>,
    settlement_date: NaiveDate,
    status: String,
    settled_at: Option<DateTime<Utc>>,
}

impl TradeRow {
    fn into_trade(self, user: &UserId) -> TradeRecord {
        TradeRecord {
            trade_id: TradeId(self.trade_id),
            user_id: user.clone(),
            stock_code: self.stock_code,
            trade_type: self.trade_type.parse().unwrap_or(TradeType::Buy),
            order_type: self.order_type.parse().unwrap_or(OrderType::Market),
            quantity: self.quantity,
            price: decimal(&self.price),
            amount: decimal(&self.amount),
            commission: decimal(&self.commission),
            stamp_tax: decimal(&self.stamp_tax),
            transfer_fee: decimal(&self.transfer_fee),
            slippage: decimal(&self.slippage),
            total_cost: decimal(&self.total_cost),
            trade_source: self.trade_source.parse().unwrap_or(TradeSource::Manual),
            strategy_name: self.strategy_name,
            trade_time: self.trade_time,
            settlement_date: self.settlement_date,
            status: self.status.parse().unwrap_or(TradeStatus::Filled),
            settled_at: self.settled_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct SnapshotRow {
    snapshot_date: NaiveDate,
    total_assets: String,
    available_cash: String,
    total_market_value: String,
    daily_return: String,
    daily_return_rate: String,
    total_return: String,
    total_return_rate: String,
    position_count: i64,
    trade_count: i64,
}

impl SnapshotRow {
    fn into_snapshot(self, user: &UserId) -> AccountDailySnapshot {
        AccountDailySnapshot {
            user_id: user.clone(),
            snapshot_date: self.snapshot_date,
            total_assets: decimal(&self.total_assets),
            available_cash: decimal(&self.available_cash),
            total_market_value: decimal(&self.total_market_value),
            daily_return: decimal(&self.daily_return),
            daily_return_rate: decimal(&self.daily_return_rate),
            total_return: decimal(&self.total_return),
            total_return_rate: decimal(&self.total_return_rate),
            position_count: self.position_count,
            trade_count: self.trade_count,
        }
    }
}

/// 账户行写入（INSERT OR REPLACE），可在事务或裸连接上执行
async fn upsert_account<'e, E>(executor: E, account: &Account) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO account (
            user_id, available_cash, frozen_cash, initial_capital, total_assets,
            total_market_value, daily_return, daily_return_rate, total_return,
            total_return_rate, trade_count, profit_trades, loss_trades, win_rate,
            status, created_at, updated_at
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&account.user_id.0)
    .bind(account.available_cash.to_string())
    .bind(account.frozen_cash.to_string())
    .bind(account.initial_capital.to_string())
    .bind(account.total_assets.to_string())
    .bind(account.total_market_value.to_string())
    .bind(account.daily_return.to_string())
    .bind(account.daily_return_rate.to_string())
    .bind(account.total_return.to_string())
    .bind(account.total_return_rate.to_string())
    .bind(account.trade_count)
    .bind(account.profit_trades)
    .bind(account.loss_trades)
    .bind(account.win_rate.to_string())
    .bind(account.status.to_string())
    .bind(account.created_at)
    .bind(account.updated_at)
    .execute(executor)
    .await
    .map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(())
}

/// 持仓行写入（INSERT OR REPLACE）
async fn upsert_position<'e, E>(executor: E, position: &Position) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(
        r#"
        INSERT OR REPLACE INTO positions (
            stock_code, stock_name, total_quantity, available_quantity, frozen_quantity,
            avg_cost, current_price, market_value, cost_value, unrealized_pnl,
            unrealized_pnl_rate, position_date, board_type, market, price_stale
        ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&position.stock_code)
    .bind(&position.stock_name)
    .bind(position.total_quantity)
    .bind(position.available_quantity)
    .bind(position.frozen_quantity)
    .bind(position.avg_cost.to_string())
    .bind(position.current_price.to_string())
    .bind(position.market_value.to_string())
    .bind(position.cost_value.to_string())
    .bind(position.unrealized_pnl.to_string())
    .bind(position.unrealized_pnl_rate.to_string())
    .bind(position.position_date)
    .bind(position.board_type.to_string())
    .bind(position.market.to_string())
    .bind(position.price_stale)
    .execute(executor)
    .await
    .map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(())
}

/// 流水追加
async fn insert_trade<'e, E>(executor: E, trade: &TradeRecord) -> Result<(), StoreError>
where
    E: sqlx::Executor<'e, Database = sqlx::Sqlite>,
{
    sqlx::query(&format!("INSERT INTO trades ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)", TRADE_COLS))
        .bind(&trade.trade_id.0)
        .bind(&trade.stock_code)
        .bind(trade.trade_type.to_string())
        .bind(trade.order_type.to_string())
        .bind(trade.quantity)
        .bind(trade.price.to_string())
        .bind(trade.amount.to_string())
        .bind(trade.commission.to_string())
        .bind(trade.stamp_tax.to_string())
        .bind(trade.transfer_fee.to_string())
        .bind(trade.slippage.to_string())
        .bind(trade.total_cost.to_string())
        .bind(trade.trade_source.to_string())
        .bind(trade.strategy_name.as_deref())
        .bind(trade.trade_time)
        .bind(trade.settlement_date)
        .bind(trade.status.to_string())
        .bind(trade.settled_at)
        .execute(executor)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
    Ok(())
}

#[async_trait]
impl AccountStore for SqliteBrokerStore {
    async fn get_account(&self, user: &UserId) -> Result<Option<Account>, StoreError> {
        if !self.pools.shard_exists(user) {
            return Ok(None);
        }
        let pool = self.pool(user).await?;
        let row: Option<AccountRow> =
            sqlx::query_as("SELECT * FROM account WHERE user_id = ?")
                .bind(&user.0)
                .fetch_optional(&pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.map(AccountRow::into_account))
    }

    async fn save_account(&self, account: &Account) -> Result<(), StoreError> {
        let pool = self.pool(&account.user_id).await?;
        upsert_account(&pool, account).await
    }

    async fn commit_trade(&self, commit: &TradeCommit) -> Result<(), StoreError> {
        let pool = self.pool(&commit.account.user_id).await?;
        let mut tx = pool.begin().await.map_err(|e| StoreError::Database(e.to_string()))?;

        upsert_account(&mut *tx, &commit.account).await?;

        match &commit.position {
            PositionPatch::Upsert(position) => upsert_position(&mut *tx, position).await?,
            PositionPatch::Remove(stock_code) => {
                sqlx::query("DELETE FROM positions WHERE stock_code = ?")
                    .bind(stock_code)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| StoreError::Database(e.to_string()))?;
            }
        }

        insert_trade(&mut *tx, &commit.trade).await?;

        tx.commit().await.map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn reset(&self, user: &UserId, fresh: &Account) -> Result<(), StoreError> {
        let pool = self.pool(user).await?;
        let mut tx = pool.begin().await.map_err(|e| StoreError::Database(e.to_string()))?;

        sqlx::query("DELETE FROM positions")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        sqlx::query("DELETE FROM trades")
            .execute(&mut *tx)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        upsert_account(&mut *tx, fresh).await?;

        tx.commit().await.map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError> {
        self.pools.list_users()
    }
}

#[async_trait]
impl PositionStore for SqliteBrokerStore {
    async fn get_position(
        &self,
        user: &UserId,
        stock_code: &str,
    ) -> Result<Option<Position>, StoreError> {
        if !self.pools.shard_exists(user) {
            return Ok(None);
        }
        let pool = self.pool(user).await?;
        let row: Option<PositionRow> =
            sqlx::query_as("SELECT * FROM positions WHERE stock_code = ?")
                .bind(stock_code)
                .fetch_optional(&pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.map(|r| r.into_position(user)))
    }

    async fn list_positions(&self, user: &UserId) -> Result<Vec<Position>, StoreError> {
        if !self.pools.shard_exists(user) {
            return Ok(Vec::new());
        }
        let pool = self.pool(user).await?;
        let rows: Vec<PositionRow> =
            sqlx::query_as("SELECT * FROM positions ORDER BY stock_code")
                .fetch_all(&pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.into_position(user)).collect())
    }

    async fn save_position(&self, position: &Position) -> Result<(), StoreError> {
        let pool = self.pool(&position.user_id).await?;
        upsert_position(&pool, position).await
    }

    async fn release_settled(
        &self,
        user: &UserId,
        stock_code: &str,
        quantity: i64,
    ) -> Result<i64, StoreError> {
        let pool = self.pool(user).await?;
        let mut tx = pool.begin().await.map_err(|e| StoreError::Database(e.to_string()))?;

        let row: Option<(i64, i64)> = sqlx::query_as(
            "SELECT total_quantity, available_quantity FROM positions WHERE stock_code = ?",
        )
        .bind(stock_code)
        .fetch_optional(&mut *tx)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;

        // 持仓已全部卖出属正常情况，按 0 解禁处理
        let Some((total, available)) = row else {
            return Ok(0);
        };

        let released = quantity.min(total - available).max(0);
        if released < quantity {
            warn!(
                "持仓 {} {} 解禁异常: 申请 {} 实际 {}",
                user.0, stock_code, quantity, released
            );
        }
        if released > 0 {
            sqlx::query("UPDATE positions SET available_quantity = ? WHERE stock_code = ?")
                .bind(available + released)
                .bind(stock_code)
                .execute(&mut *tx)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        }

        tx.commit().await.map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(released)
    }
}

#[async_trait]
impl TradeLedger for SqliteBrokerStore {
    async fn get_trade(
        &self,
        user: &UserId,
        trade_id: &TradeId,
    ) -> Result<Option<TradeRecord>, StoreError> {
        if !self.pools.shard_exists(user) {
            return Ok(None);
        }
        let pool = self.pool(user).await?;
        let row: Option<TradeRow> =
            sqlx::query_as(&format!("SELECT {} FROM trades WHERE trade_id = ?", TRADE_COLS))
                .bind(&trade_id.0)
                .fetch_optional(&pool)
                .await
                .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(row.map(|r| r.into_trade(user)))
    }

    async fn history(
        &self,
        user: &UserId,
        filter: &TradeFilter,
        page: &Page,
    ) -> Result<(Vec<TradeRecord>, u64), StoreError> {
        if !self.pools.shard_exists(user) {
            return Ok((Vec::new(), 0));
        }
        let pool = self.pool(user).await?;

        let mut conditions: Vec<&str> = Vec::new();
        if filter.stock_code.is_some() {
            conditions.push("stock_code = ?");
        }
        if filter.trade_type.is_some() {
            conditions.push("trade_type = ?");
        }
        if filter.source.is_some() {
            conditions.push("trade_source = ?");
        }
        if filter.start.is_some() {
            conditions.push("trade_time >= ?");
        }
        if filter.end.is_some() {
            conditions.push("trade_time <= ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let count_sql = format!("SELECT COUNT(*) FROM trades{}", where_clause);
        let mut count_query = sqlx::query_as::<_, (i64,)>(&count_sql);
        if let Some(code) = &filter.stock_code {
            count_query = count_query.bind(code);
        }
        if let Some(trade_type) = filter.trade_type {
            count_query = count_query.bind(trade_type.to_string());
        }
        if let Some(source) = filter.source {
            count_query = count_query.bind(source.to_string());
        }
        if let Some(start) = filter.start {
            count_query = count_query.bind(start);
        }
        if let Some(end) = filter.end {
            count_query = count_query.bind(end);
        }
        let (count,) = count_query
            .fetch_one(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let page_sql = format!(
            "SELECT {} FROM trades{} ORDER BY trade_time DESC, trade_id DESC LIMIT ? OFFSET ?",
            TRADE_COLS, where_clause
        );
        let mut page_query = sqlx::query_as::<_, TradeRow>(&page_sql);
        if let Some(code) = &filter.stock_code {
            page_query = page_query.bind(code);
        }
        if let Some(trade_type) = filter.trade_type {
            page_query = page_query.bind(trade_type.to_string());
        }
        if let Some(source) = filter.source {
            page_query = page_query.bind(source.to_string());
        }
        if let Some(start) = filter.start {
            page_query = page_query.bind(start);
        }
        if let Some(end) = filter.end {
            page_query = page_query.bind(end);
        }
        let limit = i64::try_from(page.limit()).unwrap_or(i64::MAX);
        let offset = i64::try_from(page.offset()).unwrap_or(i64::MAX);
        let rows: Vec<TradeRow> = page_query
            .bind(limit)
            .bind(offset)
            .fetch_all(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;

        let trades = rows.into_iter().map(|r| r.into_trade(user)).collect();
        Ok((trades, u64::try_from(count).unwrap_or(0)))
    }

    async fn unsettled_buys(
        &self,
        user: &UserId,
        due: NaiveDate,
    ) -> Result<Vec<TradeRecord>, StoreError> {
        if !self.pools.shard_exists(user) {
            return Ok(Vec::new());
        }
        let pool = self.pool(user).await?;
        let rows: Vec<TradeRow> = sqlx::query_as(&format!(
            "SELECT {} FROM trades \
             WHERE trade_type = 'BUY' AND status = 'FILLED' \
               AND settlement_date <= ? AND settled_at IS NULL \
             ORDER BY trade_time ASC",
            TRADE_COLS
        ))
        .bind(due)
        .fetch_all(&pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.into_trade(user)).collect())
    }

    async fn mark_settled(
        &self,
        user: &UserId,
        trade_id: &TradeId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        let pool = self.pool(user).await?;
        sqlx::query("UPDATE trades SET settled_at = ? WHERE trade_id = ? AND settled_at IS NULL")
            .bind(at)
            .bind(&trade_id.0)
            .execute(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }
}

#[async_trait]
impl SnapshotStore for SqliteBrokerStore {
    async fn upsert_snapshot(&self, snapshot: &AccountDailySnapshot) -> Result<(), StoreError> {
        let pool = self.pool(&snapshot.user_id).await?;
        sqlx::query(&format!(
            "INSERT OR REPLACE INTO snapshots ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            SNAPSHOT_COLS
        ))
        .bind(snapshot.snapshot_date)
        .bind(snapshot.total_assets.to_string())
        .bind(snapshot.available_cash.to_string())
        .bind(snapshot.total_market_value.to_string())
        .bind(snapshot.daily_return.to_string())
        .bind(snapshot.daily_return_rate.to_string())
        .bind(snapshot.total_return.to_string())
        .bind(snapshot.total_return_rate.to_string())
        .bind(snapshot.position_count)
        .bind(snapshot.trade_count)
        .execute(&pool)
        .await
        .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(())
    }

    async fn snapshot_series(
        &self,
        user: &UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AccountDailySnapshot>, StoreError> {
        if !self.pools.shard_exists(user) {
            return Ok(Vec::new());
        }
        let pool = self.pool(user).await?;

        let mut conditions: Vec<&str> = Vec::new();
        if from.is_some() {
            conditions.push("snapshot_date >= ?");
        }
        if to.is_some() {
            conditions.push("snapshot_date <= ?");
        }
        let where_clause = if conditions.is_empty() {
            String::new()
        } else {
            format!(" WHERE {}", conditions.join(" AND "))
        };

        let sql = format!(
            "SELECT {} FROM snapshots{} ORDER BY snapshot_date ASC",
            SNAPSHOT_COLS, where_clause
        );
        let mut query = sqlx::query_as::<_, SnapshotRow>(&sql);
        if let Some(from) = from {
            query = query.bind(from);
        }
        if let Some(to) = to {
            query = query.bind(to);
        }
        let rows: Vec<SnapshotRow> = query
            .fetch_all(&pool)
            .await
            .map_err(|e| StoreError::Database(e.to_string()))?;
        Ok(rows.into_iter().map(|r| r.into_snapshot(user)).collect())
    }
}

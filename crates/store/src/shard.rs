use dashmap::DashMap;
use mogi_core::store::error::StoreError;
use mogi_core::trade::entity::UserId;
use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::path::PathBuf;
use tracing::info;

/// 分片文件名前缀，完整形式为 broker_<user_id>.db
const SHARD_PREFIX: &str = "broker_";
const SHARD_SUFFIX: &str = ".db";

/// # Summary
/// 一户一库的 SQLite 分片池。每个用户的账户、持仓、流水、快照
/// 落在独立的数据库文件中，天然避开 SQLite 的单写锁在用户间的争抢；
/// 同一用户内的写串行由上层引擎的账户锁保证。
///
/// # Invariants
/// - 数据目录由构造方注入，本层不持有任何全局路径。
/// - 读路径绝不隐式建库：分片文件不存在即视为"该用户无数据"。
pub struct ShardPools {
    base_path: PathBuf,
    pools: DashMap<String, SqlitePool>,
}

impl ShardPools {
    pub fn new(data_dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let base_path = data_dir.into();
        if !base_path.exists() {
            std::fs::create_dir_all(&base_path).map_err(|e| {
                StoreError::InitError(format!("Failed to create shard dir: {}", e))
            })?;
        }
        Ok(Self { base_path, pools: DashMap::new() })
    }

    fn shard_file(user: &UserId) -> String {
        format!("{}{}{}", SHARD_PREFIX, user.0, SHARD_SUFFIX)
    }

    /// 分片是否已经存在（连接缓存或磁盘文件）
    pub fn shard_exists(&self, user: &UserId) -> bool {
        self.pools.contains_key(&user.0) || self.base_path.join(Self::shard_file(user)).exists()
    }

    /// # Summary
    /// 获取用户分片的连接池，首次访问时建库建表。
    ///
    /// # Logic
    /// 1. 命中缓存直接返回。
    /// 2. 以 WAL + busy_timeout 打开（或创建）分片文件，单连接池。
    /// 3. 执行建表 DDL（IF NOT EXISTS，幂等）。
    pub async fn get_or_init(&self, user: &UserId) -> Result<SqlitePool, StoreError> {
        if let Some(pool) = self.pools.get(&user.0) {
            return Ok(pool.clone());
        }

        let db_path = self.base_path.join(Self::shard_file(user));
        let fresh = !db_path.exists();
        let options = SqliteConnectOptions::new()
            .filename(&db_path)
            .create_if_missing(true)
            .journal_mode(sqlx::sqlite::SqliteJournalMode::Wal)
            .synchronous(sqlx::sqlite::SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(10));

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .map_err(|e| StoreError::InitError(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS account (
                user_id TEXT PRIMARY KEY,
                available_cash TEXT NOT NULL,
                frozen_cash TEXT NOT NULL,
                initial_capital TEXT NOT NULL,
                total_assets TEXT NOT NULL,
                total_market_value TEXT NOT NULL,
                daily_return TEXT NOT NULL,
                daily_return_rate TEXT NOT NULL,
                total_return TEXT NOT NULL,
                total_return_rate TEXT NOT NULL,
                trade_count INTEGER NOT NULL,
                profit_trades INTEGER NOT NULL,
                loss_trades INTEGER NOT NULL,
                win_rate TEXT NOT NULL,
                status TEXT NOT NULL,
                created_at DATETIME NOT NULL,
                updated_at DATETIME NOT NULL
            );

            CREATE TABLE IF NOT EXISTS positions (
                stock_code TEXT PRIMARY KEY,
                stock_name TEXT NOT NULL,
                total_quantity INTEGER NOT NULL,
                available_quantity INTEGER NOT NULL,
                frozen_quantity INTEGER NOT NULL,
                avg_cost TEXT NOT NULL,
                current_price TEXT NOT NULL,
                market_value TEXT NOT NULL,
                cost_value TEXT NOT NULL,
                unrealized_pnl TEXT NOT NULL,
                unrealized_pnl_rate TEXT NOT NULL,
                position_date DATE NOT NULL,
                board_type TEXT NOT NULL,
                market TEXT NOT NULL,
                price_stale INTEGER NOT NULL DEFAULT 0
            );

            CREATE TABLE IF NOT EXISTS trades (
                trade_id TEXT PRIMARY KEY,
                stock_code TEXT NOT NULL,
                trade_type TEXT NOT NULL,
                order_type TEXT NOT NULL,
                quantity INTEGER NOT NULL,
                price TEXT NOT NULL,
                amount TEXT NOT NULL,
                commission TEXT NOT NULL,
                stamp_tax TEXT NOT NULL,
                transfer_fee TEXT NOT NULL,
                slippage TEXT NOT NULL,
                total_cost TEXT NOT NULL,
                trade_source TEXT NOT NULL,
                strategy_name TEXT,
                trade_time DATETIME NOT NULL,
                settlement_date DATE NOT NULL,
                status TEXT NOT NULL,
                settled_at DATETIME
            );
            CREATE INDEX IF NOT EXISTS idx_trades_time ON trades (trade_time DESC);
            CREATE INDEX IF NOT EXISTS idx_trades_settlement ON trades (settlement_date, settled_at);

            CREATE TABLE IF NOT EXISTS snapshots (
                snapshot_date DATE PRIMARY KEY,
                total_assets TEXT NOT NULL,
                available_cash TEXT NOT NULL,
                total_market_value TEXT NOT NULL,
                daily_return TEXT NOT NULL,
                daily_return_rate TEXT NOT NULL,
                total_return TEXT NOT NULL,
                total_return_rate TEXT NOT NULL,
                position_count INTEGER NOT NULL,
                trade_count INTEGER NOT NULL
            );
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| StoreError::InitError(e.to_string()))?;

        if fresh {
            info!("Created broker shard {} for user {}", Self::shard_file(user), user.0);
        }

        self.pools.insert(user.0.clone(), pool.clone());
        Ok(pool)
    }

    /// # Summary
    /// 目录扫描枚举全部已开户用户，供批处理任务遍历。
    /// 结果按用户 ID 升序，保证批任务遍历顺序稳定。
    pub fn list_users(&self) -> Result<Vec<UserId>, StoreError> {
        let entries = std::fs::read_dir(&self.base_path)
            .map_err(|e| StoreError::Database(format!("Failed to scan shard dir: {}", e)))?;

        let mut users = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|e| StoreError::Database(e.to_string()))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(stem) = name.strip_prefix(SHARD_PREFIX).and_then(|s| s.strip_suffix(SHARD_SUFFIX)) {
                if !stem.is_empty() {
                    users.push(UserId(stem.to_string()));
                }
            }
        }
        users.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(users)
    }
}

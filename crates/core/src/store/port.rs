use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::error::StoreError;
use crate::trade::entity::{
    Account, AccountDailySnapshot, Position, TradeId, TradeRecord, TradeSource, TradeType, UserId,
};

/// # Summary
/// 一笔成交对持仓行的净效果：更新（含新建）或整行删除。
/// 数量归零的持仓必须删除而非保留零值行。
#[derive(Debug, Clone)]
pub enum PositionPatch {
    /// 新建或覆盖 (user_id, stock_code) 对应的持仓行
    Upsert(Position),
    /// 删除指定股票代码的持仓行（全部卖出）
    Remove(String),
}

/// # Summary
/// 单笔成交的完整落库载荷：账户新状态、持仓净效果、追加的流水。
/// 三者必须在同一事务中生效——要么全部可见，要么全部不可见，
/// 这是账户资金恒等式在崩溃场景下依然成立的前提。
#[derive(Debug, Clone)]
pub struct TradeCommit {
    /// 校验通过后计算出的账户完整新状态
    pub account: Account,
    /// 持仓净效果
    pub position: PositionPatch,
    /// 追加写入的成交流水
    pub trade: TradeRecord,
}

/// # Summary
/// 成交历史查询条件，全部字段可选，None 表示不过滤。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TradeFilter {
    // 按股票代码过滤
    pub stock_code: Option<String>,
    // 按买卖方向过滤
    pub trade_type: Option<TradeType>,
    // 按委托来源过滤
    pub source: Option<TradeSource>,
    // 成交时间下界（含）
    pub start: Option<DateTime<Utc>>,
    // 成交时间上界（含）
    pub end: Option<DateTime<Utc>>,
}

/// # Summary
/// 分页参数。页码从 1 开始，页大小上限 200。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Page {
    pub page: u64,
    pub page_size: u64,
}

impl Default for Page {
    fn default() -> Self {
        Self { page: 1, page_size: 20 }
    }
}

impl Page {
    pub const MAX_PAGE_SIZE: u64 = 200;

    /// 实际生效的每页条数，收敛到 [1, 200]
    pub fn limit(&self) -> u64 {
        self.page_size.clamp(1, Self::MAX_PAGE_SIZE)
    }

    /// 查询偏移量，页码 0 与 1 等价
    pub fn offset(&self) -> u64 {
        self.page.max(1).saturating_sub(1).saturating_mul(self.limit())
    }
}

/// # Summary
/// 账户存储接口，负责账户行的读写与单笔成交的原子落库。
///
/// # Invariants
/// - `commit_trade` 与 `reset` 必须是原子操作：部分生效等同于数据损坏。
/// - 同一用户的写入由上层引擎串行化，实现无须做跨行加锁。
#[async_trait]
pub trait AccountStore: Send + Sync {
    /// # Summary
    /// 读取账户。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    ///
    /// # Returns
    /// 账户存在返回 `Some(Account)`，从未开户返回 `None`。
    async fn get_account(&self, user: &UserId) -> Result<Option<Account>, StoreError>;

    /// # Summary
    /// 保存或更新账户（Upsert）。
    ///
    /// # Arguments
    /// * `account`: 待写入的账户完整状态。
    async fn save_account(&self, account: &Account) -> Result<(), StoreError>;

    /// # Summary
    /// 原子提交一笔成交：账户行、持仓净效果、流水追加在同一事务内生效。
    ///
    /// # Logic
    /// 1. 开启事务。
    /// 2. 覆盖写账户行。
    /// 3. 按 `PositionPatch` 更新或删除持仓行。
    /// 4. 追加成交流水。
    /// 5. 提交事务；任何一步失败则整体回滚。
    ///
    /// # Arguments
    /// * `commit`: 成交落库载荷。
    async fn commit_trade(&self, commit: &TradeCommit) -> Result<(), StoreError>;

    /// # Summary
    /// 重置账户：清空该用户全部持仓与流水，并以给定的新账户状态覆盖账户行。
    /// 快照历史保留，供重置前后的收益曲线对照。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    /// * `fresh`: 重置后的账户状态（通常为按初始资金重开的账户）。
    async fn reset(&self, user: &UserId, fresh: &Account) -> Result<(), StoreError>;

    /// # Summary
    /// 枚举所有已开户的用户，供结算、估值等批处理任务遍历。
    async fn list_user_ids(&self) -> Result<Vec<UserId>, StoreError>;
}

/// # Summary
/// 持仓存储接口。
///
/// # Invariants
/// - 任何写入后 `0 <= available_quantity <= total_quantity` 必须成立。
#[async_trait]
pub trait PositionStore: Send + Sync {
    /// # Summary
    /// 读取单只股票的持仓。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    /// * `stock_code`: 股票代码。
    ///
    /// # Returns
    /// 持仓存在返回 `Some(Position)`，否则返回 `None`。
    async fn get_position(
        &self,
        user: &UserId,
        stock_code: &str,
    ) -> Result<Option<Position>, StoreError>;

    /// # Summary
    /// 列出用户全部持仓。
    async fn list_positions(&self, user: &UserId) -> Result<Vec<Position>, StoreError>;

    /// # Summary
    /// 保存或更新持仓行（Upsert），用于估值任务回写最新价与市值。
    async fn save_position(&self, position: &Position) -> Result<(), StoreError>;

    /// # Summary
    /// T+1 解禁：将持仓的可卖数量增加 `quantity`，并收敛到不超过总数量。
    ///
    /// # Logic
    /// 1. 事务内读取持仓行；不存在则返回 0（已全部卖出属正常情况）。
    /// 2. `released = min(quantity, total_quantity - available_quantity)`。
    /// 3. 回写 `available_quantity + released`。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    /// * `stock_code`: 股票代码。
    /// * `quantity`: 请求解禁的股数（来自买入流水）。
    ///
    /// # Returns
    /// 实际解禁的股数（可能小于请求值，重复结算或已部分卖出时为 0）。
    async fn release_settled(
        &self,
        user: &UserId,
        stock_code: &str,
        quantity: i64,
    ) -> Result<i64, StoreError>;
}

/// # Summary
/// 成交流水账本接口。流水只追加，唯一允许的后置更新是结算标记。
#[async_trait]
pub trait TradeLedger: Send + Sync {
    /// # Summary
    /// 按成交 ID 读取单条流水。
    async fn get_trade(
        &self,
        user: &UserId,
        trade_id: &TradeId,
    ) -> Result<Option<TradeRecord>, StoreError>;

    /// # Summary
    /// 分页查询成交历史，按成交时间倒序。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    /// * `filter`: 查询条件。
    /// * `page`: 分页参数。
    ///
    /// # Returns
    /// 当前页的流水列表与满足条件的总条数。
    async fn history(
        &self,
        user: &UserId,
        filter: &TradeFilter,
        page: &Page,
    ) -> Result<(Vec<TradeRecord>, u64), StoreError>;

    /// # Summary
    /// 查询解禁日已到且尚未结算的买入流水。
    ///
    /// # Logic
    /// 过滤条件：`trade_type = BUY`、`status = FILLED`、
    /// `settlement_date <= due` 且 `settled_at` 为空。
    /// 解禁日落在周末的流水会被之后的任意一次运行捞起，
    /// 结算标记保证重复运行不会二次解禁。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    /// * `due`: 结算截止日（含），通常为运行当日的本地日期。
    async fn unsettled_buys(
        &self,
        user: &UserId,
        due: NaiveDate,
    ) -> Result<Vec<TradeRecord>, StoreError>;

    /// # Summary
    /// 写入结算标记。已标记的流水不会再出现在 `unsettled_buys` 的结果中。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    /// * `trade_id`: 目标流水。
    /// * `at`: 结算处理时间。
    async fn mark_settled(
        &self,
        user: &UserId,
        trade_id: &TradeId,
        at: DateTime<Utc>,
    ) -> Result<(), StoreError>;
}

/// # Summary
/// 账户每日快照存储接口。
#[async_trait]
pub trait SnapshotStore: Send + Sync {
    /// # Summary
    /// 写入或覆盖 (user_id, snapshot_date) 对应的快照行。
    /// 同一交易日重复运行估值任务只保留最后一次的结果。
    async fn upsert_snapshot(&self, snapshot: &AccountDailySnapshot) -> Result<(), StoreError>;

    /// # Summary
    /// 按日期区间读取快照序列，升序返回。
    ///
    /// # Arguments
    /// * `user`: 用户标识。
    /// * `from`: 起始日期（含），None 表示不设下界。
    /// * `to`: 截止日期（含），None 表示不设上界。
    async fn snapshot_series(
        &self,
        user: &UserId,
        from: Option<NaiveDate>,
        to: Option<NaiveDate>,
    ) -> Result<Vec<AccountDailySnapshot>, StoreError>;
}

/// # Summary
/// 四个域存储接口的聚合别名。任何同时实现四个接口的后端自动获得该实现，
/// 交易引擎与批处理任务仅持有一个 `Arc<dyn BrokerStore>` 即可访问全部域。
pub trait BrokerStore: AccountStore + PositionStore + TradeLedger + SnapshotStore {}

impl<T: AccountStore + PositionStore + TradeLedger + SnapshotStore> BrokerStore for T {}

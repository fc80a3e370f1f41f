use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

use super::entity::{
    Account, BuyRequest, Position, SellRequest, StrategySignal, TradeId, TradeRecord, UserId,
};
use crate::market::error::MarketError;
use crate::store::error::StoreError;
use crate::store::port::{Page, TradeFilter};

/// # Summary
/// 交易执行环节的错误枚举。前十种为委托校验失败，在任何状态变更之前
/// 检出并原样返回调用方，绝不自动重试；`Store` / `Market` / `Internal`
/// 为基础设施故障。所有变体都携带可直接展示给用户的上下文。
#[derive(Error, Debug)]
pub enum TradeError {
    #[error("账户已冻结: {0}")]
    AccountFrozen(String),
    #[error("当前不在交易时段: {0}")]
    OutsideTradingHours(String),
    #[error("委托数量无效: {0}")]
    InvalidQuantity(String),
    #[error("无法获取行情价格: {0}")]
    PriceUnavailable(String),
    #[error("委托价超出涨跌停区间. 委托价: {price}, 区间: [{lower}, {upper}]")]
    PriceOutOfLimitBand {
        price: Decimal,
        lower: Decimal,
        upper: Decimal,
    },
    #[error("可用资金不足. 需要: {required}, 可用: {available}")]
    InsufficientFunds {
        required: Decimal,
        available: Decimal,
    },
    #[error("单票仓位超限. 本单成本: {cost}, 上限: {cap}")]
    PositionConcentrationExceeded { cost: Decimal, cap: Decimal },
    #[error("未持有该股票: {0}")]
    NoPosition(String),
    #[error("持仓数量不足. 委托: {requested}, 持有: {held}")]
    InsufficientShares { requested: i64, held: i64 },
    #[error("T+1 限制: 部分股份尚未解禁. 委托: {requested}, 可卖: {available}")]
    T1LockActive { requested: i64, available: i64 },
    #[error("存储层错误: {0}")]
    Store(#[from] StoreError),
    #[error("行情层错误: {0}")]
    Market(#[from] MarketError),
    #[error("内部系统错误: {0}")]
    Internal(String),
}

impl TradeError {
    /// 校验类失败（可重试整个校验-提交序列的只有非校验类失败）
    pub fn is_rejection(&self) -> bool {
        !matches!(
            self,
            TradeError::Store(_) | TradeError::Market(_) | TradeError::Internal(_)
        )
    }
}

/// # Summary
/// 模拟交易引擎的公开端口。REST/CLI 层与策略运行器只通过本接口
/// 操作虚拟账户；它是校验、撮合、落库的唯一入口。
///
/// # Invariants
/// - 实现必须是异步且线程安全的 (`Send + Sync`)。
/// - 同一用户的委托必须串行生效；被拒绝的委托不留下任何状态变更。
#[async_trait]
pub trait TradePort: Send + Sync {
    /// # Summary
    /// 显式开户。账户已存在时幂等返回现有账户。
    ///
    /// # Arguments
    /// * `user` - 用户标识
    /// * `initial_capital` - 初始资金；None 使用配置默认值
    async fn init_account(
        &self,
        user: &UserId,
        initial_capital: Option<Decimal>,
    ) -> Result<Account, TradeError>;

    /// # Summary
    /// 查询账户。从未开户的用户按配置默认资金惰性开户后返回。
    async fn get_account(&self, user: &UserId) -> Result<Account, TradeError>;

    /// # Summary
    /// 重置账户：清空持仓与流水，资金恢复为初始资金。快照历史保留。
    ///
    /// # Returns
    /// * `Ok(Account)` - 重置后的新账户状态
    async fn reset_account(&self, user: &UserId) -> Result<Account, TradeError>;

    /// # Summary
    /// 执行买入委托。
    ///
    /// # Logic
    /// 校验（状态 → 时段 → 数量/手数 → 行情价 → 涨跌停 → 资金 → 集中度）
    /// 全部通过后，账户扣款、持仓加仓、流水追加在单笔原子提交中生效。
    ///
    /// # Returns
    /// * `Ok(TradeId)` - 成交流水 ID
    /// * `Err(TradeError)` - 任一校验失败或基础设施故障，无任何状态变更
    async fn execute_buy(&self, user: &UserId, request: BuyRequest) -> Result<TradeId, TradeError>;

    /// # Summary
    /// 执行卖出委托。
    ///
    /// # Logic
    /// 校验（状态 → 时段 → 数量/手数 → 持仓存在 → 总量 → T+1 可卖量 →
    /// 行情价 → 涨跌停）通过后原子落库；卖出净额回笼现金并结转盈亏。
    async fn execute_sell(&self, user: &UserId, request: SellRequest)
    -> Result<TradeId, TradeError>;

    /// # Summary
    /// 执行一条策略信号。校验与撮合路径与手动委托完全一致，
    /// 仅在流水上打 `STRATEGY` 来源标记与策略名。
    async fn execute_signal(
        &self,
        user: &UserId,
        signal: StrategySignal,
    ) -> Result<TradeId, TradeError>;

    /// # Summary
    /// 列出用户全部持仓。
    async fn get_positions(&self, user: &UserId) -> Result<Vec<Position>, TradeError>;

    /// # Summary
    /// 分页查询成交历史。
    ///
    /// # Returns
    /// 当前页流水与满足条件的总条数。
    async fn trade_history(
        &self,
        user: &UserId,
        filter: &TradeFilter,
        page: &Page,
    ) -> Result<(Vec<TradeRecord>, u64), TradeError>;
}

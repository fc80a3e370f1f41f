use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::common::money::{round_cny, round_dp4};
use crate::market::entity::{Board, Exchange};

/// # Summary
/// 系统内的唯一用户标识，用于隔离不同用户的虚拟资金账户与持仓。
///
/// # Invariants
/// - UserId 在整个系统中必须全局唯一。
/// - 账户、持仓、成交流水均以 UserId 为所有权边界，引擎是唯一写入方。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct UserId(pub String);

/// # Summary
/// 成交流水的系统内唯一标识（由引擎生成，外部不可指定）。
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct TradeId(pub String);

/// # Summary
/// 账户生命周期状态。冻结账户拒绝一切委托，但查询不受影响。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccountStatus {
    /// 正常，可交易
    Active,
    /// 已冻结，拒绝买卖
    Frozen,
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "ACTIVE"),
            AccountStatus::Frozen => write!(f, "FROZEN"),
        }
    }
}

impl FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ACTIVE" => Ok(AccountStatus::Active),
            "FROZEN" => Ok(AccountStatus::Frozen),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}

/// # Summary
/// 交易方向。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeType {
    /// 买入
    Buy,
    /// 卖出
    Sell,
}

impl std::fmt::Display for TradeType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeType::Buy => write!(f, "BUY"),
            TradeType::Sell => write!(f, "SELL"),
        }
    }
}

impl FromStr for TradeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeType::Buy),
            "SELL" => Ok(TradeType::Sell),
            _ => Err(format!("Unknown trade type: {}", s)),
        }
    }
}

/// # Summary
/// 委托类型：市价单按当前行情价成交，限价单按指定价成交（须落在涨跌停区间内）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderType {
    /// 市价
    Market,
    /// 限价
    Limit,
}

impl std::fmt::Display for OrderType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OrderType::Market => write!(f, "MARKET"),
            OrderType::Limit => write!(f, "LIMIT"),
        }
    }
}

impl FromStr for OrderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MARKET" => Ok(OrderType::Market),
            "LIMIT" => Ok(OrderType::Limit),
            _ => Err(format!("Unknown order type: {}", s)),
        }
    }
}

/// # Summary
/// 委托来源：手动下单或策略信号。两者走完全相同的校验与撮合路径，
/// 仅在流水上留下来源标记与策略名。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeSource {
    /// 手动
    Manual,
    /// 策略信号
    Strategy,
}

impl std::fmt::Display for TradeSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeSource::Manual => write!(f, "MANUAL"),
            TradeSource::Strategy => write!(f, "STRATEGY"),
        }
    }
}

impl FromStr for TradeSource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MANUAL" => Ok(TradeSource::Manual),
            "STRATEGY" => Ok(TradeSource::Strategy),
            _ => Err(format!("Unknown trade source: {}", s)),
        }
    }
}

/// # Summary
/// 成交流水状态。模拟盘委托即时全额成交，正常路径只会写入 Filled；
/// Pending/Cancelled 仅为状态机完整性保留。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TradeStatus {
    /// 待成交
    Pending,
    /// 已成交
    Filled,
    /// 已撤销
    Cancelled,
}

impl std::fmt::Display for TradeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TradeStatus::Pending => write!(f, "PENDING"),
            TradeStatus::Filled => write!(f, "FILLED"),
            TradeStatus::Cancelled => write!(f, "CANCELLED"),
        }
    }
}

impl FromStr for TradeStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "PENDING" => Ok(TradeStatus::Pending),
            "FILLED" => Ok(TradeStatus::Filled),
            "CANCELLED" => Ok(TradeStatus::Cancelled),
            _ => Err(format!("Unknown trade status: {}", s)),
        }
    }
}

/// # Summary
/// 虚拟资金账户聚合根，每个用户恰好一条。
/// 首次使用时以配置的初始资金惰性创建，之后由每笔成交和估值任务更新。
///
/// # Invariants
/// - 每次成功变更后 `total_assets == available_cash + frozen_cash + total_market_value`。
/// - `available_cash >= 0` 恒成立；会破坏该不变量的买入在任何变更前即被拒绝。
/// - `daily_return` 只由日终估值任务写入，盘中成交不触碰。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// 归属用户
    pub user_id: UserId,
    /// 可用资金（可立即用于买入）
    pub available_cash: Decimal,
    /// 冻结资金（当前模型中委托即时成交，通常为 0）
    pub frozen_cash: Decimal,
    /// 初始资金，收益率的分母
    pub initial_capital: Decimal,
    /// 总资产 = 可用资金 + 冻结资金 + 持仓总市值
    pub total_assets: Decimal,
    /// 持仓总市值
    pub total_market_value: Decimal,
    /// 当日收益（按收盘价对比，由日终任务计算）
    pub daily_return: Decimal,
    /// 当日收益率
    pub daily_return_rate: Decimal,
    /// 累计收益 = 总资产 - 初始资金
    pub total_return: Decimal,
    /// 累计收益率
    pub total_return_rate: Decimal,
    /// 累计成交笔数（买卖都计）
    pub trade_count: i64,
    /// 盈利平仓笔数
    pub profit_trades: i64,
    /// 亏损平仓笔数
    pub loss_trades: i64,
    /// 胜率 = profit / (profit + loss)
    pub win_rate: Decimal,
    /// 账户状态
    pub status: AccountStatus,
    /// 创建时间
    pub created_at: DateTime<Utc>,
    /// 最近一次变更时间
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// # Logic
    /// 以指定初始资金开立新账户：全部资金可用、无持仓、计数器清零。
    pub fn open(user_id: UserId, initial_capital: Decimal, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            available_cash: initial_capital,
            frozen_cash: Decimal::ZERO,
            initial_capital,
            total_assets: initial_capital,
            total_market_value: Decimal::ZERO,
            daily_return: Decimal::ZERO,
            daily_return_rate: Decimal::ZERO,
            total_return: Decimal::ZERO,
            total_return_rate: Decimal::ZERO,
            trade_count: 0,
            profit_trades: 0,
            loss_trades: 0,
            win_rate: Decimal::ZERO,
            status: AccountStatus::Active,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self.status, AccountStatus::Active)
    }

    /// # Logic
    /// 以最新持仓总市值刷新总资产与累计收益。
    /// 不触碰 `daily_return` 字段（归日终估值任务所有）。
    pub fn refresh_totals(&mut self, total_market_value: Decimal) {
        self.total_market_value = total_market_value;
        self.total_assets = round_cny(self.available_cash + self.frozen_cash + total_market_value);
        self.total_return = round_cny(self.total_assets - self.initial_capital);
        self.total_return_rate = if self.initial_capital.is_zero() {
            Decimal::ZERO
        } else {
            round_dp4(self.total_return / self.initial_capital)
        };
    }

    /// # Logic
    /// 记录一次平仓盈亏：pnl >= 0 计入盈利笔数（保本平仓算盈利），
    /// 否则计入亏损笔数，并重算胜率。
    pub fn register_sell_outcome(&mut self, pnl: Decimal) {
        if pnl >= Decimal::ZERO {
            self.profit_trades += 1;
        } else {
            self.loss_trades += 1;
        }
        let closed = self.profit_trades + self.loss_trades;
        self.win_rate = if closed == 0 {
            Decimal::ZERO
        } else {
            round_dp4(Decimal::from(self.profit_trades) / Decimal::from(closed))
        };
    }
}

/// # Summary
/// 单个标的的持仓记录，(user_id, stock_code) 全局唯一。
/// 首次买入创建，数量归零即整行删除——系统中不存在零持仓记录。
///
/// # Invariants
/// - `0 <= available_quantity <= total_quantity` 在任何变更后恒成立（含结算任务）。
/// - `avg_cost` 为全部买入的数量加权平均（非 FIFO 批次成本）。
/// - 当日买入的股份不进入 `available_quantity`，T+1 结算后方可卖出。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    /// 归属用户
    pub user_id: UserId,
    /// 股票代码
    pub stock_code: String,
    /// 股票名称（来自行情静态信息，缺失时为空串）
    pub stock_name: String,
    /// 总持仓数量
    pub total_quantity: i64,
    /// 可卖数量（T+1 约束下已解禁的部分）
    pub available_quantity: i64,
    /// 冻结数量（当前模型中委托即时成交，通常为 0）
    pub frozen_quantity: i64,
    /// 持仓均价（数量加权平均）
    pub avg_cost: Decimal,
    /// 最新价
    pub current_price: Decimal,
    /// 市值 = total_quantity × current_price
    pub market_value: Decimal,
    /// 成本 = 累计买入金额（卖出后按均价等比缩减）
    pub cost_value: Decimal,
    /// 浮动盈亏 = market_value - cost_value
    pub unrealized_pnl: Decimal,
    /// 浮动盈亏率
    pub unrealized_pnl_rate: Decimal,
    /// 建仓日期（首次买入的本地交易日）
    pub position_date: NaiveDate,
    /// 所属板块（决定手数与涨跌幅限制）
    pub board_type: Board,
    /// 所属交易所（决定过户费）
    pub market: Exchange,
    /// 最新价是否为陈旧回退值（行情暂不可得时沿用上次价格）
    pub price_stale: bool,
}

impl Position {
    /// # Logic
    /// 首次买入建仓。板块与交易所由代码前缀推导；
    /// 新买入股份全部处于 T+1 锁定，`available_quantity` 为 0。
    pub fn open(
        user_id: UserId,
        stock_code: &str,
        stock_name: String,
        quantity: i64,
        price: Decimal,
        amount: Decimal,
        position_date: NaiveDate,
    ) -> Self {
        let mut position = Self {
            user_id,
            stock_code: stock_code.to_string(),
            stock_name,
            total_quantity: quantity,
            available_quantity: 0,
            frozen_quantity: 0,
            avg_cost: if quantity == 0 {
                Decimal::ZERO
            } else {
                round_dp4(amount / Decimal::from(quantity))
            },
            current_price: price,
            market_value: Decimal::ZERO,
            cost_value: round_cny(amount),
            unrealized_pnl: Decimal::ZERO,
            unrealized_pnl_rate: Decimal::ZERO,
            position_date,
            board_type: Board::classify(stock_code),
            market: Exchange::classify(stock_code),
            price_stale: false,
        };
        position.refresh_price(price, false);
        position
    }

    /// # Logic
    /// 加仓：数量与成本累加后重算加权均价。
    /// 新买入部分不进入可卖数量（T+1）。
    pub fn apply_buy(&mut self, quantity: i64, price: Decimal, amount: Decimal) {
        self.total_quantity += quantity;
        self.cost_value = round_cny(self.cost_value + amount);
        self.avg_cost = if self.total_quantity == 0 {
            Decimal::ZERO
        } else {
            round_dp4(self.cost_value / Decimal::from(self.total_quantity))
        };
        self.refresh_price(price, false);
    }

    /// # Logic
    /// 减仓：总量与可卖量同步扣减，均价不变，成本按均价等比缩减。
    /// 调用方必须已校验 `quantity <= available_quantity`。
    pub fn apply_sell(&mut self, quantity: i64, price: Decimal) {
        self.total_quantity -= quantity;
        self.available_quantity -= quantity;
        self.cost_value = round_cny(self.avg_cost * Decimal::from(self.total_quantity));
        self.refresh_price(price, false);
    }

    /// # Logic
    /// 以给定价格刷新市值与浮动盈亏。`stale` 标记该价格是否为陈旧回退值。
    pub fn refresh_price(&mut self, price: Decimal, stale: bool) {
        self.current_price = price;
        self.price_stale = stale;
        self.market_value = round_cny(Decimal::from(self.total_quantity) * price);
        self.unrealized_pnl = round_cny(self.market_value - self.cost_value);
        self.unrealized_pnl_rate = if self.cost_value.is_zero() {
            Decimal::ZERO
        } else {
            round_dp4(self.unrealized_pnl / self.cost_value)
        };
    }
}

/// # Summary
/// 成交流水，一笔成功委托恰好一条，仅追加。
/// `settlement_date` 为 T+1 解禁日（成交本地日 + 1 自然日），
/// `settled_at` 为结算任务的处理标记，其余字段成交后不可变。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradeRecord {
    /// 引擎生成的全局唯一成交 ID
    pub trade_id: TradeId,
    /// 归属用户
    pub user_id: UserId,
    /// 股票代码
    pub stock_code: String,
    /// 买卖方向
    pub trade_type: TradeType,
    /// 委托类型
    pub order_type: OrderType,
    /// 成交数量
    pub quantity: i64,
    /// 成交价
    pub price: Decimal,
    /// 成交金额 = quantity × price
    pub amount: Decimal,
    /// 佣金
    pub commission: Decimal,
    /// 印花税（仅卖出）
    pub stamp_tax: Decimal,
    /// 过户费（仅沪市）
    pub transfer_fee: Decimal,
    /// 滑点成本
    pub slippage: Decimal,
    /// 买入为 amount + 费用合计；卖出为费用合计
    pub total_cost: Decimal,
    /// 委托来源
    pub trade_source: TradeSource,
    /// 来源为策略时的策略名
    pub strategy_name: Option<String>,
    /// 成交时间
    pub trade_time: DateTime<Utc>,
    /// T+1 解禁日期
    pub settlement_date: NaiveDate,
    /// 流水状态
    pub status: TradeStatus,
    /// 结算任务处理时间；None 表示尚未结算（卖出流水恒为 None）
    pub settled_at: Option<DateTime<Utc>>,
}

/// # Summary
/// 账户每日快照，(user_id, snapshot_date) 唯一，由日终估值任务 upsert。
/// 只读历史序列，用于收益曲线。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccountDailySnapshot {
    pub user_id: UserId,
    /// 快照归属的交易日
    pub snapshot_date: NaiveDate,
    pub total_assets: Decimal,
    pub available_cash: Decimal,
    pub total_market_value: Decimal,
    pub daily_return: Decimal,
    pub daily_return_rate: Decimal,
    pub total_return: Decimal,
    pub total_return_rate: Decimal,
    /// 快照时点的持仓只数
    pub position_count: i64,
    /// 快照时点的累计成交笔数
    pub trade_count: i64,
}

/// # Summary
/// 买入请求。`price` 为 None 表示市价单，Some 表示限价单。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuyRequest {
    // 股票代码（支持 "600519" 或 "300750.SZ" 两种写法）
    pub stock_code: String,
    // 买入数量，须为所属板块一手数量的正整数倍
    pub quantity: i64,
    // 限价；None 按市价成交
    pub price: Option<Decimal>,
}

/// # Summary
/// 卖出请求。`price` 为 None 表示市价单，Some 表示限价单。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SellRequest {
    // 股票代码
    pub stock_code: String,
    // 卖出数量，须为所属板块一手数量的正整数倍
    pub quantity: i64,
    // 限价；None 按市价成交
    pub price: Option<Decimal>,
}

impl BuyRequest {
    pub fn order_type(&self) -> OrderType {
        if self.price.is_some() { OrderType::Limit } else { OrderType::Market }
    }
}

impl SellRequest {
    pub fn order_type(&self) -> OrderType {
        if self.price.is_some() { OrderType::Limit } else { OrderType::Market }
    }
}

/// # Summary
/// 策略产出的抽象交易意图。引擎将其映射到与手动下单完全相同的
/// 买卖路径，仅额外打上 `TradeSource::Strategy` 标记与策略名。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StrategySignal {
    // 买卖方向
    pub action: TradeType,
    // 股票代码
    pub stock_code: String,
    // 委托数量
    pub quantity: i64,
    // 限价；None 按市价
    pub price: Option<Decimal>,
    // 策略给出的信号理由（仅记录日志，不参与校验）
    pub reason: String,
    // 策略名称，写入流水
    pub strategy_name: String,
}

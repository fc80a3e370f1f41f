use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Days, NaiveDate, Utc};
use mogi_core::common::TimeProvider;
use mogi_core::common::money::round_cny;
use mogi_core::config::EngineConfig;
use mogi_core::market::entity::{Board, Exchange, LimitBand, StockMeta};
use mogi_core::market::port::PriceOracle;
use mogi_core::store::port::{BrokerStore, Page, PositionPatch, TradeCommit, TradeFilter};
use mogi_core::trade::entity::{
    Account, BuyRequest, OrderType, Position, SellRequest, StrategySignal, TradeId, TradeRecord,
    TradeSource, TradeStatus, TradeType, UserId,
};
use mogi_core::trade::port::{TradeError, TradePort};
use rust_decimal::Decimal;
use tracing::{info, warn};
use uuid::Uuid;

use crate::locks::AccountLocks;
use crate::valuation::refreshed_market_value;

/// 三个下单入口归一化后的内部委托意图
struct OrderIntent {
    stock_code: String,
    quantity: i64,
    price: Option<Decimal>,
    side: TradeType,
    source: TradeSource,
    strategy_name: Option<String>,
}

impl OrderIntent {
    fn order_type(&self) -> OrderType {
        if self.price.is_some() { OrderType::Limit } else { OrderType::Market }
    }
}

/// # Summary
/// 模拟盘交易引擎，`TradePort` 的唯一实现。
/// 委托走"校验 → 计费 → 变更 → 单事务落库"四步，校验得出的错误在任何
/// 状态变更之前返回，被拒绝的委托不会留下任何痕迹。
///
/// # Invariants
/// - 同一用户的校验-提交序列全程持有 `AccountLocks` 中对应的互斥锁，
///   并发委托串行生效，`available_cash` / `total_quantity` 不会丢失更新。
/// - 行情调用失败一律折算为 `PriceUnavailable` 返回，不在临界区内重试。
/// - 存储层失败时整个校验-提交序列基于最新状态重跑，至多
///   `commit_retries` 次，耗尽后以 `Internal` 上抛。
pub struct TradeService {
    store: Arc<dyn BrokerStore>,
    oracle: Arc<dyn PriceOracle>,
    clock: Arc<dyn TimeProvider>,
    locks: Arc<AccountLocks>,
    config: EngineConfig,
}

impl TradeService {
    pub fn new(
        store: Arc<dyn BrokerStore>,
        oracle: Arc<dyn PriceOracle>,
        clock: Arc<dyn TimeProvider>,
        locks: Arc<AccountLocks>,
        config: EngineConfig,
    ) -> Arc<Self> {
        Arc::new(Self {
            store,
            oracle,
            clock,
            locks,
            config,
        })
    }

    fn next_trade_id() -> TradeId {
        TradeId(Uuid::new_v4().to_string())
    }

    /// T+1 解禁日 = 成交本地日 + 1 自然日（遇非交易日由结算任务顺延处理）
    fn settlement_date_for(&self, now: DateTime<Utc>) -> NaiveDate {
        let trade_date = self.config.local_date(now);
        trade_date.checked_add_days(Days::new(1)).unwrap_or(trade_date)
    }

    fn ensure_active(&self, account: &Account) -> Result<(), TradeError> {
        if !account.is_active() {
            return Err(TradeError::AccountFrozen(account.user_id.0.clone()));
        }
        Ok(())
    }

    fn ensure_session(&self, now: DateTime<Utc>) -> Result<(), TradeError> {
        if !self.config.enforce_trading_hours {
            return Ok(());
        }
        let local = self.config.local_datetime(now);
        if !self.config.session.contains(local.time()) {
            return Err(TradeError::OutsideTradingHours(format!(
                "当前本地时间 {}",
                local.time().format("%H:%M:%S")
            )));
        }
        Ok(())
    }

    fn ensure_lot(&self, board: Board, quantity: i64) -> Result<(), TradeError> {
        if quantity <= 0 {
            return Err(TradeError::InvalidQuantity(format!(
                "委托数量必须为正整数: {}",
                quantity
            )));
        }
        let lot = board.lot_size();
        if quantity % lot != 0 {
            return Err(TradeError::InvalidQuantity(format!(
                "委托数量 {} 不是一手 {} 股的整数倍",
                quantity, lot
            )));
        }
        Ok(())
    }

    /// 行情元数据缺失或行情源故障统一折算为 `PriceUnavailable`
    async fn fetch_meta(&self, stock_code: &str) -> Result<StockMeta, TradeError> {
        match self.oracle.stock_meta(stock_code).await {
            Ok(Some(meta)) => Ok(meta),
            Ok(None) => Err(TradeError::PriceUnavailable(format!(
                "无该证券的基础信息: {}",
                stock_code
            ))),
            Err(e) => Err(TradeError::PriceUnavailable(format!(
                "行情源异常 ({}): {}",
                stock_code, e
            ))),
        }
    }

    async fn fetch_latest(&self, stock_code: &str) -> Result<Decimal, TradeError> {
        match self.oracle.latest_price(stock_code).await {
            Ok(Some(price)) => Ok(price),
            Ok(None) => Err(TradeError::PriceUnavailable(format!(
                "无最新行情: {}",
                stock_code
            ))),
            Err(e) => Err(TradeError::PriceUnavailable(format!(
                "行情源异常 ({}): {}",
                stock_code, e
            ))),
        }
    }

    fn ensure_within_band(
        &self,
        board: Board,
        meta: &StockMeta,
        price: Decimal,
    ) -> Result<(), TradeError> {
        let band = LimitBand::compute(board, meta.is_st, meta.pre_close);
        if !band.contains(price) {
            return Err(TradeError::PriceOutOfLimitBand {
                price,
                lower: band.lower,
                upper: band.upper,
            });
        }
        Ok(())
    }

    /// 读取账户，不存在则以给定（或配置默认）资金开户。须在持锁状态下调用。
    async fn load_or_open(
        &self,
        user: &UserId,
        initial_capital: Option<Decimal>,
        now: DateTime<Utc>,
    ) -> Result<Account, TradeError> {
        if let Some(account) = self.store.get_account(user).await? {
            return Ok(account);
        }
        let capital = initial_capital.unwrap_or(self.config.initial_capital);
        let account = Account::open(user.clone(), capital, now);
        self.store.save_account(&account).await?;
        info!("开户完成: {} 初始资金 {}", user.0, capital);
        Ok(account)
    }

    /// # Logic
    /// 持锁 → 校验-提交序列；仅存储层失败触发整体重跑（重新读取最新状态），
    /// 校验失败原样返回且绝不重试。
    async fn place_order(&self, user: &UserId, intent: OrderIntent) -> Result<TradeId, TradeError> {
        let _guard = self.locks.acquire(user).await;

        let mut attempt = 0u32;
        loop {
            match self.try_place(user, &intent).await {
                Ok(trade_id) => return Ok(trade_id),
                Err(TradeError::Store(e)) if attempt < self.config.commit_retries => {
                    attempt += 1;
                    warn!(
                        "委托落库失败，整体重试 {}/{}: {}",
                        attempt, self.config.commit_retries, e
                    );
                }
                Err(TradeError::Store(e)) => {
                    return Err(TradeError::Internal(format!(
                        "委托在 {} 次重试后仍未落库: {}",
                        self.config.commit_retries, e
                    )));
                }
                Err(other) => return Err(other),
            }
        }
    }

    async fn try_place(&self, user: &UserId, intent: &OrderIntent) -> Result<TradeId, TradeError> {
        let now = self.clock.now();
        let mut account = self.load_or_open(user, None, now).await?;
        self.ensure_active(&account)?;
        self.ensure_session(now)?;

        let board = Board::classify(&intent.stock_code);
        let market = Exchange::classify(&intent.stock_code);
        self.ensure_lot(board, intent.quantity)?;

        match intent.side {
            TradeType::Buy => {
                self.place_buy(user, intent, &mut account, board, market, now)
                    .await
            }
            TradeType::Sell => {
                self.place_sell(user, intent, &mut account, board, market, now)
                    .await
            }
        }
    }

    /// # Logic
    /// 1. 取元数据与最新行情（两种单型都要求行情存活）；限价单校验
    ///    涨跌停区间并按限价成交，市价单按最新价成交。
    /// 2. amount = 数量 × 价格；费用 = 计费器(amount, BUY, 市场)；
    ///    总成本 = amount + 费用合计。
    /// 3. 可用资金 < 总成本 → `InsufficientFunds`。
    /// 4. 总成本 > 成交前总资产 × 单票上限比例 → `PositionConcentrationExceeded`。
    /// 5. 持仓加权平均加仓（当日买入不入可卖），扣减现金，重估账户，单事务提交。
    async fn place_buy(
        &self,
        user: &UserId,
        intent: &OrderIntent,
        account: &mut Account,
        board: Board,
        market: Exchange,
        now: DateTime<Utc>,
    ) -> Result<TradeId, TradeError> {
        let meta = self.fetch_meta(&intent.stock_code).await?;
        // 限价委托同样要求行情存活，成交价仍取限价
        let latest = self.fetch_latest(&intent.stock_code).await?;
        let price = match intent.price {
            Some(limit) => {
                self.ensure_within_band(board, &meta, limit)?;
                limit
            }
            None => latest,
        };

        let amount = round_cny(Decimal::from(intent.quantity) * price);
        let fees = self.config.fees.calculate(amount, TradeType::Buy, market);
        let total_cost = round_cny(amount + fees.total());

        if account.available_cash < total_cost {
            return Err(TradeError::InsufficientFunds {
                required: total_cost,
                available: account.available_cash,
            });
        }
        // 集中度校验以成交前总资产为基数，等于上限放行
        let cap = round_cny(account.total_assets * self.config.max_position_ratio);
        if total_cost > cap {
            return Err(TradeError::PositionConcentrationExceeded {
                cost: total_cost,
                cap,
            });
        }

        let position = match self.store.get_position(user, &intent.stock_code).await? {
            Some(mut held) => {
                held.apply_buy(intent.quantity, price, amount);
                held
            }
            None => Position::open(
                user.clone(),
                &intent.stock_code,
                meta.name.clone(),
                intent.quantity,
                price,
                amount,
                self.config.local_date(now),
            ),
        };

        account.available_cash = round_cny(account.available_cash - total_cost);
        account.trade_count += 1;

        // 其余持仓按最新行情重估（仅在内存中，行内价格归估值任务回写）
        let mut others = self.store.list_positions(user).await?;
        others.retain(|p| p.stock_code != intent.stock_code);
        let others_value = refreshed_market_value(self.oracle.as_ref(), &mut others).await;
        account.refresh_totals(round_cny(others_value + position.market_value));

        let trade = TradeRecord {
            trade_id: Self::next_trade_id(),
            user_id: user.clone(),
            stock_code: intent.stock_code.clone(),
            trade_type: TradeType::Buy,
            order_type: intent.order_type(),
            quantity: intent.quantity,
            price,
            amount,
            commission: fees.commission,
            stamp_tax: fees.stamp_tax,
            transfer_fee: fees.transfer_fee,
            slippage: fees.slippage,
            total_cost,
            trade_source: intent.source,
            strategy_name: intent.strategy_name.clone(),
            trade_time: now,
            settlement_date: self.settlement_date_for(now),
            status: TradeStatus::Filled,
            settled_at: None,
        };
        let trade_id = trade.trade_id.clone();

        self.store
            .commit_trade(&TradeCommit {
                account: account.clone(),
                position: PositionPatch::Upsert(position),
                trade,
            })
            .await?;

        info!(
            "买入成交: {} {} {} 股 @ {}，费用 {}，总成本 {}",
            user.0,
            intent.stock_code,
            intent.quantity,
            price,
            fees.total(),
            total_cost
        );
        Ok(trade_id)
    }

    /// # Logic
    /// 1. 持仓必须存在；委托量先对总量（`InsufficientShares`）、
    ///    再对可卖量（`T1LockActive`）校验，顺序不可颠倒。
    /// 2. 价格规则与买入一致：任何单型都要求有最新行情，
    ///    限价校验区间，市价按最新价成交。
    /// 3. 净回款 = amount − 费用合计；盈亏 = 净回款 − 数量 × 持仓均价。
    /// 4. 减仓后数量归零则整行删除持仓，现金加净回款，更新胜率，单事务提交。
    async fn place_sell(
        &self,
        user: &UserId,
        intent: &OrderIntent,
        account: &mut Account,
        board: Board,
        market: Exchange,
        now: DateTime<Utc>,
    ) -> Result<TradeId, TradeError> {
        let mut position = self
            .store
            .get_position(user, &intent.stock_code)
            .await?
            .ok_or_else(|| TradeError::NoPosition(intent.stock_code.clone()))?;

        if intent.quantity > position.total_quantity {
            return Err(TradeError::InsufficientShares {
                requested: intent.quantity,
                held: position.total_quantity,
            });
        }
        if intent.quantity > position.available_quantity {
            return Err(TradeError::T1LockActive {
                requested: intent.quantity,
                available: position.available_quantity,
            });
        }

        // 限价委托同样要求行情存活，成交价仍取限价
        let latest = self.fetch_latest(&intent.stock_code).await?;
        let price = match intent.price {
            Some(limit) => {
                let meta = self.fetch_meta(&intent.stock_code).await?;
                self.ensure_within_band(board, &meta, limit)?;
                limit
            }
            None => latest,
        };

        let amount = round_cny(Decimal::from(intent.quantity) * price);
        let fees = self.config.fees.calculate(amount, TradeType::Sell, market);
        let fee_total = round_cny(fees.total());
        let net_amount = round_cny(amount - fee_total);
        let cost_amount = round_cny(position.avg_cost * Decimal::from(intent.quantity));
        let pnl = round_cny(net_amount - cost_amount);

        position.apply_sell(intent.quantity, price);
        let closed_out = position.total_quantity == 0;
        let patch = if closed_out {
            PositionPatch::Remove(intent.stock_code.clone())
        } else {
            PositionPatch::Upsert(position.clone())
        };

        account.available_cash = round_cny(account.available_cash + net_amount);
        account.trade_count += 1;
        account.register_sell_outcome(pnl);

        let mut others = self.store.list_positions(user).await?;
        others.retain(|p| p.stock_code != intent.stock_code);
        let others_value = refreshed_market_value(self.oracle.as_ref(), &mut others).await;
        let kept_value = if closed_out { Decimal::ZERO } else { position.market_value };
        account.refresh_totals(round_cny(others_value + kept_value));

        let trade = TradeRecord {
            trade_id: Self::next_trade_id(),
            user_id: user.clone(),
            stock_code: intent.stock_code.clone(),
            trade_type: TradeType::Sell,
            order_type: intent.order_type(),
            quantity: intent.quantity,
            price,
            amount,
            commission: fees.commission,
            stamp_tax: fees.stamp_tax,
            transfer_fee: fees.transfer_fee,
            slippage: fees.slippage,
            total_cost: fee_total,
            trade_source: intent.source,
            strategy_name: intent.strategy_name.clone(),
            trade_time: now,
            settlement_date: self.config.local_date(now),
            status: TradeStatus::Filled,
            settled_at: None,
        };
        let trade_id = trade.trade_id.clone();

        self.store
            .commit_trade(&TradeCommit {
                account: account.clone(),
                position: patch,
                trade,
            })
            .await?;

        info!(
            "卖出成交: {} {} {} 股 @ {}，净回款 {}，盈亏 {}",
            user.0, intent.stock_code, intent.quantity, price, net_amount, pnl
        );
        Ok(trade_id)
    }
}

#[async_trait]
impl TradePort for TradeService {
    async fn init_account(
        &self,
        user: &UserId,
        initial_capital: Option<Decimal>,
    ) -> Result<Account, TradeError> {
        let _guard = self.locks.acquire(user).await;
        let now = self.clock.now();
        self.load_or_open(user, initial_capital, now).await
    }

    async fn get_account(&self, user: &UserId) -> Result<Account, TradeError> {
        let _guard = self.locks.acquire(user).await;
        let now = self.clock.now();
        self.load_or_open(user, None, now).await
    }

    async fn reset_account(&self, user: &UserId) -> Result<Account, TradeError> {
        let _guard = self.locks.acquire(user).await;
        let now = self.clock.now();
        let current = self.load_or_open(user, None, now).await?;
        // 重置只清持仓与流水，冻结状态保留，解冻走独立流程
        let mut fresh = Account::open(user.clone(), current.initial_capital, now);
        fresh.status = current.status;
        self.store.reset(user, &fresh).await?;
        info!("账户已重置: {} 初始资金 {}", user.0, fresh.initial_capital);
        Ok(fresh)
    }

    async fn execute_buy(&self, user: &UserId, request: BuyRequest) -> Result<TradeId, TradeError> {
        self.place_order(
            user,
            OrderIntent {
                stock_code: request.stock_code,
                quantity: request.quantity,
                price: request.price,
                side: TradeType::Buy,
                source: TradeSource::Manual,
                strategy_name: None,
            },
        )
        .await
    }

    async fn execute_sell(
        &self,
        user: &UserId,
        request: SellRequest,
    ) -> Result<TradeId, TradeError> {
        self.place_order(
            user,
            OrderIntent {
                stock_code: request.stock_code,
                quantity: request.quantity,
                price: request.price,
                side: TradeType::Sell,
                source: TradeSource::Manual,
                strategy_name: None,
            },
        )
        .await
    }

    async fn execute_signal(
        &self,
        user: &UserId,
        signal: StrategySignal,
    ) -> Result<TradeId, TradeError> {
        info!(
            "收到策略信号: [{}] {} {} {} 股，理由: {}",
            signal.strategy_name, signal.action, signal.stock_code, signal.quantity, signal.reason
        );
        self.place_order(
            user,
            OrderIntent {
                stock_code: signal.stock_code,
                quantity: signal.quantity,
                price: signal.price,
                side: signal.action,
                source: TradeSource::Strategy,
                strategy_name: Some(signal.strategy_name),
            },
        )
        .await
    }

    async fn get_positions(&self, user: &UserId) -> Result<Vec<Position>, TradeError> {
        Ok(self.store.list_positions(user).await?)
    }

    async fn trade_history(
        &self,
        user: &UserId,
        filter: &TradeFilter,
        page: &Page,
    ) -> Result<(Vec<TradeRecord>, u64), TradeError> {
        Ok(self.store.history(user, filter, page).await?)
    }
}

use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use mogi_core::common::FakeClockProvider;
use mogi_core::config::EngineConfig;
use mogi_core::market::entity::StockMeta;
use mogi_core::store::port::{AccountStore, Page, PositionStore, TradeFilter};
use mogi_core::testkit::FakePriceOracle;
use mogi_core::trade::entity::{
    AccountStatus, BuyRequest, OrderType, SellRequest, StrategySignal, TradeSource, TradeType,
    UserId,
};
use mogi_core::trade::port::{TradeError, TradePort};
use mogi_store::memory::MemoryBrokerStore;
use mogi_trade::locks::AccountLocks;
use mogi_trade::service::TradeService;
use mogi_trade::settlement::SettlementJob;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tokio::time::{Duration as TokioDuration, sleep};

struct Harness {
    store: Arc<MemoryBrokerStore>,
    oracle: Arc<FakePriceOracle>,
    clock: Arc<FakeClockProvider>,
    locks: Arc<AccountLocks>,
    service: Arc<TradeService>,
}

fn harness_with(config: EngineConfig) -> Harness {
    let store = Arc::new(MemoryBrokerStore::new());
    let oracle = Arc::new(FakePriceOracle::new());
    // 2024-06-03 周一 10:00 北京时间，处于早盘连续竞价时段
    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 2, 0, 0).unwrap(),
    ));
    let locks = Arc::new(AccountLocks::new());
    let service = TradeService::new(
        store.clone(),
        oracle.clone(),
        clock.clone(),
        locks.clone(),
        config,
    );
    Harness { store, oracle, clock, locks, service }
}

fn harness() -> Harness {
    harness_with(EngineConfig::default())
}

fn listed(h: &Harness, code: &str, name: &str, pre_close: Decimal, latest: Decimal) {
    h.oracle.set_meta(StockMeta {
        code: code.to_string(),
        name: name.to_string(),
        pre_close,
        is_st: false,
    });
    h.oracle.set_price(code, latest);
}

#[tokio::test]
async fn buy_lifecycle_follows_fee_and_t1_rules() {
    let h = harness();
    let user = UserId("zhang_san".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    h.service.init_account(&user, Some(dec!(3000000))).await.unwrap();

    // 买入 1000 股 @ 10.00（市价）：
    // 金额 10,000；佣金 max(10000×0.0001, 5) = 5；印花税 0（买入）；
    // 过户费 0（深市）；滑点 10000×0.001 = 10；总成本 10,015
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    let account = h.service.get_account(&user).await.unwrap();
    assert_eq!(account.available_cash, dec!(2989985.00), "现金应扣除含费总成本 10015");
    assert_eq!(account.total_market_value, dec!(10000.00));
    assert_eq!(account.total_assets, dec!(2999985.00));
    assert_eq!(
        account.total_assets,
        account.available_cash + account.frozen_cash + account.total_market_value,
        "资产恒等式被破坏"
    );
    assert_eq!(account.trade_count, 1);

    let positions = h.service.get_positions(&user).await.unwrap();
    assert_eq!(positions.len(), 1);
    let held = &positions[0];
    assert_eq!(held.stock_name, "平安银行");
    assert_eq!(held.total_quantity, 1000);
    assert_eq!(held.available_quantity, 0, "当日买入股份应处于 T+1 锁定");
    assert_eq!(held.avg_cost, dec!(10.0000));

    // 当日即卖：可卖为 0，总量足够也必须拒绝
    let same_day = h
        .service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 500, price: None },
        )
        .await;
    assert!(
        matches!(same_day, Err(TradeError::T1LockActive { requested: 500, available: 0 })),
        "当日买入当日卖出应被 T+1 拦截"
    );

    // 次日结算任务解禁全部 1000 股
    h.clock.advance(Duration::days(1));
    let settlement = SettlementJob::new(
        h.store.clone(),
        h.clock.clone(),
        h.locks.clone(),
        EngineConfig::default(),
    );
    let report = settlement.run().await.unwrap();
    assert_eq!(report.settled_trades, 1);
    assert_eq!(report.released_shares, 1000);

    let held = h.store.get_position(&user, "000001").await.unwrap().unwrap();
    assert_eq!(held.available_quantity, 1000, "结算后当日买入应全部解禁");

    // 行情走到 11.00 后清仓：金额 11,000；佣金 5；印花税 11；滑点 11；
    // 费用合计 27；净回款 10,973；成本 1000×10 = 10,000；盈亏 +973
    h.oracle.set_price("000001", dec!(11.00));
    h.service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    let account = h.service.get_account(&user).await.unwrap();
    assert_eq!(account.available_cash, dec!(3000958.00), "现金应加上净回款 10973");
    assert_eq!(account.total_market_value, Decimal::ZERO);
    assert_eq!(account.total_assets, dec!(3000958.00));
    assert_eq!(account.trade_count, 2);
    assert_eq!(account.profit_trades, 1, "盈利平仓应计入胜率分子");
    assert_eq!(account.loss_trades, 0);
    assert_eq!(account.win_rate, dec!(1.0000));

    assert!(
        h.service.get_positions(&user).await.unwrap().is_empty(),
        "清仓后持仓行应被整行删除"
    );

    let (trades, total) = h
        .service
        .trade_history(&user, &TradeFilter::default(), &Page::default())
        .await
        .unwrap();
    assert_eq!(total, 2);
    let sell = &trades[0];
    assert_eq!(sell.trade_type, TradeType::Sell);
    assert_eq!(sell.amount, dec!(11000.00));
    assert_eq!(sell.stamp_tax, dec!(11.00));
    assert_eq!(sell.total_cost, dec!(27.00), "卖出流水 total_cost 应为费用合计");
    let buy = &trades[1];
    assert_eq!(buy.trade_type, TradeType::Buy);
    assert_eq!(buy.commission, dec!(5.00));
    assert_eq!(buy.stamp_tax, Decimal::ZERO);
    assert_eq!(buy.transfer_fee, Decimal::ZERO);
    assert_eq!(buy.slippage, dec!(10.00));
    assert_eq!(buy.total_cost, dec!(10015.00));
}

#[tokio::test]
async fn break_even_sell_counts_as_profitable_close() {
    let h = harness();
    let user = UserId("he_shi_ba".to_string());
    listed(&h, "000001", "平安银行", dec!(9.98), dec!(9.975));

    h.service.init_account(&user, Some(dec!(100000))).await.unwrap();

    // 买入 1000 股 @ 9.975：金额 9,975；佣金 5；滑点 9.98；总成本 9,989.98；
    // 均价 9.9750
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    h.clock.advance(Duration::days(1));
    let settlement = SettlementJob::new(
        h.store.clone(),
        h.clock.clone(),
        h.locks.clone(),
        EngineConfig::default(),
    );
    settlement.run().await.unwrap();

    // 卖出 1000 股 @ 10.00：金额 10,000；费用 5 + 10 + 10 = 25；
    // 净回款 9,975 = 成本 1000 × 9.9750，盈亏恰好为 0
    h.oracle.set_price("000001", dec!(10.00));
    h.service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    let account = h.service.get_account(&user).await.unwrap();
    assert_eq!(account.profit_trades, 1, "保本平仓应计入盈利笔数");
    assert_eq!(account.loss_trades, 0, "保本平仓不得计入亏损笔数");
    assert_eq!(account.win_rate, dec!(1.0000));
    // 毛价差 25.00 恰好抵掉卖出费用，现金只比期初少买入费用 14.98
    assert_eq!(account.available_cash, dec!(99985.02));
}

#[tokio::test]
async fn lot_sizes_follow_board_classification() {
    let h = harness();
    let user = UserId("li_si".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));
    listed(&h, "688001", "华兴源创", dec!(50.00), dec!(50.00));

    let odd = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 150, price: None },
        )
        .await;
    assert!(matches!(odd, Err(TradeError::InvalidQuantity(_))), "主板 150 股不是整手");

    let zero = h
        .service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 0, price: None },
        )
        .await;
    assert!(matches!(zero, Err(TradeError::InvalidQuantity(_))), "0 股委托必须拒绝");

    // 科创板一手 200 股
    let sub_lot = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "688001".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(sub_lot, Err(TradeError::InvalidQuantity(_))));
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "688001".to_string(), quantity: 200, price: None },
        )
        .await
        .unwrap();

    // 主板恰好一手
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn limit_price_band_is_inclusive_at_edges() {
    let h = harness();
    let user = UserId("wang_wu".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    // 主板 ±10%：昨收 10.00 的区间为 [9.00, 11.00]，上沿恰好可成交
    h.service
        .execute_buy(
            &user,
            BuyRequest {
                stock_code: "000001".to_string(),
                quantity: 100,
                price: Some(dec!(11.00)),
            },
        )
        .await
        .unwrap();

    // 再贵一分即拒
    let over = h
        .service
        .execute_buy(
            &user,
            BuyRequest {
                stock_code: "000001".to_string(),
                quantity: 100,
                price: Some(dec!(11.01)),
            },
        )
        .await;
    match over {
        Err(TradeError::PriceOutOfLimitBand { price, lower, upper }) => {
            assert_eq!(price, dec!(11.01));
            assert_eq!(lower, dec!(9.00));
            assert_eq!(upper, dec!(11.00));
        }
        other => panic!("期待涨跌停拒绝，得到 {:?}", other),
    }

    let under = h
        .service
        .execute_buy(
            &user,
            BuyRequest {
                stock_code: "000001".to_string(),
                quantity: 100,
                price: Some(dec!(8.99)),
            },
        )
        .await;
    assert!(matches!(under, Err(TradeError::PriceOutOfLimitBand { .. })));

    // ST 股收紧到 ±5%
    h.oracle.set_meta(StockMeta {
        code: "000004".to_string(),
        name: "ST 国华".to_string(),
        pre_close: dec!(10.00),
        is_st: true,
    });
    h.oracle.set_price("000004", dec!(10.00));
    h.service
        .execute_buy(
            &user,
            BuyRequest {
                stock_code: "000004".to_string(),
                quantity: 100,
                price: Some(dec!(10.50)),
            },
        )
        .await
        .unwrap();
    let st_over = h
        .service
        .execute_buy(
            &user,
            BuyRequest {
                stock_code: "000004".to_string(),
                quantity: 100,
                price: Some(dec!(10.51)),
            },
        )
        .await;
    assert!(matches!(st_over, Err(TradeError::PriceOutOfLimitBand { .. })), "ST 股超出 ±5% 应拒绝");
}

#[tokio::test]
async fn concentration_cap_rejects_without_any_mutation() {
    let h = harness();
    let user = UserId("zhao_liu".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));
    h.service.init_account(&user, None).await.unwrap();

    // 默认初始资金 1,000,000，上限 20% = 200,000；
    // 20,100 股 @ 10.00 含费总成本 201,221.10，超限
    let result = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 20100, price: None },
        )
        .await;
    match result {
        Err(TradeError::PositionConcentrationExceeded { cost, cap }) => {
            assert_eq!(cap, dec!(200000.00));
            assert_eq!(cost, dec!(201221.10));
        }
        other => panic!("期待集中度拒绝，得到 {:?}", other),
    }

    // 被拒绝的委托不得留下任何痕迹
    let account = h.service.get_account(&user).await.unwrap();
    assert_eq!(account.available_cash, dec!(1000000), "拒绝委托不得动用资金");
    assert_eq!(account.trade_count, 0);
    assert!(h.service.get_positions(&user).await.unwrap().is_empty());
    let (_, total) = h
        .service
        .trade_history(&user, &TradeFilter::default(), &Page::default())
        .await
        .unwrap();
    assert_eq!(total, 0, "拒绝委托不得写入流水");

    // 恰好压在上限则放行：初始资金 1,001,100 时上限为 200,220，
    // 20,000 股 @ 10.00 的含费总成本恰为 200,000 + 20 + 200 = 200,220
    let exact = UserId("qian_qi".to_string());
    h.service.init_account(&exact, Some(dec!(1001100))).await.unwrap();
    h.service
        .execute_buy(
            &exact,
            BuyRequest { stock_code: "000001".to_string(), quantity: 20000, price: None },
        )
        .await
        .unwrap();
}

#[tokio::test]
async fn concurrent_buys_never_double_spend() {
    // 集中度上限放开到 100%，单独考察并发下的资金判定
    let config = EngineConfig { max_position_ratio: dec!(1), ..EngineConfig::default() };
    let h = harness_with(config);
    let user = UserId("sun_ba".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    // 15,000 资金：单笔总成本 10,015 可单独承受，两笔合计 20,030 必然超支
    h.service.init_account(&user, Some(dec!(15000))).await.unwrap();

    let mut handles = Vec::new();
    for _ in 0..2 {
        let service = h.service.clone();
        let uid = user.clone();
        handles.push(tokio::spawn(async move {
            service
                .execute_buy(
                    &uid,
                    BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
                )
                .await
        }));
    }

    let mut filled = 0;
    let mut rejected = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => filled += 1,
            Err(TradeError::InsufficientFunds { .. }) => rejected += 1,
            Err(other) => panic!("意外错误: {:?}", other),
        }
    }
    assert_eq!(filled, 1, "两笔并发委托必须恰好成交一笔");
    assert_eq!(rejected, 1, "另一笔必须因资金不足被拒");

    let account = h.service.get_account(&user).await.unwrap();
    assert_eq!(account.available_cash, dec!(4985.00), "资金不得被双花");
    assert_eq!(account.trade_count, 1);
    let positions = h.service.get_positions(&user).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].total_quantity, 1000, "持仓不得被重复累加");
}

#[tokio::test]
async fn high_concurrency_buys_serialize_per_account() {
    let h = harness();
    let user = UserId("ma_jiu".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));
    h.service.init_account(&user, None).await.unwrap();

    // 并发抛入 20 张市价买单，每张 100 股 @ 10.00。
    // 单张成本: 1,000 + 佣金 5 + 滑点 1 = 1,006；20 张合计 20,120。
    // 终态现金应为 1,000,000 - 20,120 = 979,880，持仓 2,000 股。
    let mut handles = Vec::new();
    for i in 0..20 {
        let service = h.service.clone();
        let uid = user.clone();
        handles.push(tokio::spawn(async move {
            // 稍作打乱执行时序
            if i % 3 == 0 {
                sleep(TokioDuration::from_millis(1)).await;
            }
            let res = service
                .execute_buy(
                    &uid,
                    BuyRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
                )
                .await;
            assert!(res.is_ok());
        }));
    }
    for handle in handles {
        handle.await.unwrap();
    }

    let account = h.service.get_account(&user).await.unwrap();
    assert_eq!(account.available_cash, dec!(979880.00), "资金划转必须读写一致无丢失");
    assert_eq!(account.total_market_value, dec!(20000.00));
    assert_eq!(account.trade_count, 20);

    let positions = h.service.get_positions(&user).await.unwrap();
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].total_quantity, 2000, "净持仓应为 20 × 100 股");
    assert_eq!(positions[0].avg_cost, dec!(10.0000));

    let (_, total) = h
        .service
        .trade_history(&user, &TradeFilter::default(), &Page::default())
        .await
        .unwrap();
    assert_eq!(total, 20, "每张委托都应留下一条流水");
}

#[tokio::test]
async fn frozen_account_rejects_orders_but_not_queries() {
    let h = harness();
    let user = UserId("zhou_shi".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    let mut account = h.service.init_account(&user, None).await.unwrap();
    account.status = AccountStatus::Frozen;
    h.store.save_account(&account).await.unwrap();

    let buy = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(buy, Err(TradeError::AccountFrozen(_))), "冻结账户必须拒绝委托");

    // 查询路径不受冻结影响
    let snapshot = h.service.get_account(&user).await.unwrap();
    assert_eq!(snapshot.status, AccountStatus::Frozen);
    assert!(h.service.get_positions(&user).await.unwrap().is_empty());
}

#[tokio::test]
async fn orders_outside_trading_session_are_rejected() {
    let h = harness();
    let user = UserId("wu_shi_yi".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    // 12:00 北京时间处于午间休市
    h.clock.set_time(Utc.with_ymd_and_hms(2024, 6, 3, 4, 0, 0).unwrap());
    let lunch = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(lunch, Err(TradeError::OutsideTradingHours(_))), "午间休市应拒单");

    // 15:00:00 收盘边界仍可成交
    h.clock.set_time(Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 0).unwrap());
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
        )
        .await
        .unwrap();

    // 15:00:01 起拒绝
    h.clock.set_time(Utc.with_ymd_and_hms(2024, 6, 3, 7, 0, 1).unwrap());
    let late = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(late, Err(TradeError::OutsideTradingHours(_))));
}

#[tokio::test]
async fn missing_quotes_surface_price_unavailable() {
    let h = harness();
    let user = UserId("zheng_shi_er".to_string());

    // 行情层不认识该代码
    let unknown = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "600519".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(unknown, Err(TradeError::PriceUnavailable(_))), "无基础信息应拒单");

    // 有基础信息但无最新价，市价单同样无法成交
    h.oracle.set_meta(StockMeta {
        code: "600519".to_string(),
        name: "贵州茅台".to_string(),
        pre_close: dec!(1700.00),
        is_st: false,
    });
    let no_quote = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "600519".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(no_quote, Err(TradeError::PriceUnavailable(_))));

    // 限价单同样以行情存活为前提：区间合法的限价在无最新价时也不得成交
    let limit_no_quote = h
        .service
        .execute_buy(
            &user,
            BuyRequest {
                stock_code: "600519".to_string(),
                quantity: 100,
                price: Some(dec!(1700.00)),
            },
        )
        .await;
    assert!(
        matches!(limit_no_quote, Err(TradeError::PriceUnavailable(_))),
        "无最新价时限价单也应拒单"
    );

    // 行情源整体故障：限价单取元数据时即失败
    h.oracle.set_offline(true);
    let offline = h
        .service
        .execute_buy(
            &user,
            BuyRequest {
                stock_code: "600519".to_string(),
                quantity: 100,
                price: Some(dec!(1700.00)),
            },
        )
        .await;
    assert!(matches!(offline, Err(TradeError::PriceUnavailable(_))), "行情故障应折算为拒单");
}

#[tokio::test]
async fn sell_validation_checks_total_shares_before_t1_lock() {
    let h = harness();
    let user = UserId("feng_shi_san".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    let none = h
        .service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(none, Err(TradeError::NoPosition(_))), "空仓卖出应报无持仓");

    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    // 超过总持仓报持仓不足，而非 T+1 锁定
    let too_many = h
        .service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 1500, price: None },
        )
        .await;
    assert!(
        matches!(too_many, Err(TradeError::InsufficientShares { requested: 1500, held: 1000 })),
        "超过总量应报 InsufficientShares"
    );

    // 不超总量但超可卖量才是 T+1 锁定
    let locked = h
        .service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await;
    assert!(matches!(locked, Err(TradeError::T1LockActive { requested: 1000, available: 0 })));
}

#[tokio::test]
async fn strategy_signals_share_the_manual_order_path() {
    let h = harness();
    let user = UserId("chen_shi_si".to_string());
    listed(&h, "300750", "宁德时代", dec!(200.00), dec!(200.00));

    h.service
        .execute_signal(
            &user,
            StrategySignal {
                action: TradeType::Buy,
                stock_code: "300750".to_string(),
                quantity: 100,
                price: None,
                reason: "MACD 金叉".to_string(),
                strategy_name: "macd_cross".to_string(),
            },
        )
        .await
        .unwrap();

    let (trades, total) = h
        .service
        .trade_history(&user, &TradeFilter::default(), &Page::default())
        .await
        .unwrap();
    assert_eq!(total, 1);
    assert_eq!(trades[0].trade_source, TradeSource::Strategy);
    assert_eq!(trades[0].strategy_name.as_deref(), Some("macd_cross"), "流水应带上策略名");
    assert_eq!(trades[0].order_type, OrderType::Market);

    // 信号与手动共用同一校验路径：创业板一手 100 股，30 股被拦
    let odd = h
        .service
        .execute_signal(
            &user,
            StrategySignal {
                action: TradeType::Sell,
                stock_code: "300750".to_string(),
                quantity: 30,
                price: None,
                reason: "止盈".to_string(),
                strategy_name: "macd_cross".to_string(),
            },
        )
        .await;
    assert!(matches!(odd, Err(TradeError::InvalidQuantity(_))), "策略信号同样受手数约束");
}

#[tokio::test]
async fn reset_restores_cash_and_purges_history() {
    let h = harness();
    let user = UserId("han_shi_wu".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    h.service.init_account(&user, Some(dec!(500000))).await.unwrap();
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    let fresh = h.service.reset_account(&user).await.unwrap();
    assert_eq!(fresh.available_cash, dec!(500000), "重置应回到初始资金");
    assert_eq!(fresh.initial_capital, dec!(500000));
    assert_eq!(fresh.trade_count, 0);

    assert!(h.service.get_positions(&user).await.unwrap().is_empty(), "重置后持仓应清空");
    let (_, total) = h
        .service
        .trade_history(&user, &TradeFilter::default(), &Page::default())
        .await
        .unwrap();
    assert_eq!(total, 0, "重置后流水应清空");

    let reloaded = h.service.get_account(&user).await.unwrap();
    assert_eq!(reloaded.available_cash, dec!(500000));
}

#[tokio::test]
async fn reset_preserves_frozen_status() {
    let h = harness();
    let user = UserId("guo_shi_qi".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));

    h.service.init_account(&user, Some(dec!(500000))).await.unwrap();
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    let mut account = h.service.get_account(&user).await.unwrap();
    account.status = AccountStatus::Frozen;
    h.store.save_account(&account).await.unwrap();

    // 重置清掉持仓与流水，但不解冻
    let fresh = h.service.reset_account(&user).await.unwrap();
    assert_eq!(fresh.status, AccountStatus::Frozen, "重置不得顺带解冻账户");
    assert_eq!(fresh.available_cash, dec!(500000));
    assert!(h.service.get_positions(&user).await.unwrap().is_empty());

    let reloaded = h.service.get_account(&user).await.unwrap();
    assert_eq!(reloaded.status, AccountStatus::Frozen);
    let buy = h
        .service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 100, price: None },
        )
        .await;
    assert!(matches!(buy, Err(TradeError::AccountFrozen(_))), "重置后冻结账户仍应拒单");
}

#[tokio::test]
async fn buy_revalues_other_holdings_in_account_totals() {
    let h = harness();
    let user = UserId("yang_shi_liu".to_string());
    listed(&h, "000001", "平安银行", dec!(10.00), dec!(10.00));
    listed(&h, "300750", "宁德时代", dec!(200.00), dec!(200.00));
    h.service.init_account(&user, Some(dec!(3000000))).await.unwrap();

    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    // 平安银行行情上移到 12.00 后再买宁德时代
    h.oracle.set_price("000001", dec!(12.00));
    h.service
        .execute_buy(
            &user,
            BuyRequest { stock_code: "300750".to_string(), quantity: 100, price: None },
        )
        .await
        .unwrap();

    let account = h.service.get_account(&user).await.unwrap();
    // 总市值 = 1000×12.00 + 100×200.00 = 32,000
    assert_eq!(account.total_market_value, dec!(32000.00), "账户总市值应按最新行情重估其余持仓");
    assert_eq!(account.available_cash, dec!(2969960.00));
    assert_eq!(
        account.total_assets,
        account.available_cash + account.frozen_cash + account.total_market_value
    );

    // 行内价格缓存归估值任务回写，本笔交易不触碰未参与标的的持仓行
    let bank = h.store.get_position(&user, "000001").await.unwrap().unwrap();
    assert_eq!(bank.current_price, dec!(10.00), "未成交标的的行内价格应保持不变");
}

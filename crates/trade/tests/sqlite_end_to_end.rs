use std::sync::Arc;

use chrono::{Duration, NaiveDate, TimeZone, Utc};
use mogi_core::common::FakeClockProvider;
use mogi_core::config::EngineConfig;
use mogi_core::market::entity::StockMeta;
use mogi_core::store::port::{AccountStore, Page, PositionStore, SnapshotStore, TradeFilter, TradeLedger};
use mogi_core::testkit::{FakeCalendar, FakePriceOracle};
use mogi_core::trade::entity::{BuyRequest, SellRequest, TradeType, UserId};
use mogi_core::trade::port::TradePort;
use mogi_store::shard::ShardPools;
use mogi_store::sqlite::SqliteBrokerStore;
use mogi_trade::locks::AccountLocks;
use mogi_trade::service::TradeService;
use mogi_trade::settlement::SettlementJob;
use mogi_trade::valuation::ValuationJob;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use tempfile::TempDir;

fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn store_at(dir: &TempDir) -> Arc<SqliteBrokerStore> {
    let pools = Arc::new(ShardPools::new(dir.path()).unwrap());
    Arc::new(SqliteBrokerStore::new(pools))
}

/// 完整交易日走 SQLite 分片：买入、重启、结算、卖出、估值，
/// 每一步之后的状态都必须在全新连接池下可复原。
#[tokio::test]
async fn full_trading_day_survives_process_restart() {
    let dir = TempDir::new().unwrap();
    let user = UserId("zhang_san".to_string());

    let oracle = Arc::new(FakePriceOracle::new());
    oracle.set_meta(StockMeta {
        code: "000001".to_string(),
        name: "平安银行".to_string(),
        pre_close: dec!(10.00),
        is_st: false,
    });
    oracle.set_price("000001", dec!(10.00));

    // 2024-06-03 周一 10:00 北京时间
    let clock = Arc::new(FakeClockProvider::new(
        Utc.with_ymd_and_hms(2024, 6, 3, 2, 0, 0).unwrap(),
    ));

    // 第一段进程：开户并买入
    {
        let service = TradeService::new(
            store_at(&dir),
            oracle.clone(),
            clock.clone(),
            Arc::new(AccountLocks::new()),
            EngineConfig::default(),
        );
        service.init_account(&user, Some(dec!(3000000))).await.unwrap();
        service
            .execute_buy(
                &user,
                BuyRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
            )
            .await
            .unwrap();
    }

    // 第二段进程：全新连接池，次日结算后清仓卖出
    clock.advance(Duration::days(1));
    let store = store_at(&dir);
    let locks = Arc::new(AccountLocks::new());
    let settlement = SettlementJob::new(
        store.clone(),
        clock.clone(),
        locks.clone(),
        EngineConfig::default(),
    );
    let report = settlement.run().await.unwrap();
    assert_eq!(report.settled_trades, 1, "重启后结算任务应能从磁盘找回待结算流水");
    assert_eq!(report.released_shares, 1000);

    let service = TradeService::new(
        store.clone(),
        oracle.clone(),
        clock.clone(),
        locks.clone(),
        EngineConfig::default(),
    );
    oracle.set_price("000001", dec!(11.00));
    service
        .execute_sell(
            &user,
            SellRequest { stock_code: "000001".to_string(), quantity: 1000, price: None },
        )
        .await
        .unwrap();

    // 收盘后估值：持仓已清空，快照记录现金状态
    clock.set_time(Utc.with_ymd_and_hms(2024, 6, 4, 7, 30, 0).unwrap());
    let calendar = Arc::new(FakeCalendar::weekdays(date(2024, 5, 27), date(2024, 6, 14)));
    let valuation = ValuationJob::new(
        store.clone(),
        oracle.clone(),
        calendar,
        clock.clone(),
        locks.clone(),
        EngineConfig::default(),
    );
    let report = valuation.run().await.unwrap();
    assert_eq!(report.snapshots, 1);

    // 第三段进程：纯读校验全部四类数据
    let reloaded = store_at(&dir);

    let account = reloaded.get_account(&user).await.unwrap().unwrap();
    assert_eq!(account.available_cash, dec!(3000958.00), "现金状态必须完整落盘");
    assert_eq!(account.total_market_value, Decimal::ZERO);
    assert_eq!(account.trade_count, 2);
    assert_eq!(account.profit_trades, 1);
    assert_eq!(account.win_rate, dec!(1.0000));

    assert!(reloaded.list_positions(&user).await.unwrap().is_empty(), "清仓后不得残留持仓行");

    let (trades, total) = reloaded
        .history(&user, &TradeFilter::default(), &Page::default())
        .await
        .unwrap();
    assert_eq!(total, 2);
    assert_eq!(trades[0].trade_type, TradeType::Sell);
    assert_eq!(trades[0].total_cost, dec!(27.00));
    assert_eq!(trades[1].trade_type, TradeType::Buy);
    assert!(trades[1].settled_at.is_some(), "结算标记必须随流水落盘");

    let series = reloaded.snapshot_series(&user, None, None).await.unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].snapshot_date, date(2024, 6, 4));
    assert_eq!(series[0].total_assets, dec!(3000958.00));
    assert_eq!(series[0].position_count, 0);
}

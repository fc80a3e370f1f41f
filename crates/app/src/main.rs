use std::path::Path;
use std::sync::Arc;

use chrono::{NaiveDate, NaiveTime};
use mogi_core::common::{RealTimeProvider, TimeProvider};
use mogi_core::config::{AppConfig, EngineConfig, LogConfig};
use mogi_core::store::port::BrokerStore;
use mogi_market::calendar::WeekdayCalendar;
use mogi_market::oracle::QuoteBoard;
use mogi_market::seed::{apply_seed, load_seed};
use mogi_store::memory::MemoryBrokerStore;
use mogi_store::shard::ShardPools;
use mogi_store::sqlite::SqliteBrokerStore;
use mogi_trade::locks::AccountLocks;
use mogi_trade::service::TradeService;
use mogi_trade::settlement::SettlementJob;
use mogi_trade::valuation::ValuationJob;
use tokio::task::JoinHandle;
use tokio::time::{Duration, interval};
use tracing::{debug, error, info};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

/// # Summary
/// 装载应用配置。
///
/// # Logic
/// 工作目录下的 `mogi.toml`（可缺省，全部字段均有默认值），
/// 再叠加 `MOGI_` 前缀的环境变量覆盖（嵌套字段用 `__` 分隔，
/// 如 `MOGI_STORAGE__BACKEND=memory`）。
fn load_config() -> Result<AppConfig, config::ConfigError> {
    config::Config::builder()
        .add_source(config::File::with_name("mogi").required(false))
        .add_source(config::Environment::with_prefix("MOGI").separator("__"))
        .build()?
        .try_deserialize()
}

/// # Summary
/// 初始化全局日志。
///
/// # Logic
/// 过滤指令优先取配置，其次取 `RUST_LOG`，最后回落 `info`。
/// 配置了日志目录时按天滚动写文件（无 ANSI 色），返回的 guard
/// 必须在 main 存活期内持有，否则异步写线程提前退出丢日志。
fn init_tracing(log: &LogConfig) -> Option<WorkerGuard> {
    let filter = match &log.filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    match &log.dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, "mogi.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::fmt().with_env_filter(filter).init();
            None
        }
    }
}

/// # Summary
/// 日终批处理调度循环：每个本地日历日到达 `run_time` 后触发一次，
/// 先结算后估值。
///
/// # Logic
/// 30 秒轮询本地时间，用 `last_run` 去重，进程重启后当日若已过点
/// 会立即补跑一次。两个任务内部各自按账户隔离失败，这里只兜整体错误。
fn spawn_daily_jobs(
    settlement: Arc<SettlementJob>,
    valuation: Arc<ValuationJob>,
    clock: Arc<dyn TimeProvider>,
    engine: EngineConfig,
    run_time: NaiveTime,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(30));
        let mut last_run: Option<NaiveDate> = None;
        loop {
            ticker.tick().await;
            let local = engine.local_datetime(clock.now());
            if local.time() < run_time || last_run == Some(local.date()) {
                continue;
            }
            last_run = Some(local.date());
            info!("Daily jobs triggered for {}", local.date());
            if let Err(e) = settlement.run().await {
                error!("日终结算整体失败: {}", e);
            }
            if let Err(e) = valuation.run().await {
                error!("每日估值整体失败: {}", e);
            }
        }
    })
}

/// 盘中行情刷新循环：只在交易时段内刷新持仓市值缓存，不落快照。
fn spawn_intraday_refresh(
    valuation: Arc<ValuationJob>,
    clock: Arc<dyn TimeProvider>,
    engine: EngineConfig,
    every_secs: u64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = interval(Duration::from_secs(every_secs.max(1)));
        loop {
            ticker.tick().await;
            let local = engine.local_datetime(clock.now());
            if !engine.session.contains(local.time()) {
                continue;
            }
            match valuation.refresh_quotes().await {
                Ok(report) => debug!("盘中刷新完成: {} 户", report.accounts),
                Err(e) => error!("盘中刷新整体失败: {}", e),
            }
        }
    })
}

/// # Summary
/// 应用启动入口，纯粹的 DI 容器。
/// 负责实例化所有具体实现组件并通过 Arc<dyn Trait> 注入到 TradeService 与批处理任务。
///
/// # Logic
/// 1. 装载配置并初始化全局日志。
/// 2. 实例化基础设施层（Store、行情板、交易日历、时钟）。
/// 3. 构造应用服务层（TradeService）。
/// 4. 启动日终调度循环与可选的盘中刷新循环。
/// 5. 挂起等待外部信号退出。
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. 装载配置、初始化日志
    let config = load_config()?;
    let _guard = init_tracing(&config.log);
    info!("Mogi simulated broker starting...");

    // 2. 实例化基础设施层
    let store: Arc<dyn BrokerStore> = match config.storage.backend.as_str() {
        "memory" => Arc::new(MemoryBrokerStore::new()),
        _ => {
            let pools = Arc::new(ShardPools::new(&config.storage.data_dir)?);
            Arc::new(SqliteBrokerStore::new(pools))
        }
    };
    let board = Arc::new(QuoteBoard::new());
    if let Some(path) = &config.market.seed_file {
        let loaded = apply_seed(&board, load_seed(Path::new(path))?);
        info!("Loaded quote seed from {}: {} symbols", path, loaded);
    }
    let calendar = Arc::new(WeekdayCalendar::new(config.market.holidays.iter().copied()));
    let clock: Arc<dyn TimeProvider> = Arc::new(RealTimeProvider);

    // 3. 构造应用服务层（注入 Core Trait 抽象）
    let locks = Arc::new(AccountLocks::new());
    let _service = TradeService::new(
        Arc::clone(&store),
        board.clone(),
        Arc::clone(&clock),
        Arc::clone(&locks),
        config.engine.clone(),
    );

    // 4. 批处理任务与调度循环
    let settlement = Arc::new(SettlementJob::new(
        Arc::clone(&store),
        Arc::clone(&clock),
        Arc::clone(&locks),
        config.engine.clone(),
    ));
    let valuation = Arc::new(ValuationJob::new(
        Arc::clone(&store),
        board.clone(),
        calendar,
        Arc::clone(&clock),
        Arc::clone(&locks),
        config.engine.clone(),
    ));
    let daily = spawn_daily_jobs(
        settlement,
        Arc::clone(&valuation),
        Arc::clone(&clock),
        config.engine.clone(),
        config.jobs.daily_run_time,
    );
    let intraday = (config.jobs.intraday_refresh_secs > 0).then(|| {
        spawn_intraday_refresh(
            valuation,
            Arc::clone(&clock),
            config.engine.clone(),
            config.jobs.intraday_refresh_secs,
        )
    });

    info!("TradeService initialized. Waiting for signals...");

    // 5. 挂起主线程，等待外部退出信号
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting...");
    daily.abort();
    if let Some(handle) = intraday {
        handle.abort();
    }

    Ok(())
}

use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Offset, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::time::to_local;
use crate::trade::fees::FeeSchedule;

/// # Summary
/// 连续竞价时段（本地时间），上下午两段，边界均为闭区间。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct TradingSession {
    pub morning_open: NaiveTime,
    pub morning_close: NaiveTime,
    pub afternoon_open: NaiveTime,
    pub afternoon_close: NaiveTime,
}

impl Default for TradingSession {
    fn default() -> Self {
        Self {
            morning_open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            morning_close: NaiveTime::from_hms_opt(11, 30, 0).unwrap_or_default(),
            afternoon_open: NaiveTime::from_hms_opt(13, 0, 0).unwrap_or_default(),
            afternoon_close: NaiveTime::from_hms_opt(15, 0, 0).unwrap_or_default(),
        }
    }
}

impl TradingSession {
    pub fn contains(&self, time: NaiveTime) -> bool {
        (time >= self.morning_open && time <= self.morning_close)
            || (time >= self.afternoon_open && time <= self.afternoon_close)
    }
}

/// # Summary
/// 撮合引擎配置。全部字段带默认值，可被配置文件与环境变量逐项覆盖。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// 惰性开户时的初始资金
    pub initial_capital: Decimal,
    /// 单票仓位集中度上限（买入成本 / 总资产）
    pub max_position_ratio: Decimal,
    /// 费率表
    pub fees: FeeSchedule,
    /// 交易时段
    pub session: TradingSession,
    /// 是否强制校验交易时段（联调环境可关闭）
    pub enforce_trading_hours: bool,
    /// 本地市场相对 UTC 的小时偏移（A 股为 +8）
    pub utc_offset_hours: i32,
    /// 存储层故障时整个校验-提交序列的最大重试次数
    pub commit_retries: u32,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            initial_capital: Decimal::new(1_000_000, 0),
            max_position_ratio: Decimal::new(2, 1),
            fees: FeeSchedule::default(),
            session: TradingSession::default(),
            enforce_trading_hours: true,
            utc_offset_hours: 8,
            commit_retries: 3,
        }
    }
}

impl EngineConfig {
    /// 市场本地时区。配置越界时退回 UTC。
    pub fn utc_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.utc_offset_hours.saturating_mul(3600))
            .unwrap_or_else(|| Utc.fix())
    }

    /// 将系统时刻换算为市场本地时间
    pub fn local_datetime(&self, now: DateTime<Utc>) -> NaiveDateTime {
        to_local(now, self.utc_offset())
    }

    /// 系统时刻对应的市场本地交易日
    pub fn local_date(&self, now: DateTime<Utc>) -> NaiveDate {
        self.local_datetime(now).date()
    }
}

/// # Summary
/// 存储后端选择。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// "sqlite" 或 "memory"
    pub backend: String,
    /// SQLite 分片文件目录
    pub data_dir: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { backend: "sqlite".to_string(), data_dir: "data".to_string() }
    }
}

/// # Summary
/// 日志配置。`dir` 为 None 时仅输出到控制台；`filter` 为 None 时
/// 由 RUST_LOG 或默认级别决定。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// 滚动日志目录
    pub dir: Option<String>,
    /// 过滤指令，如 "info,mogi_trade=debug"
    pub filter: Option<String>,
}

/// # Summary
/// 行情种子与交易日历配置。
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketConfig {
    /// 启动时加载的报价种子文件（JSON）
    pub seed_file: Option<String>,
    /// 节假日列表（周一至周五中的休市日）
    pub holidays: Vec<NaiveDate>,
}

/// # Summary
/// 批处理任务调度配置。
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct JobsConfig {
    /// 日终任务（结算 + 估值快照）的本地触发时刻
    pub daily_run_time: NaiveTime,
    /// 盘中行情刷新间隔（秒），0 表示关闭
    pub intraday_refresh_secs: u64,
}

impl Default for JobsConfig {
    fn default() -> Self {
        Self {
            daily_run_time: NaiveTime::from_hms_opt(15, 30, 0).unwrap_or_default(),
            intraday_refresh_secs: 0,
        }
    }
}

/// 全局应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub engine: EngineConfig,
    pub storage: StorageConfig,
    pub log: LogConfig,
    pub market: MarketConfig,
    pub jobs: JobsConfig,
}

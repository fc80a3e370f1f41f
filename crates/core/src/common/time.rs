use chrono::{DateTime, Duration, FixedOffset, NaiveDateTime, Utc};
use std::sync::atomic::{AtomicI64, Ordering};

/// # Summary
/// 时间供给器接口，用于劫持和隔离物理系统时钟。
/// 引擎内所有"当前时间"（交易时段校验、成交时间戳、结算日推导）
/// 必须经由此接口获取，以便测试和回放环境整体接管时间轴。
pub trait TimeProvider: Send + Sync {
    /// 获取当前挂载的时间
    fn now(&self) -> DateTime<Utc>;
}

/// # Summary
/// 针对实盘和普通运行的真实时钟，直接返回操作系统当前时间。
pub struct RealTimeProvider;

impl TimeProvider for RealTimeProvider {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// # Summary
/// 测试与模拟专用虚拟时钟，允许外部主动拨快或回退时间。
///
/// # Invariants
/// - 并发安全：内部以原子毫秒时间戳存储，多线程读写无锁冲突。
pub struct FakeClockProvider {
    now_ms: AtomicI64,
}

impl FakeClockProvider {
    /// 使用指定的初始时间创建虚拟时钟
    pub fn new(initial_time: DateTime<Utc>) -> Self {
        Self {
            now_ms: AtomicI64::new(initial_time.timestamp_millis()),
        }
    }

    /// 强制修改时钟的当前时间
    pub fn set_time(&self, new_time: DateTime<Utc>) {
        self.now_ms
            .store(new_time.timestamp_millis(), Ordering::SeqCst);
    }

    /// 在当前时间基础上拨快指定时长（负数即回拨）
    pub fn advance(&self, delta: Duration) {
        self.now_ms
            .fetch_add(delta.num_milliseconds(), Ordering::SeqCst);
    }
}

impl TimeProvider for FakeClockProvider {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.now_ms.load(Ordering::SeqCst);
        DateTime::from_timestamp_millis(ms).unwrap_or(DateTime::UNIX_EPOCH)
    }
}

/// # Summary
/// 将 UTC 时刻折算到指定时区偏移下的本地挂钟时间。
/// 交易日、结算日等以"交易所当地日历"为准的推导都经由此处。
pub fn to_local(now: DateTime<Utc>, offset: FixedOffset) -> NaiveDateTime {
    now.with_timezone(&offset).naive_local()
}

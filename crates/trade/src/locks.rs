use dashmap::DashMap;
use mogi_core::trade::entity::UserId;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// # Summary
/// 以用户为粒度的互斥锁表。同一用户的"读取-校验-落库"序列必须整体持锁执行，
/// 否则两笔并发委托会在 `available_cash` / `total_quantity` 上互相覆盖写。
/// 不同用户之间互不阻塞。
///
/// # Invariants
/// - 锁条目只增不减：用户数量有限（每户对应一个分片库），常驻成本可忽略。
/// - 调用方不得在持有 DashMap 引用的情况下 await，本类型的 API 保证了这一点。
pub struct AccountLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl Default for AccountLocks {
    fn default() -> Self {
        Self::new()
    }
}

impl AccountLocks {
    pub fn new() -> Self {
        Self {
            locks: DashMap::new(),
        }
    }

    /// # Summary
    /// 获取指定用户的互斥锁，返回持有型守卫，跨 await 点保持独占。
    ///
    /// # Logic
    /// 先克隆出 `Arc<Mutex>` 并释放 DashMap 分段引用，再在锁上异步等待，
    /// 避免把 DashMap 的分段读锁带进 await。
    pub async fn acquire(&self, user: &UserId) -> OwnedMutexGuard<()> {
        let cell = self
            .locks
            .entry(user.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        cell.lock_owned().await
    }
}

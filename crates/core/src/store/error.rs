use thiserror::Error;

/// # Summary
/// 存储层错误枚举，处理分片数据库的连接、读写与初始化失败。
/// 业务上的"记录不存在"由端口以 `Ok(None)` 表达，`NotFound` 仅用于
/// 更新类操作要求目标行存在而实际缺失的场合。
///
/// # Invariants
/// - 必须通过 `thiserror` 派生 `Error` trait。
#[derive(Error, Debug)]
pub enum StoreError {
    /// 数据库操作失败
    #[error("Database error: {0}")]
    Database(String),
    /// 记录未找到
    #[error("Not found")]
    NotFound,
    /// 初始化存储失败
    #[error("Initialization error: {0}")]
    InitError(String),
    /// 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}

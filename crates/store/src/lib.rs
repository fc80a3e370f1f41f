//! # `mogi-store` - 持久化适配层
//!
//! 以一户一库的 SQLite 分片实现领域层声明的四类存储端口
//! （账户、持仓、成交流水、每日快照），另附一套 DashMap 内存实现
//! 供测试与临时运行使用。
//!
//! ## 架构职责
//! - `shard`：分片池管理——按用户惰性开库、建表、枚举
//! - `sqlite`：`SqliteBrokerStore`，四端口的 SQLite 实现，成交与重置走单事务
//! - `memory`：`MemoryBrokerStore`，同一套端口的进程内实现

pub mod memory;
pub mod shard;
pub mod sqlite;

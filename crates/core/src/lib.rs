//! # `mogi-core` - 领域核心
//!
//! 模拟交易引擎的领域层：实体、端口 (Trait) 和错误定义。
//! 本 crate 不包含任何基础设施实现——存储、行情、时钟均以端口形式
//! 声明，由外层 crate (`mogi-store` / `mogi-market` / `mogi-app`) 注入。
//!
//! ## 架构职责
//! - `trade`：账户 / 持仓 / 成交流水实体，费用规则，交易服务端口
//! - `market`：行情侧实体（板块、涨跌停区间）与价格预言机 / 交易日历端口
//! - `store`：四类持久化集合（账户、持仓、流水、快照）的端口
//! - `common`：时间供给器等跨域基础抽象
//! - `config`：引擎与应用配置结构

pub mod common;
pub mod config;
pub mod market;
pub mod store;
pub mod trade;

#[cfg(feature = "test-utils")]
pub mod testkit;

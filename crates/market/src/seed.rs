use chrono::NaiveDate;
use mogi_core::market::entity::StockMeta;
use mogi_core::market::error::MarketError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

use crate::oracle::QuoteBoard;

/// # Summary
/// JSON 行情种子文件的根结构。模拟盘离线运行时用种子文件代替实时行情源，
/// 金额一律写成字符串以保留十进制精度。
///
/// 文件示例:
/// ```json
/// {
///   "quotes": [
///     {
///       "code": "600519",
///       "name": "贵州茅台",
///       "pre_close": "1690.00",
///       "latest": "1700.00",
///       "closes": { "2024-06-07": "1695.00" }
///     }
///   ]
/// }
/// ```
#[derive(Debug, Deserialize)]
pub struct QuoteSeed {
    pub quotes: Vec<SeedEntry>,
}

/// 单只证券的种子条目
#[derive(Debug, Deserialize)]
pub struct SeedEntry {
    // 股票代码
    pub code: String,
    // 证券简称
    pub name: String,
    // 昨日收盘价
    pub pre_close: Decimal,
    // ST 风险警示标记，缺省 false
    #[serde(default)]
    pub is_st: bool,
    // 最新价，缺省表示该票暂无实时行情
    #[serde(default)]
    pub latest: Option<Decimal>,
    // 历史收盘价序列，Key 为交易日
    #[serde(default)]
    pub closes: BTreeMap<NaiveDate, Decimal>,
}

/// 从磁盘读取并解析种子文件
pub fn load_seed(path: &Path) -> Result<QuoteSeed, MarketError> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| MarketError::Parse(format!("读取行情种子失败 {}: {}", path.display(), e)))?;
    serde_json::from_str(&raw)
        .map_err(|e| MarketError::Parse(format!("解析行情种子失败 {}: {}", path.display(), e)))
}

/// # Summary
/// 把种子内容整体发布到报价板，返回装载的证券数量。
pub fn apply_seed(board: &QuoteBoard, seed: QuoteSeed) -> usize {
    let count = seed.quotes.len();
    for entry in seed.quotes {
        board.publish_meta(StockMeta {
            code: entry.code.clone(),
            name: entry.name,
            pre_close: entry.pre_close,
            is_st: entry.is_st,
        });
        if let Some(price) = entry.latest {
            board.publish_quote(&entry.code, price);
        }
        for (date, close) in entry.closes {
            board.publish_close(&entry.code, date, close);
        }
    }
    info!("行情种子装载完成: {} 只证券", count);
    count
}

use thiserror::Error;

/// # Summary
/// 行情数据域错误枚举，处理网络、解析及数据缺失等问题。
/// "查无此价"不属于错误——端口以 `Ok(None)` 表达，此处只承载基础设施故障。
#[derive(Error, Debug)]
pub enum MarketError {
    // 网络层错误，包含底层客户端错误信息
    #[error("Network error: {0}")]
    Network(String),
    // 数据解析错误，如种子文件格式不匹配
    #[error("Parse error: {0}")]
    Parse(String),
    // 请求的数据源未找到
    #[error("Data not found")]
    NotFound,
    // 未知或未分类的错误
    #[error("Unknown error: {0}")]
    Unknown(String),
}

use rust_decimal::{Decimal, RoundingStrategy};

/// # Summary
/// 货币金额取整：保留两位小数（人民币分），中点远离零。
/// 所有落库的金额字段（费用、成本、市值、盈亏）必须经过此函数。
pub fn round_cny(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

/// # Summary
/// 内部精度字段取整：收益率、胜率、持仓均价等保留四位小数。
pub fn round_dp4(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(4, RoundingStrategy::MidpointAwayFromZero)
}

use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// # Summary
/// 交易所归属。A 股市场中代码规则即可确定归属：
/// 前缀 600/601/603/605/688 或带 `.SH` 后缀的为上交所，其余为深交所。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Exchange {
    /// 上海证券交易所
    Shanghai,
    /// 深圳证券交易所
    Shenzhen,
}

impl Exchange {
    /// # Logic
    /// 依据代码后缀优先、前缀兜底的规则推断交易所。
    pub fn classify(stock_code: &str) -> Self {
        let upper = stock_code.to_ascii_uppercase();
        if upper.ends_with(".SH") {
            return Exchange::Shanghai;
        }
        if upper.ends_with(".SZ") {
            return Exchange::Shenzhen;
        }
        let base = base_code(stock_code);
        const SH_PREFIXES: [&str; 5] = ["600", "601", "603", "605", "688"];
        if SH_PREFIXES.iter().any(|p| base.starts_with(p)) {
            Exchange::Shanghai
        } else {
            Exchange::Shenzhen
        }
    }
}

impl std::fmt::Display for Exchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exchange::Shanghai => write!(f, "SH"),
            Exchange::Shenzhen => write!(f, "SZ"),
        }
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "SH" => Ok(Exchange::Shanghai),
            "SZ" => Ok(Exchange::Shenzhen),
            _ => Err(format!("Unknown exchange: {}", s)),
        }
    }
}

/// # Summary
/// 上市板块。板块决定一手股数与涨跌停幅度：
/// 科创板 (688 开头) 一手 200 股、涨跌幅 20%；
/// 创业板 (300 开头) 与主板一手 100 股、涨跌幅 10%。
///
/// # Invariants
/// - 板块由代码前缀唯一确定，生命周期内不变。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Board {
    /// 主板
    Main,
    /// 创业板
    Gem,
    /// 科创板
    Star,
}

impl Board {
    /// 依据代码前缀推断板块
    pub fn classify(stock_code: &str) -> Self {
        let base = base_code(stock_code);
        if base.starts_with("688") {
            Board::Star
        } else if base.starts_with("300") {
            Board::Gem
        } else {
            Board::Main
        }
    }

    /// 该板块的最小申报单位（一手股数）
    pub fn lot_size(self) -> i64 {
        match self {
            Board::Star => 200,
            Board::Main | Board::Gem => 100,
        }
    }

    /// # Logic
    /// 涨跌幅比例。ST 标记优先于板块判定：ST 股 5%，科创板 20%，其余 10%。
    pub fn limit_ratio(self, is_st: bool) -> Decimal {
        if is_st {
            return Decimal::new(5, 2); // 0.05
        }
        match self {
            Board::Star => Decimal::new(2, 1),            // 0.20
            Board::Main | Board::Gem => Decimal::new(1, 1), // 0.10
        }
    }
}

impl std::fmt::Display for Board {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Board::Main => write!(f, "MAIN"),
            Board::Gem => write!(f, "GEM"),
            Board::Star => write!(f, "STAR"),
        }
    }
}

impl FromStr for Board {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "MAIN" => Ok(Board::Main),
            "GEM" => Ok(Board::Gem),
            "STAR" => Ok(Board::Star),
            _ => Err(format!("Unknown board: {}", s)),
        }
    }
}

/// 去掉 `.SH` / `.SZ` 之类的交易所后缀，返回纯数字代码部分
fn base_code(stock_code: &str) -> &str {
    stock_code.split('.').next().unwrap_or(stock_code)
}

/// # Summary
/// 证券静态元数据，由价格预言机提供。
/// `pre_close` 与 `is_st` 共同决定当日涨跌停区间。
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StockMeta {
    // 股票代码 (例如: 600519, 300750)
    pub code: String,
    // 证券简称
    pub name: String,
    // 昨日收盘价
    pub pre_close: Decimal,
    // 是否带 ST 风险警示标记
    pub is_st: bool,
}

/// # Summary
/// 当日涨跌停价格区间，上下边界均为闭区间。
///
/// # Invariants
/// - `lower <= upper`，均已四舍五入到分。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LimitBand {
    pub lower: Decimal,
    pub upper: Decimal,
}

impl LimitBand {
    /// # Logic
    /// 区间 = 昨收 × (1 ± 比例)，逐边四舍五入到两位小数。
    pub fn compute(board: Board, is_st: bool, pre_close: Decimal) -> Self {
        let ratio = board.limit_ratio(is_st);
        let round = |v: Decimal| v.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
        Self {
            lower: round(pre_close * (Decimal::ONE - ratio)),
            upper: round(pre_close * (Decimal::ONE + ratio)),
        }
    }

    /// 委托价是否落在区间内（含边界）
    pub fn contains(&self, price: Decimal) -> bool {
        self.lower <= price && price <= self.upper
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn classify_exchange_by_prefix_and_suffix() {
        assert_eq!(Exchange::classify("600519"), Exchange::Shanghai);
        assert_eq!(Exchange::classify("601398"), Exchange::Shanghai);
        assert_eq!(Exchange::classify("688981"), Exchange::Shanghai);
        assert_eq!(Exchange::classify("000001"), Exchange::Shenzhen);
        assert_eq!(Exchange::classify("300750"), Exchange::Shenzhen);
        // 后缀优先于前缀
        assert_eq!(Exchange::classify("000001.SH"), Exchange::Shanghai);
        assert_eq!(Exchange::classify("600519.sh"), Exchange::Shanghai);
    }

    #[test]
    fn classify_board_and_lot_size() {
        assert_eq!(Board::classify("688981"), Board::Star);
        assert_eq!(Board::classify("300750"), Board::Gem);
        assert_eq!(Board::classify("600519"), Board::Main);
        assert_eq!(Board::classify("688981.SH"), Board::Star);
        assert_eq!(Board::Star.lot_size(), 200);
        assert_eq!(Board::Gem.lot_size(), 100);
        assert_eq!(Board::Main.lot_size(), 100);
    }

    #[test]
    fn st_ratio_takes_precedence() {
        assert_eq!(Board::Main.limit_ratio(false), dec!(0.1));
        assert_eq!(Board::Star.limit_ratio(false), dec!(0.2));
        // ST 判定优先，即便是科创板代码
        assert_eq!(Board::Star.limit_ratio(true), dec!(0.05));
        assert_eq!(Board::Main.limit_ratio(true), dec!(0.05));
    }

    #[test]
    fn limit_band_rounded_and_inclusive() {
        // 昨收 10.03，主板 10%：区间 [9.03, 11.03]（逐边四舍五入到分）
        let band = LimitBand::compute(Board::Main, false, dec!(10.03));
        assert_eq!(band.lower, dec!(9.03));
        assert_eq!(band.upper, dec!(11.03));
        assert!(band.contains(dec!(11.03)));
        assert!(band.contains(dec!(9.03)));
        assert!(!band.contains(dec!(11.04)));
        assert!(!band.contains(dec!(9.02)));
    }

    #[test]
    fn limit_band_rounds_half_up() {
        // 昨收 3.25，ST 5%：3.25 * 1.05 = 3.4125 -> 3.41，3.25 * 0.95 = 3.0875 -> 3.09
        let band = LimitBand::compute(Board::Main, true, dec!(3.25));
        assert_eq!(band.upper, dec!(3.41));
        assert_eq!(band.lower, dec!(3.09));
    }
}

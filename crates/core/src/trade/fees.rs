use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::common::money::round_cny;
use crate::market::entity::Exchange;
use crate::trade::entity::TradeType;

/// # Summary
/// A 股费率表。所有费率均可由配置覆盖，默认值为常见券商档位。
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct FeeSchedule {
    /// 佣金费率（双边）
    pub commission_rate: Decimal,
    /// 单笔佣金下限
    pub commission_min: Decimal,
    /// 印花税率（仅卖出）
    pub stamp_tax_rate: Decimal,
    /// 过户费率（仅沪市，双边）
    pub transfer_fee_rate: Decimal,
    /// 滑点费率（双边，近似市场冲击成本）
    pub slippage_rate: Decimal,
}

impl Default for FeeSchedule {
    fn default() -> Self {
        Self {
            // 万分之一
            commission_rate: Decimal::new(1, 4),
            // 最低 5 元
            commission_min: Decimal::new(5, 0),
            // 千分之一
            stamp_tax_rate: Decimal::new(1, 3),
            // 十万分之一
            transfer_fee_rate: Decimal::new(1, 5),
            // 千分之一
            slippage_rate: Decimal::new(1, 3),
        }
    }
}

/// # Summary
/// 单笔成交的费用拆解，各分量均已按分取整且非负。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeBreakdown {
    pub commission: Decimal,
    pub stamp_tax: Decimal,
    pub transfer_fee: Decimal,
    pub slippage: Decimal,
}

impl FeeBreakdown {
    pub fn total(&self) -> Decimal {
        self.commission + self.stamp_tax + self.transfer_fee + self.slippage
    }
}

impl FeeSchedule {
    /// # Summary
    /// 纯函数费用计算，无副作用无 I/O。
    ///
    /// # Logic
    /// - 佣金 = max(金额 × 佣金费率, 佣金下限)，买卖双边收取；
    /// - 印花税 = 金额 × 印花税率，仅卖出收取；
    /// - 过户费 = 金额 × 过户费率，仅沪市标的收取（双边）；
    /// - 滑点 = 金额 × 滑点费率，双边收取；
    /// - 各分量独立按分取整。
    pub fn calculate(&self, amount: Decimal, side: TradeType, market: Exchange) -> FeeBreakdown {
        let commission = round_cny((amount * self.commission_rate).max(self.commission_min));
        let stamp_tax = match side {
            TradeType::Sell => round_cny(amount * self.stamp_tax_rate),
            TradeType::Buy => Decimal::ZERO,
        };
        let transfer_fee = match market {
            Exchange::Shanghai => round_cny(amount * self.transfer_fee_rate),
            Exchange::Shenzhen => Decimal::ZERO,
        };
        let slippage = round_cny(amount * self.slippage_rate);
        FeeBreakdown { commission, stamp_tax, transfer_fee, slippage }
    }
}

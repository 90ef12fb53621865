//! Margin safety gate for automated price changes.
//!
//! ROI margin is `(price − total_cost) / total_cost × 100` where
//! `total_cost = fixed_operating_cost + price × variable_fee_rate`. A change
//! is safe when the projected margin meets the configured minimum (10% by
//! default). Missing cost data fails open: the change is allowed and the
//! result says so.

use rust_decimal::Decimal;
use serde::Serialize;
use utoipa::ToSchema;

use crate::domain::CostBasis;

/// Minimum ROI margin, in percent, an automated change must keep.
pub const DEFAULT_MIN_MARGIN_PERCENT: Decimal = Decimal::TEN;

/// Cost components behind a projected margin, rounded to pence for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct CostBreakdown {
    /// Price the margin was projected for.
    pub price: Decimal,
    /// Price-independent costs.
    pub fixed_operating_cost: Decimal,
    /// Commission rate as a fraction.
    pub variable_fee_rate: Decimal,
    /// Commission charged at `price`.
    pub amazon_fee: Decimal,
    /// Fixed costs plus commission.
    pub total_cost: Decimal,
    /// `price − total_cost`.
    pub profit: Decimal,
}

/// Outcome of the margin gate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct MarginCheck {
    /// Whether the change may proceed without an override.
    pub safe: bool,
    /// Projected ROI margin at the new price, in percent (2 dp).
    pub new_margin: Option<Decimal>,
    /// ROI margin at the current price, in percent (2 dp).
    pub current_margin: Option<Decimal>,
    /// Threshold the new margin was compared against.
    pub min_margin: Decimal,
    /// Human-readable explanation; includes the breakdown on rejection.
    pub message: String,
    /// Cost components at the new price, when cost data exists.
    pub breakdown: Option<CostBreakdown>,
}

/// Why a margin could not be projected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarginUndefined {
    /// Total cost is zero or negative.
    NonPositiveCost,
    /// An intermediate value exceeded the decimal range.
    Overflow,
}

/// Projects the ROI margin (unrounded, percent) of selling at `price`.
///
/// # Errors
///
/// Returns [`MarginUndefined::NonPositiveCost`] when the total cost is not
/// positive and [`MarginUndefined::Overflow`] when the arithmetic leaves the
/// decimal range.
pub fn roi_margin(
    price: Decimal,
    costs: &CostBasis,
) -> Result<(Decimal, CostBreakdown), MarginUndefined> {
    let amazon_fee = price
        .checked_mul(costs.variable_fee_rate)
        .ok_or(MarginUndefined::Overflow)?;
    let total_cost = costs
        .fixed_operating_cost
        .checked_add(amazon_fee)
        .ok_or(MarginUndefined::Overflow)?;
    if total_cost <= Decimal::ZERO {
        return Err(MarginUndefined::NonPositiveCost);
    }
    let profit = price
        .checked_sub(total_cost)
        .ok_or(MarginUndefined::Overflow)?;
    let margin = profit
        .checked_div(total_cost)
        .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED))
        .ok_or(MarginUndefined::Overflow)?;

    let breakdown = CostBreakdown {
        price: price.round_dp(2),
        fixed_operating_cost: costs.fixed_operating_cost.round_dp(2),
        variable_fee_rate: costs.variable_fee_rate,
        amazon_fee: amazon_fee.round_dp(2),
        total_cost: total_cost.round_dp(2),
        profit: profit.round_dp(2),
    };
    Ok((margin, breakdown))
}

/// Runs the margin gate for a proposed price.
///
/// A price whose margin cannot be computed within the decimal range is
/// rejected.
#[must_use]
pub fn validate_margin(
    new_price: Decimal,
    current_price: Option<Decimal>,
    costs: Option<&CostBasis>,
    min_margin_percent: Decimal,
) -> MarginCheck {
    let Some(costs) = costs else {
        return fail_open(
            min_margin_percent,
            "No cost data available for this product; margin safety was not verified".to_string(),
        );
    };
    let (margin, breakdown) = match roi_margin(new_price, costs) {
        Ok(projection) => projection,
        Err(MarginUndefined::NonPositiveCost) => {
            return fail_open(
                min_margin_percent,
                "Cost data is incomplete (total cost is zero); margin safety was not verified"
                    .to_string(),
            );
        }
        Err(MarginUndefined::Overflow) => {
            return MarginCheck {
                safe: false,
                new_margin: None,
                current_margin: None,
                min_margin: min_margin_percent,
                message: format!(
                    "Price £{new_price} is outside the range the margin check can evaluate"
                ),
                breakdown: None,
            };
        }
    };

    let current_margin = current_price
        .and_then(|price| roi_margin(price, costs).ok())
        .map(|(m, _)| m.round_dp(2));
    let new_margin = margin.round_dp(2);
    let safe = margin >= min_margin_percent;

    let message = if safe {
        format!(
            "Projected margin {new_margin}% meets the {}% minimum",
            min_margin_percent.round_dp(2)
        )
    } else {
        let fee_percent = breakdown
            .variable_fee_rate
            .checked_mul(Decimal::ONE_HUNDRED)
            .map_or_else(|| breakdown.variable_fee_rate.to_string(), |p| p.round_dp(2).to_string());
        format!(
            "Projected margin {new_margin}% is below the {}% minimum. \
             Price £{}, fixed costs £{}, marketplace fee £{} ({fee_percent}%), \
             total cost £{}, profit £{}",
            min_margin_percent.round_dp(2),
            breakdown.price,
            breakdown.fixed_operating_cost,
            breakdown.amazon_fee,
            breakdown.total_cost,
            breakdown.profit,
        )
    };

    MarginCheck {
        safe,
        new_margin: Some(new_margin),
        current_margin,
        min_margin: min_margin_percent,
        message,
        breakdown: Some(breakdown),
    }
}

fn fail_open(min_margin: Decimal, message: String) -> MarginCheck {
    MarginCheck {
        safe: true,
        new_margin: None,
        current_margin: None,
        min_margin,
        message,
        breakdown: None,
    }
}

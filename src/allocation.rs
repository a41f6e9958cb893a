//! Allocation arithmetic: a percentage of a total, rounded to currency.

use rust_decimal::{Decimal, RoundingStrategy};

use crate::model::{Breakdown, BreakdownInput};
use crate::validation::AllocationError;

/// Currency precision used by every current caller.
pub const CURRENCY_PRECISION: u32 = 2;

/// `total * percentage / 100`, rounded half-up (ties away from zero) to
/// `precision` fractional digits.
///
/// Returns `Ok(None)` when either input is absent. "No amount" is distinct
/// from a zero amount and callers must keep it that way. A product that
/// does not fit in a `Decimal` is an error, never `None`.
///
/// The percentage is scaled to a fraction first, so any total times a
/// percentage in `[0, 100]` stays in range.
pub fn calculate_amount(
    total: Option<Decimal>,
    percentage: Option<Decimal>,
    precision: u32,
) -> Result<Option<Decimal>, AllocationError> {
    let (Some(total), Some(percentage)) = (total, percentage) else {
        return Ok(None);
    };
    let raw = percentage
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|fraction| total.checked_mul(fraction))
        .ok_or(AllocationError::AmountOutOfRange { total, percentage })?;
    Ok(Some(raw.round_dp_with_strategy(
        precision,
        RoundingStrategy::MidpointAwayFromZero,
    )))
}

/// Materialize requested allocations against a total, computing each
/// entry's amount. Entry order is preserved.
pub fn apply_breakdowns(
    total: Decimal,
    inputs: &[BreakdownInput],
    precision: u32,
) -> Result<Vec<Breakdown>, AllocationError> {
    inputs
        .iter()
        .map(|input| -> Result<Breakdown, AllocationError> {
            Ok(Breakdown {
                category: input.category,
                percentage: input.percentage,
                calculated_amount: calculate_amount(Some(total), Some(input.percentage), precision)?,
            })
        })
        .collect()
}

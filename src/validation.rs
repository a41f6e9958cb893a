//! Input rules for capital calls.
//!
//! [`BreakdownValidator`] owns the percentage-sum invariant. It runs on
//! create, on update, and again on submit against the persisted call, so
//! it never trusts how the entries arrived. [`CapitalCallValidator`]
//! layers the request-shape checks on top, parameterized by
//! [`ValidationLimits`].

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use rust_decimal::Decimal;
use thiserror::Error;

use crate::config::ValidationLimits;
use crate::error::{Error, Result, ValidationKind};
use crate::model::{CapitalCall, CapitalCallRequest};

static BATCH_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^ALE-\d{6}$").expect("Invalid regex pattern"));

// ---------------------------------------------------------------------------
// Breakdown validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AllocationError {
    #[error("percentage total {total} exceeds {limit}")]
    PercentageExceeded { total: Decimal, limit: Decimal },

    #[error("{percentage}% of {total} is not representable as an amount")]
    AmountOutOfRange { total: Decimal, percentage: Decimal },
}

impl From<AllocationError> for Error {
    fn from(err: AllocationError) -> Self {
        let kind = match err {
            AllocationError::PercentageExceeded { .. } => ValidationKind::PercentageExceeded,
            AllocationError::AmountOutOfRange { .. } => ValidationKind::AmountOutOfRange,
        };
        Error::validation(kind, err.to_string())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BreakdownValidator {
    limit: Decimal,
}

impl BreakdownValidator {
    pub fn new(limit: Decimal) -> Self {
        Self { limit }
    }

    /// The sum of `percentages` must not exceed the limit. An empty
    /// sequence sums to zero and passes.
    pub fn validate<I>(&self, percentages: I) -> std::result::Result<(), AllocationError>
    where
        I: IntoIterator<Item = Decimal>,
    {
        let total: Decimal = percentages.into_iter().sum();
        if total > self.limit {
            return Err(AllocationError::PercentageExceeded {
                total,
                limit: self.limit,
            });
        }
        Ok(())
    }
}

impl Default for BreakdownValidator {
    fn default() -> Self {
        Self::new(Decimal::ONE_HUNDRED)
    }
}

// ---------------------------------------------------------------------------
// Request validator
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
pub struct CapitalCallValidator {
    limits: ValidationLimits,
    breakdowns: BreakdownValidator,
}

impl CapitalCallValidator {
    pub fn new(limits: ValidationLimits) -> Self {
        Self {
            limits,
            breakdowns: BreakdownValidator::new(limits.max_percentage_total),
        }
    }

    pub fn limits(&self) -> &ValidationLimits {
        &self.limits
    }

    /// Checks a create or update body. The first broken rule wins and
    /// nothing is persisted.
    pub fn validate_request(&self, request: &CapitalCallRequest) -> Result<()> {
        if request.total_amount <= Decimal::ZERO {
            return Err(Error::validation(
                ValidationKind::AmountNotPositive,
                "total amount must be greater than 0",
            ));
        }
        self.validate_date_range(request.from_date, request.to_date)?;
        validate_batch_id(&request.batch_id)?;

        for entry in &request.breakdowns {
            if entry.percentage < Decimal::ZERO || entry.percentage > Decimal::ONE_HUNDRED {
                return Err(Error::validation(
                    ValidationKind::PercentageOutOfRange,
                    format!(
                        "{} percentage {} must be between 0 and 100",
                        entry.category, entry.percentage
                    ),
                ));
            }
        }
        self.breakdowns
            .validate(request.breakdowns.iter().map(|b| b.percentage))?;
        Ok(())
    }

    /// Re-checks a persisted call before it leaves draft.
    pub fn validate_for_submission(&self, call: &CapitalCall) -> Result<()> {
        self.breakdowns
            .validate(call.breakdowns.iter().map(|b| b.percentage))?;
        self.validate_date_range(call.from_date, call.to_date)
    }

    /// Order and span, checked only when both ends are present.
    pub fn validate_date_range(&self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Result<()> {
        let (Some(from), Some(to)) = (from, to) else {
            return Ok(());
        };
        if from > to {
            return Err(Error::validation(
                ValidationKind::DateOrder,
                "from date must be before or equal to to date",
            ));
        }
        let span = (to - from).num_days();
        if span > self.limits.max_date_range_days {
            return Err(Error::validation(
                ValidationKind::DateRangeTooLong,
                format!(
                    "date range of {span} days exceeds {} days",
                    self.limits.max_date_range_days
                ),
            ));
        }
        Ok(())
    }
}

pub fn validate_batch_id(batch_id: &str) -> Result<()> {
    if BATCH_ID.is_match(batch_id) {
        Ok(())
    } else {
        Err(Error::validation(
            ValidationKind::BatchIdFormat,
            format!("batch id {batch_id:?} must match ALE-XXXXXX"),
        ))
    }
}

//! Settlement arithmetic
//!
//! Interest is simple interest on the principal, pro rata over a 365 day year,
//! accrued from underwriting and capped at the loan duration. All divisions
//! round down: the borrower keeps the fractional interest, and the platform fee
//! is the floor of its share of that interest.

use crate::{
    constants::{BPS_DENOMINATOR, MILLISECONDS_PER_YEAR},
    error::PawnShopError,
    state::LoanTerms,
};

/// Amounts moved when an active loan is repaid
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Settlement {
    pub principal: u64,
    pub interest: u64,
    pub platform_fee: u64,
    /// `amount_due - platform_fee`, paid to the lender
    pub lender_payout: u64,
    /// `principal + interest`, debited from the borrower
    pub amount_due: u64,
}

impl Settlement {
    pub fn compute(
        terms: &LoanTerms,
        underwritten_at: i64,
        now: i64,
        fee_rate_bps: u16,
    ) -> Result<Self, PawnShopError> {
        let elapsed = now.saturating_sub(underwritten_at);
        let interest = accrued_interest(terms, elapsed)?;
        let platform_fee = platform_fee(interest, fee_rate_bps)?;

        let amount_due = terms
            .principal_amount
            .checked_add(interest)
            .ok_or(PawnShopError::ArithmeticOverflow)?;

        Ok(Self {
            principal: terms.principal_amount,
            interest,
            platform_fee,
            lender_payout: amount_due - platform_fee,
            amount_due,
        })
    }
}

/// Interest owed after `elapsed_ms`, clamped to `[0, terms.duration]`
pub fn accrued_interest(terms: &LoanTerms, elapsed_ms: i64) -> Result<u64, PawnShopError> {
    let elapsed = (elapsed_ms.max(0) as u64).min(terms.duration);

    let numerator = (terms.principal_amount as u128)
        .checked_mul(terms.annual_percentage_rate_bps as u128)
        .and_then(|v| v.checked_mul(elapsed as u128))
        .ok_or(PawnShopError::ArithmeticOverflow)?;
    let denominator = BPS_DENOMINATOR as u128 * MILLISECONDS_PER_YEAR as u128;

    u64::try_from(numerator / denominator).map_err(|_| PawnShopError::ArithmeticOverflow)
}

/// Platform share of `interest`
pub fn platform_fee(interest: u64, fee_rate_bps: u16) -> Result<u64, PawnShopError> {
    if fee_rate_bps as u64 > BPS_DENOMINATOR {
        return Err(PawnShopError::InvalidFeeRate);
    }

    // fee <= interest, so the quotient always fits
    Ok((interest as u128 * fee_rate_bps as u128 / BPS_DENOMINATOR as u128) as u64)
}

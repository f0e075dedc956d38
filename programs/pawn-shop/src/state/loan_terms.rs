use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::pubkey::Pubkey;

use crate::{error::PawnShopError, math::accrued_interest};

/// Terms of a loan. Published by the borrower as desired terms and copied,
/// unchanged, into the record when a lender underwrites them.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoanTerms {
    /// Principal paid out to the borrower, in base units of `mint`
    pub principal_amount: u64,

    /// Currency of principal and interest. The native mint means lamports.
    pub mint: Pubkey,

    /// Annual interest rate in basis points (1000 = 10%)
    pub annual_percentage_rate_bps: u16,

    /// Loan duration in milliseconds, counted from underwriting
    pub duration: u64,
}

impl LoanTerms {
    pub const LEN: usize = 8 + // principal_amount
        32 + // mint
        2 + // annual_percentage_rate_bps
        8; // duration

    pub fn validate(&self) -> Result<(), PawnShopError> {
        if self.principal_amount == 0 {
            return Err(PawnShopError::InvalidLoanTerms);
        }
        if self.annual_percentage_rate_bps == 0 {
            return Err(PawnShopError::InvalidLoanTerms);
        }
        if self.duration == 0 {
            return Err(PawnShopError::InvalidLoanTerms);
        }

        // Repayment at any point of the term must be representable
        let interest = accrued_interest(self, self.duration_ms()?)
            .map_err(|_| PawnShopError::InvalidLoanTerms)?;
        self.principal_amount
            .checked_add(interest)
            .ok_or(PawnShopError::InvalidLoanTerms)?;

        Ok(())
    }

    /// Like `validate`, and the loan must also be able to expire if funded at `now`
    pub fn validate_at(&self, now: i64) -> Result<(), PawnShopError> {
        self.validate()?;
        now.checked_add(self.duration_ms()?)
            .ok_or(PawnShopError::InvalidLoanTerms)?;
        Ok(())
    }

    fn duration_ms(&self) -> Result<i64, PawnShopError> {
        i64::try_from(self.duration).map_err(|_| PawnShopError::InvalidLoanTerms)
    }
}

use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{entrypoint::ProgramResult, program_error::ProgramError, pubkey::Pubkey};

use crate::{error::PawnShopError, math::Settlement, state::LoanTerms};

/// Lifecycle of a loan. `Open` loans may be underwritten or cancelled,
/// `Active` loans end as `Repaid` or `Defaulted`.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoanStatus {
    Open,
    Active,
    Repaid,
    Defaulted,
}

/// A loan record. The pledged NFT never leaves the borrower's token account
/// while the loan is open or active: the account is delegated to this record's
/// PDA and frozen through it.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct PawnLoan {
    /// Account discriminator
    pub discriminator: [u8; 8],

    /// Bump of the `["pawn-loan", base]` PDA
    pub bump: u8,

    /// Throwaway key the loan address is derived from
    pub base: Pubkey,

    pub borrower: Pubkey,

    /// Set once, when the loan is underwritten
    pub lender: Option<Pubkey>,

    /// Borrower's token account holding the pawn
    pub pawn_token_account: Pubkey,

    pub pawn_mint: Pubkey,

    /// Terms a lender must match to underwrite. Never modified.
    pub desired_terms: LoanTerms,

    /// Binding terms, copied from `desired_terms` at underwriting
    pub terms: Option<LoanTerms>,

    pub status: LoanStatus,

    /// Unix time in milliseconds
    pub requested_at: i64,
    pub underwritten_at: Option<i64>,
    /// When the loan reached `Repaid` or `Defaulted`
    pub settled_at: Option<i64>,
}

impl PawnLoan {
    pub const DISCRIMINATOR: [u8; 8] = *b"PAWNLOAN";

    pub const LEN: usize = 8 + // discriminator
        1 + // bump
        32 + // base
        32 + // borrower
        (1 + 32) + // lender
        32 + // pawn_token_account
        32 + // pawn_mint
        LoanTerms::LEN + // desired_terms
        (1 + LoanTerms::LEN) + // terms
        1 + // status
        8 + // requested_at
        (1 + 8) + // underwritten_at
        (1 + 8) + // settled_at
        64; // padding for growth

    pub fn new(
        bump: u8,
        base: Pubkey,
        borrower: Pubkey,
        pawn_token_account: Pubkey,
        pawn_mint: Pubkey,
        desired_terms: LoanTerms,
        requested_at: i64,
    ) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            bump,
            base,
            borrower,
            lender: None,
            pawn_token_account,
            pawn_mint,
            desired_terms,
            terms: None,
            status: LoanStatus::Open,
            requested_at,
            underwritten_at: None,
            settled_at: None,
        }
    }

    /// Decode from account data. Trailing padding is ignored.
    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        let loan = Self::deserialize(&mut &data[..])
            .map_err(|_| ProgramError::InvalidAccountData)?;

        if loan.discriminator != Self::DISCRIMINATOR {
            return Err(PawnShopError::AccountNotInitialized.into());
        }

        Ok(loan)
    }

    pub fn pack(&self, dst: &mut [u8]) -> ProgramResult {
        self.serialize(&mut &mut dst[..])?;
        Ok(())
    }

    /// Instant (ms) from which the lender may seize the pawn
    pub fn expiry(&self) -> Option<i64> {
        let underwritten_at = self.underwritten_at?;
        let terms = self.terms.as_ref()?;
        let duration = i64::try_from(terms.duration).ok()?;
        underwritten_at.checked_add(duration)
    }

    pub fn is_expired(&self, now: i64) -> bool {
        matches!(self.expiry(), Some(expiry) if now >= expiry)
    }

    /// What repaying at `now` would cost, or `None` for loans that are not active
    pub fn amount_due(
        &self,
        now: i64,
        fee_rate_bps: u16,
    ) -> Result<Option<Settlement>, PawnShopError> {
        match (self.status, self.terms.as_ref(), self.underwritten_at) {
            (LoanStatus::Active, Some(terms), Some(underwritten_at)) => {
                Settlement::compute(terms, underwritten_at, now, fee_rate_bps).map(Some)
            }
            _ => Ok(None),
        }
    }

    /// Checks the record invariants: terms and lender are present exactly when
    /// the loan has left `Open`, and locked terms equal the desired terms.
    pub fn is_consistent(&self) -> bool {
        match self.status {
            LoanStatus::Open => {
                self.terms.is_none() && self.lender.is_none() && self.underwritten_at.is_none()
            }
            LoanStatus::Active | LoanStatus::Repaid | LoanStatus::Defaulted => {
                self.terms == Some(self.desired_terms)
                    && self.lender.is_some()
                    && self.underwritten_at.is_some()
                    && (self.status == LoanStatus::Active) == self.settled_at.is_none()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MILLISECONDS_PER_DAY;

    fn open_loan() -> PawnLoan {
        PawnLoan::new(
            254,
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            LoanTerms {
                principal_amount: 10,
                mint: spl_token::native_mint::id(),
                annual_percentage_rate_bps: 1_000,
                duration: 7 * MILLISECONDS_PER_DAY,
            },
            1_000,
        )
    }

    fn activate(loan: &mut PawnLoan, at: i64) {
        loan.terms = Some(loan.desired_terms);
        loan.lender = Some(Pubkey::new_unique());
        loan.underwritten_at = Some(at);
        loan.status = LoanStatus::Active;
    }

    #[test]
    fn test_pack_unpack_with_padding() {
        let mut loan = open_loan();
        activate(&mut loan, 5_000);
        loan.status = LoanStatus::Repaid;
        loan.settled_at = Some(9_000);

        let mut data = vec![0u8; PawnLoan::LEN];
        loan.pack(&mut data).unwrap();

        assert_eq!(PawnLoan::unpack(&data).unwrap(), loan);
    }

    #[test]
    fn test_unpack_rejects_blank_account() {
        let data = vec![0u8; PawnLoan::LEN];
        assert_eq!(
            PawnLoan::unpack(&data),
            Err(PawnShopError::AccountNotInitialized.into())
        );
    }

    #[test]
    fn test_expiry_only_once_active() {
        let mut loan = open_loan();
        assert_eq!(loan.expiry(), None);
        assert!(!loan.is_expired(i64::MAX));

        activate(&mut loan, 5_000);
        let expiry = 5_000 + (7 * MILLISECONDS_PER_DAY) as i64;
        assert_eq!(loan.expiry(), Some(expiry));
        assert!(!loan.is_expired(expiry - 1));
        assert!(loan.is_expired(expiry));
    }

    #[test]
    fn test_consistency() {
        let mut loan = open_loan();
        assert!(loan.is_consistent());

        loan.status = LoanStatus::Active;
        assert!(!loan.is_consistent());

        let mut loan = open_loan();
        activate(&mut loan, 5_000);
        assert!(loan.is_consistent());

        loan.terms.as_mut().unwrap().principal_amount += 1;
        assert!(!loan.is_consistent());
    }

    #[test]
    fn test_amount_due_requires_active_loan() {
        let mut loan = open_loan();
        assert_eq!(loan.amount_due(10_000, 500).unwrap(), None);

        activate(&mut loan, 5_000);
        let settlement = loan.amount_due(10_000, 500).unwrap().unwrap();
        assert_eq!(settlement.principal, 10);
    }
}

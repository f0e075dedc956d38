use solana_program::{entrypoint::ProgramResult, msg, program_error::ProgramError, pubkey::Pubkey};

use crate::{
    constants::PAWN_AMOUNT,
    custody::{Custody, Treasury},
    error::PawnShopError,
    math::Settlement,
    state::{AdminConfig, LoanStatus, LoanTerms, PawnLoan},
};

/// What a lender saw off chain and is willing to fund. Underwriting only
/// succeeds if it still describes the loan exactly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UnderwriteOffer {
    pub terms: LoanTerms,
    pub pawn_mint: Pubkey,
    pub pawn_amount: Option<u64>,
}

/// Loan lifecycle transitions.
///
/// Handlers check every precondition before their first side effect, but they
/// rely on the caller running them atomically: a failed transfer midway must
/// discard the effects that came before it.
pub struct PawnShopEngine;

impl PawnShopEngine {
    /// Opens a loan against the pawn in `pawn_token_account`. The pawn stays in
    /// the borrower's account, delegated to `loan_key` and frozen.
    #[allow(clippy::too_many_arguments)]
    pub fn request_loan<C: Custody>(
        custody: &mut C,
        loan_key: &Pubkey,
        bump: u8,
        base: &Pubkey,
        borrower: &Pubkey,
        pawn_token_account: &Pubkey,
        desired_terms: LoanTerms,
        now: i64,
    ) -> Result<PawnLoan, ProgramError> {
        desired_terms.validate_at(now)?;

        let pawn = custody.token_account(pawn_token_account)?;
        if pawn.owner != *borrower || pawn.amount != PAWN_AMOUNT || pawn.is_frozen {
            return Err(PawnShopError::InvalidPawnAccount.into());
        }

        custody.delegate(pawn_token_account, borrower, loan_key, PAWN_AMOUNT)?;
        custody.freeze(pawn_token_account, loan_key)?;

        msg!(
            "Loan {} requested: principal {} of {}, apr {} bps, duration {} ms",
            loan_key,
            desired_terms.principal_amount,
            desired_terms.mint,
            desired_terms.annual_percentage_rate_bps,
            desired_terms.duration
        );

        Ok(PawnLoan::new(
            bump,
            *base,
            *borrower,
            *pawn_token_account,
            pawn.mint,
            desired_terms,
            now,
        ))
    }

    /// Funds an open loan. The lender's offer must match the record and the
    /// pawn account exactly, so an offer built from stale state fails without
    /// moving anything.
    #[allow(clippy::too_many_arguments)]
    pub fn underwrite_loan<R: Custody + Treasury>(
        runtime: &mut R,
        loan_key: &Pubkey,
        loan: &mut PawnLoan,
        pawn_token_account: &Pubkey,
        lender: &Pubkey,
        lender_payment_account: &Pubkey,
        borrower_payment_account: &Pubkey,
        offer: &UnderwriteOffer,
        now: i64,
    ) -> ProgramResult {
        match loan.status {
            LoanStatus::Open => {}
            LoanStatus::Active | LoanStatus::Repaid | LoanStatus::Defaulted => {
                return Err(PawnShopError::InvalidLoanStatus.into());
            }
        }

        if *pawn_token_account != loan.pawn_token_account {
            return Err(PawnShopError::ConstraintPawnTokenAccount.into());
        }

        if offer.terms != loan.desired_terms {
            return Err(PawnShopError::UnexpectedDesiredTerms.into());
        }

        let pawn = runtime.token_account(pawn_token_account)?;
        if offer.pawn_mint != pawn.mint {
            return Err(PawnShopError::UnexpectedPawnMint.into());
        }
        if let Some(amount) = offer.pawn_amount {
            if amount != pawn.amount {
                return Err(PawnShopError::UnexpectedPawnAmount.into());
            }
        }
        if pawn.mint != loan.pawn_mint || !pawn.is_held_by(loan_key) {
            return Err(PawnShopError::InvalidPawnAccount.into());
        }

        let terms = loan.desired_terms;
        terms.validate_at(now)?;
        if runtime.payment_owner(&terms.mint, borrower_payment_account)? != loan.borrower {
            return Err(PawnShopError::ConstraintPaymentAccount.into());
        }

        runtime.pay(
            &terms.mint,
            lender_payment_account,
            borrower_payment_account,
            lender,
            terms.principal_amount,
        )?;

        loan.terms = Some(terms);
        loan.lender = Some(*lender);
        loan.status = LoanStatus::Active;
        loan.underwritten_at = Some(now);

        msg!(
            "Loan {} underwritten by {}: {} paid to {}",
            loan_key,
            lender,
            terms.principal_amount,
            borrower_payment_account
        );

        Ok(())
    }

    /// Settles an active loan: principal plus interest to the lender minus the
    /// platform fee, the fee to the admin, and the pawn released in place.
    #[allow(clippy::too_many_arguments)]
    pub fn repay_loan<R: Custody + Treasury>(
        runtime: &mut R,
        loan_key: &Pubkey,
        loan: &mut PawnLoan,
        admin_key: &Pubkey,
        admin: &AdminConfig,
        borrower: &Pubkey,
        pawn_token_account: &Pubkey,
        borrower_payment_account: &Pubkey,
        lender_payment_account: &Pubkey,
        admin_payment_account: &Pubkey,
        now: i64,
    ) -> Result<Settlement, ProgramError> {
        let (terms, underwritten_at, lender) = match loan.status {
            LoanStatus::Active => match (loan.terms, loan.underwritten_at, loan.lender) {
                (Some(terms), Some(underwritten_at), Some(lender)) => {
                    (terms, underwritten_at, lender)
                }
                _ => return Err(ProgramError::InvalidAccountData),
            },
            LoanStatus::Open | LoanStatus::Repaid | LoanStatus::Defaulted => {
                return Err(PawnShopError::InvalidLoanStatus.into());
            }
        };

        if *borrower != loan.borrower {
            return Err(PawnShopError::ConstraintBorrower.into());
        }
        if *pawn_token_account != loan.pawn_token_account {
            return Err(PawnShopError::ConstraintPawnTokenAccount.into());
        }
        if runtime.payment_owner(&terms.mint, lender_payment_account)? != lender {
            return Err(PawnShopError::ConstraintPaymentAccount.into());
        }
        if runtime.payment_owner(&terms.mint, admin_payment_account)? != *admin_key {
            return Err(PawnShopError::ConstraintPaymentAccount.into());
        }

        let settlement = Settlement::compute(&terms, underwritten_at, now, admin.fee_rate_bps)?;

        runtime.pay(
            &terms.mint,
            borrower_payment_account,
            lender_payment_account,
            borrower,
            settlement.lender_payout,
        )?;
        if settlement.platform_fee > 0 {
            runtime.pay(
                &terms.mint,
                borrower_payment_account,
                admin_payment_account,
                borrower,
                settlement.platform_fee,
            )?;
        }

        runtime.thaw(pawn_token_account, loan_key)?;
        runtime.revoke(pawn_token_account, borrower)?;

        loan.status = LoanStatus::Repaid;
        loan.settled_at = Some(now);

        msg!(
            "Loan {} repaid: principal {}, interest {}, platform fee {}",
            loan_key,
            settlement.principal,
            settlement.interest,
            settlement.platform_fee
        );

        Ok(settlement)
    }

    /// Hands the pawn to the lender of an expired, unpaid loan
    pub fn seize_pawn<C: Custody>(
        custody: &mut C,
        loan_key: &Pubkey,
        loan: &mut PawnLoan,
        lender: &Pubkey,
        pawn_token_account: &Pubkey,
        lender_pawn_token_account: &Pubkey,
        now: i64,
    ) -> ProgramResult {
        match loan.status {
            LoanStatus::Active => {}
            LoanStatus::Open | LoanStatus::Repaid | LoanStatus::Defaulted => {
                return Err(PawnShopError::InvalidLoanStatus.into());
            }
        }

        if loan.lender.as_ref() != Some(lender) {
            return Err(PawnShopError::ConstraintLender.into());
        }
        if *pawn_token_account != loan.pawn_token_account {
            return Err(PawnShopError::ConstraintPawnTokenAccount.into());
        }
        if !loan.is_expired(now) {
            return Err(PawnShopError::CannotSeizeBeforeExpiry.into());
        }

        let destination = custody.token_account(lender_pawn_token_account)?;
        if destination.mint != loan.pawn_mint || destination.owner != *lender {
            return Err(PawnShopError::InvalidPawnAccount.into());
        }

        // The transfer spends the whole delegation, which clears the delegate
        custody.thaw(pawn_token_account, loan_key)?;
        custody.transfer_pawn(
            pawn_token_account,
            lender_pawn_token_account,
            loan_key,
            PAWN_AMOUNT,
        )?;

        loan.status = LoanStatus::Defaulted;
        loan.settled_at = Some(now);

        msg!("Loan {} defaulted, pawn seized by {}", loan_key, lender);

        Ok(())
    }

    /// Releases the pawn of a loan nobody underwrote. The caller closes the record.
    pub fn cancel_loan<C: Custody>(
        custody: &mut C,
        loan_key: &Pubkey,
        loan: &PawnLoan,
        borrower: &Pubkey,
        pawn_token_account: &Pubkey,
    ) -> ProgramResult {
        match loan.status {
            LoanStatus::Open => {}
            LoanStatus::Active | LoanStatus::Repaid | LoanStatus::Defaulted => {
                return Err(PawnShopError::InvalidLoanStatus.into());
            }
        }

        if *borrower != loan.borrower {
            return Err(PawnShopError::ConstraintBorrower.into());
        }
        if *pawn_token_account != loan.pawn_token_account {
            return Err(PawnShopError::ConstraintPawnTokenAccount.into());
        }

        custody.thaw(pawn_token_account, loan_key)?;
        custody.revoke(pawn_token_account, borrower)?;

        msg!("Loan {} cancelled", loan_key);

        Ok(())
    }

    /// Drains a fee account down to its reserve. Returns the amount moved.
    pub fn withdraw_fees<T: Treasury>(
        treasury: &mut T,
        admin_key: &Pubkey,
        admin: &AdminConfig,
        fee_collector: &Pubkey,
        currency: &Pubkey,
        fee_account: &Pubkey,
        destination: &Pubkey,
    ) -> Result<u64, ProgramError> {
        if *fee_collector != admin.fee_collector {
            return Err(PawnShopError::ConstraintFeeCollector.into());
        }
        if treasury.payment_owner(currency, fee_account)? != *admin_key {
            return Err(PawnShopError::ConstraintPaymentAccount.into());
        }

        let amount = treasury.withdrawable(currency, fee_account)?;
        treasury.pay(currency, fee_account, destination, admin_key, amount)?;

        msg!("Withdrew {} of {} fees to {}", amount, currency, destination);

        Ok(amount)
    }

    pub fn update_admin(
        admin: &mut AdminConfig,
        authority: &Pubkey,
        fee_collector: Option<Pubkey>,
        fee_rate_bps: Option<u16>,
    ) -> ProgramResult {
        if *authority != admin.authority {
            return Err(PawnShopError::ConstraintAuthority.into());
        }

        if let Some(value) = fee_collector {
            admin.fee_collector = value;
        }
        if let Some(value) = fee_rate_bps {
            admin.fee_rate_bps = value;
        }

        admin.validate()?;

        msg!(
            "Admin updated: collector {}, fee rate {} bps",
            admin.fee_collector,
            admin.fee_rate_bps
        );

        Ok(())
    }
}

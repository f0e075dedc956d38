use num_derive::FromPrimitive;
use solana_program::{
    decode_error::DecodeError,
    msg,
    program_error::{PrintProgramError, ProgramError},
};
use thiserror::Error;

#[derive(Error, Debug, Copy, Clone, FromPrimitive, PartialEq, Eq)]
pub enum PawnShopError {
    #[error("Invalid instruction")]
    InvalidInstruction = 0,

    #[error("Account does not match its program derived address")]
    InvalidPda = 1,

    #[error("Account not initialized")]
    AccountNotInitialized = 2,

    #[error("Account already initialized")]
    AccountAlreadyInitialized = 3,

    // Account constraints. These reject the wrong caller or the wrong account
    // wiring, not a loan in the wrong state.
    #[error("Signer is not the borrower of this loan")]
    ConstraintBorrower = 4,

    #[error("Signer is not the lender of this loan")]
    ConstraintLender = 5,

    #[error("Signer is not the fee collector")]
    ConstraintFeeCollector = 6,

    #[error("Signer is not the admin authority")]
    ConstraintAuthority = 7,

    #[error("Collateral account does not belong to this loan")]
    ConstraintPawnTokenAccount = 8,

    #[error("Payment account has the wrong owner or currency")]
    ConstraintPaymentAccount = 9,

    // Loan lifecycle
    #[error("InvalidLoanTerms")]
    InvalidLoanTerms = 10,

    #[error("InvalidLoanStatus")]
    InvalidLoanStatus = 11,

    #[error("UnexpectedDesiredTerms")]
    UnexpectedDesiredTerms = 12,

    #[error("UnexpectedPawnMint")]
    UnexpectedPawnMint = 13,

    #[error("UnexpectedPawnAmount")]
    UnexpectedPawnAmount = 14,

    #[error("CannotSeizeBeforeExpiry")]
    CannotSeizeBeforeExpiry = 15,

    #[error("Collateral account is not a single unfrozen unit owned by the borrower")]
    InvalidPawnAccount = 16,

    #[error("Fee rate above 10000 bps")]
    InvalidFeeRate = 17,

    #[error("Arithmetic overflow")]
    ArithmeticOverflow = 18,
}

impl PrintProgramError for PawnShopError {
    fn print<E>(&self) {
        msg!("PawnShopError: {}", self);
    }
}

impl From<PawnShopError> for ProgramError {
    fn from(e: PawnShopError) -> Self {
        ProgramError::Custom(e as u32)
    }
}

impl<T> DecodeError<T> for PawnShopError {
    fn type_of() -> &'static str {
        "PawnShopError"
    }
}

//! Custody of the pawn and movement of loan currency.
//!
//! The lifecycle handlers in [`crate::engine`] only talk to these two traits.
//! On chain they are backed by token program CPIs ([`cpi::CpiRuntime`]),
//! off chain by [`crate::ledger::LocalLedger`].

pub mod cpi;
pub mod metadata;

use solana_program::{
    entrypoint::ProgramResult, program_error::ProgramError, program_option::COption,
    pubkey::Pubkey,
};
use spl_token::state::{Account as TokenAccount, AccountState};

/// Decoded view of an SPL token account
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenAccountState {
    pub mint: Pubkey,
    pub owner: Pubkey,
    pub amount: u64,
    pub delegate: Option<Pubkey>,
    pub delegated_amount: u64,
    pub is_frozen: bool,
}

impl TokenAccountState {
    pub fn new(mint: Pubkey, owner: Pubkey, amount: u64) -> Self {
        Self {
            mint,
            owner,
            amount,
            delegate: None,
            delegated_amount: 0,
            is_frozen: false,
        }
    }

    /// True while the account is frozen under `loan`'s delegated authority
    pub fn is_held_by(&self, loan: &Pubkey) -> bool {
        self.is_frozen && self.delegate.as_ref() == Some(loan)
    }
}

impl From<TokenAccount> for TokenAccountState {
    fn from(account: TokenAccount) -> Self {
        Self {
            mint: account.mint,
            owner: account.owner,
            amount: account.amount,
            delegate: match account.delegate {
                COption::Some(delegate) => Some(delegate),
                COption::None => None,
            },
            delegated_amount: account.delegated_amount,
            is_frozen: account.state == AccountState::Frozen,
        }
    }
}

/// Operations on the account holding the pawn. The owner never changes
/// except through `transfer_pawn`.
pub trait Custody {
    fn token_account(&self, account: &Pubkey) -> Result<TokenAccountState, ProgramError>;

    /// Grants `delegate` authority over `amount` units. Signed by `owner`.
    fn delegate(
        &mut self,
        account: &Pubkey,
        owner: &Pubkey,
        delegate: &Pubkey,
        amount: u64,
    ) -> ProgramResult;

    /// Clears the delegate. Signed by `owner`.
    fn revoke(&mut self, account: &Pubkey, owner: &Pubkey) -> ProgramResult;

    /// Makes the account non-transferable. Signed by its delegate.
    fn freeze(&mut self, account: &Pubkey, delegate: &Pubkey) -> ProgramResult;

    fn thaw(&mut self, account: &Pubkey, delegate: &Pubkey) -> ProgramResult;

    /// Moves units out of `from`, signed by its owner or delegate. Moving the
    /// whole delegated amount consumes the delegation.
    fn transfer_pawn(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> ProgramResult;
}

/// Moves loan currency. The backend is picked by currency: the native mint
/// moves lamports between wallets, any other mint moves SPL tokens.
pub trait Treasury {
    /// Who the funds in `account` belong to: the wallet itself for lamports,
    /// the token owner for token accounts of `currency`.
    fn payment_owner(&self, currency: &Pubkey, account: &Pubkey) -> Result<Pubkey, ProgramError>;

    /// Balance that can leave `account` without dropping below its reserve
    fn withdrawable(&self, currency: &Pubkey, account: &Pubkey) -> Result<u64, ProgramError>;

    fn pay(
        &mut self,
        currency: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> ProgramResult;
}

pub fn is_native(currency: &Pubkey) -> bool {
    *currency == spl_token::native_mint::id()
}

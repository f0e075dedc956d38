//! In-memory ledger running the loan lifecycle off chain.
//!
//! `LocalLedger` keeps loan records, token accounts and lamport balances in
//! maps and implements [`Custody`] and [`Treasury`] with token program
//! semantics, so the same [`PawnShopEngine`] handlers that run on chain can be
//! driven directly in tests and simulations. Every operation is atomic: if it
//! fails, the ledger is left exactly as it was.
//!
//! Callers are assumed to have verified signatures. The key passed as the
//! acting party is treated as a signer. Account rent is not modeled except for
//! the reserve the admin account keeps back from fee withdrawals.

use std::collections::BTreeMap;

use solana_program::{entrypoint::ProgramResult, program_error::ProgramError, pubkey::Pubkey};
use spl_token::error::TokenError;

use crate::{
    constants::DEFAULT_FEE_RATE_BPS,
    custody::{is_native, Custody, TokenAccountState, Treasury},
    engine::{PawnShopEngine, UnderwriteOffer},
    error::PawnShopError,
    math::Settlement,
    pda::{fee_account_address, AdminPDA, PawnLoanPDA},
    state::{AdminConfig, LoanTerms, PawnLoan},
};

/// Lamports a zero-data system account needs to stay rent exempt
const DEFAULT_ADMIN_RESERVE: u64 = 890_880;

#[derive(Debug, Clone)]
pub struct LocalLedger {
    program_id: Pubkey,
    now_ms: i64,
    loans: BTreeMap<Pubkey, PawnLoan>,
    token_accounts: BTreeMap<Pubkey, TokenAccountState>,
    lamports: BTreeMap<Pubkey, u64>,
    admin: Option<AdminConfig>,
    admin_key: Pubkey,
    admin_bump: u8,
    admin_reserve: u64,
}

impl LocalLedger {
    pub fn new(program_id: Pubkey) -> Self {
        let (admin_key, admin_bump) = AdminPDA::derive(&program_id);
        Self {
            program_id,
            now_ms: 0,
            loans: BTreeMap::new(),
            token_accounts: BTreeMap::new(),
            lamports: BTreeMap::new(),
            admin: None,
            admin_key,
            admin_bump,
            admin_reserve: DEFAULT_ADMIN_RESERVE,
        }
    }

    /// Runs `f`, rolling every change back if it fails
    fn transact<T>(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<T, ProgramError>,
    ) -> Result<T, ProgramError> {
        let snapshot = self.clone();
        let result = f(self);
        if result.is_err() {
            *self = snapshot;
        }
        result
    }

    // Fixtures

    pub fn set_now(&mut self, now_ms: i64) {
        self.now_ms = now_ms;
    }

    pub fn advance(&mut self, ms: u64) {
        self.now_ms = self
            .now_ms
            .saturating_add(i64::try_from(ms).unwrap_or(i64::MAX));
    }

    pub fn fund(&mut self, wallet: &Pubkey, lamports: u64) {
        let balance = self.lamports.entry(*wallet).or_insert(0);
        *balance = balance.saturating_add(lamports);
    }

    pub fn create_token_account(&mut self, mint: &Pubkey, owner: &Pubkey, amount: u64) -> Pubkey {
        let key = Pubkey::new_unique();
        self.create_token_account_at(key, mint, owner, amount);
        key
    }

    pub fn create_token_account_at(
        &mut self,
        key: Pubkey,
        mint: &Pubkey,
        owner: &Pubkey,
        amount: u64,
    ) {
        self.token_accounts
            .insert(key, TokenAccountState::new(*mint, *owner, amount));
    }

    /// Opens the admin's fee account for a token currency. Native fees need
    /// no extra account.
    pub fn open_fee_account(&mut self, currency: &Pubkey) -> Pubkey {
        let key = fee_account_address(&self.program_id, currency);
        if !is_native(currency) && !self.token_accounts.contains_key(&key) {
            let admin_key = self.admin_key;
            self.create_token_account_at(key, currency, &admin_key, 0);
        }
        key
    }

    // Queries

    pub fn now(&self) -> i64 {
        self.now_ms
    }

    pub fn program_id(&self) -> &Pubkey {
        &self.program_id
    }

    pub fn admin_key(&self) -> &Pubkey {
        &self.admin_key
    }

    pub fn admin(&self) -> Option<&AdminConfig> {
        self.admin.as_ref()
    }

    pub fn loan(&self, key: &Pubkey) -> Option<&PawnLoan> {
        self.loans.get(key)
    }

    pub fn loans(&self) -> impl Iterator<Item = (&Pubkey, &PawnLoan)> {
        self.loans.iter()
    }

    pub fn token(&self, key: &Pubkey) -> Option<&TokenAccountState> {
        self.token_accounts.get(key)
    }

    pub fn lamports(&self, wallet: &Pubkey) -> u64 {
        self.lamports.get(wallet).copied().unwrap_or(0)
    }

    /// Holdings of `currency` in `account`
    pub fn balance(&self, currency: &Pubkey, account: &Pubkey) -> u64 {
        if is_native(currency) {
            self.lamports(account)
        } else {
            self.token(account).map(|state| state.amount).unwrap_or(0)
        }
    }

    /// What repaying `loan_key` now would cost under the current fee rate
    pub fn amount_due(&self, loan_key: &Pubkey) -> Result<Option<Settlement>, ProgramError> {
        let loan = self
            .loans
            .get(loan_key)
            .ok_or(PawnShopError::AccountNotInitialized)?;
        let fee_rate_bps = self
            .admin
            .as_ref()
            .map(|admin| admin.fee_rate_bps)
            .unwrap_or(DEFAULT_FEE_RATE_BPS);
        Ok(loan.amount_due(self.now_ms, fee_rate_bps)?)
    }

    // Instructions

    pub fn initialize_admin(
        &mut self,
        authority: &Pubkey,
        fee_collector: &Pubkey,
        fee_rate_bps: Option<u16>,
    ) -> ProgramResult {
        self.transact(|ledger| {
            if ledger.admin.is_some() {
                return Err(PawnShopError::AccountAlreadyInitialized.into());
            }

            let config = AdminConfig::new(
                *authority,
                *fee_collector,
                fee_rate_bps.unwrap_or(DEFAULT_FEE_RATE_BPS),
                ledger.admin_bump,
            );
            config.validate()?;

            let admin_key = ledger.admin_key;
            let reserve = ledger.admin_reserve;
            ledger.debit(authority, reserve)?;
            ledger.credit(&admin_key, reserve)?;
            ledger.admin = Some(config);
            Ok(())
        })
    }

    pub fn update_admin(
        &mut self,
        authority: &Pubkey,
        fee_collector: Option<Pubkey>,
        fee_rate_bps: Option<u16>,
    ) -> ProgramResult {
        self.transact(|ledger| {
            let admin = ledger
                .admin
                .as_mut()
                .ok_or(PawnShopError::AccountNotInitialized)?;
            PawnShopEngine::update_admin(admin, authority, fee_collector, fee_rate_bps)
        })
    }

    /// Returns the address of the new loan record
    pub fn request_loan(
        &mut self,
        base: &Pubkey,
        borrower: &Pubkey,
        pawn_token_account: &Pubkey,
        desired_terms: LoanTerms,
    ) -> Result<Pubkey, ProgramError> {
        self.transact(|ledger| {
            let (loan_key, bump) = PawnLoanPDA::derive(&ledger.program_id, base);
            if ledger.loans.contains_key(&loan_key) {
                return Err(PawnShopError::AccountAlreadyInitialized.into());
            }

            let now = ledger.now_ms;
            let loan = PawnShopEngine::request_loan(
                ledger,
                &loan_key,
                bump,
                base,
                borrower,
                pawn_token_account,
                desired_terms,
                now,
            )?;
            ledger.loans.insert(loan_key, loan);
            Ok(loan_key)
        })
    }

    pub fn underwrite_loan(
        &mut self,
        loan_key: &Pubkey,
        pawn_token_account: &Pubkey,
        lender: &Pubkey,
        lender_payment_account: &Pubkey,
        borrower_payment_account: &Pubkey,
        offer: &UnderwriteOffer,
    ) -> ProgramResult {
        self.transact(|ledger| {
            let mut loan = ledger.take_loan(loan_key)?;
            let now = ledger.now_ms;
            PawnShopEngine::underwrite_loan(
                ledger,
                loan_key,
                &mut loan,
                pawn_token_account,
                lender,
                lender_payment_account,
                borrower_payment_account,
                offer,
                now,
            )?;
            ledger.loans.insert(*loan_key, loan);
            Ok(())
        })
    }

    pub fn repay_loan(
        &mut self,
        loan_key: &Pubkey,
        borrower: &Pubkey,
        pawn_token_account: &Pubkey,
        borrower_payment_account: &Pubkey,
        lender_payment_account: &Pubkey,
        admin_payment_account: &Pubkey,
    ) -> Result<Settlement, ProgramError> {
        self.transact(|ledger| {
            let admin = ledger
                .admin
                .clone()
                .ok_or(PawnShopError::AccountNotInitialized)?;
            let admin_key = ledger.admin_key;
            let mut loan = ledger.take_loan(loan_key)?;
            let now = ledger.now_ms;
            let settlement = PawnShopEngine::repay_loan(
                ledger,
                loan_key,
                &mut loan,
                &admin_key,
                &admin,
                borrower,
                pawn_token_account,
                borrower_payment_account,
                lender_payment_account,
                admin_payment_account,
                now,
            )?;
            ledger.loans.insert(*loan_key, loan);
            Ok(settlement)
        })
    }

    pub fn seize_pawn(
        &mut self,
        loan_key: &Pubkey,
        lender: &Pubkey,
        pawn_token_account: &Pubkey,
        lender_pawn_token_account: &Pubkey,
    ) -> ProgramResult {
        self.transact(|ledger| {
            let mut loan = ledger.take_loan(loan_key)?;
            let now = ledger.now_ms;
            PawnShopEngine::seize_pawn(
                ledger,
                loan_key,
                &mut loan,
                lender,
                pawn_token_account,
                lender_pawn_token_account,
                now,
            )?;
            ledger.loans.insert(*loan_key, loan);
            Ok(())
        })
    }

    /// Cancels an open loan and deletes its record
    pub fn cancel_loan(
        &mut self,
        loan_key: &Pubkey,
        borrower: &Pubkey,
        pawn_token_account: &Pubkey,
    ) -> ProgramResult {
        self.transact(|ledger| {
            let loan = ledger.take_loan(loan_key)?;
            PawnShopEngine::cancel_loan(ledger, loan_key, &loan, borrower, pawn_token_account)
        })
    }

    pub fn withdraw_fees(
        &mut self,
        fee_collector: &Pubkey,
        currency: &Pubkey,
        fee_account: &Pubkey,
        destination: &Pubkey,
    ) -> Result<u64, ProgramError> {
        self.transact(|ledger| {
            let admin = ledger
                .admin
                .clone()
                .ok_or(PawnShopError::AccountNotInitialized)?;
            let admin_key = ledger.admin_key;
            PawnShopEngine::withdraw_fees(
                ledger,
                &admin_key,
                &admin,
                fee_collector,
                currency,
                fee_account,
                destination,
            )
        })
    }

    // Internals

    fn take_loan(&mut self, key: &Pubkey) -> Result<PawnLoan, ProgramError> {
        self.loans
            .remove(key)
            .ok_or_else(|| PawnShopError::AccountNotInitialized.into())
    }

    fn token_mut(&mut self, key: &Pubkey) -> Result<&mut TokenAccountState, ProgramError> {
        self.token_accounts
            .get_mut(key)
            .ok_or(ProgramError::UninitializedAccount)
    }

    fn debit(&mut self, wallet: &Pubkey, amount: u64) -> ProgramResult {
        let balance = self.lamports.entry(*wallet).or_insert(0);
        *balance = balance
            .checked_sub(amount)
            .ok_or(ProgramError::InsufficientFunds)?;
        Ok(())
    }

    fn credit(&mut self, wallet: &Pubkey, amount: u64) -> ProgramResult {
        let balance = self.lamports.entry(*wallet).or_insert(0);
        *balance = balance
            .checked_add(amount)
            .ok_or(PawnShopError::ArithmeticOverflow)?;
        Ok(())
    }

    /// Token program transfer rules: either side frozen fails, mints must
    /// match, and a delegate spends from its allowance.
    fn transfer_tokens(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> ProgramResult {
        let source = self.token_account(from)?;
        let destination = self.token_account(to)?;

        if source.is_frozen || destination.is_frozen {
            return Err(TokenError::AccountFrozen.into());
        }
        if source.mint != destination.mint {
            return Err(TokenError::MintMismatch.into());
        }
        if source.amount < amount {
            return Err(TokenError::InsufficientFunds.into());
        }

        let by_delegate = if source.owner == *authority {
            false
        } else if source.delegate.as_ref() == Some(authority) {
            if source.delegated_amount < amount {
                return Err(TokenError::InsufficientFunds.into());
            }
            true
        } else {
            return Err(TokenError::OwnerMismatch.into());
        };

        let source = self.token_mut(from)?;
        if by_delegate {
            source.delegated_amount -= amount;
            if source.delegated_amount == 0 {
                source.delegate = None;
            }
        }
        if from == to {
            return Ok(());
        }
        source.amount -= amount;

        let destination = self.token_mut(to)?;
        destination.amount = destination
            .amount
            .checked_add(amount)
            .ok_or(TokenError::Overflow)?;
        Ok(())
    }
}

impl Custody for LocalLedger {
    fn token_account(&self, account: &Pubkey) -> Result<TokenAccountState, ProgramError> {
        self.token_accounts
            .get(account)
            .cloned()
            .ok_or(ProgramError::UninitializedAccount)
    }

    fn delegate(
        &mut self,
        account: &Pubkey,
        owner: &Pubkey,
        delegate: &Pubkey,
        amount: u64,
    ) -> ProgramResult {
        let state = self.token_mut(account)?;
        if state.owner != *owner {
            return Err(TokenError::OwnerMismatch.into());
        }
        if state.is_frozen {
            return Err(TokenError::AccountFrozen.into());
        }
        state.delegate = Some(*delegate);
        state.delegated_amount = amount;
        Ok(())
    }

    fn revoke(&mut self, account: &Pubkey, owner: &Pubkey) -> ProgramResult {
        let state = self.token_mut(account)?;
        if state.owner != *owner {
            return Err(TokenError::OwnerMismatch.into());
        }
        if state.is_frozen {
            return Err(TokenError::AccountFrozen.into());
        }
        state.delegate = None;
        state.delegated_amount = 0;
        Ok(())
    }

    fn freeze(&mut self, account: &Pubkey, delegate: &Pubkey) -> ProgramResult {
        let state = self.token_mut(account)?;
        if state.delegate.as_ref() != Some(delegate) {
            return Err(TokenError::OwnerMismatch.into());
        }
        if state.is_frozen {
            return Err(TokenError::InvalidState.into());
        }
        state.is_frozen = true;
        Ok(())
    }

    fn thaw(&mut self, account: &Pubkey, delegate: &Pubkey) -> ProgramResult {
        let state = self.token_mut(account)?;
        if state.delegate.as_ref() != Some(delegate) {
            return Err(TokenError::OwnerMismatch.into());
        }
        if !state.is_frozen {
            return Err(TokenError::InvalidState.into());
        }
        state.is_frozen = false;
        Ok(())
    }

    fn transfer_pawn(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> ProgramResult {
        self.transfer_tokens(from, to, authority, amount)
    }
}

impl Treasury for LocalLedger {
    fn payment_owner(&self, currency: &Pubkey, account: &Pubkey) -> Result<Pubkey, ProgramError> {
        if is_native(currency) {
            // Lamports are paid wallet to wallet, never out of token accounts
            if self.token_accounts.contains_key(account) {
                return Err(PawnShopError::ConstraintPaymentAccount.into());
            }
            return Ok(*account);
        }

        let state = self.token_account(account)?;
        if state.mint != *currency {
            return Err(PawnShopError::ConstraintPaymentAccount.into());
        }
        Ok(state.owner)
    }

    fn withdrawable(&self, currency: &Pubkey, account: &Pubkey) -> Result<u64, ProgramError> {
        if is_native(currency) {
            let reserve = if *account == self.admin_key {
                self.admin_reserve
            } else {
                0
            };
            return Ok(self.lamports(account).saturating_sub(reserve));
        }

        Ok(self.token_account(account)?.amount)
    }

    fn pay(
        &mut self,
        currency: &Pubkey,
        from: &Pubkey,
        to: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> ProgramResult {
        if amount == 0 {
            return Ok(());
        }

        if !is_native(currency) {
            return self.transfer_tokens(from, to, authority, amount);
        }

        if authority != from {
            return Err(if *from == self.admin_key {
                ProgramError::MissingRequiredSignature
            } else {
                PawnShopError::ConstraintPaymentAccount.into()
            });
        }
        self.debit(from, amount)?;
        self.credit(to, amount)
    }
}

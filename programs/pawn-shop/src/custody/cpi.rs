//! On-chain backend of the custody and treasury seams

use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    instruction::Instruction,
    program::{invoke, invoke_signed},
    program_error::ProgramError,
    program_pack::Pack,
    pubkey::Pubkey,
    rent::Rent,
    system_instruction, system_program,
    sysvar::Sysvar,
};
use spl_token::{instruction as token_instruction, state::Account as TokenAccount};

use super::{is_native, metadata, Custody, TokenAccountState, Treasury};
use crate::error::PawnShopError;

/// A program address this runtime can sign for
struct PdaSigner {
    key: Pubkey,
    seeds: Vec<Vec<u8>>,
}

/// Executes custody and payment operations as CPIs over the accounts passed to
/// the current instruction. Accounts are looked up by key, so an operation on
/// an account the caller did not pass fails with `NotEnoughAccountKeys`.
pub struct CpiRuntime<'a, 'b> {
    program_id: &'b Pubkey,
    accounts: &'b [AccountInfo<'a>],
    signers: Vec<PdaSigner>,
}

impl<'a, 'b> CpiRuntime<'a, 'b> {
    pub fn new(program_id: &'b Pubkey, accounts: &'b [AccountInfo<'a>]) -> Self {
        Self {
            program_id,
            accounts,
            signers: Vec::new(),
        }
    }

    /// Lets the runtime sign as the program address `key` derived from `seeds`
    pub fn with_signer(mut self, key: Pubkey, seeds: &[&[u8]]) -> Self {
        self.signers.push(PdaSigner {
            key,
            seeds: seeds.iter().map(|seed| seed.to_vec()).collect(),
        });
        self
    }

    fn account(&self, key: &Pubkey) -> Result<&AccountInfo<'a>, ProgramError> {
        self.accounts
            .iter()
            .find(|info| info.key == key)
            .ok_or(ProgramError::NotEnoughAccountKeys)
    }

    fn can_sign(&self, key: &Pubkey) -> bool {
        self.signers.iter().any(|signer| signer.key == *key)
    }

    /// Invokes `instruction`, adding PDA signer seeds when `authority` is one
    /// of ours. Wallet authorities sign the outer transaction instead.
    fn invoke_as(
        &self,
        instruction: &Instruction,
        keys: &[&Pubkey],
        authority: &Pubkey,
    ) -> ProgramResult {
        let infos = keys
            .iter()
            .map(|key| self.account(key).map(|info| info.clone()))
            .collect::<Result<Vec<_>, _>>()?;

        match self.signers.iter().find(|signer| signer.key == *authority) {
            Some(signer) => {
                let seeds: Vec<&[u8]> = signer.seeds.iter().map(|seed| seed.as_slice()).collect();
                invoke_signed(instruction, &infos, &[seeds.as_slice()])
            }
            None => invoke(instruction, &infos),
        }
    }

    fn freeze_or_thaw(&self, account: &Pubkey, delegate: &Pubkey, freeze: bool) -> ProgramResult {
        let mint = self.token_account(account)?.mint;
        let (edition, _) = metadata::find_edition_address(&mint);

        let instruction = if freeze {
            metadata::freeze_delegated_account(delegate, account, &edition, &mint)
        } else {
            metadata::thaw_delegated_account(delegate, account, &edition, &mint)
        };

        self.invoke_as(
            &instruction,
            &[delegate, account, &edition, &mint, &spl_token::id(), &metadata::id()],
            delegate,
        )
    }
}

impl<'a, 'b> Custody for CpiRuntime<'a, 'b> {
    fn token_account(&self, account: &Pubkey) -> Result<TokenAccountState, ProgramError> {
        let info = self.account(account)?;
        if info.owner != &spl_token::id() {
            return Err(ProgramError::IncorrectProgramId);
        }

        let state = TokenAccount::unpack(&info.data.borrow())?;
        Ok(state.into())
    }

    fn delegate(
        &mut self,
        account: &Pubkey,
        owner: &Pubkey,
        delegate: &Pubkey,
        amount: u64,
    ) -> ProgramResult {
        let instruction =
            token_instruction::approve(&spl_token::id(), account, delegate, owner, &[], amount)?;

        self.invoke_as(
            &instruction,
            &[account, delegate, owner, &spl_token::id()],
            owner,
        )
    }

    fn revoke(&mut self, account: &Pubkey, owner: &Pubkey) -> ProgramResult {
        let instruction = token_instruction::revoke(&spl_token::id(), account, owner, &[])?;

        self.invoke_as(&instruction, &[account, owner, &spl_token::id()], owner)
    }

    fn freeze(&mut self, account: &Pubkey, delegate: &Pubkey) -> ProgramResult {
        self.freeze_or_thaw(account, delegate, true)
    }

    fn thaw(&mut self, account: &Pubkey, delegate: &Pubkey) -> ProgramResult {
        self.freeze_or_thaw(account, delegate, false)
    }

    fn transfer_pawn(
        &mut self,
        from: &Pubkey,
        to: &Pubkey,
        authority: &Pubkey,
        amount: u64,
    ) -> ProgramResult {
        let instruction =
            token_instruction::transfer(&spl_token::id(), from, to, authority, &[], amount)?;

        self.invoke_as(&instruction, &[from, to, authority, &spl_token::id()], authority)
    }
}

impl<'a, 'b> Treasury for CpiRuntime<'a, 'b> {
    fn payment_owner(&self, currency: &Pubkey, account: &Pubkey) -> Result<Pubkey, ProgramError> {
        if is_native(currency) {
            let info = self.account(account)?;
            if info.owner != &system_program::id() && info.owner != self.program_id {
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
            let info = self.account(account)?;
            let reserve = Rent::get()?.minimum_balance(info.data_len());
            return Ok(info.lamports().saturating_sub(reserve));
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
            let instruction =
                token_instruction::transfer(&spl_token::id(), from, to, authority, &[], amount)?;
            return self.invoke_as(
                &instruction,
                &[from, to, authority, &spl_token::id()],
                authority,
            );
        }

        let from_info = self.account(from)?;
        if from_info.owner == self.program_id {
            // The system program cannot debit accounts it does not own
            if !self.can_sign(authority) || authority != from {
                return Err(ProgramError::MissingRequiredSignature);
            }
            let to_info = self.account(to)?;

            let from_lamports = from_info
                .lamports()
                .checked_sub(amount)
                .ok_or(ProgramError::InsufficientFunds)?;
            let to_lamports = to_info
                .lamports()
                .checked_add(amount)
                .ok_or(PawnShopError::ArithmeticOverflow)?;

            **from_info.try_borrow_mut_lamports()? = from_lamports;
            **to_info.try_borrow_mut_lamports()? = to_lamports;
            return Ok(());
        }

        if authority != from {
            return Err(PawnShopError::ConstraintPaymentAccount.into());
        }

        self.invoke_as(
            &system_instruction::transfer(from, to, amount),
            &[from, to, &system_program::id()],
            authority,
        )
    }
}

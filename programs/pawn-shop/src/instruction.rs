use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{
    instruction::{AccountMeta, Instruction},
    program_error::ProgramError,
    pubkey::Pubkey,
    system_program,
};

use crate::{
    custody::{is_native, metadata},
    error::PawnShopError,
    pda::{fee_account_address, AdminPDA, EditionPDA, PawnLoanPDA},
    state::LoanTerms,
};

#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub enum PawnShopInstruction {
    /// Create the admin config
    /// Accounts:
    /// 0. `[signer, writable]` Authority, pays for the account
    /// 1. `[writable]` Admin PDA
    /// 2. `[]` System program
    InitializeAdmin {
        fee_collector: Pubkey,
        /// Defaults to 500 (5%) when absent
        fee_rate_bps: Option<u16>,
    },

    /// Change the fee collector and/or the fee rate
    /// Accounts:
    /// 0. `[signer]` Authority
    /// 1. `[writable]` Admin PDA
    UpdateAdmin {
        fee_collector: Option<Pubkey>,
        fee_rate_bps: Option<u16>,
    },

    /// Open a loan request, delegating and freezing the pawn in place
    /// Accounts:
    /// 0. `[signer]` Base key the loan PDA derives from
    /// 1. `[writable]` Pawn loan PDA (uninitialized)
    /// 2. `[signer, writable]` Borrower, pays for the loan account
    /// 3. `[writable]` Borrower's token account holding the pawn
    /// 4. `[]` Pawn mint
    /// 5. `[]` Pawn master edition
    /// 6. `[]` Token metadata program
    /// 7. `[]` Token program
    /// 8. `[]` System program
    RequestLoan { desired_terms: LoanTerms },

    /// Fund an open loan on exactly the terms the lender saw
    /// Accounts:
    /// 0. `[writable]` Pawn loan PDA
    /// 1. `[]` Pawn token account
    /// 2. `[signer, writable]` Lender
    /// 3. `[writable]` Lender payment account (the lender itself for native loans)
    /// 4. `[writable]` Borrower payment account (the borrower itself for native loans)
    /// 5. `[]` Token program
    /// 6. `[]` System program
    UnderwriteLoan {
        expected_terms: LoanTerms,
        expected_pawn_mint: Pubkey,
        expected_pawn_amount: Option<u64>,
    },

    /// Pay back an active loan and release the pawn
    /// Accounts:
    /// 0. `[writable]` Pawn loan PDA
    /// 1. `[writable]` Pawn token account
    /// 2. `[]` Pawn mint
    /// 3. `[]` Pawn master edition
    /// 4. `[signer, writable]` Borrower
    /// 5. `[writable]` Borrower payment account
    /// 6. `[writable]` Lender payment account
    /// 7. `[]` Admin PDA
    /// 8. `[writable]` Admin fee account
    /// 9. `[]` Token metadata program
    /// 10. `[]` Token program
    /// 11. `[]` System program
    RepayLoan,

    /// Take the pawn of an expired loan
    /// Accounts:
    /// 0. `[writable]` Pawn loan PDA
    /// 1. `[writable]` Pawn token account
    /// 2. `[]` Pawn mint
    /// 3. `[]` Pawn master edition
    /// 4. `[signer]` Lender
    /// 5. `[writable]` Lender's token account for the pawn mint
    /// 6. `[]` Token metadata program
    /// 7. `[]` Token program
    SeizePawn,

    /// Withdraw an open request and close its record
    /// Accounts:
    /// 0. `[writable]` Pawn loan PDA
    /// 1. `[writable]` Pawn token account
    /// 2. `[]` Pawn mint
    /// 3. `[]` Pawn master edition
    /// 4. `[signer, writable]` Borrower, receives the record's rent
    /// 5. `[]` Token metadata program
    /// 6. `[]` Token program
    CancelLoan,

    /// Move accumulated fees out
    /// Accounts:
    /// 0. `[signer]` Fee collector
    /// 1. `[]` Admin PDA (writable for native fees, which it holds itself)
    /// 2. `[writable]` Fee account
    /// 3. `[writable]` Destination
    /// 4. `[]` Token program
    /// 5. `[]` System program
    WithdrawFees { currency: Pubkey },
}

impl PawnShopInstruction {
    pub fn unpack(input: &[u8]) -> Result<Self, ProgramError> {
        Self::try_from_slice(input).map_err(|_| PawnShopError::InvalidInstruction.into())
    }
}

// Helper functions to create instructions

pub fn initialize_admin(
    program_id: &Pubkey,
    authority: &Pubkey,
    fee_collector: &Pubkey,
    fee_rate_bps: Option<u16>,
) -> Instruction {
    let (admin, _) = AdminPDA::derive(program_id);
    Instruction::new_with_borsh(
        *program_id,
        &PawnShopInstruction::InitializeAdmin {
            fee_collector: *fee_collector,
            fee_rate_bps,
        },
        vec![
            AccountMeta::new(*authority, true),
            AccountMeta::new(admin, false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

pub fn update_admin(
    program_id: &Pubkey,
    authority: &Pubkey,
    fee_collector: Option<Pubkey>,
    fee_rate_bps: Option<u16>,
) -> Instruction {
    let (admin, _) = AdminPDA::derive(program_id);
    Instruction::new_with_borsh(
        *program_id,
        &PawnShopInstruction::UpdateAdmin {
            fee_collector,
            fee_rate_bps,
        },
        vec![
            AccountMeta::new_readonly(*authority, true),
            AccountMeta::new(admin, false),
        ],
    )
}

pub fn request_loan(
    program_id: &Pubkey,
    base: &Pubkey,
    borrower: &Pubkey,
    pawn_token_account: &Pubkey,
    pawn_mint: &Pubkey,
    desired_terms: LoanTerms,
) -> Instruction {
    let (pawn_loan, _) = PawnLoanPDA::derive(program_id, base);
    let (edition, _) = EditionPDA::derive(pawn_mint);
    Instruction::new_with_borsh(
        *program_id,
        &PawnShopInstruction::RequestLoan { desired_terms },
        vec![
            AccountMeta::new_readonly(*base, true),
            AccountMeta::new(pawn_loan, false),
            AccountMeta::new(*borrower, true),
            AccountMeta::new(*pawn_token_account, false),
            AccountMeta::new_readonly(*pawn_mint, false),
            AccountMeta::new_readonly(edition, false),
            AccountMeta::new_readonly(metadata::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
            AccountMeta::new_readonly(system_program::id(), false),
        ],
    )
}

#[allow(clippy::too_many_arguments)]
pub fn underwrite_loan(
    program_id: &Pubkey,
    pawn_loan: &Pubkey,
    pawn_token_account: &Pubkey,
    lender: &Pubkey,
    lender_payment_account: &Pubkey,
    borrower_payment_account: &Pubkey,
    expected_terms: LoanTerms,
    expected_pawn_mint: &Pubkey,
    expected_pawn_amount: Option<u64>,
) -> Instruction {
    let mut accounts = vec![
        AccountMeta::new(*pawn_loan, false),
        AccountMeta::new_readonly(*pawn_token_account, false),
        AccountMeta::new(*lender, true),
    ];
    push_payment_account(&mut accounts, lender_payment_account, lender);
    push_payment_account(&mut accounts, borrower_payment_account, lender);
    accounts.push(AccountMeta::new_readonly(spl_token::id(), false));
    accounts.push(AccountMeta::new_readonly(system_program::id(), false));

    Instruction::new_with_borsh(
        *program_id,
        &PawnShopInstruction::UnderwriteLoan {
            expected_terms,
            expected_pawn_mint: *expected_pawn_mint,
            expected_pawn_amount,
        },
        accounts,
    )
}

#[allow(clippy::too_many_arguments)]
pub fn repay_loan(
    program_id: &Pubkey,
    pawn_loan: &Pubkey,
    pawn_token_account: &Pubkey,
    pawn_mint: &Pubkey,
    borrower: &Pubkey,
    borrower_payment_account: &Pubkey,
    lender_payment_account: &Pubkey,
    currency: &Pubkey,
) -> Instruction {
    let (edition, _) = EditionPDA::derive(pawn_mint);
    let (admin, _) = AdminPDA::derive(program_id);
    let admin_payment_account = fee_account_address(program_id, currency);

    let mut accounts = vec![
        AccountMeta::new(*pawn_loan, false),
        AccountMeta::new(*pawn_token_account, false),
        AccountMeta::new_readonly(*pawn_mint, false),
        AccountMeta::new_readonly(edition, false),
        AccountMeta::new(*borrower, true),
    ];
    push_payment_account(&mut accounts, borrower_payment_account, borrower);
    accounts.push(AccountMeta::new(*lender_payment_account, false));
    if is_native(currency) {
        // Native fees land on the admin PDA itself
        accounts.push(AccountMeta::new(admin, false));
    } else {
        accounts.push(AccountMeta::new_readonly(admin, false));
    }
    accounts.push(AccountMeta::new(admin_payment_account, false));
    accounts.push(AccountMeta::new_readonly(metadata::id(), false));
    accounts.push(AccountMeta::new_readonly(spl_token::id(), false));
    accounts.push(AccountMeta::new_readonly(system_program::id(), false));

    Instruction::new_with_borsh(*program_id, &PawnShopInstruction::RepayLoan, accounts)
}

pub fn seize_pawn(
    program_id: &Pubkey,
    pawn_loan: &Pubkey,
    pawn_token_account: &Pubkey,
    pawn_mint: &Pubkey,
    lender: &Pubkey,
    lender_pawn_token_account: &Pubkey,
) -> Instruction {
    let (edition, _) = EditionPDA::derive(pawn_mint);
    Instruction::new_with_borsh(
        *program_id,
        &PawnShopInstruction::SeizePawn,
        vec![
            AccountMeta::new(*pawn_loan, false),
            AccountMeta::new(*pawn_token_account, false),
            AccountMeta::new_readonly(*pawn_mint, false),
            AccountMeta::new_readonly(edition, false),
            AccountMeta::new_readonly(*lender, true),
            AccountMeta::new(*lender_pawn_token_account, false),
            AccountMeta::new_readonly(metadata::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
    )
}

pub fn cancel_loan(
    program_id: &Pubkey,
    pawn_loan: &Pubkey,
    pawn_token_account: &Pubkey,
    pawn_mint: &Pubkey,
    borrower: &Pubkey,
) -> Instruction {
    let (edition, _) = EditionPDA::derive(pawn_mint);
    Instruction::new_with_borsh(
        *program_id,
        &PawnShopInstruction::CancelLoan,
        vec![
            AccountMeta::new(*pawn_loan, false),
            AccountMeta::new(*pawn_token_account, false),
            AccountMeta::new_readonly(*pawn_mint, false),
            AccountMeta::new_readonly(edition, false),
            AccountMeta::new(*borrower, true),
            AccountMeta::new_readonly(metadata::id(), false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
    )
}

pub fn withdraw_fees(
    program_id: &Pubkey,
    fee_collector: &Pubkey,
    currency: &Pubkey,
    destination: &Pubkey,
) -> Instruction {
    let (admin, _) = AdminPDA::derive(program_id);
    let fee_account = fee_account_address(program_id, currency);

    let mut accounts = vec![AccountMeta::new_readonly(*fee_collector, true)];
    if is_native(currency) {
        accounts.push(AccountMeta::new(admin, false));
    } else {
        accounts.push(AccountMeta::new_readonly(admin, false));
    }
    accounts.push(AccountMeta::new(fee_account, false));
    accounts.push(AccountMeta::new(*destination, false));
    accounts.push(AccountMeta::new_readonly(spl_token::id(), false));
    accounts.push(AccountMeta::new_readonly(system_program::id(), false));

    Instruction::new_with_borsh(
        *program_id,
        &PawnShopInstruction::WithdrawFees {
            currency: *currency,
        },
        accounts,
    )
}

/// Payment accounts that are the signing wallet itself must keep the signer flag
fn push_payment_account(accounts: &mut Vec<AccountMeta>, account: &Pubkey, signer: &Pubkey) {
    accounts.push(AccountMeta::new(*account, account == signer));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::MILLISECONDS_PER_DAY;

    fn terms() -> LoanTerms {
        LoanTerms {
            principal_amount: 5_000,
            mint: spl_token::native_mint::id(),
            annual_percentage_rate_bps: 2_500,
            duration: 30 * MILLISECONDS_PER_DAY,
        }
    }

    #[test]
    fn test_builders_round_trip_through_unpack() {
        let program_id = crate::id();
        let mint = Pubkey::new_unique();

        let ix = underwrite_loan(
            &program_id,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            terms(),
            &mint,
            Some(1),
        );
        assert_eq!(
            PawnShopInstruction::unpack(&ix.data).unwrap(),
            PawnShopInstruction::UnderwriteLoan {
                expected_terms: terms(),
                expected_pawn_mint: mint,
                expected_pawn_amount: Some(1),
            }
        );
    }

    #[test]
    fn test_unpack_rejects_garbage() {
        assert_eq!(
            PawnShopInstruction::unpack(&[200, 1, 2]),
            Err(PawnShopError::InvalidInstruction.into())
        );
        assert_eq!(
            PawnShopInstruction::unpack(&[]),
            Err(PawnShopError::InvalidInstruction.into())
        );
    }

    #[test]
    fn test_native_lender_pays_from_its_signing_wallet() {
        let program_id = crate::id();
        let lender = Pubkey::new_unique();
        let borrower = Pubkey::new_unique();

        let ix = underwrite_loan(
            &program_id,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &lender,
            &lender,
            &borrower,
            terms(),
            &Pubkey::new_unique(),
            None,
        );

        assert!(ix.accounts[2].is_signer);
        assert!(ix.accounts[3].is_signer);
        assert!(!ix.accounts[4].is_signer);
        assert!(ix.accounts[4].is_writable);
    }

    #[test]
    fn test_request_loan_derives_loan_and_edition() {
        let program_id = crate::id();
        let base = Pubkey::new_unique();
        let mint = Pubkey::new_unique();

        let ix = request_loan(
            &program_id,
            &base,
            &Pubkey::new_unique(),
            &Pubkey::new_unique(),
            &mint,
            terms(),
        );

        assert_eq!(ix.accounts[1].pubkey, PawnLoanPDA::derive(&program_id, &base).0);
        assert_eq!(ix.accounts[5].pubkey, EditionPDA::derive(&mint).0);
        assert!(ix.accounts[0].is_signer);
        assert!(ix.accounts[2].is_signer);
    }
}

//! Token metadata program CPIs.
//!
//! An NFT mint's freeze authority is its master edition, so the token program
//! cannot freeze the account directly. The metadata program freezes and thaws
//! on behalf of the account's delegate instead.

use solana_program::{
    instruction::{AccountMeta, Instruction},
    pubkey::Pubkey,
};

solana_program::declare_id!("metaqbxxUerdq28cj1RbAWkYQm3ybzjb6a8bt518x1s");

const FREEZE_DELEGATED_ACCOUNT: u8 = 26;
const THAW_DELEGATED_ACCOUNT: u8 = 27;

/// Master edition PDA of `mint`
pub fn find_edition_address(mint: &Pubkey) -> (Pubkey, u8) {
    Pubkey::find_program_address(
        &[b"metadata", id().as_ref(), mint.as_ref(), b"edition"],
        &id(),
    )
}

pub fn freeze_delegated_account(
    delegate: &Pubkey,
    token_account: &Pubkey,
    edition: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    delegated_account_instruction(FREEZE_DELEGATED_ACCOUNT, delegate, token_account, edition, mint)
}

pub fn thaw_delegated_account(
    delegate: &Pubkey,
    token_account: &Pubkey,
    edition: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    delegated_account_instruction(THAW_DELEGATED_ACCOUNT, delegate, token_account, edition, mint)
}

fn delegated_account_instruction(
    tag: u8,
    delegate: &Pubkey,
    token_account: &Pubkey,
    edition: &Pubkey,
    mint: &Pubkey,
) -> Instruction {
    Instruction {
        program_id: id(),
        accounts: vec![
            AccountMeta::new(*delegate, true),
            AccountMeta::new(*token_account, false),
            AccountMeta::new_readonly(*edition, false),
            AccountMeta::new_readonly(*mint, false),
            AccountMeta::new_readonly(spl_token::id(), false),
        ],
        data: vec![tag],
    }
}

//! Program Derived Address (PDA) derivation functions

use solana_program::pubkey::Pubkey;

use crate::{
    constants::{ADMIN_SEED, PAWN_LOAN_SEED},
    custody::{is_native, metadata},
};

/// Loan record PDA, derived from a throwaway base key the borrower signs with
pub struct PawnLoanPDA;
impl PawnLoanPDA {
    pub fn derive(program_id: &Pubkey, base: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[PAWN_LOAN_SEED, base.as_ref()], program_id)
    }

    pub fn seeds(base: &Pubkey, bump: u8) -> Vec<Vec<u8>> {
        vec![PAWN_LOAN_SEED.to_vec(), base.to_bytes().to_vec(), vec![bump]]
    }
}

/// Admin config PDA
pub struct AdminPDA;
impl AdminPDA {
    pub fn derive(program_id: &Pubkey) -> (Pubkey, u8) {
        Pubkey::find_program_address(&[ADMIN_SEED], program_id)
    }

    pub fn seeds(bump: u8) -> Vec<Vec<u8>> {
        vec![ADMIN_SEED.to_vec(), vec![bump]]
    }
}

/// Master edition of an NFT mint, owned by the token metadata program
pub struct EditionPDA;
impl EditionPDA {
    pub fn derive(mint: &Pubkey) -> (Pubkey, u8) {
        metadata::find_edition_address(mint)
    }
}

/// Where platform fees in `currency` accumulate: the admin PDA itself for
/// native lamports, the admin's associated token account otherwise.
pub fn fee_account_address(program_id: &Pubkey, currency: &Pubkey) -> Pubkey {
    let (admin, _) = AdminPDA::derive(program_id);
    if is_native(currency) {
        admin
    } else {
        spl_associated_token_account::get_associated_token_address(&admin, currency)
    }
}

/// Borrows owned seeds as the slice form `invoke_signed` takes
pub fn as_seed_slices(seeds: &[Vec<u8>]) -> Vec<&[u8]> {
    seeds.iter().map(|seed| seed.as_slice()).collect()
}

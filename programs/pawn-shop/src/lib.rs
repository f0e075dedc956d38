// Pawn shop: NFT-collateralized loans with in-place custody
// Native Solana implementation - NO ANCHOR

use solana_program::{
    account_info::AccountInfo,
    entrypoint::ProgramResult,
    msg,
    program_error::PrintProgramError,
    pubkey::Pubkey,
};

pub mod constants;
pub mod custody;
pub mod engine;
pub mod error;
pub mod instruction;
#[cfg(not(target_os = "solana"))]
pub mod ledger;
pub mod math;
pub mod pda;
pub mod processor;
pub mod state;

use crate::{error::PawnShopError, processor::Processor};

#[cfg(feature = "devnet")]
solana_program::declare_id!("PawnShopDev11111111111111111111111111111111");

#[cfg(not(feature = "devnet"))]
solana_program::declare_id!("PawnShop11111111111111111111111111111111111");

#[cfg(not(feature = "no-entrypoint"))]
solana_program::entrypoint!(process_instruction);

pub fn process_instruction(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    instruction_data: &[u8],
) -> ProgramResult {
    msg!("Pawn shop program entrypoint");
    if let Err(error) = Processor::process(program_id, accounts, instruction_data) {
        error.print::<PawnShopError>();
        return Err(error);
    }
    Ok(())
}

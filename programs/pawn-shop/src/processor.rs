use solana_program::{
    account_info::{next_account_info, AccountInfo},
    entrypoint::ProgramResult,
    msg,
    program::invoke_signed,
    program_error::ProgramError,
    pubkey::Pubkey,
    system_instruction, system_program,
    sysvar::{clock::Clock, rent::Rent, Sysvar},
};

use crate::{
    constants::{DEFAULT_FEE_RATE_BPS, MILLISECONDS_PER_SECOND},
    custody::{cpi::CpiRuntime, metadata},
    engine::{PawnShopEngine, UnderwriteOffer},
    error::PawnShopError,
    instruction::PawnShopInstruction,
    pda::{as_seed_slices, AdminPDA, PawnLoanPDA},
    state::{AdminConfig, LoanTerms, PawnLoan},
};

pub struct Processor;

impl Processor {
    pub fn process(
        program_id: &Pubkey,
        accounts: &[AccountInfo],
        instruction_data: &[u8],
    ) -> ProgramResult {
        let instruction = PawnShopInstruction::unpack(instruction_data)?;

        match instruction {
            PawnShopInstruction::InitializeAdmin {
                fee_collector,
                fee_rate_bps,
            } => {
                msg!("Instruction: InitializeAdmin");
                process_initialize_admin(program_id, accounts, fee_collector, fee_rate_bps)
            }

            PawnShopInstruction::UpdateAdmin {
                fee_collector,
                fee_rate_bps,
            } => {
                msg!("Instruction: UpdateAdmin");
                process_update_admin(program_id, accounts, fee_collector, fee_rate_bps)
            }

            PawnShopInstruction::RequestLoan { desired_terms } => {
                msg!("Instruction: RequestLoan");
                process_request_loan(program_id, accounts, desired_terms)
            }

            PawnShopInstruction::UnderwriteLoan {
                expected_terms,
                expected_pawn_mint,
                expected_pawn_amount,
            } => {
                msg!("Instruction: UnderwriteLoan");
                let offer = UnderwriteOffer {
                    terms: expected_terms,
                    pawn_mint: expected_pawn_mint,
                    pawn_amount: expected_pawn_amount,
                };
                process_underwrite_loan(program_id, accounts, &offer)
            }

            PawnShopInstruction::RepayLoan => {
                msg!("Instruction: RepayLoan");
                process_repay_loan(program_id, accounts)
            }

            PawnShopInstruction::SeizePawn => {
                msg!("Instruction: SeizePawn");
                process_seize_pawn(program_id, accounts)
            }

            PawnShopInstruction::CancelLoan => {
                msg!("Instruction: CancelLoan");
                process_cancel_loan(program_id, accounts)
            }

            PawnShopInstruction::WithdrawFees { currency } => {
                msg!("Instruction: WithdrawFees");
                process_withdraw_fees(program_id, accounts, &currency)
            }
        }
    }
}

fn process_initialize_admin(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    fee_collector: Pubkey,
    fee_rate_bps: Option<u16>,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let authority_info = next_account_info(account_info_iter)?;
    let admin_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;

    check_signer(authority_info)?;
    check_program(system_program_info, &system_program::id())?;

    let (admin_key, bump) = AdminPDA::derive(program_id);
    if *admin_info.key != admin_key {
        return Err(PawnShopError::InvalidPda.into());
    }
    if !admin_info.data_is_empty() {
        return Err(PawnShopError::AccountAlreadyInitialized.into());
    }

    let config = AdminConfig::new(
        *authority_info.key,
        fee_collector,
        fee_rate_bps.unwrap_or(DEFAULT_FEE_RATE_BPS),
        bump,
    );
    config.validate()?;

    let seeds = AdminPDA::seeds(bump);
    create_program_account(
        program_id,
        authority_info,
        admin_info,
        system_program_info,
        AdminConfig::LEN,
        &as_seed_slices(&seeds),
    )?;

    config.pack(&mut admin_info.data.borrow_mut()[..])?;

    msg!(
        "Admin initialized: authority {}, collector {}, fee rate {} bps",
        config.authority,
        config.fee_collector,
        config.fee_rate_bps
    );

    Ok(())
}

fn process_update_admin(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    fee_collector: Option<Pubkey>,
    fee_rate_bps: Option<u16>,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let authority_info = next_account_info(account_info_iter)?;
    let admin_info = next_account_info(account_info_iter)?;

    check_signer(authority_info)?;
    let mut config = load_admin(program_id, admin_info)?;

    PawnShopEngine::update_admin(&mut config, authority_info.key, fee_collector, fee_rate_bps)?;

    config.pack(&mut admin_info.data.borrow_mut()[..])
}

fn process_request_loan(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    desired_terms: LoanTerms,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let base_info = next_account_info(account_info_iter)?;
    let loan_info = next_account_info(account_info_iter)?;
    let borrower_info = next_account_info(account_info_iter)?;
    let pawn_token_account_info = next_account_info(account_info_iter)?;
    let _pawn_mint_info = next_account_info(account_info_iter)?;
    let _edition_info = next_account_info(account_info_iter)?;
    let metadata_program_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;

    check_signer(base_info)?;
    check_signer(borrower_info)?;
    check_program(metadata_program_info, &metadata::id())?;
    check_program(token_program_info, &spl_token::id())?;
    check_program(system_program_info, &system_program::id())?;

    let (loan_key, bump) = PawnLoanPDA::derive(program_id, base_info.key);
    if *loan_info.key != loan_key {
        return Err(PawnShopError::InvalidPda.into());
    }
    if !loan_info.data_is_empty() {
        return Err(PawnShopError::AccountAlreadyInitialized.into());
    }

    let seeds = PawnLoanPDA::seeds(base_info.key, bump);
    let signer_seeds = as_seed_slices(&seeds);
    let mut runtime = CpiRuntime::new(program_id, accounts).with_signer(loan_key, &signer_seeds);

    let loan = PawnShopEngine::request_loan(
        &mut runtime,
        &loan_key,
        bump,
        base_info.key,
        borrower_info.key,
        pawn_token_account_info.key,
        desired_terms,
        current_time_ms()?,
    )?;

    create_program_account(
        program_id,
        borrower_info,
        loan_info,
        system_program_info,
        PawnLoan::LEN,
        &signer_seeds,
    )?;

    loan.pack(&mut loan_info.data.borrow_mut()[..])
}

fn process_underwrite_loan(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    offer: &UnderwriteOffer,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let loan_info = next_account_info(account_info_iter)?;
    let pawn_token_account_info = next_account_info(account_info_iter)?;
    let lender_info = next_account_info(account_info_iter)?;
    let lender_payment_info = next_account_info(account_info_iter)?;
    let borrower_payment_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;

    check_signer(lender_info)?;
    check_program(token_program_info, &spl_token::id())?;
    check_program(system_program_info, &system_program::id())?;

    let mut loan = load_loan(program_id, loan_info)?;
    let mut runtime = CpiRuntime::new(program_id, accounts);

    PawnShopEngine::underwrite_loan(
        &mut runtime,
        loan_info.key,
        &mut loan,
        pawn_token_account_info.key,
        lender_info.key,
        lender_payment_info.key,
        borrower_payment_info.key,
        offer,
        current_time_ms()?,
    )?;

    loan.pack(&mut loan_info.data.borrow_mut()[..])
}

fn process_repay_loan(program_id: &Pubkey, accounts: &[AccountInfo]) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let loan_info = next_account_info(account_info_iter)?;
    let pawn_token_account_info = next_account_info(account_info_iter)?;
    let _pawn_mint_info = next_account_info(account_info_iter)?;
    let _edition_info = next_account_info(account_info_iter)?;
    let borrower_info = next_account_info(account_info_iter)?;
    let borrower_payment_info = next_account_info(account_info_iter)?;
    let lender_payment_info = next_account_info(account_info_iter)?;
    let admin_info = next_account_info(account_info_iter)?;
    let admin_payment_info = next_account_info(account_info_iter)?;
    let metadata_program_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;

    check_signer(borrower_info)?;
    check_program(metadata_program_info, &metadata::id())?;
    check_program(token_program_info, &spl_token::id())?;
    check_program(system_program_info, &system_program::id())?;

    let mut loan = load_loan(program_id, loan_info)?;
    let admin = load_admin(program_id, admin_info)?;

    let seeds = PawnLoanPDA::seeds(&loan.base, loan.bump);
    let mut runtime =
        CpiRuntime::new(program_id, accounts).with_signer(*loan_info.key, &as_seed_slices(&seeds));

    PawnShopEngine::repay_loan(
        &mut runtime,
        loan_info.key,
        &mut loan,
        admin_info.key,
        &admin,
        borrower_info.key,
        pawn_token_account_info.key,
        borrower_payment_info.key,
        lender_payment_info.key,
        admin_payment_info.key,
        current_time_ms()?,
    )?;

    loan.pack(&mut loan_info.data.borrow_mut()[..])
}

fn process_seize_pawn(program_id: &Pubkey, accounts: &[AccountInfo]) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let loan_info = next_account_info(account_info_iter)?;
    let pawn_token_account_info = next_account_info(account_info_iter)?;
    let _pawn_mint_info = next_account_info(account_info_iter)?;
    let _edition_info = next_account_info(account_info_iter)?;
    let lender_info = next_account_info(account_info_iter)?;
    let lender_pawn_token_account_info = next_account_info(account_info_iter)?;
    let metadata_program_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;

    check_signer(lender_info)?;
    check_program(metadata_program_info, &metadata::id())?;
    check_program(token_program_info, &spl_token::id())?;

    let mut loan = load_loan(program_id, loan_info)?;

    let seeds = PawnLoanPDA::seeds(&loan.base, loan.bump);
    let mut runtime =
        CpiRuntime::new(program_id, accounts).with_signer(*loan_info.key, &as_seed_slices(&seeds));

    PawnShopEngine::seize_pawn(
        &mut runtime,
        loan_info.key,
        &mut loan,
        lender_info.key,
        pawn_token_account_info.key,
        lender_pawn_token_account_info.key,
        current_time_ms()?,
    )?;

    loan.pack(&mut loan_info.data.borrow_mut()[..])
}

fn process_cancel_loan(program_id: &Pubkey, accounts: &[AccountInfo]) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let loan_info = next_account_info(account_info_iter)?;
    let pawn_token_account_info = next_account_info(account_info_iter)?;
    let _pawn_mint_info = next_account_info(account_info_iter)?;
    let _edition_info = next_account_info(account_info_iter)?;
    let borrower_info = next_account_info(account_info_iter)?;
    let metadata_program_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;

    check_signer(borrower_info)?;
    check_program(metadata_program_info, &metadata::id())?;
    check_program(token_program_info, &spl_token::id())?;

    let loan = load_loan(program_id, loan_info)?;

    let seeds = PawnLoanPDA::seeds(&loan.base, loan.bump);
    let mut runtime =
        CpiRuntime::new(program_id, accounts).with_signer(*loan_info.key, &as_seed_slices(&seeds));

    PawnShopEngine::cancel_loan(
        &mut runtime,
        loan_info.key,
        &loan,
        borrower_info.key,
        pawn_token_account_info.key,
    )?;

    close_account(loan_info, borrower_info)
}

fn process_withdraw_fees(
    program_id: &Pubkey,
    accounts: &[AccountInfo],
    currency: &Pubkey,
) -> ProgramResult {
    let account_info_iter = &mut accounts.iter();

    let fee_collector_info = next_account_info(account_info_iter)?;
    let admin_info = next_account_info(account_info_iter)?;
    let fee_account_info = next_account_info(account_info_iter)?;
    let destination_info = next_account_info(account_info_iter)?;
    let token_program_info = next_account_info(account_info_iter)?;
    let system_program_info = next_account_info(account_info_iter)?;

    check_signer(fee_collector_info)?;
    check_program(token_program_info, &spl_token::id())?;
    check_program(system_program_info, &system_program::id())?;

    let admin = load_admin(program_id, admin_info)?;

    let seeds = AdminPDA::seeds(admin.bump);
    let mut runtime =
        CpiRuntime::new(program_id, accounts).with_signer(*admin_info.key, &as_seed_slices(&seeds));

    PawnShopEngine::withdraw_fees(
        &mut runtime,
        admin_info.key,
        &admin,
        fee_collector_info.key,
        currency,
        fee_account_info.key,
        destination_info.key,
    )?;

    Ok(())
}

fn check_signer(info: &AccountInfo) -> ProgramResult {
    if !info.is_signer {
        return Err(ProgramError::MissingRequiredSignature);
    }
    Ok(())
}

fn check_program(info: &AccountInfo, expected: &Pubkey) -> ProgramResult {
    if info.key != expected {
        return Err(ProgramError::IncorrectProgramId);
    }
    Ok(())
}

/// Cluster time in milliseconds
fn current_time_ms() -> Result<i64, ProgramError> {
    Clock::get()?
        .unix_timestamp
        .checked_mul(MILLISECONDS_PER_SECOND)
        .ok_or_else(|| PawnShopError::ArithmeticOverflow.into())
}

/// Loads a loan record, checking that the account is ours and sits at the
/// address its stored base and bump derive
fn load_loan(program_id: &Pubkey, info: &AccountInfo) -> Result<PawnLoan, ProgramError> {
    if info.data_is_empty() {
        return Err(PawnShopError::AccountNotInitialized.into());
    }
    if info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }

    let loan = PawnLoan::unpack(&info.data.borrow())?;

    let seeds = PawnLoanPDA::seeds(&loan.base, loan.bump);
    let expected = Pubkey::create_program_address(&as_seed_slices(&seeds), program_id)
        .map_err(|_| PawnShopError::InvalidPda)?;
    if expected != *info.key {
        return Err(PawnShopError::InvalidPda.into());
    }

    Ok(loan)
}

fn load_admin(program_id: &Pubkey, info: &AccountInfo) -> Result<AdminConfig, ProgramError> {
    let (admin_key, _) = AdminPDA::derive(program_id);
    if *info.key != admin_key {
        return Err(PawnShopError::InvalidPda.into());
    }
    if info.data_is_empty() {
        return Err(PawnShopError::AccountNotInitialized.into());
    }
    if info.owner != program_id {
        return Err(ProgramError::IncorrectProgramId);
    }

    AdminConfig::unpack(&info.data.borrow())
}

/// Allocates a rent-exempt account of `space` bytes at a program address
fn create_program_account<'a>(
    program_id: &Pubkey,
    payer: &AccountInfo<'a>,
    account: &AccountInfo<'a>,
    system_program_info: &AccountInfo<'a>,
    space: usize,
    signer_seeds: &[&[u8]],
) -> ProgramResult {
    let required_lamports = Rent::get()?.minimum_balance(space);

    invoke_signed(
        &system_instruction::create_account(
            payer.key,
            account.key,
            required_lamports,
            space as u64,
            program_id,
        ),
        &[payer.clone(), account.clone(), system_program_info.clone()],
        &[signer_seeds],
    )
}

/// Returns a record's lamports to `destination` and wipes its data. The
/// runtime purges the emptied account at the end of the transaction.
fn close_account(account: &AccountInfo, destination: &AccountInfo) -> ProgramResult {
    let lamports = destination
        .lamports()
        .checked_add(account.lamports())
        .ok_or(PawnShopError::ArithmeticOverflow)?;

    **destination.try_borrow_mut_lamports()? = lamports;
    **account.try_borrow_mut_lamports()? = 0;
    account.data.borrow_mut().fill(0);

    Ok(())
}

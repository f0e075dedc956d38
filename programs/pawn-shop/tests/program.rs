//! Processor tests on solana-program-test. Freezing and thawing go through the
//! token metadata program, which is not loaded here, so loans enter these tests
//! already pledged: the record and the frozen, delegated pawn account are
//! written straight into genesis. Underwriting, admin configuration, term
//! validation and fee withdrawal then run through the real processor.

use pawn_shop::{
    constants::{DEFAULT_FEE_RATE_BPS, MILLISECONDS_PER_DAY},
    error::PawnShopError,
    instruction,
    pda::{fee_account_address, AdminPDA, PawnLoanPDA},
    state::{AdminConfig, LoanStatus, LoanTerms, PawnLoan},
};
use solana_program::{
    instruction::InstructionError, program_option::COption, program_pack::Pack, pubkey::Pubkey,
    rent::Rent, system_instruction,
};
use solana_program_test::*;
use solana_sdk::{
    account::Account,
    signature::{Keypair, Signer},
    transaction::{Transaction, TransactionError},
};
use spl_token::state::{Account as TokenAccount, AccountState};

fn program_test() -> ProgramTest {
    ProgramTest::new(
        "pawn_shop",
        pawn_shop::id(),
        processor!(pawn_shop::process_instruction),
    )
}

fn funded(program_test: &mut ProgramTest, lamports: u64) -> Keypair {
    let keypair = Keypair::new();
    program_test.add_account(
        keypair.pubkey(),
        Account {
            lamports,
            ..Account::default()
        },
    );
    keypair
}

fn add_token_account(program_test: &mut ProgramTest, address: Pubkey, state: TokenAccount) {
    let mut data = vec![0u8; TokenAccount::LEN];
    state.pack_into_slice(&mut data);

    program_test.add_account(
        address,
        Account {
            lamports: Rent::default().minimum_balance(TokenAccount::LEN),
            data,
            owner: spl_token::id(),
            ..Account::default()
        },
    );
}

fn wallet_token_account(mint: &Pubkey, owner: &Pubkey, amount: u64) -> TokenAccount {
    TokenAccount {
        mint: *mint,
        owner: *owner,
        amount,
        state: AccountState::Initialized,
        ..TokenAccount::default()
    }
}

/// An open loan as request leaves it: the record, and the borrower's pawn
/// account delegated to the loan and frozen
struct PledgedPawn {
    loan: Pubkey,
    pawn: Pubkey,
    pawn_mint: Pubkey,
}

fn add_open_loan(
    program_test: &mut ProgramTest,
    borrower: &Pubkey,
    desired_terms: LoanTerms,
) -> PledgedPawn {
    let base = Pubkey::new_unique();
    let (loan, bump) = PawnLoanPDA::derive(&pawn_shop::id(), &base);
    let pawn = Pubkey::new_unique();
    let pawn_mint = Pubkey::new_unique();

    add_token_account(
        program_test,
        pawn,
        TokenAccount {
            delegate: COption::Some(loan),
            delegated_amount: 1,
            state: AccountState::Frozen,
            ..wallet_token_account(&pawn_mint, borrower, 1)
        },
    );

    let record = PawnLoan::new(bump, base, *borrower, pawn, pawn_mint, desired_terms, 0);
    let mut data = vec![0u8; PawnLoan::LEN];
    record.pack(&mut data).unwrap();

    program_test.add_account(
        loan,
        Account {
            lamports: Rent::default().minimum_balance(PawnLoan::LEN),
            data,
            owner: pawn_shop::id(),
            ..Account::default()
        },
    );

    PledgedPawn {
        loan,
        pawn,
        pawn_mint,
    }
}

fn native_terms(principal_amount: u64) -> LoanTerms {
    LoanTerms {
        principal_amount,
        mint: spl_token::native_mint::id(),
        annual_percentage_rate_bps: 1_000,
        duration: 7 * MILLISECONDS_PER_DAY,
    }
}

fn custom(error: PawnShopError) -> TransactionError {
    TransactionError::InstructionError(0, InstructionError::Custom(error as u32))
}

async fn send(
    context: &mut ProgramTestContext,
    instruction: solana_program::instruction::Instruction,
    signers: &[&Keypair],
) -> Result<(), TransactionError> {
    let mut all_signers = vec![&context.payer];
    all_signers.extend_from_slice(signers);

    let transaction = Transaction::new_signed_with_payer(
        &[instruction],
        Some(&context.payer.pubkey()),
        &all_signers,
        context.last_blockhash,
    );

    context
        .banks_client
        .process_transaction(transaction)
        .await
        .map_err(|e| e.unwrap())
}

async fn refresh_blockhash(context: &mut ProgramTestContext) {
    context.last_blockhash = context
        .banks_client
        .get_new_latest_blockhash(&context.last_blockhash)
        .await
        .unwrap();
}

async fn loan_record(context: &mut ProgramTestContext, loan: Pubkey) -> PawnLoan {
    let account = context
        .banks_client
        .get_account(loan)
        .await
        .unwrap()
        .unwrap();
    PawnLoan::unpack(&account.data).unwrap()
}

async fn token_balance(context: &mut ProgramTestContext, address: Pubkey) -> u64 {
    let account = context
        .banks_client
        .get_account(address)
        .await
        .unwrap()
        .unwrap();
    TokenAccount::unpack(&account.data).unwrap().amount
}

#[tokio::test]
async fn test_initialize_admin() {
    let mut context = program_test().start_with_context().await;
    let collector = Pubkey::new_unique();
    let authority = context.payer.pubkey();

    send(
        &mut context,
        instruction::initialize_admin(&pawn_shop::id(), &authority, &collector, None),
        &[],
    )
    .await
    .unwrap();

    let (admin, _) = AdminPDA::derive(&pawn_shop::id());
    let account = context
        .banks_client
        .get_account(admin)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(account.owner, pawn_shop::id());
    assert_eq!(account.data.len(), AdminConfig::LEN);

    let config = AdminConfig::unpack(&account.data).unwrap();
    assert_eq!(config.authority, authority);
    assert_eq!(config.fee_collector, collector);
    assert_eq!(config.fee_rate_bps, DEFAULT_FEE_RATE_BPS);

    // Only once
    refresh_blockhash(&mut context).await;
    assert_eq!(
        send(
            &mut context,
            instruction::initialize_admin(&pawn_shop::id(), &authority, &collector, Some(100)),
            &[],
        )
        .await,
        Err(custom(PawnShopError::AccountAlreadyInitialized))
    );
}

#[tokio::test]
async fn test_initialize_admin_rejects_fee_above_100_percent() {
    let mut context = program_test().start_with_context().await;
    let authority = context.payer.pubkey();

    assert_eq!(
        send(
            &mut context,
            instruction::initialize_admin(
                &pawn_shop::id(),
                &authority,
                &Pubkey::new_unique(),
                Some(10_001)
            ),
            &[],
        )
        .await,
        Err(custom(PawnShopError::InvalidFeeRate))
    );
}

#[tokio::test]
async fn test_update_admin_requires_authority() {
    let mut program_test = program_test();
    let intruder = funded(&mut program_test, 1_000_000_000);
    let mut context = program_test.start_with_context().await;
    let authority = context.payer.pubkey();

    send(
        &mut context,
        instruction::initialize_admin(&pawn_shop::id(), &authority, &Pubkey::new_unique(), None),
        &[],
    )
    .await
    .unwrap();

    assert_eq!(
        send(
            &mut context,
            instruction::update_admin(&pawn_shop::id(), &intruder.pubkey(), None, Some(0)),
            &[&intruder],
        )
        .await,
        Err(custom(PawnShopError::ConstraintAuthority))
    );

    let new_collector = Pubkey::new_unique();
    send(
        &mut context,
        instruction::update_admin(&pawn_shop::id(), &authority, Some(new_collector), Some(250)),
        &[],
    )
    .await
    .unwrap();

    let (admin, _) = AdminPDA::derive(&pawn_shop::id());
    let account = context
        .banks_client
        .get_account(admin)
        .await
        .unwrap()
        .unwrap();
    let config = AdminConfig::unpack(&account.data).unwrap();
    assert_eq!(config.fee_collector, new_collector);
    assert_eq!(config.fee_rate_bps, 250);
}

#[tokio::test]
async fn test_request_loan_validates_terms_first() {
    let mut program_test = program_test();
    let borrower = funded(&mut program_test, 1_000_000_000);
    let mut context = program_test.start_with_context().await;
    let base = Keypair::new();

    let zero_principal = LoanTerms {
        principal_amount: 0,
        mint: spl_token::native_mint::id(),
        annual_percentage_rate_bps: 1_000,
        duration: 7 * MILLISECONDS_PER_DAY,
    };

    assert_eq!(
        send(
            &mut context,
            instruction::request_loan(
                &pawn_shop::id(),
                &base.pubkey(),
                &borrower.pubkey(),
                &Pubkey::new_unique(),
                &Pubkey::new_unique(),
                zero_principal,
            ),
            &[&base, &borrower],
        )
        .await,
        Err(custom(PawnShopError::InvalidLoanTerms))
    );
}

#[tokio::test]
async fn test_withdraw_native_fees() {
    let mut program_test = program_test();
    let collector = funded(&mut program_test, 1_000_000_000);
    let destination = funded(&mut program_test, 1_000_000_000);
    let mut context = program_test.start_with_context().await;
    let authority = context.payer.pubkey();
    let native = spl_token::native_mint::id();

    send(
        &mut context,
        instruction::initialize_admin(&pawn_shop::id(), &authority, &collector.pubkey(), None),
        &[],
    )
    .await
    .unwrap();

    // Stand-in for repaid fees
    let (admin, _) = AdminPDA::derive(&pawn_shop::id());
    send(
        &mut context,
        system_instruction::transfer(&authority, &admin, 5_000),
        &[],
    )
    .await
    .unwrap();

    assert_eq!(
        send(
            &mut context,
            instruction::withdraw_fees(
                &pawn_shop::id(),
                &destination.pubkey(),
                &native,
                &destination.pubkey(),
            ),
            &[&destination],
        )
        .await,
        Err(custom(PawnShopError::ConstraintFeeCollector))
    );

    send(
        &mut context,
        instruction::withdraw_fees(
            &pawn_shop::id(),
            &collector.pubkey(),
            &native,
            &destination.pubkey(),
        ),
        &[&collector],
    )
    .await
    .unwrap();

    let rent = context.banks_client.get_rent().await.unwrap();
    let admin_account = context
        .banks_client
        .get_account(admin)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(admin_account.lamports, rent.minimum_balance(AdminConfig::LEN));

    let destination_balance = context
        .banks_client
        .get_balance(destination.pubkey())
        .await
        .unwrap();
    assert_eq!(destination_balance, 1_000_005_000);
}

#[tokio::test]
async fn test_underwrite_pays_native_principal() {
    let mut program_test = program_test();
    let borrower = funded(&mut program_test, 1_000_000_000);
    let lender = funded(&mut program_test, 1_000_000_000);
    let terms = native_terms(250_000_000);
    let pledged = add_open_loan(&mut program_test, &borrower.pubkey(), terms);
    let mut context = program_test.start_with_context().await;

    let underwrite = |expected_terms: LoanTerms| {
        instruction::underwrite_loan(
            &pawn_shop::id(),
            &pledged.loan,
            &pledged.pawn,
            &lender.pubkey(),
            &lender.pubkey(),
            &borrower.pubkey(),
            expected_terms,
            &pledged.pawn_mint,
            Some(1),
        )
    };

    // An offer built from other terms moves nothing
    let stale = LoanTerms {
        principal_amount: terms.principal_amount - 1,
        ..terms
    };
    assert_eq!(
        send(&mut context, underwrite(stale), &[&lender]).await,
        Err(custom(PawnShopError::UnexpectedDesiredTerms))
    );
    assert_eq!(
        loan_record(&mut context, pledged.loan).await.status,
        LoanStatus::Open
    );

    send(&mut context, underwrite(terms), &[&lender])
        .await
        .unwrap();

    let record = loan_record(&mut context, pledged.loan).await;
    assert_eq!(record.status, LoanStatus::Active);
    assert_eq!(record.lender, Some(lender.pubkey()));
    assert_eq!(record.terms, Some(terms));
    assert!(record.underwritten_at.is_some());
    assert!(record.is_consistent());

    let borrower_balance = context
        .banks_client
        .get_balance(borrower.pubkey())
        .await
        .unwrap();
    let lender_balance = context
        .banks_client
        .get_balance(lender.pubkey())
        .await
        .unwrap();
    assert_eq!(borrower_balance, 1_250_000_000);
    assert_eq!(lender_balance, 750_000_000);

    // First match wins
    refresh_blockhash(&mut context).await;
    assert_eq!(
        send(&mut context, underwrite(terms), &[&lender]).await,
        Err(custom(PawnShopError::InvalidLoanStatus))
    );
}

#[tokio::test]
async fn test_underwrite_pays_token_principal() {
    let mut program_test = program_test();
    let borrower = funded(&mut program_test, 1_000_000_000);
    let lender = funded(&mut program_test, 1_000_000_000);

    let usdc = Pubkey::new_unique();
    let terms = LoanTerms {
        principal_amount: 1_000_000,
        mint: usdc,
        annual_percentage_rate_bps: 2_000,
        duration: 30 * MILLISECONDS_PER_DAY,
    };
    let pledged = add_open_loan(&mut program_test, &borrower.pubkey(), terms);

    let lender_usdc = Pubkey::new_unique();
    let borrower_usdc = Pubkey::new_unique();
    add_token_account(
        &mut program_test,
        lender_usdc,
        wallet_token_account(&usdc, &lender.pubkey(), 5_000_000),
    );
    add_token_account(
        &mut program_test,
        borrower_usdc,
        wallet_token_account(&usdc, &borrower.pubkey(), 0),
    );

    let mut context = program_test.start_with_context().await;

    let underwrite = |borrower_payment_account: &Pubkey| {
        instruction::underwrite_loan(
            &pawn_shop::id(),
            &pledged.loan,
            &pledged.pawn,
            &lender.pubkey(),
            &lender_usdc,
            borrower_payment_account,
            terms,
            &pledged.pawn_mint,
            None,
        )
    };

    // Principal must land in an account the borrower owns
    assert_eq!(
        send(&mut context, underwrite(&lender_usdc), &[&lender]).await,
        Err(custom(PawnShopError::ConstraintPaymentAccount))
    );

    send(&mut context, underwrite(&borrower_usdc), &[&lender])
        .await
        .unwrap();

    assert_eq!(token_balance(&mut context, borrower_usdc).await, 1_000_000);
    assert_eq!(token_balance(&mut context, lender_usdc).await, 4_000_000);
    assert_eq!(
        loan_record(&mut context, pledged.loan).await.status,
        LoanStatus::Active
    );
}

#[tokio::test]
async fn test_withdraw_token_fees() {
    let mut program_test = program_test();
    let collector = funded(&mut program_test, 1_000_000_000);

    let usdc = Pubkey::new_unique();
    let (admin, _) = AdminPDA::derive(&pawn_shop::id());
    let fee_account = fee_account_address(&pawn_shop::id(), &usdc);
    let destination = Pubkey::new_unique();
    add_token_account(
        &mut program_test,
        fee_account,
        wallet_token_account(&usdc, &admin, 7_000),
    );
    add_token_account(
        &mut program_test,
        destination,
        wallet_token_account(&usdc, &collector.pubkey(), 0),
    );

    let mut context = program_test.start_with_context().await;
    let authority = context.payer.pubkey();

    send(
        &mut context,
        instruction::initialize_admin(&pawn_shop::id(), &authority, &collector.pubkey(), None),
        &[],
    )
    .await
    .unwrap();

    send(
        &mut context,
        instruction::withdraw_fees(&pawn_shop::id(), &collector.pubkey(), &usdc, &destination),
        &[&collector],
    )
    .await
    .unwrap();

    assert_eq!(token_balance(&mut context, fee_account).await, 0);
    assert_eq!(token_balance(&mut context, destination).await, 7_000);
}

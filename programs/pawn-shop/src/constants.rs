//! Program-wide constants

/// Seed prefix of every loan record PDA: `["pawn-loan", base]`
pub const PAWN_LOAN_SEED: &[u8] = b"pawn-loan";

/// Seed of the admin config PDA, which also holds native fees
pub const ADMIN_SEED: &[u8] = b"admin";

/// Basis point denominator (10_000 = 100%)
pub const BPS_DENOMINATOR: u64 = 10_000;

/// Platform share of the interest when the admin does not choose one (5%)
pub const DEFAULT_FEE_RATE_BPS: u16 = 500;

pub const MILLISECONDS_PER_SECOND: i64 = 1_000;
pub const MILLISECONDS_PER_DAY: u64 = 24 * 60 * 60 * 1_000;

/// Interest accrues over a 365 day year
pub const MILLISECONDS_PER_YEAR: u64 = 365 * MILLISECONDS_PER_DAY;

/// A pawn is a unique asset: exactly one unit sits in the collateral account
pub const PAWN_AMOUNT: u64 = 1;

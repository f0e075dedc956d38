pub mod admin_config;
pub mod loan_terms;
pub mod pawn_loan;

pub use admin_config::*;
pub use loan_terms::*;
pub use pawn_loan::*;

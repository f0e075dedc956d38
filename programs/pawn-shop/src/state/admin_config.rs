use borsh::{BorshDeserialize, BorshSerialize};
use solana_program::{entrypoint::ProgramResult, program_error::ProgramError, pubkey::Pubkey};

use crate::{constants::BPS_DENOMINATOR, error::PawnShopError};

/// Program configuration, stored at the `["admin"]` PDA.
///
/// The same PDA is the fee accumulator: native-currency fees are paid to it as
/// lamports, token fees to token accounts it owns.
#[derive(BorshSerialize, BorshDeserialize, Debug, Clone, PartialEq, Eq)]
pub struct AdminConfig {
    /// Account discriminator
    pub discriminator: [u8; 8],

    pub bump: u8,

    /// May change the collector and the fee rate
    pub authority: Pubkey,

    /// May withdraw accumulated fees
    pub fee_collector: Pubkey,

    /// Platform share of repaid interest, in basis points
    pub fee_rate_bps: u16,
}

impl AdminConfig {
    pub const DISCRIMINATOR: [u8; 8] = *b"PAWNADMN";

    pub const LEN: usize = 8 + // discriminator
        1 + // bump
        32 + // authority
        32 + // fee_collector
        2 + // fee_rate_bps
        32; // padding for growth

    pub fn new(authority: Pubkey, fee_collector: Pubkey, fee_rate_bps: u16, bump: u8) -> Self {
        Self {
            discriminator: Self::DISCRIMINATOR,
            bump,
            authority,
            fee_collector,
            fee_rate_bps,
        }
    }

    pub fn unpack(data: &[u8]) -> Result<Self, ProgramError> {
        let config = Self::deserialize(&mut &data[..])
            .map_err(|_| ProgramError::InvalidAccountData)?;
        config.validate()?;
        Ok(config)
    }

    pub fn pack(&self, dst: &mut [u8]) -> ProgramResult {
        self.serialize(&mut &mut dst[..])?;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ProgramError> {
        if self.discriminator != Self::DISCRIMINATOR {
            return Err(PawnShopError::AccountNotInitialized.into());
        }

        if self.fee_rate_bps as u64 > BPS_DENOMINATOR {
            return Err(PawnShopError::InvalidFeeRate.into());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::DEFAULT_FEE_RATE_BPS;

    #[test]
    fn test_round_trip() {
        let config = AdminConfig::new(
            Pubkey::new_unique(),
            Pubkey::new_unique(),
            DEFAULT_FEE_RATE_BPS,
            253,
        );
        let mut data = vec![0u8; AdminConfig::LEN];
        config.pack(&mut data).unwrap();
        assert_eq!(AdminConfig::unpack(&data).unwrap(), config);
    }

    #[test]
    fn test_validate_fee_rate() {
        let mut config = AdminConfig::new(Pubkey::new_unique(), Pubkey::new_unique(), 10_000, 1);
        assert!(config.validate().is_ok());

        config.fee_rate_bps = 10_001;
        assert_eq!(config.validate(), Err(PawnShopError::InvalidFeeRate.into()));
    }
}

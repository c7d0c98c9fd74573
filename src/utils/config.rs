use crate::error::{HarnessError, Result};
use std::env;
use std::path::PathBuf;

const DEFAULT_BASE_AMOUNT: u64 = 10_000;
const DEFAULT_TARGET_TOKEN_INDEX: usize = 1;
const DEFAULT_CYCLES: usize = 3;
const DEFAULT_SECONDS_PER_CYCLE: u64 = 60;
const DEFAULT_REWARD_DELAY_SECS: u64 = 60 * 60 * 24 * 28;
const DEFAULT_PROFIT_SHARE_PERMILLE: u32 = 1;
const DEFAULT_TOLERANCE_BPS: u64 = 10;
const DEFAULT_BASKET_NATIVE_PER_TOKEN: u64 = 100_000;
const DEFAULT_EXPORT_DIR: &str = "./tmp";
const MAX_TOLERANCE_BPS: u64 = 10_000;

/// Knobs for one harness run. Every field has an environment override.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessConfig {
    /// Bootstrap trade size, in whole units of the quote currency.
    pub base_amount: u64,
    pub target_token_index: usize,
    pub cycles: usize,
    pub seconds_per_cycle: u64,
    pub reward_delay_secs: u64,
    pub profit_share_permille: u32,
    /// Rounding tolerance for value-preservation invariants.
    pub tolerance_bps: u64,
    /// Whole native units spent on each funding-basket token.
    pub basket_native_per_token: u64,
    pub export_dir: PathBuf,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            base_amount: DEFAULT_BASE_AMOUNT,
            target_token_index: DEFAULT_TARGET_TOKEN_INDEX,
            cycles: DEFAULT_CYCLES,
            seconds_per_cycle: DEFAULT_SECONDS_PER_CYCLE,
            reward_delay_secs: DEFAULT_REWARD_DELAY_SECS,
            profit_share_permille: DEFAULT_PROFIT_SHARE_PERMILLE,
            tolerance_bps: DEFAULT_TOLERANCE_BPS,
            basket_native_per_token: DEFAULT_BASKET_NATIVE_PER_TOKEN,
            export_dir: PathBuf::from(DEFAULT_EXPORT_DIR),
        }
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw.trim().parse::<T>().map_err(|err| {
            HarnessError::Config(format!("{name} must parse, got `{}`: {err}", raw.trim()))
        }),
        _ => Ok(default),
    }
}

impl HarnessConfig {
    pub fn from_env() -> Result<Self> {
        let config = Self {
            base_amount: parse_env("HARNESS_BASE_AMOUNT", DEFAULT_BASE_AMOUNT)?,
            target_token_index: parse_env(
                "HARNESS_TARGET_TOKEN_INDEX",
                DEFAULT_TARGET_TOKEN_INDEX,
            )?,
            cycles: parse_env("HARNESS_CYCLES", DEFAULT_CYCLES)?.max(1),
            seconds_per_cycle: parse_env("HARNESS_SECONDS_PER_CYCLE", DEFAULT_SECONDS_PER_CYCLE)?,
            reward_delay_secs: parse_env("HARNESS_REWARD_DELAY_SECS", DEFAULT_REWARD_DELAY_SECS)?,
            profit_share_permille: parse_env(
                "HARNESS_PROFIT_SHARE_PERMILLE",
                DEFAULT_PROFIT_SHARE_PERMILLE,
            )?,
            tolerance_bps: parse_env("HARNESS_TOLERANCE_BPS", DEFAULT_TOLERANCE_BPS)?,
            basket_native_per_token: parse_env(
                "HARNESS_BASKET_NATIVE_PER_TOKEN",
                DEFAULT_BASKET_NATIVE_PER_TOKEN,
            )?,
            export_dir: PathBuf::from(parse_env(
                "HARNESS_EXPORT_DIR",
                DEFAULT_EXPORT_DIR.to_string(),
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.cycles == 0 {
            return Err(HarnessError::Config(
                "HARNESS_CYCLES must be at least 1".to_string(),
            ));
        }
        if self.base_amount == 0 {
            return Err(HarnessError::Config(
                "HARNESS_BASE_AMOUNT must be positive".to_string(),
            ));
        }
        if self.tolerance_bps > MAX_TOLERANCE_BPS {
            return Err(HarnessError::Config(format!(
                "HARNESS_TOLERANCE_BPS must be <= {MAX_TOLERANCE_BPS}, got {}",
                self.tolerance_bps
            )));
        }
        if self.profit_share_permille > 1_000 {
            return Err(HarnessError::Config(format!(
                "HARNESS_PROFIT_SHARE_PERMILLE must be <= 1000, got {}",
                self.profit_share_permille
            )));
        }
        Ok(())
    }

    pub fn with_cycles(mut self, cycles: usize, seconds_per_cycle: u64) -> Self {
        self.cycles = cycles;
        self.seconds_per_cycle = seconds_per_cycle;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_reference_run() {
        let config = HarnessConfig::default();
        assert_eq!(config.base_amount, 10_000);
        assert_eq!(config.target_token_index, 1);
        assert_eq!(config.cycles, 3);
        assert_eq!(config.seconds_per_cycle, 60);
        assert_eq!(config.reward_delay_secs, 2_419_200);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_cycles_and_wild_tolerance() {
        let zero = HarnessConfig::default().with_cycles(0, 60);
        assert!(matches!(zero.validate(), Err(HarnessError::Config(_))));

        let loose = HarnessConfig {
            tolerance_bps: 20_000,
            ..HarnessConfig::default()
        };
        assert!(matches!(loose.validate(), Err(HarnessError::Config(_))));
    }
}

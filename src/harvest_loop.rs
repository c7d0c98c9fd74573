//! Multi-cycle harvest driver.

use crate::error::{HarnessError, Result};
use crate::harness::StrategyHarness;
use crate::ledger::{Ledger, StrategyOps, TokenOps, VaultOps};
use alloy::primitives::U256;
use serde::Serialize;

/// Observations around one `doHardWork` call. Amounts are raw underlying units.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HarvestCycleResult {
    pub cycle: usize,
    /// Ledger time when the harvest ran.
    pub timestamp: u64,
    /// Seconds since the loop started.
    pub elapsed: u64,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub ready_before: U256,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub ready_after: U256,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub user_balance_before: U256,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub user_balance_after: U256,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub vault_value_before: U256,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub vault_value_after: U256,
}

impl HarvestCycleResult {
    pub fn reward_non_decreasing(&self) -> bool {
        self.ready_after >= self.ready_before
    }
}

#[derive(Debug, Clone, Copy)]
struct Observation {
    ready: U256,
    user_balance: U256,
    vault_value: U256,
}

pub struct HarvestLoopExecutor<'a, C: ?Sized> {
    chain: &'a C,
}

impl<'a, C> HarvestLoopExecutor<'a, C>
where
    C: Ledger + TokenOps + StrategyOps + VaultOps + ?Sized,
{
    pub fn new(chain: &'a C) -> Self {
        Self { chain }
    }

    /// Deposits `start_balance` for the harness user, then runs `cycles` rounds of
    /// advance-time and harvest. The first failing harvest aborts the run.
    pub async fn run(
        &self,
        harness: &StrategyHarness,
        start_balance: U256,
        cycles: usize,
        seconds_per_cycle: u64,
    ) -> Result<Vec<HarvestCycleResult>> {
        if cycles == 0 {
            return Err(HarnessError::Config(
                "harvest loop needs at least one cycle".to_string(),
            ));
        }
        if start_balance.is_zero() {
            return Err(HarnessError::Config(
                "harvest loop needs a non-zero starting balance".to_string(),
            ));
        }

        let vault = harness.vault_address();
        self.chain
            .approve(harness.user, harness.underlying, vault, start_balance)
            .await?;
        self.chain
            .deposit(harness.user, vault, start_balance)
            .await?;

        let started_at = self.chain.timestamp().await?;
        let mut results = Vec::with_capacity(cycles);
        for cycle in 1..=cycles {
            self.chain.advance_time(seconds_per_cycle).await?;
            let timestamp = self.chain.timestamp().await?;
            let before = self.observe(harness).await?;

            self.chain
                .harvest(harness.signer, harness.strategy_address())
                .await
                .map_err(|e| HarnessError::HarvestAborted {
                    cycle,
                    source: Box::new(e),
                })?;

            let after = self.observe(harness).await?;
            tracing::info!(
                "[HARVEST] Cycle {}/{} at t+{}s: readyToClaim {} -> {}, vault value {}",
                cycle,
                cycles,
                timestamp - started_at,
                before.ready,
                after.ready,
                after.vault_value
            );
            results.push(HarvestCycleResult {
                cycle,
                timestamp,
                elapsed: timestamp - started_at,
                ready_before: before.ready,
                ready_after: after.ready,
                user_balance_before: before.user_balance,
                user_balance_after: after.user_balance,
                vault_value_before: before.vault_value,
                vault_value_after: after.vault_value,
            });
        }
        Ok(results)
    }

    async fn observe(&self, harness: &StrategyHarness) -> Result<Observation> {
        Ok(Observation {
            ready: self
                .chain
                .ready_to_claim(harness.strategy_address())
                .await?,
            user_balance: self
                .chain
                .balance_of(harness.underlying, harness.user.address)
                .await?,
            vault_value: self
                .chain
                .underlying_balance_with_investment(harness.vault_address())
                .await?,
        })
    }
}

//! Post-condition checks run against a built harness.
//!
//! Every check returns `Err(HarnessError::Invariant(..))` naming the violated invariant with the
//! observed and expected values. Nothing here catches those; they are the test outcome.

use crate::error::{InvariantFailure, Result};
use crate::harness::StrategyHarness;
use crate::harvest_loop::HarvestCycleResult;
use crate::ledger::{Ledger, StrategyOps, TokenOps, VaultOps};
use crate::utils::config::HarnessConfig;
use alloy::primitives::U256;
use async_trait::async_trait;

const BPS: u64 = 10_000;
/// Absolute slack on top of the relative tolerance, in raw units.
const DUST: u64 = 1_000;

/// Reads the reward amount a harvest is expected to keep or grow.
#[async_trait]
pub trait ClaimableProbe<C: ?Sized + Sync>: Send + Sync {
    async fn ready_to_claim(&self, chain: &C, harness: &StrategyHarness) -> Result<U256>;
}

/// The strategy's own `readyToClaim`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StrategyReadyToClaim;

#[async_trait]
impl<C> ClaimableProbe<C> for StrategyReadyToClaim
where
    C: StrategyOps + ?Sized,
{
    async fn ready_to_claim(&self, chain: &C, harness: &StrategyHarness) -> Result<U256> {
        chain.ready_to_claim(harness.strategy_address()).await
    }
}

pub struct InvariantVerifier<'a, C: ?Sized> {
    chain: &'a C,
    tolerance_bps: u64,
    seconds_per_cycle: u64,
}

impl<'a, C> InvariantVerifier<'a, C>
where
    C: Ledger + TokenOps + StrategyOps + VaultOps + ?Sized,
{
    pub fn new(chain: &'a C, config: &HarnessConfig) -> Self {
        Self {
            chain,
            tolerance_bps: config.tolerance_bps,
            seconds_per_cycle: config.seconds_per_cycle,
        }
    }

    pub fn tolerance(&self, amount: U256) -> U256 {
        amount * U256::from(self.tolerance_bps) / U256::from(BPS) + U256::from(DUST)
    }

    async fn user_underlying(&self, harness: &StrategyHarness) -> Result<U256> {
        self.chain
            .balance_of(harness.underlying, harness.user.address)
            .await
    }

    /// Deposits the user's whole underlying balance. Returns the amount deposited.
    pub async fn deposit_all(&self, harness: &StrategyHarness) -> Result<U256> {
        let amount = self.user_underlying(harness).await?;
        if amount.is_zero() {
            return Err(InvariantFailure::new(
                "deposit",
                "user holds underlying before deposit",
                amount,
                "> 0",
            )
            .into());
        }
        let vault = harness.vault_address();
        self.chain
            .approve(harness.user, harness.underlying, vault, amount)
            .await?;
        self.chain.deposit(harness.user, vault, amount).await?;
        Ok(amount)
    }

    /// Redeems every vault share the user holds.
    pub async fn withdraw_all(&self, harness: &StrategyHarness) -> Result<()> {
        let vault = harness.vault_address();
        let shares = self.chain.balance_of(vault, harness.user.address).await?;
        if !shares.is_zero() {
            self.chain.withdraw(harness.user, vault, shares).await?;
        }
        Ok(())
    }

    fn ensure_principal(
        &self,
        check: &'static str,
        returned: U256,
        principal: U256,
    ) -> Result<()> {
        let floor = principal.saturating_sub(self.tolerance(principal));
        if returned < floor {
            return Err(InvariantFailure::new(
                check,
                "user principal preserved",
                returned,
                format!(">= {floor} (principal {principal})"),
            )
            .into());
        }
        Ok(())
    }

    pub async fn common_tests(&self, harness: &StrategyHarness) -> Result<()> {
        let strategy = harness.strategy_address();
        let vault = harness.vault_address();

        let underlying = self.chain.strategy_underlying(strategy).await?;
        if underlying != harness.underlying {
            return Err(InvariantFailure::new(
                "common",
                "strategy underlying matches harness",
                format!("{underlying:#x}"),
                format!("{:#x}", harness.underlying),
            )
            .into());
        }

        let invested = self.chain.invested_underlying_balance(strategy).await?;
        let total = self
            .chain
            .underlying_balance_with_investment(vault)
            .await?;
        if invested > total {
            return Err(InvariantFailure::new(
                "common",
                "invested balance within vault value",
                invested,
                format!("<= {total}"),
            )
            .into());
        }

        let before = self.user_underlying(harness).await?;
        let deposited = self.deposit_all(harness).await?;
        self.withdraw_all(harness).await?;
        let after = self.user_underlying(harness).await?;
        tracing::info!(
            "[VERIFY] Round trip of {} returned {} (held {} before)",
            deposited,
            after,
            before
        );
        self.ensure_principal("common", after, deposited)
    }

    /// Call after the vault holds a position. Exits and checks the funds landed in the vault.
    pub async fn check_emergency_exit(&self, harness: &StrategyHarness) -> Result<()> {
        let strategy = harness.strategy_address();
        let vault = harness.vault_address();
        let value_before = self
            .chain
            .underlying_balance_with_investment(vault)
            .await?;

        self.chain.emergency_exit(harness.signer, strategy).await?;

        let on_venue = self.chain.reward_pool_balance(strategy).await?;
        if on_venue > U256::from(DUST) {
            return Err(InvariantFailure::new(
                "emergency exit",
                "reward venue position unwound",
                on_venue,
                format!("<= {DUST}"),
            )
            .into());
        }
        let retained = self.chain.invested_underlying_balance(strategy).await?;
        if !retained.is_zero() {
            return Err(InvariantFailure::new(
                "emergency exit",
                "strategy retains no underlying",
                retained,
                0,
            )
            .into());
        }
        let value_after = self
            .chain
            .underlying_balance_with_investment(vault)
            .await?;
        let slack = self.tolerance(value_before);
        let drift = if value_after > value_before {
            value_after - value_before
        } else {
            value_before - value_after
        };
        if drift > slack {
            return Err(InvariantFailure::new(
                "emergency exit",
                "vault value unchanged",
                value_after,
                format!("{value_before} +/- {slack}"),
            )
            .into());
        }
        tracing::info!("[VERIFY] Emergency exit moved {} to the vault", value_after);
        Ok(())
    }

    /// One harvest cycle: the probed reward must not shrink and the user must get their
    /// principal back.
    pub async fn do_hard_work_with_liq_path<P>(
        &self,
        harness: &StrategyHarness,
        start_balance: U256,
        probe: &P,
    ) -> Result<()>
    where
        P: ClaimableProbe<C> + ?Sized,
    {
        let vault = harness.vault_address();
        self.chain
            .approve(harness.user, harness.underlying, vault, start_balance)
            .await?;
        self.chain
            .deposit(harness.user, vault, start_balance)
            .await?;
        self.chain.advance_time(self.seconds_per_cycle).await?;

        let before = probe.ready_to_claim(self.chain, harness).await?;
        self.chain
            .harvest(harness.signer, harness.strategy_address())
            .await?;
        let after = probe.ready_to_claim(self.chain, harness).await?;
        if after < before {
            return Err(InvariantFailure::new(
                "do hard work",
                "readyToClaim non-decreasing across harvest",
                after,
                format!(">= {before}"),
            )
            .into());
        }

        self.withdraw_all(harness).await?;
        let returned = self.user_underlying(harness).await?;
        self.ensure_principal("do hard work", returned, start_balance)
    }

    pub async fn check_harvest_loop(
        &self,
        harness: &StrategyHarness,
        start_balance: U256,
        expected_cycles: usize,
        results: &[HarvestCycleResult],
    ) -> Result<()> {
        if results.len() != expected_cycles {
            return Err(InvariantFailure::new(
                "harvest loop",
                "one result per cycle",
                results.len(),
                expected_cycles,
            )
            .into());
        }
        for pair in results.windows(2) {
            if pair[1].timestamp < pair[0].timestamp {
                return Err(InvariantFailure::new(
                    "harvest loop",
                    "timestamps non-decreasing",
                    pair[1].timestamp,
                    format!(">= {}", pair[0].timestamp),
                )
                .into());
            }
        }
        if let Some(shrunk) = results.iter().find(|r| !r.reward_non_decreasing()) {
            return Err(InvariantFailure::new(
                "harvest loop",
                "readyToClaim non-decreasing across harvest",
                format!("cycle {} after={}", shrunk.cycle, shrunk.ready_after),
                format!(">= {}", shrunk.ready_before),
            )
            .into());
        }

        self.withdraw_all(harness).await?;
        let returned = self.user_underlying(harness).await?;
        self.ensure_principal("harvest loop", returned, start_balance)
    }
}

//! Suite runner: one harness per suite, one rolled-back scope per case.
//!
//! The harness is built inside an outer scope. Each case runs inside an inner scope that is
//! rolled back before the next case starts, so a case never sees another case's effects. A
//! case failure is recorded and the suite moves on. Any other error aborts the suite after the
//! outer scope is rolled back.

use crate::bootstrap::BasketFundingShortfall;
use crate::config::chains::ChainConfig;
use crate::error::Result;
use crate::harness::{ConversionTargets, HarnessBuilder, StrategyDescriptor, StrategyHarness};
use crate::harvest_loop::{HarvestCycleResult, HarvestLoopExecutor};
use crate::ledger::{Chain, StateScope};
use crate::utils::config::HarnessConfig;
use crate::verify::{InvariantVerifier, StrategyReadyToClaim};
use alloy::primitives::{Address, U256};
use serde::Serialize;
use std::time::Instant;

const MAX_FAILURE_CHARS: usize = 480;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteCase {
    DoHardWorkWithLiqPath,
    EmergencyExit,
    CommonTest,
    DoHardWorkLoop,
}

impl SuiteCase {
    pub const ALL: [SuiteCase; 4] = [
        SuiteCase::DoHardWorkWithLiqPath,
        SuiteCase::EmergencyExit,
        SuiteCase::CommonTest,
        SuiteCase::DoHardWorkLoop,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::DoHardWorkWithLiqPath => "do hard work with liq path",
            Self::EmergencyExit => "emergency exit",
            Self::CommonTest => "common test should be ok",
            Self::DoHardWorkLoop => "doHardWork loop",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CaseOutcome {
    pub name: &'static str,
    pub passed: bool,
    pub failure: Option<String>,
    pub elapsed_ms: u128,
}

#[derive(Debug, Clone, Serialize)]
pub struct SuiteReport {
    pub strategy: String,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub vault: Address,
    #[serde(serialize_with = "crate::utils::serde_fmt::display")]
    pub start_balance: U256,
    pub shortfalls: Vec<BasketFundingShortfall>,
    pub cases: Vec<CaseOutcome>,
    /// Copy of the harvest loop case's observations, kept for reporting only. The ledger
    /// state they describe is discarded when that case's scope is rolled back.
    pub cycles: Vec<HarvestCycleResult>,
}

impl SuiteReport {
    pub fn passed(&self) -> bool {
        self.cases.iter().all(|case| case.passed)
    }

    pub fn failed(&self) -> impl Iterator<Item = &CaseOutcome> {
        self.cases.iter().filter(|case| !case.passed)
    }
}

/// Collapses whitespace and caps length so a failure fits on one report line.
fn compact_failure(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= MAX_FAILURE_CHARS {
        return collapsed;
    }
    let mut truncated: String = collapsed.chars().take(MAX_FAILURE_CHARS).collect();
    truncated.push_str("...");
    truncated
}

pub struct SuiteRunner<'a, C: ?Sized> {
    chain: &'a C,
    chain_config: &'a ChainConfig,
    config: &'a HarnessConfig,
}

impl<'a, C> SuiteRunner<'a, C>
where
    C: Chain + ?Sized,
{
    pub fn new(chain: &'a C, chain_config: &'a ChainConfig, config: &'a HarnessConfig) -> Self {
        Self {
            chain,
            chain_config,
            config,
        }
    }

    pub async fn run(
        &self,
        descriptor: &StrategyDescriptor,
        reward_tokens: &[Address],
        targets: &ConversionTargets,
    ) -> Result<SuiteReport> {
        self.config.validate()?;
        let mut scopes = StateScope::new();
        let outer = scopes.snapshot(self.chain).await?;

        let result = self
            .run_in_scope(&mut scopes, descriptor, reward_tokens, targets)
            .await;
        let restored = scopes.rollback(self.chain, outer).await;
        match (result, restored) {
            (Ok(report), restored) => restored.map(|()| report),
            (Err(err), restored) => {
                if let Err(rollback_err) = restored {
                    tracing::error!("[SUITE] Outer rollback failed: {}", rollback_err);
                }
                Err(err)
            }
        }
    }

    async fn run_in_scope(
        &self,
        scopes: &mut StateScope,
        descriptor: &StrategyDescriptor,
        reward_tokens: &[Address],
        targets: &ConversionTargets,
    ) -> Result<SuiteReport> {
        let harness = HarnessBuilder::new(self.chain, self.chain_config, self.config)
            .build(descriptor, reward_tokens, targets)
            .await
            .inspect_err(|err| tracing::error!("[SUITE] Harness build failed: {}", err))?;
        let start_balance = self
            .chain
            .balance_of(harness.underlying, harness.user.address)
            .await?;
        tracing::info!(
            "[SUITE] {} ready; user starts with {}",
            descriptor.strategy_name,
            start_balance
        );

        let mut cases = Vec::with_capacity(SuiteCase::ALL.len());
        let mut cycles = Vec::new();
        for case in SuiteCase::ALL {
            let inner = scopes.snapshot(self.chain).await?;
            let started = Instant::now();
            let result = self.run_case(case, &harness, start_balance).await;
            scopes.rollback(self.chain, inner).await?;

            let elapsed_ms = started.elapsed().as_millis();
            let outcome = match result {
                Ok(observed) => {
                    cycles.extend(observed);
                    tracing::info!("[SUITE] PASS {} ({} ms)", case.name(), elapsed_ms);
                    CaseOutcome {
                        name: case.name(),
                        passed: true,
                        failure: None,
                        elapsed_ms,
                    }
                }
                Err(err) => {
                    let failure = compact_failure(&err.to_string());
                    tracing::warn!("[SUITE] FAIL {}: {}", case.name(), failure);
                    CaseOutcome {
                        name: case.name(),
                        passed: false,
                        failure: Some(failure),
                        elapsed_ms,
                    }
                }
            };
            cases.push(outcome);
        }

        Ok(SuiteReport {
            strategy: descriptor.strategy_name.clone(),
            vault: harness.vault_address(),
            start_balance,
            shortfalls: harness.bootstrap.shortfalls.clone(),
            cases,
            cycles,
        })
    }

    async fn run_case(
        &self,
        case: SuiteCase,
        harness: &StrategyHarness,
        start_balance: U256,
    ) -> Result<Vec<HarvestCycleResult>> {
        let verifier = InvariantVerifier::new(self.chain, self.config);
        match case {
            SuiteCase::DoHardWorkWithLiqPath => {
                verifier
                    .do_hard_work_with_liq_path(harness, start_balance, &StrategyReadyToClaim)
                    .await?;
                Ok(Vec::new())
            }
            SuiteCase::EmergencyExit => {
                verifier.deposit_all(harness).await?;
                verifier.check_emergency_exit(harness).await?;
                Ok(Vec::new())
            }
            SuiteCase::CommonTest => {
                verifier.common_tests(harness).await?;
                Ok(Vec::new())
            }
            SuiteCase::DoHardWorkLoop => {
                let results = HarvestLoopExecutor::new(self.chain)
                    .run(
                        harness,
                        start_balance,
                        self.config.cycles,
                        self.config.seconds_per_cycle,
                    )
                    .await?;
                verifier
                    .check_harvest_loop(harness, start_balance, self.config.cycles, &results)
                    .await?;
                Ok(results)
            }
        }
    }
}

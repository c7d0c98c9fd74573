#![allow(dead_code)]

use alloy::primitives::U256;
use harvest_harness::harness::{HarnessBuilder, StrategyHarness};
use harvest_harness::ledger::TokenOps;
use harvest_harness::sim::PolygonFixture;
use harvest_harness::utils::config::HarnessConfig;

pub fn fixture() -> PolygonFixture {
    PolygonFixture::build().expect("polygon fixture")
}

pub async fn built(fixture: &PolygonFixture, config: &HarnessConfig) -> StrategyHarness {
    HarnessBuilder::new(&fixture.chain, &fixture.config, config)
        .build(
            &fixture.descriptor(),
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await
        .expect("harness build")
}

pub async fn user_underlying(fixture: &PolygonFixture, harness: &StrategyHarness) -> U256 {
    fixture
        .chain
        .balance_of(harness.underlying, harness.user.address)
        .await
        .expect("balance")
}

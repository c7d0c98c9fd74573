mod common;

use alloy::primitives::U256;
use harvest_harness::config::chains::polygon;
use harvest_harness::error::{HarnessError, RouteError, ScopeError};
use harvest_harness::ledger::{Ledger, TokenOps};
use harvest_harness::suite::{SuiteCase, SuiteRunner};
use harvest_harness::utils::config::HarnessConfig;

#[tokio::test]
async fn test_reference_strategy_passes_every_case() {
    let fixture = common::fixture();
    let config = HarnessConfig::default();
    let report = SuiteRunner::new(&fixture.chain, &fixture.config, &config)
        .run(
            &fixture.descriptor(),
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await
        .expect("suite");

    let failures: Vec<_> = report
        .failed()
        .map(|case| format!("{}: {:?}", case.name, case.failure))
        .collect();
    assert!(report.passed(), "failed cases: {failures:?}");
    let names: Vec<_> = report.cases.iter().map(|case| case.name).collect();
    let expected: Vec<_> = SuiteCase::ALL.iter().map(|case| case.name()).collect();
    assert_eq!(names, expected);
    assert_eq!(report.cycles.len(), config.cycles);
    assert_eq!(report.shortfalls.len(), 2);
    assert!(report.start_balance > U256::ZERO);
}

#[tokio::test]
async fn test_suite_leaves_the_ledger_as_it_found_it() {
    let fixture = common::fixture();
    let chain = &fixture.chain;
    let user = chain.actors().await.unwrap()[1];
    let start_time = chain.timestamp().await.unwrap();
    let lp_supply = chain.total_supply(fixture.lp_token).await.unwrap();

    let config = HarnessConfig::default().with_cycles(2, 600);
    SuiteRunner::new(chain, &fixture.config, &config)
        .run(
            &fixture.descriptor(),
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await
        .expect("suite");

    assert_eq!(chain.timestamp().await.unwrap(), start_time);
    assert_eq!(chain.total_supply(fixture.lp_token).await.unwrap(), lp_supply);
    assert!(chain
        .balance_of(fixture.lp_token, user.address)
        .await
        .unwrap()
        .is_zero());
    assert_eq!(chain.live_snapshots().await, 0);
}

#[tokio::test]
async fn test_build_failure_aborts_the_suite() {
    let fixture = common::fixture();
    let mut descriptor = fixture.descriptor();
    // No router is registered for this factory, so route registration cannot start.
    descriptor.factory = polygon::WBTC;
    let config = HarnessConfig::default();

    let err = SuiteRunner::new(&fixture.chain, &fixture.config, &config)
        .run(
            &descriptor,
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Route(RouteError::MissingRouter { factory }) if factory == polygon::WBTC
    ));
    assert_eq!(fixture.chain.live_snapshots().await, 0);
}

#[tokio::test]
async fn test_case_scope_failure_restores_the_ledger() {
    let fixture = common::fixture();
    let chain = &fixture.chain;
    let user = chain.actors().await.unwrap()[1];
    let start_time = chain.timestamp().await.unwrap();
    let lp_supply = chain.total_supply(fixture.lp_token).await.unwrap();
    // Room for the outer scope only, so the first case cannot open its own.
    chain.set_snapshot_limit(1).await;

    let config = HarnessConfig::default();
    let err = SuiteRunner::new(chain, &fixture.config, &config)
        .run(
            &fixture.descriptor(),
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        HarnessError::Scope(ScopeError::SnapshotFailure(_))
    ));
    assert_eq!(chain.live_snapshots().await, 0);
    assert_eq!(chain.timestamp().await.unwrap(), start_time);
    assert_eq!(chain.total_supply(fixture.lp_token).await.unwrap(), lp_supply);
    assert!(chain
        .balance_of(fixture.lp_token, user.address)
        .await
        .unwrap()
        .is_zero());
}

#[tokio::test]
async fn test_invalid_config_is_rejected_before_building() {
    let fixture = common::fixture();
    let config = HarnessConfig::default().with_cycles(0, 60);
    let err = SuiteRunner::new(&fixture.chain, &fixture.config, &config)
        .run(
            &fixture.descriptor(),
            &fixture.reward_tokens(),
            &fixture.conversion_targets(),
        )
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Config(_)));
}

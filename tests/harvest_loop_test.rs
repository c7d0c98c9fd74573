mod common;

use alloy::primitives::U256;
use harvest_harness::error::HarnessError;
use harvest_harness::harvest_loop::HarvestLoopExecutor;
use harvest_harness::ledger::{StrategyOps, VaultOps};
use harvest_harness::utils::config::HarnessConfig;

#[tokio::test]
async fn test_three_cycles_advance_time_and_keep_rewards() {
    let fixture = common::fixture();
    let config = HarnessConfig::default();
    let harness = common::built(&fixture, &config).await;
    let start = common::user_underlying(&fixture, &harness).await;

    let results = HarvestLoopExecutor::new(&fixture.chain)
        .run(&harness, start, 3, 60)
        .await
        .expect("loop");

    assert_eq!(results.len(), 3);
    let elapsed: Vec<_> = results.iter().map(|r| r.elapsed).collect();
    assert_eq!(elapsed, vec![60, 120, 180]);
    for pair in results.windows(2) {
        assert_eq!(pair[1].timestamp - pair[0].timestamp, 60);
    }
    assert!(results.iter().all(|r| r.reward_non_decreasing()));
    assert!(results[0].ready_before > U256::ZERO);
    // Everything was deposited up front.
    assert!(results.iter().all(|r| r.user_balance_after.is_zero()));
    assert!(results[2].vault_value_after >= start);
}

#[tokio::test]
async fn test_vesting_rewards_compound_into_the_vault() {
    let fixture = common::fixture();
    let config = HarnessConfig::default();
    let harness = common::built(&fixture, &config).await;
    let start = common::user_underlying(&fixture, &harness).await;

    // Cycles longer than the 28 day reward delay release the whole stream each time.
    let day = 24 * 60 * 60;
    let results = HarvestLoopExecutor::new(&fixture.chain)
        .run(&harness, start, 3, 30 * day)
        .await
        .expect("loop");
    let last = results.last().expect("cycles");
    assert!(last.vault_value_after > start);
    let invested = fixture
        .chain
        .invested_underlying_balance(harness.strategy_address())
        .await
        .unwrap();
    let total = fixture
        .chain
        .underlying_balance_with_investment(harness.vault_address())
        .await
        .unwrap();
    assert_eq!(invested, total);
}

#[tokio::test]
async fn test_zero_second_cycles_harvest_at_the_same_time() {
    let fixture = common::fixture();
    let harness = common::built(&fixture, &HarnessConfig::default()).await;
    let start = common::user_underlying(&fixture, &harness).await;

    let results = HarvestLoopExecutor::new(&fixture.chain)
        .run(&harness, start, 3, 0)
        .await
        .expect("loop");

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|r| r.elapsed == 0));
    assert!(results
        .iter()
        .all(|r| r.timestamp == results[0].timestamp));
    assert_eq!(
        results.iter().map(|r| r.cycle).collect::<Vec<_>>(),
        vec![1, 2, 3]
    );
    assert!(results[2].vault_value_after >= start);
}

#[tokio::test]
async fn test_zero_cycles_is_a_config_error() {
    let fixture = common::fixture();
    let harness = common::built(&fixture, &HarnessConfig::default()).await;
    let start = common::user_underlying(&fixture, &harness).await;

    let err = HarvestLoopExecutor::new(&fixture.chain)
        .run(&harness, start, 0, 60)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Config(_)));
}

#[tokio::test]
async fn test_failing_harvest_aborts_with_cycle_number() {
    let fixture = common::fixture();
    let harness = common::built(&fixture, &HarnessConfig::default()).await;
    let start = common::user_underlying(&fixture, &harness).await;
    fixture
        .chain
        .emergency_exit(harness.signer, harness.strategy_address())
        .await
        .expect("exit");

    let err = HarvestLoopExecutor::new(&fixture.chain)
        .run(&harness, start, 3, 60)
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::HarvestAborted { cycle: 1, .. }));
    assert!(matches!(err.root(), HarnessError::Reverted { .. }));
}

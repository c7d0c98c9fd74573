mod common;

use harvest_harness::config::chains::polygon;
use harvest_harness::error::HarnessError;
use harvest_harness::export::{export_vault_names, ASSETS_FILE, VAULTS_FILE};
use harvest_harness::utils::config::HarnessConfig;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

fn read_map(path: &Path) -> BTreeMap<String, String> {
    let raw = fs::read_to_string(path).expect("read export");
    serde_json::from_str(&raw).expect("flat json object")
}

#[tokio::test]
async fn test_export_writes_lowercase_name_maps() {
    let fixture = common::fixture();
    let harness = common::built(&fixture, &HarnessConfig::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("nested").join("names");

    let summary = export_vault_names(&fixture.chain, harness.core.bookkeeper, &out)
        .await
        .expect("export");
    assert_eq!(summary.vaults, 1);
    assert_eq!(summary.assets, 4);
    assert_eq!(summary.assets_path, out.join(ASSETS_FILE));
    assert_eq!(summary.vaults_path, out.join(VAULTS_FILE));

    let vaults = read_map(&summary.vaults_path);
    let vault_key = format!("{:#x}", harness.vault_address());
    assert_eq!(vaults.get(&vault_key).map(String::as_str), Some("TETU_USDC_USDT_DAI_MAI"));

    let assets = read_map(&summary.assets_path);
    assert!(assets.keys().all(|key| *key == key.to_lowercase()));
    assert_eq!(
        assets.get(&format!("{:#x}", polygon::MAI)).map(String::as_str),
        Some("miMATIC")
    );
    assert_eq!(
        assets.get(&format!("{:#x}", polygon::USDT)).map(String::as_str),
        Some("USDT")
    );
}

#[tokio::test]
async fn test_unknown_bookkeeper_writes_nothing() {
    let fixture = common::fixture();
    let harness = common::built(&fixture, &HarnessConfig::default()).await;
    let dir = tempfile::tempdir().expect("tempdir");

    // The forwarder is not a bookkeeper.
    let err = export_vault_names(&fixture.chain, harness.core.fee_reward_forwarder, dir.path())
        .await
        .unwrap_err();
    assert!(matches!(err, HarnessError::Reverted { .. }));
    assert!(!dir.path().join(ASSETS_FILE).exists());
}

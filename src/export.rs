//! Dumps vault and asset names registered with a bookkeeper.
//!
//! Writes two flat JSON objects under the output directory: `assets_names.json`
//! (asset address -> symbol) and `vaults_names.json` (vault address -> name). Addresses are
//! lower-case hex.

use crate::error::Result;
use crate::ledger::{TokenOps, VaultRegistry};
use alloy::primitives::Address;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

pub const ASSETS_FILE: &str = "assets_names.json";
pub const VAULTS_FILE: &str = "vaults_names.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportSummary {
    pub assets: usize,
    pub vaults: usize,
    pub assets_path: PathBuf,
    pub vaults_path: PathBuf,
}

fn lower_hex(address: Address) -> String {
    format!("{address:#x}")
}

pub async fn export_vault_names<C>(
    chain: &C,
    bookkeeper: Address,
    out_dir: &Path,
) -> Result<ExportSummary>
where
    C: VaultRegistry + TokenOps + ?Sized,
{
    let mut assets = BTreeMap::new();
    let mut vaults = BTreeMap::new();
    for vault in chain.vaults(bookkeeper).await? {
        let info = chain.vault_info(vault).await?;
        for asset in info.assets {
            let key = lower_hex(asset);
            if !assets.contains_key(&key) {
                let symbol = chain.symbol(asset).await?;
                assets.insert(key, symbol);
            }
        }
        vaults.insert(lower_hex(vault), info.name);
    }

    fs::create_dir_all(out_dir)?;
    let assets_path = out_dir.join(ASSETS_FILE);
    let vaults_path = out_dir.join(VAULTS_FILE);
    fs::write(&assets_path, serde_json::to_string_pretty(&assets)?)?;
    fs::write(&vaults_path, serde_json::to_string_pretty(&vaults)?)?;
    tracing::info!(
        "[EXPORT] Wrote {} assets and {} vaults to {}",
        assets.len(),
        vaults.len(),
        out_dir.display()
    );

    Ok(ExportSummary {
        assets: assets.len(),
        vaults: vaults.len(),
        assets_path,
        vaults_path,
    })
}

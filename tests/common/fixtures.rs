//! Test data builders.

use std::path::{Path, PathBuf};
use std::time::Duration;

use metadata_batch::RunConfig;
use metadata_batch_types::{Address, OnChainRecord, TargetRecord};
use metadata_transport::KeypairSigner;

/// Distinct address for test record `n`.
pub fn address(n: u8) -> Address {
    let mut bytes = [n; 32];
    bytes[0] = 0xa0;
    Address::new(bytes)
}

/// Signer standing in for the operator's update authority.
pub fn authority() -> KeypairSigner {
    KeypairSigner::from_secret([7u8; 32])
}

pub fn on_chain(authority: Address, name: &str, symbol: &str, uri: &str) -> OnChainRecord {
    OnChainRecord {
        authority,
        name: name.to_string(),
        symbol: symbol.to_string(),
        uri: uri.to_string(),
    }
}

pub fn target(id: Address, name: &str, symbol: &str, uri: &str) -> TargetRecord {
    TargetRecord {
        id,
        name: name.to_string(),
        symbol: symbol.to_string(),
        uri: uri.to_string(),
    }
}

/// Run config without delays.
pub fn fast_config() -> RunConfig {
    RunConfig {
        chunk_size: 3,
        chunk_delay: Duration::ZERO,
        record_delay: Duration::ZERO,
        checkpoint_interval: 2,
        dry_run: false,
        resume: false,
        retry_failed: false,
    }
}

/// Write a manifest CSV for `records` into `dir`.
pub fn write_manifest(dir: &Path, records: &[TargetRecord]) -> PathBuf {
    let mut csv = String::from("id,record_data,image,status\n");
    for record in records {
        let data = serde_json::json!({
            "id": record.id.to_string(),
            "name": record.name,
            "symbol": record.symbol,
            "uri": record.uri,
        });
        csv.push_str(&format!(
            "{},\"{}\",image.png,ready\n",
            record.id,
            data.to_string().replace('"', "\"\"")
        ));
    }
    let path = dir.join("manifest.csv");
    std::fs::write(&path, csv).expect("write manifest");
    path
}

/// Write `signer` as a keypair JSON file into `dir`.
pub fn write_keypair(dir: &Path, signer: &KeypairSigner) -> PathBuf {
    let path = dir.join("id.json");
    let bytes = signer.to_keypair_bytes().to_vec();
    std::fs::write(&path, serde_json::to_string(&bytes).expect("encode keypair"))
        .expect("write keypair");
    path
}

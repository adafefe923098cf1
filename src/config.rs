//! Process-environment configuration, read once at `Client` construction
//! rather than scattered across call sites (teacher pattern: see
//! `database::DBConfig`).

use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MerkleOrder {
    TopDown,
    BottomUp,
}

#[derive(Debug, Clone)]
pub struct CircuitArtifactPaths {
    pub withdraw_wasm: PathBuf,
    pub withdraw_zkey: PathBuf,
    pub transfer_wasm: PathBuf,
    pub transfer_zkey: PathBuf,
    pub renew_wasm: PathBuf,
    pub renew_zkey: PathBuf,
}

impl Default for CircuitArtifactPaths {
    fn default() -> Self {
        Self {
            withdraw_wasm: "circuits/withdraw.wasm".into(),
            withdraw_zkey: "circuits/withdraw_final.zkey".into(),
            transfer_wasm: "circuits/transfer.wasm".into(),
            transfer_zkey: "circuits/transfer_final.zkey".into(),
            renew_wasm: "circuits/renew.wasm".into(),
            renew_zkey: "circuits/renew_final.zkey".into(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub merkle_order: MerkleOrder,
    pub merkle_left_is_one: bool,
    pub mock_proofs: bool,
    pub artifacts: CircuitArtifactPaths,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            merkle_order: MerkleOrder::BottomUp,
            merkle_left_is_one: false,
            mock_proofs: false,
            artifacts: CircuitArtifactPaths::default(),
        }
    }
}

impl EngineConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(v) = env::var("ZK_MERKLE_ORDER") {
            cfg.merkle_order = match v.as_str() {
                "top-down" => MerkleOrder::TopDown,
                "bottom-up" => MerkleOrder::BottomUp,
                _ => cfg.merkle_order,
            };
        }
        if let Ok(v) = env::var("ZK_MERKLE_LEFT_IS_ONE") {
            cfg.merkle_left_is_one = v == "1";
        }
        if let Ok(v) = env::var("MOCK_PROOFS") {
            cfg.mock_proofs = v == "1";
        }

        let mut a = CircuitArtifactPaths::default();
        if let Ok(v) = env::var("WITHDRAW_WASM_PATH") {
            a.withdraw_wasm = v.into();
        }
        if let Ok(v) = env::var("WITHDRAW_ZKEY_PATH") {
            a.withdraw_zkey = v.into();
        }
        if let Ok(v) = env::var("TRANSFER_WASM_PATH") {
            a.transfer_wasm = v.into();
        }
        if let Ok(v) = env::var("TRANSFER_ZKEY_PATH") {
            a.transfer_zkey = v.into();
        }
        if let Ok(v) = env::var("RENEW_WASM_PATH") {
            a.renew_wasm = v.into();
        }
        if let Ok(v) = env::var("RENEW_ZKEY_PATH") {
            a.renew_zkey = v.into();
        }
        cfg.artifacts = a;

        cfg
    }
}

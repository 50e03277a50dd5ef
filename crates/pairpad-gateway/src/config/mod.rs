//! Gateway config loader (strict parsing).

pub mod schema;

use std::fs;

use pairpad_core::error::{PairpadError, Result};

pub use schema::{
    CacheSection, ExecutorConfig, GatewayConfig, GatewaySection, ProblemsSection, RateLimits,
    StoreKind, StoreSection, SyncSection,
};

/// Default config path; `PAIRPAD_CONFIG` overrides it.
pub const DEFAULT_CONFIG_PATH: &str = "pairpad.yaml";

pub fn config_path() -> String {
    std::env::var("PAIRPAD_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.to_string())
}

pub fn load_from_file(path: &str) -> Result<GatewayConfig> {
    let s = fs::read_to_string(path)
        .map_err(|e| PairpadError::Internal(format!("read config failed: {e}")))?;
    load_from_str(&s)
}

pub fn load_from_str(s: &str) -> Result<GatewayConfig> {
    let cfg: GatewayConfig = serde_yaml::from_str(s)
        .map_err(|e| PairpadError::BadRequest(format!("invalid yaml: {e}")))?;
    cfg.validate()?;
    Ok(cfg)
}

use serde::Deserialize;
use pairpad_core::error::{PairpadError, Result};
use pairpad_core::model::Language;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    pub version: u32,

    #[serde(default)]
    pub gateway: GatewaySection,

    #[serde(default)]
    pub sync: SyncSection,

    #[serde(default)]
    pub limits: RateLimits,

    #[serde(default)]
    pub store: StoreSection,

    #[serde(default)]
    pub cache: CacheSection,

    #[serde(default)]
    pub problems: ProblemsSection,

    #[serde(default)]
    pub executors: Vec<ExecutorConfig>,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<()> {
        if self.version != 1 {
            return Err(PairpadError::UnsupportedVersion);
        }

        self.gateway.validate()?;   // Verify the scope of value
        self.sync.validate()?;
        self.store.validate()?;

        for e in &self.executors {
            if e.program.trim().is_empty() {
                return Err(PairpadError::BadRequest(format!(
                    "executors[{}].program must not be empty",
                    e.language
                )));
            }
        }
        Ok(())
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            version: 1,
            gateway: GatewaySection::default(),
            sync: SyncSection::default(),
            limits: RateLimits::default(),
            store: StoreSection::default(),
            cache: CacheSection::default(),
            problems: ProblemsSection::default(),
            executors: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GatewaySection {
    #[serde(default = "default_listen")]
    pub listen: String,

    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,

    #[serde(default = "default_idle_timeout_ms")]
    pub idle_timeout_ms: u64,

    #[serde(default = "default_max_frame_bytes")]
    pub max_frame_bytes: usize,

    #[serde(default = "default_outbound_queue")]
    pub outbound_queue: usize,
}

impl Default for GatewaySection {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            ping_interval_ms: default_ping_interval_ms(),
            idle_timeout_ms: default_idle_timeout_ms(),
            max_frame_bytes: default_max_frame_bytes(),
            outbound_queue: default_outbound_queue(),
        }
    }
}

impl GatewaySection {
    pub fn validate(&self) -> Result<()> {
        if !(5000..=120000).contains(&self.ping_interval_ms) {
            return Err(PairpadError::BadRequest(
                "gateway.ping_interval_ms must be between 5000 and 120000".into(),
            ));
        }
        if !(10000..=600000).contains(&self.idle_timeout_ms) {
            return Err(PairpadError::BadRequest(
                "gateway.idle_timeout_ms must be between 10000 and 600000".into(),
            ));
        }
        if self.idle_timeout_ms <= self.ping_interval_ms {
            return Err(PairpadError::BadRequest(
                "gateway.idle_timeout_ms must be greater than ping_interval_ms".into(),
            ));
        }
        if self.max_frame_bytes < 1024 {
            return Err(PairpadError::BadRequest(
                "gateway.max_frame_bytes must be at least 1024".into(),
            ));
        }
        if self.outbound_queue == 0 {
            return Err(PairpadError::BadRequest("gateway.outbound_queue must be > 0".into()));
        }
        Ok(())
    }
}

fn default_listen() -> String {
    "0.0.0.0:8080".into()
}
fn default_ping_interval_ms() -> u64 {
    20000
}
fn default_idle_timeout_ms() -> u64 {
    60000
}
fn default_max_frame_bytes() -> usize {
    256 * 1024
}
fn default_outbound_queue() -> usize {
    1024
}

/// Timing of the per-session sync engine.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SyncSection {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// How long echoes of an applied join-sync are ignored.
    #[serde(default = "default_sync_lock_ms")]
    pub sync_lock_ms: u64,

    #[serde(default = "default_subscriber_queue")]
    pub subscriber_queue: usize,
}

impl Default for SyncSection {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            sync_lock_ms: default_sync_lock_ms(),
            subscriber_queue: default_subscriber_queue(),
        }
    }
}

impl SyncSection {
    pub fn validate(&self) -> Result<()> {
        if !(50..=5000).contains(&self.debounce_ms) {
            return Err(PairpadError::BadRequest(
                "sync.debounce_ms must be between 50 and 5000".into(),
            ));
        }
        if self.sync_lock_ms > 10000 {
            return Err(PairpadError::BadRequest("sync.sync_lock_ms must be <= 10000".into()));
        }
        if self.subscriber_queue == 0 {
            return Err(PairpadError::BadRequest("sync.subscriber_queue must be > 0".into()));
        }
        Ok(())
    }
}

fn default_debounce_ms() -> u64 {
    300
}
fn default_sync_lock_ms() -> u64 {
    500
}
fn default_subscriber_queue() -> usize {
    256
}

/// Per-connection inbound token bucket.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RateLimits {
    #[serde(default = "default_rps")]
    pub rps: u32,
    #[serde(default = "default_burst")]
    pub burst: u32,
}

impl Default for RateLimits {
    fn default() -> Self {
        Self { rps: default_rps(), burst: default_burst() }
    }
}

fn default_rps() -> u32 {
    50
}
fn default_burst() -> u32 {
    100
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct StoreSection {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default)]
    pub url: Option<String>,
}

impl StoreSection {
    pub fn validate(&self) -> Result<()> {
        if self.kind == StoreKind::Sqlite && self.url.as_deref().map_or(true, str::is_empty) {
            return Err(PairpadError::BadRequest("store.url is required for sqlite".into()));
        }
        Ok(())
    }
}

/// Local fallback cache (last-known content per room).
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CacheSection {
    #[serde(default = "default_cache_entries")]
    pub max_entries: u64,
    #[serde(default = "default_cache_ttl_secs")]
    pub ttl_secs: u64,
}

impl Default for CacheSection {
    fn default() -> Self {
        Self { max_entries: default_cache_entries(), ttl_secs: default_cache_ttl_secs() }
    }
}

fn default_cache_entries() -> u64 {
    10_000
}
fn default_cache_ttl_secs() -> u64 {
    24 * 60 * 60
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct ProblemsSection {
    /// JSON catalog file. The embedded catalog is used when absent.
    #[serde(default)]
    pub path: Option<String>,
}

/// External interpreter used to run a language's code.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExecutorConfig {
    pub language: Language,
    pub program: String,
    /// Interpreter arguments; the code itself arrives on stdin.
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_exec_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_exec_timeout_ms() -> u64 {
    5000
}

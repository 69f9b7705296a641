//! System-wide constants and default paths.

use std::path::PathBuf;
use std::sync::OnceLock;

/// Fallback data directory when no home directory is available.
pub const SYSTEM_DATA_DIR: &str = "/var/lib/berth";

/// Returns the data directory, preferring `$HOME/.berth` and falling back
/// to `/var/lib/berth`.
fn resolve_data_dir() -> PathBuf {
    if let Ok(home) = std::env::var("HOME").or_else(|_| std::env::var("USERPROFILE")) {
        return PathBuf::from(home).join(".berth");
    }
    PathBuf::from(SYSTEM_DATA_DIR)
}

static DATA_DIR: OnceLock<PathBuf> = OnceLock::new();

/// Returns the resolved data directory for this process.
pub fn data_dir() -> &'static PathBuf {
    DATA_DIR.get_or_init(resolve_data_dir)
}

/// Returns the default configuration file path.
pub fn default_config_file() -> PathBuf {
    data_dir().join(CONFIG_FILE_NAME)
}

/// Name of the configuration file inside the data directory.
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// Directory, relative to the data directory, holding persisted snapshots.
pub const SNAPSHOT_DIR_NAME: &str = "snapshots";

/// Environment variable overriding the configuration file path.
pub const CONFIG_ENV: &str = "BERTH_CONFIG";

/// Environment variable holding the API token.
pub const API_TOKEN_ENV: &str = "BERTH_API_TOKEN";

/// Default interval between background sync runs (15 minutes).
pub const DEFAULT_SYNC_INTERVAL_SECS: u64 = 15 * 60;

/// Longest accepted interval between background sync runs (30 days).
pub const MAX_SYNC_INTERVAL_SECS: u64 = 30 * 24 * 60 * 60;

/// Default timeout applied by the HTTP client to each request.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Largest change count rendered with the detailed template.
pub const DEFAULT_DETAILED_MAX: usize = 1;

/// Largest change count rendered with the medium template.
pub const DEFAULT_MEDIUM_MAX: usize = 3;

/// Namespace prefixed to every notification dedup identifier.
pub const DEDUP_NAMESPACE: &str = "berth.container-changes";

/// Capacity of the sync event broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

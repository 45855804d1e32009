use crate::config::Config;
use crate::utils::get_chatledger_home;
use anyhow::{Context, Result};
use fs2::FileExt;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

pub fn get_config_path() -> Result<PathBuf> {
    Ok(get_chatledger_home()?.join("config.json"))
}

/// Load configuration from `config_path` (or the default location), then
/// apply environment overrides and structural validation.
///
/// A missing file is not an error: the service can run from the environment
/// alone. Required credentials are checked later by
/// [`Config::validate_for_serve`].
pub fn load_config(config_path: Option<&Path>) -> Result<Config> {
    let default_path = get_config_path().unwrap_or_else(|_| PathBuf::from("config.json"));
    let path = config_path.unwrap_or(default_path.as_path());

    let mut config = if path.exists() {
        // Shared lock: concurrent readers are fine, an editor holding an
        // exclusive lock makes us wait for a consistent file
        let file = fs::File::open(path)
            .with_context(|| format!("Failed to open config at {}", path.display()))?;
        file.lock_shared()
            .with_context(|| "Failed to acquire shared lock on config file")?;

        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        let data: Value = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config JSON from {}", path.display()))?;
        let data = migrate_config(data);

        check_file_permissions(path);
        serde_json::from_value(data).with_context(|| "Failed to deserialize config")?
    } else {
        debug!(
            "no config file at {}, using defaults + environment",
            path.display()
        );
        Config::default()
    };

    crate::config::credentials::apply_env_overrides(&mut config);

    config
        .validate()
        .with_context(|| "Configuration validation failed")?;
    Ok(config)
}

/// Warn if the config file has overly permissive permissions.
#[cfg(unix)]
fn check_file_permissions(path: &Path) {
    use std::os::unix::fs::PermissionsExt;
    use std::sync::Once;

    static WARNED: Once = Once::new();
    WARNED.call_once(|| {
        if let Ok(meta) = std::fs::metadata(path) {
            let mode = meta.permissions().mode();
            if mode & 0o077 != 0 {
                warn!(
                    "config file {} has permissions {:o}, recommend 0600",
                    path.display(),
                    mode & 0o777
                );
            }
        }
    });
}

#[cfg(not(unix))]
fn check_file_permissions(_path: &Path) {}

/// Early deployments kept the message-log table id under
/// `store.messageTableId`; move it to `store.messagesTableId`.
fn migrate_config(data: Value) -> Value {
    if let Value::Object(mut map) = data {
        if let Some(Value::Object(store)) = map.get_mut("store")
            && let Some(old) = store.remove("messageTableId")
            && !store.contains_key("messagesTableId")
        {
            store.insert("messagesTableId".to_string(), old);
        }
        Value::Object(map)
    } else {
        data
    }
}

#[cfg(test)]
mod tests;

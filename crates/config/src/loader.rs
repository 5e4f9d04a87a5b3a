use std::{
    path::{Path, PathBuf},
    sync::{Mutex, MutexGuard},
};

use tracing::{debug, warn};

use crate::{env_subst::substitute_env, schema::MailsageConfig};

/// Standard config file names, checked in order.
const CONFIG_FILENAMES: &[&str] = &[
    "mailsage.toml",
    "mailsage.yaml",
    "mailsage.yml",
    "mailsage.json",
];

/// Override for the config directory, set via `set_config_dir()`.
static CONFIG_DIR_OVERRIDE: Mutex<Option<PathBuf>> = Mutex::new(None);

fn override_slot() -> MutexGuard<'static, Option<PathBuf>> {
    CONFIG_DIR_OVERRIDE
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Restrict config discovery to `path`. Each call replaces the previous
/// override.
pub fn set_config_dir(path: PathBuf) {
    *override_slot() = Some(path);
}

/// Clear the config directory override, restoring default discovery.
pub fn clear_config_dir() {
    *override_slot() = None;
}

fn config_dir_override() -> Option<PathBuf> {
    override_slot().clone()
}

/// Load config from the given path (TOML, YAML or JSON by extension).
pub fn load_config(path: &Path) -> anyhow::Result<MailsageConfig> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
    parse_config(&substitute_env(&raw), path)
}

/// Discover and load config from standard locations.
///
/// Search order:
/// 1. `./mailsage.{toml,yaml,yml,json}` (project-local)
/// 2. `~/.config/mailsage/mailsage.{toml,yaml,yml,json}` (user-global)
///
/// When nothing is found a default config file is written and its contents
/// returned. A file that fails to parse falls back to defaults with a warning.
pub fn discover_and_load() -> MailsageConfig {
    let Some(path) = find_config_file() else {
        debug!("no config file found, writing default config");
        if let Err(e) = write_default_config() {
            warn!(error = %e, "failed to write default config file");
        }
        return MailsageConfig::default();
    };

    debug!(path = %path.display(), "loading config");
    load_config(&path).unwrap_or_else(|e| {
        warn!(path = %path.display(), error = %e, "failed to load config, using defaults");
        MailsageConfig::default()
    })
}

/// Find the first config file in standard locations.
///
/// With an override set only that directory is searched.
pub fn find_config_file() -> Option<PathBuf> {
    let first_in = |dir: &Path| {
        CONFIG_FILENAMES
            .iter()
            .map(|name| dir.join(name))
            .find(|p| p.exists())
    };

    if let Some(dir) = config_dir_override() {
        return first_in(dir.as_path());
    }
    first_in(Path::new(".")).or_else(|| config_dir().and_then(|dir| first_in(dir.as_path())))
}

/// Returns the config directory: override, or `~/.config/mailsage/`.
pub fn config_dir() -> Option<PathBuf> {
    if let Some(dir) = config_dir_override() {
        return Some(dir);
    }
    home_dir().map(|h| h.join(".config").join("mailsage"))
}

/// Returns the data directory holding the default database: `~/.mailsage/`.
pub fn data_dir() -> PathBuf {
    home_dir()
        .map(|h| h.join(".mailsage"))
        .unwrap_or_else(|| PathBuf::from(".mailsage"))
}

fn home_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

/// Returns the path of an existing config file, or the default TOML path.
pub fn find_or_default_config_path() -> PathBuf {
    find_config_file().unwrap_or_else(|| {
        config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("mailsage.toml")
    })
}

/// Write a default config file at `path` unless one already exists there.
///
/// The file is encoded by extension like [`load_config`] reads it. Returns
/// `false` when an existing file was left untouched.
pub fn init_config_file(path: &Path) -> anyhow::Result<bool> {
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, serialize_config(&MailsageConfig::default(), path)?)?;
    debug!(path = %path.display(), "wrote default config file");
    Ok(true)
}

/// Write the default config file. Only called when no config file exists yet.
fn write_default_config() -> anyhow::Result<()> {
    init_config_file(&find_or_default_config_path()).map(|_| ())
}

fn serialize_config(config: &MailsageConfig, path: &Path) -> anyhow::Result<String> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::to_string_pretty(config)?),
        "yaml" | "yml" => Ok(serde_yaml::to_string(config)?),
        "json" => Ok(serde_json::to_string_pretty(config)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

fn parse_config(raw: &str, path: &Path) -> anyhow::Result<MailsageConfig> {
    let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match ext {
        "toml" => Ok(toml::from_str(raw)?),
        "yaml" | "yml" => Ok(serde_yaml::from_str(raw)?),
        "json" => Ok(serde_json::from_str(raw)?),
        _ => anyhow::bail!("unsupported config format: .{ext}"),
    }
}

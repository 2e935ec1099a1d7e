//! Configuration Vault – reads/writes `~/.shub/board.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use shub_types::BoardConfig;

/// Return the path to `~/.shub/board.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

/// Build the config path relative to the given home directory.
pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".shub").join("board.toml")
}

/// Load the board config from disk.  Returns `None` if the file does not
/// exist.
pub fn load() -> Result<Option<BoardConfig>, String> {
    load_from(&config_path())
}

pub(crate) fn load_from(path: &Path) -> Result<Option<BoardConfig>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let mut cfg: BoardConfig =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    apply_env_overrides(&mut cfg);
    cfg.validate()
        .map_err(|e| format!("Invalid config at {}: {}", path.display(), e))?;
    Ok(Some(cfg))
}

/// Load the config, writing the defaults on first run.
pub fn load_or_init() -> Result<BoardConfig, String> {
    let path = config_path();
    match load_from(&path)? {
        Some(cfg) => Ok(cfg),
        None => {
            let cfg = BoardConfig::default();
            save_to(&cfg, &path)?;
            let mut cfg = cfg;
            apply_env_overrides(&mut cfg);
            cfg.validate().map_err(|e| e.to_string())?;
            Ok(cfg)
        }
    }
}

/// Apply `SHUB_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `SHUB_BOARD` | `name` |
/// | `SHUB_HEALTH_PERIOD_MS` | `health_period_ms` |
/// | `SHUB_NO_EVENT_THRESHOLD_MS` | `no_event_threshold_ms` |
/// | `SHUB_DUMP_DIR` | `dump_dir` |
/// | `SHUB_SELF_CHECK_SEED` | `self_check.seed` |
///
/// Unparsable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut BoardConfig) {
    if let Ok(v) = std::env::var("SHUB_BOARD") {
        cfg.name = v;
    }
    if let Ok(v) = std::env::var("SHUB_HEALTH_PERIOD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.health_period_ms = ms;
    }
    if let Ok(v) = std::env::var("SHUB_NO_EVENT_THRESHOLD_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.no_event_threshold_ms = ms;
    }
    if let Ok(v) = std::env::var("SHUB_DUMP_DIR") {
        cfg.dump_dir = Some(PathBuf::from(v));
    }
    if let Ok(v) = std::env::var("SHUB_SELF_CHECK_SEED")
        && let Ok(seed) = v.parse::<u64>()
    {
        cfg.self_check.seed = Some(seed);
    }
}

/// Save the config to disk, creating `~/.shub/` if necessary.
pub fn save(cfg: &BoardConfig) -> Result<(), String> {
    save_to(cfg, &config_path())
}

pub(crate) fn save_to(cfg: &BoardConfig, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
    }
    let raw = toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    fs::write(path, raw).map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))
}

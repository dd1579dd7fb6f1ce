//! Configuration vault: reads/writes `~/.delve/config.toml`.

use delve_types::Settings;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Persisted user configuration stored in `~/.delve/config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Pause between orchestrator ticks, in milliseconds.
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,

    /// Control-layer settings (navigation, apparatus, breaker, loot, pricing).
    #[serde(default)]
    pub settings: Settings,
}

fn default_tick_ms() -> u64 {
    250
}

impl Default for Config {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            settings: Settings::default(),
        }
    }
}

/// Return the path to `~/.delve/config.toml`.
pub fn config_path() -> PathBuf {
    config_path_for_home(
        &std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .unwrap_or_else(|_| ".".to_string()),
    )
}

pub(crate) fn config_path_for_home(home: &str) -> PathBuf {
    PathBuf::from(home).join(".delve").join("config.toml")
}

/// Load the config from disk with `DELVE_*` overrides applied.
///
/// A missing file yields the defaults (overrides still apply).
pub fn load() -> Result<Config, String> {
    let mut cfg = load_from(&config_path())?.unwrap_or_default();
    apply_env_overrides(&mut cfg);
    Ok(cfg)
}

/// Load the config from a specific path.  Returns `None` if the file does
/// not exist.
pub(crate) fn load_from(path: &Path) -> Result<Option<Config>, String> {
    if !path.exists() {
        return Ok(None);
    }
    let raw = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read config at {}: {}", path.display(), e))?;
    let cfg: Config =
        toml::from_str(&raw).map_err(|e| format!("Failed to parse config: {}", e))?;
    Ok(Some(cfg))
}

/// Apply `DELVE_*` environment variable overrides to `cfg`.
///
/// | Variable | Config field |
/// |---|---|
/// | `DELVE_PRICE_URL` | `settings.pricing.base_url` |
/// | `DELVE_TICK_MS` | `tick_ms` |
/// | `DELVE_MAX_RUNS` | `settings.max_runs` |
///
/// Unparseable numbers are ignored.
pub fn apply_env_overrides(cfg: &mut Config) {
    if let Ok(v) = std::env::var("DELVE_PRICE_URL") {
        cfg.settings.pricing.base_url = v;
    }
    if let Ok(v) = std::env::var("DELVE_TICK_MS")
        && let Ok(ms) = v.parse::<u64>()
    {
        cfg.tick_ms = ms;
    }
    if let Ok(v) = std::env::var("DELVE_MAX_RUNS")
        && let Ok(runs) = v.parse::<u32>()
    {
        cfg.settings.max_runs = runs;
    }
}

/// Save the config to `~/.delve/config.toml`.
pub fn save(cfg: &Config) -> Result<(), String> {
    save_to(cfg, &config_path())
}

/// Save the config to a specific path, creating the parent directory.
pub(crate) fn save_to(cfg: &Config, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create config directory: {}", e))?;
        // Owner-only directory (rwx------) on Unix.
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(parent, fs::Permissions::from_mode(0o700))
                .map_err(|e| format!("Failed to set config directory permissions: {}", e))?;
        }
    }
    let raw =
        toml::to_string_pretty(cfg).map_err(|e| format!("Failed to serialize config: {}", e))?;
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .and_then(|mut f| f.write_all(raw.as_bytes()))
            .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    }
    #[cfg(not(unix))]
    fs::write(path, raw)
        .map_err(|e| format!("Failed to write config at {}: {}", path.display(), e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[test]
    fn config_file_has_restrictive_permissions() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let file_mode = std::fs::metadata(&path).expect("file metadata").permissions().mode() & 0o777;
        assert_eq!(file_mode, 0o600, "config file must have 0o600 permissions");

        let dir_meta = std::fs::metadata(path.parent().unwrap()).expect("dir metadata");
        assert_eq!(dir_meta.permissions().mode() & 0o777, 0o700);
    }

    #[test]
    fn roundtrip_default_config() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());

        save_to(&Config::default(), &path).expect("save");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.tick_ms, 250);
        assert_eq!(loaded.settings.max_runs, 0);
        assert_eq!(loaded.settings.pricing, Settings::default().pricing);
        assert_eq!(loaded.settings.device.item_names, Settings::default().device.item_names);
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            "tick_ms = 50\n\n[settings]\nmax_runs = 4\n\n[settings.loot]\npreferred = [\"Exalted Orb\"]\n",
        )
        .expect("write");

        let loaded = load_from(&path).expect("load ok").expect("some");
        assert_eq!(loaded.tick_ms, 50);
        assert_eq!(loaded.settings.max_runs, 4);
        assert_eq!(loaded.settings.loot.preferred, vec!["Exalted Orb".to_string()]);
        assert_eq!(loaded.settings.breaker, Settings::default().breaker);
    }

    #[test]
    fn malformed_file_is_reported() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "tick_ms = \"soon\"").expect("write");
        let err = load_from(&path).expect_err("must fail");
        assert!(err.starts_with("Failed to parse config"));
    }

    #[test]
    fn config_path_points_to_delve_dir() {
        let p = config_path_for_home("/home/testuser");
        assert!(p.to_string_lossy().contains(".delve"));
        assert!(p.to_string_lossy().ends_with("config.toml"));
    }

    #[test]
    fn load_from_returns_none_when_missing() {
        let dir = tempfile::tempdir().expect("tmp dir");
        let path = config_path_for_home(&dir.path().to_string_lossy());
        assert!(load_from(&path).expect("no error").is_none());
    }

    #[test]
    fn apply_env_overrides_changes_price_url() {
        // SAFETY: no other test reads this variable.
        unsafe { std::env::set_var("DELVE_PRICE_URL", "http://prices.local/v1") };
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.settings.pricing.base_url, "http://prices.local/v1");
        unsafe { std::env::remove_var("DELVE_PRICE_URL") };
    }

    #[test]
    fn apply_env_overrides_changes_tick_and_runs_when_parseable() {
        // SAFETY: no other test reads these variables.
        unsafe {
            std::env::set_var("DELVE_TICK_MS", "40");
            std::env::set_var("DELVE_MAX_RUNS", "7");
        }
        let mut cfg = Config::default();
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_ms, 40);
        assert_eq!(cfg.settings.max_runs, 7);

        unsafe {
            std::env::set_var("DELVE_TICK_MS", "soon");
            std::env::set_var("DELVE_MAX_RUNS", "-1");
        }
        apply_env_overrides(&mut cfg);
        assert_eq!(cfg.tick_ms, 40, "unparseable tick is ignored");
        assert_eq!(cfg.settings.max_runs, 7, "unparseable run count is ignored");
        unsafe {
            std::env::remove_var("DELVE_TICK_MS");
            std::env::remove_var("DELVE_MAX_RUNS");
        }
    }
}

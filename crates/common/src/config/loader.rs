//! Settings loader
//!
//! Loads [`ResilienceSettings`] from a file and/or environment variables.
//!
//! ## Loading Strategy
//! 1. Start from a file if one is found (`BULWARK_CONFIG` or the first of the
//!    locations below), otherwise from the defaults
//! 2. Overlay any `BULWARK_*` environment variables
//! 3. Validate the result
//!
//! Environment variables therefore always win over the file.
//!
//! ## Environment Variables
//! - `BULWARK_CONFIG`: Explicit settings file path
//! - `BULWARK_BREAKER_FAILURE_THRESHOLD`
//! - `BULWARK_BREAKER_SUCCESS_THRESHOLD`
//! - `BULWARK_BREAKER_RESET_TIMEOUT_MS`
//! - `BULWARK_BREAKER_RESET_ON_SUCCESS`: `true`/`false`, `1`/`0`, `yes`/`no`,
//!   `on`/`off`
//! - `BULWARK_RETRY_MAX_ATTEMPTS`
//! - `BULWARK_RETRY_INITIAL_DELAY_MS`
//! - `BULWARK_RETRY_MAX_TOTAL_TIME_MS`
//! - `BULWARK_CACHE_TTL_MS`
//! - `BULWARK_CACHE_SWEEP_INTERVAL_MS`
//! - `BULWARK_CACHE_SHARDS`
//!
//! ## File Locations
//! The loader checks (in order) `bulwark.toml`, `bulwark.json`,
//! `config/bulwark.toml` and `config/bulwark.json` relative to the working
//! directory, then the same names next to the executable.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use tracing::{debug, info};

use super::ResilienceSettings;
use crate::error::{CommonError, CommonResult};

const ENV_PREFIX: &str = "BULWARK_";
const CONFIG_PATH_VAR: &str = "BULWARK_CONFIG";
const CANDIDATES: [&str; 4] =
    ["bulwark.toml", "bulwark.json", "config/bulwark.toml", "config/bulwark.json"];

/// Load settings with file discovery and environment overrides
///
/// # Errors
/// Returns `CommonError::Config`, `CommonError::Io` or
/// `CommonError::Serialization` if a file or variable is present but
/// unreadable or invalid. Missing sources are not an error.
pub fn load() -> CommonResult<ResilienceSettings> {
    let explicit = std::env::var(CONFIG_PATH_VAR).ok().map(PathBuf::from);

    let base = match explicit.or_else(discover_config_path) {
        Some(path) => read_file(&path)?,
        None => {
            debug!("No settings file found, starting from defaults");
            ResilienceSettings::default()
        }
    };

    let settings = apply_env(base, |key| std::env::var(key).ok())?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from a specific file
///
/// Format is detected by extension (`.toml` or `.json`).
///
/// # Errors
/// Returns an error if the file is missing, unreadable, malformed or
/// describes invalid settings.
pub fn load_from_file(path: impl AsRef<Path>) -> CommonResult<ResilienceSettings> {
    let settings = read_file(path.as_ref())?;
    settings.validate()?;
    Ok(settings)
}

/// Load settings from `BULWARK_*` environment variables over the defaults
///
/// # Errors
/// Returns `CommonError::Config` if a variable is set to an unparsable value
/// or the resulting settings are invalid.
pub fn load_from_env() -> CommonResult<ResilienceSettings> {
    let settings = apply_env(ResilienceSettings::default(), |key| std::env::var(key).ok())?;
    if std::env::vars().any(|(key, _)| key.starts_with(ENV_PREFIX)) {
        info!("Settings loaded from environment variables");
    }
    settings.validate()?;
    Ok(settings)
}

/// First settings file that exists in the standard locations
pub fn discover_config_path() -> Option<PathBuf> {
    let mut roots = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        roots.push(cwd);
    }
    if let Ok(exe) = std::env::current_exe() {
        roots.extend(exe.parent().map(Path::to_path_buf));
    }

    roots
        .iter()
        .flat_map(|root| CANDIDATES.iter().map(move |name| root.join(name)))
        .find(|path| path.is_file())
}

fn read_file(path: &Path) -> CommonResult<ResilienceSettings> {
    if !path.exists() {
        return Err(CommonError::io_path(path.display().to_string(), "settings file not found"));
    }

    info!(path = %path.display(), "Loading settings from file");
    let contents = std::fs::read_to_string(path)
        .map_err(|e| CommonError::io_path(path.display().to_string(), e.to_string()))?;

    parse_settings(&contents, path)
}

fn parse_settings(contents: &str, path: &Path) -> CommonResult<ResilienceSettings> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("toml");

    match extension {
        "toml" => Ok(toml::from_str(contents)?),
        "json" => Ok(serde_json::from_str(contents)?),
        other => Err(CommonError::config(format!("Unsupported settings format: {other}"))),
    }
}

/// Overlay environment values onto `settings`
///
/// `lookup` resolves a variable name to its value, so tests can supply a
/// map instead of mutating the process environment.
pub(crate) fn apply_env<F>(
    mut settings: ResilienceSettings,
    lookup: F,
) -> CommonResult<ResilienceSettings>
where
    F: Fn(&str) -> Option<String>,
{
    let env = EnvReader { lookup };

    let breaker = &mut settings.circuit_breaker;
    env.parse("BULWARK_BREAKER_FAILURE_THRESHOLD", &mut breaker.failure_threshold)?;
    env.parse("BULWARK_BREAKER_SUCCESS_THRESHOLD", &mut breaker.success_threshold)?;
    env.millis("BULWARK_BREAKER_RESET_TIMEOUT_MS", &mut breaker.reset_timeout)?;
    env.flag("BULWARK_BREAKER_RESET_ON_SUCCESS", &mut breaker.reset_on_success)?;

    let retry = &mut settings.retry;
    env.parse("BULWARK_RETRY_MAX_ATTEMPTS", &mut retry.max_attempts)?;
    env.millis("BULWARK_RETRY_INITIAL_DELAY_MS", &mut retry.initial_delay)?;
    env.optional_millis("BULWARK_RETRY_MAX_TOTAL_TIME_MS", &mut retry.max_total_time)?;

    let cache = &mut settings.cache;
    env.millis("BULWARK_CACHE_TTL_MS", &mut cache.ttl)?;
    env.optional_millis("BULWARK_CACHE_SWEEP_INTERVAL_MS", &mut cache.sweep_interval)?;
    env.parse("BULWARK_CACHE_SHARDS", &mut cache.shards)?;

    Ok(settings)
}

struct EnvReader<F> {
    lookup: F,
}

impl<F: Fn(&str) -> Option<String>> EnvReader<F> {
    fn parse<T>(&self, key: &str, target: &mut T) -> CommonResult<()>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        if let Some(raw) = (self.lookup)(key) {
            *target = raw
                .trim()
                .parse()
                .map_err(|e| CommonError::config_field(key, format!("invalid value '{raw}': {e}")))?;
        }
        Ok(())
    }

    fn millis(&self, key: &str, target: &mut Duration) -> CommonResult<()> {
        if let Some(duration) = self.duration(key)? {
            *target = duration;
        }
        Ok(())
    }

    fn optional_millis(&self, key: &str, target: &mut Option<Duration>) -> CommonResult<()> {
        if let Some(duration) = self.duration(key)? {
            *target = Some(duration);
        }
        Ok(())
    }

    fn duration(&self, key: &str) -> CommonResult<Option<Duration>> {
        let mut millis = None;
        if (self.lookup)(key).is_some() {
            let mut value = 0u64;
            self.parse(key, &mut value)?;
            millis = Some(value);
        }
        Ok(millis.map(Duration::from_millis))
    }

    fn flag(&self, key: &str, target: &mut bool) -> CommonResult<()> {
        if let Some(raw) = (self.lookup)(key) {
            *target = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(CommonError::config_field(key, format!("invalid boolean '{raw}'")))
                }
            };
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| ((*k).to_string(), (*v).to_string())).collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_apply_env_without_variables_keeps_base() {
        let settings = apply_env(ResilienceSettings::default(), env(&[])).unwrap();
        assert_eq!(settings, ResilienceSettings::default());
    }

    /// Validates every supported variable overrides its field.
    ///
    /// Assertions:
    /// - Confirms numeric, millisecond and boolean values are parsed.
    /// - Confirms optional durations become `Some`.
    #[test]
    fn test_apply_env_overrides_all_fields() {
        let settings = apply_env(
            ResilienceSettings::default(),
            env(&[
                ("BULWARK_BREAKER_FAILURE_THRESHOLD", "3"),
                ("BULWARK_BREAKER_SUCCESS_THRESHOLD", "1"),
                ("BULWARK_BREAKER_RESET_TIMEOUT_MS", "100"),
                ("BULWARK_BREAKER_RESET_ON_SUCCESS", "YES"),
                ("BULWARK_RETRY_MAX_ATTEMPTS", "4"),
                ("BULWARK_RETRY_INITIAL_DELAY_MS", "50"),
                ("BULWARK_RETRY_MAX_TOTAL_TIME_MS", "2000"),
                ("BULWARK_CACHE_TTL_MS", "60000"),
                ("BULWARK_CACHE_SWEEP_INTERVAL_MS", "250"),
                ("BULWARK_CACHE_SHARDS", "32"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.circuit_breaker.failure_threshold, 3);
        assert_eq!(settings.circuit_breaker.success_threshold, 1);
        assert_eq!(settings.circuit_breaker.reset_timeout, Duration::from_millis(100));
        assert!(settings.circuit_breaker.reset_on_success);
        assert_eq!(settings.retry.max_attempts, 4);
        assert_eq!(settings.retry.initial_delay, Duration::from_millis(50));
        assert_eq!(settings.retry.max_total_time, Some(Duration::from_secs(2)));
        assert_eq!(settings.cache.ttl, Duration::from_secs(60));
        assert_eq!(settings.cache.sweep_interval, Some(Duration::from_millis(250)));
        assert_eq!(settings.cache.shards, 32);
    }

    #[test]
    fn test_apply_env_invalid_number() {
        let err = apply_env(
            ResilienceSettings::default(),
            env(&[("BULWARK_RETRY_MAX_ATTEMPTS", "lots")]),
        )
        .unwrap_err();

        assert!(
            matches!(err, CommonError::Config { field: Some(ref f), .. } if f == "BULWARK_RETRY_MAX_ATTEMPTS")
        );
    }

    #[test]
    fn test_apply_env_invalid_boolean() {
        let result = apply_env(
            ResilienceSettings::default(),
            env(&[("BULWARK_BREAKER_RESET_ON_SUCCESS", "maybe")]),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_settings_by_extension() {
        let toml = parse_settings("[retry]\nmax_attempts = 7\n", Path::new("bulwark.toml")).unwrap();
        assert_eq!(toml.retry.max_attempts, 7);

        let json = parse_settings(r#"{"retry":{"max_attempts":8}}"#, Path::new("bulwark.json")).unwrap();
        assert_eq!(json.retry.max_attempts, 8);

        let err = parse_settings("", Path::new("bulwark.yaml")).unwrap_err();
        assert!(matches!(err, CommonError::Config { .. }));
    }

    #[test]
    fn test_parse_settings_malformed() {
        let err = parse_settings("[retry", Path::new("bulwark.toml")).unwrap_err();
        assert!(matches!(err, CommonError::Serialization { format: Some(ref f), .. } if f == "TOML"));
    }
}

//! Config file loading and environment overrides.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::ReportError;
use crate::types::Config;

pub const CONFIG_PATH_ENV: &str = "CRMBRIEF_CONFIG";

/// `$CRMBRIEF_CONFIG`, else ~/.crmbrief/config.json.
pub fn config_path() -> Result<PathBuf, ReportError> {
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        if !path.trim().is_empty() {
            return Ok(PathBuf::from(path));
        }
    }
    let home = dirs::home_dir().ok_or_else(|| {
        ReportError::ConfigurationError("Could not find home directory".to_string())
    })?;
    Ok(home.join(".crmbrief").join("config.json"))
}

/// Read a config file. A missing file is not an error.
pub fn load_config_from(path: &Path) -> Result<Config, ReportError> {
    if !path.exists() {
        log::info!("No config file at {}, using defaults", path.display());
        return Ok(Config::default());
    }
    let content = fs::read_to_string(path).map_err(|e| {
        ReportError::ConfigurationError(format!("Failed to read config {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        ReportError::ConfigurationError(format!("Failed to parse config {}: {}", path.display(), e))
    })
}

fn parse_flag(name: &str, raw: &str) -> Result<bool, ReportError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(ReportError::ConfigurationError(format!(
            "{} must be true or false, got '{}'",
            name, other
        ))),
    }
}

/// A config that could not be loaded, with a best-effort replacement built
/// from defaults and the environment.
#[derive(Debug)]
pub struct LoadFailure {
    pub error: ReportError,
    pub fallback: Config,
}

/// Apply every override it can and return the flags that did not parse.
fn apply_env<F>(config: &mut Config, lookup: F) -> Vec<ReportError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(key) = lookup("BREVO_API_KEY") {
        config.crm.api_key = Some(key);
    }
    if let Some(key) = lookup("OPENAI_API_KEY") {
        config.summarizer.api_key = Some(key);
    }
    if let Some(url) = lookup("TEAMS_WEBHOOK_URL") {
        config.delivery.webhook_url = Some(url);
    }
    if let Some(tz) = lookup("CRMBRIEF_TIMEZONE") {
        config.timezone = tz;
    }

    let mut errors = Vec::new();
    if let Some(raw) = lookup("USE_MOCK_DATA") {
        match parse_flag("USE_MOCK_DATA", &raw) {
            Ok(flag) => config.use_mock_data = flag,
            Err(e) => errors.push(e),
        }
    }
    if let Some(raw) = lookup("CRMBRIEF_DRY_RUN") {
        match parse_flag("CRMBRIEF_DRY_RUN", &raw) {
            Ok(flag) => config.delivery.dry_run = flag,
            Err(e) => errors.push(e),
        }
    }
    errors
}

/// Apply environment overrides on top of the file config. `lookup` is
/// `std::env::var` in production.
pub fn apply_env_overrides<F>(config: &mut Config, lookup: F) -> Result<(), ReportError>
where
    F: Fn(&str) -> Option<String>,
{
    match apply_env(config, lookup).into_iter().next() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Defaults plus whatever environment overrides parse. Malformed flags keep
/// their default.
pub fn fallback_config<F>(lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let mut config = Config::default();
    for e in apply_env(&mut config, lookup) {
        log::warn!("Ignoring override in fallback config: {}", e);
    }
    config
}

/// Load the config for this process: file first, then the environment.
/// On failure the fallback still carries the delivery settings from the
/// environment, so the error can be reported.
pub fn load_config() -> Result<Config, LoadFailure> {
    let lookup = |name: &str| std::env::var(name).ok();
    config_path()
        .and_then(|path| load_config_from(&path))
        .and_then(|mut config| {
            apply_env_overrides(&mut config, lookup)?;
            Ok(config)
        })
        .map_err(|error| LoadFailure {
            error,
            fallback: fallback_config(lookup),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = load_config_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config.timezone, "America/Toronto");
        assert!(!config.use_mock_data);
    }

    #[test]
    fn file_sections_are_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "useMockData": true,
                "timezone": "Europe/Paris",
                "crm": {{ "companyConcurrency": 8 }},
                "lookups": {{ "owners": {{ "u1": "Dana" }} }}
            }}"#
        )
        .unwrap();
        let config = load_config_from(file.path()).unwrap();
        assert!(config.use_mock_data);
        assert_eq!(config.timezone, "Europe/Paris");
        assert_eq!(config.crm.company_concurrency, 8);
        assert_eq!(config.crm.page_size, 50);
        assert_eq!(config.lookups.owner_name(Some("u1")), "Dana");
    }

    #[test]
    fn malformed_file_is_configuration_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();
        assert!(matches!(
            load_config_from(file.path()),
            Err(ReportError::ConfigurationError(_))
        ));
    }

    #[test]
    fn environment_overrides_file() {
        let mut config = Config::default();
        config.timezone = "Europe/Paris".to_string();
        apply_env_overrides(
            &mut config,
            env(&[
                ("BREVO_API_KEY", "xkeysib"),
                ("OPENAI_API_KEY", "sk"),
                ("TEAMS_WEBHOOK_URL", "https://hook"),
                ("CRMBRIEF_TIMEZONE", "America/Vancouver"),
                ("USE_MOCK_DATA", "TRUE"),
                ("CRMBRIEF_DRY_RUN", "1"),
            ]),
        )
        .unwrap();
        assert_eq!(config.crm.api_key.as_deref(), Some("xkeysib"));
        assert_eq!(config.summarizer.api_key.as_deref(), Some("sk"));
        assert_eq!(config.delivery.webhook_url.as_deref(), Some("https://hook"));
        assert_eq!(config.timezone, "America/Vancouver");
        assert!(config.use_mock_data);
        assert!(config.delivery.dry_run);
    }

    #[test]
    fn unset_environment_leaves_config_alone() {
        let mut config = Config::default();
        config.use_mock_data = true;
        apply_env_overrides(&mut config, env(&[])).unwrap();
        assert!(config.use_mock_data);
        assert!(config.crm.api_key.is_none());
    }

    #[test]
    fn bad_flag_is_rejected() {
        let mut config = Config::default();
        let err = apply_env_overrides(&mut config, env(&[("USE_MOCK_DATA", "maybe")])).unwrap_err();
        assert!(err.to_string().contains("USE_MOCK_DATA"));
    }

    #[test]
    fn fallback_keeps_webhook_despite_bad_flag() {
        let config = fallback_config(env(&[
            ("TEAMS_WEBHOOK_URL", "https://hook"),
            ("USE_MOCK_DATA", "maybe"),
            ("CRMBRIEF_DRY_RUN", "yes"),
        ]));
        assert_eq!(config.delivery.webhook_url.as_deref(), Some("https://hook"));
        assert!(!config.use_mock_data);
        assert!(config.delivery.dry_run);
        assert_eq!(config.timezone, "America/Toronto");
    }
}

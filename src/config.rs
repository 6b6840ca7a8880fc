//! Settings resolution
//!
//! Priority: command-line flags, then `OPCONVERGE_*` environment variables,
//! then `config.toml` in the config directory, then defaults.
//!
//! ```toml
//! url = "https://acme.us-west-2.api.example.io"
//! retries = 2
//!
//! [[auth]]
//! url = "https://acme.us-west-2.api.example.io"
//! token = "..."
//! ```
//!
//! Tokens live in `[[auth]]` entries keyed by URL; the entry whose canonical
//! URL matches the backend in use supplies the token.

use crate::paths;
use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

pub const ENV_URL: &str = "OPCONVERGE_URL";
pub const ENV_TOKEN: &str = "OPCONVERGE_TOKEN";
pub const ENV_RETRIES: &str = "OPCONVERGE_RETRIES";

/// Retries after the first attempt when nothing is configured.
const DEFAULT_RETRIES: u32 = 2;

// ============================================================================
// Config file
// ============================================================================

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigFile {
    pub url: Option<String>,
    pub retries: Option<u32>,
    pub min_version: Option<String>,
    pub schema: Option<String>,
    #[serde(default)]
    pub auth: Vec<AuthEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AuthEntry {
    pub url: String,
    pub token: String,
}

impl ConfigFile {
    /// Load a config file; a missing file is an empty config.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No config file at {}", path.display());
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("Could not read {}", path.display()))?;
        toml::from_str(&content).with_context(|| format!("Invalid config file {}", path.display()))
    }

    /// Token of the auth entry for a canonical URL.
    fn token_for(&self, url: &str) -> Option<&str> {
        self.auth
            .iter()
            .find(|entry| opclient::api_url(&entry.url) == url)
            .map(|entry| entry.token.as_str())
    }
}

// ============================================================================
// Settings
// ============================================================================

/// Values given on the command line.
#[derive(Debug, Default, Clone)]
pub struct Overrides {
    pub url: Option<String>,
    pub token: Option<String>,
    pub retries: Option<u32>,
    pub schema: Option<PathBuf>,
    pub min_version: Option<String>,
}

/// Settings that do not need a backend connection.
#[derive(Debug, Clone)]
pub struct LocalSettings {
    pub schema: Option<PathBuf>,
}

/// Fully resolved settings for talking to a backend.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Canonical API URL
    pub url: String,
    pub token: String,
    pub retries: u32,
    pub schema: Option<PathBuf>,
    pub min_version: Option<String>,
}

/// Resolve the schema document path alone (for offline commands).
pub fn local_settings(overrides: &Overrides) -> Result<LocalSettings> {
    let file = ConfigFile::load(&paths::config_file()?)?;
    Ok(LocalSettings {
        schema: overrides
            .schema
            .clone()
            .or_else(|| file.schema.as_deref().map(paths::expand)),
    })
}

/// Resolve backend settings from flags, the environment and the config file.
pub fn load(overrides: Overrides) -> Result<Settings> {
    let file = ConfigFile::load(&paths::config_file()?)?;
    resolve(overrides, |key| std::env::var(key).ok(), &file)
}

/// Pure resolution step behind [`load`].
pub fn resolve(
    overrides: Overrides,
    env: impl Fn(&str) -> Option<String>,
    file: &ConfigFile,
) -> Result<Settings> {
    let raw_url = overrides
        .url
        .or_else(|| env(ENV_URL))
        .or_else(|| file.url.clone())
        .or_else(|| match file.auth.as_slice() {
            [only] => Some(only.url.clone()),
            _ => None,
        });
    let Some(raw_url) = raw_url else {
        bail!(
            "Missing backend URL. Pass --url, set {ENV_URL}, or add `url` to the config file.\n\
             It should be of the form {}",
            opclient::CANONICAL_FORM
        );
    };
    let url = opclient::api_url(&raw_url);

    let token = overrides
        .token
        .or_else(|| env(ENV_TOKEN))
        .or_else(|| file.token_for(&url).map(str::to_string));
    let Some(token) = token else {
        bail!("Missing API token for {url}. Pass --token, set {ENV_TOKEN}, or add an [[auth]] entry.");
    };

    let retries = match (overrides.retries, env(ENV_RETRIES)) {
        (Some(n), _) => n,
        (None, Some(raw)) => raw
            .trim()
            .parse()
            .with_context(|| format!("Invalid {ENV_RETRIES} value '{raw}'"))?,
        (None, None) => file.retries.unwrap_or(DEFAULT_RETRIES),
    };

    Ok(Settings {
        url,
        token,
        retries,
        schema: overrides
            .schema
            .or_else(|| file.schema.as_deref().map(paths::expand)),
        min_version: overrides.min_version.or_else(|| file.min_version.clone()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    const URL: &str = "https://acme.eu.api.example.io";

    fn env(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    fn parse(toml_text: &str) -> ConfigFile {
        toml::from_str(toml_text).unwrap()
    }

    #[test]
    fn test_flags_win() {
        let file = parse(
            r#"
            url = "https://other.eu.api.example.io"
            [[auth]]
            url = "https://other.eu.api.example.io"
            token = "file-token"
            "#,
        );
        let overrides = Overrides {
            url: Some(URL.into()),
            token: Some("flag-token".into()),
            retries: Some(7),
            ..Overrides::default()
        };
        let settings = resolve(overrides, env(&[(ENV_URL, "https://x.y.api.z.io")]), &file).unwrap();
        assert_eq!(settings.url, URL);
        assert_eq!(settings.token, "flag-token");
        assert_eq!(settings.retries, 7);
    }

    #[test]
    fn test_env_over_file() {
        let file = parse("url = \"https://other.eu.api.example.io\"\nretries = 4\n");
        let settings = resolve(
            Overrides::default(),
            env(&[(ENV_URL, URL), (ENV_TOKEN, "env-token"), (ENV_RETRIES, "1")]),
            &file,
        )
        .unwrap();
        assert_eq!(settings.url, URL);
        assert_eq!(settings.token, "env-token");
        assert_eq!(settings.retries, 1);
    }

    #[test]
    fn test_auth_entry_selected_by_canonical_url() {
        let file = parse(
            r#"
            [[auth]]
            url = "https://first.eu.api.example.io"
            token = "first"

            [[auth]]
            url = "acme.eu.app.example.io/"
            token = "second"
            "#,
        );
        let settings = resolve(Overrides::default(), env(&[(ENV_URL, URL)]), &file).unwrap();
        assert_eq!(settings.token, "second");
        assert_eq!(settings.retries, DEFAULT_RETRIES);
    }

    #[test]
    fn test_single_auth_entry_supplies_url() {
        let file = parse("[[auth]]\nurl = \"acme.eu.api.example.io\"\ntoken = \"t\"\n");
        let settings = resolve(Overrides::default(), env(&[]), &file).unwrap();
        assert_eq!(settings.url, URL);
        assert_eq!(settings.token, "t");
    }

    #[test]
    fn test_missing_url_and_token() {
        let err = resolve(Overrides::default(), env(&[]), &ConfigFile::default()).unwrap_err();
        assert!(err.to_string().contains("Missing backend URL"));

        let err = resolve(Overrides::default(), env(&[(ENV_URL, URL)]), &ConfigFile::default())
            .unwrap_err();
        assert!(err.to_string().contains("Missing API token"));
    }

    #[test]
    fn test_invalid_env_retries() {
        let err = resolve(
            Overrides::default(),
            env(&[(ENV_URL, URL), (ENV_TOKEN, "t"), (ENV_RETRIES, "many")]),
            &ConfigFile::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains(ENV_RETRIES));
    }

    #[test]
    fn test_load_missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let file = ConfigFile::load(&dir.path().join("config.toml")).unwrap();
        assert!(file.url.is_none());
        assert!(file.auth.is_empty());
    }

    #[test]
    fn test_load_rejects_unknown_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "urll = \"typo\"\n").unwrap();
        assert!(ConfigFile::load(&path).is_err());
    }
}

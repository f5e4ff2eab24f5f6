//! Terraform CLI configuration discovery and merging.
//!
//! The CLI keeps two optional sources of configuration that matter for bootstrap:
//!
//! - the general config file (`~/.terraformrc`, relocatable through
//!   [`CLI_CONFIG_FILE_ENV`] and [`LEGACY_CONFIG_FILE_ENV`]), which may contain
//!   `host` blocks overriding service discovery and `credentials` blocks;
//! - the credentials file (`~/.terraform.d/credentials.tfrc.json`) written by
//!   `terraform login`, whose location is fixed.
//!
//! Both sources are optional. Any problem locating, reading or parsing them is
//! logged and treated as an empty source; loading never fails.

use serde::Deserialize;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::hostname::NormalizedHost;

/// Environment variable holding an explicit path to the general config file.
pub const CLI_CONFIG_FILE_ENV: &str = "TF_CLI_CONFIG_FILE";

/// Legacy environment variable holding a path to the general config file.
pub const LEGACY_CONFIG_FILE_ENV: &str = "TERRAFORM_CONFIG";

/// Environment variable overriding the home directory.
#[cfg(not(windows))]
pub const HOME_ENV: &str = "HOME";

/// Environment variable overriding the configuration directory.
#[cfg(windows)]
pub const HOME_ENV: &str = "APPDATA";

#[cfg(not(windows))]
const CONFIG_FILE_NAME: &str = ".terraformrc";
#[cfg(windows)]
const CONFIG_FILE_NAME: &str = "terraform.rc";

#[cfg(not(windows))]
const CONFIG_DIR_NAME: &str = ".terraform.d";
#[cfg(windows)]
const CONFIG_DIR_NAME: &str = "terraform.d";

const CREDENTIALS_FILE_NAME: &str = "credentials.tfrc.json";

/// Immutable snapshot of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    /// Capture the current process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self {
            vars: std::env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    #[must_use]
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Returns the value of a variable, treating empty values as unset.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

/// Resolves where the CLI configuration files live.
#[derive(Debug, Clone, Default)]
pub struct ConfigLocator {
    cli_config_file: Option<PathBuf>,
    legacy_config_file: Option<PathBuf>,
    home_dir: Option<PathBuf>,
    use_platform_home: bool,
}

impl ConfigLocator {
    /// Create a locator from the process environment.
    #[must_use]
    pub fn from_process() -> Self {
        Self::from_env(&EnvVars::from_process())
    }

    /// Create a locator from an environment snapshot.
    ///
    /// When the home override is not set the platform account database is consulted.
    #[must_use]
    pub fn from_env(env: &EnvVars) -> Self {
        Self {
            cli_config_file: env.get(CLI_CONFIG_FILE_ENV).map(PathBuf::from),
            legacy_config_file: env.get(LEGACY_CONFIG_FILE_ENV).map(PathBuf::from),
            home_dir: env.get(HOME_ENV).map(PathBuf::from),
            use_platform_home: true,
        }
    }

    /// Create a locator rooted at an explicit home directory, ignoring the
    /// platform account database.
    #[must_use]
    pub fn with_home(home: impl Into<PathBuf>) -> Self {
        Self {
            cli_config_file: None,
            legacy_config_file: None,
            home_dir: Some(home.into()),
            use_platform_home: false,
        }
    }

    /// Set the explicit general config file path.
    #[must_use]
    pub fn with_cli_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.cli_config_file = Some(path.into());
        self
    }

    /// Set the legacy general config file path.
    #[must_use]
    pub fn with_legacy_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.legacy_config_file = Some(path.into());
        self
    }

    /// Resolve the home directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if neither the override nor the platform
    /// yields a non-empty path.
    pub fn home_dir(&self) -> Result<PathBuf> {
        if let Some(home) = &self.home_dir {
            return Ok(home.clone());
        }

        if self.use_platform_home {
            if let Some(home) = platform_home_dir().filter(|p| !p.as_os_str().is_empty()) {
                return Ok(home);
            }
        }

        Err(Error::ConfigError(
            "unable to determine the home directory".to_string(),
        ))
    }

    /// Path of the general config file.
    ///
    /// # Errors
    ///
    /// Returns an error only when no override is set and the home directory is unknown.
    pub fn config_file(&self) -> Result<PathBuf> {
        if let Some(path) = &self.cli_config_file {
            return Ok(path.clone());
        }
        if let Some(path) = &self.legacy_config_file {
            return Ok(path.clone());
        }
        Ok(self.home_dir()?.join(CONFIG_FILE_NAME))
    }

    /// Path of the credentials file.
    ///
    /// # Errors
    ///
    /// Returns an error when the home directory is unknown.
    pub fn credentials_file(&self) -> Result<PathBuf> {
        Ok(self
            .home_dir()?
            .join(CONFIG_DIR_NAME)
            .join(CREDENTIALS_FILE_NAME))
    }
}

#[cfg(not(windows))]
fn platform_home_dir() -> Option<PathBuf> {
    dirs::home_dir()
}

#[cfg(windows)]
fn platform_home_dir() -> Option<PathBuf> {
    dirs::config_dir()
}

/// Static service table for one host, replacing network discovery for it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct HostOverride {
    /// Logical service identifiers mapped to URLs or metadata
    #[serde(default)]
    pub services: Map<String, Value>,
}

/// Opaque credential attributes configured for one host.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(transparent)]
pub struct CredentialRecord(Map<String, Value>);

impl CredentialRecord {
    /// Wrap raw attributes.
    #[must_use]
    pub const fn new(attributes: Map<String, Value>) -> Self {
        Self(attributes)
    }

    /// Returns the bearer token, if the record has a non-empty string `token`.
    #[must_use]
    pub fn token(&self) -> Option<&str> {
        self.0
            .get("token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
    }

    /// Returns all attributes.
    #[must_use]
    pub const fn attributes(&self) -> &Map<String, Value> {
        &self.0
    }
}

/// One configuration file as written by the user, before hostname normalization.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawCliConfig {
    /// `host` blocks keyed by user-written hostname
    #[serde(default, rename = "host")]
    pub hosts: HashMap<String, HostOverride>,

    /// `credentials` blocks keyed by user-written hostname
    #[serde(default)]
    pub credentials: HashMap<String, CredentialRecord>,
}

impl RawCliConfig {
    /// Parse a config file body.
    ///
    /// JSON is used for `.json` files. Anything else is parsed as HCL, falling
    /// back to JSON when the body is a JSON object.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] when the content is not valid for its format.
    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        let parse_error = |err: &dyn std::fmt::Display| {
            Error::ConfigError(format!("error parsing {}: {err}", path.display()))
        };

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        if is_json {
            return serde_json::from_str(content).map_err(|err| parse_error(&err));
        }

        match hcl::from_str(content) {
            Ok(config) => Ok(config),
            Err(err) if content.trim_start().starts_with('{') => {
                debug!(path = %path.display(), error = %err, "not HCL, trying JSON");
                serde_json::from_str(content).map_err(|err| parse_error(&err))
            }
            Err(err) => Err(parse_error(&err)),
        }
    }

    /// Read and parse a config file.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] if the file cannot be read or parsed.
    pub fn read(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|err| {
            Error::ConfigError(format!("error reading {}: {err}", path.display()))
        })?;
        Self::parse(path, &content)
    }

    /// Read a config file, collapsing any failure into an empty configuration.
    ///
    /// The ignored reason is logged; a missing file is expected and only logged at
    /// debug level.
    #[must_use]
    pub fn read_or_empty(path: Result<PathBuf>) -> Self {
        let path = match path {
            Ok(path) => path,
            Err(err) => {
                warn!(error = %err, "error detecting CLI config file path (ignoring)");
                return Self::default();
            }
        };

        if !path.exists() {
            debug!(path = %path.display(), "CLI config file not found (ignoring)");
            return Self::default();
        }

        Self::read(&path).unwrap_or_else(|err| {
            if err.should_log() {
                warn!(path = %path.display(), code = err.error_code(), error = %err, "error loading CLI config file (ignoring)");
            } else {
                debug!(path = %path.display(), error = %err, "error loading CLI config file (ignoring)");
            }
            Self::default()
        })
    }
}

/// Merged CLI configuration with normalized host keys.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CliConfig {
    hosts: HashMap<NormalizedHost, HostOverride>,
    credentials: HashMap<NormalizedHost, CredentialRecord>,
}

impl CliConfig {
    /// Locate, read and merge both configuration sources. Never fails.
    #[must_use]
    pub fn load(locator: &ConfigLocator) -> Self {
        let main = RawCliConfig::read_or_empty(locator.config_file());
        let credentials = RawCliConfig::read_or_empty(locator.credentials_file());
        Self::merge(main, credentials)
    }

    /// Merge the general config file with the credentials file.
    ///
    /// Host overrides come from the general file only. Credentials from the general
    /// file replace those from the credentials file for the same normalized host.
    #[must_use]
    pub fn merge(main: RawCliConfig, credentials_file: RawCliConfig) -> Self {
        let hosts = normalize_keys(main.hosts, "host");

        let mut credentials = normalize_keys(credentials_file.credentials, "credentials");
        credentials.extend(normalize_keys(main.credentials, "credentials"));

        Self { hosts, credentials }
    }

    /// Host service overrides.
    #[must_use]
    pub const fn hosts(&self) -> &HashMap<NormalizedHost, HostOverride> {
        &self.hosts
    }

    /// Credential records.
    #[must_use]
    pub const fn credentials(&self) -> &HashMap<NormalizedHost, CredentialRecord> {
        &self.credentials
    }

    /// Returns the override for a host, if any.
    #[must_use]
    pub fn host(&self, host: &NormalizedHost) -> Option<&HostOverride> {
        self.hosts.get(host)
    }
}

fn normalize_keys<T>(entries: HashMap<String, T>, block: &str) -> HashMap<NormalizedHost, T> {
    let mut normalized = HashMap::with_capacity(entries.len());
    for (user_host, value) in entries {
        match NormalizedHost::for_comparison(&user_host) {
            Ok(host) => {
                normalized.insert(host, value);
            }
            Err(err) => {
                warn!(block, host = %user_host, error = %err, "ignoring invalid hostname in CLI config");
            }
        }
    }
    normalized
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn host(s: &str) -> NormalizedHost {
        NormalizedHost::for_comparison(s).unwrap()
    }

    fn write_credentials(home: &Path, body: &str) {
        let dir = home.join(CONFIG_DIR_NAME);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(CREDENTIALS_FILE_NAME), body).unwrap();
    }

    #[test]
    fn test_env_vars_empty_is_unset() {
        let env = EnvVars::from_pairs([("A", ""), ("B", "x")]);
        assert_eq!(env.get("A"), None);
        assert_eq!(env.get("B"), Some("x"));
        assert_eq!(env.get("C"), None);
    }

    #[test]
    fn test_locator_precedence() {
        let env = EnvVars::from_pairs([
            (CLI_CONFIG_FILE_ENV, "/explicit.rc"),
            (LEGACY_CONFIG_FILE_ENV, "/legacy.rc"),
            (HOME_ENV, "/home/user"),
        ]);
        let locator = ConfigLocator::from_env(&env);
        assert_eq!(locator.config_file().unwrap(), PathBuf::from("/explicit.rc"));

        let env = EnvVars::from_pairs([
            (LEGACY_CONFIG_FILE_ENV, "/legacy.rc"),
            (HOME_ENV, "/home/user"),
        ]);
        let locator = ConfigLocator::from_env(&env);
        assert_eq!(locator.config_file().unwrap(), PathBuf::from("/legacy.rc"));

        let env = EnvVars::from_pairs([(HOME_ENV, "/home/user")]);
        let locator = ConfigLocator::from_env(&env);
        assert_eq!(
            locator.config_file().unwrap(),
            PathBuf::from("/home/user").join(CONFIG_FILE_NAME)
        );
    }

    #[test]
    fn test_credentials_file_ignores_overrides() {
        let locator = ConfigLocator::with_home("/home/user").with_cli_config_file("/explicit.rc");
        assert_eq!(
            locator.credentials_file().unwrap(),
            PathBuf::from("/home/user")
                .join(CONFIG_DIR_NAME)
                .join(CREDENTIALS_FILE_NAME)
        );
    }

    #[test]
    fn test_home_unresolvable() {
        let locator = ConfigLocator {
            use_platform_home: false,
            ..ConfigLocator::default()
        };
        assert!(matches!(locator.home_dir(), Err(Error::ConfigError(_))));
        assert!(locator.credentials_file().is_err());

        let config = CliConfig::load(&locator);
        assert!(config.hosts().is_empty());
        assert!(config.credentials().is_empty());
    }

    #[test]
    fn test_parse_hcl() {
        let content = r#"
            plugin_cache_dir = "/tmp/plugins"

            host "Example.com" {
              services = {
                "iacp.v3" = "https://example.com/api/iacp/v3/"
              }
            }

            credentials "example.com" {
              token = "from-hcl"
            }
        "#;
        let raw = RawCliConfig::parse(Path::new(".terraformrc"), content).unwrap();
        assert_eq!(
            raw.hosts["Example.com"].services["iacp.v3"],
            Value::String("https://example.com/api/iacp/v3/".to_string())
        );
        assert_eq!(raw.credentials["example.com"].token(), Some("from-hcl"));
    }

    #[test]
    fn test_parse_json() {
        let content = r#"{"credentials": {"example.com": {"token": "abc", "extra": 1}}}"#;
        let raw = RawCliConfig::parse(Path::new("credentials.tfrc.json"), content).unwrap();
        let record = &raw.credentials["example.com"];
        assert_eq!(record.token(), Some("abc"));
        assert_eq!(record.attributes().len(), 2);
        assert!(raw.hosts.is_empty());
    }

    #[test]
    fn test_parse_json_without_extension() {
        let content = r#"{
          "host": {"example.com": {"services": {"iacp.v3": "https://example.com/api/"}}},
          "credentials": {"example.com": {"token": "json-rc"}}
        }"#;
        let raw = RawCliConfig::parse(Path::new("/etc/scalr.rc"), content).unwrap();
        assert_eq!(raw.credentials["example.com"].token(), Some("json-rc"));
        assert_eq!(
            raw.hosts["example.com"].services["iacp.v3"],
            Value::String("https://example.com/api/".to_string())
        );

        let result = RawCliConfig::parse(Path::new("/etc/scalr.rc"), "{\"credentials\": ");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_load_json_from_explicit_path() {
        let home = TempDir::new().unwrap();
        let rc = home.path().join("cli.rc");
        fs::write(
            &rc,
            r#"{"credentials": {"example.com": {"token": "explicit-json"}}}"#,
        )
        .unwrap();

        let locator = ConfigLocator::with_home(home.path()).with_cli_config_file(rc.clone());
        let config = CliConfig::load(&locator);
        assert_eq!(
            config.credentials()[&host("example.com")].token(),
            Some("explicit-json")
        );
    }

    #[test]
    fn test_parse_errors() {
        let result = RawCliConfig::parse(Path::new("credentials.tfrc.json"), "{not json");
        assert!(matches!(result, Err(Error::ConfigError(_))));

        let result = RawCliConfig::parse(Path::new(".terraformrc"), "host \"x\" {");
        assert!(matches!(result, Err(Error::ConfigError(_))));
    }

    #[test]
    fn test_credential_record_token() {
        let record: CredentialRecord = serde_json::from_str(r#"{"token": ""}"#).unwrap();
        assert_eq!(record.token(), None);

        let record: CredentialRecord = serde_json::from_str(r#"{"token": 42}"#).unwrap();
        assert_eq!(record.token(), None);
    }

    #[test]
    fn test_load_missing_main_with_credentials_file() {
        let home = TempDir::new().unwrap();
        write_credentials(
            home.path(),
            r#"{"credentials": {"example.com": {"token": "abc"}}}"#,
        );

        let config = CliConfig::load(&ConfigLocator::with_home(home.path()));
        assert_eq!(
            config.credentials()[&host("example.com")].token(),
            Some("abc")
        );
        assert!(config.hosts().is_empty());
    }

    #[test]
    fn test_main_config_overrides_credentials_file() {
        let home = TempDir::new().unwrap();
        write_credentials(
            home.path(),
            r#"{"credentials": {
                "example.com": {"token": "from-credentials-file"},
                "other.com": {"token": "other"}
            }}"#,
        );
        fs::write(
            home.path().join(CONFIG_FILE_NAME),
            r#"
            credentials "EXAMPLE.com" {
              token = "from-main"
            }
            "#,
        )
        .unwrap();

        let config = CliConfig::load(&ConfigLocator::with_home(home.path()));
        assert_eq!(
            config.credentials()[&host("example.com")].token(),
            Some("from-main")
        );
        assert_eq!(config.credentials()[&host("other.com")].token(), Some("other"));
        assert_eq!(config.credentials().len(), 2);
    }

    #[test]
    fn test_hosts_only_from_main_config() {
        let home = TempDir::new().unwrap();
        write_credentials(
            home.path(),
            r#"{"host": {"creds.example.com": {"services": {"iacp.v3": "https://x/"}}}}"#,
        );
        let main = home.path().join("custom.rc");
        fs::write(
            &main,
            r#"
            host "main.example.com" {
              services = {
                "iacp.v3" = "/api/iacp/v3/"
              }
            }
            "#,
        )
        .unwrap();

        let locator = ConfigLocator::with_home(home.path()).with_cli_config_file(&main);
        let config = CliConfig::load(&locator);
        assert_eq!(config.hosts().len(), 1);
        assert!(config.host(&host("main.example.com")).is_some());
        assert!(config.host(&host("creds.example.com")).is_none());
    }

    #[test]
    fn test_malformed_files_degrade_to_empty() {
        let home = TempDir::new().unwrap();
        write_credentials(home.path(), "this is not json");
        fs::write(home.path().join(CONFIG_FILE_NAME), "credentials {{{").unwrap();

        let config = CliConfig::load(&ConfigLocator::with_home(home.path()));
        assert_eq!(config, CliConfig::default());
    }

    #[test]
    fn test_malformed_main_keeps_credentials_file() {
        let home = TempDir::new().unwrap();
        write_credentials(
            home.path(),
            r#"{"credentials": {"example.com": {"token": "abc"}}}"#,
        );
        fs::write(home.path().join(CONFIG_FILE_NAME), "credentials {{{").unwrap();

        let config = CliConfig::load(&ConfigLocator::with_home(home.path()));
        assert_eq!(
            config.credentials()[&host("example.com")].token(),
            Some("abc")
        );
    }

    #[test]
    fn test_invalid_hostnames_skipped() {
        let main = RawCliConfig {
            hosts: HashMap::from([
                ("bad host".to_string(), HostOverride::default()),
                ("good.example.com".to_string(), HostOverride::default()),
            ]),
            credentials: HashMap::new(),
        };
        let config = CliConfig::merge(main, RawCliConfig::default());
        assert_eq!(config.hosts().len(), 1);
        assert!(config.host(&host("good.example.com")).is_some());
    }
}

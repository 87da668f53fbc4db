use crate::error::LaunchError;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use url::Url;

/// Environment variable naming an explicit TOML config file.
pub const CONFIG_PATH_ENV: &str = "MODWEB_CONFIG";
/// Config file picked up from the working directory when present.
pub const DEFAULT_CONFIG_FILE: &str = "modweb.toml";
/// Prefix for environment overrides, e.g. `MODWEB_BASIC__PORT`.
pub const ENV_PREFIX: &str = "MODWEB_";

/// Minimum secret key length accepted for cookie key derivation.
pub const MIN_SECRET_KEY_LEN: usize = 32;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub basic: BasicConfig,
    pub companion: CompanionConfig,
    pub reload: ReloadConfig,
    pub migrations: MigrationConfig,
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InitMode {
    /// Only `--db-init` initializes durable state.
    #[default]
    Lazy,
    /// The application factory also initializes on every server start.
    Eager,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BasicConfig {
    pub host: String,
    pub port: u16,
    pub secret_key: Option<String>,
    pub database_url: String,
    pub loglevel: String,
    pub init_mode: InitMode,
    pub admin_email: String,
}

impl Default for BasicConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 7008,
            secret_key: None,
            database_url: "sqlite:modweb.sqlite".to_string(),
            loglevel: "info".to_string(),
            init_mode: InitMode::Lazy,
            admin_email: "admin@admin.admin".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Readiness {
    #[default]
    Delay,
    Probe,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompanionConfig {
    pub enabled: bool,
    pub program: String,
    pub args: Vec<String>,
    /// Defaults to the parent of the launcher's working directory.
    pub workdir: Option<PathBuf>,
    pub strip_env: Vec<String>,
    pub url: Url,
    pub readiness: Readiness,
    pub readiness_delay_ms: u64,
    pub stop_timeout_ms: u64,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            program: "poetry".to_string(),
            args: ["run", "misp-modules", "-l", "127.0.0.1"]
                .into_iter()
                .map(String::from)
                .collect(),
            workdir: None,
            strip_env: vec!["VIRTUAL_ENV".to_string()],
            url: Url::parse("http://127.0.0.1:6666").expect("static companion url"),
            readiness: Readiness::Delay,
            readiness_delay_ms: 5000,
            stop_timeout_ms: 5000,
        }
    }
}

impl CompanionConfig {
    pub fn readiness_delay(&self) -> Duration {
        Duration::from_millis(self.readiness_delay_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    /// Working directory for the companion: configured, or one level above `cwd`.
    pub fn resolve_workdir(&self, cwd: &Path) -> PathBuf {
        if let Some(dir) = &self.workdir {
            return dir.clone();
        }
        cwd.parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| cwd.to_path_buf())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReloadConfig {
    pub enabled: bool,
    pub watch_paths: Vec<PathBuf>,
    /// Quiet period after a change before the child restarts.
    pub debounce_ms: u64,
}

impl ReloadConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms.max(10))
    }
}

impl Default for ReloadConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            watch_paths: vec![PathBuf::from("src"), PathBuf::from(DEFAULT_CONFIG_FILE)],
            debounce_ms: 500,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    pub program: String,
    pub migrate_args: Vec<String>,
    pub upgrade_args: Vec<String>,
    pub downgrade_args: Vec<String>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        let args = |v: &[&str]| v.iter().map(|s| s.to_string()).collect::<Vec<_>>();
        Self {
            program: "sqlx".to_string(),
            migrate_args: args(&["migrate", "add", "-r", "schema_change"]),
            upgrade_args: args(&["migrate", "run"]),
            downgrade_args: args(&["migrate", "revert"]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CatalogSourceKind {
    /// Ask the running modules server for its `/modules` listing.
    #[default]
    Companion,
    /// Use `catalog.modules` from configuration.
    Declared,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    pub source: CatalogSourceKind,
    pub modules: Vec<DeclaredModule>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeclaredModule {
    pub name: String,
    #[serde(default)]
    pub module_type: String,
    #[serde(default)]
    pub description: String,
}

impl Config {
    /// Layered load: defaults, then the TOML file, then `MODWEB_*` env vars.
    pub fn load() -> Result<Self, LaunchError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));

        if let Some(path) = std::env::var_os(CONFIG_PATH_ENV) {
            let path = PathBuf::from(path);
            if !path.exists() {
                return Err(LaunchError::Configuration(format!(
                    "config file named by {CONFIG_PATH_ENV} does not exist: {}",
                    path.display()
                )));
            }
            figment = figment.merge(Toml::file(path));
        } else if Path::new(DEFAULT_CONFIG_FILE).exists() {
            figment = figment.merge(Toml::file(DEFAULT_CONFIG_FILE));
        }

        figment = figment.merge(Env::prefixed(ENV_PREFIX).split("__"));
        Ok(figment.extract()?)
    }

    /// The secret key, validated for use by the web layer.
    pub fn require_secret_key(&self) -> Result<&str, LaunchError> {
        match self.basic.secret_key.as_deref().map(str::trim) {
            None | Some("") => Err(LaunchError::Configuration(
                "basic.secret_key is not set (MODWEB_BASIC__SECRET_KEY)".to_string(),
            )),
            Some(key) if key.len() < MIN_SECRET_KEY_LEN => Err(LaunchError::Configuration(
                format!("basic.secret_key must be at least {MIN_SECRET_KEY_LEN} bytes"),
            )),
            Some(key) => Ok(key),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.basic.host, self.basic.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let cfg = Config::default();
        assert_eq!(cfg.bind_addr(), "127.0.0.1:7008");
        assert_eq!(cfg.basic.init_mode, InitMode::Lazy);
        assert_eq!(cfg.companion.strip_env, vec!["VIRTUAL_ENV".to_string()]);
        assert_eq!(cfg.companion.readiness_delay(), Duration::from_secs(5));
        assert_eq!(cfg.migrations.upgrade_args, vec!["migrate", "run"]);
    }

    #[test]
    fn secret_key_must_be_present_and_long_enough() {
        let mut cfg = Config::default();
        assert!(matches!(
            cfg.require_secret_key(),
            Err(LaunchError::Configuration(_))
        ));

        cfg.basic.secret_key = Some("short".into());
        assert!(cfg.require_secret_key().is_err());

        cfg.basic.secret_key = Some("k".repeat(MIN_SECRET_KEY_LEN));
        assert!(cfg.require_secret_key().is_ok());
    }

    #[test]
    fn workdir_defaults_to_parent_directory() {
        let cfg = CompanionConfig::default();
        assert_eq!(
            cfg.resolve_workdir(Path::new("/srv/modules/website")),
            PathBuf::from("/srv/modules")
        );

        let cfg = CompanionConfig {
            workdir: Some(PathBuf::from("/opt/companion")),
            ..CompanionConfig::default()
        };
        assert_eq!(
            cfg.resolve_workdir(Path::new("/srv/modules/website")),
            PathBuf::from("/opt/companion")
        );
    }

    #[test]
    fn toml_sections_override_defaults() {
        let toml = r#"
            [basic]
            port = 9000
            init_mode = "eager"

            [catalog]
            source = "declared"
            modules = [{ name = "dns", module_type = "expansion" }]
        "#;
        let cfg: Config = Figment::from(Serialized::defaults(Config::default()))
            .merge(Toml::string(toml))
            .extract()
            .expect("config should parse");
        assert_eq!(cfg.basic.port, 9000);
        assert_eq!(cfg.basic.host, "127.0.0.1");
        assert_eq!(cfg.basic.init_mode, InitMode::Eager);
        assert_eq!(cfg.catalog.source, CatalogSourceKind::Declared);
        assert_eq!(cfg.catalog.modules[0].name, "dns");
        assert_eq!(cfg.catalog.modules[0].description, "");
    }
}

use crate::config::{CatalogSourceKind, Config, DeclaredModule};
use crate::db::models::ModuleRecord;
use crate::error::LaunchError;
use serde::Deserialize;
use std::time::Duration;
use tracing::info;
use url::Url;

/// Where catalog rows come from during initialization.
pub trait CatalogSource: Send + Sync {
    fn fetch(&self) -> impl Future<Output = Result<Vec<ModuleRecord>, LaunchError>> + Send;
}

/// Modules listed under `[catalog] modules` in configuration.
pub struct DeclaredCatalog {
    modules: Vec<DeclaredModule>,
}

impl DeclaredCatalog {
    pub fn new(modules: Vec<DeclaredModule>) -> Self {
        Self { modules }
    }
}

impl CatalogSource for DeclaredCatalog {
    async fn fetch(&self) -> Result<Vec<ModuleRecord>, LaunchError> {
        Ok(self.modules.iter().cloned().map(Into::into).collect())
    }
}

/// Modules advertised by the running modules server at `GET /modules`.
pub struct CompanionCatalog {
    client: reqwest::Client,
    base: Url,
}

impl CompanionCatalog {
    pub fn new(base: Url) -> Result<Self, LaunchError> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("modweb/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .build()?;
        Ok(Self { client, base })
    }
}

#[derive(Debug, Deserialize)]
struct CompanionModule {
    name: String,
    #[serde(default)]
    meta: CompanionMeta,
}

#[derive(Debug, Default, Deserialize)]
struct CompanionMeta {
    #[serde(default)]
    description: String,
    #[serde(default, rename = "module-type")]
    module_type: Vec<String>,
}

impl From<CompanionModule> for ModuleRecord {
    fn from(m: CompanionModule) -> Self {
        Self {
            name: m.name,
            module_type: m.meta.module_type.join(","),
            description: m.meta.description,
        }
    }
}

impl CatalogSource for CompanionCatalog {
    async fn fetch(&self) -> Result<Vec<ModuleRecord>, LaunchError> {
        let url = self
            .base
            .join("modules")
            .map_err(|e| LaunchError::Configuration(format!("companion.url: {e}")))?;
        let listed: Vec<CompanionModule> = self
            .client
            .get(url.clone())
            .header("Accept", "application/json")
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        info!(url = %url, count = listed.len(), "fetched module catalog from modules server");
        Ok(listed.into_iter().map(Into::into).collect())
    }
}

/// Catalog source selected by `catalog.source`.
pub enum ConfiguredCatalog {
    Declared(DeclaredCatalog),
    Companion(CompanionCatalog),
}

impl ConfiguredCatalog {
    pub fn from_config(cfg: &Config) -> Result<Self, LaunchError> {
        Ok(match cfg.catalog.source {
            CatalogSourceKind::Declared => {
                Self::Declared(DeclaredCatalog::new(cfg.catalog.modules.clone()))
            }
            CatalogSourceKind::Companion => {
                Self::Companion(CompanionCatalog::new(cfg.companion.url.clone())?)
            }
        })
    }
}

impl CatalogSource for ConfiguredCatalog {
    async fn fetch(&self) -> Result<Vec<ModuleRecord>, LaunchError> {
        match self {
            Self::Declared(c) => c.fetch().await,
            Self::Companion(c) => c.fetch().await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn companion_payload_maps_to_records() {
        let body = r#"[
            {"name": "dns", "type": "expansion",
             "meta": {"description": "Resolve hostnames", "module-type": ["expansion", "hover"]}},
            {"name": "bare"}
        ]"#;
        let parsed: Vec<CompanionModule> = serde_json::from_str(body).unwrap();
        let records: Vec<ModuleRecord> = parsed.into_iter().map(Into::into).collect();
        assert_eq!(records[0].name, "dns");
        assert_eq!(records[0].module_type, "expansion,hover");
        assert_eq!(records[0].description, "Resolve hostnames");
        assert_eq!(records[1].module_type, "");
    }

    #[tokio::test]
    async fn declared_catalog_returns_configured_modules() {
        let catalog = DeclaredCatalog::new(vec![DeclaredModule {
            name: "cve".into(),
            module_type: "expansion".into(),
            description: String::new(),
        }]);
        let records = catalog.fetch().await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "cve");
    }
}

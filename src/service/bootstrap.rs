use crate::config::Config;
use crate::db::Storage;
use crate::error::LaunchError;
use crate::service::catalog::{CatalogSource, ConfiguredCatalog};
use crate::service::credentials::{generate_password, hash_password, is_valid_hash};
use tracing::{info, warn};

/// What `initialize` did to the admin credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdminOutcome {
    /// A valid credential was already stored; nothing changed.
    Kept,
    /// A new credential was written. The plaintext is not recoverable afterwards.
    Generated { email: String, password: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub tables: Vec<String>,
    pub modules_upserted: usize,
    pub admin: AdminOutcome,
}

impl InitReport {
    /// Plaintext admin password when one was generated by this run.
    pub fn admin_password(&self) -> Option<&str> {
        match &self.admin {
            AdminOutcome::Generated { password, .. } => Some(password),
            AdminOutcome::Kept => None,
        }
    }

    /// Print the outcome for the operator. A generated password goes to stdout
    /// only, never to the log.
    pub fn announce(&self) {
        if let AdminOutcome::Generated { email, password } = &self.admin {
            println!("##########################################################");
            println!("## Admin account: {email}");
            println!("## Admin password: {password}");
            println!("## This password is shown once; store it now.");
            println!("##########################################################");
        }
        println!(
            "Database initialized ({} tables, {} modules).",
            self.tables.len(),
            self.modules_upserted
        );
    }
}

/// Idempotent creation of schema, catalog rows and the admin credential.
pub struct AppBootstrapper<C> {
    storage: Storage,
    catalog: C,
    admin_email: String,
}

impl AppBootstrapper<ConfiguredCatalog> {
    /// Bootstrapper wired from configuration. Fails before touching storage if
    /// required settings are missing.
    pub fn from_config(cfg: &Config, storage: Storage) -> Result<Self, LaunchError> {
        cfg.require_secret_key()?;
        let catalog = ConfiguredCatalog::from_config(cfg)?;
        Ok(Self::new(storage, catalog, cfg.basic.admin_email.clone()))
    }
}

impl<C: CatalogSource> AppBootstrapper<C> {
    pub fn new(storage: Storage, catalog: C, admin_email: String) -> Self {
        Self {
            storage,
            catalog,
            admin_email,
        }
    }

    pub async fn initialize(&self) -> Result<InitReport, LaunchError> {
        self.storage.init_schema().await?;
        let tables = self.storage.table_names().await?;

        let records = self.catalog.fetch().await?;
        let modules_upserted = self.storage.upsert_modules(records).await?.len();
        info!(count = modules_upserted, "module catalog upserted");

        let admin = self.ensure_admin().await?;
        Ok(InitReport {
            tables,
            modules_upserted,
            admin,
        })
    }

    async fn ensure_admin(&self) -> Result<AdminOutcome, LaunchError> {
        match self.storage.find_admin(&self.admin_email).await? {
            Some(existing) if is_valid_hash(&existing.password_hash) => {
                info!(email = %existing.email, "admin credential present; leaving untouched");
                return Ok(AdminOutcome::Kept);
            }
            Some(existing) => {
                warn!(email = %existing.email, "stored admin credential is malformed; regenerating");
            }
            None => {}
        }

        let password = generate_password();
        self.storage
            .upsert_admin(&self.admin_email, &hash_password(&password))
            .await?;
        info!(email = %self.admin_email, "admin credential generated");
        Ok(AdminOutcome::Generated {
            email: self.admin_email.clone(),
            password,
        })
    }
}

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::DeclaredModule;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogModule {
    pub id: i64,
    pub name: String,
    pub module_type: String,
    pub description: String,
    pub is_active: bool,
    pub updated_at: DateTime<Utc>,
}

/// Catalog entry as produced by a catalog source, before it has a row id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleRecord {
    pub name: String,
    pub module_type: String,
    pub description: String,
}

impl From<DeclaredModule> for ModuleRecord {
    fn from(d: DeclaredModule) -> Self {
        Self {
            name: d.name,
            module_type: d.module_type,
            description: d.description,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AdminUser {
    pub id: i64,
    pub email: String,
    pub password_hash: String,
    pub created_at: DateTime<Utc>,
}

use crate::db::models::{AdminUser, CatalogModule, ModuleRecord};
use crate::db::schema::SQLITE_INIT;
use crate::error::LaunchError;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{Pool, Row, Sqlite};
use std::str::FromStr;

type SqlitePool = Pool<Sqlite>;

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating the file if needed) the database named by `database_url`.
    pub async fn connect(database_url: &str) -> Result<Self, LaunchError> {
        let connect_opts = SqliteConnectOptions::from_str(database_url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(connect_opts).await?;
        Ok(Self::new(pool))
    }

    /// Initialize the schema by executing the bundled DDL.
    pub async fn init_schema(&self) -> Result<(), LaunchError> {
        // sqlx::query runs one statement at a time
        for stmt in SQLITE_INIT.split(';') {
            let s = stmt.trim();
            if s.is_empty() {
                continue;
            }
            sqlx::query(s).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Names of the user tables currently present, sorted.
    pub async fn table_names(&self) -> Result<Vec<String>, LaunchError> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Batch upsert keyed by module name in one transaction. Returns ids in input order.
    /// `is_active` is only set on insert so operator toggles survive re-initialization.
    pub async fn upsert_modules(&self, items: Vec<ModuleRecord>) -> Result<Vec<i64>, LaunchError> {
        let mut tx = self.pool.begin().await?;
        let mut ids = Vec::with_capacity(items.len());
        let now = Utc::now().to_rfc3339();

        for item in items.into_iter() {
            sqlx::query(
                r#"
                INSERT INTO modules (name, module_type, description, is_active, updated_at)
                VALUES (?, ?, ?, 1, ?)
                ON CONFLICT(name) DO UPDATE SET
                    module_type=excluded.module_type,
                    description=excluded.description,
                    updated_at=excluded.updated_at
                "#,
            )
            .bind(item.name.clone())
            .bind(item.module_type)
            .bind(item.description)
            .bind(now.clone())
            .execute(&mut *tx)
            .await?;

            let rec: (i64,) = sqlx::query_as("SELECT id FROM modules WHERE name = ?")
                .bind(item.name)
                .fetch_one(&mut *tx)
                .await?;
            ids.push(rec.0);
        }

        tx.commit().await?;
        Ok(ids)
    }

    pub async fn list_modules(&self) -> Result<Vec<CatalogModule>, LaunchError> {
        let rows = sqlx::query(
            r#"SELECT id, name, module_type, description, is_active, updated_at
               FROM modules ORDER BY name"#,
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Self::row_to_module).collect()
    }

    pub async fn set_module_active(&self, name: &str, active: bool) -> Result<(), LaunchError> {
        let active_i = if active { 1 } else { 0 };
        sqlx::query("UPDATE modules SET is_active = ? WHERE name = ?")
            .bind(active_i)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn find_admin(&self, email: &str) -> Result<Option<AdminUser>, LaunchError> {
        let row = sqlx::query(
            r#"SELECT id, email, password_hash, created_at
               FROM users WHERE email = ? AND is_admin = 1"#,
        )
        .bind(email)
        .fetch_optional(&self.pool)
        .await?;
        row.map(Self::row_to_admin).transpose()
    }

    pub async fn count_admins(&self) -> Result<i64, LaunchError> {
        let rec: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM users WHERE is_admin = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    /// Insert the admin row, or overwrite its hash if the email already exists.
    pub async fn upsert_admin(&self, email: &str, password_hash: &str) -> Result<i64, LaunchError> {
        sqlx::query(
            r#"
            INSERT INTO users (email, password_hash, is_admin, created_at)
            VALUES (?, ?, 1, ?)
            ON CONFLICT(email) DO UPDATE SET
                password_hash=excluded.password_hash,
                is_admin=1
            "#,
        )
        .bind(email)
        .bind(password_hash)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        let rec: (i64,) = sqlx::query_as("SELECT id FROM users WHERE email = ?")
            .bind(email)
            .fetch_one(&self.pool)
            .await?;
        Ok(rec.0)
    }

    fn row_to_module(row: SqliteRow) -> Result<CatalogModule, LaunchError> {
        let is_active: i64 = row.try_get("is_active")?;
        let updated_at: String = row.try_get("updated_at")?;
        Ok(CatalogModule {
            id: row.try_get("id")?,
            name: row.try_get("name")?,
            module_type: row.try_get("module_type")?,
            description: row.try_get("description")?,
            is_active: is_active != 0,
            updated_at: parse_timestamp(&updated_at)?,
        })
    }

    fn row_to_admin(row: SqliteRow) -> Result<AdminUser, LaunchError> {
        let created_at: String = row.try_get("created_at")?;
        Ok(AdminUser {
            id: row.try_get("id")?,
            email: row.try_get("email")?,
            password_hash: row.try_get("password_hash")?,
            created_at: parse_timestamp(&created_at)?,
        })
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, LaunchError> {
    Ok(DateTime::parse_from_rfc3339(s)
        .map_err(|e| sqlx::Error::Decode(Box::new(e)))?
        .with_timezone(&Utc))
}

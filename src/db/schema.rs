//! SQL DDL for the website's durable state.

/// SQLite schema:
/// - `modules`: one catalog row per modules-server module, `name` UNIQUE
/// - `users`: accounts; `email` UNIQUE, admin flagged by `is_admin`
///
/// Every statement is `IF NOT EXISTS` so running it twice is a no-op.
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS modules (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    name TEXT NOT NULL UNIQUE,
    module_type TEXT NOT NULL DEFAULT '',
    description TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    updated_at TEXT NOT NULL -- RFC3339
);

CREATE TABLE IF NOT EXISTS users (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    email TEXT NOT NULL UNIQUE,
    password_hash TEXT NOT NULL,
    is_admin INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL -- RFC3339
);

CREATE INDEX IF NOT EXISTS idx_users_is_admin ON users(is_admin);
"#;

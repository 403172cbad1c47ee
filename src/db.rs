use std::str::FromStr;

use anyhow::Context;
use sqlx::migrate::MigrateDatabase;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use time::OffsetDateTime;
use tracing::warn;

/// Open the pool, creating the database file when it does not exist yet.
pub async fn connect(database_url: &str) -> anyhow::Result<SqlitePool> {
    if !sqlx::Sqlite::database_exists(database_url)
        .await
        .unwrap_or(false)
    {
        sqlx::Sqlite::create_database(database_url)
            .await
            .context("create database")?;
    }

    // Foreign keys are per-connection in sqlite; a connect option reaches
    // every connection the pool opens, a one-off PRAGMA only one of them.
    let options = SqliteConnectOptions::from_str(database_url)
        .context("parse database url")?
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(10)
        .connect_with(options)
        .await
        .context("connect to database")?;
    Ok(pool)
}

/// Create the schema. Safe to run on every startup.
pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Best-effort pragmas; in-memory databases reject some of these.
    for pragma in [
        "PRAGMA journal_mode = WAL;",
        "PRAGMA synchronous = NORMAL;",
        "PRAGMA busy_timeout = 5000;",
    ] {
        if let Err(e) = sqlx::query(pragma).execute(pool).await {
            warn!(error = %e, pragma, "pragma failed; continuing");
        }
    }

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            username TEXT NOT NULL UNIQUE,
            email TEXT,
            password_hash TEXT NOT NULL,
            created_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS sessions (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            created_at INTEGER NOT NULL,
            expires_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS languages (
            id TEXT PRIMARY KEY,
            name TEXT NOT NULL,
            slug TEXT NOT NULL UNIQUE,
            lexer TEXT NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS snippets (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL REFERENCES users(id) ON DELETE CASCADE,
            language_id TEXT NOT NULL REFERENCES languages(id) ON DELETE CASCADE,
            name TEXT NOT NULL,
            description TEXT NOT NULL DEFAULT '',
            body TEXT NOT NULL,
            public INTEGER NOT NULL DEFAULT 0,
            created_at INTEGER NOT NULL,
            updated_at INTEGER NOT NULL
        );
        "#,
    )
    .execute(pool)
    .await?;

    for index in [
        "CREATE INDEX IF NOT EXISTS idx_snippets_created_at ON snippets(created_at DESC);",
        "CREATE INDEX IF NOT EXISTS idx_snippets_user ON snippets(user_id);",
        "CREATE INDEX IF NOT EXISTS idx_snippets_language_public ON snippets(language_id, public);",
        "CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);",
    ] {
        sqlx::query(index).execute(pool).await?;
    }

    Ok(())
}

// Timestamps are stored as integer microseconds since the epoch so that
// ORDER BY sorts chronologically. RFC 3339 text does not, once fractional
// seconds vary in width.

pub fn to_micros(t: OffsetDateTime) -> i64 {
    (t.unix_timestamp_nanos() / 1_000) as i64
}

pub fn from_micros(us: i64) -> anyhow::Result<OffsetDateTime> {
    OffsetDateTime::from_unix_timestamp_nanos(i128::from(us) * 1_000)
        .map_err(|e| anyhow::anyhow!("invalid stored timestamp {us}: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool")
    }

    #[tokio::test]
    async fn init_db_creates_all_tables() {
        let pool = memory_pool().await;
        init_db(&pool).await.expect("schema init");

        let tables: Vec<(String,)> =
            sqlx::query_as("SELECT name FROM sqlite_master WHERE type = 'table' ORDER BY name")
                .fetch_all(&pool)
                .await
                .expect("list tables");
        let names: Vec<&str> = tables.iter().map(|(n,)| n.as_str()).collect();

        for expected in ["languages", "sessions", "snippets", "users"] {
            assert!(names.contains(&expected), "missing table {expected}");
        }
    }

    #[tokio::test]
    async fn init_db_is_idempotent() {
        let pool = memory_pool().await;
        init_db(&pool).await.expect("first init");
        init_db(&pool).await.expect("second init");
    }

    #[tokio::test]
    async fn connect_creates_a_missing_database_file() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("snipbin.db");
        let url = format!("sqlite://{}", path.display());

        let pool = connect(&url).await.expect("connect");
        init_db(&pool).await.expect("schema");
        assert!(path.exists());
        pool.close().await;
    }

    #[tokio::test]
    async fn connect_enforces_foreign_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let url = format!("sqlite://{}", dir.path().join("fk.db").display());

        let pool = connect(&url).await.expect("connect");
        init_db(&pool).await.expect("schema");

        let orphan = sqlx::query(
            "INSERT INTO sessions (id, user_id, created_at, expires_at) VALUES ('s1', 'missing', 0, 0)",
        )
        .execute(&pool)
        .await;
        assert!(orphan.is_err(), "orphan session row must be rejected");
        pool.close().await;
    }

    #[test]
    fn micros_roundtrip_preserves_instant() {
        let now = OffsetDateTime::now_utc();
        let restored = from_micros(to_micros(now)).expect("restore");
        // Sub-microsecond precision is dropped by the storage format.
        assert_eq!(to_micros(now), to_micros(restored));
    }

    #[test]
    fn micros_order_matches_time_order() {
        let earlier = OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap();
        let later = earlier + time::Duration::microseconds(1);
        assert!(to_micros(later) > to_micros(earlier));
    }
}

use sqlx::{FromRow, SqlitePool};
use time::{Duration as TimeDuration, OffsetDateTime};
use uuid::Uuid;

use crate::db::{from_micros, to_micros};

#[derive(Debug, Clone, FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: Option<String>,
    password_hash: String,
    created_at: i64,
}

#[derive(Debug, Clone)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub email: Option<String>,
    pub password_hash: String,
    pub created_at: OffsetDateTime,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(row: UserRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            username: row.username,
            email: row.email,
            password_hash: row.password_hash,
            created_at: from_micros(row.created_at)?,
        })
    }
}

impl User {
    pub async fn find_by_username(db: &SqlitePool, username: &str) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE username = ?
            "#,
        )
        .bind(username)
        .fetch_optional(db)
        .await?;
        row.map(User::try_from).transpose()
    }

    pub async fn find_by_id(db: &SqlitePool, id: Uuid) -> anyhow::Result<Option<User>> {
        let row = sqlx::query_as::<_, UserRow>(
            r#"
            SELECT id, username, email, password_hash, created_at
            FROM users
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;
        row.map(User::try_from).transpose()
    }

    /// Create a new user with an already-hashed password.
    pub async fn create(
        db: &SqlitePool,
        username: &str,
        email: Option<&str>,
        password_hash: &str,
    ) -> anyhow::Result<User> {
        let id = Uuid::new_v4();
        let created_at = OffsetDateTime::now_utc();
        sqlx::query(
            r#"
            INSERT INTO users (id, username, email, password_hash, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(username)
        .bind(email)
        .bind(password_hash)
        .bind(to_micros(created_at))
        .execute(db)
        .await?;

        Ok(User {
            id,
            username: username.to_string(),
            email: email.map(str::to_string),
            password_hash: password_hash.to_string(),
            created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow)]
struct SessionRow {
    id: String,
    user_id: String,
    expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub user_id: Uuid,
    pub expires_at: OffsetDateTime,
}

impl TryFrom<SessionRow> for Session {
    type Error = anyhow::Error;

    fn try_from(row: SessionRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            user_id: Uuid::parse_str(&row.user_id)?,
            expires_at: from_micros(row.expires_at)?,
        })
    }
}

impl Session {
    pub async fn create(
        db: &SqlitePool,
        user_id: Uuid,
        ttl: std::time::Duration,
    ) -> anyhow::Result<Session> {
        let id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let expires_at = now + TimeDuration::seconds(ttl.as_secs() as i64);
        sqlx::query(
            r#"
            INSERT INTO sessions (id, user_id, created_at, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(id.to_string())
        .bind(user_id.to_string())
        .bind(to_micros(now))
        .bind(to_micros(expires_at))
        .execute(db)
        .await?;

        Ok(Session {
            id,
            user_id,
            expires_at,
        })
    }

    pub async fn find(db: &SqlitePool, id: Uuid) -> anyhow::Result<Option<Session>> {
        let row = sqlx::query_as::<_, SessionRow>(
            r#"
            SELECT id, user_id, expires_at
            FROM sessions
            WHERE id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;
        row.map(Session::try_from).transpose()
    }

    /// Returns whether a session row was actually removed.
    pub async fn delete(db: &SqlitePool, id: Uuid) -> anyhow::Result<bool> {
        let result = sqlx::query("DELETE FROM sessions WHERE id = ?")
            .bind(id.to_string())
            .execute(db)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .expect("in-memory pool");
        init_db(&pool).await.expect("schema");
        pool
    }

    #[tokio::test]
    async fn create_and_find_user() {
        let pool = test_pool().await;
        let created = User::create(&pool, "ada", Some("ada@example.com"), "hash")
            .await
            .expect("create user");

        let by_name = User::find_by_username(&pool, "ada")
            .await
            .expect("query")
            .expect("user exists");
        assert_eq!(by_name.id, created.id);
        assert_eq!(by_name.email.as_deref(), Some("ada@example.com"));

        let by_id = User::find_by_id(&pool, created.id)
            .await
            .expect("query")
            .expect("user exists");
        assert_eq!(by_id.username, "ada");

        assert!(User::find_by_username(&pool, "nobody")
            .await
            .expect("query")
            .is_none());
    }

    #[tokio::test]
    async fn duplicate_username_is_rejected_by_the_schema() {
        let pool = test_pool().await;
        User::create(&pool, "ada", None, "hash").await.expect("first");
        let err = User::create(&pool, "ada", None, "hash").await;
        assert!(err.is_err());
    }

    #[tokio::test]
    async fn session_lifecycle() {
        let pool = test_pool().await;
        let user = User::create(&pool, "ada", None, "hash").await.expect("user");

        let session = Session::create(&pool, user.id, std::time::Duration::from_secs(60))
            .await
            .expect("create session");
        assert!(session.expires_at > OffsetDateTime::now_utc());

        let found = Session::find(&pool, session.id)
            .await
            .expect("query")
            .expect("session exists");
        assert_eq!(found.user_id, user.id);

        assert!(Session::delete(&pool, session.id).await.expect("delete"));
        assert!(!Session::delete(&pool, session.id).await.expect("second delete"));
        assert!(Session::find(&pool, session.id)
            .await
            .expect("query")
            .is_none());
    }
}

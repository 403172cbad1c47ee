use sqlx::{FromRow, SqlitePool};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::db::{from_micros, to_micros};
use crate::languages::repo::Language;

/// Flat row shape of the snippet queries; every read joins the owner and
/// the language so callers never chase foreign keys.
#[derive(Debug, FromRow)]
struct SnippetRow {
    id: String,
    user_id: String,
    username: String,
    language_id: String,
    language_name: String,
    language_slug: String,
    language_lexer: String,
    name: String,
    description: String,
    body: String,
    public: bool,
    created_at: i64,
    updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnippetOwner {
    pub id: Uuid,
    pub username: String,
}

#[derive(Debug, Clone)]
pub struct Snippet {
    pub id: Uuid,
    pub owner: SnippetOwner,
    pub language: Language,
    pub name: String,
    pub description: String,
    pub body: String,
    pub public: bool,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

impl TryFrom<SnippetRow> for Snippet {
    type Error = anyhow::Error;

    fn try_from(row: SnippetRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            owner: SnippetOwner {
                id: Uuid::parse_str(&row.user_id)?,
                username: row.username,
            },
            language: Language {
                id: Uuid::parse_str(&row.language_id)?,
                name: row.language_name,
                slug: row.language_slug,
                lexer: row.language_lexer,
            },
            name: row.name,
            description: row.description,
            body: row.body,
            public: row.public,
            created_at: from_micros(row.created_at)?,
            updated_at: from_micros(row.updated_at)?,
        })
    }
}

/// Fields of a snippet insert.
#[derive(Debug)]
pub struct NewSnippet {
    pub owner_id: Uuid,
    pub language_id: Uuid,
    pub name: String,
    pub description: String,
    pub body: String,
    pub public: bool,
}

/// Fields an edit may change. Timestamps are handled here, not by callers.
#[derive(Debug)]
pub struct SnippetChanges {
    pub language_id: Uuid,
    pub name: String,
    pub description: String,
    pub body: String,
    pub public: bool,
}

const SNIPPET_SELECT: &str = r#"
SELECT s.id, s.user_id, u.username, s.language_id,
       l.name AS language_name, l.slug AS language_slug, l.lexer AS language_lexer,
       s.name, s.description, s.body, s.public, s.created_at, s.updated_at
FROM snippets s
JOIN users u ON u.id = s.user_id
JOIN languages l ON l.id = s.language_id
"#;

fn into_snippets(rows: Vec<SnippetRow>) -> anyhow::Result<Vec<Snippet>> {
    rows.into_iter().map(Snippet::try_from).collect()
}

pub async fn create(db: &SqlitePool, new: &NewSnippet) -> anyhow::Result<Uuid> {
    let id = Uuid::new_v4();
    // One instant for both columns; an untouched snippet has created == updated.
    let now = to_micros(OffsetDateTime::now_utc());
    sqlx::query(
        r#"
        INSERT INTO snippets (id, user_id, language_id, name, description, body, public, created_at, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(id.to_string())
    .bind(new.owner_id.to_string())
    .bind(new.language_id.to_string())
    .bind(&new.name)
    .bind(&new.description)
    .bind(&new.body)
    .bind(new.public)
    .bind(now)
    .bind(now)
    .execute(db)
    .await?;
    Ok(id)
}

pub async fn get(db: &SqlitePool, id: Uuid) -> anyhow::Result<Option<Snippet>> {
    let sql = format!("{SNIPPET_SELECT} WHERE s.id = ?");
    let row = sqlx::query_as::<_, SnippetRow>(&sql)
        .bind(id.to_string())
        .fetch_optional(db)
        .await?;
    row.map(Snippet::try_from).transpose()
}

/// Apply an edit and advance `updated_at`; `created_at` never moves.
pub async fn update(db: &SqlitePool, id: Uuid, changes: &SnippetChanges) -> anyhow::Result<()> {
    let now = to_micros(OffsetDateTime::now_utc());
    sqlx::query(
        r#"
        UPDATE snippets
        SET name = ?, description = ?, body = ?, language_id = ?, public = ?, updated_at = ?
        WHERE id = ?
        "#,
    )
    .bind(&changes.name)
    .bind(&changes.description)
    .bind(&changes.body)
    .bind(changes.language_id.to_string())
    .bind(changes.public)
    .bind(now)
    .bind(id.to_string())
    .execute(db)
    .await?;
    Ok(())
}

/// Returns whether a row was actually removed.
pub async fn delete(db: &SqlitePool, id: Uuid) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM snippets WHERE id = ?")
        .bind(id.to_string())
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

/// The home feed: public snippets, plus the viewer's own when signed in.
/// A single predicate over one table keeps the union duplicate-free.
pub async fn list_feed(db: &SqlitePool, viewer: Option<Uuid>) -> anyhow::Result<Vec<Snippet>> {
    let rows = match viewer {
        Some(viewer_id) => {
            let sql = format!(
                "{SNIPPET_SELECT} WHERE s.public = 1 OR s.user_id = ? ORDER BY s.created_at DESC"
            );
            sqlx::query_as::<_, SnippetRow>(&sql)
                .bind(viewer_id.to_string())
                .fetch_all(db)
                .await?
        }
        None => {
            let sql = format!("{SNIPPET_SELECT} WHERE s.public = 1 ORDER BY s.created_at DESC");
            sqlx::query_as::<_, SnippetRow>(&sql).fetch_all(db).await?
        }
    };
    into_snippets(rows)
}

pub async fn list_by_owner(
    db: &SqlitePool,
    owner_id: Uuid,
    include_private: bool,
) -> anyhow::Result<Vec<Snippet>> {
    let sql = if include_private {
        format!("{SNIPPET_SELECT} WHERE s.user_id = ? ORDER BY s.created_at DESC")
    } else {
        format!("{SNIPPET_SELECT} WHERE s.user_id = ? AND s.public = 1 ORDER BY s.created_at DESC")
    };
    let rows = sqlx::query_as::<_, SnippetRow>(&sql)
        .bind(owner_id.to_string())
        .fetch_all(db)
        .await?;
    into_snippets(rows)
}

/// Per-language listing is public-only for everyone, owners included.
pub async fn list_public_by_language(
    db: &SqlitePool,
    language_id: Uuid,
) -> anyhow::Result<Vec<Snippet>> {
    let sql =
        format!("{SNIPPET_SELECT} WHERE s.language_id = ? AND s.public = 1 ORDER BY s.created_at DESC");
    let rows = sqlx::query_as::<_, SnippetRow>(&sql)
        .bind(language_id.to_string())
        .fetch_all(db)
        .await?;
    into_snippets(rows)
}

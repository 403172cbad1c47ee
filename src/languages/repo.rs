use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::highlight::CatalogEntry;

#[derive(Debug, Clone, FromRow)]
struct LanguageRow {
    id: String,
    name: String,
    slug: String,
    lexer: String,
}

/// A registry language. The registry is seeded at startup and read-only
/// afterwards; snippets reference it by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Language {
    pub id: Uuid,
    pub name: String,
    pub slug: String,
    pub lexer: String,
}

impl TryFrom<LanguageRow> for Language {
    type Error = anyhow::Error;

    fn try_from(row: LanguageRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)?,
            name: row.name,
            slug: row.slug,
            lexer: row.lexer,
        })
    }
}

/// Insert catalog entries that are not present yet, keyed on the unique
/// slug. Returns the number of rows added; re-running is a no-op.
pub async fn seed(db: &SqlitePool, catalog: &[CatalogEntry]) -> anyhow::Result<u64> {
    let mut inserted = 0;
    for entry in catalog {
        let result = sqlx::query(
            r#"
            INSERT OR IGNORE INTO languages (id, name, slug, lexer)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&entry.name)
        .bind(&entry.slug)
        .bind(&entry.lexer)
        .execute(db)
        .await?;
        inserted += result.rows_affected();
    }
    Ok(inserted)
}

pub async fn all(db: &SqlitePool) -> anyhow::Result<Vec<Language>> {
    let rows = sqlx::query_as::<_, LanguageRow>(
        r#"
        SELECT id, name, slug, lexer
        FROM languages
        ORDER BY name
        "#,
    )
    .fetch_all(db)
    .await?;
    rows.into_iter().map(Language::try_from).collect()
}

pub async fn find_by_slug(db: &SqlitePool, slug: &str) -> anyhow::Result<Option<Language>> {
    let row = sqlx::query_as::<_, LanguageRow>(
        r#"
        SELECT id, name, slug, lexer
        FROM languages
        WHERE slug = ?
        "#,
    )
    .bind(slug)
    .fetch_optional(db)
    .await?;
    row.map(Language::try_from).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_db;
    use sqlx::sqlite::SqlitePoolOptions;

    fn catalog() -> Vec<CatalogEntry> {
        vec![
            CatalogEntry {
                name: "Rust".into(),
                slug: "rust".into(),
                lexer: "Rust".into(),
            },
            CatalogEntry {
                name: "Python".into(),
                slug: "python".into(),
                lexer: "Python".into(),
            },
        ]
    }

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
    async fn seed_is_idempotent() {
        let pool = test_pool().await;
        assert_eq!(seed(&pool, &catalog()).await.expect("first seed"), 2);
        assert_eq!(seed(&pool, &catalog()).await.expect("second seed"), 0);

        let languages = all(&pool).await.expect("list");
        assert_eq!(languages.len(), 2);
        // Sorted by name.
        assert_eq!(languages[0].name, "Python");
        assert_eq!(languages[1].name, "Rust");
    }

    #[tokio::test]
    async fn find_by_slug_hits_and_misses() {
        let pool = test_pool().await;
        seed(&pool, &catalog()).await.expect("seed");

        let rust = find_by_slug(&pool, "rust")
            .await
            .expect("query")
            .expect("rust seeded");
        assert_eq!(rust.name, "Rust");
        assert_eq!(rust.lexer, "Rust");

        assert!(find_by_slug(&pool, "cobol-2077")
            .await
            .expect("query")
            .is_none());
    }
}

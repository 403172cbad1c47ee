use crate::config::AppConfig;
use crate::highlight::Highlighter;
use crate::notify::{self, LogMailer, NotificationQueue};
use crate::{db, languages};
use sqlx::SqlitePool;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub db: SqlitePool,
    pub config: Arc<AppConfig>,
    pub highlighter: Arc<Highlighter>,
    pub notifications: NotificationQueue,
}

impl AppState {
    pub async fn init() -> anyhow::Result<Self> {
        let config = Arc::new(AppConfig::from_env()?);

        let db = db::connect(&config.database_url).await?;
        db::init_db(&db).await?;

        let highlighter = Arc::new(Highlighter::new());
        let seeded = languages::repo::seed(&db, &highlighter.catalog()).await?;
        if seeded > 0 {
            info!(count = seeded, "seeded language registry");
        }

        let (notifications, jobs) = NotificationQueue::channel();
        notify::spawn_worker(jobs, Arc::new(LogMailer), config.mail_from.clone());

        Ok(Self {
            db,
            config,
            highlighter,
            notifications,
        })
    }

    pub fn from_parts(
        db: SqlitePool,
        config: Arc<AppConfig>,
        highlighter: Arc<Highlighter>,
        notifications: NotificationQueue,
    ) -> Self {
        Self {
            db,
            config,
            highlighter,
            notifications,
        }
    }

    pub fn fake() -> Self {
        let db = sqlx::sqlite::SqlitePoolOptions::new()
            .connect_lazy("sqlite::memory:")
            .expect("lazy pool ok");

        let config = Arc::new(AppConfig {
            database_url: "sqlite::memory:".into(),
            jwt: crate::config::JwtConfig {
                secret: "test".into(),
                issuer: "test".into(),
                audience: "test".into(),
                ttl_minutes: 5,
                refresh_ttl_minutes: 60,
            },
            mail_from: "snipbin@test.local".into(),
        });

        // Jobs enqueued against the fake go nowhere; the receiver is dropped.
        let (notifications, _jobs) = NotificationQueue::channel();

        Self {
            db,
            config,
            highlighter: Arc::new(Highlighter::new()),
            notifications,
        }
    }
}

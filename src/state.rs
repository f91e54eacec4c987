use std::sync::Arc;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::auth::JwtKeys;
use crate::config::Config;
use crate::images::{ImageHost, LocalImageHost};
use crate::mail::{self, Mailer};

pub type DbPool = Pool<SqliteConnectionManager>;

#[derive(Clone)]
pub struct AppState {
    pub db: DbPool,
    pub config: Config,
    pub jwt: Arc<JwtKeys>,
    pub mailer: Arc<dyn Mailer>,
    pub images: Arc<dyn ImageHost>,
}

impl AppState {
    pub fn new(
        db: DbPool,
        config: Config,
        mailer: Arc<dyn Mailer>,
        images: Arc<dyn ImageHost>,
    ) -> Self {
        let jwt = Arc::new(JwtKeys::new(&config.auth.jwt_secret, config.auth.token_days));
        Self {
            db,
            config,
            jwt,
            mailer,
            images,
        }
    }

    /// State wired to the collaborators named in `config`.
    pub fn from_config(db: DbPool, config: Config) -> anyhow::Result<Self> {
        let mailer = mail::build_mailer(&config.mail)?;
        let images = Arc::new(LocalImageHost::new(config.uploads_path(), config.uploads_url()));
        Ok(Self::new(db, config, mailer, images))
    }

    /// Build a link into the client application.
    pub fn client_link(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.config.client.url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

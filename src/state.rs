use std::sync::Arc;

use diesel::{
    pg::PgConnection,
    r2d2::{ConnectionManager, PooledConnection},
};

use crate::{
    auth::jwt::JwtService,
    config::AppConfig,
    db::PgPool,
    error::{AppError, AppResult},
    ipfs::{ContentStore, IpfsStore},
    ledger::{HttpLedger, Ledger},
    mailer::{mailer_from_config, Mailer},
};

type PgPooledConnection = PooledConnection<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub pool: PgPool,
    pub config: Arc<AppConfig>,
    pub content: Arc<dyn ContentStore>,
    pub ledger: Option<Arc<dyn Ledger>>,
    pub mailer: Arc<dyn Mailer>,
    pub jwt: JwtService,
}

impl AppState {
    pub fn new(
        pool: PgPool,
        config: AppConfig,
        content: Arc<dyn ContentStore>,
        ledger: Option<Arc<dyn Ledger>>,
        mailer: Arc<dyn Mailer>,
        jwt: JwtService,
    ) -> Self {
        Self {
            pool,
            config: Arc::new(config),
            content,
            ledger,
            mailer,
            jwt,
        }
    }

    /// Wires the production clients described by the configuration.
    pub fn from_config(pool: PgPool, config: AppConfig) -> anyhow::Result<Self> {
        let content: Arc<dyn ContentStore> = Arc::new(IpfsStore::new(
            config.ipfs_api_url.clone(),
            config.ipfs_gateway_url.clone(),
        ));
        let ledger = HttpLedger::from_config(&config)
            .map(|ledger| Arc::new(ledger) as Arc<dyn Ledger>);
        let mailer = mailer_from_config(&config);
        let jwt = JwtService::from_config(&config)?;

        Ok(Self::new(pool, config, content, ledger, mailer, jwt))
    }

    pub fn db(&self) -> AppResult<PgPooledConnection> {
        self.pool
            .get()
            .map_err(|err| AppError::internal(format!("database pool error: {err}")))
    }
}

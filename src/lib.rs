pub mod analytics;
pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod models;
pub mod notify;
pub mod sync;

use std::sync::Arc;

use anyhow::{Context, bail};
use tokio::task::JoinHandle;

use api::rest::RestBackend;
use api::{ChangeFeed, JournalBackend};
use auth::SessionProvider;
use config::JournalConfig;
use db::SqliteBackend;
use models::{Settings, UpdateSettingsInput};
use notify::Notifier;
use sync::{AccountContext, JournalError, SharedState, TradeStore};

/// The wired sync core: session, accounts, trades and their background tasks.
pub struct Journal {
    pub sessions: Arc<SessionProvider>,
    pub state: Arc<SharedState>,
    pub accounts: Arc<AccountContext>,
    pub trades: Arc<TradeStore>,
    backend: Arc<dyn JournalBackend>,
    config: JournalConfig,
    tasks: Vec<JoinHandle<()>>,
}

impl Journal {
    /// Open the backend named by `config` and start the watchers.
    /// Must be called from within a tokio runtime.
    pub fn start(config: JournalConfig, notifier: Arc<dyn Notifier>) -> anyhow::Result<Self> {
        if let Some(db_path) = config.database_path.clone() {
            if let Some(dir) = db_path.parent()
                && !dir.as_os_str().is_empty()
            {
                std::fs::create_dir_all(dir)
                    .with_context(|| format!("create data directory: {}", dir.display()))?;
            }
            log::info!("Database path: {}", db_path.display());

            let path = db_path
                .to_str()
                .context("database path is not valid UTF-8")?;
            let backend = SqliteBackend::open(path).with_context(|| {
                format!(
                    "database initialization failed; backups are in {}",
                    db_path.with_file_name("backups").display()
                )
            })?;
            let backend = Arc::new(backend);
            let feed: Arc<dyn ChangeFeed> = backend.clone();
            return Ok(Self::with_backend(config, backend, Some(feed), notifier));
        }

        if config.backend.url.is_empty() {
            bail!("no backend configured: set backend.url or database_path");
        }
        log::info!("Using hosted backend at {}", config.backend.url);
        let backend = Arc::new(RestBackend::new(
            config.backend.url.clone(),
            config.backend.anon_key.clone(),
            config.backend.rate_limit(),
        ));
        Ok(Self::with_backend(config, backend, None, notifier))
    }

    /// Wire the core around an existing backend. Without a change feed no
    /// realtime listener is started.
    pub fn with_backend(
        config: JournalConfig,
        backend: Arc<dyn JournalBackend>,
        feed: Option<Arc<dyn ChangeFeed>>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let sessions = Arc::new(SessionProvider::new());
        let state = Arc::new(SharedState::new());
        let accounts = Arc::new(AccountContext::new(
            backend.clone(),
            sessions.clone(),
            state.clone(),
            notifier.clone(),
            config.sync.clone(),
        ));
        accounts.set_reduced_motion(config.reduced_motion);
        let trades = Arc::new(TradeStore::new(
            backend.clone(),
            sessions.clone(),
            accounts.clone(),
            state.clone(),
            notifier,
            &config.sync,
        ));

        let mut tasks = vec![accounts.spawn_session_watcher(), trades.spawn_account_watcher()];
        if let Some(feed) = feed {
            tasks.push(trades.spawn_realtime_listener(feed));
        }
        log::info!("Journal started with {} backend", backend.backend_name());

        Self {
            sessions,
            state,
            accounts,
            trades,
            backend,
            config,
            tasks,
        }
    }

    pub fn backend(&self) -> &Arc<dyn JournalBackend> {
        &self.backend
    }

    fn apply_settings(&self, settings: &Settings) {
        self.accounts
            .set_reduced_motion(self.config.reduced_motion || settings.reduced_motion);
    }

    /// Fetch the user's settings and apply the motion preference.
    pub async fn load_settings(&self) -> Result<Settings, JournalError> {
        let session = self.sessions.current().ok_or(JournalError::NotAuthenticated)?;
        let settings = self.backend.get_settings(&session).await?;
        self.apply_settings(&settings);
        Ok(settings)
    }

    pub async fn update_settings(&self, input: UpdateSettingsInput) -> Result<Settings, JournalError> {
        let session = self.sessions.current().ok_or(JournalError::NotAuthenticated)?;
        let settings = self.backend.update_settings(&session, input).await?;
        self.apply_settings(&settings);
        Ok(settings)
    }

    /// Stop the background tasks.
    pub fn shutdown(mut self) {
        self.stop_tasks();
    }

    fn stop_tasks(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Journal {
    fn drop(&mut self) {
        self.stop_tasks();
    }
}

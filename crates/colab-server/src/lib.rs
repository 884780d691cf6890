//! CoLab collaboration server.
//!
//! Request handlers are thin glue: authorize via the session manager,
//! mutate through the store, then hand a typed event to the broadcaster.
//! The realtime entry points (WebSocket and SSE) live in
//! [`routes::realtime`] and gate registration on a valid session plus
//! project membership.

pub mod config;
pub mod error;
pub mod extract;
pub mod mailer;
pub mod routes;

use std::sync::Arc;

use colab_auth::SessionManager;
use colab_realtime::{Broadcaster, ConnectionRegistry};
use colab_store::Db;

use crate::config::Config;
use crate::mailer::Mailer;

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Db>,
    pub sessions: SessionManager,
    pub registry: Arc<ConnectionRegistry>,
    pub broadcaster: Arc<Broadcaster>,
    pub mailer: Arc<dyn Mailer>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: Arc<Db>, mailer: Arc<dyn Mailer>, config: Config) -> Self {
        let registry = Arc::new(ConnectionRegistry::new());
        Self {
            sessions: SessionManager::new(Arc::clone(&db)),
            broadcaster: Arc::new(Broadcaster::new(Arc::clone(&registry))),
            registry,
            db,
            mailer,
            config: Arc::new(config),
        }
    }
}

/// Build the full application router.
pub fn app(state: AppState) -> axum::Router {
    routes::router(state)
}

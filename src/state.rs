//! # Application State Management
//!
//! Shared state handed to every request handler and socket session through
//! `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: the validated configuration, read-only after startup
//! - **registry**: the set of live socket sessions, used only to close them all on shutdown
//! - **metrics**: counters reported by `/health`
//!
//! ## Key Rust Concepts:
//! - **Arc**: every worker thread holds a clone of the same state
//! - **Mutex / RwLock**: the registry and metrics are mutated from many sessions
//! - **Recipient<M>**: a type-erased actor address that only accepts message `M`

use crate::config::AppConfig;
use actix::prelude::*;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Instant;
use tracing::info;

/// Asks a live session to close its socket because the server is going away.
#[derive(Message, Debug, Clone, Copy)]
#[rtype(result = "()")]
pub struct Shutdown;

/// Process-wide set of open socket sessions.
///
/// Sessions register on start and deregister on stop. The only other
/// operation is `shutdown`, which closes every registered session in
/// registration order.
#[derive(Clone, Default)]
pub struct ConnectionRegistry {
    next_id: Arc<AtomicU64>,
    sessions: Arc<Mutex<BTreeMap<u64, Recipient<Shutdown>>>>,
}

impl ConnectionRegistry {
    pub fn register(&self, session: Recipient<Shutdown>) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().insert(id, session);
        id
    }

    pub fn deregister(&self, id: u64) {
        self.lock().remove(&id);
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Tell every live session to close. Returns how many were signalled.
    pub fn shutdown(&self) -> usize {
        let sessions = std::mem::take(&mut *self.lock());
        let count = sessions.len();
        for (_, session) in sessions {
            session.do_send(Shutdown);
        }
        info!(sessions = count, "closed live sessions for shutdown");
        count
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<u64, Recipient<Shutdown>>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionRegistry").field("live", &self.lock().len()).finish()
    }
}

/// Counters collected across all requests and sessions.
#[derive(Debug, Default, Clone)]
pub struct StreamMetrics {
    pub asset_requests: u64,
    pub sessions_started: u64,
    pub sessions_completed: u64,
    pub sessions_aborted: u64,
    pub frames_sent: u64,
    pub bytes_sent: u64,
}

impl StreamMetrics {
    /// Sessions started but not yet in a terminal state.
    pub fn active_sessions(&self) -> u64 {
        self.sessions_started
            .saturating_sub(self.sessions_completed)
            .saturating_sub(self.sessions_aborted)
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub registry: ConnectionRegistry,
    pub metrics: Arc<RwLock<StreamMetrics>>,
    pub start_time: Instant,
    pub tls_enabled: bool,
}

impl AppState {
    pub fn new(config: AppConfig) -> Self {
        Self {
            config: Arc::new(config),
            registry: ConnectionRegistry::default(),
            metrics: Arc::new(RwLock::new(StreamMetrics::default())),
            start_time: Instant::now(),
            tls_enabled: false,
        }
    }

    pub fn with_tls(mut self, enabled: bool) -> Self {
        self.tls_enabled = enabled;
        self
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    pub fn record_asset_request(&self) {
        self.update_metrics(|m| m.asset_requests += 1);
    }

    pub fn record_session_started(&self) {
        self.update_metrics(|m| m.sessions_started += 1);
    }

    /// Count a session that reached a terminal state.
    pub fn record_session_finished(&self, completed: bool) {
        self.update_metrics(|m| {
            if completed {
                m.sessions_completed += 1;
            } else {
                m.sessions_aborted += 1;
            }
        });
    }

    pub fn record_frame_sent(&self, bytes: usize) {
        self.update_metrics(|m| {
            m.frames_sent += 1;
            m.bytes_sent += bytes as u64;
        });
    }

    pub fn get_metrics_snapshot(&self) -> StreamMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    fn update_metrics(&self, update: impl FnOnce(&mut StreamMetrics)) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        update(&mut metrics);
    }
}

//! Per-request backend sessions.
//!
//! Every request dials its own [`Session`] and closes it before the response
//! is produced. Closing is idempotent; a session that is dropped without
//! being closed closes itself in the background.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use stowaway_storage::{DriverRegistry, Location};

use crate::connection::Connection;
use crate::error::{ErrorKind, GatewayError, Result};

/// Opens sessions from connection descriptors.
#[derive(Clone)]
pub struct SessionManager {
    registry: Arc<DriverRegistry>,
}

impl SessionManager {
    /// Create a session manager over a driver registry.
    pub fn new(registry: Arc<DriverRegistry>) -> Self {
        Self { registry }
    }

    /// Driver registry used to dial.
    pub fn registry(&self) -> &DriverRegistry {
        &self.registry
    }

    /// Dial the backend a descriptor names.
    ///
    /// # Errors
    /// - Connection error if the kind is unknown or the driver rejects the
    ///   configuration
    pub fn open(&self, conn: &Connection) -> Result<Session> {
        tracing::debug!("Dialing {} (container '{}')", conn.kind, conn.container_name);

        let location = self
            .registry
            .dial(&conn.kind, &conn.config)
            .map_err(|e| ErrorKind::Connection.caused_by("Failed to connect to storage", e))?;

        tracing::debug!("Connected to {}", conn.kind);
        Ok(Session {
            inner: Arc::new(SessionInner {
                kind: conn.kind.clone(),
                location,
                closed: AtomicBool::new(false),
            }),
        })
    }
}

/// An open, request-scoped backend session.
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    kind: String,
    location: Arc<dyn Location>,
    closed: AtomicBool,
}

impl Session {
    /// Provider kind this session was dialed with.
    pub fn kind(&self) -> &str {
        &self.inner.kind
    }

    /// The backend location.
    pub fn location(&self) -> &dyn Location {
        self.inner.location.as_ref()
    }

    /// Check if the session has been closed.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    /// Close the session. Later calls are no-ops.
    ///
    /// # Errors
    /// - Connection error if the driver fails to close
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        tracing::debug!("Closing {} session", self.inner.kind);
        self.inner
            .location
            .close()
            .await
            .map_err(|e| ErrorKind::Connection.caused_by("Failed to close storage session", e))
    }
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }

        let location = Arc::clone(&self.location);
        let kind = std::mem::take(&mut self.kind);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = location.close().await {
                        tracing::warn!("Failed to close dropped {} session: {}", kind, e);
                    }
                });
            }
            Err(_) => {
                tracing::warn!("Dropped {} session outside a runtime; not closed", kind);
            }
        }
    }
}

/// Run `operation` with a session, then close the session whatever the
/// outcome.
///
/// The operation's error wins over a close error; a close error after a
/// successful operation fails the call.
pub async fn close_after<T, F, Fut>(session: Session, operation: F) -> Result<T>
where
    F: FnOnce(Session) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = operation(session.clone()).await;
    let closed = session.close().await;
    settle(outcome, [closed])
}

/// Two-session form of [`close_after`]. Both sessions are closed.
pub async fn close_after_both<T, F, Fut>(first: Session, second: Session, operation: F) -> Result<T>
where
    F: FnOnce(Session, Session) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let outcome = operation(first.clone(), second.clone()).await;
    let first_closed = first.close().await;
    let second_closed = second.close().await;
    settle(outcome, [first_closed, second_closed])
}

fn settle<T, const N: usize>(outcome: Result<T>, closes: [Result<()>; N]) -> Result<T> {
    let mut close_error: Option<GatewayError> = None;
    for closed in closes {
        if let Err(e) = closed {
            tracing::warn!("{}", e);
            close_error.get_or_insert(e);
        }
    }

    match (outcome, close_error) {
        (Err(e), _) => Err(e),
        (Ok(_), Some(e)) => Err(e),
        (Ok(value), None) => Ok(value),
    }
}

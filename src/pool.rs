//! Pool of command-only sessions to one switch

use crate::{
    config::SessionOptions,
    connection::{Dialer, EslSession, TcpDialer},
    dispatch::HandlerRegistry,
    error::{EslError, EslResult},
};
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::time::timeout;
use tracing::{debug, trace};

/// Up to `size` sessions without event handlers, dialed on demand.
///
/// Useful for issuing `api` commands from many tasks without queuing them all
/// behind one socket. Sessions are reused while they stay connected.
pub struct SessionPool {
    options: SessionOptions,
    dialer: Arc<dyn Dialer>,
    slots: Arc<Semaphore>,
    idle: Arc<Mutex<Vec<EslSession>>>,
    size: usize,
}

impl fmt::Debug for SessionPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionPool")
            .field("address", &self.options.address)
            .field("size", &self.size)
            .field("available", &self.available())
            .finish()
    }
}

impl SessionPool {
    pub fn new(options: SessionOptions, size: usize) -> Self {
        let dialer = TcpDialer::new(options.connect_timeout());
        Self::with_dialer(options, size, Arc::new(dialer))
    }

    pub fn with_dialer(options: SessionOptions, size: usize, dialer: Arc<dyn Dialer>) -> Self {
        let size = size.max(1);
        Self {
            options,
            dialer,
            slots: Arc::new(Semaphore::new(size)),
            idle: Arc::new(Mutex::new(Vec::new())),
            size,
        }
    }

    /// Take a session, waiting at most `max_wait` for a free slot.
    ///
    /// Reuses an idle connected session when there is one, otherwise dials a
    /// new one. Dial and handshake errors are returned as-is and free the
    /// slot again.
    pub async fn acquire(&self, max_wait: Duration) -> EslResult<PooledSession> {
        let permit = timeout(
            max_wait,
            self.slots
                .clone()
                .acquire_owned(),
        )
        .await
        .map_err(|_| EslError::Timeout {
            timeout_ms: u64::try_from(max_wait.as_millis()).unwrap_or(u64::MAX),
        })?
        .map_err(|_| EslError::Shutdown)?;

        while let Some(session) = self.pop_idle() {
            if session.is_connected() {
                trace!("Reusing pooled session to {}", self.options.label());
                return Ok(self.checked_out(session, permit));
            }
            debug!("Discarding pooled session: {}", session.status());
        }

        debug!("Opening pooled session to {}", self.options.label());
        let session = EslSession::connect_with_dialer(
            self.options
                .clone(),
            HandlerRegistry::new(),
            self.dialer
                .clone(),
        )
        .await?;
        Ok(self.checked_out(session, permit))
    }

    fn checked_out(&self, session: EslSession, permit: OwnedSemaphorePermit) -> PooledSession {
        PooledSession {
            session,
            idle: self
                .idle
                .clone(),
            slots: self
                .slots
                .clone(),
            _permit: permit,
        }
    }

    fn pop_idle(&self) -> Option<EslSession> {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop()
    }

    /// Free slots right now.
    pub fn available(&self) -> usize {
        self.slots
            .available_permits()
    }

    /// Sessions parked in the pool.
    pub fn idle_count(&self) -> usize {
        self.idle
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Refuse new acquisitions and shut down idle sessions.
    ///
    /// Sessions currently checked out are shut down when their guard drops.
    pub async fn close(&self) {
        self.slots
            .close();
        let idle = std::mem::take(
            &mut *self
                .idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for session in idle {
            session
                .shutdown()
                .await;
        }
    }
}

/// A session checked out of a [`SessionPool`].
///
/// Goes back to the pool on drop if still connected.
pub struct PooledSession {
    session: EslSession,
    idle: Arc<Mutex<Vec<EslSession>>>,
    slots: Arc<Semaphore>,
    // released after the session is back in `idle`
    _permit: OwnedSemaphorePermit,
}

impl fmt::Debug for PooledSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PooledSession")
            .field(&self.session)
            .finish()
    }
}

impl Deref for PooledSession {
    type Target = EslSession;

    fn deref(&self) -> &EslSession {
        &self.session
    }
}

impl Drop for PooledSession {
    fn drop(&mut self) {
        if self
            .session
            .is_connected()
            && !self
                .slots
                .is_closed()
        {
            self.idle
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .push(
                    self.session
                        .clone(),
                );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::BoxedStream;
    use futures_util::future::BoxFuture;
    use std::io;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

    /// Accepts every dial with a switch that answers `auth` and `api`.
    #[derive(Default)]
    struct AcceptAll {
        dials: AtomicUsize,
    }

    impl Dialer for AcceptAll {
        fn dial<'a>(&'a self, _address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
            self.dials
                .fetch_add(1, Ordering::SeqCst);
            Box::pin(async {
                let (client, server) = tokio::io::duplex(4096);
                tokio::spawn(async move {
                    let mut server = BufReader::new(server);
                    let _ = server
                        .get_mut()
                        .write_all(b"Content-Type: auth/request\n\n")
                        .await;
                    let mut line = String::new();
                    loop {
                        line.clear();
                        match server
                            .read_line(&mut line)
                            .await
                        {
                            Ok(0) | Err(_) => return,
                            Ok(_) => {}
                        }
                        let reply = if line.starts_with("auth ") {
                            "Content-Type: command/reply\nReply-Text: +OK accepted\n\n"
                        } else if line.starts_with("api ") {
                            "Content-Type: api/response\nContent-Length: 3\n\nOK\n"
                        } else {
                            continue;
                        };
                        if server
                            .get_mut()
                            .write_all(reply.as_bytes())
                            .await
                            .is_err()
                        {
                            return;
                        }
                    }
                });
                Ok(Box::new(client) as BoxedStream)
            })
        }
    }

    fn pool(size: usize) -> (SessionPool, Arc<AcceptAll>) {
        let dialer = Arc::new(AcceptAll::default());
        let pool = SessionPool::with_dialer(
            SessionOptions::new("switch:8021", "ClueCon"),
            size,
            dialer.clone(),
        );
        (pool, dialer)
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn test_idle_session_is_reused() {
        let (pool, dialer) = pool(2);
        {
            let session = pool
                .acquire(WAIT)
                .await
                .unwrap();
            assert_eq!(
                session
                    .api("status")
                    .await
                    .unwrap(),
                "OK\n"
            );
            assert_eq!(pool.available(), 1);
        }
        assert_eq!(pool.idle_count(), 1);
        assert_eq!(pool.available(), 2);

        let _again = pool
            .acquire(WAIT)
            .await
            .unwrap();
        assert_eq!(
            dialer
                .dials
                .load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_concurrent_holders_get_distinct_sessions() {
        let (pool, dialer) = pool(2);
        let a = pool
            .acquire(WAIT)
            .await
            .unwrap();
        let b = pool
            .acquire(WAIT)
            .await
            .unwrap();
        assert_eq!(
            dialer
                .dials
                .load(Ordering::SeqCst),
            2
        );
        drop((a, b));
        assert_eq!(pool.idle_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_pool_times_out() {
        let (pool, _) = pool(1);
        let _held = pool
            .acquire(WAIT)
            .await
            .unwrap();
        let err = pool
            .acquire(WAIT)
            .await
            .unwrap_err();
        assert!(matches!(err, EslError::Timeout { timeout_ms: 200 }));
    }

    #[tokio::test]
    async fn test_waiter_gets_released_slot() {
        let (pool, dialer) = pool(1);
        let held = pool
            .acquire(WAIT)
            .await
            .unwrap();
        let release = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(held);
        });
        let next = pool
            .acquire(Duration::from_secs(2))
            .await
            .unwrap();
        release
            .await
            .unwrap();
        assert!(next.is_connected());
        assert_eq!(
            dialer
                .dials
                .load(Ordering::SeqCst),
            1
        );
    }

    #[tokio::test]
    async fn test_dead_sessions_are_discarded() {
        let (pool, dialer) = pool(1);
        {
            let session = pool
                .acquire(WAIT)
                .await
                .unwrap();
            session
                .shutdown()
                .await;
        }
        assert_eq!(pool.idle_count(), 0);

        let fresh = pool
            .acquire(WAIT)
            .await
            .unwrap();
        assert!(fresh.is_connected());
        assert_eq!(
            dialer
                .dials
                .load(Ordering::SeqCst),
            2
        );
    }

    #[tokio::test]
    async fn test_closed_pool_refuses() {
        let (pool, _) = pool(1);
        drop(
            pool.acquire(WAIT)
                .await
                .unwrap(),
        );
        pool.close()
            .await;
        assert_eq!(pool.idle_count(), 0);
        assert!(matches!(
            pool.acquire(WAIT)
                .await,
            Err(EslError::Shutdown)
        ));
    }
}

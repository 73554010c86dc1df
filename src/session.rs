//! Tool-serving session lifecycle.
//!
//! Process lifetime is kept apart from the conversion pipeline: the server
//! reports activity and request boundaries here, and a separate watcher
//! decides when to stop.
//!
//! ```text
//!            begin_request            guard dropped (last one)
//!   Idle ─────────────────▶ Busy(n) ─────────────────────────▶ Idle
//!    │                        │
//!    │ shutdown(reason)       │ shutdown(reason)
//!    ▼                        ▼
//!  Stopped(reason) ◀──── Draining(n) ◀── no new requests accepted
//!                  n == 0
//! ```
//!
//! Any input on the transport resets the idle timer ([`ActivityReader`]).
//! Idle expiry only fires while nothing is in flight, so it never interrupts
//! a running conversion.

use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::io::{AsyncRead, ReadBuf};
use tokio::sync::Notify;
use tokio::time::Instant;
use tracing::debug;

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownReason {
    /// No input and no in-flight request for the configured idle timeout.
    IdleTimeout,
    /// SIGINT / SIGTERM (Ctrl-C on Windows).
    Signal,
    /// The peer closed the transport.
    TransportClosed,
}

/// Observable session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Busy { in_flight: usize },
    Draining { reason: ShutdownReason, in_flight: usize },
    Stopped(ShutdownReason),
}

#[derive(Debug, Clone, Copy)]
enum Phase {
    Running,
    Draining(ShutdownReason),
    Stopped(ShutdownReason),
}

#[derive(Debug)]
struct Shared {
    last_activity: Instant,
    in_flight: usize,
    phase: Phase,
}

#[derive(Debug)]
struct Inner {
    idle_timeout: Option<Duration>,
    shared: Mutex<Shared>,
    changed: Notify,
}

/// Shared handle to one session's lifecycle. Cheap to clone.
#[derive(Debug, Clone)]
pub struct SessionLifecycle {
    inner: Arc<Inner>,
}

impl SessionLifecycle {
    /// `idle_timeout` of `None` or zero disables idle shutdown.
    pub fn new(idle_timeout: Option<Duration>) -> Self {
        Self {
            inner: Arc::new(Inner {
                idle_timeout: idle_timeout.filter(|d| !d.is_zero()),
                shared: Mutex::new(Shared {
                    last_activity: Instant::now(),
                    in_flight: 0,
                    phase: Phase::Running,
                }),
                changed: Notify::new(),
            }),
        }
    }

    pub fn idle_timeout(&self) -> Option<Duration> {
        self.inner.idle_timeout
    }

    fn lock(&self) -> MutexGuard<'_, Shared> {
        self.inner
            .shared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Record transport activity; restarts the idle timer.
    pub fn touch(&self) {
        self.lock().last_activity = Instant::now();
    }

    /// Time since the last activity or request completion.
    pub fn idle_for(&self) -> Duration {
        self.lock().last_activity.elapsed()
    }

    /// Register an in-flight request.
    ///
    /// Returns `None` once shutdown has begun; the caller should refuse the
    /// request. The request ends when the guard is dropped.
    pub fn begin_request(&self) -> Option<RequestGuard> {
        let mut shared = self.lock();
        if !matches!(shared.phase, Phase::Running) {
            return None;
        }
        shared.in_flight += 1;
        shared.last_activity = Instant::now();
        debug!("Request started ({} in flight)", shared.in_flight);
        Some(RequestGuard {
            lifecycle: self.clone(),
        })
    }

    fn end_request(&self) {
        {
            let mut shared = self.lock();
            shared.in_flight = shared.in_flight.saturating_sub(1);
            shared.last_activity = Instant::now();
            debug!("Request finished ({} in flight)", shared.in_flight);
        }
        self.inner.changed.notify_waiters();
    }

    pub fn state(&self) -> SessionState {
        let shared = self.lock();
        match shared.phase {
            Phase::Stopped(reason) => SessionState::Stopped(reason),
            Phase::Draining(reason) => SessionState::Draining {
                reason,
                in_flight: shared.in_flight,
            },
            Phase::Running if shared.in_flight == 0 => SessionState::Idle,
            Phase::Running => SessionState::Busy {
                in_flight: shared.in_flight,
            },
        }
    }

    /// Resolves once the session has been idle, with nothing in flight, for
    /// the full idle timeout. Never resolves when the timeout is disabled.
    pub async fn idle_expired(&self) {
        let Some(timeout) = self.inner.idle_timeout else {
            return std::future::pending().await;
        };

        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let deadline = {
                let shared = self.lock();
                (shared.in_flight == 0).then(|| shared.last_activity + timeout)
            };

            match deadline {
                Some(at) if Instant::now() >= at => return,
                Some(at) => {
                    tokio::select! {
                        _ = tokio::time::sleep_until(at) => {}
                        _ = &mut notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }

    /// Stop accepting requests. The first reason given wins; later calls
    /// return the reason already in effect.
    pub fn shutdown(&self, reason: ShutdownReason) -> ShutdownReason {
        let effective = {
            let mut shared = self.lock();
            match shared.phase {
                Phase::Running => {
                    debug!(?reason, "Session draining");
                    shared.phase = Phase::Draining(reason);
                    reason
                }
                Phase::Draining(r) | Phase::Stopped(r) => r,
            }
        };
        self.inner.changed.notify_waiters();
        effective
    }

    /// Begin shutdown and wait for in-flight requests to finish.
    pub async fn drain(&self, reason: ShutdownReason) -> ShutdownReason {
        let reason = self.shutdown(reason);
        loop {
            let notified = self.inner.changed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            {
                let mut shared = self.lock();
                if shared.in_flight == 0 {
                    shared.phase = Phase::Stopped(reason);
                    debug!(?reason, "Session stopped");
                    return reason;
                }
            }
            notified.await;
        }
    }
}

/// Marks one in-flight request; dropping it ends the request.
#[derive(Debug)]
pub struct RequestGuard {
    lifecycle: SessionLifecycle,
}

impl Drop for RequestGuard {
    fn drop(&mut self) {
        self.lifecycle.end_request();
    }
}

/// Transport reader that reports every non-empty read as activity.
pub struct ActivityReader<R> {
    inner: R,
    lifecycle: SessionLifecycle,
}

impl<R> ActivityReader<R> {
    pub fn new(inner: R, lifecycle: SessionLifecycle) -> Self {
        Self { inner, lifecycle }
    }
}

impl<R: AsyncRead + Unpin> AsyncRead for ActivityReader<R> {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        let this = self.get_mut();
        let before = buf.filled().len();
        let polled = Pin::new(&mut this.inner).poll_read(cx, buf);
        if matches!(polled, Poll::Ready(Ok(()))) && buf.filled().len() > before {
            this.lifecycle.touch();
        }
        polled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio_test::{assert_pending, assert_ready, assert_ready_eq, task};

    const TIMEOUT: Duration = Duration::from_secs(10);

    #[tokio::test(start_paused = true)]
    async fn idle_expires_after_timeout() {
        let session = SessionLifecycle::new(Some(TIMEOUT));
        let start = Instant::now();
        session.idle_expired().await;
        assert!(start.elapsed() >= TIMEOUT);
        assert_eq!(session.state(), SessionState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn activity_resets_idle_timer() {
        let session = SessionLifecycle::new(Some(TIMEOUT));
        let mut idle = task::spawn(session.idle_expired());
        assert_pending!(idle.poll());

        tokio::time::advance(Duration::from_secs(6)).await;
        session.touch();
        tokio::time::advance(Duration::from_secs(6)).await;
        assert_pending!(idle.poll());

        tokio::time::advance(Duration::from_secs(5)).await;
        assert_ready!(idle.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn in_flight_request_blocks_idle_expiry() {
        let session = SessionLifecycle::new(Some(TIMEOUT));
        let guard = session.begin_request().unwrap();
        assert_eq!(session.state(), SessionState::Busy { in_flight: 1 });

        let mut idle = task::spawn(session.idle_expired());
        assert_pending!(idle.poll());
        tokio::time::advance(Duration::from_secs(60)).await;
        assert_pending!(idle.poll());

        drop(guard);
        assert_pending!(idle.poll());
        tokio::time::advance(Duration::from_secs(11)).await;
        assert_ready!(idle.poll());
    }

    #[tokio::test(start_paused = true)]
    async fn disabled_timeout_never_expires() {
        let session = SessionLifecycle::new(Some(Duration::ZERO));
        assert_eq!(session.idle_timeout(), None);
        let mut idle = task::spawn(session.idle_expired());
        tokio::time::advance(Duration::from_secs(3600)).await;
        assert_pending!(idle.poll());
    }

    #[tokio::test]
    async fn drain_waits_for_in_flight_requests() {
        let session = SessionLifecycle::new(None);
        let guard = session.begin_request().unwrap();

        let mut drain = task::spawn(session.drain(ShutdownReason::Signal));
        assert_pending!(drain.poll());
        assert_eq!(
            session.state(),
            SessionState::Draining {
                reason: ShutdownReason::Signal,
                in_flight: 1
            }
        );
        assert!(session.begin_request().is_none());

        drop(guard);
        assert!(drain.is_woken());
        assert_ready_eq!(drain.poll(), ShutdownReason::Signal);
        assert_eq!(
            session.state(),
            SessionState::Stopped(ShutdownReason::Signal)
        );
    }

    #[tokio::test]
    async fn first_shutdown_reason_wins() {
        let session = SessionLifecycle::new(None);
        assert_eq!(
            session.shutdown(ShutdownReason::TransportClosed),
            ShutdownReason::TransportClosed
        );
        assert_eq!(
            session.drain(ShutdownReason::Signal).await,
            ShutdownReason::TransportClosed
        );
    }

    #[tokio::test(start_paused = true)]
    async fn reader_touches_on_input() {
        let session = SessionLifecycle::new(Some(TIMEOUT));
        let mock = tokio_test::io::Builder::new().read(b"{\"jsonrpc\":\"2.0\"}\n").build();
        let mut reader = ActivityReader::new(mock, session.clone());

        tokio::time::advance(Duration::from_secs(7)).await;
        assert_eq!(session.idle_for(), Duration::from_secs(7));

        let mut buf = [0u8; 64];
        let n = reader.read(&mut buf).await.unwrap();
        assert!(n > 0);
        assert_eq!(session.idle_for(), Duration::ZERO);
    }
}

//! Connection lifecycle and command/reply correlation
//!
//! One background reader task owns the socket's read side. It hands
//! `api/response` and `command/reply` frames to the single pending command
//! and every other frame with a body to the [`Dispatcher`]. When the socket
//! fails, the reader dials again with a bounded number of attempts,
//! re-authenticates and restores subscriptions and filters.

use std::fmt;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt, BufReader, ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, error, info, trace, warn};

use futures_util::future::BoxFuture;

use crate::{
    command::{subscription_list, EslCommand, EslReply},
    config::SessionOptions,
    constants::{
        AUTH_ACCEPTED, DEFAULT_TIMEOUT_MS, HEADER_CONTENT_TYPE, READER_RECONNECTS, REPLY_ERR,
        SOCKET_BUF_SIZE,
    },
    dispatch::{DispatchStats, Dispatcher, HandlerRegistry},
    error::{EslError, EslResult},
    protocol::{Frame, FrameKind, FrameReader},
};

/// Byte stream carrying one ESL connection.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Boxed transport returned by a [`Dialer`].
pub type BoxedStream = Box<dyn AsyncStream>;

type SessionReader = FrameReader<BufReader<ReadHalf<BoxedStream>>>;
type SessionWriter = WriteHalf<BoxedStream>;

/// Opens the transport for a session.
///
/// [`TcpDialer`] is used by [`EslSession::connect`]; tests and embedders can
/// supply in-memory transports through [`EslSession::connect_with_dialer`].
pub trait Dialer: Send + Sync + 'static {
    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>>;
}

/// Plain TCP with a connect timeout.
#[derive(Debug, Clone)]
pub struct TcpDialer {
    connect_timeout: Duration,
}

impl TcpDialer {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl Default for TcpDialer {
    fn default() -> Self {
        Self::new(Duration::from_millis(DEFAULT_TIMEOUT_MS))
    }
}

impl Dialer for TcpDialer {
    fn dial<'a>(&'a self, address: &'a str) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            match timeout(self.connect_timeout, TcpStream::connect(address)).await {
                Ok(Ok(stream)) => {
                    debug!("[CONNECT] TCP connection established to {}", address);
                    if let Err(e) = stream.set_nodelay(true) {
                        trace!("[CONNECT] set_nodelay failed: {}", e);
                    }
                    Ok(Box::new(stream) as BoxedStream)
                }
                Ok(Err(e)) => {
                    warn!("[CONNECT] TCP connect to {} failed: {}", address, e);
                    Err(e)
                }
                Err(_) => {
                    warn!(
                        "[CONNECT] TCP connect to {} timed out after {}ms",
                        address,
                        self.connect_timeout
                            .as_millis()
                    );
                    Err(io::Error::new(
                        io::ErrorKind::TimedOut,
                        format!("connect to {} timed out", address),
                    ))
                }
            }
        })
    }
}

/// Session status, observable through [`EslSession::status_receiver`].
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConnectionStatus {
    /// Initial dial and handshake in progress.
    Connecting,
    /// Authenticated and subscribed.
    Connected,
    /// The socket was lost; the reader is dialing again.
    Reconnecting,
    /// The session is over. No further events will arrive.
    Disconnected(DisconnectReason),
}

impl ConnectionStatus {
    /// `true` once the session has stopped for good.
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Disconnected(_))
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Connecting => write!(f, "connecting"),
            ConnectionStatus::Connected => write!(f, "connected"),
            ConnectionStatus::Reconnecting => write!(f, "reconnecting"),
            ConnectionStatus::Disconnected(reason) => write!(f, "disconnected: {}", reason),
        }
    }
}

/// Why a session ended
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DisconnectReason {
    /// The reader lost the socket and every reconnect attempt failed.
    /// Carries the last error message (io::Error is not Clone).
    ReconnectFailed(String),
    /// Client called shutdown() or dropped every handle.
    ClientShutdown,
    /// The reader task panicked.
    ReaderPanicked,
}

impl fmt::Display for DisconnectReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisconnectReason::ReconnectFailed(msg) => write!(f, "reconnect failed: {}", msg),
            DisconnectReason::ClientShutdown => write!(f, "client shut down"),
            DisconnectReason::ReaderPanicked => write!(f, "reader task panicked"),
        }
    }
}

/// State shared between session handles and the reader task
struct Inner {
    options: SessionOptions,
    registry: Arc<HandlerRegistry>,
    dialer: Arc<dyn Dialer>,
    writer: Mutex<Option<SessionWriter>>,
    pending_reply: Mutex<Option<oneshot::Sender<Frame>>>,
    /// Filters added at runtime, replayed after the configured ones
    runtime_filters: Mutex<Vec<(String, String)>>,
    command_timeout_ms: AtomicU64,
    status_tx: watch::Sender<ConnectionStatus>,
    stop_tx: watch::Sender<bool>,
    /// Bumped to make the reader drop the current socket
    kick_tx: watch::Sender<u64>,
    stats: Arc<DispatchStats>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Inner {
    fn set_status(&self, status: ConnectionStatus) {
        debug!("[{}] status: {}", self.options.label(), status);
        self.status_tx
            .send_replace(status);
    }

    fn is_connected(&self) -> bool {
        matches!(*self.status_tx.borrow(), ConnectionStatus::Connected)
    }

    fn is_stopped(&self) -> bool {
        *self
            .stop_tx
            .borrow()
    }

    /// Ask the reader to drop the current socket and dial again.
    fn kick(&self) {
        self.kick_tx
            .send_modify(|epoch| *epoch = epoch.wrapping_add(1));
    }

    fn command_timeout_ms(&self) -> u64 {
        self.command_timeout_ms
            .load(Ordering::Relaxed)
    }

    /// Drop the waiting command's reply sender; it then fails with
    /// `ConnectionClosed`.
    async fn fail_pending(&self) {
        if self
            .pending_reply
            .lock()
            .await
            .take()
            .is_some()
        {
            debug!("Failing pending command, connection lost");
        }
    }

    /// Close the current write half, if any.
    async fn teardown(&self) {
        let writer = self
            .writer
            .lock()
            .await
            .take();
        if let Some(mut writer) = writer {
            if let Err(e) = writer
                .shutdown()
                .await
            {
                trace!("[CONNECT] shutdown of old socket failed: {}", e);
            }
            debug!("[CONNECT] Closed previous connection");
        }
    }

    /// Configured filters followed by runtime ones not already configured.
    async fn filters(&self) -> Vec<(String, String)> {
        let mut filters: Vec<(String, String)> = self
            .options
            .event_filters
            .iter()
            .flat_map(|(header, values)| {
                values
                    .iter()
                    .map(move |value| (header.clone(), value.clone()))
            })
            .collect();
        for pair in self
            .runtime_filters
            .lock()
            .await
            .iter()
        {
            if !filters.contains(pair) {
                filters.push(pair.clone());
            }
        }
        filters
    }

    /// Dial, authenticate and subscribe, with up to `max_attempts` dials.
    ///
    /// Tears down any live connection first. Stops early with
    /// [`EslError::Shutdown`] when the session is being shut down.
    async fn establish(
        &self,
        max_attempts: usize,
        dispatcher: &Dispatcher,
    ) -> EslResult<SessionReader> {
        let mut stop_rx = self
            .stop_tx
            .subscribe();
        if *stop_rx.borrow_and_update() {
            return Err(EslError::Shutdown);
        }
        tokio::select! {
            _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => Err(EslError::Shutdown),
            result = self.connect_attempts(max_attempts, dispatcher) => result,
        }
    }

    async fn connect_attempts(
        &self,
        max_attempts: usize,
        dispatcher: &Dispatcher,
    ) -> EslResult<SessionReader> {
        self.teardown()
            .await;

        let address = &self
            .options
            .address;
        let attempts = max_attempts.max(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            debug!(
                "[CONNECT] Dialing {} (attempt {}/{})",
                address, attempt, attempts
            );
            match self
                .dialer
                .dial(address)
                .await
            {
                // Anything after a successful dial is final for this call.
                Ok(stream) => {
                    return self
                        .handshake(stream, dispatcher)
                        .await
                }
                Err(e) => {
                    warn!(
                        "[CONNECT] Attempt {}/{} to {} failed: {}",
                        attempt, attempts, address, e
                    );
                    last_error = Some(e);
                }
            }

            if attempt < attempts {
                let pause = self
                    .options
                    .reconnect_delay
                    .delay(
                        u32::try_from(attempt).unwrap_or(u32::MAX),
                        self.options
                            .reconnect_unit(),
                        self.options
                            .max_reconnect_interval(),
                    );
                trace!("[CONNECT] Waiting {:?} before next attempt", pause);
                sleep(pause).await;
            }
        }

        Err(EslError::Connect {
            address: address.clone(),
            attempts,
            source: last_error
                .unwrap_or_else(|| io::Error::new(io::ErrorKind::NotConnected, "no dial attempt")),
        })
    }

    /// Challenge, auth, subscription and filters on a fresh transport.
    async fn handshake(
        &self,
        stream: BoxedStream,
        dispatcher: &Dispatcher,
    ) -> EslResult<SessionReader> {
        let (read_half, mut writer) = tokio::io::split(stream);
        let mut reader = FrameReader::new(BufReader::with_capacity(SOCKET_BUF_SIZE, read_half));

        debug!("[AUTH] Waiting for auth request from FreeSWITCH");
        let challenge = timeout(
            self.options
                .connect_timeout(),
            reader.read_frame(),
        )
        .await
        .map_err(|_| EslError::Timeout {
            timeout_ms: self
                .options
                .connect_timeout_ms,
        })??;

        if *challenge.kind() != FrameKind::AuthRequest {
            let content_type = challenge
                .header(HEADER_CONTENT_TYPE)
                .map(str::to_string);
            warn!(
                "[AUTH] Expected auth/request, got {:?}",
                content_type
            );
            return Err(EslError::AuthChallenge { content_type });
        }

        let auth = EslCommand::Auth {
            password: self
                .options
                .password
                .clone(),
        };
        let reply = self
            .exchange(&mut writer, &mut reader, &auth, dispatcher)
            .await?;
        if !reply
            .reply_text()
            .is_some_and(|text| text.contains(AUTH_ACCEPTED))
        {
            warn!("[AUTH] Authentication rejected by {}", self.options.label());
            return Err(EslError::auth_failed(
                reply
                    .reply_text()
                    .unwrap_or("Authentication failed"),
            ));
        }
        debug!("[AUTH] Authentication successful");

        if let Some(events) = subscription_list(self.registry.names()) {
            let subscribe = EslCommand::Events { events };
            self.exchange(&mut writer, &mut reader, &subscribe, dispatcher)
                .await?
                .into_result()?;
            debug!("[CONNECT] Subscribed: {}", subscribe.describe());
        }

        for (header, value) in self
            .filters()
            .await
        {
            let filter = EslCommand::Filter { header, value };
            self.exchange(&mut writer, &mut reader, &filter, dispatcher)
                .await?
                .into_result()?;
        }

        *self
            .writer
            .lock()
            .await = Some(writer);
        self.set_status(ConnectionStatus::Connected);
        info!("[CONNECT] Session ready on {}", self.options.label());
        Ok(reader)
    }

    /// Write a command on a transport the reader task does not own yet and
    /// read frames until its reply. Events seen meanwhile are dispatched.
    async fn exchange(
        &self,
        writer: &mut SessionWriter,
        reader: &mut SessionReader,
        command: &EslCommand,
        dispatcher: &Dispatcher,
    ) -> EslResult<EslReply> {
        let wire = command.to_wire_format()?;
        debug!("Sending command: {}", command.describe());
        writer
            .write_all(wire.as_bytes())
            .await?;

        let timeout_ms = self.command_timeout_ms();
        let reply = timeout(Duration::from_millis(timeout_ms), async {
            loop {
                let frame = reader
                    .read_frame()
                    .await?;
                if frame.is_reply() {
                    return Ok::<_, EslError>(frame.into_reply());
                }
                self.route(frame, dispatcher)
                    .await;
            }
        })
        .await
        .map_err(|_| EslError::Timeout { timeout_ms })??;
        Ok(reply)
    }

    /// Hand a frame read by the reader task to its consumer.
    async fn route(&self, frame: Frame, dispatcher: &Dispatcher) {
        match frame.kind() {
            FrameKind::ApiResponse | FrameKind::CommandReply => {
                let waiter = self
                    .pending_reply
                    .lock()
                    .await
                    .take();
                match waiter {
                    Some(tx) => {
                        let _ = tx.send(frame);
                    }
                    None => warn!("[RECV] {:?} but no pending command", frame.kind()),
                }
            }
            FrameKind::DisconnectNotice => {
                info!("[RECV] Disconnect notice from {}", self.options.label());
            }
            FrameKind::AuthRequest => {
                debug!("[RECV] Ignoring unexpected auth/request");
            }
            FrameKind::Event | FrameKind::Unknown(_) => {
                if let Some(body) = frame.into_body() {
                    if !dispatcher.dispatch(body, self.options.conn_id) {
                        error!("[RECV] Event dispatcher is gone, dropping event");
                    }
                }
            }
        }
    }
}

/// Background reader
async fn reader_loop(
    inner: Arc<Inner>,
    reader: SessionReader,
    kick_rx: watch::Receiver<u64>,
    dispatcher: Dispatcher,
) {
    let result = std::panic::AssertUnwindSafe(reader_loop_inner(
        inner.clone(),
        reader,
        kick_rx,
        dispatcher,
    ));
    if futures_util::FutureExt::catch_unwind(result)
        .await
        .is_err()
    {
        error!("reader task panicked");
        inner.set_status(ConnectionStatus::Disconnected(
            DisconnectReason::ReaderPanicked,
        ));
        inner
            .fail_pending()
            .await;
        inner
            .teardown()
            .await;
    }
}

async fn reader_loop_inner(
    inner: Arc<Inner>,
    mut reader: SessionReader,
    mut kick_rx: watch::Receiver<u64>,
    dispatcher: Dispatcher,
) {
    let mut stop_rx = inner
        .stop_tx
        .subscribe();

    loop {
        let failure = tokio::select! {
            _ = async { let _ = stop_rx.wait_for(|stopped| *stopped).await; } => break,
            Ok(()) = kick_rx.changed() => {
                debug!("[RECV] Dropping socket on request");
                EslError::ConnectionClosed
            }
            frame = reader.read_frame() => match frame {
                Ok(frame) => {
                    inner
                        .route(frame, &dispatcher)
                        .await;
                    continue;
                }
                Err(e) => e,
            },
        };

        warn!("[RECV] Lost connection to {}: {}", inner.options.label(), failure);
        inner.set_status(ConnectionStatus::Reconnecting);
        inner
            .fail_pending()
            .await;

        match inner
            .establish(READER_RECONNECTS, &dispatcher)
            .await
        {
            Ok(fresh) => {
                info!("[CONNECT] Reconnected to {}", inner.options.label());
                // kicks made while dialing were for the old socket
                kick_rx.borrow_and_update();
                reader = fresh;
            }
            Err(EslError::Shutdown) => break,
            Err(e) => {
                error!(
                    "[CONNECT] Giving up on {}: {}",
                    inner.options.label(),
                    e
                );
                inner.set_status(ConnectionStatus::Disconnected(
                    DisconnectReason::ReconnectFailed(e.to_string()),
                ));
                inner
                    .fail_pending()
                    .await;
                inner
                    .teardown()
                    .await;
                return;
            }
        }
    }

    inner.set_status(ConnectionStatus::Disconnected(
        DisconnectReason::ClientShutdown,
    ));
    inner
        .fail_pending()
        .await;
    inner
        .teardown()
        .await;
    debug!("Reader for {} stopped", inner.options.label());
}

/// Stops the session when the last handle goes away.
struct StopGuard(Arc<Inner>);

impl Drop for StopGuard {
    fn drop(&mut self) {
        self.0
            .stop_tx
            .send_replace(true);
    }
}

/// Handle to a self-healing ESL session (Clone + Send)
///
/// Commands are serialized through the writer mutex, which is held from the
/// write until the reply arrives. The reader task routes replies to the one
/// pending command and events to the registered handlers.
///
/// ```rust,no_run
/// use freeswitch_esl_session::{handler_fn, EslSession, HandlerRegistry, SessionOptions};
///
/// # async fn example() -> Result<(), freeswitch_esl_session::EslError> {
/// let handlers = HandlerRegistry::new().on(
///     "CHANNEL_HANGUP_COMPLETE",
///     handler_fn(|event| async move {
///         println!("hangup {:?}", event.unique_id());
///     }),
/// );
/// let session = EslSession::connect(SessionOptions::new("10.0.0.5:8021", "ClueCon"), handlers).await?;
/// println!("{}", session.api("status").await?);
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct EslSession {
    inner: Arc<Inner>,
    _guard: Arc<StopGuard>,
}

impl fmt::Debug for EslSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EslSession")
            .field("address", &self.inner.options.address)
            .field("status", &self.status())
            .finish()
    }
}

impl EslSession {
    /// Dial over TCP, authenticate and subscribe to every event `handlers`
    /// listens for.
    ///
    /// Makes up to `options.reconnects` dial attempts before giving up.
    pub async fn connect(options: SessionOptions, handlers: HandlerRegistry) -> EslResult<Self> {
        let dialer = TcpDialer::new(options.connect_timeout());
        Self::connect_with_dialer(options, handlers, Arc::new(dialer)).await
    }

    /// Like [`connect`](Self::connect) over a custom transport.
    pub async fn connect_with_dialer(
        options: SessionOptions,
        handlers: HandlerRegistry,
        dialer: Arc<dyn Dialer>,
    ) -> EslResult<Self> {
        let registry = Arc::new(handlers);
        let stats = Arc::new(DispatchStats::default());
        let (status_tx, _) = watch::channel(ConnectionStatus::Connecting);
        let (stop_tx, _) = watch::channel(false);
        let (kick_tx, kick_rx) = watch::channel(0u64);

        let (dispatcher, dispatch_task) = Dispatcher::spawn(
            registry.clone(),
            options.event_queue_size,
            options.max_concurrent_handlers,
            stats.clone(),
        );

        let inner = Arc::new(Inner {
            command_timeout_ms: AtomicU64::new(options.command_timeout_ms),
            options,
            registry,
            dialer,
            writer: Mutex::new(None),
            pending_reply: Mutex::new(None),
            runtime_filters: Mutex::new(Vec::new()),
            status_tx,
            stop_tx,
            kick_tx,
            stats,
            tasks: Mutex::new(Vec::new()),
        });

        info!(
            "[CONNECT] Connecting to FreeSWITCH at {}",
            inner.options.address
        );
        let reader = inner
            .establish(inner.options.reconnects, &dispatcher)
            .await?;

        let reader_task = tokio::spawn(reader_loop(inner.clone(), reader, kick_rx, dispatcher));
        inner
            .tasks
            .lock()
            .await
            .extend([reader_task, dispatch_task]);

        Ok(Self {
            _guard: Arc::new(StopGuard(inner.clone())),
            inner,
        })
    }

    /// Send a command and wait for its reply.
    ///
    /// The reply is returned as-is, `-ERR` included. Fails with
    /// [`EslError::NotConnected`] while the session is reconnecting or gone.
    ///
    /// On [`EslError::Timeout`] the socket is dropped and the reader dials
    /// again, since the reply can no longer be matched to its command.
    pub async fn send_command(&self, command: EslCommand) -> EslResult<EslReply> {
        if self
            .inner
            .is_stopped()
        {
            return Err(EslError::Shutdown);
        }
        let command_str = command.to_wire_format()?;

        // Lock writer: serializes concurrent commands and holds through reply.
        let mut writer = self
            .inner
            .writer
            .lock()
            .await;
        let Some(stream) = writer.as_mut() else {
            return Err(EslError::NotConnected);
        };

        let (tx, rx) = oneshot::channel();
        {
            let mut pending = self
                .inner
                .pending_reply
                .lock()
                .await;
            // The reader flips the status before failing the slot, so a
            // waiter registered here is always seen by it.
            if !self
                .inner
                .is_connected()
            {
                return Err(EslError::NotConnected);
            }
            *pending = Some(tx);
        }

        debug!("Sending command: {}", command.describe());
        if let Err(e) = stream
            .write_all(command_str.as_bytes())
            .await
        {
            self.inner
                .fail_pending()
                .await;
            return Err(EslError::Io(e));
        }

        let timeout_ms = self
            .inner
            .command_timeout_ms();
        let frame = match timeout(Duration::from_millis(timeout_ms), rx).await {
            Ok(Ok(frame)) => frame,
            Ok(Err(_)) => return Err(EslError::ConnectionClosed),
            Err(_) => {
                // a late reply would be taken as the next command's
                self.inner
                    .pending_reply
                    .lock()
                    .await
                    .take();
                if let Some(mut stream) = writer.take() {
                    if let Err(e) = stream
                        .shutdown()
                        .await
                    {
                        trace!("[CONNECT] shutdown after timeout failed: {}", e);
                    }
                }
                self.inner
                    .kick();
                warn!(
                    "Command timed out after {}ms, dropping connection: {}",
                    timeout_ms,
                    command.describe()
                );
                return Err(EslError::Timeout { timeout_ms });
            }
        };
        drop(writer);

        let reply = frame.into_reply();
        debug!("Received reply: success={}", reply.is_success());
        Ok(reply)
    }

    /// Send a raw command line.
    ///
    /// Fails with [`EslError::CommandFailed`] when either the Reply-Text or
    /// the body carries `-ERR`.
    pub async fn send_raw(&self, line: &str) -> EslResult<EslReply> {
        let reply = self
            .send_command(EslCommand::Raw {
                line: line.to_string(),
            })
            .await?
            .into_result()?;
        if let Some(body) = reply
            .body()
            .filter(|b| b.contains(REPLY_ERR))
        {
            return Err(EslError::CommandFailed {
                reply_text: body
                    .trim_end()
                    .to_string(),
            });
        }
        Ok(reply)
    }

    /// Run an `api` command and return its output.
    ///
    /// FreeSWITCH holds the socket until the command completes; no events
    /// are read meanwhile. Use [`bgapi`](Self::bgapi) for slow commands.
    pub async fn api(&self, command: &str) -> EslResult<String> {
        self.send_command(EslCommand::Api {
            command: command.to_string(),
        })
        .await?
        .into_api_body()
    }

    /// Start a background job and return its `Job-UUID`.
    ///
    /// The result arrives later as a `BACKGROUND_JOB` event carrying the
    /// same `Job-UUID`.
    pub async fn bgapi(&self, command: &str) -> EslResult<String> {
        let reply = self
            .send_command(EslCommand::BgApi {
                command: command.to_string(),
            })
            .await?
            .into_result()?;
        reply
            .job_uuid()
            .or_else(|| {
                reply
                    .reply_text()
                    .and_then(|text| text.strip_prefix("+OK Job-UUID: "))
            })
            .map(|uuid| {
                uuid.trim()
                    .to_string()
            })
            .ok_or_else(|| EslError::protocol_error("bgapi reply without Job-UUID"))
    }

    /// Send a message to a channel (`sendmsg <uuid>`).
    pub async fn send_msg(&self, uuid: &str, headers: &[(&str, &str)]) -> EslResult<EslReply> {
        self.send_command(EslCommand::SendMsg {
            uuid: uuid.to_string(),
            headers: headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.to_string()))
                .collect(),
        })
        .await?
        .into_result()
    }

    /// Hang up a channel through `sendmsg`.
    pub async fn hangup(&self, uuid: &str, cause: Option<&str>) -> EslResult<()> {
        let mut headers = vec![("call-command", "hangup")];
        if let Some(cause) = cause {
            headers.push(("hangup-cause", cause));
        }
        self.send_msg(uuid, &headers)
            .await
            .map(|_| ())
    }

    /// Add an event filter now and on every reconnect.
    pub async fn filter(&self, header: &str, value: &str) -> EslResult<()> {
        self.send_command(EslCommand::Filter {
            header: header.to_string(),
            value: value.to_string(),
        })
        .await?
        .into_result()?;

        let pair = (header.to_string(), value.to_string());
        let mut filters = self
            .inner
            .runtime_filters
            .lock()
            .await;
        if !filters.contains(&pair) {
            filters.push(pair);
        }
        debug!("Set event filter: {} = {}", header, value);
        Ok(())
    }

    /// Send a no-op command (keepalive).
    pub async fn noop(&self) -> EslResult<()> {
        self.send_command(EslCommand::NoOp)
            .await?
            .into_result()
            .map(|_| ())
    }

    /// Drop the current socket.
    ///
    /// A command waiting for its reply fails with
    /// [`EslError::ConnectionClosed`]; the reader then dials again as it
    /// would after a network failure.
    pub async fn disconnect(&self) {
        info!("Client requested disconnect");
        self.inner
            .kick();
        self.inner
            .fail_pending()
            .await;
        self.inner
            .teardown()
            .await;
    }

    /// Stop the session for good.
    ///
    /// Closes the socket, stops the reader, and waits for handlers that are
    /// already running to finish.
    pub async fn shutdown(&self) {
        info!("Client requested shutdown");
        self.inner
            .stop_tx
            .send_replace(true);
        self.inner
            .fail_pending()
            .await;

        let tasks = std::mem::take(
            &mut *self
                .inner
                .tasks
                .lock()
                .await,
        );
        for task in tasks {
            if let Err(e) = task.await {
                warn!("session task ended abnormally: {}", e);
            }
        }
    }

    /// Resolves once the session has stopped, with the reason.
    pub async fn closed(&self) -> DisconnectReason {
        let mut rx = self.status_receiver();
        let status = match rx
            .wait_for(ConnectionStatus::is_terminal)
            .await
        {
            Ok(status) => status.clone(),
            Err(_) => return DisconnectReason::ClientShutdown,
        };
        match status {
            ConnectionStatus::Disconnected(reason) => reason,
            _ => DisconnectReason::ClientShutdown,
        }
    }

    /// Whether the session is authenticated and ready for commands.
    pub fn is_connected(&self) -> bool {
        self.inner
            .is_connected()
    }

    /// Current status snapshot.
    pub fn status(&self) -> ConnectionStatus {
        self.inner
            .status_tx
            .borrow()
            .clone()
    }

    /// Watch channel following status changes.
    pub fn status_receiver(&self) -> watch::Receiver<ConnectionStatus> {
        self.inner
            .status_tx
            .subscribe()
    }

    /// Set command response timeout (default: 5 seconds).
    pub fn set_command_timeout(&self, duration: Duration) {
        self.inner
            .command_timeout_ms
            .store(
                u64::try_from(duration.as_millis()).unwrap_or(u64::MAX),
                Ordering::Relaxed,
            );
    }

    /// Number of events dropped due to a full event queue.
    pub fn dropped_event_count(&self) -> u64 {
        self.inner
            .stats
            .dropped()
    }

    /// Number of handler invocations that panicked.
    pub fn handler_failure_count(&self) -> u64 {
        self.inner
            .stats
            .failures()
    }

    /// Index handed to handlers with each event.
    pub fn conn_id(&self) -> usize {
        self.inner
            .options
            .conn_id
    }

    /// Log label: the configured alias, or the address.
    pub fn alias(&self) -> &str {
        self.inner
            .options
            .label()
    }

    pub fn options(&self) -> &SessionOptions {
        &self.inner.options
    }
}

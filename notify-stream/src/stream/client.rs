//! Resilient event stream client.
//!
//! [`EventStreamClient`] is a handle to an actor task that owns the push
//! connection. The task is driven by three inputs in priority order:
//!
//! 1. **Commands** from the handle (`connect`, `close`, visibility, ...).
//!    Every command is acknowledged once it has taken effect, so when
//!    `close().await` returns the connection is gone and no timer is armed.
//! 2. **The connection**: either the opening future (credential + HTTP
//!    request) or the live frame stream.
//! 3. **Timers**: the reconnect timer and the liveness watchdog.
//!
//! # Example
//! ```rust,ignore
//! let client = EventStreamClient::builder(url, dispatcher)
//!     .config(StreamConfig::default())
//!     .build()?;
//!
//! let mut events = client.subscribe();
//! while let Some(event) = events.recv().await {
//!     store.apply(&event);
//! }
//! ```

use super::backoff::ReconnectBackoff;
use super::event::{ReadyState, StreamEvent};
use super::id::ConnectionId;
use super::sse::SseFrame;
use super::state::{ClientStatus, ConnectionState, Visibility};
use super::subscriber::EventSubscriber;
use super::transport::{EventSource, HttpTransport, Transport};
use crate::config::{ConfigValidationError, StreamConfig};
use crate::credential::{BearerToken, CredentialDispatcher};
use crate::error::{ClientError, CredentialError, ErrorCode, TransportError};
use crate::logging::{StreamLogEvent, log_stream_event};
use futures::StreamExt;
use futures::future::{BoxFuture, FutureExt};
use reqwest::Url;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

const COMMAND_BUFFER: usize = 32;

/// Query parameter carrying the credential.
pub const TOKEN_PARAM: &str = "token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CommandKind {
    Connect,
    Close,
    SetEnabled(bool),
    SetAuthenticated(bool),
    SetVisibility(Visibility),
    Shutdown,
}

struct Command {
    kind: CommandKind,
    ack: oneshot::Sender<()>,
}

// =============================================================================
// Builder
// =============================================================================

/// Builder for [`EventStreamClient`].
#[must_use]
pub struct ClientBuilder {
    url: Url,
    dispatcher: CredentialDispatcher,
    transport: Option<Arc<dyn Transport>>,
    config: StreamConfig,
    enabled: bool,
    authenticated: bool,
    visibility: Visibility,
}

impl ClientBuilder {
    /// Start building a client for the stream at `url`.
    pub fn new(url: Url, dispatcher: CredentialDispatcher) -> Self {
        Self {
            url,
            dispatcher,
            transport: None,
            config: StreamConfig::default(),
            enabled: true,
            authenticated: true,
            visibility: Visibility::Visible,
        }
    }

    /// Use a custom transport. Defaults to [`HttpTransport`].
    pub fn transport(self, transport: impl Transport + 'static) -> Self {
        self.shared_transport(Arc::new(transport))
    }

    /// Use a shared transport.
    pub fn shared_transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Set the client configuration.
    pub fn config(mut self, config: StreamConfig) -> Self {
        self.config = config;
        self
    }

    /// Whether the consumer wants a connection at all (default: true).
    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Whether a user session exists (default: true).
    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }

    /// Initial page visibility (default: visible).
    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    /// Validate the configuration and start the client task.
    ///
    /// Must be called within a tokio runtime. When the client may connect,
    /// the first attempt is made after `mount_delay`.
    pub fn build(self) -> Result<EventStreamClient, ConfigValidationError> {
        self.config.validate()?;

        let (events, _) = broadcast::channel(self.config.event_buffer);
        let (commands_tx, commands_rx) = mpsc::channel(COMMAND_BUFFER);
        let backoff = ReconnectBackoff::from_config(&self.config);
        let (status_tx, status_rx) = watch::channel(ClientStatus {
            retry_delay: backoff.current(),
            ..ClientStatus::default()
        });

        let mut driver = Driver {
            url: self.url,
            dispatcher: self.dispatcher,
            transport: self
                .transport
                .unwrap_or_else(|| Arc::new(HttpTransport::new())),
            events: events.clone(),
            status: status_tx,
            backoff,
            state: ConnectionState::Idle,
            connection: None,
            retry_at: None,
            idle_deadline: None,
            enabled: self.enabled,
            authenticated: self.authenticated,
            visibility: self.visibility,
            force_refresh: false,
            error: None,
            config: self.config,
        };
        if driver.should_connect() {
            driver.retry_at = Some(Instant::now() + driver.config.mount_delay);
        }

        let task = tokio::spawn(driver.run(commands_rx));
        Ok(EventStreamClient {
            commands: commands_tx,
            events,
            status: status_rx,
            task,
        })
    }
}

// =============================================================================
// Client Handle
// =============================================================================

/// Handle to a running event stream client.
///
/// Dropping the handle aborts the client task.
pub struct EventStreamClient {
    commands: mpsc::Sender<Command>,
    events: broadcast::Sender<StreamEvent>,
    status: watch::Receiver<ClientStatus>,
    task: JoinHandle<()>,
}

impl std::fmt::Debug for EventStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventStreamClient")
            .field("status", &*self.status.borrow())
            .finish_non_exhaustive()
    }
}

impl EventStreamClient {
    /// Start building a client.
    pub fn builder(url: Url, dispatcher: CredentialDispatcher) -> ClientBuilder {
        ClientBuilder::new(url, dispatcher)
    }

    /// Subscribe to stream events. Only events published after this call
    /// are received.
    pub fn subscribe(&self) -> EventSubscriber {
        EventSubscriber::new(self.events.subscribe())
    }

    /// Current status.
    pub fn status(&self) -> ClientStatus {
        self.status.borrow().clone()
    }

    /// Watch status changes.
    pub fn watch_status(&self) -> watch::Receiver<ClientStatus> {
        self.status.clone()
    }

    /// Open a connection now unless one exists. Cancels a pending retry.
    pub async fn connect(&self) -> Result<(), ClientError> {
        self.send(CommandKind::Connect).await
    }

    /// Drop the connection and cancel pending timers.
    pub async fn close(&self) -> Result<(), ClientError> {
        self.send(CommandKind::Close).await
    }

    /// Enable or disable the connection. Disabling closes it; enabling
    /// schedules a connection after `mount_delay`.
    pub async fn set_enabled(&self, enabled: bool) -> Result<(), ClientError> {
        self.send(CommandKind::SetEnabled(enabled)).await
    }

    /// Report whether a user session exists. Behaves like
    /// [`set_enabled`](Self::set_enabled).
    pub async fn set_authenticated(&self, authenticated: bool) -> Result<(), ClientError> {
        self.send(CommandKind::SetAuthenticated(authenticated)).await
    }

    /// Report page visibility. Hiding keeps an open connection; becoming
    /// visible reconnects immediately if there is no connection.
    pub async fn set_visibility(&self, visibility: Visibility) -> Result<(), ClientError> {
        self.send(CommandKind::SetVisibility(visibility)).await
    }

    /// Close everything and stop the client task. Terminal.
    pub async fn shutdown(&self) -> Result<(), ClientError> {
        self.send(CommandKind::Shutdown).await
    }

    /// Whether the client task is still running.
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    async fn send(&self, kind: CommandKind) -> Result<(), ClientError> {
        let (ack, done) = oneshot::channel();
        self.commands
            .send(Command { kind, ack })
            .await
            .map_err(|_| ClientError::Shutdown)?;
        done.await.map_err(|_| ClientError::Shutdown)
    }
}

impl Drop for EventStreamClient {
    fn drop(&mut self) {
        self.task.abort();
    }
}

// =============================================================================
// Driver
// =============================================================================

enum OpenError {
    Credential(CredentialError),
    Transport(TransportError),
}

enum Connection {
    Opening {
        id: ConnectionId,
        future: BoxFuture<'static, Result<EventSource, OpenError>>,
    },
    Live {
        id: ConnectionId,
        source: EventSource,
    },
}

impl Connection {
    fn id(&self) -> ConnectionId {
        match self {
            Self::Opening { id, .. } | Self::Live { id, .. } => *id,
        }
    }
}

enum ConnectionEvent {
    Opened(Result<EventSource, OpenError>),
    Frame(Option<Result<SseFrame, TransportError>>),
}

enum Wake {
    Command(Option<Command>),
    Connection(ConnectionEvent),
    RetryDue,
    IdleTimeout,
}

struct Driver {
    url: Url,
    config: StreamConfig,
    dispatcher: CredentialDispatcher,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<StreamEvent>,
    status: watch::Sender<ClientStatus>,
    backoff: ReconnectBackoff,
    state: ConnectionState,
    connection: Option<Connection>,
    retry_at: Option<Instant>,
    idle_deadline: Option<Instant>,
    enabled: bool,
    authenticated: bool,
    visibility: Visibility,
    force_refresh: bool,
    error: Option<CredentialError>,
}

impl Driver {
    async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        self.publish_status();
        loop {
            let wake = tokio::select! {
                biased;
                command = commands.recv() => Wake::Command(command),
                event = poll_connection(&mut self.connection) => Wake::Connection(event),
                _ = wait_until(self.retry_at) => Wake::RetryDue,
                _ = wait_until(self.idle_deadline) => Wake::IdleTimeout,
            };

            match wake {
                Wake::Command(Some(Command { kind, ack })) => {
                    self.handle_command(kind);
                    let _ = ack.send(());
                    if kind == CommandKind::Shutdown {
                        break;
                    }
                }
                Wake::Command(None) => {
                    self.handle_command(CommandKind::Shutdown);
                    break;
                }
                Wake::Connection(ConnectionEvent::Opened(result)) => self.on_opened(result),
                Wake::Connection(ConnectionEvent::Frame(Some(Ok(frame)))) => self.on_frame(frame),
                Wake::Connection(ConnectionEvent::Frame(Some(Err(err)))) => {
                    self.on_transport_error(err)
                }
                Wake::Connection(ConnectionEvent::Frame(None)) => {
                    self.on_transport_error(TransportError::Closed)
                }
                Wake::RetryDue => {
                    self.retry_at = None;
                    self.try_connect(false);
                }
                Wake::IdleTimeout => {
                    let timeout = self.config.idle_timeout.unwrap_or_default();
                    self.on_transport_error(TransportError::IdleTimeout(timeout));
                }
            }
        }
    }

    fn handle_command(&mut self, kind: CommandKind) {
        match kind {
            CommandKind::Connect => self.try_connect(true),
            CommandKind::Close => self.teardown("closed"),
            CommandKind::SetEnabled(enabled) => {
                if self.enabled != enabled {
                    self.enabled = enabled;
                    self.gate_changed();
                }
            }
            CommandKind::SetAuthenticated(authenticated) => {
                if self.authenticated != authenticated {
                    self.authenticated = authenticated;
                    self.gate_changed();
                }
            }
            CommandKind::SetVisibility(visibility) => {
                self.visibility = visibility;
                if visibility == Visibility::Visible && self.connection.is_none() {
                    self.retry_at = None;
                    self.try_connect(false);
                }
            }
            CommandKind::Shutdown => {
                self.teardown("shutdown");
                self.set_state(ConnectionState::Closed);
                self.publish_status();
            }
        }
    }

    fn should_connect(&self) -> bool {
        self.enabled && self.authenticated && self.visibility == Visibility::Visible
    }

    fn gate_changed(&mut self) {
        if !(self.enabled && self.authenticated) {
            self.teardown("disabled");
            return;
        }
        if self.connection.is_none() && self.should_connect() {
            self.retry_at = Some(Instant::now() + self.config.mount_delay);
            self.publish_status();
        }
    }

    // `explicit` attempts come from `connect()` and ignore visibility.
    fn try_connect(&mut self, explicit: bool) {
        if self.connection.is_some() || self.state.is_terminal() {
            return;
        }
        let allowed = if explicit {
            self.enabled && self.authenticated
        } else {
            self.should_connect()
        };
        if !allowed {
            return;
        }

        let id = ConnectionId::new();
        let future = open_connection(
            self.dispatcher.clone(),
            Arc::clone(&self.transport),
            self.url.clone(),
            id,
            std::mem::take(&mut self.force_refresh),
        )
        .boxed();

        self.retry_at = None;
        self.connection = Some(Connection::Opening { id, future });
        self.touch();
        self.set_state(ConnectionState::Connecting);
        self.publish_status();
    }

    fn on_opened(&mut self, result: Result<EventSource, OpenError>) {
        let Some(id) = self.connection.as_ref().map(Connection::id) else {
            return;
        };
        match result {
            Ok(source) => {
                self.connection = Some(Connection::Live { id, source });
                self.touch();
            }
            Err(OpenError::Credential(err)) => {
                let (code, message) = (err.code(), err.to_string());
                self.error = Some(err);
                self.fail(code, message);
            }
            Err(OpenError::Transport(err)) => self.on_transport_error(err),
        }
    }

    fn on_frame(&mut self, frame: SseFrame) {
        self.touch();
        let id = self.connection.as_ref().map(|c| c.id().to_string());
        let id = id.as_deref();

        let event = match StreamEvent::from_frame(&frame) {
            Ok(event) => event,
            Err(err) => {
                log_stream_event(
                    id,
                    StreamLogEvent::EventDropped {
                        event_type: err.event_type,
                        reason: err.reason,
                    },
                );
                return;
            }
        };

        match &event {
            StreamEvent::Connected { .. } => {
                log_stream_event(id, StreamLogEvent::Connected);
                self.backoff.reset();
                self.error = None;
                self.force_refresh = false;
                self.set_state(ConnectionState::Open);
                self.publish(event);
                self.publish_status();
            }
            StreamEvent::ReconnectRequested => {
                log_stream_event(id, StreamLogEvent::ReconnectRequested);
                self.publish(event);
                self.drop_connection("reconnect requested");
                if self.should_connect() {
                    self.retry_at = Some(Instant::now() + self.config.graceful_reconnect_delay);
                }
                self.publish_status();
            }
            StreamEvent::Heartbeat => {
                log_stream_event(id, StreamLogEvent::Heartbeat);
                self.publish(event);
            }
            StreamEvent::Message { event_type, .. } => {
                log_stream_event(
                    id,
                    StreamLogEvent::EventDelivered {
                        event_type: event_type.clone(),
                    },
                );
                self.publish(event);
            }
            StreamEvent::Error { .. } => {}
        }
    }

    fn on_transport_error(&mut self, err: TransportError) {
        if err == TransportError::Unauthorized {
            self.force_refresh = true;
        }
        self.fail(err.code(), err.to_string());
    }

    fn fail(&mut self, code: ErrorCode, message: String) {
        let id = self.connection.as_ref().map(|c| c.id().to_string());
        log_stream_event(
            id.as_deref(),
            StreamLogEvent::Error {
                code: code.to_string(),
                message,
            },
        );

        self.connection = None;
        self.idle_deadline = None;
        self.set_state(ConnectionState::Idle);
        self.publish(StreamEvent::Error {
            ready_state: ReadyState::Closed,
        });

        if self.should_connect() {
            let delay = self.backoff.next_delay();
            self.retry_at = Some(Instant::now() + delay);
            log_stream_event(
                id.as_deref(),
                StreamLogEvent::RetryScheduled {
                    delay_ms: delay.as_millis() as u64,
                    failures: self.backoff.failures(),
                },
            );
        }
        self.publish_status();
    }

    fn drop_connection(&mut self, reason: &'static str) {
        if let Some(connection) = self.connection.take() {
            log_stream_event(
                Some(&connection.id().to_string()),
                StreamLogEvent::Closed { reason },
            );
        }
        self.idle_deadline = None;
        self.set_state(ConnectionState::Idle);
    }

    fn teardown(&mut self, reason: &'static str) {
        self.drop_connection(reason);
        self.retry_at = None;
        self.publish_status();
    }

    fn touch(&mut self) {
        self.idle_deadline = self
            .config
            .idle_timeout
            .map(|timeout| Instant::now() + timeout);
    }

    fn set_state(&mut self, next: ConnectionState) {
        if self.state == next {
            return;
        }
        if !self.state.can_transition_to(next) {
            tracing::warn!(from = %self.state, to = %next, "Ignoring invalid connection state transition");
            return;
        }
        self.state = next;
    }

    fn publish(&self, event: StreamEvent) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    fn publish_status(&self) {
        let status = ClientStatus {
            state: self.state,
            is_connected: self.state == ConnectionState::Open,
            retry_delay: self.backoff.current(),
            consecutive_failures: self.backoff.failures(),
            connection_id: self.connection.as_ref().map(Connection::id),
            error: self.error.clone(),
        };
        self.status.send_if_modified(|current| {
            if *current == status {
                false
            } else {
                *current = status;
                true
            }
        });
    }
}

async fn open_connection(
    dispatcher: CredentialDispatcher,
    transport: Arc<dyn Transport>,
    base: Url,
    id: ConnectionId,
    force_refresh: bool,
) -> Result<EventSource, OpenError> {
    let credential = dispatcher
        .get_token(force_refresh)
        .await
        .map_err(OpenError::Credential)?;
    let url = stream_url(&base, credential.token());
    log_stream_event(
        Some(&id.to_string()),
        StreamLogEvent::Connecting {
            url: url.to_string(),
        },
    );
    transport.open(&url).await.map_err(OpenError::Transport)
}

async fn poll_connection(connection: &mut Option<Connection>) -> ConnectionEvent {
    match connection {
        Some(Connection::Opening { future, .. }) => ConnectionEvent::Opened(future.await),
        Some(Connection::Live { source, .. }) => ConnectionEvent::Frame(source.next().await),
        None => std::future::pending().await,
    }
}

async fn wait_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// `base` with its `token` parameter set to the credential.
pub fn stream_url(base: &Url, token: &BearerToken) -> Url {
    let retained: Vec<(String, String)> = base
        .query_pairs()
        .filter(|(key, _)| key != TOKEN_PARAM)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();

    let mut url = base.clone();
    url.query_pairs_mut()
        .clear()
        .extend_pairs(retained)
        .append_pair(TOKEN_PARAM, token.expose());
    url
}

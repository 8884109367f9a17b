//! Test doubles shared by the test modules.

use crate::credential::{AcquireOptions, CredentialSource, IssuedToken};
use crate::error::{SourceError, TransportError};
use crate::stream::{EventSource, SseFrame, Transport};
use async_trait::async_trait;
use reqwest::Url;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Maximum difference accepted between a measured and an expected delay.
pub const TOLERANCE: Duration = Duration::from_millis(5);

pub fn assert_close(actual: Duration, expected: Duration) {
    let diff = if actual > expected {
        actual - expected
    } else {
        expected - actual
    };
    assert!(
        diff <= TOLERANCE,
        "expected {:?}, got {:?}",
        expected,
        actual
    );
}

// =============================================================================
// Scripted credential source
// =============================================================================

#[derive(Debug, Clone)]
pub enum Outcome {
    Token(IssuedToken),
    Fail(SourceError),
    Hang,
}

/// Credential source that plays back a script, then issues `tok-N` tokens
/// where N is the call number.
#[derive(Debug, Default)]
pub struct ScriptedSource {
    script: Mutex<VecDeque<Outcome>>,
    delay: Duration,
    calls: AtomicU32,
    options: Mutex<Vec<AcquireOptions>>,
}

impl ScriptedSource {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_delay(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            ..Self::default()
        })
    }

    pub fn scripted(outcomes: impl IntoIterator<Item = Outcome>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(outcomes.into_iter().collect()),
            ..Self::default()
        })
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn options(&self) -> Vec<AcquireOptions> {
        self.options.lock().unwrap().clone()
    }
}

impl CredentialSource for ScriptedSource {
    fn acquire(
        &self,
        options: AcquireOptions,
    ) -> Pin<Box<dyn Future<Output = Result<IssuedToken, SourceError>> + Send + '_>> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.options.lock().unwrap().push(options);
        let outcome = self.script.lock().unwrap().pop_front();
        Box::pin(async move {
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            match outcome {
                Some(Outcome::Token(issued)) => Ok(issued),
                Some(Outcome::Fail(err)) => Err(err),
                Some(Outcome::Hang) => std::future::pending().await,
                None => Ok(IssuedToken::new(format!("tok-{call}"))),
            }
        })
    }
}

// =============================================================================
// Mock transport
// =============================================================================

type FrameSender = mpsc::UnboundedSender<Result<SseFrame, TransportError>>;

#[derive(Default)]
struct MockState {
    opens: Vec<(Instant, Url)>,
    failures: VecDeque<TransportError>,
    fail_always: Option<TransportError>,
    sessions: Vec<FrameSender>,
}

/// Transport whose connections are channels driven by the test.
///
/// Successful opens immediately deliver a `connected` frame.
#[derive(Clone)]
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
    opened: Arc<watch::Sender<usize>>,
}

impl MockTransport {
    pub fn new() -> Self {
        let (opened, _) = watch::channel(0);
        Self {
            state: Arc::default(),
            opened: Arc::new(opened),
        }
    }

    pub fn fail_next(&self, err: TransportError) {
        self.state.lock().unwrap().failures.push_back(err);
    }

    pub fn fail_always(&self, err: TransportError) {
        self.state.lock().unwrap().fail_always = Some(err);
    }

    pub fn stop_failing(&self) {
        let mut state = self.state.lock().unwrap();
        state.fail_always = None;
        state.failures.clear();
    }

    pub fn open_count(&self) -> usize {
        self.state.lock().unwrap().opens.len()
    }

    pub fn open_times(&self) -> Vec<Instant> {
        self.state.lock().unwrap().opens.iter().map(|(at, _)| *at).collect()
    }

    pub fn urls(&self) -> Vec<Url> {
        self.state.lock().unwrap().opens.iter().map(|(_, url)| url.clone()).collect()
    }

    /// Sessions whose receiving side is still held by the client.
    pub fn live_sessions(&self) -> usize {
        self.state
            .lock()
            .unwrap()
            .sessions
            .iter()
            .filter(|session| !session.is_closed())
            .count()
    }

    pub fn push(&self, frame: SseFrame) {
        if let Some(session) = self.state.lock().unwrap().sessions.last() {
            let _ = session.send(Ok(frame));
        }
    }

    pub fn push_error(&self, err: TransportError) {
        if let Some(session) = self.state.lock().unwrap().sessions.last() {
            let _ = session.send(Err(err));
        }
    }

    /// End the latest session as if the server closed the response.
    pub fn end_latest(&self) {
        self.state.lock().unwrap().sessions.pop();
    }

    pub async fn wait_for_opens(&self, count: usize) {
        let mut opened = self.opened.subscribe();
        opened
            .wait_for(|opens| *opens >= count)
            .await
            .expect("mock transport dropped");
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn open(&self, url: &Url) -> Result<EventSource, TransportError> {
        let result = {
            let mut state = self.state.lock().unwrap();
            state.opens.push((Instant::now(), url.clone()));
            if let Some(err) = state.fail_always.clone() {
                Err(err)
            } else if let Some(err) = state.failures.pop_front() {
                Err(err)
            } else {
                let (tx, rx) = mpsc::unbounded_channel();
                let _ = tx.send(Ok(SseFrame::new("connected", r#"{"userId":"u1"}"#)));
                state.sessions.push(tx);
                Ok(Box::pin(UnboundedReceiverStream::new(rx)) as EventSource)
            }
        };
        self.opened.send_modify(|opens| *opens += 1);
        result
    }
}

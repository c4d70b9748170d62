//! Self-healing job update stream.
//!
//! [`UpdateStream`] keeps one server-sent events connection to
//! `{API_BASE}/jobs/stream` open for the lifetime of a session. Each
//! `job_update` event carries a JSON array of [`JobUpdate`]s; every record is
//! upserted into the shared [`JobStore`], status changes to `completed` or
//! `failed` are reported through the [`NotificationSink`], and the batch is
//! published to every [`JobUpdateStream`] handed out by
//! [`UpdateStream::subscribe`].
//!
//! # Lifecycle
//!
//! ```text
//! Disconnected --init()--> Connecting --open--> Connected
//!                               ^                   |
//!                               |              error / end
//!                          reconnect delay          v
//!                               +-------------- Errored
//!
//! any state --disconnect()--> Disconnected
//! ```
//!
//! Each connection attempt gets a generation number. Errors reported by a task
//! whose generation is no longer current are ignored, so a late failure from a
//! superseded connection can never schedule a second reconnect.
//!
//! Dropping the last [`UpdateStream`] handle behaves like
//! [`disconnect`](UpdateStream::disconnect): the connection task and any pending
//! reconnect are aborted, and subscribers see the end of their stream.
//!
//! # Examples
//!
//! ```ignore
//! use futures::StreamExt;
//!
//! let updates = context.updates();
//! let mut batches = updates.subscribe();
//! updates.init().await;
//!
//! while let Some(batch) = batches.next().await {
//!     println!("{} jobs changed, {} active", batch.len(), context.jobs().active_count());
//! }
//! ```

use crate::client::config::ClientConfig;
use crate::client::parser::EventParser;
use crate::error::{ClientError, Result};
use crate::notify::{NotificationSink, Severity, DEFAULT_DURATION, FAILURE_DURATION};
use crate::protocol::constants;
use crate::session::{Session, SessionProvider};
use crate::store::JobStore;
use crate::types::{JobStatus, JobUpdate};
use futures::{Stream, StreamExt};
use http::header::{ACCEPT, CACHE_CONTROL};
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use url::Url;

/// Connection state of the update stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamState {
    /// No connection and none scheduled.
    Disconnected,
    /// Request sent, waiting for the response head.
    Connecting,
    /// Receiving events.
    Connected,
    /// Connection lost; one reconnect is scheduled.
    Errored,
}

#[derive(Debug)]
struct Connection {
    state: StreamState,
    generation: u64,
    task: Option<JoinHandle<()>>,
    reconnect: Option<JoinHandle<()>>,
    last_event_id: Option<String>,
}

struct Inner {
    http: reqwest::Client,
    config: Arc<ClientConfig>,
    session: Arc<dyn SessionProvider>,
    store: JobStore,
    notifier: Arc<dyn NotificationSink>,
    batches: broadcast::Sender<Vec<JobUpdate>>,
    conn: Mutex<Connection>,
}

/// Supervised client for the job update stream.
///
/// Cloning yields another handle to the same connection.
#[derive(Clone)]
pub struct UpdateStream {
    inner: Arc<Inner>,
    _owner: Arc<Owner>,
}

/// Shared by every handle; shuts the supervisor down when the last one goes.
struct Owner {
    inner: Arc<Inner>,
}

impl Drop for Owner {
    fn drop(&mut self) {
        self.inner.shutdown();
    }
}

impl UpdateStream {
    /// Create a disconnected stream client.
    pub fn new(
        http: reqwest::Client,
        config: Arc<ClientConfig>,
        session: Arc<dyn SessionProvider>,
        store: JobStore,
        notifier: Arc<dyn NotificationSink>,
    ) -> Self {
        let (batches, _) = broadcast::channel(config.stream_buffer.max(1));
        let inner = Arc::new(Inner {
            http,
            config,
            session,
            store,
            notifier,
            batches,
            conn: Mutex::new(Connection {
                state: StreamState::Disconnected,
                generation: 0,
                task: None,
                reconnect: None,
                last_event_id: None,
            }),
        });
        UpdateStream {
            _owner: Arc::new(Owner { inner: inner.clone() }),
            inner,
        }
    }

    /// Open the connection.
    ///
    /// Returns `true` if a connection attempt was started. Does nothing and
    /// returns `false` unless the stream is `Disconnected`, or when there is
    /// no valid session.
    pub async fn init(&self) -> bool {
        self.inner.connect(StreamState::Disconnected).await
    }

    /// Close the connection and cancel any scheduled reconnect. Idempotent.
    pub fn disconnect(&self) {
        self.inner.shutdown();
    }

    /// Current connection state.
    pub fn state(&self) -> StreamState {
        self.inner.conn.lock().state
    }

    /// Whether a reconnect is waiting on its delay.
    pub fn reconnect_pending(&self) -> bool {
        self.inner.conn.lock().reconnect.is_some()
    }

    /// The store updates are written into.
    pub fn store(&self) -> &JobStore {
        &self.inner.store
    }

    /// Receive every batch applied from now on.
    pub fn subscribe(&self) -> JobUpdateStream {
        JobUpdateStream::new(self.inner.batches.subscribe())
    }
}

impl Inner {
    fn shutdown(&self) {
        let mut conn = self.conn.lock();
        if let Some(task) = conn.task.take() {
            task.abort();
        }
        if let Some(timer) = conn.reconnect.take() {
            timer.abort();
        }
        if conn.state != StreamState::Disconnected {
            tracing::debug!(generation = conn.generation, "update stream disconnected");
        }
        conn.generation += 1;
        conn.state = StreamState::Disconnected;
        conn.last_event_id = None;
    }

    async fn connect(self: &Arc<Self>, from: StreamState) -> bool {
        if self.conn.lock().state != from {
            tracing::debug!(?from, "update stream already active, init ignored");
            return false;
        }

        let session = self.session.current().await;
        if !session.as_ref().map_or(false, Session::is_valid) {
            tracing::debug!("no valid session, update stream stays disconnected");
            let mut conn = self.conn.lock();
            if from == StreamState::Errored && conn.state == StreamState::Errored {
                conn.state = StreamState::Disconnected;
                conn.reconnect = None;
            }
            return false;
        }

        let url = match self.config.endpoint(constants::endpoints::JOB_STREAM) {
            Ok(url) => url,
            Err(err) => {
                tracing::error!(error = %err, "cannot build update stream url");
                return false;
            }
        };

        let mut conn = self.conn.lock();
        if conn.state != from {
            return false;
        }
        conn.generation += 1;
        conn.state = StreamState::Connecting;
        conn.reconnect = None;

        let generation = conn.generation;
        let last_event_id = conn.last_event_id.clone();
        tracing::debug!(generation, %url, "opening update stream");
        conn.task = Some(tokio::spawn(Arc::clone(self).run(generation, url, last_event_id)));
        true
    }

    async fn run(self: Arc<Self>, generation: u64, url: Url, last_event_id: Option<String>) {
        match self.stream_events(generation, url, last_event_id).await {
            Ok(()) => tracing::debug!(generation, "update stream closed by server"),
            Err(err) => tracing::warn!(generation, error = %err, "update stream failed"),
        }
        self.handle_error(generation);
    }

    async fn stream_events(&self, generation: u64, url: Url, last_event_id: Option<String>) -> Result<()> {
        let mut request = self
            .http
            .get(url)
            .header(ACCEPT, constants::EVENT_STREAM_MEDIA_TYPE)
            .header(CACHE_CONTROL, "no-cache");
        if let Some(id) = last_event_id {
            request = request.header(constants::headers::LAST_EVENT_ID, id);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(ClientError::StreamStatus(response.status().as_u16()));
        }
        if !self.mark_connected(generation) {
            return Ok(());
        }

        let mut body = response.bytes_stream();
        let mut parser = EventParser::new();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in parser.feed(&chunk) {
                if event.event == constants::JOB_UPDATE_EVENT {
                    self.apply_batch(&event.data);
                }
            }
            if let Some(id) = parser.last_event_id() {
                let mut conn = self.conn.lock();
                if conn.generation == generation {
                    conn.last_event_id = Some(id.to_string());
                }
            }
        }

        Ok(())
    }

    fn mark_connected(&self, generation: u64) -> bool {
        let mut conn = self.conn.lock();
        if conn.generation != generation || conn.state != StreamState::Connecting {
            return false;
        }
        conn.state = StreamState::Connected;
        tracing::debug!(generation, "update stream connected");
        true
    }

    fn apply_batch(&self, data: &str) {
        let batch: Vec<JobUpdate> = match serde_json::from_str(data) {
            Ok(batch) => batch,
            Err(err) => {
                tracing::warn!(error = %err, "discarding malformed job_update payload");
                return;
            }
        };

        for update in &batch {
            let previous = self.store.upsert(update.clone());
            let changed = previous.map_or(true, |prev| prev.status != update.status);
            if changed {
                self.notify_transition(update);
            }
        }

        // No subscribers is fine.
        let _ = self.batches.send(batch);
    }

    fn notify_transition(&self, update: &JobUpdate) {
        match update.status {
            JobStatus::Completed => {
                self.notifier.add_toast(
                    &format!("{} job completed", update.job_type),
                    Severity::Success,
                    Some(DEFAULT_DURATION),
                );
            }
            JobStatus::Failed => {
                let reason = update.error_message.as_deref().unwrap_or("unknown error");
                self.notifier.add_toast(
                    &format!("{} job failed: {}", update.job_type, reason),
                    Severity::Error,
                    Some(FAILURE_DURATION),
                );
            }
            _ => {}
        }
    }

    fn handle_error(self: &Arc<Self>, generation: u64) {
        let mut conn = self.conn.lock();
        if conn.generation != generation
            || matches!(conn.state, StreamState::Disconnected | StreamState::Errored)
        {
            tracing::debug!(generation, "ignoring error from superseded update stream");
            return;
        }

        conn.state = StreamState::Errored;
        conn.task = None;

        let delay = self.config.reconnect_delay();
        if self.config.enable_logging {
            tracing::warn!(generation, ?delay, "update stream lost, scheduling reconnect");
        }

        let inner = Arc::clone(self);
        conn.reconnect = Some(tokio::spawn(async move {
            sleep(delay).await;
            inner.connect(StreamState::Errored).await;
        }));
    }
}

/// Stream of job update batches.
///
/// Implements [`Stream`], so `StreamExt` combinators apply. A subscriber that
/// falls more than `stream_buffer` batches behind skips the missed batches;
/// the [`JobStore`] still holds their records.
pub struct JobUpdateStream {
    receiver: BroadcastStream<Vec<JobUpdate>>,
}

impl JobUpdateStream {
    fn new(receiver: broadcast::Receiver<Vec<JobUpdate>>) -> Self {
        JobUpdateStream {
            receiver: BroadcastStream::new(receiver),
        }
    }

    /// Receive the next batch. `None` once every [`UpdateStream`] handle is dropped.
    pub async fn next_batch(&mut self) -> Option<Vec<JobUpdate>> {
        self.next().await
    }
}

impl Stream for JobUpdateStream {
    type Item = Vec<JobUpdate>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.receiver).poll_next(cx) {
                Poll::Ready(Some(Ok(batch))) => return Poll::Ready(Some(batch)),
                Poll::Ready(Some(Err(BroadcastStreamRecvError::Lagged(skipped)))) => {
                    tracing::warn!(skipped, "job update subscriber lagged");
                }
                Poll::Ready(None) => return Poll::Ready(None),
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

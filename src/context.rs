//! Application root context.
//!
//! `AppContext` owns the session-wide state (toasts, job records, cookies, the
//! shared transport) and hands the same instances to the request client and
//! the update stream. Nothing lives in a global, so two contexts, for example
//! in two tests, never see each other's state.

use crate::client::{build_http_client, ClientConfig, ResilientClient, UpdateStream};
use crate::error::Result;
use crate::notify::{NotificationSink, ToastStore};
use crate::session::SessionProvider;
use crate::store::JobStore;
use reqwest::cookie::Jar;
use std::sync::Arc;

/// Root owner of the client, the update stream and their shared stores.
pub struct AppContext {
    config: Arc<ClientConfig>,
    cookies: Arc<Jar>,
    toasts: Arc<ToastStore>,
    jobs: JobStore,
    client: ResilientClient,
    updates: UpdateStream,
}

impl AppContext {
    /// Wire a context for `session` using `config`.
    pub fn new(config: ClientConfig, session: Arc<dyn SessionProvider>) -> Result<Self> {
        let config = Arc::new(config);
        let cookies = Arc::new(Jar::default());
        let http = build_http_client(cookies.clone())?;
        let toasts = Arc::new(ToastStore::new());
        let jobs = JobStore::new();
        let notifier: Arc<dyn NotificationSink> = toasts.clone();

        let client = ResilientClient::new(
            http.clone(),
            cookies.clone(),
            config.clone(),
            session.clone(),
            notifier.clone(),
        );
        let updates = UpdateStream::new(http, config.clone(), session, jobs.clone(), notifier);

        tracing::debug!(api_base = %config.api_base, "application context ready");

        Ok(AppContext {
            config,
            cookies,
            toasts,
            jobs,
            client,
            updates,
        })
    }

    /// Wire a context whose API base comes from `API_BASE_URL`.
    pub fn from_env(session: Arc<dyn SessionProvider>) -> Result<Self> {
        Self::new(ClientConfig::from_env()?, session)
    }

    /// Start session-scoped background work. Returns whether the stream started.
    pub async fn start_session(&self) -> bool {
        self.updates.init().await
    }

    /// End the session: close the stream and forget its jobs and toasts.
    pub fn teardown(&self) {
        self.updates.disconnect();
        self.jobs.clear();
        self.toasts.clear();
        tracing::debug!("session state torn down");
    }

    /// The request client.
    pub fn client(&self) -> &ResilientClient {
        &self.client
    }

    /// The update stream client.
    pub fn updates(&self) -> &UpdateStream {
        &self.updates
    }

    /// Job records received this session.
    pub fn jobs(&self) -> &JobStore {
        &self.jobs
    }

    /// Toasts shown this session.
    pub fn toasts(&self) -> &ToastStore {
        &self.toasts
    }

    /// Cookie jar shared by every call.
    pub fn cookies(&self) -> &Arc<Jar> {
        &self.cookies
    }

    /// Active configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }
}

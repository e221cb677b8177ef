//! YouTrack REST client implementation.
//!
//! Every endpoint goes through [`YouTrackClient::request`], which sends one
//! HTTP call through the retry policy, classifies the status and hands back
//! the raw body. Endpoints then decode the body with the entity factory.
//!
//! The client owns its connection pool, a semaphore bounding concurrent
//! calls, the session state and a cancellation token. Entities keep only a
//! [`ClientHandle`] (a weak reference) so they never keep a client alive.

use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{self, HeaderMap, HeaderValue};
use reqwest::{Client, Method, StatusCode};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use super::auth::Credentials;
use super::error::{ApiError, Result};
use super::factory::{self, Entity};
use super::retry::{Reauthenticate, RetryPolicy, DEFAULT_BACKOFF, DEFAULT_MAX_ATTEMPTS};
use super::session::Session;
use super::types::{ChangeList, Issue, IssueList};
use super::xml;

/// Default request timeout in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default cap on concurrent connections.
const DEFAULT_MAX_CONNECTIONS: usize = 10;

/// Path prefix of the REST API.
const REST_PREFIX: &str = "/rest";

/// Request parameters. `None` values are left out of the request.
pub type Params<'a> = Vec<(&'a str, Option<String>)>;

/// Tunables for a [`YouTrackClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Per-request timeout.
    pub timeout: Duration,
    /// Guarded attempts before the final unguarded one.
    pub max_attempts: u32,
    /// Pause after a 504.
    pub backoff: Duration,
    /// Cap on concurrent connections.
    pub max_connections: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff: DEFAULT_BACKOFF,
            max_connections: DEFAULT_MAX_CONNECTIONS,
        }
    }
}

/// What `create_issue` should return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreateOutput {
    /// The `Location` of the new issue.
    #[default]
    Link,
    /// The ID of the new issue (last segment of the location).
    Id,
    /// The new issue, fetched with a second request.
    Issue,
}

/// Result of `create_issue`, shaped by [`CreateOutput`].
#[derive(Debug, Clone)]
pub enum CreatedIssue {
    Link(String),
    Id(String),
    Issue(Issue),
}

/// Fields for a new issue.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub project: String,
    pub summary: String,
    pub description: Option<String>,
    /// User group the issue will be visible to.
    pub permitted_group: Option<String>,
}

impl NewIssue {
    pub fn new(project: &str, summary: &str) -> Self {
        Self {
            project: project.to_string(),
            summary: summary.to_string(),
            ..Self::default()
        }
    }

    fn params(&self) -> Params<'static> {
        vec![
            ("project", Some(self.project.clone())),
            ("summary", Some(self.summary.clone())),
            ("description", self.description.clone()),
            ("permitted_group", self.permitted_group.clone()),
        ]
    }
}

/// A command to apply to an issue, in YouTrack command syntax.
#[derive(Debug, Clone, Default)]
pub struct Command {
    /// The command itself, e.g. "Fixed assignee root".
    pub command: String,
    /// Comment added together with the command.
    pub comment: Option<String>,
    /// Group the comment is visible to.
    pub group: Option<String>,
    pub disable_notifications: bool,
    /// Login of a user to run the command as.
    pub run_as: Option<String>,
}

impl Command {
    pub fn new(command: &str) -> Self {
        Self {
            command: command.to_string(),
            ..Self::default()
        }
    }

    fn params(&self) -> Params<'static> {
        vec![
            ("command", Some(self.command.clone())),
            ("comment", self.comment.clone()),
            ("group", self.group.clone()),
            (
                "disableNotifications",
                self.disable_notifications.then(|| "true".to_string()),
            ),
            ("runAs", self.run_as.clone()),
        ]
    }
}

/// A response whose status was not turned into an error.
#[derive(Debug, Clone)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

/// The YouTrack API client.
///
/// Cheap to clone; clones share the connection pool and session.
#[derive(Debug, Clone)]
pub struct YouTrackClient {
    inner: Arc<ClientInner>,
}

/// Non-owning reference from an entity back to its client.
#[derive(Debug, Clone, Default)]
pub struct ClientHandle {
    inner: Weak<ClientInner>,
}

impl ClientHandle {
    /// A handle that is not attached to any client.
    pub fn detached() -> Self {
        Self::default()
    }

    /// The client, if it is still alive.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::ClientClosed` once the client has been dropped.
    pub fn client(&self) -> Result<YouTrackClient> {
        self.inner
            .upgrade()
            .map(|inner| YouTrackClient { inner })
            .ok_or(ApiError::ClientClosed)
    }
}

#[derive(Debug)]
struct ClientInner {
    http: Client,
    /// Base URL including the `/rest` prefix.
    base_url: String,
    session: Session,
    policy: RetryPolicy,
    connections: Semaphore,
    cancel: CancellationToken,
}

impl Drop for ClientInner {
    fn drop(&mut self) {
        self.cancel.cancel();
        self.session.clear();
    }
}

impl YouTrackClient {
    /// Create a client with default settings.
    ///
    /// Does NOT log in; the first request that is refused triggers a login
    /// with these credentials. Call [`YouTrackClient::connect`] to log in
    /// eagerly.
    pub fn new(url: &str, login: &str, password: &str) -> Result<Self> {
        Self::with_config(url, Some(Credentials::new(login, password)), ClientConfig::default())
    }

    /// Create a client with explicit settings. Without credentials, refused
    /// requests are not retried with a login.
    pub fn with_config(
        url: &str,
        credentials: Option<Credentials>,
        config: ClientConfig,
    ) -> Result<Self> {
        let base_url = normalize_base_url(url)?;
        let http = Self::build_http_client(&config)?;

        info!(base_url = %base_url, "Creating YouTrack client");

        Ok(Self {
            inner: Arc::new(ClientInner {
                http,
                base_url,
                session: Session::with_credentials(credentials),
                policy: RetryPolicy::new(config.max_attempts, config.backoff),
                connections: Semaphore::new(config.max_connections.max(1)),
                cancel: CancellationToken::new(),
            }),
        })
    }

    /// Create a client and log in.
    pub async fn connect(url: &str, login: &str, password: &str) -> Result<Self> {
        let client = Self::new(url, login, password)?;
        client.login(login, password).await?;
        Ok(client)
    }

    /// Build the HTTP client with appropriate settings.
    fn build_http_client(config: &ClientConfig) -> Result<Client> {
        Client::builder()
            .timeout(config.timeout)
            .pool_max_idle_per_host(config.max_connections)
            .build()
            .map_err(ApiError::Network)
    }

    /// Base URL including the `/rest` prefix.
    pub fn base_url(&self) -> &str {
        &self.inner.base_url
    }

    /// A non-owning handle to this client.
    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Token cancelled when the client is closed. Cancelling it aborts
    /// in-flight requests and backoffs.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.inner.cancel.clone()
    }

    /// Whether a login has installed session headers.
    pub fn is_logged_in(&self) -> bool {
        !self.inner.session.snapshot().headers.is_empty()
    }

    /// Abort in-flight requests and forget the session.
    pub fn close(&self) {
        info!("Closing YouTrack client");
        self.inner.cancel.cancel();
        self.inner.session.clear();
    }

    /// Log in with the given credentials, replacing the current session.
    ///
    /// # Errors
    ///
    /// Returns `ApiError::AuthenticationFailed` if the server answers with
    /// anything but 200.
    pub async fn login(&self, login: &str, password: &str) -> Result<()> {
        let _guard = self.inner.session.lock_relogin().await;
        self.inner.login(&Credentials::new(login, password)).await
    }

    /// Log in again with the last used credentials.
    pub async fn relogin(&self) -> Result<()> {
        let credentials = self
            .inner
            .session
            .credentials()
            .ok_or(ApiError::NoCredentials)?;
        let _guard = self.inner.session.lock_relogin().await;
        self.inner.login(&credentials).await
    }

    /// Execute a request against `{base}/rest{path}`.
    ///
    /// Refused requests are retried according to the retry policy. 404 fails
    /// with `NotFound`, 401/403/500/504 (after retries) with `Unauthorized`;
    /// every other status is returned for the caller to interpret.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<RawResponse> {
        let inner = &*self.inner;
        let method = &method;

        tokio::select! {
            biased;
            _ = inner.cancel.cancelled() => Err(ApiError::Cancelled),
            result = inner.policy.run(inner, &inner.cancel, move || {
                inner.request_once(method, path, params)
            }) => result,
        }
    }

    /// Create an issue.
    ///
    /// Returns `None` if the server did not answer 201.
    #[instrument(skip(self, issue), fields(project = %issue.project))]
    pub async fn create_issue(
        &self,
        issue: &NewIssue,
        output: CreateOutput,
    ) -> Result<Option<CreatedIssue>> {
        let response = self.request(Method::PUT, "/issue", &issue.params()).await?;

        if response.status != StatusCode::CREATED.as_u16() {
            warn!(status = response.status, "Issue was not created");
            return Ok(None);
        }

        let link = response
            .headers
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::InvalidResponse("created issue has no location".into()))?
            .to_string();
        let issue_id = issue_id_from_location(&link).to_string();
        debug!(issue_id = %issue_id, "Issue created");

        Ok(match output {
            CreateOutput::Link => Some(CreatedIssue::Link(link)),
            CreateOutput::Id => Some(CreatedIssue::Id(issue_id)),
            CreateOutput::Issue => self.get_issue(&issue_id, false).await?.map(CreatedIssue::Issue),
        })
    }

    /// Get a single issue by ID.
    ///
    /// Returns `None` if the server did not answer 200 or the body is not an issue.
    #[instrument(skip(self))]
    pub async fn get_issue(&self, issue_id: &str, wikify_description: bool) -> Result<Option<Issue>> {
        let params = vec![("wikifyDescription", Some(wikify_description.to_string()))];
        let response = self
            .request(Method::GET, &format!("/issue/{}", issue_id), &params)
            .await?;
        Ok(self.decode(&response)?.and_then(Entity::into_issue))
    }

    /// Update the summary and/or description of an issue.
    #[instrument(skip(self, summary, description))]
    pub async fn update_issue(
        &self,
        issue_id: &str,
        summary: Option<&str>,
        description: Option<&str>,
    ) -> Result<bool> {
        let params = vec![
            ("summary", summary.map(str::to_string)),
            ("description", description.map(str::to_string)),
        ];
        let response = self
            .request(Method::POST, &format!("/issue/{}", issue_id), &params)
            .await?;
        Ok(response.status == StatusCode::OK.as_u16())
    }

    /// Check whether an issue exists.
    #[instrument(skip(self))]
    pub async fn issue_exists(&self, issue_id: &str) -> Result<bool> {
        match self
            .request(Method::GET, &format!("/issue/{}/exists", issue_id), &[])
            .await
        {
            Ok(response) => Ok(response.status == StatusCode::OK.as_u16()),
            Err(ApiError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Get every historical state of an issue.
    #[instrument(skip(self))]
    pub async fn get_issue_history(&self, issue_id: &str) -> Result<Option<IssueList>> {
        let response = self
            .request(Method::GET, &format!("/issue/{}/history", issue_id), &[])
            .await?;
        Ok(self.decode(&response)?.and_then(Entity::into_issues))
    }

    /// Get the change log of an issue.
    #[instrument(skip(self))]
    pub async fn get_issue_changes(&self, issue_id: &str) -> Result<Option<ChangeList>> {
        let response = self
            .request(Method::GET, &format!("/issue/{}/changes", issue_id), &[])
            .await?;
        Ok(self.decode(&response)?.and_then(Entity::into_changes))
    }

    /// Delete an issue.
    #[instrument(skip(self))]
    pub async fn delete_issue(&self, issue_id: &str) -> Result<bool> {
        let response = self
            .request(Method::DELETE, &format!("/issue/{}", issue_id), &[])
            .await?;
        Ok(response.status == StatusCode::OK.as_u16())
    }

    /// Apply a command to an issue.
    #[instrument(skip(self, command), fields(command = %command.command))]
    pub async fn execute_command(&self, issue_id: &str, command: &Command) -> Result<bool> {
        let response = self
            .request(
                Method::POST,
                &format!("/issue/{}/execute", issue_id),
                &command.params(),
            )
            .await?;
        Ok(response.status == StatusCode::OK.as_u16())
    }

    /// Decode a 200 response through the entity factory.
    fn decode(&self, response: &RawResponse) -> Result<Option<Entity>> {
        if response.status != StatusCode::OK.as_u16() {
            debug!(status = response.status, "Not decoding non-200 response");
            return Ok(None);
        }
        factory::build(&response.body, &self.handle())
    }
}

impl ClientInner {
    /// Perform the login handshake and install the new session.
    ///
    /// Callers hold the session's relogin lock.
    #[instrument(skip(self, credentials), fields(login = %credentials.login()))]
    async fn login(&self, credentials: &Credentials) -> Result<()> {
        let url = format!("{}/user/login", self.base_url);
        let payload = credentials.form_payload();

        let _permit = self
            .connections
            .acquire()
            .await
            .map_err(|_| ApiError::Cancelled)?;

        let response = self
            .http
            .post(&url)
            .header(header::CONNECTION, "keep-alive")
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(header::CONTENT_LENGTH, payload.len())
            .body(payload)
            .send()
            .await?;

        let status = response.status();
        if status != StatusCode::OK {
            warn!(status = status.as_u16(), "Login failed");
            return Err(ApiError::AuthenticationFailed {
                status: status.as_u16(),
            });
        }

        let cookie = session_cookie(response.headers());
        let body = response.text().await?;
        if !body.trim().is_empty() {
            match xml::parse(&body) {
                Ok(root) => debug!(reply = ?xml::convert(&root), "Login reply"),
                Err(e) => debug!("Login reply is not XML: {}", e),
            }
        }

        let mut headers = HeaderMap::new();
        match cookie {
            Some(cookie) => {
                let value = HeaderValue::from_str(&cookie)
                    .map_err(|e| ApiError::InvalidResponse(format!("bad session cookie: {}", e)))?;
                headers.insert(header::COOKIE, value);
            }
            None => warn!("Login response carried no session cookie"),
        }
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));

        self.session.install(headers, credentials.clone());
        info!("Logged in");
        Ok(())
    }

    /// Send a single request with the current session headers.
    async fn request_once(
        &self,
        method: &Method,
        path: &str,
        params: &[(&str, Option<String>)],
    ) -> Result<RawResponse> {
        let url = format!("{}{}", self.base_url, path);
        let form = present_params(params);
        let session = self.session.snapshot();

        let _permit = self
            .connections
            .acquire()
            .await
            .map_err(|_| ApiError::Cancelled)?;

        let builder = self
            .http
            .request(method.clone(), &url)
            .headers(session.headers.clone());
        let builder = if *method == Method::GET || *method == Method::DELETE {
            builder.query(&form)
        } else {
            builder.form(&form)
        };

        let response = builder.send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;

        debug!(
            method = %method,
            url = %url,
            status,
            body_len = body.len(),
            session_generation = session.generation,
            "Response"
        );

        match ApiError::from_status(status, path) {
            Some(error) => Err(error),
            None => Ok(RawResponse {
                status,
                headers,
                body,
            }),
        }
    }
}

#[async_trait]
impl Reauthenticate for ClientInner {
    fn session_generation(&self) -> u64 {
        self.session.generation()
    }

    fn has_credentials(&self) -> bool {
        self.session.has_credentials()
    }

    async fn reauthenticate(&self, seen_generation: u64) -> Result<()> {
        let _guard = self.session.lock_relogin().await;
        if self.session.generation() != seen_generation {
            debug!("Session already refreshed by another request");
            return Ok(());
        }
        let credentials = self.session.credentials().ok_or(ApiError::NoCredentials)?;
        self.login(&credentials).await
    }
}

/// Drop parameters without a value.
fn present_params<'a>(params: &'a [(&'a str, Option<String>)]) -> Vec<(&'a str, &'a str)> {
    params
        .iter()
        .filter_map(|(key, value)| value.as_deref().map(|v| (*key, v)))
        .collect()
}

/// Join the `name=value` parts of every `Set-Cookie` header.
fn session_cookie(headers: &HeaderMap) -> Option<String> {
    let pairs: Vec<&str> = headers
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .filter_map(|v| v.split(';').next())
        .map(str::trim)
        .filter(|pair| !pair.is_empty())
        .collect();
    (!pairs.is_empty()).then(|| pairs.join("; "))
}

/// The issue ID is the last path segment of its location.
fn issue_id_from_location(location: &str) -> &str {
    location
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .unwrap_or(location)
}

/// Trim trailing slashes, check the scheme and append the REST prefix.
fn normalize_base_url(url: &str) -> Result<String> {
    let url = url.trim().trim_end_matches('/');

    if !url.starts_with("https://") && !url.starts_with("http://") {
        return Err(ApiError::InvalidUrl(format!(
            "'{}' must start with http:// or https://",
            url
        )));
    }

    // Warn if not HTTPS (but don't enforce for localhost/testing)
    if !url.starts_with("https://") && !url.contains("localhost") && !url.contains("127.0.0.1") {
        warn!("URL does not use HTTPS: {}. This is insecure for production use.", url);
    }

    Ok(format!("{}{}", url, REST_PREFIX))
}

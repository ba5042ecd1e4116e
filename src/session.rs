//! Authenticated session against the local web helper.
//!
//! Before any remote call the session needs two tokens: a bearer token from
//! the public token issuer and an anti-forgery token minted by the local
//! service itself. Obtaining them is a strictly ordered handshake that runs
//! at most once per [`Session`]; concurrent callers share the one attempt
//! in flight. A failed attempt leaves the session retryable.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::process::{self, ServiceProcess};
use crate::status::{Status, StatusQuery};
use crate::transport::{get_json, HttpRequest, ReqwestTransport, Transport};

const CSRF_PATH: &str = "/simplecsrf/token.json";
const STATUS_PATH: &str = "/remote/status.json";
const PAUSE_PATH: &str = "/remote/pause.json";
const PLAY_PATH: &str = "/remote/play.json";

/// Query keys reserved for the session credentials.
const OAUTH_KEY: &str = "oauth";
const CSRF_KEY: &str = "csrf";

/// Bearer and anti-forgery tokens held by a ready session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub oauth: String,
    pub csrf: String,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("oauth", &"<redacted>")
            .field("csrf", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootstrapState {
    NotStarted,
    InFlight,
    Complete,
}

type Handshake = Shared<BoxFuture<'static, Result<Credentials>>>;

enum Bootstrap {
    NotStarted,
    InFlight(Handshake),
    Complete(Credentials),
}

struct State {
    port: u16,
    bootstrap: Bootstrap,
}

/// Everything the handshake needs. Kept apart from the session state so the
/// stored handshake future does not hold a reference back to it.
#[derive(Clone)]
struct Bootstrapper {
    config: Arc<ClientConfig>,
    transport: Arc<dyn Transport>,
    process: Arc<dyn ServiceProcess>,
}

impl Bootstrapper {
    async fn run(self, port: u16) -> Result<Credentials> {
        if !self.process.ensure_running().await? {
            return Err(Error::ServiceNotRunning);
        }
        debug!("web helper process is up");

        let oauth = self.fetch_oauth_token().await?;
        debug!("obtained bearer token");

        let csrf = self.fetch_csrf_token(port).await?;
        debug!(port, "obtained anti-forgery token");

        Ok(Credentials { oauth, csrf })
    }

    async fn fetch_oauth_token(&self) -> Result<String> {
        let request = HttpRequest::get(self.config.token_url.as_str());
        let body = get_json(self.transport.as_ref(), &request).await?;
        string_field(&body, &request.url, "t")
    }

    async fn fetch_csrf_token(&self, port: u16) -> Result<String> {
        // The service only mints the token for a trusted Origin.
        let request = HttpRequest::get(self.config.local_url(port, CSRF_PATH))
            .header("Origin", self.config.origin.as_str());
        let body = get_json(self.transport.as_ref(), &request).await?;
        if let Some(e) = service_error(&body) {
            return Err(e);
        }
        string_field(&body, &request.url, "token")
    }
}

struct Inner {
    bootstrapper: Bootstrapper,
    state: Mutex<State>,
}

impl Inner {
    fn lock_state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One logical connection to the web helper. Cheap to clone; clones share
/// the same tokens and the same in-flight handshake.
#[derive(Clone)]
pub struct Session {
    inner: Arc<Inner>,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("port", &self.port())
            .field("state", &self.bootstrap_state())
            .finish()
    }
}

impl Session {
    /// Session using `reqwest` and the platform's process check.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let transport = Arc::new(ReqwestTransport::new(&config)?);
        Ok(Self::with_collaborators(
            config,
            transport,
            process::platform_default(),
        ))
    }

    pub fn with_collaborators(
        config: ClientConfig,
        transport: Arc<dyn Transport>,
        process: Arc<dyn ServiceProcess>,
    ) -> Self {
        let port = config.port;
        Self {
            inner: Arc::new(Inner {
                bootstrapper: Bootstrapper {
                    config: Arc::new(config),
                    transport,
                    process,
                },
                state: Mutex::new(State {
                    port,
                    bootstrap: Bootstrap::NotStarted,
                }),
            }),
        }
    }

    pub fn port(&self) -> u16 {
        self.inner.lock_state().port
    }

    /// Point the session at another port. Only allowed before the first
    /// handshake starts.
    pub fn set_port(&self, port: u16) -> Result<()> {
        let mut state = self.inner.lock_state();
        match state.bootstrap {
            Bootstrap::NotStarted => {
                state.port = port;
                Ok(())
            }
            _ => Err(Error::SessionLocked),
        }
    }

    pub fn bootstrap_state(&self) -> BootstrapState {
        match self.inner.lock_state().bootstrap {
            Bootstrap::NotStarted => BootstrapState::NotStarted,
            Bootstrap::InFlight(_) => BootstrapState::InFlight,
            Bootstrap::Complete(_) => BootstrapState::Complete,
        }
    }

    /// A fresh host name for the local service.
    pub fn local_hostname(&self) -> String {
        self.inner.bootstrapper.config.local_hostname()
    }

    /// Run the handshake unless it already succeeded. Concurrent callers
    /// await the same attempt and all see its outcome.
    pub async fn ensure_ready(&self) -> Result<Credentials> {
        let handshake = {
            let mut state = self.inner.lock_state();
            match &state.bootstrap {
                Bootstrap::Complete(creds) => return Ok(creds.clone()),
                Bootstrap::InFlight(handshake) => handshake.clone(),
                Bootstrap::NotStarted => {
                    debug!(port = state.port, "starting session handshake");
                    let handshake = self
                        .inner
                        .bootstrapper
                        .clone()
                        .run(state.port)
                        .boxed()
                        .shared();
                    state.bootstrap = Bootstrap::InFlight(handshake.clone());
                    handshake
                }
            }
        };

        let outcome = handshake.clone().await;

        let mut state = self.inner.lock_state();
        let settles = matches!(
            &state.bootstrap,
            Bootstrap::InFlight(current) if current.ptr_eq(&handshake)
        );
        if settles {
            state.bootstrap = match &outcome {
                Ok(creds) => {
                    info!(port = state.port, "session ready");
                    Bootstrap::Complete(creds.clone())
                }
                Err(e) => {
                    warn!(port = state.port, error = %e, "session handshake failed");
                    Bootstrap::NotStarted
                }
            };
        }
        outcome
    }

    /// Call `path` on the local service with the session credentials added to
    /// `params`. Caller-supplied `oauth`/`csrf` keys are dropped.
    pub async fn call(&self, path: &str, params: &[(&str, String)]) -> Result<Value> {
        let (_, body) = self.authorized_get(path, params, None).await?;
        Ok(body)
    }

    /// Long-poll the player status.
    pub async fn status(&self, query: &StatusQuery) -> Result<Status> {
        let wait = Duration::from_secs(u64::from(query.effective_return_after()));
        let timeout = wait + self.inner.bootstrapper.config.request_timeout();
        let (url, body) = self
            .authorized_get(STATUS_PATH, &query.params(), Some(timeout))
            .await?;
        serde_json::from_value(body).map_err(|e| Error::json(&url, e))
    }

    pub async fn pause(&self) -> Result<Value> {
        self.call(PAUSE_PATH, &[("pause", "true".to_string())]).await
    }

    pub async fn unpause(&self) -> Result<Value> {
        self.call(PAUSE_PATH, &[("pause", "false".to_string())]).await
    }

    /// Start playing `uri`, which is also used as the playback context.
    pub async fn play(&self, uri: &str) -> Result<Value> {
        self.call(
            PLAY_PATH,
            &[("uri", uri.to_string()), ("context", uri.to_string())],
        )
        .await
    }

    /// Returns the body together with the URL it came from.
    async fn authorized_get(
        &self,
        path: &str,
        params: &[(&str, String)],
        timeout: Option<Duration>,
    ) -> Result<(String, Value)> {
        let creds = self.ensure_ready().await?;
        let config = &self.inner.bootstrapper.config;

        let mut request = HttpRequest::get(config.local_url(self.port(), path))
            .header("Origin", config.origin.as_str());
        for (key, value) in params {
            if *key == OAUTH_KEY || *key == CSRF_KEY {
                continue;
            }
            request = request.query(*key, value.as_str());
        }
        request = request
            .query(OAUTH_KEY, creds.oauth)
            .query(CSRF_KEY, creds.csrf);
        if let Some(timeout) = timeout {
            request = request.timeout(timeout);
        }

        let body = get_json(self.inner.bootstrapper.transport.as_ref(), &request).await?;
        match service_error(&body) {
            Some(e) => Err(e),
            None => Ok((request.url, body)),
        }
    }
}

fn string_field(body: &Value, url: &str, field: &'static str) -> Result<String> {
    body.get(field)
        .and_then(Value::as_str)
        .map(str::to_owned)
        .ok_or_else(|| Error::MissingField {
            url: url.to_string(),
            field,
        })
}

/// The service reports failures as `{"error": {"type": ..., "message": ...}}`.
fn service_error(body: &Value) -> Option<Error> {
    let err = body.get("error")?.as_object()?;
    let kind = match err.get("type") {
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
        None => String::new(),
    };
    let message = err
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    Some(Error::Service { kind, message })
}

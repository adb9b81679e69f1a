use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use tracing::{debug, info, warn};

use crate::auth::Credentials;
use crate::error::{ClientError, Result};
use crate::retry::RetryPolicy;
use crate::session::FhirSession;

/// Opens sessions against one server. Never retries and never caches.
#[derive(Debug, Clone)]
pub struct Connector {
    base_url: String,
    credentials: Credentials,
    timeout: Duration,
}

impl Connector {
    pub fn new(base_url: impl Into<String>, credentials: Credentials, timeout: Duration) -> Self {
        Self {
            base_url: base_url.into(),
            credentials,
            timeout,
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Authenticate and probe `metadata`; any failure is returned as is.
    pub async fn connect(&self) -> Result<FhirSession> {
        let http = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ClientError::connect(&self.base_url, e.to_string()))?;
        let auth = self.credentials.authorize(&http, &self.base_url).await?;
        let session = FhirSession::new(http, &self.base_url, auth);

        let capability = session
            .metadata()
            .await
            .map_err(|e| ClientError::connect(&self.base_url, e.to_string()))?;
        debug!(
            fhir_version = capability
                .get("fhirVersion")
                .and_then(|v| v.as_str())
                .unwrap_or("unknown"),
            "capability statement received"
        );
        info!(base_url = %self.base_url, "session opened");
        Ok(session)
    }
}

/// A session shared by all workers of a run.
///
/// Workers take a snapshot per request; [`SharedSession::reconnect`] swaps
/// in a fresh session for everybody.
#[derive(Clone)]
pub struct SharedSession {
    connector: Connector,
    current: Arc<ArcSwap<FhirSession>>,
}

impl SharedSession {
    pub async fn open(connector: Connector) -> Result<Self> {
        let session = connector.connect().await?;
        Ok(Self::from_session(connector, session))
    }

    /// Like [`SharedSession::open`], but keeps trying under `policy`.
    pub async fn open_with_retry(connector: Connector, policy: &RetryPolicy) -> Result<Self> {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match connector.connect().await {
                Ok(session) => return Ok(Self::from_session(connector, session)),
                Err(err) if policy.should_retry(attempts) => {
                    let delay = policy.delay_for(attempts);
                    warn!(
                        base_url = %connector.base_url(),
                        attempt = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "connect failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => {
                    return Err(ClientError::RetriesExhausted {
                        attempts,
                        last: Box::new(err),
                    });
                }
            }
        }
    }

    pub fn from_session(connector: Connector, session: FhirSession) -> Self {
        Self {
            connector,
            current: Arc::new(ArcSwap::from_pointee(session)),
        }
    }

    pub fn current(&self) -> Arc<FhirSession> {
        self.current.load_full()
    }

    pub async fn reconnect(&self) -> Result<()> {
        let session = self.connector.connect().await?;
        self.current.store(Arc::new(session));
        Ok(())
    }
}

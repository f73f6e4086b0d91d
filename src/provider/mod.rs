//! Rate-limited client for the utility status provider
//!
//! All provider traffic goes through one GET-style endpoint selected by a
//! query parameter, and through one shared rate limiter: the provider bans
//! by IP, so request spacing is enforced across every caller of the client,
//! the credential handshake included. The client never retries; retry policy
//! belongs to the polling layer.

pub mod parse;

pub use parse::extract_restore_estimate;

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use reqwest::Client;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use crate::error::ProviderError;
use crate::models::{AddressKey, City, OutageStatus, Street};

/// Handshake page carrying the session credential blob
const HANDSHAKE_PATH: &str = "/IecServicesHandler.ashx";

/// Data endpoint for city/street/status operations
const SERVICES_PATH: &str = "/pages/IecServicesHandler.ashx";

/// Default maximum request rate (requests per second)
pub const DEFAULT_MAX_RPS: f64 = 1.1;

/// Default per-request timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(20);

/// Default session credential validity window
pub const DEFAULT_CREDENTIAL_TTL: Duration = Duration::from_secs(30 * 60);

/// Cached session credential with its fetch instant
struct Credential {
    value: String,
    fetched_at: Instant,
}

/// Client for the provider's status API
///
/// Owns its rate limiter (one per instance, no process-wide state) so tests
/// can construct independent clients with independent pacing.
pub struct ProviderClient {
    /// HTTP client with configured timeout and compression
    client: Client,

    /// Base URL of the provider (injectable for mock servers)
    base_url: String,

    /// Shared pacing cursor: one permit per spacing interval, burst of 1
    limiter: RateLimiter<NotKeyed, InMemoryState, DefaultClock>,

    /// Cached session credential; the lock also serializes refreshes
    credential: Mutex<Option<Credential>>,

    /// Validity window after which the credential is re-fetched
    credential_ttl: Duration,
}

impl ProviderClient {
    /// Create a client with default timeout and credential TTL
    ///
    /// # Errors
    ///
    /// Returns `ProviderError` if the rate is not positive or the HTTP
    /// client cannot be built.
    pub fn new(base_url: &str, max_requests_per_second: f64) -> Result<Self, ProviderError> {
        Self::with_config(
            base_url,
            max_requests_per_second,
            DEFAULT_TIMEOUT,
            DEFAULT_CREDENTIAL_TTL,
        )
    }

    /// Create a client with explicit pacing, timeout, and credential TTL
    pub fn with_config(
        base_url: &str,
        max_requests_per_second: f64,
        timeout: Duration,
        credential_ttl: Duration,
    ) -> Result<Self, ProviderError> {
        if max_requests_per_second <= 0.0 {
            return Err(ProviderError::InvalidRate(max_requests_per_second));
        }

        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .cookie_store(true)
            .build()?;

        // Period quota with burst 1: consecutive dispatches are spaced by
        // at least 1/max_rps regardless of which task issues them.
        let spacing = Duration::from_secs_f64(1.0 / max_requests_per_second);
        let quota = Quota::with_period(spacing)
            .expect("spacing is non-zero for a positive rate");
        let limiter = RateLimiter::direct(quota);

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            limiter,
            credential: Mutex::new(None),
            credential_ttl,
        })
    }

    /// Issue one rate-limited GET against the provider
    async fn request(
        &self,
        path: &str,
        query: &[(&str, String)],
        cookie: Option<&str>,
    ) -> Result<reqwest::Response, ProviderError> {
        self.limiter.until_ready().await;

        let url = format!("{}{}", self.base_url, path);
        let mut builder = self.client.get(&url).query(query);
        if let Some(cookie) = cookie {
            builder = builder.header(reqwest::header::COOKIE, cookie);
        }

        tracing::debug!(url = %url, "Provider request");

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Http(e)
            }
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(ProviderError::ServerError(status.as_u16()));
        }

        Ok(response)
    }

    async fn request_text(
        &self,
        path: &str,
        query: &[(&str, String)],
        cookie: Option<&str>,
    ) -> Result<String, ProviderError> {
        let response = self.request(path, query, cookie).await?;
        response.text().await.map_err(|e| {
            if e.is_timeout() {
                ProviderError::Timeout
            } else {
                ProviderError::Http(e)
            }
        })
    }

    /// Get the cached session credential, refreshing it when unset or expired
    ///
    /// The refresh request goes through the same rate limiter as every other
    /// call. Holding the credential lock across the handshake means
    /// concurrent callers wait for one refresh instead of issuing their own.
    async fn credential(&self) -> Result<String, ProviderError> {
        let mut guard = self.credential.lock().await;

        if let Some(credential) = guard.as_ref() {
            if credential.fetched_at.elapsed() < self.credential_ttl {
                return Ok(credential.value.clone());
            }
        }

        let body = self
            .request_text(
                HANDSHAKE_PATH,
                &[
                    ("allRes", "true".to_string()),
                    ("a", "FindStreets".to_string()),
                ],
                None,
            )
            .await?;
        let seed = parse::extract_credential_seed(&body)?;

        tracing::debug!("Session credential refreshed");
        *guard = Some(Credential {
            value: seed.clone(),
            fetched_at: Instant::now(),
        });

        Ok(seed)
    }

    /// Search the provider's city directory
    pub async fn fetch_cities(&self, query: &str) -> Result<Vec<City>, ProviderError> {
        let body = self
            .request_text(
                SERVICES_PATH,
                &[
                    ("a", "RetrieveCitiesEx".to_string()),
                    ("city", query.to_string()),
                ],
                None,
            )
            .await?;
        parse::decode_cities(&body)
    }

    /// Search streets within a city (requires the session credential)
    pub async fn fetch_streets(
        &self,
        city_id: i64,
        query: &str,
    ) -> Result<Vec<Street>, ProviderError> {
        let credential = self.credential().await?;
        let cookie = format!("rbzid={credential}");

        let body = self
            .request_text(
                SERVICES_PATH,
                &[
                    ("a", "FindStreets".to_string()),
                    ("allRes", "true".to_string()),
                    ("cityID", city_id.to_string()),
                    ("street", query.to_string()),
                ],
                Some(&cookie),
            )
            .await?;
        parse::decode_streets(&body)
    }

    /// Fetch the current outage status for one address
    pub async fn fetch_status(
        &self,
        key: AddressKey,
        district_id: Option<i64>,
    ) -> Result<OutageStatus, ProviderError> {
        let mut query = vec![
            ("a", "CheckInterruptByAddress".to_string()),
            ("cityID", key.city_id.to_string()),
            ("streetID", key.street_id.to_string()),
            ("homeNum", key.house_num.to_string()),
            ("guid", chrono::Utc::now().timestamp().to_string()),
        ];
        if let Some(district_id) = district_id {
            query.push(("Districtid", district_id.to_string()));
        }

        let body = self.request_text(SERVICES_PATH, &query, None).await?;
        parse::decode_outage(&body)
    }
}

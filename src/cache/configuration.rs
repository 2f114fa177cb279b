use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::config::settings::STALE_MARGIN_SECONDS_DEFAULT;
use crate::error::{SessionError, SessionResult};
use crate::helpers::time::seconds_to_datetime;
use crate::parser::token_codec::{self, ClaimSet};

/// Refresh this long before the credential actually expires.
pub const DEFAULT_STALE_MARGIN: Duration = Duration::from_secs(STALE_MARGIN_SECONDS_DEFAULT);

static BEARER_PREFIX: &str = "Bearer ";

/// Authorized user's session configuration, derived from one credential.
///
/// Wall-clock `created_on` / `expires_on` are informational. Staleness is
/// evaluated only against the monotonic deadline captured at construction, so
/// adjusting the device clock never shortens or extends a session.
#[derive(Debug, Clone)]
pub struct Configuration {
    authentication_token: String,
    created_on: DateTime<Utc>,
    expires_on: DateTime<Utc>,
    monotonic_deadline: Instant,
    stale_margin: Duration,
    rest_uri: String,
    graphql_uri: String,
    insights_uri: Option<String>,
    program_token: Option<String>,
    user_token: String,
    environment: Option<String>,
}

impl Configuration {
    /// Decode `raw_token` and build a configuration with the default stale margin.
    pub fn parse(raw_token: &str, monotonic_now: Instant) -> SessionResult<Self> {
        Self::parse_with_margin(raw_token, monotonic_now, DEFAULT_STALE_MARGIN)
    }

    pub fn parse_with_margin(
        raw_token: &str,
        monotonic_now: Instant,
        stale_margin: Duration,
    ) -> SessionResult<Self> {
        let claims = token_codec::decode(raw_token)?;
        Self::from_claims_with_margin(claims, raw_token.to_owned(), monotonic_now, stale_margin)
    }

    pub fn from_claims(claims: ClaimSet, raw_token: String, monotonic_now: Instant) -> SessionResult<Self> {
        Self::from_claims_with_margin(claims, raw_token, monotonic_now, DEFAULT_STALE_MARGIN)
    }

    pub fn from_claims_with_margin(
        claims: ClaimSet,
        raw_token: String,
        monotonic_now: Instant,
        stale_margin: Duration,
    ) -> SessionResult<Self> {
        if claims.issued_at > claims.expires_at {
            return Err(SessionError::malformed(format!(
                "issued-at {} is after expires-at {}",
                claims.issued_at, claims.expires_at
            )));
        }
        let created_on = seconds_to_datetime(claims.issued_at)
            .ok_or_else(|| SessionError::malformed("issued-at is out of range"))?;
        let expires_on = seconds_to_datetime(claims.expires_at)
            .ok_or_else(|| SessionError::malformed("expires-at is out of range"))?;

        let lifetime = (expires_on - created_on)
            .to_std()
            .map_err(|e| SessionError::malformed(format!("invalid token lifetime: {}", e)))?;
        let monotonic_deadline = monotonic_now
            .checked_add(lifetime)
            .ok_or_else(|| SessionError::malformed("token lifetime is too long"))?;

        Ok(Self {
            authentication_token: raw_token,
            created_on,
            expires_on,
            monotonic_deadline,
            stale_margin,
            rest_uri: claims.rest_uri,
            graphql_uri: claims.graphql_uri,
            insights_uri: claims.insights_uri,
            program_token: claims.issuer,
            user_token: claims.subject,
            environment: claims.environment,
        })
    }

    /// True once `monotonic_now` is within the stale margin of the deadline.
    ///
    /// `monotonic_now` must come from the same clock used at construction.
    pub fn is_stale(&self, monotonic_now: Instant) -> bool {
        match self.monotonic_deadline.checked_sub(self.stale_margin) {
            Some(stale_at) => monotonic_now >= stale_at,
            None => true,
        }
    }

    /// Raw credential as issued by the host.
    pub fn authentication_token(&self) -> &str {
        &self.authentication_token
    }

    /// `Authorization` header value for outbound calls.
    pub fn bearer(&self) -> String {
        format!("{}{}", BEARER_PREFIX, self.authentication_token)
    }

    pub fn created_on(&self) -> DateTime<Utc> {
        self.created_on
    }

    pub fn expires_on(&self) -> DateTime<Utc> {
        self.expires_on
    }

    pub fn monotonic_deadline(&self) -> Instant {
        self.monotonic_deadline
    }

    pub fn stale_margin(&self) -> Duration {
        self.stale_margin
    }

    pub fn rest_uri(&self) -> &str {
        &self.rest_uri
    }

    pub fn graphql_uri(&self) -> &str {
        &self.graphql_uri
    }

    pub fn insights_uri(&self) -> Option<&str> {
        self.insights_uri.as_deref()
    }

    pub fn program_token(&self) -> Option<&str> {
        self.program_token.as_deref()
    }

    pub fn user_token(&self) -> &str {
        &self.user_token
    }

    pub fn environment(&self) -> Option<&str> {
        self.environment.as_deref()
    }
}

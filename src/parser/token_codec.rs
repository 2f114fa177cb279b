//! Decoding of the platform's compact, dot-separated credential into a claim set.

use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig};
use base64::engine::DecodePaddingMode;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::{SessionError, SessionResult};

static TOKEN_SEPARATOR: char = '.';
static TOKEN_SEGMENTS: usize = 3;
static UNSIGNED_HEADER: &str = r#"{"alg":"none","typ":"JWT"}"#;

const LENIENT_PADDING: GeneralPurposeConfig = GeneralPurposeConfig::new()
    .with_encode_padding(false)
    .with_decode_padding_mode(DecodePaddingMode::Indifferent);

/// base64url, padded or not
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::URL_SAFE, LENIENT_PADDING);
/// some hosts still hand out payloads in the standard alphabet
const STANDARD_LENIENT: GeneralPurpose = GeneralPurpose::new(&alphabet::STANDARD, LENIENT_PADDING);

/// Claims carried in the payload segment of a session credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimSet {
    /// issued-at, seconds since epoch
    #[serde(rename = "iat")]
    pub issued_at: i64,
    /// expires-at, seconds since epoch
    #[serde(rename = "exp")]
    pub expires_at: i64,
    /// user token
    #[serde(rename = "sub")]
    pub subject: String,
    /// program token
    #[serde(rename = "iss", default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,
    #[serde(rename = "rest-uri")]
    pub rest_uri: String,
    #[serde(rename = "graphql-uri")]
    pub graphql_uri: String,
    #[serde(rename = "insights-uri", default, skip_serializing_if = "Option::is_none")]
    pub insights_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub environment: Option<String>,
}

impl ClaimSet {
    fn validate(mut self) -> SessionResult<Self> {
        for (claim, value) in [
            ("sub", &self.subject),
            ("rest-uri", &self.rest_uri),
            ("graphql-uri", &self.graphql_uri),
        ] {
            if value.trim().is_empty() {
                return Err(SessionError::malformed(format!("claim '{}' is empty", claim)));
            }
        }
        // optional claims: empty means absent
        self.issuer = self.issuer.filter(|v| !v.is_empty());
        self.insights_uri = self.insights_uri.filter(|v| !v.is_empty());
        self.environment = self.environment.filter(|v| !v.is_empty());
        Ok(self)
    }
}

/// Decode a raw credential into its [`ClaimSet`].
///
/// Only the payload segment is interpreted; the signature is verified by the
/// platform, never by the client.
pub fn decode(raw_token: &str) -> SessionResult<ClaimSet> {
    if raw_token.is_empty() {
        return Err(SessionError::malformed("token is empty"));
    }

    let segments: Vec<&str> = raw_token.split(TOKEN_SEPARATOR).collect();
    if segments.len() != TOKEN_SEGMENTS {
        return Err(SessionError::malformed(format!(
            "expected {} segments, found {}",
            TOKEN_SEGMENTS,
            segments.len()
        )));
    }

    let payload = decode_segment(segments[1])?;
    if payload.is_empty() {
        return Err(SessionError::malformed("payload segment is empty"));
    }

    let json: Value = serde_json::from_slice(&payload)
        .map_err(|e| SessionError::malformed(format!("payload is not valid JSON: {}", e)))?;
    if !json.is_object() {
        return Err(SessionError::malformed("payload is not a JSON object"));
    }

    let claims = serde_json::from_value::<ClaimSet>(json)
        .map_err(|e| SessionError::malformed(format!("invalid claims: {}", e)))?
        .validate()?;

    debug!(
        issued_at = claims.issued_at,
        expires_at = claims.expires_at,
        "session token decoded"
    );
    Ok(claims)
}

/// Render an unsigned credential carrying `claims`.
pub fn encode_unsigned(claims: &ClaimSet) -> SessionResult<String> {
    let payload = serde_json::to_vec(claims)
        .map_err(|e| SessionError::malformed(format!("claims are not serializable: {}", e)))?;
    Ok(format!(
        "{}.{}.",
        URL_SAFE_LENIENT.encode(UNSIGNED_HEADER),
        URL_SAFE_LENIENT.encode(payload)
    ))
}

fn decode_segment(segment: &str) -> SessionResult<Vec<u8>> {
    URL_SAFE_LENIENT
        .decode(segment)
        .or_else(|_| STANDARD_LENIENT.decode(segment))
        .map_err(|e| SessionError::malformed(format!("payload is not base64url: {}", e)))
}

//! JSON API handlers used by the dashboard.
//!
//! - `GET /api/snapshot`: full history of every software group
//! - `GET /api/status`: sampler state
//! - `POST /api/winrm`: install remote credentials and switch to winrm mode

use axum::{body::Bytes, extract::State, http::StatusCode, response::IntoResponse, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use crate::collectors::{RemoteSettings, SessionError};
use crate::state::SharedState;

/// Handler for the /api/snapshot endpoint.
#[instrument(skip(state))]
pub async fn snapshot_handler(State(state): State<SharedState>) -> impl IntoResponse {
    let snapshot = state.store.snapshot();
    debug!("Serving snapshot with {} series", snapshot.len());
    Json(json!({ "data": snapshot }))
}

/// Handler for the /api/status endpoint.
#[instrument(skip(state))]
pub async fn status_handler(State(state): State<SharedState>) -> impl IntoResponse {
    Json(json!({ "status": state.sampler.status() }))
}

/// Body of `POST /api/winrm`. Every field is optional on the wire.
///
/// `port` and `use_ssl` are kept as raw JSON so form-style strings such as
/// `"5985"` or `"true"` are accepted alongside numbers and booleans.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct WinRmRequest {
    pub username: Option<String>,
    pub password: Option<String>,
    pub host: Option<String>,
    pub port: Option<Value>,
    pub use_ssl: Option<Value>,
}

impl WinRmRequest {
    /// Fills unset fields from the configured defaults.
    ///
    /// Fails when username or password is empty after trimming, or when
    /// `port`/`use_ssl` hold a value that cannot be read as one.
    pub fn into_settings(self, defaults: RemoteSettings) -> Result<RemoteSettings, SessionError> {
        let username = self.username.unwrap_or_default().trim().to_string();
        let password = self.password.unwrap_or_default().trim().to_string();
        if username.is_empty() || password.is_empty() {
            return Err(SessionError::MissingCredentials);
        }

        let host = self
            .host
            .map(|h| h.trim().to_string())
            .filter(|h| !h.is_empty())
            .unwrap_or(defaults.host);

        let port = lenient_port(self.port.as_ref())?.unwrap_or(defaults.port);
        let use_ssl = lenient_bool(self.use_ssl.as_ref())?.unwrap_or(defaults.use_ssl);

        Ok(RemoteSettings {
            host,
            port,
            username,
            password,
            use_ssl,
            timeout_secs: defaults.timeout_secs,
        })
    }
}

fn invalid(field: &'static str, value: &Value) -> SessionError {
    SessionError::InvalidField {
        field,
        value: value.to_string(),
    }
}

/// Null, empty and zero mean "use the default".
fn lenient_port(value: Option<&Value>) -> Result<Option<u16>, SessionError> {
    let Some(value) = value else {
        return Ok(None);
    };
    let parsed = match value {
        Value::Null => return Ok(None),
        Value::Number(n) => n.as_u64(),
        Value::String(s) if s.trim().is_empty() => return Ok(None),
        Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    };
    match parsed {
        Some(0) => Ok(None),
        Some(p) => u16::try_from(p).map(Some).map_err(|_| invalid("port", value)),
        None => Err(invalid("port", value)),
    }
}

fn lenient_bool(value: Option<&Value>) -> Result<Option<bool>, SessionError> {
    let Some(value) = value else {
        return Ok(None);
    };
    match value {
        Value::Null => Ok(None),
        Value::Bool(b) => Ok(Some(*b)),
        Value::Number(n) => Ok(Some(n.as_f64().is_some_and(|f| f != 0.0))),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "" => Ok(None),
            "1" | "true" | "yes" | "on" => Ok(Some(true)),
            "0" | "false" | "no" | "off" => Ok(Some(false)),
            _ => Err(invalid("use_ssl", value)),
        },
        _ => Err(invalid("use_ssl", value)),
    }
}

/// Handler for the /api/winrm endpoint.
///
/// Malformed bodies are treated as empty so the client gets the
/// credentials error rather than a parser rejection.
#[instrument(skip(state, body))]
pub async fn winrm_handler(State(state): State<SharedState>, body: Bytes) -> impl IntoResponse {
    let request: WinRmRequest = serde_json::from_slice(&body).unwrap_or_default();

    let settings = match request.into_settings(state.config.remote_settings()) {
        Ok(settings) => settings,
        Err(e) => {
            debug!("Rejecting WinRM credentials: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": e.to_string() })),
            );
        }
    };

    let host = settings.host.clone();
    match state.sampler.set_remote_credentials(settings).await {
        Ok(()) => {
            info!("WinRM credentials accepted for {}", host);
            (StatusCode::OK, Json(json!({ "ok": true })))
        }
        Err(e) => {
            warn!("WinRM connection to {} failed: {}", host, e);
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "ok": false, "error": e.to_string() })),
            )
        }
    }
}

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use axum::extract::rejection::JsonRejection;
use axum::http::header::COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use eval_tracker_api::{RequestService, SessionManager, API_CONTRACT_VERSION};
use eval_tracker_core::{Identity, TrackerError};
use serde::Serialize;
use serde_json::json;

use crate::oauth::IdentityProvider;

pub const SERVICE_CONTRACT_VERSION: &str = "service.v1";
pub const SESSION_COOKIE: &str = "session_id";

#[derive(Clone)]
pub struct ServiceState {
    pub requests: RequestService,
    pub sessions: SessionManager,
    pub identity: Arc<dyn IdentityProvider>,
    pub admin_users: Arc<Vec<String>>,
    pub secure_cookies: bool,
    pub telemetry: Arc<ServiceTelemetry>,
    pub started_at: Instant,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceEnvelope<T>
where
    T: Serialize,
{
    service_contract_version: &'static str,
    api_contract_version: &'static str,
    data: T,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceError {
    service_contract_version: &'static str,
    error: ServiceErrorPayload,
}

#[derive(Debug, Clone, Serialize)]
struct ServiceErrorPayload {
    code: &'static str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

#[derive(Debug, Clone)]
pub struct ServiceFailure {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub details: Option<serde_json::Value>,
}

#[derive(Debug, Default)]
#[allow(clippy::struct_field_names)]
pub struct ServiceTelemetry {
    requests_total: AtomicU64,
    requests_success_total: AtomicU64,
    requests_failure_total: AtomicU64,
    invalid_json_total: AtomicU64,
    validation_error_total: AtomicU64,
    invalid_transition_total: AtomicU64,
    request_not_found_total: AtomicU64,
    unauthorized_total: AtomicU64,
    forbidden_total: AtomicU64,
    invalid_state_total: AtomicU64,
    config_section_not_found_total: AtomicU64,
    storage_failure_total: AtomicU64,
    internal_error_total: AtomicU64,
    other_error_total: AtomicU64,
}

#[derive(Debug, Clone, Serialize)]
#[allow(clippy::struct_field_names)]
pub struct ServiceTelemetrySnapshot {
    pub requests_total: u64,
    pub requests_success_total: u64,
    pub requests_failure_total: u64,
    pub invalid_json_total: u64,
    pub validation_error_total: u64,
    pub invalid_transition_total: u64,
    pub request_not_found_total: u64,
    pub unauthorized_total: u64,
    pub forbidden_total: u64,
    pub invalid_state_total: u64,
    pub config_section_not_found_total: u64,
    pub storage_failure_total: u64,
    pub internal_error_total: u64,
    pub other_error_total: u64,
}

impl IntoResponse for ServiceFailure {
    fn into_response(self) -> Response {
        let payload = ServiceError {
            service_contract_version: SERVICE_CONTRACT_VERSION,
            error: ServiceErrorPayload {
                code: self.code,
                message: self.message,
                details: self.details,
            },
        };
        (self.status, Json(payload)).into_response()
    }
}

impl ServiceState {
    pub fn failure(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        details: Option<serde_json::Value>,
    ) -> ServiceFailure {
        ServiceFailure {
            status,
            code,
            message: message.into(),
            details,
        }
    }

    /// Records the failure before handing it back, for errors raised
    /// outside [`Self::run_blocking`].
    pub fn reject(
        &self,
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
    ) -> ServiceFailure {
        self.telemetry.record_failure(code);
        Self::failure(status, code, message, None)
    }

    fn invalid_json(rejection: &JsonRejection) -> ServiceFailure {
        Self::failure(
            rejection.status(),
            "invalid_json",
            rejection.body_text(),
            Some(json!({"rejection": rejection.to_string()})),
        )
    }

    pub fn invalid_json_with_telemetry(&self, rejection: &JsonRejection) -> ServiceFailure {
        self.telemetry.record_failure("invalid_json");
        Self::invalid_json(rejection)
    }

    /// Domain errors keep their meaning; anything else is a storage fault.
    pub fn classify_error(err: &anyhow::Error) -> ServiceFailure {
        match err.downcast_ref::<TrackerError>() {
            Some(TrackerError::NotFound(_)) => Self::failure(
                StatusCode::NOT_FOUND,
                "request_not_found",
                err.to_string(),
                None,
            ),
            Some(TrackerError::InvalidTransition { .. }) => Self::failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                "invalid_transition",
                err.to_string(),
                None,
            ),
            Some(TrackerError::Validation(violations)) => Self::failure(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                err.to_string(),
                Some(json!({ "violations": violations })),
            ),
            None => {
                tracing::error!(error = %format!("{err:#}"), "storage operation failed");
                Self::failure(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "storage_failure",
                    format!("{err:#}"),
                    None,
                )
            }
        }
    }

    async fn blocking<T, F>(
        &self,
        operation_label: &'static str,
        op: F,
    ) -> Result<anyhow::Result<T>, ServiceFailure>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(op).await.map_err(|err| {
            self.reject(
                StatusCode::INTERNAL_SERVER_ERROR,
                "internal_error",
                format!("{operation_label} join failure: {err}"),
            )
        })
    }

    /// Runs store work on the blocking pool and maps its outcome onto the
    /// error envelope.
    pub async fn run_blocking<T, F>(
        &self,
        operation_label: &'static str,
        op: F,
    ) -> Result<T, ServiceFailure>
    where
        T: Send + 'static,
        F: FnOnce() -> anyhow::Result<T> + Send + 'static,
    {
        self.telemetry.requests_total.fetch_add(1, Ordering::Relaxed);
        match self.blocking(operation_label, op).await? {
            Ok(value) => {
                self.telemetry
                    .requests_success_total
                    .fetch_add(1, Ordering::Relaxed);
                Ok(value)
            }
            Err(err) => {
                let failure = Self::classify_error(&err);
                self.telemetry.record_failure(failure.code);
                Err(failure)
            }
        }
    }

    /// Resolves the signed-in user from the session cookie.
    pub async fn current_user(&self, headers: &HeaderMap) -> Result<Identity, ServiceFailure> {
        let session_id = session_cookie(headers);
        let sessions = self.sessions.clone();
        let lookup = self
            .blocking("session_lookup", move || {
                sessions.current_user(session_id.as_deref())
            })
            .await?;
        match lookup {
            Ok(Some(identity)) => Ok(identity),
            Ok(None) => Err(self.reject(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Not authenticated",
            )),
            Err(err) => {
                let failure = Self::classify_error(&err);
                self.telemetry.record_failure(failure.code);
                Err(failure)
            }
        }
    }

    pub async fn require_admin(&self, headers: &HeaderMap) -> Result<Identity, ServiceFailure> {
        let identity = self.current_user(headers).await?;
        if !identity.is_admin {
            tracing::warn!(user = %identity.name, "admin route refused");
            return Err(self.reject(
                StatusCode::FORBIDDEN,
                "forbidden",
                "Admin access required",
            ));
        }
        Ok(identity)
    }
}

/// Value of the session cookie, if the request carries one.
pub fn session_cookie(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, _)| *name == SESSION_COOKIE)
        .map(|(_, value)| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

impl ServiceTelemetry {
    pub fn record_failure(&self, code: &str) {
        self.requests_failure_total.fetch_add(1, Ordering::Relaxed);
        let counter = match code {
            "invalid_json" => &self.invalid_json_total,
            "validation_error" => &self.validation_error_total,
            "invalid_transition" => &self.invalid_transition_total,
            "request_not_found" => &self.request_not_found_total,
            "unauthorized" => &self.unauthorized_total,
            "forbidden" => &self.forbidden_total,
            "invalid_state" => &self.invalid_state_total,
            "config_section_not_found" => &self.config_section_not_found_total,
            "storage_failure" => &self.storage_failure_total,
            "internal_error" => &self.internal_error_total,
            _ => &self.other_error_total,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> ServiceTelemetrySnapshot {
        ServiceTelemetrySnapshot {
            requests_total: self.requests_total.load(Ordering::Relaxed),
            requests_success_total: self.requests_success_total.load(Ordering::Relaxed),
            requests_failure_total: self.requests_failure_total.load(Ordering::Relaxed),
            invalid_json_total: self.invalid_json_total.load(Ordering::Relaxed),
            validation_error_total: self.validation_error_total.load(Ordering::Relaxed),
            invalid_transition_total: self.invalid_transition_total.load(Ordering::Relaxed),
            request_not_found_total: self.request_not_found_total.load(Ordering::Relaxed),
            unauthorized_total: self.unauthorized_total.load(Ordering::Relaxed),
            forbidden_total: self.forbidden_total.load(Ordering::Relaxed),
            invalid_state_total: self.invalid_state_total.load(Ordering::Relaxed),
            config_section_not_found_total: self
                .config_section_not_found_total
                .load(Ordering::Relaxed),
            storage_failure_total: self.storage_failure_total.load(Ordering::Relaxed),
            internal_error_total: self.internal_error_total.load(Ordering::Relaxed),
            other_error_total: self.other_error_total.load(Ordering::Relaxed),
        }
    }
}

pub fn envelope<T>(data: T) -> ServiceEnvelope<T>
where
    T: Serialize,
{
    ServiceEnvelope {
        service_contract_version: SERVICE_CONTRACT_VERSION,
        api_contract_version: API_CONTRACT_VERSION,
        data,
    }
}

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use eval_tracker_api::{AddLinksRequest, PriorityUpdate, StartRequest};
use eval_tracker_core::{
    now_utc, EvaluationRequest, ImportSummary, NewRequest, RequestStatus, RequestUpdate,
    TrackerError,
};
use serde::Deserialize;
use serde_json::Value;

use crate::state::{ServiceFailure, ServiceState};

type Record = Result<Json<EvaluationRequest>, ServiceFailure>;
type Records = Result<Json<Vec<EvaluationRequest>>, ServiceFailure>;

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(default, alias = "status_filter")]
    status: Option<String>,
    #[serde(default = "default_sort_by_priority")]
    sort_by_priority: bool,
}

fn default_sort_by_priority() -> bool {
    true
}

pub async fn list(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Records {
    let user = state.current_user(&headers).await?;
    let status = match query.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        None => None,
        Some(raw) => Some(RequestStatus::parse(raw).ok_or_else(|| {
            state.reject(
                StatusCode::UNPROCESSABLE_ENTITY,
                "validation_error",
                format!("unknown status filter: {raw}"),
            )
        })?),
    };
    let requests = state.requests.clone();
    let listed = state
        .run_blocking("list_requests", move || {
            requests.list(status, query.sort_by_priority)
        })
        .await?;
    tracing::debug!(user = %user.name, count = listed.len(), "listed requests");
    Ok(Json(listed))
}

pub async fn create(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    payload: Result<Json<NewRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<EvaluationRequest>), ServiceFailure> {
    let user = state.current_user(&headers).await?;
    let Json(input) = payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let requests = state.requests.clone();
    let created = state
        .run_blocking("create_request", move || requests.create(input, &user.name))
        .await?;
    Ok((StatusCode::CREATED, Json(created)))
}

pub async fn show(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Record {
    state.current_user(&headers).await?;
    let requests = state.requests.clone();
    let request = state
        .run_blocking("get_request", move || requests.get(&id))
        .await?;
    Ok(Json(request))
}

pub async fn update(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<RequestUpdate>, JsonRejection>,
) -> Record {
    state.current_user(&headers).await?;
    let Json(update) = payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let requests = state.requests.clone();
    let updated = state
        .run_blocking("update_request", move || requests.update(&id, update))
        .await?;
    Ok(Json(updated))
}

pub async fn delete(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<StatusCode, ServiceFailure> {
    let admin = state.require_admin(&headers).await?;
    let requests = state.requests.clone();
    let deleted_id = id.clone();
    state
        .run_blocking("delete_request", move || {
            if requests.delete(&id)? {
                Ok(())
            } else {
                Err(TrackerError::NotFound(id).into())
            }
        })
        .await?;
    tracing::info!(request_id = %deleted_id, admin = %admin.name, "deleted request");
    Ok(StatusCode::NO_CONTENT)
}

pub async fn start(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> Record {
    let user = state.current_user(&headers).await?;
    let Json(start) = payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let requests = state.requests.clone();
    let started = state
        .run_blocking("start_request", move || requests.start(&id, start, &user.name))
        .await?;
    Ok(Json(started))
}

pub async fn add_links(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<AddLinksRequest>, JsonRejection>,
) -> Record {
    let user = state.current_user(&headers).await?;
    let Json(add) = payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let requests = state.requests.clone();
    let updated = state
        .run_blocking("add_links", move || {
            requests.add_links_or_note(&id, add, &user.name)
        })
        .await?;
    Ok(Json(updated))
}

pub async fn complete(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Record {
    state.current_user(&headers).await?;
    let requests = state.requests.clone();
    let completed = state
        .run_blocking("complete_request", move || requests.complete(&id))
        .await?;
    Ok(Json(completed))
}

pub async fn update_priority(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    payload: Result<Json<PriorityUpdate>, JsonRejection>,
) -> Record {
    state.require_admin(&headers).await?;
    let Json(update) = payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let requests = state.requests.clone();
    let updated = state
        .run_blocking("update_priority", move || {
            requests.update_priority(&id, update.priority)
        })
        .await?;
    Ok(Json(updated))
}

pub async fn search(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Path(query): Path<String>,
) -> Records {
    state.current_user(&headers).await?;
    let requests = state.requests.clone();
    let hits = state
        .run_blocking("search_requests", move || requests.search(&query))
        .await?;
    Ok(Json(hits))
}

pub async fn export(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Response, ServiceFailure> {
    let admin = state.require_admin(&headers).await?;
    let requests = state.requests.clone();
    let exported = state
        .run_blocking("export_requests", move || requests.export())
        .await?;
    tracing::info!(admin = %admin.name, count = exported.len(), "exported requests");

    let disposition = format!("attachment; filename=\"{}\"", export_file_name());
    Ok((
        [
            (CONTENT_TYPE, "application/json".to_string()),
            (CONTENT_DISPOSITION, disposition),
        ],
        Json(exported),
    )
        .into_response())
}

pub async fn import(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    payload: Result<Json<Vec<Value>>, JsonRejection>,
) -> Result<(StatusCode, Json<ImportSummary>), ServiceFailure> {
    let admin = state.require_admin(&headers).await?;
    let Json(documents) =
        payload.map_err(|rejection| state.invalid_json_with_telemetry(&rejection))?;
    let requests = state.requests.clone();
    let summary = state
        .run_blocking("import_requests", move || requests.import(documents))
        .await?;
    tracing::info!(admin = %admin.name, imported = summary.imported, "imported requests");
    Ok((StatusCode::CREATED, Json(summary)))
}

fn export_file_name() -> String {
    let now = now_utc();
    format!(
        "requests_export_{:04}{:02}{:02}_{:02}{:02}{:02}.json",
        now.year(),
        u8::from(now.month()),
        now.day(),
        now.hour(),
        now.minute(),
        now.second()
    )
}

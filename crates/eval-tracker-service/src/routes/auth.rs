use axum::extract::{Query, State};
use axum::http::header::SET_COOKIE;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Redirect, Response};
use axum::Json;
use eval_tracker_api::new_session_id;
use eval_tracker_core::Identity;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::oauth::pkce_pair;
use crate::state::{session_cookie, ServiceFailure, ServiceState, SESSION_COOKIE};

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: String,
    state: String,
}

fn cookie_header(value: &str, max_age_secs: i64, secure: bool) -> String {
    let mut cookie =
        format!("{SESSION_COOKIE}={value}; Path=/; HttpOnly; SameSite=Lax; Max-Age={max_age_secs}");
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// Starts the sign-in flow. The new session ID doubles as the OAuth `state`.
pub async fn login(State(state): State<ServiceState>) -> Result<Response, ServiceFailure> {
    let session_id = new_session_id();
    let pkce = pkce_pair();
    let sessions = state.sessions.clone();
    let pending_id = session_id.clone();
    state
        .run_blocking("store_verifier", move || {
            sessions.store_verifier(&pending_id, &pkce.verifier)
        })
        .await?;

    let target = state.identity.authorization_url(&session_id, &pkce.challenge);
    let cookie = cookie_header(
        &session_id,
        state.sessions.lifetime().whole_seconds(),
        state.secure_cookies,
    );
    tracing::info!("redirecting to identity provider");
    Ok(([(SET_COOKIE, cookie)], Redirect::temporary(&target)).into_response())
}

pub async fn callback(
    State(state): State<ServiceState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> Result<Redirect, ServiceFailure> {
    if session_cookie(&headers).as_deref() != Some(query.state.as_str()) {
        tracing::warn!("state parameter does not match session cookie");
        return Err(state.reject(
            StatusCode::BAD_REQUEST,
            "invalid_state",
            "Invalid state parameter",
        ));
    }

    let sessions = state.sessions.clone();
    let pending_id = query.state.clone();
    let verifier = state
        .run_blocking("take_verifier", move || sessions.take_verifier(&pending_id))
        .await?
        .ok_or_else(|| {
            state.reject(
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                "Invalid state parameter - code verifier not found",
            )
        })?;

    let identity = state
        .identity
        .exchange_code(&query.code, &verifier)
        .await
        .map_err(|err| {
            tracing::error!(error = %format!("{err:#}"), "code exchange failed");
            state.reject(StatusCode::UNAUTHORIZED, "unauthorized", format!("{err:#}"))
        })?
        .with_admin_from(&state.admin_users);

    let sessions = state.sessions.clone();
    let session = state
        .run_blocking("create_session", move || sessions.create(&query.state, identity))
        .await?;
    tracing::info!(user = %session.user.name, admin = session.user.is_admin, "user signed in");
    Ok(Redirect::temporary("/"))
}

pub async fn me(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<Json<Identity>, ServiceFailure> {
    Ok(Json(state.current_user(&headers).await?))
}

pub async fn logout(
    State(state): State<ServiceState>,
    headers: HeaderMap,
) -> Result<impl IntoResponse, ServiceFailure> {
    if let Some(session_id) = session_cookie(&headers) {
        let sessions = state.sessions.clone();
        state
            .run_blocking("delete_session", move || sessions.delete(&session_id))
            .await?;
    }
    tracing::info!("user signed out");
    let cleared = cookie_header("", 0, state.secure_cookies);
    let body: Value = json!({"message": "Logged out successfully"});
    Ok(([(SET_COOKIE, cleared)], Json(body)))
}

#[cfg(test)]
mod tests {
    use axum::body::Body;
    use axum::http::header::{COOKIE, LOCATION};
    use http::Request;

    use super::*;
    use crate::routes::app;
    use crate::routes::tests::{response_json, send};
    use crate::state::testing::test_state;

    fn header(response: &Response, name: axum::http::HeaderName) -> String {
        response
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .map(ToString::to_string)
            .unwrap_or_default()
    }

    fn get(uri: &str, cookie: Option<&str>) -> Request<Body> {
        let mut builder = Request::builder().uri(uri).method("GET");
        if let Some(cookie) = cookie {
            builder = builder.header(COOKIE, cookie);
        }
        builder
            .body(Body::empty())
            .unwrap_or_else(|err| panic!("failed to build request: {err}"))
    }

    #[tokio::test]
    async fn login_callback_me_logout() {
        let state = test_state();
        let router = app(state.clone());

        let response = send(router.clone(), get("/api/auth/login", None)).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        let set_cookie = header(&response, SET_COOKIE);
        assert!(set_cookie.contains("HttpOnly"));
        assert!(set_cookie.contains("SameSite=Lax"));
        assert!(set_cookie.contains("Max-Age=86400"));
        let cookie = set_cookie
            .split(';')
            .next()
            .map(ToString::to_string)
            .unwrap_or_default();
        let session_id = cookie.trim_start_matches("session_id=").to_string();
        let location = header(&response, LOCATION);
        assert_eq!(
            location,
            format!("/api/auth/callback?code=dev&state={session_id}")
        );

        let response = send(
            router.clone(),
            get("/api/auth/callback?code=dev&state=forged", Some(&cookie)),
        )
        .await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);

        let response = send(router.clone(), get(&location, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(header(&response, LOCATION), "/");

        // The verifier is single use.
        let response = send(router.clone(), get(&location, Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

        let response = send(router.clone(), get("/api/auth/me", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::OK);
        let me = response_json(response).await;
        assert_eq!(me["name"], serde_json::json!("Dev User"));
        assert_eq!(me["is_admin"], serde_json::json!(true));

        let logout = Request::builder()
            .uri("/api/auth/logout")
            .method("POST")
            .header(COOKIE, &cookie)
            .body(Body::empty())
            .unwrap_or_else(|err| panic!("failed to build request: {err}"));
        let response = send(router.clone(), logout).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(header(&response, SET_COOKIE).contains("Max-Age=0"));
        assert_eq!(
            response_json(response).await,
            serde_json::json!({"message": "Logged out successfully"})
        );

        let response = send(router, get("/api/auth/me", Some(&cookie))).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        assert!(matches!(state.sessions.get(&session_id), Ok(None)));
    }

    #[test]
    fn secure_flag_is_opt_in() {
        assert!(!cookie_header("abc", 60, false).contains("Secure"));
        assert!(cookie_header("abc", 60, true).ends_with("; Secure"));
    }
}

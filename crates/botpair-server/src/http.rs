//! HTTP request handlers
//!
//! Login endpoints live under `/auth/<provider>/`, mirroring the layout the
//! web application expects from every auth provider.

use axum::{
    extract::{Query, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use botpair_core::User;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

use crate::handshake::HandshakeError;
use crate::session::{cookie_value, SESSION_COOKIE};
use crate::state::AppState;

/// Create the main application router
pub fn create_router(state: Arc<AppState>) -> Router {
    let base = format!("/auth/{}", state.handshake.provider());

    Router::new()
        .route(&format!("{}/login", base), get(login_handler))
        .route(&format!("{}/callback", base), get(callback_handler))
        .route(&format!("{}/logout", base), get(logout_handler))
        .route("/auth/user", get(user_handler))
        .with_state(state)
}

/// JSON error body
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: message.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for HandshakeError {
    fn into_response(self) -> Response {
        let status = match self {
            HandshakeError::Expired | HandshakeError::NotConfirmed => StatusCode::NOT_FOUND,
            HandshakeError::Create(_)
            | HandshakeError::AvatarSave(_)
            | HandshakeError::SessionIssue(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        error_response(status, self.to_string())
    }
}

/// Query parameters for the login endpoint
#[derive(Debug, Deserialize)]
pub struct LoginQuery {
    #[serde(default)]
    token: Option<String>,
}

/// Start or complete a login
///
/// Without `token`, returns a new pairing token as plain text. With `token`,
/// returns the user once the bot confirmed it, or a 404 while it is pending
/// or after it expired.
async fn login_handler(
    State(state): State<Arc<AppState>>,
    Query(query): Query<LoginQuery>,
) -> Result<Response, HandshakeError> {
    match query.token.filter(|t| !t.is_empty()) {
        None => {
            let token = state.handshake.initiate().await?;
            Ok((
                StatusCode::OK,
                [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
                token,
            )
                .into_response())
        }
        Some(token) => {
            let login = state.handshake.poll(&token).await?;
            Ok((
                StatusCode::OK,
                [(header::SET_COOKIE, login.session.set_cookie)],
                Json(login.user),
            )
                .into_response())
        }
    }
}

/// Present for framework compatibility; does nothing
async fn callback_handler(State(state): State<Arc<AppState>>) -> StatusCode {
    state.handshake.callback();
    StatusCode::OK
}

/// Clear the caller's session
async fn logout_handler(State(state): State<Arc<AppState>>, headers: HeaderMap) -> Response {
    let artifact = state.handshake.logout(session_id(&headers)).await;
    (StatusCode::OK, [(header::SET_COOKIE, artifact.set_cookie)]).into_response()
}

/// Return the user of the current session
async fn user_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<User>, Response> {
    let Some(id) = session_id(&headers) else {
        return Err(error_response(StatusCode::UNAUTHORIZED, "not logged in"));
    };
    debug!("Resolving session user");
    state
        .handshake
        .current_user(id)
        .await
        .map(Json)
        .ok_or_else(|| error_response(StatusCode::UNAUTHORIZED, "not logged in"))
}

fn session_id(headers: &HeaderMap) -> Option<&str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|cookies| cookie_value(cookies, SESSION_COOKIE))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handshake::Handshake;
    use crate::session::{MemorySessionIssuer, PassthroughAvatars};
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use botpair_auth::RequestStore;
    use botpair_core::{Config, UserIdentity};
    use std::time::Duration;
    use tower::ServiceExt;

    fn app() -> (Router, Arc<RequestStore>) {
        let store = Arc::new(RequestStore::new());
        let config = Config::default();
        let handshake = Handshake::new(
            store.clone(),
            &config,
            Arc::new(PassthroughAvatars),
            Arc::new(MemorySessionIssuer::new(Duration::from_secs(60))),
        );
        let state = Arc::new(AppState::new(handshake));
        (create_router(state), store)
    }

    async fn get(router: &Router, uri: &str, cookie: Option<&str>) -> Response {
        let mut request = Request::builder().uri(uri);
        if let Some(cookie) = cookie {
            request = request.header(header::COOKIE, cookie);
        }
        router
            .clone()
            .oneshot(request.body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    async fn body_string(response: Response) -> String {
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    async fn error_message(response: Response) -> String {
        let body: ErrorResponse = serde_json::from_str(&body_string(response).await).unwrap();
        body.error
    }

    #[tokio::test]
    async fn test_login_issues_token() {
        let (router, store) = app();

        let response = get(&router, "/auth/telegram/login", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let token = body_string(response).await;
        assert!(!token.is_empty());
        assert!(store.get(&token).await.is_ok());
    }

    #[tokio::test]
    async fn test_poll_statuses() {
        let (router, _store) = app();

        let response = get(&router, "/auth/telegram/login?token=unknown", None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_message(response).await, "request expired");

        let token = body_string(get(&router, "/auth/telegram/login", None).await).await;
        let response = get(&router, &format!("/auth/telegram/login?token={}", token), None).await;
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(error_message(response).await, "request not yet confirmed");
    }

    #[tokio::test]
    async fn test_confirmed_login_sets_session() {
        let (router, store) = app();
        let token = body_string(get(&router, "/auth/telegram/login", None).await).await;
        store
            .confirm(
                &token,
                UserIdentity {
                    external_id: 42,
                    display_name: "Alice".to_string(),
                    avatar_url: String::new(),
                },
            )
            .await
            .unwrap();

        let uri = format!("/auth/telegram/login?token={}", token);
        let response = get(&router, &uri, None).await;
        assert_eq!(response.status(), StatusCode::OK);
        let set_cookie = response
            .headers()
            .get(header::SET_COOKIE)
            .unwrap()
            .to_str()
            .unwrap()
            .to_string();
        let user: User = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(user.name, "Alice");
        assert!(user.id.starts_with("telegram_"));

        let cookie = set_cookie.split(';').next().unwrap().to_string();
        let response = get(&router, "/auth/user", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let me: User = serde_json::from_str(&body_string(response).await).unwrap();
        assert_eq!(me, user);

        let response = get(&router, &uri, None).await;
        assert_eq!(error_message(response).await, "request expired");

        let response = get(&router, "/auth/telegram/logout", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::OK);
        let cleared = response.headers().get(header::SET_COOKIE).unwrap();
        assert!(cleared.to_str().unwrap().contains("Max-Age=0"));

        let response = get(&router, "/auth/user", Some(&cookie)).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_callback_is_noop() {
        let (router, store) = app();
        let response = get(&router, "/auth/telegram/callback", None).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_user_without_cookie() {
        let (router, _store) = app();
        let response = get(&router, "/auth/user", None).await;
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }
}

//! Edge validation and trust boundary filters
//!
//! Two sides of the same trust handoff:
//!
//! - [`edge_auth`] runs at the gateway. It verifies the bearer token
//!   and rewrites the forwarded request to carry the verdict in the
//!   trusted identity headers. Client-supplied values of those headers
//!   are removed unconditionally before anything else happens, so a
//!   forged identity never crosses the edge.
//! - [`trust_boundary`] runs inside each internal service. It treats
//!   the trusted headers as authoritative with no cryptographic
//!   re-check.
//!
//! The model is sound only under the topology invariant that internal
//! services are network-reachable exclusively through the edge. Deploy
//! a service where clients can reach it directly and [`trust_boundary`]
//! will believe anything they send; see the tests pinning the
//! overwrite behavior at the edge.

use std::sync::Arc;

use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderValue, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use palisade_core::TokenCodec;

use crate::{error::ErrorBody, extractors::AuthContext};

/// Header carrying the authenticated subject across the edge.
pub const USERNAME_HEADER: &str = "x-username";
/// Header carrying the comma-joined role list across the edge.
pub const ROLES_HEADER: &str = "x-user-roles";
/// Role assumed when a verified token carries no role claims.
pub const DEFAULT_ROLE: &str = "CUSTOMER";

#[derive(Clone)]
pub struct EdgeState {
    pub codec: Arc<TokenCodec>,
}

/// Gateway-side validation filter for protected routes.
///
/// Requires `Authorization: Bearer <token>`; a missing header, a
/// non-Bearer scheme, and a token that fails verification all reject
/// with the same unauthenticated status — the client's required action
/// is re-authentication in every case.
pub async fn edge_auth(
    State(state): State<EdgeState>,
    mut request: Request,
    next: Next,
) -> Response {
    strip_identity_headers(request.headers_mut());

    let path = request.uri().path().to_string();

    let Some(token) = bearer_token(request.headers()) else {
        tracing::warn!(path, "missing or malformed Authorization header");
        return unauthorized(
            "Missing or malformed Authorization header",
            &path,
            correlation_id(request.headers()),
        );
    };

    let claims = match state.codec.verify(&token) {
        Ok(claims) => claims,
        Err(_) => {
            tracing::warn!(path, "token verification failed");
            return unauthorized(
                "Invalid or expired token",
                &path,
                correlation_id(request.headers()),
            );
        }
    };

    let roles = if claims.roles.is_empty() {
        DEFAULT_ROLE.to_string()
    } else {
        claims.roles.join(",")
    };

    let (Ok(subject_value), Ok(roles_value)) = (
        HeaderValue::from_str(&claims.sub),
        HeaderValue::from_str(&roles),
    ) else {
        // Claims that cannot be carried in a header are not identity
        // we can propagate.
        tracing::warn!(path, "token claims not representable as headers");
        return unauthorized(
            "Invalid or expired token",
            &path,
            correlation_id(request.headers()),
        );
    };

    request.headers_mut().insert(USERNAME_HEADER, subject_value);
    request.headers_mut().insert(ROLES_HEADER, roles_value);

    tracing::debug!(path, subject = %claims.sub, roles = %roles, "token validated at edge");
    next.run(request).await
}

/// Strips the trusted identity headers without requiring a token.
///
/// Applied to anonymous-allowed routes so that the forged-header
/// guarantee holds on every path through the edge, not only the
/// protected ones.
pub async fn sanitize_identity_headers(mut request: Request, next: Next) -> Response {
    strip_identity_headers(request.headers_mut());
    next.run(request).await
}

/// Service-side trust boundary filter.
///
/// Reads the trusted identity headers and, when present, establishes
/// the caller's [`AuthContext`] with no further verification. Requests
/// without the headers proceed anonymously; routes decide for
/// themselves via the extractors.
pub async fn trust_boundary(mut request: Request, next: Next) -> Response {
    let username = request
        .headers()
        .get(USERNAME_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    if let Some(username) = username {
        let roles = parse_roles(request.headers().get(ROLES_HEADER));
        tracing::debug!(username = %username, roles = ?roles, "request authenticated via gateway headers");
        request
            .extensions_mut()
            .insert(AuthContext { username, roles });
    }

    next.run(request).await
}

fn strip_identity_headers(headers: &mut HeaderMap) {
    headers.remove(USERNAME_HEADER);
    headers.remove(ROLES_HEADER);
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get("Authorization")
        .and_then(|header| header.to_str().ok())
        .and_then(|header| header.strip_prefix("Bearer "))
        .filter(|token| !token.is_empty())
        .map(|token| token.to_string())
}

fn parse_roles(header: Option<&HeaderValue>) -> Vec<String> {
    let roles: Vec<String> = header
        .and_then(|v| v.to_str().ok())
        .map(|s| {
            s.split(',')
                .map(str::trim)
                .filter(|r| !r.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    if roles.is_empty() {
        vec![DEFAULT_ROLE.to_string()]
    } else {
        roles
    }
}

/// Correlation id for boundary rejections: the caller's `x-request-id`
/// when present, a fresh id otherwise.
pub(crate) fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get("x-request-id")
        .and_then(|v| v.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

fn unauthorized(message: &str, path: &str, correlation_id: String) -> Response {
    ErrorBody::new(StatusCode::UNAUTHORIZED, message)
        .with_path(path)
        .with_correlation_id(correlation_id)
        .into_response()
}

#[cfg(test)]
mod tests {
    use axum::{Json, Router, body::Body, http::Request as HttpRequest, routing::get};
    use chrono::Duration;
    use palisade_core::{Claims, TokenConfig};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    use super::*;
    use crate::extractors::OptionalAuthUser;

    const TEST_SECRET: &[u8] = b"test_secret_key_for_middleware_tests_only";

    fn codec() -> Arc<TokenCodec> {
        Arc::new(TokenCodec::new(TokenConfig::new(TEST_SECRET)))
    }

    async fn echo_identity(headers: HeaderMap) -> Json<Value> {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Json(json!({
            "username": get(USERNAME_HEADER),
            "roles": get(ROLES_HEADER),
        }))
    }

    fn edge_app() -> Router {
        let state = EdgeState { codec: codec() };
        Router::new()
            .route("/downstream", get(echo_identity))
            .layer(axum::middleware::from_fn_with_state(state, edge_auth))
    }

    async fn body_json(response: Response) -> Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn missing_authorization_header_rejected() {
        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        assert_eq!(body["success"], false);
        assert_eq!(body["status"], 401);
        assert_eq!(body["path"], "/downstream");
        assert!(body.get("correlationId").is_some());
    }

    #[tokio::test]
    async fn non_bearer_scheme_rejected() {
        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .header("Authorization", "Basic YWxpY2U6cHcx")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn garbage_token_rejected() {
        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .header("Authorization", "Bearer not.a.token")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn expired_token_rejected_identically() {
        let codec = codec();
        let claims = Claims::new(
            "alice",
            vec!["CUSTOMER".to_string()],
            chrono::Utc::now() - Duration::hours(2),
            Duration::hours(1),
        );
        let token = codec.encode(&claims).unwrap();

        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        let body = body_json(response).await;
        // Same message as a forged token: no oracle for the client
        assert_eq!(body["message"], "Invalid or expired token");
    }

    #[tokio::test]
    async fn valid_token_rewrites_identity_headers() {
        let token = codec()
            .issue("alice", vec!["ADMIN".to_string()], Duration::hours(1))
            .unwrap();

        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["roles"], "ADMIN");
    }

    #[tokio::test]
    async fn forged_identity_headers_are_overwritten() {
        let token = codec()
            .issue("alice", vec!["CUSTOMER".to_string()], Duration::hours(1))
            .unwrap();

        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .header("Authorization", format!("Bearer {token}"))
                    .header(USERNAME_HEADER, "mallory")
                    .header(ROLES_HEADER, "ADMIN")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let body = body_json(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["roles"], "CUSTOMER");
    }

    #[tokio::test]
    async fn forged_headers_without_token_never_forwarded() {
        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .header(USERNAME_HEADER, "mallory")
                    .header(ROLES_HEADER, "ADMIN")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn empty_role_claims_default_to_baseline() {
        let token = codec().issue("alice", vec![], Duration::hours(1)).unwrap();

        let response = edge_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/downstream")
                    .header("Authorization", format!("Bearer {token}"))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["roles"], DEFAULT_ROLE);
    }

    #[tokio::test]
    async fn sanitizer_strips_headers_on_anonymous_routes() {
        let app = Router::new()
            .route("/public", get(echo_identity))
            .layer(axum::middleware::from_fn(sanitize_identity_headers));

        let response = app
            .oneshot(
                HttpRequest::builder()
                    .uri("/public")
                    .header(USERNAME_HEADER, "mallory")
                    .header(ROLES_HEADER, "ADMIN")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["username"], Value::Null);
        assert_eq!(body["roles"], Value::Null);
    }

    async fn whoami(OptionalAuthUser(ctx): OptionalAuthUser) -> Json<Value> {
        match ctx {
            Some(ctx) => Json(json!({"username": ctx.username, "roles": ctx.roles})),
            None => Json(json!({"username": Value::Null})),
        }
    }

    fn service_app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(axum::middleware::from_fn(trust_boundary))
    }

    #[tokio::test]
    async fn trust_boundary_believes_headers() {
        let response = service_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header(USERNAME_HEADER, "alice")
                    .header(ROLES_HEADER, "CUSTOMER, ADMIN")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["username"], "alice");
        assert_eq!(body["roles"], json!(["CUSTOMER", "ADMIN"]));
    }

    #[tokio::test]
    async fn trust_boundary_defaults_roles() {
        let response = service_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .header(USERNAME_HEADER, "alice")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["roles"], json!([DEFAULT_ROLE]));
    }

    #[tokio::test]
    async fn absent_headers_mean_anonymous() {
        let response = service_app()
            .oneshot(
                HttpRequest::builder()
                    .uri("/whoami")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        let body = body_json(response).await;
        assert_eq!(body["username"], Value::Null);
    }
}

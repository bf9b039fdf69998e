use std::sync::Arc;

use async_trait::async_trait;
use axum_extra::extract::CookieJar;
use serde::{Deserialize, Serialize};

use axum::{
    extract::{
        Request,
        State,
    },
    http::{HeaderMap, StatusCode},
    middleware::Next,
    response::Response
};

// a tower middleware that reads the auth token from the Authorization header or the session cookie, and
// delegates resolving it into a user to the auth service. The resolved session is attached to the request
// as an extension; whether a route requires a user is up to the handler.

pub const CLIENT_IP_HEADER: &str = "X-Client-IP";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserInfo {
    pub user_id: String,
}

/// Session of the current request. `None` means the caller did not present a valid token.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session(pub Option<UserInfo>);

impl Session {
    pub fn anonymous() -> Self {
        Session(None)
    }

    pub fn user(&self) -> Option<&UserInfo> {
        self.0.as_ref()
    }

    pub fn user_id(&self) -> Option<&str> {
        self.0.as_ref().map(|user| user.user_id.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("auth service request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("auth service responded with status {0}")]
    Upstream(u16),
}

#[async_trait]
pub trait SessionResolver: Send + Sync {
    /// Returns the user behind the request headers, or `None` for an unauthenticated caller.
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<UserInfo>, SessionError>;
}

/// Bearer token from the Authorization header, falling back to the `session` cookie.
pub fn session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(auth_header) = headers.get("Authorization") {
        if let Ok(auth_value) = auth_header.to_str() {
            if let Some(token) = auth_value.strip_prefix("Bearer ") {
                if !token.is_empty() {
                    return Some(token.to_string());
                }
            }
        }
    }

    let cookie_jar = CookieJar::from_headers(headers);
    cookie_jar
        .get("session")
        .map(|cookie| cookie.value().to_string())
        .filter(|token| !token.is_empty())
}

#[derive(Serialize)]
struct SessionLookup<'a> {
    token: &'a str,
}

/// Resolves sessions through the auth service's `/auth/session` endpoint.
pub struct AuthServiceResolver {
    client: reqwest::Client,
    auth_service_url: String,
}

impl AuthServiceResolver {
    pub fn new(auth_service_url: &str) -> Self {
        AuthServiceResolver {
            client: reqwest::Client::new(),
            auth_service_url: auth_service_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl SessionResolver for AuthServiceResolver {
    async fn resolve(&self, headers: &HeaderMap) -> Result<Option<UserInfo>, SessionError> {
        let Some(token) = session_token(headers) else {
            return Ok(None);
        };

        let mut request = self.client
            .post(format!("{}/auth/session", self.auth_service_url))
            .json(&SessionLookup { token: &token });

        // the auth service binds tokens to the client ip, so pass it on when the proxy gave us one
        if let Some(client_ip) = headers.get(CLIENT_IP_HEADER) {
            request = request.header(CLIENT_IP_HEADER, client_ip.clone());
        }

        let response = request.send().await?;

        match response.status() {
            status if status.is_success() => Ok(Some(response.json::<UserInfo>().await?)),
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                tracing::debug!("Auth service rejected session token");
                Ok(None)
            }
            status => Err(SessionError::Upstream(status.as_u16())),
        }
    }
}

pub async fn session_middleware(
    State(resolver): State<Arc<dyn SessionResolver>>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    match resolver.resolve(req.headers()).await {
        Ok(user) => {
            req.extensions_mut().insert(Session(user));
            Ok(next.run(req).await)
        }
        Err(err) => {
            tracing::error!("Failed to resolve session: {}", err);
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

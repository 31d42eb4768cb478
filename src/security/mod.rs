//! HTTP Basic authentication.
//!
//! [`BasicAuthMiddleware`] guards every path under a prefix (all paths by
//! default) and answers anything without valid credentials with `401` and a
//! `WWW-Authenticate` challenge. Paths outside the prefix pass through, so
//! `/health` stays reachable for health checks.

use base64::{Engine as _, engine::general_purpose::STANDARD};
use tracing::debug;

use crate::{
    Response, StatusCode,
    context::Context,
    middleware::{BoxResponse, Middleware, Next},
};

/// Checks `Authorization: Basic …` against one fixed user.
///
/// # Examples
///
/// ```rust,no_run
/// use imgresize::Router;
/// use imgresize::security::BasicAuthMiddleware;
///
/// let mut router = Router::new();
/// router.layer(BasicAuthMiddleware::new("imgresize", "admin", "secret").scope("/v1"));
/// ```
pub struct BasicAuthMiddleware {
    realm: String,
    username: String,
    password: String,
    scope: Option<String>,
}

impl BasicAuthMiddleware {
    pub fn new(realm: impl Into<String>, username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            realm: realm.into(),
            username: username.into(),
            password: password.into(),
            scope: None,
        }
    }

    /// Restricts the check to `prefix` and the paths below it.
    #[must_use]
    pub fn scope(mut self, prefix: impl Into<String>) -> Self {
        self.scope = Some(prefix.into());
        self
    }

    fn guards(&self, path: &str) -> bool {
        match &self.scope {
            None => true,
            Some(prefix) => match path.strip_prefix(prefix.as_str()) {
                Some(rest) => rest.is_empty() || rest.starts_with('/'),
                None => false,
            },
        }
    }

    fn is_authorized(&self, header: Option<&str>) -> bool {
        let Some(encoded) = header.and_then(|h| h.strip_prefix("Basic ")) else {
            return false;
        };
        let Ok(decoded) = STANDARD.decode(encoded.trim()) else {
            return false;
        };
        let Ok(credentials) = String::from_utf8(decoded) else {
            return false;
        };
        match credentials.split_once(':') {
            Some((user, pass)) => user == self.username && pass == self.password,
            None => false,
        }
    }

    fn challenge(&self) -> Response {
        Response::error(StatusCode::Unauthorized, "unauthorized")
            .header("WWW-Authenticate", format!("Basic realm=\"{}\"", self.realm))
    }
}

impl Middleware for BasicAuthMiddleware {
    fn handle(&self, ctx: Context, next: Next) -> BoxResponse {
        let request = ctx.request();
        if !self.guards(request.path()) || self.is_authorized(request.headers().get("authorization")) {
            return Box::pin(next.run(ctx));
        }

        debug!(path = %request.path(), "rejecting unauthenticated request");
        let response = self.challenge();
        Box::pin(async move { response })
    }
}

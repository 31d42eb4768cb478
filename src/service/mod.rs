//! The resize HTTP service: routes, shared state, and the serve loop.
//!
//! | Route                  | Auth | Handler                      |
//! |------------------------|------|------------------------------|
//! | `GET /health`          | no   | [`handlers::health`]         |
//! | `POST /v1/resize`      | yes  | [`handlers::resize`]         |
//! | `GET /v1/image/:id`    | yes  | [`handlers::image`]          |

use std::future::Future;
use std::sync::Arc;

use tracing::info;

use crate::cache::ImageCache;
use crate::config::Settings;
use crate::context::Context;
use crate::middleware::LoggerMiddleware;
use crate::resize::Resizer;
use crate::security::BasicAuthMiddleware;
use crate::server::{Server, ServerError};
use crate::Router;

pub mod handlers;

/// State shared by every request.
pub struct AppState {
    pub settings: Settings,
    pub cache: Arc<dyn ImageCache>,
    pub resizer: Arc<Resizer>,
}

/// Builds the service router: request logging, basic auth over `/v1`, and
/// the three routes.
pub fn build_router(state: Arc<AppState>) -> Router {
    let mut router = Router::new();
    let auth = &state.settings.auth;

    router.layer(LoggerMiddleware);
    router.layer(BasicAuthMiddleware::new(&auth.realm, &auth.username, &auth.password).scope("/v1"));

    router.get("/health", handlers::health);

    let s = Arc::clone(&state);
    router.post("/v1/resize", move |ctx: Context| {
        let state = Arc::clone(&s);
        async move { handlers::resize(&state, ctx).await }
    });

    let s = Arc::clone(&state);
    router.get("/v1/image/:id", move |ctx: Context| {
        let state = Arc::clone(&s);
        async move { handlers::image(&state, ctx).await }
    });

    router
}

/// Serves the API on `server` until `shutdown` resolves.
///
/// Connections still open after the configured graceful timeout are
/// aborted. The caller owns the resizer and shuts it down afterwards.
///
/// # Errors
///
/// Returns [`ServerError::Io`] if the listener fails.
pub async fn serve<S>(server: Server, state: Arc<AppState>, shutdown: S) -> Result<(), ServerError>
where
    S: Future<Output = ()> + Send,
{
    let grace = state.settings.http.server_graceful_shutdown_timeout;
    let router = Arc::new(build_router(state));

    server
        .max_body_size(handlers::MAX_RESIZE_BODY)
        .run_until(
            move |req| {
                let router = Arc::clone(&router);
                async move { router.route(req).await }
            },
            shutdown,
            grace,
        )
        .await?;

    info!("server stopped");
    Ok(())
}

/// Resolves on the first SIGINT, SIGTERM, or SIGHUP.
#[cfg(unix)]
pub async fn shutdown_signal() {
    use tokio::signal::unix::{SignalKind, signal};

    let (Ok(mut term), Ok(mut hup)) = (signal(SignalKind::terminate()), signal(SignalKind::hangup())) else {
        tracing::warn!("could not install signal handlers, falling back to ctrl-c");
        let _ = tokio::signal::ctrl_c().await;
        return;
    };

    let name = tokio::select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = term.recv() => "SIGTERM",
        _ = hup.recv() => "SIGHUP",
    };
    info!(signal = name, "shutdown signal received");
}

/// Resolves on ctrl-c.
#[cfg(not(unix))]
pub async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use base64::{Engine as _, engine::general_purpose::STANDARD};
    use bytes::Bytes;

    use super::*;
    use crate::cache::LruImageCache;
    use crate::model::ImageKey;
    use crate::resize::{Fetcher, ResizerConfig, ResizingProgress};
    use crate::{Request, Response, StatusCode};

    fn settings(async_resize: bool) -> Settings {
        let flag = if async_resize { "true" } else { "false" };
        Settings::from_lookup(|name| match name {
            "AUTH_USERNAME" => Some("admin".to_owned()),
            "AUTH_PASSWORD" => Some("secret".to_owned()),
            "SVC_ASYNC_RESIZE" => Some(flag.to_owned()),
            _ => None,
        })
        .unwrap()
    }

    fn state(async_resize: bool) -> Arc<AppState> {
        let settings = settings(async_resize);
        let cache: Arc<dyn ImageCache> = Arc::new(LruImageCache::new(8).unwrap());
        let fetcher = Fetcher::new("test", Duration::from_millis(200), 1024).unwrap();
        let progress = Arc::new(ResizingProgress::new(Duration::from_millis(50)));
        let resizer = Resizer::new(
            ResizerConfig::from(&settings),
            Arc::clone(&cache),
            fetcher,
            progress,
        );
        Arc::new(AppState {
            settings,
            cache,
            resizer: Arc::new(resizer),
        })
    }

    fn request(method: &str, path: &str, body: &str, auth: bool) -> Request {
        let auth = if auth {
            format!("Authorization: Basic {}\r\n", STANDARD.encode("admin:secret"))
        } else {
            String::new()
        };
        let raw = format!(
            "{method} {path} HTTP/1.1\r\n{auth}Content-Length: {}\r\n\r\n",
            body.len()
        );
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        req.with_body(Bytes::copy_from_slice(body.as_bytes()))
    }

    async fn call(state: &Arc<AppState>, req: Request) -> Response {
        build_router(Arc::clone(state)).route(req).await
    }

    fn error_of(res: &Response) -> String {
        let v: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        v["error"].as_str().unwrap_or_default().to_owned()
    }

    #[tokio::test]
    async fn health_needs_no_auth() {
        let res = call(&state(true), request("GET", "/health", "", false)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.body_ref().as_ref(), b"ok\n");
    }

    #[tokio::test]
    async fn api_requires_auth() {
        let st = state(true);
        let res = call(&st, request("POST", "/v1/resize", "{}", false)).await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
        let res = call(&st, request("GET", "/v1/image/abc", "", false)).await;
        assert_eq!(res.status(), StatusCode::Unauthorized);
    }

    #[tokio::test]
    async fn bad_resize_bodies_are_rejected() {
        let st = state(true);

        let res = call(&st, request("POST", "/v1/resize", "not json", true)).await;
        assert_eq!(res.status(), StatusCode::BadRequest);

        let big = format!(r#"{{"urls":["{}"],"width":10}}"#, "a".repeat(handlers::MAX_RESIZE_BODY));
        let res = call(&st, request("POST", "/v1/resize", &big, true)).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert!(error_of(&res).contains("exceeds"));

        let urls: Vec<String> = (0..=handlers::MAX_URLS).map(|i| format!("http://h/{i}")).collect();
        let body = serde_json::json!({ "urls": urls, "width": 10 }).to_string();
        let res = call(&st, request("POST", "/v1/resize", &body, true)).await;
        assert_eq!(res.status(), StatusCode::BadRequest);
        assert!(error_of(&res).contains("too many urls"));
    }

    #[tokio::test]
    async fn async_request_when_disabled_is_424() {
        let st = state(false);
        let body = r#"{"urls":["http://127.0.0.1:9/a.jpg"],"width":10}"#;
        let res = call(&st, request("POST", "/v1/resize?async=true", body, true)).await;
        assert_eq!(res.status(), StatusCode::FailedDependency);
    }

    #[tokio::test]
    async fn sync_is_201_and_async_is_200() {
        let st = state(true);
        let key = ImageKey::derive("http://127.0.0.1:9/a.jpg", 10, 0);
        st.cache.put(&key, Bytes::from_static(b"jpeg")).await;
        let body = r#"{"urls":["http://127.0.0.1:9/a.jpg"],"width":10}"#;

        let res = call(&st, request("POST", "/v1/resize", body, true)).await;
        assert_eq!(res.status(), StatusCode::Created);
        let outcomes: serde_json::Value = serde_json::from_slice(res.body_ref()).unwrap();
        assert_eq!(outcomes[0]["result"], "success");
        assert_eq!(outcomes[0]["cached"], true);
        assert_eq!(outcomes[0]["id"], key.as_str());

        let res = call(&st, request("POST", "/v1/resize?async=1", body, true)).await;
        assert_eq!(res.status(), StatusCode::Ok);
    }

    #[tokio::test]
    async fn image_lookup() {
        let st = state(true);
        let key = ImageKey::derive("http://origin/cat.jpg", 10, 0);
        let path = format!("/v1/image/{key}");

        let res = call(&st, request("GET", &path, "", true)).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(error_of(&res), "image not cached");

        st.cache.put(&key, Bytes::from_static(b"\xff\xd8jpeg")).await;
        let res = call(&st, request("GET", &path, "", true)).await;
        assert_eq!(res.status(), StatusCode::Ok);
        assert_eq!(res.headers().get("content-type"), Some("image/jpeg"));
        assert_eq!(res.body_ref().as_ref(), b"\xff\xd8jpeg");
    }

    #[tokio::test]
    async fn image_waits_then_times_out() {
        let st = state(true);
        let key = ImageKey::derive("http://origin/slow.jpg", 10, 0);
        assert!(!st.resizer.progress().check_and_set_resizing(&key));

        let res = call(&st, request("GET", &format!("/v1/image/{key}"), "", true)).await;
        assert_eq!(res.status(), StatusCode::NotFound);
        assert_eq!(error_of(&res), "image resize timeout");
    }
}

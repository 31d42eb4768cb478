//! Route handlers for the resize API.

use tracing::{error, warn};

use super::AppState;
use crate::context::Context;
use crate::model::{ImageKey, ResizeRequest};
use crate::{Response, StatusCode};

/// Largest accepted `POST /v1/resize` body.
pub const MAX_RESIZE_BODY: usize = 8 * 1024;

/// Most URLs accepted in one batch.
pub const MAX_URLS: usize = 100;

pub async fn health(_ctx: Context) -> Response {
    Response::new(StatusCode::Ok).body("ok\n")
}

fn wants_async(ctx: &Context) -> bool {
    matches!(ctx.request().query_param("async"), Some("true" | "1"))
}

/// `POST /v1/resize[?async=true]`
pub async fn resize(state: &AppState, ctx: Context) -> Response {
    if ctx.request().body().len() > MAX_RESIZE_BODY {
        return Response::error(
            StatusCode::BadRequest,
            format!("request body exceeds {MAX_RESIZE_BODY} bytes"),
        );
    }

    let request: ResizeRequest = match ctx.json() {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "invalid resize request");
            return Response::error(StatusCode::BadRequest, format!("invalid request: {e}"));
        }
    };

    if request.urls.len() > MAX_URLS {
        return Response::error(
            StatusCode::BadRequest,
            format!("too many urls: {} (max {MAX_URLS})", request.urls.len()),
        );
    }

    let (result, status) = if wants_async(&ctx) {
        if !state.resizer.is_async_enabled() {
            return Response::error(StatusCode::FailedDependency, "async resize is disabled");
        }
        (state.resizer.process_async(&request).await, StatusCode::Ok)
    } else {
        (state.resizer.process(&request).await, StatusCode::Created)
    };

    match result {
        Ok(outcomes) => Response::json(status, &outcomes),
        Err(e) => {
            error!(error = %e, urls = request.urls.len(), "resize batch failed");
            Response::error(StatusCode::InternalServerError, e.to_string())
        }
    }
}

/// `GET /v1/image/:id`
pub async fn image(state: &AppState, ctx: Context) -> Response {
    let Some(id) = ctx.params().get("id") else {
        return Response::error(StatusCode::BadRequest, "missing image id");
    };
    let key = ImageKey::from(id);

    if !state.resizer.progress().wait_for_resizing_done(&key).await {
        return Response::error(StatusCode::NotFound, "image resize timeout");
    }

    match state.cache.get(&key).await {
        Some(data) => Response::new(StatusCode::Ok)
            .header("Content-Type", "image/jpeg")
            .body_bytes(data),
        None => Response::error(StatusCode::NotFound, "image not cached"),
    }
}

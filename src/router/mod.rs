//! Request routing: map a method and URL pattern to a handler.
//!
//! | Pattern          | Example match      | Captured params |
//! |------------------|--------------------|-----------------|
//! | `/health`        | `/health`          | *(none)*        |
//! | `/v1/image/:id`  | `/v1/image/ab12…`  | `id → "ab12…"`  |
//!
//! Trailing slashes are ignored on both sides. Routes are tried in
//! registration order and the first match wins. Every request, matched or
//! not, runs through the middleware registered with [`Router::layer`].

use std::future::Future;
use std::sync::Arc;

use crate::context::{Context, PathParams};
use crate::middleware::{self, BoxResponse, Handler, Middleware, MiddlewareHandler, Next};
use crate::{Method, Request, Response, StatusCode};

/// Conversion trait for async handler functions.
///
/// Implemented for every `Fn(Context) -> impl Future<Output = Response>`
/// that is `Send + Sync + 'static`.
pub trait IntoHandler: Send + Sync + 'static {
    fn call(&self, ctx: Context) -> BoxResponse;
}

impl<T, F> IntoHandler for T
where
    T: Fn(Context) -> F + Send + Sync + 'static,
    F: Future<Output = Response> + Send + 'static,
{
    fn call(&self, ctx: Context) -> BoxResponse {
        Box::pin((self)(ctx))
    }
}

#[derive(Debug, Clone)]
enum Segment {
    Static(String),
    Parameter(String),
}

#[derive(Debug, Clone)]
enum Pattern {
    Exact(String),
    Parameterized { segments: Vec<Segment> },
}

fn trim_trailing_slash(path: &str) -> &str {
    match path.strip_suffix('/') {
        Some(trimmed) if !trimmed.is_empty() => trimmed,
        _ => path,
    }
}

impl Pattern {
    /// Compiles `pattern`. Any `:name` segment makes it parameterized.
    fn parse(pattern: &str) -> Self {
        let pattern = trim_trailing_slash(pattern);

        if !pattern.contains(':') {
            return Pattern::Exact(pattern.to_owned());
        }

        let segments = pattern
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| match s.strip_prefix(':') {
                Some(name) => Segment::Parameter(name.to_owned()),
                None => Segment::Static(s.to_owned()),
            })
            .collect();

        Pattern::Parameterized { segments }
    }

    fn matches(&self, path: &str) -> Option<PathParams> {
        let path = trim_trailing_slash(path);

        match self {
            Pattern::Exact(p) => (p == path).then(PathParams::new),
            Pattern::Parameterized { segments } => {
                let parts: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
                if parts.len() != segments.len() {
                    return None;
                }

                let mut params = PathParams::new();
                for (segment, part) in segments.iter().zip(parts) {
                    match segment {
                        Segment::Static(s) if s != part => return None,
                        Segment::Static(_) => {}
                        Segment::Parameter(name) => params.insert(name.clone(), part.to_owned()),
                    }
                }
                Some(params)
            }
        }
    }
}

struct Route {
    method: Method,
    pattern: Pattern,
    handler: Handler,
}

impl Route {
    fn matches(&self, method: &Method, path: &str) -> Option<PathParams> {
        if &self.method == method {
            self.pattern.matches(path)
        } else {
            None
        }
    }
}

/// Dispatches requests to registered handlers through a middleware chain.
///
/// # Examples
///
/// ```rust,no_run
/// use imgresize::{Router, Response, StatusCode};
/// use imgresize::context::Context;
/// use imgresize::middleware::LoggerMiddleware;
///
/// let mut router = Router::new();
/// router.layer(LoggerMiddleware);
/// router.get("/health", |_ctx| async { Response::new(StatusCode::Ok).body("ok\n") });
/// router.get("/v1/image/:id", |ctx: Context| async move {
///     let id = ctx.params().get("id").unwrap_or_default().to_owned();
///     Response::new(StatusCode::Ok).body(id)
/// });
/// ```
pub struct Router {
    routes: Vec<Route>,
    middlewares: Vec<MiddlewareHandler>,
}

impl Default for Router {
    fn default() -> Self {
        Self::new()
    }
}

impl Router {
    pub fn new() -> Self {
        Self {
            routes: Vec::new(),
            middlewares: Vec::new(),
        }
    }

    /// Registers a handler for `GET` requests matching `path`.
    pub fn get(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Get, path, handler);
    }

    /// Registers a handler for `POST` requests matching `path`.
    pub fn post(&mut self, path: &str, handler: impl IntoHandler) {
        self.add_route(Method::Post, path, handler);
    }

    /// Appends a middleware. The first one added runs outermost.
    pub fn layer(&mut self, middleware: impl Middleware + 'static) {
        self.middlewares
            .push(middleware::from_middleware(Arc::new(middleware)));
    }

    fn add_route(&mut self, method: Method, path: &str, handler: impl IntoHandler) {
        let handler: Handler = Arc::new(move |ctx: Context| handler.call(ctx));
        self.routes.push(Route {
            method,
            pattern: Pattern::parse(path),
            handler,
        });
    }

    /// Number of registered routes.
    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    /// Runs `request` through the middleware chain and the first matching
    /// route. Unmatched requests end in a JSON `404`.
    pub async fn route(&self, request: Request) -> Response {
        let matched = self
            .routes
            .iter()
            .find_map(|route| route.matches(request.method(), request.path()).map(|p| (route, p)));

        let (endpoint, ctx) = match matched {
            Some((route, params)) => (Arc::clone(&route.handler), Context::with_params(request, params)),
            None => (not_found(), Context::new(request)),
        };

        Next::new(Arc::from(self.middlewares.as_slice()), endpoint)
            .run(ctx)
            .await
    }
}

fn not_found() -> Handler {
    Arc::new(|_ctx: Context| -> BoxResponse {
        Box::pin(async { Response::error(StatusCode::NotFound, "not found") })
    })
}

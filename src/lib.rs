//! # imgresize
//!
//! An image resize service: fetch a JPEG by URL, scale it, keep the result in
//! a content-addressed cache, and serve it back over a small HTTP/1.1 API.
//!
//! Work runs either inline or on a bounded background worker pool, with an
//! in-flight tracker so concurrent requests for the same image share one
//! resize.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use imgresize::cache::LruImageCache;
//! use imgresize::config::Settings;
//! use imgresize::model::ResizeRequest;
//! use imgresize::resize::Resizer;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let settings = Settings::from_env()?;
//!     let cache = Arc::new(LruImageCache::new(settings.service.image_cache_size)?);
//!     let resizer = Resizer::from_settings(&settings, cache)?;
//!     resizer.start();
//!
//!     let request = ResizeRequest::new(["https://example.com/cat.jpg"], 200, 0);
//!     for outcome in resizer.process(&request).await? {
//!         println!("{} {:?}", outcome.id, outcome.result);
//!     }
//!
//!     resizer.shutdown().await;
//!     Ok(())
//! }
//! ```

// ── HTTP plumbing ─────────────────────────────────────────────────────────────
pub mod context;
pub mod http;
pub mod middleware;
pub mod router;
pub mod security;
pub mod server;

// ── Resize engine ─────────────────────────────────────────────────────────────
pub mod background;
pub mod cache;
pub mod config;
pub mod model;
pub mod resize;

pub mod service;

// ── Convenience re-exports ────────────────────────────────────────────────────
pub use http::{Headers, Method, Request, Response, StatusCode};
pub use model::{ImageKey, ResizeOutcome, ResizeRequest, ResizeStatus};
pub use resize::{ResizeError, Resizer};
pub use router::Router;
pub use server::{Server, ServerError};

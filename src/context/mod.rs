//! Per-request context handed to route handlers and middleware.

use std::collections::HashMap;

use crate::Request;

/// Path parameters captured by the matched route (`:name` segments).
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    /// An empty set of parameters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records the value captured for `key`, replacing any earlier one.
    pub fn insert(&mut self, key: String, value: String) {
        self.map.insert(key, value);
    }

    /// The value captured for `key`, without the leading `:`.
    ///
    /// ```
    /// use imgresize::context::PathParams;
    ///
    /// let mut params = PathParams::new();
    /// params.insert("id".to_owned(), "abc".to_owned());
    /// assert_eq!(params.get("id"), Some("abc"));
    /// assert_eq!(params.get("missing"), None);
    /// ```
    pub fn get(&self, key: &str) -> Option<&str> {
        self.map.get(key).map(String::as_str)
    }
}

/// A request together with whatever routing extracted from it.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    /// A context with no path parameters.
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// A context carrying the parameters the router captured.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    /// The parsed request, body included.
    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Path parameters of the matched route.
    pub fn params(&self) -> &PathParams {
        &self.params
    }

    /// Deserializes the request body as JSON.
    pub fn json<T>(&self) -> Result<T, serde_json::Error>
    where
        T: serde::de::DeserializeOwned,
    {
        serde_json::from_slice(self.request.body())
    }
}

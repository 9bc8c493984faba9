//! Named route registry.
//!
//! Services declare their HTTP surface as a list of `(path, handler, name)`
//! entries, collect them into a [`RouteTable`] once at startup and then turn
//! the table into an axum [`Router`]. Names are unique within a table, so any
//! registered path can be recovered from its name with [`RouteTable::reverse`]
//! or, after the table has been consumed, with a [`UrlResolver`].

use crate::error::AppError;
use axum::{
    Router,
    http::{StatusCode, Uri, header},
    response::{IntoResponse, Response},
    routing::MethodRouter,
};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RouteError {
    #[error("route name '{0}' is already registered")]
    DuplicateName(String),

    #[error("path '{0}' is already bound to route '{1}'")]
    DuplicatePath(String, String),

    #[error("invalid route path '{0}': {1}")]
    InvalidPath(String, &'static str),

    #[error("route for path '{0}' has an empty name")]
    InvalidName(String),

    #[error("no route named '{0}'")]
    NoReverseMatch(String),
}

impl From<RouteError> for AppError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::NoReverseMatch(_) => AppError::InternalError(anyhow::Error::new(err)),
            _ => AppError::ConfigError(anyhow::Error::new(err)),
        }
    }
}

/// A single entry of a route table.
pub struct Route<S> {
    path: String,
    name: String,
    handler: MethodRouter<S>,
}

impl<S> Route<S> {
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl<S> fmt::Debug for Route<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Declare a route.
///
/// `pattern` is a literal path; a missing leading `/` is added, so
/// `"api/v1/apply/"` and `"/api/v1/apply/"` declare the same route.
pub fn path<S>(pattern: &str, handler: MethodRouter<S>, name: &str) -> Route<S> {
    Route {
        path: normalize_path(pattern),
        name: name.trim().to_string(),
        handler,
    }
}

fn normalize_path(pattern: &str) -> String {
    let pattern = pattern.trim();
    if pattern.starts_with('/') {
        pattern.to_string()
    } else {
        format!("/{}", pattern)
    }
}

fn validate_path(path: &str) -> Result<(), RouteError> {
    if path.contains(['{', '}', ':', '*']) {
        return Err(RouteError::InvalidPath(
            path.to_string(),
            "only literal paths are supported",
        ));
    }
    if path.contains(['?', '#']) {
        return Err(RouteError::InvalidPath(
            path.to_string(),
            "query and fragment are not part of a route",
        ));
    }
    if path.contains(char::is_whitespace) {
        return Err(RouteError::InvalidPath(
            path.to_string(),
            "whitespace is not allowed",
        ));
    }
    Ok(())
}

/// Ordered, name-indexed collection of routes.
pub struct RouteTable<S> {
    routes: Vec<Route<S>>,
}

impl<S> Default for RouteTable<S> {
    fn default() -> Self {
        Self { routes: Vec::new() }
    }
}

impl<S> fmt::Debug for RouteTable<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.routes.iter()).finish()
    }
}

impl<S> RouteTable<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a table from declared patterns, failing on the first bad entry.
    pub fn from_patterns<I>(patterns: I) -> Result<Self, RouteError>
    where
        I: IntoIterator<Item = Route<S>>,
    {
        let mut table = Self::new();
        for route in patterns {
            table.register(route)?;
        }
        Ok(table)
    }

    pub fn register(&mut self, route: Route<S>) -> Result<(), RouteError> {
        validate_path(&route.path)?;

        if route.name.is_empty() {
            return Err(RouteError::InvalidName(route.path));
        }

        if self.routes.iter().any(|r| r.name == route.name) {
            return Err(RouteError::DuplicateName(route.name));
        }

        if let Some(existing) = self.routes.iter().find(|r| r.path == route.path) {
            return Err(RouteError::DuplicatePath(route.path, existing.name.clone()));
        }

        tracing::debug!(path = %route.path, name = %route.name, "Registered route");
        self.routes.push(route);
        Ok(())
    }

    /// Find the route bound to exactly `path`.
    pub fn resolve(&self, path: &str) -> Option<&Route<S>> {
        self.routes.iter().find(|r| r.path == path)
    }

    pub fn reverse(&self, name: &str) -> Result<&str, RouteError> {
        self.routes
            .iter()
            .find(|r| r.name == name)
            .map(|r| r.path.as_str())
            .ok_or_else(|| RouteError::NoReverseMatch(name.to_string()))
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Route<S>> {
        self.routes.iter()
    }

    /// Snapshot of the name/path mapping that outlives the table.
    pub fn resolver(&self) -> UrlResolver {
        let mut by_name = HashMap::with_capacity(self.routes.len());
        let mut by_path = HashMap::with_capacity(self.routes.len());
        for route in &self.routes {
            by_name.insert(route.name.clone(), route.path.clone());
            by_path.insert(route.path.clone(), route.name.clone());
        }
        UrlResolver {
            inner: Arc::new(ResolverMaps { by_name, by_path }),
        }
    }

    /// Consume the table into a router.
    ///
    /// Unmatched requests fall through to a handler that redirects when only
    /// the trailing slash of a registered path is missing and answers a JSON
    /// 404 otherwise.
    pub fn into_router(self) -> Router<S> {
        let resolver = self.resolver();

        let mut router = Router::new();
        for route in self.routes {
            router = router.route(&route.path, route.handler);
        }

        router.fallback(move |uri: Uri| {
            let resolver = resolver.clone();
            async move { unmatched(&resolver, &uri) }
        })
    }
}

fn unmatched(resolver: &UrlResolver, uri: &Uri) -> Response {
    let path = uri.path();

    if !path.ends_with('/') {
        let with_slash = format!("{}/", path);
        if resolver.resolve(&with_slash).is_some() {
            let location = match uri.query() {
                Some(query) => format!("{}?{}", with_slash, query),
                None => with_slash,
            };
            tracing::debug!(from = %path, to = %location, "Appending trailing slash");
            return (
                StatusCode::PERMANENT_REDIRECT,
                [(header::LOCATION, location)],
            )
                .into_response();
        }
    }

    AppError::NotFound(anyhow::anyhow!("No route matches '{}'", path)).into_response()
}

#[derive(Debug)]
struct ResolverMaps {
    by_name: HashMap<String, String>,
    by_path: HashMap<String, String>,
}

/// Read-only name/path lookups, cheap to clone into handler state.
#[derive(Debug, Clone)]
pub struct UrlResolver {
    inner: Arc<ResolverMaps>,
}

impl UrlResolver {
    pub fn reverse(&self, name: &str) -> Result<&str, RouteError> {
        self.inner
            .by_name
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| RouteError::NoReverseMatch(name.to_string()))
    }

    /// Name of the route bound to exactly `path`.
    pub fn resolve(&self, path: &str) -> Option<&str> {
        self.inner.by_path.get(path).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::get;
    use tower::ServiceExt;

    fn table() -> RouteTable<()> {
        RouteTable::from_patterns([
            path("items/", get(|| async { "items" }), "items"),
            path("/about/", get(|| async { "about" }), "about"),
        ])
        .expect("valid table")
    }

    #[test]
    fn test_path_normalizes_leading_slash() {
        let route: Route<()> = path("api/v1/apply/", get(|| async {}), "apply");
        assert_eq!(route.path(), "/api/v1/apply/");
        assert_eq!(route.name(), "apply");
    }

    #[test]
    fn test_resolve_and_reverse() {
        let table = table();
        assert_eq!(table.len(), 2);
        assert_eq!(table.resolve("/items/").map(|r| r.name()), Some("items"));
        assert!(table.resolve("/items").is_none());
        assert!(table.resolve("/missing/").is_none());
        assert_eq!(table.reverse("about"), Ok("/about/"));
        assert_eq!(
            table.reverse("nope"),
            Err(RouteError::NoReverseMatch("nope".to_string()))
        );
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let mut table = table();
        let err = table
            .register(path("other/", get(|| async {}), "items"))
            .unwrap_err();
        assert_eq!(err, RouteError::DuplicateName("items".to_string()));
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_path_rejected() {
        let mut table = table();
        let err = table
            .register(path("/items/", get(|| async {}), "items-again"))
            .unwrap_err();
        assert_eq!(
            err,
            RouteError::DuplicatePath("/items/".to_string(), "items".to_string())
        );
    }

    #[test]
    fn test_invalid_entries_rejected() {
        let mut table = RouteTable::<()>::new();
        assert!(matches!(
            table.register(path("items/{id}/", get(|| async {}), "item")),
            Err(RouteError::InvalidPath(..))
        ));
        assert!(matches!(
            table.register(path("items/?x=1", get(|| async {}), "item")),
            Err(RouteError::InvalidPath(..))
        ));
        assert_eq!(
            table.register(path("items/", get(|| async {}), "  ")),
            Err(RouteError::InvalidName("/items/".to_string()))
        );
        assert!(table.is_empty());
    }

    #[test]
    fn test_resolver_outlives_table() {
        let resolver = table().resolver();
        assert_eq!(resolver.reverse("items"), Ok("/items/"));
        assert_eq!(resolver.resolve("/about/"), Some("about"));
        assert_eq!(resolver.resolve("/about"), None);
    }

    #[tokio::test]
    async fn test_router_dispatches_registered_path() {
        let response = table()
            .into_router()
            .oneshot(Request::get("/items/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_router_redirects_missing_trailing_slash() {
        let response = table()
            .into_router()
            .oneshot(Request::get("/items?page=2").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::PERMANENT_REDIRECT);
        assert_eq!(
            response.headers().get(header::LOCATION).unwrap(),
            "/items/?page=2"
        );
    }

    #[tokio::test]
    async fn test_router_unknown_path_is_not_found() {
        let response = table()
            .into_router()
            .oneshot(Request::get("/nothing").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}

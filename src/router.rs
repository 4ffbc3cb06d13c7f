//! Ordered path router.
//!
//! Bindings are scanned in registration order and the first matcher that
//! accepts the request path wins. Only the path is matched; query string and
//! host are ignored. Register specific patterns before catch-alls.

use std::future::Future;
use std::sync::Arc;

use axum::{body::Body, http::Request, response::Response};
use futures_util::future::BoxFuture;
use regex::Regex;

use crate::context::Context;

/// Decides whether a request path belongs to a route and extracts its
/// parameters.
pub trait PathMatcher: Send + Sync + std::fmt::Debug {
    /// `None` when the path does not match, otherwise the ordered params
    /// (empty for patterns without captures).
    fn captures(&self, path: &str) -> Option<Vec<String>>;
}

/// Regex search over the path. Capture groups become params; optional groups
/// that did not participate yield empty strings.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    re: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            re: Regex::new(pattern)?,
        })
    }
}

impl PathMatcher for RegexMatcher {
    fn captures(&self, path: &str) -> Option<Vec<String>> {
        let caps = self.re.captures(path)?;
        Some(
            caps.iter()
                .skip(1)
                .map(|m| m.map(|m| m.as_str().to_string()).unwrap_or_default())
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct ExactMatcher {
    path: String,
}

impl ExactMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl PathMatcher for ExactMatcher {
    fn captures(&self, path: &str) -> Option<Vec<String>> {
        (path == self.path).then(Vec::new)
    }
}

#[derive(Debug, Clone)]
pub struct PrefixMatcher {
    prefix: String,
}

impl PrefixMatcher {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }
}

impl PathMatcher for PrefixMatcher {
    fn captures(&self, path: &str) -> Option<Vec<String>> {
        path.starts_with(&self.prefix).then(Vec::new)
    }
}

pub type Handler<S> = Arc<dyn Fn(S, Context) -> BoxFuture<'static, Response> + Send + Sync>;

fn boxed<S, F, Fut>(handler: F) -> Handler<S>
where
    S: 'static,
    F: Fn(S, Context) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Response> + Send + 'static,
{
    Arc::new(move |state: S, ctx: Context| -> BoxFuture<'static, Response> {
        Box::pin(handler(state, ctx))
    })
}

pub struct Route<S> {
    matcher: Box<dyn PathMatcher>,
    handler: Handler<S>,
}

impl<S> Route<S> {
    pub fn matcher(&self) -> &dyn PathMatcher {
        self.matcher.as_ref()
    }
}

/// Immutable once built: the route table is assembled at startup and then
/// shared behind an `Arc`.
pub struct Router<S> {
    routes: Vec<Route<S>>,
    default: Handler<S>,
}

impl<S> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    pub fn new<F, Fut>(default: F) -> Self
    where
        F: Fn(S, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Self {
            routes: Vec::new(),
            default: boxed(default),
        }
    }

    /// Compiles `pattern` and appends a binding. Malformed patterns are
    /// reported here, never at dispatch time.
    pub fn route<F, Fut>(self, pattern: &str, handler: F) -> Result<Self, regex::Error>
    where
        F: Fn(S, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        Ok(self.route_with(RegexMatcher::new(pattern)?, handler))
    }

    pub fn route_with<M, F, Fut>(mut self, matcher: M, handler: F) -> Self
    where
        M: PathMatcher + 'static,
        F: Fn(S, Context) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Response> + Send + 'static,
    {
        self.routes.push(Route {
            matcher: Box::new(matcher),
            handler: boxed(handler),
        });
        self
    }

    pub fn routes(&self) -> &[Route<S>] {
        &self.routes
    }

    /// Index of the first binding that matches `path`, with its params.
    pub fn resolve(&self, path: &str) -> Option<(usize, Vec<String>)> {
        self.routes
            .iter()
            .enumerate()
            .find_map(|(idx, route)| route.matcher.captures(path).map(|params| (idx, params)))
    }

    pub async fn dispatch(&self, state: S, req: Request<Body>) -> Response {
        let path = req.uri().path().to_string();

        match self.resolve(&path) {
            Some((idx, params)) => {
                let route = &self.routes[idx];
                tracing::debug!(
                    method = %req.method(),
                    path = %path,
                    route = ?route.matcher,
                    params = ?params,
                    "dispatching request"
                );
                (route.handler)(state, Context::new(req, params)).await
            }
            None => {
                tracing::debug!(method = %req.method(), path = %path, "no route matched");
                (self.default)(state, Context::new(req, Vec::new())).await
            }
        }
    }

    /// Wraps the router as the sole fallback of an axum service so axum only
    /// provides the transport.
    pub fn into_service(self, state: S) -> axum::Router {
        let router = Arc::new(self);
        axum::Router::new().fallback(move |req: Request<Body>| {
            let router = router.clone();
            let state = state.clone();
            async move { router.dispatch(state, req).await }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{http::StatusCode, response::IntoResponse};
    use tower::ServiceExt;

    fn tagged(tag: &'static str) -> impl Fn((), Context) -> BoxFuture<'static, Response> + Send + Sync {
        move |_, ctx: Context| -> BoxFuture<'static, Response> {
            Box::pin(async move {
                let params = ctx.params().to_vec();
                ctx.json(StatusCode::OK, serde_json::json!({ "route": tag, "params": params }))
            })
        }
    }

    fn api_table() -> Router<()> {
        Router::new(|_, _| async { StatusCode::NOT_FOUND.into_response() })
            .route(r"^/api/save$", tagged("save"))
            .unwrap()
            .route(r"^/api/article/([\w\._-]+)$", tagged("article"))
            .unwrap()
            .route(r"^/api/index$", tagged("index"))
            .unwrap()
            .route(r"^/", tagged("static"))
            .unwrap()
    }

    async fn call(router: Router<()>, uri: &str) -> serde_json::Value {
        let app = router.into_service(());
        let res = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn test_regex_matcher_params() {
        let m = RegexMatcher::new(r"^/api/article/([\w\._-]+)$").unwrap();
        assert_eq!(m.captures("/api/article/abc123"), Some(vec!["abc123".to_string()]));
        assert_eq!(m.captures("/api/article/"), None);
        assert_eq!(m.captures("/api/article/a/b"), None);
    }

    #[test]
    fn test_regex_matcher_without_groups_yields_empty_params() {
        let m = RegexMatcher::new(r"^/api/index$").unwrap();
        assert_eq!(m.captures("/api/index"), Some(vec![]));
    }

    #[test]
    fn test_regex_matcher_is_unanchored_search() {
        let m = RegexMatcher::new(r"index").unwrap();
        assert!(m.captures("/api/index/extra").is_some());
    }

    #[test]
    fn test_regex_matcher_unmatched_optional_group_is_empty() {
        let m = RegexMatcher::new(r"^/a(/x)?/(\d+)$").unwrap();
        assert_eq!(m.captures("/a/7"), Some(vec![String::new(), "7".to_string()]));
    }

    #[test]
    fn test_malformed_pattern_fails_at_registration() {
        let result = Router::<()>::new(|_, _| async { StatusCode::NOT_FOUND.into_response() })
            .route(r"^/api/(unclosed$", tagged("broken"));
        assert!(result.is_err());
    }

    #[test]
    fn test_exact_and_prefix_matchers() {
        let exact = ExactMatcher::new("/api/save");
        assert_eq!(exact.captures("/api/save"), Some(vec![]));
        assert_eq!(exact.captures("/api/save/1"), None);

        let prefix = PrefixMatcher::new("/static");
        assert_eq!(prefix.captures("/static/app.js"), Some(vec![]));
        assert_eq!(prefix.captures("/api"), None);
    }

    #[test]
    fn test_resolve_first_match_wins() {
        let router = api_table();
        assert_eq!(router.resolve("/api/save"), Some((0, vec![])));
        assert_eq!(router.resolve("/api/article/abc123"), Some((1, vec!["abc123".to_string()])));
        assert_eq!(router.resolve("/api/index"), Some((2, vec![])));
        assert_eq!(router.resolve("/unknown/path"), Some((3, vec![])));
        assert_eq!(
            router.routes()[1].matcher().captures("/api/article/xyz"),
            Some(vec!["xyz".to_string()])
        );
    }

    #[tokio::test]
    async fn test_dispatch_passes_params_to_handler() {
        let body = call(api_table(), "/api/article/abc123?x=1").await;
        assert_eq!(body["route"], "article");
        assert_eq!(body["params"], serde_json::json!(["abc123"]));
    }

    #[tokio::test]
    async fn test_unknown_path_reaches_catch_all() {
        let body = call(api_table(), "/unknown/path").await;
        assert_eq!(body["route"], "static");
    }

    fn shadowed_table() -> Router<()> {
        Router::new(|_, _| async { StatusCode::NOT_FOUND.into_response() })
            .route(r"^/", tagged("static"))
            .unwrap()
            .route(r"^/api/index$", tagged("index"))
            .unwrap()
            .route(r"^/api/article/([\w\._-]+)$", tagged("article"))
            .unwrap()
    }

    #[tokio::test]
    async fn test_catch_all_registered_first_shadows_api() {
        for uri in ["/api/index", "/api/article/abc123", "/api/save"] {
            let body = call(shadowed_table(), uri).await;
            assert_eq!(body["route"], "static", "{uri} should be shadowed");
            assert_eq!(body["params"], serde_json::json!([]));
        }
    }

    #[tokio::test]
    async fn test_default_handler_when_nothing_matches() {
        let router = Router::new(|_, ctx: Context| async move {
            ctx.error(StatusCode::NOT_FOUND, "Not found")
        })
        .route_with(ExactMatcher::new("/only"), tagged("only"));

        let app = router.into_service(());
        let res = app
            .oneshot(Request::builder().uri("/elsewhere").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::NOT_FOUND);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["error"], "Not found");
    }
}

//! Route lookup.
//!
//! # Responsibilities
//! - Store compiled prefix routes
//! - Look up the service for a request path
//! - Return the matched route or an explicit no-match
//!
//! # Design Decisions
//! - Immutable after construction (thread-safe without locks)
//! - Longest prefix wins, so nested prefixes are deterministic
//! - O(n) prefix scan (acceptable for typical route counts)

use crate::config::ServiceConfig;
use crate::routing::matcher::PathPrefixMatcher;

/// A compiled route.
#[derive(Debug, Clone)]
pub struct Route {
    pub service: String,
    pub matcher: PathPrefixMatcher,
}

/// Result of a successful lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteMatch<'a> {
    pub service: &'a str,
    /// Request path with the prefix removed.
    pub forward_path: &'a str,
}

/// Prefix routing table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    routes: Vec<Route>,
}

impl Router {
    pub fn from_config(services: &[ServiceConfig]) -> Self {
        let mut routes: Vec<Route> = services
            .iter()
            .map(|s| Route {
                service: s.name.clone(),
                matcher: PathPrefixMatcher::new(s.prefix.clone()),
            })
            .collect();
        routes.sort_by(|a, b| b.matcher.prefix().len().cmp(&a.matcher.prefix().len()));
        Self { routes }
    }

    pub fn match_path<'a>(&'a self, path: &'a str) -> Option<RouteMatch<'a>> {
        self.routes.iter().find_map(|route| {
            route.matcher.strip(path).map(|forward_path| RouteMatch {
                service: route.service.as_str(),
                forward_path,
            })
        })
    }

    pub fn routes(&self) -> &[Route] {
        &self.routes
    }
}

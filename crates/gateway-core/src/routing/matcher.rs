//! Route matching: exact/prefix/regex path match against a
//! tenant's active routes, in store iteration order, first match wins.

use crate::models::{PathType, Route, UpstreamConfig};
use crate::routing::load_balancer::{LoadBalancer, LoadBalancerError};
use regex::Regex;

#[derive(Debug, thiserror::Error)]
pub enum MatchError {
    #[error(transparent)]
    LoadBalancer(#[from] LoadBalancerError),
}

pub struct RouteMatch {
    pub route: Route,
    pub upstream: UpstreamConfig,
}

#[derive(Default)]
pub struct RouteMatcher {
    load_balancer: LoadBalancer,
}

impl RouteMatcher {
    pub fn new(load_balancer: LoadBalancer) -> Self {
        Self { load_balancer }
    }

    /// `routes` must already be filtered to the tenant's active routes, in
    /// store order; this function never re-sorts them.
    pub fn match_route(
        &self,
        routes: &[Route],
        method: &str,
        path: &str,
    ) -> Result<Option<RouteMatch>, MatchError> {
        for route in routes {
            if !method_matches(&route.method, method) {
                continue;
            }
            if !path_matches(route, path) {
                continue;
            }

            let upstream = self
                .load_balancer
                .select_upstream(&route.upstreams, route.load_balancing, &route.id)?;
            return Ok(Some(RouteMatch {
                route: route.clone(),
                upstream,
            }));
        }
        Ok(None)
    }
}

fn method_matches(route_method: &str, request_method: &str) -> bool {
    route_method == "*" || route_method.eq_ignore_ascii_case(request_method)
}

fn path_matches(route: &Route, path: &str) -> bool {
    match route.path_type {
        PathType::Exact => path == route.path,
        PathType::Prefix => {
            path == route.path || path.starts_with(&format!("{}/", route.path))
        }
        PathType::Regex => Regex::new(&format!("^{}$", route.path))
            .map(|re| re.is_match(path))
            .unwrap_or(false),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{LoadBalancingStrategy, ResilienceConfig, TransformConfig};

    fn route(id: &str, method: &str, path: &str, path_type: PathType) -> Route {
        Route {
            id: id.into(),
            tenant_id: "t1".into(),
            method: method.into(),
            path: path.into(),
            path_type,
            upstreams: vec![UpstreamConfig {
                url: "http://upstream".into(),
                weight: 1,
                timeout: None,
            }],
            load_balancing: LoadBalancingStrategy::RoundRobin,
            transform: None as Option<TransformConfig>,
            resilience: None as Option<ResilienceConfig>,
            is_active: true,
            created_at: chrono::Utc::now(),
            updated_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn exact_match_requires_equality() {
        let matcher = RouteMatcher::default();
        let routes = vec![route("r1", "GET", "/api", PathType::Exact)];

        assert!(matcher.match_route(&routes, "GET", "/api").unwrap().is_some());
        assert!(matcher.match_route(&routes, "GET", "/api/x").unwrap().is_none());
    }

    #[test]
    fn prefix_match_requires_separator_boundary() {
        let matcher = RouteMatcher::default();
        let routes = vec![route("r1", "GET", "/api", PathType::Prefix)];

        assert!(matcher.match_route(&routes, "GET", "/api").unwrap().is_some());
        assert!(matcher.match_route(&routes, "GET", "/api/x").unwrap().is_some());
        assert!(matcher.match_route(&routes, "GET", "/apix").unwrap().is_none());
    }

    #[test]
    fn regex_match_is_full_match() {
        let matcher = RouteMatcher::default();
        let routes = vec![route("r1", "GET", r"/api/\d+", PathType::Regex)];

        assert!(matcher.match_route(&routes, "GET", "/api/42").unwrap().is_some());
        assert!(matcher.match_route(&routes, "GET", "/api/42x").unwrap().is_none());
    }

    #[test]
    fn wildcard_method_matches_any() {
        let matcher = RouteMatcher::default();
        let routes = vec![route("r1", "*", "/api", PathType::Exact)];

        assert!(matcher.match_route(&routes, "POST", "/api").unwrap().is_some());
    }

    #[test]
    fn first_match_wins_no_resort() {
        let matcher = RouteMatcher::default();
        let routes = vec![
            route("r1", "GET", "/api", PathType::Prefix),
            route("r2", "GET", "/api", PathType::Exact),
        ];

        let found = matcher.match_route(&routes, "GET", "/api").unwrap().unwrap();
        assert_eq!(found.route.id, "r1");
    }
}

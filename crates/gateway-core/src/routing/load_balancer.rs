//! Upstream selection: round-robin with a process-local cursor,
//! weighted draw, or random. No health awareness here — that filtering
//! happens in the proxy orchestrator.

use crate::models::{LoadBalancingStrategy, UpstreamConfig};
use ahash::AHashMap;
use rand::Rng;
use std::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum LoadBalancerError {
    #[error("route has no configured upstreams")]
    NoUpstreams,
}

/// Owns the round-robin cursors; one per `routeId`, created lazily and never
/// reset except by [`LoadBalancer::reset_cursor`] (a test hook).
#[derive(Default)]
pub struct LoadBalancer {
    cursors: Mutex<AHashMap<String, usize>>,
}

impl LoadBalancer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select_upstream(
        &self,
        upstreams: &[UpstreamConfig],
        strategy: LoadBalancingStrategy,
        route_id: &str,
    ) -> Result<UpstreamConfig, LoadBalancerError> {
        if upstreams.is_empty() {
            return Err(LoadBalancerError::NoUpstreams);
        }
        if upstreams.len() == 1 {
            return Ok(upstreams[0].clone());
        }

        Ok(match strategy {
            LoadBalancingStrategy::RoundRobin => self.round_robin(upstreams, route_id),
            LoadBalancingStrategy::Weighted => weighted(upstreams),
            LoadBalancingStrategy::Random => random(upstreams),
        })
    }

    fn round_robin(&self, upstreams: &[UpstreamConfig], route_id: &str) -> UpstreamConfig {
        let mut cursors = self.cursors.lock().unwrap();
        let cursor = cursors.entry(route_id.to_string()).or_insert(0);
        let chosen = upstreams[*cursor % upstreams.len()].clone();
        *cursor += 1;
        chosen
    }

    #[cfg(test)]
    pub fn reset_cursor(&self, route_id: &str) {
        self.cursors.lock().unwrap().remove(route_id);
    }
}

fn weighted(upstreams: &[UpstreamConfig]) -> UpstreamConfig {
    let total_weight: u32 = upstreams.iter().map(|u| u.weight.max(1)).sum();
    let mut draw = rand::thread_rng().gen_range(0..total_weight) as i64;

    for upstream in upstreams {
        draw -= upstream.weight.max(1) as i64;
        if draw < 0 {
            return upstream.clone();
        }
    }
    upstreams.last().expect("non-empty upstreams").clone()
}

fn random(upstreams: &[UpstreamConfig]) -> UpstreamConfig {
    let idx = rand::thread_rng().gen_range(0..upstreams.len());
    upstreams[idx].clone()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn upstream(url: &str, weight: u32) -> UpstreamConfig {
        UpstreamConfig {
            url: url.into(),
            weight,
            timeout: None,
        }
    }

    #[test]
    fn single_upstream_short_circuits() {
        let lb = LoadBalancer::new();
        let upstreams = vec![upstream("http://a", 1)];
        let chosen = lb
            .select_upstream(&upstreams, LoadBalancingStrategy::Random, "r1")
            .unwrap();
        assert_eq!(chosen.url, "http://a");
    }

    #[test]
    fn round_robin_cycles_in_order() {
        let lb = LoadBalancer::new();
        let upstreams = vec![upstream("http://a", 1), upstream("http://b", 1)];

        let first = lb
            .select_upstream(&upstreams, LoadBalancingStrategy::RoundRobin, "r1")
            .unwrap();
        let second = lb
            .select_upstream(&upstreams, LoadBalancingStrategy::RoundRobin, "r1")
            .unwrap();
        let third = lb
            .select_upstream(&upstreams, LoadBalancingStrategy::RoundRobin, "r1")
            .unwrap();

        assert_eq!(first.url, "http://a");
        assert_eq!(second.url, "http://b");
        assert_eq!(third.url, "http://a");
    }

    #[test]
    fn round_robin_cursor_is_per_route() {
        let lb = LoadBalancer::new();
        let upstreams = vec![upstream("http://a", 1), upstream("http://b", 1)];

        lb.select_upstream(&upstreams, LoadBalancingStrategy::RoundRobin, "r1")
            .unwrap();
        let first_for_r2 = lb
            .select_upstream(&upstreams, LoadBalancingStrategy::RoundRobin, "r2")
            .unwrap();
        assert_eq!(first_for_r2.url, "http://a");
    }

    #[test]
    fn weighted_only_selects_declared_upstreams() {
        let lb = LoadBalancer::new();
        let upstreams = vec![upstream("http://a", 9), upstream("http://b", 1)];
        for _ in 0..50 {
            let chosen = lb
                .select_upstream(&upstreams, LoadBalancingStrategy::Weighted, "r1")
                .unwrap();
            assert!(chosen.url == "http://a" || chosen.url == "http://b");
        }
    }

    #[test]
    fn empty_upstreams_is_an_error() {
        let lb = LoadBalancer::new();
        let result = lb.select_upstream(&[], LoadBalancingStrategy::Random, "r1");
        assert!(matches!(result, Err(LoadBalancerError::NoUpstreams)));
    }
}

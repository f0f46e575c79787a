//! Ranking, filtering and summarizing a batch of endpoint results.
//!
//! Everything here is pure: the input slice is never modified and every
//! function returns a new list. Sorts are stable, so entries with equal speed
//! keep their relative order.

use crate::endpoint::EndpointResult;
use serde::Serialize;

pub mod persist;

pub use persist::{load_json, persist};

/// Speed bounds applied by [`filter`]. Both ends are exclusive.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct SpeedBounds {
    pub min_speed_mbps: Option<f64>,
    pub max_speed_mbps: Option<f64>,
}

impl SpeedBounds {
    /// True when no speed can pass both bounds.
    pub fn admits_nothing(&self) -> bool {
        match (self.min_speed_mbps, self.max_speed_mbps) {
            (Some(min), Some(max)) => min >= max,
            _ => false,
        }
    }
}

/// Stable sort by speed, fastest first.
pub fn sort_by_speed(results: &[EndpointResult]) -> Vec<EndpointResult> {
    let mut sorted = results.to_vec();
    sorted.sort_by(|a, b| b.speed_mbps().total_cmp(&a.speed_mbps()));
    sorted
}

/// Keep only `ok` results strictly inside the bounds, fastest first.
pub fn filter(results: &[EndpointResult], bounds: SpeedBounds) -> Vec<EndpointResult> {
    let kept: Vec<EndpointResult> = results
        .iter()
        .filter(|r| r.is_ok())
        .filter(|r| bounds.max_speed_mbps.map_or(true, |max| r.speed_mbps() < max))
        .filter(|r| bounds.min_speed_mbps.map_or(true, |min| r.speed_mbps() > min))
        .cloned()
        .collect();
    sort_by_speed(&kept)
}

/// Successes first (fastest first), then every other result in its original
/// relative order.
pub fn rank_for_display(results: &[EndpointResult]) -> Vec<EndpointResult> {
    let (ok, rest): (Vec<_>, Vec<_>) = results.iter().cloned().partition(|r| r.is_ok());
    let mut ranked = sort_by_speed(&ok);
    ranked.extend(rest);
    ranked
}

/// Counters shown after a batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total: usize,
    pub ok: usize,
    pub filtered: usize,
    pub fastest_mbps: Option<f64>,
}

impl Summary {
    /// `filtered` must be the output of [`filter`] over `results`.
    pub fn new(results: &[EndpointResult], filtered: &[EndpointResult]) -> Self {
        Self {
            total: results.len(),
            ok: results.iter().filter(|r| r.is_ok()).count(),
            filtered: filtered.len(),
            fastest_mbps: filtered.first().map(|r| r.speed_mbps()),
        }
    }
}

impl std::fmt::Display for Summary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Total: {} | Ok: {} | Filtered: {}",
            self.total, self.ok, self.filtered
        )?;
        if let Some(fastest) = self.fastest_mbps {
            write!(f, " | Fastest: {:.2} MB/s", fastest)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::{Endpoint, Outcome, Status};

    fn result(server: &str, outcome: Outcome) -> EndpointResult {
        EndpointResult::new(Endpoint::new(server, 443), outcome)
    }

    fn ok(server: &str, speed: f64) -> EndpointResult {
        result(server, Outcome::ok(20.0, speed))
    }

    fn speeds(results: &[EndpointResult]) -> Vec<f64> {
        results.iter().map(|r| r.speed_mbps()).collect()
    }

    #[test]
    fn test_filter_bounds_are_exclusive() {
        let input: Vec<_> = [0.5, 1.0, 3.0, 5.0, 8.0]
            .iter()
            .enumerate()
            .map(|(i, s)| ok(&format!("10.0.0.{}", i), *s))
            .collect();

        let out = filter(
            &input,
            SpeedBounds {
                min_speed_mbps: Some(1.0),
                max_speed_mbps: Some(5.0),
            },
        );
        assert_eq!(speeds(&out), vec![3.0]);
    }

    #[test]
    fn test_crossed_bounds_admit_nothing() {
        let input = vec![ok("a", 6.4), ok("b", 1.0)];
        let crossed = SpeedBounds {
            min_speed_mbps: Some(2.0),
            max_speed_mbps: Some(1.5),
        };
        assert!(crossed.admits_nothing());
        assert!(filter(&input, crossed).is_empty());

        let open_top = SpeedBounds {
            max_speed_mbps: None,
            ..crossed
        };
        assert!(!open_top.admits_nothing());
        assert_eq!(speeds(&filter(&input, open_top)), vec![6.4]);
    }

    #[test]
    fn test_filter_drops_non_ok_and_sorts() {
        let input = vec![
            ok("a", 1.2),
            result("b", Outcome::timeout(15.0)),
            ok("c", 7.5),
            result("d", Outcome::unreachable()),
            ok("e", 3.3),
        ];

        let out = filter(&input, SpeedBounds::default());
        assert_eq!(speeds(&out), vec![7.5, 3.3, 1.2]);
        assert!(out.iter().all(|r| r.status() == Status::Ok));
    }

    #[test]
    fn test_filter_single_bound_and_idempotent() {
        let input = vec![ok("a", 1.0), ok("b", 2.0), ok("c", 4.0), ok("d", 2.0)];
        let bounds = SpeedBounds {
            min_speed_mbps: None,
            max_speed_mbps: Some(4.0),
        };

        let once = filter(&input, bounds);
        assert!(once.iter().all(|r| r.speed_mbps() < 4.0));
        assert_eq!(filter(&once, bounds), once);

        let bounds = SpeedBounds {
            min_speed_mbps: Some(1.0),
            max_speed_mbps: None,
        };
        let out = filter(&input, bounds);
        assert!(out.iter().all(|r| r.speed_mbps() > 1.0));
        // Equal speeds keep input order.
        let names: Vec<_> = out.iter().map(|r| r.endpoint.server.as_str()).collect();
        assert_eq!(names, vec!["c", "b", "d"]);
    }

    #[test]
    fn test_rank_for_display_ok_first() {
        let input = vec![
            result("t", Outcome::timeout(40.0)),
            ok("slow", 1.0),
            result("e", Outcome::error(10.0)),
            ok("fast", 5.0),
            result("u", Outcome::unreachable()),
        ];

        let ranked = rank_for_display(&input);
        let names: Vec<_> = ranked.iter().map(|r| r.endpoint.server.as_str()).collect();
        assert_eq!(names, vec!["fast", "slow", "t", "e", "u"]);
    }

    #[test]
    fn test_rank_for_display_scenario() {
        let input = vec![
            result("timeout", Outcome::timeout(30.0)),
            ok("ok", 5.0),
            result("error", Outcome::error(12.0)),
        ];
        let ranked = rank_for_display(&input);
        assert_eq!(ranked[0].endpoint.server, "ok");
        assert_eq!(ranked[1].endpoint.server, "timeout");
        assert_eq!(ranked[2].endpoint.server, "error");
    }

    #[test]
    fn test_summary() {
        let input = vec![ok("a", 1.0), ok("b", 6.0), result("c", Outcome::error(1.0))];
        let bounds = SpeedBounds {
            min_speed_mbps: Some(0.0),
            max_speed_mbps: Some(1.5),
        };
        let filtered = filter(&input, bounds);
        let summary = Summary::new(&input, &filtered);

        assert_eq!(summary.total, 3);
        assert_eq!(summary.ok, 2);
        assert_eq!(summary.filtered, 1);
        assert_eq!(summary.fastest_mbps, Some(1.0));
        assert_eq!(
            summary.to_string(),
            "Total: 3 | Ok: 2 | Filtered: 1 | Fastest: 1.00 MB/s"
        );

        let empty = Summary::new(&input, &[]);
        assert_eq!(empty.to_string(), "Total: 3 | Ok: 2 | Filtered: 0");
    }
}

//! Flattens the rules reachable from a virtual host into its route table.

use crate::delegation::Visit;
use ahash::AHashMap as HashMap;
use ingress_controller_core::{
    graph::RouteEntry,
    http_route::{Backend, HeaderValueMatch, PathMatch, RouteAction, RouteMatch},
    validity::{Outcomes, Reason},
    Precedence, ResourceId,
};
use std::cmp::Reverse;

/// Combines a rule's own match with the constraint it inherits from its
/// delegation path.
///
/// Fails if the rule would escape the constraint.
pub(crate) fn merge(inherited: &RouteMatch, own: &RouteMatch) -> Result<RouteMatch, String> {
    let path = match (&inherited.path, &own.path) {
        (inherited, None) => inherited.clone(),
        (None, Some(own)) => Some(own.clone()),
        (Some(inherited), Some(own)) => {
            if !own.is_within(inherited) {
                return Err(format!("{own} is outside of the delegated {inherited}"));
            }
            Some(own.clone())
        }
    };

    let mut headers = inherited
        .headers
        .iter()
        .chain(&own.headers)
        .cloned()
        .collect::<Vec<_>>();
    headers.sort();
    headers.dedup();
    // Exact values sort first, so conflicting values for a name are adjacent.
    for pair in headers.windows(2) {
        if let [a, b] = pair {
            if let (HeaderValueMatch::Exact(va), HeaderValueMatch::Exact(vb)) = (&a.value, &b.value)
            {
                if a.name == b.name {
                    return Err(format!(
                        "header {}={vb} conflicts with the delegated header {}={va}",
                        b.name, a.name
                    ));
                }
            }
        }
    }

    let method = match (&inherited.method, &own.method) {
        (Some(inherited), Some(own)) if inherited != own => {
            return Err(format!(
                "method {own} conflicts with the delegated method {inherited}"
            ));
        }
        (_, Some(own)) => Some(own.clone()),
        (inherited, None) => inherited.clone(),
    };

    Ok(RouteMatch {
        path,
        headers,
        method,
    })
}

#[derive(Debug)]
struct Candidate<'s> {
    matches: RouteMatch,
    backends: &'s [Backend],
    origin: &'s ResourceId,
    precedence: Precedence,
    rule_index: usize,
    path: &'s [ResourceId],

    /// Position in traversal order.
    order: usize,
}

/// Builds a virtual host's route table from its traversal.
///
/// Rules that escape their inherited constraint are dropped. When several
/// rules carry the same merged match, the rule of the oldest resource wins
/// (declaration order breaks ties) and the others are rejected. The same rule
/// reached twice through different delegations is a single route.
///
/// Entries are ordered most specific first so that a data plane may evaluate
/// them in order.
pub(crate) fn route_table(visits: &[Visit<'_>], outcomes: &mut Outcomes) -> Vec<RouteEntry> {
    let mut candidates = Vec::new();
    for visit in visits {
        let origin = &visit.resource.id;
        for rule in &visit.routes.rules {
            let RouteAction::Forward(backends) = &rule.action else {
                continue;
            };
            match merge(&visit.constraint, &rule.matches) {
                Ok(matches) => candidates.push(Candidate {
                    matches,
                    backends,
                    origin,
                    precedence: visit.resource.precedence(),
                    rule_index: rule.index,
                    path: &visit.path,
                    order: candidates.len(),
                }),
                Err(detail) => {
                    tracing::debug!(%origin, rule = rule.index, %detail, "Constraint violation");
                    outcomes.error(
                        origin,
                        Reason::ConstraintViolation,
                        format!("route {}: {detail}", rule.index),
                        &visit.path,
                    );
                }
            }
        }
    }

    candidates.sort_by(|a, b| {
        (&a.precedence, a.rule_index, a.order).cmp(&(&b.precedence, b.rule_index, b.order))
    });

    let mut winners = HashMap::<&RouteMatch, usize>::with_capacity(candidates.len());
    let mut accepted = Vec::with_capacity(candidates.len());
    for (i, candidate) in candidates.iter().enumerate() {
        let Some(&w) = winners.get(&candidate.matches) else {
            winners.insert(&candidate.matches, i);
            accepted.push(candidate);
            continue;
        };

        let winner = &candidates[w];
        if winner.origin == candidate.origin && winner.rule_index == candidate.rule_index {
            continue;
        }

        tracing::debug!(
            origin = %candidate.origin,
            rule = candidate.rule_index,
            winner = %winner.origin,
            "Duplicate match"
        );
        outcomes.error(
            candidate.origin,
            Reason::DuplicateMatchCondition,
            format!(
                "route {} matches {}, which is already routed by route {} of {}",
                candidate.rule_index, candidate.matches, winner.rule_index, winner.origin
            ),
            candidate.path,
        );
    }

    accepted.sort_by_cached_key(|c| (specificity(&c.matches), c.order));
    accepted
        .into_iter()
        .map(|c| RouteEntry {
            matches: c.matches.clone(),
            backends: c.backends.to_vec(),
            origin: c.origin.clone(),
            rule_index: c.rule_index,
        })
        .collect()
}

/// Orders matches so that narrower matches sort first: exact paths, then
/// globs, then prefixes, then no path; longer paths before shorter ones; more
/// header predicates before fewer; a method before none.
fn specificity(m: &RouteMatch) -> (u8, Reverse<usize>, Reverse<usize>, Reverse<usize>, bool) {
    let (kind, segments, len) = match &m.path {
        Some(PathMatch::Exact(p)) => (0, segment_count(p), p.len()),
        Some(PathMatch::Glob(g)) => (1, g.segments().len(), g.as_str().len()),
        Some(PathMatch::Prefix(p)) => (2, segment_count(p), p.len()),
        None => (3, 0, 0),
    };
    (
        kind,
        Reverse(segments),
        Reverse(len),
        Reverse(m.headers.len()),
        m.method.is_none(),
    )
}

fn segment_count(path: &str) -> usize {
    path.split('/').filter(|s| !s.is_empty()).count()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{exact, glob, header, prefix};
    use ingress_controller_core::http_route::{HeaderMatch, Method};

    #[test]
    fn merge_inherits_and_narrows() {
        let inherited = RouteMatch {
            method: Some(Method::GET),
            ..prefix("/team-a")
        };
        let own = RouteMatch {
            headers: vec![header("x-canary")],
            ..exact("/team-a/login")
        };
        let merged = merge(&inherited, &own).unwrap();
        assert_eq!(merged.path, exact("/team-a/login").path);
        assert_eq!(merged.headers, vec![header("x-canary")]);
        assert_eq!(merged.method, Some(Method::GET));

        assert_eq!(
            merge(&inherited, &RouteMatch::default()).unwrap(),
            inherited
        );
    }

    #[test]
    fn merge_rejects_escapes() {
        let inherited = prefix("/team-a");
        assert!(merge(&inherited, &prefix("/other")).is_err());
        assert!(merge(&inherited, &glob("/*/x")).is_err());

        let get = RouteMatch {
            method: Some(Method::GET),
            ..Default::default()
        };
        let post = RouteMatch {
            method: Some(Method::POST),
            ..Default::default()
        };
        assert!(merge(&get, &post).is_err());
    }

    #[test]
    fn merge_rejects_conflicting_header_values() {
        let team = |value: &str| HeaderMatch {
            name: "x-team".to_string(),
            value: HeaderValueMatch::Exact(value.to_string()),
        };
        let inherited = RouteMatch {
            headers: vec![team("a")],
            ..prefix("/a")
        };

        let conflicting = RouteMatch {
            headers: vec![team("b")],
            ..prefix("/a")
        };
        let err = merge(&inherited, &conflicting).expect_err("x-team cannot be both a and b");
        assert!(err.contains("x-team"), "{err}");

        let same = RouteMatch {
            headers: vec![team("a"), header("x-canary")],
            ..prefix("/a/b")
        };
        let merged = merge(&inherited, &same).unwrap();
        assert_eq!(merged.headers, vec![header("x-canary"), team("a")]);
    }

    #[test]
    fn merged_headers_are_a_set() {
        let inherited = RouteMatch {
            headers: vec![header("b"), header("a")],
            ..Default::default()
        };
        let own = RouteMatch {
            headers: vec![header("a")],
            ..Default::default()
        };
        let merged = merge(&inherited, &own).unwrap();
        assert_eq!(merged.headers, vec![header("a"), header("b")]);
    }

    #[test]
    fn specificity_orders_narrow_matches_first() {
        let mut matches = vec![
            RouteMatch::default(),
            prefix("/"),
            prefix("/blog"),
            glob("/blog/*"),
            exact("/blog"),
            RouteMatch {
                headers: vec![header("x-canary")],
                ..prefix("/blog")
            },
        ];
        matches.sort_by_key(specificity);
        assert_eq!(
            matches,
            vec![
                exact("/blog"),
                glob("/blog/*"),
                RouteMatch {
                    headers: vec![header("x-canary")],
                    ..prefix("/blog")
                },
                prefix("/blog"),
                prefix("/"),
                RouteMatch::default(),
            ]
        );
    }
}

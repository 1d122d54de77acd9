use super::*;
use crate::{resolve, Snapshot};
use ingress_controller_core::http_route::Method;
use pretty_assertions::assert_eq;
use rstest::rstest;

#[test]
fn oldest_fragment_wins_duplicate_matches() {
    let snapshot = [
        virtual_host("ns", "root", "example.com", 1).with_routes(vec![
            delegate(any(), "ns", "b"),
            delegate(any(), "ns", "a"),
        ]),
        // Created first, but delegated to second.
        fragment("ns", "a", 2).with_routes(vec![forward(exact("/foo"), "a")]),
        fragment("ns", "b", 3).with_routes(vec![forward(exact("/foo"), "b")]),
    ]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    let vh = &resolution.graph.virtual_hosts[0];
    assert_eq!(vh.routes.len(), 1);
    assert_eq!(vh.routes[0].backends, vec![backend("a")]);
    assert_eq!(vh.routes[0].origin, ResourceId::fragment("ns", "a"));

    let duplicate = &resolution.outcomes.findings[0];
    assert_eq!(duplicate.subject, ResourceId::fragment("ns", "b"));
    assert_eq!(duplicate.condition.severity, Severity::Error);
    assert_eq!(duplicate.condition.reason, Reason::DuplicateMatchCondition);
    assert!(
        duplicate.condition.detail.contains("RouteFragment ns/a"),
        "detail must name the winner: {}",
        duplicate.condition.detail
    );
    assert_eq!(duplicate.path, vec![ResourceId::virtual_host("ns", "root")]);
    assert_eq!(resolution.outcomes.findings.len(), 1);
}

#[test]
fn declaration_order_breaks_ties_within_a_resource() {
    let snapshot = [virtual_host("ns", "root", "example.com", 1).with_routes(vec![
        forward(prefix("/x"), "first"),
        forward(prefix("/x/"), "second"),
    ])]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    let vh = &resolution.graph.virtual_hosts[0];
    assert_eq!(vh.routes.len(), 1);
    assert_eq!(vh.routes[0].backends, vec![backend("first")]);
    assert_eq!(vh.routes[0].rule_index, 0);
    assert_eq!(
        findings(&resolution.outcomes),
        vec![(
            "root".to_string(),
            Severity::Error,
            Reason::DuplicateMatchCondition
        )]
    );
}

#[test]
fn a_rule_reached_twice_is_one_route() {
    let snapshot = [
        virtual_host("ns", "root", "example.com", 1).with_routes(vec![
            delegate(prefix("/shared"), "ns", "shared"),
            delegate(prefix("/shared"), "ns", "shared"),
        ]),
        fragment("ns", "shared", 2).with_routes(vec![forward(any(), "shared")]),
    ]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    assert!(resolution.outcomes.findings.is_empty());
    assert_eq!(resolution.graph.virtual_hosts[0].routes.len(), 1);
}

#[rstest]
#[case::header(RouteMatch { headers: vec![header("x-canary")], ..exact("/foo") })]
#[case::method(RouteMatch { method: Some(Method::POST), ..exact("/foo") })]
#[case::prefix(prefix("/foo"))]
fn distinct_matches_do_not_conflict(#[case] other: RouteMatch) {
    let snapshot = [virtual_host("ns", "root", "example.com", 1).with_routes(vec![
        forward(exact("/foo"), "a"),
        forward(other, "b"),
    ])]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    assert!(resolution.outcomes.findings.is_empty());
    assert_eq!(resolution.graph.virtual_hosts[0].routes.len(), 2);
}

#[test]
fn orphans_affect_only_themselves() {
    let snapshot = [
        virtual_host("ns", "root", "example.com", 1)
            .with_routes(vec![forward(prefix("/"), "web")]),
        fragment("ns", "orphan", 2).with_routes(vec![
            forward(prefix("/"), "stray"),
            delegate(prefix("/deeper"), "ns", "deeper"),
        ]),
        fragment("ns", "deeper", 3).with_routes(vec![forward(prefix("/deeper"), "deeper")]),
    ]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    assert_eq!(
        findings(&resolution.outcomes),
        vec![
            ("deeper".to_string(), Severity::Info, Reason::Orphaned),
            ("orphan".to_string(), Severity::Info, Reason::Orphaned),
        ]
    );
    assert!(resolution
        .outcomes
        .findings
        .iter()
        .all(|f| f.path.is_empty()));

    let vh = &resolution.graph.virtual_hosts[0];
    assert_eq!(vh.routes.len(), 1);
    assert_eq!(vh.routes[0].backends, vec![backend("web")]);
}

#[test]
fn later_virtual_hosts_cannot_claim_a_hostname() {
    let snapshot = [
        virtual_host("ns", "new", "example.com", 2)
            .with_routes(vec![delegate(any(), "ns", "frag")]),
        virtual_host("ns", "old", "example.com", 1),
        virtual_host("ns", "wild", "*.example.com", 3),
        fragment("ns", "frag", 4),
    ]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    assert_eq!(
        findings(&resolution.outcomes),
        vec![
            ("new".to_string(), Severity::Error, Reason::DuplicateHostname),
            ("frag".to_string(), Severity::Info, Reason::Orphaned),
        ]
    );
    let roots = resolution
        .graph
        .virtual_hosts
        .iter()
        .map(|vh| vh.root.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(roots, vec!["old", "wild"]);
}

#[test]
fn malformed_rules_are_reported_once() {
    let snapshot = [
        virtual_host("ns", "root", "example.com", 1).with_routes(vec![
            delegate(prefix("/a"), "ns", "frag"),
            delegate(prefix("/b"), "ns", "frag"),
        ]),
        fragment("ns", "frag", 2)
            .with_routes(vec![forward(any(), "frag")])
            .with_malformed(1, "route must set exactly one of backends or delegate"),
    ]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    assert_eq!(
        findings(&resolution.outcomes),
        vec![("frag".to_string(), Severity::Error, Reason::InvalidRoute)]
    );
    assert_eq!(resolution.graph.virtual_hosts[0].routes.len(), 2);
}

#[test]
fn rejected_resources_are_reported() {
    let rejected = RoutingResource {
        spec: ResourceSpec::Rejected {
            detail: "invalid hostname".to_string(),
        },
        ..virtual_host("ns", "bad", "example.com", 1)
    };
    let snapshot = [rejected].into_iter().collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    assert_eq!(
        findings(&resolution.outcomes),
        vec![("bad".to_string(), Severity::Error, Reason::InvalidResource)]
    );
    assert!(resolution.graph.virtual_hosts.is_empty());
}

#[test]
fn conflicting_delegated_headers_are_rejected() {
    let team = |value: &str| RouteMatch {
        headers: vec![HeaderMatch {
            name: "x-team".to_string(),
            value: HeaderValueMatch::Exact(value.to_string()),
        }],
        ..prefix("/a")
    };
    let snapshot = [
        virtual_host("ns", "root", "example.com", 1)
            .with_routes(vec![delegate(team("a"), "ns", "frag")]),
        fragment("ns", "frag", 2).with_routes(vec![
            forward(team("b"), "b"),
            forward(team("a"), "a"),
        ]),
    ]
    .into_iter()
    .collect::<Snapshot>();

    let resolution = resolve(&snapshot);
    assert_eq!(
        findings(&resolution.outcomes),
        vec![(
            "frag".to_string(),
            Severity::Error,
            Reason::ConstraintViolation
        )]
    );
    let vh = &resolution.graph.virtual_hosts[0];
    assert_eq!(vh.routes.len(), 1);
    assert_eq!(vh.routes[0].matches, team("a"));
    assert_eq!(vh.routes[0].backends, vec![backend("a")]);
}

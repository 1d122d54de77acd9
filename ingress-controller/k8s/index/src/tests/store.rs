use super::*;
use crate::{resolve, Store};
use ingress_controller_k8s_api::{self as k8s, routing, ObjectMeta};
use kubert::index::{IndexNamespacedResource, NamespacedRemoved};
use pretty_assertions::assert_eq;

fn meta(ns: &str, name: &str, secs: i64) -> ObjectMeta {
    ObjectMeta {
        namespace: Some(ns.to_string()),
        name: Some(name.to_string()),
        generation: Some(1),
        creation_timestamp: created(secs).map(k8s::Time),
        ..Default::default()
    }
}

fn mk_virtual_host(ns: &str, name: &str, routes: Vec<routing::Route>) -> k8s::VirtualHost {
    k8s::VirtualHost {
        metadata: meta(ns, name, 1),
        spec: routing::VirtualHostSpec {
            hostname: "Example.com".to_string(),
            tls: None,
            routes,
        },
        status: None,
    }
}

fn mk_fragment(ns: &str, name: &str, routes: Vec<routing::Route>) -> k8s::RouteFragment {
    k8s::RouteFragment {
        metadata: meta(ns, name, 2),
        spec: routing::RouteFragmentSpec { routes },
        status: None,
    }
}

fn prefix_match(value: &str) -> Option<routing::Match> {
    Some(routing::Match {
        path: Some(routing::PathMatch::Prefix {
            value: value.to_string(),
        }),
        ..Default::default()
    })
}

#[test]
fn watched_resources_resolve() {
    let mut store = Store::default();
    let mut changes = store.subscribe();

    IndexNamespacedResource::apply(
        &mut store,
        mk_virtual_host(
            "web",
            "root",
            vec![routing::Route {
                matches: prefix_match("/api"),
                backends: None,
                delegate: Some(routing::DelegateRef {
                    name: "api".to_string(),
                    namespace: Some("team-a".to_string()),
                }),
            }],
        ),
    );
    assert!(changes.has_changed().unwrap());
    changes.mark_unchanged();

    let resolution = resolve(&store.snapshot());
    assert_eq!(
        findings(&resolution.outcomes),
        vec![(
            "root".to_string(),
            Severity::Error,
            Reason::DelegationTargetNotFound
        )]
    );

    IndexNamespacedResource::apply(
        &mut store,
        mk_fragment(
            "team-a",
            "api",
            vec![routing::Route {
                matches: prefix_match("/api/v1"),
                backends: Some(vec![routing::Backend {
                    name: "api".to_string(),
                    namespace: None,
                    port: 8080,
                    weight: Some(10),
                }]),
                delegate: None,
            }],
        ),
    );
    assert!(changes.has_changed().unwrap());

    let resolution = resolve(&store.snapshot());
    assert!(resolution.outcomes.findings.is_empty());
    let vh = &resolution.graph.virtual_hosts[0];
    assert_eq!(vh.hostname.to_string(), "example.com");
    assert_eq!(vh.routes[0].backends[0].namespace, "team-a");
    assert_eq!(vh.routes[0].backends[0].weight, 10);

    IndexNamespacedResource::<k8s::VirtualHost>::delete(
        &mut store,
        "web".to_string(),
        "root".to_string(),
    );
    let resolution = resolve(&store.snapshot());
    assert!(resolution.graph.virtual_hosts.is_empty());
    assert_eq!(
        findings(&resolution.outcomes),
        vec![("api".to_string(), Severity::Info, Reason::Orphaned)]
    );
}

#[test]
fn invalid_listeners_are_rejected() {
    let mut store = Store::default();
    IndexNamespacedResource::apply(
        &mut store,
        k8s::Listener {
            metadata: meta("gateway", "zero", 1),
            spec: routing::ListenerSpec {
                protocol: routing::listener::Protocol::Http,
                port: 0,
                hostname: None,
                tls: None,
                routes: Default::default(),
            },
            status: None,
        },
    );

    let resolution = resolve(&store.snapshot());
    assert_eq!(
        findings(&resolution.outcomes),
        vec![("zero".to_string(), Severity::Error, Reason::InvalidResource)]
    );
    assert!(resolution.graph.listeners.is_empty());
}

#[test]
fn initial_lists_sync_the_store() {
    let mut store = Store::default();
    let mut changes = store.subscribe();

    IndexNamespacedResource::<k8s::RouteFragment>::reset(
        &mut store,
        vec![mk_fragment("team-a", "api", vec![])],
        Default::default(),
    );
    assert!(changes.has_changed().unwrap());
    changes.mark_unchanged();
    assert!(!store.is_synced());

    // An empty list completes its kind all the same.
    IndexNamespacedResource::<k8s::VirtualHost>::reset(&mut store, vec![], Default::default());
    assert!(changes.has_changed().unwrap());
    changes.mark_unchanged();
    assert!(!store.is_synced());

    IndexNamespacedResource::<k8s::Listener>::reset(&mut store, vec![], Default::default());
    assert!(store.is_synced());
    changes.mark_unchanged();

    // A relist drops resources deleted while the watch was down.
    let mut removed = NamespacedRemoved::default();
    removed
        .entry("team-a".to_string())
        .or_default()
        .insert("api".to_string());
    IndexNamespacedResource::<k8s::RouteFragment>::reset(&mut store, vec![], removed);
    assert!(changes.has_changed().unwrap());
    assert!(store.snapshot().is_empty());
    assert!(store.is_synced());
}

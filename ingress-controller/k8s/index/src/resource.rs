//! Converts routing CRDs into the resolver's resource model.
//!
//! Conversion never fails as a whole because of a single bad route: such
//! routes are kept as malformed entries so that their owner can be told what
//! was wrong while its remaining routes are still programmed.

use ingress_controller_core::{
    http_route::{
        Backend, HeaderMatch, HeaderValueMatch, InvalidPath, Method, PathMatch, RouteAction,
        RouteMatch, RouteRule,
    },
    listener::{ListenerResource, NamespacePolicy, Protocol, RouteBinding, TlsDescriptor},
    HostMatch, InvalidHostname, MalformedRule, ResourceId, ResourceSpec, RouteFragment, RouteSet,
    RoutingResource, VirtualHostRoot,
};
use ingress_controller_k8s_api::{self as k8s, routing, ObjectMeta, ResourceExt};
use std::num::NonZeroU16;

#[derive(Debug, thiserror::Error)]
pub enum InvalidRoute {
    #[error("route must set exactly one of backends or delegate")]
    Action,

    #[error(transparent)]
    Path(#[from] InvalidPath),

    #[error("unsupported HTTP method {0:?}")]
    Method(String),

    #[error("header matches must name a header")]
    HeaderName,

    #[error("backend {0} must specify a non-zero port")]
    BackendPort(String),

    #[error("route must declare at least one backend")]
    NoBackends,
}

#[derive(Debug, thiserror::Error)]
pub enum InvalidResource {
    #[error("invalid hostname: {0}")]
    Hostname(#[from] InvalidHostname),

    #[error("listener port must be non-zero")]
    Port,
}

pub fn virtual_host(vh: k8s::VirtualHost) -> RoutingResource {
    let namespace = vh.namespace().expect("VirtualHost must have a namespace");
    let id = ResourceId::virtual_host(&namespace, vh.name_unchecked());
    let spec = match vh.spec.hostname.parse::<HostMatch>() {
        Ok(hostname) => ResourceSpec::VirtualHost(VirtualHostRoot {
            hostname,
            tls: vh.spec.tls.map(|tls| tls_descriptor(tls, &namespace)),
            routes: route_set(vh.spec.routes, &namespace),
        }),
        Err(error) => ResourceSpec::Rejected {
            detail: InvalidResource::from(error).to_string(),
        },
    };
    mk_resource(id, &vh.metadata, spec)
}

pub fn route_fragment(frag: k8s::RouteFragment) -> RoutingResource {
    let namespace = frag
        .namespace()
        .expect("RouteFragment must have a namespace");
    let id = ResourceId::fragment(&namespace, frag.name_unchecked());
    let spec = ResourceSpec::RouteFragment(RouteFragment {
        routes: route_set(frag.spec.routes, &namespace),
    });
    mk_resource(id, &frag.metadata, spec)
}

pub fn listener(listener: k8s::Listener) -> RoutingResource {
    let namespace = listener
        .namespace()
        .expect("Listener must have a namespace");
    let id = ResourceId::listener(&namespace, listener.name_unchecked());
    let spec = match mk_listener(listener.spec, &namespace) {
        Ok(listener) => ResourceSpec::Listener(listener),
        Err(error) => ResourceSpec::Rejected {
            detail: error.to_string(),
        },
    };
    mk_resource(id, &listener.metadata, spec)
}

fn mk_resource(id: ResourceId, meta: &ObjectMeta, spec: ResourceSpec) -> RoutingResource {
    RoutingResource {
        id,
        uid: meta.uid.clone(),
        generation: meta.generation.unwrap_or_default(),
        creation_timestamp: meta.creation_timestamp.as_ref().map(|k8s::Time(t)| *t),
        labels: meta.labels.clone().unwrap_or_default(),
        spec,
    }
}

fn mk_listener(
    spec: routing::ListenerSpec,
    namespace: &str,
) -> Result<ListenerResource, InvalidResource> {
    let port = NonZeroU16::new(spec.port).ok_or(InvalidResource::Port)?;
    let hostname = spec
        .hostname
        .as_deref()
        .map(str::parse::<HostMatch>)
        .transpose()?;
    let protocol = match spec.protocol {
        routing::listener::Protocol::Http => Protocol::Http,
        routing::listener::Protocol::Https => Protocol::Https,
    };

    let namespaces = match spec.routes.namespaces {
        None => NamespacePolicy::Same,
        Some(ns) => match ns.from {
            routing::listener::FromNamespaces::Same => NamespacePolicy::Same,
            routing::listener::FromNamespaces::All => NamespacePolicy::All,
            routing::listener::FromNamespaces::Selected => {
                NamespacePolicy::Selected(ns.names.unwrap_or_default())
            }
        },
    };

    Ok(ListenerResource {
        protocol,
        port,
        hostname,
        tls: spec.tls.map(|tls| tls_descriptor(tls, namespace)),
        binding: RouteBinding {
            namespaces,
            match_labels: spec.routes.selector.and_then(|s| s.match_labels),
        },
    })
}

fn tls_descriptor(tls: routing::TlsRef, namespace: &str) -> TlsDescriptor {
    TlsDescriptor {
        namespace: tls.namespace.unwrap_or_else(|| namespace.to_string()),
        secret_name: tls.secret_name,
    }
}

pub(crate) fn route_set(routes: Vec<routing::Route>, namespace: &str) -> RouteSet {
    let mut set = RouteSet::default();
    for (index, route) in routes.into_iter().enumerate() {
        match route_rule(index, route, namespace) {
            Ok(rule) => set.rules.push(rule),
            Err(error) => set.malformed.push(MalformedRule {
                index,
                detail: error.to_string(),
            }),
        }
    }
    set
}

fn route_rule(
    index: usize,
    route: routing::Route,
    namespace: &str,
) -> Result<RouteRule, InvalidRoute> {
    let matches = route
        .matches
        .map(route_match)
        .transpose()?
        .unwrap_or_default();

    let action = match (route.backends, route.delegate) {
        (Some(backends), None) => {
            if backends.is_empty() {
                return Err(InvalidRoute::NoBackends);
            }
            let backends = backends
                .into_iter()
                .map(|b| backend(b, namespace))
                .collect::<Result<Vec<_>, _>>()?;
            RouteAction::Forward(backends)
        }
        (None, Some(delegate)) => RouteAction::Delegate(ResourceId::fragment(
            delegate.namespace.as_deref().unwrap_or(namespace),
            delegate.name,
        )),
        _ => return Err(InvalidRoute::Action),
    };

    Ok(RouteRule {
        index,
        matches,
        action,
    })
}

fn route_match(m: routing::Match) -> Result<RouteMatch, InvalidRoute> {
    let path = m
        .path
        .map(|path| match path {
            routing::PathMatch::Exact { value } => PathMatch::exact(value),
            routing::PathMatch::Prefix { value } => PathMatch::prefix(value),
            routing::PathMatch::Glob { value } => PathMatch::glob(value),
        })
        .transpose()?;

    let mut headers = m
        .headers
        .into_iter()
        .flatten()
        .map(|h| {
            let (name, value) = match h {
                routing::HeaderMatch::Exact { name, value } => {
                    (name, HeaderValueMatch::Exact(value))
                }
                routing::HeaderMatch::Contains { name, value } => {
                    (name, HeaderValueMatch::Contains(value))
                }
                routing::HeaderMatch::Present { name } => (name, HeaderValueMatch::Present),
            };
            if name.is_empty() {
                return Err(InvalidRoute::HeaderName);
            }
            Ok(HeaderMatch {
                name: name.to_ascii_lowercase(),
                value,
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    headers.sort();
    headers.dedup();

    let method = m.method.map(|method| parse_method(&method)).transpose()?;

    Ok(RouteMatch {
        path,
        headers,
        method,
    })
}

fn parse_method(method: &str) -> Result<Method, InvalidRoute> {
    match method.to_lowercase().as_str() {
        "connect" => Ok(Method::CONNECT),
        "get" => Ok(Method::GET),
        "post" => Ok(Method::POST),
        "put" => Ok(Method::PUT),
        "delete" => Ok(Method::DELETE),
        "patch" => Ok(Method::PATCH),
        "head" => Ok(Method::HEAD),
        "options" => Ok(Method::OPTIONS),
        "trace" => Ok(Method::TRACE),
        _ => Err(InvalidRoute::Method(method.to_string())),
    }
}

fn backend(b: routing::Backend, namespace: &str) -> Result<Backend, InvalidRoute> {
    let port = NonZeroU16::new(b.port).ok_or_else(|| InvalidRoute::BackendPort(b.name.clone()))?;
    Ok(Backend {
        namespace: b.namespace.unwrap_or_else(|| namespace.to_string()),
        name: b.name,
        port,
        weight: b.weight.unwrap_or(1),
    })
}

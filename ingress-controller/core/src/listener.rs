use crate::HostMatch;
use serde::Serialize;
use std::{collections::BTreeMap, fmt, num::NonZeroU16};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Protocol {
    #[serde(rename = "HTTP")]
    Http,
    #[serde(rename = "HTTPS")]
    Https,
}

/// References the certificate material that terminates TLS.
///
/// Two descriptors are compatible only if they name the same secret.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TlsDescriptor {
    pub namespace: String,
    pub secret_name: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListenerResource {
    pub protocol: Protocol,
    pub port: NonZeroU16,
    pub hostname: Option<HostMatch>,
    pub tls: Option<TlsDescriptor>,
    pub binding: RouteBinding,
}

/// Selects the virtual hosts a listener exposes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RouteBinding {
    pub namespaces: NamespacePolicy,
    /// Labels a virtual host must carry. No selector selects every virtual
    /// host in the permitted namespaces.
    pub match_labels: Option<BTreeMap<String, String>>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub enum NamespacePolicy {
    #[default]
    Same,
    All,
    Selected(Vec<String>),
}

// === impl Protocol ===

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Http => "HTTP",
            Self::Https => "HTTPS",
        }
    }

    pub fn requires_tls(&self) -> bool {
        matches!(self, Self::Https)
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Display for TlsDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "secret {}/{}", self.namespace, self.secret_name)
    }
}

// === impl RouteBinding ===

impl RouteBinding {
    pub fn selects(
        &self,
        listener_namespace: &str,
        namespace: &str,
        labels: &BTreeMap<String, String>,
    ) -> bool {
        let namespace_ok = match &self.namespaces {
            NamespacePolicy::Same => namespace == listener_namespace,
            NamespacePolicy::All => true,
            NamespacePolicy::Selected(names) => names.iter().any(|n| n == namespace),
        };
        if !namespace_ok {
            return false;
        }

        self.match_labels.iter().flatten().all(|(k, v)| labels.get(k) == Some(v))
    }
}

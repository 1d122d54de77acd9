use serde::{Serialize, Serializer};
use std::{fmt, str::FromStr};

/// Matches a request authority against a virtual host or listener name.
///
/// Wildcards stand in for exactly one leading DNS label, so `*.example.com`
/// matches `www.example.com` but neither `example.com` nor `a.b.example.com`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum HostMatch {
    Exact(String),
    Suffix { reverse_labels: Vec<String> },
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidHostname {
    #[error("hostname must not be empty")]
    Empty,

    #[error("hostname {0:?} contains an empty label")]
    EmptyLabel(String),

    #[error("hostname {0:?} may only use a wildcard as its entire first label")]
    MisplacedWildcard(String),
}

// === impl HostMatch ===

impl HostMatch {
    pub fn is_wildcard(&self) -> bool {
        matches!(self, Self::Suffix { .. })
    }

    /// Returns true if some request authority could be matched by both
    /// `self` and `other`.
    pub fn intersects(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Exact(a), Self::Exact(b)) => a == b,
            (Self::Suffix { reverse_labels: a }, Self::Suffix { reverse_labels: b }) => a == b,
            (Self::Exact(host), Self::Suffix { reverse_labels })
            | (Self::Suffix { reverse_labels }, Self::Exact(host)) => {
                suffix_matches(reverse_labels, host)
            }
        }
    }

    /// Returns true if the given authority is matched by this host.
    pub fn matches(&self, authority: &str) -> bool {
        let authority = authority.to_ascii_lowercase();
        match self {
            Self::Exact(host) => *host == authority,
            Self::Suffix { reverse_labels } => suffix_matches(reverse_labels, &authority),
        }
    }
}

fn suffix_matches(reverse_labels: &[String], host: &str) -> bool {
    let labels = host.split('.').rev().collect::<Vec<_>>();
    labels.len() == reverse_labels.len() + 1
        && labels
            .iter()
            .zip(reverse_labels)
            .all(|(label, suffix)| *label == suffix.as_str())
}

impl FromStr for HostMatch {
    type Err = InvalidHostname;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let host = s.trim_end_matches('.').to_ascii_lowercase();
        if host.is_empty() {
            return Err(InvalidHostname::Empty);
        }

        let (wildcard, rest) = match host.strip_prefix("*.") {
            Some(rest) => (true, rest),
            None => (false, host.as_str()),
        };

        let mut labels = Vec::new();
        for label in rest.split('.') {
            if label.is_empty() {
                return Err(InvalidHostname::EmptyLabel(s.to_string()));
            }
            if label.contains('*') {
                return Err(InvalidHostname::MisplacedWildcard(s.to_string()));
            }
            labels.push(label.to_string());
        }

        if !wildcard {
            return Ok(Self::Exact(host));
        }
        labels.reverse();
        Ok(Self::Suffix {
            reverse_labels: labels,
        })
    }
}

impl fmt::Display for HostMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(host) => host.fmt(f),
            Self::Suffix { reverse_labels } => {
                write!(f, "*")?;
                for label in reverse_labels.iter().rev() {
                    write!(f, ".{label}")?;
                }
                Ok(())
            }
        }
    }
}

impl Serialize for HostMatch {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

//! Per-resource resolution outcomes.
//!
//! The resolver records `Finding`s as it processes resources. A finding is
//! attached to a single subject resource; findings discovered below a
//! delegation also carry the chain of resources that delegated to the subject
//! so that the status reporter can warn each of them.

use crate::{ResourceId, ResourceKind};
use serde::Serialize;
use std::{
    collections::{BTreeMap, BTreeSet},
    fmt,
};

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Reason {
    Accepted,
    Orphaned,
    InvalidResource,
    InvalidRoute,
    DelegationCycle,
    DelegationTargetNotFound,
    UnboundedWildcardDelegation,
    ConstraintViolation,
    DuplicateMatchCondition,
    DuplicateHostname,
    #[serde(rename = "TLSMismatch")]
    TlsMismatch,
    TlsRequired,
    TlsIgnored,
    DuplicateCatchAllListener,
    HostnameMismatch,
    DescendantRejected,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub enum ValidityState {
    Valid,
    Invalid,
    Orphaned,
}

/// A single diagnostic entry in a validity record.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
pub struct Condition {
    pub severity: Severity,
    pub reason: Reason,
    pub detail: String,
}

/// The computed outcome for a single resource.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityRecord {
    pub state: ValidityState,
    pub conditions: Vec<Condition>,
    pub observed_generation: i64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Finding {
    pub subject: ResourceId,
    pub condition: Condition,

    /// The resources through which the subject was reached, root first.
    pub path: Vec<ResourceId>,
}

/// Everything a resolution pass learned about the resources it was given.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Outcomes {
    /// Every resource in the snapshot and the generation that was resolved.
    pub generations: BTreeMap<ResourceId, i64>,

    /// The UID of every resource in the snapshot that has one.
    pub uids: BTreeMap<ResourceId, String>,

    /// Resources visited by at least one delegation traversal.
    pub reachable: BTreeSet<ResourceId>,

    pub findings: Vec<Finding>,
}

// === impl Reason ===

impl Reason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "Accepted",
            Self::Orphaned => "Orphaned",
            Self::InvalidResource => "InvalidResource",
            Self::InvalidRoute => "InvalidRoute",
            Self::DelegationCycle => "DelegationCycle",
            Self::DelegationTargetNotFound => "DelegationTargetNotFound",
            Self::UnboundedWildcardDelegation => "UnboundedWildcardDelegation",
            Self::ConstraintViolation => "ConstraintViolation",
            Self::DuplicateMatchCondition => "DuplicateMatchCondition",
            Self::DuplicateHostname => "DuplicateHostname",
            Self::TlsMismatch => "TLSMismatch",
            Self::TlsRequired => "TlsRequired",
            Self::TlsIgnored => "TlsIgnored",
            Self::DuplicateCatchAllListener => "DuplicateCatchAllListener",
            Self::HostnameMismatch => "HostnameMismatch",
            Self::DescendantRejected => "DescendantRejected",
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Severity ===

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "Info",
            Self::Warning => "Warning",
            Self::Error => "Error",
        }
    }
}

// === impl ValidityState ===

impl ValidityState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Valid => "Valid",
            Self::Invalid => "Invalid",
            Self::Orphaned => "Orphaned",
        }
    }
}

impl fmt::Display for ValidityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// === impl Condition ===

impl Condition {
    pub fn new(severity: Severity, reason: Reason, detail: impl Into<String>) -> Self {
        Self {
            severity,
            reason,
            detail: detail.into(),
        }
    }

    pub fn error(reason: Reason, detail: impl Into<String>) -> Self {
        Self::new(Severity::Error, reason, detail)
    }

    pub fn warning(reason: Reason, detail: impl Into<String>) -> Self {
        Self::new(Severity::Warning, reason, detail)
    }

    pub fn info(reason: Reason, detail: impl Into<String>) -> Self {
        Self::new(Severity::Info, reason, detail)
    }
}

// === impl Outcomes ===

impl Outcomes {
    pub fn record(&mut self, subject: &ResourceId, condition: Condition, path: &[ResourceId]) {
        self.findings.push(Finding {
            subject: subject.clone(),
            condition,
            path: path.to_vec(),
        });
    }

    pub fn error(
        &mut self,
        subject: &ResourceId,
        reason: Reason,
        detail: impl Into<String>,
        path: &[ResourceId],
    ) {
        self.record(subject, Condition::error(reason, detail), path);
    }

    pub fn warning(&mut self, subject: &ResourceId, reason: Reason, detail: impl Into<String>) {
        self.record(subject, Condition::warning(reason, detail), &[]);
    }

    /// Returns true if the resource was never reached from a virtual host.
    ///
    /// Only fragments can be orphaned: virtual hosts and listeners are
    /// entry points of their own.
    pub fn is_orphaned(&self, id: &ResourceId) -> bool {
        id.kind == ResourceKind::RouteFragment && !self.reachable.contains(id)
    }

    pub fn findings_for<'a>(&'a self, id: &'a ResourceId) -> impl Iterator<Item = &'a Finding> {
        self.findings.iter().filter(move |f| f.subject == *id)
    }
}

use crate::ResourceId;
pub use http::Method;
use regex::Regex;
use serde::{Serialize, Serializer};
use std::{
    fmt,
    hash::{Hash, Hasher},
    num::NonZeroU16,
};

/// A conjunction of request predicates. An empty match matches every request.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteMatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub headers: Vec<HeaderMatch>,
    #[serde(
        skip_serializing_if = "Option::is_none",
        serialize_with = "serialize_method"
    )]
    pub method: Option<Method>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum PathMatch {
    Exact(String),
    Prefix(String),
    Glob(GlobPattern),
}

/// A path pattern made of whole-segment wildcards.
///
/// `*` matches exactly one segment; `**` may only appear last and matches any
/// number of trailing segments, including none.
#[derive(Clone, Debug)]
pub struct GlobPattern {
    pattern: String,
    segments: Vec<Segment>,
    regex: Regex,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Any,
    Rest,
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum InvalidPath {
    #[error("path {0:?} must start with '/'")]
    Relative(String),

    #[error("glob {0:?} may only use '**' as its last segment")]
    InteriorRest(String),

    #[error("glob {0:?} may only use wildcards as entire segments")]
    PartialWildcard(String),
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct HeaderMatch {
    pub name: String,
    pub value: HeaderValueMatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "type", content = "value")]
pub enum HeaderValueMatch {
    Exact(String),
    Contains(String),
    Present,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Backend {
    pub namespace: String,
    pub name: String,
    pub port: NonZeroU16,
    pub weight: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RouteAction {
    Forward(Vec<Backend>),
    Delegate(ResourceId),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteRule {
    /// The rule's position in its resource's declared route list.
    pub index: usize,
    pub matches: RouteMatch,
    pub action: RouteAction,
}

// === impl PathMatch ===

impl PathMatch {
    pub fn exact(path: impl Into<String>) -> Result<Self, InvalidPath> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(InvalidPath::Relative(path));
        }
        Ok(Self::Exact(path))
    }

    /// Builds a prefix match. Trailing slashes are insignificant, so `/blog/`
    /// and `/blog` describe the same prefix.
    pub fn prefix(path: impl Into<String>) -> Result<Self, InvalidPath> {
        let path = path.into();
        if !path.starts_with('/') {
            return Err(InvalidPath::Relative(path));
        }
        let trimmed = path.trim_end_matches('/');
        if trimmed.is_empty() {
            return Ok(Self::Prefix("/".to_string()));
        }
        Ok(Self::Prefix(trimmed.to_string()))
    }

    pub fn glob(pattern: impl Into<String>) -> Result<Self, InvalidPath> {
        GlobPattern::parse(pattern).map(Self::Glob)
    }

    /// Returns true if the path ends in a wildcard that matches an unbounded
    /// number of segments.
    pub fn is_unbounded(&self) -> bool {
        matches!(self, Self::Glob(glob) if glob.is_unbounded())
    }

    /// Returns true if every request matched by `self` is also matched by the
    /// `constraint`, treating the constraint as a segment-aligned prefix.
    ///
    /// Exact constraints only admit the identical exact path.
    pub fn is_within(&self, constraint: &PathMatch) -> bool {
        match constraint {
            Self::Exact(c) => matches!(self, Self::Exact(p) if p == c),
            Self::Prefix(c) => {
                let constraint = literal_segments(c)
                    .map(|s| Segment::Literal(s.to_string()))
                    .collect::<Vec<_>>();
                segments_within(&self.segments(), &constraint)
            }
            Self::Glob(glob) => {
                !glob.is_unbounded() && segments_within(&self.segments(), glob.segments())
            }
        }
    }

    pub(crate) fn segments(&self) -> Vec<Segment> {
        match self {
            Self::Exact(p) | Self::Prefix(p) => literal_segments(p)
                .map(|s| Segment::Literal(s.to_string()))
                .collect(),
            Self::Glob(glob) => glob.segments.clone(),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Exact(p) | Self::Prefix(p) => p,
            Self::Glob(glob) => glob.as_str(),
        }
    }
}

fn literal_segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|s| !s.is_empty())
}

fn segments_within(path: &[Segment], constraint: &[Segment]) -> bool {
    if path.len() < constraint.len() {
        return false;
    }
    path.iter().zip(constraint).all(|(p, c)| match (p, c) {
        (Segment::Literal(p), Segment::Literal(c)) => p == c,
        (Segment::Literal(_) | Segment::Any, Segment::Any) => true,
        _ => false,
    })
}

impl fmt::Display for PathMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(p) => write!(f, "exact {p}"),
            Self::Prefix(p) => write!(f, "prefix {p}"),
            Self::Glob(glob) => write!(f, "glob {}", glob.as_str()),
        }
    }
}

// === impl GlobPattern ===

impl GlobPattern {
    pub fn parse(pattern: impl Into<String>) -> Result<Self, InvalidPath> {
        let pattern = pattern.into();
        if !pattern.starts_with('/') {
            return Err(InvalidPath::Relative(pattern));
        }

        let parts = literal_segments(&pattern).collect::<Vec<_>>();
        let mut segments = Vec::with_capacity(parts.len());
        let mut expr = String::from("^");
        for (i, part) in parts.iter().enumerate() {
            let segment = match *part {
                "*" => Segment::Any,
                "**" if i + 1 == parts.len() => Segment::Rest,
                "**" => return Err(InvalidPath::InteriorRest(pattern.clone())),
                lit if lit.contains('*') => return Err(InvalidPath::PartialWildcard(pattern.clone())),
                lit => Segment::Literal(lit.to_string()),
            };
            match &segment {
                Segment::Literal(lit) => {
                    expr.push('/');
                    expr.push_str(&regex::escape(lit));
                }
                Segment::Any => expr.push_str("/[^/]+"),
                Segment::Rest => expr.push_str("(?:/.*)?"),
            }
            segments.push(segment);
        }
        if segments.is_empty() {
            expr.push('/');
        }
        expr.push('$');

        let regex = Regex::new(&expr).expect("glob expressions must compile");
        Ok(Self {
            pattern,
            segments,
            regex,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.pattern
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    /// The anchored expression a data plane may use to evaluate this glob.
    pub fn regex(&self) -> &Regex {
        &self.regex
    }

    pub fn is_unbounded(&self) -> bool {
        matches!(self.segments.last(), Some(Segment::Rest))
    }
}

impl PartialEq for GlobPattern {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for GlobPattern {}

impl Hash for GlobPattern {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
    }
}

impl Serialize for GlobPattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.pattern)
    }
}

// === impl RouteMatch ===

impl RouteMatch {
    pub fn is_empty(&self) -> bool {
        self.path.is_none() && self.headers.is_empty() && self.method.is_none()
    }
}

impl fmt::Display for RouteMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if let Some(path) = &self.path {
            parts.push(path.to_string());
        }
        for header in &self.headers {
            parts.push(match &header.value {
                HeaderValueMatch::Exact(v) => format!("header {}={v}", header.name),
                HeaderValueMatch::Contains(v) => format!("header {}~{v}", header.name),
                HeaderValueMatch::Present => format!("header {}", header.name),
            });
        }
        if let Some(method) = &self.method {
            parts.push(format!("method {method}"));
        }
        if parts.is_empty() {
            return write!(f, "any request");
        }
        write!(f, "{}", parts.join(", "))
    }
}

fn serialize_method<S: Serializer>(method: &Option<Method>, s: S) -> Result<S::Ok, S::Error> {
    match method {
        Some(m) => s.serialize_str(m.as_str()),
        None => s.serialize_none(),
    }
}

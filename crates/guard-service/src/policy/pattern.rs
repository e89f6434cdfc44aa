//! Ant-style path patterns.
//!
//! - literal segments match exactly (`/users`)
//! - `*` matches exactly one segment; inside a segment it matches any run of
//!   characters (`/files/*.json`)
//! - `**` matches zero or more whole segments (`/users/status/**`)
//!
//! Empty segments are ignored on both sides, so trailing and doubled slashes
//! make no difference.

use super::PolicyError;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Glob(String),
    AnySegment,
    AnyDepth,
}

impl Segment {
    fn parse(raw: &str) -> Self {
        match raw {
            "*" => Segment::AnySegment,
            "**" => Segment::AnyDepth,
            s if s.contains('*') => Segment::Glob(s.to_string()),
            s => Segment::Literal(s.to_string()),
        }
    }

    fn matches(&self, segment: &str) -> bool {
        match self {
            Segment::Literal(literal) => literal == segment,
            Segment::Glob(glob) => glob_matches(glob, segment),
            Segment::AnySegment => true,
            // Handled by match_segments
            Segment::AnyDepth => false,
        }
    }
}

/// A compiled path pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPattern {
    raw: String,
    segments: Vec<Segment>,
}

impl PathPattern {
    /// Compile a pattern. Patterns must be absolute (start with `/`).
    pub fn parse(raw: &str) -> Result<Self, PolicyError> {
        let raw = raw.trim();
        if !raw.starts_with('/') {
            return Err(PolicyError::InvalidPattern(format!(
                "pattern must start with '/', got '{}'",
                raw
            )));
        }

        let segments = split_path(raw).map(Segment::parse).collect();

        Ok(Self {
            raw: raw.to_string(),
            segments,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether `path` (a request path, without query string) matches.
    pub fn matches(&self, path: &str) -> bool {
        let path: Vec<&str> = split_path(path).collect();
        match_segments(&self.segments, &path)
    }
}

impl fmt::Display for PathPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

fn split_path(path: &str) -> impl Iterator<Item = &str> {
    path.split('/').filter(|segment| !segment.is_empty())
}

fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::AnyDepth, rest)) => (0..=path.len())
            .any(|skip| path.get(skip..).is_some_and(|tail| match_segments(rest, tail))),
        Some((segment, rest)) => match path.split_first() {
            Some((first, tail)) => segment.matches(first) && match_segments(rest, tail),
            None => false,
        },
    }
}

/// `*` matches any (possibly empty) run of characters within one segment.
fn glob_matches(glob: &str, text: &str) -> bool {
    let mut parts = glob.split('*');
    let prefix = parts.next().unwrap_or_default();
    let Some(mut rest) = text.strip_prefix(prefix) else {
        return false;
    };

    let parts: Vec<&str> = parts.collect();
    let Some((suffix, middle)) = parts.split_last() else {
        return rest.is_empty();
    };

    for part in middle {
        match rest.find(part) {
            Some(index) => rest = rest.get(index + part.len()..).unwrap_or_default(),
            None => return false,
        }
    }

    rest.ends_with(suffix)
}

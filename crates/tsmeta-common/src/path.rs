//! Hierarchical dotted paths and wildcard patterns
//!
//! A path is an ordered sequence of segments that always starts at `root`,
//! e.g. `root.sg.d1.s1`. Patterns may additionally contain two wildcard
//! segments:
//!
//! - `*` matches exactly one segment
//! - `**` matches zero or more consecutive segments
//!
//! Identity is structural: two paths are equal when their segment
//! sequences are equal, regardless of how they were constructed.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Reserved first segment of every valid path
pub const ROOT: &str = "root";
/// Separator between path segments
pub const PATH_SEPARATOR: char = '.';
/// Wildcard matching exactly one segment
pub const ONE_LEVEL_WILDCARD: &str = "*";
/// Wildcard matching zero or more segments
pub const MULTI_LEVEL_WILDCARD: &str = "**";

/// Errors raised while parsing or building a path
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PathError {
    #[error("path is empty")]
    Empty,
    #[error("path must start with 'root': {0}")]
    MissingRoot(String),
    #[error("empty segment at position {position} in '{path}'")]
    EmptySegment { path: String, position: usize },
    #[error("illegal character {ch:?} in segment '{segment}'")]
    IllegalChar { segment: String, ch: char },
    #[error("wildcard must stand alone as a segment: '{0}'")]
    MisplacedWildcard(String),
    #[error("wildcard not allowed in a concrete path: {0}")]
    WildcardNotAllowed(String),
}

fn is_wildcard(segment: &str) -> bool {
    segment == ONE_LEVEL_WILDCARD || segment == MULTI_LEVEL_WILDCARD
}

/// Validate a single segment. Wildcards are accepted here; callers that
/// need a concrete path check with [`PartialPath::ensure_concrete`].
fn validate_segment(segment: &str) -> Result<(), PathError> {
    if is_wildcard(segment) {
        return Ok(());
    }
    if segment.contains('*') {
        return Err(PathError::MisplacedWildcard(segment.to_string()));
    }
    if let Some(ch) = segment.chars().find(|&c| {
        c == PATH_SEPARATOR
            || c.is_whitespace()
            || c.is_control()
            || matches!(c, '"' | '\'' | '`')
    }) {
        return Err(PathError::IllegalChar {
            segment: segment.to_string(),
            ch,
        });
    }
    Ok(())
}

/// A parsed path or path pattern
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PartialPath {
    nodes: Vec<String>,
}

impl PartialPath {
    /// Parse a dotted string such as `root.sg.d1.s1` or `root.**.s1`
    pub fn parse(path: &str) -> Result<Self, PathError> {
        if path.is_empty() {
            return Err(PathError::Empty);
        }

        let mut nodes = Vec::new();
        for (position, segment) in path.split(PATH_SEPARATOR).enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    path: path.to_string(),
                    position,
                });
            }
            validate_segment(segment)?;
            nodes.push(segment.to_string());
        }

        if nodes[0] != ROOT {
            return Err(PathError::MissingRoot(path.to_string()));
        }
        Ok(Self { nodes })
    }

    /// Build a path from already split segments
    pub fn from_nodes<I, S>(nodes: I) -> Result<Self, PathError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let nodes: Vec<String> = nodes.into_iter().map(Into::into).collect();
        if nodes.is_empty() {
            return Err(PathError::Empty);
        }
        for (position, segment) in nodes.iter().enumerate() {
            if segment.is_empty() {
                return Err(PathError::EmptySegment {
                    path: nodes.join("."),
                    position,
                });
            }
            validate_segment(segment)?;
        }
        if nodes[0] != ROOT {
            return Err(PathError::MissingRoot(nodes.join(".")));
        }
        Ok(Self { nodes })
    }

    /// The `root` path
    #[must_use]
    pub fn root() -> Self {
        Self {
            nodes: vec![ROOT.to_string()],
        }
    }

    /// Segments of this path, `root` first
    #[must_use]
    pub fn nodes(&self) -> &[String] {
        &self.nodes
    }

    /// Number of segments (`root` counts as one)
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Paths always hold at least `root`
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        false
    }

    /// Depth of the node this path names, `root` being depth 0
    #[must_use]
    pub fn depth(&self) -> usize {
        self.nodes.len() - 1
    }

    #[must_use]
    pub fn is_root(&self) -> bool {
        self.nodes.len() == 1
    }

    /// Final segment
    #[must_use]
    pub fn last(&self) -> &str {
        self.nodes.last().map_or(ROOT, String::as_str)
    }

    /// Parent path, or `None` for `root`
    #[must_use]
    pub fn parent(&self) -> Option<Self> {
        if self.is_root() {
            return None;
        }
        Some(Self {
            nodes: self.nodes[..self.nodes.len() - 1].to_vec(),
        })
    }

    /// The first `len` segments (at least `root`, at most the whole path)
    #[must_use]
    pub fn prefix(&self, len: usize) -> Self {
        let len = len.clamp(1, self.nodes.len());
        Self {
            nodes: self.nodes[..len].to_vec(),
        }
    }

    /// Proper ancestors, from `root` down to the parent
    pub fn ancestors(&self) -> impl Iterator<Item = Self> + '_ {
        (1..self.nodes.len()).map(|len| self.prefix(len))
    }

    /// Append one segment
    pub fn concat_node(&self, node: &str) -> Result<Self, PathError> {
        if node.is_empty() {
            return Err(PathError::EmptySegment {
                path: format!("{self}."),
                position: self.nodes.len(),
            });
        }
        validate_segment(node)?;
        let mut nodes = self.nodes.clone();
        nodes.push(node.to_string());
        Ok(Self { nodes })
    }

    /// Append a segment that is known to be valid (read back from storage)
    #[must_use]
    pub fn child_unchecked(&self, node: &str) -> Self {
        let mut nodes = self.nodes.clone();
        nodes.push(node.to_string());
        Self { nodes }
    }

    /// Whether any segment is `*` or `**`
    #[must_use]
    pub fn has_wildcard(&self) -> bool {
        self.nodes.iter().any(|n| is_wildcard(n))
    }

    /// Reject patterns where a concrete identifier is required
    pub fn ensure_concrete(&self) -> Result<(), PathError> {
        if self.has_wildcard() {
            return Err(PathError::WildcardNotAllowed(self.to_string()));
        }
        Ok(())
    }

    /// Segments before the first wildcard
    #[must_use]
    pub fn concrete_prefix(&self) -> Self {
        let len = self
            .nodes
            .iter()
            .position(|n| is_wildcard(n))
            .unwrap_or(self.nodes.len());
        self.prefix(len)
    }

    /// True if `self` is a proper ancestor of `other`
    #[must_use]
    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.nodes.len() < other.nodes.len() && other.nodes.starts_with(&self.nodes)
    }

    /// Treating `self` as a pattern, test whether it matches `path` fully
    #[must_use]
    pub fn matches(&self, path: &Self) -> bool {
        match_segments(&self.nodes, &path.nodes)
    }

    /// Treating `self` as a pattern, test whether it matches `path` or one
    /// of its ancestors
    #[must_use]
    pub fn matches_prefix(&self, path: &Self) -> bool {
        let mut cursor = PatternCursor::new(self);
        for node in &path.nodes {
            cursor = cursor.advance(node);
            if cursor.is_match() {
                return true;
            }
            if cursor.is_dead() {
                return false;
            }
        }
        false
    }

    /// Rough in-memory footprint in bytes
    #[must_use]
    pub fn estimated_size(&self) -> usize {
        24 + self.nodes.iter().map(|n| 24 + n.len()).sum::<usize>()
    }
}

/// Segment-wise glob match. `*` consumes one segment, `**` any number;
/// on mismatch we backtrack to the most recent `**` and let it consume
/// one more segment.
fn match_segments(pattern: &[String], path: &[String]) -> bool {
    let (mut p, mut s) = (0, 0);
    let mut backtrack: Option<(usize, usize)> = None;

    while s < path.len() {
        if p < pattern.len() && pattern[p] == MULTI_LEVEL_WILDCARD {
            backtrack = Some((p, s));
            p += 1;
        } else if p < pattern.len() && (pattern[p] == ONE_LEVEL_WILDCARD || pattern[p] == path[s])
        {
            p += 1;
            s += 1;
        } else if let Some((star_p, star_s)) = backtrack {
            p = star_p + 1;
            s = star_s + 1;
            backtrack = Some((star_p, star_s + 1));
        } else {
            return false;
        }
    }

    while p < pattern.len() && pattern[p] == MULTI_LEVEL_WILDCARD {
        p += 1;
    }
    p == pattern.len()
}

impl fmt::Display for PartialPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.nodes.join("."))
    }
}

impl fmt::Debug for PartialPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PartialPath({self})")
    }
}

impl FromStr for PartialPath {
    type Err = PathError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Incremental matcher over a pattern.
///
/// Tracks every pattern position reachable after consuming a sequence of
/// segments, so a tree walk can feed one segment per level and stop as
/// soon as no position survives.
#[derive(Debug, Clone)]
pub struct PatternCursor<'a> {
    pattern: &'a [String],
    states: Vec<usize>,
}

impl<'a> PatternCursor<'a> {
    /// Cursor positioned before the first segment
    #[must_use]
    pub fn new(pattern: &'a PartialPath) -> Self {
        let mut cursor = Self {
            pattern: &pattern.nodes,
            states: vec![0],
        };
        cursor.close();
        cursor
    }

    /// `**` may match nothing, so every state sitting on one also
    /// reaches the following position.
    fn close(&mut self) {
        let mut i = 0;
        while i < self.states.len() {
            let state = self.states[i];
            if state < self.pattern.len()
                && self.pattern[state] == MULTI_LEVEL_WILDCARD
                && !self.states.contains(&(state + 1))
            {
                self.states.push(state + 1);
            }
            i += 1;
        }
        self.states.sort_unstable();
        self.states.dedup();
    }

    /// Consume one path segment
    #[must_use]
    pub fn advance(&self, segment: &str) -> Self {
        let mut states = Vec::with_capacity(self.states.len() + 1);
        for &state in &self.states {
            let Some(p) = self.pattern.get(state) else {
                continue;
            };
            if p == MULTI_LEVEL_WILDCARD {
                states.push(state);
            } else if p == ONE_LEVEL_WILDCARD || p == segment {
                states.push(state + 1);
            }
        }
        let mut next = Self {
            pattern: self.pattern,
            states,
        };
        next.close();
        next
    }

    /// The segments consumed so far form a full match
    #[must_use]
    pub fn is_match(&self) -> bool {
        self.states.contains(&self.pattern.len())
    }

    /// No extension of the consumed segments can ever match
    #[must_use]
    pub fn is_dead(&self) -> bool {
        self.states.is_empty()
    }

    /// Some longer path could still match
    #[must_use]
    pub fn can_descend(&self) -> bool {
        self.states.iter().any(|&s| s < self.pattern.len())
    }

    /// When only literal segments can come next, return them; `None` when
    /// a wildcard could consume the next segment.
    #[must_use]
    pub fn next_literals(&self) -> Option<Vec<&'a str>> {
        let mut literals = Vec::new();
        for &state in &self.states {
            if let Some(p) = self.pattern.get(state) {
                if is_wildcard(p) {
                    return None;
                }
                literals.push(p.as_str());
            }
        }
        literals.sort_unstable();
        literals.dedup();
        Some(literals)
    }
}

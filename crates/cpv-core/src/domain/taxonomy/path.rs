//! Materialized paths
//!
//! A code's position in the hierarchy is stored as the ordered list of codes
//! from its root down to itself. Ancestor and descendant tests become prefix
//! tests on the segment lists, so no parent-link walking is needed at query
//! time.

use std::collections::{HashMap, HashSet};
use std::fmt;

use crate::error::{Error, Result};

/// Separator used when a path is rendered for storage
pub const SEPARATOR: char = '.';

/// Separators accepted when parsing
const ACCEPTED_SEPARATORS: [char; 2] = ['.', '/'];

/// Validated, non-empty sequence of codes from a root to a node
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CodePath {
    segments: Vec<String>,
}

impl CodePath {
    /// Parse a stored path such as `03000000.03100000` or `03000000/03100000`
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(Error::PathIntegrity("path is empty".to_string()));
        }

        let segments = trimmed
            .split(ACCEPTED_SEPARATORS)
            .map(|segment| {
                validate_segment(segment)
                    .map_err(|e| Error::PathIntegrity(format!("{} in path '{}'", e, raw)))
                    .map(|s| s.to_string())
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { segments })
    }

    /// Path of a root code
    pub fn root(code: &str) -> Result<Self> {
        let code = validate_segment(code).map_err(Error::PathIntegrity)?;
        Ok(Self {
            segments: vec![code.to_string()],
        })
    }

    /// Path of a direct child of this path
    pub fn child(&self, code: &str) -> Result<Self> {
        let code = validate_segment(code).map_err(Error::PathIntegrity)?;
        let mut segments = self.segments.clone();
        segments.push(code.to_string());
        Ok(Self { segments })
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// The code this path points at
    pub fn leaf(&self) -> &str {
        // segments is never empty: every constructor pushes at least one
        self.segments.last().map(String::as_str).unwrap_or_default()
    }

    /// Number of segments; roots have depth 1
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    /// Path of the parent node, `None` for roots
    pub fn parent(&self) -> Option<CodePath> {
        if self.segments.len() < 2 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec(),
        })
    }

    /// Code of the parent node, `None` for roots
    pub fn parent_code(&self) -> Option<&str> {
        let len = self.segments.len();
        if len < 2 {
            None
        } else {
            Some(self.segments[len - 2].as_str())
        }
    }

    /// True iff `self` is a segment-wise prefix of `of` (or equal to it)
    pub fn is_ancestor_or_self(&self, of: &CodePath) -> bool {
        of.segments.starts_with(&self.segments)
    }

    /// Every prefix of this path, from the root down to the path itself
    pub fn ancestors_or_self(&self) -> impl Iterator<Item = CodePath> + '_ {
        (1..=self.segments.len()).map(|n| Self {
            segments: self.segments[..n].to_vec(),
        })
    }

    /// Check the path against the record it was loaded with.
    ///
    /// The leaf must be the record's own code and the segment above it must be
    /// the declared parent (roots have none).
    pub fn ensure_consistent(&self, code: &str, parent_code: Option<&str>) -> Result<()> {
        if self.leaf() != code {
            return Err(Error::PathIntegrity(format!(
                "path '{}' does not end with code '{}'",
                self, code
            )));
        }
        if self.parent_code() != parent_code {
            return Err(Error::PathIntegrity(format!(
                "path '{}' disagrees with parent {:?} of code '{}'",
                self, parent_code, code
            )));
        }
        Ok(())
    }
}

impl fmt::Display for CodePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                write!(f, "{}", SEPARATOR)?;
            }
            write!(f, "{}", segment)?;
        }
        Ok(())
    }
}

/// Free-function form of [`CodePath::is_ancestor_or_self`]
pub fn is_ancestor_or_self(candidate: &CodePath, of: &CodePath) -> bool {
    candidate.is_ancestor_or_self(of)
}

/// Distinct paths referenced by a record collection, in first-seen order
pub fn collect_paths<'a, I>(paths: I) -> Vec<CodePath>
where
    I: IntoIterator<Item = &'a CodePath>,
{
    let mut seen = HashSet::new();
    paths
        .into_iter()
        .filter(|path| seen.insert(*path))
        .cloned()
        .collect()
}

/// Derive the path of every code in an import batch from its parent chain.
///
/// `links` holds `(code, parent_code)` pairs. A parent outside the batch must
/// be present in `known` (paths already stored). Unknown parents, duplicate
/// codes and parent cycles are integrity errors.
pub fn derive_paths<'a, I>(links: I, known: &HashMap<String, CodePath>) -> Result<HashMap<String, CodePath>>
where
    I: IntoIterator<Item = (&'a str, Option<&'a str>)>,
{
    let mut parents: HashMap<&str, Option<&str>> = HashMap::new();
    let mut order = Vec::new();
    for (code, parent) in links {
        validate_segment(code).map_err(Error::PathIntegrity)?;
        if parents.insert(code, parent).is_some() {
            return Err(Error::PathIntegrity(format!(
                "code '{}' appears more than once in the batch",
                code
            )));
        }
        order.push(code);
    }

    let mut resolved: HashMap<String, CodePath> = HashMap::new();

    for start in order {
        let mut chain: Vec<&str> = Vec::new();
        let mut on_chain: HashSet<&str> = HashSet::new();
        let mut current = start;

        let mut base = loop {
            if let Some(path) = resolved.get(current) {
                break Some(path.clone());
            }
            if !on_chain.insert(current) {
                return Err(Error::PathIntegrity(format!(
                    "parent cycle through code '{}'",
                    current
                )));
            }
            chain.push(current);

            match parents.get(current).copied().flatten() {
                None => break None,
                Some(parent) if parents.contains_key(parent) => current = parent,
                Some(parent) => match known.get(parent) {
                    Some(path) => break Some(path.clone()),
                    None => {
                        return Err(Error::PathIntegrity(format!(
                            "code '{}' references unknown parent '{}'",
                            current, parent
                        )));
                    }
                },
            }
        };

        for code in chain.into_iter().rev() {
            let path = match &base {
                Some(parent_path) => parent_path.child(code)?,
                None => CodePath::root(code)?,
            };
            resolved.insert(code.to_string(), path.clone());
            base = Some(path);
        }
    }

    Ok(resolved)
}

fn validate_segment(segment: &str) -> std::result::Result<&str, String> {
    if segment.is_empty() {
        return Err("empty path segment".to_string());
    }
    if let Some(c) = segment
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '_' || *c == '-'))
    {
        return Err(format!("invalid character {:?} in segment '{}'", c, segment));
    }
    Ok(segment)
}

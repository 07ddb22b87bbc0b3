//! Path hierarchy helpers.
//!
//! Catalog paths form a single namespace in which both `.` and `/` introduce
//! one level of nesting: `risk.cvar/portfolio` is a child of `risk.cvar`, which
//! is a child of `risk`. The final token of a path is whatever follows its
//! right-most separator.

/// The two hierarchy separators.
pub const SEPARATORS: [char; 2] = ['.', '/'];

/// Returns true if `c` is a hierarchy separator.
#[must_use]
pub fn is_separator(c: char) -> bool {
    SEPARATORS.contains(&c)
}

/// Returns the parent of `path`, or `None` for a top-level path.
///
/// ```rust
/// use moniker_core::path::parent_path;
///
/// assert_eq!(parent_path("risk.cvar/desk"), Some("risk.cvar"));
/// assert_eq!(parent_path("risk.cvar"), Some("risk"));
/// assert_eq!(parent_path("risk"), None);
/// ```
#[must_use]
pub fn parent_path(path: &str) -> Option<&str> {
    path.rfind(is_separator).map(|idx| &path[..idx])
}

/// Returns the ancestors of `path`, nearest first, ending at the top-level token.
#[must_use]
pub fn ancestor_paths(path: &str) -> Vec<&str> {
    let mut ancestors = Vec::new();
    let mut current = path;
    while let Some(parent) = parent_path(current) {
        if parent.is_empty() {
            break;
        }
        ancestors.push(parent);
        current = parent;
    }
    ancestors
}

/// Returns the top-level token of `path` (the text before the first separator).
#[must_use]
pub fn top_level(path: &str) -> &str {
    path.find(is_separator).map_or(path, |idx| &path[..idx])
}

/// Returns the final token of `path`.
#[must_use]
pub fn last_token(path: &str) -> &str {
    path.rfind(is_separator).map_or(path, |idx| &path[idx + 1..])
}

/// Returns true if `candidate` is exactly one level below `parent`.
///
/// With an empty `parent`, any separator-free path is a direct child.
#[must_use]
pub fn is_direct_child(parent: &str, candidate: &str) -> bool {
    if parent.is_empty() {
        return !candidate.is_empty() && !candidate.contains(is_separator);
    }
    let Some(rest) = candidate.strip_prefix(parent) else {
        return false;
    };
    let mut chars = rest.chars();
    match chars.next() {
        Some(sep) if is_separator(sep) => {
            let token = chars.as_str();
            !token.is_empty() && !token.contains(is_separator)
        }
        _ => false,
    }
}

/// Returns true if `path` has no separators.
#[must_use]
pub fn is_top_level(path: &str) -> bool {
    !path.contains(is_separator)
}

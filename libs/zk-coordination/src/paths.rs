//! Helpers for slash-separated node paths.

use crate::error::{CoordinationError, CoordinationResult};

/// Validate an absolute node path. Sequential base paths such as
/// `/members/member-` are ordinary paths here.
pub fn validate_path(path: &str) -> CoordinationResult<()> {
    let invalid = |reason: &str| CoordinationError::InvalidPath(format!("{path:?}: {reason}"));

    if path.is_empty() {
        return Err(invalid("path is empty"));
    }
    if !path.starts_with('/') {
        return Err(invalid("path must start with '/'"));
    }
    if path == "/" {
        return Ok(());
    }
    if path.ends_with('/') {
        return Err(invalid("path must not end with '/'"));
    }
    for segment in path[1..].split('/') {
        match segment {
            "" => return Err(invalid("empty segment")),
            "." | ".." => return Err(invalid("relative segment")),
            s if s.chars().any(char::is_control) => {
                return Err(invalid("control character in segment"));
            }
            _ => {}
        }
    }
    Ok(())
}

/// Join a parent path and a child name.
pub fn join_path(parent: &str, child: &str) -> String {
    let child = child.trim_start_matches('/');
    if parent.is_empty() || parent == "/" {
        format!("/{child}")
    } else if child.is_empty() {
        parent.trim_end_matches('/').to_owned()
    } else {
        format!("{}/{child}", parent.trim_end_matches('/'))
    }
}

/// Parent of `path`, `None` for the root.
pub fn parent_path(path: &str) -> Option<&str> {
    if path == "/" {
        return None;
    }
    match path.rfind('/') {
        Some(0) => Some("/"),
        Some(idx) => Some(&path[..idx]),
        None => None,
    }
}

/// Last segment of `path`.
pub fn node_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Every ancestor of `path` from the top down, excluding the root and `path`.
pub(crate) fn ancestors(path: &str) -> Vec<&str> {
    let mut out = Vec::new();
    let mut current = path;
    while let Some(parent) = parent_path(current) {
        if parent == "/" {
            break;
        }
        out.push(parent);
        current = parent;
    }
    out.reverse();
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_path() {
        assert!(validate_path("/").is_ok());
        assert!(validate_path("/locks/worker").is_ok());
        assert!(validate_path("/members/member-").is_ok());

        assert!(validate_path("").is_err());
        assert!(validate_path("locks").is_err());
        assert!(validate_path("/locks/").is_err());
        assert!(validate_path("/locks//worker").is_err());
        assert!(validate_path("/locks/../worker").is_err());
        assert!(validate_path("/locks/\u{0}").is_err());
    }

    #[test]
    fn test_join_path() {
        assert_eq!(join_path("/", "a"), "/a");
        assert_eq!(join_path("/a", "b"), "/a/b");
        assert_eq!(join_path("/a/", "/b"), "/a/b");
        assert_eq!(join_path("/a", ""), "/a");
    }

    #[test]
    fn test_parent_and_name() {
        assert_eq!(parent_path("/"), None);
        assert_eq!(parent_path("/a"), Some("/"));
        assert_eq!(parent_path("/a/b/c"), Some("/a/b"));
        assert_eq!(node_name("/a/b/c"), "c");
        assert_eq!(node_name("/a"), "a");
    }

    #[test]
    fn test_ancestors() {
        assert_eq!(ancestors("/a/b/c"), vec!["/a", "/a/b"]);
        assert!(ancestors("/a").is_empty());
    }
}

//! Path prefix matching.
//!
//! # Responsibilities
//! - Normalize configured prefixes
//! - Match a request path against a prefix on segment boundaries
//! - Compute the path forwarded upstream
//!
//! # Design Decisions
//! - Path matching is case-sensitive
//! - `/api/auth/` matches `/api/auth` and `/api/auth/login`, never `/api/authx`
//! - `/` is a catch-all
//! - No regex to guarantee O(len) matching

/// Strip trailing slashes; the root prefix stays `/`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim_end_matches('/');
    if trimmed.is_empty() {
        "/".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Matches request paths against one normalized prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathPrefixMatcher {
    prefix: String,
}

impl PathPrefixMatcher {
    /// Create a new path prefix matcher; the prefix is normalized.
    pub fn new(prefix: impl AsRef<str>) -> Self {
        Self {
            prefix: normalize_prefix(prefix.as_ref()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Returns true if `path` lies under this prefix on a segment boundary.
    pub fn matches(&self, path: &str) -> bool {
        if self.prefix == "/" {
            return path.starts_with('/');
        }
        match path.strip_prefix(self.prefix.as_str()) {
            Some(rest) => rest.is_empty() || rest.starts_with('/'),
            None => false,
        }
    }

    /// Path remaining after the prefix, always starting with `/`.
    ///
    /// Only meaningful when [`matches`](Self::matches) returned true.
    pub fn strip<'a>(&self, path: &'a str) -> &'a str {
        if self.prefix == "/" {
            return path;
        }
        match path.get(self.prefix.len()..) {
            Some(rest) if !rest.is_empty() => rest,
            _ => "/",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize() {
        assert_eq!(normalize_prefix("/api/auth/"), "/api/auth");
        assert_eq!(normalize_prefix("/api/auth"), "/api/auth");
        assert_eq!(normalize_prefix("/"), "/");
        assert_eq!(normalize_prefix("//"), "/");
    }

    #[test]
    fn test_segment_boundaries() {
        let matcher = PathPrefixMatcher::new("/api/auth/");
        assert!(matcher.matches("/api/auth"));
        assert!(matcher.matches("/api/auth/"));
        assert!(matcher.matches("/api/auth/login"));
        assert!(!matcher.matches("/api/authx"));
        assert!(!matcher.matches("/api/aut"));
        assert!(!matcher.matches("/API/auth/login")); // Case sensitive
    }

    #[test]
    fn test_root_matches_everything() {
        let matcher = PathPrefixMatcher::new("/");
        assert!(matcher.matches("/"));
        assert!(matcher.matches("/anything/at/all"));
        assert_eq!(matcher.strip("/anything"), "/anything");
    }

    #[test]
    fn test_strip() {
        let matcher = PathPrefixMatcher::new("/api/auth/");
        assert_eq!(matcher.strip("/api/auth/login"), "/login");
        assert_eq!(matcher.strip("/api/auth"), "/");
        assert_eq!(matcher.strip("/api/auth/"), "/");
    }
}

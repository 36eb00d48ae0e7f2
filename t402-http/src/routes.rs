//! Route pattern matching for payment-gated endpoints.
//!
//! Patterns are written as `"VERB /path/pattern"` or `"/path/pattern"` (any
//! verb). Within the path, `*` is a greedy wildcard matching any number of
//! segments and `[name]` is a single-segment placeholder. Matching runs
//! against the request's percent-decoded, slash-normalized path with query
//! and fragment stripped; verbs compare case-insensitively and `*` matches
//! any verb.

use std::borrow::Cow;
use std::fmt;
use std::str::FromStr;

use percent_encoding::percent_decode_str;

use t402::config::ResourceConfig;

/// One component of a route pattern path.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Matches this literal segment exactly.
    Literal(String),
    /// Matches exactly one segment of any content.
    Param(String),
    /// Matches zero or more segments.
    Wildcard,
}

/// Error returned when parsing an invalid route pattern.
#[derive(Debug, thiserror::Error)]
#[error("Invalid route pattern {0:?}")]
pub struct RoutePatternError(String);

/// A compiled route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutePattern {
    /// The verb to match, uppercased, or `None` for any verb.
    method: Option<String>,
    segments: Vec<Segment>,
}

impl RoutePattern {
    /// Returns `true` if the pattern matches the given verb and raw path.
    #[must_use]
    pub fn matches(&self, method: &str, path: &str) -> bool {
        if let Some(expected) = &self.method
            && !expected.eq_ignore_ascii_case(method)
        {
            return false;
        }
        let path = normalize_path(path);
        let segments: Vec<&str> = if path == "/" {
            Vec::new()
        } else {
            path.trim_start_matches('/').split('/').collect()
        };
        match_segments(&self.segments, &segments)
    }
}

impl fmt::Display for RoutePattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(method) = &self.method {
            write!(f, "{method} ")?;
        } else {
            write!(f, "* ")?;
        }
        if self.segments.is_empty() {
            return write!(f, "/");
        }
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => write!(f, "/{s}")?,
                Segment::Param(name) => write!(f, "/[{name}]")?,
                Segment::Wildcard => write!(f, "/*")?,
            }
        }
        Ok(())
    }
}

impl FromStr for RoutePattern {
    type Err = RoutePatternError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (method, path) = match s.split_once(char::is_whitespace) {
            Some((verb, path)) => {
                let path = path.trim();
                if verb == "*" {
                    (None, path)
                } else {
                    (Some(verb.to_ascii_uppercase()), path)
                }
            }
            None => (None, s),
        };

        if !path.starts_with('/') {
            return Err(RoutePatternError(s.into()));
        }

        let normalized = normalize_path(path);
        let segments = if normalized == "/" {
            Vec::new()
        } else {
            normalized
                .trim_start_matches('/')
                .split('/')
                .map(|segment| {
                    if segment == "*" {
                        Segment::Wildcard
                    } else if let Some(name) =
                        segment.strip_prefix('[').and_then(|s| s.strip_suffix(']'))
                    {
                        Segment::Param(name.to_owned())
                    } else {
                        Segment::Literal(segment.to_owned())
                    }
                })
                .collect()
        };

        Ok(Self { method, segments })
    }
}

/// Strips query and fragment, percent-decodes, and collapses duplicate
/// slashes. The result always starts with `/` and never ends with one
/// (except the bare root).
fn normalize_path(path: &str) -> String {
    let path = path.split(['?', '#']).next().unwrap_or("");
    let decoded: Cow<'_, str> = percent_decode_str(path).decode_utf8_lossy();

    let mut normalized = String::with_capacity(decoded.len() + 1);
    normalized.push('/');
    for segment in decoded.split('/').filter(|s| !s.is_empty()) {
        if !normalized.ends_with('/') {
            normalized.push('/');
        }
        normalized.push_str(segment);
    }
    normalized
}

/// Recursive segment matcher; the wildcard greedily consumes zero or more
/// segments with backtracking for trailing pattern segments.
fn match_segments(pattern: &[Segment], path: &[&str]) -> bool {
    match pattern.split_first() {
        None => path.is_empty(),
        Some((Segment::Wildcard, rest)) => (0..=path.len())
            .rev()
            .any(|taken| match_segments(rest, &path[taken..])),
        Some((segment, rest)) => {
            let Some((head, tail)) = path.split_first() else {
                return false;
            };
            let head_matches = match segment {
                Segment::Literal(expected) => expected == head,
                Segment::Param(_) => true,
                Segment::Wildcard => unreachable!(),
            };
            head_matches && match_segments(rest, tail)
        }
    }
}

/// An ordered table of payment-gated routes.
///
/// The first matching pattern wins.
#[derive(Debug, Default)]
pub struct PaymentRoutes {
    routes: Vec<(RoutePattern, ResourceConfig)>,
}

impl PaymentRoutes {
    /// Creates an empty route table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a route.
    ///
    /// # Errors
    ///
    /// Returns [`RoutePatternError`] if the pattern does not parse.
    pub fn route(
        mut self,
        pattern: &str,
        config: ResourceConfig,
    ) -> Result<Self, RoutePatternError> {
        let pattern = pattern.parse()?;
        self.routes.push((pattern, config));
        Ok(self)
    }

    /// Finds the configuration for the first route matching the request.
    #[must_use]
    pub fn match_route(&self, method: &str, path: &str) -> Option<&ResourceConfig> {
        self.routes
            .iter()
            .find(|(pattern, _)| pattern.matches(method, path))
            .map(|(_, config)| config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(s: &str) -> RoutePattern {
        s.parse().unwrap()
    }

    #[test]
    fn test_literal_match() {
        let p = pattern("GET /api/data");
        assert!(p.matches("GET", "/api/data"));
        assert!(p.matches("get", "/api/data"));
        assert!(!p.matches("POST", "/api/data"));
        assert!(!p.matches("GET", "/api/other"));
        assert!(!p.matches("GET", "/api/data/more"));
    }

    #[test]
    fn test_any_verb() {
        let p = pattern("/api/data");
        assert!(p.matches("GET", "/api/data"));
        assert!(p.matches("POST", "/api/data"));

        let p = pattern("* /api/data");
        assert!(p.matches("DELETE", "/api/data"));
    }

    #[test]
    fn test_single_segment_placeholder() {
        let p = pattern("GET /users/[id]/profile");
        assert!(p.matches("GET", "/users/42/profile"));
        assert!(!p.matches("GET", "/users/profile"));
        assert!(!p.matches("GET", "/users/42/43/profile"));
    }

    #[test]
    fn test_greedy_wildcard() {
        let p = pattern("GET /files/*");
        assert!(p.matches("GET", "/files/a"));
        assert!(p.matches("GET", "/files/a/b/c"));
        assert!(p.matches("GET", "/files"));
        assert!(!p.matches("GET", "/other/a"));
    }

    #[test]
    fn test_wildcard_in_middle() {
        let p = pattern("GET /api/*/download");
        assert!(p.matches("GET", "/api/v1/download"));
        assert!(p.matches("GET", "/api/v1/reports/2024/download"));
        assert!(!p.matches("GET", "/api/v1/upload"));
    }

    #[test]
    fn test_query_and_fragment_stripped() {
        let p = pattern("GET /api/data");
        assert!(p.matches("GET", "/api/data?page=2"));
        assert!(p.matches("GET", "/api/data#section"));
    }

    #[test]
    fn test_path_normalization() {
        let p = pattern("GET /api/data");
        assert!(p.matches("GET", "//api///data/"));
        assert!(p.matches("GET", "/api/%64ata"));
    }

    #[test]
    fn test_root_pattern() {
        let p = pattern("GET /");
        assert!(p.matches("GET", "/"));
        assert!(p.matches("GET", ""));
        assert!(!p.matches("GET", "/api"));
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        assert!("GET api/data".parse::<RoutePattern>().is_err());
    }

    #[test]
    fn test_route_table_first_match_wins() {
        let premium = ResourceConfig::new(vec![]).with_description("premium");
        let general = ResourceConfig::new(vec![]).with_description("general");
        let routes = PaymentRoutes::new()
            .route("GET /api/premium/*", premium)
            .unwrap()
            .route("GET /api/*", general)
            .unwrap();

        let config = routes.match_route("GET", "/api/premium/report").unwrap();
        assert_eq!(config.description, "premium");
        let config = routes.match_route("GET", "/api/basic").unwrap();
        assert_eq!(config.description, "general");
        assert!(routes.match_route("GET", "/public").is_none());
    }
}

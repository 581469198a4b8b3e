//! URL patterns for deciding which requests bypass interception.

use crate::Request;
use tracing::trace;
use url::Url;

/// URL pattern for matching.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPattern {
    /// Pattern type.
    pub pattern_type: PatternType,
    /// Pattern string.
    pub pattern: String,
}

/// Type of URL pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatternType {
    /// Contains substring.
    Contains,
    /// Same origin (scheme, host and port).
    Origin,
    /// URL scheme, e.g. `chrome-extension`.
    Scheme,
}

impl UrlPattern {
    /// Create a contains pattern.
    pub fn contains(substring: &str) -> Self {
        Self {
            pattern_type: PatternType::Contains,
            pattern: substring.to_string(),
        }
    }

    /// Create an origin pattern. The origin is normalized through `Url`, so
    /// `https://api.example.com` and `https://api.example.com:443/` are equal.
    pub fn origin(origin: &Url) -> Self {
        Self {
            pattern_type: PatternType::Origin,
            pattern: origin.origin().ascii_serialization(),
        }
    }

    /// Create a scheme pattern.
    pub fn scheme(scheme: &str) -> Self {
        Self {
            pattern_type: PatternType::Scheme,
            pattern: scheme.to_ascii_lowercase(),
        }
    }

    /// Check if a URL matches this pattern.
    pub fn matches(&self, url: &Url) -> bool {
        match self.pattern_type {
            PatternType::Contains => url.as_str().contains(&self.pattern),
            PatternType::Origin => url.origin().ascii_serialization() == self.pattern,
            PatternType::Scheme => url.scheme() == self.pattern,
        }
    }
}

/// A set of patterns; a request matching any of them is filtered.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    patterns: Vec<UrlPattern>,
}

impl RequestFilter {
    /// Create an empty filter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a pattern.
    pub fn add(&mut self, pattern: UrlPattern) {
        self.patterns.push(pattern);
    }

    /// Builder form of [`RequestFilter::add`].
    pub fn with(mut self, pattern: UrlPattern) -> Self {
        self.add(pattern);
        self
    }

    /// Patterns currently installed.
    pub fn patterns(&self) -> &[UrlPattern] {
        &self.patterns
    }

    /// Return the first pattern matching the request, if any.
    pub fn matching(&self, request: &Request) -> Option<&UrlPattern> {
        let hit = self.patterns.iter().find(|p| p.matches(&request.url));
        if let Some(pattern) = hit {
            trace!(url = %request.url, pattern = %pattern.pattern, "Request filtered");
        }
        hit
    }

    /// Whether any pattern matches the request.
    pub fn matches(&self, request: &Request) -> bool {
        self.matching(request).is_some()
    }
}

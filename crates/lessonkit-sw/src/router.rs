//! Request classification.
//!
//! [`classify`] is a pure function: given the router configuration and a
//! request it decides whether the worker leaves the request alone or which
//! fetch strategy handles it.

use std::collections::HashSet;

use http::Method;
use lessonkit_net::{PatternType, Request, RequestFilter, UrlPattern};
use url::Url;

/// Pseudo-schemes used by browser extensions.
pub const EXTENSION_SCHEMES: &[&str] = &[
    "chrome-extension",
    "moz-extension",
    "safari-extension",
    "safari-web-extension",
    "ms-browser-extension",
];

/// Default image suffixes.
pub const DEFAULT_IMAGE_EXTENSIONS: &[&str] =
    &["png", "jpg", "jpeg", "gif", "svg", "webp", "ico", "avif", "bmp"];

/// Which strategy serves an intercepted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RequestClass {
    AppShell,
    Image,
    Runtime,
}

/// Why a request was left to the network untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassThroughReason {
    /// Only GET is intercepted.
    NotGet,
    /// Browser-extension pseudo-origin.
    ExtensionScheme,
    /// Remote API path fragment.
    ApiPath,
    /// Remote backend origin.
    BackendOrigin,
    /// No active worker controls the page.
    NoController,
}

/// Outcome of classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    PassThrough(PassThroughReason),
    Intercept(RequestClass),
}

/// Router configuration.
#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Origin the app shell is served from.
    pub origin: Url,
    /// Paths that make up the app shell (matched on same-origin requests).
    pub shell_paths: HashSet<String>,
    /// Lower-case image suffixes, without the dot.
    pub image_extensions: HashSet<String>,
    /// Requests matching this filter are never intercepted.
    pub bypass: RequestFilter,
}

impl RouterConfig {
    /// Build a router configuration.
    ///
    /// Extension schemes always bypass; `api_path_fragment` (when non-empty) and
    /// every backend origin are added to the bypass filter.
    pub fn new<S: AsRef<str>>(
        origin: Url,
        shell_paths: &[S],
        image_extensions: &[S],
        api_path_fragment: &str,
        backend_origins: &[Url],
    ) -> Self {
        let mut bypass = RequestFilter::new();
        for scheme in EXTENSION_SCHEMES {
            bypass.add(UrlPattern::scheme(scheme));
        }
        if !api_path_fragment.is_empty() {
            bypass.add(UrlPattern::contains(api_path_fragment));
        }
        for backend in backend_origins {
            bypass.add(UrlPattern::origin(backend));
        }

        Self {
            shell_paths: shell_paths
                .iter()
                .filter_map(|p| origin.join(p.as_ref()).ok())
                .map(|u| u.path().to_string())
                .collect(),
            image_extensions: image_extensions
                .iter()
                .map(|e| e.as_ref().trim_start_matches('.').to_ascii_lowercase())
                .collect(),
            origin,
            bypass,
        }
    }

    fn is_shell(&self, url: &Url) -> bool {
        url.origin() == self.origin.origin() && self.shell_paths.contains(url.path())
    }

    fn is_image(&self, url: &Url) -> bool {
        let path = url.path().to_ascii_lowercase();
        path.rsplit_once('.')
            .map(|(_, ext)| !ext.contains('/') && self.image_extensions.contains(ext))
            .unwrap_or(false)
    }
}

/// Classify a request.
pub fn classify(config: &RouterConfig, request: &Request) -> Route {
    if request.method != Method::GET {
        return Route::PassThrough(PassThroughReason::NotGet);
    }

    if let Some(pattern) = config.bypass.matching(request) {
        let reason = match pattern.pattern_type {
            PatternType::Scheme => PassThroughReason::ExtensionScheme,
            PatternType::Contains => PassThroughReason::ApiPath,
            PatternType::Origin => PassThroughReason::BackendOrigin,
        };
        return Route::PassThrough(reason);
    }

    let class = if config.is_shell(&request.url) {
        RequestClass::AppShell
    } else if config.is_image(&request.url) {
        RequestClass::Image
    } else {
        RequestClass::Runtime
    };
    Route::Intercept(class)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> RouterConfig {
        RouterConfig::new(
            Url::parse("https://app.example/").unwrap(),
            &["/", "/index.html", "/icons/icon-192x192.png", "/manifest.json"],
            DEFAULT_IMAGE_EXTENSIONS,
            "/api/",
            &[Url::parse("https://backend.example.com").unwrap()],
        )
    }

    fn route(url: &str) -> Route {
        classify(&config(), &Request::parse_get(url).unwrap())
    }

    #[test]
    fn test_non_get_passes_through() {
        let request = Request::new(Method::POST, Url::parse("https://app.example/").unwrap());
        assert_eq!(
            classify(&config(), &request),
            Route::PassThrough(PassThroughReason::NotGet)
        );
    }

    #[test]
    fn test_bypass_reasons() {
        assert_eq!(
            route("chrome-extension://abc/script.js"),
            Route::PassThrough(PassThroughReason::ExtensionScheme)
        );
        assert_eq!(
            route("https://app.example/api/schedule"),
            Route::PassThrough(PassThroughReason::ApiPath)
        );
        assert_eq!(
            route("https://backend.example.com/reports/1.png"),
            Route::PassThrough(PassThroughReason::BackendOrigin)
        );
    }

    #[test]
    fn test_shell_paths() {
        assert_eq!(route("https://app.example/"), Route::Intercept(RequestClass::AppShell));
        assert_eq!(
            route("https://app.example/index.html?v=2"),
            Route::Intercept(RequestClass::AppShell)
        );
        // Shell icons stay in the shell class even though they are images.
        assert_eq!(
            route("https://app.example/icons/icon-192x192.png"),
            Route::Intercept(RequestClass::AppShell)
        );
        // Same path on another origin is not shell.
        assert_eq!(
            route("https://cdn.example/index.html"),
            Route::Intercept(RequestClass::Runtime)
        );
    }

    #[test]
    fn test_images_by_suffix() {
        assert_eq!(
            route("https://app.example/avatars/ana.JPG"),
            Route::Intercept(RequestClass::Image)
        );
        assert_eq!(
            route("https://cdn.example/logo.svg?size=2"),
            Route::Intercept(RequestClass::Image)
        );
        assert_eq!(
            route("https://app.example/files.png/list"),
            Route::Intercept(RequestClass::Runtime)
        );
    }

    #[test]
    fn test_everything_else_is_runtime() {
        assert_eq!(
            route("https://app.example/assets/index-abc123.js"),
            Route::Intercept(RequestClass::Runtime)
        );
        assert_eq!(
            route("https://fonts.example/inter.woff2"),
            Route::Intercept(RequestClass::Runtime)
        );
    }

    #[test]
    fn test_empty_api_fragment_is_ignored() {
        let config = RouterConfig::new(
            Url::parse("https://app.example/").unwrap(),
            &["/"],
            &["png"],
            "",
            &[],
        );
        assert_eq!(config.bypass.patterns().len(), EXTENSION_SCHEMES.len());
    }
}

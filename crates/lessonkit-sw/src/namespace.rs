//! Versioned cache namespaces.
//!
//! Each [`CacheRole`] carries its own version; the concrete cache name is
//! `<prefix>-<role>-v<version>`. Bumping a version orphans the previous cache,
//! which activation then deletes.

use std::collections::BTreeSet;

/// The three roles a cache namespace can play.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CacheRole {
    /// Pre-warmed application shell.
    Shell,
    /// Bounded image cache.
    Image,
    /// Stale-while-revalidate runtime cache.
    Runtime,
}

impl CacheRole {
    /// Every role, in a fixed order.
    pub const ALL: [CacheRole; 3] = [CacheRole::Shell, CacheRole::Image, CacheRole::Runtime];

    /// Name fragment used in cache names.
    pub fn as_str(&self) -> &'static str {
        match self {
            CacheRole::Shell => "shell",
            CacheRole::Image => "image",
            CacheRole::Runtime => "runtime",
        }
    }

    fn from_name(s: &str) -> Option<Self> {
        CacheRole::ALL.into_iter().find(|r| r.as_str() == s)
    }
}

/// A role bound to a version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNamespace {
    pub role: CacheRole,
    pub version: u32,
    name: String,
}

impl CacheNamespace {
    /// Create a namespace under the given prefix.
    pub fn new(prefix: &str, role: CacheRole, version: u32) -> Self {
        Self {
            role,
            version,
            name: format!("{}-{}-v{}", prefix, role.as_str(), version),
        }
    }

    /// Parse a cache name produced by [`CacheNamespace::new`].
    pub fn parse(prefix: &str, name: &str) -> Option<Self> {
        let rest = name.strip_prefix(prefix)?.strip_prefix('-')?;
        let (role, version) = rest.rsplit_once("-v")?;
        let role = CacheRole::from_name(role)?;
        let version = version.parse().ok()?;
        Some(Self::new(prefix, role, version))
    }

    /// Concrete cache name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl std::fmt::Display for CacheNamespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name)
    }
}

/// Current version of every namespace role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheVersions {
    pub prefix: String,
    pub shell: u32,
    pub image: u32,
    pub runtime: u32,
}

impl Default for CacheVersions {
    fn default() -> Self {
        Self {
            prefix: "lessonkit".to_string(),
            shell: 1,
            image: 1,
            runtime: 1,
        }
    }
}

impl CacheVersions {
    /// Namespace for a role at its current version.
    pub fn namespace(&self, role: CacheRole) -> CacheNamespace {
        let version = match role {
            CacheRole::Shell => self.shell,
            CacheRole::Image => self.image,
            CacheRole::Runtime => self.runtime,
        };
        CacheNamespace::new(&self.prefix, role, version)
    }

    /// Names of the caches that should exist at these versions.
    pub fn expected(&self) -> BTreeSet<String> {
        CacheRole::ALL
            .into_iter()
            .map(|role| self.namespace(role).name().to_string())
            .collect()
    }

    /// Existing cache names that are not expected at these versions.
    pub fn stale<'a>(&self, existing: &'a [String]) -> Vec<&'a str> {
        let expected = self.expected();
        existing
            .iter()
            .filter(|name| !expected.contains(name.as_str()))
            .map(|name| name.as_str())
            .collect()
    }
}

//! Cache key definitions for paginated reads.
//!
//! Every key written by the read path must match [`CacheKey::search_pattern`] for the same
//! resource, otherwise invalidation would leave it behind.

use crate::application::query::PageNumber;

/// Resource kind served by this crate; also the key namespace.
pub const NEWS_RESOURCE: &str = "news";

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey {
    /// One page of search-ordered results for a resource kind.
    SearchPage { resource: &'static str, page: PageNumber },
}

impl CacheKey {
    pub fn search_page(resource: &'static str, page: PageNumber) -> Self {
        Self::SearchPage { resource, page }
    }

    /// Glob pattern matching every key produced by [`CacheKey::search_page`] for `resource`.
    pub fn search_pattern(resource: &str) -> String {
        format!("{resource}:search:page:*")
    }

    pub fn render(&self) -> String {
        match self {
            CacheKey::SearchPage { resource, page } => {
                format!("{resource}:search:page:{}", page.get())
            }
        }
    }
}

impl std::fmt::Display for CacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.render())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn glob_matches(pattern: &str, key: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => pattern == key,
        }
    }

    #[test]
    fn page_keys_are_stable() {
        let key = CacheKey::search_page(NEWS_RESOURCE, PageNumber::from_raw(4));
        assert_eq!(key.render(), "news:search:page:4");
        assert_eq!(key.to_string(), "news:search:page:4");
    }

    #[test]
    fn pattern_covers_every_page_key() {
        let pattern = CacheKey::search_pattern(NEWS_RESOURCE);
        for raw in [1, 2, 10, 11, 4096] {
            let key = CacheKey::search_page(NEWS_RESOURCE, PageNumber::from_raw(raw)).render();
            assert!(glob_matches(&pattern, &key), "{key} escaped {pattern}");
        }
        assert!(!glob_matches(&pattern, "other:search:page:1"));
    }
}

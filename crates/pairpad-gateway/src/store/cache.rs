use std::time::Duration;

use moka::sync::Cache;

use pairpad_core::model::is_unset;

use crate::config::CacheSection;

/// Last-known buffer per room, consulted when the store only holds the placeholder.
pub trait FallbackCache: Send + Sync {
    fn get(&self, code: &str) -> Option<String>;
    fn put(&self, code: &str, content: &str);
}

pub struct MokaCache {
    inner: Cache<String, String>,
}

impl MokaCache {
    pub fn new(cfg: &CacheSection) -> Self {
        Self {
            inner: Cache::builder()
                .max_capacity(cfg.max_entries)
                .time_to_idle(Duration::from_secs(cfg.ttl_secs))
                .build(),
        }
    }
}

impl FallbackCache for MokaCache {
    fn get(&self, code: &str) -> Option<String> {
        self.inner.get(code)
    }

    /// Placeholder content is never cached.
    fn put(&self, code: &str, content: &str) {
        if is_unset(content) {
            return;
        }
        self.inner.insert(code.to_string(), content.to_string());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pairpad_core::model::PLACEHOLDER_CONTENT;

    #[test]
    fn placeholder_is_not_cached() {
        let cache = MokaCache::new(&CacheSection::default());
        cache.put("AB12", PLACEHOLDER_CONTENT);
        assert_eq!(cache.get("AB12"), None);

        cache.put("AB12", "x = 1");
        assert_eq!(cache.get("AB12").as_deref(), Some("x = 1"));
    }
}

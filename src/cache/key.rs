//! # Cache capability of a task.
//!
//! A task opts into caching by returning a [`Cacheable`] from
//! [`Task::cacheable`](crate::Task::cacheable). [`CacheSpec`] is the closure-backed
//! implementation used by [`TaskFn`](crate::TaskFn).
//!
//! ## Default key
//! [`default_cache_key`] derives the key from the task key and the *sorted* tags,
//! so the same tag set always maps to the same entry:
//! ```text
//! "stock" + {"sku_42", "stock"} ──► "stock_" + blake3("sku_42|stock")[..16]
//! ```

use std::fmt;
use std::sync::Arc;

use crate::cache::entry::CachePolicy;
use crate::tasks::{RequestContext, TaskKey};

type TagFn = Arc<dyn Fn(&RequestContext) -> Vec<String> + Send + Sync>;
type KeyFn = Arc<dyn Fn(&RequestContext) -> String + Send + Sync>;

/// Cache key, tags and freshness windows of a task.
pub trait Cacheable: Send + Sync {
    /// Unique key for one result of this task; must reflect every request
    /// parameter that changes the result.
    fn cache_key(&self, ctx: &RequestContext) -> String;

    /// Invalidation labels attached to the stored entry.
    fn cache_tags(&self, ctx: &RequestContext) -> Vec<String>;

    /// Freshness windows.
    fn policy(&self) -> CachePolicy;
}

/// Builds `"{task}_{hash}"` from the task key and the sorted tags.
pub fn default_cache_key(task: &str, tags: &[String]) -> String {
    let mut sorted: Vec<&str> = tags.iter().map(String::as_str).collect();
    sorted.sort_unstable();

    let digest = blake3::hash(sorted.join("|").as_bytes());
    let hex = digest.to_hex();
    format!("{task}_{}", &hex.as_str()[..16])
}

/// Closure-backed [`Cacheable`].
#[derive(Clone)]
pub struct CacheSpec {
    task: TaskKey,
    policy: CachePolicy,
    tags: TagFn,
    key: Option<KeyFn>,
}

impl CacheSpec {
    /// Creates a spec deriving the key from tags via [`default_cache_key`].
    pub fn new<T>(policy: CachePolicy, tags: T) -> Self
    where
        T: Fn(&RequestContext) -> Vec<String> + Send + Sync + 'static,
    {
        Self {
            task: Arc::from(""),
            policy,
            tags: Arc::new(tags),
            key: None,
        }
    }

    /// Replaces the default key derivation.
    pub fn with_key<K>(mut self, key: K) -> Self
    where
        K: Fn(&RequestContext) -> String + Send + Sync + 'static,
    {
        self.key = Some(Arc::new(key));
        self
    }

    /// Binds the spec to the task key used by the default key derivation.
    pub fn for_task(mut self, task: impl Into<TaskKey>) -> Self {
        self.task = task.into();
        self
    }
}

impl Cacheable for CacheSpec {
    fn cache_key(&self, ctx: &RequestContext) -> String {
        match &self.key {
            Some(key) => key(ctx),
            None => default_cache_key(&self.task, &(self.tags)(ctx)),
        }
    }

    fn cache_tags(&self, ctx: &RequestContext) -> Vec<String> {
        (self.tags)(ctx)
    }

    fn policy(&self) -> CachePolicy {
        self.policy
    }
}

impl fmt::Debug for CacheSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheSpec")
            .field("task", &self.task)
            .field("policy", &self.policy)
            .field("custom_key", &self.key.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn default_key_ignores_tag_order() {
        let a = default_cache_key("stock", &tags(&["sku_1", "eu", "stock"]));
        let b = default_cache_key("stock", &tags(&["stock", "sku_1", "eu"]));
        assert_eq!(a, b);
        assert_eq!(a.len(), "stock_".len() + 16);
    }

    #[test]
    fn default_key_varies_with_tags_and_task() {
        let base = default_cache_key("stock", &tags(&["sku_1"]));
        assert_ne!(base, default_cache_key("stock", &tags(&["sku_2"])));
        assert_ne!(base, default_cache_key("price", &tags(&["sku_1"])));
    }

    #[test]
    fn spec_tags_follow_context() {
        let spec = CacheSpec::new(CachePolicy::new(60, 0, 0), |ctx: &RequestContext| {
            vec![format!("sku_{}", ctx.get("sku").unwrap_or("none"))]
        })
        .for_task("stock");
        let ctx = RequestContext::new("r").with_param("sku", "42");

        assert_eq!(spec.cache_tags(&ctx), vec!["sku_42".to_string()]);
        assert_eq!(
            spec.cache_key(&ctx),
            default_cache_key("stock", &["sku_42".to_string()])
        );
    }

    #[test]
    fn custom_key_wins() {
        let spec = CacheSpec::new(CachePolicy::default(), |_ctx: &RequestContext| Vec::new())
            .with_key(|ctx: &RequestContext| format!("k:{}", ctx.request_id()));
        assert_eq!(spec.cache_key(&RequestContext::new("abc")), "k:abc");
    }
}

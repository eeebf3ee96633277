//! Disk-backed memoization of scrape calls.
//!
//! Each call is keyed by the function name and its JSON-encoded arguments.
//! Entries never expire; delete them by hand, per function or per call.
//!
//! # Cache Structure
//!
//! ```text
//! <cache dir>/
//!   get_published_papers/
//!     <md5 of key>.json
//!   cur_citing_papers/
//!     <md5 of key>.json
//! ```

use crate::error::{Result, ScholarError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// On-disk entry
#[derive(Debug, Serialize, Deserialize)]
struct CacheEntry {
    key: String,
    function: String,
    cached_at: String,
    value: serde_json::Value,
}

/// Memoization store for scrape results.
#[derive(Debug, Clone)]
pub struct ResultCache {
    dir: PathBuf,
    enabled: bool,
}

impl ResultCache {
    /// Open a cache rooted at `dir`. Nothing is created until the first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
        }
    }

    /// A cache that never stores anything.
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Build the lookup key for a call.
    pub fn key<A: Serialize + ?Sized>(function: &str, args: &A) -> Result<String> {
        Ok(format!("{}:{}", function, serde_json::to_string(args)?))
    }

    fn entry_path(&self, function: &str, key: &str) -> PathBuf {
        let digest = md5::compute(key.as_bytes());
        self.dir.join(function).join(format!("{:x}.json", digest))
    }

    /// Read a cached value. Unreadable entries count as misses.
    pub fn get<A, T>(&self, function: &str, args: &A) -> Result<Option<T>>
    where
        A: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        if !self.enabled {
            return Ok(None);
        }
        let key = Self::key(function, args)?;
        let path = self.entry_path(function, &key);
        if !path.exists() {
            debug!(key = %key, "Cache miss");
            return Ok(None);
        }

        let entry = match fs::read_to_string(&path)
            .map_err(ScholarError::from)
            .and_then(|s| serde_json::from_str::<CacheEntry>(&s).map_err(ScholarError::from))
        {
            Ok(entry) => entry,
            Err(e) => {
                warn!(path = ?path, error = %e, "Unreadable cache entry");
                return Ok(None);
            }
        };

        if entry.key != key {
            warn!(path = ?path, "Cache key collision, ignoring entry");
            return Ok(None);
        }

        match serde_json::from_value(entry.value) {
            Ok(value) => {
                debug!(key = %key, "Cache hit");
                Ok(Some(value))
            }
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value has an unexpected shape");
                Ok(None)
            }
        }
    }

    /// Store a value for a call, replacing any previous entry.
    pub fn put<A, T>(&self, function: &str, args: &A, value: &T) -> Result<()>
    where
        A: Serialize + ?Sized,
        T: Serialize,
    {
        if !self.enabled {
            return Ok(());
        }
        let key = Self::key(function, args)?;
        let path = self.entry_path(function, &key);
        let entry = CacheEntry {
            key,
            function: function.to_string(),
            cached_at: chrono::Local::now().to_rfc3339(),
            value: serde_json::to_value(value)?,
        };

        let parent = path
            .parent()
            .ok_or_else(|| ScholarError::Cache(format!("No parent for {:?}", path)))?;
        fs::create_dir_all(parent)?;

        let tmp = path.with_extension("json.tmp");
        fs::write(&tmp, serde_json::to_vec(&entry)?)?;
        fs::rename(&tmp, &path)?;
        debug!(key = %entry.key, "Cached");
        Ok(())
    }

    /// Return the cached value for a call, or await `fetch` and cache its result.
    ///
    /// `fetch` is only polled on a miss. Errors are returned as-is and never
    /// cached, so a cancelled page is fetched again next time.
    pub async fn memoize<A, T, Fut>(&self, function: &str, args: &A, fetch: Fut) -> Result<T>
    where
        A: Serialize + ?Sized,
        T: Serialize + DeserializeOwned,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(hit) = self.get(function, args)? {
            return Ok(hit);
        }
        let value = fetch.await?;
        if let Err(e) = self.put(function, args, &value) {
            warn!(function, error = %e, "Failed to cache result");
        }
        Ok(value)
    }

    /// Drop the entry of a single call. Returns whether one existed.
    pub fn invalidate<A: Serialize + ?Sized>(&self, function: &str, args: &A) -> Result<bool> {
        if !self.enabled {
            return Ok(false);
        }
        let key = Self::key(function, args)?;
        let path = self.entry_path(function, &key);
        if path.exists() {
            fs::remove_file(&path)?;
            debug!(key = %key, "Invalidated");
            return Ok(true);
        }
        Ok(false)
    }

    /// Drop every entry of one function.
    pub fn clear_function(&self, function: &str) -> Result<usize> {
        if !self.enabled {
            return Ok(0);
        }
        let dir = self.dir.join(function);
        let removed = count_entries(&dir)?;
        if dir.exists() {
            fs::remove_dir_all(&dir)?;
            info!(function, removed, "Cleared cached function");
        }
        Ok(removed)
    }

    /// Drop the whole cache.
    pub fn clear(&self) -> Result<usize> {
        let removed: usize = self.stats()?.values().sum();
        if self.enabled && self.dir.exists() {
            fs::remove_dir_all(&self.dir)?;
            info!(dir = ?self.dir, removed, "Cleared cache");
        }
        Ok(removed)
    }

    /// Number of entries per function.
    pub fn stats(&self) -> Result<BTreeMap<String, usize>> {
        let mut stats = BTreeMap::new();
        if !self.enabled || !self.dir.exists() {
            return Ok(stats);
        }
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                let name = entry.file_name().to_string_lossy().into_owned();
                stats.insert(name, count_entries(&entry.path())?);
            }
        }
        Ok(stats)
    }
}

fn count_entries(dir: &Path) -> Result<usize> {
    if !dir.exists() {
        return Ok(0);
    }
    let mut n = 0;
    for entry in fs::read_dir(dir)? {
        if entry?.path().extension().is_some_and(|ext| ext == "json") {
            n += 1;
        }
    }
    Ok(n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use tempfile::TempDir;

    #[test]
    fn test_key_includes_function_and_args() -> Result<()> {
        assert_eq!(ResultCache::key("get_author", "u")?, r#"get_author:"u""#);
        assert_ne!(
            ResultCache::key("get_author", "u")?,
            ResultCache::key("get_papers", "u")?
        );
        Ok(())
    }

    #[test]
    fn test_put_get_and_invalidate() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = ResultCache::new(dir.path());

        assert!(cache.get::<_, Vec<String>>("f", "a")?.is_none());
        cache.put("f", "a", &vec!["x".to_string()])?;
        assert_eq!(cache.get::<_, Vec<String>>("f", "a")?, Some(vec!["x".to_string()]));
        assert!(cache.get::<_, Vec<String>>("f", "b")?.is_none());

        assert!(cache.invalidate("f", "a")?);
        assert!(!cache.invalidate("f", "a")?);
        assert!(cache.get::<_, Vec<String>>("f", "a")?.is_none());
        Ok(())
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = ResultCache::new(dir.path());
        cache.put("f", "a", &1u32)?;

        let key = ResultCache::key("f", "a")?;
        fs::write(cache.entry_path("f", &key), "{not json")?;
        assert!(cache.get::<_, u32>("f", "a")?.is_none());
        Ok(())
    }

    #[test]
    fn test_shape_mismatch_is_a_miss() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = ResultCache::new(dir.path());
        cache.put("f", "a", &"text")?;
        assert!(cache.get::<_, u32>("f", "a")?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_memoize_runs_once() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = ResultCache::new(dir.path());
        let calls = Cell::new(0);

        for _ in 0..3 {
            let v: u32 = cache
                .memoize("count", &("x", 1), async {
                    calls.set(calls.get() + 1);
                    Ok(42)
                })
                .await?;
            assert_eq!(v, 42);
        }
        assert_eq!(calls.get(), 1);
        Ok(())
    }

    #[tokio::test]
    async fn test_memoize_does_not_cache_errors() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = ResultCache::new(dir.path());

        let first: Result<u32> = cache
            .memoize("page", "u", async { Err(ScholarError::Cancelled("#x".into())) })
            .await;
        assert!(first.is_err());

        let second: u32 = cache.memoize("page", "u", async { Ok(7) }).await?;
        assert_eq!(second, 7);
        Ok(())
    }

    #[test]
    fn test_stats_and_clear() -> Result<()> {
        let dir = TempDir::new()?;
        let cache = ResultCache::new(dir.path().join("store"));
        cache.put("get_author", "a", &1)?;
        cache.put("get_author", "b", &2)?;
        cache.put("get_papers", "t", &3)?;

        let stats = cache.stats()?;
        assert_eq!(stats.get("get_author"), Some(&2));
        assert_eq!(stats.get("get_papers"), Some(&1));

        assert_eq!(cache.clear_function("get_author")?, 2);
        assert!(cache.get::<_, i32>("get_author", "a")?.is_none());
        assert_eq!(cache.get::<_, i32>("get_papers", "t")?, Some(3));

        assert_eq!(cache.clear()?, 1);
        assert!(cache.stats()?.is_empty());
        Ok(())
    }

    #[test]
    fn test_disabled_cache_stores_nothing() -> Result<()> {
        let cache = ResultCache::disabled();
        cache.put("f", "a", &1)?;
        assert!(cache.get::<_, i32>("f", "a")?.is_none());
        Ok(())
    }
}

//! Incremental compilation cache.
//!
//! Entries are keyed by path and validated against the file's modification
//! time, size and content hash. The cache is bounded twice: inserting past
//! `max_size` evicts the oldest entries down to three quarters of the bound,
//! and [`Cache::sweep_expired`] drops entries older than a TTL.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use ahash::AHashMap;
use anyhow::{Context, Result};

use crate::ast::InferredType;
use crate::helpers;
use crate::session::CompiledModule;

/// What identifies one version of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub path: String,
    /// `None` for in-memory sources and platforms without mtimes.
    pub mtime: Option<SystemTime>,
    pub size: u64,
    pub content_hash: blake3::Hash,
}

impl FileMetadata {
    pub fn for_contents(path: impl Into<String>, mtime: Option<SystemTime>, contents: &str) -> Self {
        Self {
            path: path.into(),
            mtime,
            size: contents.len() as u64,
            content_hash: helpers::content_hash(contents.as_bytes()),
        }
    }

    /// Read the modification time of `path`.
    pub fn modified(path: &Path) -> Result<SystemTime> {
        std::fs::metadata(path)
            .and_then(|m| m.modified())
            .with_context(|| format!("Could not read the modification time of {}", path.display()))
    }

    /// Whether `other` describes a different version of the file.
    pub fn differs_from(&self, other: &FileMetadata) -> bool {
        self.mtime != other.mtime || self.size != other.size || self.content_hash != other.content_hash
    }
}

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub module: Arc<CompiledModule>,
    pub metadata: FileMetadata,
    /// Inferred type of every declared variable.
    pub type_info: BTreeMap<String, InferredType>,
    /// Import specifiers of the module, in source order.
    pub dependencies: Vec<String>,
    pub timestamp: Instant,
    seq: u64,
}

impl CacheEntry {
    pub fn new(module: Arc<CompiledModule>, metadata: FileMetadata) -> Self {
        let type_info = module
            .program
            .variables()
            .map(|v| (v.name.clone(), v.inferred_type))
            .collect();
        let dependencies = module.program.imports().map(|i| i.source.clone()).collect();
        Self {
            module,
            metadata,
            type_info,
            dependencies,
            timestamp: Instant::now(),
            seq: 0,
        }
    }
}

/// Result of checking a file against the cache.
#[derive(Debug)]
pub enum Lookup<'a> {
    /// Cached and unchanged.
    Hit(&'a CacheEntry),
    /// Cached, but the file changed since.
    Stale(&'a CacheEntry),
    Miss,
}

#[derive(Debug)]
pub struct Cache {
    entries: AHashMap<String, CacheEntry>,
    max_size: usize,
    next_seq: u64,
}

impl Cache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: AHashMap::new(),
            max_size: max_size.max(1),
            next_seq: 0,
        }
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn get(&self, path: &str) -> Option<&CacheEntry> {
        self.entries.get(path)
    }

    /// Cached paths, sorted.
    pub fn paths(&self) -> Vec<&str> {
        let mut paths: Vec<&str> = self.entries.keys().map(String::as_str).collect();
        paths.sort_unstable();
        paths
    }

    pub fn lookup(&self, current: &FileMetadata) -> Lookup<'_> {
        match self.entries.get(&current.path) {
            Some(entry) if entry.metadata.differs_from(current) => Lookup::Stale(entry),
            Some(entry) => Lookup::Hit(entry),
            None => Lookup::Miss,
        }
    }

    /// Store `entry`, replacing any entry for the same path. Returns how many
    /// entries were evicted.
    pub fn insert(&mut self, entry: CacheEntry) -> usize {
        self.insert_at(entry, Instant::now())
    }

    pub fn insert_at(&mut self, mut entry: CacheEntry, now: Instant) -> usize {
        entry.timestamp = now;
        entry.seq = self.next_seq;
        self.next_seq += 1;
        self.entries.insert(entry.metadata.path.clone(), entry);
        if self.entries.len() > self.max_size {
            self.evict()
        } else {
            0
        }
    }

    pub fn remove(&mut self, path: &str) -> Option<CacheEntry> {
        self.entries.remove(path)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Drop entries older than `ttl`. Returns how many were dropped.
    pub fn sweep_expired(&mut self, ttl: Duration) -> usize {
        self.sweep_expired_at(Instant::now(), ttl)
    }

    pub fn sweep_expired_at(&mut self, now: Instant, ttl: Duration) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|_, entry| now.saturating_duration_since(entry.timestamp) <= ttl);
        let removed = before - self.entries.len();
        if removed > 0 {
            tracing::debug!(removed, "swept expired cache entries");
        }
        removed
    }

    /// Remove the oldest entries until three quarters of `max_size` remain.
    fn evict(&mut self) -> usize {
        let keep = (self.max_size * 3 / 4).max(1);
        let mut by_age: Vec<(Instant, u64, String)> = self
            .entries
            .iter()
            .map(|(path, e)| (e.timestamp, e.seq, path.clone()))
            .collect();
        by_age.sort_unstable();
        let excess = self.entries.len().saturating_sub(keep);
        for (_, _, path) in by_age.into_iter().take(excess) {
            self.entries.remove(&path);
        }
        tracing::debug!(evicted = excess, kept = self.entries.len(), "evicted cache entries");
        excess
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CompilerConfig;
    use crate::session::compile_module;

    fn entry(path: &str, source: &str) -> CacheEntry {
        let config = CompilerConfig::builder().default_target(crate::config::Target::React).build();
        let module = compile_module(path, source, &config).unwrap();
        CacheEntry::new(Arc::new(module), FileMetadata::for_contents(path, None, source))
    }

    #[test]
    fn test_hit_and_stale() {
        let mut cache = Cache::new(10);
        let source = "import x from 'dep'\n$count! = 0\n";
        cache.insert(entry("a.mtm", source));

        let same = FileMetadata::for_contents("a.mtm", None, source);
        assert!(matches!(cache.lookup(&same), Lookup::Hit(_)));

        let edited = FileMetadata::for_contents("a.mtm", None, "$count! = 1\n");
        assert!(matches!(cache.lookup(&edited), Lookup::Stale(_)));

        let touched = FileMetadata {
            mtime: Some(SystemTime::UNIX_EPOCH),
            ..same
        };
        assert!(matches!(cache.lookup(&touched), Lookup::Stale(_)));

        let other = FileMetadata::for_contents("b.mtm", None, source);
        assert!(matches!(cache.lookup(&other), Lookup::Miss));
    }

    #[test]
    fn test_entry_records_types_and_dependencies() {
        let e = entry("a.mtm", "import x from 'dep'\n$count! = 0\n$name = 'n'\n");
        assert_eq!(e.type_info.get("count"), Some(&InferredType::Number));
        assert_eq!(e.type_info.get("name"), Some(&InferredType::String));
        assert_eq!(e.dependencies, vec!["dep"]);
    }

    #[test]
    fn test_overflow_evicts_oldest_to_three_quarters() {
        let mut cache = Cache::new(8);
        let start = Instant::now();
        let mut evicted = 0;
        for i in 0..9u64 {
            let path = format!("f{i}.mtm");
            evicted += cache.insert_at(entry(&path, "$a! = 1\n"), start + Duration::from_secs(i));
        }
        assert_eq!(evicted, 3);
        assert_eq!(cache.len(), 6);
        for i in 0..3 {
            assert!(!cache.contains(&format!("f{i}.mtm")));
        }
        assert!(cache.contains("f8.mtm"));
    }

    #[test]
    fn test_reinsert_refreshes_age() {
        let mut cache = Cache::new(4);
        let start = Instant::now();
        for (i, path) in ["a.mtm", "b.mtm", "c.mtm", "d.mtm"].iter().enumerate() {
            cache.insert_at(entry(path, "$a! = 1\n"), start + Duration::from_secs(i as u64));
        }
        cache.insert_at(entry("a.mtm", "$a! = 2\n"), start + Duration::from_secs(10));
        cache.insert_at(entry("e.mtm", "$a! = 1\n"), start + Duration::from_secs(11));
        assert_eq!(cache.paths(), vec!["a.mtm", "d.mtm", "e.mtm"]);
    }

    #[test]
    fn test_sweep_expired() {
        let mut cache = Cache::new(10);
        let start = Instant::now();
        cache.insert_at(entry("old.mtm", "$a! = 1\n"), start);
        cache.insert_at(entry("new.mtm", "$a! = 1\n"), start + Duration::from_secs(50));
        let removed = cache.sweep_expired_at(start + Duration::from_secs(70), Duration::from_secs(60));
        assert_eq!(removed, 1);
        assert_eq!(cache.paths(), vec!["new.mtm"]);
        cache.clear();
        assert!(cache.is_empty());
    }
}

//! The two dispatch caches.
//!
//! `TreeCache` memoizes parsed trees by file path so frequent reloads and
//! context switches don't re-parse unchanged files. Entries expire by elapsed
//! time and by on-disk modification time, and the cache is bounded both by
//! entry count and by an estimated cost proportional to node count.
//!
//! `KeyLookupCache` precomputes, per group, the set of valid single-character
//! keys among its direct children, turning per-keystroke dispatch into an O(1)
//! map probe instead of a linear child scan. It is rebuilt wholesale whenever
//! the active tree changes and published atomically behind an `Arc`.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use crate::tree::{ActionTree, GroupId, TreeId};

#[derive(Debug, Clone, Copy)]
pub struct TreeCacheConfig {
    pub ttl: Duration,
    pub max_entries: usize,
    pub max_cost: usize,
}

impl Default for TreeCacheConfig {
    fn default() -> Self {
        TreeCacheConfig {
            ttl: Duration::from_secs(crate::config::DEFAULT_TREE_CACHE_TTL_SECS),
            max_entries: crate::config::DEFAULT_TREE_CACHE_MAX_ENTRIES,
            max_cost: crate::config::DEFAULT_TREE_CACHE_MAX_COST,
        }
    }
}

struct TreeCacheEntry {
    tree: Arc<ActionTree>,
    loaded_at: Instant,
    mtime: Option<SystemTime>,
    cost: usize,
}

/// Path-keyed memo of parsed trees. Many concurrent readers, exclusive single
/// writer; stale entries are skipped on read and dropped on the next write.
pub struct TreeCache {
    entries: RwLock<HashMap<PathBuf, TreeCacheEntry>>,
    config: TreeCacheConfig,
}

impl TreeCache {
    pub fn new(config: TreeCacheConfig) -> Self {
        TreeCache {
            entries: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Fetch a cached tree if it is still fresh: within the TTL and the file's
    /// modification time unchanged. Read lock only; never blocks other reads.
    pub fn get(&self, path: &Path) -> Option<Arc<ActionTree>> {
        let entries = self.entries.read();
        let entry = entries.get(path)?;
        if entry.loaded_at.elapsed() > self.config.ttl {
            return None;
        }
        let current_mtime = fs_mtime(path);
        if current_mtime != entry.mtime {
            return None;
        }
        Some(Arc::clone(&entry.tree))
    }

    /// Insert a freshly parsed tree, evicting oldest entries while over either
    /// bound.
    pub fn insert(&self, path: PathBuf, tree: Arc<ActionTree>, mtime: Option<SystemTime>) {
        let cost = tree.node_count();
        let mut entries = self.entries.write();
        entries.insert(
            path,
            TreeCacheEntry {
                tree,
                loaded_at: Instant::now(),
                mtime,
                cost,
            },
        );

        // Drop expired entries first, then evict oldest-first until bounded.
        let ttl = self.config.ttl;
        entries.retain(|_, e| e.loaded_at.elapsed() <= ttl);
        while entries.len() > self.config.max_entries
            || entries.values().map(|e| e.cost).sum::<usize>() > self.config.max_cost
        {
            let oldest = entries
                .iter()
                .min_by_key(|(_, e)| e.loaded_at)
                .map(|(path, _)| path.clone());
            match oldest {
                Some(path) => {
                    entries.remove(&path);
                }
                None => break,
            }
        }
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn total_cost(&self) -> usize {
        self.entries.read().values().map(|e| e.cost).sum()
    }
}

fn fs_mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// Per-group index: child key -> child position, plus the sticky-mode flag.
#[derive(Debug, Clone)]
pub struct GroupIndex {
    keys: HashMap<char, usize>,
    pub sticky: bool,
}

impl GroupIndex {
    pub fn child_for(&self, key: char) -> Option<usize> {
        self.keys.get(&key).copied()
    }

    pub fn contains(&self, key: char) -> bool {
        self.keys.contains_key(&key)
    }

    pub fn key_count(&self) -> usize {
        self.keys.len()
    }
}

/// Whole-tree key index, addressed by stable group id. Immutable once built;
/// publication is an `Arc` swap so dispatch during a rebuild keeps using the
/// previous complete index.
#[derive(Debug)]
pub struct KeyLookupCache {
    groups: HashMap<GroupId, GroupIndex>,
    tree_id: TreeId,
}

impl KeyLookupCache {
    /// Build the full index for a tree. On duplicate sibling keys the first
    /// structural match wins, matching runtime dispatch.
    pub fn build(tree: &ActionTree) -> Arc<KeyLookupCache> {
        let mut groups = HashMap::new();
        tree.for_each_group(|group, _path| {
            let mut keys = HashMap::new();
            for (idx, child) in group.actions.iter().enumerate() {
                if let Some(key) = child.key() {
                    let mut chars = key.chars();
                    if let (Some(ch), None) = (chars.next(), chars.next()) {
                        keys.entry(ch).or_insert(idx);
                    }
                }
            }
            groups.insert(
                group.id,
                GroupIndex {
                    keys,
                    sticky: group.sticky(),
                },
            );
        });
        Arc::new(KeyLookupCache {
            groups,
            tree_id: tree.id(),
        })
    }

    pub fn tree_id(&self) -> TreeId {
        self.tree_id
    }

    pub fn group(&self, id: GroupId) -> Option<&GroupIndex> {
        self.groups.get(&id)
    }

    /// O(1) membership test: which child (if any) does `key` select in `group`?
    pub fn lookup(&self, group: GroupId, key: char) -> Option<usize> {
        self.groups.get(&group)?.child_for(key)
    }

    pub fn sticky(&self, group: GroupId) -> bool {
        self.groups.get(&group).map(|g| g.sticky).unwrap_or(false)
    }

    pub fn group_count(&self) -> usize {
        self.groups.len()
    }
}

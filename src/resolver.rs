//! Config resolution engine.
//!
//! Produces the action tree for a context: the global default, or a specific
//! application. An application context resolves its app-specific file against
//! the shared fallback file with a recursive merge, and every result is
//! memoized until the next reload. A parse or IO failure on an override is
//! cached as "no override available" so it is not retried per keystroke.
//!
//! On-disk layout, one file per context under the config directory:
//!
//! - `config.json`: global default tree
//! - `config.fallback.json`: shared fallback applied to app contexts
//! - `config.app.<escaped-bundle-id>.json`: per-application override
//! - `config.app.<escaped-bundle-id>.name`: optional display name side file
//!
//! Reload rebuilds the whole resolved state and publishes it with a single
//! swap; concurrent lookups never observe a partially-updated state.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::{KeyLookupCache, TreeCache, TreeCacheConfig};
use crate::error::{KeychordError, Result, ResultExt};
use crate::presentation::Presentation;
use crate::tree::{ActionTree, Group, Node};
use crate::validator::{validate, Diagnostic, Severity};

pub const DEFAULT_CONFIG_FILE: &str = "config.json";
pub const FALLBACK_CONFIG_FILE: &str = "config.fallback.json";
pub const APP_CONFIG_PREFIX: &str = "config.app.";
pub const APP_CONFIG_SUFFIX: &str = ".json";
pub const DISPLAY_NAME_SUFFIX: &str = ".name";

/// Which scope a resolution is for: the global default, or one application.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ContextId {
    Global,
    App(String),
}

impl ContextId {
    pub fn app(id: impl Into<String>) -> Self {
        ContextId::App(id.into())
    }
}

impl std::fmt::Display for ContextId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ContextId::Global => write!(f, "(global)"),
            ContextId::App(id) => write!(f, "{}", id),
        }
    }
}

/// Escape an application identifier for use in a file name.
pub fn escape_app_id(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// A fully resolved context: the tree plus its prebuilt key index, ready for
/// dispatch. Swapped wholesale; never mutated.
pub struct ResolvedConfig {
    pub context: ContextId,
    pub tree: Arc<ActionTree>,
    pub key_index: Arc<KeyLookupCache>,
    pub display_name: Option<String>,
}

impl ResolvedConfig {
    fn build(context: ContextId, tree: Arc<ActionTree>, display_name: Option<String>) -> Arc<Self> {
        let key_index = KeyLookupCache::build(&tree);
        Arc::new(ResolvedConfig {
            context,
            tree,
            key_index,
            display_name,
        })
    }
}

enum MemoEntry {
    Resolved(Arc<ResolvedConfig>),
    /// Override missing or unparseable; use the global default and don't
    /// retry until the next reload.
    Absent,
}

struct ResolverState {
    generation: u64,
    default_config: Arc<ResolvedConfig>,
    default_diagnostics: Vec<Diagnostic>,
    /// Escaped app id -> override file path, discovered by naming convention.
    app_files: HashMap<String, PathBuf>,
    fallback_path: Option<PathBuf>,
    memo: HashMap<ContextId, MemoEntry>,
}

/// The resolution service. Owns the tree cache and the per-context memo;
/// constructed once and injected where trees are needed.
pub struct ConfigResolver {
    dir: PathBuf,
    tree_cache: TreeCache,
    presentation: Arc<dyn Presentation>,
    state: RwLock<ResolverState>,
}

impl ConfigResolver {
    pub fn new(
        dir: PathBuf,
        cache_config: TreeCacheConfig,
        presentation: Arc<dyn Presentation>,
    ) -> Self {
        let resolver = ConfigResolver {
            dir,
            tree_cache: TreeCache::new(cache_config),
            presentation,
            state: RwLock::new(ResolverState {
                generation: 0,
                default_config: ResolvedConfig::build(
                    ContextId::Global,
                    Arc::new(ActionTree::empty()),
                    None,
                ),
                default_diagnostics: Vec::new(),
                app_files: HashMap::new(),
                fallback_path: None,
                memo: HashMap::new(),
            }),
        };
        resolver.reload();
        resolver
    }

    pub fn config_dir(&self) -> &Path {
        &self.dir
    }

    /// Resolve the tree for a context. Deterministic given on-disk state;
    /// memoized until the next reload. Never fails: contexts without a usable
    /// override fall back to the global default.
    pub fn get_config(&self, context: &ContextId) -> Arc<ResolvedConfig> {
        let generation = {
            let state = self.state.read();
            match context {
                ContextId::Global => return Arc::clone(&state.default_config),
                ContextId::App(_) => match state.memo.get(context) {
                    Some(MemoEntry::Resolved(config)) => return Arc::clone(config),
                    Some(MemoEntry::Absent) => return Arc::clone(&state.default_config),
                    None => state.generation,
                },
            }
        };

        // Cold path: resolve outside the lock (may touch disk), then memoize
        // unless a reload swapped the state underneath us.
        let entry = self.resolve_app_context(context);
        let mut state = self.state.write();
        let result = match &entry {
            MemoEntry::Resolved(config) => Arc::clone(config),
            MemoEntry::Absent => Arc::clone(&state.default_config),
        };
        if state.generation == generation {
            state.memo.insert(context.clone(), entry);
        }
        result
    }

    /// Re-discover available files, rebuild the default tree, and invalidate
    /// all memoization. The new state is published with one swap.
    pub fn reload(&self) {
        let (default_tree, default_diagnostics) = self.load_default_tree();
        let (app_files, fallback_path) = self.discover();
        let default_config =
            ResolvedConfig::build(ContextId::Global, default_tree, None);

        let mut state = self.state.write();
        state.generation += 1;
        state.default_config = default_config;
        state.default_diagnostics = default_diagnostics;
        state.app_files = app_files;
        state.fallback_path = fallback_path;
        state.memo.clear();
        info!(
            generation = state.generation,
            contexts = state.app_files.len(),
            has_fallback = state.fallback_path.is_some(),
            "Config resolution state rebuilt"
        );
    }

    /// Whether a context still has an on-disk presence. Global always exists.
    pub fn context_exists(&self, context: &ContextId) -> bool {
        match context {
            ContextId::Global => true,
            ContextId::App(id) => self.state.read().app_files.contains_key(&escape_app_id(id)),
        }
    }

    /// Global plus every discovered app context, sorted for stable display.
    pub fn discovered_contexts(&self) -> Vec<ContextId> {
        let state = self.state.read();
        let mut ids: Vec<String> = state.app_files.keys().cloned().collect();
        ids.sort();
        std::iter::once(ContextId::Global)
            .chain(ids.into_iter().map(ContextId::App))
            .collect()
    }

    /// Validation diagnostics for a context's resolved tree. Load-time
    /// warnings and save blocking both come from here; dispatch never does.
    pub fn diagnostics_for(&self, context: &ContextId) -> Vec<Diagnostic> {
        match context {
            ContextId::Global => self.state.read().default_diagnostics.clone(),
            ContextId::App(_) => validate(&self.get_config(context).tree),
        }
    }

    /// Persist a tree as the context's config file. Refused when validation
    /// reports errors; the diagnostics come back to the caller so the editing
    /// surface can highlight them. A successful write rebuilds the resolved
    /// state.
    pub fn save_tree(&self, context: &ContextId, tree: &ActionTree) -> Result<()> {
        let blocking: Vec<Diagnostic> = validate(tree)
            .into_iter()
            .filter(|d| d.severity == Severity::Error)
            .collect();
        if !blocking.is_empty() {
            return Err(KeychordError::Validation(blocking));
        }

        let path = self.context_path(context);
        let content = tree.to_json().map_err(|e| KeychordError::Parse {
            path: path.clone(),
            message: e.to_string(),
        })?;
        fs::write(&path, content).map_err(|e| KeychordError::from_io(path.clone(), e))?;
        info!(context = %context, path = %path.display(), "Context config saved");
        self.reload();
        Ok(())
    }

    fn context_path(&self, context: &ContextId) -> PathBuf {
        match context {
            ContextId::Global => self.dir.join(DEFAULT_CONFIG_FILE),
            ContextId::App(id) => self.dir.join(format!(
                "{}{}{}",
                APP_CONFIG_PREFIX,
                escape_app_id(id),
                APP_CONFIG_SUFFIX
            )),
        }
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn load_default_tree(&self) -> (Arc<ActionTree>, Vec<Diagnostic>) {
        let path = self.dir.join(DEFAULT_CONFIG_FILE);
        if !path.exists() {
            info!(path = %path.display(), "No default config, starting with an empty tree");
            return (Arc::new(ActionTree::empty()), Vec::new());
        }
        match self.load_tree(&path) {
            Ok(tree) => {
                let diagnostics = validate(&tree);
                (tree, diagnostics)
            }
            Err(e) => {
                // The default context must stay operable: warn the user,
                // substitute an empty tree.
                self.presentation.alert(&format!(
                    "Default config {} could not be loaded: {}",
                    path.display(),
                    e
                ));
                (Arc::new(ActionTree::empty()), Vec::new())
            }
        }
    }

    fn discover(&self) -> (HashMap<String, PathBuf>, Option<PathBuf>) {
        let mut app_files = HashMap::new();
        let fallback = self.dir.join(FALLBACK_CONFIG_FILE);
        let fallback_path = fallback.exists().then_some(fallback);

        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(dir = %self.dir.display(), error = %e, "Config directory unreadable");
                return (app_files, fallback_path);
            }
        };
        for entry in entries.flatten() {
            let name = entry.file_name();
            let Some(name) = name.to_str() else { continue };
            if name == FALLBACK_CONFIG_FILE {
                continue;
            }
            if let Some(middle) = name
                .strip_prefix(APP_CONFIG_PREFIX)
                .and_then(|rest| rest.strip_suffix(APP_CONFIG_SUFFIX))
            {
                if !middle.is_empty() {
                    app_files.insert(middle.to_string(), entry.path());
                }
            }
        }
        debug!(count = app_files.len(), "Discovered app config files");
        (app_files, fallback_path)
    }

    fn resolve_app_context(&self, context: &ContextId) -> MemoEntry {
        let ContextId::App(raw_id) = context else {
            return MemoEntry::Absent;
        };
        let escaped = escape_app_id(raw_id);
        let (app_path, fallback_path) = {
            let state = self.state.read();
            (
                state.app_files.get(&escaped).cloned(),
                state.fallback_path.clone(),
            )
        };

        let app_tree = app_path.as_deref().and_then(|p| self.load_tree_lenient(p));
        let fallback_tree = fallback_path
            .as_deref()
            .and_then(|p| self.load_tree_lenient(p));

        let tree = match (app_tree, fallback_tree) {
            (Some(app), Some(fallback)) => {
                Arc::new(ActionTree::new(merge_groups(&app.root, &fallback.root)))
            }
            (Some(app), None) => app,
            (None, Some(fallback)) => {
                let mut root = fallback.root.clone();
                for child in &mut root.actions {
                    child.mark_from_fallback();
                }
                Arc::new(ActionTree::new(root))
            }
            (None, None) => return MemoEntry::Absent,
        };

        let display_name = self.read_display_name(&escaped);
        MemoEntry::Resolved(ResolvedConfig::build(
            context.clone(),
            tree,
            display_name,
        ))
    }

    /// Load an override tree, treating any failure as "absent". Non-default
    /// contexts never surface errors to the user.
    fn load_tree_lenient(&self, path: &Path) -> Option<Arc<ActionTree>> {
        match self.load_tree(path) {
            Ok(tree) => Some(tree),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Override unusable, treating as absent");
                None
            }
        }
    }

    fn load_tree(&self, path: &Path) -> Result<Arc<ActionTree>> {
        if let Some(tree) = self.tree_cache.get(path) {
            debug!(path = %path.display(), "Tree cache hit");
            return Ok(tree);
        }

        let text = fs::read_to_string(path)
            .map_err(|e| KeychordError::from_io(path.to_path_buf(), e))?;
        let mtime = fs::metadata(path).and_then(|m| m.modified()).ok();
        let tree = ActionTree::from_json(&text).map_err(|e| KeychordError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        for diagnostic in validate(&tree) {
            warn!(
                path = %path.display(),
                tree_path = ?diagnostic.path,
                "{}", diagnostic.message
            );
        }

        let tree = Arc::new(tree);
        self.tree_cache.insert(path.to_path_buf(), Arc::clone(&tree), mtime);
        Ok(tree)
    }

    fn read_display_name(&self, escaped: &str) -> Option<String> {
        let path = self.dir.join(format!(
            "{}{}{}",
            APP_CONFIG_PREFIX, escaped, DISPLAY_NAME_SUFFIX
        ));
        if !path.exists() {
            return None;
        }
        // The side file is there; failing to read it is worth a warning.
        let name = fs::read_to_string(&path).warn_on_err()?;
        let name = name.trim();
        (!name.is_empty()).then(|| name.to_string())
    }
}

/// Recursive merge: app entries win on key collision at the same sibling
/// level; groups colliding with groups merge recursively rather than being
/// replaced wholesale; fallback-only entries are appended and tagged with
/// their origin.
fn merge_groups(app: &Group, fallback: &Group) -> Group {
    let mut merged = app.clone();
    for fb_child in &fallback.actions {
        let collision = fb_child
            .key()
            .filter(|k| !k.is_empty())
            .and_then(|key| merged.actions.iter().position(|c| c.key() == Some(key)));
        match collision {
            Some(idx) => {
                let combined = match (&merged.actions[idx], fb_child) {
                    (Node::Group(existing), Node::Group(fb_group)) => {
                        Some(merge_groups(existing, fb_group))
                    }
                    // App entry wins wholesale when the shapes differ or both
                    // are actions.
                    _ => None,
                };
                if let Some(group) = combined {
                    merged.actions[idx] = Node::Group(group);
                }
            }
            None => {
                let mut adopted = fb_child.clone();
                adopted.mark_from_fallback();
                merged.actions.push(adopted);
            }
        }
    }
    merged
}

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;

use log::{debug, error, info, warn};
use notify::{Config as NotifyConfig, PollWatcher, RecursiveMode};
use notify_debouncer_mini::{new_debouncer_opt, Config as DebouncerConfig, DebouncedEventKind};
use walkdir::WalkDir;

use crate::error::WildcardError;

const WILDCARD_EXTENSION: &str = "txt";

type ReloadListener = Box<dyn Fn(usize) + Send + Sync>;

/// Immutable name → lines index. Every entry holds at least one line.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WildcardTable {
    entries: BTreeMap<String, Vec<String>>,
}

impl WildcardTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table in memory. Entries without lines are dropped.
    pub fn from_entries<I, K, V, S>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, lines)| (name.into(), lines.into_iter().map(Into::into).collect()))
            .filter(|(_, lines): &(String, Vec<String>)| !lines.is_empty())
            .collect();
        Self { entries }
    }

    pub fn get(&self, name: &str) -> Option<&[String]> {
        self.entries.get(name).map(Vec::as_slice)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// File-backed wildcard table.
///
/// The table is published as an `Arc` snapshot. `reload` builds a complete
/// table before swapping it in, so readers never see a partial scan.
pub struct WildcardStore {
    root: PathBuf,
    table: RwLock<Arc<WildcardTable>>,
    listeners: Mutex<Vec<ReloadListener>>,
}

impl WildcardStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            table: RwLock::new(Arc::new(WildcardTable::new())),
            listeners: Mutex::new(Vec::new()),
        }
    }

    /// Store over an in-memory table. `load` would replace it from `root`.
    pub fn with_table<P: AsRef<Path>>(root: P, table: WildcardTable) -> Self {
        let store = Self::new(root);
        store.replace(table).ok();
        store
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Scans the root directory and replaces the table. Returns the entry count.
    pub fn load(&self) -> Result<usize, WildcardError> {
        let table = scan_directory(&self.root)?;
        let count = table.len();
        self.replace(table)?;

        info!(
            "Loaded {} wildcards from {}",
            count,
            self.root.display()
        );
        Ok(count)
    }

    /// Full rescan, then notifies listeners with the new entry count.
    pub fn reload(&self) -> Result<usize, WildcardError> {
        let count = self.load()?;

        match self.listeners.lock() {
            Ok(listeners) => {
                for listener in listeners.iter() {
                    listener(count);
                }
            }
            Err(_) => warn!("Reload listeners unavailable (lock poisoned)"),
        }

        Ok(count)
    }

    pub fn on_reload<F>(&self, listener: F)
    where
        F: Fn(usize) + Send + Sync + 'static,
    {
        match self.listeners.lock() {
            Ok(mut listeners) => listeners.push(Box::new(listener)),
            Err(poisoned) => poisoned.into_inner().push(Box::new(listener)),
        }
    }

    pub fn snapshot(&self) -> Result<Arc<WildcardTable>, WildcardError> {
        self.table
            .read()
            .map(|table| Arc::clone(&table))
            .map_err(|_| WildcardError::LockPoisoned)
    }

    pub fn get(&self, name: &str) -> Option<Vec<String>> {
        self.snapshot()
            .ok()
            .and_then(|table| table.get(name).map(<[String]>::to_vec))
    }

    pub fn names(&self) -> Vec<String> {
        self.snapshot()
            .map(|table| table.names().map(str::to_string).collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.snapshot().map(|table| table.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn replace(&self, table: WildcardTable) -> Result<(), WildcardError> {
        let mut guard = self.table.write().map_err(|_| WildcardError::LockPoisoned)?;
        *guard = Arc::new(table);
        Ok(())
    }

    /// Reloads the table whenever a wildcard file under the root changes.
    /// Blocks until `shutdown` is set.
    pub fn watch(&self, shutdown: Arc<AtomicBool>) -> Result<(), WildcardError> {
        ensure_directory(&self.root)?;

        // Use PollWatcher for Docker/NFS compatibility
        let poll_config = NotifyConfig::default().with_poll_interval(Duration::from_secs(2));

        let debouncer_config = DebouncerConfig::default()
            .with_timeout(Duration::from_millis(500))
            .with_notify_config(poll_config);

        let (tx, rx) = std::sync::mpsc::channel();

        let mut debouncer = new_debouncer_opt::<_, PollWatcher>(debouncer_config, tx)
            .map_err(|e| WildcardError::WatchError(e.to_string()))?;

        debouncer
            .watcher()
            .watch(&self.root, RecursiveMode::Recursive)
            .map_err(|e| WildcardError::WatchError(e.to_string()))?;

        info!("Watching wildcard directory: {}", self.root.display());

        loop {
            if shutdown.load(Ordering::Relaxed) {
                info!("Wildcard watch shutting down...");
                break;
            }

            match rx.recv_timeout(Duration::from_millis(100)) {
                Ok(Ok(events)) => {
                    let touched = events.iter().any(|event| {
                        matches!(event.kind, DebouncedEventKind::Any)
                            && is_wildcard_file(&event.path)
                    });
                    if touched {
                        if let Err(e) = self.reload() {
                            error!("Wildcard reload failed: {}", e);
                        }
                    }
                }
                Ok(Err(errors)) => {
                    warn!("Watch error: {:?}", errors);
                }
                Err(std::sync::mpsc::RecvTimeoutError::Timeout) => {
                    continue;
                }
                Err(std::sync::mpsc::RecvTimeoutError::Disconnected) => {
                    error!("Watch channel disconnected");
                    break;
                }
            }
        }

        Ok(())
    }
}

fn ensure_directory(root: &Path) -> Result<(), WildcardError> {
    if root.is_dir() {
        return Ok(());
    }
    std::fs::create_dir_all(root).map_err(|e| WildcardError::CreateDirectory {
        path: root.to_path_buf(),
        source: e,
    })?;
    info!("Created wildcard directory {}", root.display());
    Ok(())
}

fn is_wildcard_file(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case(WILDCARD_EXTENSION))
        .unwrap_or(false)
}

fn scan_directory(root: &Path) -> Result<WildcardTable, WildcardError> {
    ensure_directory(root)?;

    let mut entries = BTreeMap::new();

    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) if e.depth() == 0 => {
                return Err(WildcardError::ScanFailed {
                    path: root.to_path_buf(),
                    source: e,
                });
            }
            Err(e) => {
                warn!("Skipping unreadable wildcard path: {}", e);
                continue;
            }
        };

        let path = entry.path();
        if !entry.file_type().is_file() || !is_wildcard_file(path) {
            continue;
        }

        let Some(name) = logical_name(root, path) else {
            warn!("Skipping wildcard with unusable name: {}", path.display());
            continue;
        };

        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Failed to read wildcard file {}: {}", path.display(), e);
                continue;
            }
        };

        let lines: Vec<String> = String::from_utf8_lossy(&bytes)
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(str::to_string)
            .collect();

        if lines.is_empty() {
            warn!("Skipping empty wildcard file: {}", path.display());
            continue;
        }

        debug!("Indexed wildcard '{}' ({} lines)", name, lines.len());
        entries.insert(name, lines);
    }

    Ok(WildcardTable { entries })
}

/// `root/characters/outfit.txt` → `characters/outfit`.
fn logical_name(root: &Path, path: &Path) -> Option<String> {
    let relative = path.strip_prefix(root).ok()?.with_extension("");
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use tempfile::TempDir;

    fn write(dir: &Path, relative: &str, content: &str) {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn test_load_indexes_nested_files() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "colors.txt", "red\nblue\n");
        write(temp_dir.path(), "characters/outfit.txt", "dress\n  armor  \n");

        let store = WildcardStore::new(temp_dir.path());
        let count = store.load().unwrap();

        assert_eq!(count, 2);
        assert_eq!(store.get("colors"), Some(vec!["red".to_string(), "blue".to_string()]));
        assert_eq!(
            store.get("characters/outfit"),
            Some(vec!["dress".to_string(), "armor".to_string()])
        );
    }

    #[test]
    fn test_blank_lines_and_empty_files_skipped() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "sparse.txt", "\n\none\n   \ntwo\n\n");
        write(temp_dir.path(), "empty.txt", "   \n\n");

        let store = WildcardStore::new(temp_dir.path());
        store.load().unwrap();

        assert_eq!(store.get("sparse").unwrap().len(), 2);
        assert_eq!(store.get("empty"), None);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_non_text_files_ignored() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "notes.md", "ignored");
        write(temp_dir.path(), "hair.txt", "long hair");

        let store = WildcardStore::new(temp_dir.path());
        store.load().unwrap();

        assert_eq!(store.names(), vec!["hair".to_string()]);
    }

    #[test]
    fn test_invalid_utf8_is_decoded_lossily() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(temp_dir.path().join("mixed.txt"), b"ok\n\xff\xfebad\n").unwrap();

        let store = WildcardStore::new(temp_dir.path());
        store.load().unwrap();

        let lines = store.get("mixed").unwrap();
        assert_eq!(lines[0], "ok");
        assert!(lines[1].ends_with("bad"));
    }

    #[test]
    fn test_missing_root_is_created() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("not").join("yet");

        let store = WildcardStore::new(&root);
        let count = store.load().unwrap();

        assert_eq!(count, 0);
        assert!(root.is_dir());
    }

    #[test]
    fn test_reload_replaces_table_and_notifies() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", "1");

        let store = WildcardStore::new(temp_dir.path());
        store.load().unwrap();

        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        store.on_reload(move |count| seen_clone.store(count, Ordering::SeqCst));

        std::fs::remove_file(temp_dir.path().join("a.txt")).unwrap();
        write(temp_dir.path(), "b.txt", "2");
        write(temp_dir.path(), "c.txt", "3");

        let count = store.reload().unwrap();
        assert_eq!(count, 2);
        assert_eq!(seen.load(Ordering::SeqCst), 2);
        assert_eq!(store.get("a"), None);
        assert!(store.get("b").is_some());
    }

    #[test]
    fn test_snapshot_survives_reload() {
        let temp_dir = TempDir::new().unwrap();
        write(temp_dir.path(), "a.txt", "1");

        let store = WildcardStore::new(temp_dir.path());
        store.load().unwrap();
        let before = store.snapshot().unwrap();

        std::fs::remove_file(temp_dir.path().join("a.txt")).unwrap();
        store.reload().unwrap();

        assert!(before.contains("a"));
        assert!(!store.snapshot().unwrap().contains("a"));
    }

    #[test]
    fn test_table_from_entries_drops_empty() {
        let table = WildcardTable::from_entries(vec![
            ("colors", vec!["red", "blue"]),
            ("nothing", vec![]),
        ]);

        assert_eq!(table.len(), 1);
        assert_eq!(table.get("colors").unwrap().len(), 2);
        assert!(table.get("nothing").is_none());
    }

    #[test]
    fn test_logical_name_normalizes_separators() {
        let root = Path::new("/data/wildcards");
        let path = root.join("a").join("b").join("c.txt");
        assert_eq!(logical_name(root, &path), Some("a/b/c".to_string()));
    }
}

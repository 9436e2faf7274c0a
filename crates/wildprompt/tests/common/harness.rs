//! Test harness for isolated test execution.
//!
//! The `TestHarness` struct owns a temporary wildcard directory and builds
//! stores, expanders and processors over it with deterministic choices.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;

use tempfile::TempDir;

use wildprompt::pipeline::{HookRegistry, PromptProcessor};
use wildprompt::wildcard::{WildcardExpander, WildcardStore};

use super::builders::FixedChooser;

pub struct TestHarness {
    /// Keeps the directory alive for the harness lifetime.
    temp_dir: TempDir,
    /// Wildcard root inside `temp_dir`.
    pub wildcard_dir: PathBuf,
}

impl TestHarness {
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let wildcard_dir = temp_dir.path().join("wildcards");
        std::fs::create_dir_all(&wildcard_dir).expect("Failed to create wildcard directory");
        Self {
            temp_dir,
            wildcard_dir,
        }
    }

    /// Harness pre-populated with `(name, lines)` wildcard files.
    pub fn with_wildcards(entries: &[(&str, &[&str])]) -> Self {
        let harness = Self::new();
        for (name, lines) in entries {
            harness.write_wildcard(name, lines);
        }
        harness
    }

    /// Writes `<name>.txt`, creating subdirectories for `/` in `name`.
    pub fn write_wildcard(&self, name: &str, lines: &[&str]) -> PathBuf {
        self.write_raw(&format!("{}.txt", name), lines.join("\n").as_bytes())
    }

    pub fn write_raw(&self, relative: &str, content: &[u8]) -> PathBuf {
        let path = self.wildcard_dir.join(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).expect("Failed to create parent directory");
        }
        std::fs::write(&path, content).expect("Failed to write wildcard file");
        path
    }

    /// Loaded store over the harness directory.
    pub fn store(&self) -> Arc<WildcardStore> {
        let store = WildcardStore::new(&self.wildcard_dir);
        store.load().expect("Failed to load wildcards");
        Arc::new(store)
    }

    /// Expander that always picks index `pick`.
    pub fn expander(&self, pick: usize) -> WildcardExpander {
        WildcardExpander::new(self.store()).with_chooser(Arc::new(FixedChooser(pick)))
    }

    pub fn processor(&self, hooks: HookRegistry) -> PromptProcessor {
        PromptProcessor::new(self.expander(0), Arc::new(hooks))
    }
}

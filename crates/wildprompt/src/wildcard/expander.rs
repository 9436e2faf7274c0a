use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, warn};

use crate::config::{ExpansionConfig, DEFAULT_MAX_DEPTH};
use crate::error::WildcardError;
use crate::pipeline::context::{PromptContext, WildcardProgress};
use crate::tags::{join_tags, split_tags};

use super::chooser::{Chooser, SeededChooser, ThreadRngChooser};
use super::store::{WildcardStore, WildcardTable};

static BLOCK_PATTERN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"__(.+?)__").unwrap());

/// Resolves wildcard tokens against the store.
///
/// Token forms, in priority order:
/// - `<a|b|c>` inline choice
/// - `<name>`, `<*name>` (sequential), `<$master:slave>` (observer)
/// - `__name__` blocks embedded anywhere in a tag
///
/// Anything else passes through unchanged.
pub struct WildcardExpander {
    store: Arc<WildcardStore>,
    chooser: Arc<dyn Chooser>,
    max_depth: usize,
}

impl WildcardExpander {
    pub fn new(store: Arc<WildcardStore>) -> Self {
        Self {
            store,
            chooser: Arc::new(ThreadRngChooser),
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn from_config(store: Arc<WildcardStore>, config: &ExpansionConfig) -> Self {
        let chooser: Arc<dyn Chooser> = match config.seed {
            Some(seed) => Arc::new(SeededChooser::new(seed)),
            None => Arc::new(ThreadRngChooser),
        };
        Self {
            store,
            chooser,
            max_depth: config.max_depth,
        }
    }

    pub fn with_chooser(mut self, chooser: Arc<dyn Chooser>) -> Self {
        self.chooser = chooser;
        self
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    pub fn store(&self) -> &Arc<WildcardStore> {
        &self.store
    }

    /// Resolves every token in order and concatenates the results.
    ///
    /// The whole batch reads one table snapshot, so a concurrent reload
    /// cannot change the table halfway through.
    pub fn expand_tags(
        &self,
        tags: &[String],
        ctx: &mut PromptContext,
    ) -> Result<Vec<String>, WildcardError> {
        let table = self.store.snapshot()?;
        let mut resolved = Vec::with_capacity(tags.len());
        for tag in tags {
            resolved.extend(self.resolve(&table, tag, ctx, 0));
        }
        Ok(resolved)
    }

    /// Resolves a single token.
    pub fn expand_token(
        &self,
        token: &str,
        ctx: &mut PromptContext,
    ) -> Result<Vec<String>, WildcardError> {
        let table = self.store.snapshot()?;
        Ok(self.resolve(&table, token, ctx, 0))
    }

    fn resolve(
        &self,
        table: &WildcardTable,
        token: &str,
        ctx: &mut PromptContext,
        depth: usize,
    ) -> Vec<String> {
        if depth > self.max_depth {
            debug!("Wildcard depth limit reached at '{}'", token);
            return vec![token.to_string()];
        }

        let trimmed = token.trim();
        if trimmed.len() >= 2 && trimmed.starts_with('<') && trimmed.ends_with('>') {
            let inner = &trimmed[1..trimmed.len() - 1];
            return self.resolve_angle(table, token, inner, ctx, depth);
        }

        if BLOCK_PATTERN.is_match(token) {
            return vec![self.resolve_blocks(table, token, ctx, depth)];
        }

        vec![token.to_string()]
    }

    fn resolve_angle(
        &self,
        table: &WildcardTable,
        token: &str,
        inner: &str,
        ctx: &mut PromptContext,
        depth: usize,
    ) -> Vec<String> {
        if inner.contains('|') {
            let alternatives: Vec<&str> = inner.split('|').map(str::trim).collect();
            let choice = alternatives[self.chooser.choose(alternatives.len())];
            if choice.is_empty() {
                return Vec::new();
            }
            return self.resolve(table, choice, ctx, depth + 1);
        }

        let Some(line) = self.lookup(table, inner.trim(), ctx) else {
            return vec![token.to_string()];
        };

        let resolved = self.resolve(table, &line, ctx, depth + 1);
        let sub_tags: Vec<String> = resolved.iter().flat_map(|tag| split_tags(tag)).collect();

        // `*tag` stays in place; without any marker only the first tag does.
        let has_marked = sub_tags.iter().any(|tag| tag.starts_with('*'));
        let mut kept = Vec::new();
        let mut deferred = Vec::new();
        for tag in sub_tags {
            if let Some(stripped) = tag.strip_prefix('*') {
                let stripped = stripped.trim();
                if !stripped.is_empty() {
                    kept.push(stripped.to_string());
                }
            } else if !has_marked && kept.is_empty() {
                kept.push(tag);
            } else {
                deferred.push(tag);
            }
        }

        ctx.global_append_tags.extend(deferred);
        kept
    }

    /// Substitutes every `__name__` block in place. Never defers tags: anything
    /// a nested resolution pushed to the append list is folded into the block.
    fn resolve_blocks(
        &self,
        table: &WildcardTable,
        token: &str,
        ctx: &mut PromptContext,
        depth: usize,
    ) -> String {
        let mut output = String::with_capacity(token.len());
        let mut last = 0;

        for caps in BLOCK_PATTERN.captures_iter(token) {
            let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
                continue;
            };
            output.push_str(&token[last..whole.start()]);

            match self.lookup_random(table, name.as_str().trim(), ctx) {
                Some(line) => {
                    let saved = ctx.global_append_tags.len();
                    let resolved = self.resolve(table, &line, ctx, depth + 1);
                    let deferred = ctx.global_append_tags.split_off(saved);

                    let flattened: Vec<String> = resolved
                        .iter()
                        .chain(deferred.iter())
                        .flat_map(|tag| split_tags(tag))
                        .collect();
                    output.push_str(&join_tags(&flattened));
                }
                None => output.push_str(whole.as_str()),
            }

            last = whole.end();
        }

        output.push_str(&token[last..]);
        output
    }

    /// Picks a line for a reference that may carry a mode prefix.
    fn lookup(
        &self,
        table: &WildcardTable,
        reference: &str,
        ctx: &mut PromptContext,
    ) -> Option<String> {
        if let Some(name) = reference.strip_prefix('*') {
            return self.lookup_sequential(table, name.trim(), ctx);
        }
        if let Some(spec) = reference.strip_prefix('$') {
            return self.lookup_observer(table, spec, ctx);
        }
        self.lookup_random(table, reference, ctx)
    }

    fn lookup_random(
        &self,
        table: &WildcardTable,
        name: &str,
        ctx: &mut PromptContext,
    ) -> Option<String> {
        let lines = table.get(name)?;
        let line = lines[self.chooser.choose(lines.len())].clone();
        ctx.record_history(name, &line);
        Some(line)
    }

    fn lookup_sequential(
        &self,
        table: &WildcardTable,
        name: &str,
        ctx: &mut PromptContext,
    ) -> Option<String> {
        let lines = table.get(name)?;
        let total = lines.len();
        let counter = ctx.sequential_counters.get(name).copied().unwrap_or(0);
        let index = (counter % total as u64) as usize;
        let line = lines[index].clone();

        ctx.sequential_counters.insert(name.to_string(), counter + 1);
        ctx.wildcard_state.insert(
            name.to_string(),
            WildcardProgress {
                current: index + 1,
                total,
            },
        );
        ctx.record_history(name, &line);
        Some(line)
    }

    fn lookup_observer(
        &self,
        table: &WildcardTable,
        spec: &str,
        ctx: &mut PromptContext,
    ) -> Option<String> {
        let Some((master, slave)) = spec.split_once(':') else {
            warn!("Malformed observer wildcard '${}': expected $master:slave", spec);
            return None;
        };
        let (master, slave) = (master.trim(), slave.trim());

        let lines = table.get(slave)?;
        let total = lines.len();
        let master_counter = ctx.sequential_counters.get(master).copied().unwrap_or(0);
        let effective = master_counter.saturating_sub(1);
        let index = (effective % total as u64) as usize;
        let line = lines[index].clone();

        ctx.wildcard_state.insert(
            slave.to_string(),
            WildcardProgress {
                current: index + 1,
                total,
            },
        );
        ctx.record_history(slave, &line);
        Some(line)
    }
}

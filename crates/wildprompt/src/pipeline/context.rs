use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::PromptSettings;
use crate::tags::split_tags;
use crate::wildcard::WildcardTable;

/// Category tags of the row a prompt is generated from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceRow {
    #[serde(default)]
    pub general: String,
    #[serde(default)]
    pub character: String,
    #[serde(default)]
    pub copyright: String,
    #[serde(default)]
    pub artist: String,
    #[serde(default)]
    pub meta: String,
    /// Raw size fields as they arrive from tabular data (number or string).
    #[serde(default)]
    pub image_width: Option<serde_json::Value>,
    #[serde(default)]
    pub image_height: Option<serde_json::Value>,
}

impl SourceRow {
    /// Width and height when both coerce to positive integers.
    pub fn resolution(&self) -> Option<(u32, u32)> {
        let width = coerce_dimension(self.image_width.as_ref()?)?;
        let height = coerce_dimension(self.image_height.as_ref()?)?;
        Some((width, height))
    }
}

fn coerce_dimension(value: &serde_json::Value) -> Option<u32> {
    let raw = match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f >= 1.0).map(|f| f as u64)),
        serde_json::Value::String(s) => s.trim().parse::<u64>().ok(),
        _ => None,
    }?;
    u32::try_from(raw).ok().filter(|v| *v > 0)
}

/// Display position of a sequential or observer wildcard (1-based).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WildcardProgress {
    pub current: usize,
    pub total: usize,
}

/// Sequential progress carried from one request to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
    #[serde(default)]
    pub sequential_counters: BTreeMap<String, u64>,
    #[serde(default)]
    pub wildcard_state: BTreeMap<String, WildcardProgress>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    pub id: String,
    pub created_at: DateTime<Utc>,

    // Input
    pub source_row: SourceRow,
    pub settings: PromptSettings,

    // Tag buckets
    pub prefix_tags: Vec<String>,
    pub main_tags: Vec<String>,
    pub postfix_tags: Vec<String>,
    pub removed_tags: Vec<String>,
    /// Tags deferred by wildcard expansion; appended to `main_tags` at formatting.
    pub global_append_tags: Vec<String>,

    // Wildcard state
    pub sequential_counters: BTreeMap<String, u64>,
    pub wildcard_state: BTreeMap<String, WildcardProgress>,
    pub wildcard_history: BTreeMap<String, Vec<String>>,

    pub metadata: BTreeMap<String, serde_json::Value>,

    // Final stage result
    pub final_prompt: Option<String>,
}

impl PromptContext {
    pub fn new(source_row: SourceRow, settings: PromptSettings) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            source_row,
            settings,
            prefix_tags: Vec::new(),
            main_tags: Vec::new(),
            postfix_tags: Vec::new(),
            removed_tags: Vec::new(),
            global_append_tags: Vec::new(),
            sequential_counters: BTreeMap::new(),
            wildcard_state: BTreeMap::new(),
            wildcard_history: BTreeMap::new(),
            metadata: BTreeMap::new(),
            final_prompt: None,
        }
    }

    /// Continues sequential wildcards where the previous request stopped.
    pub fn with_session(mut self, session: SessionState) -> Self {
        self.sequential_counters = session.sequential_counters;
        self.wildcard_state = session.wildcard_state;
        self
    }

    /// Fills the three tag buckets from comma-separated prompt text.
    pub fn with_prompt_text(mut self, prefix: &str, main: &str, postfix: &str) -> Self {
        self.prefix_tags = split_tags(prefix);
        self.main_tags = split_tags(main);
        self.postfix_tags = split_tags(postfix);
        self
    }

    /// State to hand to the next request's context.
    pub fn session(&self) -> SessionState {
        SessionState {
            sequential_counters: self.sequential_counters.clone(),
            wildcard_state: self.wildcard_state.clone(),
        }
    }

    /// Recomputes display progress from the counters against the current table.
    ///
    /// A counter `n > 0` means the last sequential pick used index `n - 1`.
    pub fn rebuild_wildcard_state(&mut self, table: &WildcardTable) {
        self.wildcard_state = self
            .sequential_counters
            .iter()
            .filter(|(_, counter)| **counter > 0)
            .filter_map(|(name, counter)| {
                let total = table.get(name)?.len();
                let current = ((*counter - 1) % total as u64) as usize + 1;
                Some((name.clone(), WildcardProgress { current, total }))
            })
            .collect();
    }

    pub(crate) fn record_history(&mut self, name: &str, line: &str) {
        self.wildcard_history
            .entry(name.to_string())
            .or_default()
            .push(line.to_string());
    }
}

impl Default for PromptContext {
    fn default() -> Self {
        Self::new(SourceRow::default(), PromptSettings::default())
    }
}

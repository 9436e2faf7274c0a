//! Builder patterns for creating test data programmatically.

#![allow(dead_code)]

use wildprompt::config::PromptSettings;
use wildprompt::pipeline::{PromptContext, SessionState, SourceRow};
use wildprompt::wildcard::Chooser;

/// Always picks the same index, clamped to the list length.
pub struct FixedChooser(pub usize);

impl Chooser for FixedChooser {
    fn choose(&self, len: usize) -> usize {
        self.0.min(len - 1)
    }
}

/// Converts string slices into owned tags.
pub fn tags(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Builder for `PromptContext` instances.
#[derive(Default)]
pub struct ContextBuilder {
    row: SourceRow,
    settings: PromptSettings,
    prefix: String,
    main: String,
    postfix: String,
    session: Option<SessionState>,
}

impl ContextBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn prefix(mut self, text: &str) -> Self {
        self.prefix = text.to_string();
        self
    }

    pub fn main(mut self, text: &str) -> Self {
        self.main = text.to_string();
        self
    }

    pub fn postfix(mut self, text: &str) -> Self {
        self.postfix = text.to_string();
        self
    }

    /// Source image size as it arrives from tabular data.
    pub fn resolution(mut self, width: serde_json::Value, height: serde_json::Value) -> Self {
        self.row.image_width = Some(width);
        self.row.image_height = Some(height);
        self
    }

    pub fn auto_fit_resolution(mut self, enabled: bool) -> Self {
        self.settings.auto_fit_resolution = enabled;
        self
    }

    pub fn wildcard_standalone(mut self, enabled: bool) -> Self {
        self.settings.wildcard_standalone = enabled;
        self
    }

    pub fn session(mut self, session: SessionState) -> Self {
        self.session = Some(session);
        self
    }

    pub fn build(self) -> PromptContext {
        let mut ctx = PromptContext::new(self.row, self.settings).with_prompt_text(
            &self.prefix,
            &self.main,
            &self.postfix,
        );
        if let Some(session) = self.session {
            ctx = ctx.with_session(session);
        }
        ctx
    }
}

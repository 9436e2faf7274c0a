//! Priority-ordered extension points between pipeline stages.
//!
//! Optional modules (character prompts, prompt presets, ...) register
//! closures here instead of the pipeline depending on them.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use super::context::PromptContext;
use super::error::HookError;

/// Handlers without an explicit priority run after everything else.
pub const DEFAULT_HOOK_PRIORITY: i32 = 1000;

pub type HookHandler =
    Arc<dyn Fn(PromptContext) -> Result<PromptContext, HookError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    PreProcessing,
    PostProcessing,
    AfterWildcard,
}

impl HookPoint {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookPoint::PreProcessing => "pre_processing",
            HookPoint::PostProcessing => "post_processing",
            HookPoint::AfterWildcard => "after_wildcard",
        }
    }
}

impl fmt::Display for HookPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for HookPoint {
    type Err = HookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pre_processing" => Ok(HookPoint::PreProcessing),
            "post_processing" => Ok(HookPoint::PostProcessing),
            "after_wildcard" => Ok(HookPoint::AfterWildcard),
            other => Err(HookError::UnknownHookPoint(other.to_string())),
        }
    }
}

struct RegisteredHook {
    priority: i32,
    handler: HookHandler,
}

#[derive(Default)]
pub struct HookRegistry {
    hooks: HashMap<(String, HookPoint), Vec<RegisteredHook>>,
}

impl HookRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a handler. Lower priorities run first; equal priorities keep
    /// registration order.
    pub fn register<F>(
        &mut self,
        pipeline_name: &str,
        hook_point: HookPoint,
        priority: Option<i32>,
        handler: F,
    ) where
        F: Fn(PromptContext) -> Result<PromptContext, HookError> + Send + Sync + 'static,
    {
        let entries = self
            .hooks
            .entry((pipeline_name.to_string(), hook_point))
            .or_default();
        entries.push(RegisteredHook {
            priority: priority.unwrap_or(DEFAULT_HOOK_PRIORITY),
            handler: Arc::new(handler),
        });
        entries.sort_by_key(|hook| hook.priority);
    }

    /// Handlers for a point in invocation order. Unknown keys yield nothing.
    pub fn get_handlers(&self, pipeline_name: &str, hook_point: HookPoint) -> Vec<HookHandler> {
        self.hooks
            .get(&(pipeline_name.to_string(), hook_point))
            .map(|entries| entries.iter().map(|h| Arc::clone(&h.handler)).collect())
            .unwrap_or_default()
    }

    pub fn handler_count(&self, pipeline_name: &str, hook_point: HookPoint) -> usize {
        self.hooks
            .get(&(pipeline_name.to_string(), hook_point))
            .map(Vec::len)
            .unwrap_or(0)
    }

    pub fn clear(&mut self) {
        self.hooks.clear();
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut map = f.debug_map();
        for ((pipeline, point), entries) in &self.hooks {
            let priorities: Vec<i32> = entries.iter().map(|h| h.priority).collect();
            map.entry(&format!("{}.{}", pipeline, point), &priorities);
        }
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tagger(tag: &'static str) -> impl Fn(PromptContext) -> Result<PromptContext, HookError> {
        move |mut ctx: PromptContext| {
            ctx.main_tags.push(tag.to_string());
            Ok(ctx)
        }
    }

    fn run_all(handlers: &[HookHandler]) -> Vec<String> {
        let mut ctx = PromptContext::default();
        for handler in handlers {
            ctx = handler(ctx).unwrap();
        }
        ctx.main_tags
    }

    #[test]
    fn test_handlers_sorted_by_priority() {
        let mut registry = HookRegistry::new();
        registry.register("PromptProcessor", HookPoint::PreProcessing, Some(50), tagger("b"));
        registry.register("PromptProcessor", HookPoint::PreProcessing, Some(10), tagger("a"));
        registry.register("PromptProcessor", HookPoint::PreProcessing, None, tagger("last"));
        registry.register("PromptProcessor", HookPoint::PreProcessing, Some(50), tagger("c"));

        let handlers = registry.get_handlers("PromptProcessor", HookPoint::PreProcessing);
        assert_eq!(run_all(&handlers), vec!["a", "b", "c", "last"]);
    }

    #[test]
    fn test_missing_key_returns_empty() {
        let mut registry = HookRegistry::new();
        registry.register("Other", HookPoint::AfterWildcard, None, tagger("x"));

        assert!(registry
            .get_handlers("PromptProcessor", HookPoint::AfterWildcard)
            .is_empty());
        assert!(registry.get_handlers("Other", HookPoint::PreProcessing).is_empty());
        assert_eq!(registry.handler_count("Other", HookPoint::AfterWildcard), 1);
    }

    #[test]
    fn test_clear_removes_everything() {
        let mut registry = HookRegistry::new();
        registry.register("PromptProcessor", HookPoint::PostProcessing, None, tagger("x"));
        registry.clear();
        assert_eq!(registry.handler_count("PromptProcessor", HookPoint::PostProcessing), 0);
    }

    #[test]
    fn test_hook_point_parse_and_display() {
        for point in [
            HookPoint::PreProcessing,
            HookPoint::PostProcessing,
            HookPoint::AfterWildcard,
        ] {
            assert_eq!(point.to_string().parse::<HookPoint>().unwrap(), point);
        }
        assert!("mid_processing".parse::<HookPoint>().is_err());
    }
}

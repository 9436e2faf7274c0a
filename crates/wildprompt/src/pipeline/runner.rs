use std::sync::Arc;

use tracing::{debug, info_span, warn};

use crate::config::Config;
use crate::wildcard::{WildcardExpander, WildcardStore};

use super::context::PromptContext;
use super::error::PipelineError;
use super::format;
use super::hooks::{HookPoint, HookRegistry};

/// Pipeline name handlers register against.
pub const PIPELINE_NAME: &str = "PromptProcessor";

pub const DETECTED_RESOLUTION_KEY: &str = "detected_resolution";

pub struct PromptProcessor {
    expander: WildcardExpander,
    hooks: Arc<HookRegistry>,
}

impl PromptProcessor {
    pub fn new(expander: WildcardExpander, hooks: Arc<HookRegistry>) -> Self {
        Self { expander, hooks }
    }

    /// Production constructor: expander built from the config's expansion section.
    pub fn from_config(
        config: &Config,
        store: Arc<WildcardStore>,
        hooks: Arc<HookRegistry>,
    ) -> Self {
        Self::new(WildcardExpander::from_config(store, &config.expansion), hooks)
    }

    pub fn expander(&self) -> &WildcardExpander {
        &self.expander
    }

    /// Runs every stage over `ctx` and sets `final_prompt`.
    ///
    /// Hook failures are logged and skipped. An expansion error aborts the
    /// run; counters already advanced stay advanced.
    pub fn process(&self, ctx: &mut PromptContext) -> Result<(), PipelineError> {
        let _pipeline_span = info_span!("prompt_pipeline", context_id = %ctx.id).entered();

        {
            let table = self.expander.store().snapshot()?;
            ctx.rebuild_wildcard_state(&table);
        }

        // Step 1: Resolution fit
        {
            let _step = info_span!("resolution_fit").entered();
            self.step_resolution_fit(ctx);
        }

        // Step 2+3: Hooks before expansion
        self.run_hooks(HookPoint::PreProcessing, ctx);
        self.run_hooks(HookPoint::PostProcessing, ctx);

        // Step 4: Wildcard expansion
        {
            let _step = info_span!("wildcard_expansion").entered();
            self.step_expand_wildcards(ctx)?;
        }

        // Step 5: Hooks after expansion
        self.run_hooks(HookPoint::AfterWildcard, ctx);

        // Step 6: Final formatting
        {
            let _step = info_span!("final_format").entered();
            format::finalize(ctx);
        }

        debug!(
            "Prompt ready ({} chars)",
            ctx.final_prompt.as_ref().map(String::len).unwrap_or(0)
        );
        Ok(())
    }

    fn step_resolution_fit(&self, ctx: &mut PromptContext) {
        if !ctx.settings.auto_fit_resolution || ctx.settings.wildcard_standalone {
            return;
        }

        if let Some((width, height)) = ctx.source_row.resolution() {
            debug!("Detected source resolution {}x{}", width, height);
            ctx.metadata.insert(
                DETECTED_RESOLUTION_KEY.to_string(),
                serde_json::json!([width, height]),
            );
        }
    }

    fn step_expand_wildcards(&self, ctx: &mut PromptContext) -> Result<(), PipelineError> {
        let prefix = std::mem::take(&mut ctx.prefix_tags);
        ctx.prefix_tags = self.expander.expand_tags(&prefix, ctx)?;

        let postfix = std::mem::take(&mut ctx.postfix_tags);
        ctx.postfix_tags = self.expander.expand_tags(&postfix, ctx)?;
        Ok(())
    }

    /// Each handler gets a copy; on failure the copy is discarded and the
    /// context from before that handler continues.
    fn run_hooks(&self, hook_point: HookPoint, ctx: &mut PromptContext) {
        let handlers = self.hooks.get_handlers(PIPELINE_NAME, hook_point);
        if handlers.is_empty() {
            return;
        }

        let _step = info_span!("hooks", point = %hook_point, count = handlers.len()).entered();
        for (index, handler) in handlers.iter().enumerate() {
            match handler(ctx.clone()) {
                Ok(updated) => *ctx = updated,
                Err(e) => warn!("Hook #{} at {} failed: {}", index, hook_point, e),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PromptSettings;
    use crate::pipeline::context::SourceRow;
    use crate::pipeline::error::HookError;
    use crate::wildcard::{Chooser, WildcardTable};

    struct FirstChooser;

    impl Chooser for FirstChooser {
        fn choose(&self, _len: usize) -> usize {
            0
        }
    }

    fn processor(entries: Vec<(&str, Vec<&str>)>, hooks: HookRegistry) -> PromptProcessor {
        let store = Arc::new(WildcardStore::with_table(
            "unused",
            WildcardTable::from_entries(entries),
        ));
        let expander = WildcardExpander::new(store).with_chooser(Arc::new(FirstChooser));
        PromptProcessor::new(expander, Arc::new(hooks))
    }

    fn tags(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_full_pipeline_builds_prompt() {
        let pipeline = processor(
            vec![("quality", vec!["masterpiece"]), ("light", vec!["*rim light, bloom"])],
            HookRegistry::new(),
        );
        let mut ctx = PromptContext::default().with_prompt_text(
            "<quality>",
            "1girl, v, <not expanded>",
            "<light>",
        );

        pipeline.process(&mut ctx).unwrap();

        assert_eq!(ctx.prefix_tags, tags(&["1girl", "masterpiece"]));
        assert_eq!(ctx.postfix_tags, tags(&["rim light"]));
        assert_eq!(
            ctx.final_prompt.as_deref(),
            Some("1girl, masterpiece, peace sign, <not expanded>, bloom, rim light")
        );
        assert_eq!(ctx.wildcard_history.len(), 2);
    }

    #[test]
    fn test_resolution_fit_records_metadata() {
        let pipeline = processor(vec![], HookRegistry::new());
        let row = SourceRow {
            image_width: Some(serde_json::json!("832")),
            image_height: Some(serde_json::json!(1216)),
            ..SourceRow::default()
        };
        let settings = PromptSettings {
            auto_fit_resolution: true,
            ..PromptSettings::default()
        };

        let mut ctx = PromptContext::new(row.clone(), settings.clone());
        pipeline.process(&mut ctx).unwrap();
        assert_eq!(
            ctx.metadata.get(DETECTED_RESOLUTION_KEY),
            Some(&serde_json::json!([832, 1216]))
        );

        let standalone = PromptSettings {
            wildcard_standalone: true,
            ..settings
        };
        let mut ctx = PromptContext::new(row, standalone);
        pipeline.process(&mut ctx).unwrap();
        assert!(ctx.metadata.is_empty());
    }

    #[test]
    fn test_resolution_fit_ignores_bad_sizes() {
        let pipeline = processor(vec![], HookRegistry::new());
        let row = SourceRow {
            image_width: Some(serde_json::json!("abc")),
            image_height: None,
            ..SourceRow::default()
        };
        let settings = PromptSettings {
            auto_fit_resolution: true,
            ..PromptSettings::default()
        };

        let mut ctx = PromptContext::new(row, settings);
        pipeline.process(&mut ctx).unwrap();
        assert!(!ctx.metadata.contains_key(DETECTED_RESOLUTION_KEY));
    }

    #[test]
    fn test_hooks_run_in_stage_order() {
        let mut hooks = HookRegistry::new();
        hooks.register(PIPELINE_NAME, HookPoint::AfterWildcard, None, |mut ctx| {
            // Sees the expanded prefix
            let seen = ctx.prefix_tags.join("|");
            ctx.postfix_tags.push(format!("after:{}", seen));
            Ok(ctx)
        });
        hooks.register(PIPELINE_NAME, HookPoint::PreProcessing, Some(1), |mut ctx| {
            ctx.prefix_tags.push("<color>".to_string());
            Ok(ctx)
        });
        hooks.register(PIPELINE_NAME, HookPoint::PostProcessing, None, |mut ctx| {
            ctx.main_tags.push("post".to_string());
            Ok(ctx)
        });

        let pipeline = processor(vec![("color", vec!["red"])], hooks);
        let mut ctx = PromptContext::default();
        pipeline.process(&mut ctx).unwrap();

        assert_eq!(ctx.final_prompt.as_deref(), Some("red, post, after:red"));
    }

    #[test]
    fn test_failing_hook_keeps_previous_context() {
        let mut hooks = HookRegistry::new();
        hooks.register(PIPELINE_NAME, HookPoint::PreProcessing, Some(1), |mut ctx| {
            ctx.main_tags.push("first".to_string());
            Ok(ctx)
        });
        hooks.register(PIPELINE_NAME, HookPoint::PreProcessing, Some(2), |mut ctx| {
            ctx.main_tags.push("partial".to_string());
            Err(HookError::failed("character module unavailable"))
        });
        hooks.register(PIPELINE_NAME, HookPoint::PreProcessing, Some(3), |mut ctx| {
            ctx.main_tags.push("third".to_string());
            Ok(ctx)
        });

        let pipeline = processor(vec![], hooks);
        let mut ctx = PromptContext::default();
        pipeline.process(&mut ctx).unwrap();

        assert_eq!(ctx.main_tags, tags(&["first", "third"]));
    }

    #[test]
    fn test_hooks_for_other_pipelines_ignored() {
        let mut hooks = HookRegistry::new();
        hooks.register("ImageProcessor", HookPoint::PreProcessing, None, |mut ctx| {
            ctx.main_tags.push("wrong".to_string());
            Ok(ctx)
        });

        let pipeline = processor(vec![], hooks);
        let mut ctx = PromptContext::default().with_prompt_text("", "solo", "");
        pipeline.process(&mut ctx).unwrap();

        assert_eq!(ctx.final_prompt.as_deref(), Some("solo"));
    }

    #[test]
    fn test_sequential_progress_carries_across_runs() {
        let pipeline = processor(vec![("pose", vec!["standing", "sitting"])], HookRegistry::new());

        let mut first = PromptContext::default().with_prompt_text("<*pose>", "", "");
        pipeline.process(&mut first).unwrap();

        let mut second = PromptContext::default()
            .with_session(first.session())
            .with_prompt_text("<*pose>", "", "");
        pipeline.process(&mut second).unwrap();

        let mut third = PromptContext::default()
            .with_session(second.session())
            .with_prompt_text("<*pose>", "", "");
        pipeline.process(&mut third).unwrap();

        assert_eq!(first.final_prompt.as_deref(), Some("standing"));
        assert_eq!(second.final_prompt.as_deref(), Some("sitting"));
        assert_eq!(third.final_prompt.as_deref(), Some("standing"));
        assert_eq!(third.sequential_counters.get("pose"), Some(&3));
    }
}

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::pipeline::{HookError, PromptContext};

use super::executor::{ScriptExecutor, MAIN_TAGS, POSTFIX_TAGS, PREFIX_TAGS, REMOVED_TAGS};

pub const SCRIPT_OUTPUT_KEY: &str = "script_output";

/// The tag buckets a script sees, keyed by variable name.
pub fn context_variables(ctx: &PromptContext) -> BTreeMap<String, Vec<String>> {
    BTreeMap::from([
        (PREFIX_TAGS.to_string(), ctx.prefix_tags.clone()),
        (MAIN_TAGS.to_string(), ctx.main_tags.clone()),
        (POSTFIX_TAGS.to_string(), ctx.postfix_tags.clone()),
        (REMOVED_TAGS.to_string(), ctx.removed_tags.clone()),
    ])
}

/// Writes script results back; missing keys leave the bucket untouched.
pub fn apply_variables(ctx: &mut PromptContext, mut variables: BTreeMap<String, Vec<String>>) {
    let buckets = [
        (PREFIX_TAGS, &mut ctx.prefix_tags),
        (MAIN_TAGS, &mut ctx.main_tags),
        (POSTFIX_TAGS, &mut ctx.postfix_tags),
        (REMOVED_TAGS, &mut ctx.removed_tags),
    ];
    for (name, bucket) in buckets {
        if let Some(tags) = variables.remove(name) {
            *bucket = tags;
        }
    }
}

/// Wraps a script as a pipeline hook handler.
///
/// ```ignore
/// hooks.register(PIPELINE_NAME, HookPoint::AfterWildcard, Some(10),
///     script_hook(executor, "main_tags.remove('solo')"));
/// ```
pub fn script_hook(
    executor: Arc<ScriptExecutor>,
    source: impl Into<String>,
) -> impl Fn(PromptContext) -> Result<PromptContext, HookError> + Send + Sync + 'static {
    let source: String = source.into();
    move |mut ctx: PromptContext| {
        let result = executor.execute(&source, &context_variables(&ctx));
        let Some(variables) = result.variables.filter(|_| result.success) else {
            return Err(HookError::failed(result.output));
        };

        apply_variables(&mut ctx, variables);
        if !result.output.is_empty() {
            ctx.metadata.insert(
                SCRIPT_OUTPUT_KEY.to_string(),
                serde_json::Value::String(result.output),
            );
        }
        Ok(ctx)
    }
}

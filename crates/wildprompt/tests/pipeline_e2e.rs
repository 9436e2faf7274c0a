//! End-to-end tests for the prompt pipeline with wildcard files on disk.

mod common;

use std::sync::Arc;

use common::{tags, ContextBuilder, TestHarness};
use serde_json::json;
use wildprompt::pipeline::{
    HookPoint, HookRegistry, WildcardProgress, DETECTED_RESOLUTION_KEY, PIPELINE_NAME,
};
use wildprompt::script::{script_hook, ScriptExecutor, SCRIPT_OUTPUT_KEY};

fn character_harness() -> TestHarness {
    TestHarness::with_wildcards(&[
        ("quality", &["masterpiece, best quality"]),
        ("characters/outfit", &["*maid dress, frills"]),
        ("pose", &["standing", "sitting"]),
    ])
}

#[test]
fn test_full_prompt_assembly() {
    let harness = character_harness();
    let processor = harness.processor(HookRegistry::new());
    let mut ctx = ContextBuilder::new()
        .prefix("<quality>")
        .main("v, solo, 2girls, 1boy, smile, solo")
        .postfix("<characters/outfit>")
        .build();

    processor.process(&mut ctx).unwrap();

    assert_eq!(
        ctx.final_prompt.as_deref(),
        Some("1boy, 2girls, masterpiece, peace sign, solo, smile, best quality, frills, maid dress")
    );
    assert!(ctx.global_append_tags.is_empty());
    assert_eq!(ctx.wildcard_history.get("quality"), Some(&tags(&["masterpiece, best quality"])));
    assert_eq!(
        ctx.wildcard_history.get("characters/outfit"),
        Some(&tags(&["*maid dress, frills"]))
    );
}

#[test]
fn test_main_tags_are_not_expanded() {
    let harness = character_harness();
    let processor = harness.processor(HookRegistry::new());
    let mut ctx = ContextBuilder::new().main("<pose>, __pose__").build();

    processor.process(&mut ctx).unwrap();

    assert_eq!(ctx.final_prompt.as_deref(), Some("<pose>, __pose__"));
    assert!(ctx.wildcard_history.is_empty());
}

#[test]
fn test_script_hook_in_pipeline() {
    let harness = character_harness();
    let executor = Arc::new(ScriptExecutor::new().with_seed(1));

    let mut hooks = HookRegistry::new();
    hooks.register(
        PIPELINE_NAME,
        HookPoint::AfterWildcard,
        Some(10),
        script_hook(
            Arc::clone(&executor),
            "main_tags.remove('smile')\nprint(len(prefix_tags))",
        ),
    );
    // Runs first, so the script above still sees one prefix tag
    hooks.register(PIPELINE_NAME, HookPoint::AfterWildcard, Some(1), |mut ctx| {
        ctx.main_tags.push("from hook".to_string());
        Ok(ctx)
    });

    let processor = harness.processor(hooks);
    let mut ctx = ContextBuilder::new()
        .prefix("<quality>")
        .main("1girl, smile")
        .build();
    processor.process(&mut ctx).unwrap();

    assert_eq!(ctx.removed_tags, tags(&["smile"]));
    assert_eq!(ctx.metadata.get(SCRIPT_OUTPUT_KEY), Some(&json!("1\n")));
    assert_eq!(
        ctx.final_prompt.as_deref(),
        Some("1girl, masterpiece, from hook, best quality")
    );
}

#[test]
fn test_failing_script_hook_keeps_context() {
    let harness = character_harness();
    let executor = Arc::new(ScriptExecutor::new().with_max_steps(200));

    let mut hooks = HookRegistry::new();
    hooks.register(
        PIPELINE_NAME,
        HookPoint::PreProcessing,
        None,
        script_hook(Arc::clone(&executor), "main_tags.clear()\nwhile true { }"),
    );
    hooks.register(
        PIPELINE_NAME,
        HookPoint::PostProcessing,
        None,
        script_hook(executor, "import os"),
    );

    let processor = harness.processor(hooks);
    let mut ctx = ContextBuilder::new().main("1girl, smile").build();
    processor.process(&mut ctx).unwrap();

    assert_eq!(ctx.final_prompt.as_deref(), Some("1girl, smile"));
    assert!(ctx.removed_tags.is_empty());
}

#[test]
fn test_session_carries_sequential_progress() {
    let harness = character_harness();
    let processor = harness.processor(HookRegistry::new());

    let mut session = Default::default();
    let mut prompts = Vec::new();
    let mut states = Vec::new();
    for _ in 0..3 {
        let mut ctx = ContextBuilder::new()
            .prefix("<*pose>")
            .session(session)
            .build();
        processor.process(&mut ctx).unwrap();
        prompts.push(ctx.final_prompt.clone().unwrap_or_default());
        states.push(ctx.wildcard_state.get("pose").copied());
        session = ctx.session();
    }

    assert_eq!(prompts, tags(&["standing", "sitting", "standing"]));
    assert_eq!(
        states,
        vec![
            Some(WildcardProgress { current: 1, total: 2 }),
            Some(WildcardProgress { current: 2, total: 2 }),
            Some(WildcardProgress { current: 1, total: 2 }),
        ]
    );
}

#[test]
fn test_wildcard_state_rebuilt_against_current_table() {
    let harness = character_harness();
    let processor = harness.processor(HookRegistry::new());

    let mut first = ContextBuilder::new().prefix("<*pose>").build();
    processor.process(&mut first).unwrap();

    // Third line appears between requests
    harness.write_wildcard("pose", &["standing", "sitting", "lying"]);
    processor.expander().store().reload().unwrap();

    let mut second = ContextBuilder::new().session(first.session()).build();
    processor.process(&mut second).unwrap();

    assert_eq!(
        second.wildcard_state.get("pose"),
        Some(&WildcardProgress { current: 1, total: 3 })
    );
}

#[test]
fn test_resolution_detection() {
    let harness = TestHarness::new();
    let processor = harness.processor(HookRegistry::new());

    let mut ctx = ContextBuilder::new()
        .resolution(json!(1024), json!("1536"))
        .auto_fit_resolution(true)
        .build();
    processor.process(&mut ctx).unwrap();
    assert_eq!(ctx.metadata.get(DETECTED_RESOLUTION_KEY), Some(&json!([1024, 1536])));

    let mut standalone = ContextBuilder::new()
        .resolution(json!(1024), json!(1536))
        .auto_fit_resolution(true)
        .wildcard_standalone(true)
        .build();
    processor.process(&mut standalone).unwrap();
    assert!(!standalone.metadata.contains_key(DETECTED_RESOLUTION_KEY));

    let mut disabled = ContextBuilder::new()
        .resolution(json!(1024), json!(1536))
        .build();
    processor.process(&mut disabled).unwrap();
    assert!(!disabled.metadata.contains_key(DETECTED_RESOLUTION_KEY));
}

#[test]
fn test_context_serializes_result() {
    let harness = character_harness();
    let processor = harness.processor(HookRegistry::new());
    let mut ctx = ContextBuilder::new().prefix("<*pose>").main("solo").build();
    processor.process(&mut ctx).unwrap();

    let value = serde_json::to_value(&ctx).unwrap();
    assert_eq!(value["final_prompt"], json!("standing, solo"));
    assert_eq!(value["sequential_counters"]["pose"], json!(1));
    assert_eq!(value["wildcard_state"]["pose"], json!({"current": 1, "total": 2}));
}

//! Command handlers.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{info, warn};

use wildprompt::config::default_config_path;
use wildprompt::pipeline::PIPELINE_NAME;
use wildprompt::script::script_hook;
use wildprompt::tags::{join_tags, split_tags};
use wildprompt::{
    load_config, Config, HookPoint, HookRegistry, PromptContext, PromptProcessor, ScriptExecutor,
    WildcardExpander, WildcardStore,
};

use crate::cli::Cli;
use crate::request::{load_request, load_session, parse_tags_arg, save_session};

/// Config file from `--config` or the platform default, with CLI overrides applied.
pub fn resolve_config(cli: &Cli) -> Result<Config> {
    let path = cli
        .config
        .clone()
        .or_else(|| default_config_path().filter(|p| p.exists()));

    let mut config = match (path, &cli.wildcards) {
        (Some(path), _) => load_config(&path)
            .with_context(|| format!("Failed to load config '{}'", path.display()))?,
        (None, Some(dir)) => Config::new(dir.to_string_lossy()),
        (None, None) => anyhow::bail!(
            "No config file found; pass --config or --wildcards <DIR>"
        ),
    };

    if let Some(dir) = &cli.wildcards {
        config.wildcard_directory = dir.to_string_lossy().into_owned();
    }
    if let Some(seed) = cli.seed {
        config.expansion.seed = Some(seed);
    }
    Ok(config)
}

fn open_store(config: &Config) -> Result<Arc<WildcardStore>> {
    let store = WildcardStore::new(&config.wildcard_directory);
    let count = store.load().with_context(|| {
        format!(
            "Failed to load wildcards from '{}'",
            config.wildcard_directory
        )
    })?;
    info!("Loaded {} wildcards", count);
    Ok(Arc::new(store))
}

/// Script executor with the configured limits; `--seed` makes runs repeatable.
fn script_executor(config: &Config) -> ScriptExecutor {
    let executor = ScriptExecutor::from_config(&config.script);
    match config.expansion.seed {
        Some(seed) => executor.with_seed(seed),
        None => executor,
    }
}

pub fn expand(config: &Config, text: &str) -> Result<()> {
    let store = open_store(config)?;
    let expander = WildcardExpander::from_config(store, &config.expansion);

    let mut ctx = PromptContext::new(Default::default(), config.settings.clone());
    let expanded = expander.expand_tags(&split_tags(text), &mut ctx)?;

    println!("{}", join_tags(&expanded));
    if !ctx.global_append_tags.is_empty() {
        println!("deferred: {}", join_tags(&ctx.global_append_tags));
    }
    Ok(())
}

pub fn process(config: &Config, request: &Path, session: Option<&PathBuf>, json: bool) -> Result<()> {
    let ctx = run_request(config, request, session)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&ctx)?);
    } else {
        println!("{}", ctx.final_prompt.unwrap_or_default());
    }
    Ok(())
}

/// Runs one request file through the pipeline, updating the session file if given.
fn run_request(config: &Config, request: &Path, session: Option<&PathBuf>) -> Result<PromptContext> {
    let request = load_request(request)?;
    let store = open_store(config)?;

    let executor = Arc::new(script_executor(config));
    let mut hooks = HookRegistry::new();
    for (index, spec) in request.scripts.iter().enumerate() {
        let hook_point: HookPoint = spec
            .hook_point
            .parse()
            .with_context(|| format!("Script #{} has an invalid hook point", index))?;
        hooks.register(
            PIPELINE_NAME,
            hook_point,
            spec.priority,
            script_hook(Arc::clone(&executor), spec.source.clone()),
        );
    }

    let processor = PromptProcessor::from_config(config, store, Arc::new(hooks));

    let settings = request
        .settings
        .clone()
        .unwrap_or_else(|| config.settings.clone());
    let mut ctx = PromptContext::new(request.source_row.clone(), settings).with_prompt_text(
        &request.prefix,
        &request.main,
        &request.postfix,
    );
    if let Some(path) = session {
        ctx = ctx.with_session(load_session(path)?);
    }

    // Counters advanced before a failure still belong to the session
    let outcome = processor.process(&mut ctx);
    if let Some(path) = session {
        save_session(path, &ctx.session())?;
    }
    outcome?;

    Ok(ctx)
}

pub fn list(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    let table = store.snapshot()?;
    for name in table.names() {
        let count = table.get(name).map_or(0, <[String]>::len);
        println!("{}\t{}", name, count);
    }
    Ok(())
}

pub fn script(config: &Config, file: &Path, tags: &[String]) -> Result<()> {
    let source = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read script '{}'", file.display()))?;

    let variables = tags
        .iter()
        .map(|arg| parse_tags_arg(arg))
        .collect::<Result<BTreeMap<_, _>>>()?;

    let result = script_executor(config).execute(&source, &variables);
    print!("{}", result.output);
    if !result.success {
        anyhow::bail!("Script failed");
    }

    if let Some(variables) = result.variables {
        for (name, tags) in variables {
            println!("{} = {}", name, join_tags(&tags));
        }
    }
    Ok(())
}

pub fn watch(config: &Config) -> Result<()> {
    let store = open_store(config)?;
    store.on_reload(|count| info!("Reloaded {} wildcards", count));

    let shutdown = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&shutdown);
    ctrlc::set_handler(move || {
        warn!("Interrupt received, stopping watch");
        flag.store(true, Ordering::SeqCst);
    })
    .context("Failed to install Ctrl-C handler")?;

    store.watch(shutdown)?;
    Ok(())
}

use std::collections::{BTreeMap, BTreeSet};

use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, warn};

use crate::config::ScriptConfig;
use crate::config::schema::{DEFAULT_MAX_OUTPUT_BYTES, DEFAULT_MAX_STEPS};

use super::error::ScriptError;
use super::interpreter::Interpreter;
use super::parser::parse;
use super::value::Value;

pub const PREFIX_TAGS: &str = "prefix_tags";
pub const MAIN_TAGS: &str = "main_tags";
pub const POSTFIX_TAGS: &str = "postfix_tags";
pub const REMOVED_TAGS: &str = "removed_tags";

const TAG_BUCKETS: [&str; 3] = [PREFIX_TAGS, MAIN_TAGS, POSTFIX_TAGS];

/// Substrings that reject a script before it is parsed (case-insensitive).
pub const DENIED_KEYWORDS: &[&str] = &[
    "import os",
    "import sys",
    "import subprocess",
    "__import__",
    "open(",
    "exec(",
    "eval(",
    "compile(",
    "getattr(",
    "setattr(",
    "delattr(",
    "globals(",
    "locals(",
    "vars(",
    "exit(",
    "quit(",
    "os.system",
    "subprocess",
    "__builtins__",
    "__class__",
    "__subclasses__",
];

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptResult {
    pub output: String,
    pub variables: Option<BTreeMap<String, Vec<String>>>,
    pub success: bool,
}

impl ScriptResult {
    fn failure(error: &ScriptError) -> Self {
        Self {
            output: error.to_string(),
            variables: None,
            success: false,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ScriptExecutor {
    max_steps: u64,
    max_output_bytes: usize,
    seed: Option<u64>,
}

impl Default for ScriptExecutor {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptExecutor {
    pub fn new() -> Self {
        Self {
            max_steps: DEFAULT_MAX_STEPS,
            max_output_bytes: DEFAULT_MAX_OUTPUT_BYTES,
            seed: None,
        }
    }

    pub fn from_config(config: &ScriptConfig) -> Self {
        Self {
            max_steps: config.max_steps,
            max_output_bytes: config.max_output_bytes,
            seed: None,
        }
    }

    /// Makes the `random` module reproducible.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    pub fn max_steps(&self) -> u64 {
        self.max_steps
    }

    /// Runs `script` over copies of `variables`. Never fails; errors come
    /// back as `success = false` with the message in `output`.
    pub fn execute(&self, script: &str, variables: &BTreeMap<String, Vec<String>>) -> ScriptResult {
        match self.run(script, variables) {
            Ok((output, variables)) => ScriptResult {
                output,
                variables: Some(variables),
                success: true,
            },
            Err(e) => {
                warn!("Script failed: {}", e);
                ScriptResult::failure(&e)
            }
        }
    }

    fn run(
        &self,
        script: &str,
        variables: &BTreeMap<String, Vec<String>>,
    ) -> Result<(String, BTreeMap<String, Vec<String>>), ScriptError> {
        check_denied(script)?;
        let program = parse(script)?;

        let rng = match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let mut interpreter = Interpreter::new(self.max_steps, self.max_output_bytes, rng);
        for (name, tags) in variables {
            interpreter.set(name.clone(), tag_list(tags));
        }

        interpreter.run(&program)?;
        debug!(
            "Script finished in {} steps ({} bytes of output)",
            interpreter.steps(),
            interpreter.output().len()
        );

        let mut result = BTreeMap::new();
        for (name, original) in variables {
            let tags = match interpreter.get(name) {
                Some(value) => read_tags(name, value)?,
                None => original.clone(),
            };
            result.insert(name.clone(), tags);
        }

        let explicit = match interpreter.get(REMOVED_TAGS) {
            Some(value) => read_tags(REMOVED_TAGS, value)?,
            None => Vec::new(),
        };
        let removed = removed_tags(variables, &result, explicit);
        result.insert(REMOVED_TAGS.to_string(), removed);

        Ok((interpreter.output().to_string(), result))
    }
}

/// Rejects scripts mentioning host-access names, before any parsing.
pub fn check_denied(script: &str) -> Result<(), ScriptError> {
    let lowered = script.to_lowercase();
    match DENIED_KEYWORDS.iter().find(|keyword| lowered.contains(*keyword)) {
        Some(keyword) => Err(ScriptError::Denied {
            keyword: keyword.to_string(),
        }),
        None => Ok(()),
    }
}

fn tag_list(tags: &[String]) -> Value {
    Value::List(tags.iter().map(|tag| Value::Str(tag.clone())).collect())
}

fn read_tags(name: &str, value: &Value) -> Result<Vec<String>, ScriptError> {
    match value {
        Value::List(items) => Ok(items.iter().map(Value::to_string).collect()),
        Value::Str(s) => Ok(vec![s.clone()]),
        other => Err(ScriptError::InvalidVariable {
            name: name.to_string(),
            found: other.type_name(),
        }),
    }
}

/// Tags that left the three buckets during the run, plus those the script
/// listed itself. Sorted, without duplicates.
fn removed_tags(
    before: &BTreeMap<String, Vec<String>>,
    after: &BTreeMap<String, Vec<String>>,
    explicit: Vec<String>,
) -> Vec<String> {
    let union = |vars: &BTreeMap<String, Vec<String>>| -> BTreeSet<String> {
        TAG_BUCKETS
            .iter()
            .filter_map(|bucket| vars.get(*bucket))
            .flatten()
            .cloned()
            .collect()
    };

    let remaining = union(after);
    let mut removed: BTreeSet<String> = union(before)
        .into_iter()
        .filter(|tag| !remaining.contains(tag))
        .collect();
    removed.extend(explicit);
    removed.into_iter().collect()
}

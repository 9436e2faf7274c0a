//! Built-in functions, methods and the `re`, `math` and `random` modules.

use std::cmp::Ordering;
use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use regex::{Regex, RegexBuilder};

use super::error::ScriptError;
use super::interpreter::Interpreter;
use super::value::{list_size_bytes, Module, Value};

const REGEX_SIZE_LIMIT: usize = 1 << 20;

const BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "bool", "list", "range", "sorted", "reversed",
    "unique", "min", "max", "sum", "abs", "any", "all", "enumerate",
];

const LIST_MUTATORS: &[&str] = &[
    "append", "extend", "insert", "remove", "pop", "clear", "sort", "reverse",
];

pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}

pub fn is_list_mutator(name: &str) -> bool {
    LIST_MUTATORS.contains(&name)
}

fn arity(it: &Interpreter, name: &str, args: &[Value], min: usize, max: usize) -> Result<(), ScriptError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            format!("{}", min)
        } else {
            format!("{} to {}", min, max)
        };
        return Err(it.error(format!(
            "{}() takes {} argument(s), got {}",
            name,
            expected,
            args.len()
        )));
    }
    Ok(())
}

fn expect_str<'a>(it: &Interpreter, name: &str, value: &'a Value) -> Result<&'a str, ScriptError> {
    match value {
        Value::Str(s) => Ok(s),
        other => Err(it.error(format!(
            "{}() expects a string, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn expect_int(it: &Interpreter, name: &str, value: &Value) -> Result<i64, ScriptError> {
    match value {
        Value::Int(n) => Ok(*n),
        other => Err(it.error(format!(
            "{}() expects an integer, got {}",
            name,
            other.type_name()
        ))),
    }
}

fn expect_number(it: &Interpreter, name: &str, value: &Value) -> Result<f64, ScriptError> {
    value.as_f64().ok_or_else(|| {
        it.error(format!(
            "{}() expects a number, got {}",
            name,
            value.type_name()
        ))
    })
}

fn expect_list(it: &Interpreter, name: &str, value: Value) -> Result<Vec<Value>, ScriptError> {
    match value {
        Value::List(items) => Ok(items),
        Value::Str(_) => it.iterate(value),
        other => Err(it.error(format!(
            "{}() expects a list, got {}",
            name,
            other.type_name()
        ))),
    }
}

/// Sorts strings or numbers; mixed or nested lists are rejected.
fn sort_values(it: &Interpreter, items: &mut [Value]) -> Result<(), ScriptError> {
    if items.iter().all(|v| matches!(v, Value::Str(_))) {
        items.sort_by(|a, b| match (a, b) {
            (Value::Str(x), Value::Str(y)) => x.cmp(y),
            _ => Ordering::Equal,
        });
    } else if items.iter().all(|v| matches!(v, Value::Int(_))) {
        items.sort_by_key(|v| match v {
            Value::Int(n) => *n,
            _ => 0,
        });
    } else if items.iter().all(Value::is_number) {
        items.sort_by(|a, b| {
            a.as_f64()
                .unwrap_or(0.0)
                .total_cmp(&b.as_f64().unwrap_or(0.0))
        });
    } else {
        return Err(it.error("can only sort a list of strings or a list of numbers"));
    }
    Ok(())
}

fn to_int(it: &Interpreter, f: f64) -> Result<Value, ScriptError> {
    if !f.is_finite() || f.abs() >= 9.2e18 {
        return Err(it.error(format!("cannot convert {} to an integer", f)));
    }
    Ok(Value::Int(f as i64))
}

fn range(it: &Interpreter, args: &[Value]) -> Result<Value, ScriptError> {
    arity(it, "range", args, 1, 3)?;
    let ints = args
        .iter()
        .map(|arg| expect_int(it, "range", arg))
        .collect::<Result<Vec<_>, _>>()?;

    let (start, stop, step) = match ints.as_slice() {
        [stop] => (0, *stop, 1),
        [start, stop] => (*start, *stop, 1),
        [start, stop, step] => (*start, *stop, *step),
        _ => unreachable!("arity checked"),
    };
    if step == 0 {
        return Err(it.error("range() step must not be zero"));
    }

    let span = if step > 0 {
        (stop as i128 - start as i128 + step as i128 - 1) / step as i128
    } else {
        (start as i128 - stop as i128 - step as i128 - 1) / -(step as i128)
    };
    let count = span.max(0) as usize;
    it.check_len(count)?;

    Ok(Value::List(
        (0..count as i64)
            .map(|i| Value::Int(start + i * step))
            .collect(),
    ))
}

pub fn call_builtin(it: &mut Interpreter, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    match name {
        "print" => {
            let parts: Vec<String> = args.iter().map(Value::to_string).collect();
            it.write_line(&parts.join(" "));
            Ok(Value::None)
        }
        "len" => {
            arity(it, name, &args, 1, 1)?;
            match &args[0] {
                Value::List(items) => Ok(Value::Int(items.len() as i64)),
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                other => Err(it.error(format!("'{}' has no len()", other.type_name()))),
            }
        }
        "str" => {
            arity(it, name, &args, 0, 1)?;
            Ok(Value::Str(args.first().map(Value::to_string).unwrap_or_default()))
        }
        "int" => {
            arity(it, name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(n) => Ok(Value::Int(*n)),
                Value::Float(f) => to_int(it, f.trunc()),
                Value::Bool(b) => Ok(Value::Int(i64::from(*b))),
                Value::Str(s) => s
                    .trim()
                    .parse::<i64>()
                    .map(Value::Int)
                    .map_err(|_| it.error(format!("invalid literal for int(): '{}'", s))),
                other => Err(it.error(format!("int() cannot convert {}", other.type_name()))),
            }
        }
        "float" => {
            arity(it, name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(n) => Ok(Value::Float(*n as f64)),
                Value::Float(f) => Ok(Value::Float(*f)),
                Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
                Value::Str(s) => s
                    .trim()
                    .parse::<f64>()
                    .map(Value::Float)
                    .map_err(|_| it.error(format!("invalid literal for float(): '{}'", s))),
                other => Err(it.error(format!("float() cannot convert {}", other.type_name()))),
            }
        }
        "bool" => {
            arity(it, name, &args, 1, 1)?;
            Ok(Value::Bool(args[0].is_truthy()))
        }
        "list" => {
            arity(it, name, &args, 0, 1)?;
            match args.into_iter().next() {
                None => Ok(Value::List(Vec::new())),
                Some(value) => expect_list(it, name, value).map(Value::List),
            }
        }
        "range" => range(it, &args),
        "sorted" => {
            arity(it, name, &args, 1, 1)?;
            let mut items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            sort_values(it, &mut items)?;
            Ok(Value::List(items))
        }
        "reversed" => {
            arity(it, name, &args, 1, 1)?;
            let mut items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            items.reverse();
            Ok(Value::List(items))
        }
        "unique" => {
            arity(it, name, &args, 1, 1)?;
            let items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            let mut seen = HashSet::new();
            Ok(Value::List(
                items
                    .into_iter()
                    .filter(|item| seen.insert(item.dedup_key()))
                    .collect(),
            ))
        }
        "min" | "max" => {
            let mut items = if args.len() == 1 {
                expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?
            } else {
                args
            };
            if items.is_empty() {
                return Err(it.error(format!("{}() of an empty sequence", name)));
            }
            sort_values(it, &mut items)?;
            let picked = if name == "min" {
                items.swap_remove(0)
            } else {
                items.pop().unwrap_or(Value::None)
            };
            Ok(picked)
        }
        "sum" => {
            arity(it, name, &args, 1, 1)?;
            let items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            if items.iter().all(|v| matches!(v, Value::Int(_))) {
                let mut total: i64 = 0;
                for item in &items {
                    if let Value::Int(n) = item {
                        total = total
                            .checked_add(*n)
                            .ok_or_else(|| it.error("integer overflow"))?;
                    }
                }
                return Ok(Value::Int(total));
            }
            let mut total = 0.0;
            for item in &items {
                total += expect_number(it, name, item)?;
            }
            Ok(Value::Float(total))
        }
        "abs" => {
            arity(it, name, &args, 1, 1)?;
            match &args[0] {
                Value::Int(n) => n
                    .checked_abs()
                    .map(Value::Int)
                    .ok_or_else(|| it.error("integer overflow")),
                Value::Float(f) => Ok(Value::Float(f.abs())),
                other => Err(it.error(format!("abs() expects a number, got {}", other.type_name()))),
            }
        }
        "any" | "all" => {
            arity(it, name, &args, 1, 1)?;
            let items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            let result = if name == "any" {
                items.iter().any(Value::is_truthy)
            } else {
                items.iter().all(Value::is_truthy)
            };
            Ok(Value::Bool(result))
        }
        "enumerate" => {
            arity(it, name, &args, 1, 1)?;
            let items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            Ok(Value::List(
                items
                    .into_iter()
                    .enumerate()
                    .map(|(i, item)| Value::List(vec![Value::Int(i as i64), item]))
                    .collect(),
            ))
        }
        _ => Err(it.error(format!("name '{}' is not defined", name))),
    }
}

/// Applies a mutating list method in place and returns the call's result.
pub fn mutate_list(
    it: &mut Interpreter,
    items: &mut Vec<Value>,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match name {
        "append" => {
            arity(it, name, &args, 1, 1)?;
            it.check_len(items.len() + 1)?;
            it.check_bytes(list_size_bytes(items).saturating_add(list_size_bytes(&args)))?;
            items.extend(args);
        }
        "extend" => {
            arity(it, name, &args, 1, 1)?;
            let extra = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            it.check_len(items.len() + extra.len())?;
            it.check_bytes(list_size_bytes(items).saturating_add(list_size_bytes(&extra)))?;
            items.extend(extra);
        }
        "insert" => {
            arity(it, name, &args, 2, 2)?;
            it.check_len(items.len() + 1)?;
            let mut args = args.into_iter();
            let index = expect_int(it, name, &args.next().unwrap_or(Value::None))?;
            let len = items.len() as i64;
            let position = if index < 0 { (len + index).max(0) } else { index.min(len) };
            let value = args.next().unwrap_or(Value::None);
            it.check_bytes(list_size_bytes(items).saturating_add(value.size_bytes()))?;
            items.insert(position as usize, value);
        }
        "remove" => {
            arity(it, name, &args, 1, 1)?;
            if let Some(position) = items.iter().position(|item| *item == args[0]) {
                items.remove(position);
            }
        }
        "pop" => {
            arity(it, name, &args, 0, 1)?;
            if items.is_empty() {
                return Err(it.error("pop from empty list"));
            }
            let position = match args.first() {
                Some(index) => it.position(items.len(), index)?,
                None => items.len() - 1,
            };
            return Ok(items.remove(position));
        }
        "clear" => {
            arity(it, name, &args, 0, 0)?;
            items.clear();
        }
        "sort" => {
            arity(it, name, &args, 0, 0)?;
            sort_values(it, items)?;
        }
        "reverse" => {
            arity(it, name, &args, 0, 0)?;
            items.reverse();
        }
        _ => return Err(it.error(format!("'list' has no method '{}'", name))),
    }
    Ok(Value::None)
}

/// Non-mutating methods on strings and lists.
pub fn call_method(
    it: &mut Interpreter,
    receiver: Value,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match receiver {
        Value::Str(s) => string_method(it, &s, name, &args),
        Value::List(items) => match name {
            "index" => {
                arity(it, name, &args, 1, 1)?;
                items
                    .iter()
                    .position(|item| *item == args[0])
                    .map(|i| Value::Int(i as i64))
                    .ok_or_else(|| it.error(format!("{} is not in list", args[0].repr())))
            }
            "count" => {
                arity(it, name, &args, 1, 1)?;
                Ok(Value::Int(
                    items.iter().filter(|item| **item == args[0]).count() as i64,
                ))
            }
            "copy" => {
                arity(it, name, &args, 0, 0)?;
                Ok(Value::List(items))
            }
            _ => Err(it.error(format!("'list' has no method '{}'", name))),
        },
        other => Err(it.error(format!(
            "'{}' has no method '{}'",
            other.type_name(),
            name
        ))),
    }
}

fn string_method(it: &Interpreter, s: &str, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match name {
        "lower" => {
            arity(it, name, args, 0, 0)?;
            Ok(Value::Str(s.to_lowercase()))
        }
        "upper" => {
            arity(it, name, args, 0, 0)?;
            Ok(Value::Str(s.to_uppercase()))
        }
        "strip" => {
            arity(it, name, args, 0, 1)?;
            match args.first() {
                None => Ok(Value::Str(s.trim().to_string())),
                Some(chars) => {
                    let chars: Vec<char> = expect_str(it, name, chars)?.chars().collect();
                    Ok(Value::Str(s.trim_matches(chars.as_slice()).to_string()))
                }
            }
        }
        "replace" => {
            arity(it, name, args, 2, 2)?;
            let from = expect_str(it, name, &args[0])?;
            let to = expect_str(it, name, &args[1])?;
            if from.is_empty() {
                return Err(it.error("replace() pattern must not be empty"));
            }
            let replaced = s.replace(from, to);
            if replaced.len() > REGEX_SIZE_LIMIT {
                return Err(it.error("string too large"));
            }
            Ok(Value::Str(replaced))
        }
        "startswith" => {
            arity(it, name, args, 1, 1)?;
            Ok(Value::Bool(s.starts_with(expect_str(it, name, &args[0])?)))
        }
        "endswith" => {
            arity(it, name, args, 1, 1)?;
            Ok(Value::Bool(s.ends_with(expect_str(it, name, &args[0])?)))
        }
        "contains" => {
            arity(it, name, args, 1, 1)?;
            Ok(Value::Bool(s.contains(expect_str(it, name, &args[0])?)))
        }
        "find" => {
            arity(it, name, args, 1, 1)?;
            let needle = expect_str(it, name, &args[0])?;
            Ok(Value::Int(match s.find(needle) {
                Some(byte) => s[..byte].chars().count() as i64,
                None => -1,
            }))
        }
        "split" => {
            arity(it, name, args, 0, 1)?;
            let parts: Vec<Value> = match args.first() {
                None | Some(Value::None) => s.split_whitespace().map(Value::from).collect(),
                Some(sep) => {
                    let sep = expect_str(it, name, sep)?;
                    if sep.is_empty() {
                        return Err(it.error("split() separator must not be empty"));
                    }
                    s.split(sep).map(Value::from).collect()
                }
            };
            it.check_len(parts.len())?;
            Ok(Value::List(parts))
        }
        "join" => {
            arity(it, name, args, 1, 1)?;
            let items = match &args[0] {
                Value::List(items) => items,
                other => {
                    return Err(it.error(format!(
                        "join() expects a list, got {}",
                        other.type_name()
                    )))
                }
            };
            let parts: Vec<String> = items.iter().map(Value::to_string).collect();
            Ok(Value::Str(parts.join(s)))
        }
        _ => Err(it.error(format!("'str' has no method '{}'", name))),
    }
}

fn compile(it: &Interpreter, pattern: &Value) -> Result<Regex, ScriptError> {
    let pattern = expect_str(it, "re", pattern)?;
    RegexBuilder::new(pattern)
        .size_limit(REGEX_SIZE_LIMIT)
        .build()
        .map_err(|e| it.error(format!("invalid pattern '{}': {}", pattern, e)))
}

pub fn module_attr(it: &Interpreter, module: Module, name: &str) -> Result<Value, ScriptError> {
    match (module, name) {
        (Module::Math, "pi") => Ok(Value::Float(std::f64::consts::PI)),
        (Module::Math, "e") => Ok(Value::Float(std::f64::consts::E)),
        _ => Err(it.error(format!(
            "module '{}' has no attribute '{}'",
            module.name(),
            name
        ))),
    }
}

pub fn call_module(
    it: &mut Interpreter,
    module: Module,
    name: &str,
    args: Vec<Value>,
) -> Result<Value, ScriptError> {
    match module {
        Module::Re => call_re(it, name, &args),
        Module::Math => call_math(it, name, &args),
        Module::Random => call_random(it, name, args),
    }
}

fn call_re(it: &Interpreter, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match name {
        "search" | "match" => {
            arity(it, name, args, 2, 2)?;
            let regex = compile(it, &args[0])?;
            let text = expect_str(it, name, &args[1])?;
            // Leftmost-first: a match at 0 exists iff the first match starts at 0
            let found = regex
                .find(text)
                .filter(|m| name == "search" || m.start() == 0);
            Ok(found.map_or(Value::None, |m| Value::from(m.as_str())))
        }
        "sub" => {
            arity(it, name, args, 3, 3)?;
            let regex = compile(it, &args[0])?;
            let replacement = expect_str(it, name, &args[1])?;
            let text = expect_str(it, name, &args[2])?;
            let replaced = regex.replace_all(text, replacement).into_owned();
            if replaced.len() > REGEX_SIZE_LIMIT {
                return Err(it.error("string too large"));
            }
            Ok(Value::Str(replaced))
        }
        "findall" => {
            arity(it, name, args, 2, 2)?;
            let regex = compile(it, &args[0])?;
            let text = expect_str(it, name, &args[1])?;
            // With exactly one group, return the group like Python does
            let found: Vec<Value> = if regex.captures_len() == 2 {
                regex
                    .captures_iter(text)
                    .map(|caps| Value::from(caps.get(1).map_or("", |m| m.as_str())))
                    .collect()
            } else {
                regex.find_iter(text).map(|m| Value::from(m.as_str())).collect()
            };
            it.check_len(found.len())?;
            Ok(Value::List(found))
        }
        "split" => {
            arity(it, name, args, 2, 2)?;
            let regex = compile(it, &args[0])?;
            let text = expect_str(it, name, &args[1])?;
            let parts: Vec<Value> = regex.split(text).map(Value::from).collect();
            it.check_len(parts.len())?;
            Ok(Value::List(parts))
        }
        _ => Err(it.error(format!("module 're' has no function '{}'", name))),
    }
}

fn call_math(it: &Interpreter, name: &str, args: &[Value]) -> Result<Value, ScriptError> {
    match name {
        "floor" | "ceil" | "round" => {
            arity(it, name, args, 1, 1)?;
            let x = expect_number(it, name, &args[0])?;
            let rounded = match name {
                "floor" => x.floor(),
                "ceil" => x.ceil(),
                _ => x.round_ties_even(),
            };
            to_int(it, rounded)
        }
        "sqrt" => {
            arity(it, name, args, 1, 1)?;
            let x = expect_number(it, name, &args[0])?;
            if x < 0.0 {
                return Err(it.error("math domain error"));
            }
            Ok(Value::Float(x.sqrt()))
        }
        "pow" => {
            arity(it, name, args, 2, 2)?;
            let base = expect_number(it, name, &args[0])?;
            let exponent = expect_number(it, name, &args[1])?;
            Ok(Value::Float(base.powf(exponent)))
        }
        _ => Err(it.error(format!("module 'math' has no function '{}'", name))),
    }
}

fn call_random(it: &mut Interpreter, name: &str, args: Vec<Value>) -> Result<Value, ScriptError> {
    match name {
        "random" => {
            arity(it, name, &args, 0, 0)?;
            Ok(Value::Float(it.rng().gen::<f64>()))
        }
        "randint" => {
            arity(it, name, &args, 2, 2)?;
            let low = expect_int(it, name, &args[0])?;
            let high = expect_int(it, name, &args[1])?;
            if low > high {
                return Err(it.error(format!("empty range for randint({}, {})", low, high)));
            }
            Ok(Value::Int(it.rng().gen_range(low..=high)))
        }
        "choice" => {
            arity(it, name, &args, 1, 1)?;
            let mut items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            if items.is_empty() {
                return Err(it.error("cannot choose from an empty list"));
            }
            let index = it.rng().gen_range(0..items.len());
            Ok(items.swap_remove(index))
        }
        "shuffle" => {
            arity(it, name, &args, 1, 1)?;
            let mut items = expect_list(it, name, args.into_iter().next().unwrap_or(Value::None))?;
            items.shuffle(it.rng());
            Ok(Value::List(items))
        }
        "sample" => {
            arity(it, name, &args, 2, 2)?;
            let mut args = args.into_iter();
            let items = expect_list(it, name, args.next().unwrap_or(Value::None))?;
            let k = expect_int(it, name, &args.next().unwrap_or(Value::None))?;
            if k < 0 || k as usize > items.len() {
                return Err(it.error("sample larger than population or negative"));
            }
            let picked = items.choose_multiple(it.rng(), k as usize).cloned().collect();
            Ok(Value::List(picked))
        }
        _ => Err(it.error(format!("module 'random' has no function '{}'", name))),
    }
}

use std::collections::BTreeMap;

use rand::rngs::StdRng;

use super::ast::{BinaryOp, Expr, Stmt, StmtKind, UnaryOp};
use super::builtins;
use super::error::ScriptError;
use super::value::{list_size_bytes, Module, Value};

/// Largest list or string a script may build.
pub const MAX_COLLECTION_LEN: usize = 100_000;
const MAX_STRING_BYTES: usize = 1024 * 1024;
/// Largest total payload of a single list, nested lists included.
pub const MAX_COLLECTION_BYTES: usize = 16 * 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]\n";

enum Flow {
    Normal,
    Break,
    Continue,
}

pub struct Interpreter {
    env: BTreeMap<String, Value>,
    steps: u64,
    max_steps: u64,
    output: String,
    max_output_bytes: usize,
    output_truncated: bool,
    line: usize,
    rng: StdRng,
}

impl Interpreter {
    pub fn new(max_steps: u64, max_output_bytes: usize, rng: StdRng) -> Self {
        let env = Module::ALL
            .iter()
            .map(|module| (module.name().to_string(), Value::Module(*module)))
            .collect();

        Self {
            env,
            steps: 0,
            max_steps,
            output: String::new(),
            max_output_bytes,
            output_truncated: false,
            line: 0,
            rng,
        }
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.env.insert(name.into(), value);
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.env.get(name)
    }

    pub fn output(&self) -> &str {
        &self.output
    }

    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn run(&mut self, program: &[Stmt]) -> Result<(), ScriptError> {
        // break/continue outside a loop are rejected by the parser
        self.exec_block(program).map(|_| ())
    }

    pub(super) fn error(&self, message: impl Into<String>) -> ScriptError {
        ScriptError::Runtime {
            line: self.line,
            message: message.into(),
        }
    }

    pub(super) fn rng(&mut self) -> &mut StdRng {
        &mut self.rng
    }

    pub(super) fn check_len(&self, len: usize) -> Result<(), ScriptError> {
        if len > MAX_COLLECTION_LEN {
            return Err(self.error(format!(
                "collection too large ({} items, limit {})",
                len, MAX_COLLECTION_LEN
            )));
        }
        Ok(())
    }

    pub(super) fn check_bytes(&self, bytes: usize) -> Result<(), ScriptError> {
        if bytes > MAX_COLLECTION_BYTES {
            return Err(self.error(format!(
                "collection too large ({} bytes, limit {})",
                bytes, MAX_COLLECTION_BYTES
            )));
        }
        Ok(())
    }

    fn check_string(&self, s: &str) -> Result<(), ScriptError> {
        if s.len() > MAX_STRING_BYTES {
            return Err(self.error(format!("string too large ({} bytes)", s.len())));
        }
        Ok(())
    }

    /// Appends one `print` line to the captured output, truncating at the cap.
    pub(super) fn write_line(&mut self, line: &str) {
        if self.output_truncated {
            return;
        }

        let needed = line.len() + 1;
        let remaining = self.max_output_bytes.saturating_sub(self.output.len());
        if needed <= remaining {
            self.output.push_str(line);
            self.output.push('\n');
            return;
        }

        let mut cut = remaining.min(line.len());
        while !line.is_char_boundary(cut) {
            cut -= 1;
        }
        self.output.push_str(&line[..cut]);
        self.output.push_str(TRUNCATION_MARKER);
        self.output_truncated = true;
    }

    pub(super) fn tick(&mut self) -> Result<(), ScriptError> {
        self.steps += 1;
        if self.steps > self.max_steps {
            return Err(ScriptError::StepLimit(self.max_steps));
        }
        Ok(())
    }

    fn exec_block(&mut self, block: &[Stmt]) -> Result<Flow, ScriptError> {
        for stmt in block {
            match self.exec(stmt)? {
                Flow::Normal => {}
                flow => return Ok(flow),
            }
        }
        Ok(Flow::Normal)
    }

    fn exec(&mut self, stmt: &Stmt) -> Result<Flow, ScriptError> {
        self.line = stmt.line;
        self.tick()?;

        match &stmt.kind {
            StmtKind::Expr(expr) => {
                self.eval(expr)?;
            }
            StmtKind::Assign { target, value } => {
                let value = self.eval(value)?;
                self.assign(target, value)?;
            }
            StmtKind::AugAssign { target, op, value } => {
                let current = self.eval(target)?;
                let rhs = self.eval(value)?;
                let updated = self.binary(*op, current, rhs)?;
                self.assign(target, updated)?;
            }
            StmtKind::If {
                branches,
                otherwise,
            } => {
                for (condition, body) in branches {
                    if self.eval(condition)?.is_truthy() {
                        return self.exec_block(body);
                    }
                }
                if let Some(body) = otherwise {
                    return self.exec_block(body);
                }
            }
            StmtKind::For {
                var,
                iterable,
                body,
            } => {
                let iterable = self.eval(iterable)?;
                let items = self.iterate(iterable)?;
                for item in items {
                    self.tick()?;
                    self.env.insert(var.clone(), item);
                    match self.exec_block(body)? {
                        Flow::Break => break,
                        Flow::Continue | Flow::Normal => {}
                    }
                }
            }
            StmtKind::While { condition, body } => loop {
                self.tick()?;
                if !self.eval(condition)?.is_truthy() {
                    break;
                }
                match self.exec_block(body)? {
                    Flow::Break => break,
                    Flow::Continue | Flow::Normal => {}
                }
            },
            StmtKind::Break => return Ok(Flow::Break),
            StmtKind::Continue => return Ok(Flow::Continue),
        }

        Ok(Flow::Normal)
    }

    /// Writes `value` to a variable or to a (possibly nested) list element.
    fn assign(&mut self, target: &Expr, value: Value) -> Result<(), ScriptError> {
        match target {
            Expr::Var(name) => {
                self.env.insert(name.clone(), value);
                Ok(())
            }
            Expr::Index { target, index } => {
                let index = self.eval(index)?;
                let mut container = self.eval(target)?;
                match &mut container {
                    Value::List(items) => {
                        let position = self.position(items.len(), &index)?;
                        items[position] = value;
                    }
                    other => {
                        return Err(self.error(format!(
                            "'{}' does not support item assignment",
                            other.type_name()
                        )))
                    }
                }
                self.assign(target, container)
            }
            _ => Err(self.error("invalid assignment target")),
        }
    }

    pub(super) fn iterate(&self, value: Value) -> Result<Vec<Value>, ScriptError> {
        match value {
            Value::List(items) => Ok(items),
            Value::Str(s) => Ok(s.chars().map(|c| Value::Str(c.to_string())).collect()),
            other => Err(self.error(format!("'{}' is not iterable", other.type_name()))),
        }
    }

    /// Resolves a possibly negative index against `len`.
    pub(super) fn position(&self, len: usize, index: &Value) -> Result<usize, ScriptError> {
        let Value::Int(raw) = index else {
            return Err(self.error(format!(
                "indices must be integers, not {}",
                index.type_name()
            )));
        };
        let resolved = if *raw < 0 { len as i64 + raw } else { *raw };
        if resolved < 0 || resolved >= len as i64 {
            return Err(self.error(format!("index {} out of range", raw)));
        }
        Ok(resolved as usize)
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ScriptError> {
        self.tick()?;

        match expr {
            Expr::None => Ok(Value::None),
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Int(n) => Ok(Value::Int(*n)),
            Expr::Float(f) => Ok(Value::Float(*f)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Var(name) => match self.env.get(name) {
                Some(value) => Ok(value.clone()),
                None if builtins::is_builtin(name) => {
                    Err(self.error(format!("built-in '{}' must be called", name)))
                }
                None => Err(self.error(format!("name '{}' is not defined", name))),
            },
            Expr::Unary { op, operand } => {
                let value = self.eval(operand)?;
                match (op, value) {
                    (UnaryOp::Not, value) => Ok(Value::Bool(!value.is_truthy())),
                    (UnaryOp::Neg, Value::Int(n)) => n
                        .checked_neg()
                        .map(Value::Int)
                        .ok_or_else(|| self.error("integer overflow")),
                    (UnaryOp::Neg, Value::Float(f)) => Ok(Value::Float(-f)),
                    (UnaryOp::Neg, other) => Err(self.error(format!(
                        "bad operand type for unary -: '{}'",
                        other.type_name()
                    ))),
                }
            }
            Expr::Binary { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                self.binary(*op, left, right)
            }
            Expr::And(left, right) => {
                let left = self.eval(left)?;
                if !left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Or(left, right) => {
                let left = self.eval(left)?;
                if left.is_truthy() {
                    return Ok(left);
                }
                self.eval(right)
            }
            Expr::Index { target, index } => {
                let target = self.eval(target)?;
                let index = self.eval(index)?;
                match target {
                    Value::List(mut items) => {
                        let position = self.position(items.len(), &index)?;
                        Ok(items.swap_remove(position))
                    }
                    Value::Str(s) => {
                        let chars: Vec<char> = s.chars().collect();
                        let position = self.position(chars.len(), &index)?;
                        Ok(Value::Str(chars[position].to_string()))
                    }
                    other => Err(self.error(format!(
                        "'{}' is not subscriptable",
                        other.type_name()
                    ))),
                }
            }
            Expr::Slice { target, start, end } => {
                let target = self.eval(target)?;
                let start = match start {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                let end = match end {
                    Some(expr) => Some(self.eval(expr)?),
                    None => None,
                };
                self.slice(target, start, end)
            }
            Expr::Attr { target, name } => match self.eval(target)? {
                Value::Module(module) => builtins::module_attr(self, module, name),
                other => Err(self.error(format!(
                    "'{}' has no attribute '{}'",
                    other.type_name(),
                    name
                ))),
            },
            Expr::Call { callee, args } => self.call(callee, args),
            Expr::Comprehension {
                element,
                var,
                iterable,
                condition,
            } => {
                let iterable = self.eval(iterable)?;
                let items = self.iterate(iterable)?;
                let saved = self.env.remove(var);

                let result = self.comprehension(element, var, items, condition.as_deref());

                match saved {
                    Some(value) => self.env.insert(var.clone(), value),
                    None => self.env.remove(var),
                };
                result
            }
        }
    }

    fn comprehension(
        &mut self,
        element: &Expr,
        var: &str,
        items: Vec<Value>,
        condition: Option<&Expr>,
    ) -> Result<Value, ScriptError> {
        let mut values = Vec::new();
        let mut bytes = 0usize;
        for item in items {
            self.env.insert(var.to_string(), item);
            if let Some(condition) = condition {
                if !self.eval(condition)?.is_truthy() {
                    continue;
                }
            }
            let value = self.eval(element)?;
            bytes = bytes.saturating_add(value.size_bytes());
            self.check_bytes(bytes)?;
            values.push(value);
            self.check_len(values.len())?;
        }
        Ok(Value::List(values))
    }

    fn slice(
        &self,
        target: Value,
        start: Option<Value>,
        end: Option<Value>,
    ) -> Result<Value, ScriptError> {
        let bound = |value: Option<Value>, len: usize, default: usize| -> Result<usize, ScriptError> {
            match value {
                None | Some(Value::None) => Ok(default),
                Some(Value::Int(n)) => {
                    let resolved = if n < 0 { len as i64 + n } else { n };
                    Ok(resolved.clamp(0, len as i64) as usize)
                }
                Some(other) => Err(self.error(format!(
                    "slice indices must be integers, not {}",
                    other.type_name()
                ))),
            }
        };

        match target {
            Value::List(items) => {
                let len = items.len();
                let (from, to) = (bound(start, len, 0)?, bound(end, len, len)?);
                if from >= to {
                    return Ok(Value::List(Vec::new()));
                }
                Ok(Value::List(items[from..to].to_vec()))
            }
            Value::Str(s) => {
                let chars: Vec<char> = s.chars().collect();
                let len = chars.len();
                let (from, to) = (bound(start, len, 0)?, bound(end, len, len)?);
                if from >= to {
                    return Ok(Value::Str(String::new()));
                }
                Ok(Value::Str(chars[from..to].iter().collect()))
            }
            other => Err(self.error(format!("'{}' is not sliceable", other.type_name()))),
        }
    }

    fn call(&mut self, callee: &Expr, args: &[Expr]) -> Result<Value, ScriptError> {
        match callee {
            Expr::Attr { target, name } => {
                let receiver = self.eval(target)?;
                let args = self.eval_args(args)?;

                match receiver {
                    Value::Module(module) => builtins::call_module(self, module, name, args),
                    Value::List(mut items) if builtins::is_list_mutator(name) => {
                        let result = builtins::mutate_list(self, &mut items, name, args)?;
                        // Only named lists keep the mutation
                        if is_place(target) {
                            self.assign(target, Value::List(items))?;
                        }
                        Ok(result)
                    }
                    receiver => builtins::call_method(self, receiver, name, args),
                }
            }
            Expr::Var(name) => {
                if let Some(value) = self.env.get(name) {
                    return Err(self.error(format!(
                        "'{}' object is not callable",
                        value.type_name()
                    )));
                }
                let args = self.eval_args(args)?;
                builtins::call_builtin(self, name, args)
            }
            _ => Err(self.error("expression is not callable")),
        }
    }

    fn eval_args(&mut self, args: &[Expr]) -> Result<Vec<Value>, ScriptError> {
        args.iter().map(|arg| self.eval(arg)).collect()
    }

    fn binary(&self, op: BinaryOp, left: Value, right: Value) -> Result<Value, ScriptError> {
        match op {
            BinaryOp::Add => self.add(left, right),
            BinaryOp::Sub => self.subtract(left, right),
            BinaryOp::Mul => self.multiply(left, right),
            BinaryOp::Div => {
                let (a, b) = self.numbers("/", &left, &right)?;
                if b == 0.0 {
                    return Err(self.error("division by zero"));
                }
                Ok(Value::Float(a / b))
            }
            BinaryOp::Mod => match (&left, &right) {
                (Value::Int(_), Value::Int(0)) => Err(self.error("modulo by zero")),
                (Value::Int(a), Value::Int(b)) => {
                    // Result takes the sign of the divisor
                    let r = a.checked_rem(*b).unwrap_or(0);
                    Ok(Value::Int(if r != 0 && (r < 0) != (*b < 0) { r + b } else { r }))
                }
                _ => {
                    let (a, b) = self.numbers("%", &left, &right)?;
                    if b == 0.0 {
                        return Err(self.error("modulo by zero"));
                    }
                    Ok(Value::Float(a - b * (a / b).floor()))
                }
            },
            BinaryOp::Eq => Ok(Value::Bool(left == right)),
            BinaryOp::NotEq => Ok(Value::Bool(left != right)),
            BinaryOp::Lt | BinaryOp::LtEq | BinaryOp::Gt | BinaryOp::GtEq => {
                let ordering = left.compare(&right).ok_or_else(|| {
                    self.error(format!(
                        "cannot compare '{}' with '{}'",
                        left.type_name(),
                        right.type_name()
                    ))
                })?;
                Ok(Value::Bool(match op {
                    BinaryOp::Lt => ordering.is_lt(),
                    BinaryOp::LtEq => ordering.is_le(),
                    BinaryOp::Gt => ordering.is_gt(),
                    _ => ordering.is_ge(),
                }))
            }
            BinaryOp::In => self.contains(&right, &left).map(Value::Bool),
            BinaryOp::NotIn => self.contains(&right, &left).map(|found| Value::Bool(!found)),
        }
    }

    fn contains(&self, container: &Value, item: &Value) -> Result<bool, ScriptError> {
        match (container, item) {
            (Value::List(items), item) => Ok(items.contains(item)),
            (Value::Str(haystack), Value::Str(needle)) => Ok(haystack.contains(needle.as_str())),
            (Value::Str(_), other) => Err(self.error(format!(
                "'in <str>' requires a string, not {}",
                other.type_name()
            ))),
            (other, _) => Err(self.error(format!(
                "'{}' does not support 'in'",
                other.type_name()
            ))),
        }
    }

    fn numbers(&self, symbol: &str, left: &Value, right: &Value) -> Result<(f64, f64), ScriptError> {
        match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok((a, b)),
            _ => Err(self.operand_error(symbol, left, right)),
        }
    }

    fn operand_error(&self, symbol: &str, left: &Value, right: &Value) -> ScriptError {
        self.error(format!(
            "unsupported operand types for {}: '{}' and '{}'",
            symbol,
            left.type_name(),
            right.type_name()
        ))
    }

    fn add(&self, left: Value, right: Value) -> Result<Value, ScriptError> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_add(b)
                .map(Value::Int)
                .ok_or_else(|| self.error("integer overflow")),
            (Value::Str(mut a), Value::Str(b)) => {
                a.push_str(&b);
                self.check_string(&a)?;
                Ok(Value::Str(a))
            }
            (Value::List(mut a), Value::List(b)) => {
                self.check_len(a.len() + b.len())?;
                self.check_bytes(list_size_bytes(&a).saturating_add(list_size_bytes(&b)))?;
                a.extend(b);
                Ok(Value::List(a))
            }
            (left, right) => {
                let (a, b) = self.numbers("+", &left, &right)?;
                Ok(Value::Float(a + b))
            }
        }
    }

    /// Numeric subtraction; for lists, drops every item found on the right.
    fn subtract(&self, left: Value, right: Value) -> Result<Value, ScriptError> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_sub(b)
                .map(Value::Int)
                .ok_or_else(|| self.error("integer overflow")),
            (Value::List(a), Value::List(b)) => {
                Ok(Value::List(a.into_iter().filter(|item| !b.contains(item)).collect()))
            }
            (left, right) => {
                let (a, b) = self.numbers("-", &left, &right)?;
                Ok(Value::Float(a - b))
            }
        }
    }

    fn multiply(&self, left: Value, right: Value) -> Result<Value, ScriptError> {
        match (left, right) {
            (Value::Int(a), Value::Int(b)) => a
                .checked_mul(b)
                .map(Value::Int)
                .ok_or_else(|| self.error("integer overflow")),
            (Value::Str(s), Value::Int(n)) | (Value::Int(n), Value::Str(s)) => {
                let count = n.max(0) as usize;
                if s.len().saturating_mul(count) > MAX_STRING_BYTES {
                    return Err(self.error("string too large"));
                }
                Ok(Value::Str(s.repeat(count)))
            }
            (Value::List(items), Value::Int(n)) | (Value::Int(n), Value::List(items)) => {
                let count = n.max(0) as usize;
                self.check_len(items.len().saturating_mul(count))?;
                self.check_bytes(list_size_bytes(&items).saturating_mul(count))?;
                let repeated = std::iter::repeat(items).take(count).flatten().collect();
                Ok(Value::List(repeated))
            }
            (left, right) => {
                let (a, b) = self.numbers("*", &left, &right)?;
                Ok(Value::Float(a * b))
            }
        }
    }
}

fn is_place(expr: &Expr) -> bool {
    match expr {
        Expr::Var(_) => true,
        Expr::Index { target, .. } => is_place(target),
        _ => false,
    }
}

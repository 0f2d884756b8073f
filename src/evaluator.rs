// Binding expression evaluator
// Executes an ExprNode tree against a memory view.

use indexmap::IndexMap;
use serde_json::Value;
use thiserror::Error;

use crate::ast::{BinaryOp, ExprNode, PathStep, UnaryOp};
use crate::functions;

/// Name resolution source for expression evaluation.
///
/// The evaluator only ever reads names through this trait, so the binding
/// layer decides what a name means: the data-context implementation answers
/// `$data`, `$root` and `$index` as reserved names and everything else as a
/// property of the currently bound token.
pub trait MemoryView {
    fn get(&self, name: &str) -> Option<Value>;
}

/// Plain key/value memory backed by an ordered map.
///
/// Useful for driving the evaluator outside of template expansion.
#[derive(Debug, Clone, Default)]
pub struct MapMemory {
    entries: IndexMap<String, Value>,
}

impl MapMemory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: Value) {
        self.entries.insert(name.into(), value);
    }
}

impl MemoryView for MapMemory {
    fn get(&self, name: &str) -> Option<Value> {
        self.entries.get(name).cloned()
    }
}

/// Policy invoked when a path cannot be resolved against the memory view.
/// Receives the path's source text and produces the value to continue with.
pub type NullSubstitution = dyn Fn(&str) -> Value;

/// The default policy re-emits the placeholder itself, so an unresolved
/// `${missing}` survives expansion as the literal text `${missing}`.
pub fn default_null_substitution(path: &str) -> Value {
    Value::String(format!("${{{}}}", path))
}

/// Evaluation options
pub struct EvalOptions<'a> {
    /// Substitution for unresolved paths; without one, an unresolved path
    /// is a reference error.
    pub null_substitution: Option<&'a NullSubstitution>,
}

impl<'a> EvalOptions<'a> {
    pub fn new() -> Self {
        EvalOptions {
            null_substitution: None,
        }
    }

    pub fn with_substitution(substitution: &'a NullSubstitution) -> Self {
        EvalOptions {
            null_substitution: Some(substitution),
        }
    }
}

impl<'a> Default for EvalOptions<'a> {
    fn default() -> Self {
        Self::new()
    }
}

/// Evaluator errors
#[derive(Error, Debug)]
pub enum ExprError {
    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Reference error: cannot resolve '{0}'")]
    ReferenceError(String),

    #[error("Evaluation error: {0}")]
    EvaluationError(String),
}

impl From<functions::FunctionError> for ExprError {
    fn from(e: functions::FunctionError) -> Self {
        ExprError::EvaluationError(e.to_string())
    }
}

/// Truthiness used by `$when`, logical operators and the conditional:
/// `false`, `null`, `0`, `""`, `[]` and `{}` are falsy.
pub fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(false),
        Value::String(s) => !s.is_empty(),
        Value::Array(arr) => !arr.is_empty(),
        Value::Object(obj) => !obj.is_empty(),
    }
}

/// Build a number value, preserving integer-ness of whole results
fn number_value(n: f64) -> Result<Value, ExprError> {
    if n.fract() == 0.0 && n.is_finite() && n.abs() < (1i64 << 53) as f64 {
        Ok(serde_json::json!(n as i64))
    } else {
        serde_json::Number::from_f64(n)
            .map(Value::Number)
            .ok_or_else(|| ExprError::EvaluationError(format!("non-finite result: {}", n)))
    }
}

/// JSON equality with numeric comparison across integer/float encodings
fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => match (a.as_f64(), b.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => a == b,
        },
        _ => lhs == rhs,
    }
}

/// Evaluator for binding expressions
pub struct Evaluator<'a> {
    memory: &'a dyn MemoryView,
    options: &'a EvalOptions<'a>,
}

impl<'a> Evaluator<'a> {
    pub fn new(memory: &'a dyn MemoryView, options: &'a EvalOptions<'a>) -> Self {
        Evaluator { memory, options }
    }

    /// Evaluate an expression tree
    pub fn evaluate(&self, node: &ExprNode) -> Result<Value, ExprError> {
        match node {
            ExprNode::String(s) => Ok(Value::String(s.clone())),
            ExprNode::Number(n) => number_value(*n),
            ExprNode::Boolean(b) => Ok(Value::Bool(*b)),
            ExprNode::Null => Ok(Value::Null),

            ExprNode::Path { steps, source } => self.evaluate_path(steps, source),

            ExprNode::Binary { op, lhs, rhs } => self.evaluate_binary(*op, lhs, rhs),

            ExprNode::Unary { op, operand } => {
                let value = self.evaluate(operand)?;
                match op {
                    UnaryOp::Negate => match value.as_f64() {
                        Some(n) => number_value(-n),
                        None => Err(ExprError::TypeError(format!(
                            "cannot negate {}",
                            kind_name(&value)
                        ))),
                    },
                    UnaryOp::Not => Ok(Value::Bool(!is_truthy(&value))),
                }
            }

            ExprNode::Function { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.evaluate(arg)?);
                }
                Ok(functions::call(name, &values)?)
            }

            ExprNode::Conditional {
                condition,
                then_branch,
                else_branch,
            } => {
                let cond = self.evaluate(condition)?;
                if is_truthy(&cond) {
                    self.evaluate(then_branch)
                } else {
                    self.evaluate(else_branch)
                }
            }
        }
    }

    /// Resolve a property path; any step that fails hands the path's source
    /// text to the null-substitution policy.
    fn evaluate_path(&self, steps: &[PathStep], source: &str) -> Result<Value, ExprError> {
        let mut iter = steps.iter();

        let mut current = match iter.next() {
            Some(PathStep::Name(name)) => match self.memory.get(name) {
                Some(value) => value,
                None => return self.substitute(source),
            },
            // The grammar roots every path at a name
            _ => return Err(ExprError::EvaluationError("path without a head".to_string())),
        };

        for step in iter {
            match step {
                PathStep::Name(name) => {
                    current = match current.as_object().and_then(|obj| obj.get(name)) {
                        Some(value) => value.clone(),
                        None => return self.substitute(source),
                    };
                }
                PathStep::Index(index_expr) => {
                    let index = self.evaluate(index_expr)?;
                    let element = index
                        .as_u64()
                        .and_then(|i| current.as_array().and_then(|arr| arr.get(i as usize)));
                    current = match element {
                        Some(value) => value.clone(),
                        None => return self.substitute(source),
                    };
                }
            }
        }

        Ok(current)
    }

    fn substitute(&self, path: &str) -> Result<Value, ExprError> {
        match self.options.null_substitution {
            Some(substitution) => Ok(substitution(path)),
            None => Err(ExprError::ReferenceError(path.to_string())),
        }
    }

    fn evaluate_binary(
        &self,
        op: BinaryOp,
        lhs: &ExprNode,
        rhs: &ExprNode,
    ) -> Result<Value, ExprError> {
        // Logical operators short-circuit on the left operand
        match op {
            BinaryOp::And => {
                let left = self.evaluate(lhs)?;
                if !is_truthy(&left) {
                    return Ok(Value::Bool(false));
                }
                let right = self.evaluate(rhs)?;
                return Ok(Value::Bool(is_truthy(&right)));
            }
            BinaryOp::Or => {
                let left = self.evaluate(lhs)?;
                if is_truthy(&left) {
                    return Ok(Value::Bool(true));
                }
                let right = self.evaluate(rhs)?;
                return Ok(Value::Bool(is_truthy(&right)));
            }
            _ => {}
        }

        let left = self.evaluate(lhs)?;
        let right = self.evaluate(rhs)?;

        match op {
            BinaryOp::Equal => Ok(Value::Bool(values_equal(&left, &right))),
            BinaryOp::NotEqual => Ok(Value::Bool(!values_equal(&left, &right))),

            BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => self.evaluate_ordering(op, &left, &right),

            BinaryOp::Add => match (&left, &right) {
                (Value::String(a), Value::String(b)) => {
                    Ok(Value::String(format!("{}{}", a, b)))
                }
                _ => self.evaluate_arithmetic(op, &left, &right),
            },

            BinaryOp::Subtract | BinaryOp::Multiply | BinaryOp::Divide | BinaryOp::Modulo => {
                self.evaluate_arithmetic(op, &left, &right)
            }

            BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
        }
    }

    fn evaluate_arithmetic(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
    ) -> Result<Value, ExprError> {
        let (a, b) = match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => (a, b),
            _ => {
                return Err(ExprError::TypeError(format!(
                    "arithmetic requires numbers, got {} and {}",
                    kind_name(left),
                    kind_name(right)
                )))
            }
        };
        let result = match op {
            BinaryOp::Add => a + b,
            BinaryOp::Subtract => a - b,
            BinaryOp::Multiply => a * b,
            BinaryOp::Divide => a / b,
            BinaryOp::Modulo => a % b,
            _ => unreachable!(),
        };
        number_value(result)
    }

    fn evaluate_ordering(
        &self,
        op: BinaryOp,
        left: &Value,
        right: &Value,
    ) -> Result<Value, ExprError> {
        let ordering = match (left, right) {
            (Value::Number(_), Value::Number(_)) => {
                let a = left.as_f64().unwrap_or(f64::NAN);
                let b = right.as_f64().unwrap_or(f64::NAN);
                a.partial_cmp(&b)
            }
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            _ => None,
        };
        let ordering = ordering.ok_or_else(|| {
            ExprError::TypeError(format!(
                "cannot order {} and {}",
                kind_name(left),
                kind_name(right)
            ))
        })?;
        let result = match op {
            BinaryOp::LessThan => ordering == std::cmp::Ordering::Less,
            BinaryOp::LessThanOrEqual => ordering != std::cmp::Ordering::Greater,
            BinaryOp::GreaterThan => ordering == std::cmp::Ordering::Greater,
            BinaryOp::GreaterThanOrEqual => ordering != std::cmp::Ordering::Less,
            _ => unreachable!(),
        };
        Ok(Value::Bool(result))
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn memory_from(value: Value) -> MapMemory {
        let mut memory = MapMemory::new();
        if let Value::Object(map) = &value {
            for (key, val) in map {
                memory.set(key.clone(), val.clone());
            }
        }
        memory.set("$data", value);
        memory
    }

    fn eval(expr: &str, data: Value) -> Result<Value, ExprError> {
        let memory = memory_from(data);
        let options = EvalOptions::with_substitution(&default_null_substitution);
        let ast = parse(expr).unwrap();
        Evaluator::new(&memory, &options).evaluate(&ast)
    }

    #[test]
    fn test_path_resolution() {
        let data = json!({"user": {"profile": {"name": "Bob"}}});
        assert_eq!(eval("user.profile.name", data).unwrap(), json!("Bob"));
    }

    #[test]
    fn test_indexed_path() {
        let data = json!({"items": [{"label": "first"}, {"label": "second"}]});
        assert_eq!(eval("items[1].label", data).unwrap(), json!("second"));
    }

    #[test]
    fn test_unresolved_path_substitutes_placeholder() {
        assert_eq!(
            eval("missing", json!({})).unwrap(),
            json!("${missing}")
        );
        assert_eq!(
            eval("a.b.c", json!({"a": {"b": {}}})).unwrap(),
            json!("${a.b.c}")
        );
        assert_eq!(
            eval("items[5]", json!({"items": [1]})).unwrap(),
            json!("${items[5]}")
        );
    }

    #[test]
    fn test_unresolved_path_without_substitution_is_an_error() {
        let memory = MapMemory::new();
        let options = EvalOptions::new();
        let ast = parse("missing").unwrap();
        let result = Evaluator::new(&memory, &options).evaluate(&ast);
        assert!(matches!(result, Err(ExprError::ReferenceError(_))));
    }

    #[test]
    fn test_arithmetic() {
        let data = json!({"price": 100, "quantity": 5});
        assert_eq!(eval("price * quantity", data.clone()).unwrap(), json!(500));
        assert_eq!(
            eval("(price + 10) * quantity", data.clone()).unwrap(),
            json!(550)
        );
        assert_eq!(eval("price / 8", data).unwrap(), json!(12.5));
    }

    #[test]
    fn test_arithmetic_type_error() {
        let data = json!({"name": "Alice"});
        assert!(matches!(
            eval("name * 2", data),
            Err(ExprError::TypeError(_))
        ));
    }

    #[test]
    fn test_comparisons() {
        let data = json!({"x": 1});
        assert_eq!(eval("x == 2", data.clone()).unwrap(), json!(false));
        assert_eq!(eval("x == 1", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("x < 2", data.clone()).unwrap(), json!(true));
        assert_eq!(eval("x >= 1", data).unwrap(), json!(true));
    }

    #[test]
    fn test_equality_across_number_encodings() {
        let data = json!({"n": 5});
        assert_eq!(eval("n == 5.0", data).unwrap(), json!(true));
    }

    #[test]
    fn test_logical_operators_short_circuit() {
        let data = json!({"age": 25});
        assert_eq!(eval("age >= 18 && age < 65", data.clone()).unwrap(), json!(true));
        // Right side would be a type error; && must not reach it
        assert_eq!(eval("false && missing * 2", data).unwrap(), json!(false));
    }

    #[test]
    fn test_string_concat() {
        let data = json!({"first": "Ada", "last": "Lovelace"});
        assert_eq!(
            eval("first + ' ' + last", data).unwrap(),
            json!("Ada Lovelace")
        );
    }

    #[test]
    fn test_conditional() {
        let data = json!({"score": 85});
        assert_eq!(
            eval("score >= 80 ? 'pass' : 'fail'", data).unwrap(),
            json!("pass")
        );
    }

    #[test]
    fn test_function_call() {
        let data = json!({"name": "alice"});
        assert_eq!(eval("toUpper(name)", data.clone()).unwrap(), json!("ALICE"));
        assert_eq!(eval("length(name)", data).unwrap(), json!(5));
    }

    #[test]
    fn test_unknown_function_is_an_error() {
        assert!(eval("nope(1)", json!({})).is_err());
    }

    #[test]
    fn test_truthiness() {
        assert!(is_truthy(&json!(true)));
        assert!(!is_truthy(&json!(false)));
        assert!(!is_truthy(&json!(null)));
        assert!(!is_truthy(&json!(0)));
        assert!(is_truthy(&json!(1)));
        assert!(!is_truthy(&json!("")));
        assert!(is_truthy(&json!("hello")));
        assert!(!is_truthy(&json!([])));
        assert!(is_truthy(&json!([1, 2, 3])));
        assert!(!is_truthy(&json!({})));
    }

    #[test]
    fn test_division_by_zero_is_an_error() {
        assert!(eval("1 / 0", json!({})).is_err());
    }
}

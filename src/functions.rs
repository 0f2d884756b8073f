// Built-in function prelude for binding expressions
// The slice of the card-template function set that bindings actually use.

use serde_json::Value;
use thiserror::Error;

/// Function errors
#[derive(Error, Debug)]
pub enum FunctionError {
    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Argument error: {0}")]
    ArgumentError(String),

    #[error("Type error: {0}")]
    TypeError(String),
}

/// Dispatch a function call by name
pub fn call(name: &str, args: &[Value]) -> Result<Value, FunctionError> {
    match name {
        "length" => length(one(name, args)?),
        "string" => string(one(name, args)?),
        "int" => int(one(name, args)?),
        "float" => float(one(name, args)?),
        "bool" => boolean(one(name, args)?),
        "toUpper" => to_upper(one(name, args)?),
        "toLower" => to_lower(one(name, args)?),
        _ => Err(FunctionError::UnknownFunction(name.to_string())),
    }
}

fn one<'a>(name: &str, args: &'a [Value]) -> Result<&'a Value, FunctionError> {
    match args {
        [value] => Ok(value),
        _ => Err(FunctionError::ArgumentError(format!(
            "{} expects 1 argument, got {}",
            name,
            args.len()
        ))),
    }
}

/// length() - character count of a string, element count of an array
fn length(value: &Value) -> Result<Value, FunctionError> {
    match value {
        Value::String(s) => Ok(Value::Number(s.chars().count().into())),
        Value::Array(arr) => Ok(Value::Number(arr.len().into())),
        other => Err(FunctionError::TypeError(format!(
            "length expects a string or array, got {}",
            other
        ))),
    }
}

/// string() - cast value to string
fn string(value: &Value) -> Result<Value, FunctionError> {
    match value {
        Value::String(s) => Ok(Value::String(s.clone())),
        other => Ok(Value::String(other.to_string())),
    }
}

/// int() - cast value to integer
fn int(value: &Value) -> Result<Value, FunctionError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(|f| serde_json::json!(f.trunc() as i64))
            .ok_or_else(|| FunctionError::TypeError("int expects a finite number".to_string())),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(|i| serde_json::json!(i))
            .map_err(|_| FunctionError::TypeError(format!("cannot convert '{}' to int", s))),
        other => Err(FunctionError::TypeError(format!(
            "int expects a number or string, got {}",
            other
        ))),
    }
}

/// float() - cast value to float
fn float(value: &Value) -> Result<Value, FunctionError> {
    match value {
        Value::Number(n) => Ok(Value::Number(n.clone())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .ok_or_else(|| FunctionError::TypeError(format!("cannot convert '{}' to float", s))),
        other => Err(FunctionError::TypeError(format!(
            "float expects a number or string, got {}",
            other
        ))),
    }
}

/// bool() - cast value to boolean
fn boolean(value: &Value) -> Result<Value, FunctionError> {
    match value {
        Value::Bool(b) => Ok(Value::Bool(*b)),
        Value::Number(n) => Ok(Value::Bool(n.as_f64().map(|f| f != 0.0).unwrap_or(false))),
        Value::String(s) => match s.as_str() {
            "true" => Ok(Value::Bool(true)),
            "false" => Ok(Value::Bool(false)),
            _ => Err(FunctionError::TypeError(format!(
                "cannot convert '{}' to bool",
                s
            ))),
        },
        other => Err(FunctionError::TypeError(format!(
            "bool expects a boolean, number or string, got {}",
            other
        ))),
    }
}

/// toUpper() - uppercase a string
fn to_upper(value: &Value) -> Result<Value, FunctionError> {
    match value {
        Value::String(s) => Ok(Value::String(s.to_uppercase())),
        other => Err(FunctionError::TypeError(format!(
            "toUpper expects a string, got {}",
            other
        ))),
    }
}

/// toLower() - lowercase a string
fn to_lower(value: &Value) -> Result<Value, FunctionError> {
    match value {
        Value::String(s) => Ok(Value::String(s.to_lowercase())),
        other => Err(FunctionError::TypeError(format!(
            "toLower expects a string, got {}",
            other
        ))),
    }
}

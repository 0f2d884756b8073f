// Data context and context stack
// A DataContext is one binding scope: the bound token, the shared root and
// the fan-out index. The stack's top is the scope ${...} expressions
// resolve against.

use std::rc::Rc;

use serde_json::Value;

use crate::evaluator::MemoryView;

/// One binding scope.
#[derive(Debug, Clone)]
pub struct DataContext {
    token: Value,
    root: Rc<Value>,
    is_array: bool,
    index: Option<usize>,
}

impl DataContext {
    /// Root scope for an expansion: parses `json_text` and binds the parsed
    /// value as both token and root.
    pub fn new_root(json_text: &str) -> Result<Self, serde_json::Error> {
        let token: Value = serde_json::from_str(json_text)?;
        let root = Rc::new(token.clone());
        Ok(Self::from_value(token, root))
    }

    /// Scope bound to JSON source text, sharing an existing root.
    pub fn parse_with_root(json_text: &str, root: Rc<Value>) -> Result<Self, serde_json::Error> {
        let token = serde_json::from_str(json_text)?;
        Ok(Self::from_value(token, root))
    }

    /// Scope bound to an already materialized value, sharing an existing root.
    pub fn from_value(token: Value, root: Rc<Value>) -> Self {
        let is_array = token.is_array();
        DataContext {
            token,
            root,
            is_array,
            index: None,
        }
    }

    /// Scope produced by a `$data` expression result: a string value is
    /// JSON source to parse, anything else binds directly.
    pub fn from_expression_value(
        value: Value,
        root: Rc<Value>,
    ) -> Result<Self, serde_json::Error> {
        match value {
            Value::String(text) => Self::parse_with_root(&text, root),
            other => Ok(Self::from_value(other, root)),
        }
    }

    /// Per-element scope for array fan-out. The caller iterates the array
    /// length, so the index is always in range.
    pub fn derive_at_index(&self, index: usize) -> Self {
        debug_assert!(self.is_array, "derive_at_index on a non-array scope");
        let token = self.token[index].clone();
        let is_array = token.is_array();
        DataContext {
            token,
            root: Rc::clone(&self.root),
            is_array,
            index: Some(index),
        }
    }

    pub fn token(&self) -> &Value {
        &self.token
    }

    pub fn root(&self) -> &Rc<Value> {
        &self.root
    }

    pub fn is_array(&self) -> bool {
        self.is_array
    }

    /// Fan-out index; present only on scopes made by `derive_at_index`
    pub fn index(&self) -> Option<usize> {
        self.index
    }

    pub fn array_len(&self) -> usize {
        self.token.as_array().map_or(0, |arr| arr.len())
    }
}

impl MemoryView for DataContext {
    fn get(&self, name: &str) -> Option<Value> {
        match name {
            "$data" => Some(self.token.clone()),
            "$root" => Some((*self.root).clone()),
            "$index" => self.index.map(|i| Value::from(i as u64)),
            _ => self
                .token
                .as_object()
                .and_then(|obj| obj.get(name))
                .cloned(),
        }
    }
}

/// LIFO stack of binding scopes. Every push during a subtree walk is
/// balanced by a pop before the walk returns to the parent node.
#[derive(Debug, Default)]
pub struct ContextStack {
    stack: Vec<DataContext>,
}

impl ContextStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, context: DataContext) {
        self.stack.push(context);
    }

    pub fn pop(&mut self) -> Option<DataContext> {
        self.stack.pop()
    }

    pub fn peek(&self) -> Option<&DataContext> {
        self.stack.last()
    }

    pub fn has_context(&self) -> bool {
        !self.stack.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_new_root() {
        let ctx = DataContext::new_root(r#"{"name":"Matt"}"#).unwrap();
        assert!(!ctx.is_array());
        assert_eq!(ctx.get("name"), Some(json!("Matt")));
        assert_eq!(ctx.get("$data"), Some(json!({"name":"Matt"})));
        assert_eq!(ctx.get("$root"), Some(json!({"name":"Matt"})));
        assert_eq!(ctx.get("$index"), None);
    }

    #[test]
    fn test_new_root_rejects_malformed_json() {
        assert!(DataContext::new_root("{not json").is_err());
    }

    #[test]
    fn test_array_fan_out_scope() {
        let ctx = DataContext::new_root(r#"[{"n":"A"},{"n":"B"}]"#).unwrap();
        assert!(ctx.is_array());
        assert_eq!(ctx.array_len(), 2);

        let second = ctx.derive_at_index(1);
        assert_eq!(second.get("n"), Some(json!("B")));
        assert_eq!(second.get("$index"), Some(json!(1)));
        // root is shared, not rebound
        assert_eq!(second.get("$root"), Some(json!([{"n":"A"},{"n":"B"}])));
    }

    #[test]
    fn test_non_object_token_has_no_properties() {
        let root = Rc::new(json!(5));
        let ctx = DataContext::from_value(json!(5), root);
        assert_eq!(ctx.get("anything"), None);
        assert_eq!(ctx.get("$data"), Some(json!(5)));
    }

    #[test]
    fn test_expression_value_binding() {
        let root = Rc::new(json!({}));
        // string results are JSON source
        let ctx =
            DataContext::from_expression_value(json!("{\"a\":1}"), Rc::clone(&root)).unwrap();
        assert_eq!(ctx.get("a"), Some(json!(1)));

        // non-string results bind directly
        let ctx = DataContext::from_expression_value(json!([1, 2]), Rc::clone(&root)).unwrap();
        assert!(ctx.is_array());

        // a string that is not JSON is an error the caller swallows
        assert!(DataContext::from_expression_value(json!("${people}"), root).is_err());
    }

    #[test]
    fn test_stack_discipline() {
        let mut stack = ContextStack::new();
        assert!(!stack.has_context());
        assert!(stack.peek().is_none());

        stack.push(DataContext::new_root("{}").unwrap());
        assert!(stack.has_context());
        assert_eq!(stack.depth(), 1);

        stack.pop();
        assert_eq!(stack.depth(), 0);
    }
}

// Template visitor
// Walks the template CST and emits the expanded output string, consulting
// the context stack for scope and the expression engine for placeholders.

use std::rc::Rc;

use log::trace;
use serde_json::Value;

use crate::context::{ContextStack, DataContext};
use crate::evaluator::{is_truthy, EvalOptions, Evaluator, ExprError, NullSubstitution};
use crate::parser;
use crate::parser::ExprParseError;
use crate::template::{Pair, Segment, TemplateNode, TemplateString};

/// Buffer produced by visiting one subtree. A dropped subtree is omitted
/// from its parent's output entirely, together with its delimiter.
#[derive(Debug)]
pub struct Expansion {
    pub text: String,
    pub dropped: bool,
}

impl Expansion {
    fn text(text: String) -> Self {
        Expansion {
            text,
            dropped: false,
        }
    }

    fn dropped() -> Self {
        Expansion {
            text: String::new(),
            dropped: true,
        }
    }
}

/// Outcome of a `$when` pair
#[derive(Debug, Clone, Copy, PartialEq)]
enum WhenOutcome {
    EvaluatedTrue,
    EvaluatedFalse,
    /// Seen against an array scope that fan-out has not indexed yet; the
    /// object loop re-evaluates the predicate inside each iteration
    Deferred,
}

/// Why an expression did not produce a value. Every variant is swallowed at
/// its call site: the placeholder text survives into the output instead.
#[derive(Debug)]
enum ExprFailure {
    NoContext,
    Parse(ExprParseError),
    Eval(ExprError),
}

/// The expansion engine: one instance per `expand` call, owning the
/// context stack for that call.
pub struct TemplateVisitor<'a> {
    stack: ContextStack,
    null_substitution: &'a NullSubstitution,
}

impl<'a> TemplateVisitor<'a> {
    pub fn new(root: Option<DataContext>, null_substitution: &'a NullSubstitution) -> Self {
        let mut stack = ContextStack::new();
        if let Some(root) = root {
            stack.push(root);
        }
        TemplateVisitor {
            stack,
            null_substitution,
        }
    }

    /// Current scope depth; the stack must return to its entry depth after
    /// every expansion.
    pub fn depth(&self) -> usize {
        self.stack.depth()
    }

    pub fn expand(&mut self, node: &TemplateNode) -> Expansion {
        self.visit_value(node)
    }

    fn visit_value(&mut self, node: &TemplateNode) -> Expansion {
        match node {
            TemplateNode::Object(pairs) => self.visit_object(pairs),
            TemplateNode::Array(values) => self.visit_array(values),
            TemplateNode::Literal(raw) => Expansion::text(raw.clone()),
            TemplateNode::StringValue(s) => Expansion::text(self.visit_string(s)),
            TemplateNode::RootExpression(body) => {
                Expansion::text(self.expand_expression(body, false))
            }
            TemplateNode::RawText(text) => Expansion::text(text.clone()),
        }
    }

    /// Objects carry the binding directives. The first `$data` pair (if
    /// any) rebinds scope before the siblings are visited; an array-typed
    /// binding repeats the object once per element; `$when` decides at the
    /// end of each iteration whether the iteration is kept.
    fn visit_object(&mut self, pairs: &[Pair]) -> Expansion {
        let data_index = pairs.iter().position(|p| p.is_data());
        let bound = data_index.and_then(|i| self.bind_data(&pairs[i].value));
        let pushed = bound.is_some();
        if let Some(scope) = bound {
            trace!("push $data scope (array: {})", scope.is_array());
            self.stack.push(scope);
        }

        let fan_out = pushed && self.stack.peek().is_some_and(|s| s.is_array());
        let repeats = if fan_out {
            self.stack.peek().map_or(0, |s| s.array_len())
        } else {
            1
        };
        if fan_out {
            trace!("fan-out over {} elements", repeats);
        }

        let mut kept: Vec<String> = Vec::new();
        for i in 0..repeats {
            if fan_out {
                let element = match self.stack.peek() {
                    Some(scope) => scope.derive_at_index(i),
                    None => break,
                };
                self.stack.push(element);
            }

            let mut buffer = String::from("{");
            let mut emitted = false;
            let mut when = None;

            for (j, pair) in pairs.iter().enumerate() {
                if Some(j) == data_index {
                    continue;
                }
                if pair.is_when() {
                    when = Some(self.visit_when(&pair.value));
                    continue;
                }
                let value = self.visit_value(&pair.value);
                if value.dropped {
                    trace!("pair '{}' dropped with its value", pair.key);
                    continue;
                }
                if emitted {
                    buffer.push(',');
                }
                buffer.push('"');
                buffer.push_str(&pair.key);
                buffer.push_str("\":");
                buffer.push_str(&value.text);
                emitted = true;
            }
            buffer.push('}');

            if fan_out {
                self.stack.pop();
            }

            match when {
                Some(WhenOutcome::EvaluatedFalse) => {
                    trace!("iteration {} dropped by $when", i);
                }
                _ => kept.push(buffer),
            }
        }

        if pushed {
            self.stack.pop();
        }

        if kept.is_empty() {
            Expansion::dropped()
        } else {
            Expansion::text(kept.join(","))
        }
    }

    fn visit_array(&mut self, values: &[TemplateNode]) -> Expansion {
        let mut parts: Vec<String> = Vec::new();
        for value in values {
            let expansion = self.visit_value(value);
            if expansion.dropped {
                continue;
            }
            parts.push(expansion.text);
        }
        Expansion::text(format!("[{}]", parts.join(",")))
    }

    fn visit_string(&mut self, s: &TemplateString) -> String {
        // A string that is exactly one placeholder replaces its whole slot:
        // string results keep quotes, any other kind is inlined bare
        if let Some(body) = s.whole_expression() {
            return match self.evaluate_expression(body) {
                Ok(value) => render_value(&value, true),
                Err(failure) => {
                    trace!("placeholder kept verbatim: {:?}", failure);
                    format!("\"{}\"", s.raw)
                }
            };
        }

        // Partially templated: the surrounding quotes stay; each segment
        // is stringified in place without added quotes
        let mut out = String::from("\"");
        for segment in &s.segments {
            match segment {
                Segment::Text(text) => out.push_str(text),
                Segment::Expression(body) => {
                    out.push_str(&self.expand_expression(body, false))
                }
            }
        }
        out.push('"');
        out
    }

    /// Evaluate a `$when` predicate against the current scope
    fn visit_when(&mut self, value: &TemplateNode) -> WhenOutcome {
        if let Some(scope) = self.stack.peek() {
            if scope.is_array() && scope.index().is_none() {
                return WhenOutcome::Deferred;
            }
        }

        let body = match value {
            TemplateNode::StringValue(s) => match s.whole_expression() {
                Some(body) => body.to_string(),
                None => return WhenOutcome::EvaluatedTrue,
            },
            _ => return WhenOutcome::EvaluatedTrue,
        };

        match self.evaluate_expression(&body) {
            Ok(value) => {
                if is_truthy(&value) {
                    WhenOutcome::EvaluatedTrue
                } else {
                    WhenOutcome::EvaluatedFalse
                }
            }
            Err(failure) => {
                // a predicate that cannot be evaluated keeps its object
                trace!("swallowed $when failure: {:?}", failure);
                WhenOutcome::EvaluatedTrue
            }
        }
    }

    /// Build the scope a `$data` pair establishes, or None when the binding
    /// fails (the failure is swallowed and the parent scope stays active).
    fn bind_data(&mut self, value: &TemplateNode) -> Option<DataContext> {
        match value {
            TemplateNode::Object(_) | TemplateNode::Array(_) => {
                let text = value.source_text();
                let result = match self.stack.peek() {
                    Some(parent) => {
                        DataContext::parse_with_root(&text, Rc::clone(parent.root()))
                    }
                    None => DataContext::new_root(&text),
                };
                match result {
                    Ok(scope) => Some(scope),
                    Err(err) => {
                        trace!("swallowed $data literal failure: {}", err);
                        None
                    }
                }
            }
            TemplateNode::StringValue(s) => {
                let body = match s.whole_expression() {
                    Some(body) => body.to_string(),
                    None => s.raw.clone(),
                };
                self.bind_data_expression(&body)
            }
            _ => None,
        }
    }

    fn bind_data_expression(&mut self, body: &str) -> Option<DataContext> {
        let parent_root = Rc::clone(self.stack.peek()?.root());
        let value = match self.evaluate_expression(body) {
            Ok(value) => value,
            Err(failure) => {
                trace!("swallowed $data expression failure: {:?}", failure);
                return None;
            }
        };
        match DataContext::from_expression_value(value, parent_root) {
            Ok(scope) => Some(scope),
            Err(err) => {
                trace!("swallowed $data payload failure: {}", err);
                None
            }
        }
    }

    /// Parse and evaluate a placeholder body against the current scope
    fn evaluate_expression(&self, body: &str) -> Result<Value, ExprFailure> {
        let scope = self.stack.peek().ok_or(ExprFailure::NoContext)?;
        let ast = parser::parse(body).map_err(ExprFailure::Parse)?;
        let options = EvalOptions::with_substitution(self.null_substitution);
        Evaluator::new(scope, &options)
            .evaluate(&ast)
            .map_err(ExprFailure::Eval)
    }

    /// Expand one placeholder body to output text. Failures re-emit the
    /// placeholder itself.
    fn expand_expression(&self, body: &str, is_templated_string: bool) -> String {
        match self.evaluate_expression(body) {
            Ok(value) => render_value(&value, is_templated_string),
            Err(failure) => {
                trace!("placeholder kept verbatim: {:?}", failure);
                format!("${{{}}}", body)
            }
        }
    }
}

/// Stringify an expression result for output. String values keep their
/// quotes only in whole-value slots; everything else is JSON text.
fn render_value(value: &Value, is_templated_string: bool) -> String {
    match value {
        Value::String(s) if !is_templated_string => s.clone(),
        other => serde_json::to_string(other).unwrap_or_default(),
    }
}

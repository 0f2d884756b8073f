// Expression AST definitions
// The binding language inside ${...} placeholders parses into these nodes.

use serde::{Deserialize, Serialize};

/// AST node types for the binding expression language.
///
/// Expressions are the text between `${` and `}` in a template: property
/// paths against the current data context (`name`, `order.total`,
/// `items[0].label`, `$root.title`, `$index`), literals, arithmetic,
/// comparisons, logical connectives, a conditional, and calls into the
/// built-in function prelude.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExprNode {
    /// String literal
    String(String),

    /// Number literal
    Number(f64),

    /// Boolean literal
    Boolean(bool),

    /// Null literal
    Null,

    /// Property path rooted at a name (`a.b[0].c`).
    ///
    /// `source` is the path's original text, kept for the null-substitution
    /// policy: an unresolvable path is reported by its source text, not by
    /// a reconstruction of it.
    Path { steps: Vec<PathStep>, source: String },

    /// Binary operation
    Binary {
        op: BinaryOp,
        lhs: Box<ExprNode>,
        rhs: Box<ExprNode>,
    },

    /// Unary operation
    Unary {
        op: UnaryOp,
        operand: Box<ExprNode>,
    },

    /// Call into the built-in function prelude
    Function { name: String, args: Vec<ExprNode> },

    /// Conditional expression (? :)
    Conditional {
        condition: Box<ExprNode>,
        then_branch: Box<ExprNode>,
        else_branch: Box<ExprNode>,
    },
}

/// One step of a property path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PathStep {
    /// Field access by name. The leading step may be a reserved name
    /// (`$data`, `$root`, `$index`) resolved through the memory view.
    Name(String),

    /// Bracket indexing; the index expression is evaluated at runtime.
    Index(Box<ExprNode>),
}

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    // Arithmetic
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,

    // Comparison
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,

    // Logical
    And,
    Or,
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    /// Negation (-)
    Negate,

    /// Logical NOT (!)
    Not,
}

impl ExprNode {
    /// Create a string literal node
    pub fn string(s: impl Into<String>) -> Self {
        ExprNode::String(s.into())
    }

    /// Create a number literal node
    pub fn number(n: f64) -> Self {
        ExprNode::Number(n)
    }

    /// Create a boolean literal node
    pub fn boolean(b: bool) -> Self {
        ExprNode::Boolean(b)
    }

    /// Create a single-name path node
    pub fn name(n: impl Into<String>) -> Self {
        let n = n.into();
        ExprNode::Path {
            source: n.clone(),
            steps: vec![PathStep::Name(n)],
        }
    }
}

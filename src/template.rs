// Template CST and parser
// Lexes JSON-shaped template text and parses it into the node kinds the
// expander walks. Token text is kept verbatim so braces, delimiters and
// literals re-emit exactly as written; whitespace between tokens is not
// preserved.

use thiserror::Error;

/// Key of the pair that rebinds the data context for its object.
pub const DATA_KEY: &str = "$data";

/// Key of the pair whose predicate decides whether its object is kept.
pub const WHEN_KEY: &str = "$when";

/// Template parse errors. These never escape compilation: a subtree that
/// fails to parse degrades to a `RawText` node holding its source.
#[derive(Error, Debug)]
pub enum TemplateParseError {
    #[error("Unexpected character: {0}")]
    UnexpectedCharacter(char),

    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("Unexpected end of template")]
    UnexpectedEnd,

    #[error("Unclosed string literal")]
    UnclosedString,
}

/// Template CST node
#[derive(Debug, Clone, PartialEq)]
pub enum TemplateNode {
    /// `{` pair (`,` pair)* `}`
    Object(Vec<Pair>),

    /// `[` value (`,` value)* `]`
    Array(Vec<TemplateNode>),

    /// Number, boolean or null token, kept as raw text
    Literal(String),

    /// String literal, split into text and `${...}` segments
    StringValue(TemplateString),

    /// A whole-document `${...}` outside any string
    RootExpression(String),

    /// Subtree that failed to parse; emitted verbatim
    RawText(String),
}

/// key `:` value
#[derive(Debug, Clone, PartialEq)]
pub struct Pair {
    /// Key text between the quotes, escapes untouched
    pub key: String,
    pub value: TemplateNode,
}

impl Pair {
    pub fn is_data(&self) -> bool {
        self.key == DATA_KEY
    }

    pub fn is_when(&self) -> bool {
        self.key == WHEN_KEY
    }
}

/// A string literal's content: the raw inner text plus its segmentation
/// into literal runs and `${...}` expression bodies.
#[derive(Debug, Clone, PartialEq)]
pub struct TemplateString {
    pub raw: String,
    pub segments: Vec<Segment>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Segment {
    /// Literal run, escapes untouched
    Text(String),

    /// Body of a `${...}` placeholder (the text between the delimiters)
    Expression(String),
}

impl TemplateString {
    pub fn new(raw: String) -> Self {
        let segments = split_segments(&raw);
        TemplateString { raw, segments }
    }

    /// The expression body when the entire string is a single `${...}`
    pub fn whole_expression(&self) -> Option<&str> {
        match self.segments.as_slice() {
            [Segment::Expression(body)] => Some(body),
            _ => None,
        }
    }
}

/// Split a string literal's inner text into literal and expression segments.
/// `${` opens a placeholder; braces nest inside the body. An unterminated
/// placeholder stays literal text.
fn split_segments(raw: &str) -> Vec<Segment> {
    let chars: Vec<char> = raw.chars().collect();
    let mut segments = Vec::new();
    let mut text = String::new();
    let mut i = 0;

    while i < chars.len() {
        if chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            if let Some(close) = find_matching_brace(&chars, i + 2) {
                if !text.is_empty() {
                    segments.push(Segment::Text(std::mem::take(&mut text)));
                }
                let body: String = chars[i + 2..close].iter().collect();
                segments.push(Segment::Expression(body));
                i = close + 1;
                continue;
            }
        }
        text.push(chars[i]);
        i += 1;
    }

    if !text.is_empty() || segments.is_empty() {
        segments.push(Segment::Text(text));
    }
    segments
}

/// Index of the `}` that closes a placeholder body starting at `start`
fn find_matching_brace(chars: &[char], start: usize) -> Option<usize> {
    let mut depth = 1;
    let mut i = start;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

impl TemplateNode {
    /// Reconstruct the node's source text from its tokens (compact form).
    /// Used to hand a `$data` object or array literal to the JSON parser.
    pub fn source_text(&self) -> String {
        match self {
            TemplateNode::Object(pairs) => {
                let body: Vec<String> = pairs
                    .iter()
                    .map(|p| format!("\"{}\":{}", p.key, p.value.source_text()))
                    .collect();
                format!("{{{}}}", body.join(","))
            }
            TemplateNode::Array(values) => {
                let body: Vec<String> =
                    values.iter().map(|v| v.source_text()).collect();
                format!("[{}]", body.join(","))
            }
            TemplateNode::Literal(raw) => raw.clone(),
            TemplateNode::StringValue(s) => format!("\"{}\"", s.raw),
            TemplateNode::RootExpression(body) => format!("${{{}}}", body),
            TemplateNode::RawText(text) => text.clone(),
        }
    }
}

/// Template tokens; each carries the text it re-emits
#[derive(Debug, Clone, PartialEq)]
enum Tok {
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Colon,
    Comma,
    /// String literal; inner text with escapes untouched
    Str(String),
    /// Number, boolean, null or other bare word, raw text
    Scalar(String),
}

impl Tok {
    fn text(&self) -> String {
        match self {
            Tok::LBrace => "{".to_string(),
            Tok::RBrace => "}".to_string(),
            Tok::LBracket => "[".to_string(),
            Tok::RBracket => "]".to_string(),
            Tok::Colon => ":".to_string(),
            Tok::Comma => ",".to_string(),
            Tok::Str(inner) => format!("\"{}\"", inner),
            Tok::Scalar(raw) => raw.clone(),
        }
    }
}

fn lex(input: &str) -> Result<Vec<Tok>, TemplateParseError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '{' => {
                tokens.push(Tok::LBrace);
                i += 1;
            }
            '}' => {
                tokens.push(Tok::RBrace);
                i += 1;
            }
            '[' => {
                tokens.push(Tok::LBracket);
                i += 1;
            }
            ']' => {
                tokens.push(Tok::RBracket);
                i += 1;
            }
            ':' => {
                tokens.push(Tok::Colon);
                i += 1;
            }
            ',' => {
                tokens.push(Tok::Comma);
                i += 1;
            }
            '"' => {
                let mut inner = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return Err(TemplateParseError::UnclosedString),
                        Some('"') => {
                            i += 1;
                            break;
                        }
                        Some('\\') => {
                            inner.push('\\');
                            if let Some(&escaped) = chars.get(i + 1) {
                                inner.push(escaped);
                                i += 2;
                            } else {
                                return Err(TemplateParseError::UnclosedString);
                            }
                        }
                        Some(&c) => {
                            inner.push(c);
                            i += 1;
                        }
                    }
                }
                tokens.push(Tok::Str(inner));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let start = i;
                i += 1;
                while matches!(
                    chars.get(i),
                    Some(c) if c.is_ascii_digit() || matches!(*c, '.' | 'e' | 'E' | '+' | '-')
                ) {
                    i += 1;
                }
                tokens.push(Tok::Scalar(chars[start..i].iter().collect()));
            }
            c if c.is_alphabetic() => {
                let start = i;
                while matches!(chars.get(i), Some(c) if c.is_alphanumeric() || *c == '_') {
                    i += 1;
                }
                tokens.push(Tok::Scalar(chars[start..i].iter().collect()));
            }
            other => return Err(TemplateParseError::UnexpectedCharacter(other)),
        }
    }

    Ok(tokens)
}

/// Recursive-descent parser over the token stream.
///
/// Recovery is per subtree: when an object or array fails to parse, the
/// tokens from its opening delimiter to its matching close are re-joined
/// into a `RawText` node and the walk continues after it.
struct TemplateParser {
    tokens: Vec<Tok>,
    pos: usize,
}

impl TemplateParser {
    fn peek(&self) -> Option<&Tok> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Tok> {
        let tok = self.tokens.get(self.pos).cloned();
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn parse_value(&mut self) -> Result<TemplateNode, TemplateParseError> {
        let start = self.pos;
        match self.peek() {
            Some(Tok::LBrace) => match self.parse_object() {
                Ok(node) => Ok(node),
                Err(_) => Ok(self.recover(start)),
            },
            Some(Tok::LBracket) => match self.parse_array() {
                Ok(node) => Ok(node),
                Err(_) => Ok(self.recover(start)),
            },
            Some(Tok::Str(_)) => {
                let inner = match self.next() {
                    Some(Tok::Str(inner)) => inner,
                    _ => unreachable!(),
                };
                Ok(TemplateNode::StringValue(TemplateString::new(inner)))
            }
            Some(Tok::Scalar(_)) => {
                let raw = match self.next() {
                    Some(Tok::Scalar(raw)) => raw,
                    _ => unreachable!(),
                };
                Ok(TemplateNode::Literal(raw))
            }
            Some(other) => Err(TemplateParseError::UnexpectedToken(other.text())),
            None => Err(TemplateParseError::UnexpectedEnd),
        }
    }

    fn parse_object(&mut self) -> Result<TemplateNode, TemplateParseError> {
        self.next(); // consume '{'
        let mut pairs = Vec::new();

        if self.peek() == Some(&Tok::RBrace) {
            self.next();
            return Ok(TemplateNode::Object(pairs));
        }

        loop {
            let key = match self.next() {
                Some(Tok::Str(key)) => key,
                Some(other) => return Err(TemplateParseError::UnexpectedToken(other.text())),
                None => return Err(TemplateParseError::UnexpectedEnd),
            };
            match self.next() {
                Some(Tok::Colon) => {}
                Some(other) => return Err(TemplateParseError::UnexpectedToken(other.text())),
                None => return Err(TemplateParseError::UnexpectedEnd),
            }
            let value = self.parse_value()?;
            pairs.push(Pair { key, value });

            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RBrace) => break,
                Some(other) => return Err(TemplateParseError::UnexpectedToken(other.text())),
                None => return Err(TemplateParseError::UnexpectedEnd),
            }
        }

        Ok(TemplateNode::Object(pairs))
    }

    fn parse_array(&mut self) -> Result<TemplateNode, TemplateParseError> {
        self.next(); // consume '['
        let mut values = Vec::new();

        if self.peek() == Some(&Tok::RBracket) {
            self.next();
            return Ok(TemplateNode::Array(values));
        }

        loop {
            values.push(self.parse_value()?);
            match self.next() {
                Some(Tok::Comma) => continue,
                Some(Tok::RBracket) => break,
                Some(other) => return Err(TemplateParseError::UnexpectedToken(other.text())),
                None => return Err(TemplateParseError::UnexpectedEnd),
            }
        }

        Ok(TemplateNode::Array(values))
    }

    /// Re-consume one balanced subtree starting at `start` and join its
    /// token text into a `RawText` node.
    fn recover(&mut self, start: usize) -> TemplateNode {
        self.pos = start;
        let mut text = String::new();
        let mut depth = 0usize;

        while let Some(tok) = self.next() {
            text.push_str(&tok.text());
            match tok {
                Tok::LBrace | Tok::LBracket => depth += 1,
                Tok::RBrace | Tok::RBracket => depth = depth.saturating_sub(1),
                _ => {}
            }
            if depth == 0 {
                break;
            }
        }

        TemplateNode::RawText(text)
    }
}

/// Parse template text into a CST. Never fails: text that cannot be parsed
/// at all becomes a single `RawText` node holding the input verbatim.
pub fn compile_template(text: &str) -> TemplateNode {
    // A document that is one ${...} placeholder outside any string
    let trimmed = text.trim();
    if let Some(rest) = trimmed.strip_prefix("${") {
        let chars: Vec<char> = rest.chars().collect();
        if let Some(close) = find_matching_brace(&chars, 0) {
            if close == chars.len() - 1 {
                let body: String = chars[..close].iter().collect();
                return TemplateNode::RootExpression(body);
            }
        }
    }

    let tokens = match lex(text) {
        Ok(tokens) => tokens,
        Err(_) => return TemplateNode::RawText(text.to_string()),
    };

    let mut parser = TemplateParser { tokens, pos: 0 };
    match parser.parse_value() {
        Ok(node) if parser.peek().is_none() => node,
        _ => TemplateNode::RawText(text.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_object() {
        let node = compile_template(r#"{"type":"TextBlock","text":"hi"}"#);
        match node {
            TemplateNode::Object(pairs) => {
                assert_eq!(pairs.len(), 2);
                assert_eq!(pairs[0].key, "type");
                assert!(matches!(pairs[1].value, TemplateNode::StringValue(_)));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_compile_array_and_literals() {
        let node = compile_template(r#"[1, 2.50, true, null, "x"]"#);
        match node {
            TemplateNode::Array(values) => {
                assert_eq!(values.len(), 5);
                assert_eq!(values[0], TemplateNode::Literal("1".to_string()));
                // literal text survives untouched
                assert_eq!(values[1], TemplateNode::Literal("2.50".to_string()));
                assert_eq!(values[3], TemplateNode::Literal("null".to_string()));
            }
            other => panic!("expected array, got {:?}", other),
        }
    }

    #[test]
    fn test_reserved_pairs() {
        let node = compile_template(r#"{"$data":"${people}","$when":"${x}"}"#);
        match node {
            TemplateNode::Object(pairs) => {
                assert!(pairs[0].is_data());
                assert!(pairs[1].is_when());
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_string_segments() {
        let s = TemplateString::new("Hello ${name}, bye".to_string());
        assert_eq!(
            s.segments,
            vec![
                Segment::Text("Hello ".to_string()),
                Segment::Expression("name".to_string()),
                Segment::Text(", bye".to_string()),
            ]
        );
        assert!(s.whole_expression().is_none());

        let whole = TemplateString::new("${order.total}".to_string());
        assert_eq!(whole.whole_expression(), Some("order.total"));
    }

    #[test]
    fn test_unterminated_placeholder_stays_text() {
        let s = TemplateString::new("oops ${name".to_string());
        assert_eq!(s.segments, vec![Segment::Text("oops ${name".to_string())]);
    }

    #[test]
    fn test_root_expression() {
        let node = compile_template("${title}");
        assert_eq!(node, TemplateNode::RootExpression("title".to_string()));

        let node = compile_template("  ${a.b}  ");
        assert_eq!(node, TemplateNode::RootExpression("a.b".to_string()));
    }

    #[test]
    fn test_subtree_recovery() {
        // inner object is missing a colon; it degrades to raw text while
        // the rest of the document still parses
        let node = compile_template(r#"{"good":1,"bad":{"a" 5},"tail":2}"#);
        match node {
            TemplateNode::Object(pairs) => {
                assert_eq!(pairs.len(), 3);
                assert_eq!(pairs[1].value, TemplateNode::RawText("{\"a\"5}".to_string()));
                assert_eq!(pairs[2].value, TemplateNode::Literal("2".to_string()));
            }
            other => panic!("expected object, got {:?}", other),
        }
    }

    #[test]
    fn test_unparsable_document_is_raw() {
        let node = compile_template("not json @ all");
        assert_eq!(node, TemplateNode::RawText("not json @ all".to_string()));
    }

    #[test]
    fn test_source_text_roundtrip() {
        let text = r#"{"a":[1,true],"b":"x"}"#;
        assert_eq!(compile_template(text).source_text(), text);
    }

    #[test]
    fn test_escaped_quote_in_string() {
        let node = compile_template(r#"{"a":"say \"hi\""}"#);
        match node {
            TemplateNode::Object(pairs) => {
                assert_eq!(pairs[0].value.source_text(), r#""say \"hi\"""#);
            }
            other => panic!("expected object, got {:?}", other),
        }
    }
}

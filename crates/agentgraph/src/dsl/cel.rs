//! A hand-rolled recursive-descent parser and evaluator for the CEL subset
//! used by conditional edges and `builtin.transform`/`builtin.end`
//! expressions.
//!
//! Grammar (lowest to highest precedence):
//!
//! ```text
//! expr    := or
//! or      := and ("||" and)*
//! and     := eq ("&&" eq)*
//! eq      := unary (("==" | "!=") unary)?
//! unary   := "!" unary | primary
//! primary := "true" | "false" | "null" | number | string
//!          | path | "(" expr ")"
//! path    := ident ("." ident)*
//! ```
//!
//! No function calls, arithmetic, or loops: this is deliberately not a full
//! CEL implementation, only the fragment routing and transform expressions
//! actually need. No crate in the corpus implements a CEL subset, so this
//! module is written from scratch rather than adapted from the teacher.

use serde_json::Value;
use std::collections::HashMap;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExprError {
    #[error("expression_error: unexpected end of input")]
    UnexpectedEof,
    #[error("expression_error: unexpected token `{0}`")]
    UnexpectedToken(String),
    #[error("expression_error: unterminated string literal")]
    UnterminatedString,
    #[error("expression_error: trailing input after expression: `{0}`")]
    TrailingInput(String),
}

/// A compiled expression, ready for repeated evaluation.
#[derive(Debug, Clone)]
pub struct Expr(Node);

#[derive(Debug, Clone)]
enum Node {
    Lit(Value),
    Path(Vec<String>),
    Not(Box<Node>),
    And(Box<Node>, Box<Node>),
    Or(Box<Node>, Box<Node>),
    Eq(Box<Node>, Box<Node>),
    Ne(Box<Node>, Box<Node>),
}

pub fn compile(src: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(src)?;
    let mut parser = Parser { tokens, pos: 0 };
    let node = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::TrailingInput(
            parser.tokens[parser.pos..].join(" "),
        ));
    }
    Ok(Expr(node))
}

impl Expr {
    /// Evaluate against a root object whose top-level keys are namespaces
    /// (`state`, `input`), per the DSL's field-path convention.
    pub fn eval(&self, root: &HashMap<String, Value>) -> Value {
        eval_node(&self.0, root)
    }

    /// Evaluate and coerce to bool using the DSL's truthiness rule: `false`,
    /// `null`, `0`, `""`, and missing paths are falsy; everything else
    /// (including non-empty strings/objects/arrays) is truthy.
    pub fn eval_bool(&self, root: &HashMap<String, Value>) -> bool {
        is_truthy(&self.eval(root))
    }

    /// Whether this expression's tree contains a field path rooted at
    /// `namespace.field` (e.g. `input.output_parsed`), walked structurally
    /// rather than matched against the expression's source text.
    pub fn references_field(&self, namespace: &str, field: &str) -> bool {
        node_references_field(&self.0, namespace, field)
    }

    /// If this expression is exactly `<path> == <literal>` (in either
    /// operand order), returns the path's segments and the literal — the
    /// shape codegen collapses a conditional edge's arms into a `match`
    /// when every arm shares it.
    pub fn as_single_field_eq(&self) -> Option<(&[String], &Value)> {
        match &self.0 {
            Node::Eq(a, b) => match (a.as_ref(), b.as_ref()) {
                (Node::Path(p), Node::Lit(v)) => Some((p.as_slice(), v)),
                (Node::Lit(v), Node::Path(p)) => Some((p.as_slice(), v)),
                _ => None,
            },
            _ => None,
        }
    }

    /// Renders this expression as a standalone Rust expression evaluating
    /// to a `serde_json::Value`, for use in generated code. `state` and
    /// `input_output_parsed`/`input_output_raw` are the local bindings the
    /// generated function is expected to provide; see `codegen::render_program`.
    pub fn to_rust_expr(&self) -> String {
        node_to_rust_expr(&self.0)
    }
}

fn node_to_rust_expr(node: &Node) -> String {
    match node {
        Node::Lit(v) => format!(
            "serde_json::from_str::<serde_json::Value>({:?}).unwrap()",
            v.to_string()
        ),
        Node::Path(segments) => path_to_rust_expr(segments),
        Node::Not(inner) => format!("serde_json::Value::Bool(!is_truthy(&{}))", node_to_rust_expr(inner)),
        Node::And(a, b) => format!(
            "serde_json::Value::Bool(is_truthy(&{}) && is_truthy(&{}))",
            node_to_rust_expr(a),
            node_to_rust_expr(b)
        ),
        Node::Or(a, b) => format!(
            "serde_json::Value::Bool(is_truthy(&{}) || is_truthy(&{}))",
            node_to_rust_expr(a),
            node_to_rust_expr(b)
        ),
        Node::Eq(a, b) => format!(
            "serde_json::Value::Bool({} == {})",
            node_to_rust_expr(a),
            node_to_rust_expr(b)
        ),
        Node::Ne(a, b) => format!(
            "serde_json::Value::Bool({} != {})",
            node_to_rust_expr(a),
            node_to_rust_expr(b)
        ),
    }
}

/// Renders a field path to a Rust expression. `state.a.b` walks the `state`
/// binding; `input.output_parsed.a` / `input.output_raw` walk the
/// per-routing-function `input_output_parsed`/`input_output_raw` bindings
/// codegen provides (see `codegen::render_routing_function`).
fn path_to_rust_expr(segments: &[String]) -> String {
    let (root, rest): (&str, &[String]) = match segments {
        [head, tail @ ..] if head == "state" => ("state", tail),
        [head, tail @ ..] if head == "input" => match tail {
            [second, more @ ..] if second == "output_parsed" => ("input_output_parsed", more),
            [second, more @ ..] if second == "output_raw" => ("input_output_raw", more),
            _ => return "serde_json::Value::Null".to_string(),
        },
        // Unknown namespace: resolve to null rather than a Rust compile
        // error, mirroring the interpreter's `resolve_path` fallback.
        _ => return "serde_json::Value::Null".to_string(),
    };
    chain_gets(root, rest)
}

fn chain_gets(root: &str, segments: &[String]) -> String {
    let mut out = format!("{root}.clone()");
    for seg in segments {
        out = format!("{out}.get({seg:?}).cloned().unwrap_or(serde_json::Value::Null)");
    }
    out
}

fn node_references_field(node: &Node, namespace: &str, field: &str) -> bool {
    match node {
        Node::Lit(_) => false,
        Node::Path(segments) => {
            segments.first().map(String::as_str) == Some(namespace)
                && segments.get(1).map(String::as_str) == Some(field)
        }
        Node::Not(inner) => node_references_field(inner, namespace, field),
        Node::And(a, b) | Node::Or(a, b) | Node::Eq(a, b) | Node::Ne(a, b) => {
            node_references_field(a, namespace, field) || node_references_field(b, namespace, field)
        }
    }
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().map(|f| f != 0.0).unwrap_or(true),
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
    }
}

fn eval_node(node: &Node, root: &HashMap<String, Value>) -> Value {
    match node {
        Node::Lit(v) => v.clone(),
        Node::Path(segments) => resolve_path(segments, root),
        Node::Not(n) => Value::Bool(!is_truthy(&eval_node(n, root))),
        Node::And(a, b) => {
            Value::Bool(is_truthy(&eval_node(a, root)) && is_truthy(&eval_node(b, root)))
        }
        Node::Or(a, b) => {
            Value::Bool(is_truthy(&eval_node(a, root)) || is_truthy(&eval_node(b, root)))
        }
        Node::Eq(a, b) => Value::Bool(eval_node(a, root) == eval_node(b, root)),
        Node::Ne(a, b) => Value::Bool(eval_node(a, root) != eval_node(b, root)),
    }
}

fn resolve_path(segments: &[String], root: &HashMap<String, Value>) -> Value {
    let Some((head, tail)) = segments.split_first() else {
        return Value::Null;
    };
    let Some(mut current) = root.get(head) else {
        return Value::Null;
    };
    for seg in tail {
        match current.get(seg) {
            Some(next) => current = next,
            None => return Value::Null,
        }
    }
    current.clone()
}

// ---------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------

fn tokenize(src: &str) -> Result<Vec<String>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = src.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        match c {
            '(' | ')' | '.' => {
                tokens.push(c.to_string());
                i += 1;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push("!=".to_string());
                i += 2;
            }
            '!' => {
                tokens.push("!".to_string());
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push("==".to_string());
                i += 2;
            }
            '&' if chars.get(i + 1) == Some(&'&') => {
                tokens.push("&&".to_string());
                i += 2;
            }
            '|' if chars.get(i + 1) == Some(&'|') => {
                tokens.push("||".to_string());
                i += 2;
            }
            '"' | '\'' => {
                let quote = c;
                let start = i;
                i += 1;
                while i < chars.len() && chars[i] != quote {
                    i += 1;
                }
                if i >= chars.len() {
                    return Err(ExprError::UnterminatedString);
                }
                tokens.push(chars[start..=i].iter().collect());
                i += 1;
            }
            _ if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).is_some_and(|n| n.is_ascii_digit())) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                tokens.push(chars[start..i].iter().collect());
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(chars[start..i].iter().collect());
            }
            other => {
                return Err(ExprError::UnexpectedToken(other.to_string()));
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<String>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&str> {
        self.tokens.get(self.pos).map(String::as_str)
    }

    fn advance(&mut self) -> Option<String> {
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: &str) -> Result<(), ExprError> {
        match self.advance() {
            Some(ref t) if t == expected => Ok(()),
            Some(t) => Err(ExprError::UnexpectedToken(t)),
            None => Err(ExprError::UnexpectedEof),
        }
    }

    fn parse_or(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_and()?;
        while self.peek() == Some("||") {
            self.advance();
            let rhs = self.parse_and()?;
            node = Node::Or(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_and(&mut self) -> Result<Node, ExprError> {
        let mut node = self.parse_eq()?;
        while self.peek() == Some("&&") {
            self.advance();
            let rhs = self.parse_eq()?;
            node = Node::And(Box::new(node), Box::new(rhs));
        }
        Ok(node)
    }

    fn parse_eq(&mut self) -> Result<Node, ExprError> {
        let lhs = self.parse_unary()?;
        match self.peek() {
            Some("==") => {
                self.advance();
                let rhs = self.parse_unary()?;
                Ok(Node::Eq(Box::new(lhs), Box::new(rhs)))
            }
            Some("!=") => {
                self.advance();
                let rhs = self.parse_unary()?;
                Ok(Node::Ne(Box::new(lhs), Box::new(rhs)))
            }
            _ => Ok(lhs),
        }
    }

    fn parse_unary(&mut self) -> Result<Node, ExprError> {
        if self.peek() == Some("!") {
            self.advance();
            let inner = self.parse_unary()?;
            return Ok(Node::Not(Box::new(inner)));
        }
        self.parse_primary()
    }

    fn parse_primary(&mut self) -> Result<Node, ExprError> {
        let tok = self.advance().ok_or(ExprError::UnexpectedEof)?;
        match tok.as_str() {
            "(" => {
                let inner = self.parse_or()?;
                self.expect(")")?;
                Ok(inner)
            }
            "true" => Ok(Node::Lit(Value::Bool(true))),
            "false" => Ok(Node::Lit(Value::Bool(false))),
            "null" => Ok(Node::Lit(Value::Null)),
            t if t.starts_with('"') || t.starts_with('\'') => {
                Ok(Node::Lit(Value::String(t[1..t.len() - 1].to_string())))
            }
            t if t.chars().next().is_some_and(|c| c.is_ascii_digit() || c == '-') => {
                let n: f64 = t
                    .parse()
                    .map_err(|_| ExprError::UnexpectedToken(t.to_string()))?;
                Ok(Node::Lit(
                    serde_json::Number::from_f64(n)
                        .map(Value::Number)
                        .unwrap_or(Value::Null),
                ))
            }
            t if t.chars().next().is_some_and(|c| c.is_alphabetic() || c == '_') => {
                let mut segments = vec![t.to_string()];
                while self.peek() == Some(".") {
                    self.advance();
                    let seg = self.advance().ok_or(ExprError::UnexpectedEof)?;
                    segments.push(seg);
                }
                Ok(Node::Path(segments))
            }
            other => Err(ExprError::UnexpectedToken(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn root(pairs: &[(&str, Value)]) -> HashMap<String, Value> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
    }

    #[test]
    fn literal_and_equality() {
        let expr = compile("1 == 1").unwrap();
        assert!(expr.eval_bool(&HashMap::new()));
    }

    #[test]
    fn field_path_resolves_nested_state() {
        let expr = compile("state.result.status == \"approved\"").unwrap();
        let r = root(&[("state", json!({"result": {"status": "approved"}}))]);
        assert!(expr.eval_bool(&r));
    }

    #[test]
    fn missing_path_resolves_to_null_and_is_falsy() {
        let expr = compile("state.missing").unwrap();
        let r = root(&[("state", json!({}))]);
        assert!(!expr.eval_bool(&r));
    }

    #[test]
    fn boolean_operators_and_precedence() {
        let expr = compile("state.a == 1 && state.b == 2 || state.c == 3").unwrap();
        let r = root(&[("state", json!({"a": 1, "b": 9, "c": 3}))]);
        assert!(expr.eval_bool(&r));
    }

    #[test]
    fn negation_and_parens() {
        let expr = compile("!(state.flag == true)").unwrap();
        let r = root(&[("state", json!({"flag": false}))]);
        assert!(expr.eval_bool(&r));
    }

    #[test]
    fn trailing_input_is_rejected() {
        assert!(compile("true false").is_err());
    }

    #[test]
    fn unterminated_string_is_rejected() {
        assert!(compile("state.x == \"oops").is_err());
    }

    #[test]
    fn references_field_walks_nested_boolean_structure() {
        let expr = compile("input.output_parsed.status == \"approved\" && state.x == 1").unwrap();
        assert!(expr.references_field("input", "output_parsed"));
        assert!(!expr.references_field("input", "output_raw"));
        assert!(expr.references_field("state", "x"));
    }

    #[test]
    fn references_field_is_false_for_unrelated_expression() {
        let expr = compile("state.status == \"approved\"").unwrap();
        assert!(!expr.references_field("input", "output_parsed"));
    }

    #[test]
    fn as_single_field_eq_detects_path_literal_comparison() {
        let expr = compile("input.output_parsed.status == \"approved\"").unwrap();
        let (path, lit) = expr.as_single_field_eq().unwrap();
        assert_eq!(path, ["input", "output_parsed", "status"]);
        assert_eq!(lit, &json!("approved"));

        let not_eq = compile("state.a && state.b").unwrap();
        assert!(not_eq.as_single_field_eq().is_none());
    }

    #[test]
    fn to_rust_expr_renders_a_state_path() {
        let expr = compile("state.status == \"ok\"").unwrap();
        let rendered = expr.to_rust_expr();
        assert!(rendered.contains("state.clone()"));
        assert!(rendered.contains(".get(\"status\")"));
    }
}

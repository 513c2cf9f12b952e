//! The restricted boolean grammar for edge conditions.
//!
//! Authored conditions look like `output.score >= 0.8` or
//! `action_type === 'run_flow' && confidence > 0.5`. The grammar covers
//! equality, numeric comparison, AND/OR/NOT and parentheses over
//! dotted-path references and literals — nothing more. Text that does not
//! lex as this grammar is a natural-language condition and is the caller's
//! cue to escalate to the semantic oracle; a condition that parses but
//! fails to evaluate (missing path, non-numeric ordering) is simply false.

use serde_json::Value;
use thiserror::Error;

use crate::path;

/// Why a condition could not be handled deterministically.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ExprError {
    /// The text is not a sentence of the restricted grammar.
    #[error("not a deterministic condition: {0}")]
    Parse(String),

    /// A referenced path is absent from the output data.
    #[error("path '{0}' not present in output")]
    MissingPath(String),

    /// Operand types do not support the requested comparison.
    #[error("operands cannot be compared with '{0}'")]
    TypeMismatch(&'static str),
}

/// A parsed condition.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Cmp { op: CmpOp, left: Term, right: Term },
    /// A bare reference used as a truthiness test.
    Truthy(Term),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CmpOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

/// A comparison operand: a dotted-path reference or a literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Term {
    Path(String),
    Literal(Value),
}

// ---------------------------------------------------------------------------
// Lexer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Path(String),
    Literal(Value),
    AndAnd,
    OrOr,
    Not,
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, ExprError> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        match c {
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            '&' => {
                if chars.get(i + 1) == Some(&'&') {
                    tokens.push(Token::AndAnd);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("lone '&'".into()));
                }
            }
            '|' => {
                if chars.get(i + 1) == Some(&'|') {
                    tokens.push(Token::OrOr);
                    i += 2;
                } else {
                    return Err(ExprError::Parse("lone '|'".into()));
                }
            }
            '=' => {
                // Accept both `==` and the JS-style `===` authoring uses.
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    if chars.get(i) == Some(&'=') {
                        i += 1;
                    }
                    tokens.push(Token::Eq);
                } else {
                    return Err(ExprError::Parse("lone '='".into()));
                }
            }
            '!' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    if chars.get(i) == Some(&'=') {
                        i += 1;
                    }
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Ge);
                    i += 2;
                } else {
                    tokens.push(Token::Gt);
                    i += 1;
                }
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push(Token::Le);
                    i += 2;
                } else {
                    tokens.push(Token::Lt);
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(ExprError::Parse("unterminated string".into())),
                    }
                }
                tokens.push(Token::Literal(Value::String(s)));
            }
            _ if c.is_ascii_digit() || (c == '-' && next_is_digit(&chars, i)) => {
                let start = i;
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let number = if text.contains('.') {
                    text.parse::<f64>()
                        .ok()
                        .and_then(serde_json::Number::from_f64)
                } else {
                    text.parse::<i64>().ok().map(serde_json::Number::from)
                }
                .ok_or_else(|| ExprError::Parse(format!("bad number '{text}'")))?;
                tokens.push(Token::Literal(Value::Number(number)));
            }
            _ if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len()
                    && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.')
                {
                    i += 1;
                }
                let word: String = chars[start..i].iter().collect();
                tokens.push(match word.as_str() {
                    "true" => Token::Literal(Value::Bool(true)),
                    "false" => Token::Literal(Value::Bool(false)),
                    "null" => Token::Literal(Value::Null),
                    "AND" | "and" => Token::AndAnd,
                    "OR" | "or" => Token::OrOr,
                    "NOT" | "not" => Token::Not,
                    _ => Token::Path(word),
                });
            }
            other => return Err(ExprError::Parse(format!("unexpected character '{other}'"))),
        }
    }

    if tokens.is_empty() {
        return Err(ExprError::Parse("empty condition".into()));
    }
    Ok(tokens)
}

fn next_is_digit(chars: &[char], i: usize) -> bool {
    chars.get(i + 1).is_some_and(|c| c.is_ascii_digit())
}

// ---------------------------------------------------------------------------
// Parser (recursive descent: or → and → unary → comparison)
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_or(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_and()?;
        while self.peek() == Some(&Token::OrOr) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ExprError> {
        let mut left = self.parse_unary()?;
        while self.peek() == Some(&Token::AndAnd) {
            self.advance();
            let right = self.parse_unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExprError> {
        match self.peek() {
            Some(Token::Not) => {
                self.advance();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                self.advance();
                let inner = self.parse_or()?;
                match self.advance() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ExprError::Parse("expected ')'".into())),
                }
            }
            _ => self.parse_comparison(),
        }
    }

    fn parse_comparison(&mut self) -> Result<Expr, ExprError> {
        let left = self.parse_term()?;

        let op = match self.peek() {
            Some(Token::Eq) => CmpOp::Eq,
            Some(Token::Ne) => CmpOp::Ne,
            Some(Token::Gt) => CmpOp::Gt,
            Some(Token::Ge) => CmpOp::Ge,
            Some(Token::Lt) => CmpOp::Lt,
            Some(Token::Le) => CmpOp::Le,
            _ => return Ok(Expr::Truthy(left)),
        };
        self.advance();

        let right = self.parse_term()?;
        Ok(Expr::Cmp { op, left, right })
    }

    fn parse_term(&mut self) -> Result<Term, ExprError> {
        match self.advance() {
            Some(Token::Path(p)) => Ok(Term::Path(p)),
            Some(Token::Literal(v)) => Ok(Term::Literal(v)),
            other => Err(ExprError::Parse(format!("expected operand, found {other:?}"))),
        }
    }
}

/// Parse condition text into an [`Expr`].
///
/// # Errors
/// [`ExprError::Parse`] when the text is not a sentence of the grammar —
/// the caller's signal that the condition needs the semantic oracle.
pub fn parse(input: &str) -> Result<Expr, ExprError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_or()?;
    if parser.pos != parser.tokens.len() {
        return Err(ExprError::Parse("trailing input".into()));
    }
    Ok(expr)
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Evaluate a parsed condition against a node's output data.
///
/// # Errors
/// Substitution or typing failures; callers treat them as `false`.
pub fn evaluate(expr: &Expr, output: &Value) -> Result<bool, ExprError> {
    match expr {
        Expr::Or(l, r) => Ok(evaluate(l, output)? || evaluate(r, output)?),
        Expr::And(l, r) => Ok(evaluate(l, output)? && evaluate(r, output)?),
        Expr::Not(inner) => Ok(!evaluate(inner, output)?),
        Expr::Cmp { op, left, right } => {
            let l = resolve(left, output)?;
            let r = resolve(right, output)?;
            compare(*op, &l, &r)
        }
        Expr::Truthy(term) => Ok(truthy(&resolve(term, output)?)),
    }
}

fn resolve(term: &Term, output: &Value) -> Result<Value, ExprError> {
    match term {
        Term::Literal(v) => Ok(v.clone()),
        Term::Path(p) => {
            if p == "output" {
                return Ok(output.clone());
            }
            if let Some(v) = path::get(output, p) {
                return Ok(v.clone());
            }
            // Authored conditions address the node output as `output.*`.
            if let Some(stripped) = p.strip_prefix("output.") {
                if let Some(v) = path::get(output, stripped) {
                    return Ok(v.clone());
                }
            }
            Err(ExprError::MissingPath(p.clone()))
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ExprError> {
    match op {
        CmpOp::Eq => Ok(loose_eq(left, right)),
        CmpOp::Ne => Ok(!loose_eq(left, right)),
        CmpOp::Gt | CmpOp::Ge | CmpOp::Lt | CmpOp::Le => {
            let (l, r) = match (left.as_f64(), right.as_f64()) {
                (Some(l), Some(r)) => (l, r),
                _ => return Err(ExprError::TypeMismatch("numeric comparison")),
            };
            Ok(match op {
                CmpOp::Gt => l > r,
                CmpOp::Ge => l >= r,
                CmpOp::Lt => l < r,
                CmpOp::Le => l <= r,
                CmpOp::Eq | CmpOp::Ne => unreachable!(),
            })
        }
    }
}

/// Equality across JSON values; numbers compare by value so `1` equals
/// `1.0`, mismatched kinds are simply unequal.
fn loose_eq(left: &Value, right: &Value) -> bool {
    if let (Some(l), Some(r)) = (left.as_f64(), right.as_f64()) {
        return l == r;
    }
    left == right
}

fn truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(_) | Value::Object(_) => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn eval(condition: &str, output: &Value) -> Result<bool, ExprError> {
        evaluate(&parse(condition)?, output)
    }

    #[test]
    fn equality_on_strings() {
        let out = json!({ "action_type": "run_flow" });
        assert_eq!(eval("action_type === 'run_flow'", &out), Ok(true));
        assert_eq!(eval("action_type == \"create_flow\"", &out), Ok(false));
        assert_eq!(eval("action_type !== 'create_flow'", &out), Ok(true));
    }

    #[test]
    fn output_prefix_is_accepted() {
        let out = json!({ "score": 0.5 });
        assert_eq!(eval("output.score < 0.8", &out), Ok(true));
        assert_eq!(eval("output.score >= 0.8", &out), Ok(false));
    }

    #[test]
    fn numeric_comparisons() {
        let out = json!({ "confidence": 0.9, "count": 3 });
        assert_eq!(eval("confidence > 0.8", &out), Ok(true));
        assert_eq!(eval("count <= 3", &out), Ok(true));
        assert_eq!(eval("count < -1", &out), Ok(false));
    }

    #[test]
    fn integer_and_float_forms_are_equal() {
        let out = json!({ "n": 1 });
        assert_eq!(eval("n == 1.0", &out), Ok(true));
    }

    #[test]
    fn and_or_not_and_parentheses() {
        let out = json!({ "a": 1, "b": "x" });
        assert_eq!(eval("a == 1 && b == 'x'", &out), Ok(true));
        assert_eq!(eval("a == 2 || b == 'x'", &out), Ok(true));
        assert_eq!(eval("a == 2 AND b == 'x'", &out), Ok(false));
        assert_eq!(eval("!(a == 2) && b == 'x'", &out), Ok(true));
        assert_eq!(eval("(a == 2 || a == 1) && b != 'y'", &out), Ok(true));
    }

    #[test]
    fn bare_path_is_a_truthiness_test() {
        assert_eq!(eval("needs_clarification", &json!({ "needs_clarification": true })), Ok(true));
        assert_eq!(eval("needs_clarification", &json!({ "needs_clarification": false })), Ok(false));
        assert_eq!(eval("note", &json!({ "note": "" })), Ok(false));
    }

    #[test]
    fn missing_path_is_a_substitution_failure() {
        assert!(matches!(
            eval("ghost == 1", &json!({})),
            Err(ExprError::MissingPath(_))
        ));
    }

    #[test]
    fn ordering_non_numbers_is_a_type_mismatch() {
        assert!(matches!(
            eval("name > 3", &json!({ "name": "zed" })),
            Err(ExprError::TypeMismatch(_))
        ));
    }

    #[test]
    fn natural_language_does_not_parse() {
        assert!(matches!(
            parse("the user asked for a refund"),
            Err(ExprError::Parse(_))
        ));
        assert!(matches!(parse(""), Err(ExprError::Parse(_))));
    }

    #[test]
    fn parsing_is_deterministic() {
        let a = parse("output.score >= 0.8").unwrap();
        let b = parse("output.score >= 0.8").unwrap();
        assert_eq!(a, b);
    }
}

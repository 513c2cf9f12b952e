//! Fragment parsing — the declarative step language node bodies are
//! authored in.
//!
//! A fragment is the text of a JSON document mapping function names to
//! step lists:
//!
//! ```json
//! {
//!   "double_x": [
//!     { "op": "math", "func": "mul", "target": "x",
//!       "left": { "path": "x" }, "right": { "value": 2 } }
//!   ]
//! }
//! ```
//!
//! Every top-level entry becomes one registry function. Parsing is the
//! materialization check: a fragment that deserializes is loadable, one
//! that doesn't is rejected whole.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::DslError;

/// One step of a function body. Steps run in order against a JSON object
/// (the "current data") and each leaves the data in its successor state.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    /// Assign a literal at `path`.
    Set { path: String, value: Value },
    /// Copy the value at `from` to `to`. Missing source is an error.
    Copy { from: String, to: String },
    /// Arithmetic over two operands, stored at `target`.
    Math {
        func: MathFunc,
        target: String,
        left: Operand,
        right: Operand,
    },
    /// Invoke a sibling registry function with the current data; its
    /// result replaces the data.
    Call { name: String },
    /// Delete the value at `path` if present.
    Remove { path: String },
    /// Abort the invocation with an error.
    Fail { message: String },
}

/// Arithmetic functions available to `math` steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MathFunc {
    Add,
    Sub,
    Mul,
    Div,
}

/// A `math` operand — either a dotted-path reference into the current
/// data or an inline literal.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Operand {
    Path { path: String },
    Literal { value: Value },
}

/// A parsed fragment: every top-level function definition it carries.
#[derive(Debug, Clone)]
pub struct Fragment {
    pub functions: BTreeMap<String, Vec<Step>>,
}

impl Fragment {
    /// Parse fragment text. `label` identifies the fragment in errors
    /// (typically the owning node's name).
    ///
    /// # Errors
    /// [`DslError::Materialization`] carrying the label and the parser
    /// diagnostic; nothing is partially returned.
    pub fn parse(source: &str, label: &str) -> Result<Self, DslError> {
        let functions: BTreeMap<String, Vec<Step>> =
            serde_json::from_str(source).map_err(|e| DslError::Materialization {
                fragment: label.to_string(),
                message: e.to_string(),
            })?;

        Ok(Self { functions })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fragment_with_two_definitions_parses() {
        let src = r#"{
            "first": [ { "op": "set", "path": "a", "value": 1 } ],
            "second": [ { "op": "call", "name": "first" } ]
        }"#;

        let fragment = Fragment::parse(src, "test").expect("should parse");
        assert_eq!(fragment.functions.len(), 2);
        assert!(matches!(fragment.functions["first"][0], Step::Set { .. }));
        assert!(matches!(fragment.functions["second"][0], Step::Call { .. }));
    }

    #[test]
    fn unknown_op_is_a_materialization_error_with_identity() {
        let src = r#"{ "broken": [ { "op": "teleport", "to": "prod" } ] }"#;

        match Fragment::parse(src, "node_x") {
            Err(DslError::Materialization { fragment, message }) => {
                assert_eq!(fragment, "node_x");
                assert!(!message.is_empty());
            }
            other => panic!("expected materialization error, got {other:?}"),
        }
    }

    #[test]
    fn non_json_text_is_rejected() {
        assert!(Fragment::parse("def f(x): return x", "py").is_err());
    }

    #[test]
    fn operand_forms_deserialize() {
        let src = r#"{
            "m": [ { "op": "math", "func": "add", "target": "n",
                     "left": { "path": "n" }, "right": { "value": 2.5 } } ]
        }"#;
        let fragment = Fragment::parse(src, "ops").unwrap();
        match &fragment.functions["m"][0] {
            Step::Math { func, left, right, .. } => {
                assert_eq!(*func, MathFunc::Add);
                assert!(matches!(left, Operand::Path { .. }));
                assert!(matches!(right, Operand::Literal { .. }));
            }
            other => panic!("unexpected step {other:?}"),
        }
    }
}

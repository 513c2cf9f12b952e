//! The callable registry — name→function map populated from fragments.
//!
//! The source system loaded authored code into shared interpreter globals;
//! here that namespace is an explicit map. Materializing a fragment loads
//! every definition it carries (overwriting same-named entries, which
//! re-authoring relies on); binding attaches a node's static parameters so
//! sibling calls observe the bound form.

use std::collections::HashMap;
use std::sync::Arc;

use serde_json::{Map, Number, Value};
use tracing::debug;

use crate::fragment::{Fragment, MathFunc, Operand, Step};
use crate::{path, DslError};

/// Maximum nesting of sibling `call` steps within one invocation.
/// Guards authored self-reference the same way the executor's step bound
/// guards routing cycles.
const MAX_CALL_DEPTH: usize = 32;

#[derive(Clone)]
struct Callable {
    steps: Arc<Vec<Step>>,
    /// Static parameters merged under every invocation's input.
    params: Map<String, Value>,
}

/// A registry of invocable functions. One registry per agent load; never
/// shared between runs.
#[derive(Default, Clone)]
pub struct Registry {
    functions: HashMap<String, Callable>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every top-level definition of `source` into the registry.
    /// Returns the names that were (re)defined, in definition order.
    ///
    /// # Errors
    /// [`DslError::Materialization`] if the fragment fails to parse; the
    /// registry is left untouched in that case.
    pub fn materialize(&mut self, source: &str, label: &str) -> Result<Vec<String>, DslError> {
        let fragment = Fragment::parse(source, label)?;

        let mut loaded = Vec::with_capacity(fragment.functions.len());
        for (name, steps) in fragment.functions {
            debug!(function = %name, fragment = %label, "materialized function");
            self.functions.insert(
                name.clone(),
                Callable {
                    steps: Arc::new(steps),
                    params: Map::new(),
                },
            );
            loaded.push(name);
        }

        Ok(loaded)
    }

    /// Attach static parameters to a registered function, replacing its
    /// entry with the bound form. Returns `false` (and does nothing) when
    /// the name is not registered.
    pub fn bind(&mut self, name: &str, params: Map<String, Value>) -> bool {
        match self.functions.get_mut(name) {
            Some(callable) => {
                callable.params = params;
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Invoke a registered function with `input` as its dynamic data.
    ///
    /// # Errors
    /// [`DslError::UnknownFunction`] for unregistered names, plus any
    /// execution error raised by a step.
    pub fn invoke(&self, name: &str, input: Value) -> Result<Value, DslError> {
        self.invoke_at(name, input, 0)
    }

    fn invoke_at(&self, name: &str, input: Value, depth: usize) -> Result<Value, DslError> {
        if depth >= MAX_CALL_DEPTH {
            return Err(DslError::CallDepthExceeded(MAX_CALL_DEPTH));
        }

        let callable = self
            .functions
            .get(name)
            .ok_or_else(|| DslError::UnknownFunction(name.to_string()))?;

        let mut data = merge_params(&callable.params, input);
        for step in callable.steps.iter() {
            data = self.apply(step, data, depth)?;
        }
        Ok(data)
    }

    fn apply(&self, step: &Step, mut data: Value, depth: usize) -> Result<Value, DslError> {
        match step {
            Step::Set { path, value } => {
                path::set(&mut data, path, value.clone())?;
                Ok(data)
            }
            Step::Copy { from, to } => {
                let value = path::get(&data, from)
                    .cloned()
                    .ok_or_else(|| DslError::PathMissing(from.clone()))?;
                path::set(&mut data, to, value)?;
                Ok(data)
            }
            Step::Math {
                func,
                target,
                left,
                right,
            } => {
                let l = resolve_number(&data, left)?;
                let r = resolve_number(&data, right)?;
                path::set(&mut data, target, Value::Number(arith(*func, l, r)?))?;
                Ok(data)
            }
            Step::Call { name } => self.invoke_at(name, data, depth + 1),
            Step::Remove { path } => {
                path::remove(&mut data, path);
                Ok(data)
            }
            Step::Fail { message } => Err(DslError::Failed(message.clone())),
        }
    }
}

/// Merge static parameters under a dynamic input. Dynamic keys win on
/// collision — parameters are defaults a caller can always override. A
/// non-object input passes through unmerged.
pub fn merge_params(params: &Map<String, Value>, dynamic: Value) -> Value {
    if params.is_empty() {
        return dynamic;
    }

    match dynamic {
        Value::Object(dynamic_map) => {
            let mut merged = params.clone();
            for (key, value) in dynamic_map {
                merged.insert(key, value);
            }
            Value::Object(merged)
        }
        other => other,
    }
}

fn resolve_number(data: &Value, operand: &Operand) -> Result<Number, DslError> {
    let (value, location) = match operand {
        Operand::Path { path } => (
            path::get(data, path)
                .ok_or_else(|| DslError::PathMissing(path.clone()))?,
            path.as_str(),
        ),
        Operand::Literal { value } => (value, "literal"),
    };

    match value {
        Value::Number(n) => Ok(n.clone()),
        _ => Err(DslError::NotANumber(location.to_string())),
    }
}

/// Integer arithmetic stays integral when both operands are integers;
/// division and mixed operands go through f64.
fn arith(func: MathFunc, left: Number, right: Number) -> Result<Number, DslError> {
    if func != MathFunc::Div {
        if let (Some(l), Some(r)) = (left.as_i64(), right.as_i64()) {
            let result = match func {
                MathFunc::Add => l.checked_add(r),
                MathFunc::Sub => l.checked_sub(r),
                MathFunc::Mul => l.checked_mul(r),
                MathFunc::Div => unreachable!(),
            };
            return result
                .map(Number::from)
                .ok_or(DslError::Arithmetic("math"));
        }
    }

    let l = left.as_f64().ok_or(DslError::Arithmetic("math"))?;
    let r = right.as_f64().ok_or(DslError::Arithmetic("math"))?;

    let result = match func {
        MathFunc::Add => l + r,
        MathFunc::Sub => l - r,
        MathFunc::Mul => l * r,
        MathFunc::Div => {
            if r == 0.0 {
                return Err(DslError::DivisionByZero);
            }
            l / r
        }
    };

    Number::from_f64(result).ok_or(DslError::Arithmetic("math"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> Map<String, Value> {
        value.as_object().cloned().expect("object literal")
    }

    #[test]
    fn materialize_and_invoke_a_simple_function() {
        let mut registry = Registry::new();
        registry
            .materialize(
                r#"{ "greet": [ { "op": "set", "path": "greeting", "value": "hello" } ] }"#,
                "greet_node",
            )
            .unwrap();

        let out = registry.invoke("greet", json!({ "who": "world" })).unwrap();
        assert_eq!(out, json!({ "who": "world", "greeting": "hello" }));
    }

    #[test]
    fn rematerializing_a_name_leaves_the_second_version_callable() {
        let mut registry = Registry::new();
        registry
            .materialize(r#"{ "f": [ { "op": "set", "path": "v", "value": 1 } ] }"#, "a")
            .unwrap();
        registry
            .materialize(r#"{ "f": [ { "op": "set", "path": "v", "value": 2 } ] }"#, "b")
            .unwrap();

        let out = registry.invoke("f", json!({})).unwrap();
        assert_eq!(out, json!({ "v": 2 }));
    }

    #[test]
    fn dynamic_input_overrides_static_parameters() {
        let mut registry = Registry::new();
        // Identity function: the merged data is returned untouched, which
        // makes the merge observable.
        registry
            .materialize(r#"{ "identity": [] }"#, "identity")
            .unwrap();
        registry.bind("identity", map(json!({ "a": 1, "b": 2 })));

        let bound = registry.invoke("identity", json!({ "b": 9 })).unwrap();
        let direct = registry.invoke("identity", json!({ "a": 1, "b": 9 }));
        // bind(fn, {a:1, b:2})({b:9}) == fn({a:1, b:9})
        assert_eq!(bound, json!({ "a": 1, "b": 9 }));
        assert_eq!(bound, direct.unwrap());
    }

    #[test]
    fn binding_an_unknown_name_is_a_noop() {
        let mut registry = Registry::new();
        assert!(!registry.bind("ghost", Map::new()));
    }

    #[test]
    fn sibling_calls_observe_bound_parameters() {
        let mut registry = Registry::new();
        registry
            .materialize(
                r#"{
                    "leaf": [],
                    "root": [ { "op": "call", "name": "leaf" } ]
                }"#,
                "agent",
            )
            .unwrap();
        registry.bind("leaf", map(json!({ "model": "small" })));

        let out = registry.invoke("root", json!({ "q": "hi" })).unwrap();
        assert_eq!(out, json!({ "model": "small", "q": "hi" }));
    }

    #[test]
    fn integer_math_stays_integral() {
        let mut registry = Registry::new();
        registry
            .materialize(
                r#"{
                    "double_then_inc": [
                        { "op": "math", "func": "mul", "target": "x",
                          "left": { "path": "x" }, "right": { "value": 2 } },
                        { "op": "math", "func": "add", "target": "x",
                          "left": { "path": "x" }, "right": { "value": 1 } }
                    ]
                }"#,
                "math_node",
            )
            .unwrap();

        let out = registry.invoke("double_then_inc", json!({ "x": 1 })).unwrap();
        assert_eq!(out, json!({ "x": 3 }));
    }

    #[test]
    fn division_by_zero_is_an_error() {
        let mut registry = Registry::new();
        registry
            .materialize(
                r#"{ "bad": [ { "op": "math", "func": "div", "target": "y",
                               "left": { "value": 1 }, "right": { "value": 0 } } ] }"#,
                "div_node",
            )
            .unwrap();

        assert!(matches!(
            registry.invoke("bad", json!({})),
            Err(DslError::DivisionByZero)
        ));
    }

    #[test]
    fn fail_step_raises_with_its_message() {
        let mut registry = Registry::new();
        registry
            .materialize(
                r#"{ "boom": [ { "op": "fail", "message": "authored failure" } ] }"#,
                "boom_node",
            )
            .unwrap();

        match registry.invoke("boom", json!({})) {
            Err(DslError::Failed(msg)) => assert_eq!(msg, "authored failure"),
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[test]
    fn recursive_calls_hit_the_depth_limit() {
        let mut registry = Registry::new();
        registry
            .materialize(r#"{ "loop": [ { "op": "call", "name": "loop" } ] }"#, "loop")
            .unwrap();

        assert!(matches!(
            registry.invoke("loop", json!({})),
            Err(DslError::CallDepthExceeded(_))
        ));
    }

    #[test]
    fn unknown_function_is_reported() {
        let registry = Registry::new();
        assert!(matches!(
            registry.invoke("missing", json!({})),
            Err(DslError::UnknownFunction(name)) if name == "missing"
        ));
    }
}

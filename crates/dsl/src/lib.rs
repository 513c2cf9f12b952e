//! `dsl` crate — the authored-fragment language layer.
//!
//! Flows and agents are authored externally as data; the units of behaviour
//! arrive as textual fragments of a small declarative step language. This
//! crate parses those fragments, holds them in a name→callable [`Registry`],
//! wraps them with their static parameters, and evaluates the restricted
//! boolean grammar used on edge conditions.

pub mod error;
pub mod expr;
pub mod fragment;
pub mod path;
pub mod registry;

pub use error::DslError;
pub use fragment::{Fragment, MathFunc, Operand, Step};
pub use registry::Registry;

//! # kbook-problems
//!
//! The example corpus: each problem pairs a reference model written against
//! the framework layers with a solution model that swaps the framework op
//! for a hand-written kernel, plus the harness that checks the two agree.

pub mod model;
pub mod problem;
pub mod problems;
pub mod catalog;
pub mod eval;

pub use model::{FnModel, Model, ModuleModel};
pub use problem::{InitArgs, OpKind, Problem, ProblemSpec};
pub use catalog::{catalog, catalog_tiny, find, find_tiny};
pub use eval::{check_shape, evaluate, EvalConfig, EvalError, EvalReport};

//! Template and rule evaluation.
//!
//! Node configs are template trees: strings may embed `{{expr}}`
//! placeholders that resolve against the execution context. setState and
//! dynamic edges run small rule programs over the same context.

mod eval;
mod expr;
mod rules;

pub use eval::{coerce_string, eval_expression, expand, get_path, is_truthy, Context};
pub use expr::{parse, Expr};
pub use rules::{eval_conditions, run_rule, EdgeCondition, Rule, RuleStep};

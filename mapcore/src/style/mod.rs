//! Style sets, expressions and the evaluation of techniques for features.

use thiserror::Error;

pub mod evaluator;
pub mod expr;
pub mod technique;

pub use evaluator::{StyleRule, StyleSet, StyleSetEvaluator};
pub use expr::{AttributeMap, Env, Expr, Value};
pub use technique::{StyleProperty, Technique, TechniqueAttributes, TechniqueKind};

#[derive(Error, Debug)]
pub enum StyleError {
    #[error("style set is not valid json")]
    Json(#[from] serde_json::Error),
    #[error("invalid expression {0}")]
    InvalidExpression(String),
    #[error("unknown operator {0}")]
    UnknownOperator(String),
}

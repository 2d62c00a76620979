//! Style expressions and the environment they are evaluated in.

use std::{cmp::Ordering, collections::HashMap, fmt};

use serde::{Deserialize, Deserializer, Serialize};

use crate::style::StyleError;

/// Reserved binding which holds the feature state of the evaluated feature.
pub const STATE_BINDING: &str = "$state";
pub const ZOOM_BINDING: &str = "$zoom";
pub const LEVEL_BINDING: &str = "$level";
pub const LAYER_BINDING: &str = "$layer";
pub const GEOMETRY_TYPE_BINDING: &str = "$geometryType";
pub const ID_BINDING: &str = "$id";

/// A scalar attribute value of a feature.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
}

impl Value {
    pub fn from_json(value: &serde_json::Value) -> Option<Value> {
        match value {
            serde_json::Value::Null => Some(Value::Null),
            serde_json::Value::Bool(b) => Some(Value::Bool(*b)),
            serde_json::Value::Number(n) => n.as_f64().map(Value::Number),
            serde_json::Value::String(s) => Some(Value::String(s.clone())),
            _ => None,
        }
    }

    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) => !s.is_empty(),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::String(s) => s.parse().ok(),
            Value::Null => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::Null, Value::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Number(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Number(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

pub type AttributeMap = HashMap<String, Value>;

/// The environment an expression is evaluated in: feature attributes, injected `$` bindings
/// and optionally the feature state.
#[derive(Clone, Debug, Default)]
pub struct Env {
    entries: AttributeMap,
    state: Option<AttributeMap>,
}

impl Env {
    pub fn new(entries: AttributeMap) -> Self {
        Self {
            entries,
            state: None,
        }
    }

    pub fn with_zoom(zoom: f64) -> Self {
        let mut env = Env::default();
        env.insert(ZOOM_BINDING, Value::Number(zoom));
        env
    }

    pub fn insert(&mut self, name: &str, value: Value) {
        self.entries.insert(name.to_owned(), value);
    }

    pub fn set_state(&mut self, state: Option<AttributeMap>) {
        self.state = state;
    }

    pub fn lookup(&self, name: &str) -> Option<&Value> {
        self.entries.get(name)
    }

    pub fn state(&self, name: &str) -> Option<&Value> {
        self.state.as_ref().and_then(|state| state.get(name))
    }

    pub fn zoom(&self) -> Option<f64> {
        self.lookup(ZOOM_BINDING).and_then(Value::as_f64)
    }

    pub fn entries(&self) -> &AttributeMap {
        &self.entries
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

/// A parsed style expression.
#[derive(Clone, Debug, PartialEq)]
pub enum Expr {
    Literal(Value),
    Get(String),
    Has(String),
    /// Looks up a key in the `$state` binding.
    FeatureState(String),
    Zoom,
    Not(Box<Expr>),
    Compare(CompareOp, Box<Expr>, Box<Expr>),
    All(Vec<Expr>),
    Any(Vec<Expr>),
    Match {
        input: Box<Expr>,
        branches: Vec<(Vec<Value>, Expr)>,
        fallback: Box<Expr>,
    },
    Case {
        branches: Vec<(Expr, Expr)>,
        fallback: Box<Expr>,
    },
    Step {
        input: Box<Expr>,
        default: Box<Expr>,
        stops: Vec<(f64, Expr)>,
    },
}

impl Expr {
    /// Returns true if `value` looks like an operator call, i.e. an array starting with a name.
    pub fn is_call(value: &serde_json::Value) -> bool {
        value
            .as_array()
            .and_then(|array| array.first())
            .map_or(false, |head| head.is_string())
    }

    pub fn parse(value: &serde_json::Value) -> Result<Expr, StyleError> {
        let array = match value {
            serde_json::Value::Array(array) => array,
            other => {
                return Value::from_json(other)
                    .map(Expr::Literal)
                    .ok_or_else(|| StyleError::InvalidExpression(other.to_string()))
            }
        };

        let op = array
            .first()
            .and_then(|head| head.as_str())
            .ok_or_else(|| StyleError::InvalidExpression(value.to_string()))?;
        let args = &array[1..];

        let string_arg = |i: usize| -> Result<String, StyleError> {
            args.get(i)
                .and_then(|arg| arg.as_str())
                .map(str::to_owned)
                .ok_or_else(|| StyleError::InvalidExpression(value.to_string()))
        };
        let expr_arg = |i: usize| -> Result<Box<Expr>, StyleError> {
            args.get(i)
                .ok_or_else(|| StyleError::InvalidExpression(value.to_string()))
                .and_then(Expr::parse)
                .map(Box::new)
        };

        let expr = match op {
            "literal" => Expr::Literal(
                args.first()
                    .and_then(Value::from_json)
                    .ok_or_else(|| StyleError::InvalidExpression(value.to_string()))?,
            ),
            "get" => Expr::Get(string_arg(0)?),
            "has" => Expr::Has(string_arg(0)?),
            "feature-state" => Expr::FeatureState(string_arg(0)?),
            "zoom" => Expr::Zoom,
            "!" => Expr::Not(expr_arg(0)?),
            "==" | "!=" | "<" | "<=" | ">" | ">=" => {
                let op = match op {
                    "==" => CompareOp::Eq,
                    "!=" => CompareOp::Ne,
                    "<" => CompareOp::Lt,
                    "<=" => CompareOp::Le,
                    ">" => CompareOp::Gt,
                    _ => CompareOp::Ge,
                };
                Expr::Compare(op, expr_arg(0)?, expr_arg(1)?)
            }
            "all" => Expr::All(args.iter().map(Expr::parse).collect::<Result<_, _>>()?),
            "any" => Expr::Any(args.iter().map(Expr::parse).collect::<Result<_, _>>()?),
            "match" => {
                // ["match", input, label, output, ..., fallback]
                if args.len() < 2 || args.len() % 2 != 0 {
                    return Err(StyleError::InvalidExpression(value.to_string()));
                }
                let mut branches = Vec::new();
                for pair in args[1..args.len() - 1].chunks(2) {
                    let labels = match &pair[0] {
                        serde_json::Value::Array(labels) => labels
                            .iter()
                            .filter_map(Value::from_json)
                            .collect::<Vec<_>>(),
                        label => Value::from_json(label).into_iter().collect(),
                    };
                    branches.push((labels, Expr::parse(&pair[1])?));
                }
                Expr::Match {
                    input: expr_arg(0)?,
                    branches,
                    fallback: expr_arg(args.len() - 1)?,
                }
            }
            "case" => {
                // ["case", cond, output, ..., fallback]
                if args.is_empty() || args.len() % 2 != 1 {
                    return Err(StyleError::InvalidExpression(value.to_string()));
                }
                let mut branches = Vec::new();
                for pair in args[..args.len() - 1].chunks(2) {
                    branches.push((Expr::parse(&pair[0])?, Expr::parse(&pair[1])?));
                }
                Expr::Case {
                    branches,
                    fallback: expr_arg(args.len() - 1)?,
                }
            }
            "step" => {
                // ["step", input, default, stop, output, ...]
                if args.len() < 2 || args.len() % 2 != 0 {
                    return Err(StyleError::InvalidExpression(value.to_string()));
                }
                let mut stops = Vec::new();
                for pair in args[2..].chunks(2) {
                    let stop = pair[0]
                        .as_f64()
                        .ok_or_else(|| StyleError::InvalidExpression(value.to_string()))?;
                    stops.push((stop, Expr::parse(&pair[1])?));
                }
                Expr::Step {
                    input: expr_arg(0)?,
                    default: expr_arg(1)?,
                    stops,
                }
            }
            unknown => return Err(StyleError::UnknownOperator(unknown.to_owned())),
        };
        Ok(expr)
    }

    pub fn evaluate(&self, env: &Env) -> Value {
        match self {
            Expr::Literal(value) => value.clone(),
            Expr::Get(name) => env.lookup(name).cloned().unwrap_or_default(),
            Expr::Has(name) => Value::Bool(env.lookup(name).is_some()),
            Expr::FeatureState(name) => env.state(name).cloned().unwrap_or_default(),
            Expr::Zoom => env.zoom().map(Value::Number).unwrap_or_default(),
            Expr::Not(expr) => Value::Bool(!expr.evaluate(env).is_truthy()),
            Expr::Compare(op, lhs, rhs) => {
                let ordering = lhs.evaluate(env).compare(&rhs.evaluate(env));
                let result = match op {
                    CompareOp::Eq => ordering == Some(Ordering::Equal),
                    CompareOp::Ne => ordering != Some(Ordering::Equal),
                    CompareOp::Lt => ordering == Some(Ordering::Less),
                    CompareOp::Le => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
                    CompareOp::Gt => ordering == Some(Ordering::Greater),
                    CompareOp::Ge => {
                        matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
                    }
                };
                Value::Bool(result)
            }
            Expr::All(exprs) => Value::Bool(exprs.iter().all(|e| e.evaluate(env).is_truthy())),
            Expr::Any(exprs) => Value::Bool(exprs.iter().any(|e| e.evaluate(env).is_truthy())),
            Expr::Match {
                input,
                branches,
                fallback,
            } => {
                let input = input.evaluate(env);
                branches
                    .iter()
                    .find(|(labels, _)| labels.contains(&input))
                    .map_or_else(|| fallback.evaluate(env), |(_, out)| out.evaluate(env))
            }
            Expr::Case { branches, fallback } => branches
                .iter()
                .find(|(condition, _)| condition.evaluate(env).is_truthy())
                .map_or_else(|| fallback.evaluate(env), |(_, out)| out.evaluate(env)),
            Expr::Step {
                input,
                default,
                stops,
            } => {
                let input = input.evaluate(env).as_f64();
                let mut result = default.as_ref();
                if let Some(input) = input {
                    for (stop, output) in stops {
                        if input >= *stop {
                            result = output;
                        } else {
                            break;
                        }
                    }
                }
                result.evaluate(env)
            }
        }
    }

    /// True if the expression reads `$state` and therefore must be evaluated per frame.
    pub fn references_state(&self) -> bool {
        self.any_node(&|expr| matches!(expr, Expr::FeatureState(_)))
    }

    /// True if the result depends on the camera (zoom) or the feature state, i.e. it can not be
    /// resolved once at decode time.
    pub fn is_dynamic(&self) -> bool {
        self.any_node(&|expr| {
            matches!(expr, Expr::FeatureState(_) | Expr::Zoom)
                || matches!(expr, Expr::Get(name) if name == ZOOM_BINDING)
        })
    }

    fn any_node(&self, predicate: &dyn Fn(&Expr) -> bool) -> bool {
        if predicate(self) {
            return true;
        }
        match self {
            Expr::Literal(_)
            | Expr::Get(_)
            | Expr::Has(_)
            | Expr::FeatureState(_)
            | Expr::Zoom => false,
            Expr::Not(expr) => expr.any_node(predicate),
            Expr::Compare(_, lhs, rhs) => lhs.any_node(predicate) || rhs.any_node(predicate),
            Expr::All(exprs) | Expr::Any(exprs) => exprs.iter().any(|e| e.any_node(predicate)),
            Expr::Match {
                input,
                branches,
                fallback,
            } => {
                input.any_node(predicate)
                    || fallback.any_node(predicate)
                    || branches.iter().any(|(_, out)| out.any_node(predicate))
            }
            Expr::Case { branches, fallback } => {
                fallback.any_node(predicate)
                    || branches
                        .iter()
                        .any(|(c, out)| c.any_node(predicate) || out.any_node(predicate))
            }
            Expr::Step {
                input,
                default,
                stops,
            } => {
                input.any_node(predicate)
                    || default.any_node(predicate)
                    || stops.iter().any(|(_, out)| out.any_node(predicate))
            }
        }
    }
}

impl<'de> Deserialize<'de> for Expr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = serde_json::Value::deserialize(deserializer)?;
        Expr::parse(&value).map_err(serde::de::Error::custom)
    }
}

use std::collections::HashMap;

use super::PredicateMessage;
use super::parser::{BinOp, Expr};

/// Chat-scoped state exposed to predicates: message lookup plus the
/// hyperparameter table behind `readChatValue`/`saveChatValue`.
pub trait PredicateHost {
    fn message_by_order(&self, order: u64) -> Option<PredicateMessage>;
    fn read_chat_value(&mut self, key: &str) -> f64;
    fn save_chat_value(&mut self, key: &str, value: f64);
}

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Str(String),
    List(Vec<Value>),
    Message(PredicateMessage),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Str(_) => "string",
            Value::List(_) => "list",
            Value::Message(_) => "message",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EvalError {
    #[error("unknown identifier '{0}'")]
    UnknownIdentifier(String),
    #[error("unknown function '{0}'")]
    UnknownFunction(String),
    #[error("unknown method '.{0}'")]
    UnknownMethod(String),
    #[error("'{function}' expects {expected} argument(s)")]
    BadArity {
        function: String,
        expected: &'static str,
    },
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },
}

pub struct Evaluator<'a> {
    host: &'a mut dyn PredicateHost,
    bindings: HashMap<String, PredicateMessage>,
}

impl<'a> Evaluator<'a> {
    pub fn new(host: &'a mut dyn PredicateHost) -> Self {
        Self {
            host,
            bindings: HashMap::new(),
        }
    }

    pub fn eval(&mut self, expr: &Expr) -> Result<Value, EvalError> {
        match expr {
            Expr::Bool(b) => Ok(Value::Bool(*b)),
            Expr::Number(n) => Ok(Value::Number(*n)),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::List(items) => {
                let values = items
                    .iter()
                    .map(|item| self.eval(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(values))
            }
            Expr::Var(name) => self
                .bindings
                .get(name)
                .cloned()
                .map(Value::Message)
                .ok_or_else(|| EvalError::UnknownIdentifier(name.clone())),
            Expr::WhereId { var, id } => self.eval_where(var, id),
            Expr::Method { target, name, .. } => self.eval_method(target, name),
            Expr::Call { name, args } => self.eval_call(name, args),
            Expr::Not(inner) => {
                let value = self.eval(inner)?;
                Ok(Value::Bool(!as_bool(&value)?))
            }
            Expr::Binary { op, lhs, rhs } => self.eval_binary(*op, lhs, rhs),
        }
    }

    /// Bind `var` to the message addressed by `id`. Yields false (without
    /// binding) when the message does not exist, so predicates over missing
    /// answers quietly hide their node.
    fn eval_where(&mut self, var: &str, id: &Expr) -> Result<Value, EvalError> {
        let order = match self.eval(id)? {
            Value::Number(n) => n as u64,
            Value::Str(s) => match s.trim().parse() {
                Ok(order) => order,
                Err(_) => return Ok(Value::Bool(false)),
            },
            other => {
                return Err(EvalError::TypeMismatch {
                    expected: "message id",
                    found: other.type_name(),
                });
            }
        };

        match self.host.message_by_order(order) {
            Some(message) => {
                self.bindings.insert(var.to_string(), message);
                Ok(Value::Bool(true))
            }
            None => Ok(Value::Bool(false)),
        }
    }

    fn eval_method(&mut self, target: &Expr, name: &str) -> Result<Value, EvalError> {
        let value = self.eval(target)?;
        let Value::Message(message) = value else {
            return Err(EvalError::TypeMismatch {
                expected: "message",
                found: value.type_name(),
            });
        };

        match name {
            "allcorrect" => Ok(Value::Bool(message.all_correct())),
            "anycorrect" => Ok(Value::Bool(message.any_correct())),
            "allincorrect" => Ok(Value::Bool(!message.all_correct())),
            "anyincorrect" => Ok(Value::Bool(!message.any_correct())),
            "selected" => Ok(Value::List(
                message
                    .selected_positions()
                    .into_iter()
                    .map(|p| Value::Number(p as f64))
                    .collect(),
            )),
            other => Err(EvalError::UnknownMethod(other.to_string())),
        }
    }

    fn eval_call(&mut self, name: &str, args: &[Expr]) -> Result<Value, EvalError> {
        match name {
            "readchatvalue" => {
                let [key] = args else {
                    return Err(EvalError::BadArity {
                        function: name.to_string(),
                        expected: "1",
                    });
                };
                let key = self.eval_string(key)?;
                Ok(Value::Number(self.host.read_chat_value(&key)))
            }
            "savechatvalue" => {
                let [key, value] = args else {
                    return Err(EvalError::BadArity {
                        function: name.to_string(),
                        expected: "2",
                    });
                };
                let key = self.eval_string(key)?;
                let value = self.eval_number(value)?;
                self.host.save_chat_value(&key, value);
                Ok(Value::Bool(true))
            }
            other => Err(EvalError::UnknownFunction(other.to_string())),
        }
    }

    fn eval_binary(&mut self, op: BinOp, lhs: &Expr, rhs: &Expr) -> Result<Value, EvalError> {
        match op {
            // Short-circuiting boolean operators.
            BinOp::And => {
                if !as_bool(&self.eval(lhs)?)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(as_bool(&self.eval(rhs)?)?))
            }
            BinOp::Or => {
                if as_bool(&self.eval(lhs)?)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(as_bool(&self.eval(rhs)?)?))
            }
            BinOp::Eq => {
                let (lhs, rhs) = (self.eval(lhs)?, self.eval(rhs)?);
                Ok(Value::Bool(values_equal(&lhs, &rhs)))
            }
            BinOp::NotEq => {
                let (lhs, rhs) = (self.eval(lhs)?, self.eval(rhs)?);
                Ok(Value::Bool(!values_equal(&lhs, &rhs)))
            }
            BinOp::Gt | BinOp::Lt | BinOp::Ge | BinOp::Le => {
                let lhs = self.eval_number(lhs)?;
                let rhs = self.eval_number(rhs)?;
                Ok(Value::Bool(match op {
                    BinOp::Gt => lhs > rhs,
                    BinOp::Lt => lhs < rhs,
                    BinOp::Ge => lhs >= rhs,
                    BinOp::Le => lhs <= rhs,
                    _ => unreachable!(),
                }))
            }
            BinOp::Add => Ok(Value::Number(
                self.eval_number(lhs)? + self.eval_number(rhs)?,
            )),
            BinOp::Sub => Ok(Value::Number(
                self.eval_number(lhs)? - self.eval_number(rhs)?,
            )),
        }
    }

    fn eval_string(&mut self, expr: &Expr) -> Result<String, EvalError> {
        match self.eval(expr)? {
            Value::Str(s) => Ok(s),
            other => Err(EvalError::TypeMismatch {
                expected: "string",
                found: other.type_name(),
            }),
        }
    }

    fn eval_number(&mut self, expr: &Expr) -> Result<f64, EvalError> {
        match self.eval(expr)? {
            Value::Number(n) => Ok(n),
            other => Err(EvalError::TypeMismatch {
                expected: "number",
                found: other.type_name(),
            }),
        }
    }
}

fn as_bool(value: &Value) -> Result<bool, EvalError> {
    match value {
        Value::Bool(b) => Ok(*b),
        other => Err(EvalError::TypeMismatch {
            expected: "boolean",
            found: other.type_name(),
        }),
    }
}

fn values_equal(lhs: &Value, rhs: &Value) -> bool {
    match (lhs, rhs) {
        (Value::Number(a), Value::Number(b)) => (a - b).abs() < f64::EPSILON,
        (Value::Str(a), Value::Str(b)) => a == b,
        (Value::Bool(a), Value::Bool(b)) => a == b,
        (Value::List(a), Value::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => false,
    }
}

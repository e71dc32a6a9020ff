use std::collections::BTreeMap;

use dlg_core::{DialogueError, Value};

use crate::token::Operator;
use crate::ExprItem;

/// Reserved prefix routing a variable name to the external global store.
pub const GLOBAL_NAME_PREFIX: &str = "global.";

/// The injected collaborator holding cross-conversation variables. The
/// engine defines only this get/set contract; lifetime and concurrency
/// discipline belong to the host.
pub trait GlobalStore {
    fn get(&self, name: &str) -> Option<Value>;
    fn set(&mut self, name: &str, value: Value);
}

#[derive(Debug, Default, Clone)]
pub struct MemoryGlobalStore {
    values: BTreeMap<String, Value>,
}

impl MemoryGlobalStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GlobalStore for MemoryGlobalStore {
    fn get(&self, name: &str) -> Option<Value> {
        self.values.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: Value) {
        self.values.insert(name.to_string(), value);
    }
}

/// Resolves a variable name against the conversation scope, then the global
/// store for `global.`-prefixed names. Unresolved names yield `Empty`, which
/// every operator treats as the type-appropriate default: scripts may
/// reference optional state without guards.
pub fn resolve_variable(
    name: &str,
    scope: &BTreeMap<String, Value>,
    globals: &dyn GlobalStore,
) -> Value {
    if let Some(global_name) = name.strip_prefix(GLOBAL_NAME_PREFIX) {
        return globals.get(global_name).unwrap_or(Value::Empty);
    }
    scope.get(name).cloned().unwrap_or(Value::Empty)
}

/// Runs an RPN item queue against a single value stack. The resolver maps
/// `Variable` operands to concrete values; validation passes `Empty` for
/// every name, evaluation passes real lookups.
pub fn eval_rpn(
    items: &[ExprItem],
    resolve: &mut dyn FnMut(&str) -> Value,
) -> Result<Value, DialogueError> {
    let mut stack: Vec<Value> = Vec::new();

    for item in items {
        match item {
            ExprItem::Operand(Value::Variable(name)) => stack.push(resolve(name)),
            ExprItem::Operand(value) => stack.push(value.clone()),
            ExprItem::Operator(operator) => {
                if operator.is_unary() {
                    let operand = stack.pop().ok_or_else(malformed)?;
                    stack.push(Value::Boolean(!operand.as_boolean()));
                } else {
                    let right = stack.pop().ok_or_else(malformed)?;
                    let left = stack.pop().ok_or_else(malformed)?;
                    stack.push(apply_binary(*operator, &left, &right));
                }
            }
        }
    }

    match (stack.pop(), stack.is_empty()) {
        (Some(result), true) => Ok(result),
        _ => Err(malformed()),
    }
}

fn malformed() -> DialogueError {
    DialogueError::new(
        "EXPR_MALFORMED",
        "Expression does not reduce to a single value.",
    )
}

fn apply_binary(operator: Operator, left: &Value, right: &Value) -> Value {
    match operator {
        Operator::Add | Operator::Subtract | Operator::Multiply | Operator::Divide
        | Operator::Modulo => apply_arithmetic(operator, left, right),
        Operator::Less | Operator::LessEqual | Operator::Greater | Operator::GreaterEqual => {
            apply_ordering(operator, left, right)
        }
        Operator::Equal => Value::Boolean(equals_with_defaults(left, right)),
        Operator::NotEqual => Value::Boolean(!equals_with_defaults(left, right)),
        Operator::And => Value::Boolean(left.as_boolean() && right.as_boolean()),
        Operator::Or => Value::Boolean(left.as_boolean() || right.as_boolean()),
        Operator::Not | Operator::LeftParen | Operator::RightParen => Value::Empty,
    }
}

fn apply_arithmetic(operator: Operator, left: &Value, right: &Value) -> Value {
    // int+int stays int; anything touching a float widens. Division and
    // modulo by zero yield the type's zero instead of trapping.
    if !matches!(left, Value::Float(_)) && !matches!(right, Value::Float(_)) {
        let a = left.as_int();
        let b = right.as_int();
        let result = match operator {
            Operator::Add => a.wrapping_add(b),
            Operator::Subtract => a.wrapping_sub(b),
            Operator::Multiply => a.wrapping_mul(b),
            Operator::Divide => {
                if b == 0 {
                    0
                } else {
                    a.wrapping_div(b)
                }
            }
            Operator::Modulo => {
                if b == 0 {
                    0
                } else {
                    a.wrapping_rem(b)
                }
            }
            _ => 0,
        };
        return Value::Int(result);
    }

    let a = left.as_float();
    let b = right.as_float();
    let result = match operator {
        Operator::Add => a + b,
        Operator::Subtract => a - b,
        Operator::Multiply => a * b,
        Operator::Divide => {
            if b == 0.0 {
                0.0
            } else {
                a / b
            }
        }
        Operator::Modulo => {
            if b == 0.0 {
                0.0
            } else {
                a % b
            }
        }
        _ => 0.0,
    };
    Value::Float(result)
}

fn apply_ordering(operator: Operator, left: &Value, right: &Value) -> Value {
    let a = left.as_float();
    let b = right.as_float();
    let result = match operator {
        Operator::Less => a < b,
        Operator::LessEqual => a <= b,
        Operator::Greater => a > b,
        Operator::GreaterEqual => a >= b,
        _ => false,
    };
    Value::Boolean(result)
}

/// Equality with unresolved-variable degradation: `Empty` (an unresolved
/// name) compares equal to the other side's default value, so a missing
/// flag behaves like `false` and a missing counter like `0`.
fn equals_with_defaults(left: &Value, right: &Value) -> bool {
    match (left, right) {
        (Value::Empty, Value::Empty) => true,
        (Value::Empty, other) | (other, Value::Empty) => match other {
            Value::Int(value) => *value == 0,
            Value::Float(value) => dlg_core::floats_almost_equal(*value, 0.0),
            Value::Boolean(value) => !value,
            Value::Text(value) => value.is_empty(),
            Value::Name(value) => value.is_empty(),
            Value::Gender(gender) => *gender == dlg_core::Gender::Neuter,
            Value::Variable(_) | Value::Empty => true,
        },
        _ => left == right,
    }
}

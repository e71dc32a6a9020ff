pub mod eval;
pub mod parse;
pub mod token;

use std::collections::BTreeMap;
use std::fmt;

use serde::de::Error as SerdeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use dlg_core::{DialogueError, Value};

pub use eval::{resolve_variable, GlobalStore, MemoryGlobalStore, GLOBAL_NAME_PREFIX};
pub use token::{Operator, Token};

#[derive(Debug, Clone, PartialEq)]
pub enum ExprItem {
    Operator(Operator),
    Operand(Value),
}

/// A parsed expression: the RPN item queue produced by the shunting-yard
/// pass, the original source text, and the de-duplicated list of variable
/// names it reads. Immutable once parsed.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    items: Vec<ExprItem>,
    source: String,
    variable_names: Vec<String>,
    valid: bool,
}

impl Default for Expression {
    /// The empty expression: valid, evaluates to `Boolean(true)`. Used for
    /// unconditional edges.
    fn default() -> Self {
        Self {
            items: Vec::new(),
            source: String::new(),
            variable_names: Vec::new(),
            valid: true,
        }
    }
}

impl Expression {
    pub fn parse(source: &str) -> Result<Self, DialogueError> {
        let trimmed = source.trim();
        if trimmed.is_empty() {
            return Ok(Self::default());
        }

        let tokens = token::tokenize(trimmed)?;
        let items = parse::parse_to_rpn(tokens)?;
        parse::validate_rpn(&items)?;

        let mut variable_names = Vec::new();
        for item in &items {
            if let ExprItem::Operand(Value::Variable(name)) = item {
                if !variable_names.iter().any(|existing| existing == name) {
                    variable_names.push(name.clone());
                }
            }
        }

        Ok(Self {
            items,
            source: trimmed.to_string(),
            variable_names,
            valid: true,
        })
    }

    /// A placeholder that has never been parsed. Evaluating it is a
    /// contract violation, not an expected runtime state.
    pub fn invalid(source: &str) -> Self {
        Self {
            items: Vec::new(),
            source: source.to_string(),
            variable_names: Vec::new(),
            valid: false,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Variable names this expression reads, in first-read order. The
    /// runtime uses this to notify listeners before evaluation.
    pub fn variable_names(&self) -> &[String] {
        &self.variable_names
    }

    pub fn items(&self) -> &[ExprItem] {
        &self.items
    }

    /// Evaluates against a conversation scope plus the external global
    /// store. Never fails for unresolved variables or mismatched kinds;
    /// the only error is evaluating a never-parsed expression.
    pub fn evaluate(
        &self,
        scope: &BTreeMap<String, Value>,
        globals: &dyn GlobalStore,
    ) -> Result<Value, DialogueError> {
        if !self.valid {
            return Err(DialogueError::new(
                "EXPR_INVALID",
                format!("Expression was never parsed: {}", self.source),
            ));
        }
        if self.items.is_empty() {
            return Ok(Value::Boolean(true));
        }
        eval::eval_rpn(&self.items, &mut |name| {
            resolve_variable(name, scope, globals)
        })
    }

    /// Convenience for condition edges: evaluate and coerce to boolean.
    pub fn evaluate_boolean(
        &self,
        scope: &BTreeMap<String, Value>,
        globals: &dyn GlobalStore,
    ) -> Result<bool, DialogueError> {
        Ok(self.evaluate(scope, globals)?.as_boolean())
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

// Expressions serialize as their source text; deserialization re-parses.
// The compiled graph stays dumpable as JSON without a bespoke RPN format.
impl Serialize for Expression {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.source)
    }
}

impl<'de> Deserialize<'de> for Expression {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let source = String::deserialize(deserializer)?;
        Expression::parse(&source).map_err(D::Error::custom)
    }
}

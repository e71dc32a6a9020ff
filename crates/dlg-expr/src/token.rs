use std::sync::OnceLock;

use regex::Regex;

use dlg_core::{DialogueError, Gender, Value};

/// Operators of the expression sub-language. Variant order tracks binding
/// strength groups; `precedence` is the single source of truth.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Not,
    Multiply,
    Divide,
    Modulo,
    Add,
    Subtract,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
    And,
    Or,
    LeftParen,
    RightParen,
}

impl Operator {
    /// Lower value binds tighter.
    pub fn precedence(self) -> u8 {
        match self {
            Self::Not => 2,
            Self::Multiply | Self::Divide | Self::Modulo => 3,
            Self::Add | Self::Subtract => 4,
            Self::Less | Self::LessEqual | Self::Greater | Self::GreaterEqual => 6,
            Self::Equal | Self::NotEqual => 7,
            Self::And => 11,
            Self::Or => 12,
            Self::LeftParen | Self::RightParen => 15,
        }
    }

    pub fn is_unary(self) -> bool {
        matches!(self, Self::Not)
    }

    /// `Not` is the sole right-associative operator.
    pub fn is_left_associative(self) -> bool {
        !matches!(self, Self::Not)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Operand(Value),
    Operator(Operator),
}

fn number_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^[+-]?[0-9]+(\.[0-9]+)?").expect("number regex must compile"))
}

// Symbolic spellings, longest first so `==` wins over `=` and `<=` over `<`.
const SYMBOL_OPERATORS: &[(&str, Operator)] = &[
    ("&&", Operator::And),
    ("||", Operator::Or),
    ("==", Operator::Equal),
    ("!=", Operator::NotEqual),
    ("<>", Operator::NotEqual),
    ("<=", Operator::LessEqual),
    (">=", Operator::GreaterEqual),
    ("=", Operator::Equal),
    ("<", Operator::Less),
    (">", Operator::Greater),
    ("!", Operator::Not),
    ("+", Operator::Add),
    ("-", Operator::Subtract),
    ("*", Operator::Multiply),
    ("/", Operator::Divide),
    ("%", Operator::Modulo),
    ("(", Operator::LeftParen),
    (")", Operator::RightParen),
];

const WORD_OPERATORS: &[(&str, Operator)] = &[
    ("and", Operator::And),
    ("or", Operator::Or),
    ("not", Operator::Not),
];

fn word_boundary(rest: &str, word_len: usize) -> bool {
    if !rest.is_char_boundary(word_len) {
        return false;
    }
    match rest[word_len..].chars().next() {
        Some(next) => !next.is_alphanumeric() && next != '_',
        None => true,
    }
}

fn in_operand_position(tokens: &[Token]) -> bool {
    match tokens.last() {
        None => true,
        Some(Token::Operator(Operator::RightParen)) => false,
        Some(Token::Operator(_)) => true,
        Some(Token::Operand(_)) => false,
    }
}

/// Scans an expression source string into a token list.
pub fn tokenize(source: &str) -> Result<Vec<Token>, DialogueError> {
    let mut tokens = Vec::new();
    let mut rest = source;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            return Ok(tokens);
        }

        if let Some(inner) = rest.strip_prefix('{') {
            let Some(end) = inner.find('}') else {
                return Err(DialogueError::new(
                    "EXPR_UNTERMINATED_VARIABLE",
                    format!("Variable reference is missing closing brace: {}", rest),
                ));
            };
            let name = inner[..end].trim();
            if name.is_empty() {
                return Err(DialogueError::new(
                    "EXPR_EMPTY_VARIABLE",
                    "Variable reference has an empty name.",
                ));
            }
            tokens.push(Token::Operand(Value::Variable(name.to_string())));
            rest = &inner[end + 1..];
            continue;
        }

        if let Some(inner) = rest.strip_prefix('"') {
            let (text, consumed) = scan_quoted(inner).ok_or_else(|| {
                DialogueError::new(
                    "EXPR_UNTERMINATED_STRING",
                    format!("String literal is missing closing quote: {}", rest),
                )
            })?;
            tokens.push(Token::Operand(Value::Text(text)));
            rest = &inner[consumed..];
            continue;
        }

        if let Some(inner) = rest.strip_prefix('`') {
            let Some(end) = inner.find('`') else {
                return Err(DialogueError::new(
                    "EXPR_UNTERMINATED_NAME",
                    format!("Name literal is missing closing backtick: {}", rest),
                ));
            };
            tokens.push(Token::Operand(Value::Name(inner[..end].to_string())));
            rest = &inner[end + 1..];
            continue;
        }

        // A sign is part of a number literal only in operand position, so
        // `21.3 - 8` stays a subtraction while `-6.7 * 2` begins negative.
        if in_operand_position(&tokens) {
            if let Some(matched) = number_regex().find(rest) {
                let literal = matched.as_str();
                let value = if literal.contains('.') {
                    Value::Float(literal.parse::<f32>().map_err(|_| {
                        DialogueError::new(
                            "EXPR_BAD_NUMBER",
                            format!("Invalid float literal: {}", literal),
                        )
                    })?)
                } else {
                    Value::Int(literal.parse::<i32>().map_err(|_| {
                        DialogueError::new(
                            "EXPR_BAD_NUMBER",
                            format!("Invalid int literal: {}", literal),
                        )
                    })?)
                };
                tokens.push(Token::Operand(value));
                rest = &rest[matched.end()..];
                continue;
            }
        } else if let Some(matched) = number_regex().find(rest) {
            // Unsigned digits directly after an operand are still a number;
            // leading sign belongs to the operator table instead.
            if !matched.as_str().starts_with(['+', '-']) {
                let literal = matched.as_str();
                let value = if literal.contains('.') {
                    Value::Float(literal.parse::<f32>().unwrap_or(0.0))
                } else {
                    Value::Int(literal.parse::<i32>().unwrap_or(0))
                };
                tokens.push(Token::Operand(value));
                rest = &rest[matched.end()..];
                continue;
            }
        }

        if let Some((word, operator)) = WORD_OPERATORS
            .iter()
            .find(|(word, _)| starts_with_ignore_case(rest, word) && word_boundary(rest, word.len()))
        {
            tokens.push(Token::Operator(*operator));
            rest = &rest[word.len()..];
            continue;
        }

        if let Some(constant) = scan_constant(rest) {
            let (value, len) = constant;
            tokens.push(Token::Operand(value));
            rest = &rest[len..];
            continue;
        }

        if let Some((spelling, operator)) = SYMBOL_OPERATORS
            .iter()
            .find(|(spelling, _)| rest.starts_with(spelling))
        {
            tokens.push(Token::Operator(*operator));
            rest = &rest[spelling.len()..];
            continue;
        }

        return Err(DialogueError::new(
            "EXPR_UNRECOGNISED_TOKEN",
            format!("Unrecognised token at: {}", rest),
        ));
    }
}

fn scan_quoted(inner: &str) -> Option<(String, usize)> {
    let mut text = String::new();
    let mut chars = inner.char_indices();
    while let Some((index, ch)) = chars.next() {
        match ch {
            '\\' => match chars.next() {
                Some((_, escaped)) => text.push(escaped),
                None => return None,
            },
            '"' => return Some((text, index + 1)),
            other => text.push(other),
        }
    }
    None
}

// Prefix may land inside a multibyte character; slicing there would panic.
fn starts_with_ignore_case(rest: &str, word: &str) -> bool {
    rest.len() >= word.len()
        && rest.is_char_boundary(word.len())
        && rest[..word.len()].eq_ignore_ascii_case(word)
}

fn scan_constant(rest: &str) -> Option<(Value, usize)> {
    const CONSTANTS: &[(&str, Value)] = &[
        ("true", Value::Boolean(true)),
        ("false", Value::Boolean(false)),
        ("masculine", Value::Gender(Gender::Masculine)),
        ("feminine", Value::Gender(Gender::Feminine)),
        ("neuter", Value::Gender(Gender::Neuter)),
    ];
    for (word, value) in CONSTANTS {
        if starts_with_ignore_case(rest, word) && word_boundary(rest, word.len()) {
            return Some((value.clone(), word.len()));
        }
    }
    None
}

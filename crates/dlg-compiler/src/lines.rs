use std::sync::OnceLock;

use regex::Regex;

/// Tabs count as this many spaces when computing indent width.
pub const TAB_INDENT_WIDTH: usize = 4;

#[derive(Debug, Clone, PartialEq)]
pub struct Line {
    pub number: usize,
    pub indent: usize,
    pub kind: LineKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum LineKind {
    Blank,
    Comment,
    TransientMeta { key: String, value: String },
    PersistentMeta { key: String, value: String },
    HeaderDelimiter,
    Label(String),
    Choice { text: String, suppress_echo: bool, text_id: Option<String> },
    If { expr: String },
    ElseIf { expr: String },
    Else,
    EndIf,
    Random,
    Or,
    EndRandom,
    Goto { label: String },
    Gosub { label: String, gosub_id: Option<String> },
    Return,
    Set { name: String, expr: String, text_id: Option<String> },
    Event { name: String, args: Vec<String> },
    ImportSetting { key: String, value: String },
    Text { speaker: String, text: String, text_id: Option<String> },
    Continuation { text: String },
    Invalid { message: String },
}

fn speaker_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| {
        Regex::new(r"^([A-Za-z0-9_][A-Za-z0-9_ .]*?)\s*:\s*(.*)$").expect("speaker regex")
    })
}

fn text_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s*@([0-9A-Fa-f]+)@\s*$").expect("text id regex"))
}

fn gosub_id_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\s*@GS([0-9A-Fa-f]+)@\s*$").expect("gosub id regex"))
}

fn label_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"^:([A-Za-z0-9_]+)\s*$").expect("label regex"))
}

pub fn indent_width(raw: &str) -> usize {
    let mut width = 0;
    for ch in raw.chars() {
        match ch {
            ' ' => width += 1,
            '\t' => width += TAB_INDENT_WIDTH,
            _ => break,
        }
    }
    width
}

/// Splits a trailing `@hex@` localization-id pin off a line, returning the
/// remaining text and the normalized id (lowercase hex, `@`-wrapped).
fn split_text_id(content: &str) -> (String, Option<String>) {
    // A gosub-id pin is not a text id; leave it for the gosub path.
    if gosub_id_regex().is_match(content) {
        return (content.to_string(), None);
    }
    if let Some(captures) = text_id_regex().captures(content) {
        let full = captures.get(0).expect("whole match");
        let hex = captures.get(1).expect("hex group").as_str().to_lowercase();
        // A pin wider than 32 bits is not a pin; collapsing distinct
        // oversized pins to one fixed id would make them collide.
        if let Ok(id) = u32::from_str_radix(&hex, 16) {
            return (
                content[..full.start()].to_string(),
                Some(format!("@{:04x}@", id)),
            );
        }
    }
    (content.to_string(), None)
}

fn split_gosub_id(content: &str) -> (String, Option<String>) {
    if let Some(captures) = gosub_id_regex().captures(content) {
        let full = captures.get(0).expect("whole match");
        let hex = captures.get(1).expect("hex group").as_str().to_lowercase();
        if let Ok(id) = u32::from_str_radix(&hex, 16) {
            return (
                content[..full.start()].to_string(),
                Some(format!("@GS{:04x}@", id)),
            );
        }
    }
    (content.to_string(), None)
}

/// Classifies one raw script line. Priority follows the language rules:
/// comment/metadata, header delimiter, label, choice marker, bracketed
/// command, speaker line, then continuation of the previous text line.
pub fn classify(number: usize, raw: &str) -> Line {
    let indent = indent_width(raw);
    let content = raw.trim();

    let kind = if content.is_empty() {
        LineKind::Blank
    } else if let Some(meta) = content.strip_prefix("#=") {
        parse_metadata(meta, true)
    } else if let Some(meta) = content.strip_prefix("#+") {
        parse_metadata(meta, false)
    } else if content.starts_with('#') {
        LineKind::Comment
    } else if content.chars().all(|ch| ch == '=') && content.len() >= 3 {
        LineKind::HeaderDelimiter
    } else if let Some(captures) = label_regex().captures(content) {
        LineKind::Label(captures[1].to_lowercase())
    } else if let Some(rest) = content.strip_prefix('*') {
        let (rest, suppress_echo) = match rest.strip_prefix('-') {
            Some(stripped) => (stripped, true),
            None => (rest, false),
        };
        let (text, text_id) = split_text_id(rest.trim());
        LineKind::Choice {
            text,
            suppress_echo,
            text_id,
        }
    } else if content.starts_with('[') {
        parse_command(content)
    } else if let Some(captures) = speaker_regex().captures(content) {
        let speaker = captures[1].to_string();
        let (text, text_id) = split_text_id(captures[2].trim());
        LineKind::Text {
            speaker,
            text,
            text_id,
        }
    } else {
        let (text, _) = split_text_id(content);
        LineKind::Continuation { text }
    };

    Line {
        number,
        indent,
        kind,
    }
}

fn parse_metadata(rest: &str, transient: bool) -> LineKind {
    let Some((key, value)) = rest.split_once(':') else {
        return LineKind::Invalid {
            message: format!("Metadata line is missing \"key: value\": {}", rest.trim()),
        };
    };
    let key = key.trim().to_string();
    let value = value.trim().to_string();
    if transient {
        LineKind::TransientMeta { key, value }
    } else {
        LineKind::PersistentMeta { key, value }
    }
}

fn parse_command(content: &str) -> LineKind {
    // The command body may be followed by an id pin outside the brackets.
    let (without_gosub_id, gosub_id) = split_gosub_id(content);
    let (without_text_id, text_id) = split_text_id(&without_gosub_id);

    let trimmed = without_text_id.trim();
    let Some(body) = trimmed
        .strip_prefix('[')
        .and_then(|rest| rest.strip_suffix(']'))
    else {
        return LineKind::Invalid {
            message: format!("Bracketed command is missing a closing bracket: {}", content),
        };
    };

    let body = body.trim();
    let (word, rest) = match body.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (body, ""),
    };

    match word.to_lowercase().as_str() {
        "if" => LineKind::If {
            expr: rest.to_string(),
        },
        "elseif" => LineKind::ElseIf {
            expr: rest.to_string(),
        },
        "else" => LineKind::Else,
        "endif" => LineKind::EndIf,
        "random" => LineKind::Random,
        "or" => LineKind::Or,
        "endrandom" => LineKind::EndRandom,
        "goto" => parse_goto(rest),
        "gosub" => parse_gosub(rest, gosub_id),
        "go" => match rest.split_once(char::is_whitespace) {
            Some((second, tail)) if second.eq_ignore_ascii_case("to") => parse_goto(tail.trim()),
            Some((second, tail)) if second.eq_ignore_ascii_case("sub") => {
                parse_gosub(tail.trim(), gosub_id)
            }
            _ => LineKind::Invalid {
                message: format!("Expected \"go to\" or \"go sub\": [{}]", body),
            },
        },
        "return" => LineKind::Return,
        "set" => parse_set(rest, text_id),
        "event" => parse_event(rest),
        "importsetting" => match rest.split_once(char::is_whitespace) {
            Some((key, value)) => LineKind::ImportSetting {
                key: key.to_string(),
                value: value.trim().to_string(),
            },
            None => LineKind::Invalid {
                message: format!("[importsetting] needs a key and a value: [{}]", body),
            },
        },
        other => LineKind::Invalid {
            message: format!("Unknown command \"{}\": [{}]", other, body),
        },
    }
}

fn parse_goto(rest: &str) -> LineKind {
    if rest.is_empty() {
        return LineKind::Invalid {
            message: "[goto] needs a label.".to_string(),
        };
    }
    LineKind::Goto {
        label: rest.to_lowercase(),
    }
}

fn parse_gosub(rest: &str, gosub_id: Option<String>) -> LineKind {
    if rest.is_empty() {
        return LineKind::Invalid {
            message: "[gosub] needs a label.".to_string(),
        };
    }
    LineKind::Gosub {
        label: rest.to_lowercase(),
        gosub_id,
    }
}

fn parse_set(rest: &str, text_id: Option<String>) -> LineKind {
    let (name, expr) = match rest.split_once(char::is_whitespace) {
        Some((name, expr)) => (name, expr.trim()),
        None => {
            return LineKind::Invalid {
                message: format!("[set] needs a name and an expression: {}", rest),
            }
        }
    };
    let expr = expr.strip_prefix('=').map(str::trim).unwrap_or(expr);
    LineKind::Set {
        name: name.to_string(),
        expr: expr.to_string(),
        text_id,
    }
}

fn parse_event(rest: &str) -> LineKind {
    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };
    if name.is_empty() {
        return LineKind::Invalid {
            message: "[event] needs a name.".to_string(),
        };
    }
    LineKind::Event {
        name: name.to_string(),
        args: split_event_args(args),
    }
}

/// Splits event arguments on top-level commas, respecting quoted strings
/// and nested parentheses/braces.
fn split_event_args(args: &str) -> Vec<String> {
    let mut out = Vec::new();
    let mut depth = 0i32;
    let mut in_string = false;
    let mut escaped = false;
    let mut current = String::new();

    for ch in args.chars() {
        if in_string {
            current.push(ch);
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
            continue;
        }
        match ch {
            '"' => {
                in_string = true;
                current.push(ch);
            }
            '(' | '{' => {
                depth += 1;
                current.push(ch);
            }
            ')' | '}' => {
                depth -= 1;
                current.push(ch);
            }
            ',' if depth == 0 => {
                out.push(current.trim().to_string());
                current.clear();
            }
            other => current.push(other),
        }
    }
    if !current.trim().is_empty() {
        out.push(current.trim().to_string());
    }
    out
}

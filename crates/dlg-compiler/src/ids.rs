use std::sync::OnceLock;

use regex::Regex;

use crate::graph::NodeKind;
use crate::parser::ParsedScript;

fn text_id_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@([0-9a-f]+)@$").expect("text id value regex"))
}

fn gosub_id_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^@GS([0-9a-f]+)@$").expect("gosub id value regex"))
}

fn parse_id(regex: &Regex, value: &str) -> Option<u32> {
    let captures = regex.captures(value)?;
    u32::from_str_radix(&captures[1], 16).ok()
}

fn format_text_id(id: u32) -> String {
    format!("@{:04x}@", id)
}

fn format_gosub_id(id: u32) -> String {
    format!("@GS{:04x}@", id)
}

/// Gives every localizable item a stable text id, keeping any id pinned in
/// the source and counting fresh ids up from the highest one seen. Running
/// the output back through the compiler reproduces the same ids.
pub(crate) fn assign_ids(parsed: &mut ParsedScript) {
    let mut next_text_id: u32 = 1;
    let mut next_gosub_id: u32 = 1;
    for node in parsed.header_nodes.iter().chain(parsed.nodes.iter()) {
        match &node.kind {
            NodeKind::Text { text_id, .. } => {
                if let Some(id) = parse_id(text_id_value_regex(), text_id) {
                    next_text_id = next_text_id.max(id + 1);
                }
            }
            NodeKind::SetVariable { text_id: Some(id), .. } => {
                if let Some(id) = parse_id(text_id_value_regex(), id) {
                    next_text_id = next_text_id.max(id + 1);
                }
            }
            NodeKind::Gosub { gosub_id, .. } => {
                if let Some(id) = parse_id(gosub_id_value_regex(), gosub_id) {
                    next_gosub_id = next_gosub_id.max(id + 1);
                }
            }
            _ => {}
        }
        for edge in &node.edges {
            if let Some(id) = edge.text_id.as_deref().and_then(|id| parse_id(text_id_value_regex(), id)) {
                next_text_id = next_text_id.max(id + 1);
            }
        }
    }

    // Synthetic echo lines take their choice edge's id once edges are
    // numbered, never one of their own.
    let echo_indices: std::collections::BTreeSet<usize> =
        parsed.echo_pairs.iter().map(|(_, echo)| *echo).collect();

    for node in parsed.header_nodes.iter_mut() {
        if let NodeKind::SetVariable { text_id: Some(id), .. } = &mut node.kind {
            if id.is_empty() {
                *id = format_text_id(next_text_id);
                next_text_id += 1;
            }
        }
    }

    for (index, node) in parsed.nodes.iter_mut().enumerate() {
        match &mut node.kind {
            NodeKind::Text { text_id, .. } => {
                if text_id.is_empty() && !echo_indices.contains(&index) {
                    *text_id = format_text_id(next_text_id);
                    next_text_id += 1;
                }
            }
            NodeKind::SetVariable { text_id: Some(id), .. } => {
                if id.is_empty() {
                    *id = format_text_id(next_text_id);
                    next_text_id += 1;
                }
            }
            NodeKind::Gosub { gosub_id, .. } => {
                if gosub_id.is_empty() {
                    *gosub_id = format_gosub_id(next_gosub_id);
                    next_gosub_id += 1;
                }
            }
            _ => {}
        }
        for edge in &mut node.edges {
            if edge.text.is_some() && edge.text_id.is_none() {
                edge.text_id = Some(format_text_id(next_text_id));
                next_text_id += 1;
            }
        }
    }

    for ((choice, edge_index), echo) in parsed.echo_pairs.clone() {
        let id = parsed.nodes[choice].edges[edge_index].text_id.clone();
        if let (Some(id), NodeKind::Text { text_id, .. }) =
            (id, &mut parsed.nodes[echo].kind)
        {
            if text_id.is_empty() {
                *text_id = id;
            }
        }
    }
}

fn param_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("param regex"))
}

/// Variable names interpolated in display text, in first-use order.
pub(crate) fn extract_params(text: &str) -> Vec<String> {
    let mut params = Vec::new();
    for captures in param_regex().captures_iter(text) {
        let name = captures[1].to_string();
        if !params.contains(&name) {
            params.push(name);
        }
    }
    params
}

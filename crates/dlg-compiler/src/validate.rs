use std::collections::BTreeSet;

use dlg_core::CompileLog;

use crate::graph::{EdgeKind, NodeKind};
use crate::parser::ParsedNode;

/// Every path out of a choice option must present a speaker line before the
/// player is asked to choose again. A choice reached straight from another
/// choice would render with no dialogue on screen.
pub(crate) fn check_choices_follow_text(nodes: &[ParsedNode], log: &mut CompileLog) {
    for node in nodes {
        if !matches!(node.kind, NodeKind::Choice) {
            continue;
        }
        for edge in &node.edges {
            if edge.kind != EdgeKind::Decision {
                continue;
            }
            let mut visited = BTreeSet::new();
            if !leads_to_text(nodes, edge.target, &mut visited) {
                log.error(
                    edge.source_line,
                    "Choice leads to another choice without a speaker line in between.",
                );
            }
        }
    }
}

fn leads_to_text(
    nodes: &[ParsedNode],
    target: Option<usize>,
    visited: &mut BTreeSet<usize>,
) -> bool {
    let Some(index) = target else {
        // End of dialogue; nothing left to ask.
        return true;
    };
    if !visited.insert(index) {
        return true;
    }
    match &nodes[index].kind {
        NodeKind::Text { .. } => true,
        NodeKind::Choice => false,
        // Gosub destinations are resolved at run time; leave them alone.
        NodeKind::Gosub { .. } | NodeKind::Return => true,
        NodeKind::Select { .. } | NodeKind::SetVariable { .. } | NodeKind::Event { .. } => nodes
            [index]
            .edges
            .iter()
            .all(|edge| leads_to_text(nodes, edge.target, visited)),
    }
}

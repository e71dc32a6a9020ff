use std::collections::{BTreeMap, BTreeSet};

use dlg_core::CompileLog;

use crate::graph::{EdgeKind, NodeKind};
use crate::parser::{ParsedNode, ParsedScript, Paths};

/// Reserved goto/gosub destination that terminates the dialogue.
pub const END_LABEL: &str = "end";

/// Collapses label aliases onto real node targets. `end` and aliases of it
/// map to `None`.
pub(crate) fn resolve_labels(
    parsed: &ParsedScript,
    log: &mut CompileLog,
) -> BTreeMap<String, Option<usize>> {
    let mut labels: BTreeMap<String, Option<usize>> = BTreeMap::new();
    for (name, index) in &parsed.direct_labels {
        if name == END_LABEL {
            let line = parsed.nodes[*index].source_line;
            log.warning(line, "Label \"end\" is reserved and cannot be redefined.");
            continue;
        }
        labels.insert(name.clone(), Some(*index));
    }
    labels.insert(END_LABEL.to_string(), None);

    for (alias, first_target) in &parsed.label_aliases {
        if labels.contains_key(alias) {
            continue;
        }
        let mut seen = BTreeSet::new();
        seen.insert(alias.clone());
        let mut current = first_target.clone();
        let resolved = loop {
            if let Some(found) = labels.get(&current) {
                break Some(*found);
            }
            if !seen.insert(current.clone()) {
                log.error(0, format!("Label alias \"{}\" forms a cycle.", alias));
                break None;
            }
            match parsed.label_aliases.get(&current) {
                Some(next) => current = next.clone(),
                None => break None,
            }
        };
        match resolved {
            Some(target) => {
                labels.insert(alias.clone(), target);
            }
            None => {
                log.error(
                    0,
                    format!("Label \"{}\" aliases \"{}\", which is never defined.", alias, current),
                );
                labels.insert(alias.clone(), None);
            }
        }
    }
    labels
}

/// Rewrites deferred `[goto]` destinations into concrete node targets.
pub(crate) fn resolve_goto_targets(
    nodes: &mut [ParsedNode],
    labels: &BTreeMap<String, Option<usize>>,
    log: &mut CompileLog,
) {
    for node in nodes.iter_mut() {
        for edge in &mut node.edges {
            let Some(label) = edge.target_label.take() else {
                continue;
            };
            match labels.get(&label) {
                Some(Some(target)) => edge.target = Some(*target),
                Some(None) => edge.explicit_end = true,
                None => {
                    log.error(
                        edge.source_line,
                        format!("Goto destination \"{}\" is not defined.", label),
                    );
                    edge.explicit_end = true;
                }
            }
        }
    }
}

/// Connects everything still dangling after parsing: nodes with no outgoing
/// edge, empty choice options, conditional branches with empty bodies and
/// if-blocks missing an else all fall through to the nearest following node
/// in an enclosing scope. No candidate means the dialogue ends there.
pub(crate) fn apply_fallthrough(nodes: &mut Vec<ParsedNode>) {
    for index in 0..nodes.len() {
        match nodes[index].kind {
            NodeKind::Text { .. }
            | NodeKind::SetVariable { .. }
            | NodeKind::Event { .. }
            | NodeKind::Gosub { .. } => {
                if nodes[index].edges.is_empty() {
                    let paths = nodes[index].paths.clone();
                    let target = find_fallthrough(nodes, index, &paths);
                    let line = nodes[index].source_line;
                    let mut edge =
                        crate::parser::ParsedEdge::new(EdgeKind::Continue, line, paths);
                    edge.target = target;
                    nodes[index].edges.push(edge);
                }
            }
            NodeKind::Select { random } => {
                // An if-block without an else still needs an exit for the
                // all-conditions-false case.
                if !random
                    && !nodes[index]
                        .edges
                        .iter()
                        .any(|edge| edge.kind == EdgeKind::Condition && edge.condition.is_none())
                {
                    let paths = nodes[index].paths.clone();
                    let target = find_fallthrough(nodes, index, &paths);
                    let line = nodes[index].source_line;
                    let mut edge =
                        crate::parser::ParsedEdge::new(EdgeKind::Condition, line, paths);
                    edge.target = target;
                    nodes[index].edges.push(edge);
                }
            }
            NodeKind::Choice | NodeKind::Return => {}
        }

        // Branch and option edges whose bodies ended without linking
        // anywhere fall through from their own scope.
        for edge_index in 0..nodes[index].edges.len() {
            let edge = &nodes[index].edges[edge_index];
            if edge.target.is_some()
                || edge.explicit_end
                || !matches!(edge.kind, EdgeKind::Decision | EdgeKind::Condition)
            {
                continue;
            }
            let paths = edge.paths.clone();
            let target = find_fallthrough(nodes, index, &paths);
            nodes[index].edges[edge_index].target = target;
        }
    }
}

/// Nearest node after `after` whose scope encloses (is a prefix of) the
/// dangling scope. Nodes only reachable over Chained edges are internal to
/// a choice set and never valid fallthrough destinations.
fn find_fallthrough(nodes: &[ParsedNode], after: usize, paths: &Paths) -> Option<usize> {
    for (index, node) in nodes.iter().enumerate().skip(after + 1) {
        if matches!(node.incoming, Some((_, _, EdgeKind::Chained))) {
            continue;
        }
        if node.paths.is_prefix_of(paths) {
            return Some(index);
        }
    }
    None
}

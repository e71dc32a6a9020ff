//! Compiles dialogue scripts into an executable node graph.
//!
//! Compilation never fails outright: syntax problems become diagnostics in
//! the returned [`dlg_core::CompileLog`] and the offending construct is
//! skipped or defaulted, so a script with errors still produces a graph
//! that can be inspected or partially played.

pub mod graph;

mod ids;
mod lines;
mod parser;
mod resolve;
mod validate;

use std::collections::BTreeMap;

use dlg_core::CompileLog;

pub use graph::{CompiledScript, Edge, EdgeKind, Node, NodeKind};
pub use lines::TAB_INDENT_WIDTH;
pub use parser::ImportSettings;
pub use resolve::END_LABEL;

#[derive(Debug, Clone)]
pub struct CompileResult {
    pub script: CompiledScript,
    pub log: CompileLog,
}

/// Runs the full pipeline: line classification and parsing, label and goto
/// resolution, fallthrough wiring, the choice-placement check, and stable
/// id assignment.
pub fn compile(source: &str) -> CompileResult {
    let mut log = CompileLog::default();
    let mut parsed = parser::Parser::new().run(source, &mut log);

    let labels = resolve::resolve_labels(&parsed, &mut log);
    resolve::resolve_goto_targets(&mut parsed.nodes, &labels, &mut log);
    resolve::apply_fallthrough(&mut parsed.header_nodes);
    resolve::apply_fallthrough(&mut parsed.nodes);
    validate::check_choices_follow_text(&parsed.nodes, &mut log);
    ids::assign_ids(&mut parsed);

    CompileResult {
        script: emit(parsed, labels),
        log,
    }
}

fn emit(
    parsed: parser::ParsedScript,
    labels: BTreeMap<String, Option<usize>>,
) -> CompiledScript {
    CompiledScript {
        nodes: parsed.nodes.into_iter().map(emit_node).collect(),
        header_nodes: parsed.header_nodes.into_iter().map(emit_node).collect(),
        labels,
        speakers: parsed.speakers,
    }
}

fn emit_node(node: parser::ParsedNode) -> Node {
    let mut kind = node.kind;
    if let NodeKind::Text { text, params, .. } = &mut kind {
        *params = ids::extract_params(text);
    }
    Node {
        kind,
        edges: node.edges.into_iter().map(emit_edge).collect(),
        source_line: node.source_line,
    }
}

fn emit_edge(edge: parser::ParsedEdge) -> Edge {
    Edge {
        kind: edge.kind,
        params: edge
            .text
            .as_deref()
            .map(ids::extract_params)
            .unwrap_or_default(),
        text: edge.text,
        text_id: edge.text_id,
        condition: edge.condition,
        target: edge.target,
        source_line: edge.source_line,
        metadata: edge.metadata,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compile_clean(source: &str) -> CompiledScript {
        let result = compile(source);
        assert!(
            !result.log.has_errors(),
            "unexpected compile errors: {:?}",
            result.log
        );
        result.script
    }

    fn text_of(script: &CompiledScript, index: usize) -> &str {
        match &script.nodes[index].kind {
            NodeKind::Text { text, .. } => text,
            other => panic!("node {} is not a text node: {:?}", index, other),
        }
    }

    fn sole_target(script: &CompiledScript, index: usize) -> Option<usize> {
        let edges = &script.nodes[index].edges;
        assert_eq!(edges.len(), 1, "node {} has {} edges", index, edges.len());
        edges[0].target
    }

    #[test]
    fn linear_lines_chain_in_source_order() {
        let script = compile_clean("NPC: One\nNPC: Two\n");
        assert_eq!(script.nodes.len(), 2);
        assert_eq!(script.nodes[0].edges[0].kind, EdgeKind::Continue);
        assert_eq!(sole_target(&script, 0), Some(1));
        assert_eq!(sole_target(&script, 1), None);
        assert_eq!(script.speakers, vec!["NPC".to_string()]);
    }

    #[test]
    fn sibling_options_share_one_choice_node() {
        let script = compile_clean(
            "NPC: Pick\n\
             * one\n\
             \x20 NPC: a\n\
             * two\n\
             \x20 NPC: b\n\
             NPC: after\n",
        );
        // Text chains into the choice root.
        assert_eq!(script.nodes[0].edges[0].kind, EdgeKind::Chained);
        assert_eq!(script.nodes[0].edges[0].target, Some(1));
        assert!(matches!(script.nodes[1].kind, NodeKind::Choice));

        let decisions = &script.nodes[1].edges;
        assert_eq!(decisions.len(), 2);
        assert_eq!(decisions[0].text.as_deref(), Some("one"));
        assert_eq!(decisions[1].text.as_deref(), Some("two"));
        assert_eq!(text_of(&script, decisions[0].target.unwrap()), "a");
        assert_eq!(text_of(&script, decisions[1].target.unwrap()), "b");

        // Both option bodies fall through past their siblings to "after".
        assert_eq!(sole_target(&script, 2), Some(4));
        assert_eq!(sole_target(&script, 3), Some(4));
        assert_eq!(text_of(&script, 4), "after");
    }

    #[test]
    fn empty_option_skips_sibling_bodies() {
        let script = compile_clean(
            "NPC: Pick\n\
             * stay quiet\n\
             * speak\n\
             \x20 NPC: words\n\
             NPC: after\n",
        );
        let decisions = &script.nodes[1].edges;
        // The empty option must not fall into its sibling's body.
        assert_eq!(text_of(&script, decisions[0].target.unwrap()), "after");
        assert_eq!(text_of(&script, decisions[1].target.unwrap()), "words");
    }

    #[test]
    fn nested_choice_bodies_fall_to_outer_scope() {
        let script = compile_clean(
            "NPC: Pick\n\
             * C1\n\
             \x20 NPC: one\n\
             \x20 * C1.1\n\
             \x20\x20\x20 NPC: deep\n\
             * C2\n\
             \x20 NPC: two\n\
             NPC: after\n",
        );
        let after = script
            .nodes
            .iter()
            .position(|node| matches!(&node.kind, NodeKind::Text { text, .. } if text == "after"))
            .expect("after node");
        let deep = script
            .nodes
            .iter()
            .position(|node| matches!(&node.kind, NodeKind::Text { text, .. } if text == "deep"))
            .expect("deep node");
        let two = script
            .nodes
            .iter()
            .position(|node| matches!(&node.kind, NodeKind::Text { text, .. } if text == "two"))
            .expect("two node");
        assert_eq!(sole_target(&script, deep), Some(after));
        assert_eq!(sole_target(&script, two), Some(after));
    }

    #[test]
    fn if_without_else_gets_a_default_exit() {
        let script = compile_clean(
            "NPC: hi\n\
             [if {x} > 0]\n\
             \x20 NPC: pos\n\
             [endif]\n\
             NPC: after\n",
        );
        assert!(matches!(script.nodes[1].kind, NodeKind::Select { random: false }));
        let branches = &script.nodes[1].edges;
        assert_eq!(branches.len(), 2);
        assert!(branches[0].condition.is_some());
        assert_eq!(branches[0].target, Some(2));
        assert!(branches[1].condition.is_none());
        assert_eq!(branches[1].target, Some(4));
        assert_eq!(sole_target(&script, 2), Some(4));
    }

    #[test]
    fn elseif_chain_orders_branches() {
        let script = compile_clean(
            "NPC: hi\n\
             [if {x} > 0]\n\
             \x20 NPC: pos\n\
             [elseif {x} < 0]\n\
             \x20 NPC: neg\n\
             [else]\n\
             \x20 NPC: zero\n\
             [endif]\n\
             NPC: after\n",
        );
        let branches = &script.nodes[1].edges;
        assert_eq!(branches.len(), 3);
        assert!(branches[0].condition.is_some());
        assert!(branches[1].condition.is_some());
        assert!(branches[2].condition.is_none());
        assert_eq!(text_of(&script, branches[2].target.unwrap()), "zero");
    }

    #[test]
    fn choices_inside_conditionals_root_above_the_select() {
        let script = compile_clean(
            "NPC: hi\n\
             [if {x}]\n\
             \x20 * A\n\
             \x20\x20\x20 NPC: a\n\
             [endif]\n\
             NPC: after\n",
        );
        // hi chains into a synthetic choice root above the select.
        let root_edge = &script.nodes[0].edges[0];
        assert_eq!(root_edge.kind, EdgeKind::Chained);
        let root = root_edge.target.expect("choice root");
        assert!(matches!(script.nodes[root].kind, NodeKind::Choice));
        assert_eq!(script.nodes[root].edges[0].kind, EdgeKind::Chained);
        assert_eq!(script.nodes[root].edges[0].target, Some(1));

        // The select keeps the inner choice on its true branch and exits to
        // "after" when false, never looping back into the root.
        let branches = &script.nodes[1].edges;
        let inner = branches[0].target.expect("inner choice");
        assert!(matches!(script.nodes[inner].kind, NodeKind::Choice));
        assert_eq!(
            text_of(&script, branches[1].target.expect("default branch")),
            "after"
        );
        assert_eq!(
            text_of(&script, script.nodes[inner].edges[0].target.expect("option body")),
            "a"
        );
    }

    #[test]
    fn random_blocks_keep_every_branch_unconditional() {
        let script = compile_clean(
            "NPC: hi\n\
             [random]\n\
             \x20 NPC: heads\n\
             [or]\n\
             \x20 NPC: tails\n\
             [endrandom]\n\
             NPC: done\n",
        );
        assert!(matches!(script.nodes[1].kind, NodeKind::Select { random: true }));
        let branches = &script.nodes[1].edges;
        assert_eq!(branches.len(), 2);
        assert!(branches.iter().all(|edge| edge.condition.is_none()));
        assert_eq!(text_of(&script, branches[0].target.unwrap()), "heads");
        assert_eq!(text_of(&script, branches[1].target.unwrap()), "tails");
        assert_eq!(sole_target(&script, 2), Some(4));
        assert_eq!(sole_target(&script, 3), Some(4));
    }

    #[test]
    fn goto_resolves_forward_labels() {
        let script = compile_clean(
            "NPC: one\n\
             [goto skip]\n\
             NPC: never\n\
             :skip\n\
             NPC: two\n",
        );
        assert_eq!(sole_target(&script, 0), Some(2));
        assert_eq!(script.label_target("skip"), Some(Some(2)));
        // The skipped line still resolves somewhere sensible.
        assert_eq!(sole_target(&script, 1), Some(2));
    }

    #[test]
    fn label_before_goto_becomes_an_alias() {
        let script = compile_clean(
            "NPC: intro\n\
             :shortcut\n\
             [goto real]\n\
             NPC: filler\n\
             :real\n\
             NPC: destination\n",
        );
        let destination = script.label_target("real").flatten().expect("real label");
        assert_eq!(script.label_target("shortcut"), Some(Some(destination)));
        assert_eq!(text_of(&script, destination), "destination");
    }

    #[test]
    fn goto_end_terminates_the_dialogue() {
        let script = compile_clean("NPC: hi\n[goto end]\nNPC: unreachable\n");
        assert_eq!(sole_target(&script, 0), None);
        assert_eq!(script.label_target(END_LABEL), Some(None));
    }

    #[test]
    fn undefined_goto_label_is_an_error() {
        let result = compile("NPC: hi\n[goto nowhere]\n");
        assert!(result.log.has_errors());
        // Degrades to end of dialogue.
        assert_eq!(result.script.nodes[0].edges[0].target, None);
    }

    #[test]
    fn gosub_and_return_compile_to_nodes() {
        let script = compile_clean(
            "NPC: hi\n\
             [gosub aside]\n\
             NPC: back\n\
             [goto end]\n\
             :aside\n\
             NPC: in sub\n\
             [return]\n",
        );
        let NodeKind::Gosub { label, gosub_id } = &script.nodes[1].kind else {
            panic!("expected gosub node");
        };
        assert_eq!(label, "aside");
        assert_eq!(gosub_id, "@GS0001@");
        // The gosub's continue edge is where [return] comes back to.
        assert_eq!(sole_target(&script, 1), Some(2));
        let aside = script.label_target("aside").flatten().expect("aside label");
        assert_eq!(text_of(&script, aside), "in sub");
        assert!(matches!(
            script.nodes[aside + 1].kind,
            NodeKind::Return
        ));
    }

    #[test]
    fn text_ids_count_up_from_the_highest_pin() {
        let script = compile_clean("NPC: one @0007@\nNPC: two\n");
        assert_eq!(script.text_id_of(0), Some("@0007@"));
        assert_eq!(script.text_id_of(1), Some("@0008@"));
    }

    #[test]
    fn generated_speaker_lines_echo_the_choice() {
        let script = compile_clean(
            "[importsetting GenerateSpeakerLinesFromChoices true]\n\
             [importsetting SpeakerIDForGeneratedLinesFromChoices Bob]\n\
             NPC: Pick\n\
             * Option A\n\
             \x20 NPC: next\n",
        );
        let choice = script.nodes[0].edges[0].target.expect("choice root");
        let decision = &script.nodes[choice].edges[0];
        let echo = decision.target.expect("echo node");
        let NodeKind::Text { speaker, text, text_id, .. } = &script.nodes[echo].kind else {
            panic!("expected echo text node");
        };
        assert_eq!(speaker, "Bob");
        assert_eq!(text, "Option A");
        assert_eq!(Some(text_id.as_str()), decision.text_id.as_deref());
        // The echo keeps flowing into the option body.
        assert_eq!(text_of(&script, script.nodes[echo].edges[0].target.unwrap()), "next");
    }

    #[test]
    fn suppressed_choices_skip_the_echo() {
        let script = compile_clean(
            "[importsetting GenerateSpeakerLinesFromChoices true]\n\
             NPC: Pick\n\
             *- silent\n\
             \x20 NPC: next\n",
        );
        let choice = script.nodes[0].edges[0].target.expect("choice root");
        let target = script.nodes[choice].edges[0].target.expect("option body");
        assert_eq!(text_of(&script, target), "next");
    }

    #[test]
    fn header_sets_are_kept_separate_from_the_body() {
        let script = compile_clean(
            "===\n\
             [set hp 10]\n\
             [set name \"Ada\"]\n\
             ===\n\
             NPC: hi\n",
        );
        assert_eq!(script.header_nodes.len(), 2);
        assert!(matches!(
            &script.header_nodes[0].kind,
            NodeKind::SetVariable { name, .. } if name == "hp"
        ));
        // A text literal assignment is localizable and gets an id.
        assert!(matches!(
            &script.header_nodes[1].kind,
            NodeKind::SetVariable { text_id: Some(id), .. } if !id.is_empty()
        ));
        assert_eq!(script.nodes.len(), 1);
    }

    #[test]
    fn speaker_lines_in_the_header_are_rejected() {
        let result = compile("===\nNPC: not allowed here\n===\nNPC: hi\n");
        assert!(result.log.has_errors());
        assert_eq!(result.script.nodes.len(), 1);
    }

    #[test]
    fn choice_straight_after_choice_is_flagged() {
        let result = compile(
            "NPC: hi\n\
             * A\n\
             \x20 * B\n\
             \x20\x20\x20 NPC: b\n",
        );
        assert!(result.log.has_errors());
    }

    #[test]
    fn unparseable_condition_is_a_diagnostic_not_a_crash() {
        let result = compile(
            "NPC: hi\n\
             [if an\u{20ac}]\n\
             \x20 NPC: inside\n\
             [endif]\n",
        );
        assert!(result.log.has_errors());
        assert!(!result.script.nodes.is_empty());
    }

    #[test]
    fn continuation_lines_extend_the_previous_text() {
        let script = compile_clean("NPC: first part\n\x20 and the rest\n");
        assert_eq!(text_of(&script, 0), "first part\nand the rest");
    }

    #[test]
    fn interpolation_params_are_collected_in_order() {
        let script = compile_clean("NPC: Hello {name}, you have {gold} and {name}\n");
        let NodeKind::Text { params, .. } = &script.nodes[0].kind else {
            panic!("expected text node");
        };
        assert_eq!(params, &["name".to_string(), "gold".to_string()]);
    }

    #[test]
    fn metadata_attaches_to_the_next_line_only() {
        let script = compile_clean(
            "#= mood: angry\n\
             NPC: What!\n\
             NPC: Calm again.\n",
        );
        let NodeKind::Text { metadata, .. } = &script.nodes[0].kind else {
            panic!("expected text node");
        };
        assert_eq!(metadata.get("mood").map(String::as_str), Some("angry"));
        let NodeKind::Text { metadata, .. } = &script.nodes[1].kind else {
            panic!("expected text node");
        };
        assert!(metadata.is_empty());
    }

    #[test]
    fn oversized_id_pins_do_not_collide() {
        let script = compile_clean(
            "NPC: one @ffffffff1@\n\
             NPC: two @ffffffff2@\n",
        );
        let first = script.text_id_of(0).expect("first line has an id");
        let second = script.text_id_of(1).expect("second line has an id");
        assert_ne!(first, second);
        // The unusable pin stays in the text instead of vanishing.
        assert!(text_of(&script, 0).ends_with("@ffffffff1@"));
    }

    #[test]
    fn recompilation_reproduces_shape_and_generated_ids() {
        let source = "NPC: Pick\n\
                      * one\n\
                      \x20 NPC: a\n\
                      * two\n\
                      \x20 [gosub aside]\n\
                      :aside\n\
                      NPC: b\n\
                      [return]\n";
        let first = compile_clean(source);
        let second = compile_clean(source);
        assert_eq!(first, second);
    }

    #[test]
    fn loose_continuation_keeps_the_enclosing_scope_open() {
        let script = compile_clean(
            "NPC: Pick\n\
             * one\n\
             \x20 NPC: a\n\
             wrapped tail\n\
             NPC: still inside\n",
        );
        assert_eq!(text_of(&script, 2), "a\nwrapped tail");
        // The out-dented continuation widened the option scope, so the
        // following line chains inside it instead of closing the choice.
        assert_eq!(sole_target(&script, 2), Some(3));
        assert_eq!(text_of(&script, 3), "still inside");
    }

    #[test]
    fn compiled_script_survives_json_round_trip() {
        let script = compile_clean(
            "NPC: hi {name}\n\
             * yes\n\
             \x20 [set agreed true]\n\
             \x20 NPC: good\n",
        );
        let json = serde_json::to_string(&script).expect("serialize script");
        let back: CompiledScript = serde_json::from_str(&json).expect("deserialize script");
        assert_eq!(back, script);
    }
}

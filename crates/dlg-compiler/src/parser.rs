use std::collections::BTreeMap;

use dlg_core::{CompileLog, Value};
use dlg_expr::{ExprItem, Expression};

use crate::graph::{EdgeKind, NodeKind};
use crate::lines::{classify, LineKind};

/// Importer settings, adjustable from the script via `[importsetting]`.
#[derive(Debug, Clone)]
pub struct ImportSettings {
    /// When set, every choice option gets a synthetic spoken Text node
    /// echoing the choice text, chained right after the Decision edge.
    pub generate_speaker_lines: bool,
    pub speaker_for_generated_lines: String,
}

impl Default for ImportSettings {
    fn default() -> Self {
        Self {
            generate_speaker_lines: false,
            speaker_for_generated_lines: "Player".to_string(),
        }
    }
}

/// Choice / conditional ancestry of a node or edge: the stack of
/// `(branch owner, branch ordinal)` segments open at creation time.
/// Fallthrough legality is a prefix test over these.
#[derive(Debug, Clone, Default, PartialEq)]
pub(crate) struct Paths {
    pub choice: Vec<(usize, usize)>,
    pub conditional: Vec<(usize, usize)>,
}

pub(crate) fn is_path_prefix(prefix: &[(usize, usize)], full: &[(usize, usize)]) -> bool {
    prefix.len() <= full.len() && prefix == &full[..prefix.len()]
}

impl Paths {
    pub fn is_prefix_of(&self, other: &Paths) -> bool {
        is_path_prefix(&self.choice, &other.choice)
            && is_path_prefix(&self.conditional, &other.conditional)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ParsedEdge {
    pub kind: EdgeKind,
    pub text: Option<String>,
    pub text_id: Option<String>,
    pub condition: Option<Expression>,
    pub target: Option<usize>,
    /// Deferred goto destination, resolved once the whole file is parsed.
    pub target_label: Option<String>,
    /// An explicit `[goto end]`; fallthrough must leave the edge alone.
    pub explicit_end: bool,
    pub source_line: usize,
    pub metadata: BTreeMap<String, String>,
    pub paths: Paths,
}

impl ParsedEdge {
    pub(crate) fn new(kind: EdgeKind, source_line: usize, paths: Paths) -> Self {
        Self {
            kind,
            text: None,
            text_id: None,
            condition: None,
            target: None,
            target_label: None,
            explicit_end: false,
            source_line,
            metadata: BTreeMap::new(),
            paths,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ParsedNode {
    pub kind: NodeKind,
    pub edges: Vec<ParsedEdge>,
    pub source_line: usize,
    pub paths: Paths,
    /// First edge that linked into this node, for choice-root splicing and
    /// for excluding chained-only nodes from fallthrough targeting.
    pub incoming: Option<(usize, usize, EdgeKind)>,
}

#[derive(Debug)]
pub(crate) struct ParsedScript {
    pub nodes: Vec<ParsedNode>,
    pub header_nodes: Vec<ParsedNode>,
    pub direct_labels: BTreeMap<String, usize>,
    pub label_aliases: BTreeMap<String, String>,
    pub speakers: Vec<String>,
    /// Decision edge and the synthetic echo Text node sharing its text id.
    pub echo_pairs: Vec<((usize, usize), usize)>,
}

struct Frame {
    threshold: usize,
    last_node: Option<usize>,
    /// Open choice at this level; further `*` lines add sibling edges.
    choice_node: Option<usize>,
    /// Select awaiting `elseif`/`else`/`endif` at this level, with the
    /// indent its `[if]` appeared at.
    open_select: Option<(usize, usize)>,
    pending_edge: Option<(usize, usize)>,
    paths: Paths,
}

impl Frame {
    fn root() -> Self {
        Self {
            threshold: 0,
            last_node: None,
            choice_node: None,
            open_select: None,
            pending_edge: None,
            paths: Paths::default(),
        }
    }
}

pub(crate) struct Parser {
    nodes: Vec<ParsedNode>,
    header_nodes: Vec<ParsedNode>,
    frames: Vec<Frame>,
    direct_labels: BTreeMap<String, usize>,
    label_aliases: BTreeMap<String, String>,
    pending_labels: Vec<(String, usize)>,
    speakers: Vec<String>,
    echo_pairs: Vec<((usize, usize), usize)>,
    pub settings: ImportSettings,
    last_text_node: Option<usize>,
    in_header: bool,
    header_done: bool,
    transient_meta: BTreeMap<String, String>,
    persistent_meta: Vec<(usize, String, String)>,
}

impl Parser {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            header_nodes: Vec::new(),
            frames: vec![Frame::root()],
            direct_labels: BTreeMap::new(),
            label_aliases: BTreeMap::new(),
            pending_labels: Vec::new(),
            speakers: Vec::new(),
            echo_pairs: Vec::new(),
            settings: ImportSettings::default(),
            last_text_node: None,
            in_header: false,
            header_done: false,
            transient_meta: BTreeMap::new(),
            persistent_meta: Vec::new(),
        }
    }

    pub fn run(mut self, source: &str, log: &mut CompileLog) -> ParsedScript {
        for (index, raw) in source.lines().enumerate() {
            let line = classify(index + 1, raw);
            if matches!(line.kind, LineKind::Blank | LineKind::Comment) {
                continue;
            }
            if self.in_header {
                self.handle_header_line(line, log);
                continue;
            }
            self.handle_body_line(line, log);
        }

        if self.in_header {
            log.warning(0, "Header section was never closed with ===.");
            self.close_header();
        }

        // Labels at end of file alias to the reserved end destination.
        for (label, _) in std::mem::take(&mut self.pending_labels) {
            self.label_aliases.insert(label, "end".to_string());
        }

        ParsedScript {
            nodes: self.nodes,
            header_nodes: self.header_nodes,
            direct_labels: self.direct_labels,
            label_aliases: self.label_aliases,
            speakers: self.speakers,
            echo_pairs: self.echo_pairs,
        }
    }

    fn handle_header_line(&mut self, line: crate::lines::Line, log: &mut CompileLog) {
        match line.kind {
            LineKind::HeaderDelimiter => self.close_header(),
            LineKind::Set { name, expr, text_id } => {
                self.pop_frames(line.indent);
                self.append_set(name, &expr, text_id, line.number, log);
            }
            LineKind::ImportSetting { key, value } => {
                self.apply_import_setting(&key, &value, line.number, log)
            }
            LineKind::If { expr } => {
                self.pop_frames(line.indent);
                let condition = self.parse_condition(&expr, line.number, log);
                self.begin_select(false, Some(condition), line.indent, line.number);
            }
            LineKind::ElseIf { expr } => {
                let condition = self.parse_condition(&expr, line.number, log);
                self.continue_select(false, Some(condition), line.indent, line.number, log);
            }
            LineKind::Else => self.continue_select(false, None, line.indent, line.number, log),
            LineKind::EndIf => self.end_select(false, line.indent, line.number, log),
            other => {
                log.error(
                    line.number,
                    format!(
                        "Only set, conditional and importsetting lines may appear in the header, found {}.",
                        kind_name(&other)
                    ),
                );
            }
        }
    }

    fn close_header(&mut self) {
        self.in_header = false;
        self.header_done = true;
        self.header_nodes = std::mem::take(&mut self.nodes);
        self.frames = vec![Frame::root()];
        self.last_text_node = None;
    }

    fn handle_body_line(&mut self, line: crate::lines::Line, log: &mut CompileLog) {
        let number = line.number;
        let indent = line.indent;
        match line.kind {
            LineKind::Blank | LineKind::Comment => {}
            LineKind::TransientMeta { key, value } => {
                self.transient_meta.insert(key, value);
            }
            LineKind::PersistentMeta { key, value } => {
                self.persistent_meta.push((indent, key, value));
            }
            LineKind::HeaderDelimiter => {
                if self.header_done || !self.nodes.is_empty() {
                    log.warning(number, "Header delimiter after body lines is ignored.");
                } else {
                    self.in_header = true;
                }
            }
            LineKind::Label(name) => {
                self.pending_labels.push((name, number));
            }
            LineKind::Invalid { message } => log.error(number, message),
            LineKind::Choice {
                text,
                suppress_echo,
                text_id,
            } => {
                self.prepare_content_line(indent);
                self.handle_choice(text, suppress_echo, text_id, indent, number);
            }
            LineKind::If { expr } => {
                self.prepare_content_line(indent);
                let condition = self.parse_condition(&expr, number, log);
                self.begin_select(false, Some(condition), indent, number);
            }
            LineKind::ElseIf { expr } => {
                let condition = self.parse_condition(&expr, number, log);
                self.continue_select(false, Some(condition), indent, number, log);
            }
            LineKind::Else => self.continue_select(false, None, indent, number, log),
            LineKind::EndIf => self.end_select(false, indent, number, log),
            LineKind::Random => {
                self.prepare_content_line(indent);
                self.begin_select(true, None, indent, number);
            }
            LineKind::Or => self.continue_select(true, None, indent, number, log),
            LineKind::EndRandom => self.end_select(true, indent, number, log),
            LineKind::Goto { label } => {
                self.prepare_content_line(indent);
                self.handle_goto(label, number, log);
            }
            LineKind::Gosub { label, gosub_id } => {
                self.prepare_content_line(indent);
                let node = self.append_node(
                    NodeKind::Gosub {
                        label,
                        gosub_id: gosub_id.unwrap_or_default(),
                    },
                    number,
                );
                self.attach_to_flow(node);
                self.top_mut().last_node = Some(node);
            }
            LineKind::Return => {
                self.prepare_content_line(indent);
                let node = self.append_node(NodeKind::Return, number);
                self.attach_to_flow(node);
                self.top_mut().last_node = None;
            }
            LineKind::Set { name, expr, text_id } => {
                self.prepare_content_line(indent);
                self.append_set(name, &expr, text_id, number, log);
            }
            LineKind::Event { name, args } => {
                self.prepare_content_line(indent);
                let mut parsed_args = Vec::with_capacity(args.len());
                for arg in &args {
                    parsed_args.push(self.parse_condition(arg, number, log));
                }
                let node = self.append_node(
                    NodeKind::Event {
                        name,
                        args: parsed_args,
                    },
                    number,
                );
                self.attach_to_flow(node);
                self.top_mut().last_node = Some(node);
            }
            LineKind::ImportSetting { key, value } => {
                self.apply_import_setting(&key, &value, number, log)
            }
            LineKind::Text {
                speaker,
                text,
                text_id,
            } => {
                self.prepare_content_line(indent);
                self.handle_text(speaker, text, text_id, indent, number);
            }
            LineKind::Continuation { text } => {
                match self.last_text_node {
                    Some(index) => {
                        if let NodeKind::Text { text: existing, .. } = &mut self.nodes[index].kind {
                            existing.push('\n');
                            existing.push_str(&text);
                        }
                        // Loose continuation indentation is cosmetic; it
                        // widens the enclosing scope instead of closing it.
                        let top = self.top_mut();
                        top.threshold = top.threshold.min(indent);
                    }
                    None => log.warning(
                        number,
                        "Continuation line has no preceding speaker line to extend.",
                    ),
                }
            }
        }
    }

    // Frame upkeep shared by every content line: close finished scopes,
    // expire indentation-scoped metadata, notice unterminated blocks.
    fn prepare_content_line(&mut self, indent: usize) {
        self.pop_frames(indent);
        self.persistent_meta.retain(|(scope, _, _)| *scope <= indent);
    }

    fn pop_frames(&mut self, indent: usize) {
        while self.frames.len() > 1 {
            let top = self.frames.last().expect("frame stack is never empty");
            if indent < top.threshold {
                self.frames.pop();
            } else {
                break;
            }
        }
    }

    fn top_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("frame stack is never empty")
    }

    fn top(&self) -> &Frame {
        self.frames.last().expect("frame stack is never empty")
    }

    fn take_metadata(&mut self) -> BTreeMap<String, String> {
        let mut metadata: BTreeMap<String, String> = self
            .persistent_meta
            .iter()
            .map(|(_, key, value)| (key.clone(), value.clone()))
            .collect();
        metadata.extend(std::mem::take(&mut self.transient_meta));
        metadata
    }

    fn parse_condition(
        &mut self,
        source: &str,
        line: usize,
        log: &mut CompileLog,
    ) -> Expression {
        match Expression::parse(source) {
            Ok(expression) => expression,
            Err(error) => {
                log.error(line, format!("{} in \"{}\"", error.message, source));
                Expression::default()
            }
        }
    }

    fn append_node(&mut self, kind: NodeKind, source_line: usize) -> usize {
        let paths = self.top().paths.clone();
        self.append_node_with_paths(kind, source_line, paths)
    }

    fn append_node_with_paths(
        &mut self,
        kind: NodeKind,
        source_line: usize,
        paths: Paths,
    ) -> usize {
        let index = self.nodes.len();
        for (label, _) in std::mem::take(&mut self.pending_labels) {
            self.direct_labels.entry(label).or_insert(index);
        }
        self.nodes.push(ParsedNode {
            kind,
            edges: Vec::new(),
            source_line,
            paths,
            incoming: None,
        });
        index
    }

    fn link(&mut self, from: usize, edge_index: usize, to: usize) {
        self.nodes[from].edges[edge_index].target = Some(to);
        if self.nodes[to].incoming.is_none() {
            let kind = self.nodes[from].edges[edge_index].kind;
            self.nodes[to].incoming = Some((from, edge_index, kind));
        }
    }

    fn add_edge(&mut self, from: usize, edge: ParsedEdge) -> usize {
        self.nodes[from].edges.push(edge);
        self.nodes[from].edges.len() - 1
    }

    fn node_auto_continues(&self, index: usize) -> bool {
        matches!(
            self.nodes[index].kind,
            NodeKind::Text { .. }
                | NodeKind::SetVariable { .. }
                | NodeKind::Event { .. }
                | NodeKind::Gosub { .. }
        )
    }

    /// Wires a freshly appended node into the surrounding flow: fill the
    /// frame's pending edge if one is waiting, otherwise chain from the
    /// previous node when that node takes a single unconditional successor.
    fn attach_to_flow(&mut self, index: usize) {
        if let Some((from, edge_index)) = self.top_mut().pending_edge.take() {
            self.link(from, edge_index, index);
            return;
        }
        let Some(previous) = self.top().last_node else {
            return;
        };
        if self.node_auto_continues(previous) && self.nodes[previous].edges.is_empty() {
            let paths = self.nodes[previous].paths.clone();
            let line = self.nodes[index].source_line;
            let edge_index = self.add_edge(previous, ParsedEdge::new(EdgeKind::Continue, line, paths));
            self.link(previous, edge_index, index);
        } else if matches!(self.nodes[previous].kind, NodeKind::Choice)
            && matches!(self.nodes[index].kind, NodeKind::Select { .. })
        {
            // A conditional block opening at choice level nests under the
            // open choice set.
            let paths = self.nodes[previous].paths.clone();
            let line = self.nodes[index].source_line;
            let edge_index = self.add_edge(previous, ParsedEdge::new(EdgeKind::Chained, line, paths));
            self.link(previous, edge_index, index);
        }
    }

    fn handle_text(
        &mut self,
        speaker: String,
        text: String,
        text_id: Option<String>,
        _indent: usize,
        number: usize,
    ) {
        let metadata = self.take_metadata();
        if !self.speakers.contains(&speaker) {
            self.speakers.push(speaker.clone());
        }
        let node = self.append_node(
            NodeKind::Text {
                speaker,
                text,
                params: Vec::new(),
                text_id: text_id.unwrap_or_default(),
                metadata,
            },
            number,
        );
        self.attach_to_flow(node);
        let top = self.top_mut();
        top.last_node = Some(node);
        // A fresh speaker line closes the choice set open at this level.
        top.choice_node = None;
        self.last_text_node = Some(node);
    }

    fn handle_choice(
        &mut self,
        text: String,
        suppress_echo: bool,
        text_id: Option<String>,
        indent: usize,
        number: usize,
    ) {
        let metadata = self.take_metadata();
        let choice = match self.top().choice_node {
            Some(existing) => existing,
            None => {
                let created = self.create_choice_root(number);
                let top = self.top_mut();
                top.choice_node = Some(created);
                top.last_node = Some(created);
                created
            }
        };

        let ordinal = self.nodes[choice].edges.len();
        let mut option_paths = self.nodes[choice].paths.clone();
        option_paths.choice.push((choice, ordinal));

        let mut edge = ParsedEdge::new(EdgeKind::Decision, number, option_paths.clone());
        edge.text = Some(text.clone());
        edge.text_id = text_id.clone();
        edge.metadata = metadata.clone();
        self.add_edge(choice, edge);

        let mut frame = Frame {
            threshold: indent + 1,
            last_node: None,
            choice_node: None,
            open_select: None,
            pending_edge: Some((choice, ordinal)),
            paths: option_paths.clone(),
        };

        if self.settings.generate_speaker_lines && !suppress_echo && !text.is_empty() {
            if !self.speakers.contains(&self.settings.speaker_for_generated_lines) {
                self.speakers
                    .push(self.settings.speaker_for_generated_lines.clone());
            }
            let echo = self.append_node_with_paths(
                NodeKind::Text {
                    speaker: self.settings.speaker_for_generated_lines.clone(),
                    text,
                    params: Vec::new(),
                    text_id: text_id.unwrap_or_default(),
                    metadata,
                },
                number,
                option_paths,
            );
            self.link(choice, ordinal, echo);
            frame.pending_edge = None;
            frame.last_node = Some(echo);
            self.echo_pairs.push(((choice, ordinal), echo));
        }

        self.frames.push(frame);
    }

    /// Finds or creates the Choice node a `*` line should attach to when
    /// none is open at this level yet.
    fn create_choice_root(&mut self, number: usize) -> usize {
        if let Some((from, edge_index)) = self.top().pending_edge {
            let from_select = matches!(self.nodes[from].kind, NodeKind::Select { .. });
            let choice = self.append_node(NodeKind::Choice, number);
            self.top_mut().pending_edge = None;
            self.link(from, edge_index, choice);
            if from_select {
                self.ensure_choice_root_above(from, number);
            }
            return choice;
        }

        if let Some(previous) = self.top().last_node {
            if matches!(self.nodes[previous].kind, NodeKind::Choice) {
                return previous;
            }
            if matches!(self.nodes[previous].kind, NodeKind::Text { .. }) {
                let choice = self.append_node(NodeKind::Choice, number);
                let paths = self.nodes[previous].paths.clone();
                let edge_index =
                    self.add_edge(previous, ParsedEdge::new(EdgeKind::Chained, number, paths));
                self.link(previous, edge_index, choice);
                return choice;
            }
            if self.node_auto_continues(previous) && self.nodes[previous].edges.is_empty() {
                let choice = self.append_node(NodeKind::Choice, number);
                let paths = self.nodes[previous].paths.clone();
                let edge_index =
                    self.add_edge(previous, ParsedEdge::new(EdgeKind::Continue, number, paths));
                self.link(previous, edge_index, choice);
                return choice;
            }
        }

        // No predecessor: leave the choice unlinked and let fallthrough
        // resolution connect whatever dangles above it.
        self.append_node(NodeKind::Choice, number)
    }

    /// Guarantees every choice set is rooted above, not inside, a
    /// conditional branch: if the choice hangs off a Select chain whose
    /// entry comes from a Text node, splice a synthetic Choice between.
    fn ensure_choice_root_above(&mut self, select: usize, number: usize) {
        let mut outermost = select;
        while let Some((from, _, _)) = self.nodes[outermost].incoming {
            if matches!(self.nodes[from].kind, NodeKind::Select { .. }) {
                outermost = from;
            } else {
                break;
            }
        }

        match self.nodes[outermost].incoming {
            Some((from, _, _)) if matches!(self.nodes[from].kind, NodeKind::Choice) => {}
            Some((from, edge_index, _))
                if matches!(self.nodes[from].kind, NodeKind::Text { .. }) =>
            {
                let paths = self.nodes[outermost].paths.clone();
                let root = self.append_node_with_paths(NodeKind::Choice, number, paths.clone());
                self.nodes[from].edges[edge_index].kind = EdgeKind::Chained;
                self.nodes[from].edges[edge_index].target = Some(root);
                self.nodes[root].incoming = Some((from, edge_index, EdgeKind::Chained));
                let chained = self.add_edge(root, ParsedEdge::new(EdgeKind::Chained, number, paths));
                self.nodes[root].edges[chained].target = Some(outermost);
                self.nodes[outermost].incoming = Some((root, chained, EdgeKind::Chained));
            }
            _ => {}
        }
    }

    fn begin_select(
        &mut self,
        random: bool,
        condition: Option<Expression>,
        indent: usize,
        number: usize,
    ) {
        let select = self.append_node(NodeKind::Select { random }, number);
        self.attach_to_flow(select);
        {
            let top = self.top_mut();
            top.last_node = Some(select);
            top.open_select = Some((select, indent));
        }

        let mut branch_paths = self.nodes[select].paths.clone();
        branch_paths.conditional.push((select, 0));
        let mut edge = ParsedEdge::new(EdgeKind::Condition, number, branch_paths.clone());
        edge.condition = condition;
        self.add_edge(select, edge);

        self.frames.push(Frame {
            threshold: indent + 1,
            last_node: None,
            choice_node: None,
            open_select: None,
            pending_edge: Some((select, 0)),
            paths: branch_paths,
        });
    }

    fn continue_select(
        &mut self,
        random: bool,
        condition: Option<Expression>,
        indent: usize,
        number: usize,
        log: &mut CompileLog,
    ) {
        self.pop_frames(indent);
        let Some((select, select_indent)) = self.top().open_select else {
            log.error(
                number,
                if random {
                    "[or] without a matching [random]."
                } else {
                    "[elseif]/[else] without a matching [if]."
                },
            );
            return;
        };
        let is_random = matches!(self.nodes[select].kind, NodeKind::Select { random: true });
        if is_random != random {
            log.error(
                number,
                "Branch marker does not match the open block kind (if vs random).",
            );
            return;
        }

        let ordinal = self.nodes[select].edges.len();
        let mut branch_paths = self.nodes[select].paths.clone();
        branch_paths.conditional.push((select, ordinal));
        let mut edge = ParsedEdge::new(EdgeKind::Condition, number, branch_paths.clone());
        edge.condition = condition;
        self.add_edge(select, edge);

        self.frames.push(Frame {
            threshold: select_indent + 1,
            last_node: None,
            choice_node: None,
            open_select: None,
            pending_edge: Some((select, ordinal)),
            paths: branch_paths,
        });
    }

    fn end_select(&mut self, random: bool, indent: usize, number: usize, log: &mut CompileLog) {
        self.pop_frames(indent);
        let top = self.top_mut();
        if top.open_select.is_none() {
            log.error(
                number,
                if random {
                    "[endrandom] without a matching [random]."
                } else {
                    "[endif] without a matching [if]."
                },
            );
            return;
        }
        top.open_select = None;
        // Nothing auto-chains into the closed block from below; only
        // fallthrough resolution may connect what follows.
        top.last_node = None;
    }

    fn handle_goto(&mut self, label: String, number: usize, log: &mut CompileLog) {
        // A label declared immediately before a goto is an alias for the
        // goto's own destination.
        for (pending, _) in std::mem::take(&mut self.pending_labels) {
            self.label_aliases.insert(pending, label.clone());
        }

        let explicit_end = label == "end";
        if let Some((from, edge_index)) = self.top_mut().pending_edge.take() {
            let edge = &mut self.nodes[from].edges[edge_index];
            if explicit_end {
                edge.explicit_end = true;
            } else {
                edge.target_label = Some(label);
            }
        } else if let Some(previous) = self.top().last_node {
            if self.node_auto_continues(previous) && self.nodes[previous].edges.is_empty() {
                let paths = self.nodes[previous].paths.clone();
                let mut edge = ParsedEdge::new(EdgeKind::Continue, number, paths);
                if explicit_end {
                    edge.explicit_end = true;
                } else {
                    edge.target_label = Some(label);
                }
                self.add_edge(previous, edge);
            } else {
                log.warning(number, "[goto] has no preceding line to leave from.");
            }
        } else {
            log.warning(number, "[goto] has no preceding line to leave from.");
        }
        self.top_mut().last_node = None;
    }

    fn append_set(
        &mut self,
        name: String,
        expr: &str,
        text_id: Option<String>,
        number: usize,
        log: &mut CompileLog,
    ) {
        let expression = self.parse_condition(expr, number, log);
        let is_text_literal =
            matches!(expression.items(), [ExprItem::Operand(Value::Text(_))]);
        let node = self.append_node(
            NodeKind::SetVariable {
                name,
                expression,
                text_id: if is_text_literal { Some(text_id.unwrap_or_default()) } else { None },
            },
            number,
        );
        self.attach_to_flow(node);
        self.top_mut().last_node = Some(node);
    }

    fn apply_import_setting(
        &mut self,
        key: &str,
        value: &str,
        number: usize,
        log: &mut CompileLog,
    ) {
        if key.eq_ignore_ascii_case("GenerateSpeakerLinesFromChoices") {
            self.settings.generate_speaker_lines = value.eq_ignore_ascii_case("true");
        } else if key.eq_ignore_ascii_case("SpeakerIDForGeneratedLinesFromChoices") {
            self.settings.speaker_for_generated_lines = value.to_string();
        } else {
            log.warning(number, format!("Unknown import setting \"{}\".", key));
        }
    }
}

fn kind_name(kind: &LineKind) -> &'static str {
    match kind {
        LineKind::Blank => "blank",
        LineKind::Comment => "comment",
        LineKind::TransientMeta { .. } | LineKind::PersistentMeta { .. } => "metadata",
        LineKind::HeaderDelimiter => "header delimiter",
        LineKind::Label(_) => "label",
        LineKind::Choice { .. } => "choice",
        LineKind::If { .. } => "if",
        LineKind::ElseIf { .. } => "elseif",
        LineKind::Else => "else",
        LineKind::EndIf => "endif",
        LineKind::Random => "random",
        LineKind::Or => "or",
        LineKind::EndRandom => "endrandom",
        LineKind::Goto { .. } => "goto",
        LineKind::Gosub { .. } => "gosub",
        LineKind::Return => "return",
        LineKind::Set { .. } => "set",
        LineKind::Event { .. } => "event",
        LineKind::ImportSetting { .. } => "importsetting",
        LineKind::Text { .. } => "speaker line",
        LineKind::Continuation { .. } => "continuation",
        LineKind::Invalid { .. } => "invalid line",
    }
}

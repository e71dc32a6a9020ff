use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use dlg_expr::Expression;

/// Kind-specific payload of a compiled graph node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum NodeKind {
    #[serde(rename_all = "camelCase")]
    Text {
        speaker: String,
        text: String,
        /// Variable names interpolated into the text, in order of appearance.
        params: Vec<String>,
        text_id: String,
        metadata: BTreeMap<String, String>,
    },
    Choice,
    #[serde(rename_all = "camelCase")]
    Select { random: bool },
    #[serde(rename_all = "camelCase")]
    SetVariable {
        name: String,
        expression: Expression,
        /// Present when the assigned value is a single text literal, which
        /// is localizable and therefore carries a stable id.
        text_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Event {
        name: String,
        args: Vec<Expression>,
    },
    #[serde(rename_all = "camelCase")]
    Gosub {
        label: String,
        /// Stable textual id so the return address survives save/restore.
        gosub_id: String,
    },
    Return,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum EdgeKind {
    /// Unconditional single-successor flow.
    Continue,
    /// A player choice; always a child of a Choice node.
    Decision,
    /// A child of a Select node, tried in declaration order.
    Condition,
    /// Player-invisible link: Text to its Choice root, or Choice to a
    /// nested Select.
    Chained,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Edge {
    pub kind: EdgeKind,
    /// Choice text (Decision edges only).
    pub text: Option<String>,
    pub text_id: Option<String>,
    pub params: Vec<String>,
    /// `None` on a Condition edge means unconditional (an `else` branch).
    pub condition: Option<Expression>,
    /// `None` means end of dialogue.
    pub target: Option<usize>,
    pub source_line: usize,
    pub metadata: BTreeMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub kind: NodeKind,
    pub edges: Vec<Edge>,
    pub source_line: usize,
}

/// The immutable output of compilation. The node arena is append-only and
/// indices are stable, so edges refer to targets by index; persistent
/// identity across re-compiles uses text/gosub ids instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompiledScript {
    pub nodes: Vec<Node>,
    /// Run once at every (re)start; Set nodes only are evaluated.
    pub header_nodes: Vec<Node>,
    /// Label to node index; `None` is the reserved `end` destination.
    pub labels: BTreeMap<String, Option<usize>>,
    /// De-duplicated speaker ids in order of first appearance.
    pub speakers: Vec<String>,
}

impl CompiledScript {
    pub fn node(&self, index: usize) -> Option<&Node> {
        self.nodes.get(index)
    }

    pub fn label_target(&self, label: &str) -> Option<Option<usize>> {
        self.labels.get(label).copied()
    }

    pub fn find_text_node_by_id(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|node| {
            matches!(&node.kind, NodeKind::Text { text_id, .. } if text_id == id)
        })
    }

    pub fn find_gosub_node_by_id(&self, id: &str) -> Option<usize> {
        self.nodes.iter().position(|node| {
            matches!(&node.kind, NodeKind::Gosub { gosub_id, .. } if gosub_id == id)
        })
    }

    pub fn text_id_of(&self, index: usize) -> Option<&str> {
        match &self.nodes.get(index)?.kind {
            NodeKind::Text { text_id, .. } => Some(text_id.as_str()),
            _ => None,
        }
    }
}

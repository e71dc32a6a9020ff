use std::collections::{BTreeMap, BTreeSet};

use dlg_compiler::{EdgeKind, Node, NodeKind};
use dlg_core::{DialogueError, Value};
use dlg_expr::{GlobalStore, GLOBAL_NAME_PREFIX};

use crate::engine::{interpolate, DialogueEngine, DialogueSink, PresentedChoice, MAX_AUTOMATIC_STEPS};
use crate::rng::draw_bounded;

/// RNG draws and gosub frames observed on the way to a choice root. They
/// stay pending while the options are displayed and commit as a whole when
/// the player picks one, so an abandoned prompt leaves them untouched.
#[derive(Debug, Clone)]
pub(crate) struct PreviewPlan {
    pub rng_after: u32,
    pub gosub_stack: Vec<String>,
    /// Scope as it stood before the trail effects ran. A save taken at
    /// this prompt captures it instead of the live scope, so restoring
    /// re-runs the trail from the same starting point.
    pub variables_before: BTreeMap<String, Value>,
}

/// Write overlay over the host's global store, used while scanning ahead
/// for a choice root before any effect is allowed to run.
struct PreviewGlobals<'a> {
    base: &'a dyn GlobalStore,
    writes: BTreeMap<String, Value>,
}

impl GlobalStore for PreviewGlobals<'_> {
    fn get(&self, name: &str) -> Option<Value> {
        self.writes
            .get(name)
            .cloned()
            .or_else(|| self.base.get(name))
    }

    fn set(&mut self, name: &str, value: Value) {
        self.writes.insert(name.to_string(), value);
    }
}

/// Picks the successor of a Select node: the first true (or unconditional)
/// branch for conditionals, a bounded RNG draw for random blocks.
pub(crate) fn pick_branch(
    node: &Node,
    scope: &BTreeMap<String, Value>,
    globals: &dyn GlobalStore,
    rng: &mut u32,
    random: bool,
) -> Result<Option<usize>, DialogueError> {
    let branches: Vec<&dlg_compiler::Edge> = node
        .edges
        .iter()
        .filter(|edge| edge.kind == EdgeKind::Condition)
        .collect();
    if branches.is_empty() {
        return Ok(None);
    }
    if random {
        let pick = draw_bounded(rng, branches.len() as u32) as usize;
        return Ok(branches[pick].target);
    }
    for edge in branches {
        match &edge.condition {
            None => return Ok(edge.target),
            Some(condition) => {
                if condition.evaluate_boolean(scope, globals)? {
                    return Ok(edge.target);
                }
            }
        }
    }
    Ok(None)
}

/// What the scan ahead of a displayed line found.
struct Scan {
    root: Option<usize>,
    /// Set and Event nodes between the line and the root, in order.
    trail: Vec<usize>,
    rng: u32,
    gosub_stack: Vec<String>,
}

impl DialogueEngine {
    /// Builds the choice set for the line just displayed.
    ///
    /// A scratch scan first walks ahead of the line to learn whether a
    /// choice root exists at all; nothing runs during that scan. When a
    /// root is found, the Set and Event nodes on the way execute for real,
    /// once, every time the options are shown, so the prompt reflects
    /// their writes and events fire before the player picks. Without a
    /// root the effects are left for the continuation walk to execute.
    pub(crate) fn preview_choices(
        &mut self,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        self.current_choices.clear();
        self.preview_plan = None;
        let Some(text_index) = self.current_node else {
            return Ok(());
        };
        let Some(first_edge) = self.script.nodes[text_index].edges.first().cloned() else {
            return Ok(());
        };

        let scan = self.scan_for_choice_root(first_edge.target)?;
        match scan.root {
            Some(root) => {
                let variables_before = self.variables.clone();
                for node_index in &scan.trail {
                    self.execute_effect(*node_index, sink)?;
                }
                let mut rng = scan.rng;
                let mut out = Vec::new();
                let mut visited = BTreeSet::new();
                self.collect_choices(root, &mut rng, &mut visited, &mut out)?;
                self.current_choices = out;
                self.preview_plan = Some(PreviewPlan {
                    rng_after: rng,
                    gosub_stack: scan.gosub_stack,
                    variables_before,
                });
            }
            None => {
                self.current_choices.push(PresentedChoice {
                    text: None,
                    text_id: None,
                    taken_before: false,
                    target: first_edge.target,
                });
            }
        }
        Ok(())
    }

    /// Walks from `start` to the first Choice node before another speaker
    /// line, entirely on scratch copies of the scope, global writes, RNG
    /// word and gosub stack.
    fn scan_for_choice_root(&self, start: Option<usize>) -> Result<Scan, DialogueError> {
        let mut scope = self.variables.clone();
        let mut globals = PreviewGlobals {
            base: &*self.globals,
            writes: BTreeMap::new(),
        };
        let mut rng = self.random_state;
        let mut stack = self.gosub_stack.clone();
        let mut trail = Vec::new();
        let mut cursor = start;

        let mut root = None;
        for _ in 0..MAX_AUTOMATIC_STEPS {
            let Some(index) = cursor else {
                break;
            };
            let node = &self.script.nodes[index];
            match &node.kind {
                NodeKind::Choice => {
                    root = Some(index);
                    break;
                }
                NodeKind::Text { .. } => break,
                NodeKind::SetVariable {
                    name, expression, ..
                } => {
                    let value = expression.evaluate(&scope, &globals)?;
                    if let Some(global_name) = name.strip_prefix(GLOBAL_NAME_PREFIX) {
                        globals.set(global_name, value);
                    } else {
                        scope.insert(name.clone(), value);
                    }
                    trail.push(index);
                    cursor = node.edges.first().and_then(|edge| edge.target);
                }
                NodeKind::Event { .. } => {
                    trail.push(index);
                    cursor = node.edges.first().and_then(|edge| edge.target);
                }
                NodeKind::Select { random } => {
                    cursor = pick_branch(node, &scope, &globals, &mut rng, *random)?;
                }
                NodeKind::Gosub { label, gosub_id } => {
                    stack.push(gosub_id.clone());
                    cursor = self.resolve_label(label)?;
                }
                NodeKind::Return => {
                    cursor = match stack.pop() {
                        Some(id) => self.return_target(&id)?,
                        None => None,
                    };
                }
            }
        }

        Ok(Scan {
            root,
            trail,
            rng,
            gosub_stack: stack,
        })
    }

    /// Gathers Decision edges from a choice root, descending through
    /// chained selects so only the branches that hold right now surface.
    /// Runs against live state; the trail effects have already executed.
    fn collect_choices(
        &self,
        index: usize,
        rng: &mut u32,
        visited: &mut BTreeSet<usize>,
        out: &mut Vec<PresentedChoice>,
    ) -> Result<(), DialogueError> {
        if !visited.insert(index) {
            return Ok(());
        }
        for edge in &self.script.nodes[index].edges {
            match edge.kind {
                EdgeKind::Decision => {
                    let text = edge.text.as_deref().unwrap_or("");
                    out.push(PresentedChoice {
                        text: Some(interpolate(text, &self.variables, &*self.globals)),
                        text_id: edge.text_id.clone(),
                        taken_before: edge
                            .text_id
                            .as_ref()
                            .is_some_and(|id| self.choices_taken.contains(id)),
                        target: edge.target,
                    });
                }
                EdgeKind::Chained => {
                    if let Some(target) = edge.target {
                        self.descend(target, rng, visited, out)?;
                    }
                }
                EdgeKind::Continue | EdgeKind::Condition => {}
            }
        }
        Ok(())
    }

    fn descend(
        &self,
        index: usize,
        rng: &mut u32,
        visited: &mut BTreeSet<usize>,
        out: &mut Vec<PresentedChoice>,
    ) -> Result<(), DialogueError> {
        match &self.script.nodes[index].kind {
            NodeKind::Choice => self.collect_choices(index, rng, visited, out),
            NodeKind::Select { random } => {
                let node = &self.script.nodes[index];
                match pick_branch(node, &self.variables, &*self.globals, rng, *random)? {
                    Some(target) => self.descend(target, rng, visited, out),
                    None => Ok(()),
                }
            }
            // A branch that leaves the choice set contributes no options.
            _ => Ok(()),
        }
    }
}

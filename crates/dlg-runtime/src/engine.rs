use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, OnceLock};

use regex::Regex;

use dlg_compiler::{CompiledScript, NodeKind};
use dlg_core::{DialogueError, Gender, SavedState, Value, SAVED_STATE_SCHEMA};
use dlg_expr::{resolve_variable, GlobalStore, MemoryGlobalStore, GLOBAL_NAME_PREFIX};

use crate::preview::PreviewPlan;

/// Hard cap on automatic steps taken in one advance, so a mis-wired graph
/// (say, a goto cycle with no speaker line) fails loudly instead of hanging.
pub(crate) const MAX_AUTOMATIC_STEPS: usize = 10_000;

pub const DEFAULT_RANDOM_SEED: u32 = 0x853c_49e6;

/// Host callbacks fired while the conversation advances. Every method has a
/// no-op default so hosts implement only what they render.
pub trait DialogueSink {
    fn on_speaker_line(&mut self, _line: &SpeakerLine) {}
    fn on_event(&mut self, _name: &str, _args: &[Value]) {}
    /// Fired before an expression reads `name`, so the host can push a
    /// fresh value into the global store first.
    fn on_variable_requested(&mut self, _name: &str) {}
    fn on_variable_changed(&mut self, _name: &str, _value: &Value) {}
    /// Fired when the player commits a choice or continuation, before the
    /// walk to the next line.
    fn on_proceeding(&mut self) {}
    fn on_finished(&mut self) {}
}

/// A sink that ignores everything; useful for headless evaluation.
#[derive(Debug, Default)]
pub struct NullSink;

impl DialogueSink for NullSink {}

/// A speaker line as presented to the player, with interpolation applied.
#[derive(Debug, Clone, PartialEq)]
pub struct SpeakerLine {
    pub speaker: String,
    pub text: String,
    pub text_id: String,
    pub metadata: BTreeMap<String, String>,
}

/// One entry of the current choice set. `text` of `None` marks the single
/// synthetic continuation offered when the current line has no choices.
#[derive(Debug, Clone, PartialEq)]
pub struct PresentedChoice {
    pub text: Option<String>,
    pub text_id: Option<String>,
    pub taken_before: bool,
    pub(crate) target: Option<usize>,
}

impl PresentedChoice {
    pub fn is_continuation(&self) -> bool {
        self.text.is_none()
    }
}

pub struct DialogueEngineOptions {
    pub script: Arc<CompiledScript>,
    pub globals: Option<Box<dyn GlobalStore>>,
    pub random_seed: Option<u32>,
}

impl DialogueEngineOptions {
    pub fn new(script: impl Into<Arc<CompiledScript>>) -> Self {
        Self {
            script: script.into(),
            globals: None,
            random_seed: None,
        }
    }
}

/// Plays one compiled script. Variables live here; cross-conversation state
/// goes through the injected [`GlobalStore`] under `global.`-prefixed names.
/// The graph is immutable and shared, so many engines can play the same
/// script concurrently.
impl std::fmt::Debug for DialogueEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DialogueEngine")
            .field("variables", &self.variables)
            .field("choices_taken", &self.choices_taken)
            .field("gosub_stack", &self.gosub_stack)
            .field("random_state", &self.random_state)
            .field("seed", &self.seed)
            .field("current_node", &self.current_node)
            .field("current_line", &self.current_line)
            .field("current_choices", &self.current_choices)
            .field("active", &self.active)
            .finish_non_exhaustive()
    }
}

pub struct DialogueEngine {
    pub(crate) script: Arc<CompiledScript>,
    pub(crate) variables: BTreeMap<String, Value>,
    pub(crate) globals: Box<dyn GlobalStore>,
    pub(crate) choices_taken: BTreeSet<String>,
    pub(crate) gosub_stack: Vec<String>,
    pub(crate) random_state: u32,
    seed: u32,
    pub(crate) current_node: Option<usize>,
    current_line: Option<SpeakerLine>,
    pub(crate) current_choices: Vec<PresentedChoice>,
    pub(crate) preview_plan: Option<PreviewPlan>,
    active: bool,
}

impl DialogueEngine {
    pub fn new(options: DialogueEngineOptions) -> Self {
        let seed = options.random_seed.unwrap_or(DEFAULT_RANDOM_SEED);
        Self {
            script: options.script,
            variables: BTreeMap::new(),
            globals: options
                .globals
                .unwrap_or_else(|| Box::new(MemoryGlobalStore::new())),
            choices_taken: BTreeSet::new(),
            gosub_stack: Vec::new(),
            random_state: seed,
            seed,
            current_node: None,
            current_line: None,
            current_choices: Vec::new(),
            preview_plan: None,
            active: false,
        }
    }

    pub fn script(&self) -> &CompiledScript {
        &self.script
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn current_line(&self) -> Option<&SpeakerLine> {
        self.current_line.as_ref()
    }

    pub fn choices(&self) -> &[PresentedChoice] {
        &self.current_choices
    }

    /// True when the current choice set contains real options rather than
    /// the synthetic continuation.
    pub fn is_waiting_for_choice(&self) -> bool {
        self.current_choices
            .iter()
            .any(|choice| !choice.is_continuation())
    }

    pub fn was_choice_taken(&self, text_id: &str) -> bool {
        self.choices_taken.contains(text_id)
    }

    /// Begins the conversation from the top with fresh conversation state.
    pub fn start(&mut self, sink: &mut dyn DialogueSink) -> Result<(), DialogueError> {
        self.restart(true, None, true, sink)
    }

    /// Begins the conversation at a label with fresh conversation state.
    pub fn start_at(
        &mut self,
        label: &str,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        self.restart(true, Some(label), true, sink)
    }

    /// Restarts from the first line or a label. With `reset_state` the
    /// conversation scope, taken-choice marks and RNG word reset too;
    /// globals always survive, they belong to the host. `rerun_header`
    /// re-applies the header Set nodes before walking.
    pub fn restart(
        &mut self,
        reset_state: bool,
        label: Option<&str>,
        rerun_header: bool,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        let entry = match label {
            Some(label) => self.resolve_label(label)?,
            None if self.script.nodes.is_empty() => None,
            None => Some(0),
        };
        if reset_state {
            self.variables.clear();
            self.choices_taken.clear();
            self.random_state = self.seed;
        }
        self.gosub_stack.clear();
        self.current_node = None;
        self.current_line = None;
        self.current_choices.clear();
        self.preview_plan = None;
        self.active = true;
        if rerun_header {
            self.run_header(sink)?;
        }
        self.advance_from(entry, sink)
    }

    /// Advances past a line with no real choices.
    /// Returns whether the conversation is still running.
    pub fn continue_dialogue(
        &mut self,
        sink: &mut dyn DialogueSink,
    ) -> Result<bool, DialogueError> {
        if !self.active {
            return Err(DialogueError::new(
                "ENGINE_NOT_ACTIVE",
                "The dialogue is not running.",
            ));
        }
        let [only] = self.current_choices.as_slice() else {
            return Err(DialogueError::new(
                "ENGINE_CHOICES_PENDING",
                "Options are displayed; use choose instead of continue.",
            ));
        };
        if !only.is_continuation() {
            return Err(DialogueError::new(
                "ENGINE_CHOICES_PENDING",
                "Options are displayed; use choose instead of continue.",
            ));
        }
        let target = only.target;
        self.current_choices.clear();
        sink.on_proceeding();
        self.advance_from(target, sink)?;
        Ok(self.active)
    }

    /// Picks option `index` from the current choice set.
    pub fn choose(
        &mut self,
        index: usize,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        if !self.active {
            return Err(DialogueError::new(
                "ENGINE_NOT_ACTIVE",
                "The dialogue is not running.",
            ));
        }
        let choice = self
            .current_choices
            .get(index)
            .cloned()
            .ok_or_else(|| {
                DialogueError::new(
                    "ENGINE_NO_SUCH_CHOICE",
                    format!("No choice at index {}.", index),
                )
            })?;
        if !choice.is_continuation() {
            // Commit what the walk to the choice root observed: the RNG
            // draws spent and the gosub frames crossed. The Set and Event
            // nodes on the way already ran when the options were shown.
            if let Some(plan) = self.preview_plan.take() {
                self.random_state = plan.rng_after;
                self.gosub_stack = plan.gosub_stack;
            }
            if let Some(id) = &choice.text_id {
                self.choices_taken.insert(id.clone());
            }
        }
        self.current_choices.clear();
        self.preview_plan = None;
        sink.on_proceeding();
        self.advance_from(choice.target, sink)
    }

    /// Ends the conversation immediately.
    pub fn end(&mut self, sink: &mut dyn DialogueSink) {
        if self.active {
            self.finish(sink);
        }
    }

    pub(crate) fn finish(&mut self, sink: &mut dyn DialogueSink) {
        self.active = false;
        self.current_node = None;
        self.current_line = None;
        self.current_choices.clear();
        self.preview_plan = None;
        sink.on_finished();
    }

    /// Runs automatic nodes until the next speaker line or the end.
    pub(crate) fn advance_from(
        &mut self,
        start: Option<usize>,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        let mut cursor = start;
        for _ in 0..MAX_AUTOMATIC_STEPS {
            let Some(index) = cursor else {
                self.finish(sink);
                return Ok(());
            };
            let kind = self.script.nodes[index].kind.clone();
            match kind {
                NodeKind::Text {
                    speaker,
                    text,
                    text_id,
                    metadata,
                    ..
                } => {
                    let line = SpeakerLine {
                        speaker,
                        text: self.interpolate_current(&text),
                        text_id,
                        metadata,
                    };
                    self.current_node = Some(index);
                    sink.on_speaker_line(&line);
                    self.current_line = Some(line);
                    self.preview_choices(sink)?;
                    return Ok(());
                }
                NodeKind::SetVariable { .. } | NodeKind::Event { .. } => {
                    self.execute_effect(index, sink)?;
                    cursor = self.first_target(index);
                }
                NodeKind::Select { random } => {
                    let node = self.script.nodes[index].clone();
                    cursor = crate::preview::pick_branch(
                        &node,
                        &self.variables,
                        &*self.globals,
                        &mut self.random_state,
                        random,
                    )?;
                }
                NodeKind::Gosub { label, gosub_id } => {
                    self.gosub_stack.push(gosub_id);
                    cursor = self.resolve_label(&label)?;
                }
                NodeKind::Return => {
                    cursor = match self.gosub_stack.pop() {
                        Some(id) => self.return_target(&id)?,
                        None => None,
                    };
                }
                NodeKind::Choice => {
                    // Only reachable through a label; descend into the
                    // chained structure if there is one.
                    cursor = self.script.nodes[index]
                        .edges
                        .iter()
                        .find(|edge| edge.kind == dlg_compiler::EdgeKind::Chained)
                        .and_then(|edge| edge.target);
                }
            }
        }
        Err(DialogueError::new(
            "ENGINE_ITERATION_LIMIT",
            "Too many automatic steps without a speaker line; the graph likely contains a loop.",
        ))
    }

    pub(crate) fn first_target(&self, index: usize) -> Option<usize> {
        self.script.nodes[index]
            .edges
            .first()
            .and_then(|edge| edge.target)
    }

    pub(crate) fn resolve_label(&self, label: &str) -> Result<Option<usize>, DialogueError> {
        self.script.label_target(label).ok_or_else(|| {
            DialogueError::new(
                "ENGINE_UNKNOWN_LABEL",
                format!("Label \"{}\" does not exist in this script.", label),
            )
        })
    }

    /// Where a `[return]` resumes for the gosub frame identified by `id`:
    /// the continue edge of the gosub node that pushed the frame.
    pub(crate) fn return_target(&self, id: &str) -> Result<Option<usize>, DialogueError> {
        let index = self.script.find_gosub_node_by_id(id).ok_or_else(|| {
            DialogueError::new(
                "ENGINE_UNKNOWN_GOSUB_ID",
                format!("No gosub node carries id \"{}\".", id),
            )
        })?;
        Ok(self.first_target(index))
    }

    /// Applies a Set or Event node to the live conversation state.
    pub(crate) fn execute_effect(
        &mut self,
        index: usize,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        let kind = self.script.nodes[index].kind.clone();
        match kind {
            NodeKind::SetVariable {
                name, expression, ..
            } => {
                for read in expression.variable_names() {
                    sink.on_variable_requested(read);
                }
                let value = expression.evaluate(&self.variables, &*self.globals)?;
                if self.write_variable(&name, value.clone()) {
                    sink.on_variable_changed(&name, &value);
                }
            }
            NodeKind::Event { name, args } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in &args {
                    for read in arg.variable_names() {
                        sink.on_variable_requested(read);
                    }
                    values.push(arg.evaluate(&self.variables, &*self.globals)?);
                }
                sink.on_event(&name, &values);
            }
            _ => {}
        }
        Ok(())
    }

    fn run_header(&mut self, sink: &mut dyn DialogueSink) -> Result<(), DialogueError> {
        if self.script.header_nodes.is_empty() {
            return Ok(());
        }
        let mut cursor = Some(0usize);
        for _ in 0..MAX_AUTOMATIC_STEPS {
            let Some(index) = cursor else {
                return Ok(());
            };
            let node = self.script.header_nodes[index].clone();
            match &node.kind {
                NodeKind::SetVariable {
                    name, expression, ..
                } => {
                    let value = expression.evaluate(&self.variables, &*self.globals)?;
                    if self.write_variable(name, value.clone()) {
                        sink.on_variable_changed(name, &value);
                    }
                    cursor = node.edges.first().and_then(|edge| edge.target);
                }
                NodeKind::Select { random } => {
                    cursor = crate::preview::pick_branch(
                        &node,
                        &self.variables,
                        &*self.globals,
                        &mut self.random_state,
                        *random,
                    )?;
                }
                _ => cursor = node.edges.first().and_then(|edge| edge.target),
            }
        }
        Err(DialogueError::new(
            "ENGINE_ITERATION_LIMIT",
            "Header evaluation did not terminate.",
        ))
    }

    pub fn get_variable(&self, name: &str) -> Value {
        resolve_variable(name, &self.variables, &*self.globals)
    }

    pub fn set_variable(&mut self, name: &str, value: Value) {
        self.write_variable(name, value);
    }

    /// Writes a variable, returning whether the stored value actually
    /// changed. Change notifications fire only on a real change.
    pub(crate) fn write_variable(&mut self, name: &str, value: Value) -> bool {
        if let Some(global_name) = name.strip_prefix(GLOBAL_NAME_PREFIX) {
            if self.globals.get(global_name).as_ref() == Some(&value) {
                return false;
            }
            self.globals.set(global_name, value);
            true
        } else {
            if self.variables.get(name) == Some(&value) {
                return false;
            }
            self.variables.insert(name.to_string(), value);
            true
        }
    }

    pub fn get_int(&self, name: &str) -> i32 {
        self.get_variable(name).as_int()
    }

    pub fn get_float(&self, name: &str) -> f32 {
        self.get_variable(name).as_float()
    }

    pub fn get_boolean(&self, name: &str) -> bool {
        self.get_variable(name).as_boolean()
    }

    pub fn get_text(&self, name: &str) -> String {
        self.get_variable(name).as_text().to_string()
    }

    pub fn get_name(&self, name: &str) -> String {
        self.get_variable(name).as_name().to_string()
    }

    pub fn get_gender(&self, name: &str) -> Gender {
        self.get_variable(name).as_gender()
    }

    pub fn set_int(&mut self, name: &str, value: i32) {
        self.set_variable(name, Value::Int(value));
    }

    pub fn set_float(&mut self, name: &str, value: f32) {
        self.set_variable(name, Value::Float(value));
    }

    pub fn set_boolean(&mut self, name: &str, value: bool) {
        self.set_variable(name, Value::Boolean(value));
    }

    pub fn set_text(&mut self, name: &str, value: impl Into<String>) {
        self.set_variable(name, Value::Text(value.into()));
    }

    pub fn set_name(&mut self, name: &str, value: impl Into<String>) {
        self.set_variable(name, Value::Name(value.into()));
    }

    pub fn set_gender(&mut self, name: &str, value: Gender) {
        self.set_variable(name, Value::Gender(value));
    }

    /// Captures the conversation at the currently displayed line. Restoring
    /// replays the choice preview deterministically, so the same options
    /// come back.
    pub fn saved_state(&self) -> Result<SavedState, DialogueError> {
        let index = self.current_node.ok_or_else(|| {
            DialogueError::new(
                "ENGINE_NO_CURRENT_LINE",
                "Saving requires a displayed speaker line.",
            )
        })?;
        let text_id = self.script.text_id_of(index).ok_or_else(|| {
            DialogueError::new("ENGINE_NO_CURRENT_LINE", "Current node is not a speaker line.")
        })?;
        let mut state = SavedState::new(text_id);
        // The trail effects behind a displayed choice set re-run on
        // restore, so the save holds the scope they started from, the
        // same way random_state holds the pre-draw word.
        state.variables = match &self.preview_plan {
            Some(plan) => plan.variables_before.clone(),
            None => self.variables.clone(),
        };
        state.choices_taken = self.choices_taken.clone();
        state.gosub_return_stack = self.gosub_stack.clone();
        state.random_state = self.random_state;
        Ok(state)
    }

    pub fn restore_saved_state(
        &mut self,
        state: SavedState,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        if state.schema_version != SAVED_STATE_SCHEMA {
            return Err(DialogueError::new(
                "ENGINE_BAD_SAVE_SCHEMA",
                format!(
                    "Unsupported save schema \"{}\", expected \"{}\".",
                    state.schema_version, SAVED_STATE_SCHEMA
                ),
            ));
        }
        let index = self
            .script
            .find_text_node_by_id(&state.current_text_node_id)
            .ok_or_else(|| {
                DialogueError::new(
                    "ENGINE_UNKNOWN_TEXT_ID",
                    format!(
                        "No speaker line carries id \"{}\".",
                        state.current_text_node_id
                    ),
                )
            })?;
        self.variables = state.variables;
        self.choices_taken = state.choices_taken;
        self.gosub_stack = state.gosub_return_stack;
        self.random_state = state.random_state;
        self.present_line(index, sink)
    }

    /// Replaces conversation state wholesale. `position` is a stable text
    /// id to land on; `None` keeps the cursor and refreshes the already
    /// displayed choice set against the new scope.
    pub fn reset_state(
        &mut self,
        variables: BTreeMap<String, Value>,
        position: Option<&str>,
        choices_taken: BTreeSet<String>,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        self.variables = variables;
        self.choices_taken = choices_taken;
        self.gosub_stack.clear();
        match position {
            Some(text_id) => {
                let index = self.script.find_text_node_by_id(text_id).ok_or_else(|| {
                    DialogueError::new(
                        "ENGINE_UNKNOWN_TEXT_ID",
                        format!("No speaker line carries id \"{}\".", text_id),
                    )
                })?;
                self.present_line(index, sink)
            }
            None => {
                if self.current_node.is_some() {
                    self.preview_choices(sink)?;
                }
                Ok(())
            }
        }
    }

    /// Lands the cursor on a text node: re-renders the line against the
    /// current scope and rebuilds its choice set.
    fn present_line(
        &mut self,
        index: usize,
        sink: &mut dyn DialogueSink,
    ) -> Result<(), DialogueError> {
        let NodeKind::Text {
            speaker,
            text,
            text_id,
            metadata,
            ..
        } = self.script.nodes[index].kind.clone()
        else {
            return Err(DialogueError::new(
                "ENGINE_UNKNOWN_TEXT_ID",
                "Target node is not a speaker line.",
            ));
        };
        self.active = true;
        self.current_node = Some(index);
        let line = SpeakerLine {
            speaker,
            text: self.interpolate_current(&text),
            text_id,
            metadata,
        };
        sink.on_speaker_line(&line);
        self.current_line = Some(line);
        self.preview_choices(sink)
    }

    pub(crate) fn interpolate_current(&self, text: &str) -> String {
        interpolate(text, &self.variables, &*self.globals)
    }
}

fn interpolation_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"\{([A-Za-z0-9_.]+)\}").expect("interpolation regex"))
}

/// Replaces `{name}` placeholders with the rendered variable value.
/// Unresolved names render as empty text, matching expression semantics.
pub(crate) fn interpolate(
    text: &str,
    scope: &BTreeMap<String, Value>,
    globals: &dyn GlobalStore,
) -> String {
    interpolation_regex()
        .replace_all(text, |captures: &regex::Captures<'_>| {
            resolve_variable(&captures[1], scope, globals).to_string()
        })
        .into_owned()
}

use std::collections::BTreeMap;

use dlg_compiler::{compile, CompiledScript};
use dlg_core::Value;

use crate::{
    DialogueEngine, DialogueEngineOptions, DialogueSink, NullSink, SpeakerLine,
};

#[derive(Default)]
struct RecordingSink {
    lines: Vec<SpeakerLine>,
    events: Vec<(String, Vec<Value>)>,
    changes: Vec<(String, Value)>,
    requested: Vec<String>,
    proceed_count: usize,
    finished: bool,
}

impl DialogueSink for RecordingSink {
    fn on_speaker_line(&mut self, line: &SpeakerLine) {
        self.lines.push(line.clone());
    }

    fn on_event(&mut self, name: &str, args: &[Value]) {
        self.events.push((name.to_string(), args.to_vec()));
    }

    fn on_variable_requested(&mut self, name: &str) {
        self.requested.push(name.to_string());
    }

    fn on_variable_changed(&mut self, name: &str, value: &Value) {
        self.changes.push((name.to_string(), value.clone()));
    }

    fn on_proceeding(&mut self) {
        self.proceed_count += 1;
    }

    fn on_finished(&mut self) {
        self.finished = true;
    }
}

fn compiled(source: &str) -> CompiledScript {
    let result = compile(source);
    assert!(
        !result.log.has_errors(),
        "unexpected compile errors: {:?}",
        result.log
    );
    result.script
}

fn engine_for(source: &str) -> DialogueEngine {
    let mut options = DialogueEngineOptions::new(compiled(source));
    options.random_seed = Some(11);
    DialogueEngine::new(options)
}

fn line_text(engine: &DialogueEngine) -> &str {
    engine.current_line().expect("a line is displayed").text.as_str()
}

fn choice_texts(engine: &DialogueEngine) -> Vec<String> {
    engine
        .choices()
        .iter()
        .filter_map(|choice| choice.text.clone())
        .collect()
}

#[test]
fn linear_script_plays_to_the_end() {
    let mut engine = engine_for("NPC: One\nNPC: Two\n");
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(line_text(&engine), "One");
    assert!(!engine.is_waiting_for_choice());

    assert!(engine.continue_dialogue(&mut sink).expect("continue"));
    assert_eq!(line_text(&engine), "Two");

    assert!(!engine.continue_dialogue(&mut sink).expect("continue"));
    assert!(!engine.is_active());
    assert!(sink.finished);
    assert_eq!(sink.lines.len(), 2);
}

#[test]
fn choices_present_and_resolve() {
    let mut engine = engine_for(
        "NPC: Pick\n\
         * one\n\
         \x20 NPC: a\n\
         * two\n\
         \x20 NPC: b\n\
         NPC: after\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(line_text(&engine), "Pick");
    assert!(engine.is_waiting_for_choice());
    assert_eq!(choice_texts(&engine), vec!["one", "two"]);

    let taken_id = engine.choices()[1].text_id.clone().expect("choice id");
    engine.choose(1, &mut sink).expect("choose");
    assert_eq!(line_text(&engine), "b");
    assert!(engine.was_choice_taken(&taken_id));

    engine.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&engine), "after");
}

#[test]
fn continue_is_rejected_while_options_are_shown() {
    let mut engine = engine_for("NPC: Pick\n* one\n\x20 NPC: a\n");
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    let error = engine.continue_dialogue(&mut sink).expect_err("must refuse");
    assert_eq!(error.code, "ENGINE_CHOICES_PENDING");
}

#[test]
fn conditionals_route_on_variables() {
    let mut engine = engine_for(
        "[set x 5]\n\
         [if {x} > 3]\n\
         \x20 NPC: big\n\
         [else]\n\
         \x20 NPC: small\n\
         [endif]\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(line_text(&engine), "big");
    assert_eq!(engine.get_int("x"), 5);
}

#[test]
fn interpolation_renders_current_values() {
    let mut engine = engine_for("[set name \"Ada\"]\nNPC: Hello {name}, {missing}!\n");
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    // Unresolved names render as empty text.
    assert_eq!(line_text(&engine), "Hello Ada, !");
}

#[test]
fn global_prefix_routes_to_the_shared_store() {
    let mut engine = engine_for("[set global.flag true]\nNPC: hi\n");
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    assert!(engine.get_boolean("global.flag"));
    // Globals survive a state-resetting restart; the scope does not.
    engine.set_variable("local", Value::Int(3));
    engine.restart(true, None, true, &mut sink).expect("restart");
    assert!(engine.get_boolean("global.flag"));
    assert_eq!(engine.get_variable("local"), Value::Empty);
}

#[test]
fn gosub_runs_the_sub_and_returns() {
    let mut engine = engine_for(
        "NPC: start\n\
         [gosub aside]\n\
         NPC: back\n\
         [goto end]\n\
         :aside\n\
         NPC: inside\n\
         [return]\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(line_text(&engine), "start");
    engine.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&engine), "inside");
    engine.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&engine), "back");
    assert!(!engine.continue_dialogue(&mut sink).expect("continue"));
    let spoken: Vec<&str> = sink.lines.iter().map(|line| line.text.as_str()).collect();
    assert_eq!(spoken, vec!["start", "inside", "back"]);
}

#[test]
fn return_with_an_empty_stack_ends_the_dialogue() {
    let mut engine = engine_for("NPC: hi\n[return]\n");
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert!(!engine.continue_dialogue(&mut sink).expect("continue"));
    assert!(sink.finished);
}

#[test]
fn choice_trail_effects_run_when_options_are_shown() {
    let mut engine = engine_for(
        "NPC: hi\n\
         [set seen {seen} + 1]\n\
         [event reached]\n\
         * A\n\
         \x20 NPC: a\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(choice_texts(&engine), vec!["A"]);
    // The set and event on the way to the choice root ran while the
    // options went up, so the prompt already reflects them.
    assert_eq!(engine.get_int("seen"), 1);
    assert_eq!(sink.events.len(), 1);
    assert_eq!(sink.events[0].0, "reached");

    // Choosing commits the pending RNG and gosub bookkeeping but does
    // not run the trail a second time.
    engine.choose(0, &mut sink).expect("choose");
    assert_eq!(engine.get_int("seen"), 1);
    assert_eq!(sink.events.len(), 1);
    assert_eq!(line_text(&engine), "a");
}

#[test]
fn events_fire_with_evaluated_args() {
    let mut engine = engine_for("[set x 4]\n[event boom {x}, {x}*2]\nNPC: hi\n");
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(sink.events.len(), 1);
    let (name, args) = &sink.events[0];
    assert_eq!(name, "boom");
    assert_eq!(args.as_slice(), &[Value::Int(4), Value::Int(8)]);
}

#[test]
fn random_branches_are_deterministic_per_seed() {
    let source = "NPC: hi\n\
                  [random]\n\
                  \x20 NPC: heads\n\
                  [or]\n\
                  \x20 NPC: tails\n\
                  [endrandom]\n";
    let mut sink = NullSink;
    let mut first = engine_for(source);
    first.start(&mut sink).expect("start");
    first.continue_dialogue(&mut sink).expect("continue");
    let mut second = engine_for(source);
    second.start(&mut sink).expect("start");
    second.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&first), line_text(&second));
}

#[test]
fn save_and_restore_rebuild_the_same_presentation() {
    let source = "NPC: hi\n\
                  [set seen {seen} + 1]\n\
                  * first @0010@\n\
                  \x20 NPC: one\n\
                  * second\n\
                  \x20 NPC: two\n";
    let mut sink = NullSink;
    let mut engine = engine_for(source);
    engine.start(&mut sink).expect("start");
    assert_eq!(engine.get_int("seen"), 1);
    let saved = engine.saved_state().expect("save");
    let shown_before = choice_texts(&engine);

    let mut restored = engine_for(source);
    restored
        .restore_saved_state(saved.clone(), &mut sink)
        .expect("restore");
    assert_eq!(line_text(&restored), "hi");
    assert_eq!(choice_texts(&restored), shown_before);
    // The save held the scope from before the trail ran; restoring
    // re-ran the trail from it, so both timelines agree.
    assert_eq!(restored.get_int("seen"), 1);

    restored.choose(0, &mut sink).expect("choose");
    assert_eq!(line_text(&restored), "one");
    assert_eq!(restored.get_int("seen"), 1);
}

#[test]
fn restore_replays_the_same_random_branch() {
    let source = "NPC: hi\n\
                  [random]\n\
                  \x20 NPC: heads\n\
                  [or]\n\
                  \x20 NPC: tails\n\
                  [endrandom]\n";
    let mut sink = NullSink;
    let mut engine = engine_for(source);
    engine.start(&mut sink).expect("start");
    let saved = engine.saved_state().expect("save");
    engine.continue_dialogue(&mut sink).expect("continue");
    let seen = line_text(&engine).to_string();

    let mut restored = engine_for(source);
    restored.restore_saved_state(saved, &mut sink).expect("restore");
    restored.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&restored), seen);
}

#[test]
fn gosub_state_survives_save_restore() {
    let source = "NPC: start\n\
                  [gosub aside]\n\
                  NPC: back\n\
                  [goto end]\n\
                  :aside\n\
                  NPC: inside\n\
                  [return]\n";
    let mut sink = NullSink;
    let mut engine = engine_for(source);
    engine.start(&mut sink).expect("start");
    engine.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&engine), "inside");
    let saved = engine.saved_state().expect("save");
    assert_eq!(saved.gosub_return_stack.len(), 1);

    let mut restored = engine_for(source);
    restored.restore_saved_state(saved, &mut sink).expect("restore");
    restored.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&restored), "back");
}

#[test]
fn header_runs_on_every_stateful_restart() {
    let mut engine = engine_for(
        "===\n\
         [set hp 10]\n\
         ===\n\
         NPC: hp is {hp}\n",
    );
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    assert_eq!(line_text(&engine), "hp is 10");
    engine.set_variable("hp", Value::Int(99));
    engine.restart(true, None, true, &mut sink).expect("restart");
    assert_eq!(line_text(&engine), "hp is 10");
}

#[test]
fn generated_speaker_lines_are_spoken_after_choosing() {
    let mut engine = engine_for(
        "[importsetting GenerateSpeakerLinesFromChoices true]\n\
         [importsetting SpeakerIDForGeneratedLinesFromChoices Bob]\n\
         NPC: Pick\n\
         * Option A\n\
         \x20 NPC: next\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    engine.choose(0, &mut sink).expect("choose");
    let line = engine.current_line().expect("echo line");
    assert_eq!(line.speaker, "Bob");
    assert_eq!(line.text, "Option A");
    engine.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(line_text(&engine), "next");
}

#[test]
fn metadata_reaches_the_presented_line() {
    let mut engine = engine_for("#= mood: angry\nNPC: What!\n");
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    let line = engine.current_line().expect("line");
    let expected: BTreeMap<String, String> =
        [("mood".to_string(), "angry".to_string())].into_iter().collect();
    assert_eq!(line.metadata, expected);
}

#[test]
fn unknown_gosub_label_is_a_runtime_error() {
    let result = compile("NPC: hi\n[gosub nowhere]\n");
    assert!(!result.log.has_errors(), "gosub labels resolve at run time");
    let mut engine = DialogueEngine::new(DialogueEngineOptions::new(result.script));
    let mut sink = NullSink;
    let error = engine.start(&mut sink).expect_err("must fail");
    assert_eq!(error.code, "ENGINE_UNKNOWN_LABEL");
}

#[test]
fn automatic_loops_hit_the_iteration_guard() {
    let mut engine = engine_for(
        "NPC: once\n\
         :loop\n\
         [set x 1]\n\
         [goto loop]\n",
    );
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    let error = engine.continue_dialogue(&mut sink).expect_err("must trip");
    assert_eq!(error.code, "ENGINE_ITERATION_LIMIT");
}

#[test]
fn saved_state_serializes_through_json() {
    let mut engine = engine_for("[set gold 12]\nNPC: hi\n");
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    let saved = engine.saved_state().expect("save");
    let json = serde_json::to_string(&saved).expect("serialize");
    let back: dlg_core::SavedState = serde_json::from_str(&json).expect("deserialize");
    assert_eq!(back, saved);
    assert_eq!(back.variables.get("gold"), Some(&Value::Int(12)));
}

#[test]
fn start_at_a_label_skips_earlier_lines() {
    let mut engine = engine_for(
        "NPC: intro\n\
         :later\n\
         NPC: resumed\n",
    );
    let mut sink = NullSink;
    engine.start_at("later", &mut sink).expect("start at label");
    assert_eq!(line_text(&engine), "resumed");
}

#[test]
fn restart_can_skip_the_header() {
    let mut engine = engine_for(
        "===\n\
         [set Greeting \"hi\"]\n\
         ===\n\
         NPC: {Greeting}\n",
    );
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    assert_eq!(line_text(&engine), "hi");
    engine
        .restart(true, None, false, &mut sink)
        .expect("restart without header");
    assert_eq!(line_text(&engine), "");
}

#[test]
fn unchanged_writes_do_not_notify() {
    let mut engine = engine_for(
        "[set x 1]\n\
         [set x 1]\n\
         [set x 2]\n\
         NPC: done\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(
        sink.changes,
        vec![
            ("x".to_string(), Value::Int(1)),
            ("x".to_string(), Value::Int(2)),
        ]
    );
}

#[test]
fn expression_reads_are_announced_before_evaluation() {
    let mut engine = engine_for(
        "[set x 3]\n\
         [set y {x} + 1]\n\
         NPC: done\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    assert_eq!(sink.requested, vec!["x".to_string()]);
    assert_eq!(engine.get_int("y"), 4);
}

#[test]
fn proceeding_fires_on_choice_and_continuation() {
    let mut engine = engine_for(
        "NPC: pick\n\
         * one\n\
         \x20 NPC: a\n\
         NPC: after\n",
    );
    let mut sink = RecordingSink::default();
    engine.start(&mut sink).expect("start");
    engine.choose(0, &mut sink).expect("choose");
    assert_eq!(sink.proceed_count, 1);
    engine.continue_dialogue(&mut sink).expect("continue");
    assert_eq!(sink.proceed_count, 2);
}

#[test]
fn reset_state_jumps_to_a_stable_text_id() {
    let mut engine = engine_for("NPC: one\nNPC: two\n");
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    let target = engine
        .script()
        .text_id_of(1)
        .expect("second line has an id")
        .to_string();
    let mut variables = BTreeMap::new();
    variables.insert("gold".to_string(), Value::Int(7));
    engine
        .reset_state(variables, Some(&target), Default::default(), &mut sink)
        .expect("reset");
    assert_eq!(line_text(&engine), "two");
    assert_eq!(engine.get_int("gold"), 7);
}

#[test]
fn typed_accessors_round_trip() {
    let mut engine = engine_for("NPC: hi\n");
    let mut sink = NullSink;
    engine.start(&mut sink).expect("start");
    engine.set_gender("hero.gender", dlg_core::Gender::Feminine);
    engine.set_name("hero.home", "Riverhold");
    engine.set_text("hero.motto", "onward");
    assert_eq!(engine.get_gender("hero.gender"), dlg_core::Gender::Feminine);
    assert_eq!(engine.get_name("hero.home"), "Riverhold");
    assert_eq!(engine.get_text("hero.motto"), "onward");
}

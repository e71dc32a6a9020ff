//! One-stop entry points: compile a script and hand back a running engine.

use std::sync::Arc;

pub use dlg_compiler::{compile, CompileResult, CompiledScript};
pub use dlg_core::{CompileLog, DialogueError, Gender, SavedState, Value};
pub use dlg_expr::{Expression, GlobalStore, MemoryGlobalStore};
pub use dlg_runtime::{
    DialogueEngine, DialogueEngineOptions, DialogueSink, NullSink, PresentedChoice, SpeakerLine,
};

#[derive(Default)]
pub struct CreateEngineOptions {
    pub globals: Option<Box<dyn GlobalStore>>,
    pub random_seed: Option<u32>,
}

/// Compiles `source`, failing on the first compile error, and returns an
/// engine already started on its first line.
pub fn create_engine(
    source: &str,
    options: CreateEngineOptions,
    sink: &mut dyn DialogueSink,
) -> Result<DialogueEngine, DialogueError> {
    let script = compile_strict(source)?;
    let mut engine = DialogueEngine::new(DialogueEngineOptions {
        script: Arc::new(script),
        globals: options.globals,
        random_seed: options.random_seed,
    });
    engine.start(sink)?;
    Ok(engine)
}

/// Compiles `source` and resumes a previously saved conversation in it.
pub fn resume_engine(
    source: &str,
    state: SavedState,
    options: CreateEngineOptions,
    sink: &mut dyn DialogueSink,
) -> Result<DialogueEngine, DialogueError> {
    let script = compile_strict(source)?;
    let mut engine = DialogueEngine::new(DialogueEngineOptions {
        script: Arc::new(script),
        globals: options.globals,
        random_seed: options.random_seed,
    });
    engine.restore_saved_state(state, sink)?;
    Ok(engine)
}

/// Compiles and rejects scripts carrying error diagnostics. Warnings pass.
pub fn compile_strict(source: &str) -> Result<CompiledScript, DialogueError> {
    let result = compile(source);
    if result.log.has_errors() {
        let first = result
            .log
            .diagnostics
            .iter()
            .find(|diagnostic| diagnostic.severity == dlg_core::Severity::Error);
        return Err(DialogueError::new(
            "API_COMPILE_FAILED",
            first.map_or_else(
                || "Script failed to compile.".to_string(),
                |diagnostic| diagnostic.to_string(),
            ),
        ));
    }
    Ok(result.script)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_engine_starts_on_the_first_line() {
        let mut sink = NullSink;
        let engine = create_engine("NPC: hello\n", CreateEngineOptions::default(), &mut sink)
            .expect("engine should start");
        assert_eq!(engine.current_line().expect("line").text, "hello");
    }

    #[test]
    fn create_engine_rejects_broken_scripts() {
        let mut sink = NullSink;
        let error = create_engine("NPC: hi\n[goto nowhere]\n", CreateEngineOptions::default(), &mut sink)
            .expect_err("undefined goto must fail");
        assert_eq!(error.code, "API_COMPILE_FAILED");
    }

    #[test]
    fn resume_engine_restores_the_saved_line() {
        let source = "NPC: one\nNPC: two\n";
        let mut sink = NullSink;
        let mut engine =
            create_engine(source, CreateEngineOptions::default(), &mut sink).expect("start");
        engine.continue_dialogue(&mut sink).expect("continue");
        let saved = engine.saved_state().expect("save");

        let resumed = resume_engine(source, saved, CreateEngineOptions::default(), &mut sink)
            .expect("resume");
        assert_eq!(resumed.current_line().expect("line").text, "two");
    }
}

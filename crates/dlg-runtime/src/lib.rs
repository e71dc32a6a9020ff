//! Executes compiled dialogue graphs: speaker lines, choice sets, gosub
//! frames, deterministic random branches and save/restore.

mod engine;
mod preview;
mod rng;

pub use engine::{
    DialogueEngine, DialogueEngineOptions, DialogueSink, NullSink, PresentedChoice, SpeakerLine,
    DEFAULT_RANDOM_SEED,
};

#[cfg(test)]
mod tests;

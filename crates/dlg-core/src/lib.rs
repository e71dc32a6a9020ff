pub mod diag;
pub mod error;
pub mod state;
pub mod value;

pub use diag::*;
pub use error::DialogueError;
pub use state::*;
pub use value::*;

pub mod question_ctx;
pub mod validation_loop;

pub use question_ctx::QuestionCtx;
pub use validation_loop::{LoopOutcome, LoopSettings, ValidationLoop};

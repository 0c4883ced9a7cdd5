pub mod loaders;
pub mod question;

pub use loaders::{load_questions_from_file, parse_questions};
pub use question::{
    AnswerAttempt, ProcessingResult, Question, QuestionBatch, QuestionType, Verdict,
};

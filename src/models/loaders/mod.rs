pub mod batch_loader;

pub use batch_loader::{load_questions_from_file, parse_questions, BatchFormat};

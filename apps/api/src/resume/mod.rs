//! Resume upload parsing: text extraction followed by AI-assisted structuring.

pub mod extract;
pub mod handlers;
pub mod parser;
pub mod prompts;

pub use extract::{ExtractionError, PdfTextExtractor, TextExtractor};
pub use parser::{parse_resume_text, ParsedResume};

pub mod edit_engine;
pub mod gemini_backend;
pub mod generation_backend;
pub mod storage_accountant;
pub mod title_synthesizer;

pub use edit_engine::{DeleteOutcome, EditTruncationEngine, apply_window};
pub use gemini_backend::GeminiBackend;
pub use generation_backend::{BackendError, GeneratedContent, GenerationBackend, GenerationOptions};
pub use storage_accountant::{ConversationUsage, StorageReport, format_bytes, size_of, total_size};
pub use title_synthesizer::{IMAGE_TITLE, SynthesizedTitle, clean_title, synthesize_title};

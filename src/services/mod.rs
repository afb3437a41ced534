pub mod profile;
pub mod providers;
pub mod recommendations;
pub mod vision;

pub use providers::{GeminiProvider, GenerationRequest, GenerativeProvider, InlineImage, TextChunk, TextStream};

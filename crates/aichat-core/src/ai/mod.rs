pub mod openai;
pub mod sse;

pub use openai::{ChatStream, OpenAIClient, Timeouts};
pub use sse::{SseDecoder, SseEvent};

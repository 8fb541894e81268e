pub mod ai;
pub mod attachment;
pub mod config;
pub mod error;
pub mod history;
pub mod markdown;
pub mod session;
pub mod state;

// Re-export main types for convenience
pub use ai::{ChatStream, OpenAIClient, Timeouts};
pub use attachment::{load_attachment, Attachment, ImageAttachment};
pub use config::{Config, ConfigError, KeySource, Settings};
pub use error::{ChatError, ChatResult};
pub use history::{ConversationStore, LoadOutcome};
pub use session::{BeginOutcome, ChatSession, OutgoingRequest, PendingReply, ReplyOutcome};
pub use state::{ChatMessage, ChatRole, ContentPart, Conversation, MessageContent};

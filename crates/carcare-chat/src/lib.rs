//! Conversational interface for CarCare.
//!
//! Provides rule-based maintenance suggestions, conversation memory with an
//! explicit window policy, context assembly, and the completion gateway
//! used to answer maintenance questions.

pub mod context;
pub mod error;
pub mod gateway;
pub mod openai;
pub mod orchestrator;
pub mod session;
pub mod suggestions;
pub mod types;

pub use context::{build_context, ContextBlock, VehicleFacts};
pub use error::ChatError;
pub use gateway::{complete_or_degrade, AssistantReply, CompletionGateway, GatewayError};
pub use openai::OpenAiGateway;
pub use orchestrator::ChatService;
pub use session::{ConversationSession, SessionPolicy};
pub use types::{ChatMessage, ChatReply, ChatRequest, MAX_MESSAGE_LENGTH};

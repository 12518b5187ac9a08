//! Request and reply types for the chat service.

use serde::{Deserialize, Serialize};

use carcare_core::types::{Role, VehicleInfo};

/// Maximum user message length in characters.
pub const MAX_MESSAGE_LENGTH: usize = 2000;

/// One message as sent by the client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// A chat request. The last message is the one being answered.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    pub messages: Vec<ChatMessage>,
    #[serde(default)]
    pub vehicle_info: Option<VehicleInfo>,
}

impl ChatRequest {
    /// Single user message, optionally with vehicle facts.
    pub fn from_user(content: impl Into<String>, vehicle_info: Option<VehicleInfo>) -> Self {
        Self {
            messages: vec![ChatMessage {
                role: Role::User,
                content: content.into(),
            }],
            vehicle_info,
        }
    }
}

/// The reply returned to the caller.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    pub response: String,
    pub suggested_actions: Vec<String>,
}

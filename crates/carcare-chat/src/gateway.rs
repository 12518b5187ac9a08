//! Completion gateway abstraction.
//!
//! The chat service talks to the text-completion provider only through
//! [`CompletionGateway`]. Provider failures are classified into
//! [`GatewayError`] and converted into a fixed degraded reply by
//! [`complete_or_degrade`], so callers never see a raw provider error.

use async_trait::async_trait;
use serde::Serialize;

use crate::context::{ContextBlock, VehicleFacts};

pub const DEGRADED_RESPONSE: &str = "I apologize, but I encountered an error. Please try again.";
pub const DEGRADED_ACTIONS: [&str; 2] = ["Try again", "Ask a different question"];

const BASE_ACTIONS: [&str; 3] = [
    "Schedule maintenance",
    "View maintenance history",
    "Get maintenance cost estimate",
];

/// Classified completion-provider failures.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Unreachable, timed out, 5xx, or missing or rejected credentials.
    #[error("completion provider unavailable: {0}")]
    Unavailable(String),
    #[error("completion provider rate limited")]
    RateLimited,
    /// Malformed or empty completion, or the provider rejected the payload.
    #[error("invalid completion response: {0}")]
    InvalidResponse(String),
}

/// Assistant text plus the dialogue actions the gateway offers with it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct AssistantReply {
    pub response: String,
    pub actions: Vec<String>,
    /// Set when the reply is the fixed fallback rather than a completion.
    pub degraded: bool,
}

impl AssistantReply {
    pub fn degraded() -> Self {
        Self {
            response: DEGRADED_RESPONSE.to_string(),
            actions: DEGRADED_ACTIONS.iter().map(|s| s.to_string()).collect(),
            degraded: true,
        }
    }
}

/// A text-completion backend.
#[async_trait]
pub trait CompletionGateway: Send + Sync {
    /// Produce one reply for `user_input` given the assembled context.
    ///
    /// Makes a single attempt; retries are the caller's concern.
    async fn complete(
        &self,
        context: &ContextBlock,
        user_input: &str,
    ) -> Result<AssistantReply, GatewayError>;

    /// Short name used in logs.
    fn name(&self) -> &str {
        "completion"
    }
}

/// Call the gateway, replacing any failure with the degraded reply.
pub async fn complete_or_degrade(
    gateway: &dyn CompletionGateway,
    context: &ContextBlock,
    user_input: &str,
) -> AssistantReply {
    match gateway.complete(context, user_input).await {
        Ok(reply) => reply,
        Err(e) => {
            tracing::warn!(gateway = gateway.name(), error = %e, "Completion failed, returning degraded reply");
            AssistantReply::degraded()
        }
    }
}

/// Dialogue actions offered alongside a completion.
///
/// Vehicle-specific actions appear once any fact is known; absent facts are
/// left out of the wording rather than rendered as placeholders.
pub fn dialogue_actions(vehicle: &VehicleFacts) -> Vec<String> {
    let mut actions: Vec<String> = BASE_ACTIONS.iter().map(|s| s.to_string()).collect();
    if !vehicle.is_known() {
        return actions;
    }

    let make = vehicle.make.as_deref();
    let model = vehicle.model.as_deref();
    let year = vehicle.year.map(|y| y.to_string());

    actions.push(phrase(&[Some("Check"), make, model, Some("maintenance schedule")]));
    actions.push(phrase(&[Some("Find parts for"), make, model]));
    actions.push(phrase(&[Some("Get"), year.as_deref(), make, Some("service manual")]));
    actions
}

fn phrase(parts: &[Option<&str>]) -> String {
    parts.iter().flatten().copied().collect::<Vec<_>>().join(" ")
}

//! Context assembly for completion requests.
//!
//! Turns the caller's vehicle facts and prior turns into a structured
//! [`ContextBlock`] with a stable text rendering. Pure formatting only.

use std::fmt::Write as _;

use carcare_core::types::{ConversationTurn, Role, VehicleInfo};

use crate::session::ConversationSession;

const UNKNOWN: &str = "Unknown";
const NO_HISTORY: &str = "(no previous conversation)";

// =============================================================================
// VehicleFacts
// =============================================================================

/// Normalized vehicle facts. Blank values are treated as absent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VehicleFacts {
    pub make: Option<String>,
    pub model: Option<String>,
    pub year: Option<i32>,
    pub vin: Option<String>,
}

impl VehicleFacts {
    pub fn from_info(info: Option<&VehicleInfo>) -> Self {
        match info {
            None => Self::default(),
            Some(info) => Self {
                make: info.make.as_deref().and_then(normalize),
                model: info.model.as_deref().and_then(normalize),
                year: info.year,
                vin: info.vin.as_deref().and_then(normalize),
            },
        }
    }

    /// True when at least one fact is present.
    pub fn is_known(&self) -> bool {
        self.make.is_some() || self.model.is_some() || self.year.is_some() || self.vin.is_some()
    }

    fn lines(&self) -> [(&'static str, String); 4] {
        [
            ("Make", display_or_unknown(self.make.as_deref())),
            ("Model", display_or_unknown(self.model.as_deref())),
            ("Year", self.year.map_or_else(|| UNKNOWN.to_string(), |y| y.to_string())),
            ("VIN", display_or_unknown(self.vin.as_deref())),
        ]
    }
}

// =============================================================================
// ContextBlock
// =============================================================================

/// Vehicle facts plus prior turns, regenerated for every completion call.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContextBlock {
    pub vehicle: VehicleFacts,
    /// Prior turns, oldest first.
    pub history: Vec<ConversationTurn>,
}

impl ContextBlock {
    /// The `Vehicle Information:` section.
    pub fn vehicle_section(&self) -> String {
        let mut out = String::from("Vehicle Information:\n");
        for (label, value) in self.vehicle.lines() {
            let _ = writeln!(out, "{}: {}", label, value);
        }
        out
    }

    /// The `Previous Conversation:` section.
    pub fn history_section(&self) -> String {
        let mut out = String::from("Previous Conversation:\n");
        if self.history.is_empty() {
            out.push_str(NO_HISTORY);
            out.push('\n');
            return out;
        }
        for turn in &self.history {
            let speaker = match turn.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            let _ = writeln!(out, "{}: {}", speaker, turn.content.trim());
        }
        out
    }

    /// Stable text form: vehicle section, blank line, history section.
    pub fn render(&self) -> String {
        format!("{}\n{}", self.vehicle_section(), self.history_section())
    }
}

/// Assemble the context block for one completion request.
pub fn build_context(info: Option<&VehicleInfo>, session: &ConversationSession) -> ContextBlock {
    ContextBlock {
        vehicle: VehicleFacts::from_info(info),
        history: session.history(),
    }
}

/// Trim and collapse internal whitespace; blank input yields `None`.
fn normalize(value: &str) -> Option<String> {
    let joined = value.split_whitespace().collect::<Vec<_>>().join(" ");
    if joined.is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn display_or_unknown(value: Option<&str>) -> String {
    value.unwrap_or(UNKNOWN).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::SessionPolicy;

    fn civic() -> VehicleInfo {
        VehicleInfo {
            make: Some("Honda".to_string()),
            model: Some("Civic".to_string()),
            year: Some(2020),
            vin: None,
        }
    }

    #[test]
    fn test_missing_vin_renders_unknown() {
        let block = build_context(Some(&civic()), &ConversationSession::default());
        assert_eq!(
            block.vehicle_section(),
            "Vehicle Information:\nMake: Honda\nModel: Civic\nYear: 2020\nVIN: Unknown\n"
        );
    }

    #[test]
    fn test_no_vehicle_info_all_unknown() {
        let block = build_context(None, &ConversationSession::default());
        let section = block.vehicle_section();
        assert_eq!(section.matches("Unknown").count(), 4);
        assert!(!block.vehicle.is_known());
    }

    #[test]
    fn test_whitespace_normalized_and_blank_is_absent() {
        let info = VehicleInfo {
            make: Some("  Land   Rover ".to_string()),
            model: Some("   ".to_string()),
            year: None,
            vin: Some("\tSALLAAA1\n".to_string()),
        };
        let facts = VehicleFacts::from_info(Some(&info));
        assert_eq!(facts.make.as_deref(), Some("Land Rover"));
        assert_eq!(facts.model, None);
        assert_eq!(facts.vin.as_deref(), Some("SALLAAA1"));
        assert!(facts.is_known());
    }

    #[test]
    fn test_history_rendered_oldest_first() {
        let mut session = ConversationSession::new(SessionPolicy::Unbounded);
        session.append(ConversationTurn::user("My brakes squeak", None));
        session.append(ConversationTurn::assistant("Check the pad wear indicators.", None));

        let block = build_context(Some(&civic()), &session);
        assert_eq!(
            block.history_section(),
            "Previous Conversation:\nUser: My brakes squeak\nAssistant: Check the pad wear indicators.\n"
        );
    }

    #[test]
    fn test_render_layout() {
        let block = build_context(None, &ConversationSession::default());
        let rendered = block.render();
        assert!(rendered.starts_with("Vehicle Information:\n"));
        assert!(rendered.contains("VIN: Unknown\n\nPrevious Conversation:\n"));
        assert!(rendered.ends_with("(no previous conversation)\n"));
    }

    #[test]
    fn test_context_reflects_session_window() {
        let mut session = ConversationSession::new(SessionPolicy::MaxTurns(2));
        for i in 1..=4 {
            session.append(ConversationTurn::user(format!("Q{}", i), None));
        }
        let block = build_context(None, &session);
        assert_eq!(block.history.len(), 2);
        assert!(!block.render().contains("Q2"));
        assert!(block.render().contains("User: Q4"));
    }
}

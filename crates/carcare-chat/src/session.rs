//! Per-caller conversation memory with an explicit window policy.

use std::collections::VecDeque;

use carcare_core::config::ChatConfig;
use carcare_core::types::ConversationTurn;

/// How much history a session retains.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionPolicy {
    /// Keep every turn.
    Unbounded,
    /// Keep at most `n` turns, evicting the oldest first.
    MaxTurns(usize),
}

impl SessionPolicy {
    pub fn from_config(config: &ChatConfig) -> Self {
        if config.unbounded_history {
            SessionPolicy::Unbounded
        } else {
            SessionPolicy::MaxTurns(config.max_turns)
        }
    }

    /// Upper bound on retained turns, if any.
    pub fn cap(&self) -> Option<usize> {
        match self {
            SessionPolicy::Unbounded => None,
            SessionPolicy::MaxTurns(n) => Some(*n),
        }
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        SessionPolicy::from_config(&ChatConfig::default())
    }
}

/// Ordered, append-only turn history for one caller.
#[derive(Clone, Debug)]
pub struct ConversationSession {
    policy: SessionPolicy,
    turns: VecDeque<ConversationTurn>,
}

impl ConversationSession {
    pub fn new(policy: SessionPolicy) -> Self {
        Self {
            policy,
            turns: VecDeque::new(),
        }
    }

    /// Rebuild a session from persisted turns given oldest first.
    ///
    /// The window is applied exactly as if the turns had been appended live.
    pub fn from_turns<I>(policy: SessionPolicy, turns: I) -> Self
    where
        I: IntoIterator<Item = ConversationTurn>,
    {
        let mut session = Self::new(policy);
        for turn in turns {
            session.append(turn);
        }
        session
    }

    pub fn append(&mut self, turn: ConversationTurn) {
        self.turns.push_back(turn);
        if let Some(cap) = self.policy.cap() {
            while self.turns.len() > cap {
                self.turns.pop_front();
            }
        }
    }

    /// Retained turns, oldest first.
    pub fn history(&self) -> Vec<ConversationTurn> {
        self.turns.iter().cloned().collect()
    }

    pub fn reset(&mut self) {
        self.turns.clear();
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new(SessionPolicy::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn contents(session: &ConversationSession) -> Vec<String> {
        session.history().into_iter().map(|t| t.content).collect()
    }

    #[test]
    fn test_policy_from_config() {
        let mut config = ChatConfig::default();
        assert_eq!(SessionPolicy::from_config(&config), SessionPolicy::MaxTurns(20));

        config.unbounded_history = true;
        assert_eq!(SessionPolicy::from_config(&config), SessionPolicy::Unbounded);
    }

    #[test]
    fn test_fifo_eviction() {
        let mut session = ConversationSession::new(SessionPolicy::MaxTurns(3));
        for i in 1..=5 {
            session.append(ConversationTurn::user(format!("T{}", i), None));
        }
        assert_eq!(contents(&session), vec!["T3", "T4", "T5"]);
        assert_eq!(session.len(), 3);
    }

    #[test]
    fn test_unbounded_keeps_everything() {
        let mut session = ConversationSession::new(SessionPolicy::Unbounded);
        for i in 0..100 {
            session.append(ConversationTurn::assistant(format!("A{}", i), None));
        }
        assert_eq!(session.len(), 100);
        assert_eq!(session.history()[0].content, "A0");
    }

    #[test]
    fn test_zero_cap_retains_nothing() {
        let mut session = ConversationSession::new(SessionPolicy::MaxTurns(0));
        session.append(ConversationTurn::user("hello", None));
        assert!(session.is_empty());
    }

    #[test]
    fn test_from_turns_matches_live_appends() {
        let turns: Vec<ConversationTurn> = (1..=6)
            .map(|i| ConversationTurn::user(format!("T{}", i), None))
            .collect();

        let mut live = ConversationSession::new(SessionPolicy::MaxTurns(4));
        for turn in turns.clone() {
            live.append(turn);
        }
        let rebuilt = ConversationSession::from_turns(SessionPolicy::MaxTurns(4), turns);

        assert_eq!(live.history(), rebuilt.history());
        assert_eq!(contents(&rebuilt), vec!["T3", "T4", "T5", "T6"]);
    }

    #[test]
    fn test_reset() {
        let mut session = ConversationSession::default();
        session.append(ConversationTurn::user("hello", None));
        assert!(!session.is_empty());

        session.reset();
        assert!(session.is_empty());
        assert_eq!(session.policy(), SessionPolicy::MaxTurns(20));
    }
}

//! Chat service: coordinates session memory, context assembly, the
//! completion gateway, and maintenance suggestions.
//!
//! Sessions are rebuilt from the chat history table on every request; the
//! service holds no per-caller state of its own.

use std::sync::Arc;

use carcare_core::config::ChatConfig;
use carcare_core::types::{ConversationTurn, UserId, Vehicle, VehicleInfo};
use carcare_storage::{ChatHistoryRepository, Database, MaintenanceRepository, VehicleRepository};

use crate::context::build_context;
use crate::error::ChatError;
use crate::gateway::{complete_or_degrade, CompletionGateway};
use crate::session::{ConversationSession, SessionPolicy};
use crate::suggestions;
use crate::types::{ChatReply, ChatRequest, MAX_MESSAGE_LENGTH};

/// Central chat coordinator.
pub struct ChatService {
    vehicles: VehicleRepository,
    records: MaintenanceRepository,
    history: ChatHistoryRepository,
    gateway: Arc<dyn CompletionGateway>,
    config: ChatConfig,
    history_limit: usize,
}

impl ChatService {
    pub fn new(
        db: Arc<Database>,
        gateway: Arc<dyn CompletionGateway>,
        config: ChatConfig,
        history_limit: usize,
    ) -> Self {
        Self {
            vehicles: VehicleRepository::new(Arc::clone(&db)),
            records: MaintenanceRepository::new(Arc::clone(&db)),
            history: ChatHistoryRepository::new(db),
            gateway,
            config,
            history_limit,
        }
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy::from_config(&self.config)
    }

    /// Answer the last message of `request`.
    ///
    /// The user turn is committed before the gateway is called and the
    /// assistant turn after it returns; the store is not held in between.
    /// A gateway failure yields the degraded reply and leaves only the user
    /// turn persisted. Facts the request leaves out are filled from the
    /// caller's matching registered vehicle before the context is built.
    pub async fn handle_chat(
        &self,
        user: &UserId,
        request: ChatRequest,
    ) -> Result<ChatReply, ChatError> {
        if !self.config.enabled {
            return Err(ChatError::Disabled);
        }
        let last = request
            .messages
            .last()
            .ok_or(ChatError::EmptyConversation)?;
        let input = last.content.trim();
        if input.is_empty() {
            return Err(ChatError::EmptyMessage);
        }
        if input.chars().count() > MAX_MESSAGE_LENGTH {
            return Err(ChatError::MessageTooLong(MAX_MESSAGE_LENGTH));
        }

        let session = self.load_session(user)?;
        let registered = match request.vehicle_info.as_ref() {
            Some(info) => self.find_vehicle(user, info)?,
            None => None,
        };
        let facts = match (request.vehicle_info.clone(), registered.as_ref()) {
            (Some(info), Some(vehicle)) => Some(info.fill_from(VehicleInfo::from(vehicle))),
            (info, _) => info,
        };
        let context = build_context(facts.as_ref(), &session);

        self.history
            .append(user, &ConversationTurn::user(input, request.vehicle_info.clone()))?;

        tracing::debug!(user = %user, prior_turns = session.len(), "Requesting completion");
        let reply = complete_or_degrade(self.gateway.as_ref(), &context, input).await;

        if reply.degraded {
            return Ok(ChatReply {
                response: reply.response,
                suggested_actions: reply.actions,
            });
        }

        self.history.append(
            user,
            &ConversationTurn::assistant(reply.response.clone(), request.vehicle_info.clone()),
        )?;

        let domain = match (request.vehicle_info.as_ref(), registered.as_ref()) {
            (Some(_), Some(vehicle)) => match self.suggest_for(vehicle) {
                Ok(list) => list,
                Err(e) => {
                    tracing::warn!(user = %user, error = %e, "Suggestion lookup failed");
                    Vec::new()
                }
            },
            (Some(_), None) => suggestions::onboarding(),
            (None, _) => Vec::new(),
        };

        Ok(ChatReply {
            response: reply.response,
            suggested_actions: merge_actions(reply.actions, domain),
        })
    }

    /// Maintenance suggestions for the caller's vehicle matching `info`.
    pub fn suggestions(&self, user: &UserId, info: &VehicleInfo) -> Result<Vec<String>, ChatError> {
        match self.find_vehicle(user, info)? {
            Some(vehicle) => self.suggest_for(&vehicle),
            None => Ok(suggestions::onboarding()),
        }
    }

    /// Full persisted conversation for `user`, oldest first.
    pub fn history(&self, user: &UserId) -> Result<Vec<ConversationTurn>, ChatError> {
        Ok(self.history.list(user)?)
    }

    /// The caller's registered vehicle matching the make/model/year in `info`.
    fn find_vehicle(
        &self,
        user: &UserId,
        info: &VehicleInfo,
    ) -> Result<Option<Vehicle>, ChatError> {
        let Some((make, model, year)) = info.identity() else {
            return Ok(None);
        };
        let found = self.vehicles.find_by_identity(user, make, model, year)?;
        if found.is_none() {
            tracing::debug!(user = %user, make, model, year, "No registered vehicle matches");
        }
        Ok(found)
    }

    fn suggest_for(&self, vehicle: &Vehicle) -> Result<Vec<String>, ChatError> {
        let records = self
            .records
            .recent_for_vehicle(vehicle.id, self.history_limit)?;
        Ok(suggestions::suggest(vehicle, &records, self.history_limit))
    }

    fn load_session(&self, user: &UserId) -> Result<ConversationSession, ChatError> {
        let policy = self.session_policy();
        let turns = match policy.cap() {
            None => self.history.list(user)?,
            Some(cap) => self.history.recent(user, cap)?,
        };
        Ok(ConversationSession::from_turns(policy, turns))
    }
}

/// Concatenate, keeping the first occurrence of each action.
fn merge_actions(primary: Vec<String>, secondary: Vec<String>) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(primary.len() + secondary.len());
    for action in primary.into_iter().chain(secondary) {
        if !merged.contains(&action) {
            merged.push(action);
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use async_trait::async_trait;
    use carcare_core::types::{MaintenanceRecordInput, NewVehicle, Role};
    use chrono::Utc;

    use crate::context::ContextBlock;
    use crate::gateway::{dialogue_actions, AssistantReply, GatewayError};

    /// Replies with canned text and records every context it was given.
    struct ScriptedGateway {
        fail: bool,
        seen: Mutex<Vec<ContextBlock>>,
    }

    impl ScriptedGateway {
        fn ok() -> Arc<Self> {
            Arc::new(Self {
                fail: false,
                seen: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                fail: true,
                seen: Mutex::new(Vec::new()),
            })
        }
    }

    #[async_trait]
    impl CompletionGateway for ScriptedGateway {
        async fn complete(
            &self,
            context: &ContextBlock,
            user_input: &str,
        ) -> Result<AssistantReply, GatewayError> {
            self.seen.lock().unwrap().push(context.clone());
            if self.fail {
                return Err(GatewayError::Unavailable("connection refused".to_string()));
            }
            Ok(AssistantReply {
                response: format!("Answer to: {}", user_input),
                actions: dialogue_actions(&context.vehicle),
                degraded: false,
            })
        }
    }

    fn make_service(gateway: Arc<ScriptedGateway>, config: ChatConfig) -> (ChatService, Arc<Database>) {
        let db = Arc::new(Database::in_memory().unwrap());
        (ChatService::new(Arc::clone(&db), gateway, config, 5), db)
    }

    fn user() -> UserId {
        UserId::new("local")
    }

    fn corolla_info() -> VehicleInfo {
        VehicleInfo {
            make: Some("Toyota".to_string()),
            model: Some("Corolla".to_string()),
            year: Some(2018),
            vin: None,
        }
    }

    fn register_corolla(db: &Arc<Database>, vehicle_mileage: i64, record_mileage: i64) {
        let vehicle = VehicleRepository::new(Arc::clone(db))
            .create(
                &user(),
                &NewVehicle {
                    make: "Toyota".to_string(),
                    model: "Corolla".to_string(),
                    year: 2018,
                    vin: "JTDBR32E720000001".to_string(),
                    mileage: vehicle_mileage,
                },
            )
            .unwrap();
        MaintenanceRepository::new(Arc::clone(db))
            .create(
                &user(),
                &MaintenanceRecordInput {
                    vehicle_id: vehicle.id,
                    service_type: "Oil change".to_string(),
                    date: Utc::now(),
                    mileage: record_mileage,
                    cost: 50.0,
                    notes: None,
                    description: None,
                    parts_used: None,
                },
            )
            .unwrap();
    }

    // ---- Validation ----

    #[tokio::test]
    async fn test_rejects_when_disabled() {
        let config = ChatConfig {
            enabled: false,
            ..ChatConfig::default()
        };
        let (service, _) = make_service(ScriptedGateway::ok(), config);
        let err = service
            .handle_chat(&user(), ChatRequest::from_user("hi", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::Disabled));
    }

    #[tokio::test]
    async fn test_rejects_empty_conversation() {
        let (service, _) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        let err = service
            .handle_chat(&user(), ChatRequest::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyConversation));
    }

    #[tokio::test]
    async fn test_rejects_blank_and_oversized_messages() {
        let gateway = ScriptedGateway::ok();
        let (service, _) = make_service(Arc::clone(&gateway), ChatConfig::default());

        let err = service
            .handle_chat(&user(), ChatRequest::from_user("   ", None))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::EmptyMessage));

        let err = service
            .handle_chat(&user(), ChatRequest::from_user("x".repeat(2001), None))
            .await
            .unwrap_err();
        assert!(matches!(err, ChatError::MessageTooLong(2000)));

        assert!(service
            .handle_chat(&user(), ChatRequest::from_user("x".repeat(2000), None))
            .await
            .is_ok());
        assert!(service.history(&user()).unwrap().len() == 2);
        assert_eq!(gateway.seen.lock().unwrap().len(), 1);
    }

    // ---- Conversation flow ----

    #[tokio::test]
    async fn test_chat_persists_both_turns() {
        let (service, _) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        let reply = service
            .handle_chat(&user(), ChatRequest::from_user("How often to rotate tires?", None))
            .await
            .unwrap();

        assert_eq!(reply.response, "Answer to: How often to rotate tires?");
        assert_eq!(
            reply.suggested_actions,
            vec![
                "Schedule maintenance",
                "View maintenance history",
                "Get maintenance cost estimate"
            ]
        );

        let history = service.history(&user()).unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[1].role, Role::Assistant);
        assert_eq!(history[1].content, reply.response);
    }

    #[tokio::test]
    async fn test_second_request_sees_prior_turns() {
        let gateway = ScriptedGateway::ok();
        let (service, _) = make_service(Arc::clone(&gateway), ChatConfig::default());

        service
            .handle_chat(&user(), ChatRequest::from_user("first", None))
            .await
            .unwrap();
        service
            .handle_chat(&user(), ChatRequest::from_user("second", None))
            .await
            .unwrap();

        let seen = gateway.seen.lock().unwrap();
        assert!(seen[0].history.is_empty());
        assert_eq!(seen[1].history.len(), 2);
        assert_eq!(seen[1].history[0].content, "first");
        assert_eq!(seen[1].history[1].content, "Answer to: first");
    }

    #[tokio::test]
    async fn test_context_window_applies_max_turns() {
        let gateway = ScriptedGateway::ok();
        let config = ChatConfig {
            max_turns: 3,
            ..ChatConfig::default()
        };
        let (service, _) = make_service(Arc::clone(&gateway), config);

        for q in ["q1", "q2", "q3"] {
            service
                .handle_chat(&user(), ChatRequest::from_user(q, None))
                .await
                .unwrap();
        }

        let seen = gateway.seen.lock().unwrap();
        let last: Vec<&str> = seen[2].history.iter().map(|t| t.content.as_str()).collect();
        assert_eq!(last, vec!["Answer to: q1", "q2", "Answer to: q2"]);
        // Storage keeps everything.
        assert_eq!(service.history(&user()).unwrap().len(), 6);
    }

    #[tokio::test]
    async fn test_sessions_isolated_per_user() {
        let gateway = ScriptedGateway::ok();
        let (service, _) = make_service(Arc::clone(&gateway), ChatConfig::default());

        service
            .handle_chat(&user(), ChatRequest::from_user("mine", None))
            .await
            .unwrap();
        service
            .handle_chat(&UserId::new("other"), ChatRequest::from_user("theirs", None))
            .await
            .unwrap();

        assert!(gateway.seen.lock().unwrap()[1].history.is_empty());
        assert_eq!(service.history(&UserId::new("other")).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_gateway_failure_degrades_and_keeps_user_turn() {
        let (service, _) = make_service(ScriptedGateway::failing(), ChatConfig::default());
        let reply = service
            .handle_chat(&user(), ChatRequest::from_user("Is my battery dying?", Some(corolla_info())))
            .await
            .unwrap();

        assert_eq!(
            reply.response,
            "I apologize, but I encountered an error. Please try again."
        );
        assert_eq!(
            reply.suggested_actions,
            vec!["Try again", "Ask a different question"]
        );

        let history = service.history(&user()).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::User);
        assert_eq!(history[0].content, "Is my battery dying?");
    }

    #[tokio::test]
    async fn test_chat_merges_domain_suggestions() {
        let (service, db) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        register_corolla(&db, 10_000, 45_000);

        let reply = service
            .handle_chat(&user(), ChatRequest::from_user("What is due?", Some(corolla_info())))
            .await
            .unwrap();

        let actions = &reply.suggested_actions;
        assert_eq!(actions[0], "Schedule maintenance");
        assert!(actions.contains(&"Check Toyota Corolla maintenance schedule".to_string()));
        assert!(actions.contains(&"Schedule a major service".to_string()));
        // "View maintenance history" is offered by both sources but listed once.
        assert_eq!(
            actions
                .iter()
                .filter(|a| a.as_str() == "View maintenance history")
                .count(),
            1
        );
        let gateway_pos = actions.iter().position(|a| a == "Find parts for Toyota Corolla");
        let domain_pos = actions.iter().position(|a| a == "Schedule an oil change");
        assert!(gateway_pos < domain_pos);
    }

    #[tokio::test]
    async fn test_user_turn_keeps_vehicle_context() {
        let (service, _) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        service
            .handle_chat(&user(), ChatRequest::from_user("hello", Some(corolla_info())))
            .await
            .unwrap();
        let history = service.history(&user()).unwrap();
        assert_eq!(history[0].vehicle_context, Some(corolla_info()));
    }

    #[tokio::test]
    async fn test_context_filled_from_registered_vehicle() {
        let gateway = ScriptedGateway::ok();
        let (service, db) = make_service(Arc::clone(&gateway), ChatConfig::default());
        register_corolla(&db, 10_000, 45_000);

        let info = VehicleInfo {
            make: Some("toyota".to_string()),
            ..corolla_info()
        };
        service
            .handle_chat(&user(), ChatRequest::from_user("Any recalls?", Some(info.clone())))
            .await
            .unwrap();

        let seen = gateway.seen.lock().unwrap();
        let rendered = seen[0].render();
        assert!(rendered.contains("VIN: JTDBR32E720000001"));
        // Supplied facts win over the stored ones.
        assert_eq!(seen[0].vehicle.make.as_deref(), Some("toyota"));
        // The persisted turn keeps what the caller sent.
        assert_eq!(service.history(&user()).unwrap()[0].vehicle_context, Some(info));
    }

    #[tokio::test]
    async fn test_context_unregistered_vehicle_keeps_unknown_vin() {
        let gateway = ScriptedGateway::ok();
        let (service, _) = make_service(Arc::clone(&gateway), ChatConfig::default());
        service
            .handle_chat(&user(), ChatRequest::from_user("Any recalls?", Some(corolla_info())))
            .await
            .unwrap();
        assert!(gateway.seen.lock().unwrap()[0].render().contains("VIN: Unknown"));
    }

    // ---- Suggestions ----

    #[test]
    fn test_suggestions_for_registered_vehicle() {
        let (service, db) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        register_corolla(&db, 10_000, 45_000);

        let list = service.suggestions(&user(), &corolla_info()).unwrap();
        assert_eq!(list.len(), 6);
        assert_eq!(list[0], "Schedule an oil change");
        assert_eq!(list[2], "Schedule a major service");
    }

    #[test]
    fn test_suggestions_unknown_vehicle_onboarding() {
        let (service, _) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        let list = service.suggestions(&user(), &corolla_info()).unwrap();
        assert_eq!(list, suggestions::onboarding());
    }

    #[test]
    fn test_suggestions_incomplete_identity_onboarding() {
        let (service, db) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        register_corolla(&db, 10_000, 45_000);

        let info = VehicleInfo {
            year: None,
            ..corolla_info()
        };
        assert_eq!(
            service.suggestions(&user(), &info).unwrap(),
            suggestions::onboarding()
        );
    }

    #[test]
    fn test_suggestions_other_users_vehicle_not_matched() {
        let (service, db) = make_service(ScriptedGateway::ok(), ChatConfig::default());
        register_corolla(&db, 10_000, 45_000);
        let list = service
            .suggestions(&UserId::new("other"), &corolla_info())
            .unwrap();
        assert_eq!(list, suggestions::onboarding());
    }

    #[test]
    fn test_merge_actions_dedupes_preserving_order() {
        let merged = merge_actions(
            vec!["a".to_string(), "b".to_string()],
            vec!["b".to_string(), "c".to_string(), "a".to_string()],
        );
        assert_eq!(merged, vec!["a", "b", "c"]);
    }
}

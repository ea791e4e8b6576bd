use std::sync::Arc;

use crate::core::error::DialogueError;
use crate::core::prompts;
use crate::core::registration::{RegistrationInput, RegistrationMachine, StepOutcome};
use crate::core::relay::ConversationRelay;
use crate::core::selector::MatchSelector;
use crate::core::session::{Phase, Session, SessionStore};
use crate::models::{Command, EventPayload, GeoPoint, InboundEvent, Location, Outbound, SearchScope, MENU_OPTIONS};
use crate::services::{ConversationStore, ProfileStore};

/// Fixed menu entries, as sent back by the transport's keyboard
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MenuCommand {
    Register,
    Search,
    Disconnect,
}

impl MenuCommand {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim() {
            t if t == MENU_OPTIONS[0] => Some(MenuCommand::Register),
            t if t == MENU_OPTIONS[1] => Some(MenuCommand::Search),
            t if t == MENU_OPTIONS[2] => Some(MenuCommand::Disconnect),
            _ => None,
        }
    }
}

/// Dispatches inbound events to registration, search or relay
///
/// The router owns no state of its own beyond the session store; each call
/// to [`DialogueRouter::handle`] holds the sender's session for its whole
/// duration.
#[derive(Clone)]
pub struct DialogueRouter {
    sessions: SessionStore,
    profiles: Arc<dyn ProfileStore>,
    registration: RegistrationMachine,
    selector: MatchSelector,
    relay: ConversationRelay,
}

impl DialogueRouter {
    pub fn new(
        sessions: SessionStore,
        profiles: Arc<dyn ProfileStore>,
        registration: RegistrationMachine,
        selector: MatchSelector,
        relay: ConversationRelay,
    ) -> Self {
        Self {
            sessions,
            profiles,
            registration,
            selector,
            relay,
        }
    }

    /// Wire registration, selection and relay over one pair of stores
    pub fn assemble(
        profiles: Arc<dyn ProfileStore>,
        conversations: Arc<dyn ConversationStore>,
        sessions: SessionStore,
        proximity_radius_m: f64,
    ) -> Self {
        let relay = ConversationRelay::new(profiles.clone(), conversations);
        let selector = MatchSelector::new(profiles.clone(), relay.clone())
            .with_proximity_radius(proximity_radius_m);
        let registration = RegistrationMachine::new(profiles.clone());

        Self::new(sessions, profiles, registration, selector, relay)
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.sessions
    }

    /// Process one inbound event and return the effects to deliver
    pub async fn handle(&self, event: InboundEvent) -> Vec<Outbound> {
        let mut session = self.sessions.acquire(&event.user_id).await;
        let user_id = event.user_id.clone();

        tracing::debug!(
            "Routing {} event for {} ({})",
            event.payload.kind(),
            user_id,
            phase_name(&session.phase)
        );

        match self.dispatch(&mut session, event).await {
            Ok(effects) => effects,
            Err(e) => self.failure_effects(&session, &user_id, e),
        }
    }

    async fn dispatch(
        &self,
        session: &mut Session,
        event: InboundEvent,
    ) -> Result<Vec<Outbound>, DialogueError> {
        let user_id = event.user_id.as_str();

        if let Phase::Registering(draft) = &mut session.phase {
            let input = match event.payload {
                EventPayload::Command { name: Command::Cancel } => {
                    tracing::debug!("Registration cancelled for {}", user_id);
                    session.phase = Phase::Idle;
                    return Ok(cancelled(user_id));
                }
                EventPayload::Command { name: Command::Start } => {
                    return Ok(vec![Outbound::menu(user_id), draft.prompt()]);
                }
                EventPayload::Command { name: Command::Help } => {
                    return Ok(vec![Outbound::text(user_id, prompts::HELP), draft.prompt()]);
                }
                EventPayload::Text { ref text } if MenuCommand::parse(text) == Some(MenuCommand::Register) => {
                    return self.begin_registration(session, user_id).await;
                }
                EventPayload::Text { text } => RegistrationInput::Text(text),
                EventPayload::Photo { image_ref } => RegistrationInput::Photo {
                    image_ref,
                    display_name: event.display_name.clone(),
                },
                EventPayload::Location { longitude, latitude, city, country } => {
                    RegistrationInput::Location(Location {
                        point: GeoPoint::new(longitude, latitude),
                        city,
                        country,
                    })
                }
                _ => RegistrationInput::Other,
            };

            return match self.registration.step(draft, input).await {
                Ok(StepOutcome::InProgress(effects)) => Ok(effects),
                Ok(StepOutcome::Committed(_, effects)) => {
                    session.phase = Phase::Idle;
                    Ok(effects)
                }
                Err(DialogueError::InvalidInput(reason)) => {
                    Ok(vec![Outbound::text(user_id, reason), draft.prompt()])
                }
                Err(e @ DialogueError::AlreadyRegistered(_)) => {
                    session.phase = Phase::Idle;
                    Err(e)
                }
                Err(e) => Err(e),
            };
        }

        match event.payload {
            EventPayload::Command { name: Command::Start } => Ok(vec![Outbound::menu(user_id)]),
            EventPayload::Command { name: Command::Help } => {
                Ok(vec![Outbound::text(user_id, prompts::HELP), Outbound::menu(user_id)])
            }
            EventPayload::Command { name: Command::Cancel } => {
                session.phase = Phase::Idle;
                Ok(cancelled(user_id))
            }
            EventPayload::ProfileView { target_user_id } => {
                let summary = self.relay.view_profile(user_id, &target_user_id).await?;
                let card = prompts::profile_card(
                    &summary.display_name,
                    summary.sex.as_str(),
                    &summary.birthday,
                );
                Ok(vec![Outbound::text(user_id, card)])
            }
            EventPayload::Text { text } => match MenuCommand::parse(&text) {
                Some(MenuCommand::Register) => self.begin_registration(session, user_id).await,
                Some(MenuCommand::Search) => self.begin_search(session, user_id).await,
                Some(MenuCommand::Disconnect) => {
                    let effects = self.disconnect(user_id).await?;
                    session.phase = Phase::Idle;
                    Ok(effects)
                }
                None if session.phase == Phase::ChoosingScope => {
                    self.choose_scope(session, user_id, &text).await
                }
                None => self.relay.relay_message(user_id, &text).await,
            },
            EventPayload::Photo { .. } | EventPayload::Location { .. }
                if session.phase == Phase::ChoosingScope =>
            {
                Ok(vec![
                    Outbound::text(user_id, prompts::INVALID_SCOPE),
                    scope_choices(user_id),
                ])
            }
            EventPayload::Photo { .. } | EventPayload::Location { .. } => Ok(vec![
                Outbound::text(user_id, prompts::INVALID_MENU_OPTION),
                Outbound::menu(user_id),
            ]),
        }
    }

    async fn begin_registration(
        &self,
        session: &mut Session,
        user_id: &str,
    ) -> Result<Vec<Outbound>, DialogueError> {
        let result = self.registration.begin(user_id).await;

        // A registered user leaves any draft behind; a store failure keeps it
        if let Err(DialogueError::AlreadyRegistered(_)) = result {
            session.phase = Phase::Idle;
        }

        let (draft, effects) = result?;
        session.phase = Phase::Registering(draft);
        Ok(effects)
    }

    /// Check the seeker can search, make them searchable and offer scopes
    async fn begin_search(
        &self,
        session: &mut Session,
        user_id: &str,
    ) -> Result<Vec<Outbound>, DialogueError> {
        let seeker = self.selector.seeker(user_id).await?;

        if self.relay.has_active_pairing(&seeker.user_id).await? {
            return Err(DialogueError::AlreadyInConversation(seeker.user_id));
        }

        if !seeker.active {
            self.profiles.update_active_flag(&seeker.user_id, true).await?;
        }

        session.phase = Phase::ChoosingScope;
        Ok(vec![scope_choices(user_id)])
    }

    async fn choose_scope(
        &self,
        session: &mut Session,
        user_id: &str,
        text: &str,
    ) -> Result<Vec<Outbound>, DialogueError> {
        // Someone else may have picked this user while they were choosing
        if self.relay.has_active_pairing(user_id).await? {
            session.phase = Phase::Idle;
            return self.relay.relay_message(user_id, text).await;
        }

        let Some(scope) = SearchScope::from_label(text) else {
            return Ok(vec![
                Outbound::text(user_id, prompts::INVALID_SCOPE),
                scope_choices(user_id),
            ]);
        };

        let result = self.selector.select(user_id, scope).await;

        // A failed store call leaves the user choosing, so they can retry
        if !matches!(result, Err(DialogueError::StoreUnavailable(_))) {
            session.phase = Phase::Idle;
        }

        let mut effects = result?.effects;
        effects.push(Outbound::menu(user_id));
        Ok(effects)
    }

    async fn disconnect(&self, user_id: &str) -> Result<Vec<Outbound>, DialogueError> {
        let mut effects = match self.relay.disconnect(user_id).await {
            Ok(effects) => effects,
            Err(DialogueError::NoActiveConversation(_)) => {
                vec![Outbound::text(user_id, prompts::NOTHING_TO_DISCONNECT)]
            }
            Err(e) => return Err(e),
        };
        effects.push(Outbound::menu(user_id));
        Ok(effects)
    }

    /// Turn a failure into the message shown to the user
    fn failure_effects(&self, session: &Session, user_id: &str, error: DialogueError) -> Vec<Outbound> {
        let text = match &error {
            DialogueError::NotRegistered(_) => prompts::NOT_REGISTERED,
            DialogueError::AlreadyRegistered(_) => prompts::ALREADY_REGISTERED,
            DialogueError::NoMatch => prompts::NO_MATCH,
            DialogueError::NoActiveConversation(_) => prompts::NO_ACTIVE_CHAT,
            DialogueError::AlreadyInConversation(_) => prompts::ALREADY_IN_CHAT,
            DialogueError::PartnerUnavailable(_) => prompts::PARTNER_UNAVAILABLE,
            DialogueError::Forbidden { .. } => prompts::VIEW_FORBIDDEN,
            DialogueError::InvalidInput(_) => prompts::INVALID_MENU_OPTION,
            DialogueError::StoreUnavailable(e) => {
                tracing::error!("Store failure while handling event for {}: {}", user_id, e);
                prompts::STORE_FAILURE
            }
        };

        let mut effects = vec![Outbound::text(user_id, text)];
        match session.draft() {
            // Still mid-registration: show the step again rather than the menu
            Some(draft) => effects.push(draft.prompt()),
            None => effects.push(Outbound::menu(user_id)),
        }
        effects
    }
}

fn cancelled(user_id: &str) -> Vec<Outbound> {
    vec![Outbound::text(user_id, prompts::CANCELLED), Outbound::menu(user_id)]
}

fn scope_choices(user_id: &str) -> Outbound {
    Outbound::choices(
        user_id,
        prompts::ASK_SCOPE,
        SearchScope::ALL.iter().map(|scope| scope.label()),
    )
}

fn phase_name(phase: &Phase) -> &'static str {
    match phase {
        Phase::Idle => "idle",
        Phase::Registering(_) => "registering",
        Phase::ChoosingScope => "choosing_scope",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::registration::RegistrationState;
    use crate::models::{Profile, Sex};
    use crate::services::{MemoryConversationStore, MemoryProfileStore, StoreError};
    use async_trait::async_trait;

    /// Profile store whose writes always fail
    #[derive(Default)]
    struct ReadOnlyProfiles {
        inner: MemoryProfileStore,
    }

    #[async_trait]
    impl ProfileStore for ReadOnlyProfiles {
        async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
            self.inner.find_by_user_id(user_id).await
        }

        async fn find_by_sex_active(&self, sex: Sex) -> Result<Vec<Profile>, StoreError> {
            self.inner.find_by_sex_active(sex).await
        }

        async fn find_near_location(
            &self,
            point: GeoPoint,
            radius_m: f64,
            sex: Sex,
            exclude_user_id: &str,
        ) -> Result<Vec<Profile>, StoreError> {
            self.inner.find_near_location(point, radius_m, sex, exclude_user_id).await
        }

        async fn find_by_city(&self, city: &str, sex: Sex, exclude_user_id: &str) -> Result<Vec<Profile>, StoreError> {
            self.inner.find_by_city(city, sex, exclude_user_id).await
        }

        async fn find_by_country(&self, country: &str, sex: Sex, exclude_user_id: &str) -> Result<Vec<Profile>, StoreError> {
            self.inner.find_by_country(country, sex, exclude_user_id).await
        }

        async fn insert(&self, _profile: &Profile) -> Result<(), StoreError> {
            Err(StoreError::Unavailable("read-only".to_string()))
        }

        async fn update_active_flag(&self, _user_id: &str, _active: bool) -> Result<bool, StoreError> {
            Err(StoreError::Unavailable("read-only".to_string()))
        }
    }

    fn router_with(profiles: Arc<dyn ProfileStore>) -> DialogueRouter {
        DialogueRouter::assemble(
            profiles,
            Arc::new(MemoryConversationStore::new()),
            SessionStore::default(),
            1_000.0,
        )
    }

    async fn fill_draft(router: &DialogueRouter, user: &str) {
        router.handle(InboundEvent::text(user, "Register")).await;
        router.handle(InboundEvent::photo(user, "img")).await;
        router.handle(InboundEvent::text(user, "Male")).await;
        router.handle(InboundEvent::text(user, "Female")).await;
        router.handle(InboundEvent::text(user, "1990-01-01")).await;
    }

    #[test]
    fn test_menu_command_parse() {
        assert_eq!(MenuCommand::parse("Register"), Some(MenuCommand::Register));
        assert_eq!(MenuCommand::parse(" Search for Match "), Some(MenuCommand::Search));
        assert_eq!(MenuCommand::parse("Disconnect"), Some(MenuCommand::Disconnect));
        assert_eq!(MenuCommand::parse("register"), None);
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_draft() {
        let router = router_with(Arc::new(ReadOnlyProfiles::default()));
        fill_draft(&router, "1").await;

        let effects = router.handle(InboundEvent::location("1", 13.4, 52.5)).await;
        assert_eq!(effects[0], Outbound::text("1", prompts::STORE_FAILURE));
        assert!(matches!(effects[1], Outbound::RequestLocation { .. }));

        let session = router.sessions().acquire("1").await;
        let draft = session.draft().unwrap();
        assert_eq!(draft.state(), RegistrationState::AwaitingLocation);
        assert_eq!(draft.birthday(), Some("1990-01-01"));
    }

    #[tokio::test]
    async fn test_start_mid_registration_repeats_prompt() {
        let router = router_with(Arc::new(MemoryProfileStore::new()));
        router.handle(InboundEvent::text("1", "Register")).await;

        let effects = router.handle(InboundEvent::command("1", Command::Start)).await;
        assert_eq!(
            effects,
            vec![Outbound::menu("1"), Outbound::text("1", prompts::ASK_PHOTO)]
        );

        let effects = router.handle(InboundEvent::command("1", Command::Help)).await;
        assert_eq!(effects[0], Outbound::text("1", prompts::HELP));
    }

    #[tokio::test]
    async fn test_photo_while_idle_is_rejected() {
        let router = router_with(Arc::new(MemoryProfileStore::new()));

        let effects = router.handle(InboundEvent::photo("1", "img")).await;
        assert_eq!(
            effects,
            vec![Outbound::text("1", prompts::INVALID_MENU_OPTION), Outbound::menu("1")]
        );
    }

    #[tokio::test]
    async fn test_disconnect_leaves_scope_choice() {
        let router = router_with(Arc::new(MemoryProfileStore::new()));

        fill_draft(&router, "1").await;
        router.handle(InboundEvent::location("1", 0.0, 0.0)).await;
        router.handle(InboundEvent::text("1", "Search for Match")).await;
        assert_eq!(router.sessions().acquire("1").await.phase, Phase::ChoosingScope);

        let effects = router.handle(InboundEvent::text("1", "Disconnect")).await;
        assert_eq!(
            effects,
            vec![Outbound::text("1", prompts::NOTHING_TO_DISCONNECT), Outbound::menu("1")]
        );
        assert_eq!(router.sessions().acquire("1").await.phase, Phase::Idle);
    }

    #[tokio::test]
    async fn test_location_while_choosing_scope_repeats_choices() {
        let router = router_with(Arc::new(MemoryProfileStore::new()));

        fill_draft(&router, "1").await;
        router.handle(InboundEvent::location("1", 0.0, 0.0)).await;
        router.handle(InboundEvent::text("1", "Search for Match")).await;

        let effects = router.handle(InboundEvent::location("1", 0.0, 0.0)).await;
        assert_eq!(effects, vec![Outbound::text("1", prompts::INVALID_SCOPE), scope_choices("1")]);
        assert_eq!(router.sessions().acquire("1").await.phase, Phase::ChoosingScope);

        let effects = router.handle(InboundEvent::photo("1", "img")).await;
        assert_eq!(effects[0], Outbound::text("1", prompts::INVALID_SCOPE));

        // The scope choice still works afterwards
        let effects = router.handle(InboundEvent::text("1", "Anywhere")).await;
        assert_eq!(effects[0], Outbound::text("1", prompts::NO_MATCH));
        assert_eq!(router.sessions().acquire("1").await.phase, Phase::Idle);
    }
}

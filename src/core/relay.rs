use std::sync::Arc;

use crate::core::error::DialogueError;
use crate::core::prompts;
use crate::models::{Outbound, Pairing, Profile, ProfileSummary};
use crate::services::{ConversationStore, ProfileStore, StoreError};

/// Decides whether one user may see another's basic profile fields
pub trait ProfileViewPolicy: Send + Sync {
    fn may_view(&self, requester_id: &str, target: &Profile) -> bool;
}

/// Any caller may view any profile
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenProfileView;

impl ProfileViewPolicy for OpenProfileView {
    fn may_view(&self, _requester_id: &str, _target: &Profile) -> bool {
        true
    }
}

/// A pairing that was just created, with the notifications for both sides
#[derive(Debug)]
pub struct PairingStarted {
    pub pairing: Pairing,
    pub effects: Vec<Outbound>,
}

/// Routes messages between paired users and manages pairing start/end
#[derive(Clone)]
pub struct ConversationRelay {
    profiles: Arc<dyn ProfileStore>,
    conversations: Arc<dyn ConversationStore>,
    view_policy: Arc<dyn ProfileViewPolicy>,
}

impl ConversationRelay {
    pub fn new(profiles: Arc<dyn ProfileStore>, conversations: Arc<dyn ConversationStore>) -> Self {
        Self {
            profiles,
            conversations,
            view_policy: Arc::new(OpenProfileView),
        }
    }

    pub fn with_view_policy(mut self, policy: Arc<dyn ProfileViewPolicy>) -> Self {
        self.view_policy = policy;
        self
    }

    /// Whether `user_id` currently takes part in an active pairing
    pub async fn has_active_pairing(&self, user_id: &str) -> Result<bool, DialogueError> {
        Ok(self
            .conversations
            .find_active_by_participant(user_id)
            .await?
            .is_some())
    }

    /// Pair `seeker` with `candidate`
    ///
    /// The pairing insert is guarded by the store: if either side became
    /// paired in the meantime nothing is written.
    pub async fn start_pairing(
        &self,
        seeker: &Profile,
        candidate: &Profile,
    ) -> Result<PairingStarted, DialogueError> {
        let pairing = Pairing::new(&seeker.user_id, &candidate.user_id);

        match self.conversations.insert(&pairing).await {
            Ok(()) => {}
            Err(StoreError::ParticipantBusy(user_id)) if user_id == seeker.user_id => {
                return Err(DialogueError::AlreadyInConversation(user_id));
            }
            Err(StoreError::ParticipantBusy(user_id)) => {
                return Err(DialogueError::PartnerUnavailable(user_id));
            }
            Err(e) => return Err(e.into()),
        }

        let mut cleared: Vec<&str> = Vec::with_capacity(2);
        for user_id in [&seeker.user_id, &candidate.user_id] {
            if let Err(e) = self.profiles.update_active_flag(user_id, false).await {
                tracing::error!(
                    "Pairing {} created but clearing search flag for {} failed: {}",
                    pairing.id,
                    user_id,
                    e
                );
                self.roll_back(&pairing, &cleared).await;
                return Err(e.into());
            }
            cleared.push(user_id);
        }

        tracing::info!(
            "Started pairing {}: {} <-> {}",
            pairing.id,
            seeker.user_id,
            candidate.user_id
        );

        let effects = vec![
            Outbound::text(&seeker.user_id, prompts::matched_with(&candidate.display_name)),
            offer_profile(&seeker.user_id, &candidate.user_id),
            Outbound::text(&candidate.user_id, prompts::matched_with(&seeker.display_name)),
            offer_profile(&candidate.user_id, &seeker.user_id),
        ];

        Ok(PairingStarted { pairing, effects })
    }

    /// Undo a pairing whose search flags could not all be cleared
    ///
    /// Best effort: failures here are logged and the original error wins.
    async fn roll_back(&self, pairing: &Pairing, cleared: &[&str]) {
        match self.conversations.deactivate_active_for(&pairing.user_a).await {
            Ok(Some(ended)) if ended.id == pairing.id => {
                tracing::warn!("Rolled back pairing {}", pairing.id);
            }
            Ok(_) => tracing::error!("Pairing {} was not active during rollback", pairing.id),
            Err(e) => tracing::error!("Failed to roll back pairing {}: {}", pairing.id, e),
        }

        for user_id in cleared {
            if let Err(e) = self.profiles.update_active_flag(user_id, true).await {
                tracing::error!("Failed to restore search flag for {}: {}", user_id, e);
            }
        }
    }

    /// Deliver `text` verbatim to the sender's current partner
    pub async fn relay_message(&self, sender_id: &str, text: &str) -> Result<Vec<Outbound>, DialogueError> {
        let pairing = self
            .conversations
            .find_active_by_participant(sender_id)
            .await?
            .ok_or_else(|| DialogueError::NoActiveConversation(sender_id.to_string()))?;

        let recipient = pairing
            .partner_of(sender_id)
            .ok_or_else(|| DialogueError::NoActiveConversation(sender_id.to_string()))?;

        tracing::trace!("Relaying message in pairing {}", pairing.id);

        Ok(vec![Outbound::text(recipient, text)])
    }

    /// End the active pairing containing `user_id`
    ///
    /// Neither profile's search flag is restored; both users have to search
    /// again to be matchable.
    pub async fn disconnect(&self, user_id: &str) -> Result<Vec<Outbound>, DialogueError> {
        let pairing = self
            .conversations
            .deactivate_active_for(user_id)
            .await?
            .ok_or_else(|| DialogueError::NoActiveConversation(user_id.to_string()))?;

        tracing::info!("Pairing {} ended by {}", pairing.id, user_id);

        let mut effects = Vec::with_capacity(2);
        if let Some(partner) = pairing.partner_of(user_id) {
            effects.push(Outbound::text(partner, prompts::PARTNER_DISCONNECTED));
        }
        effects.push(Outbound::text(user_id, prompts::DISCONNECTED));

        Ok(effects)
    }

    /// Basic fields of `target_user_id`'s profile
    pub async fn view_profile(
        &self,
        requester_id: &str,
        target_user_id: &str,
    ) -> Result<ProfileSummary, DialogueError> {
        let target = self
            .profiles
            .find_by_user_id(target_user_id)
            .await?
            .ok_or_else(|| DialogueError::NotRegistered(target_user_id.to_string()))?;

        if !self.view_policy.may_view(requester_id, &target) {
            return Err(DialogueError::Forbidden {
                requester: requester_id.to_string(),
                target: target_user_id.to_string(),
            });
        }

        Ok(target.summary())
    }
}

fn offer_profile(user_id: &str, target_user_id: &str) -> Outbound {
    Outbound::OfferProfileView {
        user_id: user_id.to_string(),
        target_user_id: target_user_id.to_string(),
        label: prompts::VIEW_PROFILE.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GeoPoint, Location, Sex};
    use crate::services::{MemoryConversationStore, MemoryProfileStore};

    fn profile(id: &str, sex: Sex) -> Profile {
        Profile {
            user_id: id.to_string(),
            display_name: format!("User {}", id),
            sex,
            preferred_sex: Sex::Female,
            birthday: "1990-01-01".to_string(),
            location: Location {
                point: GeoPoint::new(0.0, 0.0),
                city: None,
                country: None,
            },
            profile_image_ref: format!("{}_profile.jpg", id),
            active: true,
            created_at: None,
        }
    }

    async fn relay_with(profiles: &[Profile]) -> (ConversationRelay, Arc<MemoryProfileStore>, Arc<MemoryConversationStore>) {
        let profile_store = Arc::new(MemoryProfileStore::new());
        for p in profiles {
            profile_store.insert(p).await.unwrap();
        }
        let conversations = Arc::new(MemoryConversationStore::new());
        let relay = ConversationRelay::new(profile_store.clone(), conversations.clone());
        (relay, profile_store, conversations)
    }

    /// Profile store that refuses to clear the search flag of one user
    struct StuckFlag {
        inner: MemoryProfileStore,
        user_id: &'static str,
    }

    #[async_trait::async_trait]
    impl ProfileStore for StuckFlag {
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

        async fn insert(&self, profile: &Profile) -> Result<(), StoreError> {
            self.inner.insert(profile).await
        }

        async fn update_active_flag(&self, user_id: &str, active: bool) -> Result<bool, StoreError> {
            if user_id == self.user_id && !active {
                return Err(StoreError::Unavailable("flag update timed out".to_string()));
            }
            self.inner.update_active_flag(user_id, active).await
        }
    }

    #[tokio::test]
    async fn test_failed_flag_update_rolls_back_pairing() {
        let a = profile("a", Sex::Male);
        let b = profile("b", Sex::Female);

        let profiles = Arc::new(StuckFlag {
            inner: MemoryProfileStore::new(),
            user_id: "b",
        });
        profiles.insert(&a).await.unwrap();
        profiles.insert(&b).await.unwrap();
        let conversations = Arc::new(MemoryConversationStore::new());
        let relay = ConversationRelay::new(profiles.clone(), conversations.clone());

        assert!(matches!(
            relay.start_pairing(&a, &b).await,
            Err(DialogueError::StoreUnavailable(_))
        ));

        // No active pairing is left behind and both users are still searchable
        assert!(conversations.find_active_by_participant("a").await.unwrap().is_none());
        assert!(conversations.find_active_by_participant("b").await.unwrap().is_none());
        assert!(profiles.find_by_user_id("a").await.unwrap().unwrap().active);
        assert!(profiles.find_by_user_id("b").await.unwrap().unwrap().active);
        assert!(matches!(
            relay.relay_message("b", "hi").await,
            Err(DialogueError::NoActiveConversation(_))
        ));
    }

    struct DenyAll;

    impl ProfileViewPolicy for DenyAll {
        fn may_view(&self, _requester_id: &str, _target: &Profile) -> bool {
            false
        }
    }

    #[tokio::test]
    async fn test_start_pairing_clears_search_flags() {
        let a = profile("a", Sex::Male);
        let b = profile("b", Sex::Female);
        let (relay, profiles, _) = relay_with(&[a.clone(), b.clone()]).await;

        let started = relay.start_pairing(&a, &b).await.unwrap();

        assert!(started.pairing.active);
        assert_eq!(started.effects.len(), 4);
        assert!(!profiles.find_by_user_id("a").await.unwrap().unwrap().active);
        assert!(!profiles.find_by_user_id("b").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_start_pairing_with_busy_candidate() {
        let a = profile("a", Sex::Male);
        let b = profile("b", Sex::Female);
        let c = profile("c", Sex::Male);
        let (relay, _, _) = relay_with(&[a.clone(), b.clone(), c.clone()]).await;

        relay.start_pairing(&a, &b).await.unwrap();

        assert!(matches!(
            relay.start_pairing(&c, &b).await,
            Err(DialogueError::PartnerUnavailable(ref id)) if id == "b"
        ));
        assert!(matches!(
            relay.start_pairing(&a, &c).await,
            Err(DialogueError::AlreadyInConversation(ref id)) if id == "a"
        ));
    }

    #[tokio::test]
    async fn test_relay_delivers_verbatim() {
        let a = profile("a", Sex::Male);
        let b = profile("b", Sex::Female);
        let (relay, _, _) = relay_with(&[a.clone(), b.clone()]).await;
        relay.start_pairing(&a, &b).await.unwrap();

        let effects = relay.relay_message("b", "  hi there!  ").await.unwrap();
        assert_eq!(effects, vec![Outbound::text("a", "  hi there!  ")]);
    }

    #[tokio::test]
    async fn test_disconnect_twice() {
        let a = profile("a", Sex::Male);
        let b = profile("b", Sex::Female);
        let (relay, profiles, _) = relay_with(&[a.clone(), b.clone()]).await;
        relay.start_pairing(&a, &b).await.unwrap();

        let effects = relay.disconnect("a").await.unwrap();
        assert_eq!(
            effects,
            vec![
                Outbound::text("b", prompts::PARTNER_DISCONNECTED),
                Outbound::text("a", prompts::DISCONNECTED),
            ]
        );

        assert!(matches!(
            relay.disconnect("b").await,
            Err(DialogueError::NoActiveConversation(_))
        ));

        // Searchability stays off until the user searches again
        assert!(!profiles.find_by_user_id("a").await.unwrap().unwrap().active);
    }

    #[tokio::test]
    async fn test_view_profile() {
        let a = profile("a", Sex::Male);
        let (relay, _, _) = relay_with(&[a.clone()]).await;

        let summary = relay.view_profile("anyone", "a").await.unwrap();
        assert_eq!(summary.display_name, "User a");
        assert_eq!(summary.sex, Sex::Male);

        assert!(matches!(
            relay.view_profile("anyone", "missing").await,
            Err(DialogueError::NotRegistered(_))
        ));

        let guarded = relay.with_view_policy(Arc::new(DenyAll));
        assert!(matches!(
            guarded.view_profile("anyone", "a").await,
            Err(DialogueError::Forbidden { .. })
        ));
    }
}

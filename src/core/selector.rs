use std::sync::Arc;

use crate::core::error::DialogueError;
use crate::core::relay::{ConversationRelay, PairingStarted};
use crate::models::{Profile, SearchScope};
use crate::services::ProfileStore;

/// Default radius of the proximity scope
pub const DEFAULT_PROXIMITY_RADIUS_M: f64 = 1_000.0;

/// Picks one candidate for a seeker and hands the pair to the relay
///
/// # Scopes
/// Each scope is one store query, evaluated on its own:
/// 1. Proximity - within the configured radius, nearest first
/// 2. City - same city
/// 3. Country - same country
/// 4. Any - no geographic constraint
///
/// All scopes require `sex == seeker.preferred_sex`, an active candidate
/// and a candidate other than the seeker. The first result wins.
#[derive(Clone)]
pub struct MatchSelector {
    profiles: Arc<dyn ProfileStore>,
    relay: ConversationRelay,
    proximity_radius_m: f64,
}

impl MatchSelector {
    pub fn new(profiles: Arc<dyn ProfileStore>, relay: ConversationRelay) -> Self {
        Self {
            profiles,
            relay,
            proximity_radius_m: DEFAULT_PROXIMITY_RADIUS_M,
        }
    }

    pub fn with_proximity_radius(mut self, radius_m: f64) -> Self {
        self.proximity_radius_m = radius_m;
        self
    }

    /// Committed profile of `user_id`, or `NotRegistered`
    pub async fn seeker(&self, user_id: &str) -> Result<Profile, DialogueError> {
        self.profiles
            .find_by_user_id(user_id)
            .await?
            .ok_or_else(|| DialogueError::NotRegistered(user_id.to_string()))
    }

    /// First eligible candidate for `seeker` within `scope`
    pub async fn find_candidate(
        &self,
        seeker: &Profile,
        scope: SearchScope,
    ) -> Result<Option<Profile>, DialogueError> {
        let sex = seeker.preferred_sex;
        let exclude = seeker.user_id.as_str();

        let candidates = match scope {
            SearchScope::Proximity => {
                self.profiles
                    .find_near_location(seeker.location.point, self.proximity_radius_m, sex, exclude)
                    .await?
            }
            SearchScope::City => match seeker.location.city.as_deref() {
                Some(city) => self.profiles.find_by_city(city, sex, exclude).await?,
                None => Vec::new(),
            },
            SearchScope::Country => match seeker.location.country.as_deref() {
                Some(country) => self.profiles.find_by_country(country, sex, exclude).await?,
                None => Vec::new(),
            },
            SearchScope::Any => self.profiles.find_by_sex_active(sex).await?,
        };

        tracing::debug!(
            "Found {} candidates for {} in scope {:?}",
            candidates.len(),
            seeker.user_id,
            scope
        );

        // Stores already filter; this keeps the selector honest against a
        // store that returns the seeker or a stale row.
        Ok(candidates
            .into_iter()
            .find(|c| c.active && c.sex == sex && c.user_id != seeker.user_id))
    }

    /// Run one search for `seeker_id` and pair them with the winner
    ///
    /// With no candidate the seeker stops searching (`active=false`) and
    /// `NoMatch` is returned; other scopes are not tried.
    pub async fn select(
        &self,
        seeker_id: &str,
        scope: SearchScope,
    ) -> Result<PairingStarted, DialogueError> {
        let seeker = self.seeker(seeker_id).await?;

        match self.find_candidate(&seeker, scope).await? {
            Some(candidate) => self.relay.start_pairing(&seeker, &candidate).await,
            None => {
                self.profiles.update_active_flag(&seeker.user_id, false).await?;
                tracing::info!("No match for {} in scope {:?}", seeker.user_id, scope);
                Err(DialogueError::NoMatch)
            }
        }
    }
}

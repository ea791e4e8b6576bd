use async_trait::async_trait;
use tokio::sync::{Mutex, RwLock};

use crate::core::distance::{calculate_bounding_box, distance_meters, is_within_bounding_box};
use crate::models::{GeoPoint, Pairing, Profile, Sex};
use crate::services::store::{ConversationStore, ProfileStore, StoreError};

/// In-memory profile store
///
/// Keeps profiles in insertion order so "first returned" is deterministic.
#[derive(Default)]
pub struct MemoryProfileStore {
    profiles: RwLock<Vec<Profile>>,
}

impl MemoryProfileStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.profiles.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.profiles.read().await.is_empty()
    }

    async fn filter_active<F>(&self, sex: Sex, exclude_user_id: &str, predicate: F) -> Vec<Profile>
    where
        F: Fn(&Profile) -> bool,
    {
        self.profiles
            .read()
            .await
            .iter()
            .filter(|p| p.active && p.sex == sex && p.user_id != exclude_user_id)
            .filter(|p| predicate(p))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProfileStore for MemoryProfileStore {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        Ok(self
            .profiles
            .read()
            .await
            .iter()
            .find(|p| p.user_id == user_id)
            .cloned())
    }

    async fn find_by_sex_active(&self, sex: Sex) -> Result<Vec<Profile>, StoreError> {
        Ok(self.filter_active(sex, "", |_| true).await)
    }

    async fn find_near_location(
        &self,
        point: GeoPoint,
        radius_m: f64,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError> {
        let bbox = calculate_bounding_box(point, radius_m);

        let mut nearby: Vec<(f64, Profile)> = self
            .filter_active(sex, exclude_user_id, |p| {
                is_within_bounding_box(p.location.point, &bbox)
            })
            .await
            .into_iter()
            .map(|p| (distance_meters(point, p.location.point), p))
            .filter(|(distance, _)| *distance <= radius_m)
            .collect();

        nearby.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));

        Ok(nearby.into_iter().map(|(_, p)| p).collect())
    }

    async fn find_by_city(
        &self,
        city: &str,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError> {
        Ok(self
            .filter_active(sex, exclude_user_id, |p| {
                p.location.city.as_deref() == Some(city)
            })
            .await)
    }

    async fn find_by_country(
        &self,
        country: &str,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError> {
        Ok(self
            .filter_active(sex, exclude_user_id, |p| {
                p.location.country.as_deref() == Some(country)
            })
            .await)
    }

    async fn insert(&self, profile: &Profile) -> Result<(), StoreError> {
        let mut profiles = self.profiles.write().await;
        if profiles.iter().any(|p| p.user_id == profile.user_id) {
            return Err(StoreError::DuplicateProfile(profile.user_id.clone()));
        }
        profiles.push(profile.clone());
        Ok(())
    }

    async fn update_active_flag(&self, user_id: &str, active: bool) -> Result<bool, StoreError> {
        let mut profiles = self.profiles.write().await;
        match profiles.iter_mut().find(|p| p.user_id == user_id) {
            Some(profile) => {
                profile.active = active;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

/// In-memory conversation store
///
/// Every mutation happens under a single mutex, which is what makes the
/// guarded insert and the deactivate atomic.
#[derive(Default)]
pub struct MemoryConversationStore {
    pairings: Mutex<Vec<Pairing>>,
}

impl MemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every pairing ever created
    pub async fn all(&self) -> Vec<Pairing> {
        self.pairings.lock().await.clone()
    }
}

#[async_trait]
impl ConversationStore for MemoryConversationStore {
    async fn find_active_by_participant(&self, user_id: &str) -> Result<Option<Pairing>, StoreError> {
        Ok(self
            .pairings
            .lock()
            .await
            .iter()
            .find(|p| p.active && p.involves(user_id))
            .cloned())
    }

    async fn insert(&self, pairing: &Pairing) -> Result<(), StoreError> {
        let mut pairings = self.pairings.lock().await;

        if let Some(busy) = pairings
            .iter()
            .filter(|p| p.active)
            .find_map(|p| {
                [&pairing.user_a, &pairing.user_b]
                    .into_iter()
                    .find(|user| p.involves(user))
            })
        {
            return Err(StoreError::ParticipantBusy(busy.clone()));
        }

        pairings.push(pairing.clone());
        Ok(())
    }

    async fn deactivate_active_for(&self, user_id: &str) -> Result<Option<Pairing>, StoreError> {
        let mut pairings = self.pairings.lock().await;

        Ok(pairings
            .iter_mut()
            .find(|p| p.active && p.involves(user_id))
            .map(|p| {
                let before = p.clone();
                p.active = false;
                p.ended_at = Some(chrono::Utc::now());
                before
            }))
    }
}

//! Store interfaces consumed by the relay core.
//!
//! The core never talks to a database directly; it goes through these two
//! traits so the selector and relay run unchanged against PostgreSQL or the
//! in-memory stores used in tests.

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{GeoPoint, Pairing, Profile, Sex};

/// Errors that can occur when talking to a store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("SQLx error: {0}")]
    SqlxError(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    MigrateError(#[from] sqlx::migrate::MigrateError),

    #[error("Participant already has an active pairing: {0}")]
    ParticipantBusy(String),

    #[error("Duplicate profile: {0}")]
    DuplicateProfile(String),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Store unavailable: {0}")]
    Unavailable(String),
}

/// Persistent profile records
#[async_trait]
pub trait ProfileStore: Send + Sync {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>, StoreError>;

    /// Active profiles of the given sex, in no particular order
    async fn find_by_sex_active(&self, sex: Sex) -> Result<Vec<Profile>, StoreError>;

    /// Active profiles of `sex` within `radius_m` of `point`, nearest first
    async fn find_near_location(
        &self,
        point: GeoPoint,
        radius_m: f64,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError>;

    async fn find_by_city(
        &self,
        city: &str,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError>;

    async fn find_by_country(
        &self,
        country: &str,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError>;

    /// Insert a complete profile in one write
    async fn insert(&self, profile: &Profile) -> Result<(), StoreError>;

    /// Set the searching flag; returns false when no such profile exists
    async fn update_active_flag(&self, user_id: &str, active: bool) -> Result<bool, StoreError>;

    async fn health_check(&self) -> Result<bool, StoreError> {
        Ok(true)
    }
}

/// Persistent pairing records
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn find_active_by_participant(&self, user_id: &str) -> Result<Option<Pairing>, StoreError>;

    /// Insert an active pairing
    ///
    /// Fails with [`StoreError::ParticipantBusy`] when either participant
    /// already has an active pairing; the check and the insert are one
    /// atomic operation.
    async fn insert(&self, pairing: &Pairing) -> Result<(), StoreError>;

    /// Atomically find and deactivate the active pairing containing `user_id`
    ///
    /// Returns the pairing as it was before deactivation. Of two concurrent
    /// calls for the same pairing exactly one observes `Some`.
    async fn deactivate_active_for(&self, user_id: &str) -> Result<Option<Pairing>, StoreError>;
}

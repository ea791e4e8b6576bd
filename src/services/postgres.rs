use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use std::time::Duration;

use crate::core::distance::calculate_bounding_box;
use crate::models::{GeoPoint, Location, Pairing, Profile, Sex};
use crate::services::store::{ConversationStore, ProfileStore, StoreError};

const PROFILE_COLUMNS: &str = r#"
    user_id, display_name, sex, preferred_sex, birthday,
    longitude, latitude, city, country, profile_image_ref, active, created_at
"#;

/// Great-circle distance in meters from ($1 = longitude, $2 = latitude)
const DISTANCE_EXPR: &str = r#"
    6371000.0 * 2.0 * ASIN(SQRT(
        POWER(SIN(RADIANS(latitude - $2) / 2.0), 2)
        + COS(RADIANS($2)) * COS(RADIANS(latitude))
        * POWER(SIN(RADIANS(longitude - $1) / 2.0), 2)
    ))
"#;

/// PostgreSQL client backing both the profile and conversation stores
///
/// Cloning is cheap; the pool is shared.
#[derive(Clone)]
pub struct PostgresClient {
    pool: PgPool,
    candidate_limit: i64,
}

impl PostgresClient {
    /// Create a new PostgreSQL client from a connection string
    pub async fn new(
        database_url: &str,
        max_connections: u32,
        min_connections: u32,
        acquire_timeout: Duration,
        idle_timeout: Duration,
        candidate_limit: usize,
    ) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(acquire_timeout)
            .idle_timeout(idle_timeout)
            .test_before_acquire(true)
            .connect(database_url)
            .await?;

        // Run migrations on startup
        sqlx::migrate!("./migrations").run(&pool).await?;

        Ok(Self {
            pool,
            candidate_limit: candidate_limit as i64,
        })
    }

    /// Create a new PostgreSQL client from settings
    pub async fn from_settings(
        url: &str,
        max_connections: Option<u32>,
        min_connections: Option<u32>,
        acquire_timeout_secs: Option<u64>,
        idle_timeout_secs: Option<u64>,
        candidate_limit: usize,
    ) -> Result<Self, StoreError> {
        tracing::info!("Connecting to PostgreSQL");

        Self::new(
            url,
            max_connections.unwrap_or(10),
            min_connections.unwrap_or(1),
            Duration::from_secs(acquire_timeout_secs.unwrap_or(5)),
            Duration::from_secs(idle_timeout_secs.unwrap_or(600)),
            candidate_limit,
        )
        .await
    }

    async fn fetch_profiles(
        &self,
        filter: &str,
        value: &str,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError> {
        let query = format!(
            r#"
            SELECT {PROFILE_COLUMNS}
            FROM profiles
            WHERE active AND {filter} = $1 AND sex = $2 AND user_id <> $3
            ORDER BY created_at
            LIMIT $4
            "#
        );

        let rows = sqlx::query(&query)
            .bind(value)
            .bind(sex.as_str())
            .bind(exclude_user_id)
            .bind(self.candidate_limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(profile_from_row).collect()
    }
}

fn parse_sex(row: &PgRow, column: &str) -> Result<Sex, StoreError> {
    let raw: String = row.try_get(column)?;
    raw.parse()
        .map_err(|_| StoreError::Corrupt(format!("{} = {:?}", column, raw)))
}

fn profile_from_row(row: &PgRow) -> Result<Profile, StoreError> {
    Ok(Profile {
        user_id: row.try_get("user_id")?,
        display_name: row.try_get("display_name")?,
        sex: parse_sex(row, "sex")?,
        preferred_sex: parse_sex(row, "preferred_sex")?,
        birthday: row.try_get("birthday")?,
        location: Location {
            point: GeoPoint::new(row.try_get("longitude")?, row.try_get("latitude")?),
            city: row.try_get("city")?,
            country: row.try_get("country")?,
        },
        profile_image_ref: row.try_get("profile_image_ref")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
    })
}

fn pairing_from_row(row: &PgRow) -> Result<Pairing, StoreError> {
    Ok(Pairing {
        id: row.try_get("id")?,
        user_a: row.try_get("user_a")?,
        user_b: row.try_get("user_b")?,
        active: row.try_get("active")?,
        created_at: row.try_get("created_at")?,
        ended_at: row.try_get("ended_at")?,
    })
}

#[async_trait]
impl ProfileStore for PostgresClient {
    async fn find_by_user_id(&self, user_id: &str) -> Result<Option<Profile>, StoreError> {
        let query = format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id = $1");

        let row = sqlx::query(&query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(profile_from_row).transpose()
    }

    async fn find_by_sex_active(&self, sex: Sex) -> Result<Vec<Profile>, StoreError> {
        let query = format!(
            r#"
            SELECT {PROFILE_COLUMNS}
            FROM profiles
            WHERE active AND sex = $1
            ORDER BY created_at
            LIMIT $2
            "#
        );

        let rows = sqlx::query(&query)
            .bind(sex.as_str())
            .bind(self.candidate_limit)
            .fetch_all(&self.pool)
            .await?;

        rows.iter().map(profile_from_row).collect()
    }

    /// Uses the (latitude, longitude) index for a bounding-box scan, then
    /// orders the survivors by exact distance.
    async fn find_near_location(
        &self,
        point: GeoPoint,
        radius_m: f64,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError> {
        let bbox = calculate_bounding_box(point, radius_m);

        let query = format!(
            r#"
            SELECT * FROM (
                SELECT {PROFILE_COLUMNS}, {DISTANCE_EXPR} AS distance_m
                FROM profiles
                WHERE active AND sex = $3 AND user_id <> $4
                  AND latitude BETWEEN $5 AND $6
                  AND longitude BETWEEN $7 AND $8
            ) nearby
            WHERE distance_m <= $9
            ORDER BY distance_m ASC
            LIMIT $10
            "#
        );

        let rows = sqlx::query(&query)
            .bind(point.longitude)
            .bind(point.latitude)
            .bind(sex.as_str())
            .bind(exclude_user_id)
            .bind(bbox.min_lat)
            .bind(bbox.max_lat)
            .bind(bbox.min_lon)
            .bind(bbox.max_lon)
            .bind(radius_m)
            .bind(self.candidate_limit)
            .fetch_all(&self.pool)
            .await?;

        tracing::debug!("Found {} profiles within {}m", rows.len(), radius_m);

        rows.iter().map(profile_from_row).collect()
    }

    async fn find_by_city(
        &self,
        city: &str,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError> {
        self.fetch_profiles("city", city, sex, exclude_user_id).await
    }

    async fn find_by_country(
        &self,
        country: &str,
        sex: Sex,
        exclude_user_id: &str,
    ) -> Result<Vec<Profile>, StoreError> {
        self.fetch_profiles("country", country, sex, exclude_user_id).await
    }

    async fn insert(&self, profile: &Profile) -> Result<(), StoreError> {
        let query = r#"
            INSERT INTO profiles (
                user_id, display_name, sex, preferred_sex, birthday,
                longitude, latitude, city, country, profile_image_ref, active, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, COALESCE($12, NOW()))
            ON CONFLICT (user_id) DO NOTHING
        "#;

        let result = sqlx::query(query)
            .bind(&profile.user_id)
            .bind(&profile.display_name)
            .bind(profile.sex.as_str())
            .bind(profile.preferred_sex.as_str())
            .bind(&profile.birthday)
            .bind(profile.location.point.longitude)
            .bind(profile.location.point.latitude)
            .bind(&profile.location.city)
            .bind(&profile.location.country)
            .bind(&profile.profile_image_ref)
            .bind(profile.active)
            .bind(profile.created_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::DuplicateProfile(profile.user_id.clone()));
        }

        tracing::debug!("Inserted profile {}", profile.user_id);
        Ok(())
    }

    async fn update_active_flag(&self, user_id: &str, active: bool) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE profiles SET active = $2 WHERE user_id = $1")
            .bind(user_id)
            .bind(active)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn health_check(&self) -> Result<bool, StoreError> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map(|_| true)
            .map_err(Into::into)
    }
}

#[async_trait]
impl ConversationStore for PostgresClient {
    async fn find_active_by_participant(&self, user_id: &str) -> Result<Option<Pairing>, StoreError> {
        let query = r#"
            SELECT id, user_a, user_b, active, created_at, ended_at
            FROM pairings
            WHERE active AND (user_a = $1 OR user_b = $1)
            LIMIT 1
        "#;

        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(pairing_from_row).transpose()
    }

    /// Takes transaction-scoped advisory locks on both participants (in a
    /// fixed order, so two inserts sharing a user cannot deadlock), then
    /// checks for an existing active pairing before inserting.
    async fn insert(&self, pairing: &Pairing) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let mut participants = vec![pairing.user_a.clone(), pairing.user_b.clone()];
        participants.sort_unstable();

        for user_id in &participants {
            sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let busy: Option<String> = sqlx::query_scalar(
            r#"
            SELECT CASE WHEN user_a = ANY($1) THEN user_a ELSE user_b END
            FROM pairings
            WHERE active AND (user_a = ANY($1) OR user_b = ANY($1))
            LIMIT 1
            "#,
        )
        .bind(&participants)
        .fetch_optional(&mut *tx)
        .await?;

        if let Some(user_id) = busy {
            tx.rollback().await?;
            return Err(StoreError::ParticipantBusy(user_id));
        }

        sqlx::query(
            r#"
            INSERT INTO pairings (id, user_a, user_b, active, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(pairing.id)
        .bind(&pairing.user_a)
        .bind(&pairing.user_b)
        .bind(pairing.active)
        .bind(pairing.created_at)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::debug!("Inserted pairing {} ({} <-> {})", pairing.id, pairing.user_a, pairing.user_b);
        Ok(())
    }

    async fn deactivate_active_for(&self, user_id: &str) -> Result<Option<Pairing>, StoreError> {
        // A concurrent UPDATE on the same row waits for this one, re-reads
        // `active` as false and matches nothing.
        let query = r#"
            UPDATE pairings
            SET active = FALSE, ended_at = NOW()
            WHERE active AND (user_a = $1 OR user_b = $1)
            RETURNING id, user_a, user_b, TRUE AS active, created_at, NULL::timestamptz AS ended_at
        "#;

        let row = sqlx::query(query)
            .bind(user_id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(pairing_from_row).transpose()
    }
}

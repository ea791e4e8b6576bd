use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sex of a registered user, also used as the match preference
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sex {
    Male,
    Female,
}

impl Sex {
    pub fn as_str(&self) -> &'static str {
        match self {
            Sex::Male => "male",
            Sex::Female => "female",
        }
    }
}

impl fmt::Display for Sex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when text is not one of the accepted sex values
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidSex(pub String);

impl fmt::Display for InvalidSex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "expected \"male\" or \"female\", got {:?}", self.0)
    }
}

impl std::error::Error for InvalidSex {}

impl FromStr for Sex {
    type Err = InvalidSex;

    /// Case-insensitive: "Male", "MALE" and "male" all parse
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "male" => Ok(Sex::Male),
            "female" => Ok(Sex::Female),
            _ => Err(InvalidSex(s.to_string())),
        }
    }
}

/// Geographic coordinate pair, stored longitude first
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub longitude: f64,
    pub latitude: f64,
}

impl GeoPoint {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }
}

/// Where a registered user is, as shared during registration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub point: GeoPoint,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
}

/// A committed user profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(rename = "userId")]
    pub user_id: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub sex: Sex,
    #[serde(rename = "preferredSex")]
    pub preferred_sex: Sex,
    pub birthday: String,
    pub location: Location,
    #[serde(rename = "profileImageRef")]
    pub profile_image_ref: String,
    /// true while the user is seeking a match
    pub active: bool,
    #[serde(default)]
    pub created_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Profile {
    pub fn summary(&self) -> ProfileSummary {
        ProfileSummary {
            display_name: self.display_name.clone(),
            sex: self.sex,
            birthday: self.birthday.clone(),
        }
    }
}

/// Read-only projection shown when one user views another's profile
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSummary {
    #[serde(rename = "displayName")]
    pub display_name: String,
    pub sex: Sex,
    pub birthday: String,
}

/// One conversation session between two users
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pairing {
    pub id: uuid::Uuid,
    pub user_a: String,
    pub user_b: String,
    pub active: bool,
    pub created_at: chrono::DateTime<chrono::Utc>,
    #[serde(default)]
    pub ended_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Pairing {
    pub fn new(user_a: impl Into<String>, user_b: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            user_a: user_a.into(),
            user_b: user_b.into(),
            active: true,
            created_at: chrono::Utc::now(),
            ended_at: None,
        }
    }

    pub fn involves(&self, user_id: &str) -> bool {
        self.user_a == user_id || self.user_b == user_id
    }

    /// The participant that is not `user_id`, if `user_id` takes part at all
    pub fn partner_of(&self, user_id: &str) -> Option<&str> {
        if self.user_a == user_id {
            Some(&self.user_b)
        } else if self.user_b == user_id {
            Some(&self.user_a)
        } else {
            None
        }
    }
}

/// Geographic filter applied by the match selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchScope {
    Proximity,
    City,
    Country,
    Any,
}

impl SearchScope {
    pub const ALL: [SearchScope; 4] = [
        SearchScope::Proximity,
        SearchScope::City,
        SearchScope::Country,
        SearchScope::Any,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            SearchScope::Proximity => "Nearby",
            SearchScope::City => "Same City",
            SearchScope::Country => "Same Country",
            SearchScope::Any => "Anywhere",
        }
    }

    pub fn from_label(text: &str) -> Option<Self> {
        let text = text.trim();
        Self::ALL
            .into_iter()
            .find(|scope| scope.label().eq_ignore_ascii_case(text))
    }
}

/// Geospatial bounding box
#[derive(Debug, Clone, Copy)]
pub struct BoundingBox {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lon: f64,
    pub max_lon: f64,
}

use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError};

/// Slash commands understood by the relay
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Command {
    Start,
    Help,
    Cancel,
}

impl Command {
    /// Parse "/start", "/help" or "/cancel", ignoring a trailing "@botname"
    pub fn parse(text: &str) -> Option<Self> {
        let name = text.trim().strip_prefix('/')?;
        let name = name.split(['@', ' ']).next().unwrap_or_default();
        match name.to_lowercase().as_str() {
            "start" => Some(Command::Start),
            "help" => Some(Command::Help),
            "cancel" => Some(Command::Cancel),
            _ => None,
        }
    }
}

/// Inbound event from the messaging transport
///
/// Request body:
/// ```json
/// {
///   "userId": "string",
///   "displayName": "string",
///   "type": "text|photo|location|command|profile_view",
///   ...payload fields
/// }
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
pub struct InboundEvent {
    #[validate(length(min = 1))]
    #[serde(alias = "user_id", rename = "userId")]
    pub user_id: String,
    #[serde(alias = "display_name", rename = "displayName", default)]
    pub display_name: Option<String>,
    #[serde(flatten)]
    #[validate(custom(function = "validate_payload"))]
    pub payload: EventPayload,
}

impl InboundEvent {
    pub fn new(user_id: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: None,
            payload,
        }
    }

    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    pub fn text(user_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self::new(user_id, EventPayload::Text { text: text.into() })
    }

    pub fn photo(user_id: impl Into<String>, image_ref: impl Into<String>) -> Self {
        Self::new(user_id, EventPayload::Photo { image_ref: image_ref.into() })
    }

    pub fn location(user_id: impl Into<String>, longitude: f64, latitude: f64) -> Self {
        Self::new(
            user_id,
            EventPayload::Location {
                longitude,
                latitude,
                city: None,
                country: None,
            },
        )
    }

    pub fn command(user_id: impl Into<String>, name: Command) -> Self {
        Self::new(user_id, EventPayload::Command { name })
    }

    pub fn profile_view(user_id: impl Into<String>, target_user_id: impl Into<String>) -> Self {
        Self::new(
            user_id,
            EventPayload::ProfileView {
                target_user_id: target_user_id.into(),
            },
        )
    }
}

/// Shape of an inbound event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    Text {
        text: String,
    },
    Photo {
        #[serde(alias = "image_ref", rename = "imageRef")]
        image_ref: String,
    },
    Location {
        longitude: f64,
        latitude: f64,
        #[serde(default)]
        city: Option<String>,
        #[serde(default)]
        country: Option<String>,
    },
    Command {
        name: Command,
    },
    ProfileView {
        #[serde(alias = "target_user_id", rename = "targetUserId")]
        target_user_id: String,
    },
}

impl EventPayload {
    /// Short name for logs; never includes message content
    pub fn kind(&self) -> &'static str {
        match self {
            EventPayload::Text { .. } => "text",
            EventPayload::Photo { .. } => "photo",
            EventPayload::Location { .. } => "location",
            EventPayload::Command { .. } => "command",
            EventPayload::ProfileView { .. } => "profile_view",
        }
    }
}

fn validate_payload(payload: &EventPayload) -> Result<(), ValidationError> {
    match payload {
        EventPayload::Location { longitude, latitude, .. } => {
            if !(-180.0..=180.0).contains(longitude) || !(-90.0..=90.0).contains(latitude) {
                return Err(ValidationError::new("coordinates_out_of_range"));
            }
            Ok(())
        }
        EventPayload::Photo { image_ref } if image_ref.is_empty() => {
            Err(ValidationError::new("empty_image_ref"))
        }
        EventPayload::ProfileView { target_user_id } if target_user_id.is_empty() => {
            Err(ValidationError::new("empty_target_user_id"))
        }
        _ => Ok(()),
    }
}

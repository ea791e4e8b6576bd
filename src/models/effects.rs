use serde::{Deserialize, Serialize};

/// Options shown on the idle menu, in display order
pub const MENU_OPTIONS: [&str; 3] = ["Register", "Search for Match", "Disconnect"];

/// Outbound effect for the messaging transport to deliver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Outbound {
    SendText {
        user_id: String,
        text: String,
    },
    PresentMenu {
        user_id: String,
        options: Vec<String>,
    },
    PresentChoices {
        user_id: String,
        prompt: String,
        options: Vec<String>,
    },
    RequestLocation {
        user_id: String,
        prompt: String,
    },
    /// Interactive element that, when used, comes back as a profile view request
    OfferProfileView {
        user_id: String,
        target_user_id: String,
        label: String,
    },
}

impl Outbound {
    pub fn text(user_id: &str, text: impl Into<String>) -> Self {
        Outbound::SendText {
            user_id: user_id.to_string(),
            text: text.into(),
        }
    }

    pub fn menu(user_id: &str) -> Self {
        Outbound::PresentMenu {
            user_id: user_id.to_string(),
            options: MENU_OPTIONS.iter().map(|o| o.to_string()).collect(),
        }
    }

    pub fn choices<I, S>(user_id: &str, prompt: impl Into<String>, options: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Outbound::PresentChoices {
            user_id: user_id.to_string(),
            prompt: prompt.into(),
            options: options.into_iter().map(Into::into).collect(),
        }
    }

    pub fn request_location(user_id: &str, prompt: impl Into<String>) -> Self {
        Outbound::RequestLocation {
            user_id: user_id.to_string(),
            prompt: prompt.into(),
        }
    }

    /// Recipient of this effect
    pub fn recipient(&self) -> &str {
        match self {
            Outbound::SendText { user_id, .. }
            | Outbound::PresentMenu { user_id, .. }
            | Outbound::PresentChoices { user_id, .. }
            | Outbound::RequestLocation { user_id, .. }
            | Outbound::OfferProfileView { user_id, .. } => user_id,
        }
    }
}

use std::sync::Arc;

use crate::core::error::DialogueError;
use crate::core::prompts;
use crate::models::{Location, Outbound, Profile, Sex};
use crate::services::{ProfileStore, StoreError};

/// Step of the signup dialogue
///
/// `Committed` and `Cancelled` are not represented: both mean the draft is
/// gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationState {
    AwaitingPhoto,
    AwaitingSex,
    AwaitingPreferredSex,
    AwaitingBirthday,
    AwaitingLocation,
}

/// Input offered to the current registration step
#[derive(Debug, Clone, PartialEq)]
pub enum RegistrationInput {
    Photo {
        image_ref: String,
        display_name: Option<String>,
    },
    Text(String),
    Location(Location),
    /// Anything else the transport delivered (a profile view, a stray command)
    Other,
}

/// Partially built profile, owned by the user's session until committed
#[derive(Debug, Clone, PartialEq)]
pub struct RegistrationDraft {
    user_id: String,
    state: RegistrationState,
    display_name: Option<String>,
    profile_image_ref: Option<String>,
    sex: Option<Sex>,
    preferred_sex: Option<Sex>,
    birthday: Option<String>,
}

/// Result of feeding one input to a draft
#[derive(Debug, Clone, PartialEq)]
pub enum Transition {
    Advanced(RegistrationState),
    /// Every field is present; the profile still has to be written
    Complete(Profile),
}

impl RegistrationDraft {
    pub fn begin(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            state: RegistrationState::AwaitingPhoto,
            display_name: None,
            profile_image_ref: None,
            sex: None,
            preferred_sex: None,
            birthday: None,
        }
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn state(&self) -> RegistrationState {
        self.state
    }

    pub fn sex(&self) -> Option<Sex> {
        self.sex
    }

    pub fn preferred_sex(&self) -> Option<Sex> {
        self.preferred_sex
    }

    pub fn birthday(&self) -> Option<&str> {
        self.birthday.as_deref()
    }

    pub fn profile_image_ref(&self) -> Option<&str> {
        self.profile_image_ref.as_deref()
    }

    /// Apply `input` to the current step
    ///
    /// Invalid input leaves the draft untouched. The final step does not
    /// advance the draft either: it returns the finished profile and the
    /// caller discards the draft once the profile is stored.
    pub fn apply(&mut self, input: RegistrationInput) -> Result<Transition, DialogueError> {
        let next = match (self.state, input) {
            (RegistrationState::AwaitingPhoto, RegistrationInput::Photo { image_ref, display_name }) => {
                self.display_name = display_name.filter(|name| !name.trim().is_empty());
                self.profile_image_ref = Some(image_ref);
                RegistrationState::AwaitingSex
            }
            (RegistrationState::AwaitingPhoto, _) => {
                return Err(DialogueError::invalid(prompts::INVALID_PHOTO));
            }
            (RegistrationState::AwaitingSex, RegistrationInput::Text(text)) => {
                self.sex = Some(parse_sex(&text)?);
                RegistrationState::AwaitingPreferredSex
            }
            (RegistrationState::AwaitingPreferredSex, RegistrationInput::Text(text)) => {
                self.preferred_sex = Some(parse_sex(&text)?);
                RegistrationState::AwaitingBirthday
            }
            (RegistrationState::AwaitingSex | RegistrationState::AwaitingPreferredSex, _) => {
                return Err(DialogueError::invalid(prompts::INVALID_SEX));
            }
            (RegistrationState::AwaitingBirthday, RegistrationInput::Text(text))
                if !text.trim().is_empty() =>
            {
                self.birthday = Some(text);
                RegistrationState::AwaitingLocation
            }
            (RegistrationState::AwaitingBirthday, _) => {
                return Err(DialogueError::invalid(prompts::INVALID_BIRTHDAY));
            }
            (RegistrationState::AwaitingLocation, RegistrationInput::Location(location)) => {
                return self.complete(location).map(Transition::Complete);
            }
            (RegistrationState::AwaitingLocation, _) => {
                return Err(DialogueError::invalid(prompts::INVALID_LOCATION));
            }
        };

        self.state = next;
        Ok(Transition::Advanced(next))
    }

    fn complete(&self, location: Location) -> Result<Profile, DialogueError> {
        let missing = |field: &str| DialogueError::invalid(format!("draft is missing {}", field));

        Ok(Profile {
            user_id: self.user_id.clone(),
            display_name: self
                .display_name
                .clone()
                .unwrap_or_else(|| self.user_id.clone()),
            sex: self.sex.ok_or_else(|| missing("sex"))?,
            preferred_sex: self.preferred_sex.ok_or_else(|| missing("preferred sex"))?,
            birthday: self.birthday.clone().ok_or_else(|| missing("birthday"))?,
            location,
            profile_image_ref: self
                .profile_image_ref
                .clone()
                .ok_or_else(|| missing("profile image"))?,
            active: true,
            created_at: Some(chrono::Utc::now()),
        })
    }

    /// Prompt for the current step
    pub fn prompt(&self) -> Outbound {
        let user_id = self.user_id.as_str();
        match self.state {
            RegistrationState::AwaitingPhoto => Outbound::text(user_id, prompts::ASK_PHOTO),
            RegistrationState::AwaitingSex => {
                Outbound::choices(user_id, prompts::ASK_SEX, prompts::SEX_OPTIONS)
            }
            RegistrationState::AwaitingPreferredSex => {
                Outbound::choices(user_id, prompts::ASK_PREFERRED_SEX, prompts::SEX_OPTIONS)
            }
            RegistrationState::AwaitingBirthday => Outbound::text(user_id, prompts::ASK_BIRTHDAY),
            RegistrationState::AwaitingLocation => {
                Outbound::request_location(user_id, prompts::ASK_LOCATION)
            }
        }
    }
}

fn parse_sex(text: &str) -> Result<Sex, DialogueError> {
    text.parse::<Sex>()
        .map_err(|_| DialogueError::invalid(prompts::INVALID_SEX))
}

/// Outcome of one registration step after any store write
#[derive(Debug)]
pub enum StepOutcome {
    InProgress(Vec<Outbound>),
    Committed(Profile, Vec<Outbound>),
}

/// Drives drafts through the signup dialogue and commits finished profiles
#[derive(Clone)]
pub struct RegistrationMachine {
    profiles: Arc<dyn ProfileStore>,
}

impl RegistrationMachine {
    pub fn new(profiles: Arc<dyn ProfileStore>) -> Self {
        Self { profiles }
    }

    /// Start (or restart) registration; any earlier draft is replaced
    ///
    /// Users with a committed profile are turned away before the first step.
    pub async fn begin(&self, user_id: &str) -> Result<(RegistrationDraft, Vec<Outbound>), DialogueError> {
        if self.profiles.find_by_user_id(user_id).await?.is_some() {
            return Err(DialogueError::AlreadyRegistered(user_id.to_string()));
        }

        let draft = RegistrationDraft::begin(user_id);
        let prompt = draft.prompt();
        tracing::debug!("Registration started for {}", user_id);
        Ok((draft, vec![prompt]))
    }

    /// Feed one input to `draft`
    ///
    /// On `Err` the draft is exactly as it was before the call, including
    /// when the final write fails.
    pub async fn step(
        &self,
        draft: &mut RegistrationDraft,
        input: RegistrationInput,
    ) -> Result<StepOutcome, DialogueError> {
        match draft.apply(input)? {
            Transition::Advanced(state) => {
                tracing::debug!("Registration for {} advanced to {:?}", draft.user_id(), state);
                Ok(StepOutcome::InProgress(vec![draft.prompt()]))
            }
            Transition::Complete(profile) => {
                match self.profiles.insert(&profile).await {
                    Ok(()) => {}
                    Err(StoreError::DuplicateProfile(user_id)) => {
                        return Err(DialogueError::AlreadyRegistered(user_id));
                    }
                    Err(e) => return Err(e.into()),
                }

                tracing::info!("Registered profile for {}", profile.user_id);

                let effects = vec![
                    Outbound::text(&profile.user_id, prompts::REGISTERED),
                    Outbound::menu(&profile.user_id),
                ];
                Ok(StepOutcome::Committed(profile, effects))
            }
        }
    }
}

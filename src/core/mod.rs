// Core dialogue exports
pub mod distance;
pub mod error;
pub mod prompts;
pub mod registration;
pub mod relay;
pub mod router;
pub mod selector;
pub mod session;

pub use distance::{calculate_bounding_box, distance_meters, is_within_bounding_box, within_radius};
pub use error::DialogueError;
pub use registration::{RegistrationDraft, RegistrationInput, RegistrationMachine, RegistrationState, StepOutcome};
pub use relay::{ConversationRelay, OpenProfileView, PairingStarted, ProfileViewPolicy};
pub use router::{DialogueRouter, MenuCommand};
pub use selector::MatchSelector;
pub use session::{Phase, Session, SessionStore};

// Model exports
pub mod domain;
pub mod effects;
pub mod requests;
pub mod responses;

pub use domain::{BoundingBox, GeoPoint, InvalidSex, Location, Pairing, Profile, ProfileSummary, SearchScope, Sex};
pub use effects::{Outbound, MENU_OPTIONS};
pub use requests::{Command, EventPayload, InboundEvent};
pub use responses::{ErrorResponse, EventAccepted, HealthResponse};

//! Lume Relay - conversational matchmaking relay for the Lume chat bot
//!
//! Users register a profile through a short dialogue, search for a partner
//! by proximity, city, country or anywhere, and then chat through the bot
//! until either side disconnects.

pub mod config;
pub mod core;
pub mod models;
pub mod routes;
pub mod services;

// Re-export commonly used types
pub use crate::core::{DialogueError, DialogueRouter, SessionStore, distance::{distance_meters, calculate_bounding_box}};
pub use crate::models::{InboundEvent, EventPayload, Outbound, Profile, Pairing, SearchScope, Sex};

//! Google Calendar v3 facade.
//!
//! Event creation over a shared [`gworks_auth::Connection`].

pub mod events;

pub use events::{Calendar, Event, EventDraft, DEFAULT_TIME_ZONE};

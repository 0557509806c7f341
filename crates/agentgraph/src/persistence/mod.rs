//! Session persistence: the append-only event log and rolling-summary
//! store behind every graph run.
//!
//! This is deliberately small. The crate's other durable store —
//! vector memories — lives in [`crate::memory`] with its own
//! Postgres backend; this module only ever holds [`Session`]s,
//! [`Event`]s and [`Summary`] rows.

mod session;
mod traits;

pub use session::{
    session_hash, Event, InMemorySessionStore, Session, SessionResult, SessionStore, Summary,
};
pub use traits::{PersistenceError, PersistenceResult};

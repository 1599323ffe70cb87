//! Session store implementations for AgentGate.
//!
//! Sessions hold append-only conversational memory keyed by an opaque
//! session id. The SQLite store is the production backend; the in-memory
//! store backs tests and ephemeral runs.

pub mod in_memory;
pub mod sqlite;

pub use in_memory::InMemorySessionStore;
pub use sqlite::SqliteSessionStore;

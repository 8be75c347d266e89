//! Event types broadcast to the host application.
//!
//! All types derive `serde::Serialize` + `serde::Deserialize` so a host can
//! forward them verbatim to a UI or dashboard.

pub mod events;

//! Serializable events for hosts that forward pipeline state elsewhere
//! (JSON lines on stdout, a webview, a log sink).
//!
//! All types derive `serde::Serialize` + `serde::Deserialize`.

pub mod events;

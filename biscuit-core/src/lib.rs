//! UI-agnostic core of the Biscuit editor.
//!
//! Everything here is driven by a GUI host through plain method calls and
//! small view traits; nothing in this crate touches a widget toolkit.

pub mod config;
pub mod explorer;
pub mod extensions;
pub mod filesystem;
pub mod palette;
pub mod queue;
pub mod search;
pub mod shell;

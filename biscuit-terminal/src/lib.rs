//! Terminal tabs for Biscuit: shell sessions on native pseudo-terminals.
//!
//! A host creates a [`TerminalManager`], opens tabs, forwards keystrokes with
//! [`TerminalManager::write_to`] and feeds [`TerminalManager::poll_all`]
//! output to its terminal emulator widget from a UI timer.

pub mod manager;
pub mod pty;
pub mod session;

pub use manager::{TabInfo, TerminalManager};
pub use pty::{Launcher, OutputSink, ProcessHandle, PtyLauncher, SessionEvent, TermSize};
pub use session::{Session, SessionError, SessionState};

//! PTY-backed shell sessions
//!
//! Each session owns one interactive shell on a pseudo-terminal. Commands
//! are written wrapped with a completion sentinel that reports the exit
//! status and working directory:
//!
//! ```text
//! { <command>
//! }; printf '\n__SP_%s:%s:%s__\n' '<token>' "$?" "$PWD"
//! ```
//!
//! Output up to the sentinel is the command's result. A command that stops
//! at a prompt leaves the session in `awaiting_input` until input arrives.

mod capture;
mod manager;
mod pty;
mod shell;
mod signal;
mod snapshot;
mod types;


pub use manager::{KillReport, SessionManager};
pub use signal::KillSignal;
pub use snapshot::{FileSnapshotStore, NoopSnapshotStore, SnapshotStore};
pub use types::{
    CommandRecord, CommandResult, ExecuteRequest, PendingPrompt, SessionEvent, SessionSnapshot,
    SessionStatus, SessionSummary,
};

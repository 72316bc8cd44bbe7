//! Wrapper supervisor: one process per agent, owning a terminal session and
//! a handful of watcher tasks that keep the hub's view of that agent honest
//! (§4.6, §4.7). Split into `session` (the terminal backend), `activity`
//! (screen-change detection), and `supervisor` (the state machine and
//! watcher tasks) the way groblegark-coop separates its PTY backend,
//! terminal-emulator state, and session actor into sibling modules.

pub mod activity;
pub mod session;
pub mod supervisor;

pub use session::{Session, TmuxSession};
pub use supervisor::{Supervisor, SupervisorConfig};

pub mod bootstrap;
pub mod constants;
pub mod conversation;
pub mod framing;
pub mod joiner;
pub mod logging;
pub mod main_helper;
pub mod materialize;
pub mod payload;
pub mod reconstruct;
pub mod session;
pub mod str_utils;
pub mod types;

pub use types::*;

pub use main_helper::{AppState, Args};
pub use session::{SessionReport, SessionState, StreamController};

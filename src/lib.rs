//! Duesbot library root.

pub mod cli;
pub mod commands;
pub mod config;
pub mod digest;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod logging;
pub mod ops;
pub mod store;
pub mod telegram;

pub use cli::Commands;
pub use config::{load_settings, Settings};
pub use dispatch::{dispatch, dispatch_text, Invocation, Reply};
pub use error::{Error, Result};
pub use ops::Operations;
pub use store::Store;
pub use telegram::{run_bot_daemon, send_digest_now};

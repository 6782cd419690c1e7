//! Keeps a web ide's state in object storage across short-lived instances.
//!
//! `/initialize` restores the ide data directory and the workspace from the
//! object store and starts the ide server, `/pre-stop` archives both back.
//! Everything else is forwarded to the ide server once it is ready.

pub mod api;
pub mod cli;
pub mod config;
pub mod credential;
pub mod error;
pub mod server;
pub mod storage;

pub use config::{Config, load_config};
pub use error::IdeError;
pub use server::{IdeServer, LifecycleState, ShutdownReport};

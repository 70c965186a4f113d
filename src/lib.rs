// Library exports for the mailbox-import crate
// This allows tests and the binary to use the modules

pub mod archive;
pub mod config;
pub mod error;
pub mod gmail_client;
pub mod import;
pub mod labels;
pub mod remote;
pub mod retry;
pub mod users;

pub use config::RunConfig;
pub use error::{ImportError, RemoteError};
pub use import::{MailboxImporter, RunSummary, UserSummary};

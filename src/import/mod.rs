pub mod processor;
pub mod summary;

// Re-export commonly used items
pub use processor::{MailboxImporter, UserContext};
pub use summary::{RunSummary, UserSummary};

/// Mbox archive enumeration, message records and header normalization
pub mod normalize;
pub mod reader;

pub use normalize::{normalize_message, NormalizeOptions};
pub use reader::{list_archives, ArchiveDescriptor, MessageRecord, MessageRecords};

use std::fs::{self, File};
use std::io::{BufRead, BufReader, Cursor, Read};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use mail_parser::mailbox::mbox::MessageIterator;
use mail_parser::MessageParser;

use super::normalize::{normalize_message, NormalizeOptions};
use crate::error::ImportError;

pub const ARCHIVE_EXTENSION: &str = "mbox";

/// File holding the messages inside an Apple Mail `Name.mbox` export bundle
const BUNDLE_MBOX_FILE: &str = "mbox";

/// An mbox archive found in a user directory, mapped to one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveDescriptor {
    pub path: PathBuf,
    pub label_name: String,
}

impl ArchiveDescriptor {
    /// Open the archive and start a new pass over its messages.
    ///
    /// The file is read as records are pulled, never loaded as a whole.
    pub fn messages(&self) -> Result<MessageRecords, ImportError> {
        let file = File::open(&self.path).map_err(|e| ImportError::parse(&self.path, e.to_string()))?;
        debug!("Opened archive {:?}", self.path);
        MessageRecords::from_reader(&self.path, BufReader::new(file))
    }
}

/// List the archives directly inside `user_dir`, sorted by file name.
pub fn list_archives(user_dir: &Path) -> Result<Vec<ArchiveDescriptor>, ImportError> {
    let mut archives = Vec::new();

    for entry in fs::read_dir(user_dir).map_err(|e| ImportError::io(user_dir, e))? {
        let entry = entry.map_err(|e| ImportError::io(user_dir, e))?;
        let path = entry.path();

        let Some(file_name) = entry.file_name().to_str().map(str::to_string) else {
            warn!("Skipping archive with a non UTF-8 name: {:?}", path);
            continue;
        };
        if file_name.starts_with('.') {
            continue;
        }

        let is_archive = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(ARCHIVE_EXTENSION));
        if !is_archive {
            debug!("Ignoring {:?}: not an .{} file", path, ARCHIVE_EXTENSION);
            continue;
        }

        let archive_path = if path.is_dir() {
            let inner = path.join(BUNDLE_MBOX_FILE);
            if !inner.is_file() {
                debug!("Ignoring directory {:?}: no '{}' file inside", path, BUNDLE_MBOX_FILE);
                continue;
            }
            inner
        } else {
            path.clone()
        };

        let Some(label_name) = path.file_stem().and_then(|s| s.to_str()) else {
            continue;
        };

        archives.push((
            file_name,
            ArchiveDescriptor {
                path: archive_path,
                label_name: label_name.to_string(),
            },
        ));
    }

    archives.sort_by(|a, b| a.0.cmp(&b.0));
    Ok(archives.into_iter().map(|(_, archive)| archive).collect())
}

/// One message of an archive pass.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    /// 0-based position within the archive
    pub index: usize,
    raw: Vec<u8>,
}

impl MessageRecord {
    pub fn new(index: usize, raw: Vec<u8>) -> Self {
        MessageRecord { index, raw }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn normalized(self, options: NormalizeOptions) -> Self {
        MessageRecord {
            index: self.index,
            raw: normalize_message(self.raw, options),
        }
    }

    /// Short description for log lines: index, Message-ID and subject when present
    pub fn describe(&self) -> String {
        let mut description = format!("#{}", self.index);

        // the body is never looked at
        if let Some(message) = MessageParser::default().parse_headers(self.raw.as_slice()) {
            if let Some(message_id) = message.message_id() {
                description.push_str(&format!(" <{}>", message_id));
            }
            if let Some(subject) = message.subject() {
                description.push_str(&format!(" \"{}\"", subject));
            }
        }

        description
    }
}

/// Bytes of an archive still to be split into messages
type ArchiveStream = Box<dyn Read + Send>;

/// Lazy sequence of the messages of one archive, in file order.
pub struct MessageRecords {
    path: PathBuf,
    inner: MessageIterator<ArchiveStream>,
    next_index: usize,
    failed: bool,
}

impl MessageRecords {
    /// Start a pass over an mbox stream.
    ///
    /// Leading blank lines are dropped; the first other line must be a
    /// `From ` separator, otherwise the stream is not an mbox. An empty
    /// stream is a valid archive without messages.
    pub fn from_reader<R>(path: impl Into<PathBuf>, mut reader: R) -> Result<Self, ImportError>
    where
        R: BufRead + Send + 'static,
    {
        let path = path.into();
        let mut first_line = Vec::new();

        loop {
            first_line.clear();
            let read = reader
                .read_until(b'\n', &mut first_line)
                .map_err(|e| ImportError::parse(&path, e.to_string()))?;
            if read == 0 || !first_line.iter().all(u8::is_ascii_whitespace) {
                break;
            }
        }

        if !first_line.is_empty() && !first_line.starts_with(b"From ") {
            return Err(ImportError::parse(
                &path,
                "not an mbox file (missing 'From ' separator line)",
            ));
        }

        // put the separator line back in front of the rest of the stream
        let stream: ArchiveStream = Box::new(Cursor::new(first_line).chain(reader));

        Ok(MessageRecords {
            path,
            inner: MessageIterator::new(stream),
            next_index: 0,
            failed: false,
        })
    }
}

impl Iterator for MessageRecords {
    type Item = Result<MessageRecord, ImportError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }

        match self.inner.next()? {
            Ok(message) => {
                let record = MessageRecord::new(self.next_index, message.unwrap_contents());
                self.next_index += 1;
                Some(Ok(record))
            }
            Err(_) => {
                self.failed = true;
                Some(Err(ImportError::parse(
                    &self.path,
                    format!("unreadable message after #{}", self.next_index),
                )))
            }
        }
    }
}

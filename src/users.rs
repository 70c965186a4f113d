use std::fs;
use std::path::{Path, PathBuf};

use log::{debug, warn};

use crate::error::ImportError;

/// A user directory under the import root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    /// Directory name, usually the user's email address
    pub id: String,
    pub path: PathBuf,
}

/// List the immediate sub-directories of `root`, sorted by name.
pub fn list_users(root: &Path) -> Result<Vec<UserEntry>, ImportError> {
    let mut users = Vec::new();

    for entry in fs::read_dir(root).map_err(|e| ImportError::io(root, e))? {
        let entry = entry.map_err(|e| ImportError::io(root, e))?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let Some(id) = entry.file_name().to_str().map(str::to_string) else {
            warn!("Skipping user directory with a non UTF-8 name: {:?}", path);
            continue;
        };
        if id.starts_with('.') {
            debug!("Skipping hidden directory {:?}", path);
            continue;
        }

        users.push(UserEntry { id, path });
    }

    users.sort_by(|a, b| a.id.cmp(&b.id));
    Ok(users)
}

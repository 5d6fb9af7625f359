//! File records: references to externally stored input/output artifacts.
//!
//! This crate never touches file bytes; a record only names an artifact.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::id::FileRecordId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FileType {
    Input,
    Output,
}

impl FileType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileType::Input => "INPUT",
            FileType::Output => "OUTPUT",
        }
    }
}

impl core::str::FromStr for FileType {
    type Err = crate::DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INPUT" => Ok(FileType::Input),
            "OUTPUT" => Ok(FileType::Output),
            other => Err(crate::DomainError::validation(format!("unknown file type: {other}"))),
        }
    }
}

/// A file record not yet assigned an id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFileRecord {
    /// Name as supplied by the uploader or engine.
    pub filename: String,
    /// Name under which the artifact is stored.
    pub unique_filename: String,
    pub created_at: DateTime<Utc>,
    pub file_type: FileType,
    pub size: u64,
}

impl NewFileRecord {
    /// Record for an output artifact reported by the engine.
    ///
    /// The engine already chose a unique name, so both names are the same and
    /// the size is unknown (0).
    pub fn output(name: impl Into<String>, now: DateTime<Utc>) -> Self {
        let name = name.into();
        Self {
            filename: name.clone(),
            unique_filename: name,
            created_at: now,
            file_type: FileType::Output,
            size: 0,
        }
    }

    pub fn input(
        filename: impl Into<String>,
        unique_filename: impl Into<String>,
        size: u64,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            filename: filename.into(),
            unique_filename: unique_filename.into(),
            created_at: now,
            file_type: FileType::Input,
            size,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: FileRecordId,
    pub filename: String,
    pub unique_filename: String,
    pub created_at: DateTime<Utc>,
    pub file_type: FileType,
    pub size: u64,
}

impl FileRecord {
    pub fn from_new(id: FileRecordId, new: NewFileRecord) -> Self {
        Self {
            id,
            filename: new.filename,
            unique_filename: new.unique_filename,
            created_at: new.created_at,
            file_type: new.file_type,
            size: new.size,
        }
    }
}

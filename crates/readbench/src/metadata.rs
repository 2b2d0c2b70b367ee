// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::fmt;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::{ReadError, Result};

/// A file attribute reported by [`inspect`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
#[non_exhaustive]
pub enum Attribute {
    /// Not shown in ordinary directory listings.
    Hidden,
    /// Cannot be written to.
    ReadOnly,
    /// Used by the operating system. Windows only.
    System,
    /// Marked for backup. Windows only.
    Archive,
}

impl fmt::Display for Attribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Hidden => "hidden",
            Self::ReadOnly => "read-only",
            Self::System => "system",
            Self::Archive => "archive",
        })
    }
}

/// What [`inspect`] found out about a path.
///
/// With the `serde` feature the path is serialized as a string, lossily if it is not
/// valid UTF-8, and the creation time is skipped.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct FileFacts {
    #[cfg_attr(feature = "serde", serde(serialize_with = "crate::runner::serialize_path_lossy"))]
    path: PathBuf,
    exists: bool,
    attributes: Vec<Attribute>,
    size: u64,
    #[cfg_attr(feature = "serde", serde(skip))]
    created_at: Option<SystemTime>,
}

impl FileFacts {
    fn missing(path: &Path) -> Self {
        Self {
            path: path.to_path_buf(),
            exists: false,
            attributes: Vec::new(),
            size: 0,
            created_at: None,
        }
    }

    /// The inspected path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether anything exists at the path.
    #[must_use]
    pub const fn exists(&self) -> bool {
        self.exists
    }

    /// The attributes set on the file, in [`Attribute`] order.
    #[must_use]
    pub fn attributes(&self) -> &[Attribute] {
        &self.attributes
    }

    /// Whether `attribute` is set.
    #[must_use]
    pub fn has(&self, attribute: Attribute) -> bool {
        self.attributes.contains(&attribute)
    }

    /// Length in bytes, zero if the path does not exist.
    #[must_use]
    pub const fn size(&self) -> u64 {
        self.size
    }

    /// When the file was created, if the platform and filesystem record it.
    #[must_use]
    pub const fn created_at(&self) -> Option<SystemTime> {
        self.created_at
    }
}

/// Queries existence, attributes, size and creation time of `path` without opening it.
///
/// A path that does not exist is not an error: the returned facts report
/// `exists() == false`.
///
/// # Errors
///
/// Returns [`ReadError::SizeQuery`] if the metadata exists but cannot be read, for
/// example because permission to a parent directory is denied.
pub fn inspect(path: impl AsRef<Path>) -> Result<FileFacts> {
    let path = path.as_ref();
    let metadata = match std::fs::metadata(path) {
        Ok(metadata) => metadata,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "inspected path does not exist");
            return Ok(FileFacts::missing(path));
        }
        Err(source) => {
            return Err(ReadError::SizeQuery {
                path: path.to_path_buf(),
                source,
            });
        }
    };

    let mut attributes = attributes_of(path, &metadata);
    attributes.sort_unstable();

    Ok(FileFacts {
        path: path.to_path_buf(),
        exists: true,
        attributes,
        size: metadata.len(),
        created_at: metadata.created().ok(),
    })
}

#[cfg(windows)]
fn attributes_of(_path: &Path, metadata: &Metadata) -> Vec<Attribute> {
    use std::os::windows::fs::MetadataExt;

    use windows_sys::Win32::Storage::FileSystem::{
        FILE_ATTRIBUTE_ARCHIVE, FILE_ATTRIBUTE_HIDDEN, FILE_ATTRIBUTE_READONLY, FILE_ATTRIBUTE_SYSTEM,
    };

    let bits = metadata.file_attributes();
    [
        (FILE_ATTRIBUTE_HIDDEN, Attribute::Hidden),
        (FILE_ATTRIBUTE_READONLY, Attribute::ReadOnly),
        (FILE_ATTRIBUTE_SYSTEM, Attribute::System),
        (FILE_ATTRIBUTE_ARCHIVE, Attribute::Archive),
    ]
    .into_iter()
    .filter(|(bit, _)| bits & bit != 0)
    .map(|(_, attribute)| attribute)
    .collect()
}

#[cfg(not(windows))]
fn attributes_of(path: &Path, metadata: &Metadata) -> Vec<Attribute> {
    let mut attributes = Vec::new();
    if path
        .file_name()
        .is_some_and(|name| name.as_encoded_bytes().first() == Some(&b'.'))
    {
        attributes.push(Attribute::Hidden);
    }
    if metadata.permissions().readonly() {
        attributes.push(Attribute::ReadOnly);
    }
    attributes
}

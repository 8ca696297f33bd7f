//! Persisted global catalog state
//!
//! The catalog root is persisted as a sequence of files named
//! `global-<version>` in a state directory. Each file holds one framed
//! GATEWAY document:
//!
//! ```text
//! [payload length: u32 BE][payload: GATEWAY document JSON][crc32: u32 BE]
//! ```
//!
//! # Crash Safety
//!
//! Writes follow the write-fsync-rename pattern:
//! 1. Write to a temporary file (`.global-<version>.tmp`)
//! 2. fsync the temporary file
//! 3. Atomic rename to the final name
//! 4. fsync the parent directory
//! 5. Unlink the previous generation
//!
//! Either the complete new file exists or the previous one does; a partial
//! write is never visible under a `global-` name. Reads pick the highest
//! surviving generation and verify the length and checksum before parsing;
//! a mismatch surfaces [`MetadataError::CorruptMetadata`].

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

use clustermeta_core::error::{MetadataError, Result};
use clustermeta_model::doc::{from_gateway_document, to_document, ContextMode};
use clustermeta_model::metadata::Metadata;

const GLOBAL_PREFIX: &str = "global-";

/// Path of the state file for a catalog version
pub fn global_state_path(dir: &Path, version: u64) -> PathBuf {
    dir.join(format!("{}{}", GLOBAL_PREFIX, version))
}

/// Persist the catalog, replacing the previous generation atomically
///
/// Returns the path of the written file.
pub fn write_global_state(dir: &Path, metadata: &Metadata) -> Result<PathBuf> {
    std::fs::create_dir_all(dir)?;
    let version = metadata.version();
    let final_path = global_state_path(dir, version);
    let temp_path = dir.join(format!(".{}{}.tmp", GLOBAL_PREFIX, version));

    let document = to_document(metadata, ContextMode::Gateway);
    let payload = serde_json::to_vec(&document)
        .map_err(|e| MetadataError::CorruptMetadata(format!("failed to render document: {}", e)))?;

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    let crc = hasher.finalize();

    let previous = newest_generation(dir)?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&temp_path)?;
    file.write_all(&(payload.len() as u32).to_be_bytes())?;
    file.write_all(&payload)?;
    file.write_all(&crc.to_be_bytes())?;
    file.sync_all()?;
    drop(file);

    std::fs::rename(&temp_path, &final_path)?;
    let dir_handle = File::open(dir)?;
    dir_handle.sync_all()?;

    if let Some((previous_version, previous_path)) = previous {
        if previous_version != version {
            if let Err(error) = std::fs::remove_file(&previous_path) {
                tracing::warn!(
                    path = %previous_path.display(),
                    %error,
                    "failed to unlink previous global state file"
                );
            }
        }
    }
    tracing::debug!(version, path = %final_path.display(), "wrote global state");
    Ok(final_path)
}

/// Load the newest persisted catalog, if any
pub fn read_global_state(dir: &Path) -> Result<Option<Metadata>> {
    let Some((version, path)) = newest_generation(dir)? else {
        return Ok(None);
    };
    let metadata = read_state_file(&path)?;
    if metadata.version() != version {
        return Err(MetadataError::CorruptMetadata(format!(
            "state file [{}] carries version [{}]",
            path.display(),
            metadata.version()
        )));
    }
    Ok(Some(metadata))
}

/// Read and verify one framed state file
pub fn read_state_file(path: &Path) -> Result<Metadata> {
    let mut file = File::open(path)?;
    let mut length_bytes = [0u8; 4];
    file.read_exact(&mut length_bytes)?;
    let length = u32::from_be_bytes(length_bytes) as usize;

    let mut payload = vec![0u8; length];
    file.read_exact(&mut payload)?;
    let mut crc_bytes = [0u8; 4];
    file.read_exact(&mut crc_bytes)?;
    let stored_crc = u32::from_be_bytes(crc_bytes);

    let mut trailing = Vec::new();
    file.read_to_end(&mut trailing)?;
    if !trailing.is_empty() {
        return Err(MetadataError::CorruptMetadata(format!(
            "state file [{}] has {} trailing bytes",
            path.display(),
            trailing.len()
        )));
    }

    let mut hasher = crc32fast::Hasher::new();
    hasher.update(&payload);
    if hasher.finalize() != stored_crc {
        return Err(MetadataError::CorruptMetadata(format!(
            "state file [{}] failed checksum verification",
            path.display()
        )));
    }

    let document: serde_json::Value = serde_json::from_slice(&payload)
        .map_err(|e| MetadataError::CorruptMetadata(format!("invalid state document: {}", e)))?;
    from_gateway_document(&document)
}

fn newest_generation(dir: &Path) -> Result<Option<(u64, PathBuf)>> {
    if !dir.exists() {
        return Ok(None);
    }
    let mut newest: Option<(u64, PathBuf)> = None;
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(rest) = name.strip_prefix(GLOBAL_PREFIX) else {
            continue;
        };
        let Ok(version) = rest.parse::<u64>() else {
            continue;
        };
        if newest.as_ref().map(|(v, _)| version > *v).unwrap_or(true) {
            newest = Some((version, entry.path()));
        }
    }
    Ok(newest)
}

// ============================================================================
// Tests
// ============================================================================

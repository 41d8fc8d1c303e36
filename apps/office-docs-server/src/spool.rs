//! Spool Directory
//!
//! Local storage for uploaded documents. Files are addressed by the md5 of
//! the identifier's string form, never by the identifier itself, so a caller
//! cannot smuggle path components into the spool.
//!
//! Layout:
//! - `<dir>/_<md5>` - upload in progress, chunks are appended here
//! - `<dir>/<md5>`  - finished upload, only ever produced by renaming the
//!   in-progress file
//!
//! Both files hold base64 text exactly as it was uploaded.

use std::fmt;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use base64::Engine;
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize};
use tokio::io::AsyncWriteExt;

use crate::error::ServiceError;

// ============================================================================
// Constants
// ============================================================================

/// Prefix marking an in-progress spool file
pub const TEMP_PREFIX: &str = "_";

/// Random draws attempted before giving up on identifier allocation
pub const MAX_ALLOCATION_ATTEMPTS: usize = 64;

// ============================================================================
// Identifier
// ============================================================================

/// Caller-visible handle of a spooled document
///
/// Generated identifiers are integers; callers may also supply their own
/// strings. Only the string form matters for spool naming, so `42` and `"42"`
/// address the same file.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Number(i64),
    Text(String),
}

impl Identifier {
    /// Name of the finished spool file: md5 hex of the string form
    pub fn spool_name(&self) -> String {
        format!("{:x}", md5::compute(self.to_string().as_bytes()))
    }

    /// `0` and `""` count as "no identifier"
    pub fn is_blank(&self) -> bool {
        match self {
            Self::Number(n) => *n == 0,
            Self::Text(s) => s.is_empty(),
        }
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Deserialize an optional identifier, mapping `null`, `false`, `0` and `""`
/// to `None`
pub fn optional_identifier<'de, D>(deserializer: D) -> Result<Option<Identifier>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Flag(bool),
        Id(Identifier),
    }

    Ok(match Option::<Raw>::deserialize(deserializer)? {
        Some(Raw::Id(id)) if !id.is_blank() => Some(id),
        Some(Raw::Flag(true)) => {
            return Err(serde::de::Error::custom("identifier must be a number or a string"))
        }
        _ => None,
    })
}

// ============================================================================
// Payload Encoding
// ============================================================================

/// Decode a base64 payload, ignoring ASCII whitespace such as line breaks
pub fn decode_payload(data: &str) -> Result<Vec<u8>, ServiceError> {
    let compact: String = data.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    Ok(base64::engine::general_purpose::STANDARD.decode(compact)?)
}

/// Encode bytes for the wire
pub fn encode_payload(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

// ============================================================================
// Spool
// ============================================================================

/// Content-addressed spool directory
#[derive(Debug, Clone)]
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create the spool directory if it is missing
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        tokio::fs::create_dir_all(&self.dir).await
    }

    pub fn final_path(&self, id: &Identifier) -> PathBuf {
        self.dir.join(id.spool_name())
    }

    pub fn temp_path(&self, id: &Identifier) -> PathBuf {
        self.dir.join(format!("{}{}", TEMP_PREFIX, id.spool_name()))
    }

    /// Whether an upload for `id` is in progress
    pub async fn has_pending(&self, id: &Identifier) -> bool {
        is_file(&self.temp_path(id)).await
    }

    /// Read and decode a finished document
    ///
    /// A missing file is reported as [`ServiceError::NoIdentifier`].
    pub async fn read_document(&self, id: &Identifier) -> Result<Vec<u8>, ServiceError> {
        let path = self.final_path(id);
        let text = match tokio::fs::read_to_string(&path).await {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::debug!(identifier = %id, "Spool file not found");
                return Err(ServiceError::NoIdentifier);
            }
            Err(e) => return Err(e.into()),
        };
        decode_payload(&text)
    }

    /// Append a chunk to the in-progress file, creating it if needed
    pub async fn append_chunk(&self, id: &Identifier, data: &str) -> Result<(), ServiceError> {
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.temp_path(id))
            .await?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }

    /// Atomically move the in-progress file to its final name
    pub async fn finalize(&self, id: &Identifier) -> Result<(), ServiceError> {
        tokio::fs::rename(self.temp_path(id), self.final_path(id)).await?;
        Ok(())
    }

    /// Remove an in-progress file, if any
    pub async fn discard(&self, id: &Identifier) {
        match tokio::fs::remove_file(self.temp_path(id)).await {
            Ok(()) => tracing::debug!(identifier = %id, "Discarded in-progress upload"),
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(identifier = %id, error = %e, "Failed to discard in-progress upload"),
        }
    }

    /// Start a new upload with its first chunk under a fresh identifier
    pub async fn begin_upload(&self, data: &str) -> Result<Identifier, ServiceError> {
        let id = self.allocate().await?;
        self.write_first_chunk(id, data).await
    }

    /// [`Spool::begin_upload`] drawing identifiers from `candidates`
    pub async fn begin_upload_from<I>(&self, candidates: I, data: &str) -> Result<Identifier, ServiceError>
    where
        I: IntoIterator<Item = i64>,
    {
        let id = self.allocate_from(candidates).await?;
        self.write_first_chunk(id, data).await
    }

    /// A failed first write releases the reservation; the caller never
    /// learned the identifier, so nothing could ever resume it
    async fn write_first_chunk(&self, id: Identifier, data: &str) -> Result<Identifier, ServiceError> {
        match self.append_chunk(&id, data).await {
            Ok(()) => Ok(id),
            Err(e) => {
                self.discard(&id).await;
                Err(e)
            }
        }
    }

    /// Pick a fresh random identifier and reserve its in-progress file
    pub async fn allocate(&self) -> Result<Identifier, ServiceError> {
        // Drawn up front: the thread RNG must not live across an await.
        let candidates: Vec<i64> = {
            let mut rng = rand::rng();
            (0..MAX_ALLOCATION_ATTEMPTS)
                .map(|_| rng.random_range(1..=i64::MAX))
                .collect()
        };
        self.allocate_from(candidates).await
    }

    /// Reserve the first candidate whose temp and final names are both free
    ///
    /// The in-progress file is created with create-new semantics, so a
    /// candidate is never handed to two concurrent uploads.
    pub async fn allocate_from<I>(&self, candidates: I) -> Result<Identifier, ServiceError>
    where
        I: IntoIterator<Item = i64>,
    {
        let mut attempts = 0;
        for candidate in candidates {
            attempts += 1;
            let id = Identifier::Number(candidate);
            tracing::debug!(identifier = %id, "Assigning new identifier");

            if is_file(&self.final_path(&id)).await {
                continue;
            }

            match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.temp_path(&id))
                .await
            {
                Ok(_) => return Ok(id),
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e.into()),
            }
        }

        tracing::warn!(attempts, "Spool identifier allocation exhausted");
        Err(ServiceError::IdentifierSpaceExhausted(attempts))
    }
}

async fn is_file(path: &Path) -> bool {
    tokio::fs::metadata(path)
        .await
        .map(|m| m.is_file())
        .unwrap_or(false)
}

// ============================================================================
// Tests
// ============================================================================

//! Unpacking of zip archives returned by batch watermark jobs.

use std::collections::HashSet;
use std::io::{self, Cursor, Read};

use tracing::{error, info, warn};
use zip::ZipArchive;

use super::ProcessedAttachment;
use crate::error::RelayError;
use crate::inbound::is_document;

/// Local file header magic that starts every zip archive.
const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

/// Largest uncompressed entry accepted from a result archive.
pub const MAX_ENTRY_BYTES: u64 = 64 * 1024 * 1024;

/// Whether a downloaded result is a zip archive.
pub fn is_archive(content_type: Option<&str>, bytes: &[u8]) -> bool {
    let declared = content_type
        .map(|ct| ct.to_ascii_lowercase().contains("zip"))
        .unwrap_or(false);
    declared || bytes.starts_with(ZIP_MAGIC)
}

/// Expand an archive into one attachment per document entry.
///
/// Directory entries and non-document entries are skipped. Entries are named
/// after their file name inside the archive with any folder prefix removed;
/// names that collide after stripping get a numeric suffix.
pub fn unpack_archive(bytes: &[u8]) -> Result<Vec<ProcessedAttachment>, RelayError> {
    unpack_archive_with_limit(bytes, MAX_ENTRY_BYTES)
}

fn unpack_archive_with_limit(
    bytes: &[u8],
    max_entry_bytes: u64,
) -> Result<Vec<ProcessedAttachment>, RelayError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| RelayError::Internal(format!("watermark archive unreadable: {e}")))?;

    let mut documents = Vec::new();
    let mut used_names = HashSet::new();

    for index in 0..archive.len() {
        let mut entry = archive
            .by_index(index)
            .map_err(|e| RelayError::Internal(format!("watermark archive entry {index}: {e}")))?;

        if entry.is_dir() {
            continue;
        }

        let entry_name = entry.name().to_string();
        let file_name = entry_name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(&entry_name)
            .to_string();

        if !is_document(&file_name) {
            info!(entry = %entry_name, "archive_entry_skipped");
            continue;
        }

        // The declared size comes from the archive header and is not trusted.
        let content = match read_bounded(&mut entry, max_entry_bytes) {
            Ok(Some(content)) => content,
            Ok(None) => {
                error!(
                    entry = %entry_name,
                    declared_bytes = entry.size(),
                    limit_bytes = max_entry_bytes,
                    "archive_entry_too_large"
                );
                return Err(RelayError::WatermarkService {
                    status: None,
                    body: format!(
                        "archive entry {entry_name:?} exceeds {max_entry_bytes} bytes"
                    ),
                });
            }
            Err(e) => {
                warn!(entry = %entry_name, error = %e, "archive_entry_read_failed");
                continue;
            }
        };
        if content.is_empty() {
            warn!(entry = %entry_name, "archive_entry_empty");
            continue;
        }

        let file_name = unique_name(&mut used_names, &file_name);
        documents.push(ProcessedAttachment::document(file_name, content));
    }

    info!(
        entries = archive.len(),
        documents = documents.len(),
        "archive_unpacked"
    );

    if documents.is_empty() {
        return Err(RelayError::EmptyArchiveResult);
    }
    Ok(documents)
}

/// Read at most `limit` bytes; `None` when the reader holds more.
fn read_bounded<R: Read>(reader: R, limit: u64) -> io::Result<Option<Vec<u8>>> {
    let mut content = Vec::new();
    reader.take(limit.saturating_add(1)).read_to_end(&mut content)?;
    if content.len() as u64 > limit {
        return Ok(None);
    }
    Ok(Some(content))
}

/// `deal.pdf`, then `deal_2.pdf`, `deal_3.pdf`, ... for repeated names.
fn unique_name(used: &mut HashSet<String>, name: &str) -> String {
    if used.insert(name.to_ascii_lowercase()) {
        return name.to_string();
    }
    let (stem, ext) = match name.rfind('.') {
        Some(dot) if dot > 0 => (&name[..dot], &name[dot..]),
        _ => (name, ""),
    };
    let mut n = 2;
    loop {
        let candidate = format!("{stem}_{n}{ext}");
        if used.insert(candidate.to_ascii_lowercase()) {
            return candidate;
        }
        n += 1;
    }
}

//! Durable JSON file helpers.
//!
//! Snapshot files are never written in place. The new content goes to a
//! temporary file in the destination directory, is flushed to disk, and is
//! then renamed over the destination. Readers observe either the previous
//! file or the new one, never a partial write.

use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, warn};

use crate::error::ValutaResult;

const TEMP_PREFIX: &str = ".valuta_";
const TEMP_SUFFIX: &str = ".tmp";

/// Write `value` to a temporary file next to `path`, flushed but not yet visible.
///
/// Dropping the returned handle deletes the temporary file and leaves `path`
/// untouched.
pub fn stage_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ValutaResult<NamedTempFile> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let mut staged = tempfile::Builder::new()
        .prefix(TEMP_PREFIX)
        .suffix(TEMP_SUFFIX)
        .tempfile_in(dir)?;

    serde_json::to_writer_pretty(&mut staged, value)?;
    staged.write_all(b"\n")?;
    staged.as_file().sync_all()?;

    Ok(staged)
}

/// Atomically replace `path` with a staged file.
pub fn publish(staged: NamedTempFile, path: &Path) -> ValutaResult<()> {
    staged.persist(path).map_err(|e| e.error)?;
    debug!(path = %path.display(), "Published file");
    Ok(())
}

/// Stage and publish in one step.
pub fn atomic_write_json<T: Serialize + ?Sized>(path: &Path, value: &T) -> ValutaResult<()> {
    let staged = stage_json(path, value)?;
    publish(staged, path)
}

/// Read a JSON document. Returns `None` if the file does not exist.
pub fn read_json<T: DeserializeOwned>(path: &Path) -> ValutaResult<Option<T>> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    Ok(Some(serde_json::from_str(&contents)?))
}

/// Append records to a JSON-lines log in a single write.
pub fn append_json_lines<T: Serialize>(path: &Path, records: &[T]) -> ValutaResult<()> {
    if records.is_empty() {
        return Ok(());
    }
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let mut file = OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)?;

    let mut buf = Vec::new();
    // Terminate a torn trailing line so it cannot swallow the next record.
    if file.metadata()?.len() > 0 {
        let mut last = [0u8; 1];
        file.seek(SeekFrom::End(-1))?;
        file.read_exact(&mut last)?;
        if last[0] != b'\n' {
            buf.push(b'\n');
        }
    }
    for record in records {
        serde_json::to_writer(&mut buf, record)?;
        buf.push(b'\n');
    }

    file.write_all(&buf)?;
    file.sync_data()?;

    Ok(())
}

/// Read every record of a JSON-lines log in file order.
///
/// A line that does not decode (e.g. torn by a crash mid-append) is skipped.
pub fn read_json_lines<T: DeserializeOwned>(path: &Path) -> ValutaResult<Vec<T>> {
    let file = match fs::File::open(path) {
        Ok(file) => file,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    for (index, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str(&line) {
            Ok(record) => records.push(record),
            Err(e) => warn!(
                path = %path.display(),
                line = index + 1,
                error = %e,
                "Skipping unreadable log line"
            ),
        }
    }

    Ok(records)
}

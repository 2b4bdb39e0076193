//! Extraction of small text files from gzip-compressed tar archives.
//!
//! Archives are read forward once. Matched entries are buffered whole, which
//! is fine because package archives are small by construction.

use std::collections::{BTreeMap, HashMap};
use std::io::Read;

use asset_sync::SourceError;
use flate2::read::GzDecoder;

/// Extract the entries whose path equals one of `wanted` (compared
/// case-insensitively), keyed by the logical name paired with each path.
///
/// Paths that never appear in the archive are simply absent from the result.
pub fn extract_files<R: Read>(
    gzipped: R,
    wanted: &[(&str, String)],
) -> Result<HashMap<String, String>, SourceError> {
    let mut found = HashMap::new();

    for_each_file(gzipped, |entry_path, entry| {
        let Some((key, _)) = wanted
            .iter()
            .find(|(_, path)| path.eq_ignore_ascii_case(entry_path))
        else {
            return Ok(());
        };
        found.insert((*key).to_owned(), read_content(entry_path, entry)?);
        Ok(())
    })?;

    Ok(found)
}

/// Extract every file whose stored path starts with `prefix`, keyed by that path.
pub fn extract_directory<R: Read>(
    gzipped: R,
    prefix: &str,
) -> Result<BTreeMap<String, String>, SourceError> {
    let mut found = BTreeMap::new();

    for_each_file(gzipped, |entry_path, entry| {
        if entry_path.starts_with(prefix) {
            found.insert(entry_path.to_owned(), read_content(entry_path, entry)?);
        }
        Ok(())
    })?;

    Ok(found)
}

/// Walk the regular-file entries of a gzipped tarball. Directories and links
/// are skipped; unread entry data is skipped by the tar reader.
fn for_each_file<R, F>(gzipped: R, mut visit: F) -> Result<(), SourceError>
where
    R: Read,
    F: FnMut(&str, &mut dyn Read) -> Result<(), SourceError>,
{
    let mut archive = tar::Archive::new(GzDecoder::new(gzipped));

    let entries = archive
        .entries()
        .map_err(|e| SourceError::Extraction(format!("failed to read tar entries: {e}")))?;

    for entry_result in entries {
        let mut entry = entry_result
            .map_err(|e| SourceError::Extraction(format!("failed to read tar entry: {e}")))?;

        if entry.header().entry_type() != tar::EntryType::Regular {
            continue;
        }

        let entry_path = entry
            .path()
            .map_err(|e| SourceError::Extraction(format!("invalid path in tar: {e}")))?
            .to_string_lossy()
            .into_owned();

        visit(&entry_path, &mut entry)?;
    }

    Ok(())
}

fn read_content(entry_path: &str, entry: &mut dyn Read) -> Result<String, SourceError> {
    let mut buf = Vec::new();
    entry
        .read_to_end(&mut buf)
        .map_err(|e| SourceError::Extraction(format!("failed to read {entry_path}: {e}")))?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

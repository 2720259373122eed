//! Packing named byte buffers into ZIP archives, and back.
//!
//! Archives are produced and consumed entirely in memory. They use the standard ZIP format with
//! deflate compression, so they can be exchanged with any other ZIP tool.

use std::collections::{BTreeMap, HashSet};
use std::io::{Cursor, Read, Write};

use thiserror::Error;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

/// The contents of an archive, by entry name.
pub type Archive = BTreeMap<String, Vec<u8>>;

/// Errors encountered while writing or reading an archive.
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// The input is not a valid archive, or an entry could not be encoded.
    #[error("zip error: {0}")]
    Zip(#[from] zip::result::ZipError),

    /// An entry could not be written or read.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The same entry name was given more than once.
    #[error("duplicate archive entry `{0}`")]
    DuplicateEntry(String),
}

/// Packs every `(name, contents)` pair into a single ZIP archive.
///
/// Each pair becomes one entry with exactly that name and those contents.
pub fn pack<I, K, V>(files: I) -> Result<Vec<u8>, ArchiveError>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<[u8]>,
{
    let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
    let mut seen = HashSet::new();

    for (name, contents) in files {
        let name = name.as_ref();
        if !seen.insert(name.to_owned()) {
            return Err(ArchiveError::DuplicateEntry(name.to_owned()));
        }

        let contents = contents.as_ref();
        // Entries beyond 4 GiB need the ZIP64 extension.
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .large_file(contents.len() as u64 >= u32::MAX as u64);
        writer.start_file(name, options)?;
        writer.write_all(contents)?;
    }

    let cursor = writer.finish()?;
    tracing::trace!(entries = seen.len(), size = cursor.get_ref().len(), "Packed archive");
    Ok(cursor.into_inner())
}

/// Unpacks a ZIP archive into its entries.
///
/// If an archive names the same entry twice, the later entry wins.
pub fn unpack(data: &[u8]) -> Result<Archive, ArchiveError> {
    let mut archive = ZipArchive::new(Cursor::new(data))?;
    let mut files = Archive::new();

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_owned();

        let mut contents = Vec::new();
        entry.read_to_end(&mut contents)?;
        files.insert(name, contents);
    }

    tracing::trace!(entries = files.len(), "Unpacked archive");
    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Archive {
        Archive::from([
            ("file1".to_owned(), br#"[{"ID":1,"Name":"Edward the Elder"}]"#.to_vec()),
            ("file2".to_owned(), br#"[{"ID":2,"Name":"Athelstan"}]"#.to_vec()),
            ("nested/dir/blob.bin".to_owned(), (0..=255).collect()),
            ("empty".to_owned(), Vec::new()),
        ])
    }

    #[test]
    fn unpacks_what_was_packed() {
        let files = sample();
        let packed = pack(&files).unwrap();
        assert_eq!(unpack(&packed).unwrap(), files);
    }

    #[test]
    fn ignores_input_order() {
        let files = sample();
        let reversed: Vec<_> = files.iter().rev().collect();

        let packed = pack(reversed).unwrap();
        assert_eq!(unpack(&packed).unwrap(), files);
    }

    #[test]
    fn packs_empty_mapping() {
        let packed = pack(Archive::new()).unwrap();
        assert!(unpack(&packed).unwrap().is_empty());
    }

    #[test]
    fn writes_standard_zip() {
        let packed = pack([("hello.txt", "oh hai!")]).unwrap();
        assert_eq!(&packed[..4], b"PK\x03\x04");

        let archive = ZipArchive::new(Cursor::new(packed.as_slice())).unwrap();
        assert_eq!(archive.len(), 1);
    }

    #[test]
    fn reads_stored_entries() {
        let mut writer = ZipWriter::new(Cursor::new(Vec::new()));
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        writer.start_file("plain.txt", options).unwrap();
        writer.write_all(b"not compressed").unwrap();
        let packed = writer.finish().unwrap().into_inner();

        let files = unpack(&packed).unwrap();
        assert_eq!(files["plain.txt"], b"not compressed");
    }

    #[test]
    fn rejects_duplicate_names() {
        let result = pack([("same", "a"), ("same", "b")]);
        assert!(matches!(result, Err(ArchiveError::DuplicateEntry(name)) if name == "same"));
    }

    #[test]
    fn rejects_garbage() {
        let result = unpack(b"definitely not a zip file");
        assert!(matches!(result, Err(ArchiveError::Zip(_))));
    }

    #[test]
    fn rejects_truncated_archive() {
        let packed = pack(&sample()).unwrap();
        let result = unpack(&packed[..packed.len() / 2]);
        assert!(result.is_err());
    }
}

//! # Lazarus: Archive Reader
//!
//! Opens zip archives held in memory, both the CI checksum-manifest archives
//! and the payload embedded in an extension container.
//!
//! Listing is cheap: [`ArchiveReader::files`] walks the central directory only.
//! Content is inflated on demand by [`ArchiveReader::read`], and directory
//! entries are skipped without ever being read.

use std::io::{Cursor, Read};

/// Errors from archive operations.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("invalid archive: {0}")]
    Invalid(#[from] zip::result::ZipError),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("archive contains no files")]
    Empty,
    #[error("no entry named {0:?}")]
    NotFound(String),
}

/// A file entry of an archive. Content is read separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    index: usize,
    /// Path inside the archive, `/`-separated.
    pub path: String,
    pub is_dir: bool,
}

pub struct ArchiveReader<'a> {
    archive: zip::ZipArchive<Cursor<&'a [u8]>>,
}

impl<'a> ArchiveReader<'a> {
    /// Opens `bytes` as a zip archive.
    pub fn open(bytes: &'a [u8]) -> Result<Self, ArchiveError> {
        let archive = zip::ZipArchive::new(Cursor::new(bytes))?;
        Ok(Self { archive })
    }

    /// Number of entries, directories included.
    pub fn len(&self) -> usize {
        self.archive.len()
    }

    pub fn is_empty(&self) -> bool {
        self.archive.len() == 0
    }

    /// Every entry in archive order, directories included.
    pub fn entries(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        let mut out = Vec::with_capacity(self.archive.len());
        for index in 0..self.archive.len() {
            let file = self.archive.by_index_raw(index)?;
            out.push(ArchiveEntry {
                index,
                path: file.name().to_string(),
                is_dir: file.is_dir(),
            });
        }
        Ok(out)
    }

    /// File entries only, in archive order.
    pub fn files(&mut self) -> Result<Vec<ArchiveEntry>, ArchiveError> {
        Ok(self.entries()?.into_iter().filter(|e| !e.is_dir).collect())
    }

    /// Inflates the content of `entry`.
    pub fn read(&mut self, entry: &ArchiveEntry) -> Result<Vec<u8>, ArchiveError> {
        let mut file = self.archive.by_index(entry.index)?;
        let mut buf = Vec::with_capacity(file.size() as usize);
        file.read_to_end(&mut buf)?;
        Ok(buf)
    }

    /// Finds the file entry at `path`.
    pub fn find(&mut self, path: &str) -> Result<ArchiveEntry, ArchiveError> {
        self.files()?
            .into_iter()
            .find(|e| e.path == path)
            .ok_or_else(|| ArchiveError::NotFound(path.to_string()))
    }

    /// Content of the first file entry; the shape of a single-file CI artifact.
    pub fn first_file(&mut self) -> Result<(String, Vec<u8>), ArchiveError> {
        let entry = self.files()?.into_iter().next().ok_or(ArchiveError::Empty)?;
        let content = self.read(&entry)?;
        Ok((entry.path, content))
    }
}

/// Splits manifest text into lines, preserving order and blank lines.
pub fn split_lines(content: &[u8]) -> Vec<String> {
    String::from_utf8_lossy(content)
        .split('\n')
        .map(str::to_string)
        .collect()
}

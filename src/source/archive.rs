use std::io::{BufReader, Cursor};

use bytes::Bytes;
use zip::read::ZipFile;
use zip::result::ZipError;
use zip::ZipArchive;

use crate::error::{Error, Result};

/// A downloaded archive held in memory, with the name of the CSV entry to read.
pub struct TripArchive {
    url: String,
    entry: String,
    archive: ZipArchive<Cursor<Bytes>>,
}

impl std::fmt::Debug for TripArchive {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TripArchive")
            .field("url", &self.url)
            .field("entry", &self.entry)
            .field("entries", &self.archive.len())
            .finish()
    }
}

impl TripArchive {
    /// Open `body` as a zip archive and check that `entry` is present.
    ///
    /// `url` is only kept for diagnostics.
    pub fn from_bytes(url: impl Into<String>, entry: impl Into<String>, body: Bytes) -> Result<Self> {
        let url = url.into();
        let entry = entry.into();

        let archive = match ZipArchive::new(Cursor::new(body)) {
            Ok(archive) => archive,
            Err(source) => return Err(Error::Archive { url, source }),
        };

        if !archive.file_names().any(|name| name == entry) {
            return Err(Error::MissingEntry { url, entry });
        }

        Ok(Self { url, entry, archive })
    }

    pub fn entry_name(&self) -> &str {
        &self.entry
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Reader positioned at the first byte of the decompressed CSV entry.
    pub fn csv(&mut self) -> Result<BufReader<ZipFile<'_>>> {
        match self.archive.by_name(&self.entry) {
            Ok(file) => Ok(BufReader::new(file)),
            Err(ZipError::FileNotFound) => Err(Error::MissingEntry {
                url: self.url.clone(),
                entry: self.entry.clone(),
            }),
            Err(source) => Err(Error::Archive {
                url: self.url.clone(),
                source,
            }),
        }
    }
}

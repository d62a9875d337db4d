// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Archive assembly.
//!
//! An archive is described as an ordered list of [`EntryConfig`]s and then
//! materialized in one pass by [`ArchiveBuilder::create`]:
//!
//! ```text
//! EntryConfig::SyntheticPrefix("wlp/")          -> directory entry only
//! EntryConfig::File { "META-INF/MANIFEST.MF" }  -> one file
//! EntryConfig::Directory { "wlp/", /opt/wlp }   -> walk + PatternFilter
//! ```
//!
//! The container format is picked from the output file extension.

pub mod builder;
pub mod manifest;
mod sink;

pub use builder::{ArchiveBuilder, ArchiveSummary};
pub use manifest::JarManifest;

use crate::pattern::PatternFilter;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Location of the manifest inside jar archives.
pub const MANIFEST_PATH: &str = "META-INF/MANIFEST.MF";

/// Archive errors.
#[derive(Debug, Error)]
pub enum ArchiveError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("required archive source is missing: {0}")]
    MissingRequired(PathBuf),

    #[error("unsupported archive format for {0}")]
    UnsupportedFormat(PathBuf),
}

impl ArchiveError {
    pub(crate) fn io(path: &Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// Supported container formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArchiveFormat {
    Zip,
    /// Zip with the manifest as first entry.
    Jar,
    Tar,
    TarGz,
    /// POSIX tar with pax extended headers.
    Pax,
}

impl ArchiveFormat {
    /// Detect format from the file name.
    pub fn from_path(path: &Path) -> Option<Self> {
        let name = path.file_name()?.to_str()?.to_ascii_lowercase();
        if name.ends_with(".tar.gz") || name.ends_with(".tgz") {
            return Some(Self::TarGz);
        }
        let (_, ext) = name.rsplit_once('.')?;
        Self::from_name(ext)
    }

    /// Parse a format name (`zip`, `jar`, `tar`, `tar.gz`, `tgz`, `pax`).
    pub fn from_name(name: &str) -> Option<Self> {
        match name.trim().trim_start_matches('.').to_ascii_lowercase().as_str() {
            "zip" => Some(Self::Zip),
            "jar" => Some(Self::Jar),
            "tar" => Some(Self::Tar),
            "tar.gz" | "tgz" => Some(Self::TarGz),
            "pax" => Some(Self::Pax),
            _ => None,
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Self::Zip => "zip",
            Self::Jar => "jar",
            Self::Tar => "tar",
            Self::TarGz => "tar.gz",
            Self::Pax => "pax",
        }
    }

    /// `pax` on z/OS, `zip` everywhere else.
    pub fn platform_default() -> Self {
        Self::default_for_os(std::env::consts::OS)
    }

    pub fn default_for_os(os: &str) -> Self {
        if os.eq_ignore_ascii_case("zos") || os.eq_ignore_ascii_case("z/os") {
            Self::Pax
        } else {
            Self::Zip
        }
    }

    pub fn is_jar(&self) -> bool {
        *self == Self::Jar
    }
}

/// One source of archive content.
#[derive(Debug, Clone)]
pub enum EntryConfig {
    File(FileEntry),
    Directory(DirectoryEntry),
    /// Directory entry with no file-system source.
    SyntheticPrefix(String),
}

impl EntryConfig {
    pub fn file(archive_path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self::File(FileEntry::new(archive_path, source))
    }

    pub fn directory(entry: DirectoryEntry) -> Self {
        Self::Directory(entry)
    }

    pub fn prefix(archive_path: impl Into<String>) -> Self {
        Self::SyntheticPrefix(normalize_archive_path(&archive_path.into()))
    }

    pub fn archive_path(&self) -> &str {
        match self {
            Self::File(f) => &f.archive_path,
            Self::Directory(d) => &d.archive_path,
            Self::SyntheticPrefix(p) => p,
        }
    }

    /// Whether this is the jar manifest file.
    pub fn is_manifest(&self) -> bool {
        matches!(self, Self::File(f) if f.archive_path.eq_ignore_ascii_case(MANIFEST_PATH))
    }
}

/// A single file.
#[derive(Debug, Clone)]
pub struct FileEntry {
    pub archive_path: String,
    pub source: PathBuf,
    /// Fail the archive when the source is missing.
    pub required: bool,
}

impl FileEntry {
    pub fn new(archive_path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: normalize_archive_path(&archive_path.into()),
            source: source.into(),
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

/// A directory tree filtered by a [`PatternFilter`].
#[derive(Debug, Clone)]
pub struct DirectoryEntry {
    /// Prefix inside the archive; empty for the archive root.
    pub archive_path: String,
    pub source: PathBuf,
    pub recursive: bool,
    pub filter: PatternFilter,
    pub required: bool,
}

impl DirectoryEntry {
    /// Recursive entry including everything.
    pub fn new(archive_path: impl Into<String>, source: impl Into<PathBuf>) -> Self {
        Self {
            archive_path: normalize_archive_path(&archive_path.into()),
            source: source.into(),
            recursive: true,
            filter: PatternFilter::include_all(),
            required: false,
        }
    }

    pub fn with_filter(mut self, filter: PatternFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn non_recursive(mut self) -> Self {
        self.recursive = false;
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl From<DirectoryEntry> for EntryConfig {
    fn from(entry: DirectoryEntry) -> Self {
        Self::Directory(entry)
    }
}

impl From<FileEntry> for EntryConfig {
    fn from(entry: FileEntry) -> Self {
        Self::File(entry)
    }
}

/// Forward slashes, no leading `/`.
pub fn normalize_archive_path(path: &str) -> String {
    path.replace('\\', "/").trim_start_matches('/').to_string()
}

/// Join an archive prefix and a relative name.
pub fn join_archive_path(prefix: &str, name: &str) -> String {
    let prefix = prefix.trim_end_matches('/');
    let name = name.trim_start_matches('/');
    match (prefix.is_empty(), name.is_empty()) {
        (true, _) => name.to_string(),
        (false, true) => format!("{}/", prefix),
        (false, false) => format!("{}/{}", prefix, name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ArchiveFormat::from_path(Path::new("/tmp/a.zip")),
            Some(ArchiveFormat::Zip)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("a.JAR")),
            Some(ArchiveFormat::Jar)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("a.tar.gz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("a.tgz")),
            Some(ArchiveFormat::TarGz)
        );
        assert_eq!(
            ArchiveFormat::from_path(Path::new("a.pax")),
            Some(ArchiveFormat::Pax)
        );
        assert_eq!(ArchiveFormat::from_path(Path::new("a.rar")), None);
        assert_eq!(ArchiveFormat::from_path(Path::new("noext")), None);
    }

    #[test]
    fn test_platform_default() {
        assert_eq!(ArchiveFormat::default_for_os("zos"), ArchiveFormat::Pax);
        assert_eq!(ArchiveFormat::default_for_os("linux"), ArchiveFormat::Zip);
        assert_eq!(ArchiveFormat::default_for_os("windows"), ArchiveFormat::Zip);
    }

    #[test]
    fn test_join_archive_path() {
        assert_eq!(join_archive_path("", "a/b.txt"), "a/b.txt");
        assert_eq!(join_archive_path("wlp/", "lib"), "wlp/lib");
        assert_eq!(join_archive_path("wlp", "/lib"), "wlp/lib");
        assert_eq!(join_archive_path("wlp/", ""), "wlp/");
    }

    #[test]
    fn test_manifest_detection() {
        assert!(EntryConfig::file("META-INF/MANIFEST.MF", "/tmp/m").is_manifest());
        assert!(EntryConfig::file("/meta-inf/manifest.mf", "/tmp/m").is_manifest());
        assert!(!EntryConfig::file("wlp/META-INF/MANIFEST.MF", "/tmp/m").is_manifest());
        assert!(!EntryConfig::prefix("META-INF/MANIFEST.MF").is_manifest());
    }
}

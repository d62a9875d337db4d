// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Container writers behind one interface.
//!
//! Byte-level encoding is left to the `zip`, `tar` and `flate2` crates.
//! `finish` writes the zip central directory or the tar end-of-archive
//! blocks (and the gzip trailer), so it must run even after a failed write.

use super::ArchiveFormat;
use flate2::write::GzEncoder;
use flate2::Compression;
use std::fs::{File, Metadata};
use std::io::{self, BufWriter, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};
use tar::{EntryType, Header, HeaderMode};
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

pub(crate) trait ArchiveSink {
    /// Add a directory entry; `name` ends with `/`.
    fn add_directory(&mut self, name: &str, modified: Option<SystemTime>) -> io::Result<()>;

    /// Copy an opened regular file into the archive, returning the bytes written.
    fn add_file(&mut self, name: &str, source: File, meta: &Metadata) -> io::Result<u64>;

    /// Finalize the container and flush the file.
    fn finish(self: Box<Self>) -> io::Result<()>;
}

pub(crate) fn open(format: ArchiveFormat, file: File) -> Box<dyn ArchiveSink> {
    let out = BufWriter::new(file);
    match format {
        ArchiveFormat::Zip | ArchiveFormat::Jar => Box::new(ZipSink {
            writer: ZipWriter::new(out),
        }),
        ArchiveFormat::Tar => Box::new(TarSink::new(out, false)),
        ArchiveFormat::Pax => Box::new(TarSink::new(out, true)),
        ArchiveFormat::TarGz => Box::new(TarSink::new(
            GzEncoder::new(out, Compression::default()),
            false,
        )),
    }
}

struct ZipSink {
    writer: ZipWriter<BufWriter<File>>,
}

impl ZipSink {
    fn options(modified: Option<SystemTime>, mode: Option<u32>) -> SimpleFileOptions {
        let mut options =
            SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
        if let Some(time) = modified.and_then(zip_time) {
            options = options.last_modified_time(time);
        }
        if let Some(mode) = mode {
            options = options.unix_permissions(mode);
        }
        options
    }
}

impl ArchiveSink for ZipSink {
    fn add_directory(&mut self, name: &str, modified: Option<SystemTime>) -> io::Result<()> {
        let options = Self::options(modified, Some(0o755));
        self.writer
            .add_directory(name, options)
            .map_err(io::Error::other)
    }

    fn add_file(&mut self, name: &str, mut source: File, meta: &Metadata) -> io::Result<u64> {
        let options = Self::options(meta.modified().ok(), unix_mode(meta))
            .large_file(meta.len() >= u64::from(u32::MAX));
        self.writer
            .start_file(name, options)
            .map_err(io::Error::other)?;
        io::copy(&mut source, &mut self.writer)
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        let out = self.writer.finish().map_err(io::Error::other)?;
        let file = out.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

/// Writers that need a final step after the tar stream ends.
trait FinishStream: Write {
    fn finish_stream(self) -> io::Result<()>;
}

impl FinishStream for BufWriter<File> {
    fn finish_stream(self) -> io::Result<()> {
        let file = self.into_inner().map_err(|e| e.into_error())?;
        file.sync_all()
    }
}

impl FinishStream for GzEncoder<BufWriter<File>> {
    fn finish_stream(self) -> io::Result<()> {
        self.finish()?.finish_stream()
    }
}

struct TarSink<W: FinishStream> {
    builder: tar::Builder<W>,
    /// ustar headers plus pax extensions instead of GNU headers.
    pax: bool,
}

impl<W: FinishStream> TarSink<W> {
    fn new(out: W, pax: bool) -> Self {
        let mut builder = tar::Builder::new(out);
        builder.mode(HeaderMode::Complete);
        builder.follow_symlinks(true);
        Self { builder, pax }
    }

    fn header(&self) -> Header {
        if self.pax {
            Header::new_ustar()
        } else {
            Header::new_gnu()
        }
    }

    fn append<R: Read>(&mut self, mut header: Header, name: &str, data: R) -> io::Result<()> {
        if !self.pax {
            // GNU long-name records are handled by append_data.
            return self.builder.append_data(&mut header, name, data);
        }
        if header.set_path(name).is_err() {
            self.builder
                .append_pax_extensions([("path", name.as_bytes())])?;
            header.set_path(short_name(name))?;
        }
        header.set_cksum();
        self.builder.append(&header, data)
    }
}

impl<W: FinishStream> ArchiveSink for TarSink<W> {
    fn add_directory(&mut self, name: &str, modified: Option<SystemTime>) -> io::Result<()> {
        let mut header = self.header();
        header.set_entry_type(EntryType::Directory);
        header.set_mode(0o755);
        header.set_size(0);
        header.set_mtime(epoch_secs(modified.unwrap_or_else(SystemTime::now)));
        self.append(header, name, io::empty())
    }

    fn add_file(&mut self, name: &str, source: File, meta: &Metadata) -> io::Result<u64> {
        let mut header = self.header();
        header.set_metadata_in_mode(meta, HeaderMode::Complete);
        header.set_entry_type(EntryType::Regular);
        header.set_size(meta.len());
        self.append(header, name, source)?;
        Ok(meta.len())
    }

    fn finish(self: Box<Self>) -> io::Result<()> {
        let out = self.builder.into_inner()?;
        out.finish_stream()
    }
}

/// Fallback ustar name when the real one goes into a pax record.
fn short_name(name: &str) -> String {
    let trimmed = name.trim_end_matches('/');
    let base = trimmed.rsplit('/').next().unwrap_or(trimmed);
    let chars: Vec<char> = base.chars().collect();
    let mut short: String = chars[chars.len().saturating_sub(99)..].iter().collect();
    // multi-byte characters can still exceed the 100-byte field
    while short.len() > 99 {
        short.remove(0);
    }
    if name.ends_with('/') {
        short.push('/');
    }
    short
}

fn epoch_secs(time: SystemTime) -> u64 {
    time.duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

fn zip_time(time: SystemTime) -> Option<zip::DateTime> {
    use chrono::{Datelike, Timelike};

    let local: chrono::DateTime<chrono::Local> = time.into();
    let year = u16::try_from(local.year()).ok()?;
    zip::DateTime::from_date_and_time(
        year,
        local.month() as u8,
        local.day() as u8,
        local.hour() as u8,
        local.minute() as u8,
        local.second() as u8,
    )
    .ok()
}

#[cfg(unix)]
fn unix_mode(meta: &Metadata) -> Option<u32> {
    use std::os::unix::fs::PermissionsExt;
    Some(meta.permissions().mode() & 0o7777)
}

#[cfg(not(unix))]
fn unix_mode(_meta: &Metadata) -> Option<u32> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_short_name_keeps_tail() {
        let long = format!("root/{}/file.txt", "d".repeat(200));
        assert_eq!(short_name(&long), "file.txt");

        let huge = "x".repeat(150);
        assert_eq!(short_name(&huge).len(), 99);

        assert_eq!(short_name("a/b/dir/"), "dir/");
    }

    #[test]
    fn test_zip_time_before_1980_is_skipped() {
        assert!(zip_time(UNIX_EPOCH).is_none());
        assert!(zip_time(SystemTime::now()).is_some());
    }
}

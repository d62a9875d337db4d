// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Entry accumulation and the single walk-and-write pass.

use super::sink::{self, ArchiveSink};
use super::{join_archive_path, ArchiveError, ArchiveFormat, DirectoryEntry, EntryConfig};
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Counters reported after [`ArchiveBuilder::create`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ArchiveSummary {
    pub files: usize,
    pub directories: usize,
    pub bytes: u64,
    /// Entries dropped because an earlier entry used the same name.
    pub duplicates: usize,
}

/// Collects entry configs and writes them into one container file.
#[derive(Debug)]
pub struct ArchiveBuilder {
    output: PathBuf,
    format: ArchiveFormat,
    entries: Vec<EntryConfig>,
}

impl ArchiveBuilder {
    pub fn new(output: impl Into<PathBuf>, format: ArchiveFormat) -> Self {
        Self {
            output: output.into(),
            format,
            entries: Vec::new(),
        }
    }

    /// Builder whose format follows the output file extension.
    pub fn for_path(output: impl Into<PathBuf>) -> Result<Self, ArchiveError> {
        let output = output.into();
        let format = ArchiveFormat::from_path(&output)
            .ok_or_else(|| ArchiveError::UnsupportedFormat(output.clone()))?;
        Ok(Self::new(output, format))
    }

    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn format(&self) -> ArchiveFormat {
        self.format
    }

    pub fn entries(&self) -> &[EntryConfig] {
        &self.entries
    }

    pub fn add_entry_config(&mut self, entry: impl Into<EntryConfig>) {
        self.entries.push(entry.into());
    }

    pub fn add_entry_configs<I>(&mut self, entries: I)
    where
        I: IntoIterator<Item = EntryConfig>,
    {
        self.entries.extend(entries);
    }

    /// Write every entry into the output file.
    ///
    /// For jar archives the manifest entry goes first, everything else keeps
    /// registration order. The container is finalized on every path; a failed
    /// archive is left on disk.
    pub fn create(self) -> Result<ArchiveSummary, ArchiveError> {
        if let Some(parent) = self.output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| ArchiveError::io(parent, e))?;
        }
        let file = fs::File::create(&self.output).map_err(|e| ArchiveError::io(&self.output, e))?;
        let mut sink = sink::open(self.format, file);

        let mut writer = EntryWriter::default();
        let written = writer.write_all(sink.as_mut(), self.ordered());
        let finished = sink
            .finish()
            .map_err(|e| ArchiveError::io(&self.output, e));

        written?;
        finished?;

        info!(
            "Created {} ({} files, {} directories, {} bytes)",
            self.output.display(),
            writer.summary.files,
            writer.summary.directories,
            writer.summary.bytes
        );
        Ok(writer.summary)
    }

    fn ordered(&self) -> Vec<&EntryConfig> {
        if !self.format.is_jar() {
            return self.entries.iter().collect();
        }
        let (manifest, rest): (Vec<&EntryConfig>, Vec<&EntryConfig>) =
            self.entries.iter().partition(|e| e.is_manifest());
        manifest.into_iter().chain(rest).collect()
    }
}

#[derive(Default)]
struct EntryWriter {
    names: HashSet<String>,
    summary: ArchiveSummary,
}

impl EntryWriter {
    fn write_all(
        &mut self,
        sink: &mut dyn ArchiveSink,
        entries: Vec<&EntryConfig>,
    ) -> Result<(), ArchiveError> {
        for entry in entries {
            match entry {
                EntryConfig::SyntheticPrefix(prefix) => {
                    self.directory(sink, &join_archive_path(prefix, ""), None)?;
                }
                EntryConfig::File(file) => {
                    if !file.source.is_file() {
                        if file.required {
                            return Err(ArchiveError::MissingRequired(file.source.clone()));
                        }
                        warn!("Skipping missing file {}", file.source.display());
                        continue;
                    }
                    self.file(sink, &file.archive_path, &file.source, file.required)?;
                }
                EntryConfig::Directory(dir) => {
                    if !dir.source.is_dir() {
                        if dir.required {
                            return Err(ArchiveError::MissingRequired(dir.source.clone()));
                        }
                        warn!("Skipping missing directory {}", dir.source.display());
                        continue;
                    }
                    self.tree(sink, dir)?;
                }
            }
        }
        Ok(())
    }

    fn tree(&mut self, sink: &mut dyn ArchiveSink, entry: &DirectoryEntry) -> Result<(), ArchiveError> {
        let children = match sorted_children(&entry.source) {
            Ok(children) => children,
            Err(e) if entry.required => return Err(ArchiveError::io(&entry.source, e)),
            Err(e) => {
                warn!("Skipping unreadable directory {}: {}", entry.source.display(), e);
                return Ok(());
            }
        };
        if !entry.archive_path.is_empty() && entry.filter.evaluate_path(&entry.source, true) {
            let modified = fs::metadata(&entry.source).and_then(|m| m.modified()).ok();
            self.directory(sink, &join_archive_path(&entry.archive_path, ""), modified)?;
        }
        let mut visited = HashSet::new();
        if let Ok(real) = fs::canonicalize(&entry.source) {
            visited.insert(real);
        }
        self.walk(sink, entry, children, "", &mut visited)
    }

    /// Descend-and-test: an excluded directory is not written but its
    /// children are still evaluated one by one.
    ///
    /// Linked directories are followed once; a link back into a directory
    /// already walked is skipped. Only regular files and directories are
    /// archived.
    fn walk(
        &mut self,
        sink: &mut dyn ArchiveSink,
        entry: &DirectoryEntry,
        children: Vec<fs::DirEntry>,
        relative: &str,
        visited: &mut HashSet<PathBuf>,
    ) -> Result<(), ArchiveError> {
        for child in children {
            let path = child.path();
            let name = child.file_name().to_string_lossy().into_owned();
            let child_relative = join_archive_path(relative, &name);

            let meta = match resolve_metadata(&path) {
                Ok(meta) => meta,
                Err(e) => {
                    warn!("Skipping unreadable entry {}: {}", path.display(), e);
                    continue;
                }
            };
            let file_type = meta.file_type();
            if !file_type.is_dir() && !file_type.is_file() {
                warn!("Skipping special file {}", path.display());
                continue;
            }

            let included = entry.filter.evaluate_path(&path, file_type.is_dir());
            let archive_name = join_archive_path(&entry.archive_path, &child_relative);

            if file_type.is_dir() {
                if !entry.recursive {
                    continue;
                }
                match fs::canonicalize(&path) {
                    Ok(real) if !visited.insert(real.clone()) => {
                        warn!("Skipping {}: directory already archived", path.display());
                        continue;
                    }
                    Ok(_) => {}
                    Err(e) => {
                        warn!("Skipping unresolvable directory {}: {}", path.display(), e);
                        continue;
                    }
                }
                let grandchildren = match sorted_children(&path) {
                    Ok(children) => children,
                    Err(e) => {
                        warn!("Skipping unreadable directory {}: {}", path.display(), e);
                        continue;
                    }
                };
                if included {
                    self.directory(sink, &format!("{}/", archive_name), meta.modified().ok())?;
                } else {
                    debug!("Excluded directory {}", path.display());
                }
                self.walk(sink, entry, grandchildren, &child_relative, visited)?;
            } else if included {
                self.file(sink, &archive_name, &path, false)?;
            } else {
                debug!("Excluded {}", path.display());
            }
        }
        Ok(())
    }

    fn directory(
        &mut self,
        sink: &mut dyn ArchiveSink,
        name: &str,
        modified: Option<std::time::SystemTime>,
    ) -> Result<(), ArchiveError> {
        if name.is_empty() || name == "/" || !self.claim(name) {
            return Ok(());
        }
        sink.add_directory(name, modified)
            .map_err(|e| ArchiveError::io(Path::new(name), e))?;
        self.summary.directories += 1;
        Ok(())
    }

    /// Open errors skip the file unless it is required; sink errors always fail.
    fn file(
        &mut self,
        sink: &mut dyn ArchiveSink,
        name: &str,
        source: &Path,
        required: bool,
    ) -> Result<(), ArchiveError> {
        if self.names.contains(name) {
            debug!("Skipping duplicate archive entry {}", name);
            self.summary.duplicates += 1;
            return Ok(());
        }
        let opened = fs::File::open(source).and_then(|f| {
            let meta = f.metadata()?;
            if meta.is_file() {
                Ok((f, meta))
            } else {
                Err(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "not a regular file",
                ))
            }
        });
        let (input, meta) = match opened {
            Ok(opened) => opened,
            Err(e) if required => return Err(ArchiveError::io(source, e)),
            Err(e) => {
                warn!("Skipping unreadable file {}: {}", source.display(), e);
                return Ok(());
            }
        };
        self.names.insert(name.to_string());
        let bytes = sink
            .add_file(name, input, &meta)
            .map_err(|e| ArchiveError::io(source, e))?;
        self.summary.files += 1;
        self.summary.bytes += bytes;
        Ok(())
    }

    /// First writer of a name wins.
    fn claim(&mut self, name: &str) -> bool {
        if self.names.insert(name.to_string()) {
            true
        } else {
            debug!("Skipping duplicate archive entry {}", name);
            self.summary.duplicates += 1;
            false
        }
    }
}

fn sorted_children(dir: &Path) -> std::io::Result<Vec<fs::DirEntry>> {
    let mut children: Vec<fs::DirEntry> = fs::read_dir(dir)?.collect::<Result<_, _>>()?;
    children.sort_by_key(|c| c.file_name());
    Ok(children)
}

/// Metadata of the entry, or of its target when it is a symlink.
pub(crate) fn resolve_metadata(path: &Path) -> std::io::Result<fs::Metadata> {
    let meta = fs::symlink_metadata(path)?;
    if meta.file_type().is_symlink() {
        fs::metadata(path)
    } else {
        Ok(meta)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::archive::{FileEntry, MANIFEST_PATH};
    use crate::pattern::{DefaultPolicy, PatternFilter};
    use std::io::Read;
    use tempfile::tempdir;

    fn zip_names(path: &Path) -> Vec<String> {
        let file = fs::File::open(path).expect("open zip");
        let mut archive = zip::ZipArchive::new(file).expect("read zip");
        (0..archive.len())
            .map(|i| archive.by_index(i).expect("entry").name().to_string())
            .collect()
    }

    fn tree(root: &Path) {
        fs::create_dir_all(root.join("a/sub")).unwrap();
        fs::write(root.join("a/public.txt"), "public").unwrap();
        fs::write(root.join("a/secret.txt"), "secret").unwrap();
        fs::write(root.join("a/sub/deep.txt"), "deep").unwrap();
        fs::write(root.join("top.txt"), "top").unwrap();
    }

    #[test]
    fn test_directory_entry_with_override_rules() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        tree(&src);
        let base = crate::pattern::quote(&crate::pattern::normalize_path(&src));

        let filter = PatternFilter::builder(DefaultPolicy::ExcludeByDefault)
            .include(&format!("{}/a/.*", base))
            .unwrap()
            .exclude(&format!("{}/a/secret\\.txt", base))
            .unwrap()
            .build();

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("root", &src).with_filter(filter));
        let summary = builder.create().unwrap();

        let names = zip_names(&out);
        assert!(names.contains(&"root/a/public.txt".to_string()));
        assert!(names.contains(&"root/a/sub/deep.txt".to_string()));
        assert!(!names.contains(&"root/a/secret.txt".to_string()));
        assert!(!names.contains(&"root/top.txt".to_string()));
        assert_eq!(summary.files, 2);
    }

    #[test]
    fn test_excluded_directory_children_still_tested() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        tree(&src);

        let filter = PatternFilter::builder(DefaultPolicy::IncludeByDefault)
            .exclude("/a/$")
            .unwrap()
            .build();

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("", &src).with_filter(filter));
        builder.create().unwrap();

        let names = zip_names(&out);
        assert!(!names.contains(&"a/".to_string()));
        assert!(names.contains(&"a/public.txt".to_string()));
    }

    #[test]
    fn test_non_recursive_entry() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        tree(&src);

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("x", &src).non_recursive());
        builder.create().unwrap();

        let names = zip_names(&out);
        assert_eq!(names, vec!["x/".to_string(), "x/top.txt".to_string()]);
    }

    #[test]
    fn test_manifest_written_first_in_jar() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        tree(&src);
        let manifest = dir.path().join("MANIFEST.MF");
        fs::write(&manifest, "Manifest-Version: 1.0\r\n\r\n").unwrap();

        let out = dir.path().join("out.jar");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("wlp", &src));
        builder.add_entry_config(FileEntry::new(MANIFEST_PATH, &manifest));
        builder.create().unwrap();

        let names = zip_names(&out);
        assert_eq!(names[0], MANIFEST_PATH);
        assert_eq!(names[1], "wlp/");
    }

    #[test]
    fn test_zip_keeps_registration_order() {
        let dir = tempdir().unwrap();
        let manifest = dir.path().join("MANIFEST.MF");
        fs::write(&manifest, "Manifest-Version: 1.0\r\n").unwrap();
        let other = dir.path().join("other.txt");
        fs::write(&other, "x").unwrap();

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_configs(vec![
            EntryConfig::file("other.txt", &other),
            EntryConfig::file(MANIFEST_PATH, &manifest),
        ]);
        builder.create().unwrap();

        assert_eq!(zip_names(&out), vec!["other.txt", MANIFEST_PATH]);
    }

    #[test]
    fn test_synthetic_prefixes_and_duplicates() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "one").unwrap();

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_configs(vec![
            EntryConfig::prefix("wlp/"),
            EntryConfig::prefix("wlp/usr"),
            EntryConfig::prefix("wlp/"),
            EntryConfig::file("wlp/usr/f.txt", &file),
            EntryConfig::file("wlp/usr/f.txt", &file),
        ]);
        let summary = builder.create().unwrap();

        assert_eq!(zip_names(&out), vec!["wlp/", "wlp/usr/", "wlp/usr/f.txt"]);
        assert_eq!(summary.duplicates, 2);
    }

    #[test]
    fn test_missing_optional_source_is_skipped() {
        let dir = tempdir().unwrap();
        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("gone", dir.path().join("gone")));
        builder.add_entry_config(EntryConfig::file("x.txt", dir.path().join("x.txt")));
        let summary = builder.create().unwrap();
        assert_eq!(summary.files, 0);
    }

    #[test]
    fn test_missing_required_source_fails_but_finalizes() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "one").unwrap();

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(EntryConfig::file("f.txt", &file));
        builder.add_entry_config(DirectoryEntry::new("extract", dir.path().join("extract")).required());

        let err = builder.create().unwrap_err();
        assert!(matches!(err, ArchiveError::MissingRequired(_)));

        // The partial archive was still closed properly and is readable.
        assert_eq!(zip_names(&out), vec!["f.txt"]);
    }

    #[test]
    fn test_tar_gz_roundtrip_names() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        tree(&src);

        let out = dir.path().join("out.tar.gz");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("root", &src));
        builder.create().unwrap();

        let gz = flate2::read::GzDecoder::new(fs::File::open(&out).unwrap());
        let mut archive = tar::Archive::new(gz);
        let mut found = None;
        for entry in archive.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().into_owned();
            if path == "root/a/sub/deep.txt" {
                let mut text = String::new();
                entry.read_to_string(&mut text).unwrap();
                found = Some(text);
            }
        }
        assert_eq!(found.as_deref(), Some("deep"));
    }

    #[test]
    fn test_pax_long_path() {
        let dir = tempdir().unwrap();
        let long_dir = dir.path().join("src").join("d".repeat(120));
        fs::create_dir_all(&long_dir).unwrap();
        fs::write(long_dir.join("file.txt"), "long").unwrap();

        let out = dir.path().join("out.pax");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("root", dir.path().join("src")));
        builder.create().unwrap();

        let mut archive = tar::Archive::new(fs::File::open(&out).unwrap());
        let expected = format!("root/{}/file.txt", "d".repeat(120));
        let names: Vec<String> = archive
            .entries()
            .unwrap()
            .map(|e| e.unwrap().path().unwrap().to_string_lossy().into_owned())
            .collect();
        assert!(names.contains(&expected), "names: {:?}", names);
    }

    #[cfg(unix)]
    #[test]
    fn test_special_files_are_skipped() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        tree(&src);
        let _socket = std::os::unix::net::UnixListener::bind(src.join("agent.sock")).unwrap();
        let fifo = std::ffi::CString::new(src.join("a/pipe").to_str().unwrap()).unwrap();
        assert_eq!(unsafe { libc::mkfifo(fifo.as_ptr(), 0o644) }, 0);

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("root", &src));
        let summary = builder.create().unwrap();

        let names = zip_names(&out);
        assert!(!names.iter().any(|n| n.ends_with("agent.sock") || n.ends_with("pipe")));
        assert!(names.contains(&"root/a/sub/deep.txt".to_string()));
        assert_eq!(summary.files, 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_directory_link_cycle_walked_once() {
        let dir = tempdir().unwrap();
        let src = dir.path().join("src");
        tree(&src);
        std::os::unix::fs::symlink(&src, src.join("a/sub/loop")).unwrap();
        std::os::unix::fs::symlink(src.join("top.txt"), src.join("alias.txt")).unwrap();

        let out = dir.path().join("out.zip");
        let mut builder = ArchiveBuilder::for_path(&out).unwrap();
        builder.add_entry_config(DirectoryEntry::new("root", &src));
        builder.create().unwrap();

        let names = zip_names(&out);
        assert_eq!(names.iter().filter(|n| n.ends_with("deep.txt")).count(), 1);
        assert!(!names.iter().any(|n| n.contains("loop")));
        // file links are archived with the target's content
        assert!(names.contains(&"root/alias.txt".to_string()));
    }

    #[test]
    fn test_unreadable_optional_file_skipped() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("f.txt");
        fs::write(&file, "one").unwrap();

        let mut writer = EntryWriter::default();
        let out = dir.path().join("out.zip");
        let mut sink = sink::open(ArchiveFormat::Zip, fs::File::create(&out).unwrap());
        // a directory passes the existence check in write_all but cannot be
        // copied as a file
        writer.file(sink.as_mut(), "dir.txt", dir.path(), false).unwrap();
        let err = writer.file(sink.as_mut(), "dir.txt", dir.path(), true);
        writer.file(sink.as_mut(), "f.txt", &file, false).unwrap();
        sink.finish().unwrap();

        assert!(err.is_err());
        assert_eq!(writer.summary.files, 1);
        assert_eq!(zip_names(&out), vec!["f.txt"]);
    }

    #[test]
    fn test_unknown_extension_rejected() {
        let err = ArchiveBuilder::for_path("/tmp/out.rar").unwrap_err();
        assert!(matches!(err, ArchiveError::UnsupportedFormat(_)));
    }
}

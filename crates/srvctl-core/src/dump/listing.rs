// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Install-tree listing with checksums.
//!
//! ```text
//! D lib/
//! F       1234 2026-01-02T03:04:05 5d41402abc4b2a76b9719d911017c592 lib/a.jar
//! ```
//!
//! Paths are relative to the install dir. The user dir is listed as a
//! directory but not descended into. Linked directories are listed once and
//! special files are left out.

use md5::{Digest, Md5};
use crate::archive::builder::resolve_metadata;
use std::collections::HashSet;
use std::fs::{self, File};
use std::io::{self, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Write the listing of `install_dir` to `out`.
pub fn write_install_listing(install_dir: &Path, user_dir: &Path, out: &Path) -> io::Result<usize> {
    if let Some(parent) = out.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut writer = BufWriter::new(File::create(out)?);
    let mut visited: HashSet<PathBuf> = fs::canonicalize(install_dir).into_iter().collect();
    let count = list_dir(install_dir, install_dir, user_dir, &mut visited, &mut writer)?;
    writer.flush()?;
    Ok(count)
}

fn list_dir<W: Write>(
    root: &Path,
    dir: &Path,
    stop_at: &Path,
    visited: &mut HashSet<PathBuf>,
    out: &mut W,
) -> io::Result<usize> {
    let children = fs::read_dir(dir).and_then(|entries| entries.collect::<Result<Vec<_>, _>>());
    let mut children = match children {
        Ok(children) => children,
        Err(e) if dir == root => return Err(e),
        Err(e) => {
            debug!("Cannot list {}: {}", dir.display(), e);
            return Ok(0);
        }
    };
    children.sort_by_key(|c| c.file_name());

    let mut count = 0;
    for child in children {
        let path = child.path();
        let relative = path
            .strip_prefix(root)
            .map(crate::pattern::normalize_path)
            .unwrap_or_else(|_| crate::pattern::normalize_path(&path));
        let meta = match resolve_metadata(&path) {
            Ok(meta) => meta,
            Err(e) => {
                debug!("Skipping {} in listing: {}", path.display(), e);
                continue;
            }
        };

        if meta.is_dir() {
            writeln!(out, "D {}/", relative)?;
            count += 1;
            if path == stop_at {
                continue;
            }
            let first_visit = fs::canonicalize(&path)
                .map(|real| visited.insert(real))
                .unwrap_or(false);
            if !first_visit {
                debug!("Not descending into {} again", path.display());
                continue;
            }
            count += list_dir(root, &path, stop_at, visited, out)?;
        } else if !meta.is_file() {
            debug!("Skipping special file {} in listing", path.display());
        } else {
            let modified = meta
                .modified()
                .map(|t| {
                    chrono::DateTime::<chrono::Local>::from(t)
                        .format("%Y-%m-%dT%H:%M:%S")
                        .to_string()
                })
                .unwrap_or_else(|_| "-".to_string());
            let digest = match md5_hex(&path) {
                Ok(digest) => digest,
                Err(e) => {
                    debug!("Cannot checksum {}: {}", path.display(), e);
                    "-".to_string()
                }
            };
            writeln!(out, "F {:>10} {} {} {}", meta.len(), modified, digest, relative)?;
            count += 1;
        }
    }
    Ok(count)
}

pub fn md5_hex(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Md5::new();
    let mut buf = [0u8; 8192];
    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hasher
        .finalize()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect())
}

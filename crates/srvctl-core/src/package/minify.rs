// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Runtime files a minified package must keep.

use super::PackageError;
use crate::layout::ServerLayout;
use std::fs;
use std::path::PathBuf;
use tracing::debug;

/// Resolves the `lib/` files a server needs, relative to the install dir.
pub trait MinifyResolver: Send + Sync {
    fn required_files(&self, layout: &ServerLayout, os: &[String]) -> Result<Vec<PathBuf>, PackageError>;
}

/// Reads the required set from a list file.
///
/// One install-relative path per line. `#` starts a comment. A line may be
/// restricted to some platforms with an `os1,os2:` prefix; such lines are
/// kept when no platform was requested or when one of them matches.
///
/// ```text
/// lib/com.example.kernel_1.0.jar
/// linux,aix:lib/native/libsrv.so
/// ```
#[derive(Debug, Clone)]
pub struct ListFileResolver {
    list: Option<PathBuf>,
}

impl ListFileResolver {
    pub const DEFAULT_LIST: &'static str = "etc/minify.list";

    /// `<install>/etc/minify.list`
    pub fn new() -> Self {
        Self { list: None }
    }

    pub fn with_list(list: impl Into<PathBuf>) -> Self {
        Self {
            list: Some(list.into()),
        }
    }

    pub fn parse(text: &str, os: &[String]) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for line in text.lines() {
            let line = line.split('#').next().unwrap_or_default().trim();
            if line.is_empty() {
                continue;
            }
            let path = match line.split_once(':') {
                Some((platforms, path)) => {
                    let wanted = os.is_empty()
                        || platforms
                            .split(',')
                            .map(str::trim)
                            .any(|p| os.iter().any(|o| o.eq_ignore_ascii_case(p)));
                    if !wanted {
                        debug!("Skipping {} for platforms {}", path, platforms);
                        continue;
                    }
                    path.trim()
                }
                None => line,
            };
            files.push(PathBuf::from(path.trim_start_matches('/')));
        }
        files
    }
}

impl Default for ListFileResolver {
    fn default() -> Self {
        Self::new()
    }
}

impl MinifyResolver for ListFileResolver {
    fn required_files(&self, layout: &ServerLayout, os: &[String]) -> Result<Vec<PathBuf>, PackageError> {
        let list = self
            .list
            .clone()
            .unwrap_or_else(|| layout.install_dir().join(Self::DEFAULT_LIST));
        let text = fs::read_to_string(&list).map_err(|source| PackageError::Minify {
            path: list.clone(),
            source,
        })?;
        Ok(Self::parse(&text, os))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_with_platforms() {
        let text = "# kernel\nlib/kernel.jar\n\nlinux, aix:lib/native/a.so\nwin:/lib/native/a.dll # windows\n";

        let all = ListFileResolver::parse(text, &[]);
        assert_eq!(all.len(), 3);
        assert_eq!(all[2], PathBuf::from("lib/native/a.dll"));

        let linux = ListFileResolver::parse(text, &["LINUX".to_string()]);
        assert_eq!(
            linux,
            vec![
                PathBuf::from("lib/kernel.jar"),
                PathBuf::from("lib/native/a.so")
            ]
        );
    }

    #[test]
    fn test_missing_list_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let layout = ServerLayout::new(dir.path(), "s1");
        let err = ListFileResolver::new()
            .required_files(&layout, &[])
            .unwrap_err();
        assert!(matches!(err, PackageError::Minify { .. }));
    }
}

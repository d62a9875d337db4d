// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Loose applications.
//!
//! A loose application is an XML file in `apps/` or `dropins/` describing
//! an archive assembled from pieces on disk:
//!
//! ```xml
//! <archive>
//!   <dir targetInArchive="/WEB-INF/classes" sourceOnDisk="${wlp.user.dir}/src/classes"
//!        excludes="**/*.java"/>
//!   <file targetInArchive="/WEB-INF/web.xml" sourceOnDisk="/src/web.xml"/>
//!   <archive targetInArchive="/WEB-INF/lib/util.jar">
//!     <dir targetInArchive="/" sourceOnDisk="/src/util/classes"/>
//!   </archive>
//! </archive>
//! ```
//!
//! Packaging turns it into a real zip named after the XML file without its
//! `.xml` suffix.

use super::PackageError;
use crate::archive::{ArchiveBuilder, ArchiveFormat, DirectoryEntry, EntryConfig, FileEntry};
use crate::layout::ServerLayout;
use crate::pattern::{glob_to_regex, normalize_path, quote, DefaultPolicy, PatternFilter};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// One element of a loose archive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LooseEntry {
    Dir {
        target: String,
        source: PathBuf,
        excludes: Vec<String>,
    },
    File {
        target: String,
        source: PathBuf,
    },
    Archive {
        target: String,
        content: LooseArchive,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LooseArchive {
    pub entries: Vec<LooseEntry>,
}

/// `${name}` substitutions available in loose configs.
#[derive(Debug, Clone, Default)]
pub struct LooseVariables {
    values: BTreeMap<String, String>,
}

impl LooseVariables {
    pub fn for_layout(layout: &ServerLayout) -> Self {
        let mut vars = Self::default();
        let shared = layout.shared_dir();
        vars.set("wlp.install.dir", layout.install_dir());
        vars.set("wlp.user.dir", layout.user_dir());
        vars.set("server.config.dir", &layout.config_dir());
        vars.set("server.output.dir", &layout.output_dir());
        vars.set("shared.app.dir", &shared.join("apps"));
        vars.set("shared.config.dir", &shared.join("config"));
        vars.set("shared.resource.dir", &shared.join("resources"));
        vars
    }

    pub fn set(&mut self, name: &str, value: &Path) {
        self.values.insert(name.to_string(), normalize_path(value));
    }

    /// Expand known variables; unknown ones are left as written.
    pub fn expand(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find("${") {
            out.push_str(&rest[..start]);
            let after = &rest[start + 2..];
            match after.find('}') {
                Some(end) => {
                    let name = &after[..end];
                    match self.values.get(name) {
                        Some(value) => out.push_str(value),
                        None => {
                            warn!("Unknown variable ${{{}}} in loose config", name);
                            out.push_str(&rest[start..start + end + 3]);
                        }
                    }
                    rest = &after[end + 1..];
                }
                None => {
                    out.push_str(&rest[start..]);
                    rest = "";
                }
            }
        }
        out.push_str(rest);
        out
    }
}

/// Whether `path` is an XML file whose root element is `<archive>`.
pub fn is_loose_config(path: &Path) -> bool {
    let is_xml = path
        .extension()
        .is_some_and(|e| e.eq_ignore_ascii_case("xml"));
    if !is_xml || !path.is_file() {
        return false;
    }
    match fs::read_to_string(path) {
        Ok(text) => roxmltree::Document::parse(&text)
            .map(|doc| doc.root_element().has_tag_name("archive"))
            .unwrap_or(false),
        Err(_) => false,
    }
}

pub fn parse(text: &str, vars: &LooseVariables) -> Result<LooseArchive, PackageError> {
    let doc = roxmltree::Document::parse(text)
        .map_err(|e| PackageError::LooseConfig(e.to_string()))?;
    let root = doc.root_element();
    if !root.has_tag_name("archive") {
        return Err(PackageError::LooseConfig(format!(
            "root element is <{}>, expected <archive>",
            root.tag_name().name()
        )));
    }
    parse_archive(root, vars)
}

fn parse_archive(node: roxmltree::Node, vars: &LooseVariables) -> Result<LooseArchive, PackageError> {
    let mut archive = LooseArchive::default();
    for child in node.children().filter(|n| n.is_element()) {
        let target = crate::archive::normalize_archive_path(
            &vars.expand(child.attribute("targetInArchive").unwrap_or_default()),
        );
        let source = || -> Result<PathBuf, PackageError> {
            child
                .attribute("sourceOnDisk")
                .map(|s| PathBuf::from(vars.expand(s)))
                .ok_or_else(|| {
                    PackageError::LooseConfig(format!(
                        "<{}> without sourceOnDisk",
                        child.tag_name().name()
                    ))
                })
        };
        let entry = match child.tag_name().name() {
            "dir" => LooseEntry::Dir {
                target,
                source: source()?,
                excludes: child
                    .attribute("excludes")
                    .map(split_excludes)
                    .unwrap_or_default(),
            },
            "file" => LooseEntry::File {
                target,
                source: source()?,
            },
            "archive" => LooseEntry::Archive {
                target,
                content: parse_archive(child, vars)?,
            },
            other => {
                debug!("Ignoring <{}> in loose config", other);
                continue;
            }
        };
        archive.entries.push(entry);
    }
    Ok(archive)
}

fn split_excludes(text: &str) -> Vec<String> {
    text.split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

impl LooseArchive {
    pub fn read(path: &Path, vars: &LooseVariables) -> Result<Self, PackageError> {
        let text = fs::read_to_string(path).map_err(|e| {
            PackageError::LooseConfig(format!("{}: {}", path.display(), e))
        })?;
        parse(&text, vars)
    }

    /// Write this archive as a zip at `output`; nested archives are staged in `staging`.
    pub fn build(&self, output: &Path, staging: &Path) -> Result<(), PackageError> {
        let mut builder = ArchiveBuilder::new(output, ArchiveFormat::Zip);
        for (index, entry) in self.entries.iter().enumerate() {
            match entry {
                LooseEntry::Dir {
                    target,
                    source,
                    excludes,
                } => {
                    let mut filter = PatternFilter::builder(DefaultPolicy::IncludeByDefault);
                    let base = quote(normalize_path(source).trim_end_matches('/'));
                    for glob in excludes {
                        let pattern = format!("^{}/{}/?$", base, glob_to_regex(glob.trim_start_matches('/')));
                        filter = filter.exclude(&pattern)?;
                    }
                    builder.add_entry_config(
                        DirectoryEntry::new(target.as_str(), source).with_filter(filter.build()),
                    );
                }
                LooseEntry::File { target, source } => {
                    builder.add_entry_config(FileEntry::new(target.as_str(), source));
                }
                LooseEntry::Archive { target, content } => {
                    let nested = staging.join(format!(
                        "{}-{}.zip",
                        output
                            .file_name()
                            .map(|n| n.to_string_lossy().into_owned())
                            .unwrap_or_default(),
                        index
                    ));
                    content.build(&nested, staging)?;
                    builder.add_entry_config(EntryConfig::file(target.as_str(), nested));
                }
            }
        }
        builder.create()?;
        Ok(())
    }
}

/// Loose configs among the server's applications.
pub fn find_loose_configs(config_dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    for sub in ["apps", "dropins"] {
        let Ok(entries) = fs::read_dir(config_dir.join(sub)) else {
            continue;
        };
        let mut paths: Vec<PathBuf> = entries.flatten().map(|e| e.path()).collect();
        paths.sort();
        found.extend(paths.into_iter().filter(|p| is_loose_config(p)));
    }
    found
}

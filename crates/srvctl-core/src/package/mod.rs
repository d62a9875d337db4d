// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! `package` workflow.
//!
//! Options are validated before anything touches the disk. The resulting
//! [`PackagePlan`] decides which trees go in and under which rules:
//!
//! | include    | install tree      | user tree | archive        |
//! |------------|-------------------|-----------|----------------|
//! | `all`      | yes               | yes       | any            |
//! | `usr`      | no                | yes       | not `.jar`     |
//! | `wlp`      | yes               | no        | any            |
//! | `minify`   | `lib/` minified   | yes       | any            |
//! | `runnable` | as combined       | as combined | `.jar` only  |

pub mod loose;
pub mod minify;

pub use minify::{ListFileResolver, MinifyResolver};

use crate::archive::{
    ArchiveBuilder, ArchiveError, ArchiveFormat, DirectoryEntry, EntryConfig, FileEntry,
    JarManifest, MANIFEST_PATH,
};
use crate::dump::packager::part_path;
use crate::lifecycle::ServerControl;
use crate::pattern::{normalize_path, quote, DefaultPolicy, PatternError, PatternFilter};
use crate::return_code::ReturnCode;
use loose::{find_loose_configs, LooseArchive, LooseVariables};
use std::collections::BTreeSet;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default archive root directory.
pub const DEFAULT_SERVER_ROOT: &str = "wlp";

/// Packaging errors.
#[derive(Debug, Error)]
pub enum PackageError {
    #[error("{0}")]
    Rejected(String),

    #[error("archive error: {0}")]
    Archive(#[from] ArchiveError),

    #[error("pattern error: {0}")]
    Pattern(#[from] PatternError),

    #[error("invalid loose application: {0}")]
    LooseConfig(String),

    #[error("cannot read minify list {path}: {source}")]
    Minify {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Values of `--include`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IncludeOption {
    All,
    Usr,
    Wlp,
    Minify,
    Runnable,
}

impl IncludeOption {
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_ascii_lowercase().as_str() {
            "all" => Some(Self::All),
            "usr" => Some(Self::Usr),
            "wlp" => Some(Self::Wlp),
            "minify" => Some(Self::Minify),
            "runnable" => Some(Self::Runnable),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::All => "all",
            Self::Usr => "usr",
            Self::Wlp => "wlp",
            Self::Minify => "minify",
            Self::Runnable => "runnable",
        }
    }
}

impl fmt::Display for IncludeOption {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Raw `package` arguments.
#[derive(Debug, Clone, Default)]
pub struct PackageOptions {
    pub archive: Option<PathBuf>,
    /// Comma-separated include values; empty means `all`.
    pub include: Option<String>,
    pub server_root: Option<String>,
    /// Comma-separated platforms for `minify`.
    pub os: Option<String>,
}

/// Validated packaging decisions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackagePlan {
    pub include: BTreeSet<IncludeOption>,
    pub archive: PathBuf,
    pub format: ArchiveFormat,
    pub server_root: String,
    pub os: Vec<String>,
}

impl PackagePlan {
    pub fn has(&self, option: IncludeOption) -> bool {
        self.include.contains(&option)
    }

    pub fn install_tree(&self) -> bool {
        !self.has(IncludeOption::Usr)
    }

    pub fn user_tree(&self) -> bool {
        !self.has(IncludeOption::Wlp)
    }

    /// Validate options. Rejections come back as the return code to report.
    pub fn resolve(
        options: &PackageOptions,
        server_name: &str,
        default_dir: &Path,
        default_format: ArchiveFormat,
    ) -> Result<Self, ReturnCode> {
        let include = parse_include(options.include.as_deref());
        let runnable = include.contains(&IncludeOption::Runnable);
        let usr = include.contains(&IncludeOption::Usr);

        let (archive, format) = match &options.archive {
            Some(path) => match ArchiveFormat::from_path(path) {
                Some(format) => (path.clone(), format),
                None if runnable => {
                    error!("--include=runnable requires a .jar archive");
                    return Err(ReturnCode::ErrorServerPackage);
                }
                None => {
                    let mut name = path.as_os_str().to_os_string();
                    name.push(".");
                    name.push(default_format.extension());
                    (PathBuf::from(name), default_format)
                }
            },
            None => {
                let format = if runnable {
                    ArchiveFormat::Jar
                } else {
                    default_format
                };
                let name = format!("{}.{}", server_name, format.extension());
                (default_dir.join(name), format)
            }
        };

        if runnable && !format.is_jar() {
            error!("--include=runnable requires a .jar archive");
            return Err(ReturnCode::ErrorServerPackage);
        }
        if usr && format.is_jar() {
            error!("--include=usr cannot be packaged into a .jar archive");
            return Err(ReturnCode::ErrorServerPackage);
        }

        let server_root = match options.server_root.as_deref().map(str::trim) {
            Some(root) if runnable => {
                warn!("--server-root={} is ignored with --include=runnable", root);
                DEFAULT_SERVER_ROOT.to_string()
            }
            Some(root) if !root.trim_matches('/').is_empty() => root.trim_matches('/').to_string(),
            _ => DEFAULT_SERVER_ROOT.to_string(),
        };

        let os = match options.os.as_deref() {
            Some(os) if !include.contains(&IncludeOption::Minify) => {
                warn!("--os={} is ignored without --include=minify", os);
                Vec::new()
            }
            Some(os) => crate::command::split_list(os),
            None => Vec::new(),
        };

        Ok(Self {
            include,
            archive,
            format,
            server_root,
            os,
        })
    }
}

fn parse_include(text: Option<&str>) -> BTreeSet<IncludeOption> {
    let fallback = || BTreeSet::from([IncludeOption::All]);
    let Some(text) = text.filter(|t| !t.trim().is_empty()) else {
        return fallback();
    };

    let mut include = BTreeSet::new();
    for value in text.split(',').map(str::trim).filter(|v| !v.is_empty()) {
        match IncludeOption::parse(value) {
            Some(option) => {
                include.insert(option);
            }
            None => {
                warn!("Unknown --include value '{}', packaging all", value);
                return fallback();
            }
        }
    }

    let usr_mixed = include.contains(&IncludeOption::Usr)
        && [IncludeOption::Wlp, IncludeOption::Minify, IncludeOption::Runnable]
            .iter()
            .any(|o| include.contains(o));
    if usr_mixed {
        let values: Vec<&str> = include.iter().map(IncludeOption::name).collect();
        warn!("--include={} is not a valid combination, packaging all", values.join(","));
        return fallback();
    }
    if include.is_empty() {
        return fallback();
    }
    include
}

/// Drives `package` for one server.
pub struct PackageOrchestrator {
    control: ServerControl,
    minify: Arc<dyn MinifyResolver>,
}

impl PackageOrchestrator {
    pub fn new(control: ServerControl) -> Self {
        Self {
            control,
            minify: Arc::new(ListFileResolver::new()),
        }
    }

    pub fn with_minify_resolver(mut self, resolver: Arc<dyn MinifyResolver>) -> Self {
        self.minify = resolver;
        self
    }

    pub fn package(&self, options: &PackageOptions) -> ReturnCode {
        let layout = self.control.layout();
        let name = layout.server_name();
        let plan = match PackagePlan::resolve(
            options,
            name,
            &layout.output_dir(),
            self.control.config().archive_format(),
        ) {
            Ok(plan) => plan,
            Err(rc) => return rc,
        };

        if !layout.server_exists() {
            error!("Server {} does not exist", name);
            return ReturnCode::ServerNotExistStatus;
        }
        if self.control.is_running() {
            error!("Server {} is running; stop it before packaging", name);
            return ReturnCode::ServerActiveStatus;
        }

        match self.build(&plan) {
            Ok(()) => {
                info!("Server {} package complete in {}", name, plan.archive.display());
                ReturnCode::Ok
            }
            Err(e) => {
                error!("Server {} package failed: {}", name, e);
                ReturnCode::ErrorServerPackage
            }
        }
    }

    /// Build the archive for an already validated plan.
    pub fn build(&self, plan: &PackagePlan) -> Result<(), PackageError> {
        let staging = tempfile::Builder::new().prefix("srvctl-package").tempdir()?;
        let part = part_path(&plan.archive);
        let entries = self.entries(plan, staging.path(), &part)?;

        let mut builder = ArchiveBuilder::new(&part, plan.format);
        builder.add_entry_configs(entries);
        let summary = builder.create()?;
        fs::rename(&part, &plan.archive)?;
        debug!(
            "Package has {} files, {} directories, {} bytes",
            summary.files, summary.directories, summary.bytes
        );
        Ok(())
    }

    fn entries(&self, plan: &PackagePlan, staging: &Path, part: &Path) -> Result<Vec<EntryConfig>, PackageError> {
        let layout = self.control.layout();
        let root = plan.server_root.as_str();
        let mut entries = vec![EntryConfig::prefix(format!("{}/", root))];

        if plan.has(IncludeOption::Runnable) {
            entries.extend(self.runnable_entries(plan, staging)?);
        }

        if plan.install_tree() {
            let filter = self.install_filter(plan, part)?;
            entries.push(DirectoryEntry::new(root, layout.install_dir()).with_filter(filter).into());
        }

        if plan.user_tree() {
            entries.push(EntryConfig::prefix(format!("{}/usr/", root)));
            entries.push(EntryConfig::prefix(format!("{}/usr/servers/", root)));

            let mut filter = self.user_filter(plan, part)?;
            let servers = format!("{}/usr/servers/{}", root, layout.server_name());
            let vars = LooseVariables::for_layout(layout);
            let config_dir = layout.config_dir();
            for xml in find_loose_configs(&config_dir) {
                let loose = LooseArchive::read(&xml, &vars)?;
                let relative = xml
                    .strip_prefix(&config_dir)
                    .map(normalize_path)
                    .unwrap_or_default();
                let target = relative.trim_end_matches(".xml").to_string();
                let staged = staging.join(target.replace('/', "_"));
                loose.build(&staged, staging)?;
                info!("Packaging loose application {}", relative);

                filter = filter.exclude_file(&xml);
                entries.push(FileEntry::new(format!("{}/{}", servers, target), staged).into());
            }
            entries.push(DirectoryEntry::new(format!("{}/usr", root), layout.user_dir()).with_filter(filter.build()).into());
        }
        Ok(entries)
    }

    fn install_filter(&self, plan: &PackagePlan, part: &Path) -> Result<PatternFilter, PackageError> {
        let layout = self.control.layout();
        let install = layout.install_dir();
        let mut filter = PatternFilter::builder(DefaultPolicy::IncludeByDefault)
            .exclude_tree(&install.join("usr"))
            .exclude_tree(layout.user_dir())
            .exclude_file(&plan.archive)
            .exclude_file(part);

        if plan.has(IncludeOption::Minify) {
            let lib = install.join("lib");
            filter = filter.exclude_tree(&lib).include_tree(&lib.join("versions"));
            for relative in self.minify.required_files(layout, &plan.os)? {
                let path = install.join(&relative);
                filter = filter.include_file(&path);
                for ancestor in path.ancestors().skip(1) {
                    if !ancestor.starts_with(&lib) {
                        break;
                    }
                    filter = filter.include_dir(ancestor);
                }
            }
        }
        Ok(filter.build())
    }

    fn user_filter(&self, plan: &PackagePlan, part: &Path) -> Result<crate::pattern::PatternFilterBuilder, PackageError> {
        let layout = self.control.layout();
        let servers = normalize_path(&layout.servers_dir());
        let config_dir = layout.config_dir();
        let config = quote(normalize_path(&config_dir).trim_end_matches('/'));

        let filter = PatternFilter::builder(DefaultPolicy::IncludeByDefault)
            .exclude(&format!("^{}/[^/]+/", quote(servers.trim_end_matches('/'))))?
            .include_tree(&config_dir)
            .exclude_tree(&config_dir.join("workarea"))
            .exclude_tree(&config_dir.join("logs"))
            .exclude_tree(&layout.output_dir().join("workarea"))
            .exclude_tree(&layout.logs_dir())
            .exclude(&format!("^{}/dump_[^/]*(/|$)", config))?
            .exclude(&format!("/{}\\.dump-[^/]*$", quote(layout.server_name())))?
            .exclude_file(&plan.archive)
            .exclude_file(part);
        Ok(filter)
    }

    /// Rewritten manifest plus the self-extract classes at the archive root.
    fn runnable_entries(&self, plan: &PackagePlan, staging: &Path) -> Result<Vec<EntryConfig>, PackageError> {
        let layout = self.control.layout();
        let extract = layout.install_dir().join("lib").join("extract");
        let template = extract.join("MANIFEST.MF");
        if !template.is_file() {
            return Err(ArchiveError::MissingRequired(template).into());
        }

        let mut manifest = JarManifest::read(&template)?;
        let content = if plan.has(IncludeOption::Minify) {
            "minify"
        } else if plan.has(IncludeOption::Wlp) {
            "wlp"
        } else {
            "all"
        };
        manifest.set("Server-Name", layout.server_name());
        manifest.set("Archive-Root", format!("{}/", plan.server_root));
        manifest.set("Archive-Content-Type", content);
        let staged = staging.join("MANIFEST.MF");
        manifest.write(&staged)?;

        let filter = PatternFilter::builder(DefaultPolicy::IncludeByDefault)
            .exclude_file(&template)
            .build();
        Ok(vec![
            FileEntry::new(MANIFEST_PATH, staged).required().into(),
            DirectoryEntry::new("", extract).with_filter(filter).required().into(),
        ])
    }
}

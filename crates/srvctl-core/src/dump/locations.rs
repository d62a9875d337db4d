// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Java dump location file.
//!
//! One line per requested action, `ACTION=path`. An empty path means the
//! runtime could not produce that kind of dump.
//!
//! ```text
//! HEAP=/srv/out/s1/heapdump.20260101.101010.42.0001.phd
//! THREAD=
//! SYSTEM=/srv/out/s1/core.20260101.101010.42.0002.dmp
//! ```

use super::{DumpError, JavaDumpAction};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::warn;

/// Action to reported path, empty when unsupported.
pub type DumpLocations = BTreeMap<JavaDumpAction, String>;

pub fn format_locations(locations: &DumpLocations) -> String {
    let mut out = String::new();
    for (action, path) in locations {
        out.push_str(action.name());
        out.push('=');
        out.push_str(path);
        out.push('\n');
    }
    out
}

/// Parse location lines; unknown action names are skipped.
pub fn parse_locations(text: &str) -> DumpLocations {
    let mut locations = DumpLocations::new();
    for line in text.lines().map(|l| l.trim_end_matches('\r')) {
        if line.trim().is_empty() {
            continue;
        }
        let Some((name, path)) = line.split_once('=') else {
            warn!("Ignoring malformed dump location line: {}", line);
            continue;
        };
        match JavaDumpAction::parse(name) {
            Ok(action) => {
                locations.insert(action, path.trim().to_string());
            }
            Err(e) => warn!("Ignoring dump location line: {}", e),
        }
    }
    locations
}

pub fn write_locations(path: &Path, locations: &DumpLocations) -> Result<(), DumpError> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, format_locations(locations))?;
    Ok(())
}

pub fn read_locations(path: &Path) -> Result<DumpLocations, DumpError> {
    Ok(parse_locations(&fs::read_to_string(path)?))
}

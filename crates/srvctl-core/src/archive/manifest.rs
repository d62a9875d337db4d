// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Jar manifest reading and writing.
//!
//! Main section only. Lines are at most 72 bytes; longer values continue on
//! lines that start with a single space.

use std::fs;
use std::io;
use std::path::Path;

const MAX_LINE: usize = 72;

/// Ordered `Name: value` headers of a manifest main section.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JarManifest {
    headers: Vec<(String, String)>,
}

impl JarManifest {
    pub fn new() -> Self {
        let mut manifest = Self::default();
        manifest.set("Manifest-Version", "1.0");
        manifest
    }

    /// Parse the main section; named sections after the first blank line are dropped.
    pub fn parse(text: &str) -> Self {
        let mut headers: Vec<(String, String)> = Vec::new();
        for line in text.lines() {
            let line = line.trim_end_matches('\r');
            if line.is_empty() {
                if headers.is_empty() {
                    continue;
                }
                break;
            }
            if let Some(rest) = line.strip_prefix(' ') {
                if let Some((_, value)) = headers.last_mut() {
                    value.push_str(rest);
                }
                continue;
            }
            if let Some((name, value)) = line.split_once(':') {
                headers.push((name.trim().to_string(), value.trim_start().to_string()));
            }
        }
        Self { headers }
    }

    pub fn read(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&fs::read_to_string(path)?))
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Replace an existing header in place or append a new one.
    pub fn set(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self
            .headers
            .iter_mut()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
        {
            Some(slot) => slot.1 = value,
            None => self.headers.push((name.to_string(), value)),
        }
    }

    pub fn remove(&mut self, name: &str) -> Option<String> {
        let index = self
            .headers
            .iter()
            .position(|(n, _)| n.eq_ignore_ascii_case(name))?;
        Some(self.headers.remove(index).1)
    }

    pub fn len(&self) -> usize {
        self.headers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    /// Serialized form with CRLF line endings and 72-byte wrapping.
    pub fn to_text(&self) -> String {
        let mut out = String::new();
        let mut ordered: Vec<&(String, String)> = Vec::with_capacity(self.headers.len());
        // Manifest-Version has to lead the main section.
        ordered.extend(
            self.headers
                .iter()
                .filter(|(n, _)| n.eq_ignore_ascii_case("Manifest-Version")),
        );
        ordered.extend(
            self.headers
                .iter()
                .filter(|(n, _)| !n.eq_ignore_ascii_case("Manifest-Version")),
        );
        for (name, value) in ordered {
            write_wrapped(&mut out, &format!("{}: {}", name, value));
        }
        out.push_str("\r\n");
        out
    }

    pub fn write(&self, path: &Path) -> io::Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.to_text())
    }
}

fn write_wrapped(out: &mut String, line: &str) {
    let mut rest = line;
    let mut limit = MAX_LINE;
    let mut first = true;
    while !rest.is_empty() {
        if !first {
            out.push(' ');
        }
        let mut cut = rest.len().min(limit);
        while !rest.is_char_boundary(cut) {
            cut -= 1;
        }
        out.push_str(&rest[..cut]);
        out.push_str("\r\n");
        rest = &rest[cut..];
        // continuation lines spend one byte on the leading space
        limit = MAX_LINE - 1;
        first = false;
    }
}

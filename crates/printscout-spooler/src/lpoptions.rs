// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Default-destination preferences in the `lpoptions` layout.
//
// User scope: `LPDEST`, then `PRINTER` (the placeholder `lp` does not
// count), then the `Default` line of the per-user file.  System scope: the
// `Default` line of the system file.  Both files also save destinations
// and instances with options:
//
//     Dest Office sides=one-sided
//     Default Office/draft sides=two-sided-long-edge print-quality=3
//
// Saved entries are reported system file first so user options win.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use printscout_core::traits::PreferenceStore;
use printscout_core::types::{DestRef, OptionBag, SavedDestination};

pub const SYSTEM_LPOPTIONS: &str = "/etc/cups/lpoptions";

/// Preference store over environment variables and `lpoptions` files.
#[derive(Debug, Clone)]
pub struct LpOptionsPreferences {
    user_file: Option<PathBuf>,
    system_file: Option<PathBuf>,
    read_environment: bool,
}

impl Default for LpOptionsPreferences {
    fn default() -> Self {
        Self::new()
    }
}

impl LpOptionsPreferences {
    /// The usual locations: `$HOME/.cups/lpoptions` and the system file,
    /// with environment overrides honoured.
    pub fn new() -> Self {
        let user_file = std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".cups/lpoptions"));
        Self {
            user_file,
            system_file: Some(PathBuf::from(SYSTEM_LPOPTIONS)),
            read_environment: true,
        }
    }

    /// Explicit files and no environment lookup.
    pub fn with_files(user_file: Option<PathBuf>, system_file: Option<PathBuf>) -> Self {
        Self {
            user_file,
            system_file,
            read_environment: false,
        }
    }

    pub fn with_environment(mut self, read_environment: bool) -> Self {
        self.read_environment = read_environment;
        self
    }

    fn environment_default(&self) -> Option<DestRef> {
        if !self.read_environment {
            return None;
        }
        from_environment(
            std::env::var("LPDEST").ok().as_deref(),
            std::env::var("PRINTER").ok().as_deref(),
        )
    }
}

impl PreferenceStore for LpOptionsPreferences {
    fn user_default(&self) -> Option<DestRef> {
        self.environment_default()
            .or_else(|| self.user_file.as_deref().and_then(read_default))
    }

    fn system_default(&self) -> Option<DestRef> {
        self.system_file.as_deref().and_then(read_default)
    }

    fn saved_destinations(&self) -> Vec<SavedDestination> {
        [self.system_file.as_deref(), self.user_file.as_deref()]
            .into_iter()
            .flatten()
            .flat_map(read_lines)
            .map(|line| line.saved)
            .collect()
    }
}

/// One `Dest` or `Default` line.
#[derive(Debug, Clone, PartialEq)]
struct Line {
    is_default: bool,
    saved: SavedDestination,
}

fn parse_line(line: &str) -> Option<Line> {
    let (keyword, rest) = line.trim_start().split_once(char::is_whitespace)?;
    let is_default = if keyword.eq_ignore_ascii_case("default") {
        true
    } else if keyword.eq_ignore_ascii_case("dest") {
        false
    } else {
        return None;
    };

    let rest = rest.trim_start();
    let (reference, options) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
    let reference = reference.parse::<DestRef>().ok()?;
    Some(Line {
        is_default,
        saved: SavedDestination {
            reference,
            options: OptionBag::parse(options),
        },
    })
}

fn parse_lines(contents: &str) -> Vec<Line> {
    contents.lines().filter_map(parse_line).collect()
}

fn read_lines(path: &Path) -> Vec<Line> {
    match fs::read_to_string(path) {
        Ok(contents) => parse_lines(&contents),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Vec::new(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "cannot read lpoptions");
            Vec::new()
        }
    }
}

fn from_environment(lpdest: Option<&str>, printer: Option<&str>) -> Option<DestRef> {
    let lpdest = lpdest.and_then(|v| v.parse::<DestRef>().ok());
    lpdest.or_else(|| {
        printer
            .filter(|v| v.trim() != "lp")
            .and_then(|v| v.parse::<DestRef>().ok())
    })
}

/// The destination named by the `Default` line of `path`, if any.
fn read_default(path: &Path) -> Option<DestRef> {
    default_of(read_lines(path))
}

fn default_of(lines: Vec<Line>) -> Option<DestRef> {
    // The last Default line wins.
    let found = lines
        .into_iter()
        .filter(|line| line.is_default)
        .map(|line| line.saved.reference)
        .last();
    if let Some(dest) = &found {
        debug!(default = %dest, "lpoptions default");
    }
    found
}

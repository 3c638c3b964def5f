//! Resolution of remote filename collisions.

use chrono::DateTime;
use std::io::{BufRead, Write};

use albumsync_common::{Error, Result};
use albumsync_photos::RemoteMediaItem;

use crate::config::DuplicatePolicy;
use crate::media::{format_size, LocalDetails, LocalFile};

/// Outcome for one colliding file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Leave the remote item, count the local file as skipped.
    Skip,
    /// Remove the remote item, then upload under the original name.
    Replace,
    /// Upload under a new name.
    Rename(String),
}

/// A local file whose name already exists in the target album.
#[derive(Debug)]
pub struct DuplicateInfo<'a> {
    pub local: &'a LocalFile,
    pub remote: &'a RemoteMediaItem,
}

/// Supplies decisions for collisions.
pub trait DecisionProvider {
    fn decide(&mut self, duplicate: &DuplicateInfo<'_>) -> Result<Decision>;
}

/// Answers every collision the same way without asking.
///
/// `Prompt` has no fixed answer and falls back to `Skip`.
#[derive(Debug, Clone, Copy)]
pub struct FixedPolicy(pub DuplicatePolicy);

impl DecisionProvider for FixedPolicy {
    fn decide(&mut self, _duplicate: &DuplicateInfo<'_>) -> Result<Decision> {
        Ok(match self.0 {
            DuplicatePolicy::Replace => Decision::Replace,
            DuplicatePolicy::Skip | DuplicatePolicy::Prompt => Decision::Skip,
        })
    }
}

/// Interactive prompt over any line reader and writer.
pub struct TerminalPrompt<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalPrompt<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    fn read_line(&mut self) -> Result<String> {
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::InvalidInput(
                "Input closed while waiting for a duplicate decision".to_string(),
            ));
        }
        Ok(line.trim_end_matches(['\n', '\r']).to_string())
    }

    fn show(&mut self, duplicate: &DuplicateInfo<'_>, details: &LocalDetails) -> Result<()> {
        let local_date = details
            .captured
            .map(|dt| dt.format("%Y-%m-%d %H:%M").to_string())
            .unwrap_or_else(|| "?".to_string());
        let local_dim = match (details.width, details.height) {
            (Some(w), Some(h)) if w > 0 && h > 0 => format!("{}×{}", w, h),
            _ => String::new(),
        };

        let remote = duplicate.remote;
        let remote_date = format_remote_date(remote.creation_time.as_deref().unwrap_or(""));
        let remote_dim = match (remote.width.as_deref(), remote.height.as_deref()) {
            (Some(w), Some(h)) if !w.is_empty() && !h.is_empty() => format!("{}×{}", w, h),
            _ => String::new(),
        };

        writeln!(self.output)?;
        writeln!(self.output, "  ⚠️  Duplicate found: {}", duplicate.local.filename)?;
        writeln!(
            self.output,
            "       Local:   {}  |  {:>8}  |  {}",
            local_date,
            format_size(duplicate.local.size),
            local_dim
        )?;
        writeln!(
            self.output,
            "       Remote:  {}  |  {:>8}  |  {}",
            remote_date, "—", remote_dim
        )?;
        Ok(())
    }
}

impl<R: BufRead, W: Write> DecisionProvider for TerminalPrompt<R, W> {
    fn decide(&mut self, duplicate: &DuplicateInfo<'_>) -> Result<Decision> {
        let details = duplicate.local.inspect();
        self.show(duplicate, &details)?;

        loop {
            write!(self.output, "       [S]kip / [R]eplace / Re[n]ame? ")?;
            self.output.flush()?;

            match self.read_line()?.trim().to_lowercase().as_str() {
                "s" => return Ok(Decision::Skip),
                "r" => return Ok(Decision::Replace),
                "n" => {
                    write!(self.output, "       New name: ")?;
                    self.output.flush()?;
                    let name = self.read_line()?;
                    return Ok(if name.is_empty() {
                        Decision::Skip
                    } else {
                        Decision::Rename(name)
                    });
                }
                _ => writeln!(self.output, "       Enter s, r or n")?,
            }
        }
    }
}

/// Render an RFC 3339 creation time as `YYYY-MM-DD HH:MM`.
///
/// Unparseable values fall back to their first 16 characters, an empty
/// value to `?`.
pub fn format_remote_date(creation_time: &str) -> String {
    if creation_time.is_empty() {
        return "?".to_string();
    }
    match DateTime::parse_from_rfc3339(creation_time) {
        Ok(dt) => dt.format("%Y-%m-%d %H:%M").to_string(),
        Err(_) => creation_time.chars().take(16).collect(),
    }
}

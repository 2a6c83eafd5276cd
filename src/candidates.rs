//! The candidate set: test identifiers still suspected of reproducing the
//! failure.
//!
//! The on-disk format is shared by the input list (`-i`) and the result file
//! (`-o`): plain text, one identifier per line. A result file from an
//! interrupted run can be fed straight back in as the next run's input.

use std::fmt::Write as _;
use std::path::Path;

use crate::error::BisectError;

/// Ordered test identifiers believed to contain a failing combination.
///
/// Order and duplicates are kept exactly as the source produced them.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateSet(Vec<String>);

impl CandidateSet {
    /// Wrap an identifier list as-is.
    #[must_use]
    pub const fn new(ids: Vec<String>) -> Self {
        Self(ids)
    }

    /// Parse list-file text: each line is trimmed and blank lines are dropped.
    #[must_use]
    pub fn from_lines(text: &str) -> Self {
        Self(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(str::to_owned)
                .collect(),
        )
    }

    /// Load a list file written by hand, by `--list-cases`, or by a previous
    /// run's `-o`.
    ///
    /// # Errors
    /// Returns [`BisectError::InputFile`] if the file cannot be read.
    pub fn load(path: &Path) -> Result<Self, BisectError> {
        let text = std::fs::read_to_string(path).map_err(|source| BisectError::InputFile {
            path: path.to_owned(),
            source,
        })?;
        Ok(Self::from_lines(&text))
    }

    /// Number of identifiers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if there are no identifiers.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Borrow the identifiers.
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }

    /// Render the set in list-file format: one identifier per line, each
    /// newline-terminated.
    #[must_use]
    pub fn to_lines(&self) -> String {
        render_lines(&self.0)
    }

    /// Overwrite `path` with the list-file rendering of this set.
    ///
    /// # Errors
    /// Returns [`BisectError::OutputFile`] if the write fails.
    pub fn write_to(&self, path: &Path) -> Result<(), BisectError> {
        std::fs::write(path, self.to_lines()).map_err(|source| BisectError::OutputFile {
            path: path.to_owned(),
            source,
        })
    }
}

/// Render identifiers one per line, each newline-terminated.
pub(crate) fn render_lines(ids: &[String]) -> String {
    ids.iter().fold(String::new(), |mut out, id| {
        let _ = writeln!(out, "{id}");
        out
    })
}

impl<'a> IntoIterator for &'a CandidateSet {
    type Item = &'a String;
    type IntoIter = std::slice::Iter<'a, String>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

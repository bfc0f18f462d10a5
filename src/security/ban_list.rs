//! Ban pattern list for enrichment text.
//!
//! Patterns come from a flat file, one regular expression per line, blank
//! lines ignored. Every pattern is compiled case-insensitive and tested
//! against the uppercased enrichment text; the first hit wins.
//!
//! # Reloading
//!
//! [`BanList`] holds the compiled set behind a lock and swaps it whole on
//! [`BanList::reload`], so an operator can lift or add a ban by editing the
//! file and sending SIGHUP. A failed reload keeps the previous set.

use parking_lot::RwLock;
use regex::{Regex, RegexBuilder};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::BanListError;

/// Upper bound on a single compiled pattern, guarding against huge
/// alternations in the ban file.
const PATTERN_SIZE_LIMIT: usize = 1 << 20;

/// An immutable, compiled set of ban patterns.
#[derive(Debug, Default)]
pub struct BanPatternSet {
    patterns: Vec<Regex>,
    /// Source lines kept verbatim, used as classifier context.
    source: String,
}

impl BanPatternSet {
    /// Compile patterns from newline-delimited text.
    ///
    /// Blank lines are skipped. Lines that do not compile are skipped with a
    /// warning naming the line number.
    pub fn parse(text: &str) -> Self {
        let mut patterns = Vec::new();
        let mut kept = Vec::new();

        for (lineno, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            match RegexBuilder::new(line)
                .case_insensitive(true)
                .size_limit(PATTERN_SIZE_LIMIT)
                .build()
            {
                Ok(re) => {
                    patterns.push(re);
                    kept.push(line);
                }
                Err(e) => {
                    warn!(line = lineno + 1, error = %e, "skipping invalid ban pattern");
                }
            }
        }

        Self {
            patterns,
            source: kept.join("\n"),
        }
    }

    /// Read and compile a ban list file.
    pub fn load(path: &Path) -> Result<Self, BanListError> {
        let text = std::fs::read_to_string(path).map_err(|source| BanListError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(Self::parse(&text))
    }

    /// Test the uppercased `text` against every pattern, stopping at the first hit.
    pub fn matches(&self, text: &str) -> bool {
        if self.patterns.is_empty() {
            return false;
        }
        let haystack = text.to_uppercase();
        match self.patterns.iter().find(|re| re.is_match(&haystack)) {
            Some(re) => {
                debug!(pattern = %re.as_str(), "ban pattern matched");
                true
            }
            None => false,
        }
    }

    /// The accepted pattern lines, newline separated.
    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }
}

/// Ban list with an optional backing file that can be reloaded at runtime.
#[derive(Debug)]
pub struct BanList {
    current: RwLock<Arc<BanPatternSet>>,
    path: Option<PathBuf>,
}

impl BanList {
    /// Load the ban list from `path`.
    ///
    /// An unreadable file is an error; the caller must not start without
    /// bans. An empty file starts, but loudly.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BanListError> {
        let path = path.into();
        let set = BanPatternSet::load(&path)?;
        if set.is_empty() {
            warn!(path = %path.display(), "ban list is EMPTY - only the classifier will block traffic");
        } else {
            info!(path = %path.display(), patterns = set.len(), "ban list loaded");
        }
        Ok(Self {
            current: RwLock::new(Arc::new(set)),
            path: Some(path),
        })
    }

    /// Build a fixed ban list from in-memory text (no reload source).
    pub fn from_text(text: &str) -> Self {
        Self {
            current: RwLock::new(Arc::new(BanPatternSet::parse(text))),
            path: None,
        }
    }

    /// Snapshot of the active pattern set.
    pub fn snapshot(&self) -> Arc<BanPatternSet> {
        Arc::clone(&self.current.read())
    }

    /// Re-read the backing file and swap in the new set.
    ///
    /// Returns the new pattern count. Without a backing file this is a no-op
    /// returning the current count.
    pub fn reload(&self) -> Result<usize, BanListError> {
        let Some(ref path) = self.path else {
            return Ok(self.snapshot().len());
        };
        let set = BanPatternSet::load(path)?;
        let count = set.len();
        if count == 0 {
            warn!(path = %path.display(), "reloaded ban list is EMPTY");
        }
        *self.current.write() = Arc::new(set);
        info!(path = %path.display(), patterns = count, "ban list reloaded");
        Ok(count)
    }
}

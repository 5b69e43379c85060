//! Repository selection by name pattern
//!
//! A [`PatternSet`] is an OR over compiled regular expressions. Matching is an
//! unanchored search, so `lecture-.*` selects `lecture-julia` and also
//! `old-lecture-julia`; patterns that need exact names anchor themselves with
//! `^`/`$`. An empty set selects nothing.

use regex::Regex;
use tracing::debug;

use crate::discovery::RepositoryRef;
use crate::error::ConfigError;

/// Ordered list of compiled repository name patterns
#[derive(Debug, Clone, Default)]
pub struct PatternSet {
    patterns: Vec<Regex>,
}

impl PatternSet {
    /// Compile every pattern, failing on the first invalid one
    pub fn compile<I, S>(patterns: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|pattern| {
                let pattern = pattern.as_ref();
                Regex::new(pattern).map_err(|source| ConfigError::InvalidPattern {
                    pattern: pattern.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        debug!("Compiled {} repository patterns", patterns.len());
        Ok(Self { patterns })
    }

    /// True if any pattern matches the repository name
    pub fn matches(&self, name: &str) -> bool {
        match self.patterns.iter().find(|re| re.is_match(name)) {
            Some(re) => {
                debug!("Repository '{}' matched pattern: {}", name, re.as_str());
                true
            }
            None => false,
        }
    }

    /// Keep the repositories whose name matches, preserving input order
    pub fn filter(&self, repos: &[RepositoryRef]) -> Vec<RepositoryRef> {
        repos
            .iter()
            .filter(|repo| self.matches(&repo.name))
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.patterns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Source text of the compiled patterns
    pub fn sources(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(Regex::as_str)
    }
}

use thiserror::Error;

const SEPARATOR: &str = "...";

/// Error for malformed commit range expressions.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("commit range incorrect: {input}")]
pub struct CommitRangeError {
    /// The rejected input.
    pub input: String,
}

/// A `<from>...<to>` revision pair, as passed by the merge workflow.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRange {
    /// Revision (or prefix) the range starts from.
    pub from_prefix: String,
    /// Revision (or prefix) the range ends at.
    pub to_prefix: String,
}

impl CommitRange {
    /// Parses the three-dot wire syntax. Two-dot ranges are rejected.
    ///
    /// # Errors
    ///
    /// Returns [`CommitRangeError`] unless the input contains exactly one
    /// `...` separator.
    pub fn parse(input: &str) -> Result<Self, CommitRangeError> {
        let parts: Vec<&str> = input.split(SEPARATOR).collect();
        if parts.len() != 2 {
            return Err(CommitRangeError {
                input: input.to_string(),
            });
        }

        Ok(Self {
            from_prefix: parts[0].to_string(),
            to_prefix: parts[1].to_string(),
        })
    }

    /// The revision the target branch is checked out at for the promotion.
    #[must_use]
    pub fn target_ref(&self) -> &str {
        &self.to_prefix
    }
}

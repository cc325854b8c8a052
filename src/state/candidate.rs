use std::fmt;

/// Application-code prefix used by the Vietnamese registry for trademarks
pub const DEFAULT_CODE_PREFIX: &str = "VN-4";

/// A candidate application code, `{prefix}-{year}-{sequence:05}`
///
/// Codes are immutable once generated; `next` yields the following code in
/// the same year.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CandidateCode {
    prefix: String,
    year: i32,
    sequence: u32,
}

impl CandidateCode {
    pub fn new(prefix: impl Into<String>, year: i32, sequence: u32) -> Self {
        Self {
            prefix: prefix.into(),
            year,
            sequence,
        }
    }

    /// Builds a code with the default `VN-4` prefix
    pub fn trademark(year: i32, sequence: u32) -> Self {
        Self::new(DEFAULT_CODE_PREFIX, year, sequence)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn year(&self) -> i32 {
        self.year
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Returns the code immediately after this one
    ///
    /// `None` once the sequence space of the year is used up.
    pub fn next(&self) -> Option<Self> {
        Some(Self {
            prefix: self.prefix.clone(),
            year: self.year,
            sequence: self.sequence.checked_add(1)?,
        })
    }

    /// Parses a rendered code back into its parts
    ///
    /// The prefix itself may contain dashes (`VN-4`), so the year and the
    /// sequence are taken from the right.
    pub fn parse(code: &str) -> Option<Self> {
        let mut parts = code.rsplitn(3, '-');
        let sequence = parts.next()?;
        let year = parts.next()?;
        let prefix = parts.next()?;

        if prefix.is_empty() || sequence.len() < 5 {
            return None;
        }

        Some(Self {
            prefix: prefix.to_string(),
            year: year.parse().ok()?,
            sequence: sequence.parse().ok()?,
        })
    }
}

impl fmt::Display for CandidateCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{:05}", self.prefix, self.year, self.sequence)
    }
}

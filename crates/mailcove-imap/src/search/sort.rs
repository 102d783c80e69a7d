//! SORT keys and THREAD algorithms (RFC 5256, RFC 5957).

/// What a sort key orders by.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortCriterion {
    /// Internal date.
    Arrival,
    /// First Cc address.
    Cc,
    /// Date header (internal date when absent).
    Date,
    /// First From address.
    From,
    /// Message size.
    Size,
    /// Base subject (stripped of re/fwd prefixes).
    Subject,
    /// First To address.
    To,
    /// Display name of the first From address (SORT=DISPLAY).
    DisplayFrom,
    /// Display name of the first To address (SORT=DISPLAY).
    DisplayTo,
}

impl SortCriterion {
    /// Returns the wire atom.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Arrival => "ARRIVAL",
            Self::Cc => "CC",
            Self::Date => "DATE",
            Self::From => "FROM",
            Self::Size => "SIZE",
            Self::Subject => "SUBJECT",
            Self::To => "TO",
            Self::DisplayFrom => "DISPLAYFROM",
            Self::DisplayTo => "DISPLAYTO",
        }
    }

    /// True for the SORT=DISPLAY keys.
    #[must_use]
    pub const fn needs_display(self) -> bool {
        matches!(self, Self::DisplayFrom | Self::DisplayTo)
    }
}

/// One sort key, optionally reversed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    /// Reverse the ordering of this key.
    pub reverse: bool,
    /// What to order by.
    pub criterion: SortCriterion,
}

impl SortKey {
    /// An ascending key.
    #[must_use]
    pub const fn asc(criterion: SortCriterion) -> Self {
        Self {
            reverse: false,
            criterion,
        }
    }

    /// A descending key.
    #[must_use]
    pub const fn desc(criterion: SortCriterion) -> Self {
        Self {
            reverse: true,
            criterion,
        }
    }
}

impl std::fmt::Display for SortKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.reverse {
            write!(f, "REVERSE ")?;
        }
        write!(f, "{}", self.criterion.as_str())
    }
}

/// Threading algorithm for the THREAD command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadAlgorithm {
    /// Group by base subject only.
    OrderedSubject,
    /// Full References/In-Reply-To threading.
    References,
}

impl ThreadAlgorithm {
    /// Returns the wire atom.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderedSubject => "ORDEREDSUBJECT",
            Self::References => "REFERENCES",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sort_key_display() {
        assert_eq!(SortKey::asc(SortCriterion::Date).to_string(), "DATE");
        assert_eq!(
            SortKey::desc(SortCriterion::Arrival).to_string(),
            "REVERSE ARRIVAL"
        );
    }

    #[test]
    fn display_keys_flagged() {
        assert!(SortCriterion::DisplayFrom.needs_display());
        assert!(!SortCriterion::Subject.needs_display());
    }

    #[test]
    fn thread_algorithm_atoms() {
        assert_eq!(ThreadAlgorithm::References.as_str(), "REFERENCES");
        assert_eq!(
            ThreadAlgorithm::OrderedSubject.as_str(),
            "ORDEREDSUBJECT"
        );
    }
}

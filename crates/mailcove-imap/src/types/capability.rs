//! Server capabilities and response status.

/// Response status from a tagged or status-condition response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// Command completed successfully.
    Ok,
    /// Command failed (operational error).
    No,
    /// Command failed (protocol/syntax error).
    Bad,
    /// Server greeting (pre-authenticated).
    PreAuth,
    /// Server is closing connection.
    Bye,
}

impl Status {
    /// Returns true if this is a successful status.
    #[must_use]
    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok | Self::PreAuth)
    }
}

/// Server capability.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Capability {
    /// `IMAP4rev1` (RFC 3501)
    Imap4Rev1,
    /// IDLE command support (RFC 2177)
    Idle,
    /// NAMESPACE command support (RFC 2342)
    Namespace,
    /// UIDPLUS extension (RFC 4315)
    UidPlus,
    /// MOVE extension (RFC 6851)
    Move,
    /// LITERAL+ extension (RFC 7888)
    LiteralPlus,
    /// LITERAL- extension (RFC 7888)
    LiteralMinus,
    /// STARTTLS support
    StartTls,
    /// COMPRESS=DEFLATE (RFC 4978)
    CompressDeflate,
    /// SASL-IR initial responses (RFC 4959)
    SaslIr,
    /// LOGIN disabled
    LoginDisabled,
    /// AUTH mechanism
    Auth(String),
    /// ENABLE command (RFC 5161)
    Enable,
    /// UTF8=ACCEPT (RFC 6855)
    Utf8Accept,
    /// CONDSTORE (RFC 7162)
    CondStore,
    /// QRESYNC (RFC 7162)
    QResync,
    /// ESEARCH extended search results (RFC 4731)
    ESearch,
    /// SORT extension (RFC 5256)
    Sort,
    /// SORT=DISPLAY (RFC 5957)
    SortDisplay,
    /// THREAD algorithm (RFC 5256), e.g. `THREAD=REFERENCES`
    Thread(String),
    /// ANNOTATE-EXPERIMENT-1 (RFC 5257)
    Annotate,
    /// METADATA (RFC 5464)
    Metadata,
    /// NOTIFY (RFC 5465)
    Notify,
    /// ID extension (RFC 2971)
    Id,
    /// ACL extension (RFC 4314)
    Acl,
    /// QUOTA extension (RFC 2087)
    Quota,
    /// SPECIAL-USE mailboxes (RFC 6154)
    SpecialUse,
    /// LIST-EXTENDED (RFC 5258)
    ListExtended,
    /// LIST-STATUS (RFC 5819)
    ListStatus,
    /// WITHIN: OLDER/YOUNGER search keys (RFC 5032)
    Within,
    /// FUZZY search (RFC 6203)
    SearchFuzzy,
    /// FILTERS: named search filters (RFC 5466)
    Filters,
    /// SAVEDATE fetch/search (RFC 8514)
    SaveDate,
    /// PREVIEW fetch item (RFC 8970)
    Preview,
    /// OBJECTID: EMAILID/THREADID (RFC 8474)
    ObjectId,
    /// Gmail extensions (X-GM-EXT-1)
    XGmExt1,
    /// Unknown capability
    Unknown(String),
}

impl Capability {
    /// Parses a capability string.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let upper = s.to_uppercase();
        match upper.as_str() {
            "IMAP4REV1" => Self::Imap4Rev1,
            "IDLE" => Self::Idle,
            "NAMESPACE" => Self::Namespace,
            "UIDPLUS" => Self::UidPlus,
            "MOVE" => Self::Move,
            "LITERAL+" => Self::LiteralPlus,
            "LITERAL-" => Self::LiteralMinus,
            "STARTTLS" => Self::StartTls,
            "COMPRESS=DEFLATE" => Self::CompressDeflate,
            "SASL-IR" => Self::SaslIr,
            "LOGINDISABLED" => Self::LoginDisabled,
            "ENABLE" => Self::Enable,
            "UTF8=ACCEPT" => Self::Utf8Accept,
            "CONDSTORE" => Self::CondStore,
            "QRESYNC" => Self::QResync,
            "ESEARCH" => Self::ESearch,
            "SORT" => Self::Sort,
            "SORT=DISPLAY" => Self::SortDisplay,
            "ANNOTATE-EXPERIMENT-1" => Self::Annotate,
            "METADATA" => Self::Metadata,
            "NOTIFY" => Self::Notify,
            "ID" => Self::Id,
            "ACL" => Self::Acl,
            "QUOTA" => Self::Quota,
            "SPECIAL-USE" => Self::SpecialUse,
            "LIST-EXTENDED" => Self::ListExtended,
            "LIST-STATUS" => Self::ListStatus,
            "WITHIN" => Self::Within,
            "SEARCH=FUZZY" => Self::SearchFuzzy,
            "FILTERS" => Self::Filters,
            "SAVEDATE" => Self::SaveDate,
            "PREVIEW" => Self::Preview,
            "OBJECTID" => Self::ObjectId,
            "X-GM-EXT-1" => Self::XGmExt1,
            _ if upper.starts_with("AUTH=") => Self::Auth(s[5..].to_string()),
            _ if upper.starts_with("THREAD=") => Self::Thread(s[7..].to_uppercase()),
            _ => Self::Unknown(s.to_string()),
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Imap4Rev1 => write!(f, "IMAP4rev1"),
            Self::Idle => write!(f, "IDLE"),
            Self::Namespace => write!(f, "NAMESPACE"),
            Self::UidPlus => write!(f, "UIDPLUS"),
            Self::Move => write!(f, "MOVE"),
            Self::LiteralPlus => write!(f, "LITERAL+"),
            Self::LiteralMinus => write!(f, "LITERAL-"),
            Self::StartTls => write!(f, "STARTTLS"),
            Self::CompressDeflate => write!(f, "COMPRESS=DEFLATE"),
            Self::SaslIr => write!(f, "SASL-IR"),
            Self::LoginDisabled => write!(f, "LOGINDISABLED"),
            Self::Auth(mech) => write!(f, "AUTH={mech}"),
            Self::Enable => write!(f, "ENABLE"),
            Self::Utf8Accept => write!(f, "UTF8=ACCEPT"),
            Self::CondStore => write!(f, "CONDSTORE"),
            Self::QResync => write!(f, "QRESYNC"),
            Self::ESearch => write!(f, "ESEARCH"),
            Self::Sort => write!(f, "SORT"),
            Self::SortDisplay => write!(f, "SORT=DISPLAY"),
            Self::Thread(alg) => write!(f, "THREAD={alg}"),
            Self::Annotate => write!(f, "ANNOTATE-EXPERIMENT-1"),
            Self::Metadata => write!(f, "METADATA"),
            Self::Notify => write!(f, "NOTIFY"),
            Self::Id => write!(f, "ID"),
            Self::Acl => write!(f, "ACL"),
            Self::Quota => write!(f, "QUOTA"),
            Self::SpecialUse => write!(f, "SPECIAL-USE"),
            Self::ListExtended => write!(f, "LIST-EXTENDED"),
            Self::ListStatus => write!(f, "LIST-STATUS"),
            Self::Within => write!(f, "WITHIN"),
            Self::SearchFuzzy => write!(f, "SEARCH=FUZZY"),
            Self::Filters => write!(f, "FILTERS"),
            Self::SaveDate => write!(f, "SAVEDATE"),
            Self::Preview => write!(f, "PREVIEW"),
            Self::ObjectId => write!(f, "OBJECTID"),
            Self::XGmExt1 => write!(f, "X-GM-EXT-1"),
            Self::Unknown(s) => write!(f, "{s}"),
        }
    }
}

/// The set of capabilities the server has advertised, plus a generation
/// counter.
///
/// The version bumps on every server-sourced update (untagged `CAPABILITY`
/// or a `[CAPABILITY ...]` response code). Callers may only *remove*
/// capabilities; synthesising support the server never advertised is
/// rejected.
#[derive(Debug, Clone, Default)]
pub struct CapabilitySet {
    caps: Vec<Capability>,
    version: u64,
}

impl CapabilitySet {
    /// Creates an empty capability set at version 0.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            caps: Vec::new(),
            version: 0,
        }
    }

    /// Returns the generation counter.
    #[must_use]
    pub const fn version(&self) -> u64 {
        self.version
    }

    /// Returns true if the capability is advertised.
    #[must_use]
    pub fn is_set(&self, cap: &Capability) -> bool {
        self.caps.contains(cap)
    }

    /// Returns true if any `THREAD=<alg>` capability is advertised.
    #[must_use]
    pub fn supports_thread(&self, algorithm: &str) -> bool {
        self.caps
            .iter()
            .any(|c| matches!(c, Capability::Thread(alg) if alg.eq_ignore_ascii_case(algorithm)))
    }

    /// Replaces the advertised set from a server response and bumps the
    /// version.
    pub fn replace(&mut self, caps: Vec<Capability>) {
        self.caps = caps;
        self.version += 1;
    }

    /// Masks off a capability.
    ///
    /// This is the only mutation callers may perform; it does not bump the
    /// version since the server's advertisement has not changed.
    pub fn disable(&mut self, cap: &Capability) {
        self.caps.retain(|c| c != cap);
    }

    /// Returns the advertised capabilities.
    #[must_use]
    pub fn iter(&self) -> std::slice::Iter<'_, Capability> {
        self.caps.iter()
    }
}

impl<'a> IntoIterator for &'a CapabilitySet {
    type Item = &'a Capability;
    type IntoIter = std::slice::Iter<'a, Capability>;

    fn into_iter(self) -> Self::IntoIter {
        self.caps.iter()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    mod status_tests {
        use super::*;

        #[test]
        fn is_ok_for_ok_and_preauth() {
            assert!(Status::Ok.is_ok());
            assert!(Status::PreAuth.is_ok());
        }

        #[test]
        fn is_ok_false_for_failures() {
            assert!(!Status::No.is_ok());
            assert!(!Status::Bad.is_ok());
            assert!(!Status::Bye.is_ok());
        }
    }

    mod capability_parse_tests {
        use super::*;

        #[test]
        fn parse_is_case_insensitive() {
            assert_eq!(Capability::parse("IMAP4REV1"), Capability::Imap4Rev1);
            assert_eq!(Capability::parse("imap4rev1"), Capability::Imap4Rev1);
        }

        #[test]
        fn parse_literal_variants() {
            assert_eq!(Capability::parse("LITERAL+"), Capability::LiteralPlus);
            assert_eq!(Capability::parse("LITERAL-"), Capability::LiteralMinus);
        }

        #[test]
        fn parse_auth() {
            assert_eq!(
                Capability::parse("AUTH=PLAIN"),
                Capability::Auth("PLAIN".to_string())
            );
        }

        #[test]
        fn parse_thread() {
            assert_eq!(
                Capability::parse("THREAD=REFERENCES"),
                Capability::Thread("REFERENCES".to_string())
            );
            assert_eq!(
                Capability::parse("thread=orderedsubject"),
                Capability::Thread("ORDEREDSUBJECT".to_string())
            );
        }

        #[test]
        fn parse_extension_set() {
            assert_eq!(Capability::parse("SASL-IR"), Capability::SaslIr);
            assert_eq!(
                Capability::parse("COMPRESS=DEFLATE"),
                Capability::CompressDeflate
            );
            assert_eq!(Capability::parse("ESEARCH"), Capability::ESearch);
            assert_eq!(Capability::parse("SORT=DISPLAY"), Capability::SortDisplay);
            assert_eq!(Capability::parse("SEARCH=FUZZY"), Capability::SearchFuzzy);
            assert_eq!(Capability::parse("X-GM-EXT-1"), Capability::XGmExt1);
            assert_eq!(Capability::parse("OBJECTID"), Capability::ObjectId);
        }

        #[test]
        fn parse_unknown() {
            assert_eq!(
                Capability::parse("XSOMETHING"),
                Capability::Unknown("XSOMETHING".to_string())
            );
        }

        #[test]
        fn display_round_trips() {
            for s in ["IMAP4rev1", "LITERAL+", "AUTH=XOAUTH2", "THREAD=REFERENCES"] {
                assert_eq!(format!("{}", Capability::parse(s)), s);
            }
        }
    }

    mod capability_set_tests {
        use super::*;

        #[test]
        fn replace_bumps_version() {
            let mut set = CapabilitySet::new();
            assert_eq!(set.version(), 0);

            set.replace(vec![Capability::Imap4Rev1, Capability::Idle]);
            assert_eq!(set.version(), 1);
            assert!(set.is_set(&Capability::Idle));

            set.replace(vec![Capability::Imap4Rev1]);
            assert_eq!(set.version(), 2);
            assert!(!set.is_set(&Capability::Idle));
        }

        #[test]
        fn disable_masks_without_version_bump() {
            let mut set = CapabilitySet::new();
            set.replace(vec![Capability::Imap4Rev1, Capability::LiteralPlus]);
            let version = set.version();

            set.disable(&Capability::LiteralPlus);
            assert!(!set.is_set(&Capability::LiteralPlus));
            assert_eq!(set.version(), version);
        }

        #[test]
        fn supports_thread() {
            let mut set = CapabilitySet::new();
            set.replace(vec![Capability::Thread("REFERENCES".to_string())]);
            assert!(set.supports_thread("references"));
            assert!(!set.supports_thread("ORDEREDSUBJECT"));
        }
    }
}

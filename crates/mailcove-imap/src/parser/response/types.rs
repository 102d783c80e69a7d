//! Response data types.

use crate::types::{
    Capability, Flags, ListResponse, Mailbox, ModSeq, ResponseCode, SeqNum, Uid, UidSet,
    UidValidity,
};

/// FETCH response item.
#[derive(Debug, Clone, PartialEq)]
pub enum FetchItem {
    /// Message flags.
    Flags(Flags),
    /// Internal date.
    InternalDate(String),
    /// RFC822 size.
    Rfc822Size(u32),
    /// Envelope.
    Envelope(Box<Envelope>),
    /// UID.
    Uid(Uid),
    /// BODY section content.
    Body {
        /// Section specifier.
        section: Option<String>,
        /// Origin offset for partial fetches.
        origin: Option<u32>,
        /// Body data (NIL for absent sections).
        data: Option<Vec<u8>>,
    },
    /// BODYSTRUCTURE (or non-extensible BODY structure form).
    BodyStructure(BodyStructure),
    /// MODSEQ (RFC 7162).
    ModSeq(ModSeq),
    /// X-GM-MSGID (Gmail).
    GmailMessageId(u64),
    /// X-GM-THRID (Gmail).
    GmailThreadId(u64),
    /// X-GM-LABELS (Gmail).
    GmailLabels(Vec<String>),
    /// EMAILID (RFC 8474).
    EmailId(String),
    /// THREADID (RFC 8474); NIL when the server assigns none.
    ThreadId(Option<String>),
    /// SAVEDATE (RFC 8514); NIL when unknown.
    SaveDate(Option<String>),
    /// PREVIEW (RFC 8970); NIL when unavailable.
    Preview(Option<String>),
    /// ANNOTATION (RFC 5257).
    Annotation(Vec<Annotation>),
}

/// A single annotation: entry name plus attribute/value pairs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Annotation {
    /// Entry name, e.g. `/comment`.
    pub entry: String,
    /// Attribute/value pairs, e.g. `value.priv` → text.
    pub attributes: Vec<(String, Option<String>)>,
}

/// Message envelope.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Envelope {
    /// Date header.
    pub date: Option<String>,
    /// Subject header.
    pub subject: Option<String>,
    /// From addresses.
    pub from: Vec<Address>,
    /// Sender addresses.
    pub sender: Vec<Address>,
    /// Reply-To addresses.
    pub reply_to: Vec<Address>,
    /// To addresses.
    pub to: Vec<Address>,
    /// Cc addresses.
    pub cc: Vec<Address>,
    /// Bcc addresses.
    pub bcc: Vec<Address>,
    /// In-Reply-To header.
    pub in_reply_to: Option<String>,
    /// Message-ID header.
    pub message_id: Option<String>,
}

/// Email address from envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Address {
    /// Display name.
    pub name: Option<String>,
    /// Source route (obsolete).
    pub adl: Option<String>,
    /// Mailbox name (local part).
    pub mailbox: Option<String>,
    /// Host name (domain part).
    pub host: Option<String>,
}

impl Address {
    /// Returns the full email address.
    #[must_use]
    pub fn email(&self) -> Option<String> {
        match (&self.mailbox, &self.host) {
            (Some(m), Some(h)) => Some(format!("{m}@{h}")),
            _ => None,
        }
    }
}

/// Body structure (simplified).
#[derive(Debug, Clone, PartialEq)]
pub enum BodyStructure {
    /// Single-part body.
    Basic {
        /// MIME type.
        media_type: String,
        /// MIME subtype.
        media_subtype: String,
        /// Body parameters.
        params: Vec<(String, String)>,
        /// Content-ID.
        id: Option<String>,
        /// Content-Description.
        description: Option<String>,
        /// Content-Transfer-Encoding.
        encoding: String,
        /// Body size in bytes.
        size: u32,
    },
    /// Text body.
    Text {
        /// Text subtype.
        subtype: String,
        /// Body parameters.
        params: Vec<(String, String)>,
        /// Content-ID.
        id: Option<String>,
        /// Content-Description.
        description: Option<String>,
        /// Content-Transfer-Encoding.
        encoding: String,
        /// Body size in bytes.
        size: u32,
        /// Size in lines.
        lines: u32,
    },
    /// Multipart body.
    Multipart {
        /// Child body parts.
        bodies: Vec<Self>,
        /// Multipart subtype.
        subtype: String,
    },
}

/// STATUS response item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StatusItem {
    /// Number of messages.
    Messages(u32),
    /// Number of recent messages.
    Recent(u32),
    /// Next UID.
    UidNext(Uid),
    /// UIDVALIDITY value.
    UidValidity(UidValidity),
    /// Number of unseen messages.
    Unseen(u32),
    /// Highest mod-sequence.
    HighestModSeq(ModSeq),
}

/// Extended search results (ESEARCH, RFC 4731 / RFC 6203).
///
/// Plain SEARCH/SORT results are also folded into this shape by commands that
/// register both handlers.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SearchResults {
    /// Search correlator: the tag of the command these results answer.
    pub tag: Option<String>,
    /// True if the `UID` marker was present.
    pub uid: bool,
    /// Matched identifiers in server order.
    pub ids: Option<UidSet>,
    /// Lowest matching identifier.
    pub min: Option<u32>,
    /// Highest matching identifier.
    pub max: Option<u32>,
    /// Number of matches.
    pub count: Option<u32>,
    /// Highest mod-sequence among the matches.
    pub mod_seq: Option<ModSeq>,
    /// Relevancy scores (0..=100), parallel to `ids` (FUZZY search).
    pub relevancy: Vec<u8>,
}

impl SearchResults {
    /// Merges another result set into this one (a command may see both a
    /// plain SEARCH line and an ESEARCH line from quirky servers).
    pub fn merge(&mut self, other: Self) {
        if other.tag.is_some() {
            self.tag = other.tag;
        }
        self.uid |= other.uid;
        if other.ids.is_some() {
            self.ids = other.ids;
        }
        self.min = other.min.or(self.min);
        self.max = other.max.or(self.max);
        self.count = other.count.or(self.count);
        self.mod_seq = other.mod_seq.or(self.mod_seq);
        if !other.relevancy.is_empty() {
            self.relevancy = other.relevancy;
        }
    }
}

/// A node of a THREAD response tree (RFC 5256).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThreadNode {
    /// Messages along this branch, parent-first.
    pub ids: Vec<u32>,
    /// Child branches.
    pub children: Vec<ThreadNode>,
}

/// One namespace entry: prefix and hierarchy delimiter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamespaceEntry {
    /// Namespace prefix, e.g. `INBOX.`.
    pub prefix: String,
    /// Hierarchy delimiter.
    pub delimiter: Option<char>,
}

/// NAMESPACE response (RFC 2342).
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Namespaces {
    /// Personal namespaces.
    pub personal: Vec<NamespaceEntry>,
    /// Other users' namespaces.
    pub other_users: Vec<NamespaceEntry>,
    /// Shared namespaces.
    pub shared: Vec<NamespaceEntry>,
}

/// One QUOTA resource line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QuotaResource {
    /// Resource name, e.g. `STORAGE`.
    pub name: String,
    /// Current usage.
    pub usage: u64,
    /// Limit.
    pub limit: u64,
}

/// Untagged response data.
#[derive(Debug, Clone, PartialEq)]
pub enum UntaggedResponse {
    /// OK response with optional code.
    Ok {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// NO response.
    No {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BAD response.
    Bad {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// PREAUTH response.
    PreAuth {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// BYE response.
    Bye {
        /// Optional response code.
        code: Option<ResponseCode>,
        /// Human-readable text.
        text: String,
    },
    /// CAPABILITY response.
    Capability(Vec<Capability>),
    /// LIST response.
    List(ListResponse),
    /// LSUB response.
    Lsub(ListResponse),
    /// FLAGS response.
    Flags(Flags),
    /// EXISTS response (message count).
    Exists(u32),
    /// RECENT response.
    Recent(u32),
    /// EXPUNGE response (message removed).
    Expunge(SeqNum),
    /// VANISHED response (RFC 7162).
    Vanished {
        /// True for `VANISHED (EARLIER)`.
        earlier: bool,
        /// The expunged UIDs.
        uids: UidSet,
    },
    /// FETCH response.
    Fetch {
        /// Message sequence number.
        seq: SeqNum,
        /// Fetch data items.
        items: Vec<FetchItem>,
    },
    /// SEARCH response (also used for SORT's flat number list).
    Search {
        /// Matched identifiers in server order.
        ids: Vec<u32>,
        /// Trailing `(MODSEQ n)` when present.
        mod_seq: Option<ModSeq>,
    },
    /// ESEARCH response.
    ESearch(SearchResults),
    /// SORT response.
    Sort(Vec<u32>),
    /// THREAD response.
    Thread(Vec<ThreadNode>),
    /// STATUS response.
    Status {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Status items.
        items: Vec<StatusItem>,
    },
    /// ENABLED response (RFC 5161).
    Enabled(Vec<Capability>),
    /// NAMESPACE response.
    Namespace(Namespaces),
    /// QUOTA response.
    Quota {
        /// Quota root name.
        root: String,
        /// Resource usage/limits.
        resources: Vec<QuotaResource>,
    },
    /// QUOTAROOT response.
    QuotaRoot {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Quota roots that apply to the mailbox.
        roots: Vec<String>,
    },
    /// ID response (RFC 2971).
    Id(Option<Vec<(String, Option<String>)>>),
    /// ACL response (RFC 4314).
    Acl {
        /// Mailbox name.
        mailbox: Mailbox,
        /// Identifier/rights pairs.
        rights: Vec<(String, String)>,
    },
    /// METADATA response (RFC 5464).
    Metadata {
        /// Mailbox name (empty for server metadata).
        mailbox: Mailbox,
        /// Entry/value pairs; a bare entry list has `None` values.
        entries: Vec<(String, Option<String>)>,
    },
}

impl UntaggedResponse {
    /// The response's leading atom, used as the dispatch key for per-command
    /// untagged handlers.
    #[must_use]
    pub const fn key(&self) -> &'static str {
        match self {
            Self::Ok { .. } => "OK",
            Self::No { .. } => "NO",
            Self::Bad { .. } => "BAD",
            Self::PreAuth { .. } => "PREAUTH",
            Self::Bye { .. } => "BYE",
            Self::Capability(_) => "CAPABILITY",
            Self::List(_) => "LIST",
            Self::Lsub(_) => "LSUB",
            Self::Flags(_) => "FLAGS",
            Self::Exists(_) => "EXISTS",
            Self::Recent(_) => "RECENT",
            Self::Expunge(_) => "EXPUNGE",
            Self::Vanished { .. } => "VANISHED",
            Self::Fetch { .. } => "FETCH",
            Self::Search { .. } => "SEARCH",
            Self::ESearch(_) => "ESEARCH",
            Self::Sort(_) => "SORT",
            Self::Thread(_) => "THREAD",
            Self::Status { .. } => "STATUS",
            Self::Enabled(_) => "ENABLED",
            Self::Namespace(_) => "NAMESPACE",
            Self::Quota { .. } => "QUOTA",
            Self::QuotaRoot { .. } => "QUOTAROOT",
            Self::Id(_) => "ID",
            Self::Acl { .. } => "ACL",
            Self::Metadata { .. } => "METADATA",
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn address_email() {
        let addr = Address {
            name: Some("John Doe".to_string()),
            adl: None,
            mailbox: Some("john".to_string()),
            host: Some("example.com".to_string()),
        };
        assert_eq!(addr.email(), Some("john@example.com".to_string()));

        let partial = Address {
            name: None,
            adl: None,
            mailbox: Some("john".to_string()),
            host: None,
        };
        assert_eq!(partial.email(), None);
    }

    #[test]
    fn search_results_merge() {
        let mut first = SearchResults {
            ids: UidSet::parse("1,2"),
            ..SearchResults::default()
        };
        let second = SearchResults {
            count: Some(2),
            mod_seq: ModSeq::from_u64(99),
            ..SearchResults::default()
        };
        first.merge(second);
        assert_eq!(first.count, Some(2));
        assert_eq!(first.mod_seq.unwrap().get(), 99);
        assert!(first.ids.is_some());
    }

    #[test]
    fn thread_node_shape() {
        let node = ThreadNode {
            ids: vec![2],
            children: vec![ThreadNode {
                ids: vec![3],
                children: vec![],
            }],
        };
        assert_eq!(node.ids, vec![2]);
        assert_eq!(node.children.len(), 1);
    }
}

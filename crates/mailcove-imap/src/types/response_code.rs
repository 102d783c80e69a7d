//! Response codes.
//!
//! Bracketed codes inside status lines (`[UIDVALIDITY 3857529045]`) carrying
//! structured machine-readable information.

use super::{Capability, Flag, ModSeq, SeqNum, Uid, UidSet, UidValidity};

/// Response code from a status line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseCode {
    /// ALERT: Human-readable message that MUST be shown to user.
    Alert,
    /// BADCHARSET with the optional list of charsets the server supports.
    BadCharset(Vec<String>),
    /// CAPABILITY carried inline in a status line.
    Capability(Vec<Capability>),
    /// PARSE: Error parsing a message in the mailbox.
    Parse,
    /// PERMANENTFLAGS: Flags that can be changed permanently.
    PermanentFlags(Vec<Flag>),
    /// READ-ONLY: Mailbox selected as read-only.
    ReadOnly,
    /// READ-WRITE: Mailbox selected as read-write.
    ReadWrite,
    /// TRYCREATE: Mailbox doesn't exist, but can be created.
    TryCreate,
    /// UIDNEXT: Next UID to be assigned.
    UidNext(Uid),
    /// UIDVALIDITY: Unique identifier validity value.
    UidValidity(UidValidity),
    /// UNSEEN: First unseen message sequence number.
    Unseen(SeqNum),
    /// APPENDUID: UID assigned to an appended message (RFC 4315).
    AppendUid {
        /// UIDVALIDITY of the mailbox.
        uid_validity: UidValidity,
        /// UIDs of the appended messages.
        uids: UidSet,
    },
    /// COPYUID: UIDs of copied messages (RFC 4315).
    CopyUid {
        /// UIDVALIDITY of the destination mailbox.
        uid_validity: UidValidity,
        /// Source UIDs.
        source: UidSet,
        /// Destination UIDs.
        dest: UidSet,
    },
    /// UIDNOTSTICKY: The mailbox does not keep persistent UIDs (RFC 4315).
    UidNotSticky,
    /// HIGHESTMODSEQ: Highest mod-sequence value (RFC 7162).
    HighestModSeq(ModSeq),
    /// NOMODSEQ: Server doesn't support mod-sequences for this mailbox.
    NoModSeq,
    /// MODIFIED: messages that failed an UNCHANGEDSINCE store (RFC 7162).
    Modified(UidSet),
    /// CLOSED: previously selected mailbox is now closed (RFC 7162).
    Closed,
    /// AUTHENTICATIONFAILED and friends: reason for an AUTH failure.
    AuthFailure(String),
    /// Unknown response code, kept verbatim.
    Unknown(String),
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::unreadable_literal)]
mod tests {
    use super::*;

    #[test]
    fn capability_with_list() {
        let code = ResponseCode::Capability(vec![Capability::Imap4Rev1, Capability::Idle]);
        if let ResponseCode::Capability(caps) = code {
            assert_eq!(caps.len(), 2);
        } else {
            panic!("Expected Capability variant");
        }
    }

    #[test]
    fn bad_charset_carries_supported_set() {
        let code = ResponseCode::BadCharset(vec!["US-ASCII".to_string()]);
        if let ResponseCode::BadCharset(charsets) = code {
            assert_eq!(charsets, vec!["US-ASCII"]);
        } else {
            panic!("Expected BadCharset variant");
        }
    }

    #[test]
    fn append_uid() {
        let code = ResponseCode::AppendUid {
            uid_validity: UidValidity::new(3857529045).unwrap(),
            uids: UidSet::single(Uid::new(4392).unwrap()),
        };
        if let ResponseCode::AppendUid { uid_validity, uids } = code {
            assert_eq!(uid_validity.get(), 3857529045);
            assert_eq!(format!("{uids}"), "4392");
        } else {
            panic!("Expected AppendUid variant");
        }
    }

    #[test]
    fn copy_uid() {
        let code = ResponseCode::CopyUid {
            uid_validity: UidValidity::new(888).unwrap(),
            source: UidSet::parse("1:2").unwrap(),
            dest: UidSet::parse("101:102").unwrap(),
        };
        if let ResponseCode::CopyUid { source, dest, .. } = code {
            assert_eq!(source.count(), 2);
            assert_eq!(dest.count(), 2);
        } else {
            panic!("Expected CopyUid variant");
        }
    }

    #[test]
    fn highest_mod_seq() {
        let code = ResponseCode::HighestModSeq(ModSeq::from_u64(987654321).unwrap());
        if let ResponseCode::HighestModSeq(seq) = code {
            assert_eq!(seq.get(), 987654321);
        } else {
            panic!("Expected HighestModSeq variant");
        }
    }

    #[test]
    fn modified_set() {
        let code = ResponseCode::Modified(UidSet::parse("7,9").unwrap());
        if let ResponseCode::Modified(uids) = code {
            assert_eq!(uids.count(), 2);
        } else {
            panic!("Expected Modified variant");
        }
    }
}

//! Inbound message assembly and classification.
//!
//! A single logical gateway message may arrive as several transport
//! fragments. The assembler accumulates fragments until end-of-message is
//! signaled, then classifies the complete unit by exact byte comparison
//! against the fixed wire constants. Unrecognized units are for the caller
//! to log and discard; they never terminate the session.

use crate::constants::classify;
use tracing::trace;

/// Classification of one complete inbound transport unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InboundKind {
    /// Transport-open marker; the peer expects a CONNECT frame next.
    SockOpen,
    /// Peer heartbeat, no action required.
    Heartbeat,
    /// Transport-level close unit.
    CloseMarker,
    /// CONNECTED frame, handshake complete.
    Connected,
    /// MESSAGE frame carrying subscription data.
    Message,
    /// ERROR frame from the peer.
    Error,
    /// Anything else; log and discard.
    Unrecognized,
}

/// Accumulates transport fragments into complete inbound units.
#[derive(Debug, Default)]
pub struct MessageAssembler {
    buf: Vec<u8>,
}

impl MessageAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one fragment. Returns the complete unit once `end_of_message`
    /// is signaled, resetting the assembler for the next unit.
    pub fn push(&mut self, fragment: &[u8], end_of_message: bool) -> Option<Vec<u8>> {
        self.buf.extend_from_slice(fragment);
        if !end_of_message {
            trace!(buffered = self.buf.len(), "buffered partial fragment");
            return None;
        }
        Some(std::mem::take(&mut self.buf))
    }

    /// Bytes currently buffered waiting for end-of-message.
    pub fn pending_len(&self) -> usize {
        self.buf.len()
    }

    /// Classify a complete unit. Exact fixed-byte comparison, not a parse.
    pub fn classify(unit: &[u8]) -> InboundKind {
        if unit == classify::SOCK_OPEN {
            InboundKind::SockOpen
        } else if unit == classify::SOCK_HEARTBEAT {
            InboundKind::Heartbeat
        } else if unit.starts_with(classify::SOCK_CLOSE_PREFIX) {
            InboundKind::CloseMarker
        } else if unit.starts_with(classify::CONNECTED_PREFIX) {
            InboundKind::Connected
        } else if unit.starts_with(classify::MESSAGE_PREFIX) {
            InboundKind::Message
        } else if unit.starts_with(classify::ERROR_PREFIX) {
            InboundKind::Error
        } else {
            InboundKind::Unrecognized
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_fragment_completes() {
        let mut asm = MessageAssembler::new();
        let unit = asm.push(b"o", true).unwrap();
        assert_eq!(unit, b"o");
        assert_eq!(asm.pending_len(), 0);
    }

    #[test]
    fn test_fragments_accumulate_until_end() {
        let mut asm = MessageAssembler::new();
        assert!(asm.push(b"a[\"MES", false).is_none());
        assert!(asm.push(b"SAGE\\n", false).is_none());
        let unit = asm.push(b"\\n\"]", true).unwrap();
        assert_eq!(unit, b"a[\"MESSAGE\\n\\n\"]");
        assert_eq!(MessageAssembler::classify(&unit), InboundKind::Message);
    }

    #[test]
    fn test_assembler_resets_between_units() {
        let mut asm = MessageAssembler::new();
        asm.push(b"h", true).unwrap();
        let unit = asm.push(b"o", true).unwrap();
        assert_eq!(unit, b"o");
    }

    #[test]
    fn test_classify_markers() {
        assert_eq!(MessageAssembler::classify(b"o"), InboundKind::SockOpen);
        assert_eq!(MessageAssembler::classify(b"h"), InboundKind::Heartbeat);
        assert_eq!(
            MessageAssembler::classify(b"c[1000,\"bye\"]"),
            InboundKind::CloseMarker
        );
    }

    #[test]
    fn test_classify_frames() {
        assert_eq!(
            MessageAssembler::classify(b"a[\"CONNECTED\\nversion:1.2\\n\\n\"]"),
            InboundKind::Connected
        );
        assert_eq!(
            MessageAssembler::classify(b"a[\"MESSAGE\\nsubscription:s1\\n\\n{}\"]"),
            InboundKind::Message
        );
        assert_eq!(
            MessageAssembler::classify(b"a[\"ERROR\\nmessage:denied\\n\\n\"]"),
            InboundKind::Error
        );
    }

    #[test]
    fn test_classify_requires_exact_match() {
        // "oo" is not the open marker and "H" is not a heartbeat
        assert_eq!(MessageAssembler::classify(b"oo"), InboundKind::Unrecognized);
        assert_eq!(MessageAssembler::classify(b"H"), InboundKind::Unrecognized);
        assert_eq!(
            MessageAssembler::classify(b"a[\"RECEIPT\\n\\n\"]"),
            InboundKind::Unrecognized
        );
        assert_eq!(MessageAssembler::classify(b""), InboundKind::Unrecognized);
    }
}

//! Fixed wire protocol constants.
//!
//! The gateway speaks STOMP-style frames tunneled inside a SockJS-style
//! envelope. All byte sequences here must match the venue exactly; the
//! assembler classifies inbound units by exact prefix comparison against
//! these constants.

/// Header names used by the gateway.
pub mod headers {
    pub const DESTINATION: &str = "destination";
    pub const CONTENT_LENGTH: &str = "content-length";
    pub const CONTENT_TYPE: &str = "content-type";
    /// Subscription id a MESSAGE frame is routed by.
    pub const SUBSCRIPTION: &str = "subscription";
    /// Server-assigned sequence number.
    pub const MESSAGE_ID: &str = "message-id";
    /// Server-side publish timestamp, milliseconds since epoch.
    pub const SENT_AT: &str = "sent-at";
    /// "true" when the message is a full-state snapshot.
    pub const SNAPSHOT: &str = "snapshot";
    /// Bearer token. Case-sensitive, capitalized by the venue.
    pub const AUTHORIZATION: &str = "Authorization";
    pub const HEART_BEAT: &str = "heart-beat";
    pub const ACCEPT_VERSION: &str = "accept-version";
    pub const ID: &str = "id";
    /// Token being replaced, on the refresh frame.
    pub const OLD_TOKEN: &str = "old-token";
    /// Replacement token, on the refresh frame.
    pub const NEW_TOKEN: &str = "new-token";
}

/// STOMP protocol version the CONNECT frame advertises.
pub const ACCEPT_VERSION_VALUE: &str = "1.2";

/// Content type for JSON request bodies.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Destination the token refresh frame is sent to.
pub const TOKEN_REFRESH_DESTINATION: &str = "/app/token/refresh";

/// Close code string carried on the application-level disconnect.
pub const DISCONNECT_CODE: &str = "1000";

/// Destination path segment that marks a streaming (non-conflated) feed.
pub const STREAMING_SEGMENT: &str = "streaming";

/// Outbound heartbeat unit: a newline inside the one-element array envelope.
pub const HEARTBEAT_PAYLOAD: &[u8] = b"a[\"\\n\"]";

/// Envelope classifiers and classification prefixes (server to client).
pub mod classify {
    /// Transport-open marker, sent once after the socket opens.
    pub const SOCK_OPEN: &[u8] = b"o";
    /// Server heartbeat marker.
    pub const SOCK_HEARTBEAT: &[u8] = b"h";
    /// Close unit prefix; the payload carries a close code and reason.
    pub const SOCK_CLOSE_PREFIX: &[u8] = b"c";
    /// Array-of-messages classifier.
    pub const ARRAY: u8 = b'a';

    pub const CONNECTED_PREFIX: &[u8] = b"a[\"CONNECTED";
    pub const MESSAGE_PREFIX: &[u8] = b"a[\"MESSAGE";
    pub const ERROR_PREFIX: &[u8] = b"a[\"ERROR";
}

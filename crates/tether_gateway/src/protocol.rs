//! # Gateway Wire Protocol
//!
//! Pure parsing, no I/O. The server reads lines and feeds them here.

/// One decoded inbound frame.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Frame {
    /// Broadcast a message to every active session.
    Alert(String),
    /// Execute a console command on the authoritative loop.
    Console(String),
    /// Anything else. Ignored, but logged by the server.
    Unknown(String),
}

/// Checks a connection's opening line against the shared secret.
///
/// Clients either send a bare header line (`auth:<token>`) or, for stacks
/// that can only set a URL, a handshake path with a token query parameter
/// (`connect?token=<token>`).
#[must_use]
pub fn authenticate(first_line: &str, secret: &str) -> bool {
    let line = first_line.trim();
    if let Some(token) = line.strip_prefix("auth:") {
        return !secret.is_empty() && token == secret;
    }
    if let Some((_, query)) = line.split_once('?') {
        for pair in query.split('&') {
            if let Some(token) = pair.strip_prefix("token=") {
                return !secret.is_empty() && token == secret;
            }
        }
    }
    false
}

/// Decodes one post-authentication line.
#[must_use]
pub fn parse_frame(line: &str) -> Frame {
    let line = line.trim_end_matches(['\r', '\n']);
    if let Some(message) = line.strip_prefix("alert:") {
        return Frame::Alert(message.to_string());
    }
    if let Some(command) = line.strip_prefix("console:") {
        return Frame::Console(command.to_string());
    }
    Frame::Unknown(line.to_string())
}

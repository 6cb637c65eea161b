//! Handshake header builders
//!
//! Every connection to the relay opens with a small block of HTTP-style
//! header lines terminated by an empty line. The relay routes on the
//! `Nat-host` value and authenticates on `Nat-token`; `nat-setting-client`
//! marks the single control connection apart from tunnel connections.

/// Header block sent when establishing the control channel.
pub fn control_handshake(host: &str, token: &str) -> String {
    format!(
        "OPTION / HTTP/1.1\r\nNat-host: {host}\r\nNat-token: {token}\r\nnat-setting-client: yes\r\nHost: {host}\r\n\r\n"
    )
}

/// Header block sent when establishing a tunnel connection for `domain`.
pub fn tunnel_handshake(host: &str, domain: &str, token: &str) -> String {
    format!("OPTION / HTTP/1.1\r\nHost: {host}\r\nNat-host: {domain}\r\nNat-token: {token}\r\n\r\n")
}

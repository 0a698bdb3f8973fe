//! Byte sanitisation for untrusted remote stdout/stderr.

/// Decode as ASCII, discarding non-decodable bytes; retain only the
/// printable range `0x20..=0x7E` plus `\n`.
pub fn sanitize(bytes: &[u8]) -> String {
    bytes
        .iter()
        .copied()
        .filter(|&b| b == b'\n' || (0x20..=0x7E).contains(&b))
        .map(|b| b as char)
        .collect()
}

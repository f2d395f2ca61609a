use bytes::Bytes;

/// Source of content decryption keys.
///
/// Parsers only carry this handle through to the point where an encrypted
/// track is detected; no parser in this workspace decrypts samples.
pub trait KeySource: Send + Sync {
    /// Looks up the key for `key_id`.
    fn key(&self, key_id: &[u8]) -> Option<Bytes>;
}

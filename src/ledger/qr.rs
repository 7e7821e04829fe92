//! Loyalty codes printed on the client's QR card.

use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD};
use base64::Engine;

use crate::error::SyncError;

const CODE_PREFIX: &str = "CLIENT";
const CODE_LEN: usize = 16;

/// Turns a code into an image. The codec itself lives outside this crate.
pub trait QrEncoder {
    fn encode(&self, data: &str) -> Result<Vec<u8>, SyncError>;
}

impl<F> QrEncoder for F
where
    F: Fn(&str) -> Result<Vec<u8>, SyncError>,
{
    fn encode(&self, data: &str) -> Result<Vec<u8>, SyncError> {
        self(data)
    }
}

/// A 16 character code for a client.
///
/// Base64 of `CLIENT:{id}:{first}:{last}:{at_millis}` with `+`, `/` and `=`
/// dropped, cut to 16 characters. The cut leaves only the first few
/// characters of the id in the code, so a code alone is not unique; the
/// ledger checks new codes against the owner's clients.
pub fn generate_code(client_id: &str, first_name: &str, last_name: &str, at_millis: i64) -> String {
    let raw = format!(
        "{}:{}:{}:{}:{}",
        CODE_PREFIX, client_id, first_name, last_name, at_millis
    );
    STANDARD
        .encode(raw)
        .chars()
        .filter(|c| !matches!(c, '+' | '/' | '='))
        .take(CODE_LEN)
        .collect()
}

/// The client id embedded in a scanned code, if it decodes to
/// `CLIENT:{id}:...`. Generated codes are truncated, so this only yields the
/// full id for codes that carry the whole payload.
pub fn decode_code(code: &str) -> Option<String> {
    let bytes = STANDARD_NO_PAD
        .decode(code.trim().trim_end_matches('='))
        .ok()?;
    let decoded = String::from_utf8_lossy(&bytes);
    let mut parts = decoded.split(':');
    match (parts.next(), parts.next()) {
        (Some(CODE_PREFIX), Some(id)) if !id.is_empty() => Some(id.to_string()),
        _ => None,
    }
}

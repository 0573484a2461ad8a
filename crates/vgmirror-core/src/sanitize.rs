//! Comment stripping for the upstream server list.
//!
//! The outer document is a CSV-like list, one server per line. Lines starting
//! with `#` are comments (the upstream uses one for its column header). The
//! last field of a data line may hold a base64-encoded OpenVPN config, which
//! carries its own `;`/`#` comments; those are stripped too and the payload is
//! re-encoded in place, which is where most of the size reduction comes from.
//!
//! ```text
//! #HostName,IP,...,Config_Base64        -> dropped
//! host1,1.2.3.4,...,<base64 of config>  -> host1,1.2.3.4,...,<base64 of config sans comments>
//! *vpn_servers                          -> unchanged (no separator)
//! ```
//!
//! Sanitizing is all-or-nothing: one malformed payload fails the whole
//! document, so a half-rewritten list is never installed.

use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD};

use crate::error::{Error, Result};

/// Comment markers for lines of the outer document.
pub const OUTER_COMMENT_MARKERS: &[u8] = b"#";

/// Comment markers for lines of an embedded config payload.
pub const EMBEDDED_COMMENT_MARKERS: &[u8] = b";#";

/// Separator between the last field of a data line and its payload.
pub const FIELD_SEPARATOR: u8 = b',';

/// Standard alphabet with padding, ignoring non-zero bits in the last symbol.
///
/// Upstream payloads are not always canonically encoded; re-encoding always
/// goes through [`STANDARD`].
const PAYLOAD_DECODER: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_allow_trailing_bits(true),
);

/// Sanitize a raw upstream document.
///
/// Returns [`Error::Decode`] if any embedded payload is not valid base64 and
/// [`Error::EmptyDocument`] if no line survives comment stripping.
pub fn sanitize(raw: &[u8]) -> Result<String> {
    let mut out = Vec::with_capacity(raw.len());

    for (idx, line) in lines(raw).enumerate() {
        if is_comment(line, OUTER_COMMENT_MARKERS) {
            continue;
        }

        match payload_start(line) {
            Some(start) => {
                let cleaned = clean_payload(&line[start..]).map_err(|source| Error::Decode {
                    line: idx + 1,
                    source,
                })?;
                out.extend_from_slice(&line[..start]);
                out.extend_from_slice(cleaned.as_bytes());
            }
            None => out.extend_from_slice(line),
        }
        out.push(b'\n');
    }

    if out.is_empty() {
        return Err(Error::EmptyDocument);
    }

    Ok(into_text(out))
}

/// Decode an embedded payload, strip its comment lines and re-encode it.
pub fn clean_payload(encoded: &[u8]) -> std::result::Result<String, base64::DecodeError> {
    let decoded = PAYLOAD_DECODER.decode(encoded)?;
    Ok(STANDARD.encode(strip_comments(&decoded, EMBEDDED_COMMENT_MARKERS)))
}

/// Drop every line whose first byte is one of `markers`.
///
/// Every retained line, blank ones included, is terminated with `\n`.
pub fn strip_comments(doc: &[u8], markers: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(doc.len());
    for line in lines(doc).filter(|line| !is_comment(line, markers)) {
        out.extend_from_slice(line);
        out.push(b'\n');
    }
    out
}

/// Lines of `doc` without their terminators.
///
/// A trailing `\r` is removed, and the empty fragment after a final `\n` is
/// not a line.
fn lines(doc: &[u8]) -> impl Iterator<Item = &[u8]> {
    doc.split_inclusive(|&b| b == b'\n').map(|line| {
        let line = line.strip_suffix(b"\n").unwrap_or(line);
        line.strip_suffix(b"\r").unwrap_or(line)
    })
}

fn is_comment(line: &[u8], markers: &[u8]) -> bool {
    line.first().is_some_and(|b| markers.contains(b))
}

/// Offset of the embedded payload: the byte after the last separator.
///
/// A separator at position 0, or one that ends the line, means there is no
/// payload; an empty suffix must not be treated as an (empty) config.
fn payload_start(line: &[u8]) -> Option<usize> {
    match line.iter().rposition(|&b| b == FIELD_SEPARATOR) {
        Some(pos) if pos > 0 && pos + 1 < line.len() => Some(pos + 1),
        _ => None,
    }
}

fn into_text(out: Vec<u8>) -> String {
    match String::from_utf8(out) {
        Ok(text) => text,
        Err(err) => {
            tracing::warn!(
                valid_up_to = err.utf8_error().valid_up_to(),
                "sanitized document is not valid UTF-8, replacing invalid sequences"
            );
            String::from_utf8_lossy(err.as_bytes()).into_owned()
        }
    }
}

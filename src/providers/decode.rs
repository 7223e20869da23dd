//! Upstream response body decompression.
//!
//! Providers may return `Content-Encoding: gzip` or `br`. The proxy needs the
//! decoded JSON to extract usage (§4.4) before re-materializing the body for
//! the client, so bodies are decoded here rather than passed through
//! untouched. Supersedes the teacher's generic `compression` module, which
//! targeted compressing *our own* traffic rather than decoding a fixed set of
//! upstream encodings.

use std::io::Read;

/// Decodes `body` according to the upstream `Content-Encoding` header value,
/// if any. Unknown or absent encodings pass the body through unchanged.
///
/// Returns `(bytes, true)` on success. A malformed upstream body (the
/// declared encoding doesn't match the actual bytes) returns `(body.to_vec(),
/// false)` rather than an error — the proxy still forwards the raw bytes to
/// the tenant verbatim, it just skips usage extraction for that response
/// (§A.7: decompression failure must never surface as a hard error).
pub fn decode_body(content_encoding: Option<&str>, body: &[u8]) -> (Vec<u8>, bool) {
    match content_encoding.map(str::to_ascii_lowercase).as_deref() {
        Some("gzip") | Some("x-gzip") => {
            let mut decoder = flate2::read::GzDecoder::new(body);
            let mut out = Vec::new();
            match decoder.read_to_end(&mut out) {
                Ok(_) => (out, true),
                Err(e) => {
                    tracing::warn!(error = %e, "gzip decode failed, passing body through raw");
                    (body.to_vec(), false)
                }
            }
        }
        Some("deflate") => {
            let mut decoder = flate2::read::DeflateDecoder::new(body);
            let mut out = Vec::new();
            match decoder.read_to_end(&mut out) {
                Ok(_) => (out, true),
                Err(e) => {
                    tracing::warn!(error = %e, "deflate decode failed, passing body through raw");
                    (body.to_vec(), false)
                }
            }
        }
        Some("br") => {
            let mut out = Vec::new();
            match brotli::BrotliDecompress(&mut std::io::Cursor::new(body), &mut out) {
                Ok(_) => (out, true),
                Err(e) => {
                    tracing::warn!(error = %e, "brotli decode failed, passing body through raw");
                    (body.to_vec(), false)
                }
            }
        }
        _ => (body.to_vec(), true),
    }
}

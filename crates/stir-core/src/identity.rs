//! Identity header transport helpers
//!
//! The signer writes the compact JWS followed by RFC 8224 parameters. Some
//! peers instead base64-wrap the token, so parsing tries a base64 decode
//! first and falls back to the raw value; it never fails.

use base64::{engine::general_purpose::URL_SAFE, Engine};

/// Base64-wrap a token for header transport
pub fn format_identity_header(token: &str) -> String {
    URL_SAFE.encode(token.as_bytes())
}

/// Recover the token from an Identity header value
pub fn parse_identity_header(value: &str) -> String {
    let token = value.split(';').next().unwrap_or_default().trim();

    match URL_SAFE.decode(token) {
        Ok(bytes) => String::from_utf8(bytes).unwrap_or_else(|_| token.to_string()),
        Err(_) => token.to_string(),
    }
}

/// Identity header value as written on egress (RFC 8224 form)
pub fn identity_header_value(token: &str, certificate_url: &str) -> String {
    format!("{token};info=<{certificate_url}>;alg=ES256;ppt=shaken")
}

/// Telephone number from a From / To header value.
///
/// Accepts `sip:+15145551234@host`, `<sip:...>;tag=x`, display-name forms
/// and `tel:` URIs. Returns `None` when no user part is present.
pub fn extract_tn(value: &str) -> Option<String> {
    let uri = match (value.find('<'), value.rfind('>')) {
        (Some(start), Some(end)) if start < end => &value[start + 1..end],
        _ => value.trim().trim_matches(|c| c == '<' || c == '>'),
    };

    let user = uri.trim().split('@').next().unwrap_or_default();
    let user = ["sips:", "sip:", "tel:"]
        .iter()
        .find_map(|scheme| strip_prefix_ignore_case(user, scheme))
        .unwrap_or(user);
    let tn = user.split(';').next().unwrap_or_default().trim();

    if tn.is_empty() {
        None
    } else {
        Some(tn.to_string())
    }
}

fn strip_prefix_ignore_case<'a>(value: &'a str, prefix: &str) -> Option<&'a str> {
    let head = value.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&value[prefix.len()..])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_then_parse_returns_token() {
        let token = "eyJhbGciOiJFUzI1NiJ9.eyJhdHRlc3QiOiJBIn0.c2ln";
        let formatted = format_identity_header(token);
        assert_ne!(formatted, token);
        assert_eq!(parse_identity_header(&formatted), token);
    }

    #[test]
    fn test_parse_falls_back_to_raw_token() {
        let token = "eyJhbGciOiJFUzI1NiJ9.eyJhdHRlc3QiOiJBIn0.c2ln";
        assert_eq!(parse_identity_header(token), token);
        assert_eq!(parse_identity_header("%%%not base64%%%"), "%%%not base64%%%");
    }

    #[test]
    fn test_parse_strips_rfc8224_parameters() {
        let token = "aaa.bbb.ccc";
        let value = identity_header_value(token, "https://cert.example.com/sp.pem");
        assert_eq!(parse_identity_header(&value), token);
    }

    #[test]
    fn test_extract_tn_forms() {
        assert_eq!(extract_tn("sip:+15145559876@peer.com").as_deref(), Some("+15145559876"));
        assert_eq!(extract_tn("<sip:+15145559876@peer.com>;tag=abc").as_deref(), Some("+15145559876"));
        assert_eq!(
            extract_tn("\"Alice\" <sip:+15145559876@peer.com;user=phone>;tag=1").as_deref(),
            Some("+15145559876")
        );
        assert_eq!(extract_tn("<tel:+15145551234;phone-context=x>").as_deref(), Some("+15145551234"));
        assert_eq!(extract_tn("sip:alice@example.com").as_deref(), Some("alice"));
        assert_eq!(extract_tn("<sip:@example.com>"), None);
        assert_eq!(extract_tn(""), None);
    }
}

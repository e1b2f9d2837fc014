//! Header normalization

use border_sip_message::{headers::expand_compact_name, SipMessage};

/// Header names whose canonical spelling is not plain per-word capitalization
const SPECIAL_SPELLINGS: [&str; 10] = [
    "Call-ID",
    "CSeq",
    "WWW-Authenticate",
    "RAck",
    "RSeq",
    "MIME-Version",
    "Content-ID",
    "SIP-ETag",
    "SIP-If-Match",
    "Min-SE",
];

const STIR_PREFIX: &str = "X-STIR-";

/// Canonical spelling of a header name
///
/// Compact forms are expanded, well-known irregular names keep their RFC
/// spelling, everything else is capitalized per dash-separated word.
pub fn canonical_header_name(name: &str) -> String {
    let name = expand_compact_name(name.trim());

    if let Some(special) = SPECIAL_SPELLINGS.iter().find(|s| s.eq_ignore_ascii_case(name)) {
        return special.to_string();
    }

    if let Some(rest) = name
        .get(..STIR_PREFIX.len())
        .filter(|head| head.eq_ignore_ascii_case(STIR_PREFIX))
        .map(|_| &name[STIR_PREFIX.len()..])
    {
        return format!("{}{}", STIR_PREFIX, capitalize_words(rest));
    }

    capitalize_words(name)
}

fn capitalize_words(name: &str) -> String {
    name.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + &chars.as_str().to_ascii_lowercase(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join("-")
}

/// Rename every header of `msg` to its canonical spelling, in place
pub fn normalize_headers(msg: &mut SipMessage) {
    for header in msg.headers.iter_mut() {
        let canonical = canonical_header_name(&header.name);
        if canonical != header.name {
            header.name = canonical;
        }
    }
}

/// Rewrite `@internal_domain` hosts in a URI value to `@public_domain`
pub fn normalize_uri(value: &str, internal_domain: &str, public_domain: &str) -> String {
    if internal_domain.is_empty() {
        return value.to_string();
    }

    let needle = format!("@{}", internal_domain);
    let mut out = String::with_capacity(value.len());
    let mut rest = value;

    while let Some(pos) = rest.find(&needle) {
        let end = pos + needle.len();
        let whole_host = !rest[end..]
            .chars()
            .next()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-');

        out.push_str(&rest[..pos]);
        if whole_host {
            out.push('@');
            out.push_str(public_domain);
        } else {
            out.push_str(&needle);
        }
        rest = &rest[end..];
    }
    out.push_str(rest);
    out
}

/// Apply [`normalize_uri`] to the From and To headers
pub fn normalize_from_to(msg: &mut SipMessage, internal_domain: &str, public_domain: &str) {
    for header in msg
        .headers
        .iter_mut()
        .filter(|h| h.is("From") || h.is("To"))
    {
        header.value = normalize_uri(&header.value, internal_domain, public_domain);
    }
}

//! Topology hiding
//!
//! Rewrites the headers that would reveal core network hosts to a peer:
//! the top Via, every Contact, Record-Route on responses, and the Server /
//! User-Agent banners. Host rewriting is token based, so a host is either
//! replaced whole or left alone.

use border_sip_message::SipMessage;
use std::net::Ipv4Addr;
use tracing::debug;

use crate::config::TopologyConfig;

/// RFC 3261 magic cookie prefixed to every branch we generate
const BRANCH_COOKIE: &str = "z9hG4bK";

/// Rewrites outgoing messages so internal hosts are not exposed
#[derive(Debug, Clone)]
pub struct TopologyHider {
    config: TopologyConfig,
}

impl TopologyHider {
    pub fn new(config: TopologyConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &TopologyConfig {
        &self.config
    }

    /// Hide internal topology in place
    pub fn hide(&self, msg: &mut SipMessage) {
        self.rewrite_top_via(msg);
        self.rewrite_contacts(msg);

        if msg.is_response() {
            let removed = msg.remove_header("Record-Route");
            if removed > 0 {
                debug!("Stripped {} Record-Route headers", removed);
            }
        }

        self.sanitize_headers(msg);
    }

    /// Replace internal hosts in `value` with the public identity
    pub fn hide_hosts(&self, value: &str) -> String {
        let mut out = String::with_capacity(value.len());
        let mut token = String::new();

        for c in value.chars() {
            if c.is_ascii_alphanumeric() || c == '.' || c == '-' {
                token.push(c);
            } else {
                self.flush_token(&mut token, &mut out);
                out.push(c);
            }
        }
        self.flush_token(&mut token, &mut out);
        out
    }

    fn flush_token(&self, token: &mut String, out: &mut String) {
        if token.is_empty() {
            return;
        }
        let host = token.trim_end_matches('.');
        if self.is_internal_host(host) {
            out.push_str(&self.config.public_identity);
            out.push_str(&token[host.len()..]);
        } else {
            out.push_str(token);
        }
        token.clear();
    }

    fn is_internal_host(&self, host: &str) -> bool {
        if host.is_empty() || host.eq_ignore_ascii_case(&self.config.public_identity) {
            return false;
        }

        if let Ok(ip) = host.parse::<Ipv4Addr>() {
            return ip.is_private();
        }

        let internal = self.config.internal_domain.as_str();
        if internal.is_empty() {
            return false;
        }
        let host = host.to_ascii_lowercase();
        let internal = internal.to_ascii_lowercase();
        host == internal || host.ends_with(&format!(".{}", internal))
    }

    fn rewrite_top_via(&self, msg: &mut SipMessage) {
        let Some(via) = msg.headers.first_mut("Via") else {
            return;
        };

        let (top, rest) = match via.split_once(',') {
            Some((top, rest)) => (top, Some(rest)),
            None => (via.as_str(), None),
        };
        let sent_by = top.split(';').next().unwrap_or_default().trim();

        let mut rewritten = format!(
            "{};branch={}{:016x}",
            self.hide_hosts(sent_by),
            BRANCH_COOKIE,
            rand::random::<u64>()
        );
        if let Some(rest) = rest {
            rewritten.push(',');
            rewritten.push_str(rest);
        }

        debug!("Rewriting top Via from {} to {}", via, rewritten);
        *via = rewritten;
    }

    fn rewrite_contacts(&self, msg: &mut SipMessage) {
        for header in msg.headers.iter_mut().filter(|h| h.is("Contact")) {
            let hidden = self.hide_hosts(&header.value);
            if hidden != header.value {
                debug!("Rewriting Contact from {} to {}", header.value, hidden);
                header.value = hidden;
            }
        }
    }

    fn sanitize_headers(&self, msg: &mut SipMessage) {
        if self.config.strip_server_header && msg.remove_header("Server") > 0 {
            debug!("Stripped Server header");
        }
        if self.config.strip_user_agent && msg.remove_header("User-Agent") > 0 {
            debug!("Stripped User-Agent header");
        }
    }
}

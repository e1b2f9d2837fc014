//! Emergency call detection, PSAP routing and bypass policy
//!
//! Emergency calls must never be dropped by a security control. Detection
//! runs on the Request-URI before admission control, and every later stage
//! asks [`EmergencyPolicy`] whether its own control applies.

use border_sip_message::{Method, SipMessage};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{BorderError, Result};

/// Location headers, in the order they are consulted
const LOCATION_HEADERS: [&str; 3] = ["P-Access-Network-Info", "Geolocation", "Geolocation-Routing"];

/// Requests that can carry an emergency call
const EMERGENCY_METHODS: [Method; 3] = [Method::Invite, Method::Ack, Method::Cancel];

/// An emergency short code and where it routes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmergencyNumber {
    pub number: String,
    pub country: String,
    pub psap_route: String,
    pub priority: u32,
}

impl EmergencyNumber {
    pub fn new(
        number: impl Into<String>,
        country: impl Into<String>,
        psap_route: impl Into<String>,
        priority: u32,
    ) -> Self {
        Self {
            number: number.into(),
            country: country.into(),
            psap_route: psap_route.into(),
            priority,
        }
    }

    /// 911 (US), 112 (EU), 999 (UK) and 000 (AU)
    pub fn defaults() -> Vec<EmergencyNumber> {
        vec![
            EmergencyNumber::new("911", "US", "psap-us", 100),
            EmergencyNumber::new("112", "EU", "psap-eu", 100),
            EmergencyNumber::new("999", "UK", "psap-uk", 100),
            EmergencyNumber::new("000", "AU", "psap-au", 100),
        ]
    }
}

/// Matches dialed numbers against the emergency table
#[derive(Debug, Clone)]
pub struct EmergencyDetector {
    numbers: Vec<EmergencyNumber>,
    /// Indexes into `numbers`, longest code first, then table order
    by_length: Vec<usize>,
}

impl EmergencyDetector {
    pub fn new(numbers: Vec<EmergencyNumber>) -> Self {
        let mut by_length: Vec<usize> = (0..numbers.len()).collect();
        by_length.sort_by(|a, b| numbers[*b].number.len().cmp(&numbers[*a].number.len()).then(a.cmp(b)));
        Self { numbers, by_length }
    }

    pub fn numbers(&self) -> &[EmergencyNumber] {
        &self.numbers
    }

    /// Look up `dialed`, ignoring `- ( ) .` and spaces.
    ///
    /// `+<country code><short code>` (e.g. `+1911`) reduces to the short code.
    /// Other international numbers only match exactly. National numbers match
    /// exactly or by prefix, the longest matching code winning.
    pub fn is_emergency(&self, dialed: &str) -> Option<&EmergencyNumber> {
        let (normalized, international) = self.normalize(dialed);
        if normalized.is_empty() {
            return None;
        }

        let candidates = || self.by_length.iter().map(|&i| &self.numbers[i]);

        if let Some(number) = candidates().find(|n| n.number == normalized) {
            return Some(number);
        }
        if international {
            return None;
        }
        candidates().find(|n| !n.number.is_empty() && normalized.starts_with(n.number.as_str()))
    }

    fn normalize(&self, dialed: &str) -> (String, bool) {
        let cleaned: String = dialed
            .chars()
            .filter(|c| !matches!(c, '-' | '(' | ')' | '.' | ' '))
            .collect();

        let Some(digits) = cleaned.strip_prefix('+') else {
            return (cleaned, false);
        };

        let short_code = self.by_length.iter().map(|&i| &self.numbers[i]).find(|n| {
            let code_len = n.number.len();
            !n.number.is_empty()
                && digits.len() > code_len
                && digits.len() - code_len <= 3
                && digits.ends_with(n.number.as_str())
        });

        match short_code {
            Some(n) => (n.number.clone(), true),
            None => (digits.to_string(), true),
        }
    }
}

impl Default for EmergencyDetector {
    fn default() -> Self {
        Self::new(EmergencyNumber::defaults())
    }
}

/// Number dialed in a Request-URI: scheme stripped, user part, no parameters
pub fn dialed_number(uri: &str) -> &str {
    let uri = uri.trim().trim_start_matches('<').trim_end_matches('>');
    let uri = ["sips:", "sip:", "tel:"]
        .iter()
        .find_map(|scheme| {
            uri.get(..scheme.len())
                .filter(|head| head.eq_ignore_ascii_case(scheme))
                .map(|_| &uri[scheme.len()..])
        })
        .unwrap_or(uri);
    let user = uri.split('@').next().unwrap_or_default();
    user.split(';').next().unwrap_or_default()
}

/// Resolves emergency requests to their PSAP route
#[derive(Debug, Clone, Default)]
pub struct EmergencyRouter {
    detector: EmergencyDetector,
}

impl EmergencyRouter {
    pub fn new(detector: EmergencyDetector) -> Self {
        Self { detector }
    }

    pub fn detector(&self) -> &EmergencyDetector {
        &self.detector
    }

    /// Emergency entry for a call-setup request, if its Request-URI dials one.
    ///
    /// Only INVITE and the ACK / CANCEL of its transaction qualify.
    pub fn classify(&self, msg: &SipMessage) -> Option<&EmergencyNumber> {
        if !EMERGENCY_METHODS.iter().any(|method| msg.is_method(method)) {
            return None;
        }
        msg.uri().and_then(|uri| self.detector.is_emergency(dialed_number(uri)))
    }

    /// PSAP route for an emergency request
    pub fn route_emergency(&self, msg: &SipMessage) -> Result<&str> {
        let dialed = msg.uri().map(dialed_number).unwrap_or_default();
        let number = self
            .detector
            .is_emergency(dialed)
            .ok_or_else(|| BorderError::NotEmergency(dialed.to_string()))?;

        info!(
            number = %dialed,
            emergency = %number.number,
            country = %number.country,
            psap_route = %number.psap_route,
            call_id = msg.call_id().unwrap_or_default(),
            "Emergency call routed"
        );

        Ok(&number.psap_route)
    }
}

/// Per-control bypass decisions for emergency calls.
///
/// Each control is named separately so it can be audited on its own.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmergencyPolicy;

impl EmergencyPolicy {
    pub fn should_bypass_rate_limit(&self, is_emergency: bool) -> bool {
        is_emergency
    }

    pub fn should_bypass_stir(&self, is_emergency: bool) -> bool {
        is_emergency
    }

    pub fn should_bypass_fraud_detection(&self, is_emergency: bool) -> bool {
        is_emergency
    }

    pub fn should_bypass_restrictions(&self, is_emergency: bool) -> bool {
        is_emergency
    }

    pub fn priority(&self, is_emergency: bool) -> u32 {
        if is_emergency {
            1000
        } else {
            100
        }
    }
}

/// Caller location for emergency calls
#[derive(Debug, Clone, Copy, Default)]
pub struct LocationHandler;

impl LocationHandler {
    /// First non-empty location header
    pub fn extract_location<'a>(&self, msg: &'a SipMessage) -> Result<&'a str> {
        LOCATION_HEADERS
            .iter()
            .filter_map(|name| msg.header(name))
            .find(|value| !value.trim().is_empty())
            .ok_or(BorderError::NoLocation)
    }

    /// Write `location` to P-Access-Network-Info unless it is already set
    pub fn preserve_location(&self, msg: &mut SipMessage, location: &str) {
        let present = msg
            .header("P-Access-Network-Info")
            .is_some_and(|value| !value.trim().is_empty());
        if !present {
            msg.set_header("P-Access-Network-Info", location);
        }
    }

    pub fn validate_location(&self, location: &str) -> bool {
        !location.trim().is_empty()
    }

    /// Extract and preserve in one step; warns when nothing is present
    pub fn carry_location(&self, msg: &mut SipMessage) -> Option<String> {
        match self.extract_location(msg) {
            Ok(location) => {
                let location = location.to_string();
                self.preserve_location(msg, &location);
                Some(location)
            }
            Err(e) => {
                warn!(call_id = msg.call_id().unwrap_or_default(), "{} for emergency call", e);
                None
            }
        }
    }
}

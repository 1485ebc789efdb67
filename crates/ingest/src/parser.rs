//! Vendor license-server log line parsing.
//!
//! A line is accepted when it matches the structural skeleton
//! `timestamp level COMPONENT ... action`, in any letter case. License type, user and client IP are
//! pulled out afterwards by independent extractors, each an ordered list of
//! patterns where the first match wins and absence degrades to `"Unknown"`.
//! Parsing never fails: a line that does not fit is simply skipped.

use regex::Regex;

use licarch_core::{Action, LicenseEvent, ParsedEvent, UNKNOWN};

/// `2024/01/15 09:30:00:123 E LICENSE_SVC <free text> Grant`
const LINE_PATTERN: &str = r"(?i)^(\d{4}/\d{2}/\d{2} \d{2}:\d{2}:\d{2}:\d{3})\s+([A-Z])\s+([A-Z_]+)\s+(.*?)(grant|detachment|timeout|not granted)";

/// `!MATLAB!Vendor`, then any `!MATLAB!OTHER ` tag.
const LICENSE_TYPE_PATTERNS: &[&str] = &[r"!(\w+)!Vendor", r"!(\w+)![^!\s]+\s"];

/// `user@host` (optionally after a pipe), then `|user|`.
const USER_PATTERNS: &[&str] = &[r"\|?([A-Za-z0-9_.-]+)@[\w.-]+", r"\|([A-Za-z0-9_.-]+)\|"];

/// First dotted quad anywhere in the line.
const CLIENT_IP_PATTERNS: &[&str] = &[r"(\d{1,3}(?:\.\d{1,3}){3})"];

/// Pluggable vendor grammar: one raw line in, one event or nothing out.
pub trait LineParser: Send + Sync {
    /// Returns `None` for lines that do not describe a license action.
    fn parse(&self, line: &str) -> Option<ParsedEvent>;
}

/// Ordered fallback chain for one optional field.
#[derive(Debug, Clone)]
pub struct FieldExtractor {
    patterns: Vec<Regex>,
}

impl FieldExtractor {
    pub fn new(patterns: &[&str]) -> Result<Self, regex::Error> {
        let patterns = patterns
            .iter()
            .map(|p| Regex::new(p))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// First capture group of the first pattern that matches.
    pub fn extract<'a>(&self, line: &'a str) -> Option<&'a str> {
        self.patterns
            .iter()
            .find_map(|re| re.captures(line).and_then(|c| c.get(1)))
            .map(|m| m.as_str())
    }

    pub fn extract_or_unknown(&self, line: &str) -> String {
        self.extract(line).unwrap_or(UNKNOWN).to_string()
    }
}

/// Default grammar for FlexNet-style license-server logs.
#[derive(Debug, Clone)]
pub struct VendorLogParser {
    line: Regex,
    license_type: FieldExtractor,
    user_name: FieldExtractor,
    client_ip: FieldExtractor,
}

impl VendorLogParser {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            line: Regex::new(LINE_PATTERN)?,
            license_type: FieldExtractor::new(LICENSE_TYPE_PATTERNS)?,
            user_name: FieldExtractor::new(USER_PATTERNS)?,
            client_ip: FieldExtractor::new(CLIENT_IP_PATTERNS)?,
        })
    }

    pub fn license_type(&self, line: &str) -> String {
        self.license_type.extract_or_unknown(line)
    }

    pub fn user_name(&self, line: &str) -> String {
        self.user_name.extract_or_unknown(line)
    }

    pub fn client_ip(&self, line: &str) -> String {
        self.client_ip.extract_or_unknown(line)
    }
}

impl LineParser for VendorLogParser {
    fn parse(&self, line: &str) -> Option<ParsedEvent> {
        let raw_message = line.trim_end_matches(['\n', '\r']);
        let caps = self.line.captures(raw_message)?;

        let action: Action = caps.get(5)?.as_str().parse().ok()?;

        Some(ParsedEvent::new(LicenseEvent {
            timestamp: caps[1].to_string(),
            log_level: caps[2].to_string(),
            component: caps[3].to_string(),
            action,
            license_type: self.license_type(raw_message),
            user_name: self.user_name(raw_message),
            client_ip: self.client_ip(raw_message),
            raw_message: raw_message.to_string(),
        }))
    }
}

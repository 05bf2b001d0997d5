use regex::Regex;

use crate::config::PrivacyConfig;
use crate::models::event::Event;

/// Mandatory pre-call PII redaction pipeline. Built-in classes cover
/// IPv4/IPv6, email, credit-card-shaped digit runs, and SSN-shaped patterns;
/// operator-appended custom regexes run last. Only the outbound LLM payload
/// is redacted — persisted events are untouched.
pub struct PrivacyFilter {
    builtin: Vec<(&'static str, Regex)>,
    custom: Vec<Regex>,
    strip_host_program: bool,
}

impl PrivacyFilter {
    pub fn new(config: &PrivacyConfig) -> Self {
        let builtin = if config.redact_pii {
            vec![
                ("<ipv6>", Regex::new(r"(?i)\b([0-9a-f]{1,4}:){2,7}[0-9a-f]{1,4}\b").unwrap()),
                ("<ipv4>", Regex::new(r"\b\d{1,3}\.\d{1,3}\.\d{1,3}\.\d{1,3}\b").unwrap()),
                ("<email>", Regex::new(r"(?i)\b[a-z0-9._%+-]+@[a-z0-9.-]+\.[a-z]{2,}\b").unwrap()),
                ("<phone>", Regex::new(r"\b\+?\d[\d\-\s]{7,}\d\b").unwrap()),
                ("<url>", Regex::new(r"(?i)\bhttps?://[^\s]+").unwrap()),
                ("<mac>", Regex::new(r"(?i)\b([0-9a-f]{2}:){5}[0-9a-f]{2}\b").unwrap()),
                ("<credit_card>", Regex::new(r"\b(?:\d[ -]?){13,16}\b").unwrap()),
                ("<api_key>", Regex::new(r"(?i)\b(sk|pk|api|key)[-_][A-Za-z0-9]{16,}\b").unwrap()),
                ("<user_path>", Regex::new(r"(?i)(/home/|/Users/|C:\\Users\\)[^\s/\\]+").unwrap()),
                ("<password>", Regex::new(r#"(?i)(password|passwd|pwd)\s*[:=]\s*\S+"#).unwrap()),
            ]
        } else {
            Vec::new()
        };

        let custom = config
            .custom_patterns
            .iter()
            .filter_map(|p| Regex::new(p).ok())
            .collect();

        Self { builtin, custom, strip_host_program: config.strip_host_program }
    }

    pub fn redact_text(&self, text: &str) -> String {
        let mut s = text.to_string();
        for (placeholder, re) in &self.builtin {
            s = re.replace_all(&s, *placeholder).to_string();
        }
        for re in &self.custom {
            s = re.replace_all(&s, "<redacted>").to_string();
        }
        s
    }

    /// Produces a redacted, LLM-payload-only view of an event. Never
    /// mutates the persisted `Event`.
    pub fn redact_event(&self, event: &Event) -> RedactedEvent {
        RedactedEvent {
            id: event.id,
            timestamp: event.timestamp,
            message: self.redact_text(&event.message),
            host: if self.strip_host_program { None } else { event.host.clone() },
            program: if self.strip_host_program { None } else { event.program.clone() },
            severity: event.severity.clone(),
            service: event.service.clone(),
        }
    }
}

/// Live-swappable holder for the active `PrivacyFilter`, so the
/// `/privacy-config` handler's writes are visible to the next scoring/meta
/// call without restarting the process — the same TTL-resolver-backed
/// "callers take read snapshots, writes replace under a short lock"
/// discipline `suppressor.rs` uses for its compiled regex index.
pub struct PrivacyFilterHandle {
    inner: std::sync::RwLock<std::sync::Arc<PrivacyFilter>>,
}

impl PrivacyFilterHandle {
    pub fn new(filter: PrivacyFilter) -> Self {
        Self { inner: std::sync::RwLock::new(std::sync::Arc::new(filter)) }
    }

    pub fn current(&self) -> std::sync::Arc<PrivacyFilter> {
        self.inner.read().unwrap().clone()
    }

    pub fn swap(&self, filter: PrivacyFilter) {
        *self.inner.write().unwrap() = std::sync::Arc::new(filter);
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct RedactedEvent {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub message: String,
    pub host: Option<String>,
    pub program: Option<String>,
    pub severity: Option<String>,
    pub service: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(custom_patterns: Vec<String>) -> PrivacyConfig {
        PrivacyConfig { redact_pii: true, strip_host_program: false, custom_patterns }
    }

    #[test]
    fn redacts_ipv4_and_email() {
        let filter = PrivacyFilter::new(&config(vec![]));
        let redacted = filter.redact_text("connection from 10.1.2.3 by alice@example.com failed");
        assert!(redacted.contains("<ipv4>"));
        assert!(redacted.contains("<email>"));
        assert!(!redacted.contains("alice@example.com"));
    }

    #[test]
    fn disabled_redact_pii_leaves_text_untouched() {
        let mut cfg = config(vec![]);
        cfg.redact_pii = false;
        let filter = PrivacyFilter::new(&cfg);
        let text = "host 10.1.2.3 contacted alice@example.com";
        assert_eq!(filter.redact_text(text), text);
    }

    #[test]
    fn custom_pattern_is_redacted() {
        let filter = PrivacyFilter::new(&config(vec!["SECRET-\\d+".to_string()]));
        let redacted = filter.redact_text("token SECRET-4821 issued");
        assert_eq!(redacted, "token <redacted> issued");
    }

    #[test]
    fn handle_swap_replaces_active_filter() {
        let handle = PrivacyFilterHandle::new(PrivacyFilter::new(&config(vec![])));
        assert!(handle.current().redact_text("alice@example.com").contains("<email>"));

        let mut disabled = config(vec![]);
        disabled.redact_pii = false;
        handle.swap(PrivacyFilter::new(&disabled));
        assert_eq!(handle.current().redact_text("alice@example.com"), "alice@example.com");
    }
}

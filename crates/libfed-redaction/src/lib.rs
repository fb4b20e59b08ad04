//! Credential redaction for log lines and error messages.
//!
//! Adapter errors and health-check failures often wrap text straight from
//! an upstream server (a reqwest error's `Display` impl includes the
//! request URL, an OAuth token endpoint can echo a bearer token back in a
//! 400 body, a misconfigured PAPI URL can carry an API key in the query
//! string). Spec §9's "Credential handling" rule is blunt: logs and API
//! responses must not contain credential values. Rather than audit every
//! call site for what a given upstream might leak, we run a fixed set of
//! patterns over any text before it's logged.
//!
//! This intentionally does not try to be a general-purpose secrets scanner
//! (no file/line tracking, no documentation generation) -- in this crate
//! the only consumers are `tracing` log fields and the CLI's error output.

use regex::{Regex, RegexSet};
use std::sync::LazyLock;

/// One redaction pattern: an identifier (used as the `[REDACTED:id]`
/// placeholder) and the regex that finds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecretPatternDef {
    pub id: &'static str,
    pub regex: &'static str,
}

/// Configuration hook so a caller's config type can add or suppress
/// patterns without this crate depending on `libfed-config`.
pub trait SecretConfigProvider {
    fn extra_secret_patterns(&self) -> &[String];
    fn ignore_secret_patterns(&self) -> &[String];
}

/// Patterns covering the credential shapes this workspace actually hands
/// out: OAuth2 bearer/access tokens (`libfed-adapters` `oauth2_rest`),
/// HMAC request signatures and API keys (`hmac_rest`, `oclc_worldcat`),
/// basic-auth headers, and generic key=value assignments for the env-var
/// names `libfed-config::Settings::resolve_credential` resolves.
pub static DEFAULT_SECRET_PATTERNS: &[SecretPatternDef] = &[
    SecretPatternDef { id: "bearer_token", regex: r"Bearer [A-Za-z0-9._-]{10,}" },
    SecretPatternDef { id: "basic_auth", regex: r"Basic [A-Za-z0-9+/=]{10,}" },
    SecretPatternDef { id: "oauth_token_field", regex: r#"(?i)"?(?:access_token|refresh_token)"?\s*[=:]\s*"?[A-Za-z0-9._-]{10,}"?"# },
    SecretPatternDef { id: "jwt_token", regex: r"eyJ[A-Za-z0-9_-]+\.eyJ[A-Za-z0-9_-]+\.[A-Za-z0-9_-]+" },
    SecretPatternDef { id: "api_key_query_param", regex: r"(?i)[?&](?:key|api_key|wskey|apikey)=[A-Za-z0-9._-]{8,}" },
    SecretPatternDef { id: "hmac_signature_header", regex: r"(?i)PWS [A-Za-z0-9+/=]{10,}" },
    SecretPatternDef { id: "generic_secret_assignment", regex: r"(?i)(?:client_secret|api_secret|password)[=:]\s*\S{6,}" },
];

/// Redacts credential-shaped substrings, replacing each match with
/// `[REDACTED:<pattern_id>]`. Unmatched text, including the surrounding
/// request/response context, passes through unchanged.
#[derive(Debug, Clone)]
pub struct SecretRedactor {
    patterns: Vec<(String, Regex)>,
    set: RegexSet,
}

impl SecretRedactor {
    /// Builds a redactor from [`DEFAULT_SECRET_PATTERNS`] plus whatever a
    /// config type supplies via [`SecretConfigProvider`].
    pub fn new<T: SecretConfigProvider>(config: &T) -> Result<Self, regex::Error> {
        let mut patterns = Vec::new();

        for def in DEFAULT_SECRET_PATTERNS {
            if config.ignore_secret_patterns().iter().any(|p| p == def.id) {
                continue;
            }
            patterns.push((def.id.to_string(), Regex::new(def.regex)?));
        }

        for (idx, pattern) in config.extra_secret_patterns().iter().enumerate() {
            let id = format!("extra_pattern_{idx}");
            patterns.push((id, Regex::new(pattern)?));
        }

        let set = RegexSet::new(patterns.iter().map(|(_, r)| r.as_str()))?;
        Ok(Self { patterns, set })
    }

    /// Replaces every matched credential with `[REDACTED:<pattern_id>]`.
    #[must_use]
    pub fn redact(&self, text: &str) -> String {
        let hits = self.set.matches(text);
        if !hits.matched_any() {
            return text.to_string();
        }

        let mut out = text.to_string();
        for index in hits.iter() {
            let (id, regex) = &self.patterns[index];
            out = regex.replace_all(&out, format!("[REDACTED:{id}]")).to_string();
        }
        out
    }

    #[must_use]
    pub fn pattern_ids(&self) -> Vec<&str> {
        self.patterns.iter().map(|(id, _)| id.as_str()).collect()
    }
}

struct NoExtraPatterns;

impl SecretConfigProvider for NoExtraPatterns {
    fn extra_secret_patterns(&self) -> &[String] {
        &[]
    }
    fn ignore_secret_patterns(&self) -> &[String] {
        &[]
    }
}

static DEFAULT_REDACTOR: LazyLock<SecretRedactor> =
    LazyLock::new(|| SecretRedactor::new(&NoExtraPatterns).expect("default patterns must compile"));

/// Redacts `text` using the built-in pattern set with no extra/ignore
/// configuration. This is what `tracing` call sites reach for -- they
/// don't have access to a configured redactor at the point they log.
#[must_use]
pub fn redact_user_string(text: &str) -> String {
    DEFAULT_REDACTOR.redact(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct TestConfig {
        extra: Vec<String>,
        ignore: Vec<String>,
    }

    impl SecretConfigProvider for TestConfig {
        fn extra_secret_patterns(&self) -> &[String] {
            &self.extra
        }
        fn ignore_secret_patterns(&self) -> &[String] {
            &self.ignore
        }
    }

    #[test]
    fn redacts_bearer_token() {
        let redacted = redact_user_string("request failed: Authorization: Bearer sk-abcdef0123456789");
        assert!(redacted.contains("[REDACTED:bearer_token]"));
        assert!(!redacted.contains("sk-abcdef0123456789"));
    }

    #[test]
    fn redacts_api_key_in_query_string() {
        let redacted = redact_user_string("GET https://example.org/search?wskey=ABCD1234EFGH5678 failed with 403");
        assert!(redacted.contains("[REDACTED:api_key_query_param]"));
        assert!(!redacted.contains("ABCD1234EFGH5678"));
    }

    #[test]
    fn redacts_hmac_signature_header() {
        let redacted = redact_user_string("sending Authorization: PWS abc123XYZ+/=456789");
        assert!(redacted.contains("[REDACTED:hmac_signature_header]"));
    }

    #[test]
    fn leaves_plain_text_untouched() {
        let text = "connection refused to sru.example.org:80";
        assert_eq!(redact_user_string(text), text);
    }

    #[test]
    fn custom_extra_pattern_is_applied() {
        let config = TestConfig { extra: vec![r"CUSTOM-[0-9]{6}".to_string()], ignore: vec![] };
        let redactor = SecretRedactor::new(&config).unwrap();
        let redacted = redactor.redact("token CUSTOM-123456 leaked");
        assert!(redacted.contains("[REDACTED:extra_pattern_0]"));
    }

    #[test]
    fn ignored_pattern_is_skipped() {
        let config = TestConfig { extra: vec![], ignore: vec!["bearer_token".to_string()] };
        let redactor = SecretRedactor::new(&config).unwrap();
        let text = "Authorization: Bearer sk-abcdef0123456789";
        assert_eq!(redactor.redact(text), text);
    }

    #[test]
    fn empty_string_is_unchanged() {
        assert_eq!(redact_user_string(""), "");
    }
}

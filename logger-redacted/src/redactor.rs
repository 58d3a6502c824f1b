use base64::{engine::general_purpose, Engine as _};
use lazy_static::lazy_static;
use regex::{Captures, Regex};
use sha2::{Digest, Sha256};

use crate::LoggerError;

lazy_static! {
    static ref EMAIL_REGEX: Regex = Regex::new(r"\b[A-Za-z0-9._%+-]+@[A-Za-z0-9.-]+\.[A-Za-z]{2,}\b").unwrap();
    static ref PHONE_REGEX: Regex = Regex::new(r"(?:\+1[-.\s]?)?\(?\b[0-9]{3}\)?[-.\s]?[0-9]{3}[-.\s][0-9]{4}\b").unwrap();
    static ref MRN_REGEX: Regex = Regex::new(r"\bMRN[-:]?\s?\d+\b").unwrap();
    static ref PATIENT_NAME_REGEX: Regex = Regex::new(r"\bPatient\s+[A-Z][a-z]+(?:\s+[A-Z][a-z]+)?").unwrap();
}

/// PII redaction configuration
#[derive(Debug, Clone)]
pub struct RedactionConfig {
    pub redact_emails: bool,
    pub redact_phones: bool,
    pub redact_mrns: bool,
    pub redact_patient_names: bool,
    pub hash_for_correlation: bool,
    /// Field names (`patient_id=...`, `"patient_id":"..."`) whose values are masked
    pub sensitive_fields: Vec<String>,
    pub custom_patterns: Vec<(Regex, String)>,
}

impl Default for RedactionConfig {
    fn default() -> Self {
        Self {
            redact_emails: true,
            redact_phones: true,
            redact_mrns: true,
            redact_patient_names: true,
            hash_for_correlation: true,
            sensitive_fields: vec!["patient_id".to_string()],
            custom_patterns: Vec::new(),
        }
    }
}

impl RedactionConfig {
    pub fn with_custom_pattern(mut self, pattern: &str, replacement: &str) -> Result<Self, LoggerError> {
        let regex = Regex::new(pattern).map_err(|e| LoggerError::Pattern(e.to_string()))?;
        self.custom_patterns.push((regex, replacement.to_string()));
        Ok(self)
    }
}

/// PII redactor for log lines
pub struct PiiRedactor {
    config: RedactionConfig,
    field_regex: Option<Regex>,
}

impl PiiRedactor {
    pub fn new(config: RedactionConfig) -> Result<Self, LoggerError> {
        let field_regex = if config.sensitive_fields.is_empty() {
            None
        } else {
            let names = config
                .sensitive_fields
                .iter()
                .map(|name| regex::escape(name))
                .collect::<Vec<_>>()
                .join("|");
            // Matches both `key=value` (fmt) and `"key":"value"` (JSON) renderings
            let pattern = format!(r#"(?P<key>\b(?:{names}))(?P<sep>"?\s*[:=]\s*"?)(?P<val>[^\s",}}]+)"#);
            Some(Regex::new(&pattern).map_err(|e| LoggerError::Pattern(e.to_string()))?)
        };

        Ok(Self { config, field_regex })
    }

    pub fn redact(&self, text: &str) -> String {
        let mut result = text.to_string();

        if let Some(field_regex) = &self.field_regex {
            result = field_regex
                .replace_all(&result, |caps: &Captures| {
                    let value = caps.name("val").map_or("", |m| m.as_str());
                    format!(
                        "{}{}{}",
                        &caps["key"],
                        &caps["sep"],
                        self.mask("ID", value, "[REDACTED]")
                    )
                })
                .to_string();
        }

        if self.config.redact_mrns {
            result = self.replace(&MRN_REGEX, &result, "MRN", "MRN[REDACTED]");
        }

        if self.config.redact_patient_names {
            result = self.replace(&PATIENT_NAME_REGEX, &result, "NAME", "Patient [NAME]");
        }

        if self.config.redact_emails {
            result = self.redact_emails(&result);
        }

        if self.config.redact_phones {
            result = self.replace(&PHONE_REGEX, &result, "PHONE", "(***) ***-****");
        }

        for (pattern, replacement) in &self.config.custom_patterns {
            result = pattern.replace_all(&result, replacement.as_str()).to_string();
        }

        result
    }

    fn replace(&self, regex: &Regex, text: &str, label: &str, mask: &str) -> String {
        regex
            .replace_all(text, |caps: &Captures| self.mask(label, &caps[0], mask))
            .to_string()
    }

    fn redact_emails(&self, text: &str) -> String {
        EMAIL_REGEX
            .replace_all(text, |caps: &Captures| {
                let email = &caps[0];
                if self.config.hash_for_correlation {
                    format!("EMAIL[{}]", self.hash_value(email))
                } else {
                    match email.split_once('@') {
                        Some((local, domain)) => format!(
                            "{}***@{}***",
                            local.chars().next().unwrap_or('*'),
                            domain.chars().next().unwrap_or('*')
                        ),
                        None => "***@***".to_string(),
                    }
                }
            })
            .to_string()
    }

    fn mask(&self, label: &str, value: &str, mask: &str) -> String {
        if self.config.hash_for_correlation {
            format!("{label}[{}]", self.hash_value(value))
        } else {
            mask.to_string()
        }
    }

    fn hash_value(&self, value: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(value.as_bytes());
        let digest = hasher.finalize();
        // First 8 bytes keep the tag short
        general_purpose::STANDARD.encode(digest.get(..8).unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn masking_redactor() -> PiiRedactor {
        PiiRedactor::new(RedactionConfig {
            hash_for_correlation: false,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn test_structured_patient_id_redaction() {
        let redactor = masking_redactor();

        let fmt_line = "INFO vitals_engine::merger: resolved patient_id=P-1042 device_id=D7";
        let redacted = redactor.redact(fmt_line);
        assert!(redacted.contains("patient_id=[REDACTED]"));
        assert!(redacted.contains("device_id=D7"));

        let json_line = r#"{"msg":"resolved","patient_id":"P-1042","device_id":"D7"}"#;
        let redacted = redactor.redact(json_line);
        assert!(redacted.contains(r#""patient_id":"[REDACTED]""#));
        assert!(!redacted.contains("P-1042"));
    }

    #[test]
    fn test_mrn_and_name_redaction() {
        let redactor = masking_redactor();

        let redacted = redactor.redact("Patient John Smith (MRN123456) flagged");
        assert!(redacted.contains("Patient [NAME]"));
        assert!(redacted.contains("MRN[REDACTED]"));
        assert!(!redacted.contains("Smith"));
    }

    #[test]
    fn test_email_redaction() {
        let redactor = masking_redactor();

        let redacted = redactor.redact("Escalated to john.doe@example.com");
        assert!(redacted.contains("j***@e***"));
    }

    #[test]
    fn test_phone_redaction() {
        let redactor = masking_redactor();

        let redacted = redactor.redact("Call ward at (555) 123-4567");
        assert!(redacted.contains("(***) ***-****"));
    }

    #[test]
    fn test_hashing_is_stable_for_correlation() {
        let redactor = PiiRedactor::new(RedactionConfig::default()).unwrap();

        let first = redactor.redact("patient_id=P-1042");
        let second = redactor.redact("patient_id=P-1042");
        let other = redactor.redact("patient_id=P-2000");

        assert_eq!(first, second);
        assert_ne!(first, other);
        assert!(first.starts_with("patient_id=ID["));
    }

    #[test]
    fn test_custom_pattern() {
        let config = RedactionConfig {
            hash_for_correlation: false,
            ..Default::default()
        }
        .with_custom_pattern(r"\bBED-\d+\b", "BED-[X]")
        .unwrap();
        let redactor = PiiRedactor::new(config).unwrap();

        assert_eq!(redactor.redact("moved to BED-12"), "moved to BED-[X]");
    }
}

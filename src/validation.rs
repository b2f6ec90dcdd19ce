//! Input validators shared by services.
//!
//! Validators push into a `Validator` so a request reports every bad field
//! at once.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::error::{CrmError, CrmResult, FieldError};

static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("valid email regex")
});
static PHONE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\+?[0-9 ()\-.]{5,32}$").expect("valid phone regex"));
static SLUG_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9][a-z0-9\-]{1,38}[a-z0-9]$").expect("valid slug regex"));
static CURRENCY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z]{3}$").expect("valid currency regex"));

pub const MAX_TAGS: usize = 20;
pub const MAX_TAG_LEN: usize = 32;

/// Collects field errors.
#[derive(Debug, Default)]
pub struct Validator {
    errors: Vec<FieldError>,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, field: &str, message: impl Into<String>) {
        self.errors.push(FieldError::new(field, message));
    }

    pub fn check(&mut self, ok: bool, field: &str, message: &str) {
        if !ok {
            self.error(field, message);
        }
    }

    /// Trimmed, non-empty, at most `max` characters.
    pub fn required_text(&mut self, field: &str, value: &str, max: usize) -> String {
        let value = value.trim();
        if value.is_empty() {
            self.error(field, "is required");
        } else if value.chars().count() > max {
            self.error(field, format!("must be at most {max} characters"));
        }
        value.to_string()
    }

    /// Trimmed; empty becomes `None`.
    pub fn optional_text(&mut self, field: &str, value: Option<&str>, max: usize) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        if value.chars().count() > max {
            self.error(field, format!("must be at most {max} characters"));
        }
        Some(value.to_string())
    }

    pub fn email(&mut self, field: &str, value: &str) -> String {
        let value = normalize_email(value);
        if !is_valid_email(&value) {
            self.error(field, "is not a valid email address");
        }
        value
    }

    pub fn optional_email(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        Some(self.email(field, value))
    }

    pub fn optional_phone(&mut self, field: &str, value: Option<&str>) -> Option<String> {
        let value = value.map(str::trim).filter(|v| !v.is_empty())?;
        if !PHONE_RE.is_match(value) {
            self.error(field, "is not a valid phone number");
        }
        Some(value.to_string())
    }

    pub fn tags(&mut self, field: &str, tags: &[String]) -> Vec<String> {
        let tags = normalize_tags(tags);
        if tags.len() > MAX_TAGS {
            self.error(field, format!("at most {MAX_TAGS} tags are allowed"));
        }
        if tags.iter().any(|t| t.chars().count() > MAX_TAG_LEN) {
            self.error(field, format!("tags must be at most {MAX_TAG_LEN} characters"));
        }
        tags
    }

    pub fn finish(self) -> CrmResult<()> {
        if self.errors.is_empty() {
            Ok(())
        } else {
            Err(CrmError::Validation(self.errors))
        }
    }
}

pub fn normalize_email(value: &str) -> String {
    value.trim().to_lowercase()
}

pub fn is_valid_email(value: &str) -> bool {
    value.len() <= 254 && EMAIL_RE.is_match(value)
}

pub fn is_valid_slug(value: &str) -> bool {
    SLUG_RE.is_match(value)
}

pub fn is_valid_currency(value: &str) -> bool {
    CURRENCY_RE.is_match(value)
}

/// Lowercase, trim, drop empties and duplicates, keep first-seen order.
pub fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for tag in tags {
        let tag = tag.trim().to_lowercase();
        if !tag.is_empty() && !out.contains(&tag) {
            out.push(tag);
        }
    }
    out
}

/// Strip path components and control characters from an uploaded name.
pub fn sanitize_filename(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default();
    let cleaned: String = base
        .chars()
        .filter(|c| !c.is_control())
        .collect::<String>()
        .trim()
        .trim_start_matches('.')
        .chars()
        .take(120)
        .collect();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned
    }
}

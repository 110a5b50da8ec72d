//! Field-level request validation.
//!
//! A [`Validator`] collects at most one message per field. Handlers run all
//! checks for a request, then call [`Validator::finish`] before touching the
//! database; a non-empty collection becomes [`AppError::Validation`].

use regex::Regex;
use serde::Serialize;
use std::{collections::BTreeMap, sync::LazyLock};

use crate::error::AppError;

static EMAIL_RX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?(?:\.[a-zA-Z0-9](?:[a-zA-Z0-9-]{0,61}[a-zA-Z0-9])?)*$",
    )
    .expect("email regex is valid")
});

/// Per-field validation messages, serialized as a JSON object.
#[derive(Debug, Default, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<&'static str, String>);

impl ValidationErrors {
    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `message` for `field` unless the field already has one.
    pub fn add_error(&mut self, field: &'static str, message: &str) {
        self.errors
            .0
            .entry(field)
            .or_insert_with(|| message.to_string());
    }

    pub fn check(&mut self, ok: bool, field: &'static str, message: &str) {
        if !ok {
            self.add_error(field, message);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn finish(self) -> Result<(), AppError> {
        if self.is_valid() {
            Ok(())
        } else {
            Err(AppError::Validation(self.errors))
        }
    }

    // Shared checks used by several resources.

    pub fn check_required_text(&mut self, value: &str, field: &'static str, max_chars: usize) {
        self.check(!value.trim().is_empty(), field, "must be provided");
        self.check(
            value.chars().count() <= max_chars,
            field,
            &format!("must not be more than {max_chars} characters long"),
        );
    }

    pub fn check_email(&mut self, email: &str) {
        self.check(!email.is_empty(), "email", "must be provided");
        self.check(
            EMAIL_RX.is_match(email),
            "email",
            "must be a valid email address",
        );
    }

    pub fn check_permitted(&mut self, value: &str, permitted: &[&str], field: &'static str) {
        self.check(
            permitted_value(value, permitted),
            field,
            &format!("must be one of: {}", permitted.join(", ")),
        );
    }

    pub fn check_range<T: PartialOrd + std::fmt::Display>(
        &mut self,
        value: T,
        min: T,
        max: T,
        field: &'static str,
    ) {
        self.check(
            value >= min && value <= max,
            field,
            &format!("must be between {min} and {max}"),
        );
    }
}

/// A validation failure on one field, for checks that need the database.
pub fn field_error(field: &'static str, message: &str) -> AppError {
    let mut errors = ValidationErrors::default();
    errors.0.insert(field, message.to_string());
    AppError::Validation(errors)
}

pub fn permitted_value<T: PartialEq + ?Sized>(value: &T, permitted: &[&T]) -> bool {
    permitted.iter().any(|p| *p == value)
}

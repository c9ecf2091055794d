//! Field-level request validation shared by every JSON handler.
//!
//! Handlers deserialize into structs of optional fields and run them through [`FieldErrors`],
//! so a missing field produces the same `{ field: [messages] }` detail as an out-of-range one.

use std::collections::BTreeMap;
use std::fmt::Display;

use serde::Serialize;

use crate::errors::AppError;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    /// Present, not blank, and between `min` and `max` characters.
    pub fn required_text(
        &mut self,
        field: &str,
        value: Option<&str>,
        min: usize,
        max: usize,
    ) -> String {
        match value {
            Some(text) if !text.trim().is_empty() => {
                let len = text.chars().count();
                if len < min {
                    self.add(field, format!("The {field} must be at least {min} characters."));
                } else if len > max {
                    self.add(
                        field,
                        format!("The {field} must not be greater than {max} characters."),
                    );
                }
                text.to_string()
            }
            _ => {
                self.add(field, format!("The {field} field is required."));
                String::new()
            }
        }
    }

    pub fn optional_text(&mut self, field: &str, value: Option<&str>, max: usize) {
        if let Some(text) = value {
            if text.chars().count() > max {
                self.add(
                    field,
                    format!("The {field} must not be greater than {max} characters."),
                );
            }
        }
    }

    pub fn range<T>(&mut self, field: &str, value: Option<T>, min: T, max: T)
    where
        T: PartialOrd + Display + Copy,
    {
        if let Some(value) = value {
            if value < min || value > max {
                self.add(field, format!("The {field} must be between {min} and {max}."));
            }
        }
    }

    /// Parses an optional enumerated value; anything outside `parse`'s domain is recorded.
    pub fn one_of<T, F>(&mut self, field: &str, value: Option<&str>, parse: F) -> Option<T>
    where
        F: Fn(&str) -> Option<T>,
    {
        let raw = value?;
        let parsed = parse(raw);
        if parsed.is_none() {
            self.add(field, format!("The selected {field} is invalid."));
        }
        parsed
    }

    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Validation(self))
        }
    }
}

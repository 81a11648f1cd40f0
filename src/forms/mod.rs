//! Form submission workflow.
//!
//! Every form follows the same path: validate locally, geotag, call the API,
//! then map the result to a navigation, a notification or an inline error.
//! Nothing here returns `Err`; every failure becomes an `Outcome`.
//!
//! Location is required for every form. If it cannot be determined the
//! submission stops before the API is called.

pub mod login;
pub mod register;
pub mod report;
pub mod validation;

use crate::api::server_message;
use crate::geo::Locator;
use crate::guard::Route;
use crate::models::Location;
use crate::notify::Notice;

pub const LOCATION_UNAVAILABLE: &str =
    "Unable to determine your location. Please allow location access and try again.";

/// An input the user fills in
#[derive(Debug, Clone, Copy)]
pub struct Field {
    pub name: &'static str,
    pub label: &'static str,
    /// Input is masked when prompted
    pub secret: bool,
    pub hint: Option<&'static str>,
}

impl Field {
    pub const fn text(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            secret: false,
            hint: None,
        }
    }

    pub const fn secret(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            secret: true,
            hint: None,
        }
    }

    pub const fn with_hint(mut self, hint: &'static str) -> Self {
        self.hint = Some(hint);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    pub field: &'static str,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &'static str, message: impl Into<String>) -> Self {
        Self {
            field,
            message: message.into(),
        }
    }
}

impl std::fmt::Display for FieldError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    /// Local validation failed; nothing was sent
    Invalid(Vec<FieldError>),
    /// Inline error message
    Failed(String),
    /// Navigate, optionally announcing something first
    Redirect(Route, Option<Notice>),
    /// Stay on the form
    Submitted(Notice),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Redirect(..) | Self::Submitted(_))
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            Self::Failed(m) => Some(m),
            Self::Submitted(n) => Some(&n.message),
            Self::Redirect(_, n) => n.as_ref().map(|n| n.message.as_str()),
            Self::Invalid(_) => None,
        }
    }
}

pub trait Form {
    /// Short name used in logs
    fn name(&self) -> &'static str;
    fn fields(&self) -> &'static [Field];
    /// Returns false for an unknown field
    fn set(&mut self, field: &str, value: &str) -> bool;
    /// Whether `field` should be asked for given what is filled in so far
    fn wants(&self, _field: &str) -> bool {
        true
    }
    fn validate(&self) -> Vec<FieldError>;
}

/// Message to show for a failed API call
fn failure_message(err: &anyhow::Error, generic: &str) -> String {
    server_message(err)
        .map(String::from)
        .unwrap_or_else(|| generic.to_string())
}

fn locate(locator: &dyn Locator) -> Result<Location, String> {
    locator
        .locate()
        .map_err(|_| LOCATION_UNAVAILABLE.to_string())
}

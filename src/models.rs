//! Domain records shared by the API client and the views.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A point on the map
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct Location {
    pub lat: f64,
    pub lng: f64,
}

impl Location {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Whether both coordinates are within their valid ranges
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }
}

impl std::fmt::Display for Location {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.5}, {:.5}", self.lat, self.lng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    #[default]
    #[serde(other)]
    User,
}

impl Role {
    pub fn parse(s: &str) -> Self {
        match s {
            "admin" => Self::Admin,
            _ => Self::User,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::User => "user",
        }
    }
}

/// A registered account as returned by the admin endpoints
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub institution: String,
    pub location: Option<Location>,
    #[serde(default)]
    pub mobile_number: String,
    #[serde(default)]
    pub designation: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_blocked: bool,
}

impl User {
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Report causes offered by the report form
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cause {
    MedicalEmergency,
    FinancialHelp,
    FoodAssistance,
    Other,
}

impl Cause {
    pub const ALL: [Cause; 4] = [
        Cause::MedicalEmergency,
        Cause::FinancialHelp,
        Cause::FoodAssistance,
        Cause::Other,
    ];

    /// Parse either the display label or a 1-based menu index
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if let Ok(idx) = s.parse::<usize>() {
            return Self::ALL.get(idx.checked_sub(1)?).copied();
        }
        Self::ALL
            .into_iter()
            .find(|c| c.label().eq_ignore_ascii_case(s))
    }

    pub fn label(&self) -> &'static str {
        match self {
            Self::MedicalEmergency => "Medical Emergency",
            Self::FinancialHelp => "Financial Help",
            Self::FoodAssistance => "Food Assistance",
            Self::Other => "Other",
        }
    }
}

/// A submitted emergency/help request
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    #[serde(alias = "_id")]
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub mobile_number: String,
    #[serde(default)]
    pub address: String,
    #[serde(default)]
    pub cause: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub other_cause: Option<String>,
    pub location: Location,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub is_solved: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solution: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub solver_name: Option<String>,
}

impl Report {
    /// Cause text for display, preferring the free-text cause for "Other"
    pub fn cause_label(&self) -> &str {
        match &self.other_cause {
            Some(other) if self.cause == Cause::Other.label() && !other.is_empty() => other,
            _ => &self.cause,
        }
    }
}

use super::{failure_message, locate, validation, Field, FieldError, Form, Outcome};
use crate::api::{ApiClient, NewReport};
use crate::geo::Locator;
use crate::models::{Cause, Location};
use crate::notify::Notice;

const FIELDS: &[Field] = &[
    Field::text("name", "Name"),
    Field::text("mobileNumber", "Mobile Number").with_hint("11 digits"),
    Field::text("address", "Address"),
    Field::text("cause", "Cause").with_hint(
        "1) Medical Emergency  2) Financial Help  3) Food Assistance  4) Other",
    ),
    Field::text("otherCause", "Describe the cause"),
];

#[derive(Debug, Clone, Default)]
pub struct ReportForm {
    pub name: String,
    pub mobile_number: String,
    pub address: String,
    pub cause: String,
    pub other_cause: String,
}

impl Form for ReportForm {
    fn name(&self) -> &'static str {
        "report"
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn set(&mut self, field: &str, value: &str) -> bool {
        let slot = match field {
            "name" => &mut self.name,
            "mobileNumber" => &mut self.mobile_number,
            "address" => &mut self.address,
            "cause" => &mut self.cause,
            "otherCause" => &mut self.other_cause,
            _ => return false,
        };
        *slot = value.to_string();
        true
    }

    fn wants(&self, field: &str) -> bool {
        field != "otherCause" || self.selected_cause() == Some(Cause::Other)
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        validation::required(&mut errors, "name", &self.name, "Name is required");
        validation::mobile_number(&mut errors, "mobileNumber", &self.mobile_number);
        validation::required(&mut errors, "address", &self.address, "Address is required");
        match self.selected_cause() {
            None => errors.push(FieldError::new("cause", "Please select a cause")),
            Some(Cause::Other) => {
                validation::required(
                    &mut errors,
                    "otherCause",
                    &self.other_cause,
                    "Please describe the cause",
                );
            }
            Some(_) => {}
        }
        errors
    }
}

impl ReportForm {
    pub fn selected_cause(&self) -> Option<Cause> {
        Cause::parse(&self.cause)
    }

    fn to_request(&self, location: Location) -> Option<NewReport> {
        let cause = self.selected_cause()?;
        let other_cause = (cause == Cause::Other).then(|| self.other_cause.trim().to_string());
        Some(NewReport {
            name: self.name.trim().to_string(),
            mobile_number: self.mobile_number.trim().to_string(),
            address: self.address.trim().to_string(),
            location,
            cause: cause.label().to_string(),
            other_cause,
        })
    }

    /// Submit and, on success, clear the form for the next report
    pub fn submit(&mut self, api: &dyn ApiClient, locator: &dyn Locator) -> Outcome {
        let errors = self.validate();
        if !errors.is_empty() {
            return Outcome::Invalid(errors);
        }

        let location = match locate(locator) {
            Ok(loc) => loc,
            Err(msg) => return Outcome::Failed(msg),
        };

        let Some(request) = self.to_request(location) else {
            return Outcome::Invalid(vec![FieldError::new("cause", "Please select a cause")]);
        };

        match api.submit_report(&request) {
            Ok(_) => {
                *self = Self::default();
                Outcome::Submitted(Notice::success("Report submitted successfully!"))
            }
            Err(e) => Outcome::Failed(failure_message(&e, "Failed to submit report")),
        }
    }
}

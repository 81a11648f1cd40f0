use super::{failure_message, locate, validation, Field, FieldError, Form, Outcome};
use crate::api::{ApiClient, RegisterRequest};
use crate::geo::Locator;
use crate::guard::Route;
use crate::models::Location;
use crate::notify::Notice;

const FIELDS: &[Field] = &[
    Field::text("name", "Name"),
    Field::text("email", "Email"),
    Field::secret("password", "Password"),
    Field::secret("confirmPassword", "Confirm Password"),
    Field::text("designation", "Designation"),
    Field::text("institution", "Institution"),
    Field::text("mobileNumber", "Mobile Number").with_hint("11 digits"),
];

#[derive(Debug, Clone, Default)]
pub struct RegistrationForm {
    pub name: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
    pub designation: String,
    pub institution: String,
    pub mobile_number: String,
}

impl Form for RegistrationForm {
    fn name(&self) -> &'static str {
        "register"
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn set(&mut self, field: &str, value: &str) -> bool {
        let slot = match field {
            "name" => &mut self.name,
            "email" => &mut self.email,
            "password" => &mut self.password,
            "confirmPassword" => &mut self.confirm_password,
            "designation" => &mut self.designation,
            "institution" => &mut self.institution,
            "mobileNumber" => &mut self.mobile_number,
            _ => return false,
        };
        *slot = value.to_string();
        true
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        validation::required(&mut errors, "name", &self.name, "Name is required");
        validation::email(&mut errors, "email", &self.email);
        validation::password(&mut errors, "password", &self.password);
        if validation::required(
            &mut errors,
            "confirmPassword",
            &self.confirm_password,
            "Confirm password is required",
        ) && self.confirm_password != self.password
        {
            errors.push(FieldError::new("confirmPassword", "Passwords do not match"));
        }
        validation::required(
            &mut errors,
            "designation",
            &self.designation,
            "Designation is required",
        );
        validation::required(
            &mut errors,
            "institution",
            &self.institution,
            "Institution is required",
        );
        validation::mobile_number(&mut errors, "mobileNumber", &self.mobile_number);
        errors
    }
}

impl RegistrationForm {
    fn to_request(&self, location: Location) -> RegisterRequest {
        RegisterRequest {
            name: self.name.trim().to_string(),
            email: self.email.trim().to_string(),
            password: self.password.clone(),
            designation: self.designation.trim().to_string(),
            location,
            institution: self.institution.trim().to_string(),
            mobile_number: self.mobile_number.trim().to_string(),
        }
    }

    /// New accounts start unverified; success sends the user to login
    pub fn submit(&self, api: &dyn ApiClient, locator: &dyn Locator) -> Outcome {
        let errors = self.validate();
        if !errors.is_empty() {
            return Outcome::Invalid(errors);
        }

        let location = match locate(locator) {
            Ok(loc) => loc,
            Err(msg) => return Outcome::Failed(msg),
        };

        match api.register(&self.to_request(location)) {
            Ok(_) => Outcome::Redirect(
                Route::Login,
                Some(Notice::success("Registration successful!")),
            ),
            Err(e) => Outcome::Failed(failure_message(&e, "Something went wrong!")),
        }
    }
}

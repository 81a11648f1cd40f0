use super::{failure_message, locate, validation, Field, FieldError, Form, Outcome};
use crate::api::{ApiClient, LoginRequest, LoginResponse};
use crate::events::{EventBus, SessionEvent};
use crate::geo::Locator;
use crate::guard::Route;
use crate::models::Role;
use crate::session::SessionContext;

const FIELDS: &[Field] = &[
    Field::text("email", "Email"),
    Field::secret("password", "Password"),
];

#[derive(Debug, Clone, Default)]
pub struct LoginForm {
    pub email: String,
    pub password: String,
}

impl Form for LoginForm {
    fn name(&self) -> &'static str {
        "login"
    }

    fn fields(&self) -> &'static [Field] {
        FIELDS
    }

    fn set(&mut self, field: &str, value: &str) -> bool {
        match field {
            "email" => self.email = value.to_string(),
            "password" => self.password = value.to_string(),
            _ => return false,
        }
        true
    }

    fn validate(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();
        validation::email(&mut errors, "email", &self.email);
        validation::required(
            &mut errors,
            "password",
            &self.password,
            "Password is required",
        );
        errors
    }
}

/// Where a freshly signed-in user lands
pub fn landing_route(login: &LoginResponse) -> Route {
    if login.role == Role::Admin {
        Route::Dashboard
    } else if !login.is_verified {
        Route::NotVerified
    } else {
        Route::Profile
    }
}

impl LoginForm {
    pub fn submit(
        &self,
        api: &dyn ApiClient,
        locator: &dyn Locator,
        sessions: &SessionContext,
        bus: &EventBus,
    ) -> Outcome {
        let errors = self.validate();
        if !errors.is_empty() {
            return Outcome::Invalid(errors);
        }

        let location = match locate(locator) {
            Ok(loc) => loc,
            Err(msg) => return Outcome::Failed(msg),
        };

        let email = self.email.trim().to_string();
        let request = LoginRequest {
            email: email.clone(),
            password: self.password.clone(),
            latitude: location.lat,
            longitude: location.lng,
        };

        let login = match api.login(&request) {
            Ok(login) => login,
            Err(e) => return Outcome::Failed(failure_message(&e, "Invalid credentials!")),
        };

        if let Err(e) = sessions.sign_in(&email, &login) {
            return Outcome::Failed(format!("Could not save session: {}", e));
        }
        api.set_token(Some(&login.token));
        bus.publish(SessionEvent::SignedIn { email });

        Outcome::Redirect(landing_route(&login), None)
    }
}

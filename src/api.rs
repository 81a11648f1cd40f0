use crate::models::{Location, Report, Role, User};
use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cell::RefCell;
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
    pub designation: String,
    pub location: Location,
    pub institution: String,
    pub mobile_number: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
    pub latitude: f64,
    pub longitude: f64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub is_verified: bool,
    #[serde(default)]
    pub is_blocked: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessageResponse {
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UsersResponse {
    #[serde(default)]
    users: Vec<User>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockUpdate {
    pub is_blocked: bool,
    pub is_verified: bool,
}

impl BlockUpdate {
    /// Flip the block flag; verification is the inverse of the new block state
    pub fn toggle(currently_blocked: bool) -> Self {
        Self {
            is_blocked: !currently_blocked,
            is_verified: currently_blocked,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReportsResponse {
    #[serde(default)]
    pub all_reports: Vec<Report>,
    /// Either an array of reports or a bare count, depending on server version
    #[serde(default, rename = "last24HoursReports")]
    pub last_24_hours_reports: Value,
    #[serde(default)]
    pub all_reports_count: Option<u64>,
}

impl ReportsResponse {
    pub fn total(&self) -> u64 {
        self.all_reports_count
            .unwrap_or(self.all_reports.len() as u64)
    }

    pub fn last_24_hours(&self) -> u64 {
        match &self.last_24_hours_reports {
            Value::Array(items) => items.len() as u64,
            Value::Number(n) => n.as_u64().unwrap_or(0),
            _ => 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReport {
    pub name: String,
    pub mobile_number: String,
    pub address: String,
    pub location: Location,
    pub cause: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub other_cause: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SolveUpdate {
    pub is_solved: bool,
    pub solution: String,
    pub solver_name: String,
}

/// A failed API call: HTTP status (if any) plus the server's message (if any)
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: Option<u16>,
    pub message: Option<String>,
    pub detail: String,
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.status {
            Some(code) => write!(f, "API error {}: {}", code, self.detail),
            None => write!(f, "Request failed: {}", self.detail),
        }
    }
}

impl std::error::Error for ApiError {}

/// The server-provided message carried by an API failure, if any
pub fn server_message(err: &anyhow::Error) -> Option<&str> {
    err.downcast_ref::<ApiError>()
        .and_then(|e| e.message.as_deref())
        .filter(|m| !m.trim().is_empty())
}

/// Accept any 2xx body unless it explicitly reports `success: false`
pub(crate) fn check_success(body: &str) -> Result<()> {
    let value: Value = serde_json::from_str(body).unwrap_or(Value::Null);
    if value.get("success").and_then(Value::as_bool) == Some(false) {
        let message = value
            .get("message")
            .and_then(Value::as_str)
            .map(String::from);
        return Err(ApiError {
            status: None,
            detail: message
                .clone()
                .unwrap_or_else(|| "server reported failure".to_string()),
            message,
        }
        .into());
    }
    Ok(())
}

/// Percent-encode a single path segment (emails, report ids)
pub(crate) fn encode_segment(segment: &str) -> String {
    let mut out = String::with_capacity(segment.len());
    for b in segment.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~' | b'@' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

/// Remote platform API; a trait so views can be exercised against a mock
pub trait ApiClient {
    /// Attach (or drop) the bearer token used on subsequent calls
    fn set_token(&self, _token: Option<&str>) {}
    fn register(&self, request: &RegisterRequest) -> Result<MessageResponse>;
    fn login(&self, request: &LoginRequest) -> Result<LoginResponse>;
    fn users(&self) -> Result<Vec<User>>;
    fn verify_user(&self, email: &str) -> Result<()>;
    fn block_user(&self, email: &str, update: &BlockUpdate) -> Result<()>;
    fn delete_user(&self, email: &str) -> Result<()>;
    fn reports(&self) -> Result<ReportsResponse>;
    /// Returns the created report when the server echoes it back
    fn submit_report(&self, report: &NewReport) -> Result<Option<Report>>;
    fn solve_report(&self, id: &str, update: &SolveUpdate) -> Result<()>;
}

pub struct Client {
    base_url: String,
    token: RefCell<Option<String>>,
    agent: ureq::Agent,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            token: RefCell::new(None),
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
        }
    }

    fn request(&self, method: &str, path: &str) -> ureq::Request {
        let url = format!("{}{}", self.base_url, path);
        let req = self
            .agent
            .request(method, &url)
            .set("Accept", "application/json");
        match self.token.borrow().as_deref() {
            Some(token) => req.set("Authorization", &format!("Bearer {}", token)),
            None => req,
        }
    }

    /// Run a request and return the raw success body
    fn send(&self, method: &str, path: &str, body: Option<Value>) -> Result<String> {
        let req = self.request(method, path);
        let resp = match body {
            Some(body) => req.send_json(body),
            None => req.call(),
        };

        match resp {
            Ok(r) => Ok(r.into_string()?),
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                let message = serde_json::from_str::<MessageResponse>(&body)
                    .ok()
                    .and_then(|m| m.message);
                Err(ApiError {
                    status: Some(code),
                    message,
                    detail: body,
                }
                .into())
            }
            Err(e) => Err(ApiError {
                status: None,
                message: None,
                detail: e.to_string(),
            }
            .into()),
        }
    }

    fn send_json<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        path: &str,
        body: Option<Value>,
    ) -> Result<T> {
        let text = self.send(method, path, body)?;
        serde_json::from_str(&text)
            .map_err(|e| anyhow!("Unexpected response from {} {}: {}", method, path, e))
    }
}

impl ApiClient for Client {
    fn set_token(&self, token: Option<&str>) {
        *self.token.borrow_mut() = token.map(String::from);
    }

    fn register(&self, request: &RegisterRequest) -> Result<MessageResponse> {
        let text = self.send("POST", "/register", Some(serde_json::to_value(request)?))?;
        Ok(serde_json::from_str(&text).unwrap_or_default())
    }

    fn login(&self, request: &LoginRequest) -> Result<LoginResponse> {
        self.send_json("POST", "/login", Some(serde_json::to_value(request)?))
    }

    fn users(&self) -> Result<Vec<User>> {
        let resp: UsersResponse = self.send_json("GET", "/admin/users", None)?;
        Ok(resp.users)
    }

    fn verify_user(&self, email: &str) -> Result<()> {
        let path = format!("/admin/verify-user/{}", encode_segment(email));
        check_success(&self.send("PATCH", &path, None)?)
    }

    fn block_user(&self, email: &str, update: &BlockUpdate) -> Result<()> {
        let path = format!("/admin/block-user/{}", encode_segment(email));
        check_success(&self.send("PATCH", &path, Some(serde_json::to_value(update)?))?)
    }

    fn delete_user(&self, email: &str) -> Result<()> {
        let body = serde_json::json!({ "email": email });
        check_success(&self.send("DELETE", "/admin/users", Some(body))?)
    }

    fn reports(&self) -> Result<ReportsResponse> {
        self.send_json("GET", "/reports", None)
    }

    fn submit_report(&self, report: &NewReport) -> Result<Option<Report>> {
        let text = self.send("POST", "/reports", Some(serde_json::to_value(report)?))?;
        let value: Value = serde_json::from_str(&text).unwrap_or(Value::Null);
        let created = serde_json::from_value::<Report>(value.clone())
            .ok()
            .or_else(|| serde_json::from_value::<Report>(value["report"].clone()).ok());
        Ok(created)
    }

    fn solve_report(&self, id: &str, update: &SolveUpdate) -> Result<()> {
        let path = format!("/reports/{}", encode_segment(id));
        check_success(&self.send("PATCH", &path, Some(serde_json::to_value(update)?))?)
    }
}

use crate::config::ClientConfig;
use crate::types::{Role, ScoreReport, TestPayload};
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, Response, Url};
use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

/// Backend endpoint semantics. Paths are relative to the configured API base
/// so the client and the backend never drift.
pub const USER_TYPE_PATH: &str = "userType";
pub const TEST_PATH: &str = "test";
pub const SUBMIT_PATH: &str = "submitTest";

pub const LOGIN_FALLBACK: &str = "Unable to login. Please try again.";
pub const FETCH_FALLBACK: &str = "Unable to fetch test questions";
pub const SUBMIT_FALLBACK: &str = "Failed to submit test results";

/// A failure at the backend boundary. The message is shown to the user as is.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Rejected(String),

    #[error("{0}")]
    Transport(String),

    #[error("invalid API url: {0}")]
    InvalidUrl(String),

    #[error("unexpected response from server: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            ApiError::Decode(e.to_string())
        } else {
            ApiError::Transport(e.to_string())
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct UserTypeResponse {
    role: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    error: Option<String>,
}

/// Build `{base}/{segments...}`, percent-encoding every segment.
pub fn endpoint(base: &str, segments: &[&str]) -> Result<Url, ApiError> {
    let mut url = Url::parse(base).map_err(|e| ApiError::InvalidUrl(format!("{}: {}", base, e)))?;
    url.path_segments_mut()
        .map_err(|_| ApiError::InvalidUrl(format!("{} cannot be a base", base)))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

/// Map the backend's role string. Anything but "teacher" is a student.
pub fn parse_role(role: Option<&str>) -> Role {
    match role {
        Some("teacher") => Role::Teacher,
        _ => Role::Student,
    }
}

/// Turn a non-success response into the server's message, or the fallback.
async fn rejection(response: Response, fallback: &str) -> ApiError {
    let status = response.status();
    let body = response.json::<ErrorBody>().await.unwrap_or_default();
    warn!(status = %status, error = ?body.error, "Backend rejected request");
    ApiError::Rejected(body.error.unwrap_or_else(|| fallback.to_string()))
}

/// Where graded exam scores go. Abstracted so the exam controller can be
/// exercised without a backend.
#[async_trait]
pub trait ResultSink: Send + Sync {
    async fn submit_result(&self, report: &ScoreReport) -> Result<(), ApiError>;
}

/// HTTP client for the exam backend.
#[derive(Debug, Clone)]
pub struct ApiClient {
    http: Client,
    base: String,
}

impl ApiClient {
    pub fn new(config: &ClientConfig) -> Result<Self, ApiError> {
        let http = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        // validate the base once so every later call only fails on the network
        endpoint(&config.api_base, &[])?;
        Ok(Self {
            http,
            base: config.api_base.clone(),
        })
    }

    pub fn base(&self) -> &str {
        &self.base
    }

    /// Resolve the role of a user. Credentials travel as query parameters.
    #[instrument(skip(self, password))]
    pub async fn check_user(&self, user_id: &str, password: &str) -> Result<Role, ApiError> {
        let url = endpoint(&self.base, &[USER_TYPE_PATH])?;
        let response = self
            .http
            .get(url)
            .query(&[("userId", user_id), ("password", password)])
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, LOGIN_FALLBACK).await);
        }

        let body: UserTypeResponse = response.json().await?;
        let role = parse_role(body.role.as_deref());
        info!(?role, "User authenticated");
        Ok(role)
    }

    /// Fetch the test definition for a test id.
    #[instrument(skip(self))]
    pub async fn get_test_questions(&self, test_id: &str) -> Result<TestPayload, ApiError> {
        let url = endpoint(&self.base, &[TEST_PATH, test_id])?;
        let response = self
            .http
            .get(url)
            .header(ACCEPT, "application/json")
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, FETCH_FALLBACK).await);
        }

        let payload: TestPayload = response.json().await?;
        debug!(test_type = %payload.test_type, "Fetched test payload");
        Ok(payload)
    }

    /// Post a result. No retry: a failure is reported to the caller once.
    #[instrument(skip(self, report), fields(test_id = %report.test_id, passed = report.passed, total = report.total))]
    pub async fn submit_test(&self, report: &ScoreReport) -> Result<(), ApiError> {
        let url = endpoint(&self.base, &[SUBMIT_PATH])?;
        let response = self
            .http
            .post(url)
            .header(ACCEPT, "application/json")
            .json(report)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(rejection(response, SUBMIT_FALLBACK).await);
        }

        info!("Result submitted");
        Ok(())
    }
}

#[async_trait]
impl ResultSink for ApiClient {
    async fn submit_result(&self, report: &ScoreReport) -> Result<(), ApiError> {
        self.submit_test(report).await
    }
}

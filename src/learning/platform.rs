//! Learning platform REST client

use super::{
    CourseCatalog, CourseDetail, CourseSummary, Learner, LearnerDirectory, LookupError,
    LookupResult,
};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::time::Duration;

/// Upper bound on one lookup; the gateway's own deadline is only a few seconds
const REQUEST_TIMEOUT: Duration = Duration::from_secs(4);

/// Reads learners and courses from the platform backend
pub struct PlatformClient {
    client: Client,
    base_url: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CompletionResponse {
    complete: bool,
}

impl PlatformClient {
    pub fn new(base_url: &str, token: Option<String>) -> Result<Self, LookupError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LookupError::Unavailable(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            token,
        })
    }

    /// GET a JSON resource; 404 is `None`
    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> LookupResult<Option<T>> {
        let url = format!("{}{path}", self.base_url);
        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| {
            if e.is_timeout() {
                LookupError::Unavailable(format!("Request timeout: {e}"))
            } else if e.is_connect() {
                LookupError::Unavailable(format!("Connection failed: {e}"))
            } else {
                LookupError::Unavailable(format!("Request failed: {e}"))
            }
        })?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = response
            .text()
            .await
            .map_err(|e| LookupError::Unavailable(format!("Failed to read response: {e}")))?;

        if status.is_server_error() {
            return Err(LookupError::Unavailable(format!("{status} from {path}")));
        }
        if !status.is_success() {
            return Err(LookupError::InvalidResponse(format!("{status} from {path}: {body}")));
        }

        serde_json::from_str(&body)
            .map(Some)
            .map_err(|e| LookupError::InvalidResponse(format!("Failed to parse {path}: {e}")))
    }
}

#[async_trait]
impl LearnerDirectory for PlatformClient {
    async fn find_user_by_code(&self, code: &str) -> LookupResult<Option<Learner>> {
        self.get_json(&format!("/api/users/by-code/{code}")).await
    }
}

#[async_trait]
impl CourseCatalog for PlatformClient {
    async fn list_enrolled_courses(&self, user_code: &str) -> LookupResult<Vec<CourseSummary>> {
        let courses: Option<Vec<CourseSummary>> = self
            .get_json(&format!("/api/users/{user_code}/courses"))
            .await?;
        Ok(courses.unwrap_or_default())
    }

    async fn get_course_detail(&self, course_id: &str) -> LookupResult<Option<CourseDetail>> {
        self.get_json(&format!("/api/courses/{course_id}")).await
    }

    async fn is_course_complete(&self, user_code: &str, course_id: &str) -> LookupResult<bool> {
        let completion: Option<CompletionResponse> = self
            .get_json(&format!("/api/users/{user_code}/courses/{course_id}/completion"))
            .await?;
        Ok(completion.is_some_and(|c| c.complete))
    }
}

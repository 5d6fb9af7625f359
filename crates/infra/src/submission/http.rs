use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use tracing::{debug, error, info};

use super::{SubmissionClient, SubmissionError, SubmitRequest, SubmitResponse};

/// JSON-over-HTTP client for the engine's `POST /align` endpoint.
#[derive(Debug, Clone)]
pub struct HttpSubmissionClient {
    client: Client,
    submit_url: String,
}

impl HttpSubmissionClient {
    pub fn new(submit_url: impl Into<String>) -> Self {
        Self::with_client(Client::new(), submit_url)
    }

    pub fn with_client(client: Client, submit_url: impl Into<String>) -> Self {
        Self {
            client,
            submit_url: submit_url.into(),
        }
    }

    pub fn submit_url(&self) -> &str {
        &self.submit_url
    }
}

#[async_trait::async_trait]
impl SubmissionClient for HttpSubmissionClient {
    async fn submit(&self, request: &SubmitRequest) -> Result<SubmitResponse, SubmissionError> {
        if request.input_path.trim().is_empty() {
            return Err(SubmissionError::InvalidRequest(
                "input path must not be empty".to_string(),
            ));
        }

        debug!(
            url = %self.submit_url,
            align_tool = %request.align_tool,
            input_path = %request.input_path,
            "submitting alignment job"
        );

        let response = self
            .client
            .post(&self.submit_url)
            .header(CONTENT_TYPE, "application/json")
            .header(ACCEPT, "application/json")
            .json(request)
            .send()
            .await
            .map_err(|e| SubmissionError::RemoteUnavailable(format!("request failed: {e}")))?;

        let status = response.status();
        if status.is_success() {
            let body = response.text().await.map_err(|e| {
                SubmissionError::RemoteUnavailable(format!("failed to read response: {e}"))
            })?;
            return match serde_json::from_str::<SubmitResponse>(&body) {
                Ok(accepted) if !accepted.task_id.is_blank() => {
                    info!(task_id = %accepted.task_id, status = %accepted.status, "engine accepted job");
                    Ok(accepted)
                }
                Ok(_) => Err(SubmissionError::RemoteRejected {
                    status: status.as_u16(),
                    body: "engine returned an empty task id".to_string(),
                }),
                Err(e) => {
                    error!(error = %e, "invalid engine response");
                    Err(SubmissionError::RemoteRejected {
                        status: status.as_u16(),
                        body: format!("invalid response format: {e}: {body}"),
                    })
                }
            };
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unknown error".to_string());

        if status.is_client_error() {
            error!(status = %status, error = %body, "engine rejected job");
            Err(SubmissionError::RemoteRejected {
                status: status.as_u16(),
                body,
            })
        } else {
            error!(status = %status, error = %body, "engine error");
            Err(SubmissionError::RemoteUnavailable(format!("HTTP {status}: {body}")))
        }
    }
}

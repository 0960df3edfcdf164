//! HTTP client for the plans API.

use anyhow::{Context, Result};
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::StatusCode;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::error::CliError;

/// Outcome of a plan command.
#[derive(Debug)]
pub enum CommandOutcome {
    Accepted(String),
    /// The plan was already in the requested state.
    AlreadyReported,
}

#[derive(Debug, Clone)]
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.get(self.url(path)).send().await?;
        if response.status().is_success() {
            parse(response).await
        } else {
            handle_error(response).await
        }
    }

    /// POST without a body and parse the JSON answer.
    pub async fn post<T: DeserializeOwned>(&self, path: &str) -> Result<T, CliError> {
        let response = self.client.post(self.url(path)).send().await?;
        if response.status().is_success() {
            parse(response).await
        } else {
            handle_error(response).await
        }
    }

    /// GET a plan resource. The server answers 503 while the plan is
    /// incomplete, so that status still carries a body.
    pub async fn get_plan<T: DeserializeOwned>(&self, path: &str) -> Result<(T, bool), CliError> {
        let response = self.client.get(self.url(path)).send().await?;
        match response.status() {
            StatusCode::OK => Ok((parse(response).await?, true)),
            StatusCode::SERVICE_UNAVAILABLE => Ok((parse(response).await?, false)),
            _ => handle_error(response).await,
        }
    }

    /// POST a plan command with an optional JSON body.
    pub async fn command<B: Serialize>(
        &self,
        path: &str,
        query: &[(&str, &str)],
        body: Option<&B>,
    ) -> Result<CommandOutcome, CliError> {
        let mut request = self.client.post(self.url(path)).query(query);
        if let Some(body) = body {
            request = request.json(body);
        }
        let response = request.send().await?;

        match response.status() {
            StatusCode::ALREADY_REPORTED => Ok(CommandOutcome::AlreadyReported),
            status if status.is_success() => {
                let result: CommandResult = parse(response).await?;
                Ok(CommandOutcome::Accepted(result.message))
            }
            _ => handle_error(response).await,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommandResult {
    message: String,
}

/// Problem details body returned by the scheduler.
#[derive(Debug, Deserialize)]
struct ProblemResponse {
    code: String,
    detail: String,
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, CliError> {
    response
        .json()
        .await
        .map_err(|e| CliError::Other(anyhow::anyhow!("Failed to parse response: {}", e)))
}

async fn handle_error<T>(response: reqwest::Response) -> Result<T, CliError> {
    let status = response.status().as_u16();
    let problem: ProblemResponse = response.json().await.unwrap_or_else(|_| ProblemResponse {
        code: "unknown".to_string(),
        detail: "Unknown error".to_string(),
    });
    Err(CliError::api(status, problem.code, problem.detail))
}

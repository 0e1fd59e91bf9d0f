use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;

use super::{Credential, ScoringError, ScoringSource};
use crate::config::ScoringConfig;
use crate::queries::domain::{Criterion, MatchRecord};

/// `reqwest` backed client for the scoring service `/students` endpoint.
#[derive(Debug, Clone)]
pub struct HttpScoringSource {
    client: Client,
    base_url: String,
}

impl HttpScoringSource {
    pub fn new(config: &ScoringConfig) -> Result<Self, ScoringError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| ScoringError::Client(err.to_string()))?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn filter_params(criterion: &Criterion) -> Vec<(&'static str, String)> {
        let mut params = vec![
            ("university_id", criterion.university_id.clone()),
            ("degree_id", criterion.degree_id.clone()),
            ("min_aggregate", criterion.min_aggregate.to_string()),
        ];
        if let Some(course_id) = &criterion.course_id {
            params.push(("course_id", course_id.clone()));
        }
        params
    }
}

#[async_trait]
impl ScoringSource for HttpScoringSource {
    async fn matches(
        &self,
        criterion: &Criterion,
        credential: &Credential,
    ) -> Result<Vec<MatchRecord>, ScoringError> {
        let transport = |err: reqwest::Error| ScoringError::Transport {
            key: criterion.key(),
            message: err.to_string(),
        };

        let response = self
            .client
            .get(format!("{}/students", self.base_url))
            .bearer_auth(credential.expose())
            .query(&Self::filter_params(criterion))
            .send()
            .await
            .map_err(transport)?;

        let status = response.status();
        if !status.is_success() {
            return Err(ScoringError::Status {
                key: criterion.key(),
                status: status.as_u16(),
            });
        }

        let body = response.bytes().await.map_err(transport)?;
        serde_json::from_slice(&body).map_err(|err| ScoringError::Malformed {
            key: criterion.key(),
            message: err.to_string(),
        })
    }
}

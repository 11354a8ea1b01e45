use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ApiClient;
use crate::transport::{ApiCall, ApiReply, Transport};

/// Where an application stands; also the filter for the job list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApplicationStatus {
    NotApplied,
    Applied,
    InReview,
    Selected,
    Rejected,
}

impl ApplicationStatus {
    pub const ALL: [ApplicationStatus; 5] = [
        ApplicationStatus::NotApplied,
        ApplicationStatus::Applied,
        ApplicationStatus::InReview,
        ApplicationStatus::Selected,
        ApplicationStatus::Rejected,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ApplicationStatus::NotApplied => "not_applied",
            ApplicationStatus::Applied => "applied",
            ApplicationStatus::InReview => "in_review",
            ApplicationStatus::Selected => "selected",
            ApplicationStatus::Rejected => "rejected",
        }
    }
}

impl fmt::Display for ApplicationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ApplicationStatus {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        ApplicationStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == value)
            .ok_or_else(|| format!("unknown application status `{value}`"))
    }
}

impl<T: Transport> ApiClient<T> {
    /// Sends scraped job fields to the backend for extraction and storage.
    /// The payload is forwarded as-is.
    pub async fn extract_job(&self, scraped: Value) -> ApiReply {
        self.send(ApiCall::post("/jobs/extract", "Job Extraction").with_body(scraped))
            .await
    }

    /// `None` lists every saved job.
    pub async fn list_jobs(&self, filter: Option<ApplicationStatus>) -> ApiReply {
        let path = match filter {
            Some(status) => format!("/jobs?filter={status}"),
            None => "/jobs".to_string(),
        };
        self.send(ApiCall::get(path, "Job List")).await
    }

    pub async fn get_job(&self, job_id: &str) -> ApiReply {
        self.send(ApiCall::get(format!("/jobs/{job_id}"), "Job Fetch"))
            .await
    }

    pub async fn apply_job(&self, job_id: &str) -> ApiReply {
        self.send(ApiCall::post(format!("/jobs/apply/{job_id}"), "Job Apply"))
            .await
    }

    pub async fn update_job_status(&self, job_id: &str, status: ApplicationStatus) -> ApiReply {
        self.send(
            ApiCall::patch(format!("/jobs/status/{job_id}"), "Job Status Update")
                .with_body(json!({ "status": status })),
        )
        .await
    }

    pub async fn delete_job(&self, job_id: &str) -> ApiReply {
        self.send(ApiCall::delete(format!("/jobs/{job_id}"), "Job Delete"))
            .await
    }
}

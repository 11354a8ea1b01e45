//! Typed wrappers around the backend endpoints the sidebar consumes.
//!
//! Every method resolves with an [`ApiReply`]; none of them fail. Callers look
//! for the field they expect (`token`, `profile`, `jobs`, ...) and fall back to
//! [`ApiReply::message`] for what to show the user.

mod jobs;
mod profile;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::transport::{ApiCall, ApiReply, Transport, LOGIN_PATH, SIGNUP_PATH};

pub use jobs::ApplicationStatus;
pub use profile::ProfileSeed;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignupForm {
    pub name: String,
    pub email: String,
    pub password: String,
}

pub struct ApiClient<T: Transport> {
    transport: T,
}

impl<T: Transport> ApiClient<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub async fn send(&self, call: ApiCall) -> ApiReply {
        self.transport.send(call).await
    }

    pub async fn login(&self, credentials: &Credentials) -> ApiReply {
        self.send(ApiCall::post(LOGIN_PATH, "Login").with_body(json!({
            "email": credentials.email,
            "password": credentials.password,
        })))
        .await
    }

    pub async fn signup(&self, form: &SignupForm) -> ApiReply {
        self.send(ApiCall::post(SIGNUP_PATH, "Signup").with_body(json!({
            "name": form.name,
            "email": form.email,
            "password": form.password,
        })))
        .await
    }

    /// Compares the stored resume against a job description.
    pub async fn compare_resume(&self, job_description: &str) -> ApiReply {
        self.send(
            ApiCall::post("/ai/compare-resume", "Resume Comparison")
                .with_body(json!({ "jobDescription": job_description })),
        )
        .await
    }
}


#[cfg(test)]
mod tests {
    use super::testing::ScriptedTransport;
    use super::*;
    use crate::transport::Method;

    #[tokio::test]
    async fn login_and_signup_post_credentials() {
        let client = ApiClient::new(ScriptedTransport::default());
        client
            .login(&Credentials {
                email: "ada@example.com".into(),
                password: "pw".into(),
            })
            .await;
        client
            .signup(&SignupForm {
                name: "Ada".into(),
                email: "ada@example.com".into(),
                password: "pw".into(),
            })
            .await;

        let calls = client.transport().calls.lock();
        assert_eq!(calls[0].method, Method::POST);
        assert_eq!(calls[0].path, "/auth/login");
        assert_eq!(calls[0].operation, "Login");
        assert_eq!(
            calls[0].body,
            Some(json!({ "email": "ada@example.com", "password": "pw" }))
        );
        assert_eq!(calls[1].path, "/auth/signup");
        assert_eq!(calls[1].body.as_ref().unwrap()["name"], "Ada");
        assert!(calls.iter().all(ApiCall::is_credential_exchange));
    }

    #[tokio::test]
    async fn compare_resume_sends_job_description() {
        let client = ApiClient::new(ScriptedTransport::default());
        client.compare_resume("Rust engineer, async").await;
        let calls = client.transport().calls.lock();
        assert_eq!(calls[0].path, "/ai/compare-resume");
        assert_eq!(
            calls[0].body,
            Some(json!({ "jobDescription": "Rust engineer, async" }))
        );
    }
}

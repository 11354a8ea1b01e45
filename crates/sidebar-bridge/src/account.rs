//! Sign-in, sign-up and sign-out as the sidebar performs them.

use thiserror::Error;
use tracing::{info, warn};

use crate::api::{ApiClient, Credentials, ProfileSeed, SignupForm};
use crate::session::{Session, SessionStore, StorageError, UserRef};
use crate::transport::{ApiReply, Transport};

const DEFAULT_LOGIN_FAILURE: &str = "Invalid credentials";
const DEFAULT_SIGNUP_FAILURE: &str = "Signup failed";

#[derive(Debug, Error)]
pub enum AccountError {
    /// Message to show the user as-is.
    #[error("{0}")]
    Rejected(String),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Pulls `{token, user}` out of an auth reply. Both must be present.
fn session_from(reply: &ApiReply) -> Option<Session> {
    let token = reply.field("token")?.as_str()?.to_string();
    let user: UserRef = serde_json::from_value(reply.field("user")?.clone()).ok()?;
    Some(Session { token, user })
}

fn rejection(reply: &ApiReply, default: &str) -> AccountError {
    AccountError::Rejected(reply.message().unwrap_or(default).to_string())
}

/// Logs in, persists the session, then makes sure a profile exists for the
/// user. The profile step is best effort.
pub async fn login<T: Transport>(
    client: &ApiClient<T>,
    sessions: &SessionStore,
    credentials: &Credentials,
) -> Result<Session, AccountError> {
    let reply = client.login(credentials).await;
    let Some(session) = session_from(&reply) else {
        return Err(rejection(&reply, DEFAULT_LOGIN_FAILURE));
    };
    sessions.sign_in(session.clone())?;
    info!(target: "bridge.session", user = %session.user.email, "signed in");

    let existing = client.get_profile().await;
    if existing.field("profile").is_none() {
        seed_profile(client, &session.user).await;
    }
    Ok(session)
}

/// Creates the account, persists the session and always seeds a profile.
pub async fn signup<T: Transport>(
    client: &ApiClient<T>,
    sessions: &SessionStore,
    form: &SignupForm,
) -> Result<Session, AccountError> {
    let reply = client.signup(form).await;
    let Some(session) = session_from(&reply) else {
        return Err(rejection(&reply, DEFAULT_SIGNUP_FAILURE));
    };
    sessions.sign_in(session.clone())?;
    info!(target: "bridge.session", user = %session.user.email, "account created");

    seed_profile(client, &session.user).await;
    Ok(session)
}

pub fn logout(sessions: &SessionStore) -> Result<(), AccountError> {
    sessions.sign_out()?;
    info!(target: "bridge.session", "signed out");
    Ok(())
}

async fn seed_profile<T: Transport>(client: &ApiClient<T>, user: &UserRef) {
    let reply = client.create_profile(&ProfileSeed::from(user)).await;
    if reply.field("profile").is_none() {
        warn!(
            target: "bridge.session",
            reason = reply.message().unwrap_or_default(),
            "profile was not created"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::testing::ScriptedTransport;
    use crate::transport::Method;
    use serde_json::{json, Value};

    fn auth_reply() -> Value {
        json!({
            "token": "tok-1",
            "user": { "userId": "u-1", "name": "Ada", "email": "ada@example.com" }
        })
    }

    fn credentials() -> Credentials {
        Credentials {
            email: "ada@example.com".into(),
            password: "pw".into(),
        }
    }

    #[tokio::test]
    async fn login_persists_session_and_seeds_missing_profile() {
        let client = ApiClient::new(ScriptedTransport::replying(vec![
            auth_reply(),
            json!({ "message": "Profile not found" }),
            json!({ "profile": { "userId": "u-1" } }),
        ]));
        let sessions = SessionStore::ephemeral();

        let session = login(&client, &sessions, &credentials()).await.unwrap();
        assert_eq!(session.token, "tok-1");
        assert_eq!(sessions.token().as_deref(), Some("tok-1"));

        let calls = client.transport().calls.lock();
        let paths: Vec<&str> = calls.iter().map(|call| call.path.as_str()).collect();
        assert_eq!(paths, ["/auth/login", "/profile", "/profile/create"]);
        assert_eq!(
            calls[2].body,
            Some(json!({ "userId": "u-1", "name": "Ada", "email": "ada@example.com" }))
        );
    }

    #[tokio::test]
    async fn login_keeps_existing_profile() {
        let client = ApiClient::new(ScriptedTransport::replying(vec![
            auth_reply(),
            json!({ "profile": { "userId": "u-1", "skills": ["rust"] } }),
        ]));
        let sessions = SessionStore::ephemeral();
        login(&client, &sessions, &credentials()).await.unwrap();

        let calls = client.transport().calls.lock();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].method, Method::GET);
    }

    #[tokio::test]
    async fn rejected_login_surfaces_backend_message() {
        let client = ApiClient::new(ScriptedTransport::replying(vec![
            json!({ "message": "Wrong password" }),
        ]));
        let sessions = SessionStore::ephemeral();
        let err = login(&client, &sessions, &credentials()).await.unwrap_err();
        assert_eq!(err.to_string(), "Wrong password");
        assert!(!sessions.is_signed_in());

        let client = ApiClient::new(ScriptedTransport::replying(vec![json!({ "token": "t" })]));
        let err = login(&client, &sessions, &credentials()).await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid credentials");
    }

    #[tokio::test]
    async fn signup_always_seeds_profile() {
        let client = ApiClient::new(ScriptedTransport::replying(vec![auth_reply()]));
        let sessions = SessionStore::ephemeral();
        let form = SignupForm {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "pw".into(),
        };
        signup(&client, &sessions, &form).await.unwrap();
        assert!(sessions.is_signed_in());

        let calls = client.transport().calls.lock();
        let paths: Vec<&str> = calls.iter().map(|call| call.path.as_str()).collect();
        assert_eq!(paths, ["/auth/signup", "/profile/create"]);
    }

    #[tokio::test]
    async fn failed_signup_uses_default_message() {
        let client = ApiClient::new(ScriptedTransport::replying(vec![json!({})]));
        let sessions = SessionStore::ephemeral();
        let form = SignupForm {
            name: "Ada".into(),
            email: "ada@example.com".into(),
            password: "pw".into(),
        };
        let err = signup(&client, &sessions, &form).await.unwrap_err();
        assert!(matches!(err, AccountError::Rejected(ref message) if message == "Signup failed"));
    }

    #[test]
    fn logout_clears_session() {
        let sessions = SessionStore::ephemeral();
        sessions
            .sign_in(session_from(&ApiReply::new(auth_reply())).unwrap())
            .unwrap();
        logout(&sessions).unwrap();
        assert!(sessions.current().is_none());
    }
}

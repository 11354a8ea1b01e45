use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::ApiClient;
use crate::session::UserRef;
use crate::transport::{ApiCall, ApiReply, Transport};

/// Minimal profile created right after an account is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileSeed {
    pub user_id: String,
    pub name: String,
    pub email: String,
}

impl From<&UserRef> for ProfileSeed {
    fn from(user: &UserRef) -> Self {
        Self {
            user_id: user.user_id.clone(),
            name: user.name.clone(),
            email: user.email.clone(),
        }
    }
}

impl<T: Transport> ApiClient<T> {
    pub async fn get_profile(&self) -> ApiReply {
        self.send(ApiCall::get("/profile", "Profile Load")).await
    }

    pub async fn create_profile(&self, seed: &ProfileSeed) -> ApiReply {
        self.send(ApiCall::post("/profile/create", "Profile Create").with_body(json!({
            "userId": seed.user_id,
            "name": seed.name,
            "email": seed.email,
        })))
        .await
    }

    /// Any profile field, including nested education and experience, goes
    /// through this one endpoint.
    pub async fn update_profile(&self, profile: Value) -> ApiReply {
        self.send(ApiCall::put("/profile/update", "Profile Update").with_body(profile))
            .await
    }

    pub async fn save_education(&self, entries: Vec<Value>) -> ApiReply {
        self.update_profile(json!({ "education": entries })).await
    }

    pub async fn save_experience(&self, entries: Vec<Value>) -> ApiReply {
        self.update_profile(json!({ "experience": entries })).await
    }
}

// Authentication endpoints
//
// Login is the only anonymous call besides the password-reset pair; every
// other endpoint presents the bearer token and treats 401 as session expiry.

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::error::Error;
use crate::rest::client::{Auth, RestClient};
use crate::rest::models::{LoginData, PasswordChange, ProfileUpdate, User};

/// Profile endpoints answer either `{ user: {...} }` or the user itself.
#[derive(Deserialize)]
#[serde(untagged)]
enum ProfilePayload {
    Wrapped { user: User },
    Bare(User),
}

impl From<ProfilePayload> for User {
    fn from(payload: ProfilePayload) -> Self {
        match payload {
            ProfilePayload::Wrapped { user } | ProfilePayload::Bare(user) => user,
        }
    }
}

impl RestClient {
    /// Exchange email and password for a token and identity.
    ///
    /// `POST /api/auth/login`. A 401 here is a credential failure, not an
    /// expired session.
    pub async fn login(&self, email: &str, password: &SecretString) -> Result<LoginData, Error> {
        let body = json!({
            "email": email,
            "password": password.expose_secret(),
        });

        let data: Option<LoginData> = self.post("auth/login", &body, Auth::Anonymous).await?;
        let data = data.ok_or_else(|| Error::Authentication {
            message: "login response carried no token".into(),
        })?;

        debug!(user_id = %data.user.id, "login successful");
        Ok(data)
    }

    /// End the session server-side. `POST /api/auth/logout`.
    pub async fn logout(&self) -> Result<(), Error> {
        let _: Option<Value> = self.post("auth/logout", &json!({}), Auth::Bearer).await?;
        debug!("logout complete");
        Ok(())
    }

    /// Fetch the current identity. `GET /api/auth/profile`.
    ///
    /// Also serves as token validation at startup.
    pub async fn get_profile(&self) -> Result<User, Error> {
        let payload: Option<ProfilePayload> = self.get("auth/profile").await?;
        payload.map(User::from).ok_or_else(|| missing_data("auth/profile"))
    }

    /// Update profile fields. `PUT /api/auth/profile`.
    pub async fn update_profile(&self, update: &ProfileUpdate) -> Result<User, Error> {
        let payload: Option<ProfilePayload> = self.put("auth/profile", update).await?;
        payload.map(User::from).ok_or_else(|| missing_data("auth/profile"))
    }

    /// `POST /api/auth/change-password`.
    pub async fn change_password(
        &self,
        current: &SecretString,
        new: &SecretString,
    ) -> Result<(), Error> {
        let body = PasswordChange {
            current_password: current.expose_secret(),
            new_password: new.expose_secret(),
        };
        let _: Option<Value> = self.post("auth/change-password", &body, Auth::Bearer).await?;
        Ok(())
    }

    /// Request a reset email. `POST /api/auth/forgot-password`.
    pub async fn forgot_password(&self, email: &str) -> Result<(), Error> {
        let body = json!({ "email": email });
        let _: Option<Value> = self
            .post("auth/forgot-password", &body, Auth::Anonymous)
            .await?;
        Ok(())
    }

    /// Complete a reset with the emailed token. `POST /api/auth/reset-password`.
    pub async fn reset_password(
        &self,
        reset_token: &str,
        new_password: &SecretString,
    ) -> Result<(), Error> {
        let body = json!({
            "token": reset_token,
            "new_password": new_password.expose_secret(),
        });
        let _: Option<Value> = self
            .post("auth/reset-password", &body, Auth::Anonymous)
            .await?;
        Ok(())
    }
}

fn missing_data(endpoint: &str) -> Error {
    Error::Deserialization {
        message: format!("{endpoint}: response carried no data"),
        body: String::new(),
    }
}

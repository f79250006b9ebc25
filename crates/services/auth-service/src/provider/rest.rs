//! Identity-Toolkit style REST adapter.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tracing::{debug, warn};

use common::{AppError, AppResult};

use super::{
    ExternalId, ExternalIdentity, ExternalSession, IdentityProvider, ProviderError, SsoAssertion,
};
use crate::config::ProviderConfig;

const REQUEST_TIMEOUT_SECS: u64 = 15;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PasswordRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_secure_token: bool,
    return_idp_credential: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DeleteRequest<'a> {
    local_id: &'a str,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthResponse {
    local_id: String,
    #[serde(default)]
    email: String,
    id_token: String,
    #[serde(default)]
    email_verified: bool,
    #[serde(default)]
    is_new_user: bool,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    message: String,
}

/// REST client for the external identity provider.
pub struct RestIdentityProvider {
    client: Client,
    config: ProviderConfig,
}

impl RestIdentityProvider {
    pub fn new(config: ProviderConfig) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::internal(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, method: &str) -> String {
        format!(
            "{}/accounts:{}?key={}",
            self.config.base_url.trim_end_matches('/'),
            method,
            self.config.api_key
        )
    }

    async fn post<B, R>(&self, method: &str, body: &B, bearer: Option<&str>) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let mut request = self.client.post(self.endpoint(method)).json(body);
        if let Some(token) = bearer {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| ProviderError::Unavailable(e.to_string()))?;
        let status = response.status();

        if status.is_success() {
            return response
                .json::<R>()
                .await
                .map_err(|e| ProviderError::Unavailable(format!("unreadable response: {}", e)));
        }

        if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
            return Err(ProviderError::Unavailable(format!("status {}", status)));
        }

        let error = match response.json::<ErrorEnvelope>().await {
            Ok(envelope) => ProviderError::from_code(&envelope.error.message),
            Err(_) => ProviderError::Rejected(format!("status {}", status)),
        };
        debug!(method, error = %error, "Identity provider refused request");
        Err(error)
    }

    fn identity(response: AuthResponse, fallback_email: &str, is_new: bool) -> ExternalIdentity {
        let email = if response.email.is_empty() {
            fallback_email.to_string()
        } else {
            response.email
        };
        ExternalIdentity {
            email,
            provider_email_verified: response.email_verified,
            is_new: is_new || response.is_new_user,
            session: ExternalSession {
                external_id: ExternalId(response.local_id),
                id_token: response.id_token,
            },
        }
    }
}

#[async_trait]
impl IdentityProvider for RestIdentityProvider {
    async fn create_identity(&self, email: &str, password: &str) -> Result<ExternalIdentity, ProviderError> {
        let response: AuthResponse = self
            .post(
                "signUp",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
                None,
            )
            .await?;
        Ok(Self::identity(response, email, true))
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<ExternalIdentity, ProviderError> {
        let response: AuthResponse = self
            .post(
                "signInWithPassword",
                &PasswordRequest {
                    email,
                    password,
                    return_secure_token: true,
                },
                None,
            )
            .await?;
        Ok(Self::identity(response, email, false))
    }

    async fn sign_in_with_sso(&self, assertion: &SsoAssertion) -> Result<ExternalIdentity, ProviderError> {
        let response: AuthResponse = self
            .post(
                "signInWithIdp",
                &IdpRequest {
                    post_body: format!(
                        "id_token={}&providerId={}",
                        assertion.id_token, assertion.provider_id
                    ),
                    request_uri: &self.config.sso_request_uri,
                    return_secure_token: true,
                    return_idp_credential: true,
                },
                None,
            )
            .await?;

        if response.email.is_empty() {
            return Err(ProviderError::Rejected(
                "single sign-on response carried no email".to_string(),
            ));
        }
        Ok(Self::identity(response, "", false))
    }

    async fn delete_identity(&self, id: &ExternalId) -> Result<(), ProviderError> {
        let token = self.config.admin_token.as_deref().ok_or_else(|| {
            warn!(external_id = %id, "No provider admin token; identity cannot be deleted");
            ProviderError::Rejected("identity deletion is not permitted".to_string())
        })?;

        let _: serde_json::Value = self
            .post("delete", &DeleteRequest { local_id: id.as_str() }, Some(token))
            .await?;
        Ok(())
    }

    async fn sign_out(&self, session: ExternalSession) -> Result<(), ProviderError> {
        // Provider tokens are bearer tokens; dropping the only copy ends the session
        debug!(external_id = %session.external_id, "Provider session closed");
        drop(session);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> RestIdentityProvider {
        RestIdentityProvider::new(ProviderConfig {
            base_url: "https://idp.example.com/v1/".into(),
            api_key: "k".into(),
            admin_token: None,
            sso_request_uri: "http://localhost".into(),
        })
        .unwrap()
    }

    #[test]
    fn endpoints_follow_the_accounts_method_shape() {
        assert_eq!(
            provider().endpoint("signUp"),
            "https://idp.example.com/v1/accounts:signUp?key=k"
        );
    }

    #[test]
    fn auth_response_parses_provider_fields() {
        let json = r#"{"localId":"u1","email":"a@x.com","idToken":"t","emailVerified":true,"isNewUser":true}"#;
        let response: AuthResponse = serde_json::from_str(json).unwrap();
        let identity = RestIdentityProvider::identity(response, "", false);
        assert!(identity.is_new);
        assert!(identity.provider_email_verified);
        assert_eq!(identity.external_id().as_str(), "u1");
    }

    #[tokio::test]
    async fn delete_without_admin_token_is_refused_locally() {
        let err = provider()
            .delete_identity(&ExternalId("u1".into()))
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Rejected(_)));
    }
}

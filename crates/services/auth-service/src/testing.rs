//! In-process identity provider for tests.
//!
//! Behaves like the hosted provider closely enough to observe compensation:
//! identities and live sessions can be counted, and deletes can be made to
//! fail. An SSO assertion's `id_token` is taken to be the asserted email.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::provider::{
    ExternalId, ExternalIdentity, ExternalSession, IdentityProvider, ProviderError, SsoAssertion,
};

#[derive(Debug, Clone)]
struct FakeIdentity {
    email: String,
    password: Option<String>,
}

#[derive(Default)]
struct State {
    next: u64,
    identities: HashMap<String, FakeIdentity>,
    /// token -> external id
    sessions: HashMap<String, String>,
    deleted: Vec<String>,
    fail_delete: bool,
    unavailable: bool,
}

impl State {
    fn open_session(&mut self, external_id: &str) -> ExternalSession {
        self.next += 1;
        let token = format!("tok-{}", self.next);
        self.sessions.insert(token.clone(), external_id.to_string());
        ExternalSession {
            external_id: ExternalId(external_id.to_string()),
            id_token: token,
        }
    }

    fn add(&mut self, email: &str, password: Option<String>) -> String {
        self.next += 1;
        let id = format!("ext-{}", self.next);
        self.identities.insert(
            id.clone(),
            FakeIdentity {
                email: email.to_string(),
                password,
            },
        );
        id
    }

    fn check(&self) -> Result<(), ProviderError> {
        if self.unavailable {
            return Err(ProviderError::Unavailable("provider offline".into()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeIdentityProvider {
    state: Mutex<State>,
}

impl FakeIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make deletes fail as if the admin endpoint were down
    pub fn set_fail_delete(&self, fail: bool) {
        self.state.lock().unwrap().fail_delete = fail;
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.state.lock().unwrap().unavailable = unavailable;
    }

    /// Any identity (password or SSO) for the email
    pub fn has_identity(&self, email: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .identities
            .values()
            .any(|i| i.email == email)
    }

    pub fn has_sso_identity(&self, email: &str) -> bool {
        self.state
            .lock()
            .unwrap()
            .identities
            .values()
            .any(|i| i.email == email && i.password.is_none())
    }

    pub fn identity_count(&self) -> usize {
        self.state.lock().unwrap().identities.len()
    }

    pub fn live_sessions(&self) -> usize {
        self.state.lock().unwrap().sessions.len()
    }

    pub fn deleted(&self) -> Vec<String> {
        self.state.lock().unwrap().deleted.clone()
    }

    /// Plant an identity without going through the bridge.
    pub fn seed_identity(&self, email: &str, password: &str) -> ExternalId {
        ExternalId(self.state.lock().unwrap().add(email, Some(password.to_string())))
    }
}

#[async_trait]
impl IdentityProvider for FakeIdentityProvider {
    async fn create_identity(&self, email: &str, password: &str) -> Result<ExternalIdentity, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        if state
            .identities
            .values()
            .any(|i| i.email == email && i.password.is_some())
        {
            return Err(ProviderError::EmailExists);
        }
        let id = state.add(email, Some(password.to_string()));
        let session = state.open_session(&id);
        Ok(ExternalIdentity {
            email: email.to_string(),
            provider_email_verified: false,
            is_new: true,
            session,
        })
    }

    async fn authenticate(&self, email: &str, password: &str) -> Result<ExternalIdentity, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        let (id, identity) = state
            .identities
            .iter()
            .find(|(_, i)| i.email == email && i.password.is_some())
            .map(|(id, i)| (id.clone(), i.clone()))
            .ok_or(ProviderError::IdentityNotFound)?;
        if identity.password.as_deref() != Some(password) {
            return Err(ProviderError::InvalidCredential);
        }
        let session = state.open_session(&id);
        Ok(ExternalIdentity {
            email: identity.email,
            provider_email_verified: false,
            is_new: false,
            session,
        })
    }

    async fn sign_in_with_sso(&self, assertion: &SsoAssertion) -> Result<ExternalIdentity, ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        let email = assertion.id_token.clone();
        let existing = state
            .identities
            .iter()
            .find(|(_, i)| i.email == email && i.password.is_none())
            .map(|(id, _)| id.clone());
        let (id, is_new) = match existing {
            Some(id) => (id, false),
            None => (state.add(&email, None), true),
        };
        let session = state.open_session(&id);
        Ok(ExternalIdentity {
            email,
            provider_email_verified: true,
            is_new,
            session,
        })
    }

    async fn delete_identity(&self, id: &ExternalId) -> Result<(), ProviderError> {
        let mut state = self.state.lock().unwrap();
        state.check()?;
        if state.fail_delete {
            return Err(ProviderError::Unavailable("delete refused".into()));
        }
        if state.identities.remove(id.as_str()).is_none() {
            return Err(ProviderError::IdentityNotFound);
        }
        state.sessions.retain(|_, owner| owner != id.as_str());
        state.deleted.push(id.as_str().to_string());
        Ok(())
    }

    async fn sign_out(&self, session: ExternalSession) -> Result<(), ProviderError> {
        self.state.lock().unwrap().sessions.remove(&session.id_token);
        Ok(())
    }
}

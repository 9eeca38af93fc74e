//! OAuth2 authorization-code login against one social provider.
//!
//! The flow has two steps:
//!
//! 1. [`OAuth2Provider::begin`] binds a fresh `state` to the session and
//!    returns the authorization URL the browser is sent to.
//! 2. [`OAuth2Provider::phase_n`] handles the callback: it exchanges the code
//!    for an access token (`client_secret_post`), fetches the user-info
//!    resource and records the result on the session.
//!
//! Anything that goes wrong while talking to the provider ends the login as
//! [`SocialOutcome::Failed`] with [`AUTHENTICATION_FAILED`] as the reason.
//! The details are only logged.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use reqwest::header::ACCEPT;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use url::Url;

use super::error::SocialError;
use super::session::{AuthenticationState, LoginPhase, Session, SessionCache, random_token};
use crate::ProxyResult;
use crate::config::SocialProviderConfig;
use crate::consumer::{ConsumerCredential, ConsumerInfo};
use crate::error::ProxyError;

/// Reason given to the user for every failed login.
pub const AUTHENTICATION_FAILED: &str = "Authentication failed or permission not granted";

/// Status recorded on a session after a successful login.
pub const STATUS_SUCCESS: &str = "SUCCESS";

/// Query parameters of the provider's redirect back to the proxy.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CallbackParams {
    /// Authorization code.
    pub code: Option<String>,
    /// The state issued by [`OAuth2Provider::begin`].
    pub state: Option<String>,
    /// OAuth2 error code.
    pub error: Option<String>,
    /// OAuth2 error description.
    pub error_description: Option<String>,
}

/// The authenticated user as seen by the proxy.
#[derive(Debug, Clone, Serialize)]
pub struct SocialProfile {
    /// Permanent id of the user at the provider.
    pub permanent_id: String,
    /// Attributes converted from the profile.
    pub attributes: BTreeMap<String, Vec<String>>,
    /// The user-info document as received.
    pub raw: Value,
}

/// Result of a callback.
#[derive(Debug, Clone)]
pub enum SocialOutcome {
    /// The user was authenticated.
    Succeeded {
        /// Converted profile.
        profile: SocialProfile,
        /// The updated session.
        session: Session,
    },
    /// Login failed.
    Failed {
        /// Generic reason safe to show to the user.
        reason: &'static str,
        /// The updated session.
        session: Session,
    },
}

impl SocialOutcome {
    /// The session after the callback.
    #[must_use]
    pub fn session(&self) -> &Session {
        match self {
            Self::Succeeded { session, .. } | Self::Failed { session, .. } => session,
        }
    }

    /// Returns `true` if the user was authenticated.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }
}

/// Builds `<base_url>/social/<service>/callback`.
pub fn callback_url(base_url: &Url, service: &str) -> Result<Url, url::ParseError> {
    let mut base = base_url.clone();
    if !base.path().ends_with('/') {
        let path = format!("{}/", base.path());
        base.set_path(&path);
    }
    base.join(&format!("social/{service}/callback"))
}

/// A configured OAuth2 social provider.
pub struct OAuth2Provider {
    config: SocialProviderConfig,
    callback_url: Url,
    http_client: reqwest::Client,
    consumers: Arc<ConsumerInfo>,
    sessions: Arc<SessionCache>,
}

impl OAuth2Provider {
    /// Creates a provider whose callback lives under `base_url`.
    pub fn new(
        config: SocialProviderConfig,
        base_url: &Url,
        request_timeout: Duration,
        consumers: Arc<ConsumerInfo>,
        sessions: Arc<SessionCache>,
    ) -> Result<Self, SocialError> {
        let callback_url = callback_url(base_url, &config.name)?;
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;

        Ok(Self {
            config,
            callback_url,
            http_client,
            consumers,
            sessions,
        })
    }

    /// The service name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.config.name
    }

    /// The provider configuration.
    #[must_use]
    pub fn config(&self) -> &SocialProviderConfig {
        &self.config
    }

    /// The redirect URI registered with the provider.
    #[must_use]
    pub fn callback_url(&self) -> &Url {
        &self.callback_url
    }

    /// Starts a login for session `sid` and returns the authorization URL.
    ///
    /// # Errors
    ///
    /// Fails if the session does not exist or no consumer key is known for
    /// the session's SP.
    pub fn begin(&self, sid: &str) -> Result<Url, SocialError> {
        let session = self
            .sessions
            .get(sid)
            .ok_or_else(|| SocialError::SessionNotFound(sid.to_string()))?;
        let credential = self.consumers.resolve(self.name(), &session.entity_id)?;

        let state = random_token();
        self.sessions.bind_state(&state, sid);
        self.sessions
            .update(sid, |s| s.phase = LoginPhase::AwaitingCallback);

        let mut url = self.config.authorization_endpoint.clone();
        {
            let mut params = url.query_pairs_mut();
            params.append_pair("response_type", "code");
            params.append_pair("client_id", &credential.key);
            params.append_pair("redirect_uri", self.callback_url.as_str());
            params.append_pair("state", &state);
            let scope = self.config.scope();
            if !scope.is_empty() {
                params.append_pair("scope", &scope);
            }
        }

        tracing::info!(
            provider = self.name(),
            entity_id = %session.entity_id,
            "Redirecting to social provider"
        );

        Ok(url)
    }

    /// Handles the provider's callback.
    ///
    /// # Errors
    ///
    /// Fails only when the callback cannot be tied to a session. Provider
    /// failures are reported through [`SocialOutcome::Failed`].
    pub async fn phase_n(&self, params: &CallbackParams) -> Result<SocialOutcome, SocialError> {
        let state = params.state.as_deref().ok_or(SocialError::UnknownState)?;
        let sid = self
            .sessions
            .take_state(state)
            .ok_or(SocialError::UnknownState)?;
        let session = self
            .sessions
            .get(&sid)
            .ok_or_else(|| SocialError::SessionNotFound(sid.clone()))?;

        if let Some(error) = &params.error {
            tracing::info!(
                provider = self.name(),
                error = %error,
                description = params.error_description.as_deref().unwrap_or(""),
                "Provider returned an error response"
            );
            return Ok(self.fail(session));
        }
        let Some(code) = params.code.as_deref() else {
            tracing::info!(provider = self.name(), "Callback without authorization code");
            return Ok(self.fail(session));
        };

        match self.authenticate(&session.entity_id, code).await {
            Ok(profile) => Ok(self.succeed(session, profile)),
            Err(e) => {
                tracing::warn!(
                    provider = self.name(),
                    entity_id = %session.entity_id,
                    category = %e.category(),
                    error = %e,
                    "Social login failed"
                );
                Ok(self.fail(session))
            }
        }
    }

    async fn authenticate(&self, entity_id: &str, code: &str) -> ProxyResult<SocialProfile> {
        let credential = self.consumers.resolve(self.name(), entity_id)?;
        let access_token = self.exchange_code(&credential, code).await?;
        let raw = self.fetch_userinfo(&access_token).await?;
        self.convert(raw)
    }

    async fn exchange_code(&self, credential: &ConsumerCredential, code: &str) -> ProxyResult<String> {
        let scope = self.config.scope();
        let mut form = vec![
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", self.callback_url.as_str()),
            ("client_id", credential.key.as_str()),
            ("client_secret", credential.secret.as_str()),
        ];
        if !scope.is_empty() {
            form.push(("scope", scope.as_str()));
        }

        tracing::debug!(
            provider = self.name(),
            endpoint = %self.config.token_endpoint,
            "Exchanging authorization code"
        );

        let response = self
            .http_client
            .post(self.config.token_endpoint.clone())
            .header(ACCEPT, "application/json")
            .form(&form)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;
        let fields = parse_token_response(&body);

        if let Some(error) = fields.get("error") {
            let description = fields
                .get("error_description")
                .and_then(Value::as_str)
                .unwrap_or_default();
            return Err(ProxyError::provider(
                self.name(),
                format!("token endpoint error {error}: {description}"),
            ));
        }
        if !status.is_success() {
            return Err(ProxyError::provider(
                self.name(),
                format!("token endpoint returned HTTP {status}"),
            ));
        }

        fields
            .get("access_token")
            .and_then(Value::as_str)
            .filter(|token| !token.is_empty())
            .map(String::from)
            .ok_or_else(|| ProxyError::provider(self.name(), "token response has no access_token"))
    }

    async fn fetch_userinfo(&self, access_token: &str) -> ProxyResult<Value> {
        let response = self
            .http_client
            .get(self.config.userinfo_endpoint.clone())
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(|e| self.transport_error(&e))?;

        if !response.status().is_success() {
            return Err(ProxyError::provider(
                self.name(),
                format!("user-info request failed: HTTP {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(&e))?;
        tracing::debug!(provider = self.name(), "Fetched user info");

        serde_json::from_str(&body).map_err(|e| {
            ProxyError::provider(self.name(), format!("user-info is not JSON: {e}"))
        })
    }

    fn convert(&self, raw: Value) -> ProxyResult<SocialProfile> {
        let Some(profile) = raw.as_object() else {
            return Err(ProxyError::provider(self.name(), "user-info is not a JSON object"));
        };

        let permanent_id = profile
            .get(&self.config.user_id_field)
            .and_then(scalar_string)
            .ok_or_else(|| {
                ProxyError::provider(
                    self.name(),
                    format!("user-info has no '{}' field", self.config.user_id_field),
                )
            })?;

        let attributes = convert_attributes(profile, &self.config.attribute_map);

        Ok(SocialProfile {
            permanent_id,
            attributes,
            raw,
        })
    }

    fn succeed(&self, mut session: Session, profile: SocialProfile) -> SocialOutcome {
        session.service = Some(self.name().to_string());
        session.authentication = AuthenticationState::Ok;
        session.status = Some(STATUS_SUCCESS.to_string());
        session.authn_auth = Some(self.config.authority());
        session.permanent_id = Some(profile.permanent_id.clone());
        session.attributes = profile.attributes.clone();
        session.phase = LoginPhase::Succeeded;
        self.sessions.put(session.clone());

        tracing::info!(
            provider = self.name(),
            entity_id = %session.entity_id,
            "Social login succeeded"
        );

        SocialOutcome::Succeeded { profile, session }
    }

    fn fail(&self, mut session: Session) -> SocialOutcome {
        session.authentication = AuthenticationState::Failed;
        session.phase = LoginPhase::Failed;
        self.sessions.put(session.clone());

        SocialOutcome::Failed {
            reason: AUTHENTICATION_FAILED,
            session,
        }
    }

    fn transport_error(&self, e: &reqwest::Error) -> ProxyError {
        let message = if e.is_timeout() {
            format!("request timed out: {e}")
        } else {
            e.to_string()
        };
        ProxyError::transport(self.name(), message)
    }
}

impl std::fmt::Debug for OAuth2Provider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OAuth2Provider")
            .field("name", &self.config.name)
            .field("callback_url", &self.callback_url.as_str())
            .finish_non_exhaustive()
    }
}

/// Parses a token response body, which may be JSON or form-urlencoded.
fn parse_token_response(body: &str) -> Map<String, Value> {
    if let Ok(Value::Object(fields)) = serde_json::from_str::<Value>(body) {
        return fields;
    }
    url::form_urlencoded::parse(body.trim().as_bytes())
        .map(|(k, v)| (k.into_owned(), Value::String(v.into_owned())))
        .collect()
}

fn scalar_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn attribute_values(value: &Value) -> Option<Vec<String>> {
    match value {
        Value::Array(items) => {
            let values: Vec<String> = items.iter().filter_map(scalar_string).collect();
            (!values.is_empty()).then_some(values)
        }
        other => scalar_string(other).map(|s| vec![s]),
    }
}

/// Maps profile fields to attributes. Without a map, every scalar top-level
/// field is copied under its own name.
fn convert_attributes(
    profile: &Map<String, Value>,
    attribute_map: &BTreeMap<String, String>,
) -> BTreeMap<String, Vec<String>> {
    if attribute_map.is_empty() {
        return profile
            .iter()
            .filter_map(|(field, value)| scalar_string(value).map(|s| (field.clone(), vec![s])))
            .collect();
    }

    attribute_map
        .iter()
        .filter_map(|(field, attribute)| {
            profile
                .get(field)
                .and_then(attribute_values)
                .map(|values| (attribute.clone(), values))
        })
        .collect()
}

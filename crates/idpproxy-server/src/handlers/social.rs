use std::collections::BTreeMap;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use idpproxy_auth::social::{AuthenticationState, CallbackParams, SocialError, SocialOutcome};
use serde::{Deserialize, Serialize};

use super::ApiError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginParams {
    /// Entity id of the SP the user is logging in to.
    pub sp: Option<String>,
    /// Session to continue.
    pub sid: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct LoginSucceeded {
    pub status: String,
    pub authentication: AuthenticationState,
    pub service: String,
    pub entity_id: String,
    pub permanent_id: String,
    pub authn_auth: Option<String>,
    pub attributes: BTreeMap<String, Vec<String>>,
    pub sid: String,
}

#[derive(Debug, Serialize)]
pub struct LoginFailed {
    pub authentication: AuthenticationState,
    pub error: &'static str,
}

/// `GET /social/{service}/login`: starts the authorization-code flow.
pub async fn login(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(params): Query<LoginParams>,
) -> Result<Redirect, ApiError> {
    let provider = state.social.get(&service)?;
    let Some(sp) = params.sp.filter(|sp| !sp.is_empty()) else {
        return Err(ApiError::BadRequest("missing sp parameter".into()));
    };

    // Unregistered SPs are turned away before any session is stored.
    state
        .consumers
        .resolve(provider.name(), &sp)
        .map_err(SocialError::Credentials)?;

    let session = state.sessions.get_or_create(params.sid.as_deref(), &sp);
    let url = provider.begin(&session.sid)?;
    tracing::info!(
        service = %service,
        entity_id = %sp,
        sid = %session.sid,
        "redirecting to social provider"
    );
    Ok(Redirect::to(url.as_str()))
}

/// `GET /social/{service}/callback`: finishes the flow.
pub async fn callback(
    State(state): State<AppState>,
    Path(service): Path<String>,
    Query(params): Query<CallbackParams>,
) -> Result<Response, ApiError> {
    let provider = state.social.get(&service)?;

    match provider.phase_n(&params).await? {
        SocialOutcome::Succeeded { profile, session } => {
            let body = LoginSucceeded {
                status: session.status.unwrap_or_default(),
                authentication: session.authentication,
                service,
                entity_id: session.entity_id,
                permanent_id: profile.permanent_id,
                authn_auth: session.authn_auth,
                attributes: profile.attributes,
                sid: session.sid,
            };
            Ok((StatusCode::OK, Json(body)).into_response())
        }
        SocialOutcome::Failed { reason, session } => {
            let body = LoginFailed {
                authentication: session.authentication,
                error: reason,
            };
            Ok((StatusCode::UNAUTHORIZED, Json(body)).into_response())
        }
    }
}

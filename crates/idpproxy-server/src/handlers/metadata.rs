//! Metadata generation service: seals consumer secrets for an SP and checks
//! which services a metadata document carries usable secrets for.

use std::sync::Arc;

use axum::{
    Json,
    body::Bytes,
    extract::{
        Form, State,
        rejection::{BytesRejection, FormRejection},
    },
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use idpproxy_auth::consumer::{MetadataSource, parse_service_secret};
use idpproxy_auth::metadata::{CUSTOMER_ATTRIBUTE, MetadataStore, embed};
use idpproxy_auth::secret::{ProxyKeyPair, encrypt_secret};
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::state::AppState;

pub const SAVE_PATH: &str = "/metadata/save";
pub const VERIFY_PATH: &str = "/metadata/verify";
pub const VERIFY_JSON_PATH: &str = "/metadata/verifyjson";

pub const MISSING_PARAMETERS: &str =
    "Xml could not be generated because no entityId or secret has been sent to the service.";
pub const INVALID_SECRET: &str = "Xml could not be generated because the secret must be a JSON \
     object mapping each social service to {\"key\", \"secret\"}.";
pub const GENERATION_FAILED: &str = "Xml could not be generated.";

#[derive(Debug, Default, Deserialize)]
pub struct SaveParams {
    #[serde(rename = "entityId")]
    pub entity_id: Option<String>,
    pub secret: Option<String>,
}

#[derive(Debug, Deserialize)]
struct VerifyRequest {
    xml: String,
}

/// Answer of the verify action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifyResponse {
    pub ok: bool,
    pub services: Vec<String>,
}

impl VerifyResponse {
    pub fn failed() -> Self {
        Self {
            ok: false,
            services: Vec::new(),
        }
    }
}

pub async fn index(State(state): State<AppState>) -> impl IntoResponse {
    let mut sp_entities: Vec<&str> = state.metadata.sp_entity_ids().collect();
    sp_entities.sort_unstable();
    let body = json!({
        "social_services": state.social.services(),
        "sp_entities": sp_entities,
        "actions": {
            "save": SAVE_PATH,
            "verify": VERIFY_PATH,
        },
    });
    (StatusCode::OK, Json(body))
}

/// `GET|POST /metadata/save`. GET reads the query string, POST a form body.
pub async fn save(
    State(state): State<AppState>,
    params: Result<Form<SaveParams>, FormRejection>,
) -> Response {
    let params = match params {
        Ok(Form(params)) => params,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "unreadable save parameters");
            SaveParams::default()
        }
    };
    let entity_id = params.entity_id.filter(|v| !v.trim().is_empty());
    let secret = params.secret.filter(|v| !v.trim().is_empty());
    let (Some(entity_id), Some(secret)) = (entity_id, secret) else {
        return (StatusCode::BAD_REQUEST, MISSING_PARAMETERS).into_response();
    };

    if let Err(err) = parse_service_secret(&secret) {
        tracing::info!(entity_id = %entity_id, error = %err, "rejected secret");
        return (StatusCode::BAD_REQUEST, INVALID_SECRET).into_response();
    }

    let keys = Arc::clone(&state.keys);
    let sealed = tokio::task::spawn_blocking(move || {
        let token = encrypt_secret(&entity_id, &secret, keys.public_key())?;
        embed(&token, CUSTOMER_ATTRIBUTE).map(|xml| (entity_id, xml))
    })
    .await;

    match sealed {
        Ok(Ok((entity_id, xml))) => {
            tracing::info!(entity_id = %entity_id, "generated secret extension");
            (
                StatusCode::OK,
                [(header::CONTENT_TYPE, "application/xml; charset=utf-8")],
                xml,
            )
                .into_response()
        }
        Ok(Err(err)) => {
            tracing::error!(error = %err, "secret extension could not be generated");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERATION_FAILED).into_response()
        }
        Err(err) => {
            tracing::error!(error = %err, "secret sealing task failed");
            (StatusCode::INTERNAL_SERVER_ERROR, GENERATION_FAILED).into_response()
        }
    }
}

pub async fn verify() -> impl IntoResponse {
    let body = json!({
        "action": VERIFY_JSON_PATH,
        "method": "POST",
        "content_type": "application/json",
        "request": { "xml": "<md:EntityDescriptor entityID=\"...\">...</md:EntityDescriptor>" },
        "response": { "ok": "bool", "services": ["social service names"] },
    });
    (StatusCode::OK, Json(body))
}

/// `POST /metadata/verifyjson`. Never fails: anything unreadable, an
/// oversized body included, is `{"ok":false,"services":[]}`.
pub async fn verify_json(
    State(state): State<AppState>,
    body: Result<Bytes, BytesRejection>,
) -> Json<VerifyResponse> {
    let body = match body {
        Ok(body) => body,
        Err(rejection) => {
            tracing::debug!(error = %rejection, "verify request body rejected");
            return Json(VerifyResponse::failed());
        }
    };
    let request: VerifyRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::debug!(error = %err, "unreadable verify request");
            return Json(VerifyResponse::failed());
        }
    };

    let keys = Arc::clone(&state.keys);
    let response = tokio::task::spawn_blocking(move || verify_xml(&request.xml, &keys))
        .await
        .unwrap_or_else(|err| {
            tracing::error!(error = %err, "verification task failed");
            VerifyResponse::failed()
        });
    Json(response)
}

/// Lists the services whose secrets in `xml` open with `keys` and are bound
/// to the first entity in the document.
pub fn verify_xml(xml: &str, keys: &ProxyKeyPair) -> VerifyResponse {
    let store = match MetadataStore::from_xml(xml) {
        Ok(store) => store,
        Err(err) => {
            tracing::info!(error = %err, "submitted metadata does not parse");
            return VerifyResponse::failed();
        }
    };
    let Some(entity_id) = store.first_entity_id() else {
        tracing::info!("submitted metadata has no entity descriptor");
        return VerifyResponse::failed();
    };

    let services = MetadataSource::new(&store, keys.private_key()).entity_services(entity_id);
    tracing::info!(entity_id = %entity_id, services = ?services, "verified metadata");
    VerifyResponse { ok: true, services }
}

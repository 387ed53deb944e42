use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AuthFailure;
use crate::models::{CredentialBundle, MethodTag, QrPayload};
use crate::portal::{PortalClient, PortalError, Session};

/// ENT brokers usable by this process, in the order they are tried.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BrokerRegistry {
    brokers: Vec<String>,
}

impl BrokerRegistry {
    /// Keep the configured brokers the portal client can actually drive.
    /// Order is preserved; duplicates and unsupported names are dropped.
    pub fn resolve(configured: &[String], portal: &dyn PortalClient) -> Self {
        let mut brokers: Vec<String> = Vec::new();
        for name in configured {
            let name = normalize_broker(name);
            if name.is_empty() || brokers.contains(&name) {
                continue;
            }
            if !portal.supports_broker(&name) {
                warn!(broker = %name, "ENT broker not supported by portal client, skipping");
                continue;
            }
            brokers.push(name);
        }
        info!(count = brokers.len(), "ENT broker registry ready");
        Self { brokers }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.brokers.iter().any(|b| b == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.brokers.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.brokers.len()
    }
}

fn normalize_broker(name: &str) -> String {
    name.trim().to_ascii_lowercase()
}

fn blank(s: &str) -> bool {
    s.trim().is_empty()
}

/// A session only counts once the portal says it is logged in.
fn accept(result: Result<Session, PortalError>) -> Result<Session, PortalError> {
    match result {
        Ok(session) if session.logged_in() => Ok(session),
        Ok(_) => Err(PortalError::Rejected),
        Err(e) => Err(e),
    }
}

fn single_attempt_failure(e: PortalError) -> AuthFailure {
    match e {
        PortalError::Protocol(message) => AuthFailure::RemoteProtocolError { message },
        PortalError::Rejected | PortalError::Transport(_) => AuthFailure::InvalidCredentials,
    }
}

/// Turns a locator plus credentials into a logged-in portal session.
pub struct AuthResolver {
    portal: Arc<dyn PortalClient>,
    registry: BrokerRegistry,
    direct_first: bool,
}

impl AuthResolver {
    pub fn new(portal: Arc<dyn PortalClient>, registry: BrokerRegistry, direct_first: bool) -> Self {
        Self { portal, registry, direct_first }
    }

    pub fn registry(&self) -> &BrokerRegistry {
        &self.registry
    }

    pub async fn resolve(
        &self,
        locator: &str,
        credentials: &CredentialBundle,
    ) -> Result<(Session, MethodTag), AuthFailure> {
        check_parameters(locator, credentials)?;

        match credentials {
            CredentialBundle::Direct { username, password } => {
                info!(username = %username, "connecting to portal (direct)");
                let session = accept(self.portal.authenticate_direct(locator, username, password).await)
                    .map_err(single_attempt_failure)?;
                Ok((session, MethodTag::Direct))
            }
            CredentialBundle::Brokered { username, password, broker_id } => {
                self.resolve_brokered(locator, username, password, broker_id.as_deref()).await
            }
            CredentialBundle::ScannedCode { payload, confirmation_code } => {
                let payload = parse_payload(payload)?;
                let nonce = Uuid::new_v4();
                debug!(nonce = %nonce, url = %payload.url, "connecting to portal (qrcode)");
                let session = accept(
                    self.portal
                        .authenticate_scanned(&payload, confirmation_code.trim(), nonce)
                        .await,
                )
                .map_err(single_attempt_failure)?;
                Ok((session, MethodTag::ScannedCode))
            }
        }
    }

    async fn resolve_brokered(
        &self,
        locator: &str,
        username: &str,
        password: &str,
        broker_id: Option<&str>,
    ) -> Result<(Session, MethodTag), AuthFailure> {
        let explicit = broker_id.map(normalize_broker).filter(|id| !id.is_empty());
        let candidates: Vec<String> = match &explicit {
            Some(id) => {
                if !self.registry.contains(id) {
                    return Err(AuthFailure::UnknownBroker { broker: id.clone() });
                }
                vec![id.clone()]
            }
            None => self.registry.iter().map(str::to_string).collect(),
        };

        let mut failures: Vec<(MethodTag, PortalError)> = Vec::new();

        // a named broker is the only login attempted
        if self.direct_first && explicit.is_none() {
            match accept(self.portal.authenticate_direct(locator, username, password).await) {
                Ok(session) => {
                    info!(username = %username, "connected to portal (direct)");
                    return Ok((session, MethodTag::Direct));
                }
                Err(e) => {
                    warn!(error = %e, "direct login failed, falling back to ENT brokers");
                    failures.push((MethodTag::Direct, e));
                }
            }
        }

        for broker in candidates {
            let result = self
                .portal
                .authenticate_brokered(locator, username, password, &broker)
                .await;
            let tag = MethodTag::Broker(broker);
            match accept(result) {
                Ok(session) => {
                    info!(method = %tag, "connected to portal");
                    return Ok((session, tag));
                }
                Err(e) => {
                    warn!(method = %tag, error = %e, "ENT login failed");
                    failures.push((tag, e));
                }
            }
        }

        Err(chain_failure(failures))
    }
}

/// Summarize a fully failed chain. When every step hit a protocol fault the
/// integration is broken rather than the credentials, so that is reported.
fn chain_failure(failures: Vec<(MethodTag, PortalError)>) -> AuthFailure {
    let faults: Vec<String> = failures
        .iter()
        .filter_map(|(tag, e)| match e {
            PortalError::Protocol(message) => Some(format!("{}: {}", tag, message)),
            _ => None,
        })
        .collect();

    if !failures.is_empty() && faults.len() == failures.len() {
        return AuthFailure::RemoteProtocolError { message: faults.join("; ") };
    }

    AuthFailure::AllMethodsExhausted {
        tried: failures.iter().map(|(tag, _)| tag.to_string()).collect(),
        faults,
    }
}

fn check_parameters(locator: &str, credentials: &CredentialBundle) -> Result<(), AuthFailure> {
    let mut missing = Vec::new();
    match credentials {
        CredentialBundle::Direct { username, password }
        | CredentialBundle::Brokered { username, password, .. } => {
            if blank(locator) {
                missing.push("url");
            }
            if blank(username) {
                missing.push("username");
            }
            if blank(password) {
                missing.push("password");
            }
        }
        CredentialBundle::ScannedCode { payload, confirmation_code } => {
            if blank(payload) {
                missing.push("qr_payload");
            }
            if blank(confirmation_code) {
                missing.push("pin");
            }
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(AuthFailure::MissingParameters {
            missing: missing.into_iter().map(String::from).collect(),
        })
    }
}

fn parse_payload(raw: &str) -> Result<QrPayload, AuthFailure> {
    let payload: QrPayload = serde_json::from_str(raw)
        .map_err(|e| AuthFailure::MalformedPayload { reason: e.to_string() })?;
    for (field, value) in [("url", &payload.url), ("login", &payload.login), ("jeton", &payload.jeton)] {
        if blank(value) {
            return Err(AuthFailure::MalformedPayload {
                reason: format!("empty field `{}`", field),
            });
        }
    }
    Ok(payload)
}

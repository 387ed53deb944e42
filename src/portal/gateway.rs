use async_trait::async_trait;
use chrono::NaiveDate;
use percent_encoding::{utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{PortalClient, PortalError, PortalSession, RawRecord, RawStudent, Session, KNOWN_BROKERS};
use crate::models::QrPayload;

// broker ids are snake_case; keep them readable in the path
const SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'_').remove(b'-').remove(b'.');

#[derive(Deserialize, Debug)]
struct LoginResponse {
    token: String,
    #[serde(default)]
    student: RawStudent,
}

/// Portal client talking to the JSON login/homework gateway over HTTP.
#[derive(Clone)]
pub struct HttpPortal {
    http: Client,
}

impl HttpPortal {
    pub fn new(timeout: Duration) -> Result<Self, PortalError> {
        let http = Client::builder().timeout(timeout).build()?;
        Ok(Self { http })
    }

    /// Create a client with a custom reqwest::Client (useful for testing).
    pub fn with_http_client(http: Client) -> Self {
        Self { http }
    }

    async fn login(&self, base: &str, path: &str, body: serde_json::Value) -> Result<Session, PortalError> {
        let base = base.trim_end_matches('/').to_string();
        let url = format!("{}{}", base, path);
        debug!(url = %url, "portal login");

        let response = self.http.post(&url).json(&body).send().await?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(PortalError::Rejected);
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(status = %status, url = %url, "portal login failed");
            return Err(PortalError::Protocol(format!("login returned {}: {}", status, text)));
        }

        let login: LoginResponse = response
            .json()
            .await
            .map_err(|e| PortalError::Protocol(format!("invalid login response: {}", e)))?;

        Ok(Box::new(GatewaySession {
            http: self.http.clone(),
            base,
            token: login.token,
            student: login.student,
        }))
    }
}

#[async_trait]
impl PortalClient for HttpPortal {
    fn supports_broker(&self, broker: &str) -> bool {
        KNOWN_BROKERS.contains(&broker)
    }

    async fn authenticate_direct(
        &self,
        locator: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, PortalError> {
        let body = serde_json::json!({ "username": username, "password": password });
        self.login(locator, "/api/login", body).await
    }

    async fn authenticate_brokered(
        &self,
        locator: &str,
        username: &str,
        password: &str,
        broker: &str,
    ) -> Result<Session, PortalError> {
        let path = format!("/api/login/ent/{}", utf8_percent_encode(broker, SEGMENT));
        let body = serde_json::json!({ "username": username, "password": password });
        self.login(locator, &path, body).await
    }

    async fn authenticate_scanned(
        &self,
        payload: &QrPayload,
        confirmation_code: &str,
        nonce: Uuid,
    ) -> Result<Session, PortalError> {
        let body = serde_json::json!({
            "login": payload.login,
            "jeton": payload.jeton,
            "pin": confirmation_code,
            "uuid": nonce,
        });
        self.login(&payload.url, "/api/login/qrcode", body).await
    }
}

struct GatewaySession {
    http: Client,
    base: String,
    token: String,
    student: RawStudent,
}

#[async_trait]
impl PortalSession for GatewaySession {
    fn logged_in(&self) -> bool {
        !self.token.is_empty()
    }

    fn student_info(&self) -> RawStudent {
        self.student.clone()
    }

    async fn fetch_assignments(&self, date: NaiveDate) -> Result<Vec<RawRecord>, PortalError> {
        let url = format!("{}/api/homework", self.base);
        let response = self
            .http
            .get(&url)
            .query(&[("date", date.format("%Y-%m-%d").to_string())])
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(PortalError::Protocol(format!(
                "homework for {} returned {}: {}",
                date, status, text
            )));
        }

        response
            .json()
            .await
            .map_err(|e| PortalError::Protocol(format!("invalid homework payload: {}", e)))
    }
}

//! Seam between the service and the remote school portal.

pub mod gateway;

use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use serde_with::{serde_as, DisplayFromStr, PickFirst};
use thiserror::Error;
use uuid::Uuid;

use crate::models::QrPayload;

pub use self::gateway::HttpPortal;

/// Regional ENT brokers known to this build, in default registry order.
pub const KNOWN_BROKERS: &[&str] = &[
    "ac_lyon",
    "ac_grenoble",
    "ac_orleans_tours",
    "ac_reims",
    "ac_reunion",
    "atrium_sud",
    "ile_de_france",
    "monlycee",
    "occitanie_montpellier",
    "paris_classe_numerique",
    "ent_hdf",
    "l_normandie",
    "laclasse_lyon",
    "mon_college_essonne",
    "ent_somme",
];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PortalError {
    #[error("authentication rejected by portal")]
    Rejected,
    #[error("portal protocol error: {0}")]
    Protocol(String),
    #[error("portal unreachable: {0}")]
    Transport(String),
}

impl From<reqwest::Error> for PortalError {
    fn from(e: reqwest::Error) -> Self {
        PortalError::Transport(e.to_string())
    }
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RawStudent {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTeacher {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RawSubject {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub color: Option<String>,
    #[serde(default)]
    pub teacher: Option<RawTeacher>,
}

/// Assignment exactly as the portal returns it; every field may be missing.
#[serde_as]
#[derive(Deserialize, Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRecord {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub subject: Option<RawSubject>,
    #[serde(default)]
    pub description: Option<String>,
    /// `YYYY-MM-DD`, optionally followed by a time part.
    #[serde(default)]
    pub date: Option<String>,
    #[serde(default)]
    pub done: Option<bool>,
    // some portal versions send the difficulty as a string
    #[serde_as(as = "Option<PickFirst<(_, DisplayFromStr)>>")]
    pub difficulty: Option<i32>,
}

/// An authenticated portal session, valid for the request that opened it.
#[async_trait]
pub trait PortalSession: Send + Sync {
    fn logged_in(&self) -> bool;
    fn student_info(&self) -> RawStudent;
    async fn fetch_assignments(&self, date: NaiveDate) -> Result<Vec<RawRecord>, PortalError>;
}

pub type Session = Box<dyn PortalSession>;

/// Login entry points of the portal.
#[async_trait]
pub trait PortalClient: Send + Sync {
    /// Whether this client can log in through the given ENT broker.
    fn supports_broker(&self, broker: &str) -> bool;

    async fn authenticate_direct(
        &self,
        locator: &str,
        username: &str,
        password: &str,
    ) -> Result<Session, PortalError>;

    async fn authenticate_brokered(
        &self,
        locator: &str,
        username: &str,
        password: &str,
        broker: &str,
    ) -> Result<Session, PortalError>;

    async fn authenticate_scanned(
        &self,
        payload: &QrPayload,
        confirmation_code: &str,
        nonce: Uuid,
    ) -> Result<Session, PortalError>;
}

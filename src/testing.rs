//! Recording stand-in for the portal, shared by the unit tests.

use async_trait::async_trait;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

use crate::models::QrPayload;
use crate::portal::{PortalClient, PortalError, PortalSession, RawRecord, RawStudent, Session};

#[derive(Debug, Clone)]
pub enum Outcome {
    Accept,
    NotLoggedIn,
    Reject,
    Protocol(String),
    Transport,
}

#[derive(Default)]
pub struct StubSession {
    pub logged_in: bool,
    pub student: RawStudent,
    pub days: HashMap<NaiveDate, Result<Vec<RawRecord>, PortalError>>,
    pub queried: Arc<Mutex<Vec<NaiveDate>>>,
}

#[async_trait]
impl PortalSession for StubSession {
    fn logged_in(&self) -> bool {
        self.logged_in
    }

    fn student_info(&self) -> RawStudent {
        self.student.clone()
    }

    async fn fetch_assignments(&self, date: NaiveDate) -> Result<Vec<RawRecord>, PortalError> {
        self.queried.lock().unwrap().push(date);
        self.days.get(&date).cloned().unwrap_or_else(|| Ok(Vec::new()))
    }
}

pub struct StubPortal {
    pub direct: Outcome,
    pub scanned: Outcome,
    pub brokers: HashMap<String, Outcome>,
    pub calls: Mutex<Vec<String>>,
    pub nonces: Mutex<Vec<Uuid>>,
    pub student: RawStudent,
    pub days: HashMap<NaiveDate, Result<Vec<RawRecord>, PortalError>>,
}

impl StubPortal {
    pub fn new(direct: Outcome) -> Self {
        Self {
            direct,
            scanned: Outcome::Accept,
            brokers: HashMap::new(),
            calls: Mutex::new(Vec::new()),
            nonces: Mutex::new(Vec::new()),
            student: RawStudent {
                name: Some("Jeanne Martin".into()),
                class_name: Some("4C".into()),
            },
            days: HashMap::new(),
        }
    }

    /// Homework served by every session this portal opens.
    pub fn with_day(mut self, date: NaiveDate, records: Result<Vec<RawRecord>, PortalError>) -> Self {
        self.days.insert(date, records);
        self
    }

    pub fn with_broker(mut self, name: &str, outcome: Outcome) -> Self {
        self.brokers.insert(name.to_string(), outcome);
        self
    }

    pub fn with_scanned(mut self, outcome: Outcome) -> Self {
        self.scanned = outcome;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn answer(&self, outcome: &Outcome) -> Result<Session, PortalError> {
        match outcome {
            Outcome::Accept => Ok(Box::new(StubSession {
                logged_in: true,
                student: self.student.clone(),
                days: self.days.clone(),
                ..Default::default()
            })),
            Outcome::NotLoggedIn => Ok(Box::new(StubSession::default())),
            Outcome::Reject => Err(PortalError::Rejected),
            Outcome::Protocol(m) => Err(PortalError::Protocol(m.clone())),
            Outcome::Transport => Err(PortalError::Transport("connection reset".into())),
        }
    }
}

#[async_trait]
impl PortalClient for StubPortal {
    fn supports_broker(&self, broker: &str) -> bool {
        self.brokers.contains_key(broker)
    }

    async fn authenticate_direct(&self, _: &str, _: &str, _: &str) -> Result<Session, PortalError> {
        self.calls.lock().unwrap().push("direct".into());
        self.answer(&self.direct)
    }

    async fn authenticate_brokered(
        &self,
        _: &str,
        _: &str,
        _: &str,
        broker: &str,
    ) -> Result<Session, PortalError> {
        self.calls.lock().unwrap().push(format!("ent_{}", broker));
        let outcome = self.brokers.get(broker).cloned().unwrap_or(Outcome::Reject);
        self.answer(&outcome)
    }

    async fn authenticate_scanned(
        &self,
        _: &QrPayload,
        _: &str,
        nonce: Uuid,
    ) -> Result<Session, PortalError> {
        self.calls.lock().unwrap().push("qrcode".into());
        self.nonces.lock().unwrap().push(nonce);
        self.answer(&self.scanned)
    }
}

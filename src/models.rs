use chrono::{DateTime, Local, NaiveDate};
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

pub const NOT_AVAILABLE: &str = "Not available";

/// One set of credentials for one authentication attempt.
#[derive(Clone, PartialEq, Eq)]
pub enum CredentialBundle {
    Direct {
        username: String,
        password: String,
    },
    /// `broker_id: None` means every broker of the registry, in order.
    Brokered {
        username: String,
        password: String,
        broker_id: Option<String>,
    },
    /// `payload` is the raw JSON read from the portal's login QR code.
    ScannedCode {
        payload: String,
        confirmation_code: String,
    },
}

// Hand-written so passwords and QR tokens never end up in logs.
impl fmt::Debug for CredentialBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CredentialBundle::Direct { username, .. } => f
                .debug_struct("Direct")
                .field("username", username)
                .finish_non_exhaustive(),
            CredentialBundle::Brokered { username, broker_id, .. } => f
                .debug_struct("Brokered")
                .field("username", username)
                .field("broker_id", broker_id)
                .finish_non_exhaustive(),
            CredentialBundle::ScannedCode { .. } => {
                f.debug_struct("ScannedCode").finish_non_exhaustive()
            }
        }
    }
}

/// Decoded content of a login QR code.
#[derive(Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct QrPayload {
    pub url: String,
    pub login: String,
    pub jeton: String,
}

/// Which credential path produced the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MethodTag {
    Direct,
    Broker(String),
    ScannedCode,
}

impl fmt::Display for MethodTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodTag::Direct => f.write_str("direct"),
            MethodTag::Broker(name) => write!(f, "ent_{}", name),
            MethodTag::ScannedCode => f.write_str("qrcode"),
        }
    }
}

impl Serialize for MethodTag {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct StudentInfo {
    pub name: String,
    #[serde(rename = "class")]
    pub class_name: String,
}

#[derive(Serialize, Debug, Clone, PartialEq)]
pub struct AssignmentRecord {
    pub id: String,
    pub subject: String,
    pub description: String,
    pub date: NaiveDate,
    pub done: bool,
    pub difficulty: Option<i32>,
    pub color: Option<String>,
    pub teacher: String,
    pub retrieved_at: DateTime<Local>,
}

#[derive(Serialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Stats {
    pub total: usize,
    pub completed: usize,
    pub pending: usize,
    pub urgent: usize,
}

#[derive(Serialize, Debug, Clone)]
pub struct AggregateResult {
    pub success: bool,
    pub student: StudentInfo,
    #[serde(rename = "homework")]
    pub records: Vec<AssignmentRecord>,
    pub stats: Stats,
    pub sync_date: DateTime<Local>,
    pub days_requested: u32,
    pub connection_method: MethodTag,
}

#[derive(Serialize, Debug, Clone)]
pub struct ProbeResult {
    pub success: bool,
    pub message: String,
    pub student: StudentInfo,
    pub method_used: MethodTag,
}

/// Query string accepted by `/homework` and `/test-connection`.
#[derive(Deserialize, Debug, Clone, Default)]
pub struct HomeworkQuery {
    pub url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub days: Option<String>,
    pub mode: Option<String>,
    pub ent: Option<String>,
    pub qr_payload: Option<String>,
    pub pin: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthMode {
    Direct,
    Ent,
    QrCode,
}

impl AuthMode {
    pub fn parse(s: &str) -> Option<AuthMode> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" => Some(AuthMode::Direct),
            "ent" | "brokered" => Some(AuthMode::Ent),
            "qrcode" | "qr" => Some(AuthMode::QrCode),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_tags_render_as_flat_strings() {
        assert_eq!(MethodTag::Direct.to_string(), "direct");
        assert_eq!(MethodTag::Broker("ac_lyon".into()).to_string(), "ent_ac_lyon");
        assert_eq!(
            serde_json::to_value(MethodTag::ScannedCode).unwrap(),
            serde_json::json!("qrcode")
        );
    }

    #[test]
    fn credential_debug_hides_secrets() {
        let creds = CredentialBundle::Brokered {
            username: "eleve".into(),
            password: "hunter2".into(),
            broker_id: Some("monlycee".into()),
        };
        let out = format!("{:?}", creds);
        assert!(out.contains("eleve"));
        assert!(!out.contains("hunter2"));
    }

    #[test]
    fn auth_mode_accepts_aliases() {
        assert_eq!(AuthMode::parse("ENT"), Some(AuthMode::Ent));
        assert_eq!(AuthMode::parse("qr"), Some(AuthMode::QrCode));
        assert_eq!(AuthMode::parse("sso"), None);
    }

    #[test]
    fn student_class_is_serialized_as_class() {
        let info = StudentInfo { name: "A".into(), class_name: "3B".into() };
        let v = serde_json::to_value(info).unwrap();
        assert_eq!(v["class"], "3B");
    }
}

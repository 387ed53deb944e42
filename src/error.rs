use axum::{
    response::{IntoResponse, Response},
    Json,
};
use http::StatusCode;
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthFailure {
    #[error("missing parameters: {}", .missing.join(", "))]
    MissingParameters { missing: Vec<String> },
    #[error("malformed QR payload: {reason}")]
    MalformedPayload { reason: String },
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("unknown ENT broker: {broker}")]
    UnknownBroker { broker: String },
    #[error("all connection methods failed (tried: {}){}", .tried.join(", "), fault_suffix(.faults))]
    AllMethodsExhausted { tried: Vec<String>, faults: Vec<String> },
    #[error("portal protocol error: {message}")]
    RemoteProtocolError { message: String },
}

fn fault_suffix(faults: &[String]) -> String {
    if faults.is_empty() {
        String::new()
    } else {
        format!("; portal errors: {}", faults.join("; "))
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AggregationError {
    #[error("invalid day count: {input:?}")]
    InvalidDayCount { input: String },
}

/// Every failure a handler can turn into a response.
#[derive(Error, Debug)]
pub enum ApiError {
    #[error(transparent)]
    Auth(#[from] AuthFailure),
    #[error(transparent)]
    Aggregation(#[from] AggregationError),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Auth(AuthFailure::MissingParameters { .. })
            | ApiError::Auth(AuthFailure::MalformedPayload { .. })
            | ApiError::Auth(AuthFailure::UnknownBroker { .. })
            | ApiError::Aggregation(AggregationError::InvalidDayCount { .. }) => StatusCode::BAD_REQUEST,
            ApiError::Auth(AuthFailure::InvalidCredentials)
            | ApiError::Auth(AuthFailure::AllMethodsExhausted { .. }) => StatusCode::UNAUTHORIZED,
            ApiError::Auth(AuthFailure::RemoteProtocolError { .. }) => StatusCode::BAD_GATEWAY,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ApiError::Auth(AuthFailure::MissingParameters { .. }) => "MissingParameters",
            ApiError::Auth(AuthFailure::MalformedPayload { .. }) => "MalformedPayload",
            ApiError::Auth(AuthFailure::InvalidCredentials) => "InvalidCredentials",
            ApiError::Auth(AuthFailure::UnknownBroker { .. }) => "UnknownBroker",
            ApiError::Auth(AuthFailure::AllMethodsExhausted { .. }) => "AllMethodsExhausted",
            ApiError::Auth(AuthFailure::RemoteProtocolError { .. }) => "RemoteProtocolError",
            ApiError::Aggregation(AggregationError::InvalidDayCount { .. }) => "InvalidDayCount",
        }
    }

    fn headline(&self) -> &'static str {
        match self.status() {
            StatusCode::BAD_REQUEST => "invalid request",
            StatusCode::UNAUTHORIZED => "portal login failed",
            _ => "portal error",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "portal error");
        } else {
            tracing::warn!(error = %self, "request rejected");
        }

        let mut body = json!({
            "success": false,
            "error": self.headline(),
            "message": self.to_string(),
            "type": self.kind(),
        });
        match &self {
            ApiError::Auth(AuthFailure::MissingParameters { missing }) => {
                body["required"] = json!(missing);
            }
            ApiError::Auth(AuthFailure::AllMethodsExhausted { tried, faults }) => {
                body["tried"] = json!(tried);
                body["faults"] = json!(faults);
            }
            _ => {}
        }
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exhausted_lists_tried_methods() {
        let err = AuthFailure::AllMethodsExhausted {
            tried: vec!["direct".into(), "ent_ac_lyon".into()],
            faults: vec![],
        };
        assert_eq!(
            err.to_string(),
            "all connection methods failed (tried: direct, ent_ac_lyon)"
        );

        let err = AuthFailure::AllMethodsExhausted {
            tried: vec!["direct".into(), "ent_ac_lyon".into()],
            faults: vec!["ent_ac_lyon: login returned 500".into()],
        };
        assert_eq!(
            err.to_string(),
            "all connection methods failed (tried: direct, ent_ac_lyon); portal errors: ent_ac_lyon: login returned 500"
        );
    }

    #[test]
    fn status_separates_caller_and_portal_faults() {
        let bad_creds: ApiError = AuthFailure::InvalidCredentials.into();
        assert_eq!(bad_creds.status(), StatusCode::UNAUTHORIZED);

        let broken: ApiError = AuthFailure::RemoteProtocolError { message: "x".into() }.into();
        assert_eq!(broken.status(), StatusCode::BAD_GATEWAY);

        let days: ApiError = AggregationError::InvalidDayCount { input: "abc".into() }.into();
        assert_eq!(days.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn missing_parameters_response_names_fields() {
        let resp = ApiError::from(AuthFailure::MissingParameters {
            missing: vec!["url".into(), "password".into()],
        })
        .into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}

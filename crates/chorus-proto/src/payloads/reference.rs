//! Reference service payloads.
//!
//! The reference service answers three requests: `rank` (obtain or look up a
//! rank), `list` (active servers) and `heartbeat` (liveness signal). Every
//! reply carries the replier's [`Stamp`] flattened into its fields.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{Envelope, RequestError, Stamp, Status};

/// Service tags understood by the reference service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    /// Rank lookup / first registration
    Rank,
    /// Snapshot of active servers
    List,
    /// Liveness signal
    Heartbeat,
}

impl Service {
    /// Wire tag.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rank => "rank",
            Self::List => "list",
            Self::Heartbeat => "heartbeat",
        }
    }

    /// Parse a wire tag.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "rank" => Some(Self::Rank),
            "list" => Some(Self::List),
            "heartbeat" => Some(Self::Heartbeat),
            _ => None,
        }
    }
}

impl std::fmt::Display for Service {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `rank` request fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RankRequest {
    /// Name of the server asking for a rank
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// `heartbeat` request fields.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct HeartbeatRequest {
    /// Name of the server reporting liveness
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user: Option<String>,
}

/// One active server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerEntry {
    /// Server name
    pub name: String,
    /// Rank assigned at registration
    pub rank: u64,
}

/// `rank` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RankReply {
    /// Rank held by the requesting server
    pub rank: u64,
    /// Replier's stamp
    #[serde(flatten)]
    pub stamp: Stamp,
}

/// `list` reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListReply {
    /// Active servers, ordered by rank
    pub list: Vec<ServerEntry>,
    /// Replier's stamp
    #[serde(flatten)]
    pub stamp: Stamp,
}

/// `heartbeat` acknowledgement. Carries nothing beyond the stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeartbeatReply {
    /// Replier's stamp
    #[serde(flatten)]
    pub stamp: Stamp,
}

/// Failure reply, shared by every endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorReply {
    /// Always [`Status::Error`]
    pub status: Status,
    /// What went wrong
    pub description: String,
    /// Replier's stamp
    #[serde(flatten)]
    pub stamp: Stamp,
}

impl ErrorReply {
    /// Build a failure reply.
    pub fn new(description: impl Into<String>, stamp: Stamp) -> Self {
        Self { status: Status::Error, description: description.into(), stamp }
    }

    /// Wrap in an envelope addressed to `service`.
    pub fn into_envelope(self, service: impl Into<String>) -> Envelope {
        let mut data = Map::new();
        data.insert("status".to_string(), Value::from(self.status.as_str()));
        data.insert("description".to_string(), Value::String(self.description));

        let mut envelope = Envelope::new(service, data);
        envelope.set_stamp(self.stamp);
        envelope
    }
}

/// A validated reference service request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReferenceRequest {
    /// Look up or assign a rank for `user`
    Rank {
        /// Server name, never empty
        user: String,
    },
    /// List active servers
    List,
    /// Record liveness for `user`
    Heartbeat {
        /// Server name, never empty
        user: String,
    },
}

impl ReferenceRequest {
    /// Validate a decoded envelope.
    ///
    /// # Errors
    ///
    /// - `UnknownService` if the tag is not `rank`, `list` or `heartbeat`
    /// - `MissingField` if `user` is absent or empty
    /// - `InvalidPayload` if `user` is present but not a string
    pub fn from_envelope(envelope: &Envelope) -> Result<Self, RequestError> {
        let service = Service::from_tag(&envelope.service)
            .ok_or_else(|| RequestError::UnknownService(envelope.service.clone()))?;

        match service {
            Service::Rank => {
                let request: RankRequest = decode(envelope)?;
                Ok(Self::Rank { user: require_user(service, request.user)? })
            },
            Service::Heartbeat => {
                let request: HeartbeatRequest = decode(envelope)?;
                Ok(Self::Heartbeat { user: require_user(service, request.user)? })
            },
            Service::List => Ok(Self::List),
        }
    }

    /// Service this request addresses.
    pub fn service(&self) -> Service {
        match self {
            Self::Rank { .. } => Service::Rank,
            Self::List => Service::List,
            Self::Heartbeat { .. } => Service::Heartbeat,
        }
    }
}

fn decode<T: serde::de::DeserializeOwned>(envelope: &Envelope) -> Result<T, RequestError> {
    envelope.payload().map_err(|e| RequestError::InvalidPayload {
        service: envelope.service.clone(),
        reason: e.to_string(),
    })
}

fn require_user(service: Service, user: Option<String>) -> Result<String, RequestError> {
    match user {
        Some(user) if !user.is_empty() => Ok(user),
        _ => Err(RequestError::MissingField { service: service.as_str().to_string(), field: "user" }),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn envelope(value: Value) -> Envelope {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn rank_request_requires_user() {
        let ok = envelope(json!({ "service": "rank", "data": { "user": "alpha", "clock": 1 } }));
        assert_eq!(
            ReferenceRequest::from_envelope(&ok),
            Ok(ReferenceRequest::Rank { user: "alpha".to_string() })
        );

        let missing = envelope(json!({ "service": "rank", "data": { "clock": 1 } }));
        assert_eq!(
            ReferenceRequest::from_envelope(&missing),
            Err(RequestError::MissingField { service: "rank".to_string(), field: "user" })
        );

        let empty = envelope(json!({ "service": "heartbeat", "data": { "user": "" } }));
        assert_eq!(
            ReferenceRequest::from_envelope(&empty),
            Err(RequestError::MissingField { service: "heartbeat".to_string(), field: "user" })
        );
    }

    #[test]
    fn non_string_user_is_invalid() {
        let bad = envelope(json!({ "service": "heartbeat", "data": { "user": 17 } }));
        assert!(matches!(
            ReferenceRequest::from_envelope(&bad),
            Err(RequestError::InvalidPayload { .. })
        ));
    }

    #[test]
    fn list_ignores_extra_fields() {
        let list = envelope(json!({ "service": "list", "data": { "user": 17, "clock": 4 } }));
        assert_eq!(ReferenceRequest::from_envelope(&list), Ok(ReferenceRequest::List));
    }

    #[test]
    fn unknown_tag_is_echoed() {
        let bogus = envelope(json!({ "service": "bogus", "data": {} }));
        let err = ReferenceRequest::from_envelope(&bogus).unwrap_err();
        assert_eq!(err.service(), "bogus");
    }

    #[test]
    fn replies_flatten_stamp() {
        let stamp = Stamp { timestamp: 1_000, clock: 7 };
        let reply = Envelope::from_payload("rank", &RankReply { rank: 3, stamp }).unwrap();

        assert_eq!(reply.data["rank"], json!(3));
        assert_eq!(reply.stamp(), stamp);

        let decoded: RankReply = reply.payload().unwrap();
        assert_eq!(decoded.rank, 3);
    }

    #[test]
    fn list_reply_shape() {
        let reply = ListReply {
            list: vec![ServerEntry { name: "alpha".to_string(), rank: 1 }],
            stamp: Stamp::default(),
        };
        let value = serde_json::to_value(&reply).unwrap();
        assert_eq!(value["list"], json!([{ "name": "alpha", "rank": 1 }]));
    }

    #[test]
    fn error_reply_envelope() {
        let reply = ErrorReply::new("Service 'bogus' not recognized", Stamp { timestamp: 5, clock: 2 })
            .into_envelope("bogus");

        assert_eq!(reply.service, "bogus");
        assert!(reply.is_error());
        assert_eq!(reply.description(), Some("Service 'bogus' not recognized"));
        assert_eq!(reply.clock(), 2);
    }

    #[test]
    fn service_tags() {
        for service in [Service::Rank, Service::List, Service::Heartbeat] {
            assert_eq!(Service::from_tag(service.as_str()), Some(service));
        }
        assert_eq!(Service::from_tag("publish"), None);
    }
}

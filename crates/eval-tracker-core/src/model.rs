use std::fmt::{Display, Formatter};

use serde::{Deserialize, Deserializer, Serialize};
use time::OffsetDateTime;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum Purpose {
    #[serde(rename = "RAI check")]
    RaiCheck,
    #[serde(rename = "Flight review")]
    FlightReview,
    #[serde(rename = "GPT-5 migration")]
    Gpt5Migration,
    #[serde(rename = "Ad-hoc")]
    AdHoc,
}

impl Purpose {
    pub const ALL: [Self; 4] = [
        Self::RaiCheck,
        Self::FlightReview,
        Self::Gpt5Migration,
        Self::AdHoc,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RaiCheck => "RAI check",
            Self::FlightReview => "Flight review",
            Self::Gpt5Migration => "GPT-5 migration",
            Self::AdHoc => "Ad-hoc",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|purpose| purpose.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum AgentType {
    #[serde(rename = "DA")]
    DeclarativeAgent,
    #[serde(rename = "FCC")]
    FederatedConnector,
    #[serde(rename = "OAI Apps SDK")]
    OaiAppsSdk,
}

impl AgentType {
    pub const ALL: [Self; 3] = [
        Self::DeclarativeAgent,
        Self::FederatedConnector,
        Self::OaiAppsSdk,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::DeclarativeAgent => "DA",
            Self::FederatedConnector => "FCC",
            Self::OaiAppsSdk => "OAI Apps SDK",
        }
    }

    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::DeclarativeAgent => "Declarative Agent",
            Self::FederatedConnector => "Federated Copilot Connector",
            Self::OaiAppsSdk => "OAI Apps SDK",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|agent_type| agent_type.as_str() == value)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, Eq, PartialEq, Hash)]
pub enum Priority {
    Low,
    #[default]
    Medium,
    High,
}

impl Priority {
    pub const ALL: [Self; 3] = [Self::Low, Self::Medium, Self::High];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Low => "Low",
            Self::Medium => "Medium",
            Self::High => "High",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Low" => Some(Self::Low),
            "Medium" => Some(Self::Medium),
            "High" => Some(Self::High),
            _ => None,
        }
    }

    /// Sort rank used by priority ordering; lower ranks list first.
    #[must_use]
    pub fn rank(self) -> u8 {
        match self {
            Self::High => 0,
            Self::Medium => 1,
            Self::Low => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    Pending,
    InProgress,
    Completed,
}

impl RequestStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

impl Display for RequestStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunLink {
    pub url: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub added_at: OffsetDateTime,
}

/// Client-submitted run link. Any `added_at` sent by the client is ignored;
/// the server stamps links when it accepts them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunLinkInput {
    pub url: String,
    #[serde(default)]
    pub notes: Option<String>,
}

impl RunLinkInput {
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            notes: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UpdateEntry {
    pub note: String,
    pub author: String,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub links_added: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EvaluationRequest {
    pub id: String,
    pub purpose: Purpose,
    #[serde(default)]
    pub purpose_reason: Option<String>,
    pub agent_type: AgentType,
    pub agents: Vec<String>,
    pub query_set: String,
    #[serde(default)]
    pub query_set_details: Option<String>,
    pub control_config: String,
    pub treatment_config: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub on_behalf_of: Option<String>,
    pub submitter: String,
    #[serde(with = "time::serde::rfc3339")]
    pub submitted_at: OffsetDateTime,
    pub status: RequestStatus,
    #[serde(default)]
    pub executor: Option<String>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(default, with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
    #[serde(default)]
    pub run_links: Vec<RunLink>,
    #[serde(default)]
    pub update_history: Vec<UpdateEntry>,
}

/// Submission payload for a new request.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewRequest {
    pub purpose: Purpose,
    #[serde(default)]
    pub purpose_reason: Option<String>,
    pub agent_type: AgentType,
    pub agents: Vec<String>,
    pub query_set: String,
    #[serde(default)]
    pub query_set_details: Option<String>,
    pub control_config: String,
    pub treatment_config: String,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub on_behalf_of: Option<String>,
}

/// Partial update of business fields. A field that is present replaces the
/// stored value; `null` clears an optional field; an absent field is kept.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RequestUpdate {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub purpose: Option<Purpose>,
    #[serde(
        default,
        deserialize_with = "present_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub purpose_reason: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent_type: Option<AgentType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agents: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_set: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub query_set_details: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub control_config: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub treatment_config: Option<String>,
    #[serde(
        default,
        deserialize_with = "present_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub notes: Option<Option<String>>,
    #[serde(
        default,
        deserialize_with = "present_field",
        skip_serializing_if = "Option::is_none"
    )]
    pub on_behalf_of: Option<Option<String>>,
}

// Distinguishes `"field": null` (Some(None)) from an absent field (None).
fn present_field<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ImportSummary {
    pub imported: usize,
    pub errors: Vec<String>,
    pub total: usize,
}

//! Static option catalog served to the portal form.

use serde_json::{json, Value};

use crate::model::{AgentType, Priority, Purpose};
use crate::validation::QUERY_SET_OTHERS;

pub const DEFAULT_QUERY_SET: &str = "Default";
pub const CURRENT_PROD_CONFIG: &str = "Current Prod";

#[must_use]
pub fn portal_catalog() -> Value {
    let purposes: Vec<&str> = Purpose::ALL.iter().map(|purpose| purpose.as_str()).collect();
    let agent_types: Vec<Value> = AgentType::ALL
        .iter()
        .map(|agent_type| json!({"value": agent_type.as_str(), "label": agent_type.label()}))
        .collect();
    let priority_levels: Vec<Value> = Priority::ALL
        .iter()
        .map(|priority| json!({"value": priority.as_str(), "label": priority.as_str()}))
        .collect();

    json!({
        "purposes": purposes,
        "agent_types": agent_types,
        "agent_hierarchy": agent_hierarchy(),
        "query_sets": [DEFAULT_QUERY_SET, QUERY_SET_OTHERS],
        "configs": {
            "control": [CURRENT_PROD_CONFIG, "Others"],
            "treatment": [CURRENT_PROD_CONFIG, "Others"],
        },
        "priority_levels": priority_levels,
    })
}

/// Looks up one catalog section by its route name (`purposes`,
/// `agent-types`, `agents`, `query-sets`, `configs`, `priority-levels`).
#[must_use]
pub fn catalog_section(name: &str) -> Option<Value> {
    let key = match name {
        "purposes" => "purposes",
        "agent-types" => "agent_types",
        "agents" => "agent_hierarchy",
        "query-sets" => "query_sets",
        "configs" => "configs",
        "priority-levels" => "priority_levels",
        _ => return None,
    };
    portal_catalog().get(key).cloned()
}

fn agent_hierarchy() -> Value {
    json!({
        (AgentType::DeclarativeAgent.as_str()): {
            "Message Extensions": ["Mock MEs", "Jira Cloud"],
            "OpenAPI": ["GitHub Mock", "KYC Mock", "GitHub", "IDEAS", "KYC"],
            "Remote MCP": ["Monday.com", "Connect", "Sales UAT"],
            "Instructions++": ["Hugo", "Vantage Rewards", "Sales Genie", "IT Helpdesk", "Adobe Express"],
        },
        (AgentType::FederatedConnector.as_str()): [
            "Notion", "Canva", "HubSpot", "Linear", "Google Calendar", "Google Contacts", "Intercom",
        ],
        (AgentType::OaiAppsSdk.as_str()): ["Others"],
    })
}

use serde::{Deserialize, Serialize};
use std::fmt;

/// A CRM entity kind the binding engine and enrichment lookups operate over.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum EntityKind {
    Lead,
    Deal,
    Contact,
    Company,
    Quote,
    Invoice,
    Requisite,
}

impl EntityKind {
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Lead,
        EntityKind::Deal,
        EntityKind::Contact,
        EntityKind::Company,
        EntityKind::Quote,
        EntityKind::Invoice,
        EntityKind::Requisite,
    ];

    /// The fixed numeric `entityTypeId` the CRM webhook protocol uses for this kind.
    pub fn entity_type_id(self) -> u32 {
        match self {
            EntityKind::Lead => 1,
            EntityKind::Deal => 2,
            EntityKind::Contact => 3,
            EntityKind::Company => 4,
            EntityKind::Quote => 7,
            EntityKind::Invoice => 31,
            EntityKind::Requisite => 8,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Lead => "lead",
            EntityKind::Deal => "deal",
            EntityKind::Contact => "contact",
            EntityKind::Company => "company",
            EntityKind::Quote => "quote",
            EntityKind::Invoice => "invoice",
            EntityKind::Requisite => "requisite",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        Some(match s {
            "lead" => EntityKind::Lead,
            "deal" => EntityKind::Deal,
            "contact" => EntityKind::Contact,
            "company" => EntityKind::Company,
            "quote" => EntityKind::Quote,
            "invoice" => EntityKind::Invoice,
            "requisite" => EntityKind::Requisite,
            _ => return None,
        })
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-entity-kind call-binding policy, see `orchestrator::binding`.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum BindingMode {
    All,
    Filtered,
    None,
}

impl BindingMode {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_uppercase().as_str() {
            "ALL" => Some(BindingMode::All),
            "FILTERED" => Some(BindingMode::Filtered),
            "NONE" => Some(BindingMode::None),
            _ => None,
        }
    }
}

/// A single CRM entity summary as returned by a `crm.<kind>.list` call.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct CrmEntity {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "TITLE", default)]
    pub title: Option<String>,
    #[serde(rename = "STATUS_ID", default)]
    pub status_id: Option<String>,
    #[serde(rename = "CATEGORY_ID", default)]
    pub category_id: Option<String>,
    /// The configured target/category custom field for this entity kind, if present.
    /// Absence is treated as "does not match any filter" (see `orchestrator::binding`).
    #[serde(flatten)]
    pub custom_fields: std::collections::HashMap<String, serde_json::Value>,
}

impl CrmEntity {
    pub fn custom_field(&self, field_id: &str) -> Option<String> {
        self.custom_fields.get(field_id).and_then(|v| match v {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
    }
}

/// Result of `find_contact_by_phone`.
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Contact {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "NAME", default)]
    pub name: Option<String>,
    #[serde(rename = "LAST_NAME", default)]
    pub last_name: Option<String>,
    #[serde(rename = "SECOND_NAME", default)]
    pub second_name: Option<String>,
}

impl Contact {
    /// Number of populated name fields; enrichment picks the candidate that maximizes this.
    pub fn populated_name_fields(&self) -> usize {
        [&self.name, &self.last_name, &self.second_name]
            .into_iter()
            .filter(|f| f.as_deref().is_some_and(|s| !s.is_empty()))
            .count()
    }

    pub fn full_name(&self) -> String {
        [&self.name, &self.second_name, &self.last_name]
            .into_iter()
            .filter_map(|f| f.as_deref())
            .collect::<Vec<_>>()
            .join(" ")
            .trim()
            .to_string()
    }
}

/// The direction of a call, as reported by the PBX side.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallDirection {
    Inbound,
    Outbound,
    InboundWithForwarding,
    Callback,
}

impl CallDirection {
    /// The numeric `TYPE` value `telephony.externalcall.register` expects.
    pub fn crm_type_code(self) -> u8 {
        match self {
            CallDirection::Outbound => 1,
            CallDirection::Inbound => 2,
            CallDirection::InboundWithForwarding => 3,
            CallDirection::Callback => 3,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            CallDirection::Outbound => "Outbound call",
            CallDirection::Inbound => "Incoming call",
            CallDirection::InboundWithForwarding => "Inbound call with forwarding",
            CallDirection::Callback => "Callback",
        }
    }
}

/// Response body of `telephony.externalcall.register`.
#[derive(Clone, Debug, Deserialize)]
pub struct RegisteredCall {
    #[serde(rename = "CALL_ID")]
    pub call_id: String,
    #[serde(rename = "CRM_CREATED_LEAD", default)]
    pub crm_created_lead: Option<String>,
    #[serde(rename = "CRM_CREATED_ENTITIES", default)]
    pub crm_created_entities: Option<Vec<CreatedEntity>>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CreatedEntity {
    #[serde(rename = "ENTITY_TYPE")]
    pub entity_type: String,
    #[serde(rename = "ENTITY_ID")]
    pub entity_id: String,
}

/// Response body of `telephony.externalcall.finish`.
#[derive(Clone, Debug, Deserialize)]
pub struct FinishedCall {
    #[serde(rename = "CRM_ACTIVITY_ID")]
    pub crm_activity_id: String,
}

/// A single existing binding returned by `crm.activity.binding.list`.
#[derive(Clone, Debug, Deserialize)]
pub struct ActivityBinding {
    #[serde(rename = "ENTITY_ID")]
    pub entity_id: String,
    #[serde(rename = "ENTITY_TYPE_ID")]
    pub entity_type_id: u32,
}

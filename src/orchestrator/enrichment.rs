use crate::config::Config;
use crate::crm::endpoints::contact::{select_best_contact, FindContactByPhone};
use crate::crm::endpoints::entities::ListEntities;
use crate::crm::types::{Contact, CrmEntity, EntityKind};
use crate::crm::CrmClient;
use crate::pbx::AmiClient;
use std::collections::HashMap;
use tracing::{debug, warn};

/// Result of enriching a new call: what was found in the CRM and the CallerID
/// display name that was (or would be) pushed back to the PBX (§4.3).
pub struct EnrichmentResult {
    pub contact_id: Option<String>,
    pub contact_display_name: Option<String>,
    pub known_entities: HashMap<EntityKind, Vec<CrmEntity>>,
    pub caller_id_name: String,
}

/// Looks up the caller's contact and related entities, then formats the CallerID
/// display name the same way `format_caller_id_name` does. Pure CRM-side lookup; does
/// not touch the PBX. Callers decide whether and how to push the result (§4.3).
pub async fn enrich_caller(
    crm: &CrmClient,
    config: &Config,
    caller_number: &str,
) -> EnrichmentResult {
    let contacts = match crm.hit(FindContactByPhone {
        phone_number: caller_number.to_string(),
    }).await {
        Ok(contacts) => contacts,
        Err(e) => {
            warn!(caller = %caller_number, error = %e, "contact lookup failed, proceeding without CRM data");
            Vec::new()
        }
    };

    let Some(contact) = select_best_contact(contacts) else {
        let known_entities = fetch_related_entities(crm, config, None, caller_number).await;
        let caller_id_name = format_caller_id_name(caller_number, config, &known_entities);
        return EnrichmentResult {
            contact_id: None,
            contact_display_name: None,
            known_entities,
            caller_id_name,
        };
    };

    let known_entities = fetch_related_entities(crm, config, Some(&contact.id), caller_number).await;
    let contact_name = contact.full_name();
    let caller_id_name = format_caller_id_name(&contact_name, config, &known_entities);

    EnrichmentResult {
        contact_id: Some(contact.id),
        contact_display_name: Some(contact_name),
        known_entities,
        caller_id_name,
    }
}

/// Runs one `crm.<kind>.list` request per configured entity kind endpoint, skipping
/// kinds `ListEntities::applicable` rules out (deals with no contact id), matching
/// `get_entities_info`.
async fn fetch_related_entities(
    crm: &CrmClient,
    config: &Config,
    contact_id: Option<&str>,
    caller_number: &str,
) -> HashMap<EntityKind, Vec<CrmEntity>> {
    let mut found = HashMap::new();

    for kind in EntityKind::ALL {
        let Some(endpoint) = config.entity_type_endpoints.get(&kind) else {
            continue;
        };
        let list = ListEntities {
            kind,
            request_path: endpoint.request.clone(),
            contact_id: contact_id.map(str::to_string),
            phone_number: Some(caller_number.to_string()),
            uf_list_id: config.bitrix24.uf_list_id.get(&kind).cloned(),
        };
        if !list.applicable() {
            continue;
        }

        match crm.hit(list).await {
            Ok(entities) if !entities.is_empty() => {
                debug!(kind = %kind, count = entities.len(), "found related entities");
                found.insert(kind, entities);
            }
            Ok(_) => {}
            Err(e) => warn!(kind = %kind, error = %e, "entity lookup failed, skipping"),
        }
    }

    found
}

/// `format_caller_id_name`: `"<fullname> (<kind> - <n>[, ...])"`, or just the plain
/// name/number when no related entities were found.
fn format_caller_id_name(
    base_name: &str,
    config: &Config,
    known_entities: &HashMap<EntityKind, Vec<CrmEntity>>,
) -> String {
    let formatted = format_entities_info(config, known_entities);
    if formatted.is_empty() {
        base_name.to_string()
    } else {
        format!("{base_name} ({formatted})")
    }
}

/// `format_entities_info`: one `"<label> - <count>"` segment per non-empty kind,
/// joined with `", "`, in `EntityKind::ALL` order.
fn format_entities_info(config: &Config, known_entities: &HashMap<EntityKind, Vec<CrmEntity>>) -> String {
    EntityKind::ALL
        .into_iter()
        .filter_map(|kind| {
            let count = known_entities.get(&kind)?.len();
            if count == 0 {
                return None;
            }
            Some(get_entity_type_name(config, kind, count))
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `get_entity_type_name`: the configured localized label for `kind`, falling back to
/// its raw name if unconfigured.
fn get_entity_type_name(config: &Config, kind: EntityKind, count: usize) -> String {
    let label = config
        .entity_type_labels
        .get(&kind)
        .map(String::as_str)
        .unwrap_or_else(|| kind.as_str());
    format!("{label} - {count}")
}

/// Pushes the formatted CallerID name back to the PBX via `Action: Setvar`. Enrichment
/// failures never block this: a missing contact still rewrites the name to the raw
/// caller number, matching the original's unconditional `update_caller_id_name` call.
pub fn push_caller_id_name(
    ami: &AmiClient,
    correlation_id: &str,
    channel: &str,
    caller_id_name: &str,
) {
    if let Err(e) = ami.set_caller_id_name(correlation_id, channel, caller_id_name) {
        warn!(channel = %channel, error = %e, "failed to push CallerID name to AMI");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crm::types::Contact;

    fn config_with_labels() -> Config {
        let mut entity_type_labels = HashMap::new();
        entity_type_labels.insert(EntityKind::Lead, "Lead".to_string());
        entity_type_labels.insert(EntityKind::Deal, "Deal".to_string());
        crate::config::Config {
            ami: crate::config::AmiSettings {
                host: "127.0.0.1".into(),
                port: 5038,
                username: "u".into(),
                secret: "s".into(),
            },
            mp3_dir: "/tmp".into(),
            allowed_extens: vec![],
            event_handling: HashMap::new(),
            queue_names: HashMap::new(),
            queue_deal_categories: HashMap::new(),
            queue_lead_targets: HashMap::new(),
            bitrix24: crate::config::Bitrix24Settings {
                webhook_url: "https://example.test/rest/1/x".into(),
                call_admin_id: "1".into(),
                uf_list_id: HashMap::new(),
            },
            binding_policy: HashMap::new(),
            lead_target_ids: HashMap::new(),
            entity_type_labels,
            entity_type_endpoints: HashMap::new(),
            log_ami_events: false,
            logging_sections: vec![],
        }
    }

    fn entity(id: &str) -> CrmEntity {
        CrmEntity {
            id: id.to_string(),
            title: None,
            status_id: None,
            category_id: None,
            custom_fields: HashMap::new(),
        }
    }

    #[test]
    fn formats_name_with_single_entity_kind() {
        let config = config_with_labels();
        let mut known = HashMap::new();
        known.insert(EntityKind::Lead, vec![entity("1")]);
        let name = format_caller_id_name("Jane Doe", &config, &known);
        assert_eq!(name, "Jane Doe (Lead - 1)");
    }

    #[test]
    fn formats_name_with_multiple_entity_kinds_in_fixed_order() {
        let config = config_with_labels();
        let mut known = HashMap::new();
        known.insert(EntityKind::Deal, vec![entity("1"), entity("2")]);
        known.insert(EntityKind::Lead, vec![entity("3")]);
        let name = format_caller_id_name("Jane Doe", &config, &known);
        assert_eq!(name, "Jane Doe (Lead - 1, Deal - 2)");
    }

    #[test]
    fn falls_back_to_plain_name_with_no_related_entities() {
        let config = config_with_labels();
        let known = HashMap::new();
        let name = format_caller_id_name("Jane Doe", &config, &known);
        assert_eq!(name, "Jane Doe");
    }

    #[test]
    fn unconfigured_kind_falls_back_to_raw_name() {
        let mut config = config_with_labels();
        config.entity_type_labels.remove(&EntityKind::Lead);
        let mut known = HashMap::new();
        known.insert(EntityKind::Lead, vec![entity("1")]);
        let name = format_caller_id_name("Jane Doe", &config, &known);
        assert_eq!(name, "Jane Doe (lead - 1)");
    }

    #[test]
    fn contact_full_name_trims_and_joins() {
        let contact = Contact {
            id: "1".to_string(),
            name: Some("Jane".to_string()),
            second_name: None,
            last_name: Some("Doe".to_string()),
        };
        assert_eq!(contact.full_name(), "Jane Doe");
    }
}

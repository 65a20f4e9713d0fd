use crate::config::Config;
use crate::crm::types::{ActivityBinding, BindingMode, CrmEntity, EntityKind};
use std::collections::HashMap;

/// One binding write the engine decided to make.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum BindingAction {
    Add { kind: EntityKind, entity_id: String },
    Delete { kind: EntityKind, entity_id: String },
}

/// Applies the per-entity-kind binding policy (§4.7) to a call's known entities and
/// returns the set of add/delete actions to perform. Pure and deterministic: the same
/// inputs always produce the same plan, which is what makes the engine idempotent
/// (P6) — running it twice against the same `existing_bindings` snapshot yields an
/// empty plan the second time.
pub fn compute_binding_plan(
    config: &Config,
    queue_id: &str,
    known_entities: &HashMap<EntityKind, Vec<CrmEntity>>,
    newly_created_lead_id: Option<&str>,
    existing_bindings: &[ActivityBinding],
) -> Vec<BindingAction> {
    let mut actions = Vec::new();

    for kind in EntityKind::ALL {
        let mode = config.binding_mode(kind);
        let mut entities: Vec<CrmEntity> = known_entities.get(&kind).cloned().unwrap_or_default();

        if kind == EntityKind::Lead {
            if let Some(lead_id) = newly_created_lead_id {
                if !entities.iter().any(|e| e.id == lead_id) {
                    let target = config
                        .queue_lead_targets
                        .get(queue_id)
                        .and_then(|targets| targets.first())
                        .cloned()
                        .unwrap_or_default();
                    let mut synthetic = CrmEntity {
                        id: lead_id.to_string(),
                        title: None,
                        status_id: None,
                        category_id: None,
                        custom_fields: HashMap::new(),
                    };
                    if let Some(field_id) = config.bitrix24.uf_list_id.get(&EntityKind::Lead) {
                        synthetic
                            .custom_fields
                            .insert(field_id.clone(), serde_json::Value::String(target));
                    }
                    entities.insert(0, synthetic);
                }
            }
        }

        if entities.is_empty() {
            continue;
        }

        for entity in &entities {
            match mode {
                BindingMode::All => {
                    if !is_bound(existing_bindings, kind, &entity.id) {
                        actions.push(BindingAction::Add {
                            kind,
                            entity_id: entity.id.clone(),
                        });
                    }
                }
                BindingMode::Filtered => {
                    let matches = filtered_match(config, kind, queue_id, entity);
                    if matches {
                        if !is_bound(existing_bindings, kind, &entity.id) {
                            actions.push(BindingAction::Add {
                                kind,
                                entity_id: entity.id.clone(),
                            });
                        }
                    } else {
                        actions.push(BindingAction::Delete {
                            kind,
                            entity_id: entity.id.clone(),
                        });
                    }
                }
                BindingMode::None => {
                    actions.push(BindingAction::Delete {
                        kind,
                        entity_id: entity.id.clone(),
                    });
                }
            }
        }
    }

    actions
}

fn is_bound(existing: &[ActivityBinding], kind: EntityKind, entity_id: &str) -> bool {
    existing
        .iter()
        .any(|b| b.entity_type_id == kind.entity_type_id() && b.entity_id == entity_id)
}

/// A missing custom field is always "does not match" (§9 Q3), never an error.
fn filtered_match(config: &Config, kind: EntityKind, queue_id: &str, entity: &CrmEntity) -> bool {
    let Some(field_id) = config.bitrix24.uf_list_id.get(&kind) else {
        return false;
    };
    let Some(value) = entity.custom_field(field_id) else {
        return false;
    };
    let allowed = match kind {
        EntityKind::Lead => config.queue_lead_targets.get(queue_id),
        EntityKind::Deal => config.queue_deal_categories.get(queue_id),
        _ => None,
    };
    allowed.is_some_and(|values| values.iter().any(|v| v == &value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AmiSettings, Bitrix24Settings, Config};

    fn base_config() -> Config {
        let mut binding_policy = HashMap::new();
        binding_policy.insert(EntityKind::Lead, BindingMode::All);
        binding_policy.insert(EntityKind::Deal, BindingMode::Filtered);
        binding_policy.insert(EntityKind::Contact, BindingMode::None);

        let mut uf_list_id = HashMap::new();
        uf_list_id.insert(EntityKind::Lead, "UF_LEAD_TARGET".to_string());
        uf_list_id.insert(EntityKind::Deal, "UF_DEAL_CATEGORY".to_string());

        let mut queue_deal_categories = HashMap::new();
        queue_deal_categories.insert("701".to_string(), vec!["3".to_string()]);
        let mut queue_lead_targets = HashMap::new();
        queue_lead_targets.insert("701".to_string(), vec!["12".to_string()]);

        Config {
            ami: AmiSettings {
                host: "127.0.0.1".into(),
                port: 5038,
                username: "u".into(),
                secret: "s".into(),
            },
            mp3_dir: "/tmp".into(),
            allowed_extens: vec![],
            event_handling: HashMap::new(),
            queue_names: HashMap::new(),
            queue_deal_categories,
            queue_lead_targets,
            bitrix24: Bitrix24Settings {
                webhook_url: "https://example.test/rest/1/x".into(),
                call_admin_id: "1".into(),
                uf_list_id,
            },
            binding_policy,
            lead_target_ids: HashMap::new(),
            entity_type_labels: HashMap::new(),
            entity_type_endpoints: HashMap::new(),
            log_ami_events: false,
            logging_sections: vec![],
        }
    }

    fn entity(id: &str, custom: Option<(&str, &str)>) -> CrmEntity {
        let mut custom_fields = HashMap::new();
        if let Some((key, value)) = custom {
            custom_fields.insert(key.to_string(), serde_json::Value::String(value.to_string()));
        }
        CrmEntity {
            id: id.to_string(),
            title: None,
            status_id: None,
            category_id: None,
            custom_fields,
        }
    }

    #[test]
    fn all_mode_adds_unbound_entities_only() {
        let config = base_config();
        let mut known = HashMap::new();
        known.insert(EntityKind::Lead, vec![entity("1", None), entity("2", None)]);
        let existing = vec![ActivityBinding {
            entity_id: "1".to_string(),
            entity_type_id: EntityKind::Lead.entity_type_id(),
        }];

        let plan = compute_binding_plan(&config, "701", &known, None, &existing);
        assert_eq!(
            plan,
            vec![BindingAction::Add {
                kind: EntityKind::Lead,
                entity_id: "2".to_string()
            }]
        );
    }

    #[test]
    fn filtered_mode_adds_matching_and_deletes_non_matching() {
        let config = base_config();
        let mut known = HashMap::new();
        known.insert(
            EntityKind::Deal,
            vec![
                entity("10", Some(("UF_DEAL_CATEGORY", "3"))),
                entity("11", Some(("UF_DEAL_CATEGORY", "9"))),
            ],
        );
        let plan = compute_binding_plan(&config, "701", &known, None, &[]);
        assert!(plan.contains(&BindingAction::Add {
            kind: EntityKind::Deal,
            entity_id: "10".to_string()
        }));
        assert!(plan.contains(&BindingAction::Delete {
            kind: EntityKind::Deal,
            entity_id: "11".to_string()
        }));
    }

    #[test]
    fn filtered_mode_treats_missing_field_as_no_match() {
        let config = base_config();
        let mut known = HashMap::new();
        known.insert(EntityKind::Deal, vec![entity("10", None)]);
        let plan = compute_binding_plan(&config, "701", &known, None, &[]);
        assert_eq!(
            plan,
            vec![BindingAction::Delete {
                kind: EntityKind::Deal,
                entity_id: "10".to_string()
            }]
        );
    }

    #[test]
    fn none_mode_deletes_every_known_entity() {
        let config = base_config();
        let mut known = HashMap::new();
        known.insert(EntityKind::Contact, vec![entity("5", None)]);
        let plan = compute_binding_plan(&config, "701", &known, None, &[]);
        assert_eq!(
            plan,
            vec![BindingAction::Delete {
                kind: EntityKind::Contact,
                entity_id: "5".to_string()
            }]
        );
    }

    #[test]
    fn newly_created_lead_is_synthesized_with_queue_target() {
        let config = base_config();
        let known = HashMap::new();
        let plan = compute_binding_plan(&config, "701", &known, Some("99"), &[]);
        assert_eq!(
            plan,
            vec![BindingAction::Add {
                kind: EntityKind::Lead,
                entity_id: "99".to_string()
            }]
        );
    }

    #[test]
    fn plan_is_idempotent_against_a_stable_bindings_snapshot() {
        let config = base_config();
        let mut known = HashMap::new();
        known.insert(EntityKind::Lead, vec![entity("1", None)]);
        let existing = vec![ActivityBinding {
            entity_id: "1".to_string(),
            entity_type_id: EntityKind::Lead.entity_type_id(),
        }];
        let plan = compute_binding_plan(&config, "701", &known, None, &existing);
        assert!(plan.is_empty());
    }
}

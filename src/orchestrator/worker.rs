use crate::audio;
use crate::config::Config;
use crate::crm::endpoints::binding::{AddActivityBinding, DeleteActivityBinding, ListActivityBindings};
use crate::crm::endpoints::call::{FinishCall, HideCallWindow, RegisterCall, ShowCallWindow, UpdateActivity};
use crate::crm::endpoints::lead::{CreateLead, GetLead, NewLead, UpdateLead};
use crate::crm::endpoints::user::FindUserByInternalExtension;
use crate::crm::CrmClient;
use crate::orchestrator::binding::{compute_binding_plan, BindingAction};
use crate::orchestrator::call_state::{CallState, CallStatus};
use crate::orchestrator::enrichment::{enrich_caller, push_caller_id_name};
use crate::pbx::{AmiClient, Event};
use chrono::Utc;
use std::path::Path;
use tracing::{debug, error, info, warn};

/// Extracts the agent's internal extension from an AMI `Interface` header of the form
/// `Local/<ext>@from-queue/n` (see `handle_agent_connect`/`handle_agent_complete`).
fn parse_agent_extension(interface: &str) -> Option<String> {
    let rest = interface.strip_prefix("Local/")?;
    let digits: String = rest.chars().take_while(|c| c.is_ascii_digit()).collect();
    if digits.is_empty() {
        None
    } else {
        Some(digits)
    }
}

/// §4.6: only the `Hangup` for the call's own leg tears it down; other legs sharing the
/// same `Linkedid` (e.g. a transient `Local/` channel) are routed here too but must not
/// finalize the call.
fn hangup_matches_call(e: &crate::pbx::event::HangupEvent, correlation_id: &str) -> bool {
    e.uniqueid() == Some(correlation_id)
}

/// Drives one call's state machine (§4.5) to completion. Owns the call's `CallState`
/// and processes its events strictly in arrival order — the per-call FIFO ordering
/// the orchestrator's dispatch layer guarantees (§5, P2).
pub struct CallWorker {
    pub state: CallState,
}

impl CallWorker {
    pub fn new(state: CallState) -> Self {
        CallWorker { state }
    }

    /// Processes one event. Returns `true` once the call has been finalized and the
    /// worker should be torn down.
    pub async fn handle_event(
        &mut self,
        event: &Event,
        crm: &CrmClient,
        ami: &AmiClient,
        config: &Config,
    ) -> bool {
        match event {
            Event::TimeRule(e) => {
                self.state.time_rule = e.time_rule().map(str::to_string);
                false
            }
            Event::TimeGroup(e) => {
                self.state.time_group = e.time_group().map(str::to_string);
                false
            }
            Event::IvrChoose(e) => {
                if let Some(choice) = e.choice() {
                    self.state.ivr_choices.push(choice.to_string());
                }
                false
            }
            Event::QueueCallerJoin(e) => {
                if self.state.status != CallStatus::Enriched {
                    warn!(call = %self.state.correlation_id, status = ?self.state.status, "QueueCallerJoin in unexpected state, ignoring");
                    return false;
                }
                self.handle_queue_join(e.queue(), crm, config).await;
                false
            }
            Event::DialBegin(e) => {
                self.handle_dial_begin(e, crm, config).await;
                false
            }
            Event::DialEnd(e) => {
                self.handle_dial_end(e);
                false
            }
            Event::AgentConnect(e) => {
                self.handle_agent_connect(e, crm, config).await;
                false
            }
            Event::AgentComplete(e) => {
                self.handle_agent_complete(e);
                false
            }
            Event::VarSet(e) => {
                if e.variable() == Some("MIXMONITOR_FILENAME") {
                    self.state.recording_raw_path = e.value().map(str::to_string);
                }
                false
            }
            Event::Hangup(e) => {
                if !hangup_matches_call(e, &self.state.correlation_id) {
                    debug!(call = %self.state.correlation_id, leg = ?e.uniqueid(), "Hangup for a non-matching leg, ignoring");
                    return false;
                }
                self.state.end_cause = e.cause().map(str::to_string);
                if self.state.end_cause_text.is_none() {
                    self.state.end_cause_text = e.cause_txt().map(str::to_string);
                }
                self.finalize(crm, ami, config).await;
                true
            }
            Event::NewChannel(_) | Event::Other(_) => false,
        }
    }

    async fn handle_queue_join(&mut self, queue: Option<&str>, crm: &CrmClient, config: &Config) {
        let Some(queue_id) = queue else {
            error!(call = %self.state.correlation_id, "QueueCallerJoin missing Queue header");
            return;
        };
        self.state.queue_id = Some(queue_id.to_string());
        self.state.queue_name = Some(
            config
                .queue_names
                .get(queue_id)
                .cloned()
                .unwrap_or_else(|| "Unknown queue".to_string()),
        );
        self.state.status = CallStatus::Queued;

        let target_ids = config.queue_lead_targets.get(queue_id).cloned().unwrap_or_default();
        let list_field_id = target_ids.first().cloned().unwrap_or_default();

        let registered = match crm
            .hit(RegisterCall {
                user_id: config.bitrix24.call_admin_id.clone(),
                phone_number: self.state.caller_number.clone(),
                direction: self.state.direction,
                line_number: self.state.dialed_extension.clone(),
            })
            .await
        {
            Ok(r) => r,
            Err(e) => {
                error!(call = %self.state.correlation_id, error = %e, "call registration failed");
                return;
            }
        };
        self.state.crm_call_id = Some(registered.call_id.clone());

        let auto_created_lead = registered
            .crm_created_lead
            .as_deref()
            .zip(registered.crm_created_entities.as_ref().and_then(|v| v.first()))
            .filter(|(lead_id, entity)| {
                *lead_id == entity.entity_id && entity.entity_type.eq_ignore_ascii_case("lead")
            })
            .map(|(_, entity)| entity.entity_id.clone());

        if let Some(lead_id) = auto_created_lead {
            if self.state.known_entities.values().all(|v| v.is_empty()) {
                self.rename_autocreated_lead(&lead_id, &list_field_id, crm, config).await;
            }
        } else {
            let has_matching_lead = self
                .state
                .known_entities
                .get(&crate::crm::types::EntityKind::Lead)
                .map(|entities| self.entity_field_matches(entities, crate::crm::types::EntityKind::Lead, config, &[list_field_id.clone()]))
                .unwrap_or(false);
            let deal_categories = config
                .queue_deal_categories
                .get(queue_id)
                .cloned()
                .unwrap_or_default();
            let has_matching_deal = self
                .state
                .known_entities
                .get(&crate::crm::types::EntityKind::Deal)
                .map(|entities| self.entity_field_matches(entities, crate::crm::types::EntityKind::Deal, config, &deal_categories))
                .unwrap_or(false);

            if !has_matching_lead && !has_matching_deal {
                self.create_fallback_lead(queue_id, &list_field_id, crm, config).await;
            }
        }
    }

    /// `_check_caller_b24_entities`: does any entity of `kind` carry its configured
    /// target/category custom field value among `allowed`?
    fn entity_field_matches(
        &self,
        entities: &[crate::crm::types::CrmEntity],
        kind: crate::crm::types::EntityKind,
        config: &Config,
        allowed: &[String],
    ) -> bool {
        let Some(field_id) = config.bitrix24.uf_list_id.get(&kind) else {
            return false;
        };
        entities.iter().any(|e| {
            e.custom_field(field_id)
                .is_some_and(|value| allowed.iter().any(|a| a == &value))
        })
    }

    async fn rename_autocreated_lead(
        &self,
        lead_id: &str,
        list_field_id: &str,
        crm: &CrmClient,
        config: &Config,
    ) {
        let old_title = match crm.hit(GetLead { lead_id: lead_id.to_string() }).await {
            Ok(lead) => lead.title,
            Err(e) => {
                warn!(lead_id, error = %e, "failed to fetch lead title before rename");
                String::new()
            }
        };
        let queue_name = self.state.queue_name.clone().unwrap_or_default();
        let Some(uf_field) = config.bitrix24.uf_list_id.get(&crate::crm::types::EntityKind::Lead) else {
            return;
        };
        let fields = vec![
            ("TITLE".to_string(), format!("{queue_name} - {old_title}")),
            (uf_field.clone(), list_field_id.to_string()),
        ];
        if let Err(e) = crm.hit(UpdateLead { lead_id: lead_id.to_string(), fields }).await {
            warn!(lead_id, error = %e, "failed to rename auto-created lead");
        }
    }

    async fn create_fallback_lead(
        &mut self,
        queue_id: &str,
        list_field_id: &str,
        crm: &CrmClient,
        config: &Config,
    ) {
        let Some(uf_field) = config.bitrix24.uf_list_id.get(&crate::crm::types::EntityKind::Lead) else {
            return;
        };
        let queue_name = self.state.queue_name.clone().unwrap_or_default();
        let fullname = self
            .state
            .contact_display_name
            .clone()
            .unwrap_or_else(|| self.state.caller_number.clone());
        let title = format!("{queue_name} - {fullname} - {}", self.state.direction.label());
        let contact_id = if self.state.contact_display_name.is_some() {
            self.state.contact_id.clone()
        } else {
            None
        };

        let new_lead = NewLead {
            title,
            phone: self.state.caller_number.clone(),
            source_description: format!("{} to number {}", self.state.direction.label(), self.state.dialed_extension),
            lead_target_field_id: uf_field.clone(),
            lead_target_value: list_field_id.to_string(),
            contact_id,
        };

        match crm.hit(CreateLead(new_lead)).await {
            Ok(lead_id) => {
                // Title and lead-target field are already set in full by `NewLead` above
                // (§4.4 step 5 describes a single creation-time title, unlike the
                // auto-created-lead path in `rename_autocreated_lead`, which renames a
                // title the CRM set on its own) — no follow-up rename here.
                self.state.newly_created_lead_id = Some(lead_id);
                let _ = queue_id;
            }
            Err(e) => error!(call = %self.state.correlation_id, error = %e, "failed to create fallback lead"),
        }
    }

    async fn handle_dial_begin(
        &mut self,
        e: &crate::pbx::event::DialBeginEvent,
        crm: &CrmClient,
        config: &Config,
    ) {
        let now = Utc::now();
        let is_agent_leg = e.uniqueid().is_some() && e.uniqueid() == e.linkedid();

        if is_agent_leg {
            if let Some(ext) = e.dest_exten() {
                self.state.record_dial_attempt(ext, now, None);
            }
        } else if let Some(ext) = e.dest_caller_id_num() {
            self.state.record_dial_attempt(ext, now, None);
            self.state.notify_agent(ext);
            if let Some(user_id) = self.user_id_for_extension(ext, crm, config).await {
                if let Some(call_id) = &self.state.crm_call_id {
                    if let Err(err) = crm.hit(ShowCallWindow { call_id: call_id.clone(), user_id }).await {
                        warn!(ext, error = %err, "failed to open CRM call window for agent");
                    }
                }
            }
        }
        self.state.status = CallStatus::Ringing;
    }

    fn handle_dial_end(&mut self, e: &crate::pbx::event::DialEndEvent) {
        if e.dest_caller_id_num() == Some(self.state.dialed_extension.as_str()) {
            return;
        }
        if let Some(ext) = e.dest_caller_id_num() {
            self.state.record_dial_attempt(
                ext,
                Utc::now(),
                e.dial_status().map(str::to_string),
            );
        }
    }

    async fn handle_agent_connect(
        &mut self,
        e: &crate::pbx::event::AgentConnectEvent,
        crm: &CrmClient,
        config: &Config,
    ) {
        let agent_ext = e.interface().and_then(parse_agent_extension);

        let Some(agent_ext) = agent_ext else {
            error!(call = %self.state.correlation_id, "could not parse agent extension from AgentConnect Interface header");
            return;
        };

        for ext in self.state.take_notified_except(&agent_ext) {
            if let (Some(user_id), Some(call_id)) = (
                self.user_id_for_extension(&ext, crm, config).await,
                self.state.crm_call_id.clone(),
            ) {
                if let Err(err) = crm.hit(HideCallWindow { call_id, user_id }).await {
                    warn!(ext = %ext, error = %err, "failed to close CRM call window");
                }
            }
        }

        self.state.stamp_answer(&agent_ext, Utc::now());
    }

    fn handle_agent_complete(&mut self, e: &crate::pbx::event::AgentCompleteEvent) {
        let agent_ext = e
            .interface()
            .and_then(parse_agent_extension)
            .unwrap_or_else(|| "Unknown".to_string());
        let talk_time = e.talk_time().and_then(|v| v.parse().ok()).unwrap_or(0);
        self.state.record_agent_completion(
            &agent_ext,
            e.reason().unwrap_or("Unknown"),
            talk_time,
        );
    }

    async fn user_id_for_extension(&mut self, ext: &str, crm: &CrmClient, config: &Config) -> Option<String> {
        if let Some(user_id) = self.state.user_id_by_ext.get(ext) {
            return Some(user_id.clone());
        }
        let _ = config;
        match crm.hit(FindUserByInternalExtension { internal_extension: ext.to_string() }).await {
            Ok(Some(user_id)) => {
                self.state.user_id_by_ext.insert(ext.to_string(), user_id.clone());
                Some(user_id)
            }
            Ok(None) => {
                warn!(ext, "no CRM user found for internal extension");
                None
            }
            Err(e) => {
                warn!(ext, error = %e, "failed to resolve CRM user for extension");
                None
            }
        }
    }

    /// §4.6: duration/encode/finish/bind/attach, in that order. Every step logs and
    /// moves on regardless of outcome — finalization never aborts partway (§7).
    async fn finalize(&mut self, crm: &CrmClient, ami: &AmiClient, config: &Config) {
        let _ = ami;
        self.state.ended_at = Some(Utc::now());
        self.state.status = CallStatus::HungUp;

        if let Some(raw) = &self.state.recording_raw_path {
            let mp3_root = Path::new(&config.mp3_dir);
            self.state.recording_encoded_path = audio::convert_wav_to_mp3(Path::new(raw), mp3_root)
                .map(|p| p.display().to_string());
        }

        let finalizing_user_id = match &self.state.accepted_by {
            Some(agent_ext) => self
                .user_id_for_extension(agent_ext, crm, config)
                .await
                .unwrap_or_else(|| config.bitrix24.call_admin_id.clone()),
            None => config.bitrix24.call_admin_id.clone(),
        };

        for ext in self.state.take_notified_except("") {
            if let (Some(user_id), Some(call_id)) = (
                self.user_id_for_extension(&ext, crm, config).await,
                self.state.crm_call_id.clone(),
            ) {
                let _ = crm.hit(HideCallWindow { call_id, user_id }).await;
            }
        }

        let Some(call_id) = self.state.crm_call_id.clone() else {
            warn!(call = %self.state.correlation_id, "finalizing a call with no CRM CALL_ID, skipping CRM writes");
            self.state.status = CallStatus::Finalized;
            return;
        };

        match crm
            .hit(FinishCall {
                call_id: call_id.clone(),
                user_id: finalizing_user_id,
                duration_secs: self.state.answer_duration_secs(),
            })
            .await
        {
            Ok(finished) => self.state.crm_activity_id = Some(finished.crm_activity_id),
            Err(e) => error!(call = %self.state.correlation_id, error = %e, "failed to finish CRM call"),
        }

        self.run_binding_engine(&call_id, crm, config).await;

        if let (Some(path), Some(activity_id)) = (
            self.state.recording_encoded_path.clone(),
            self.state.crm_activity_id.clone(),
        ) {
            match crm.upload_recording(&call_id, Path::new(&path)).await {
                Ok(()) => {
                    if let Err(e) = crm
                        .hit(UpdateActivity {
                            activity_id,
                            fields: vec![("COMPLETED".to_string(), "Y".to_string())],
                        })
                        .await
                    {
                        warn!(call = %self.state.correlation_id, error = %e, "failed to mark CRM activity completed");
                    }
                }
                Err(e) => warn!(call = %self.state.correlation_id, error = %e, "failed to attach recording, leaving activity open"),
            }
        }

        self.state.status = CallStatus::Finalized;
        info!(call = %self.state.correlation_id, duration = self.state.duration_secs(), "call finalized");
    }

    async fn run_binding_engine(&self, activity_id: &str, crm: &CrmClient, config: &Config) {
        let existing = match crm.hit(ListActivityBindings { activity_id: activity_id.to_string() }).await {
            Ok(bindings) => bindings,
            Err(e) => {
                warn!(call = %self.state.correlation_id, error = %e, "failed to list existing bindings");
                Vec::new()
            }
        };

        let queue_id = self.state.queue_id.clone().unwrap_or_default();
        let plan = compute_binding_plan(
            config,
            &queue_id,
            &self.state.known_entities,
            self.state.newly_created_lead_id.as_deref(),
            &existing,
        );

        for action in plan {
            let result = match action {
                BindingAction::Add { kind, entity_id } => {
                    crm.hit(AddActivityBinding {
                        activity_id: activity_id.to_string(),
                        entity_type_id: kind.entity_type_id(),
                        entity_id,
                    })
                    .await
                }
                BindingAction::Delete { kind, entity_id } => {
                    crm.hit(DeleteActivityBinding {
                        activity_id: activity_id.to_string(),
                        entity_type_id: kind.entity_type_id(),
                        entity_id,
                    })
                    .await
                }
            };
            if let Err(e) = result {
                warn!(call = %self.state.correlation_id, error = %e, "binding write failed");
            }
        }
    }
}

/// Runs enrichment for a newly-created call and pushes the formatted CallerID name
/// back to the PBX (§4.3). Called once, right after `CallState::new`.
pub async fn enrich_new_call(state: &mut CallState, crm: &CrmClient, ami: &AmiClient, config: &Config) {
    let result = enrich_caller(crm, config, &state.caller_number).await;
    state.contact_id = result.contact_id;
    state.contact_display_name = result.contact_display_name;
    state.known_entities = result.known_entities;
    state.status = CallStatus::Enriched;

    push_caller_id_name(ami, &state.correlation_id, &state.channel, &result.caller_id_name);
    debug!(call = %state.correlation_id, caller_id_name = %result.caller_id_name, "enrichment complete");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pbx::event::{HangupEvent, RawEvent};
    use std::collections::HashMap;

    fn hangup(uniqueid: &str, linkedid: &str) -> HangupEvent {
        let mut headers = HashMap::new();
        headers.insert("Uniqueid".to_string(), uniqueid.to_string());
        headers.insert("Linkedid".to_string(), linkedid.to_string());
        HangupEvent {
            raw: RawEvent {
                name: "Hangup".to_string(),
                headers,
            },
        }
    }

    #[test]
    fn parses_extension_from_local_interface() {
        assert_eq!(parse_agent_extension("Local/201@from-queue/n"), Some("201".to_string()));
        assert_eq!(parse_agent_extension("SIP/201-0001"), None);
        assert_eq!(parse_agent_extension("Local/@from-queue/n"), None);
    }

    #[test]
    fn hangup_for_the_calls_own_leg_matches() {
        let e = hangup("A", "A");
        assert!(hangup_matches_call(&e, "A"));
    }

    #[test]
    fn hangup_for_a_different_leg_on_the_same_linkedid_does_not_match() {
        // A transient Local/ channel hanging up shares Linkedid "A" with the call but
        // carries its own Uniqueid "B" — finalization must not trigger here.
        let e = hangup("B", "A");
        assert!(!hangup_matches_call(&e, "A"));
    }
}

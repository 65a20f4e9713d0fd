use crate::crm::types::{CallDirection, CrmEntity, EntityKind};
use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// State-machine states, §4.5.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallStatus {
    New,
    Enriched,
    Queued,
    Ringing,
    Answered,
    Unanswered,
    HungUp,
    Finalized,
}

#[derive(Clone, Debug)]
pub struct DialAttempt {
    pub at: DateTime<Utc>,
    pub status: Option<String>,
}

#[derive(Clone, Debug)]
pub struct AgentCompletion {
    pub agent_ext: String,
    pub reason: String,
    pub talk_time_secs: i64,
}

/// One live call. Created on `Newchannel` for an allowed source extension, mutated
/// only through the named operations below, discarded once finalization (§4.6)
/// completes. See SPEC_FULL.md §3 for the full invariant list (I1-I7).
pub struct CallState {
    pub correlation_id: String,
    pub direction: CallDirection,
    pub caller_number: String,
    pub dialed_extension: String,
    pub channel: String,

    pub contact_id: Option<String>,
    pub contact_display_name: Option<String>,
    pub known_entities: HashMap<EntityKind, Vec<CrmEntity>>,
    pub newly_created_lead_id: Option<String>,

    pub queue_id: Option<String>,
    pub queue_name: Option<String>,

    /// internal extension -> ordered dial attempts (`available_agents`/`used_agents`
    /// in the original).
    pub dial_attempts: HashMap<String, Vec<DialAttempt>>,
    pub accepted_by: Option<String>,
    pub user_id_by_ext: HashMap<String, String>,

    pub crm_call_id: Option<String>,
    pub crm_activity_id: Option<String>,

    pub started_at: DateTime<Utc>,
    pub answered_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,

    pub recording_raw_path: Option<String>,
    pub recording_encoded_path: Option<String>,

    pub end_cause: Option<String>,
    pub end_cause_text: Option<String>,

    pub status: CallStatus,

    pub time_rule: Option<String>,
    pub time_group: Option<String>,
    pub ivr_choices: Vec<String>,

    pub agent_completions: Vec<AgentCompletion>,
    pub notified_agents: Vec<String>,
}

impl CallState {
    pub fn new(
        correlation_id: impl Into<String>,
        direction: CallDirection,
        caller_number: impl Into<String>,
        dialed_extension: impl Into<String>,
        channel: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        CallState {
            correlation_id: correlation_id.into(),
            direction,
            caller_number: caller_number.into(),
            dialed_extension: dialed_extension.into(),
            channel: channel.into(),
            contact_id: None,
            contact_display_name: None,
            known_entities: HashMap::new(),
            newly_created_lead_id: None,
            queue_id: None,
            queue_name: None,
            dial_attempts: HashMap::new(),
            accepted_by: None,
            user_id_by_ext: HashMap::new(),
            crm_call_id: None,
            crm_activity_id: None,
            started_at,
            answered_at: None,
            ended_at: None,
            recording_raw_path: None,
            recording_encoded_path: None,
            end_cause: None,
            end_cause_text: None,
            status: CallStatus::New,
            time_rule: None,
            time_group: None,
            ivr_choices: Vec::new(),
            agent_completions: Vec::new(),
            notified_agents: Vec::new(),
        }
    }

    pub fn record_dial_attempt(&mut self, extension: &str, at: DateTime<Utc>, status: Option<String>) {
        self.dial_attempts
            .entry(extension.to_string())
            .or_default()
            .push(DialAttempt { at, status });
    }

    pub fn notify_agent(&mut self, extension: &str) {
        if !self.notified_agents.iter().any(|e| e == extension) {
            self.notified_agents.push(extension.to_string());
        }
    }

    /// Returns every notified agent extension except `accepted`, and drops them from
    /// the notified set — used on `AgentConnect` to know which call windows remain to
    /// be hidden (§4.5).
    pub fn take_notified_except(&mut self, accepted: &str) -> Vec<String> {
        let (keep, drop): (Vec<_>, Vec<_>) = self
            .notified_agents
            .drain(..)
            .partition(|ext| ext == accepted);
        self.notified_agents = keep;
        drop
    }

    pub fn stamp_answer(&mut self, agent_ext: &str, at: DateTime<Utc>) {
        self.accepted_by = Some(agent_ext.to_string());
        self.answered_at = Some(at);
        self.status = CallStatus::Answered;
    }

    pub fn record_agent_completion(&mut self, agent_ext: &str, reason: &str, talk_time_secs: i64) {
        self.agent_completions.push(AgentCompletion {
            agent_ext: agent_ext.to_string(),
            reason: reason.to_string(),
            talk_time_secs,
        });
    }

    pub fn duration_secs(&self) -> i64 {
        self.ended_at
            .map(|end| (end - self.started_at).num_seconds())
            .unwrap_or(0)
    }

    pub fn answer_duration_secs(&self) -> i64 {
        match (self.answered_at, self.ended_at) {
            (Some(answered), Some(ended)) => (ended - answered).num_seconds(),
            _ => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn fresh() -> CallState {
        CallState::new(
            "uid-1",
            CallDirection::Inbound,
            "+15550000",
            "0001",
            "SIP/0001-1",
            at(1_000),
        )
    }

    #[test]
    fn answer_duration_is_zero_when_unanswered() {
        let mut call = fresh();
        call.ended_at = Some(at(1_050));
        assert_eq!(call.answer_duration_secs(), 0);
        assert_eq!(call.duration_secs(), 50);
    }

    #[test]
    fn answer_duration_computed_when_answered() {
        let mut call = fresh();
        call.stamp_answer("201", at(1_010));
        call.ended_at = Some(at(1_040));
        assert_eq!(call.answer_duration_secs(), 30);
        assert_eq!(call.duration_secs(), 40);
    }

    #[test]
    fn take_notified_except_keeps_only_accepted_agent() {
        let mut call = fresh();
        call.notify_agent("201");
        call.notify_agent("202");
        call.notify_agent("203");
        let mut to_close = call.take_notified_except("202");
        to_close.sort();
        assert_eq!(to_close, vec!["201".to_string(), "203".to_string()]);
        assert_eq!(call.notified_agents, vec!["202".to_string()]);
    }
}

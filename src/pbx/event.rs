use std::collections::HashMap;

/// An unparsed AMI event: the event name plus every `Header: Value` line in its block.
#[derive(Clone, Debug, Default)]
pub struct RawEvent {
    pub name: String,
    pub headers: HashMap<String, String>,
}

impl RawEvent {
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers.get(key).map(String::as_str)
    }

    pub fn header_or<'a>(&'a self, key: &str, default: &'a str) -> &'a str {
        self.header(key).unwrap_or(default)
    }

    pub fn uniqueid(&self) -> Option<&str> {
        self.header("Uniqueid")
    }

    pub fn linkedid(&self) -> Option<&str> {
        self.header("Linkedid")
    }
}

macro_rules! event_header_struct {
    ($name:ident { $($field:ident => $header:literal),* $(,)? }) => {
        #[derive(Clone, Debug)]
        pub struct $name {
            pub raw: RawEvent,
        }

        impl $name {
            $(
                pub fn $field(&self) -> Option<&str> {
                    self.raw.header($header)
                }
            )*
        }
    };
}

event_header_struct!(NewChannelEvent {
    caller_id_num => "CallerIDNum",
    exten => "Exten",
    uniqueid => "Uniqueid",
    channel => "Channel",
});

event_header_struct!(TimeRuleEvent { time_rule => "TimeRule" });
event_header_struct!(TimeGroupEvent { time_group => "TimeGroup" });
event_header_struct!(IvrChooseEvent { choice => "IVRchoose" });

event_header_struct!(QueueCallerJoinEvent {
    queue => "Queue",
});

event_header_struct!(VarSetEvent {
    variable => "Variable",
    value => "Value",
});

event_header_struct!(AgentConnectEvent {
    uniqueid => "Uniqueid",
    interface => "Interface",
    queue => "Queue",
    member_name => "MemberName",
});

event_header_struct!(AgentCompleteEvent {
    uniqueid => "Uniqueid",
    interface => "Interface",
    reason => "Reason",
    queue => "Queue",
    talk_time => "TalkTime",
});

event_header_struct!(DialBeginEvent {
    uniqueid => "Uniqueid",
    linkedid => "Linkedid",
    dest_caller_id_num => "DestCallerIDNum",
    dest_caller_id_name => "DestCallerIDName",
    dest_uniqueid => "DestUniqueid",
    dest_exten => "DestExten",
});

event_header_struct!(DialEndEvent {
    dest_caller_id_num => "DestCallerIDNum",
    dest_caller_id_name => "DestCallerIDName",
    dial_status => "DialStatus",
});

event_header_struct!(HangupEvent {
    uniqueid => "Uniqueid",
    cause => "Cause",
    cause_txt => "Cause-txt",
});

/// A demultiplexed PBX event. Unrecognized event names, or events for a kind the
/// configured `[EventHandling]` section has not enabled, surface as `Other` and are
/// dropped by the orchestrator without error (§4.1).
#[derive(Clone, Debug)]
pub enum Event {
    NewChannel(NewChannelEvent),
    TimeRule(TimeRuleEvent),
    TimeGroup(TimeGroupEvent),
    IvrChoose(IvrChooseEvent),
    QueueCallerJoin(QueueCallerJoinEvent),
    VarSet(VarSetEvent),
    AgentConnect(AgentConnectEvent),
    AgentComplete(AgentCompleteEvent),
    DialBegin(DialBeginEvent),
    DialEnd(DialEndEvent),
    Hangup(HangupEvent),
    Other(RawEvent),
}

impl Event {
    pub fn from_raw(raw: RawEvent) -> Self {
        match raw.name.as_str() {
            "Newchannel" => Event::NewChannel(NewChannelEvent { raw }),
            "TimeRule" => Event::TimeRule(TimeRuleEvent { raw }),
            "TimeGroup" => Event::TimeGroup(TimeGroupEvent { raw }),
            "IVRchoose" => Event::IvrChoose(IvrChooseEvent { raw }),
            "QueueCallerJoin" => Event::QueueCallerJoin(QueueCallerJoinEvent { raw }),
            "VarSet" => Event::VarSet(VarSetEvent { raw }),
            "AgentConnect" => Event::AgentConnect(AgentConnectEvent { raw }),
            "AgentComplete" => Event::AgentComplete(AgentCompleteEvent { raw }),
            "DialBegin" => Event::DialBegin(DialBeginEvent { raw }),
            "DialEnd" => Event::DialEnd(DialEndEvent { raw }),
            "Hangup" => Event::Hangup(HangupEvent { raw }),
            _ => Event::Other(raw),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            Event::NewChannel(e) => &e.raw.name,
            Event::TimeRule(e) => &e.raw.name,
            Event::TimeGroup(e) => &e.raw.name,
            Event::IvrChoose(e) => &e.raw.name,
            Event::QueueCallerJoin(e) => &e.raw.name,
            Event::VarSet(e) => &e.raw.name,
            Event::AgentConnect(e) => &e.raw.name,
            Event::AgentComplete(e) => &e.raw.name,
            Event::DialBegin(e) => &e.raw.name,
            Event::DialEnd(e) => &e.raw.name,
            Event::Hangup(e) => &e.raw.name,
            Event::Other(e) => &e.name,
        }
    }

    /// The correlation id this event should be routed by: the per-leg id for
    /// `Newchannel`, the linked-call id for everything else (see §4.1).
    pub fn routing_id(&self) -> Option<&str> {
        match self {
            Event::NewChannel(e) => e.uniqueid(),
            other => other.raw().linkedid().or_else(|| other.raw().uniqueid()),
        }
    }

    pub fn raw(&self) -> &RawEvent {
        match self {
            Event::NewChannel(e) => &e.raw,
            Event::TimeRule(e) => &e.raw,
            Event::TimeGroup(e) => &e.raw,
            Event::IvrChoose(e) => &e.raw,
            Event::QueueCallerJoin(e) => &e.raw,
            Event::VarSet(e) => &e.raw,
            Event::AgentConnect(e) => &e.raw,
            Event::AgentComplete(e) => &e.raw,
            Event::DialBegin(e) => &e.raw,
            Event::DialEnd(e) => &e.raw,
            Event::Hangup(e) => &e.raw,
            Event::Other(e) => e,
        }
    }

    pub fn is_new_channel(&self) -> bool {
        matches!(self, Event::NewChannel(_))
    }

    pub fn as_new_channel(&self) -> Option<&NewChannelEvent> {
        match self {
            Event::NewChannel(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_hangup(&self) -> bool {
        matches!(self, Event::Hangup(_))
    }

    pub fn as_hangup(&self) -> Option<&HangupEvent> {
        match self {
            Event::Hangup(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_queue_caller_join(&self) -> bool {
        matches!(self, Event::QueueCallerJoin(_))
    }

    pub fn as_queue_caller_join(&self) -> Option<&QueueCallerJoinEvent> {
        match self {
            Event::QueueCallerJoin(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_dial_begin(&self) -> bool {
        matches!(self, Event::DialBegin(_))
    }

    pub fn as_dial_begin(&self) -> Option<&DialBeginEvent> {
        match self {
            Event::DialBegin(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_dial_end(&self) -> bool {
        matches!(self, Event::DialEnd(_))
    }

    pub fn as_dial_end(&self) -> Option<&DialEndEvent> {
        match self {
            Event::DialEnd(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_agent_connect(&self) -> bool {
        matches!(self, Event::AgentConnect(_))
    }

    pub fn as_agent_connect(&self) -> Option<&AgentConnectEvent> {
        match self {
            Event::AgentConnect(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_agent_complete(&self) -> bool {
        matches!(self, Event::AgentComplete(_))
    }

    pub fn as_agent_complete(&self) -> Option<&AgentCompleteEvent> {
        match self {
            Event::AgentComplete(e) => Some(e),
            _ => None,
        }
    }

    pub fn is_var_set(&self) -> bool {
        matches!(self, Event::VarSet(_))
    }

    pub fn as_var_set(&self) -> Option<&VarSetEvent> {
        match self {
            Event::VarSet(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(name: &str, headers: &[(&str, &str)]) -> RawEvent {
        RawEvent {
            name: name.to_string(),
            headers: headers
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn classifies_known_event_names() {
        let ev = Event::from_raw(raw("Newchannel", &[("Uniqueid", "123")]));
        assert!(ev.is_new_channel());
        assert_eq!(ev.as_new_channel().unwrap().uniqueid(), Some("123"));
    }

    #[test]
    fn unknown_event_name_becomes_other() {
        let ev = Event::from_raw(raw("SomeFutureEvent", &[]));
        assert!(matches!(ev, Event::Other(_)));
    }

    #[test]
    fn routing_id_prefers_linkedid_except_for_new_channel() {
        let nc = Event::from_raw(raw(
            "Newchannel",
            &[("Uniqueid", "A"), ("Linkedid", "A")],
        ));
        assert_eq!(nc.routing_id(), Some("A"));

        let hangup = Event::from_raw(raw(
            "Hangup",
            &[("Uniqueid", "B"), ("Linkedid", "A")],
        ));
        assert_eq!(hangup.routing_id(), Some("A"));
    }
}

use crate::crm::types::{BindingMode, EntityKind};
use ini::Ini;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read/parse config file: {0}")]
    Parse(#[from] ini::Error),

    #[error("missing required section [{0}]")]
    MissingSection(String),

    #[error("missing required key `{key}` in section [{section}]")]
    MissingKey { section: String, key: String },

    #[error("invalid value for `{key}` in section [{section}]: {value}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

#[derive(Clone, Debug)]
pub struct AmiSettings {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub secret: String,
}

#[derive(Clone, Debug)]
pub struct Bitrix24Settings {
    pub webhook_url: String,
    pub call_admin_id: String,
    /// entity kind -> id of the custom field that holds its target/category value.
    pub uf_list_id: HashMap<EntityKind, String>,
}

#[derive(Clone, Debug)]
pub struct EntityTypeEndpoint {
    pub label: String,
    pub request: String,
}

/// Typed, immutable view over the daemon's sectioned configuration file.
///
/// Parsed once at startup; mirrors the section layout of the original system's
/// `config.ini` (see `config_manager.py`), one typed accessor per section.
#[derive(Clone, Debug)]
pub struct Config {
    pub ami: AmiSettings,
    pub mp3_dir: String,
    pub allowed_extens: Vec<String>,
    pub event_handling: HashMap<String, bool>,
    pub queue_names: HashMap<String, String>,
    pub queue_deal_categories: HashMap<String, Vec<String>>,
    pub queue_lead_targets: HashMap<String, Vec<String>>,
    pub bitrix24: Bitrix24Settings,
    pub binding_policy: HashMap<EntityKind, BindingMode>,
    pub lead_target_ids: HashMap<String, String>,
    pub entity_type_labels: HashMap<EntityKind, String>,
    pub entity_type_endpoints: HashMap<EntityKind, EntityTypeEndpoint>,
    pub log_ami_events: bool,
    pub logging_sections: Vec<LoggingSection>,
}

#[derive(Clone, Debug)]
pub struct LoggingSection {
    pub name: String,
    pub target: String,
    pub level: String,
    pub file: String,
}

fn parse_csv(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|item| item.trim().trim_matches('\'').to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

fn section<'a>(ini: &'a Ini, name: &str) -> Result<&'a ini::Properties, ConfigError> {
    ini.section(Some(name))
        .ok_or_else(|| ConfigError::MissingSection(name.to_string()))
}

fn required<'a>(
    props: &'a ini::Properties,
    section: &str,
    key: &str,
) -> Result<&'a str, ConfigError> {
    props.get(key).ok_or_else(|| ConfigError::MissingKey {
        section: section.to_string(),
        key: key.to_string(),
    })
}

impl Config {
    /// Loads configuration from the given path. The daemon's `main` defaults this to
    /// `config.ini` next to the executable; tests point it at fixture files directly.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let ami_props = section(ini, "AMI")?;
        let ami = AmiSettings {
            host: required(ami_props, "AMI", "host")?.to_string(),
            port: required(ami_props, "AMI", "port")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    section: "AMI".to_string(),
                    key: "port".to_string(),
                    value: ami_props.get("port").unwrap_or_default().to_string(),
                })?,
            username: required(ami_props, "AMI", "username")?.to_string(),
            secret: required(ami_props, "AMI", "secret")?.to_string(),
        };

        let records_props = section(ini, "Records")?;
        let mp3_dir = required(records_props, "Records", "mp3_dir")?.to_string();

        let allowed_extens = section(ini, "Allowed_Extens")
            .ok()
            .and_then(|p| p.get("extens"))
            .map(parse_csv)
            .unwrap_or_default();

        let event_handling = ini
            .section(Some("EventHandling"))
            .map(|p| {
                p.iter()
                    .map(|(k, v)| (k.to_string(), v.eq_ignore_ascii_case("true")))
                    .collect()
            })
            .unwrap_or_default();

        let queue_names = ini
            .section(Some("QueueNames"))
            .map(|p| p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
            .unwrap_or_default();

        let queue_deal_categories = ini
            .section(Some("QueueB24DealCategories"))
            .map(|p| {
                p.iter()
                    .map(|(k, v)| (k.to_string(), parse_csv(v)))
                    .collect()
            })
            .unwrap_or_default();

        let queue_lead_targets = ini
            .section(Some("QueueB24LeadTarget"))
            .map(|p| {
                p.iter()
                    .map(|(k, v)| (k.to_string(), parse_csv(v)))
                    .collect()
            })
            .unwrap_or_default();

        let b24_props = section(ini, "Bitrix24")?;
        let mut uf_list_id = HashMap::new();
        for kind in EntityKind::ALL {
            let key = format!("{}_uf_list_id", kind.as_str());
            if let Some(value) = b24_props.get(key.as_str()) {
                uf_list_id.insert(kind, value.to_string());
            }
        }
        let bitrix24 = Bitrix24Settings {
            webhook_url: required(b24_props, "Bitrix24", "webhook_url")?.to_string(),
            call_admin_id: required(b24_props, "Bitrix24", "call_admin_id")?.to_string(),
            uf_list_id,
        };

        let binding_policy = ini
            .section(Some("Bitrix24_Binding_Call"))
            .map(|p| {
                p.iter()
                    .filter_map(|(k, v)| {
                        let kind = EntityKind::from_str(k)?;
                        let mode = BindingMode::parse(v)?;
                        Some((kind, mode))
                    })
                    .collect()
            })
            .unwrap_or_default();

        let lead_target_ids = ini
            .section(Some("Bitrix24_lead_Target_IDs"))
            .map(|p| p.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
            .unwrap_or_default();

        let entity_type_labels = ini
            .section(Some("EntityTypes"))
            .map(|p| {
                p.iter()
                    .filter_map(|(k, v)| Some((EntityKind::from_str(k)?, v.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        // Bitrix24EntityTypes is encoded as one flat section per entity kind, named
        // "Bitrix24EntityTypes.<kind>", each carrying `name` and `request` keys —
        // this crate's INI encoding of the original's nested ConfigObj subsections.
        let mut entity_type_endpoints = HashMap::new();
        for kind in EntityKind::ALL {
            let section_name = format!("Bitrix24EntityTypes.{}", kind.as_str());
            if let Some(props) = ini.section(Some(section_name.as_str())) {
                if let (Some(label), Some(request)) = (props.get("name"), props.get("request")) {
                    entity_type_endpoints.insert(
                        kind,
                        EntityTypeEndpoint {
                            label: label.to_string(),
                            request: request.to_string(),
                        },
                    );
                }
            }
        }

        let log_ami_events = ini
            .section(Some("Logging"))
            .and_then(|p| p.get("log_ami_events"))
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        let logging_sections = ini
            .sections()
            .filter_map(|name| name)
            .filter(|name| name.starts_with("Logger_"))
            .filter_map(|name| {
                let props = ini.section(Some(name))?;
                Some(LoggingSection {
                    name: name.to_string(),
                    target: props.get("target").unwrap_or("").to_string(),
                    level: props.get("level").unwrap_or("info").to_string(),
                    file: props.get("file").unwrap_or("daemon.log").to_string(),
                })
            })
            .collect();

        Ok(Config {
            ami,
            mp3_dir,
            allowed_extens,
            event_handling,
            queue_names,
            queue_deal_categories,
            queue_lead_targets,
            bitrix24,
            binding_policy,
            lead_target_ids,
            entity_type_labels,
            entity_type_endpoints,
            log_ami_events,
            logging_sections,
        })
    }

    pub fn is_event_enabled(&self, event_name: &str) -> bool {
        self.event_handling
            .get(event_name)
            .copied()
            .unwrap_or(false)
    }

    pub fn binding_mode(&self, kind: EntityKind) -> BindingMode {
        self.binding_policy.get(&kind).copied().unwrap_or(BindingMode::None)
    }

    /// `Bitrix24._find_id_by_value_in_list`: find the lead-target id whose configured
    /// label equals `value`.
    pub fn lead_target_id_for_label(&self, value: &str) -> Option<String> {
        self.lead_target_ids
            .iter()
            .find(|(_, label)| label.as_str() == value)
            .map(|(id, _)| id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_fixture(contents: &str) -> tempfile_path::TempIni {
        tempfile_path::TempIni::new(contents)
    }

    mod tempfile_path {
        use std::io::Write;
        pub struct TempIni {
            pub path: std::path::PathBuf,
        }
        impl TempIni {
            pub fn new(contents: &str) -> Self {
                let mut path = std::env::temp_dir();
                path.push(format!("callbridge-test-{}.ini", std::process::id()));
                let mut f = std::fs::File::create(&path).unwrap();
                f.write_all(contents.as_bytes()).unwrap();
                TempIni { path }
            }
        }
        impl Drop for TempIni {
            fn drop(&mut self) {
                let _ = std::fs::remove_file(&self.path);
            }
        }
    }

    const FIXTURE: &str = r#"
[AMI]
host = 127.0.0.1
port = 5038
username = admin
secret = secret

[Records]
mp3_dir = /var/spool/calls

[Allowed_Extens]
extens = 0001, 0002

[EventHandling]
Newchannel = true
QueueCallerJoin = true

[QueueNames]
701 = Sales

[QueueB24DealCategories]
701 = 3,4

[QueueB24LeadTarget]
701 = 12,13

[Bitrix24]
webhook_url = https://example.bitrix24.ru/rest/1/abcdef
call_admin_id = 1
lead_uf_list_id = UF_CRM_LEAD_TARGET
deal_uf_list_id = UF_CRM_DEAL_TARGET

[Bitrix24_Binding_Call]
lead = ALL
deal = FILTERED
contact = NONE

[Bitrix24_lead_Target_IDs]
12 = Sales inbound

[EntityTypes]
lead = Lead
deal = Deal

[Bitrix24EntityTypes.lead]
name = Lead
request = crm.lead.list

[Bitrix24EntityTypes.deal]
name = Deal
request = crm.deal.list

[Logger_Incoming_Calls]
target = callbridge::orchestrator
level = debug
file = incoming.log
"#;

    #[test]
    fn parses_full_fixture() {
        let fixture = write_fixture(FIXTURE);
        let cfg = Config::load(&fixture.path).expect("config should parse");

        assert_eq!(cfg.ami.host, "127.0.0.1");
        assert_eq!(cfg.ami.port, 5038);
        assert_eq!(cfg.allowed_extens, vec!["0001", "0002"]);
        assert!(cfg.is_event_enabled("Newchannel"));
        assert!(!cfg.is_event_enabled("Hangup"));
        assert_eq!(cfg.queue_deal_categories["701"], vec!["3", "4"]);
        assert_eq!(cfg.binding_mode(EntityKind::Lead), BindingMode::All);
        assert_eq!(cfg.binding_mode(EntityKind::Deal), BindingMode::Filtered);
        assert_eq!(cfg.binding_mode(EntityKind::Company), BindingMode::None);
        assert_eq!(
            cfg.lead_target_id_for_label("Sales inbound"),
            Some("12".to_string())
        );
        assert_eq!(
            cfg.entity_type_endpoints[&EntityKind::Lead].request,
            "crm.lead.list"
        );
        assert_eq!(cfg.logging_sections.len(), 1);
        assert_eq!(cfg.logging_sections[0].name, "Logger_Incoming_Calls");
    }

    #[test]
    fn missing_section_is_an_error() {
        let fixture = write_fixture("[AMI]\nhost = x\nport = 1\nusername = u\nsecret = s\n");
        let err = Config::load(&fixture.path).unwrap_err();
        assert!(matches!(err, ConfigError::MissingSection(_)));
    }
}

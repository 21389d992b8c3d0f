//! Node configuration.
//!
//! The config file is versioned JSON. Older files are upgraded in place,
//! version by version, before parsing: a v1 file passes through the v2
//! migration and then the v3 one. Numeric fields are stored as decimal
//! strings so 128-bit amounts survive the trip.

use std::net::SocketAddrV6;

use lattice_messages::parse_endpoint;
use lattice_types::{Account, Amount, NetworkId};
use rand::Rng;
use serde_json::{json, Value};
use thiserror::Error;

use crate::genesis_account;

/// Current config file version.
pub const CONFIG_VERSION: u32 = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("config is not a JSON object")]
    NotAnObject,
    #[error("unknown config version {0}")]
    UnknownVersion(String),
    #[error("missing field `{0}`")]
    Missing(&'static str),
    #[error("invalid value for `{0}`")]
    Invalid(&'static str),
    #[error("`{0}` out of range")]
    OutOfRange(&'static str),
}

/// Topic toggles for log output. Several are conjunctions: message-level
/// toggles only take effect while `network` itself is on, mirroring how the
/// sub-topics are consulted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Logging {
    pub ledger: bool,
    pub ledger_duplicate: bool,
    pub network: bool,
    pub network_message: bool,
    pub network_publish: bool,
    pub network_packet: bool,
    pub network_keepalive: bool,
    pub node_lifetime_tracing: bool,
    pub insufficient_work: bool,
    pub log_rpc: bool,
    pub bulk_pull: bool,
    pub work_generation_time: bool,
    pub log_to_cerr: bool,
    /// Log file rotation threshold, in bytes.
    pub max_size: u64,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            ledger: false,
            ledger_duplicate: false,
            network: true,
            network_message: false,
            network_publish: false,
            network_packet: false,
            network_keepalive: false,
            node_lifetime_tracing: false,
            insufficient_work: true,
            log_rpc: true,
            bulk_pull: false,
            work_generation_time: true,
            log_to_cerr: false,
            max_size: 16 * 1024 * 1024,
        }
    }
}

impl Logging {
    pub fn ledger_logging(&self) -> bool {
        self.ledger
    }

    pub fn ledger_duplicate_logging(&self) -> bool {
        self.ledger_logging() && self.ledger_duplicate
    }

    pub fn network_logging(&self) -> bool {
        self.network
    }

    pub fn network_message_logging(&self) -> bool {
        self.network_logging() && self.network_message
    }

    pub fn network_publish_logging(&self) -> bool {
        self.network_logging() && self.network_publish
    }

    pub fn network_packet_logging(&self) -> bool {
        self.network_logging() && self.network_packet
    }

    pub fn network_keepalive_logging(&self) -> bool {
        self.network_logging() && self.network_keepalive
    }

    pub fn insufficient_work_logging(&self) -> bool {
        self.network_logging() && self.insufficient_work
    }

    pub fn log_rpc_logging(&self) -> bool {
        self.network_logging() && self.log_rpc
    }

    pub fn bulk_pull_logging(&self) -> bool {
        self.network_logging() && self.bulk_pull
    }

    pub fn serialize_json(&self) -> Value {
        json!({
            "ledger": self.ledger,
            "ledger_duplicate": self.ledger_duplicate,
            "network": self.network,
            "network_message": self.network_message,
            "network_publish": self.network_publish,
            "network_packet": self.network_packet,
            "network_keepalive": self.network_keepalive,
            "node_lifetime_tracing": self.node_lifetime_tracing,
            "insufficient_work": self.insufficient_work,
            "log_rpc": self.log_rpc,
            "bulk_pull": self.bulk_pull,
            "work_generation_time": self.work_generation_time,
            "log_to_cerr": self.log_to_cerr,
            "max_size": self.max_size,
        })
    }

    pub fn deserialize_json(value: &Value) -> Result<Self, ConfigError> {
        Ok(Self {
            ledger: get_bool(value, "ledger")?,
            ledger_duplicate: get_bool(value, "ledger_duplicate")?,
            network: get_bool(value, "network")?,
            network_message: get_bool(value, "network_message")?,
            network_publish: get_bool(value, "network_publish")?,
            network_packet: get_bool(value, "network_packet")?,
            network_keepalive: get_bool(value, "network_keepalive")?,
            node_lifetime_tracing: get_bool(value, "node_lifetime_tracing")?,
            insufficient_work: get_bool(value, "insufficient_work")?,
            log_rpc: get_bool(value, "log_rpc")?,
            bulk_pull: get_bool(value, "bulk_pull")?,
            work_generation_time: get_bool(value, "work_generation_time")?,
            log_to_cerr: get_bool(value, "log_to_cerr")?,
            max_size: value
                .get("max_size")
                .and_then(Value::as_u64)
                .ok_or(ConfigError::Missing("max_size"))?,
        })
    }
}

/// Node options.
#[derive(Clone, Debug)]
pub struct NodeConfig {
    /// UDP port to bind.
    pub peering_port: u16,
    /// Inter-packet send pacing.
    pub packet_delay_microseconds: u32,
    /// Scales the gap-cache bootstrap threshold.
    pub bootstrap_fraction_numerator: u32,
    /// Rebroadcast count for locally created blocks (≤ 10).
    pub creation_rebroadcast: u32,
    /// Seconds between rebroadcasts (≤ 300).
    pub rebroadcast_delay: u32,
    /// Minimum receivable amount to auto-accept.
    pub receive_minimum: Amount,
    /// Supply deducted for quorum math.
    pub inactive_supply: Amount,
    /// Wallet password splitting factor (16 ..= 1048576).
    pub password_fanout: u32,
    pub io_threads: u32,
    pub work_threads: u32,
    /// Hostnames contacted on startup.
    pub preconfigured_peers: Vec<String>,
    pub preconfigured_representatives: Vec<Account>,
    pub work_peers: Vec<SocketAddrV6>,
    pub logging: Logging,
}

fn default_threads() -> u32 {
    (std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4) as u32)
        .max(4)
}

impl NodeConfig {
    /// Defaults for `network`.
    pub fn new(network: NetworkId) -> Self {
        let mut preconfigured_peers = Vec::new();
        let mut preconfigured_representatives = Vec::new();
        match network {
            NetworkId::Live => {
                preconfigured_peers.push("peering.lattice.org".to_string());
                for hex in [
                    "E17A9D4CBF03E5A4D2A7C2803DB8E55E7FBD1563AF8E5A09C071E5D37D9C44B1",
                    "41C23D1F85C3A6B09A11D7E88E6C0B03F7F38CCDB46EC45B57F75E29C1A7FD02",
                    "8C590F5FF2A4A01CB41D3E9F78C3BDEE67256EDAA30FC0B41C97E5B62A02DA73",
                    "2BFF4B10E5D6A2C6983CB98D31E697BE614BA2EB88207B8CFDE3A4F0916C70D5",
                    "D06CB14E97E5AD6804068C3C4E5A2F2ED1E06A2B5F62AB0E3185AB7C0F9E914C",
                    "6F8E41A04D65B2380CC5A7F061D89FD06FE03BA44EFA95CC3B4C8901D2A1E378",
                ] {
                    preconfigured_representatives
                        .push(Account::decode_hex(hex).expect("rep constant is valid hex"));
                }
            }
            NetworkId::Beta => {
                preconfigured_peers.push("beta.lattice.org".to_string());
                for hex in [
                    "0AC68DE16DD2F7E3C2C2E282FDA08D76441EC9DD1B5E6C94B42C11E304C7CE52",
                    "7E354D3E2A89D2FE1DBCD4A96E0CDE4C1E1B1E63A0F87D23C0FF02B05BE9C61B",
                ] {
                    preconfigured_representatives
                        .push(Account::decode_hex(hex).expect("rep constant is valid hex"));
                }
            }
            NetworkId::Test => {
                preconfigured_representatives.push(genesis_account(NetworkId::Test));
            }
        }
        Self {
            peering_port: network.default_port(),
            packet_delay_microseconds: 5000,
            bootstrap_fraction_numerator: 1,
            creation_rebroadcast: 2,
            rebroadcast_delay: 15,
            receive_minimum: Amount::new(1_000_000_000_000_000_000_000_000),
            inactive_supply: Amount::ZERO,
            password_fanout: 1024,
            io_threads: default_threads(),
            work_threads: default_threads(),
            preconfigured_peers,
            preconfigured_representatives,
            work_peers: Vec::new(),
            logging: Logging::default(),
        }
    }

    /// A uniformly chosen preconfigured representative.
    pub fn random_representative(&self, rng: &mut impl Rng) -> Account {
        let index = rng.gen_range(0..self.preconfigured_representatives.len());
        self.preconfigured_representatives[index]
    }

    pub fn serialize_json(&self) -> Value {
        json!({
            "version": CONFIG_VERSION.to_string(),
            "peering_port": self.peering_port.to_string(),
            "packet_delay_microseconds": self.packet_delay_microseconds.to_string(),
            "bootstrap_fraction_numerator": self.bootstrap_fraction_numerator.to_string(),
            "creation_rebroadcast": self.creation_rebroadcast.to_string(),
            "rebroadcast_delay": self.rebroadcast_delay.to_string(),
            "receive_minimum": self.receive_minimum.to_string(),
            "logging": self.logging.serialize_json(),
            "work_peers": self
                .work_peers
                .iter()
                .map(|peer| Value::String(peer.to_string()))
                .collect::<Vec<_>>(),
            "preconfigured_peers": self.preconfigured_peers.clone(),
            "preconfigured_representatives": self
                .preconfigured_representatives
                .iter()
                .map(|rep| Value::String(rep.encode_account()))
                .collect::<Vec<_>>(),
            "inactive_supply": self.inactive_supply.to_string(),
            "password_fanout": self.password_fanout.to_string(),
            "io_threads": self.io_threads.to_string(),
            "work_threads": self.work_threads.to_string(),
        })
    }

    /// Parse a config tree, upgrading older versions in place first.
    /// Returns the config and whether an upgrade rewrote the tree.
    pub fn deserialize_json(
        network: NetworkId,
        value: &mut Value,
    ) -> Result<(Self, bool), ConfigError> {
        if !value.is_object() {
            return Err(ConfigError::NotAnObject);
        }
        let mut upgraded = false;
        let declared: Option<String> = match value.get("version") {
            Some(v) => Some(
                v.as_str()
                    .map(str::to_string)
                    .ok_or(ConfigError::Invalid("version"))?,
            ),
            None => None,
        };
        let version = match declared {
            Some(version) => version,
            None => {
                // Pre-versioning files are v1 and may lack work_peers
                let object = value.as_object_mut().ok_or(ConfigError::NotAnObject)?;
                object.insert("version".into(), Value::String("1".into()));
                if !object.contains_key("work_peers") {
                    object.insert("work_peers".into(), Value::Array(Vec::new()));
                }
                upgraded = true;
                "1".to_string()
            }
        };
        let version: u32 = version
            .parse()
            .map_err(|_| ConfigError::UnknownVersion(version.clone()))?;
        upgraded |= Self::upgrade_json(version, value)?;

        let mut config = Self::new(network);
        config.peering_port = get_parsed(value, "peering_port")?;
        config.packet_delay_microseconds = get_parsed(value, "packet_delay_microseconds")?;
        config.bootstrap_fraction_numerator = get_parsed(value, "bootstrap_fraction_numerator")?;
        config.creation_rebroadcast = get_parsed(value, "creation_rebroadcast")?;
        config.rebroadcast_delay = get_parsed(value, "rebroadcast_delay")?;
        config.receive_minimum = Amount::decode_dec(get_str(value, "receive_minimum")?)
            .ok_or(ConfigError::Invalid("receive_minimum"))?;
        config.inactive_supply = Amount::decode_dec(get_str(value, "inactive_supply")?)
            .ok_or(ConfigError::Invalid("inactive_supply"))?;
        config.password_fanout = get_parsed(value, "password_fanout")?;
        config.io_threads = get_parsed(value, "io_threads")?;
        config.work_threads = get_parsed(value, "work_threads")?;
        config.logging = Logging::deserialize_json(
            value.get("logging").ok_or(ConfigError::Missing("logging"))?,
        )?;

        config.work_peers = get_array(value, "work_peers")?
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .and_then(parse_endpoint)
                    .ok_or(ConfigError::Invalid("work_peers"))
            })
            .collect::<Result<_, _>>()?;
        config.preconfigured_peers = get_array(value, "preconfigured_peers")?
            .iter()
            .map(|entry| {
                entry
                    .as_str()
                    .map(str::to_string)
                    .ok_or(ConfigError::Invalid("preconfigured_peers"))
            })
            .collect::<Result<_, _>>()?;
        config.preconfigured_representatives =
            get_array(value, "preconfigured_representatives")?
                .iter()
                .map(|entry| {
                    entry
                        .as_str()
                        .and_then(Account::decode_account)
                        .ok_or(ConfigError::Invalid("preconfigured_representatives"))
                })
                .collect::<Result<_, _>>()?;

        if config.preconfigured_representatives.is_empty() {
            return Err(ConfigError::Invalid("preconfigured_representatives"));
        }
        if config.creation_rebroadcast > 10 {
            return Err(ConfigError::OutOfRange("creation_rebroadcast"));
        }
        if config.rebroadcast_delay > 300 {
            return Err(ConfigError::OutOfRange("rebroadcast_delay"));
        }
        if !(16..=1024 * 1024).contains(&config.password_fanout) {
            return Err(ConfigError::OutOfRange("password_fanout"));
        }
        if config.io_threads == 0 {
            return Err(ConfigError::OutOfRange("io_threads"));
        }
        if config.work_threads == 0 {
            return Err(ConfigError::OutOfRange("work_threads"));
        }

        Ok((config, upgraded))
    }

    /// Apply migrations from `version` up to [`CONFIG_VERSION`]. Each
    /// migration feeds the next, so a v1 file is carried through v2 to v3.
    pub fn upgrade_json(version: u32, value: &mut Value) -> Result<bool, ConfigError> {
        if version == 0 || version > CONFIG_VERSION {
            return Err(ConfigError::UnknownVersion(version.to_string()));
        }
        let mut upgraded = false;
        let mut current = version;
        while current < CONFIG_VERSION {
            match current {
                1 => {
                    // Representatives move from bare hex keys to account strings
                    let reps = get_array(value, "preconfigured_representatives")?
                        .iter()
                        .map(|entry| {
                            entry
                                .as_str()
                                .and_then(Account::decode_account)
                                .map(|account| Value::String(account.encode_account()))
                                .ok_or(ConfigError::Invalid("preconfigured_representatives"))
                        })
                        .collect::<Result<Vec<_>, _>>()?;
                    let object = value.as_object_mut().ok_or(ConfigError::NotAnObject)?;
                    object.insert("preconfigured_representatives".into(), Value::Array(reps));
                    object.insert("version".into(), Value::String("2".into()));
                }
                2 => {
                    let object = value.as_object_mut().ok_or(ConfigError::NotAnObject)?;
                    object.insert("inactive_supply".into(), Value::String("0".into()));
                    object.insert("password_fanout".into(), Value::String("1024".into()));
                    object.insert(
                        "io_threads".into(),
                        Value::String(default_threads().to_string()),
                    );
                    object.insert(
                        "work_threads".into(),
                        Value::String(default_threads().to_string()),
                    );
                    object.insert("version".into(), Value::String("3".into()));
                }
                _ => return Err(ConfigError::UnknownVersion(current.to_string())),
            }
            upgraded = true;
            current += 1;
        }
        Ok(upgraded)
    }
}

fn get_str<'a>(value: &'a Value, key: &'static str) -> Result<&'a str, ConfigError> {
    value
        .get(key)
        .ok_or(ConfigError::Missing(key))?
        .as_str()
        .ok_or(ConfigError::Invalid(key))
}

fn get_bool(value: &Value, key: &'static str) -> Result<bool, ConfigError> {
    value
        .get(key)
        .ok_or(ConfigError::Missing(key))?
        .as_bool()
        .ok_or(ConfigError::Invalid(key))
}

fn get_array<'a>(value: &'a Value, key: &'static str) -> Result<&'a Vec<Value>, ConfigError> {
    value
        .get(key)
        .ok_or(ConfigError::Missing(key))?
        .as_array()
        .ok_or(ConfigError::Invalid(key))
}

fn get_parsed<T: std::str::FromStr>(
    value: &Value,
    key: &'static str,
) -> Result<T, ConfigError> {
    get_str(value, key)?
        .parse()
        .map_err(|_| ConfigError::Invalid(key))
}

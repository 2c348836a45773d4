use serde::Deserialize;

pub const DEFAULT_QUERY_PORT: u16 = 25565;

/// Where a target's status message lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Destination {
    pub channel_id: String,
    pub message_id: String,
}

/// One server under observation, built once at startup.
#[derive(Debug, Clone)]
pub struct MonitoredTarget {
    pub machine_id: String,
    pub name: String,
    /// Shown to humans in the rendered message.
    pub public_address: String,
    /// Used for the protocol exchange; may be a private address.
    pub query_address: String,
    pub port: u16,
    pub bottom_comment: String,
    pub destination: Destination,
}

/// Fields parsed from a full-stat reply. Every field is best effort.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryResult {
    pub motd: Option<String>,
    pub game_type: Option<String>,
    pub version: Option<String>,
    pub plugins: Option<String>,
    pub map: Option<String>,
    pub num_players: Option<i64>,
    pub max_players: Option<i64>,
    pub host_port: Option<i64>,
    pub host_ip: Option<String>,
    /// `None` when the reply carried no player section.
    pub players: Option<Vec<String>>,
}

/// Machine description as reported by the hosting control plane.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MachineInfo {
    pub machine_id: String,
    pub state: String,
    #[serde(default)]
    pub public_ip: Option<String>,
    #[serde(default)]
    pub private_ip: Option<String>,
}

impl MachineInfo {
    pub fn is_running(&self) -> bool {
        self.state == "running"
    }
}

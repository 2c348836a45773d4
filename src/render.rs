use serde::Deserialize;

use crate::models::{MonitoredTarget, QueryResult};

pub const SHUTDOWN_NOTICE: &str = "(Server will shutdown if empty for 30 minutes)";
pub const CALL_TO_ACTION: &str = "Please ask someone to start the server if you'd like to play now.";

/// Which reply field fills the "Version" line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionSource {
    /// The max-player count fills the version slot.
    #[default]
    MaxPlayers,
    ReportedVersion,
}

/// When the auto-shutdown note follows the player count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShutdownNotice {
    /// Shown only while nobody is online.
    #[default]
    WhenEmpty,
    WhenOccupied,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(default)]
pub struct RenderOptions {
    pub version_source: VersionSource,
    pub shutdown_notice: ShutdownNotice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisplayState {
    Online {
        players: Option<i64>,
        max_players: Option<i64>,
        version: Option<String>,
        motd: Option<String>,
    },
    Starting,
    Offline,
}

impl DisplayState {
    pub fn online(result: QueryResult, options: &RenderOptions) -> Self {
        let version = match options.version_source {
            VersionSource::MaxPlayers => result.max_players.map(|max| max.to_string()),
            VersionSource::ReportedVersion => result.version,
        };
        DisplayState::Online {
            players: result.num_players,
            max_players: result.max_players,
            version,
            motd: result.motd,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            DisplayState::Online { .. } => "online",
            DisplayState::Starting => "starting",
            DisplayState::Offline => "offline",
        }
    }
}

fn text(value: &Option<String>) -> &str {
    value.as_deref().unwrap_or("")
}

fn count(value: Option<i64>) -> String {
    value.map(|n| n.to_string()).unwrap_or_default()
}

/// Renders the Discord message body for `state`. Output depends only on its inputs.
pub fn render(target: &MonitoredTarget, state: &DisplayState, options: &RenderOptions) -> String {
    let header = format!(
        "🌎 **{} Server Status** {}:{}",
        target.name, target.public_address, target.port
    );
    let comment = &target.bottom_comment;

    match state {
        DisplayState::Online {
            players,
            max_players,
            version,
            motd,
        } => {
            let show_notice = match options.shutdown_notice {
                ShutdownNotice::WhenEmpty => *players == Some(0),
                ShutdownNotice::WhenOccupied => players.is_some_and(|n| n > 0),
            };
            let notice = if show_notice { SHUTDOWN_NOTICE } else { "" };
            format!(
                "{header}\n🟢 Online  \n🎮 **Players Online:** {}/{} {notice} \n🖥️ **Version:** {}  \n💬 **MOTD:** {}\n{comment}",
                count(*players),
                count(*max_players),
                text(version),
                text(motd),
            )
        }
        DisplayState::Starting => format!(
            "{header}\n🟡 Starting...  \n🎮 **Players Online:**  \n🖥️ **Version:**   \n💬 **MOTD:**\n{comment}"
        ),
        DisplayState::Offline => format!(
            "{header}\n🔴 Offline  \n🎮 **Players Online:**  \n🖥️ **Version:**   \n💬 **MOTD:**\n{comment}\n{CALL_TO_ACTION}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Destination;

    fn target() -> MonitoredTarget {
        MonitoredTarget {
            machine_id: "i-0abc".into(),
            name: "Minecraft".into(),
            public_address: "203.0.113.7".into(),
            query_address: "10.0.0.5".into(),
            port: 25565,
            bottom_comment: "Modpack: vanilla".into(),
            destination: Destination {
                channel_id: "100".into(),
                message_id: "200".into(),
            },
        }
    }

    fn reply(players: i64) -> QueryResult {
        QueryResult {
            motd: Some("Hi".into()),
            version: Some("1.20".into()),
            num_players: Some(players),
            max_players: Some(20),
            ..Default::default()
        }
    }

    fn online(players: i64, options: &RenderOptions) -> String {
        render(&target(), &DisplayState::online(reply(players), options), options)
    }

    #[test]
    fn empty_server_shows_shutdown_notice() {
        let options = RenderOptions {
            version_source: VersionSource::ReportedVersion,
            ..Default::default()
        };
        let message = online(0, &options);

        assert!(message.contains("Online"));
        assert!(message.contains("0/20"));
        assert!(message.contains("1.20"));
        assert!(message.contains("Hi"));
        assert!(message.contains(SHUTDOWN_NOTICE));
    }

    #[test]
    fn occupied_server_omits_shutdown_notice() {
        let message = online(3, &RenderOptions::default());
        assert!(message.contains("3/20"));
        assert!(!message.contains(SHUTDOWN_NOTICE));
    }

    #[test]
    fn inverted_notice_condition() {
        let options = RenderOptions {
            shutdown_notice: ShutdownNotice::WhenOccupied,
            ..Default::default()
        };
        assert!(!online(0, &options).contains(SHUTDOWN_NOTICE));
        assert!(online(3, &options).contains(SHUTDOWN_NOTICE));
    }

    #[test]
    fn default_version_slot_carries_max_players() {
        let state = DisplayState::online(reply(3), &RenderOptions::default());
        assert!(matches!(
            &state,
            DisplayState::Online { version: Some(v), .. } if v == "20"
        ));
        let message = render(&target(), &state, &RenderOptions::default());
        assert!(message.contains("**Version:** 20  "));
        assert!(!message.contains("1.20"));
    }

    #[test]
    fn corrected_version_slot_carries_reported_version() {
        let options = RenderOptions {
            version_source: VersionSource::ReportedVersion,
            ..Default::default()
        };
        assert!(online(3, &options).contains("**Version:** 1.20  "));
    }

    #[test]
    fn missing_fields_render_blank() {
        let state = DisplayState::online(QueryResult::default(), &RenderOptions::default());
        let message = render(&target(), &state, &RenderOptions::default());
        assert!(message.contains("**Players Online:** / "));
        assert!(message.contains("**MOTD:** \n"));
        assert!(!message.contains(SHUTDOWN_NOTICE));
    }

    #[test]
    fn starting_template() {
        let message = render(&target(), &DisplayState::Starting, &RenderOptions::default());
        assert_eq!(
            message,
            "🌎 **Minecraft Server Status** 203.0.113.7:25565\n🟡 Starting...  \n🎮 **Players Online:**  \n🖥️ **Version:**   \n💬 **MOTD:**\nModpack: vanilla"
        );
    }

    #[test]
    fn offline_template_ends_with_call_to_action() {
        let message = render(&target(), &DisplayState::Offline, &RenderOptions::default());
        assert!(message.starts_with("🌎 **Minecraft Server Status** 203.0.113.7:25565\n🔴 Offline"));
        assert!(message.ends_with(&format!("Modpack: vanilla\n{}", CALL_TO_ACTION)));
        assert!(!message.contains("10.0.0.5"));
    }

    #[test]
    fn rendering_is_deterministic() {
        let options = RenderOptions::default();
        assert_eq!(online(5, &options), online(5, &options));
    }
}

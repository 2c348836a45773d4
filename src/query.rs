//! Client for the Minecraft UDP query protocol.
//!
//! One call performs a handshake (to obtain a challenge token) followed by a
//! full-stat request. A single deadline covers both round trips.

use async_trait::async_trait;
use std::io;
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr};
use std::time::Duration;
use thiserror::Error;
use tokio::net::{lookup_host, UdpSocket};
use tracing::debug;

use crate::models::QueryResult;

const MAGIC: [u8; 2] = [0xFE, 0xFD];
const TYPE_HANDSHAKE: u8 = 0x09;
const TYPE_STAT: u8 = 0x00;
/// Type byte followed by the echoed session id.
const HEADER_LEN: usize = 5;
/// Servers only echo the low nibble of each session id byte.
const SESSION_MASK: u32 = 0x0F0F_0F0F;
const PLAYER_SECTION: &str = "\0\x01player_\0\0";
/// `splitnum` and its value precede the first key/value pair.
const FIRST_PAIR: usize = 2;
const MAX_DATAGRAM: usize = 65_535;

#[derive(Debug, Error)]
pub enum QueryError {
    #[error("could not resolve {0}")]
    Unresolved(String),
    #[error("socket error: {0}")]
    Transport(#[source] io::Error),
    #[error("failed to send {packet} packet: {source}")]
    SendFailure {
        packet: &'static str,
        #[source]
        source: io::Error,
    },
    #[error("malformed challenge reply: {0}")]
    MalformedChallenge(String),
    #[error("malformed stat response: {0}")]
    MalformedStatResponse(String),
    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Seam between the engine and the query transport.
#[async_trait]
pub trait ServerQuery: Send + Sync + 'static {
    async fn query(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<QueryResult, QueryError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct UdpQueryClient;

#[async_trait]
impl ServerQuery for UdpQueryClient {
    async fn query(
        &self,
        address: &str,
        port: u16,
        timeout: Duration,
    ) -> Result<QueryResult, QueryError> {
        // The socket is owned by the timed future and dropped with it on every path.
        match tokio::time::timeout(timeout, exchange(address, port)).await {
            Ok(result) => result,
            Err(_) => Err(QueryError::Timeout(timeout)),
        }
    }
}

async fn exchange(address: &str, port: u16) -> Result<QueryResult, QueryError> {
    let remote = resolve(address, port).await?;
    let local: SocketAddr = if remote.is_ipv4() {
        (Ipv4Addr::UNSPECIFIED, 0).into()
    } else {
        (Ipv6Addr::UNSPECIFIED, 0).into()
    };
    let socket = UdpSocket::bind(local).await.map_err(QueryError::Transport)?;
    socket.connect(remote).await.map_err(QueryError::Transport)?;

    let session_id = rand::random::<u32>() & SESSION_MASK;
    send(&socket, &handshake_packet(session_id), "handshake").await?;
    let token = parse_challenge(&recv(&socket).await?)?;
    debug!(%remote, session_id, token, "received challenge token");

    send(&socket, &stat_packet(session_id, token), "stat").await?;
    parse_stat_response(&recv(&socket).await?)
}

async fn resolve(address: &str, port: u16) -> Result<SocketAddr, QueryError> {
    lookup_host((address, port))
        .await
        .ok()
        .and_then(|mut addrs| addrs.next())
        .ok_or_else(|| QueryError::Unresolved(format!("{}:{}", address, port)))
}

async fn send(socket: &UdpSocket, packet: &[u8], name: &'static str) -> Result<(), QueryError> {
    socket
        .send(packet)
        .await
        .map(|_| ())
        .map_err(|source| QueryError::SendFailure { packet: name, source })
}

async fn recv(socket: &UdpSocket) -> Result<Vec<u8>, QueryError> {
    let mut buf = vec![0u8; MAX_DATAGRAM];
    let len = socket.recv(&mut buf).await.map_err(QueryError::Transport)?;
    buf.truncate(len);
    Ok(buf)
}

pub(crate) fn handshake_packet(session_id: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(7);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_HANDSHAKE);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet
}

/// Full-stat request: the trailing four zero bytes select the extended reply.
pub(crate) fn stat_packet(session_id: u32, token: u32) -> Vec<u8> {
    let mut packet = Vec::with_capacity(15);
    packet.extend_from_slice(&MAGIC);
    packet.push(TYPE_STAT);
    packet.extend_from_slice(&session_id.to_be_bytes());
    packet.extend_from_slice(&token.to_be_bytes());
    packet.extend_from_slice(&[0, 0, 0, 0]);
    packet
}

/// Extracts the challenge token, returned as the raw 32 bits to send back.
pub(crate) fn parse_challenge(reply: &[u8]) -> Result<u32, QueryError> {
    if reply.len() < HEADER_LEN {
        return Err(QueryError::MalformedChallenge(format!(
            "reply too short ({} bytes)",
            reply.len()
        )));
    }
    if reply[0] != TYPE_HANDSHAKE {
        return Err(QueryError::MalformedChallenge(format!(
            "unexpected type byte {:#04x}",
            reply[0]
        )));
    }

    let body = &reply[HEADER_LEN..];
    let end = body.iter().position(|&b| b == 0).unwrap_or(body.len());
    let text = std::str::from_utf8(&body[..end])
        .map_err(|_| QueryError::MalformedChallenge("token is not ASCII".into()))?
        .trim();
    let token: i64 = text.parse().map_err(|_| {
        QueryError::MalformedChallenge(format!("token {:?} is not a decimal integer", text))
    })?;

    i32::try_from(token)
        .map(|t| t as u32)
        .or_else(|_| u32::try_from(token))
        .map_err(|_| QueryError::MalformedChallenge(format!("token {} exceeds 32 bits", token)))
}

#[derive(Debug, Clone, Copy)]
enum StatField {
    Motd,
    GameType,
    Version,
    Plugins,
    Map,
    NumPlayers,
    MaxPlayers,
    HostPort,
    HostIp,
}

impl StatField {
    const KEYS: [&'static str; 9] = [
        "hostname",
        "gametype",
        "version",
        "plugins",
        "map",
        "numplayers",
        "maxplayers",
        "hostport",
        "hostip",
    ];

    fn key(self) -> &'static str {
        Self::KEYS[self as usize]
    }
}

/// Token view over the key/value section of a stat reply.
///
/// When the reply names its keys, values are found by key. Otherwise they are
/// read from the fixed layout: padding, motd, padding, game type, and so on.
struct StatTokens<'a> {
    tokens: Vec<&'a str>,
    keyed: bool,
}

impl<'a> StatTokens<'a> {
    fn new(section: &'a str) -> Self {
        let tokens: Vec<&str> = section.split('\0').collect();
        let keyed = tokens
            .iter()
            .skip(FIRST_PAIR)
            .step_by(2)
            .any(|token| StatField::KEYS.contains(token));
        Self { tokens, keyed }
    }

    fn text(&self, field: StatField) -> Option<String> {
        let index = if self.keyed {
            (FIRST_PAIR..self.tokens.len())
                .step_by(2)
                .find(|&i| self.tokens[i] == field.key())?
                + 1
        } else {
            FIRST_PAIR + field as usize * 2 + 1
        };
        self.tokens.get(index).map(|s| s.to_string())
    }

    fn number(&self, field: StatField) -> Option<i64> {
        self.text(field)?.trim().parse().ok()
    }
}

pub(crate) fn parse_stat_response(reply: &[u8]) -> Result<QueryResult, QueryError> {
    if reply.len() < HEADER_LEN {
        return Err(QueryError::MalformedStatResponse(format!(
            "reply too short ({} bytes)",
            reply.len()
        )));
    }
    if reply[0] != TYPE_STAT {
        return Err(QueryError::MalformedStatResponse(format!(
            "unexpected type byte {:#04x}",
            reply[0]
        )));
    }

    let body = String::from_utf8_lossy(&reply[HEADER_LEN..]);
    let (section, players) = match body.split_once(PLAYER_SECTION) {
        Some((section, players)) => (section, Some(players)),
        None => (&*body, None),
    };
    let tokens = StatTokens::new(section);

    Ok(QueryResult {
        motd: tokens.text(StatField::Motd),
        game_type: tokens.text(StatField::GameType),
        version: tokens.text(StatField::Version),
        plugins: tokens.text(StatField::Plugins),
        map: tokens.text(StatField::Map),
        num_players: tokens.number(StatField::NumPlayers),
        max_players: tokens.number(StatField::MaxPlayers),
        host_port: tokens.number(StatField::HostPort),
        host_ip: tokens.text(StatField::HostIp),
        players: players.map(|block| {
            block
                .split('\0')
                .filter(|name| !name.is_empty())
                .map(str::to_owned)
                .collect()
        }),
    })
}

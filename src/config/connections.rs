//! IRC connection blocks.

use serde::Deserialize;

use super::defaults::{default_irc_port, default_nick, default_realname};

/// One `[connections.<name>]` block.
///
/// The socket side of a connection is handled outside the core; the block is
/// carried so the owner of the socket and the outbound queue agree on names.
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionConfig {
    pub host: String,
    #[serde(default = "default_irc_port")]
    pub port: u16,
    #[serde(default)]
    pub password: Option<String>,
    #[serde(default = "default_nick")]
    pub nick: String,
    #[serde(default = "default_nick")]
    pub ident: String,
    #[serde(default = "default_realname")]
    pub realname: String,
    /// Nicks allowed to run admin commands.
    #[serde(default)]
    pub admins: Vec<String>,
    #[serde(default)]
    pub ssl: bool,
    /// Channels to join. A keyed channel is written `"#channel, key"`.
    #[serde(default)]
    pub channels: Vec<String>,
}

/// A channel to join, with its key if it has one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelJoin {
    pub channel: String,
    pub key: Option<String>,
}

impl ChannelJoin {
    /// The IRC JOIN line for this channel.
    pub fn join_line(&self) -> String {
        match &self.key {
            Some(key) => format!("JOIN {} {}", self.channel, key),
            None => format!("JOIN {}", self.channel),
        }
    }
}

impl ConnectionConfig {
    /// Parse the configured channel list.
    pub fn joins(&self) -> Vec<ChannelJoin> {
        self.channels
            .iter()
            .filter_map(|entry| {
                let (channel, key) = match entry.split_once(',') {
                    Some((channel, key)) => (channel.trim(), Some(key.trim())),
                    None => (entry.trim(), None),
                };
                if channel.is_empty() {
                    return None;
                }
                Some(ChannelJoin {
                    channel: channel.to_string(),
                    key: key.filter(|k| !k.is_empty()).map(str::to_string),
                })
            })
            .collect()
    }
}

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

pub const DEFAULT_RETURN_AFTER: u32 = 1;

/// Events that end a status long-poll early.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusEvent {
    Login,
    Logout,
    Play,
    Pause,
    Error,
    Ap,
}

impl StatusEvent {
    pub const ALL: [StatusEvent; 6] = [
        StatusEvent::Login,
        StatusEvent::Logout,
        StatusEvent::Play,
        StatusEvent::Pause,
        StatusEvent::Error,
        StatusEvent::Ap,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StatusEvent::Login => "login",
            StatusEvent::Logout => "logout",
            StatusEvent::Play => "play",
            StatusEvent::Pause => "pause",
            StatusEvent::Error => "error",
            StatusEvent::Ap => "ap",
        }
    }
}

impl fmt::Display for StatusEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StatusEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        StatusEvent::ALL
            .into_iter()
            .find(|e| e.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown status event: {s}"))
    }
}

/// Long-poll parameters. Fields left `None` take the defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatusQuery {
    /// Seconds the service may hold the request open.
    pub return_after: Option<u32>,
    pub return_on: Option<Vec<StatusEvent>>,
}

impl StatusQuery {
    pub fn return_after(mut self, secs: u32) -> Self {
        self.return_after = Some(secs);
        self
    }

    pub fn return_on(mut self, events: impl IntoIterator<Item = StatusEvent>) -> Self {
        self.return_on = Some(events.into_iter().collect());
        self
    }

    pub fn effective_return_after(&self) -> u32 {
        self.return_after.unwrap_or(DEFAULT_RETURN_AFTER)
    }

    /// Query parameters after defaults are applied.
    pub fn params(&self) -> Vec<(&'static str, String)> {
        let events = self
            .return_on
            .clone()
            .unwrap_or_else(|| StatusEvent::ALL.to_vec());
        let joined = events
            .iter()
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join(",");
        vec![
            ("returnafter", self.effective_return_after().to_string()),
            ("returnon", joined),
        ]
    }
}

/// Snapshot returned by the status endpoint. The service omits fields freely
/// (e.g. no track while logged out), so everything is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Status {
    pub version: Option<u64>,
    pub client_version: Option<String>,
    pub playing: Option<bool>,
    pub shuffle: Option<bool>,
    pub repeat: Option<bool>,
    pub play_enabled: Option<bool>,
    pub prev_enabled: Option<bool>,
    pub next_enabled: Option<bool>,
    pub track: Option<Track>,
    pub playing_position: Option<f64>,
    pub server_time: Option<u64>,
    pub volume: Option<f64>,
    pub online: Option<bool>,
    pub running: Option<bool>,
}

impl Status {
    /// "artist - track" when both names are known.
    pub fn now_playing(&self) -> Option<String> {
        let track = self.track.as_ref()?;
        let artist = track.artist_resource.as_ref()?.name.as_deref()?;
        let title = track.track_resource.as_ref()?.name.as_deref()?;
        Some(format!("{artist} - {title}"))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Track {
    pub track_resource: Option<Resource>,
    pub artist_resource: Option<Resource>,
    pub album_resource: Option<Resource>,
    pub length: Option<u64>,
    pub track_type: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resource {
    pub name: Option<String>,
    pub uri: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_nothing_is_given() {
        let params = StatusQuery::default().params();
        assert_eq!(
            params,
            vec![
                ("returnafter", "1".to_string()),
                ("returnon", "login,logout,play,pause,error,ap".to_string()),
            ]
        );
    }

    #[test]
    fn explicit_values_win() {
        let q = StatusQuery::default()
            .return_after(60)
            .return_on([StatusEvent::Play, StatusEvent::Pause]);
        assert_eq!(q.params()[0].1, "60");
        assert_eq!(q.params()[1].1, "play,pause");
    }

    #[test]
    fn events_parse_case_insensitively() {
        assert_eq!("PLAY".parse::<StatusEvent>(), Ok(StatusEvent::Play));
        assert!("rewind".parse::<StatusEvent>().is_err());
    }

    #[test]
    fn snapshot_tolerates_missing_fields() {
        let s: Status = serde_json::from_str(
            r#"{
                "version": 9,
                "client_version": "1.0.0",
                "playing": true,
                "track": {
                    "track_resource": {"name": "Song", "uri": "spotify:track:1"},
                    "artist_resource": {"name": "Band"},
                    "length": 215
                },
                "something_new": [1, 2]
            }"#,
        )
        .unwrap();
        assert_eq!(s.playing, Some(true));
        assert_eq!(s.now_playing().as_deref(), Some("Band - Song"));

        let logged_out: Status = serde_json::from_str(r#"{"running": false}"#).unwrap();
        assert_eq!(logged_out.now_playing(), None);
    }
}

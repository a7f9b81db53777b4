use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::host::{HostError, HostEvent, PlayerHost, PlayerId, PlayerState};

/// A command for the shell that owns the embedded players, serialized as
/// JSON when it crosses into a webview.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "command", rename_all = "camelCase")]
pub enum HostCommand {
    #[serde(rename_all = "camelCase")]
    Create { player: PlayerId, video_id: String },
    Play { player: PlayerId },
    Pause { player: PlayerId },
    Stop { player: PlayerId },
    Seek { player: PlayerId, seconds: f64 },
    SetVolume { player: PlayerId, volume: u8 },
    Destroy { player: PlayerId },
}

/// The shell's half of a [`BridgeHost`].
pub struct BridgeEndpoint {
    pub commands: mpsc::UnboundedReceiver<HostCommand>,
    pub events: mpsc::UnboundedSender<HostEvent>,
}

#[derive(Debug, Clone, Copy)]
struct Observed {
    state: PlayerState,
    time: f64,
}

/// [`PlayerHost`] that forwards commands over a channel and caches what the
/// shell reports back.
///
/// Play and pause are reflected in the cached state right away; the shell's
/// next state change overrides them.
pub struct BridgeHost {
    commands: mpsc::UnboundedSender<HostCommand>,
    events: mpsc::UnboundedReceiver<HostEvent>,
    players: HashMap<PlayerId, Observed>,
}

impl BridgeHost {
    pub fn new() -> (Self, BridgeEndpoint) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        (
            Self {
                commands: command_tx,
                events: event_rx,
                players: HashMap::new(),
            },
            BridgeEndpoint {
                commands: command_rx,
                events: event_tx,
            },
        )
    }

    fn send(&self, command: HostCommand) -> Result<(), HostError> {
        self.commands
            .send(command)
            .map_err(|_| HostError::Disconnected)
    }

    fn observed(&mut self, player: PlayerId) -> Result<&mut Observed, HostError> {
        self.players
            .get_mut(&player)
            .ok_or(HostError::UnknownPlayer(player))
    }
}

impl PlayerHost for BridgeHost {
    fn create(&mut self, player: PlayerId, video_id: &str) -> Result<(), HostError> {
        self.send(HostCommand::Create {
            player,
            video_id: video_id.to_string(),
        })?;
        self.players.insert(
            player,
            Observed {
                state: PlayerState::Unstarted,
                time: 0.0,
            },
        );
        Ok(())
    }

    fn play(&mut self, player: PlayerId) -> Result<(), HostError> {
        self.observed(player)?.state = PlayerState::Playing;
        self.send(HostCommand::Play { player })
    }

    fn pause(&mut self, player: PlayerId) -> Result<(), HostError> {
        self.observed(player)?.state = PlayerState::Paused;
        self.send(HostCommand::Pause { player })
    }

    fn stop(&mut self, player: PlayerId) -> Result<(), HostError> {
        let observed = self.observed(player)?;
        observed.state = PlayerState::Cued;
        observed.time = 0.0;
        self.send(HostCommand::Stop { player })
    }

    fn seek(&mut self, player: PlayerId, seconds: f64) -> Result<(), HostError> {
        self.observed(player)?.time = seconds;
        self.send(HostCommand::Seek { player, seconds })
    }

    fn set_volume(&mut self, player: PlayerId, volume: u8) -> Result<(), HostError> {
        self.observed(player)?;
        self.send(HostCommand::SetVolume { player, volume })
    }

    fn destroy(&mut self, player: PlayerId) {
        if self.players.remove(&player).is_some() {
            if let Err(e) = self.send(HostCommand::Destroy { player }) {
                tracing::debug!("destroy for {player} not delivered: {e}");
            }
        }
    }

    fn state(&self, player: PlayerId) -> Option<PlayerState> {
        self.players.get(&player).map(|o| o.state)
    }

    fn current_time(&self, player: PlayerId) -> Option<f64> {
        self.players.get(&player).map(|o| o.time)
    }

    fn poll_event(&mut self) -> Option<HostEvent> {
        let event = self.events.try_recv().ok()?;
        if let Some(observed) = self.players.get_mut(&event.player()) {
            match &event {
                HostEvent::StateChange { state, .. } => observed.state = *state,
                HostEvent::Progress { time, .. } => observed.time = *time,
                HostEvent::Ready { .. } | HostEvent::Error { .. } => {}
            }
        }
        Some(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_commands_serialize_camel_case() {
        let json = serde_json::to_value(HostCommand::Create {
            player: PlayerId(7),
            video_id: "dQw4w9WgXcQ".into(),
        })
        .unwrap();
        assert_eq!(json["command"], "create");
        assert_eq!(json["player"], 7);
        assert_eq!(json["videoId"], "dQw4w9WgXcQ");

        let json = serde_json::to_value(HostCommand::SetVolume {
            player: PlayerId(7),
            volume: 40,
        })
        .unwrap();
        assert_eq!(json["command"], "setVolume");
        assert_eq!(json["volume"], 40);
    }

    #[test]
    fn test_events_update_observed_state() {
        let (mut host, mut endpoint) = BridgeHost::new();
        host.create(PlayerId(1), "abc").unwrap();
        assert!(matches!(
            endpoint.commands.try_recv(),
            Ok(HostCommand::Create { .. })
        ));
        assert_eq!(host.state(PlayerId(1)), Some(PlayerState::Unstarted));

        endpoint
            .events
            .send(HostEvent::Progress {
                player: PlayerId(1),
                time: 12.5,
            })
            .unwrap();
        endpoint
            .events
            .send(HostEvent::StateChange {
                player: PlayerId(1),
                state: PlayerState::Paused,
            })
            .unwrap();

        assert!(host.poll_event().is_some());
        assert!(host.poll_event().is_some());
        assert!(host.poll_event().is_none());
        assert_eq!(host.current_time(PlayerId(1)), Some(12.5));
        assert_eq!(host.state(PlayerId(1)), Some(PlayerState::Paused));
    }

    #[test]
    fn test_play_is_reflected_before_confirmation() {
        let (mut host, _endpoint) = BridgeHost::new();
        host.create(PlayerId(1), "abc").unwrap();
        host.play(PlayerId(1)).unwrap();
        assert_eq!(host.state(PlayerId(1)), Some(PlayerState::Playing));
    }

    #[test]
    fn test_commands_to_unknown_player_fail() {
        let (mut host, _endpoint) = BridgeHost::new();
        assert!(matches!(
            host.play(PlayerId(9)),
            Err(HostError::UnknownPlayer(PlayerId(9)))
        ));
    }

    #[test]
    fn test_destroy_is_sent_once() {
        let (mut host, mut endpoint) = BridgeHost::new();
        host.create(PlayerId(1), "abc").unwrap();
        host.destroy(PlayerId(1));
        host.destroy(PlayerId(1));

        let mut destroys = 0;
        while let Ok(command) = endpoint.commands.try_recv() {
            if matches!(command, HostCommand::Destroy { .. }) {
                destroys += 1;
            }
        }
        assert_eq!(destroys, 1);
        assert_eq!(host.state(PlayerId(1)), None);
    }

    #[test]
    fn test_closed_shell_reports_disconnect() {
        let (mut host, endpoint) = BridgeHost::new();
        drop(endpoint);
        assert!(matches!(
            host.create(PlayerId(1), "abc"),
            Err(HostError::Disconnected)
        ));
    }
}

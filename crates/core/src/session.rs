//! The control loop that keeps playback in step with the store.
//!
//! A [`Session`] owns the engine and runs on a single thread: store changes
//! trigger a reconcile, a fixed interval drives position polling and backend
//! housekeeping, and requests from a [`SessionHandle`] are handled in between.
//! Instances hold `Rc` state, so run the session on a current-thread runtime
//! or inside a `LocalSet`.

use std::path::PathBuf;
use std::sync::Arc;

use soundboard_engine::MixerHandle;
use soundboard_store::{DirBlobStore, SceneTrackId, Store, StoreError};
use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};

use crate::config::SessionConfig;
use crate::local::LocalBackend;
use crate::poller::PositionPoller;
use crate::reconcile::Engine;
use crate::remote::{PlayerHost, RemoteBackend};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Request {
    Seek { id: SceneTrackId, seconds: f64 },
    Shutdown,
}

/// Sendable handle for talking to a running [`Session`].
#[derive(Debug, Clone)]
pub struct SessionHandle {
    requests: mpsc::UnboundedSender<Request>,
}

impl SessionHandle {
    /// Ask the session to seek `id`. Returns false once the session is gone.
    pub fn seek_to(&self, id: SceneTrackId, seconds: f64) -> bool {
        self.requests.send(Request::Seek { id, seconds }).is_ok()
    }

    /// Stop polling and destroy every live instance.
    pub fn shutdown(&self) {
        if self.requests.send(Request::Shutdown).is_err() {
            tracing::debug!("session already stopped");
        }
    }
}

pub struct Session {
    engine: Engine,
    store: Store,
    poller: PositionPoller,
    changes: watch::Receiver<u64>,
    requests: mpsc::UnboundedReceiver<Request>,
    autosave: Option<PathBuf>,
}

impl Session {
    pub fn new(engine: Engine, config: &SessionConfig) -> (Self, SessionHandle) {
        let store = engine.store().clone();
        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let session = Self {
            changes: store.subscribe(),
            store,
            engine,
            poller: PositionPoller::new(config.poll_interval()),
            requests: request_rx,
            autosave: None,
        };
        (
            session,
            SessionHandle {
                requests: request_tx,
            },
        )
    }

    /// Save the state tree to `path` after every change.
    pub fn with_autosave(mut self, path: PathBuf) -> Self {
        self.autosave = Some(path);
        self
    }

    pub async fn run(mut self) {
        tracing::info!(interval = ?self.poller.interval(), "session started");
        self.engine.reconcile();

        let mut ticker = time::interval(self.poller.interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                changed = self.changes.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    self.engine.reconcile();
                    self.save();
                }
                _ = ticker.tick() => {
                    self.engine.process_backend_events();
                    self.poller.tick(self.engine.live(), &self.store);
                    self.engine.maintain();
                }
                request = self.requests.recv() => match request {
                    Some(Request::Seek { id, seconds }) => {
                        self.engine.seek_to(id, seconds);
                    }
                    Some(Request::Shutdown) | None => break,
                },
            }
        }

        self.engine.shutdown();
        tracing::info!("session stopped");
    }

    fn save(&self) {
        let Some(path) = &self.autosave else {
            return;
        };
        if let Err(e) = self.store.save(path) {
            tracing::warn!("failed to save state to {}: {e}", path.display());
        }
    }
}

/// Engine wired to an in-process mixer for local audio and `host` for
/// remote players.
pub fn build_engine(
    store: Store,
    mixer: MixerHandle,
    host: impl PlayerHost + 'static,
    config: &SessionConfig,
) -> Engine {
    let local = LocalBackend::new(mixer, store.clone());
    let remote = RemoteBackend::new(host, config.remote_volume_scale);
    Engine::new(store, Box::new(local), Box::new(remote))
}

/// Open the store described by `config`: blobs on disk, and the saved state
/// tree when there is one.
pub fn open_store(config: &SessionConfig) -> Result<Store, StoreError> {
    let blob_dir = config
        .blob_dir()
        .ok_or_else(|| std::io::Error::other("no data directory for audio blobs"))?;
    let blobs = Arc::new(DirBlobStore::open(blob_dir)?);

    match config.state_path() {
        Some(path) if path.exists() => {
            tracing::info!("loading state from {}", path.display());
            Store::load(&path, blobs)
        }
        _ => Ok(Store::new(blobs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::{BridgeEndpoint, BridgeHost, HostCommand, HostEvent, PlayerId, PlayerState};
    use crate::testing::{Call, FakeBackend, wav_bytes};
    use soundboard_store::{MemoryBlobStore, SceneTrackPatch, Track};
    use std::time::Duration;
    use tempfile::tempdir;

    fn drain(endpoint: &mut BridgeEndpoint) -> Vec<HostCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = endpoint.commands.try_recv() {
            commands.push(command);
        }
        commands
    }

    #[tokio::test(start_paused = true)]
    async fn test_remote_track_lifecycle() {
        let store = Store::in_memory();
        let tavern = store
            .add_track(Track::remote("Tavern", "dQw4w9WgXcQ"), None)
            .unwrap();
        let scene = store.create_scene("Inn").unwrap();
        let st = store.add_track_to_scene(scene, tavern).unwrap();

        let (host, mut endpoint) = BridgeHost::new();
        let config = SessionConfig::default();
        let engine = Engine::new(
            store.clone(),
            Box::new(FakeBackend::new()),
            Box::new(RemoteBackend::new(host, config.remote_volume_scale)),
        );
        let (session, handle) = Session::new(engine, &config);

        let driver = async {
            store.set_scene_playing(scene, true).unwrap();
            time::sleep(Duration::from_millis(50)).await;
            assert_eq!(
                drain(&mut endpoint),
                vec![HostCommand::Create {
                    player: PlayerId(0),
                    video_id: "dQw4w9WgXcQ".into()
                }]
            );

            // Seeking while the player loads does nothing.
            assert!(handle.seek_to(st, 30.0));
            time::sleep(Duration::from_millis(10)).await;
            assert!(drain(&mut endpoint).is_empty());

            endpoint
                .events
                .send(HostEvent::Ready {
                    player: PlayerId(0),
                    duration: 212.0,
                })
                .unwrap();
            time::sleep(Duration::from_millis(150)).await;
            assert_eq!(
                drain(&mut endpoint),
                vec![
                    HostCommand::SetVolume {
                        player: PlayerId(0),
                        volume: 100
                    },
                    HostCommand::Play {
                        player: PlayerId(0)
                    },
                ]
            );
            assert_eq!(store.track(tavern).unwrap().duration, 212.0);

            endpoint
                .events
                .send(HostEvent::StateChange {
                    player: PlayerId(0),
                    state: PlayerState::Playing,
                })
                .unwrap();
            endpoint
                .events
                .send(HostEvent::Progress {
                    player: PlayerId(0),
                    time: 3.0,
                })
                .unwrap();
            time::sleep(Duration::from_millis(150)).await;
            assert_eq!(store.position(st), 3.0);

            assert!(handle.seek_to(st, 60.0));
            time::sleep(Duration::from_millis(10)).await;
            assert_eq!(
                drain(&mut endpoint),
                vec![HostCommand::Seek {
                    player: PlayerId(0),
                    seconds: 60.0
                }]
            );
            assert_eq!(store.position(st), 60.0);

            store
                .update_scene_track(
                    scene,
                    st,
                    SceneTrackPatch {
                        volume: Some(0.25),
                        ..Default::default()
                    },
                )
                .unwrap();
            time::sleep(Duration::from_millis(10)).await;
            assert_eq!(
                drain(&mut endpoint),
                vec![HostCommand::SetVolume {
                    player: PlayerId(0),
                    volume: 25
                }]
            );

            handle.shutdown();
        };

        tokio::join!(session.run(), driver);
        assert!(
            drain(&mut endpoint)
                .iter()
                .any(|c| matches!(c, HostCommand::Destroy { .. }))
        );
        assert!(!handle.seek_to(st, 1.0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_coalesced_switch_and_delete() {
        let store = Store::in_memory();
        let x = store
            .add_track(Track::local("x", 5.0, None), Some(b"x".as_slice()))
            .unwrap();
        let y = store
            .add_track(Track::local("y", 5.0, None), Some(b"y".as_slice()))
            .unwrap();
        let a = store.create_scene("A").unwrap();
        let b = store.create_scene("B").unwrap();
        let x_st = store.add_track_to_scene(a, x).unwrap();
        let y_st = store.add_track_to_scene(b, y).unwrap();

        let local = FakeBackend::new();
        let engine = Engine::new(
            store.clone(),
            Box::new(local.clone()),
            Box::new(FakeBackend::new()),
        );
        let (session, handle) = Session::new(engine, &SessionConfig::default());

        let driver = async {
            store.set_scene_playing(a, true).unwrap();
            store.set_scene_playing(b, true).unwrap();
            store.remove_track(x).unwrap();
            time::sleep(Duration::from_millis(250)).await;

            assert_eq!(local.calls(y_st), vec![Call::Create, Call::Play]);
            assert!(matches!(
                local.calls(x_st).last(),
                None | Some(Call::Destroy)
            ));
            assert_eq!(local.playing_count(), 1);
            handle.shutdown();
        };

        tokio::join!(session.run(), driver);
        assert_eq!(local.calls(y_st).last(), Some(&Call::Destroy));
        assert_eq!(local.playing_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_positions_are_polled_while_playing() {
        let store = Store::in_memory();
        let rain = store
            .add_track(Track::local("rain", 60.0, None), Some(b"x".as_slice()))
            .unwrap();
        let scene = store.create_scene("Forest").unwrap();
        let st = store.add_track_to_scene(scene, rain).unwrap();

        let local = FakeBackend::new();
        let engine = Engine::new(
            store.clone(),
            Box::new(local.clone()),
            Box::new(FakeBackend::new()),
        );
        let (session, handle) = Session::new(engine, &SessionConfig::default());

        let driver = async {
            store.set_scene_playing(scene, true).unwrap();
            time::sleep(Duration::from_millis(10)).await;
            let revision = store.revision();

            local.advance(st, 0.5);
            time::sleep(Duration::from_millis(150)).await;
            assert_eq!(store.position(st), 0.5);

            store.set_scene_playing(scene, false).unwrap();
            time::sleep(Duration::from_millis(10)).await;
            local.advance(st, 0.5);
            time::sleep(Duration::from_millis(150)).await;
            assert_eq!(store.position(st), 0.5);
            assert_eq!(store.revision(), revision + 1);
            handle.shutdown();
        };

        tokio::join!(session.run(), driver);
    }

    #[tokio::test(start_paused = true)]
    async fn test_autosave_writes_state() {
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("state.json");
        let store = Store::in_memory();
        let engine = Engine::new(
            store.clone(),
            Box::new(FakeBackend::new()),
            Box::new(FakeBackend::new()),
        );
        let (session, handle) = Session::new(engine, &SessionConfig::default());
        let session = session.with_autosave(path.clone());

        let driver = async {
            store.create_scene("Storm").unwrap();
            time::sleep(Duration::from_millis(10)).await;
            handle.shutdown();
        };
        tokio::join!(session.run(), driver);

        let saved = soundboard_store::load_state(&path).unwrap();
        assert_eq!(saved.scenes.len(), 1);
        assert_eq!(saved.scenes[0].name, "Storm");
    }

    #[tokio::test]
    async fn test_local_upload_plays_and_reports_position() {
        let store = Store::new(Arc::new(MemoryBlobStore::new()));
        let fly = crate::library::import_local(&store, "fly.wav", wav_bytes(4_000, 128.0))
            .await
            .unwrap();
        assert!((store.track(fly).unwrap().duration - 128.0).abs() < 0.01);

        let scene = store.create_scene("Scene 1").unwrap();
        let st = store.add_track_to_scene(scene, fly).unwrap();
        store.set_scene_playing(scene, true).unwrap();

        let (handle, mut mixer) = soundboard_engine::mixer(4_000, 1);
        let (host, _endpoint) = BridgeHost::new();
        let mut engine = build_engine(store.clone(), handle, host, &SessionConfig::default());
        engine.reconcile();
        assert!(engine.live().get(st).unwrap().is_playing());

        let mut block = vec![0.0; 400];
        for _ in 0..10 {
            mixer.render(&mut block);
        }
        PositionPoller::default().tick(engine.live(), &store);

        let position = store.position(st);
        assert!(position > 0.0 && position <= 5.0, "position {position}");
        assert!(block.iter().any(|s| *s != 0.0));

        engine.shutdown();
        mixer.render(&mut block);
        assert_eq!(mixer.voice_count(), 0);
    }

    #[test]
    fn test_open_store_reads_saved_state() {
        let dir = tempdir().expect("tempdir");
        let config = SessionConfig {
            state_path: Some(dir.path().join("state.json")),
            blob_dir: Some(dir.path().join("audio")),
            ..Default::default()
        };

        let store = open_store(&config).unwrap();
        assert!(store.state().scenes.is_empty());
        store.create_scene("Storm").unwrap();
        store.save(&dir.path().join("state.json")).unwrap();

        let reopened = open_store(&config).unwrap();
        assert_eq!(reopened.state().scenes.len(), 1);
    }
}

use serde::{Deserialize, Serialize};

use crate::{
    alerts::ErrorReporter,
    clients::{DynSource, Sources},
    data::{
        MediaTrackState, NetworkState, PowerState, WindowDescriptor, WorkspaceDescriptor,
        WorkspaceId,
    },
    error::AdapterError,
    scheduler::RefreshScheduler,
};

/// Requests a surface (or another process) can make of the core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    GetSpaces,
    GetActiveSpace,
    GetActiveWindow,
    SwitchSpace(WorkspaceId),
    FocusWindow(String),
    GetSpotifyTrack,
    FocusSpotify,
    GetBatteryStatus,
    GetWifiStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Response {
    Workspaces(Vec<WorkspaceDescriptor>),
    Windows(Vec<WindowDescriptor>),
    Track(MediaTrackState),
    Battery(PowerState),
    Wifi { status: NetworkState },
    Done { success: bool },
    Error { error: AdapterError },
}
impl<T: Into<Response>> From<Result<T, AdapterError>> for Response {
    fn from(res: Result<T, AdapterError>) -> Self {
        match res {
            Ok(val) => val.into(),
            Err(error) => Self::Error { error },
        }
    }
}
impl From<Vec<WorkspaceDescriptor>> for Response {
    fn from(val: Vec<WorkspaceDescriptor>) -> Self {
        Self::Workspaces(val)
    }
}
impl From<Vec<WindowDescriptor>> for Response {
    fn from(val: Vec<WindowDescriptor>) -> Self {
        Self::Windows(val)
    }
}
impl From<()> for Response {
    fn from((): ()) -> Self {
        Self::Done { success: true }
    }
}

/// The request/response side of the core. Workspace and window queries
/// return their errors and also push them to the surfaces' error banner;
/// the indicator queries always answer with something displayable.
#[derive(Clone)]
pub struct CommandService {
    sources: Sources,
    reporter: ErrorReporter,
    scheduler: RefreshScheduler,
}
impl CommandService {
    pub fn new(sources: Sources, reporter: ErrorReporter, scheduler: RefreshScheduler) -> Self {
        Self {
            sources,
            reporter,
            scheduler,
        }
    }

    async fn checked<T: Send + 'static>(&self, source: &DynSource<T>) -> Result<T, AdapterError> {
        let res = source.fetch().await;
        self.note(source.name(), &res);
        res
    }

    fn note<T>(&self, name: &str, res: &Result<T, AdapterError>) {
        match res {
            Ok(_) => self.reporter.mark_available(name),
            Err(err) => self.reporter.report(name, err),
        }
    }

    pub async fn get_spaces(&self) -> Result<Vec<WorkspaceDescriptor>, AdapterError> {
        self.checked(&self.sources.workspaces).await
    }

    pub async fn get_active_space(&self) -> Result<Vec<WorkspaceDescriptor>, AdapterError> {
        self.checked(&self.sources.active_workspace).await
    }

    pub async fn get_active_window(&self) -> Result<Vec<WindowDescriptor>, AdapterError> {
        self.checked(&self.sources.active_window).await
    }

    /// Switches workspace, then refreshes all surfaces twice (now and after
    /// the settle delay) whether or not the switch succeeded.
    pub async fn switch_space(&self, id: &WorkspaceId) -> Result<(), AdapterError> {
        let res = self.sources.aerospace.switch_workspace(id).await;
        self.note("switch-space", &res);
        self.scheduler.refresh_after_action();
        res
    }

    pub async fn focus_window(&self, window_id: &str) -> Result<(), AdapterError> {
        let res = self.sources.aerospace.focus_window(window_id).await;
        self.note("focus-window", &res);
        self.scheduler.refresh_after_action();
        res
    }

    pub async fn get_spotify_track(&self) -> MediaTrackState {
        self.sources.media.fetch().await.unwrap_or_default()
    }

    pub async fn focus_spotify(&self) -> Result<(), AdapterError> {
        self.sources.spotify.focus().await.inspect_err(|err| {
            log::warn!("Failed to focus Spotify: {err}");
        })
    }

    pub async fn get_battery_status(&self) -> PowerState {
        self.sources
            .power
            .fetch()
            .await
            .unwrap_or(PowerState::FALLBACK)
    }

    pub async fn get_wifi_status(&self) -> NetworkState {
        self.sources
            .network
            .fetch()
            .await
            .unwrap_or(NetworkState::Disconnected)
    }

    pub async fn handle(&self, command: Command) -> Response {
        log::debug!("Handling {command:?}");
        match command {
            Command::GetSpaces => self.get_spaces().await.into(),
            Command::GetActiveSpace => self.get_active_space().await.into(),
            Command::GetActiveWindow => self.get_active_window().await.into(),
            Command::SwitchSpace(id) => self.switch_space(&id).await.into(),
            Command::FocusWindow(id) => self.focus_window(&id).await.into(),
            Command::GetSpotifyTrack => Response::Track(self.get_spotify_track().await),
            Command::FocusSpotify => self.focus_spotify().await.into(),
            Command::GetBatteryStatus => Response::Battery(self.get_battery_status().await),
            Command::GetWifiStatus => Response::Wifi {
                status: self.get_wifi_status().await,
            },
        }
    }
}


#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use super::{testing::*, *};
    use crate::{
        exec::testing::{Reply, ScriptedRunner},
        fanout::{SurfaceRegistry, SurfaceSignal},
    };

    #[test]
    fn command_names() {
        assert_eq!(
            serde_json::to_string(&Command::GetSpotifyTrack).unwrap(),
            r#""get-spotify-track""#
        );
        assert_eq!(
            serde_json::from_str::<Command>(r#"{"switch-space":"3"}"#).unwrap(),
            Command::SwitchSpace("3".into())
        );
    }

    #[tokio::test]
    async fn workspace_errors_reach_caller_and_surfaces() {
        let runner = Arc::new(ScriptedRunner::new().on("sh", Reply::fail(1, "server down")));
        let registry = SurfaceRegistry::new();
        let (_, mut rx) = registry.register("main".into());
        let svc = service(runner, registry);

        let res = svc.handle(Command::GetSpaces).await;
        assert!(matches!(
            res,
            Response::Error {
                error: AdapterError::ProcessError { exit_code: Some(1), .. }
            }
        ));
        assert!(matches!(rx.try_recv(), Ok(SurfaceSignal::Error(msg)) if msg.contains("server down")));
    }

    #[tokio::test]
    async fn responses_have_the_expected_json_shape() {
        let runner = Arc::new(
            ScriptedRunner::new()
                .on("sh list-workspaces --all --json", Reply::ok(WORKSPACES))
                .on("sh list-windows --focused --json", Reply::ok(WINDOW))
                .on("osascript", Reply::ok(r#"{"isPlaying":false}"#))
                .on("pmset", Reply::fail(1, "")),
        );
        let svc = service(runner, SurfaceRegistry::new());
        let json = |res: Response| serde_json::to_value(res).unwrap();

        assert_eq!(
            json(svc.handle(Command::GetSpaces).await),
            serde_json::json!([{"workspace": "1"}, {"workspace": "2"}, {"workspace": "3"}])
        );
        assert_eq!(
            json(svc.handle(Command::GetActiveWindow).await),
            serde_json::json!([{"window-id": "77", "window-title": "aerobar - README.md", "app-name": "Zed"}])
        );
        assert_eq!(
            json(svc.handle(Command::GetSpotifyTrack).await),
            serde_json::json!({"isPlaying": false})
        );
        assert_eq!(
            json(svc.handle(Command::GetBatteryStatus).await),
            serde_json::json!({"level": 100, "charging": true})
        );
        assert_eq!(
            json(svc.handle(Command::GetWifiStatus).await),
            serde_json::json!({"status": "disconnected"})
        );
    }

    #[tokio::test(start_paused = true)]
    async fn switch_space_refreshes_twice_even_on_failure() {
        let runner = Arc::new(ScriptedRunner::new().on("sh workspace 9", Reply::fail(1, "no such workspace")));
        let registry = SurfaceRegistry::new();
        let (_, mut rx) = registry.register("main".into());
        let svc = service(runner.clone(), registry);

        assert!(svc.switch_space(&"9".into()).await.is_err());
        tokio::time::sleep(Duration::from_millis(500)).await;

        let signals: Vec<_> = std::iter::from_fn(|| rx.try_recv().ok()).collect();
        let refreshes = signals
            .iter()
            .filter(|it| matches!(it, SurfaceSignal::Refresh(_)))
            .count();
        assert_eq!(refreshes, 2);
        assert_eq!(runner.count("sh workspace"), 1);
    }
}

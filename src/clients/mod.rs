pub mod aerospace;
pub mod clock;
pub mod displays;
pub mod media;
pub mod network;
pub mod power;

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::{
    config::Config,
    data::{MediaTrackState, NetworkState, PowerState, WindowDescriptor, WorkspaceDescriptor},
    error::AdapterError,
    exec::{BinaryResolver, CommandRunner},
};

/// One external data source, translated into a typed value.
pub trait SourceAdapter: Send + Sync + 'static {
    type Output: Send + 'static;

    /// The command name this source answers to.
    fn name(&self) -> &'static str;

    fn fetch(&self) -> BoxFuture<'_, Result<Self::Output, AdapterError>>;
}

pub type DynSource<T> = Arc<dyn SourceAdapter<Output = T>>;

/// Every source a surface re-pulls on refresh, plus the clients that
/// perform actions.
#[derive(Clone)]
pub struct Sources {
    pub workspaces: DynSource<Vec<WorkspaceDescriptor>>,
    pub active_workspace: DynSource<Vec<WorkspaceDescriptor>>,
    pub active_window: DynSource<Vec<WindowDescriptor>>,
    pub media: DynSource<MediaTrackState>,
    pub power: DynSource<PowerState>,
    pub network: DynSource<NetworkState>,
    pub aerospace: Arc<aerospace::AerospaceClient>,
    pub spotify: Arc<media::SpotifyClient>,
}
impl Sources {
    pub fn new(cfg: &Config, runner: Arc<dyn CommandRunner>, resolver: BinaryResolver) -> Self {
        let aerospace = Arc::new(aerospace::AerospaceClient::new(
            cfg.aerospace_bin.clone(),
            runner.clone(),
            resolver,
        ));
        let spotify = Arc::new(media::SpotifyClient::new(runner.clone()));
        Self {
            workspaces: Arc::new(aerospace::AllWorkspaces(aerospace.clone())),
            active_workspace: Arc::new(aerospace::FocusedWorkspace(aerospace.clone())),
            active_window: Arc::new(aerospace::FocusedWindow(aerospace.clone())),
            media: spotify.clone(),
            power: Arc::new(power::PowerClient::new(runner.clone())),
            network: Arc::new(network::NetworkClient::new(runner, cfg.network.clone())),
            aerospace,
            spotify,
        }
    }
}

use std::{collections::BTreeMap, sync::Arc};

use anyhow::Context as _;
use futures::{Stream, StreamExt as _};
use tokio_util::{
    sync::{CancellationToken, DropGuard},
    task::TaskTracker,
};

use crate::{
    alerts::ErrorReporter,
    clients::{
        Sources,
        displays::{DisplayInfo, DisplaySource},
    },
    commands::CommandService,
    config::Config,
    exec::{BinaryResolver, CommandRunner, TokioRunner},
    fanout::{SurfaceId, SurfaceRegistry},
    ipc::{self, ControlRequest, ControlResponse, ControlServer},
    scheduler::RefreshScheduler,
    surface::{Renderer, Surface, SurfaceInput, SurfaceTimings, TerminalRenderer},
    utils::{ResultExt as _, UnbTx, unb_chan},
};

pub type RendererFactory = Arc<dyn Fn(&str) -> Box<dyn Renderer> + Send + Sync>;

/// A line typed on stdin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputLine {
    /// Broadcast a refresh to every surface.
    Refresh,
    /// Deliver to every surface.
    All(SurfaceInput),
    /// Deliver to the first surface only. Used for actions that change global
    /// state and must not run once per display.
    First(SurfaceInput),
}
impl std::str::FromStr for InputLine {
    type Err = anyhow::Error;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut words = line.split_whitespace();
        let cmd = words.next().context("Empty command")?;
        let arg = words.next();
        if let Some(extra) = words.next() {
            anyhow::bail!("Unexpected argument {extra:?}");
        }
        Ok(match (cmd, arg) {
            ("refresh", None) => Self::Refresh,
            ("retry", None) => Self::All(SurfaceInput::Retry),
            ("dismiss", None) => Self::All(SurfaceInput::DismissError),
            ("switch", Some(id)) => Self::First(SurfaceInput::SwitchSpace(id.into())),
            ("window", id) => Self::First(SurfaceInput::FocusWindow(id.map(Into::into))),
            ("spotify", None) => Self::First(SurfaceInput::FocusMedia),
            ("switch", None) => anyhow::bail!("switch needs a workspace id"),
            _ => anyhow::bail!(
                "Unknown command {line:?}. Expected refresh, retry, dismiss, switch <id>, window [id] or spotify"
            ),
        })
    }
}

struct LiveSurface {
    id: SurfaceId,
    inputs: UnbTx<SurfaceInput>,
    _cancel: DropGuard,
}

/// The core process: one surface per display, the refresh timer and the
/// control socket.
pub struct App {
    cfg: Config,
    registry: SurfaceRegistry,
    scheduler: RefreshScheduler,
    commands: CommandService,
    displays: DisplaySource,
    make_renderer: RendererFactory,
    surfaces: BTreeMap<Arc<str>, LiveSurface>,
    tracker: TaskTracker,
}
impl App {
    pub fn new(
        cfg: Config,
        runner: Arc<dyn CommandRunner>,
        resolver: BinaryResolver,
        displays: DisplaySource,
        make_renderer: RendererFactory,
    ) -> Self {
        let registry = SurfaceRegistry::new();
        let scheduler =
            RefreshScheduler::new(registry.clone(), cfg.settle_delay, cfg.catch_up_delay);
        let commands = CommandService::new(
            Sources::new(&cfg, runner, resolver),
            ErrorReporter::new(registry.clone()),
            scheduler.clone(),
        );
        Self {
            cfg,
            registry,
            scheduler,
            commands,
            displays,
            make_renderer,
            surfaces: BTreeMap::new(),
            tracker: TaskTracker::new(),
        }
    }

    /// Real processes, displays from the configuration or `system_profiler`,
    /// and terminal output.
    pub fn from_config(cfg: Config) -> Self {
        let runner: Arc<dyn CommandRunner> = Arc::new(TokioRunner);
        let displays = match &cfg.displays {
            Some(names) => {
                DisplaySource::Fixed(names.iter().map(|name| name.as_str().into()).collect())
            }
            None => DisplaySource::SystemProfiler(runner.clone()),
        };
        Self::new(
            cfg,
            runner,
            BinaryResolver::default(),
            displays,
            Arc::new(|_: &str| -> Box<dyn Renderer> { Box::new(TerminalRenderer::default()) }),
        )
    }

    pub fn registry(&self) -> &SurfaceRegistry {
        &self.registry
    }

    pub fn displays(&self) -> Vec<Arc<str>> {
        self.surfaces.keys().cloned().collect()
    }

    fn open_surface(&mut self, display: Arc<str>) {
        let (id, signals) = self.registry.register(display.clone());
        let (inputs, inputs_rx) = unb_chan();
        let cancel = CancellationToken::new();
        let surface = Surface::new(
            id,
            display.clone(),
            self.commands.clone(),
            (self.make_renderer)(&display),
            SurfaceTimings::from(&self.cfg),
        );
        self.tracker
            .spawn(surface.run(signals, inputs_rx, cancel.clone()));
        log::info!("Opened surface {id} on {display}");
        self.surfaces.insert(
            display,
            LiveSurface {
                id,
                inputs,
                _cancel: cancel.drop_guard(),
            },
        );
    }

    /// Opens surfaces for new displays and closes those of removed ones.
    /// Returns whether a surface was opened.
    pub async fn sync_displays(&mut self) -> bool {
        let current: Vec<DisplayInfo> = self.displays.current().await;

        let removed: Vec<_> = self
            .surfaces
            .keys()
            .filter(|name| !current.iter().any(|it| it.name == **name))
            .cloned()
            .collect();
        for name in removed {
            if let Some(live) = self.surfaces.remove(&name) {
                self.registry.unregister(live.id);
                log::info!("Closed surface {} on removed display {name}", live.id);
            }
        }

        let mut opened = false;
        for display in current {
            if !self.surfaces.contains_key(&display.name) {
                self.open_surface(display.name);
                opened = true;
            }
        }
        opened
    }

    pub fn on_input(&self, line: InputLine) {
        let send = |live: &LiveSurface, input: SurfaceInput| {
            if live.inputs.send(input).is_err() {
                log::warn!("Surface {} is gone", live.id);
            }
        };
        match line {
            InputLine::Refresh => {
                self.scheduler.refresh_now();
            }
            InputLine::All(input) => {
                for live in self.surfaces.values() {
                    send(live, input.clone());
                }
            }
            InputLine::First(input) => match self.surfaces.values().min_by_key(|it| it.id) {
                Some(live) => send(live, input),
                None => log::warn!("No surface to handle {input:?}"),
            },
        }
    }

    /// Runs until `cancel` fires. Lines from `input` are parsed as
    /// [`InputLine`]s; the input ending does not stop the app.
    pub async fn run(
        mut self,
        input: impl Stream<Item = String> + Unpin,
        cancel: CancellationToken,
    ) -> anyhow::Result<()> {
        let tasks_cancel = cancel.child_token();

        self.sync_displays().await;
        log::info!("Started with {} surface(s)", self.surfaces.len());

        self.tracker.spawn({
            let scheduler = self.scheduler.clone();
            let interval = self.cfg.refresh_interval;
            let cancel = tasks_cancel.clone();
            async move { scheduler.run_timer(interval, cancel).await }
        });

        // Without the socket, only refresh-existing invocations are lost.
        if let Some((listener, guard)) = ipc::bind(&self.cfg.socket_path).await.ok_or_log() {
            let server = ControlServer {
                scheduler: self.scheduler.clone(),
                commands: self.commands.clone(),
            };
            let cancel = tasks_cancel.clone();
            self.tracker.spawn(async move {
                let _guard = guard;
                server.serve(listener, cancel).await
            });
        }

        let mut display_poll = tokio::time::interval(self.cfg.display_poll);
        display_poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        display_poll.reset();

        let mut input = input.fuse();
        loop {
            tokio::select! {
                () = cancel.cancelled() => break,
                _ = display_poll.tick() => {
                    if self.sync_displays().await {
                        let scheduler = self.scheduler.clone();
                        self.tracker.spawn(async move { scheduler.catch_up().await });
                    }
                }
                Some(line) = input.next() => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    if let Some(line) = line.parse::<InputLine>().ok_or_log() {
                        self.on_input(line);
                    }
                }
            }
        }

        log::info!("Shutting down");
        tasks_cancel.cancel();
        self.surfaces.clear();
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }
}

/// `REFRESH=true` mode: give a starting core time to subscribe its surfaces,
/// then ask it to refresh them.
pub async fn refresh_existing(cfg: &Config) -> anyhow::Result<usize> {
    tokio::time::sleep(cfg.catch_up_delay).await;
    match ipc::request(&cfg.socket_path, &ControlRequest::Refresh).await? {
        ControlResponse::Refreshed { delivered } => {
            log::info!("Refreshed {delivered} surface(s)");
            Ok(delivered as usize)
        }
        other => anyhow::bail!("Unexpected answer {other:?}"),
    }
}

use std::{sync::Arc, time::Duration};

use tokio::time::Instant;
use tokio_util::{sync::CancellationToken, task::AbortOnDropHandle};

use crate::{
    alerts::ErrorBanner,
    clients::clock,
    commands::CommandService,
    config::Config,
    data::{
        BatteryLevel, MediaTrackState, NetworkState, PowerState, WindowDescriptor,
        WorkspaceDescriptor, WorkspaceId,
    },
    error::AdapterError,
    fanout::{SurfaceId, SurfaceSignal},
    utils::{UnbRx, UnbTx, unb_chan},
};

/// User actions on one surface.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceInput {
    /// The retry control shown when workspaces failed to load.
    Retry,
    SwitchSpace(WorkspaceId),
    /// Focuses the given window, or the one this surface shows.
    FocusWindow(Option<String>),
    FocusMedia,
    DismissError,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum WorkspaceView {
    #[default]
    Loading,
    Ready(Vec<WorkspaceDescriptor>),
    Failed(AdapterError),
}

/// Everything one surface shows. Rebuilt from the sources on every refresh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BarState {
    pub workspaces: WorkspaceView,
    pub active_workspace: Vec<WorkspaceDescriptor>,
    pub active_window: Option<WindowDescriptor>,
    pub media: MediaTrackState,
    pub power: Option<PowerState>,
    pub network: Option<NetworkState>,
    pub clock: String,
}
impl Default for BarState {
    fn default() -> Self {
        Self {
            workspaces: WorkspaceView::Loading,
            active_workspace: Vec::new(),
            active_window: None,
            media: MediaTrackState::NotPlaying,
            power: None,
            network: None,
            clock: clock::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Emphasis {
    Normal,
    Active,
    Muted,
    Error,
    Control,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub text: String,
    pub emphasis: Emphasis,
}
impl Segment {
    fn new(text: impl Into<String>, emphasis: Emphasis) -> Self {
        Self {
            text: text.into(),
            emphasis,
        }
    }
}

fn network_label(state: NetworkState) -> &'static str {
    match state {
        NetworkState::Disconnected => "wifi off",
        NetworkState::NoInternet => "wifi no internet",
        NetworkState::Low => "wifi low",
        NetworkState::Medium => "wifi medium",
        NetworkState::High => "wifi high",
    }
}

/// Lays out one status line.
pub fn layout(state: &BarState, banner: Option<&str>) -> Vec<Segment> {
    use Emphasis as E;

    let mut line = Vec::new();
    if let Some(message) = banner {
        line.push(Segment::new(format!("Error: {message}"), E::Error));
        line.push(Segment::new("[x]", E::Control));
    }

    match &state.workspaces {
        WorkspaceView::Loading => line.push(Segment::new("Loading workspaces...", E::Muted)),
        WorkspaceView::Failed(err) => {
            line.push(Segment::new(format!("Failed to fetch workspaces: {err}"), E::Error));
            line.push(Segment::new("[retry]", E::Control));
        }
        WorkspaceView::Ready(wss) if wss.is_empty() => {
            line.push(Segment::new("No workspaces found", E::Muted));
        }
        WorkspaceView::Ready(wss) => {
            for ws in wss {
                let active = state.active_workspace.iter().any(|it| it.id == ws.id);
                line.push(Segment::new(
                    ws.id.to_string(),
                    if active { E::Active } else { E::Normal },
                ));
            }
        }
    }

    if let Some(win) = &state.active_window {
        line.push(Segment::new(format!("{} / {}", win.app_name, win.title), E::Normal));
    }

    line.push(match &state.media {
        MediaTrackState::Playing { artist, title } => {
            Segment::new(format!("{title} - {artist}"), E::Normal)
        }
        MediaTrackState::NotPlaying | MediaTrackState::Unavailable => {
            Segment::new("Not playing", E::Muted)
        }
    });

    if let Some(network) = state.network {
        line.push(Segment::new(
            network_label(network),
            match network {
                NetworkState::Disconnected | NetworkState::NoInternet => E::Error,
                _ => E::Normal,
            },
        ));
    }
    if let Some(power) = state.power {
        let sign = if power.charging == Some(true) { "+" } else { "" };
        line.push(Segment::new(
            format!("{}%{sign}", power.level_percent),
            match power.bucket() {
                BatteryLevel::Warning => E::Error,
                _ => E::Normal,
            },
        ));
    }

    line.push(Segment::new(state.clock.clone(), E::Normal));
    line.push(Segment::new("[refresh]", E::Control));
    line
}

/// Draws a laid out line for one display.
pub trait Renderer: Send + 'static {
    fn render(&mut self, display: &str, line: &[Segment]);
}

/// Prints each update as one styled line on stdout.
pub struct TerminalRenderer {
    out: std::io::Stdout,
}
impl Default for TerminalRenderer {
    fn default() -> Self {
        Self {
            out: std::io::stdout(),
        }
    }
}
impl Renderer for TerminalRenderer {
    fn render(&mut self, display: &str, line: &[Segment]) {
        use crossterm::style::Stylize as _;
        use std::io::Write as _;

        let mut out = self.out.lock();
        let res = (|| -> std::io::Result<()> {
            write!(out, "{} ", format!("[{display}]").dark_grey())?;
            for (i, seg) in line.iter().enumerate() {
                if i > 0 {
                    write!(out, " ")?;
                }
                let text = seg.text.as_str();
                match seg.emphasis {
                    Emphasis::Normal => write!(out, "{text}")?,
                    Emphasis::Active => write!(out, "{}", text.green().bold())?,
                    Emphasis::Muted => write!(out, "{}", text.dark_grey())?,
                    Emphasis::Error => write!(out, "{}", text.red())?,
                    Emphasis::Control => write!(out, "{}", text.cyan())?,
                }
            }
            writeln!(out)?;
            out.flush()
        })();
        if let Err(err) = res {
            log::error!("Failed to draw bar for {display}: {err}");
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SurfaceTimings {
    pub media_interval: Duration,
    /// Power and network are slow to query and change rarely, so they are
    /// polled on their own timer instead of on every refresh.
    pub indicator_interval: Duration,
    pub error_display: Duration,
}
impl From<&Config> for SurfaceTimings {
    fn from(cfg: &Config) -> Self {
        Self {
            media_interval: cfg.media_interval,
            indicator_interval: cfg.indicator_interval,
            error_display: cfg.error_display,
        }
    }
}

type Indicators = (PowerState, NetworkState);

async fn poll_indicators(commands: CommandService, period: Duration, tx: UnbTx<Indicators>) {
    let mut ticks = tokio::time::interval(period);
    ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        ticks.tick().await;
        let indicators = futures::join!(commands.get_battery_status(), commands.get_wifi_status());
        if tx.send(indicators).is_err() {
            break;
        }
    }
}

/// One presentation surface. It is told *that* something changed and pulls
/// the current values itself.
pub struct Surface {
    id: SurfaceId,
    display: Arc<str>,
    commands: CommandService,
    renderer: Box<dyn Renderer>,
    timings: SurfaceTimings,
    banner: ErrorBanner,
    state: BarState,
    last_line: Option<Vec<Segment>>,
}
impl Surface {
    pub fn new(
        id: SurfaceId,
        display: Arc<str>,
        commands: CommandService,
        renderer: Box<dyn Renderer>,
        timings: SurfaceTimings,
    ) -> Self {
        Self {
            id,
            display,
            commands,
            renderer,
            timings,
            banner: ErrorBanner::new(timings.error_display),
            state: BarState::default(),
            last_line: None,
        }
    }

    pub fn state(&self) -> &BarState {
        &self.state
    }

    pub async fn run(
        mut self,
        mut signals: UnbRx<SurfaceSignal>,
        mut inputs: UnbRx<SurfaceInput>,
        cancel: CancellationToken,
    ) {
        log::info!("Surface {} on {} started", self.id, self.display);
        let (indicator_tx, mut indicators) = unb_chan();
        let _indicator_poll = AbortOnDropHandle::new(tokio::spawn(poll_indicators(
            self.commands.clone(),
            self.timings.indicator_interval,
            indicator_tx,
        )));
        self.repull_all().await;

        let mut media_ticks = tokio::time::interval(self.timings.media_interval);
        media_ticks.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        media_ticks.reset();

        loop {
            let banner_deadline = self.banner.expires_at();
            tokio::select! {
                () = cancel.cancelled() => break,
                signal = signals.recv() => match signal {
                    Some(signal) => self.on_signal(signal, &mut signals).await,
                    None => break,
                },
                Some(input) = inputs.recv() => self.on_input(input).await,
                Some((power, network)) = indicators.recv() => {
                    self.state.power = Some(power);
                    self.state.network = Some(network);
                    self.render();
                }
                _ = media_ticks.tick() => {
                    self.state.media = self.commands.get_spotify_track().await;
                    self.render();
                }
                () = tokio::time::sleep_until(banner_deadline.unwrap_or_else(Instant::now)),
                    if banner_deadline.is_some() =>
                {
                    if self.banner.expire(Instant::now()) {
                        self.render();
                    }
                }
            }
        }
        log::info!("Surface {} on {} closed", self.id, self.display);
    }

    async fn on_signal(&mut self, signal: SurfaceSignal, signals: &mut UnbRx<SurfaceSignal>) {
        match signal {
            SurfaceSignal::Refresh(_) => {
                self.repull_all().await;
                // Refreshes that queued up while pulling are already answered.
                while let Ok(queued) = signals.try_recv() {
                    if let SurfaceSignal::Error(message) = queued {
                        self.show_error(message);
                    }
                }
            }
            SurfaceSignal::Error(message) => self.show_error(message),
        }
    }

    fn show_error(&mut self, message: Arc<str>) {
        self.banner.show(message, Instant::now());
        self.render();
    }

    pub async fn on_input(&mut self, input: SurfaceInput) {
        log::debug!("Surface {} on {}: {input:?}", self.id, self.display);
        match input {
            SurfaceInput::Retry => {
                self.state.workspaces = WorkspaceView::Loading;
                self.render();
                self.repull_workspaces().await;
            }
            SurfaceInput::SwitchSpace(id) => {
                // The resulting refresh signals update this surface.
                _ = self.commands.switch_space(&id).await;
            }
            SurfaceInput::FocusWindow(window_id) => {
                let window_id = window_id
                    .or_else(|| self.state.active_window.as_ref().map(|win| win.window_id.clone()));
                match window_id {
                    Some(id) => {
                        _ = self.commands.focus_window(&id).await;
                    }
                    None => log::debug!("No window to focus on {}", self.display),
                }
            }
            SurfaceInput::FocusMedia => {
                _ = self.commands.focus_spotify().await;
            }
            SurfaceInput::DismissError => {
                self.banner.dismiss();
                self.render();
            }
        }
    }

    async fn repull_workspaces(&mut self) {
        let (workspaces, active) = futures::join!(
            self.commands.get_spaces(),
            self.commands.get_active_space(),
        );
        self.apply_workspaces(workspaces, active);
        self.render();
    }

    fn apply_workspaces(
        &mut self,
        workspaces: Result<Vec<WorkspaceDescriptor>, AdapterError>,
        active: Result<Vec<WorkspaceDescriptor>, AdapterError>,
    ) {
        self.state.workspaces = match workspaces {
            Ok(wss) => WorkspaceView::Ready(wss),
            Err(err) => WorkspaceView::Failed(err),
        };
        self.state.active_workspace = active.unwrap_or_default();
    }

    /// Workspaces and the focused window are drawn as soon as they are in,
    /// media follows. Power and network come from their own poll.
    pub async fn repull_all(&mut self) {
        let commands = &self.commands;
        let (workspaces, active, window) = futures::join!(
            commands.get_spaces(),
            commands.get_active_space(),
            commands.get_active_window(),
        );
        self.apply_workspaces(workspaces, active);
        // A failed window query already went to the error banner.
        self.state.active_window = window.ok().and_then(|wins| wins.into_iter().next());
        self.state.clock = clock::now();
        self.render();

        self.state.media = self.commands.get_spotify_track().await;
        self.render();
    }

    fn render(&mut self) {
        let line = layout(&self.state, self.banner.current(Instant::now()));
        if self.last_line.as_ref() == Some(&line) {
            return;
        }
        self.renderer.render(&self.display, &line);
        self.last_line = Some(line);
    }
}

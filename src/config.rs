use std::{path::PathBuf, str::FromStr, time::Duration};

use anyhow::Context as _;

use crate::clients::network::NetworkConfig;

pub const REFRESH_VAR: &str = "REFRESH";
pub const REFRESH_ARG: &str = "--refresh";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartupMode {
    /// Create one surface per display and drive them.
    CreateSurfaces,
    /// Ask an already running instance to refresh its surfaces, then exit.
    RefreshExisting,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub mode: StartupMode,
    pub aerospace_bin: String,
    pub refresh_interval: Duration,
    pub media_interval: Duration,
    /// Power and network polling, per surface.
    pub indicator_interval: Duration,
    /// Delay before the second refresh after a workspace switch. A guess at how
    /// long the window manager takes to apply the change.
    pub settle_delay: Duration,
    pub catch_up_delay: Duration,
    pub error_display: Duration,
    pub display_poll: Duration,
    pub displays: Option<Vec<String>>,
    pub socket_path: PathBuf,
    pub network: NetworkConfig,
}
impl Default for Config {
    fn default() -> Self {
        Self {
            mode: StartupMode::CreateSurfaces,
            aerospace_bin: "aerospace".into(),
            refresh_interval: Duration::from_secs(1),
            media_interval: Duration::from_millis(500),
            indicator_interval: Duration::from_secs(30),
            settle_delay: Duration::from_millis(150),
            catch_up_delay: Duration::from_secs(1),
            error_display: Duration::from_secs(10),
            display_poll: Duration::from_secs(5),
            displays: None,
            socket_path: std::env::temp_dir().join("aerobar.sock"),
            network: NetworkConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok(), std::env::args().skip(1))
    }

    pub fn from_lookup(
        var: impl Fn(&str) -> Option<String>,
        args: impl IntoIterator<Item = String>,
    ) -> anyhow::Result<Self> {
        let mut cfg = Self::default();

        let flag = var(REFRESH_VAR)
            .map(|val| parse_bool(REFRESH_VAR, &val))
            .transpose()?
            .unwrap_or(false);
        let mut args = args.into_iter().peekable();
        let arg = args.next_if(|it| it == REFRESH_ARG).is_some();
        if let Some(unknown) = args.next() {
            anyhow::bail!("Unexpected argument {unknown:?}");
        }
        if flag || arg {
            cfg.mode = StartupMode::RefreshExisting;
        }

        if let Some(bin) = var("AEROBAR_AEROSPACE_BIN") {
            cfg.aerospace_bin = bin;
        }
        let millis = |key: &str, slot: &mut Duration| -> anyhow::Result<()> {
            if let Some(val) = var(key) {
                *slot = Duration::from_millis(parse_num(key, &val)?);
            }
            Ok(())
        };
        millis("AEROBAR_REFRESH_MS", &mut cfg.refresh_interval)?;
        millis("AEROBAR_MEDIA_MS", &mut cfg.media_interval)?;
        millis("AEROBAR_INDICATOR_MS", &mut cfg.indicator_interval)?;
        millis("AEROBAR_SETTLE_MS", &mut cfg.settle_delay)?;
        millis("AEROBAR_CATCH_UP_MS", &mut cfg.catch_up_delay)?;
        millis("AEROBAR_DISPLAY_POLL_MS", &mut cfg.display_poll)?;
        millis("AEROBAR_PROBE_TIMEOUT_MS", &mut cfg.network.probe_timeout)?;
        if let Some(val) = var("AEROBAR_ERROR_SECS") {
            cfg.error_display = Duration::from_secs(parse_num("AEROBAR_ERROR_SECS", &val)?);
        }

        for (key, interval) in [
            ("AEROBAR_REFRESH_MS", cfg.refresh_interval),
            ("AEROBAR_MEDIA_MS", cfg.media_interval),
            ("AEROBAR_INDICATOR_MS", cfg.indicator_interval),
            ("AEROBAR_DISPLAY_POLL_MS", cfg.display_poll),
        ] {
            anyhow::ensure!(!interval.is_zero(), "{key} must be greater than zero");
        }

        if let Some(displays) = var("AEROBAR_DISPLAYS") {
            let names: Vec<_> = displays
                .split(',')
                .map(str::trim)
                .filter(|it| !it.is_empty())
                .map(String::from)
                .collect();
            anyhow::ensure!(!names.is_empty(), "AEROBAR_DISPLAYS names no displays");
            cfg.displays = Some(names);
        }
        if let Some(path) = var("AEROBAR_SOCKET") {
            cfg.socket_path = path.into();
        }
        if let Some(iface) = var("AEROBAR_WIFI_IFACE") {
            cfg.network.interface = iface;
        }
        if let Some(host) = var("AEROBAR_PROBE_HOST") {
            cfg.network.probe_host = host;
        }
        if let Some(path) = var("AEROBAR_AIRPORT") {
            cfg.network.airport = path.into();
        }

        Ok(cfg)
    }
}

fn parse_num<T: FromStr>(key: &str, val: &str) -> anyhow::Result<T>
where
    T::Err: std::error::Error + Send + Sync + 'static,
{
    val.trim()
        .parse()
        .with_context(|| format!("Invalid value {val:?} for {key}"))
}

fn parse_bool(key: &str, val: &str) -> anyhow::Result<bool> {
    match val.trim() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" | "" => Ok(false),
        _ => anyhow::bail!("Invalid value {val:?} for {key}, expected true or false"),
    }
}

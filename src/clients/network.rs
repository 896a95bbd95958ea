use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
    time::Duration,
};

use futures::future::BoxFuture;
use regex::Regex;

use crate::{clients::SourceAdapter, data::NetworkState, error::AdapterError, exec::CommandRunner};

static PING_TIME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"time[=<]\s*([0-9]+(?:\.[0-9]+)?)\s*ms").expect("valid regex"));
static RSSI: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"agrCtlRSSI:\s*(-?[0-9]+)").expect("valid regex"));

pub const DEFAULT_AIRPORT: &str =
    "/System/Library/PrivateFrameworks/Apple80211.framework/Versions/Current/Resources/airport";

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    pub interface: String,
    pub probe_host: String,
    pub probe_timeout: Duration,
    pub airport: PathBuf,
}
impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            interface: "en0".into(),
            probe_host: "8.8.8.8".into(),
            probe_timeout: Duration::from_secs(2),
            airport: DEFAULT_AIRPORT.into(),
        }
    }
}

/// Signal strength in dBm to a quality bucket.
pub fn classify_rssi(rssi: i32) -> NetworkState {
    match rssi {
        -60.. => NetworkState::High,
        -70.. => NetworkState::Medium,
        _ => NetworkState::Low,
    }
}

/// Probe round trip as a stand-in for signal quality.
pub fn classify_rtt(rtt: Duration) -> NetworkState {
    if rtt < Duration::from_millis(20) {
        NetworkState::High
    } else if rtt < Duration::from_millis(100) {
        NetworkState::Medium
    } else {
        NetworkState::Low
    }
}

pub struct NetworkClient {
    runner: Arc<dyn CommandRunner>,
    cfg: NetworkConfig,
}
impl NetworkClient {
    pub fn new(runner: Arc<dyn CommandRunner>, cfg: NetworkConfig) -> Self {
        Self { runner, cfg }
    }

    pub async fn status(&self) -> NetworkState {
        match self.link_up().await {
            Ok(true) => {}
            Ok(false) => return NetworkState::Disconnected,
            Err(err) => {
                log::debug!("Link state of {} unknown: {err}", self.cfg.interface);
                return NetworkState::Disconnected;
            }
        }

        let rtt = match self.probe().await {
            Ok(rtt) => rtt,
            Err(err) => {
                log::debug!("Liveness probe to {} failed: {err}", self.cfg.probe_host);
                return NetworkState::NoInternet;
            }
        };

        match self.rssi().await {
            Ok(rssi) => classify_rssi(rssi),
            Err(err) => {
                log::trace!("No RSSI, using probe latency: {err}");
                // Reachable, but we could not time it either.
                rtt.map_or(NetworkState::Low, classify_rtt)
            }
        }
    }

    async fn output(&self, program: &Path, args: &[&str]) -> Result<String, AdapterError> {
        let out = self
            .runner
            .run(program, args)
            .await
            .map_err(|err| AdapterError::ScriptError(err.to_string()))?;
        if !out.status.success() {
            return Err(AdapterError::process(out.status, &out.stderr));
        }
        Ok(String::from_utf8_lossy(&out.stdout).into_owned())
    }

    async fn link_up(&self) -> Result<bool, AdapterError> {
        let out = self
            .output(Path::new("ifconfig"), &[self.cfg.interface.as_str()])
            .await?;
        Ok(out.lines().any(|line| line.trim() == "status: active"))
    }

    /// One bounded ping. `Ok(None)` means the host answered but the timing
    /// could not be read.
    async fn probe(&self) -> Result<Option<Duration>, AdapterError> {
        let out = tokio::time::timeout(
            self.cfg.probe_timeout,
            self.output(Path::new("ping"), &["-c", "1", self.cfg.probe_host.as_str()]),
        )
        .await
        .map_err(|_| AdapterError::ProbeTimeout)??;

        Ok(PING_TIME
            .captures(&out)
            .and_then(|caps| caps[1].parse::<f64>().ok())
            .and_then(|ms| Duration::try_from_secs_f64(ms / 1000.0).ok()))
    }

    async fn rssi(&self) -> Result<i32, AdapterError> {
        let out = self.output(&self.cfg.airport, &["-I"]).await?;
        RSSI.captures(&out)
            .and_then(|caps| caps[1].parse().ok())
            .ok_or_else(|| AdapterError::parse(&out))
    }
}
impl SourceAdapter for NetworkClient {
    type Output = NetworkState;
    fn name(&self) -> &'static str {
        "get-wifi-status"
    }
    fn fetch(&self) -> BoxFuture<'_, Result<NetworkState, AdapterError>> {
        Box::pin(async move { Ok(self.status().await) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exec::testing::{Reply, ScriptedRunner};

    const ACTIVE: &str = "en0: flags=8863<UP,BROADCAST> mtu 1500\n\tstatus: active\n";
    const INACTIVE: &str = "en0: flags=8863<UP,BROADCAST> mtu 1500\n\tstatus: inactive\n";

    fn ping(ms: &str) -> Reply {
        Reply::ok(&format!(
            "PING 8.8.8.8 (8.8.8.8): 56 data bytes\n64 bytes from 8.8.8.8: icmp_seq=0 ttl=117 time={ms} ms\n"
        ))
    }

    fn client(runner: ScriptedRunner) -> NetworkClient {
        NetworkClient::new(Arc::new(runner), NetworkConfig::default())
    }

    #[test]
    fn rtt_thresholds() {
        assert_eq!(classify_rtt(Duration::from_millis(15)), NetworkState::High);
        assert_eq!(classify_rtt(Duration::from_millis(50)), NetworkState::Medium);
        assert_eq!(classify_rtt(Duration::from_millis(150)), NetworkState::Low);
        assert_eq!(classify_rtt(Duration::from_millis(20)), NetworkState::Medium);
    }

    #[test]
    fn rssi_thresholds() {
        assert_eq!(classify_rssi(-45), NetworkState::High);
        assert_eq!(classify_rssi(-60), NetworkState::High);
        assert_eq!(classify_rssi(-65), NetworkState::Medium);
        assert_eq!(classify_rssi(-82), NetworkState::Low);
    }

    #[tokio::test]
    async fn classifies_by_latency_without_rssi() {
        for (ms, expected) in [
            ("15.2", NetworkState::High),
            ("50.0", NetworkState::Medium),
            ("150.7", NetworkState::Low),
        ] {
            let runner = ScriptedRunner::new()
                .on("ifconfig en0", Reply::ok(ACTIVE))
                .on("ping", ping(ms));
            assert_eq!(client(runner).fetch().await, Ok(expected));
        }
    }

    #[tokio::test]
    async fn prefers_rssi() {
        let runner = ScriptedRunner::new()
            .on("ifconfig en0", Reply::ok(ACTIVE))
            .on("ping", ping("150.0"))
            .on("airport -I", Reply::ok("     agrCtlRSSI: -52\n     agrExtRSSI: 0\n"));
        assert_eq!(client(runner).status().await, NetworkState::High);
    }

    #[tokio::test]
    async fn link_down_is_disconnected() {
        let runner = ScriptedRunner::new().on("ifconfig en0", Reply::ok(INACTIVE));
        assert_eq!(client(runner).status().await, NetworkState::Disconnected);

        let runner = ScriptedRunner::new().on("ifconfig en0", Reply::fail(1, "no such interface"));
        assert_eq!(client(runner).status().await, NetworkState::Disconnected);
    }

    #[tokio::test]
    async fn unreachable_host_is_no_internet() {
        let runner = ScriptedRunner::new()
            .on("ifconfig en0", Reply::ok(ACTIVE))
            .on("ping", Reply::fail(2, "ping: sendto: No route to host"));
        assert_eq!(client(runner).status().await, NetworkState::NoInternet);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_probe_times_out() {
        let runner = ScriptedRunner::new()
            .on("ifconfig en0", Reply::ok(ACTIVE))
            .on("ping", ping("3.0").after(Duration::from_secs(30)));
        assert_eq!(client(runner).status().await, NetworkState::NoInternet);
    }

    #[tokio::test]
    async fn absurd_ping_time_is_unreadable() {
        let huge = "9".repeat(400);
        let runner = ScriptedRunner::new()
            .on("ifconfig en0", Reply::ok(ACTIVE))
            .on("ping", ping(&huge));
        let client = client(runner);
        assert_eq!(client.probe().await, Ok(None));
        assert_eq!(client.status().await, NetworkState::Low);
    }
}

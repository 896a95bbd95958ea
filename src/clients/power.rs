use std::{path::Path, sync::{Arc, LazyLock}};

use futures::future::BoxFuture;
use regex::Regex;

use crate::{clients::SourceAdapter, data::PowerState, error::AdapterError, exec::CommandRunner};

// e.g. " -InternalBattery-0 (id=4653155)	85%; discharging; 4:12 remaining present: true"
static BATTERY_LINE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,3})%;\s*([^;]+)").expect("valid regex"));

pub struct PowerClient {
    runner: Arc<dyn CommandRunner>,
}
impl PowerClient {
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }

    /// Battery percentage and charge state. Never fails: anything unreadable
    /// shows as a full, charging battery.
    pub async fn status(&self) -> PowerState {
        match self.try_status().await {
            Ok(state) => state,
            Err(err) => {
                log::debug!("Falling back to default power state: {err}");
                PowerState::FALLBACK
            }
        }
    }

    async fn try_status(&self) -> Result<PowerState, AdapterError> {
        let out = self
            .runner
            .run(Path::new("pmset"), &["-g", "batt"])
            .await
            .map_err(|err| AdapterError::ScriptError(err.to_string()))?;
        if !out.status.success() {
            return Err(AdapterError::process(out.status, &out.stderr));
        }
        parse_pmset(&String::from_utf8_lossy(&out.stdout))
    }
}

fn parse_pmset(stdout: &str) -> Result<PowerState, AdapterError> {
    let caps = BATTERY_LINE
        .captures(stdout)
        .ok_or_else(|| AdapterError::parse(stdout))?;
    let level: u8 = caps[1].parse().map_err(|_| AdapterError::parse(stdout))?;
    let charging = match caps[2].trim() {
        "charging" | "finishing charge" => Some(true),
        "discharging" | "charged" | "AC attached" => Some(false),
        other => {
            log::debug!("Unknown battery state {other:?}");
            None
        }
    };
    Ok(PowerState::new(level, charging))
}

impl SourceAdapter for PowerClient {
    type Output = PowerState;
    fn name(&self) -> &'static str {
        "get-battery-status"
    }
    fn fetch(&self) -> BoxFuture<'_, Result<PowerState, AdapterError>> {
        Box::pin(async move { Ok(self.status().await) })
    }
}

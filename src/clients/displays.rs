use std::{path::Path, sync::Arc};

use crate::{error::AdapterError, exec::CommandRunner};

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DisplayInfo {
    pub name: Arc<str>,
}
impl From<&str> for DisplayInfo {
    fn from(name: &str) -> Self {
        Self { name: name.into() }
    }
}

pub const FALLBACK_DISPLAY: &str = "default";

/// Where the set of connected displays comes from.
#[derive(Clone)]
pub enum DisplaySource {
    /// A fixed list, e.g. from configuration.
    Fixed(Vec<DisplayInfo>),
    SystemProfiler(Arc<dyn CommandRunner>),
}
impl DisplaySource {
    /// The displays to put a surface on. Never empty: when enumeration fails
    /// there is still one surface.
    pub async fn current(&self) -> Vec<DisplayInfo> {
        let listed = match self {
            Self::Fixed(displays) => Ok(displays.clone()),
            Self::SystemProfiler(runner) => list_displays(&**runner).await,
        };
        match listed {
            Ok(displays) if !displays.is_empty() => displays,
            Ok(_) => vec![FALLBACK_DISPLAY.into()],
            Err(err) => {
                log::warn!("Failed to enumerate displays, using a single surface: {err}");
                vec![FALLBACK_DISPLAY.into()]
            }
        }
    }
}

pub async fn list_displays(runner: &dyn CommandRunner) -> Result<Vec<DisplayInfo>, AdapterError> {
    #[derive(serde::Deserialize)]
    struct Report {
        #[serde(rename = "SPDisplaysDataType", default)]
        gpus: Vec<Gpu>,
    }
    #[derive(serde::Deserialize)]
    struct Gpu {
        #[serde(rename = "spdisplays_ndrvs", default)]
        displays: Vec<DisplayData>,
    }
    #[derive(serde::Deserialize)]
    struct DisplayData {
        #[serde(rename = "_name")]
        name: Arc<str>,
    }

    let std::process::Output {
        status,
        stdout,
        stderr,
    } = runner
        .run(
            Path::new("system_profiler"),
            &["SPDisplaysDataType", "-json"],
        )
        .await
        .map_err(|err| AdapterError::ScriptError(err.to_string()))?;

    if !status.success() {
        return Err(AdapterError::process(status, &stderr));
    }

    let report = serde_json::from_slice::<Report>(&stdout).map_err(|err| {
        log::debug!("Failed to deserialize system_profiler output: {err}");
        AdapterError::parse(&stdout)
    })?;

    Ok(report
        .gpus
        .into_iter()
        .flat_map(|gpu| gpu.displays)
        .map(|DisplayData { name }| DisplayInfo { name })
        .collect())
}

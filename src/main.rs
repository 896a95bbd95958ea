use std::process::ExitCode;

use aerobar::{
    app::App,
    config::{Config, StartupMode},
    logging::{ProcKindForLogger, init_logger},
    utils::ResultExt as _,
};
use anyhow::Context as _;
use tokio::io::AsyncBufReadExt as _;
use tokio_stream::{StreamExt as _, wrappers::LinesStream};
use tokio_util::sync::CancellationToken;

fn main() -> ExitCode {
    main_inner().unwrap_or(ExitCode::FAILURE)
}

fn main_inner() -> Option<ExitCode> {
    let cfg = Config::from_env();
    init_logger(match cfg.as_ref().map(|cfg| cfg.mode) {
        Ok(StartupMode::RefreshExisting) => ProcKindForLogger::RefreshClient,
        _ => ProcKindForLogger::Core,
    });
    let cfg = cfg.context("Invalid configuration").ok_or_log()?;
    log::debug!("{cfg:?}");

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("Failed to start the tokio runtime")
        .ok_or_log()?;

    let code = runtime.block_on(async move {
        match cfg.mode {
            StartupMode::RefreshExisting => {
                aerobar::app::refresh_existing(&cfg)
                    .await
                    .context("Failed to refresh the running instance")
                    .ok_or_log()?;
            }
            StartupMode::CreateSurfaces => {
                let cancel = CancellationToken::new();
                tokio::spawn({
                    let cancel = cancel.clone();
                    async move {
                        if tokio::signal::ctrl_c()
                            .await
                            .context("Failed to listen for ctrl-c")
                            .ok_or_log()
                            .is_some()
                        {
                            cancel.cancel();
                        }
                    }
                });

                let stdin = LinesStream::new(tokio::io::BufReader::new(tokio::io::stdin()).lines())
                    .filter_map(|line| line.context("Failed to read stdin").ok_or_log());
                App::from_config(cfg)
                    .run(Box::pin(stdin), cancel)
                    .await
                    .ok_or_log()?;
            }
        }
        Some(ExitCode::SUCCESS)
    });
    // A pending stdin read can not be cancelled.
    runtime.shutdown_timeout(std::time::Duration::from_millis(100));
    code
}

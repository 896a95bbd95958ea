use std::sync::OnceLock;

pub const COLOR_VAR: &str = "COLOR";
/// Overrides the log specification, e.g. `AEROBAR_LOG=aerobar::clients=trace,info`.
pub const LOG_SPEC_VAR: &str = "AEROBAR_LOG";

pub fn should_color() -> bool {
    COLOR.get().is_some_and(|it| *it)
}

#[derive(Debug)]
pub enum ProcKindForLogger {
    /// The instance that owns the surfaces.
    Core,
    /// A `REFRESH=true` invocation poking a running core.
    RefreshClient,
}
impl std::fmt::Display for ProcKindForLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Core => write!(f, "CORE"),
            Self::RefreshClient => write!(f, "REFRESH"),
        }
    }
}

static COLOR: OnceLock<bool> = OnceLock::new();
static PROC_NAME: OnceLock<String> = OnceLock::new();

fn parse_color(val: Option<&str>, is_terminal: bool) -> bool {
    match val.unwrap_or("auto") {
        "never" | "no" | "off" | "false" => false,
        "always" | "yes" | "on" | "true" => true,
        _ => is_terminal,
    }
}

pub fn init_logger(proc_kind: ProcKindForLogger) {
    let doit = || -> anyhow::Result<()> {
        use flexi_logger::*;

        PROC_NAME
            .set(proc_kind.to_string())
            .map_err(|_| anyhow::anyhow!("Already set"))?;

        fn format(
            w: &mut dyn std::io::Write,
            now: &mut DeferredNow,
            record: &Record,
        ) -> Result<(), std::io::Error> {
            let color = should_color();

            let now_display = now.format("%Y-%m-%d %H:%M:%S%.3f");
            let now_display = if color {
                format_args!("\x1b[35m{now_display}\x1b[0m")
            } else {
                format_args!("{now_display}")
            };

            let level = record.level();
            let level_colored;
            let level_display = if color {
                level_colored = style(level).paint(level.to_string());
                format_args!("{level_colored}")
            } else {
                format_args!("{level}")
            };

            write!(
                w,
                "[{now_display}] {} {level_display} [{}:{}] {}",
                PROC_NAME.get().map_or("?", String::as_str),
                record.module_path().unwrap_or("<unknown>"),
                record.line().unwrap_or(0),
                record.args(),
            )
        }

        let log_spec = match std::env::var(LOG_SPEC_VAR) {
            Ok(spec) => LogSpecification::parse(&spec)?,
            Err(_) if cfg!(debug_assertions) => LevelFilter::Debug.into(),
            Err(_) => LevelFilter::Info.into(),
        };

        // stdout belongs to the terminal renderer
        let logger = Logger::with(log_spec).format(format).log_to_stderr();
        std::mem::forget(logger.start()?);

        let hook = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            log::error!("{info}");
            hook(info);
        }));

        _ = COLOR.set(parse_color(
            std::env::var(COLOR_VAR).ok().as_deref(),
            std::io::IsTerminal::is_terminal(&std::io::stderr()),
        ));

        Ok(())
    };
    match doit() {
        Ok(()) => log::info!("Started logger for {proc_kind:?}"),
        Err(err) => eprintln!("Failed to start logger: {err}."),
    }
}

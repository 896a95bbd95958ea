use std::{
    collections::BTreeMap,
    path::Path,
    process::Output,
    sync::{Arc, Mutex},
    time::Duration,
};

use aerobar::{
    app::App,
    clients::displays::DisplaySource,
    config::Config,
    data::RefreshSignal,
    exec::{BinaryResolver, CommandRunner},
    fanout::Delivery,
    surface::{Renderer, Segment},
};
use futures::future::BoxFuture;

/// Answers nothing, but counts what was asked.
#[derive(Default)]
struct CountingRunner {
    calls: Mutex<Vec<String>>,
}
impl CountingRunner {
    fn count(&self, needle: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.contains(needle))
            .count()
    }
}
impl CommandRunner for CountingRunner {
    fn run<'a>(
        &'a self,
        _program: &'a Path,
        args: &'a [&'a str],
    ) -> BoxFuture<'a, std::io::Result<Output>> {
        self.calls.lock().unwrap().push(args.join(" "));
        Box::pin(async { Err(std::io::ErrorKind::NotFound.into()) })
    }
}

#[derive(Clone, Default)]
struct PerDisplay(Arc<Mutex<BTreeMap<String, usize>>>);
impl Renderer for PerDisplay {
    fn render(&mut self, display: &str, _line: &[Segment]) {
        *self.0.lock().unwrap().entry(display.to_owned()).or_default() += 1;
    }
}

async fn wait_for(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn one_signal_reaches_every_display() {
    let cfg = Config {
        aerospace_bin: "/bin/sh".into(),
        ..Config::default()
    };
    let runner = Arc::new(CountingRunner::default());
    let rendered = PerDisplay::default();
    let mut app = App::new(
        cfg,
        runner.clone(),
        BinaryResolver::new(vec![], None).without_fallback(),
        DisplaySource::Fixed(vec!["Built-in Retina Display".into(), "LG UltraFine".into()]),
        Arc::new({
            let rendered = rendered.clone();
            move |_: &str| -> Box<dyn Renderer> { Box::new(rendered.clone()) }
        }),
    );

    app.sync_displays().await;
    assert_eq!(app.registry().len(), 2);
    assert_eq!(app.displays().len(), 2);

    // Every surface pulls once on start.
    wait_for(|| runner.count("list-workspaces --all") == 2).await;
    assert_eq!(
        rendered.0.lock().unwrap().keys().cloned().collect::<Vec<_>>(),
        ["Built-in Retina Display", "LG UltraFine"]
    );

    let delivery = app.registry().broadcast_refresh(RefreshSignal::now());
    assert_eq!(
        delivery,
        Delivery {
            delivered: 2,
            skipped: 0
        }
    );
    wait_for(|| runner.count("list-workspaces --all") == 4).await;
    assert_eq!(runner.count("list-windows --focused"), 4);
}

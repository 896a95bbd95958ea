use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use tokio::time::Instant;

use crate::{error::AdapterError, fanout::SurfaceRegistry, utils::lock_mutex};

/// Side channel that pushes workspace/window failures to the surfaces,
/// independent of whoever made the failing call.
///
/// An error is pushed when it differs from the last one seen for the same
/// source. A missing binary is tracked across sources, so it is pushed once
/// no matter how many queries need it.
#[derive(Clone)]
pub struct ErrorReporter {
    registry: SurfaceRegistry,
    last: Arc<Mutex<BTreeMap<String, AdapterError>>>,
}
impl ErrorReporter {
    pub fn new(registry: SurfaceRegistry) -> Self {
        Self {
            registry,
            last: Default::default(),
        }
    }

    fn key(source: &str, err: &AdapterError) -> String {
        match err {
            AdapterError::BinaryNotFound { name } => format!("bin:{name}"),
            _ => source.to_owned(),
        }
    }

    pub fn report(&self, source: &str, err: &AdapterError) {
        {
            let mut last = lock_mutex(&self.last);
            let key = Self::key(source, err);
            if last.get(&key) == Some(err) {
                log::debug!("{source} still failing: {err}");
                return;
            }
            last.insert(key, err.clone());
        }
        if err.is_binary_not_found() {
            log::warn!("{source}: {err}. Features depending on it are disabled");
        } else {
            log::warn!("{source} failed: {err}");
        }
        let delivery = self
            .registry
            .broadcast_error(format!("{source} failed: {err}").into());
        log::trace!("error: {delivery:?}");
    }

    /// Call after a successful query so the next failure of `source`, or a
    /// binary that disappears again, is reported again.
    pub fn mark_available(&self, source: &str) {
        let mut last = lock_mutex(&self.last);
        let before = last.len();
        last.retain(|key, _| key != source && !key.starts_with("bin:"));
        if last.len() != before {
            log::info!("{source} recovered");
        }
    }
}

/// The error display of one surface. Shows a message for a fixed time or
/// until dismissed. A new message replaces the current one.
#[derive(Debug)]
pub struct ErrorBanner {
    shown: Option<(Arc<str>, Instant)>,
    ttl: Duration,
}
impl ErrorBanner {
    pub fn new(ttl: Duration) -> Self {
        Self { shown: None, ttl }
    }

    pub fn show(&mut self, message: Arc<str>, now: Instant) {
        self.shown = Some((message, now + self.ttl));
    }

    pub fn dismiss(&mut self) {
        self.shown = None;
    }

    pub fn current(&self, now: Instant) -> Option<&str> {
        match &self.shown {
            Some((message, until)) if now < *until => Some(&**message),
            _ => None,
        }
    }

    pub fn expires_at(&self) -> Option<Instant> {
        self.shown.as_ref().map(|(_, until)| *until)
    }

    /// Forgets an expired message. Returns whether anything changed.
    pub fn expire(&mut self, now: Instant) -> bool {
        self.shown
            .take_if(|(_, until)| now >= *until)
            .is_some()
    }
}

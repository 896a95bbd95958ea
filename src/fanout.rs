use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use crate::{
    data::RefreshSignal,
    utils::{UnbRx, UnbTx, lock_mutex, unb_chan},
};

/// What the core sends to a presentation surface.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceSignal {
    /// `refresh-data`: re-pull workspaces, window and media.
    Refresh(RefreshSignal),
    /// `error`: show this message in the error banner.
    Error(Arc<str>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfaceId(u64);
impl std::fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Delivery {
    pub delivered: usize,
    pub skipped: usize,
}

struct SurfaceHandle {
    display: Arc<str>,
    tx: UnbTx<SurfaceSignal>,
}

#[derive(Default)]
struct Registry {
    next_id: u64,
    handles: BTreeMap<SurfaceId, SurfaceHandle>,
}

/// The set of open surfaces, one per display.
///
/// A surface is torn down by dropping its receiver. Broadcasting skips and
/// forgets such surfaces instead of failing.
#[derive(Clone, Default)]
pub struct SurfaceRegistry {
    inner: Arc<Mutex<Registry>>,
}
impl SurfaceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, display: Arc<str>) -> (SurfaceId, UnbRx<SurfaceSignal>) {
        let (tx, rx) = unb_chan();
        let mut reg = lock_mutex(&self.inner);
        let id = SurfaceId(reg.next_id);
        reg.next_id += 1;
        log::debug!("Registered surface {id} on {display}");
        reg.handles.insert(id, SurfaceHandle { display, tx });
        (id, rx)
    }

    pub fn unregister(&self, id: SurfaceId) -> bool {
        lock_mutex(&self.inner).handles.remove(&id).is_some()
    }

    pub fn len(&self) -> usize {
        lock_mutex(&self.inner).handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn broadcast_refresh(&self, signal: RefreshSignal) -> Delivery {
        self.broadcast(SurfaceSignal::Refresh(signal))
    }

    pub fn broadcast_error(&self, message: Arc<str>) -> Delivery {
        self.broadcast(SurfaceSignal::Error(message))
    }

    fn broadcast(&self, signal: SurfaceSignal) -> Delivery {
        // Sending does not block, but keep the lock scope to the snapshot anyway.
        let targets: Vec<_> = lock_mutex(&self.inner)
            .handles
            .iter()
            .map(|(id, handle)| (*id, handle.display.clone(), handle.tx.clone()))
            .collect();

        let mut delivery = Delivery::default();
        let mut dead = Vec::new();
        for (id, display, tx) in targets {
            if tx.send(signal.clone()).is_ok() {
                log::trace!("Sent {signal:?} to surface {id} on {display}");
                delivery.delivered += 1;
            } else {
                log::warn!("Skipped destroyed surface {id} on {display}");
                delivery.skipped += 1;
                dead.push(id);
            }
        }

        if !dead.is_empty() {
            let mut reg = lock_mutex(&self.inner);
            for id in dead {
                reg.handles.remove(&id);
            }
        }
        delivery
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_surfaces() {
        let reg = SurfaceRegistry::new();
        assert_eq!(reg.broadcast_refresh(RefreshSignal::now()), Delivery::default());
    }

    #[test]
    fn reaches_every_live_surface() {
        let reg = SurfaceRegistry::new();
        let (_, mut rx_a) = reg.register("Color LCD".into());
        let (_, mut rx_b) = reg.register("DELL U2720Q".into());

        let signal = RefreshSignal::now();
        assert_eq!(
            reg.broadcast_refresh(signal),
            Delivery {
                delivered: 2,
                skipped: 0
            }
        );
        assert_eq!(rx_a.try_recv().unwrap(), SurfaceSignal::Refresh(signal));
        assert_eq!(rx_b.try_recv().unwrap(), SurfaceSignal::Refresh(signal));
        assert!(rx_a.try_recv().is_err());
    }

    #[test]
    fn skips_and_forgets_destroyed_surfaces() {
        let reg = SurfaceRegistry::new();
        let (_, rx_a) = reg.register("a".into());
        let (_, mut rx_b) = reg.register("b".into());
        let (_, rx_c) = reg.register("c".into());
        drop(rx_a);
        drop(rx_c);

        assert_eq!(
            reg.broadcast_error("boom".into()),
            Delivery {
                delivered: 1,
                skipped: 2
            }
        );
        assert_eq!(rx_b.try_recv().unwrap(), SurfaceSignal::Error("boom".into()));
        assert_eq!(reg.len(), 1);

        assert_eq!(
            reg.broadcast_refresh(RefreshSignal::now()),
            Delivery {
                delivered: 1,
                skipped: 0
            }
        );
    }

    #[test]
    fn unregister() {
        let reg = SurfaceRegistry::new();
        let (id, _rx) = reg.register("a".into());
        assert!(reg.unregister(id));
        assert!(!reg.unregister(id));
        assert!(reg.is_empty());
    }
}

// ── View model store ──
//
// Latest `ViewModel` per resource type. Reads are wait-free `ArcSwap`
// loads; writes are generation-ordered read-copy-updates. Each slot
// publishes its installed generation on a `watch` channel.

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;
use strum::IntoEnumIterator;
use tokio::sync::watch;
use tokio_stream::wrappers::WatchStream;
use tracing::debug;

use crate::model::{ResourceType, ViewModel};

struct Slot {
    model: ArcSwap<ViewModel>,
    generation: watch::Sender<u64>,
}

impl Slot {
    fn new(resource: ResourceType) -> Self {
        let (generation, _) = watch::channel(0);
        Self {
            model: ArcSwap::from_pointee(ViewModel::empty(resource)),
            generation,
        }
    }
}

/// One slot per resource type, created up front. Never holds a lock
/// across a read.
pub struct ViewStore {
    slots: HashMap<ResourceType, Slot>,
}

impl ViewStore {
    pub fn new() -> Self {
        Self {
            slots: ResourceType::iter().map(|r| (r, Slot::new(r))).collect(),
        }
    }

    /// The installed model for `resource`. Before the first build this is
    /// an empty, disconnected model at generation 0.
    pub fn get(&self, resource: ResourceType) -> Arc<ViewModel> {
        self.slots
            .get(&resource)
            .map_or_else(|| Arc::new(ViewModel::empty(resource)), |s| s.model.load_full())
    }

    /// Install `model` unless a newer generation is already in place. At
    /// equal generation the later call wins. Returns whether it was
    /// installed.
    pub fn replace(&self, model: ViewModel) -> bool {
        let Some(slot) = self.slots.get(&model.resource) else {
            return false;
        };
        let resource = model.resource;
        let generation = model.generation;
        let model = Arc::new(model);

        let mut installed = false;
        slot.model.rcu(|current| {
            if current.generation > generation {
                installed = false;
                Arc::clone(current)
            } else {
                installed = true;
                Arc::clone(&model)
            }
        });

        if installed {
            slot.generation.send_replace(generation);
        } else {
            debug!(%resource, generation, "discarded stale view model");
        }
        installed
    }

    /// Generation updates for `resource`.
    pub fn subscribe(&self, resource: ResourceType) -> watch::Receiver<u64> {
        self.slots.get(&resource).map_or_else(
            || watch::channel(0).1,
            |s| s.generation.subscribe(),
        )
    }

    /// Generation updates as a `Stream`, starting with the current one.
    pub fn updates(&self, resource: ResourceType) -> WatchStream<u64> {
        WatchStream::new(self.subscribe(resource))
    }
}

impl Default for ViewStore {
    fn default() -> Self {
        Self::new()
    }
}

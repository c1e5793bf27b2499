//! Plugin instantiation off the control thread.
//!
//! A [`PluginLoader`] owns one worker thread fed through a crossbeam channel.
//! Each job names a [`PluginDescriptor`] and a [`LoadTarget`]. The worker
//! reads the destination's current rate and block size, instantiates the unit
//! through a [`PluginFactory`] and installs it. Destinations are held weakly:
//! a dock or instrument slot removed while the job was queued completes the
//! job with `false` instead of resurrecting anything.
//!
//! # Example
//!
//! ```rust,ignore
//! let loader = PluginLoader::new(Arc::new(BuiltinFactory::new()))?;
//! loader.load(
//!     PluginDescriptor::new("gain").with_param("gain_db", -6.0),
//!     LoadTarget::Dock { dock: Arc::downgrade(&dock), index: 0 },
//!     |ok| tracing::info!("gain loaded: {ok}"),
//! );
//! ```

use std::collections::BTreeMap;
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use crossbeam_channel::{Receiver, Sender, unbounded};
use rondo_core::{AudioProcessor, ChannelSet, ProcessorError};

use crate::dock::PluginDock;
use crate::error::{EngineError, Result};
use crate::seq::InstrumentHandle;
use crate::units::{GainUnit, SineInstrument};

/// What to instantiate.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginDescriptor {
    /// Factory identifier, e.g. `"gain"`.
    pub id: String,
    /// Main bus width of the instance.
    pub set: ChannelSet,
    /// Named initial parameter values.
    pub params: BTreeMap<String, f32>,
}

impl PluginDescriptor {
    /// A stereo instance of `id` with default parameters.
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            set: ChannelSet::Stereo,
            params: BTreeMap::new(),
        }
    }

    /// Sets the main bus width.
    pub fn with_set(mut self, set: ChannelSet) -> Self {
        self.set = set;
        self
    }

    /// Sets an initial parameter value.
    pub fn with_param(mut self, name: impl Into<String>, value: f32) -> Self {
        self.params.insert(name.into(), value);
        self
    }

    /// A parameter value, or `default` if unset.
    pub fn param(&self, name: &str, default: f32) -> f32 {
        self.params.get(name).copied().unwrap_or(default)
    }
}

/// Creates units from descriptors.
pub trait PluginFactory: Send + Sync {
    /// Instantiates and prepares the unit `descriptor` names.
    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        sample_rate: f64,
        block_size: usize,
    ) -> core::result::Result<Box<dyn AudioProcessor>, ProcessorError>;
}

/// Metadata of a built-in unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinInfo {
    /// Identifier used in descriptors and session files.
    pub id: &'static str,
    /// Human-readable name.
    pub name: &'static str,
    /// Whether the unit is an instrument (MIDI in, audio out).
    pub instrument: bool,
}

type Constructor = fn(&PluginDescriptor) -> Box<dyn AudioProcessor>;

struct BuiltinEntry {
    info: BuiltinInfo,
    create: Constructor,
}

/// Factory for the units shipped with the engine.
pub struct BuiltinFactory {
    entries: Vec<BuiltinEntry>,
}

impl Default for BuiltinFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BuiltinFactory {
    /// A factory with every built-in unit registered.
    pub fn new() -> Self {
        let mut factory = Self {
            entries: Vec::with_capacity(2),
        };
        factory.register(
            BuiltinInfo {
                id: "gain",
                name: "Gain",
                instrument: false,
            },
            |d| Box::new(GainUnit::new(d.set, d.param("gain_db", 0.0))),
        );
        factory.register(
            BuiltinInfo {
                id: "sine",
                name: "Sine",
                instrument: true,
            },
            |d| Box::new(SineInstrument::new(d.set)),
        );
        factory
    }

    fn register(&mut self, info: BuiltinInfo, create: Constructor) {
        self.entries.push(BuiltinEntry { info, create });
    }

    /// Every registered unit.
    pub fn all(&self) -> Vec<BuiltinInfo> {
        self.entries.iter().map(|e| e.info).collect()
    }

    /// Metadata for `id`.
    pub fn get(&self, id: &str) -> Option<BuiltinInfo> {
        self.entries.iter().find(|e| e.info.id == id).map(|e| e.info)
    }

    /// Like [`PluginFactory::instantiate`] but reports an unknown id as an
    /// engine error.
    pub fn create(
        &self,
        descriptor: &PluginDescriptor,
        sample_rate: f64,
        block_size: usize,
    ) -> Result<Box<dyn AudioProcessor>> {
        if self.get(&descriptor.id).is_none() {
            return Err(EngineError::UnknownPlugin(descriptor.id.clone()));
        }
        Ok(self.instantiate(descriptor, sample_rate, block_size)?)
    }
}

impl PluginFactory for BuiltinFactory {
    fn instantiate(
        &self,
        descriptor: &PluginDescriptor,
        sample_rate: f64,
        block_size: usize,
    ) -> core::result::Result<Box<dyn AudioProcessor>, ProcessorError> {
        let entry = self
            .entries
            .iter()
            .find(|e| e.info.id == descriptor.id)
            .ok_or_else(|| ProcessorError::Instantiate(format!("unknown plugin '{}'", descriptor.id)))?;
        let mut unit = (entry.create)(descriptor);
        unit.prepare(sample_rate, block_size)?;
        Ok(unit)
    }
}

/// Where a loaded unit goes.
#[derive(Debug, Clone)]
pub enum LoadTarget {
    /// Slot `index` of a plugin chain. Past-the-end indices append.
    Dock {
        /// The chain.
        dock: Weak<PluginDock>,
        /// Insert position.
        index: usize,
    },
    /// An instrument slot.
    Instrument(InstrumentHandle),
}

impl LoadTarget {
    fn settings(&self) -> Option<(f64, usize)> {
        match self {
            Self::Dock { dock, .. } => dock
                .upgrade()
                .map(|d| (d.graph().sample_rate(), d.graph().block_size())),
            Self::Instrument(handle) => handle.settings(),
        }
    }

    fn install(&self, unit: Box<dyn AudioProcessor>, identifier: &str) -> bool {
        match self {
            Self::Dock { dock, index } => dock
                .upgrade()
                .is_some_and(|d| d.insert_plugin(unit, *index)),
            Self::Instrument(handle) => handle.install(unit, identifier),
        }
    }
}

/// Completion callback. Receives whether the unit was installed.
pub type LoadCallback = Box<dyn FnOnce(bool) + Send>;

struct LoadJob {
    descriptor: PluginDescriptor,
    target: LoadTarget,
    callback: LoadCallback,
}

/// Background plugin instantiation.
pub struct PluginLoader {
    jobs: Option<Sender<LoadJob>>,
    worker: Option<JoinHandle<()>>,
}

impl PluginLoader {
    /// Starts the worker thread.
    pub fn new(factory: Arc<dyn PluginFactory>) -> Result<Self> {
        let (tx, rx) = unbounded();
        let worker = std::thread::Builder::new()
            .name("rondo-loader".into())
            .spawn(move || run(factory.as_ref(), &rx))
            .map_err(EngineError::Spawn)?;
        Ok(Self {
            jobs: Some(tx),
            worker: Some(worker),
        })
    }

    /// Queues a load. `callback` runs on the worker thread.
    ///
    /// Returns `false` if the worker has stopped; the callback is then never
    /// called.
    pub fn load(
        &self,
        descriptor: PluginDescriptor,
        target: LoadTarget,
        callback: impl FnOnce(bool) + Send + 'static,
    ) -> bool {
        let job = LoadJob {
            descriptor,
            target,
            callback: Box::new(callback),
        };
        self.jobs.as_ref().is_some_and(|tx| tx.send(job).is_ok())
    }
}

fn run(factory: &dyn PluginFactory, jobs: &Receiver<LoadJob>) {
    for job in jobs.iter() {
        let ok = execute(factory, &job.descriptor, &job.target);
        (job.callback)(ok);
    }
    tracing::debug!("plugin_loader: worker stopped");
}

fn execute(factory: &dyn PluginFactory, descriptor: &PluginDescriptor, target: &LoadTarget) -> bool {
    let Some((sample_rate, block_size)) = target.settings() else {
        tracing::debug!("plugin_loader: target of '{}' is gone", descriptor.id);
        return false;
    };
    let unit = match factory.instantiate(descriptor, sample_rate, block_size) {
        Ok(unit) => unit,
        Err(err) => {
            tracing::warn!("plugin_loader: '{}' failed: {err}", descriptor.id);
            return false;
        }
    };
    let installed = target.install(unit, &descriptor.id);
    if installed {
        tracing::debug!("plugin_loader: '{}' installed", descriptor.id);
    }
    installed
}

impl Drop for PluginLoader {
    fn drop(&mut self) {
        // Closing the channel ends the worker's loop.
        self.jobs.take();
        if let Some(worker) = self.worker.take()
            && worker.join().is_err()
        {
            tracing::warn!("plugin_loader: worker panicked");
        }
    }
}

impl core::fmt::Debug for PluginLoader {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("PluginLoader")
            .field("running", &self.worker.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use core::time::Duration;
    use rondo_core::DeferredQueue;

    fn dock() -> Arc<PluginDock> {
        Arc::new(PluginDock::new(
            ChannelSet::Stereo,
            48000.0,
            64,
            Arc::new(DeferredQueue::new()),
        ))
    }

    fn wait(loader: &PluginLoader, descriptor: PluginDescriptor, target: LoadTarget) -> bool {
        let (tx, rx) = crossbeam_channel::bounded(1);
        assert!(loader.load(descriptor, target, move |ok| {
            let _ = tx.send(ok);
        }));
        rx.recv_timeout(Duration::from_secs(5)).unwrap()
    }

    #[test]
    fn test_builtin_registry() {
        let factory = BuiltinFactory::new();
        let ids: Vec<_> = factory.all().iter().map(|i| i.id).collect();
        assert_eq!(ids, vec!["gain", "sine"]);
        assert!(factory.get("sine").unwrap().instrument);
        assert!(matches!(
            factory.create(&PluginDescriptor::new("fuzz"), 48000.0, 64),
            Err(EngineError::UnknownPlugin(ref id)) if id == "fuzz"
        ));
        assert!(matches!(
            factory.instantiate(&PluginDescriptor::new("fuzz"), 48000.0, 64),
            Err(ProcessorError::Instantiate(_))
        ));
    }

    #[test]
    fn test_load_into_dock() {
        let loader = PluginLoader::new(Arc::new(BuiltinFactory::new())).unwrap();
        let d = dock();
        let target = LoadTarget::Dock {
            dock: Arc::downgrade(&d),
            index: 0,
        };
        assert!(wait(
            &loader,
            PluginDescriptor::new("gain").with_param("gain_db", -6.0),
            target
        ));
        assert_eq!(d.plugin_list(), vec![("Gain".to_string(), true)]);
    }

    #[test]
    fn test_vanished_dock_completes_false() {
        let loader = PluginLoader::new(Arc::new(BuiltinFactory::new())).unwrap();
        let d = dock();
        let target = LoadTarget::Dock {
            dock: Arc::downgrade(&d),
            index: 0,
        };
        drop(d);
        assert!(!wait(&loader, PluginDescriptor::new("gain"), target));
    }

    #[test]
    fn test_narrow_unit_rejected_by_dock() {
        let loader = PluginLoader::new(Arc::new(BuiltinFactory::new())).unwrap();
        let d = dock();
        let target = LoadTarget::Dock {
            dock: Arc::downgrade(&d),
            index: 0,
        };
        let mono = PluginDescriptor::new("gain").with_set(ChannelSet::Mono);
        assert!(!wait(&loader, mono, target));
        assert_eq!(d.plugin_count(), 0);
    }
}

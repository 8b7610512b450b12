//! The dependencies every component is built from.

use std::sync::Arc;

use wsup_vcs::Host;

use crate::config::Settings;
use crate::remote::Remote;
use crate::retry::{Sleeper, ThreadSleeper};
use crate::scheduler::{Scheduler, ThreadScheduler};

/// Host, scheduler, sleeper and settings, shared by all components.
///
/// Cheap to clone; components keep their own copy.
#[derive(Clone)]
pub struct Context {
    pub host: Arc<dyn Host>,
    pub scheduler: Arc<dyn Scheduler>,
    pub sleeper: Arc<dyn Sleeper>,
    pub settings: Arc<Settings>,
}

impl Context {
    #[must_use]
    pub fn new(
        host: Arc<dyn Host>,
        scheduler: Arc<dyn Scheduler>,
        sleeper: Arc<dyn Sleeper>,
        settings: Settings,
    ) -> Self {
        Self {
            host,
            scheduler,
            sleeper,
            settings: Arc::new(settings),
        }
    }

    /// Production wiring: real sleeps and a [`ThreadScheduler`] worker, so
    /// cleanup never runs on the caller's thread.
    ///
    /// The worker lives as long as any clone of the context (or a component
    /// built from it). Dropping the last one waits for queued cleanup.
    pub fn start(host: Arc<dyn Host>, settings: Settings) -> std::io::Result<Self> {
        let sleeper: Arc<dyn Sleeper> = Arc::new(ThreadSleeper);
        let scheduler = Arc::new(ThreadScheduler::start(
            settings.cleanup_retry(),
            Arc::clone(&sleeper),
        )?);
        Ok(Self::new(host, scheduler, sleeper, settings))
    }

    pub(crate) fn remote(&self) -> Remote {
        Remote::new(
            Arc::clone(&self.host),
            Arc::clone(&self.sleeper),
            Arc::clone(&self.settings),
        )
    }
}

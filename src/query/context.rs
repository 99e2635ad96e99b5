use std::sync::Arc;

use crate::cluster::{Communicator, ROOT};
use crate::query::errors::QueryError;
use crate::shared::config::Settings;

/// Everything a coordinator or worker needs for one job, built once at
/// startup and passed explicitly.
///
/// `world` carries the query broadcast, record streams, TPUT rounds and the
/// statistics reductions. `progress` is used only by the progress duty so
/// its collectives never interleave with the main duty's.
#[derive(Clone)]
pub struct RuntimeContext {
    world: Arc<dyn Communicator>,
    progress: Arc<dyn Communicator>,
    settings: Arc<Settings>,
}

impl RuntimeContext {
    pub fn new(
        world: Arc<dyn Communicator>,
        progress: Arc<dyn Communicator>,
        settings: Arc<Settings>,
    ) -> Result<Self, QueryError> {
        if world.rank() != progress.rank() || world.size() != progress.size() {
            return Err(QueryError::Argument(format!(
                "world channel is rank {}/{} but progress channel is rank {}/{}",
                world.rank(),
                world.size(),
                progress.rank(),
                progress.size()
            )));
        }
        if world.size() < 2 {
            return Err(QueryError::Argument(
                "a job needs a coordinator and at least one worker".to_string(),
            ));
        }
        Ok(Self {
            world,
            progress,
            settings,
        })
    }

    pub fn rank(&self) -> usize {
        self.world.rank()
    }

    pub fn workers(&self) -> usize {
        self.world.size() - 1
    }

    pub fn is_coordinator(&self) -> bool {
        self.rank() == ROOT
    }

    pub fn world(&self) -> &Arc<dyn Communicator> {
        &self.world
    }

    pub fn progress(&self) -> &Arc<dyn Communicator> {
        &self.progress
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Ends the job cleanly on both channels.
    pub async fn close(&self) {
        self.world.close().await;
        self.progress.close().await;
    }

    /// Tears down both channels so every other rank fails fast.
    pub async fn abort(&self) {
        self.world.abort().await;
        self.progress.abort().await;
    }
}

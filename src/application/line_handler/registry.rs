/// Line handler engine registry
///
/// Maps the `line_handler.engine` configuration tag to a constructor. The
/// default registry knows the simulated exchange; other engines register
/// themselves before the line handler starts.

use crate::application::line_handler::simulated::{SimulatedLineHandlerEngine, SIMULATED_ENGINE};
use crate::application::line_handler::LineHandlerEngine;
use crate::shared::config::EngineConfig;
use crate::shared::error::EngineError;
use crate::shared::timestamp::TimerService;
use std::collections::BTreeMap;
use std::sync::Arc;

pub type LineHandlerEngineFactory =
    fn(&EngineConfig, Arc<dyn TimerService>) -> Result<Box<dyn LineHandlerEngine>, EngineError>;

#[derive(Clone)]
pub struct LineHandlerEngineRegistry {
    factories: BTreeMap<&'static str, LineHandlerEngineFactory>,
}

impl LineHandlerEngineRegistry {
    /// Registry with no engines
    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Replaces any constructor already registered under `tag`
    pub fn register(&mut self, tag: &'static str, factory: LineHandlerEngineFactory) {
        if self.factories.insert(tag, factory).is_some() {
            tracing::warn!(tag, "line handler engine re-registered");
        }
    }

    pub fn create(
        &self,
        tag: &str,
        config: &EngineConfig,
        timer: Arc<dyn TimerService>,
    ) -> Result<Box<dyn LineHandlerEngine>, EngineError> {
        let factory = self
            .factories
            .get(tag)
            .ok_or_else(|| EngineError::UnknownEngine(tag.to_string()))?;
        factory(config, timer)
    }

    pub fn tags(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.factories.keys().copied()
    }
}

impl Default for LineHandlerEngineRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(SIMULATED_ENGINE, SimulatedLineHandlerEngine::from_config);
        registry
    }
}

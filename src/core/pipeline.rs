//! Pipeline domain model

use crate::core::{
    stage::Stage,
    state::{PipelineState, PipelineStatus, StageState},
};
use std::sync::Arc;

/// A stage and its state within one run
#[derive(Clone)]
pub struct StageSlot {
    pub stage: Arc<dyn Stage>,
    pub state: StageState,
}

impl StageSlot {
    pub fn id(&self) -> &str {
        self.stage.id()
    }
}

/// A fixed linear chain of stages
#[derive(Clone)]
pub struct Pipeline {
    pub name: String,
    slots: Vec<StageSlot>,
    pub state: PipelineState,
}

impl Pipeline {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            slots: Vec::new(),
            state: PipelineState::new(),
        }
    }

    /// Append a stage to the end of the chain
    pub fn with_stage(mut self, stage: Arc<dyn Stage>) -> Self {
        self.push(stage);
        self
    }

    pub fn push(&mut self, stage: Arc<dyn Stage>) {
        self.slots.push(StageSlot {
            stage,
            state: StageState::Pending,
        });
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    pub fn slots(&self) -> &[StageSlot] {
        &self.slots
    }

    /// Stage ids in execution order
    pub fn stage_ids(&self) -> Vec<String> {
        self.slots.iter().map(|slot| slot.id().to_string()).collect()
    }

    pub fn slot(&self, id: &str) -> Option<&StageSlot> {
        self.slots.iter().find(|slot| slot.id() == id)
    }

    pub(crate) fn set_state(&mut self, index: usize, state: StageState) {
        if let Some(slot) = self.slots.get_mut(index) {
            slot.state = state;
        }
    }

    /// Whether every stage succeeded
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|slot| slot.state.is_succeeded())
    }

    pub fn is_aborted(&self) -> bool {
        self.state.status == PipelineStatus::Aborted
    }
}

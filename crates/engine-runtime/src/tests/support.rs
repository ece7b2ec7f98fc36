use async_trait::async_trait;
use engine_core::{
    error::StoreError,
    run_state::SharedRunState,
    source::{UnitContext, UnitError, UnitProcessor},
    store::VersionStore,
};
use model::{
    execution::unit::{UnitOutcome, WorkUnit},
    versioning::dataset::DatasetVersion,
};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

type Behaviour = dyn Fn(&WorkUnit) -> Result<UnitOutcome, UnitError> + Send + Sync;

/// Processor whose answer per unit is scripted by a closure. Records every
/// unit it was handed, in call order.
pub struct ScriptedProcessor {
    calls: Mutex<Vec<WorkUnit>>,
    behaviour: Box<Behaviour>,
    delay: Option<Duration>,
}

impl ScriptedProcessor {
    pub fn new(
        behaviour: impl Fn(&WorkUnit) -> Result<UnitOutcome, UnitError> + Send + Sync + 'static,
    ) -> Self {
        ScriptedProcessor {
            calls: Mutex::new(Vec::new()),
            behaviour: Box::new(behaviour),
            delay: None,
        }
    }

    /// Pagination source serving pages of the given sizes, then nothing.
    pub fn pages(sizes: Vec<u64>) -> Self {
        Self::new(move |unit| {
            let page = unit.as_page().expect("page unit");
            let index = (page.offset / page.limit) as usize;
            let returned = sizes.get(index).copied().unwrap_or(0);
            if returned < page.limit {
                Ok(UnitOutcome::Exhausted)
            } else {
                Ok(UnitOutcome::Processed)
            }
        })
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<WorkUnit> {
        self.calls.lock().unwrap().clone()
    }

    pub fn keys(&self) -> Vec<u64> {
        self.calls().iter().map(WorkUnit::key).collect()
    }
}

#[async_trait]
impl UnitProcessor for ScriptedProcessor {
    async fn process_unit(
        &self,
        unit: &WorkUnit,
        ctx: &UnitContext,
    ) -> Result<UnitOutcome, UnitError> {
        self.calls.lock().unwrap().push(unit.clone());
        if let Some(delay) = self.delay {
            // Vary completion order between workers.
            tokio::time::sleep(delay * (1 + (unit.key() % 3) as u32)).await;
        }

        let result = (self.behaviour)(unit);
        if let Err(err) = &result
            && err.is_critical()
        {
            ctx.run_state.set_critical();
        }
        result
    }
}

pub fn critical(msg: &str) -> UnitError {
    UnitError::Invalid(format!("{msg}: connection refused"))
}

pub fn recoverable(msg: &str) -> UnitError {
    UnitError::Invalid(msg.to_string())
}

pub fn shared() -> SharedRunState {
    SharedRunState::new()
}

pub fn as_dyn(processor: &Arc<ScriptedProcessor>) -> Arc<dyn UnitProcessor> {
    processor.clone()
}

/// Version store that counts writes.
#[derive(Default)]
pub struct CountingVersions {
    rows: Mutex<HashMap<String, String>>,
    writes: AtomicUsize,
}

impl CountingVersions {
    pub fn with_version(dataset: &str, version: &str) -> Self {
        let store = CountingVersions::default();
        store
            .rows
            .lock()
            .unwrap()
            .insert(dataset.to_string(), version.to_string());
        store
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }

    pub fn version(&self, dataset: &str) -> Option<String> {
        self.rows.lock().unwrap().get(dataset).cloned()
    }
}

#[async_trait]
impl VersionStore for CountingVersions {
    async fn get(&self, dataset_name: &str) -> Result<Option<String>, StoreError> {
        Ok(self.version(dataset_name))
    }

    async fn set(&self, dataset_name: &str, version: &str) -> Result<(), StoreError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.rows
            .lock()
            .unwrap()
            .insert(dataset_name.to_string(), version.to_string());
        Ok(())
    }

    async fn load(
        &self,
        dataset_name: &str,
    ) -> Result<Option<DatasetVersion>, StoreError> {
        Ok(self
            .version(dataset_name)
            .map(|v| DatasetVersion::completed(dataset_name, v)))
    }
}

//! Executor/Orchestrator (§4.11): drives the end-to-end plan and apply
//! flows, walking the execution DAG in strictly sequential layers with
//! bounded parallelism inside each layer (§5).

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{Mutex, Semaphore};

use crate::datasource;
use crate::error::{MiniformError, Result};
use crate::graph::{self, output_node_key};
use crate::loader::{self, LoadResult, LoadedOutput};
use crate::planner::{self, PlanAction};
use crate::provider::{ProviderRegistry, Schema};
use crate::resolver::{self, DataStore};
use crate::scope::ScopeManager;
use crate::state::{CurrentState, ResourceRecord, StateStore};

const DEFAULT_CONCURRENCY: usize = 8;

pub struct PlanOutput {
    pub actions: Vec<PlanAction>,
}

pub struct ApplyOutput {
    pub actions: Vec<PlanAction>,
    pub outputs: serde_json::Value,
}

pub struct Executor {
    providers: Arc<ProviderRegistry>,
    concurrency: usize,
    cancelled: Arc<AtomicBool>,
}

impl Executor {
    pub fn new(providers: ProviderRegistry) -> Self {
        Self {
            providers: Arc::new(providers),
            concurrency: DEFAULT_CONCURRENCY,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// A cooperative cancellation switch, checked at layer boundaries (§5).
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    /// `plan(source)`: parse, load, evaluate data, diff against state. No
    /// side effects on state.
    pub async fn plan(&self, root_dir: &Path, state: &CurrentState) -> Result<PlanOutput> {
        let (load, data) = self.prepare(root_dir, &self.providers).await?;
        let actions = self.compute_actions(&load, &data, state, &self.providers)?;
        // Cycle detection is part of planning, not just execution: a bad
        // dependency graph must fail `plan` before anything is ever applied.
        let (graph, _) = graph::build_graph(&load.resources, &load.outputs)?;
        graph::layered_topo_sort(&graph)?;
        Ok(PlanOutput { actions })
    }

    /// `apply(source)`: as plan, then execute against the state store,
    /// holding the store's advisory lock for the whole run.
    pub async fn apply(&self, root_dir: &Path, store: &StateStore) -> Result<ApplyOutput> {
        let lock = store.lock()?;
        let result = self.apply_locked(root_dir, store, None).await;
        // Release explicitly so a slow drop doesn't linger past the run.
        let _ = lock.release();
        result
    }

    /// Executes a previously computed plan (e.g. loaded from a plan file)
    /// verbatim instead of recomputing it against the current state — the
    /// actions reviewed at `plan` time are the actions that run.
    pub async fn apply_plan(&self, root_dir: &Path, store: &StateStore, actions: Vec<PlanAction>) -> Result<ApplyOutput> {
        let lock = store.lock()?;
        let result = self.apply_locked(root_dir, store, Some(actions)).await;
        let _ = lock.release();
        result
    }

    async fn apply_locked(&self, root_dir: &Path, store: &StateStore, given_actions: Option<Vec<PlanAction>>) -> Result<ApplyOutput> {
        let mut state = store.read()?;
        let (load, data) = self.prepare(root_dir, &self.providers).await?;
        let actions = match given_actions {
            Some(actions) => actions,
            None => self.compute_actions(&load, &data, &state, &self.providers)?,
        };

        let (graph, _) = graph::build_graph(&load.resources, &load.outputs)?;
        let layers = graph::layered_topo_sort(&graph)?;

        let mut create_update: HashMap<String, PlanAction> = HashMap::new();
        let mut deletes: Vec<PlanAction> = Vec::new();
        for action in actions.clone() {
            match &action {
                PlanAction::Delete { .. } => deletes.push(action),
                _ => {
                    create_update.insert(action.address().to_string(), action);
                }
            }
        }

        let scope = Arc::new(Mutex::new(load.scope));
        let state_lock = Arc::new(Mutex::new(std::mem::take(&mut state)));
        let data = Arc::new(data);
        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let outputs_by_key = index_outputs(&load.outputs);

        let run_result = self
            .run_layers(
                &layers,
                &create_update,
                &outputs_by_key,
                scope.clone(),
                state_lock.clone(),
                data.clone(),
                semaphore,
            )
            .await;

        let run_result = match run_result {
            Ok(()) => self.run_deletes(&deletes, state_lock.clone()).await,
            Err(e) => Err(e),
        };

        let mut final_state = state_lock.lock().await.clone();
        final_state.variables = self.build_variable_snapshot(&scope, &final_state, &data).await?;

        // State is persisted whether the run succeeded or failed (§9: always
        // persist the final, possibly partial, snapshot).
        store.write(&final_state)?;

        run_result?;

        let outputs = self.collect_root_outputs(&load.outputs, &scope).await;
        Ok(ApplyOutput {
            actions,
            outputs,
        })
    }

    async fn prepare(&self, root_dir: &Path, providers: &ProviderRegistry) -> Result<(LoadResult, DataStore)> {
        let load = loader::load_root(root_dir)?;
        let data = datasource::evaluate_all(&load.data_sources, &load.scope, providers).await?;
        Ok((load, data))
    }

    fn compute_actions(
        &self,
        load: &LoadResult,
        data: &DataStore,
        state: &CurrentState,
        providers: &ProviderRegistry,
    ) -> Result<Vec<PlanAction>> {
        let mut resolved = HashMap::new();
        let mut schemas: HashMap<String, Schema> = HashMap::new();

        for r in &load.resources {
            let address = r.address.to_string();
            // Only resources already in state need a resolved value here (for
            // diffing against the recorded attributes); a not-yet-created
            // resource may reference another not-yet-created resource (its id
            // only exists after `apply` runs the create), so resolving it now
            // would fail even though the plan itself is perfectly valid.
            if state.resources.contains_key(&address) {
                let value = resolver::resolve_attrs(&r.stmt.attrs, &r.address.module_path, &load.scope, state, data)?;
                resolved.insert(address, value);
            }

            if !schemas.contains_key(&r.address.resource_type) {
                let provider = providers.get(&r.address.resource_type)?;
                if let Some(schema) = provider.get_schema(&r.address.resource_type) {
                    schemas.insert(r.address.resource_type.clone(), schema);
                }
            }
        }

        Ok(planner::plan(&load.resources, &resolved, state, &schemas))
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_layers(
        &self,
        layers: &[Vec<String>],
        create_update: &HashMap<String, PlanAction>,
        outputs_by_key: &HashMap<String, LoadedOutput>,
        scope: Arc<Mutex<ScopeManager>>,
        state: Arc<Mutex<CurrentState>>,
        data: Arc<DataStore>,
        semaphore: Arc<Semaphore>,
    ) -> Result<()> {
        for layer in layers {
            if self.cancelled.load(Ordering::SeqCst) {
                return Err(MiniformError::plan("apply cancelled at layer boundary"));
            }

            let mut handles = Vec::new();
            for key in layer {
                let permit = semaphore.clone().acquire_owned().await.map_err(|e| {
                    MiniformError::plan(format!("internal error acquiring concurrency permit: {}", e))
                })?;
                let providers = self.providers.clone();
                let scope = scope.clone();
                let state = state.clone();
                let data = data.clone();

                let unit = if let Some(output) = outputs_by_key.get(key) {
                    ExecutionUnit::Output(output.clone())
                } else if let Some(action) = create_update.get(key) {
                    ExecutionUnit::Action(action.clone())
                } else {
                    ExecutionUnit::Noop
                };

                let handle = tokio::spawn(async move {
                    let _permit = permit;
                    execute_unit(unit, providers, scope, state, data).await
                });
                handles.push(handle);
            }

            for handle in handles {
                handle
                    .await
                    .map_err(|e| MiniformError::plan(format!("execution task panicked: {}", e)))??;
            }
        }
        Ok(())
    }

    async fn run_deletes(&self, deletes: &[PlanAction], state: Arc<Mutex<CurrentState>>) -> Result<()> {
        for action in deletes {
            if let PlanAction::Delete { address, resource_type, id, .. } = action {
                let provider = self.providers.get(resource_type)?;
                provider.delete(id, resource_type).await?;

                // A `forceNew` replace emits Delete+Create at the same address;
                // the Create already ran (earlier layer) and re-inserted a new
                // record. Only remove the record here if it's still the one
                // this Delete was planned against, or a pure delete would
                // clobber the replacement's freshly created state.
                let mut state_guard = state.lock().await;
                if state_guard.resources.get(address).map(|r| &r.id) == Some(id) {
                    state_guard.resources.remove(address);
                }
            }
        }
        Ok(())
    }

    async fn build_variable_snapshot(
        &self,
        scope: &Arc<Mutex<ScopeManager>>,
        state: &CurrentState,
        data: &DataStore,
    ) -> Result<HashMap<String, HashMap<String, serde_json::Value>>> {
        let scope_guard = scope.lock().await;
        let mut snapshot: HashMap<String, HashMap<String, serde_json::Value>> = HashMap::new();
        for (scope_str, vars) in scope_guard.all_variables() {
            let mut out = HashMap::new();
            for (name, bound) in vars {
                let value = resolver::resolve(&bound.raw, &bound.def_ctx, &scope_guard, state, data)
                    .unwrap_or(serde_json::Value::Null);
                out.insert(name.clone(), value);
            }
            snapshot.insert(scope_str.clone(), out);
        }
        Ok(snapshot)
    }

    async fn collect_root_outputs(&self, outputs: &[LoadedOutput], scope: &Arc<Mutex<ScopeManager>>) -> serde_json::Value {
        let scope_guard = scope.lock().await;
        let mut out = serde_json::Map::new();
        for o in outputs {
            if o.scope.is_empty() {
                if let Some(v) = scope_guard.get_output("", &o.name) {
                    out.insert(o.name.clone(), v.clone());
                }
            }
        }
        serde_json::Value::Object(out)
    }
}

enum ExecutionUnit {
    Output(LoadedOutput),
    Action(PlanAction),
    Noop,
}

fn module_path_from_scope(scope: &str) -> Vec<String> {
    if scope.is_empty() {
        return Vec::new();
    }
    scope
        .split('.')
        .collect::<Vec<_>>()
        .chunks(2)
        .filter(|c| c.len() == 2 && c[0] == "module")
        .map(|c| c[1].to_string())
        .collect()
}

fn index_outputs(outputs: &[LoadedOutput]) -> HashMap<String, LoadedOutput> {
    outputs
        .iter()
        .map(|o| (output_node_key(&o.scope, &o.name), o.clone()))
        .collect()
}

async fn execute_unit(
    unit: ExecutionUnit,
    providers: Arc<ProviderRegistry>,
    scope: Arc<Mutex<ScopeManager>>,
    state: Arc<Mutex<CurrentState>>,
    data: Arc<DataStore>,
) -> Result<()> {
    match unit {
        ExecutionUnit::Output(output) => {
            let module_path = module_path_from_scope(&output.scope);
            let value = {
                let scope_guard = scope.lock().await;
                let state_guard = state.lock().await;
                resolver::resolve(&output.value, &module_path, &scope_guard, &state_guard, &data)?
            };
            scope.lock().await.set_output(&output.scope, &output.name, value);
            Ok(())
        }
        ExecutionUnit::Action(action) => execute_action(action, providers, scope, state, data).await,
        ExecutionUnit::Noop => Ok(()),
    }
}

async fn execute_action(
    action: PlanAction,
    providers: Arc<ProviderRegistry>,
    scope: Arc<Mutex<ScopeManager>>,
    state: Arc<Mutex<CurrentState>>,
    data: Arc<DataStore>,
) -> Result<()> {
    match action {
        PlanAction::Create { address, resource_type, name, module_path, attributes } => {
            let inputs = {
                let scope_guard = scope.lock().await;
                let state_guard = state.lock().await;
                resolver::resolve_attrs(&attributes, &module_path, &scope_guard, &state_guard, &data)?
            };
            let provider = providers.get(&resource_type)?;
            provider.validate(&resource_type, &inputs).await?;
            let id = provider.create(&resource_type, &inputs).await?;
            let record = ResourceRecord::new(id, resource_type, name, module_path, inputs);
            state.lock().await.resources.insert(address, record);
            Ok(())
        }
        PlanAction::Update { address, resource_type, id, changes, .. } => {
            let merged = {
                let mut state_guard = state.lock().await;
                let record = state_guard.resources.get_mut(&address).ok_or_else(|| {
                    MiniformError::state(format!("resource '{}' missing from state during update", address))
                })?;
                let mut attrs = record.attributes.as_object().cloned().unwrap_or_default();
                for (attr, change) in &changes {
                    attrs.insert(attr.clone(), change.new.clone());
                }
                serde_json::Value::Object(attrs)
            };

            let provider = providers.get(&resource_type)?;
            provider.validate(&resource_type, &merged).await?;
            provider.update(&id, &resource_type, &merged).await?;

            let mut state_guard = state.lock().await;
            if let Some(record) = state_guard.resources.get_mut(&address) {
                record.attributes = merged;
            }
            Ok(())
        }
        PlanAction::Delete { .. } => Ok(()), // never dispatched in this partition
        PlanAction::NoOp { .. } => Ok(()),
    }
}

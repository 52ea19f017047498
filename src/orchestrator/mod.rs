//! Process-level entry point: starts investigations on their own tasks,
//! tracks them while they run and serves their snapshots.
//!
//! Each investigation owns its evidence graph and cancel signal. The oracle
//! rate limiter (inside the gateway), the decision recorder and the metrics
//! are the only state shared between investigations.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::capability::CapabilityRegistry;
use crate::config::{Config, PlannerConfig};
use crate::decision::{Decision, DecisionMetrics, DecisionRecorder};
use crate::error::{AppError, AppResult, PlannerError};
use crate::graph::SharedGraph;
use crate::oracle::{CancelSignal, OracleGateway};
use crate::planner::{
    ActionStatus, EvidenceItem, InvestigationPlan, InvestigationPlanner, InvestigationType, Phase,
    PlanSnapshot, Priority,
};
use crate::storage::{InvestigationSummary, Storage};

/// Tunables for the orchestrator.
#[derive(Debug, Clone, Default)]
pub struct OrchestratorSettings {
    pub planner: PlannerConfig,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            planner: config.planner.clone(),
        }
    }
}

/// Process-wide counters across all investigations.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorMetrics {
    pub investigations_started: u64,
    /// Investigations whose start failed (validation or no strategy).
    pub investigations_rejected: u64,
    pub investigations_completed: u64,
    pub investigations_paused: u64,
    pub investigations_aborted: u64,
    pub actions_executed: u64,
    pub actions_skipped: u64,
    pub actions_failed: u64,
    /// Extra attempts beyond the first, over all actions.
    pub retries: u64,
    pub adaptations: u64,
}

impl OrchestratorMetrics {
    fn record_finished(&mut self, plan: &InvestigationPlan) {
        match plan.phase {
            Phase::Completed => self.investigations_completed += 1,
            Phase::Paused => self.investigations_paused += 1,
            Phase::Aborted => self.investigations_aborted += 1,
            _ => {}
        }
        for action in &plan.completed_actions {
            match action.status {
                ActionStatus::Completed => self.actions_executed += 1,
                ActionStatus::Skipped => self.actions_skipped += 1,
                ActionStatus::Failed => self.actions_failed += 1,
                ActionStatus::Planned | ActionStatus::Executing => {}
            }
            self.retries += u64::from(action.attempts.saturating_sub(1));
        }
        self.adaptations += plan.adaptation_history.len() as u64;
    }
}

/// A tracked investigation.
///
/// Inserted before planning starts so the id stays reserved; `handle` is set
/// once the run task is spawned.
struct LiveInvestigation {
    graph: SharedGraph,
    /// Plan as of the last finished action or phase change.
    plan: watch::Receiver<InvestigationPlan>,
    cancel: CancelSignal,
    handle: Option<JoinHandle<()>>,
}

struct Inner {
    planner: InvestigationPlanner,
    recorder: Arc<DecisionRecorder>,
    storage: Option<Arc<dyn Storage>>,
    investigations: RwLock<HashMap<String, LiveInvestigation>>,
    metrics: Mutex<OrchestratorMetrics>,
}

impl Inner {
    /// Save a snapshot; true only when storage is attached and accepted it.
    async fn persist(&self, plan: &InvestigationPlan, graph: &SharedGraph) -> bool {
        let Some(storage) = &self.storage else {
            return false;
        };
        let snapshot = PlanSnapshot {
            plan: plan.clone(),
            graph: graph.export(),
        };
        match storage.save_snapshot(&snapshot).await {
            Ok(()) => true,
            Err(e) => {
                warn!(investigation_id = %plan.id, error = %e, "Failed to persist snapshot");
                false
            }
        }
    }

    /// Drop a finished investigation from memory once storage holds it.
    async fn evict(&self, investigation_id: &str) {
        self.investigations.write().await.remove(investigation_id);
        let forgotten = self.recorder.forget(investigation_id).await;
        debug!(
            investigation_id = %investigation_id,
            decisions = forgotten,
            "Finished investigation evicted to storage"
        );
    }
}

/// Facade over planner, recorder and storage. Cheap to clone.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        gateway: OracleGateway,
        capabilities: CapabilityRegistry,
        storage: Option<Arc<dyn Storage>>,
        settings: OrchestratorSettings,
    ) -> Self {
        let mut recorder = DecisionRecorder::new(gateway.clone(), settings.planner.autonomy_level);
        if let Some(storage) = &storage {
            recorder = recorder.with_storage(Arc::clone(storage));
        }
        let recorder = Arc::new(recorder);
        let planner = InvestigationPlanner::new(
            gateway,
            capabilities,
            Arc::clone(&recorder),
            settings.planner,
        );

        Self {
            inner: Arc::new(Inner {
                planner,
                recorder,
                storage,
                investigations: RwLock::new(HashMap::new()),
                metrics: Mutex::new(OrchestratorMetrics::default()),
            }),
        }
    }

    /// Plan an investigation and start running it in the background.
    ///
    /// Returns the plan in `Planning`; use [`Orchestrator::get_plan`] or
    /// [`Orchestrator::wait`] to follow it. With storage attached, the
    /// investigation leaves memory once its final snapshot is saved.
    pub async fn start_investigation(
        &self,
        investigation_id: &str,
        items: Vec<EvidenceItem>,
        investigation_type: InvestigationType,
        priority: Priority,
    ) -> AppResult<InvestigationPlan> {
        let graph = SharedGraph::new();
        let cancel = CancelSignal::new();
        let (sender, receiver) = watch::channel(self.inner.planner.new_plan(
            investigation_id,
            investigation_type,
            priority,
        ));

        {
            let mut investigations = self.inner.investigations.write().await;
            let mut exists = investigations.contains_key(investigation_id);
            if let (false, Some(storage)) = (exists, &self.inner.storage) {
                exists = storage.get_snapshot(investigation_id).await?.is_some();
            }
            if exists {
                return Err(PlannerError::Validation {
                    field: "investigation_id".to_string(),
                    reason: format!("{} already exists", investigation_id),
                }
                .into());
            }
            investigations.insert(
                investigation_id.to_string(),
                LiveInvestigation {
                    graph: graph.clone(),
                    plan: receiver,
                    cancel: cancel.clone(),
                    handle: None,
                },
            );
        }

        let plan = match self
            .inner
            .planner
            .start(
                investigation_id,
                items,
                investigation_type,
                priority,
                &graph,
                &cancel,
            )
            .await
        {
            Ok(plan) => plan,
            Err(e) => {
                warn!(investigation_id = %investigation_id, error = %e, "Investigation rejected");
                self.inner.investigations.write().await.remove(investigation_id);
                self.inner.metrics.lock().await.investigations_rejected += 1;
                return Err(e.into());
            }
        };

        self.inner.metrics.lock().await.investigations_started += 1;
        self.inner.persist(&plan, &graph).await;
        sender.send_replace(plan.clone());

        let inner = Arc::clone(&self.inner);
        let task_graph = graph;
        let task_cancel = cancel;
        let mut task_plan = plan.clone();
        let handle = tokio::spawn(async move {
            inner
                .planner
                .run_with_progress(&mut task_plan, &task_graph, &task_cancel, |p| {
                    sender.send_replace(p.clone());
                })
                .await;
            inner.metrics.lock().await.record_finished(&task_plan);
            if inner.persist(&task_plan, &task_graph).await {
                inner.evict(&task_plan.id).await;
            }
        });

        // The task may already have finished and evicted itself.
        if let Some(live) = self
            .inner
            .investigations
            .write()
            .await
            .get_mut(investigation_id)
        {
            live.handle = Some(handle);
        }

        info!(investigation_id = %investigation_id, "Investigation running");
        Ok(plan)
    }

    /// Current plan and graph export, from memory or storage.
    pub async fn get_plan(&self, investigation_id: &str) -> AppResult<PlanSnapshot> {
        if let Some(live) = self.inner.investigations.read().await.get(investigation_id) {
            return Ok(PlanSnapshot {
                plan: live.plan.borrow().clone(),
                graph: live.graph.export(),
            });
        }

        if let Some(storage) = &self.inner.storage {
            if let Some(snapshot) = storage.get_snapshot(investigation_id).await? {
                return Ok(snapshot);
            }
        }

        Err(AppError::InvestigationNotFound {
            investigation_id: investigation_id.to_string(),
        })
    }

    /// Ask a running investigation to stop. It ends `Aborted`.
    pub async fn cancel(&self, investigation_id: &str) -> AppResult<()> {
        let investigations = self.inner.investigations.read().await;
        let live = investigations
            .get(investigation_id)
            .ok_or_else(|| AppError::InvestigationNotFound {
                investigation_id: investigation_id.to_string(),
            })?;
        info!(investigation_id = %investigation_id, "Cancelling investigation");
        live.cancel.cancel();
        Ok(())
    }

    /// Wait for an investigation to reach a terminal phase.
    pub async fn wait(&self, investigation_id: &str) -> AppResult<PlanSnapshot> {
        let tracked = {
            let mut investigations = self.inner.investigations.write().await;
            investigations
                .get_mut(investigation_id)
                .map(|live| (live.handle.take(), live.plan.clone()))
        };

        match tracked {
            // Finished and evicted, or never started here.
            None => return self.finished_from_storage(investigation_id).await,
            Some((Some(handle), _)) => {
                if let Err(e) = handle.await {
                    error!(investigation_id = %investigation_id, error = %e, "Investigation task failed");
                    return Err(AppError::Internal {
                        message: format!("investigation task failed: {}", e),
                    });
                }
            }
            // Another caller holds the handle, or planning is still under way.
            Some((None, mut receiver)) => {
                if receiver.wait_for(|plan| plan.is_finished()).await.is_err() {
                    // The sender only drops early when planning was rejected.
                    return Err(AppError::InvestigationNotFound {
                        investigation_id: investigation_id.to_string(),
                    });
                }
            }
        }

        self.get_plan(investigation_id).await
    }

    async fn finished_from_storage(&self, investigation_id: &str) -> AppResult<PlanSnapshot> {
        if let Some(storage) = &self.inner.storage {
            if let Some(snapshot) = storage.get_snapshot(investigation_id).await? {
                if snapshot.plan.is_finished() {
                    return Ok(snapshot);
                }
            }
        }
        Err(AppError::InvestigationNotFound {
            investigation_id: investigation_id.to_string(),
        })
    }

    /// Ids of the investigations held in memory, sorted.
    ///
    /// With storage attached these are the ones still planning or running.
    pub async fn tracked(&self) -> Vec<String> {
        let mut ids: Vec<String> = self
            .inner
            .investigations
            .read()
            .await
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    /// Tracked and stored investigations, most recently updated first.
    pub async fn list(&self) -> AppResult<Vec<InvestigationSummary>> {
        let mut summaries: Vec<InvestigationSummary> = self
            .inner
            .investigations
            .read()
            .await
            .values()
            .map(|live| {
                InvestigationSummary::from_snapshot(&PlanSnapshot {
                    plan: live.plan.borrow().clone(),
                    graph: live.graph.export(),
                })
            })
            .collect();

        if let Some(storage) = &self.inner.storage {
            for stored in storage.list_investigations().await? {
                if !summaries.iter().any(|s| s.id == stored.id) {
                    summaries.push(stored);
                }
            }
        }

        summaries.sort_by(|a, b| b.updated_at.cmp(&a.updated_at).then_with(|| a.id.cmp(&b.id)));
        Ok(summaries)
    }

    /// Recorded decisions of an investigation.
    pub async fn decisions(&self, investigation_id: &str) -> AppResult<Vec<Decision>> {
        let recorded = self.inner.recorder.history_for(investigation_id).await;
        if !recorded.is_empty() {
            return Ok(recorded);
        }
        match &self.inner.storage {
            Some(storage) => Ok(storage.get_decisions(investigation_id).await?),
            None => Ok(recorded),
        }
    }

    pub async fn metrics(&self) -> OrchestratorMetrics {
        self.inner.metrics.lock().await.clone()
    }

    pub async fn decision_metrics(&self) -> DecisionMetrics {
        self.inner.recorder.metrics().await
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("planner", &self.inner.planner)
            .field("persistent", &self.inner.storage.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::{ActionKind, ActionResult, PlannedAction, ResourceAllocation};

    fn finished_plan() -> InvestigationPlan {
        let config = PlannerConfig::default();
        let mut plan = InvestigationPlan::new(
            "inv",
            InvestigationType::General,
            Priority::Normal,
            ResourceAllocation::for_priority(Priority::Normal, &config, 1),
        );
        let kind = ActionKind::AiAnalysis {
            focus: "x".to_string(),
            evidence_ids: vec![],
        };

        let mut done = PlannedAction::new("action-1", kind.clone());
        done.status = ActionStatus::Completed;
        done.attempts = 3;
        done.result = Some(ActionResult {
            evidence_ids: vec![],
            confidence: 0.7,
            risk_indicators: vec![],
            summary: String::new(),
            tokens_used: 0,
            cost: 0.0,
        });
        let mut skipped = PlannedAction::new("action-2", kind);
        skipped.status = ActionStatus::Skipped;
        skipped.attempts = 1;

        plan.completed_actions = vec![done, skipped];
        plan.phase = Phase::Completed;
        plan
    }

    #[test]
    fn test_metrics_record_finished_plan() {
        let mut metrics = OrchestratorMetrics::default();
        metrics.record_finished(&finished_plan());

        assert_eq!(metrics.investigations_completed, 1);
        assert_eq!(metrics.actions_executed, 1);
        assert_eq!(metrics.actions_skipped, 1);
        assert_eq!(metrics.retries, 2);
        assert_eq!(metrics.adaptations, 0);
    }
}

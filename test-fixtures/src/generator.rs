//! Scripted generation provider.
//!
//! Responses are resolved per task type: a queued response first, then a
//! responder closure, then a fixed default. A task with none of these fails
//! like an unavailable provider.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use strata_core::errors::{GenerationError, StrataResult};
use strata_core::models::{GenerationRequest, GenerationResponse, TaskType};
use strata_core::traits::IGenerationProvider;

type Responder = Box<dyn Fn(&GenerationRequest) -> Value + Send + Sync>;

#[derive(Default)]
pub struct MockGenerator {
    queued: Mutex<HashMap<TaskType, VecDeque<Value>>>,
    responders: Mutex<HashMap<TaskType, Arc<Responder>>>,
    defaults: Mutex<HashMap<TaskType, Value>>,
    calls: DashMap<TaskType, usize>,
    prompts: Mutex<Vec<GenerationRequest>>,
    failing: AtomicBool,
    delay_ms: AtomicU64,
}

impl MockGenerator {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Queue a one-shot response for `task`.
    pub fn push_response(&self, task: TaskType, output: Value) {
        self.queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .entry(task)
            .or_default()
            .push_back(output);
    }

    /// Compute responses for `task` from the request.
    pub fn respond_with<F>(&self, task: TaskType, f: F)
    where
        F: Fn(&GenerationRequest) -> Value + Send + Sync + 'static,
    {
        self.responders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task, Arc::new(Box::new(f)));
    }

    pub fn set_default(&self, task: TaskType, output: Value) {
        self.defaults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(task, output);
    }

    /// Make every call fail until turned off.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Delay every call, to exercise caller timeouts.
    pub fn set_delay(&self, delay: Duration) {
        self.delay_ms.store(delay.as_millis() as u64, Ordering::SeqCst);
    }

    pub fn calls(&self, task: TaskType) -> usize {
        self.calls.get(&task).map(|c| *c).unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.iter().map(|c| *c.value()).sum()
    }

    pub fn requests(&self) -> Vec<GenerationRequest> {
        self.prompts.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn resolve(&self, request: &GenerationRequest) -> Option<Value> {
        let task = request.task_type;
        if let Some(v) = self
            .queued
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get_mut(&task)
            .and_then(VecDeque::pop_front)
        {
            return Some(v);
        }
        let responder = self
            .responders
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&task)
            .cloned();
        if let Some(f) = responder {
            return Some(f(request));
        }
        self.defaults
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(&task)
            .cloned()
    }
}

#[async_trait]
impl IGenerationProvider for MockGenerator {
    async fn generate(&self, request: &GenerationRequest) -> StrataResult<GenerationResponse> {
        *self.calls.entry(request.task_type).or_insert(0) += 1;
        self.prompts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request.clone());

        let delay = self.delay_ms.load(Ordering::SeqCst);
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
        if self.failing.load(Ordering::SeqCst) {
            return Err(GenerationError::ProviderFailed {
                provider: "mock".into(),
                reason: "injected failure".into(),
            }
            .into());
        }
        match self.resolve(request) {
            Some(output) => Ok(GenerationResponse {
                output,
                provider: "mock".into(),
                tokens_used: Some(42),
            }),
            None => Err(GenerationError::ProviderFailed {
                provider: "mock".into(),
                reason: format!("no scripted response for {}", request.task_type.as_str()),
            }
            .into()),
        }
    }

    fn name(&self) -> &str {
        "mock"
    }
}

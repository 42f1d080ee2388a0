//! Scripted provider for tests: method name -> queue of responses.
//!
//! Each request pops the next scripted response for its method; the last one
//! stays in place and answers every later request.

use super::provider::{Provider, ProviderError};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

type Response = Result<Value, ProviderError>;

#[derive(Default)]
pub struct MockProvider {
    scripts: Mutex<HashMap<String, VecDeque<Response>>>,
    requests: Mutex<Vec<(String, Value)>>,
}

impl MockProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(&self, method: &str, value: Value) {
        self.push(method, Ok(value));
    }

    pub fn fail(&self, method: &str, error: ProviderError) {
        self.push(method, Err(error));
    }

    pub fn script(&self, method: &str, responses: Vec<Response>) {
        for response in responses {
            self.push(method, response);
        }
    }

    fn push(&self, method: &str, response: Response) {
        self.scripts
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(response);
    }

    pub fn calls(&self, method: &str) -> usize {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .filter(|(name, _)| name == method)
            .count()
    }

    pub fn total_calls(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn last_params(&self, method: &str) -> Option<Value> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(name, _)| name == method)
            .map(|(_, params)| params.clone())
    }
}

#[async_trait]
impl Provider for MockProvider {
    async fn send(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        self.requests
            .lock()
            .unwrap()
            .push((method.to_string(), params));

        let mut scripts = self.scripts.lock().unwrap();
        match scripts.get_mut(method) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap(),
            Some(queue) => queue
                .front()
                .cloned()
                .unwrap_or_else(|| Err(ProviderError::ServerError(format!("no stub for {}", method)))),
            None => Err(ProviderError::ServerError(format!("no stub for {}", method))),
        }
    }
}

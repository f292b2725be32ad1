//! Shared fixtures for the integration tests: a scripted planner and an
//! in-memory stand-in for the collaborator services.

#![allow(dead_code, clippy::panic, clippy::unwrap_used)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::{Value, json};

use agent_flow::agent::planner::planner_update;
use agent_flow::agent::{
    Agent, ChatResponse, ChatState, ChatStateUpdate, ChatbotApp, ChatbotConfig, PromptSet,
    RequestToolRegistry, ServiceInvoker, ServiceName, ToolCall,
};
use agent_flow::error::AgentError;

/// In-memory collaborator services.
///
/// - rewrite echoes the query
/// - intention detection returns `examples`
/// - retrieval returns one document per requested retriever, named after it
/// - generation answers `"<contexts> => <query>"`
/// - remote tools return `tool_result`
///
/// Services listed in `failing` record the call and then return
/// [`AgentError::ServiceInvocation`].
#[derive(Debug)]
pub struct FakeServices {
    pub examples: Value,
    pub tool_result: Value,
    pub failing: Vec<ServiceName>,
    calls: Mutex<Vec<(ServiceName, Value)>>,
}

impl FakeServices {
    pub fn new(examples: Value) -> Self {
        Self {
            examples,
            tool_result: json!("sunny, 21C"),
            failing: Vec::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing_on(mut self, service: ServiceName) -> Self {
        self.failing.push(service);
        self
    }

    pub fn calls(&self, service: ServiceName) -> Vec<Value> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(s, _)| *s == service)
            .map(|(_, body)| body.clone())
            .collect()
    }
}

#[async_trait]
impl ServiceInvoker for FakeServices {
    async fn invoke(&self, service: ServiceName, request: Value) -> Result<Value, AgentError> {
        self.calls.lock().unwrap().push((service, request.clone()));
        if self.failing.contains(&service) {
            return Err(AgentError::service(service, "service unavailable"));
        }
        match service {
            ServiceName::QueryRewrite => Ok(request["query"].clone()),
            ServiceName::IntentionDetection => Ok(self.examples.clone()),
            ServiceName::Retrieval => {
                let docs: Vec<Value> = request["retrievers"]
                    .as_array()
                    .map(|retrievers| {
                        retrievers
                            .iter()
                            .map(|r| {
                                let name = r["name"].as_str().unwrap_or_default();
                                json!({
                                    "page_content": name,
                                    "figure": [{"src": "shared.png"}, {"src": format!("{name}.png")}]
                                })
                            })
                            .collect()
                    })
                    .unwrap_or_default();
                Ok(json!({"result": {"docs": docs}}))
            }
            ServiceName::Generation => {
                let contexts = request["llm_input"]["contexts"]
                    .as_array()
                    .map(|c| {
                        c.iter()
                            .filter_map(Value::as_str)
                            .collect::<Vec<_>>()
                            .join(",")
                    })
                    .unwrap_or_default();
                let query = request["llm_input"]["query"].as_str().unwrap_or_default();
                Ok(json!(format!("[{contexts}] => {query}")))
            }
            ServiceName::ToolExecution => Ok(self.tool_result.clone()),
        }
    }
}

/// One planned call: tool name and JSON arguments.
pub type Step = Vec<(&'static str, Value)>;

/// Planner that replays a fixed script, repeating the last step once the
/// script runs out.
#[derive(Debug)]
pub struct ScriptedPlanner {
    steps: Mutex<VecDeque<Step>>,
    last: Mutex<Option<Step>>,
    calls: AtomicU32,
}

impl ScriptedPlanner {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last: Mutex::new(None),
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn next_step(&self) -> Step {
        let next = self.steps.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        if let Some(step) = next {
            *last = Some(step.clone());
            return step;
        }
        last.clone().unwrap_or_default()
    }
}

#[async_trait]
impl Agent for ScriptedPlanner {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn model(&self) -> &str {
        "scripted-model"
    }

    async fn plan(
        &self,
        state: &ChatState,
        tools: &RequestToolRegistry,
    ) -> Result<ChatStateUpdate, AgentError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let call_number = state.agent_current_call_number + 1;
        let tool_calls = self
            .next_step()
            .into_iter()
            .enumerate()
            .map(|(i, (name, args))| ToolCall {
                id: format!("scripted_{call_number}_{i}"),
                name: name.to_string(),
                arguments: args.to_string(),
            })
            .collect();
        let response = ChatResponse {
            tool_calls,
            finish_reason: Some("tool_calls".to_string()),
            ..ChatResponse::default()
        };
        Ok(planner_update(&response, tools, self.model(), call_number))
    }
}

/// Builds an app over the given fakes.
pub fn app(services: &Arc<FakeServices>, planner: &Arc<ScriptedPlanner>) -> ChatbotApp {
    ChatbotApp::new(
        Arc::clone(services) as Arc<dyn ServiceInvoker>,
        Arc::clone(planner) as Arc<dyn Agent>,
        Arc::new(PromptSet::defaults()),
    )
    .unwrap()
}

/// Chatbot configuration from JSON.
pub fn config(value: Value) -> ChatbotConfig {
    serde_json::from_value(value).unwrap()
}

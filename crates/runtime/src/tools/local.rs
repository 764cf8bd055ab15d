//! In-process tools.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value};

use super::{ToolError, ToolSpec};

/// A tool implemented inside this process.
#[async_trait]
pub trait LocalTool: Send + Sync {
    fn spec(&self) -> ToolSpec;

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError>;
}

/// A [`LocalTool`] backed by an async closure.
pub struct FnTool<F> {
    spec: ToolSpec,
    handler: F,
}

impl<F, Fut> FnTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    pub fn new(spec: ToolSpec, handler: F) -> Self {
        Self { spec, handler }
    }
}

#[async_trait]
impl<F, Fut> LocalTool for FnTool<F>
where
    F: Fn(Map<String, Value>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, ToolError>> + Send + 'static,
{
    fn spec(&self) -> ToolSpec {
        self.spec.clone()
    }

    async fn call(&self, arguments: Map<String, Value>) -> Result<Value, ToolError> {
        (self.handler)(arguments).await
    }
}

/// Local tools by name. Registering a name twice keeps the later tool.
#[derive(Clone, Default)]
pub struct LocalTools {
    tools: Vec<Arc<dyn LocalTool>>,
}

impl LocalTools {
    pub fn register(&mut self, tool: Arc<dyn LocalTool>) {
        let name = tool.spec().name;
        self.tools.retain(|t| t.spec().name != name);
        self.tools.push(tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn LocalTool>> {
        self.tools.iter().find(|t| t.spec().name == name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn specs(&self) -> Vec<ToolSpec> {
        self.tools.iter().map(|t| t.spec()).collect()
    }

    pub fn names(&self) -> Vec<String> {
        self.tools.iter().map(|t| t.spec().name).collect()
    }
}

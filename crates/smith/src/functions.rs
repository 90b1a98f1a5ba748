use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::errors::{AgentError, AgentResult};
use crate::models::function::FunctionDescriptor;
use crate::models::message::Message;
use crate::schema::{generate_schema, Param, SchemaError};

/// What a local function hands back to the agent
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionOutput {
    /// A complete message, e.g. from a nested agent the function is driving.
    /// It is passed through to the caller as-is.
    Message(Message),
    /// A plain return value, wrapped by the agent into a function-result message
    Raw(Value),
}

pub type FunctionStream = BoxStream<'static, AgentResult<FunctionOutput>>;

type Handler = Arc<dyn Fn(Map<String, Value>) -> FunctionStream + Send + Sync>;

/// Arguments for functions that take none
#[derive(Debug, Default, Deserialize)]
pub struct NoArgs {}

/// A strongly typed callable the model may invoke by name
#[derive(Clone)]
pub struct LocalFunction {
    descriptor: FunctionDescriptor,
    handler: Handler,
}

impl std::fmt::Debug for LocalFunction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocalFunction")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

fn decode<A: DeserializeOwned>(name: &str, arguments: Map<String, Value>) -> AgentResult<A> {
    serde_json::from_value(Value::Object(arguments))
        .map_err(|e| AgentError::InvalidParameters(format!("{}: {}", name, e)))
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "function panicked".to_string()
    }
}

impl LocalFunction {
    /// Register an async function returning a single value.
    ///
    /// The model's arguments are decoded into `A` before `f` runs; a decode
    /// failure is reported as [`AgentError::InvalidParameters`].
    pub fn new<A, F, Fut, T>(
        name: &str,
        doc: &str,
        params: Vec<Param>,
        f: F,
    ) -> Result<Self, SchemaError>
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Serialize + Send + 'static,
    {
        let descriptor = generate_schema(name, doc, &params)?;
        let function_name = name.to_string();
        let handler: Handler = Arc::new(move |arguments: Map<String, Value>| -> FunctionStream {
            match decode::<A>(&function_name, arguments) {
                Ok(args) => {
                    let future = f(args);
                    stream::once(async move {
                        let value = future
                            .await
                            .map_err(|e| AgentError::ExecutionError(format!("{:#}", e)))?;
                        serde_json::to_value(value)
                            .map(FunctionOutput::Raw)
                            .map_err(|e| AgentError::Internal(e.to_string()))
                    })
                    .boxed()
                }
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            }
        });
        Ok(Self {
            descriptor,
            handler,
        })
    }

    /// Register a function that produces a sequence of outputs, such as one
    /// that delegates to a nested agent and forwards its messages.
    pub fn streaming<A, F>(
        name: &str,
        doc: &str,
        params: Vec<Param>,
        f: F,
    ) -> Result<Self, SchemaError>
    where
        A: DeserializeOwned + Send + 'static,
        F: Fn(A) -> FunctionStream + Send + Sync + 'static,
    {
        let descriptor = generate_schema(name, doc, &params)?;
        let function_name = name.to_string();
        let handler: Handler = Arc::new(move |arguments: Map<String, Value>| -> FunctionStream {
            match decode::<A>(&function_name, arguments) {
                Ok(args) => f(args),
                Err(e) => stream::once(async move { Err(e) }).boxed(),
            }
        });
        Ok(Self {
            descriptor,
            handler,
        })
    }

    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn descriptor(&self) -> &FunctionDescriptor {
        &self.descriptor
    }

    /// Invoke the function. Panics inside the function are reported as
    /// [`AgentError::ExecutionError`] items instead of unwinding into the caller.
    pub fn call(&self, arguments: Map<String, Value>) -> FunctionStream {
        let handler = self.handler.clone();
        match std::panic::catch_unwind(AssertUnwindSafe(|| handler(arguments))) {
            Ok(outputs) => AssertUnwindSafe(outputs)
                .catch_unwind()
                .map(|item| {
                    item.unwrap_or_else(|panic| {
                        Err(AgentError::ExecutionError(panic_message(panic)))
                    })
                })
                .boxed(),
            Err(panic) => {
                let error = AgentError::ExecutionError(panic_message(panic));
                stream::once(async move { Err(error) }).boxed()
            }
        }
    }
}

/// The local functions an agent exposes, keyed by name
#[derive(Default, Clone)]
pub struct FunctionRegistry {
    functions: Vec<LocalFunction>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, function: LocalFunction) -> AgentResult<()> {
        if self.get(function.name()).is_some() {
            return Err(AgentError::Configuration(format!(
                "function `{}` is already registered",
                function.name()
            )));
        }
        self.functions.push(function);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&LocalFunction> {
        self.functions.iter().find(|f| f.name() == name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.functions.iter().map(|f| f.name())
    }

    pub fn descriptors(&self) -> Vec<FunctionDescriptor> {
        self.functions.iter().map(|f| f.descriptor.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.functions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.functions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use serde_json::json;

    #[derive(Deserialize)]
    struct EchoArgs {
        x: String,
    }

    fn echo() -> LocalFunction {
        LocalFunction::new(
            "echo",
            "Echo the input.\n\nArgs:\n    x (str): The text to echo.",
            vec![Param::of::<String>("x")],
            |args: EchoArgs| async move { Ok(args.x) },
        )
        .unwrap()
    }

    fn arguments(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_call_returns_raw_value() -> AgentResult<()> {
        let outputs: Vec<_> = echo().call(arguments(json!({"x": "hello"}))).try_collect().await?;
        assert_eq!(outputs, vec![FunctionOutput::Raw(json!("hello"))]);
        Ok(())
    }

    #[tokio::test]
    async fn test_call_with_bad_arguments() {
        let mut outputs = echo().call(arguments(json!({"y": 1})));
        let error = outputs.next().await.unwrap().unwrap_err();
        assert!(matches!(error, AgentError::InvalidParameters(_)));
    }

    #[tokio::test]
    async fn test_failing_function() {
        let function = LocalFunction::new(
            "throw_error",
            "Throws an error for testing purposes.",
            vec![],
            |_: NoArgs| async move { Err::<(), _>(anyhow::anyhow!("This is a test error.")) },
        )
        .unwrap();

        let error = function.call(Map::new()).next().await.unwrap().unwrap_err();
        assert_eq!(
            error,
            AgentError::ExecutionError("This is a test error.".to_string())
        );
    }

    #[tokio::test]
    async fn test_panicking_function() {
        let function = LocalFunction::new(
            "explode",
            "Panics.",
            vec![],
            |_: NoArgs| async move {
                if true {
                    panic!("boom");
                }
                Ok(())
            },
        )
        .unwrap();

        let error = function.call(Map::new()).next().await.unwrap().unwrap_err();
        assert_eq!(error, AgentError::ExecutionError("boom".to_string()));
    }

    #[tokio::test]
    async fn test_streaming_function() -> AgentResult<()> {
        let function = LocalFunction::streaming(
            "count",
            "Count up.\n\nArgs:\n    n (int): Where to stop.",
            vec![Param::of::<u32>("n")],
            |args: Map<String, Value>| {
                let n = args.get("n").and_then(Value::as_u64).unwrap_or(0);
                stream::iter((1..=n).map(|i| {
                    Ok(FunctionOutput::Message(
                        Message::assistant().with_text(i.to_string()),
                    ))
                }))
                .boxed()
            },
        )
        .unwrap();

        let outputs: Vec<_> = function.call(arguments(json!({"n": 3}))).try_collect().await?;
        assert_eq!(outputs.len(), 3);
        assert!(matches!(&outputs[2], FunctionOutput::Message(m) if m.text() == Some("3")));
        Ok(())
    }

    #[test]
    fn test_registry_rejects_duplicates() {
        let mut registry = FunctionRegistry::new();
        registry.register(echo()).unwrap();
        assert!(matches!(
            registry.register(echo()),
            Err(AgentError::Configuration(_))
        ));
        assert_eq!(registry.len(), 1);
        assert!(registry.contains("echo"));
        assert_eq!(registry.descriptors()[0].name, "echo");
    }
}

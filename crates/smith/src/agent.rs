use std::sync::{Arc, Mutex};

use async_stream::stream;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde_json::{json, Map, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::config::{ApiConfig, AgentConfig};
use crate::errors::{AgentError, AgentResult};
use crate::functions::{FunctionOutput, FunctionRegistry, LocalFunction};
use crate::models::chat::Chat;
use crate::models::function::{FunctionDescriptor, ParameterSchema};
use crate::models::message::Message;
use crate::models::role::Role;
use crate::openapi::EndpointRegistry;
use crate::providers::base::Provider;
use crate::providers::utils::messages_to_openai_spec;
use crate::token_bucket::{lock, SharedBucket, TokenBucket};
use crate::token_counter::{context_size, TokenCounter};

/// Author label for messages produced by the engine itself rather than the model
pub const SYSTEM_AUTHOR: &str = "System";
pub const SUMMARIZER_NAME: &str = "Summarizer";

const SUMMARY_REQUEST: &str = "Please summarize our conversation so far. The goal is to be able to continue our conversation from the summary only. Do not editorialize or ask any questions.";
const SUMMARY_NOTICE: &str = "I'm sorry, this conversation is getting to long for me to remember fully. I'll be continuing from the following summary:";

const NEW_CHAT_ERROR: &str = "Error in new chat creation";
const CONTINUE_CHAT_ERROR: &str = "Error in attempted continue chat";
const FUNCTION_RESULT_ERROR: &str = "Error in sending function or method call result to model";

/// Functions every agent answers itself
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Builtin {
    Time,
    Help,
}

impl Builtin {
    const ALL: [Builtin; 2] = [Builtin::Time, Builtin::Help];

    fn name(&self) -> &'static str {
        match self {
            Builtin::Time => "time",
            Builtin::Help => "help",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|b| b.name() == name)
    }

    fn descriptor(&self) -> FunctionDescriptor {
        let description = match self {
            Builtin::Time => "Get the current date and time.",
            Builtin::Help => "Returns information about this agent, including a list of callable methods and functions.",
        };
        FunctionDescriptor::new(self.name(), description, ParameterSchema::default())
    }
}

/// Who answers a function call requested by the model
enum Target {
    Remote,
    Local(LocalFunction),
    Builtin(Builtin),
    Unknown,
}

#[derive(Clone, Copy)]
enum Entry {
    Start,
    Continue,
}

/// An agent drives one conversation with a model, running the functions the
/// model asks for and feeding their results back until the model answers.
pub struct Agent {
    name: String,
    system_message: String,
    model: String,
    provider: Arc<dyn Provider>,
    endpoints: EndpointRegistry,
    functions: FunctionRegistry,
    history: Chat,
    auto_summarize_buffer: Option<usize>,
    max_function_calls: Option<usize>,
    token_bucket: Option<SharedBucket>,
    token_counter: TokenCounter,
    schema_tokens: Option<(String, usize)>,
}

impl Agent {
    /// Create an agent with the default configuration
    pub fn new(provider: Arc<dyn Provider>) -> Self {
        Self::from_config(&AgentConfig::default(), provider)
    }

    /// Create an agent from `config`. APIs listed in the config are not
    /// fetched here; see [`Agent::register_apis`].
    pub fn from_config(config: &AgentConfig, provider: Arc<dyn Provider>) -> Self {
        let token_bucket = config.max_tokens.map(|max_tokens| {
            Arc::new(Mutex::new(TokenBucket::new(
                max_tokens,
                config.token_refill_rate,
            )))
        });
        let mut agent = Self {
            name: config.name.clone(),
            system_message: config.system_message.clone(),
            model: config.model.clone(),
            provider,
            endpoints: EndpointRegistry::new(),
            functions: FunctionRegistry::new(),
            history: Chat::new(Message::system()),
            auto_summarize_buffer: config.auto_summarize_buffer_tokens,
            max_function_calls: config.max_function_calls,
            token_bucket,
            token_counter: TokenCounter::new(),
            schema_tokens: None,
        };
        agent.history = Chat::new(agent.system_prompt());
        agent
    }

    /// Share a budget with other agents, e.g. one from a
    /// [`TokenBucketManager`](crate::token_bucket::TokenBucketManager)
    pub fn with_token_bucket(mut self, bucket: SharedBucket) -> Self {
        self.token_bucket = Some(bucket);
        self
    }

    pub fn with_token_counter(mut self, counter: TokenCounter) -> Self {
        self.token_counter = counter;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn system_message(&self) -> &str {
        &self.system_message
    }

    /// The persisted transcript
    pub fn history(&self) -> &Chat {
        &self.history
    }

    pub fn token_bucket(&self) -> Option<&SharedBucket> {
        self.token_bucket.as_ref()
    }

    pub fn endpoints(&self) -> &EndpointRegistry {
        &self.endpoints
    }

    /// Fetch and register every API in `apis`
    pub async fn register_apis(&mut self, apis: &[ApiConfig]) -> AgentResult<()> {
        for api in apis {
            self.register_api(&api.name, &api.spec_url, &api.base_url, &api.callable_endpoints)
                .await?;
        }
        Ok(())
    }

    /// Fetch an OpenAPI document and expose its endpoints as `<prefix>-<operationId>`
    pub async fn register_api(
        &mut self,
        prefix: &str,
        spec_url: &str,
        base_url: &str,
        callable_endpoints: &[String],
    ) -> AgentResult<()> {
        self.endpoints
            .register(prefix, spec_url, base_url, callable_endpoints)
            .await?;
        self.check_endpoint_names()
    }

    /// Register endpoints from an already parsed OpenAPI document
    pub fn register_api_spec(
        &mut self,
        prefix: &str,
        spec: &Value,
        base_url: &str,
        callable_endpoints: &[String],
    ) -> AgentResult<()> {
        self.endpoints
            .register_spec(prefix, spec, base_url, callable_endpoints)?;
        self.check_endpoint_names()
    }

    fn check_endpoint_names(&self) -> AgentResult<()> {
        for name in self.endpoints.function_names() {
            if self.functions.contains(&name) || Builtin::from_name(&name).is_some() {
                return Err(AgentError::Configuration(format!(
                    "endpoint `{}` collides with a local function",
                    name
                )));
            }
        }
        Ok(())
    }

    pub fn register_function(&mut self, function: LocalFunction) -> AgentResult<()> {
        let name = function.name();
        if Builtin::from_name(name).is_some() || self.endpoints.endpoint(name).is_some() {
            return Err(AgentError::Configuration(format!(
                "function `{}` is already registered",
                name
            )));
        }
        info!(function = name, "Registered local function");
        self.functions.register(function)
    }

    /// Every function offered to the model: remote endpoints, then local
    /// functions, then the built-ins
    pub fn catalog(&self) -> Vec<FunctionDescriptor> {
        let mut catalog = self.endpoints.function_schemas();
        catalog.extend(self.functions.descriptors());
        catalog.extend(Builtin::ALL.iter().map(Builtin::descriptor));
        catalog
    }

    /// Reset the transcript and start a new conversation with `text`.
    ///
    /// The returned stream yields the user message first, then every message
    /// the turn produces. Errors never escape; they arrive as messages.
    pub fn start_conversation(&mut self, text: &str, author: &str) -> BoxStream<'_, Message> {
        self.converse(Entry::Start, text.to_string(), author.to_string())
    }

    /// Add `text` to the existing transcript and continue the conversation
    pub fn continue_conversation(&mut self, text: &str, author: &str) -> BoxStream<'_, Message> {
        self.converse(Entry::Continue, text.to_string(), author.to_string())
    }

    fn converse(&mut self, entry: Entry, text: String, author: String) -> BoxStream<'_, Message> {
        Box::pin(stream! {
            let user = Message::user()
                .with_text(text)
                .with_author(&author)
                .with_recipient(&self.name);

            let mut prospective = match entry {
                Entry::Start => vec![self.system_prompt()],
                Entry::Continue => self.history.messages().to_vec(),
            };
            prospective.push(user.clone());
            if self.token_bucket.is_some() {
                let catalog = self.catalog();
                let cost = self.count_tokens(&prospective) + self.schema_token_count(&catalog).await;
                if let Some(notice) = self.spend_budget(cost, &author) {
                    yield notice;
                    return;
                }
            }

            if let Entry::Start = entry {
                self.history = Chat::new(self.system_prompt());
            }
            self.history.push(user.clone());
            yield user;

            let mut error_prefix = match entry {
                Entry::Start => NEW_CHAT_ERROR,
                Entry::Continue => CONTINUE_CHAT_ERROR,
            };
            let mut check_summary = matches!(entry, Entry::Continue);
            let mut calls = 0;

            loop {
                if check_summary && self.summarization_due().await {
                    yield self.system_notice(SUMMARY_NOTICE, &author);
                    yield self.summarize(&author).await;
                }
                check_summary = true;

                let catalog = self.catalog();
                let response = match self.provider.complete(self.history.messages(), &catalog).await {
                    Ok((response, _)) => response,
                    Err(e) => {
                        warn!(agent = %self.name, error = %e, "Model call failed");
                        yield self.error_message(format!("{}: {}", error_prefix, e), &author);
                        break;
                    }
                };
                error_prefix = FUNCTION_RESULT_ERROR;

                if !response.is_function_call {
                    let message = response
                        .with_author(&self.name)
                        .with_recipient(&author);
                    self.history.push(message.clone());
                    yield message;
                    break;
                }

                if let Some(max) = self.max_function_calls {
                    if calls >= max {
                        warn!(agent = %self.name, calls, "Function call limit reached");
                        yield self.error_message(
                            format!("Stopped after {} function calls in one turn.", calls),
                            &author,
                        );
                        break;
                    }
                }
                calls += 1;

                let func_name = response.func_name.clone().unwrap_or_default();
                let arguments = response.func_arguments.clone().unwrap_or_default();
                let call = response
                    .with_author(&self.name)
                    .with_recipient(self.function_label(&func_name));
                self.history.push(call.clone());
                yield call;

                match self.resolve(&func_name) {
                    Target::Remote => {
                        debug!(function = %func_name, kind = "remote", "Dispatching function call");
                        let response = self.endpoints.dispatch(&func_name, &arguments).await;
                        let content = if response.is_success() {
                            serde_json::to_string(&response.data).unwrap_or_default()
                        } else {
                            format!(
                                "Error in attempted API call: {}",
                                serde_json::to_string(&response).unwrap_or_default()
                            )
                        };
                        let result = self.function_result(&func_name, content);
                        self.history.push(result.clone());
                        yield result;
                    }
                    Target::Local(function) => {
                        debug!(function = %func_name, kind = "local", "Dispatching function call");
                        let mut outputs = function.call(arguments);
                        let mut answered = false;
                        let mut last_content = None;
                        while let Some(output) = outputs.next().await {
                            match output {
                                Ok(FunctionOutput::Message(message)) => {
                                    last_content = message.content.clone();
                                    yield message;
                                }
                                Ok(FunctionOutput::Raw(value)) => {
                                    let content = serde_json::to_string(&value).unwrap_or_default();
                                    let result = self.function_result(&func_name, content);
                                    self.history.push(result.clone());
                                    answered = true;
                                    yield result;
                                }
                                Err(e) => {
                                    warn!(function = %func_name, error = %e, "Local function failed");
                                    let result = self.function_result(
                                        &func_name,
                                        format!("Error in attempted method call: {}", e),
                                    );
                                    self.history.push(result.clone());
                                    answered = true;
                                    yield result;
                                    break;
                                }
                            }
                        }
                        // a delegating function answers with its last message
                        if !answered {
                            let result = self.function_result(&func_name, last_content.unwrap_or_default());
                            self.history.push(result.clone());
                            yield result;
                        }
                    }
                    Target::Builtin(builtin) => {
                        debug!(function = %func_name, kind = "builtin", "Dispatching function call");
                        let content = serde_json::to_string(&self.run_builtin(builtin)).unwrap_or_default();
                        let result = self.function_result(&func_name, content);
                        self.history.push(result.clone());
                        yield result;
                    }
                    Target::Unknown => {
                        warn!(function = %func_name, "Model requested an unknown function");
                        let result = Message::function()
                            .with_text(format!("Error: function {} not found.", func_name))
                            .with_author(SYSTEM_AUTHOR)
                            .with_recipient(&self.name);
                        self.history.push(result.clone());
                        yield result;
                    }
                }
            }
        })
    }

    fn system_prompt(&self) -> Message {
        Message::system()
            .with_text(&self.system_message)
            .with_author(SYSTEM_AUTHOR)
            .with_recipient(&self.name)
    }

    fn function_label(&self, func_name: &str) -> String {
        format!("{} ({} function)", self.name, func_name)
    }

    fn function_result(&self, func_name: &str, content: String) -> Message {
        Message::function()
            .with_text(content)
            .with_func_name(func_name)
            .with_author(self.function_label(func_name))
            .with_recipient(&self.name)
    }

    /// A terminal message reporting a problem with the turn itself
    fn error_message(&self, content: String, recipient: &str) -> Message {
        Message::assistant()
            .with_text(content)
            .with_author(SYSTEM_AUTHOR)
            .with_recipient(recipient)
    }

    fn system_notice(&self, content: &str, recipient: &str) -> Message {
        Message::assistant()
            .with_text(content)
            .with_author(&self.name)
            .with_recipient(recipient)
    }

    fn resolve(&self, func_name: &str) -> Target {
        if self.endpoints.endpoint(func_name).is_some() {
            Target::Remote
        } else if let Some(function) = self.functions.get(func_name) {
            Target::Local(function.clone())
        } else if let Some(builtin) = Builtin::from_name(func_name) {
            Target::Builtin(builtin)
        } else {
            Target::Unknown
        }
    }

    fn run_builtin(&self, builtin: Builtin) -> Value {
        match builtin {
            Builtin::Time => json!(chrono::Local::now().format("%m/%d/%y %H:%M").to_string()),
            Builtin::Help => json!({
                "callable_methods": self.catalog(),
                "system_prompt": self.system_message,
                "name": self.name,
                "chat_history_length": self.history.len(),
                "model": self.model,
            }),
        }
    }

    fn count_tokens(&self, messages: &[Message]) -> usize {
        self.token_counter
            .count_chat_tokens(&messages_to_openai_spec(messages))
    }

    /// Refill the budget and pay `cost` prompt tokens for the next request.
    /// Returns the message to show instead when the budget cannot cover it.
    fn spend_budget(&self, cost: usize, recipient: &str) -> Option<Message> {
        let bucket = self.token_bucket.as_ref()?;
        let cost = cost as f64;

        let mut bucket = lock(bucket);
        bucket.refill();
        if bucket.consume(cost) {
            return None;
        }

        warn!(agent = %self.name, cost, available = bucket.tokens(), "Token budget exhausted");
        let capacity = bucket.max_tokens().unwrap_or_default();
        let detail = if cost > capacity {
            format!(
                "This request needs about {} tokens, more than the budget of {} allows.",
                cost, capacity
            )
        } else {
            match bucket.time_until_available(cost) {
                Some(wait) => format!(
                    "This request needs about {} tokens; try again in {} seconds.",
                    cost,
                    wait.as_secs_f64().ceil()
                ),
                None => format!(
                    "This request needs about {} tokens and the budget does not refill.",
                    cost
                ),
            }
        };
        let error = AgentError::TokenBudgetExhausted(detail);
        Some(self.error_message(error.to_string(), recipient))
    }

    async fn schema_token_count(&mut self, catalog: &[FunctionDescriptor]) -> usize {
        if catalog.is_empty() {
            return 0;
        }
        let serialized = serde_json::to_string(catalog).unwrap_or_default();
        let fingerprint = format!("{:x}", Sha256::digest(serialized.as_bytes()));
        if let Some((cached, tokens)) = &self.schema_tokens {
            if *cached == fingerprint {
                return *tokens;
            }
        }

        let tokens = match self.provider.function_schema_tokens(catalog).await {
            Ok(Some(tokens)) => tokens,
            Ok(None) => self.token_counter.count_function_tokens(catalog),
            Err(e) => {
                warn!(error = %e, "Could not measure function schema tokens, estimating");
                return self.token_counter.count_function_tokens(catalog);
            }
        };
        self.schema_tokens = Some((fingerprint, tokens));
        tokens
    }

    /// Whether the history, plus the catalog, has grown past the summarization budget.
    /// Only checked while the model owes a response.
    async fn summarization_due(&mut self) -> bool {
        let Some(buffer) = self.auto_summarize_buffer else {
            return false;
        };
        let awaiting = self.history.last().is_some_and(Message::awaits_response);
        if self.history.len() <= 1 || !awaiting {
            return false;
        }

        let catalog = self.catalog();
        let usage = self.count_tokens(self.history.messages()) + self.schema_token_count(&catalog).await;
        let budget = context_size(&self.model).saturating_sub(buffer);
        if usage > budget {
            info!(agent = %self.name, tokens = usage, budget, "Summarizing conversation");
            return true;
        }
        false
    }

    /// Replace the history with a summary folded into the latest message.
    ///
    /// The summary comes from a throwaway agent sharing this agent's model and
    /// history. On failure the history is left as it was.
    async fn summarize(&mut self, author: &str) -> Message {
        let Some(trigger) = self.history.last().cloned() else {
            return self.error_message("Error in summarizing conversation: empty history".to_string(), author);
        };

        let mut summarizer = Agent {
            name: SUMMARIZER_NAME.to_string(),
            system_message: self.system_message.clone(),
            model: self.model.clone(),
            provider: self.provider.clone(),
            endpoints: EndpointRegistry::new(),
            functions: FunctionRegistry::new(),
            history: self.history.clone(),
            auto_summarize_buffer: None,
            max_function_calls: self.max_function_calls,
            token_bucket: None,
            token_counter: self.token_counter.clone(),
            schema_tokens: None,
        };

        let mut summary = None;
        {
            let mut replies = summarizer.continue_conversation(SUMMARY_REQUEST, author);
            while let Some(message) = replies.next().await {
                if message.role == Role::Assistant && !message.is_function_call {
                    summary = Some(message);
                    break;
                }
            }
        }

        let summary = match summary {
            Some(message) if message.author.as_deref() != Some(SYSTEM_AUTHOR) => message.content,
            Some(message) => {
                warn!(error = ?message.content, "Summarization failed");
                None
            }
            None => None,
        };
        let Some(summary) = summary.filter(|s| !s.is_empty()) else {
            return self.error_message(
                "Error in summarizing conversation: no summary was produced".to_string(),
                author,
            );
        };

        let original = trigger.content.clone().unwrap_or_default();
        self.history
            .splice([trigger.with_text(format!("{}\n\n{}", summary, original))]);

        self.system_notice(
            &format!(
                "Previous conversation summary: {}\n\nThanks for your patience. If I've missed anything important, please mention it before we continue.",
                summary
            ),
            author,
        )
    }
}

/// Decode arguments the way they arrive on the wire, for embedders that hold
/// raw JSON text
pub fn parse_arguments(raw: &str) -> AgentResult<Map<String, Value>> {
    match serde_json::from_str(raw) {
        Ok(Value::Object(arguments)) => Ok(arguments),
        Ok(other) => Err(AgentError::InvalidParameters(format!(
            "expected an object, got {}",
            other
        ))),
        Err(e) => Err(AgentError::InvalidParameters(e.to_string())),
    }
}

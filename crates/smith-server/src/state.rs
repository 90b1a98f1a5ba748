use std::collections::HashMap;
use std::sync::Arc;

use smith::agent::Agent;
use smith::config::AgentConfig;
use smith::errors::AgentResult;
use smith::providers::base::Provider;
use smith::token_bucket::TokenBucketManager;
use tokio::sync::Mutex;

/// One conversation; the lock is held for the whole of a turn
pub type SessionHandle = Arc<Mutex<Agent>>;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub provider: Arc<dyn Provider>,
    pub agent_config: AgentConfig,
    pub sessions: Arc<Mutex<HashMap<String, SessionHandle>>>,
    pub budgets: Arc<TokenBucketManager>,
}

impl AppState {
    pub fn new(provider: Arc<dyn Provider>, agent_config: AgentConfig) -> Self {
        Self {
            provider,
            agent_config,
            sessions: Arc::new(Mutex::new(HashMap::new())),
            budgets: Arc::new(TokenBucketManager::new()),
        }
    }

    pub async fn session(&self, id: &str) -> Option<SessionHandle> {
        self.sessions.lock().await.get(id).cloned()
    }

    /// Build an agent for a new session, fetching its API documents
    pub async fn create_session(&self, id: &str) -> AgentResult<SessionHandle> {
        let mut agent = Agent::from_config(&self.agent_config, self.provider.clone());
        if let Some(max_tokens) = self.agent_config.max_tokens {
            let bucket =
                self.budgets
                    .create_bucket(id, max_tokens, self.agent_config.token_refill_rate);
            agent = agent.with_token_bucket(bucket);
        }
        agent.register_apis(&self.agent_config.apis).await?;

        let handle = Arc::new(Mutex::new(agent));
        self.sessions
            .lock()
            .await
            .insert(id.to_string(), handle.clone());
        tracing::info!(session = id, "Created session");
        Ok(handle)
    }

    /// Drop a session and its budget. A turn still streaming keeps its agent until it ends.
    pub async fn remove_session(&self, id: &str) -> bool {
        let removed = self.sessions.lock().await.remove(id).is_some();
        if removed {
            self.budgets.remove_bucket(id);
            tracing::info!(session = id, "Removed session");
        }
        removed
    }
}

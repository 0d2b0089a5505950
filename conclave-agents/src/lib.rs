//! Conclave Agents - Registry and Message Dispatch
//!
//! The orchestration core of the agent workbench:
//! - Agent identity: a name binding a gateway/model/system-prompt to one
//!   conversation
//! - The registry owning the ordered agent collection and the current agent
//! - Asynchronous message dispatch with an enforced Idle/Working lifecycle
//!   and an exactly-once completion callback
//! - The `Services` context wiring registry, dispatcher, goal tracker, and
//!   trace collector together

use conclave_core::{
    AgentStatus, ChatMessage, ConclaveResult, ConfigError, DispatchError, GatewayKind, TraceSink,
};
use conclave_events::TraceCollector;
use conclave_goals::GoalTracker;
use conclave_llm::{Broker, Conversation, GatewayResolver};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use tokio::task::JoinHandle;

// ============================================================================
// AGENT
// ============================================================================

/// A named agent bound to one broker and (at most) one conversation.
///
/// Name, gateway, model, and system prompt are fixed at construction. Status
/// and the conversation slot are interior-mutable because the dispatcher
/// flips them from its worker task.
pub struct Agent {
    name: String,
    system_prompt: String,
    broker: Broker,
    status: Mutex<WorkSlot>,
    conversation: RwLock<Option<Arc<Conversation>>>,
}

// Status plus the epoch of the send that acquired it. Epochs tie every
// status release to the send that acquired Working, so a stale dispatch
// handle cannot release a later send's status.
#[derive(Debug, Clone, Copy)]
struct WorkSlot {
    status: AgentStatus,
    epoch: u64,
}

impl Agent {
    /// Create an agent with no live conversation. The registry seeds a
    /// conversation on `create`; a directly constructed agent gets one
    /// lazily from `ensure_conversation`.
    pub fn new(name: impl Into<String>, system_prompt: impl Into<String>, broker: Broker) -> Self {
        Self {
            name: name.into(),
            system_prompt: system_prompt.into(),
            broker,
            status: Mutex::new(WorkSlot {
                status: AgentStatus::Idle,
                epoch: 0,
            }),
            conversation: RwLock::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn gateway(&self) -> GatewayKind {
        self.broker.gateway_kind()
    }

    pub fn model(&self) -> &str {
        self.broker.model()
    }

    pub fn system_prompt(&self) -> &str {
        &self.system_prompt
    }

    /// Current status. `Working` is held for exactly the duration of one
    /// in-flight send.
    pub fn status(&self) -> AgentStatus {
        lock(&self.status).status
    }

    /// The live conversation, if one exists.
    pub fn conversation(&self) -> Option<Arc<Conversation>> {
        self.conversation
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Get the conversation, lazily creating one from the stored broker and
    /// system prompt if absent. An agent restored without a live
    /// conversation can resume through this.
    pub fn ensure_conversation(&self) -> Arc<Conversation> {
        if let Some(conversation) = self.conversation() {
            return conversation;
        }

        let mut slot = self
            .conversation
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(conversation) = slot.as_ref() {
            return conversation.clone();
        }
        let conversation = Arc::new(Conversation::new(
            self.broker.clone(),
            self.system_prompt.clone(),
        ));
        *slot = Some(conversation.clone());
        conversation
    }

    /// Acquire the Working status. Returns the epoch of the new send, or
    /// None if a send is already in flight, which is how double-sends are
    /// rejected.
    fn begin_work(&self) -> Option<u64> {
        let mut slot = lock(&self.status);
        if slot.status == AgentStatus::Working {
            return None;
        }
        slot.status = AgentStatus::Working;
        slot.epoch += 1;
        Some(slot.epoch)
    }

    /// Release the Working status held by the send with this epoch. A stale
    /// epoch from an earlier, already finished send leaves the status of
    /// the current send untouched.
    fn finish_work(&self, epoch: u64) {
        let mut slot = lock(&self.status);
        if slot.status == AgentStatus::Working && slot.epoch == epoch {
            slot.status = AgentStatus::Idle;
        }
    }
}

impl std::fmt::Debug for Agent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Agent")
            .field("name", &self.name)
            .field("gateway", &self.gateway())
            .field("model", &self.model())
            .field("status", &self.status())
            .field("conversation", &self.conversation().is_some())
            .finish()
    }
}

// ============================================================================
// AGENT REGISTRY
// ============================================================================

struct RegistryInner {
    agents: Vec<Arc<Agent>>,
    current: Option<usize>,
}

/// Ordered agent collection plus the notion of "current agent".
///
/// No delete operation exists, so indices are stable for the process
/// lifetime and "current" can be a plain index. The current agent is always
/// either unset or a registered agent.
pub struct AgentRegistry {
    resolver: GatewayResolver,
    tracer: Arc<dyn TraceSink>,
    inner: Mutex<RegistryInner>,
}

impl AgentRegistry {
    /// Create an empty registry.
    ///
    /// # Arguments
    /// * `resolver` - Resolves gateway kinds to connections
    /// * `tracer` - Sink handed to every broker this registry builds
    pub fn new(resolver: GatewayResolver, tracer: Arc<dyn TraceSink>) -> Self {
        Self {
            resolver,
            tracer,
            inner: Mutex::new(RegistryInner {
                agents: Vec::new(),
                current: None,
            }),
        }
    }

    /// Create a new agent and register it.
    ///
    /// Resolves a gateway connection, builds a broker bound to it and the
    /// model, and seeds a conversation with the system prompt. The first
    /// agent created becomes the current agent.
    ///
    /// # Returns
    /// * `Ok((Arc<Agent>, usize))` - The agent and its insertion index
    /// * `Err(ConclaveError::Config)` - Missing credentials or unsupported
    ///   gateway kind
    pub fn create(
        &self,
        name: impl Into<String>,
        kind: GatewayKind,
        model: impl Into<String>,
        system_prompt: impl Into<String>,
    ) -> ConclaveResult<(Arc<Agent>, usize)> {
        let gateway = self.resolver.resolve(kind)?;
        let broker = Broker::new(gateway, model.into(), self.tracer.clone());
        let agent = Arc::new(Agent::new(name, system_prompt, broker));
        agent.ensure_conversation();

        let mut inner = lock(&self.inner);
        inner.agents.push(agent.clone());
        let index = inner.agents.len() - 1;
        if inner.agents.len() == 1 {
            inner.current = Some(0);
        }
        Ok((agent, index))
    }

    /// Register a pre-built agent without touching its conversation or the
    /// current pointer.
    pub fn insert(&self, agent: Agent) -> (Arc<Agent>, usize) {
        let agent = Arc::new(agent);
        let mut inner = lock(&self.inner);
        inner.agents.push(agent.clone());
        (agent, inner.agents.len() - 1)
    }

    /// Get an agent by index. Out-of-range is absence, never an error.
    pub fn get(&self, index: usize) -> Option<Arc<Agent>> {
        lock(&self.inner).agents.get(index).cloned()
    }

    /// Ordered snapshot of all agents.
    pub fn agents(&self) -> Vec<Arc<Agent>> {
        lock(&self.inner).agents.clone()
    }

    /// Number of registered agents.
    pub fn len(&self) -> usize {
        lock(&self.inner).agents.len()
    }

    /// Whether no agent is registered yet.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Mark an agent as current, ensuring it has a live conversation so it
    /// can resume immediately.
    ///
    /// # Returns
    /// `false` if the agent is not registered here; the current pointer is
    /// left untouched in that case.
    pub fn set_current(&self, agent: &Arc<Agent>) -> bool {
        let mut inner = lock(&self.inner);
        match inner
            .agents
            .iter()
            .position(|candidate| Arc::ptr_eq(candidate, agent))
        {
            Some(index) => {
                agent.ensure_conversation();
                inner.current = Some(index);
                true
            }
            None => false,
        }
    }

    /// The current agent, or None if no agent is selected.
    pub fn current(&self) -> Option<Arc<Agent>> {
        let inner = lock(&self.inner);
        inner
            .current
            .and_then(|index| inner.agents.get(index))
            .cloned()
    }

    /// List available models for a gateway kind.
    ///
    /// All failures (missing credentials, unreachable server, bad payloads)
    /// are swallowed into an empty list: an empty model picker is a valid
    /// UI state, a crashed one is not.
    pub async fn available_models(&self, kind: GatewayKind) -> Vec<String> {
        match self.resolver.list_models(kind).await {
            Ok(models) => models,
            Err(err) => {
                tracing::warn!(gateway = %kind, error = %err, "model listing failed");
                Vec::new()
            }
        }
    }

    /// The resolver this registry creates connections through.
    pub fn resolver(&self) -> &GatewayResolver {
        &self.resolver
    }
}

impl std::fmt::Debug for AgentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let inner = lock(&self.inner);
        f.debug_struct("AgentRegistry")
            .field("agents", &inner.agents.len())
            .field("current", &inner.current)
            .finish()
    }
}

// ============================================================================
// MESSAGE DISPATCHER
// ============================================================================

/// Sends messages to agents on detached tasks and reports every outcome -
/// success or failure - through a completion callback, exactly once per
/// send. `send` itself never fails and never blocks on the response.
#[derive(Debug, Default)]
pub struct MessageDispatcher;

impl MessageDispatcher {
    pub fn new() -> Self {
        Self
    }

    /// Send `text` to an agent's conversation asynchronously.
    ///
    /// Rejections are reported synchronously through the callback:
    /// - No live conversation: `ConfigError::ConversationMissing`
    /// - A send already in flight: `DispatchError::AgentBusy`
    ///
    /// Otherwise the agent transitions to Working, a detached task submits
    /// the message, and the agent is back to Idle before the callback runs -
    /// so the callback always observes the final status, on the error path
    /// too.
    ///
    /// Must be called within a tokio runtime.
    pub fn send<F>(&self, agent: &Arc<Agent>, text: impl Into<String>, on_complete: F) -> DispatchHandle
    where
        F: FnOnce(Arc<Agent>, ConclaveResult<String>) + Send + 'static,
    {
        let Some(conversation) = agent.conversation() else {
            on_complete(
                agent.clone(),
                Err(ConfigError::ConversationMissing {
                    agent: agent.name().to_string(),
                }
                .into()),
            );
            return DispatchHandle::completed();
        };

        let Some(epoch) = agent.begin_work() else {
            on_complete(
                agent.clone(),
                Err(DispatchError::AgentBusy {
                    agent: agent.name().to_string(),
                }
                .into()),
            );
            return DispatchHandle::completed();
        };

        let agent = agent.clone();
        let text = text.into();
        let worker = agent.clone();
        let task = tokio::spawn(async move {
            let result = conversation.send(&text).await;
            worker.finish_work(epoch);
            on_complete(worker, result);
        });
        DispatchHandle::in_flight(task, agent, epoch)
    }

    /// Chat history for an agent: every message except the system prompt,
    /// in order. Empty for an agent with no live conversation.
    pub fn history(&self, agent: &Agent) -> Vec<ChatMessage> {
        agent
            .conversation()
            .map(|conversation| conversation.history())
            .unwrap_or_default()
    }
}

/// Handle to one dispatched send. Dropping it detaches the work; the
/// completion callback fires regardless.
pub struct DispatchHandle {
    task: Option<JoinHandle<()>>,
    agent: Option<Arc<Agent>>,
    epoch: u64,
}

impl DispatchHandle {
    /// Handle for a send that completed synchronously (rejection paths).
    fn completed() -> Self {
        Self {
            task: None,
            agent: None,
            epoch: 0,
        }
    }

    fn in_flight(task: JoinHandle<()>, agent: Arc<Agent>, epoch: u64) -> Self {
        Self {
            task: Some(task),
            agent: Some(agent),
            epoch,
        }
    }

    /// Whether the dispatched work has finished (or never started).
    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    /// Best-effort cancellation. The completion callback is forfeited and
    /// the agent's status resets to Idle if this send still holds it.
    /// Aborting a handle whose send already finished is a no-op: it never
    /// releases the Working status of a later send.
    pub fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
        if let Some(agent) = &self.agent {
            agent.finish_work(self.epoch);
        }
    }

    /// Wait for the dispatched work (and its callback) to finish.
    pub async fn wait(self) {
        if let Some(task) = self.task {
            let _ = task.await;
        }
    }
}

impl std::fmt::Debug for DispatchHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchHandle")
            .field("finished", &self.is_finished())
            .finish()
    }
}

// ============================================================================
// SERVICES CONTEXT
// ============================================================================

/// Explicitly constructed service wiring: one trace collector, one registry
/// recording into it, one dispatcher, one goal tracker. Built once at
/// process start and passed by reference to whichever collaborator needs
/// it - there is no global state to patch, and tests substitute gateways
/// through the resolver constructor parameter.
pub struct Services {
    tracer: Arc<TraceCollector>,
    agents: AgentRegistry,
    dispatcher: MessageDispatcher,
    goals: GoalTracker,
}

impl Services {
    /// Build services with gateway configuration read from the environment.
    pub fn new() -> Self {
        Self::with_resolver(GatewayResolver::from_env())
    }

    /// Build services around an explicit resolver.
    pub fn with_resolver(resolver: GatewayResolver) -> Self {
        let tracer = Arc::new(TraceCollector::new());
        Self {
            agents: AgentRegistry::new(resolver, tracer.clone()),
            dispatcher: MessageDispatcher::new(),
            goals: GoalTracker::new(),
            tracer,
        }
    }

    pub fn agents(&self) -> &AgentRegistry {
        &self.agents
    }

    pub fn dispatcher(&self) -> &MessageDispatcher {
        &self.dispatcher
    }

    pub fn goals(&self) -> &GoalTracker {
        &self.goals
    }

    /// The trace collector. Shared as an Arc so UI collaborators can clone
    /// it into observers.
    pub fn tracer(&self) -> &Arc<TraceCollector> {
        &self.tracer
    }
}

impl std::fmt::Debug for Services {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Services")
            .field("agents", &self.agents)
            .field("goals", &self.goals)
            .field("trace_events", &self.tracer.len())
            .finish()
    }
}

// A poisoned collection is still structurally valid; recover the guard.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use conclave_core::{ChatRole, ConclaveError, NullTraceSink, ProviderError, TraceEvent};
    use conclave_llm::MockChatGateway;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::oneshot;

    /// Services wired to a mock Ollama gateway; no environment reads.
    fn mock_services() -> (Services, Arc<MockChatGateway>) {
        let resolver = GatewayResolver::new("https://api.openai.com/v1", None, "http://localhost:11434");
        let mock = Arc::new(
            MockChatGateway::new(GatewayKind::Ollama)
                .with_models(vec!["llama3".to_string(), "mistral".to_string()]),
        );
        resolver.register(GatewayKind::Ollama, mock.clone());
        (Services::with_resolver(resolver), mock)
    }

    fn detached_agent(name: &str) -> Agent {
        let broker = Broker::new(
            Arc::new(MockChatGateway::new(GatewayKind::Ollama)),
            "llama3",
            Arc::new(NullTraceSink),
        );
        Agent::new(name, "sys", broker)
    }

    #[tokio::test]
    async fn test_create_agent_seeds_conversation_and_starts_idle() {
        let (services, _) = mock_services();
        let (agent, index) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "You plan.")
            .unwrap();

        assert_eq!(index, 0);
        assert_eq!(agent.name(), "planner");
        assert_eq!(agent.gateway(), GatewayKind::Ollama);
        assert_eq!(agent.model(), "llama3");
        assert_eq!(agent.status(), AgentStatus::Idle);

        let conversation = agent.conversation().expect("conversation seeded");
        let messages = conversation.messages();
        assert_eq!(messages[0].role, ChatRole::System);
        assert_eq!(messages[0].content, "You plan.");
        assert!(services.dispatcher().history(&agent).is_empty());
    }

    #[tokio::test]
    async fn test_create_without_credentials_is_config_error() {
        let (services, _) = mock_services();
        // No OpenAI key configured and no override registered for it.
        let err = services
            .agents()
            .create("cloud", GatewayKind::OpenAi, "gpt-4o", "sys")
            .unwrap_err();
        assert!(matches!(err, ConclaveError::Config(_)));
        assert!(services.agents().is_empty());
    }

    #[tokio::test]
    async fn test_first_agent_becomes_current() {
        let (services, _) = mock_services();
        let (first, _) = services
            .agents()
            .create("one", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();
        let current = services.agents().current().expect("current set");
        assert!(Arc::ptr_eq(&current, &first));

        services
            .agents()
            .create("two", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();
        let current = services.agents().current().expect("current still set");
        assert!(Arc::ptr_eq(&current, &first));
    }

    #[tokio::test]
    async fn test_get_out_of_range_is_absent() {
        let (services, _) = mock_services();
        assert!(services.agents().get(0).is_none());

        services
            .agents()
            .create("one", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();
        assert!(services.agents().get(0).is_some());
        assert!(services.agents().get(1).is_none());
    }

    #[tokio::test]
    async fn test_agents_snapshot_is_defensive() {
        let (services, _) = mock_services();
        services
            .agents()
            .create("one", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let mut snapshot = services.agents().agents();
        snapshot.clear();
        assert_eq!(services.agents().len(), 1);
    }

    #[tokio::test]
    async fn test_set_current_lazily_creates_conversation() {
        let (services, _) = mock_services();
        let (agent, _) = services.agents().insert(detached_agent("restored"));
        assert!(agent.conversation().is_none());
        assert!(services.agents().current().is_none());

        assert!(services.agents().set_current(&agent));
        let current = services.agents().current().expect("current set");
        assert!(Arc::ptr_eq(&current, &agent));

        let conversation = agent.conversation().expect("lazily created");
        assert_eq!(conversation.messages()[0], ChatMessage::system("sys"));
    }

    #[tokio::test]
    async fn test_set_current_rejects_unregistered_agent() {
        let (services, _) = mock_services();
        services
            .agents()
            .create("one", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let stranger = Arc::new(detached_agent("stranger"));
        assert!(!services.agents().set_current(&stranger));
        // Current pointer untouched.
        assert_eq!(services.agents().current().unwrap().name(), "one");
    }

    #[tokio::test]
    async fn test_available_models_from_gateway() {
        let (services, _) = mock_services();
        let models = services.agents().available_models(GatewayKind::Ollama).await;
        assert_eq!(models, vec!["llama3".to_string(), "mistral".to_string()]);
    }

    #[tokio::test]
    async fn test_available_models_swallows_failures() {
        let (services, _) = mock_services();
        // Missing OpenAI key resolves to an empty list, not an error.
        let models = services.agents().available_models(GatewayKind::OpenAi).await;
        assert!(models.is_empty());
    }

    #[tokio::test]
    async fn test_send_without_conversation_fails_synchronously() {
        let (services, _) = mock_services();
        let (agent, _) = services.agents().insert(detached_agent("restored"));

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_callback = calls.clone();
        let handle = services.dispatcher().send(&agent, "hi", move |agent, result| {
            calls_in_callback.fetch_add(1, Ordering::SeqCst);
            assert_eq!(agent.status(), AgentStatus::Idle);
            match result {
                Err(ConclaveError::Config(ConfigError::ConversationMissing { .. })) => {}
                other => panic!("expected ConversationMissing, got {:?}", other),
            }
        });

        // Rejection is synchronous: the callback already ran.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(handle.is_finished());
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_send_completes_asynchronously_with_response() {
        let resolver = GatewayResolver::new("https://api.openai.com/v1", None, "http://localhost:11434");
        resolver.register(
            GatewayKind::Ollama,
            Arc::new(MockChatGateway::new(GatewayKind::Ollama).with_delay(Duration::from_millis(20))),
        );
        let services = Services::with_resolver(resolver);
        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let (tx, rx) = oneshot::channel();
        let handle = services.dispatcher().send(&agent, "hi", move |agent, result| {
            let _ = tx.send((agent.status(), result));
        });

        // Non-blocking: the response has not arrived when send returns.
        assert_eq!(agent.status(), AgentStatus::Working);
        assert!(!handle.is_finished());

        let (status_in_callback, result) = rx.await.unwrap();
        assert_eq!(status_in_callback, AgentStatus::Idle);
        assert_eq!(result.unwrap(), "echo: hi");

        handle.wait().await;
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_send_failure_reported_through_callback_only() {
        let (services, mock) = mock_services();
        mock.push_reply(Err(ProviderError::RequestFailed {
            provider: "ollama".to_string(),
            status: 500,
            message: "model exploded".to_string(),
        }
        .into()));

        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let (tx, rx) = oneshot::channel();
        services
            .dispatcher()
            .send(&agent, "hi", move |agent, result| {
                let _ = tx.send((agent.status(), result));
            })
            .wait()
            .await;

        let (status_in_callback, result) = rx.await.unwrap();
        // Status released on the error path too.
        assert_eq!(status_in_callback, AgentStatus::Idle);
        assert!(matches!(result, Err(ConclaveError::Provider(_))));
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_double_send_is_rejected_busy() {
        let resolver = GatewayResolver::new("https://api.openai.com/v1", None, "http://localhost:11434");
        resolver.register(
            GatewayKind::Ollama,
            Arc::new(MockChatGateway::new(GatewayKind::Ollama).with_delay(Duration::from_millis(100))),
        );
        let services = Services::with_resolver(resolver);
        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let (tx_first, rx_first) = oneshot::channel();
        let first = services.dispatcher().send(&agent, "one", move |_, result| {
            let _ = tx_first.send(result);
        });

        let (tx_second, mut rx_second) = oneshot::channel();
        let second = services.dispatcher().send(&agent, "two", move |_, result| {
            let _ = tx_second.send(result);
        });

        // The second send was rejected synchronously without disturbing the
        // first one.
        assert!(second.is_finished());
        match rx_second.try_recv().unwrap() {
            Err(ConclaveError::Dispatch(DispatchError::AgentBusy { agent })) => {
                assert_eq!(agent, "planner");
            }
            other => panic!("expected AgentBusy, got {:?}", other),
        }

        assert_eq!(rx_first.await.unwrap().unwrap(), "echo: one");
        first.wait().await;
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_callback_fires_exactly_once() {
        let (services, _) = mock_services();
        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let calls_in_callback = calls.clone();
        services
            .dispatcher()
            .send(&agent, "hi", move |_, _| {
                calls_in_callback.fetch_add(1, Ordering::SeqCst);
            })
            .wait()
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_history_excludes_system_prompt() {
        let (services, _) = mock_services();
        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        services
            .dispatcher()
            .send(&agent, "hi", |_, _| {})
            .wait()
            .await;

        let history = services.dispatcher().history(&agent);
        assert_eq!(
            history,
            vec![ChatMessage::user("hi"), ChatMessage::assistant("echo: hi")]
        );
    }

    #[tokio::test]
    async fn test_send_records_trace_events() {
        let (services, _) = mock_services();
        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        services
            .dispatcher()
            .send(&agent, "hi", |_, _| {})
            .wait()
            .await;

        let events = services.tracer().events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], TraceEvent::LlmCall { .. }));
        assert!(matches!(events[1], TraceEvent::LlmResponse { .. }));
    }

    #[tokio::test]
    async fn test_abort_forfeits_callback_and_resets_status() {
        let resolver = GatewayResolver::new("https://api.openai.com/v1", None, "http://localhost:11434");
        resolver.register(
            GatewayKind::Ollama,
            Arc::new(MockChatGateway::new(GatewayKind::Ollama).with_delay(Duration::from_secs(30))),
        );
        let services = Services::with_resolver(resolver);
        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let (tx, mut rx) = oneshot::channel();
        let handle = services.dispatcher().send(&agent, "hi", move |_, result| {
            let _ = tx.send(result);
        });

        handle.abort();
        assert_eq!(agent.status(), AgentStatus::Idle);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_stale_abort_does_not_release_later_send() {
        let resolver = GatewayResolver::new("https://api.openai.com/v1", None, "http://localhost:11434");
        resolver.register(
            GatewayKind::Ollama,
            Arc::new(MockChatGateway::new(GatewayKind::Ollama).with_delay(Duration::from_millis(50))),
        );
        let services = Services::with_resolver(resolver);
        let (agent, _) = services
            .agents()
            .create("planner", GatewayKind::Ollama, "llama3", "sys")
            .unwrap();

        let (tx_first, rx_first) = oneshot::channel();
        let stale = services.dispatcher().send(&agent, "one", move |_, _| {
            let _ = tx_first.send(());
        });
        rx_first.await.unwrap();
        assert_eq!(agent.status(), AgentStatus::Idle);

        let (tx_second, rx_second) = oneshot::channel();
        let live = services.dispatcher().send(&agent, "two", move |_, result| {
            let _ = tx_second.send(result);
        });
        assert_eq!(agent.status(), AgentStatus::Working);

        // Aborting the finished first send must not release the second
        // send's Working status.
        stale.abort();
        assert_eq!(agent.status(), AgentStatus::Working);

        // The lifecycle still rejects a new send while the second runs.
        let (tx_third, mut rx_third) = oneshot::channel();
        services.dispatcher().send(&agent, "three", move |_, result| {
            let _ = tx_third.send(result);
        });
        assert!(matches!(
            rx_third.try_recv().unwrap(),
            Err(ConclaveError::Dispatch(DispatchError::AgentBusy { .. }))
        ));

        assert_eq!(rx_second.await.unwrap().unwrap(), "echo: two");
        live.wait().await;
        assert_eq!(agent.status(), AgentStatus::Idle);
    }

    #[tokio::test]
    async fn test_conversation_survives_poisoned_slot() {
        let agent = Arc::new(detached_agent("sturdy"));
        agent.ensure_conversation();

        let poisoner = agent.clone();
        let _ = std::thread::spawn(move || {
            let _guard = poisoner.conversation.write().unwrap();
            panic!("poison the slot");
        })
        .join();

        assert!(agent.conversation().is_some());
    }
}

// ============================================================================
// PROPERTY-BASED TESTS
// ============================================================================

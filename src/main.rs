use clap::Parser;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use switchboard::adapters::{build_schema, AdmissionControl, AppState};
use switchboard::agent::{build_registry, AgentServices};
use switchboard::cli::Cli;
use switchboard::config::Settings;
use switchboard::faithfulness::{FaithfulnessScorer, LinearFaithfulnessScorer, NullScorer};
use switchboard::guardrails::Guardrails;
use switchboard::hitl::{create_handler, PendingEscalations};
use switchboard::llm::create_backend;
use switchboard::ops::CircuitBreaker;
use switchboard::registry::AgentRegistry;
use switchboard::retrieval::create_retriever;
use switchboard::router::SessionRouter;
use switchboard::store::{ConversationStore, InMemoryConversationStore};
use switchboard::supervisor::{InMemoryCheckpointer, Supervisor};
use switchboard::tools::mcp::{fetch_external_tools, McpToolClient};
use switchboard::tools::support::support_tools;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt::init();

    let settings = Settings::new_with_cli(&cli)?;
    let host = settings.server.host.clone();
    let port = settings.server.port;

    info!("Starting Switchboard dispatcher on {}:{}", host, port);

    // Services first, tool lists second, agents last
    let backend = create_backend(&settings.llm)?;
    let retriever = create_retriever(&settings.retrieval)?;
    let guardrails = Arc::new(Guardrails::new(settings.guardrails.clone()));

    // The external tool server is a required collaborator: enumeration
    // failure after retries aborts startup.
    let mcp_client = Arc::new(McpToolClient::new(&settings.mcp)?);
    let external_tools = fetch_external_tools(mcp_client).await?;

    let services = AgentServices {
        backend: backend.clone(),
        retriever,
        guardrails,
    };
    let registry: Arc<AgentRegistry> =
        Arc::new(build_registry(&settings, services, external_tools));
    let agent_ids = registry.agent_ids();
    info!(agents = ?agent_ids, "agents initialized");

    let circuit_breaker = settings.agent_ops.enabled.then(|| {
        Arc::new(CircuitBreaker::new(
            settings.agent_ops.circuit_breaker_failure_threshold,
            Duration::from_secs(settings.agent_ops.circuit_breaker_cooldown_seconds),
        ))
    });

    let pending = PendingEscalations::default();
    let ticket_tool = support_tools()
        .into_iter()
        .find(|t| t.name() == "create_support_ticket")
        .expect("built-in ticket tool");
    let hitl = create_handler(&settings.hitl, pending.clone(), ticket_tool);

    let scorer: Arc<dyn FaithfulnessScorer> = if settings.faithfulness.use_model {
        Arc::new(LinearFaithfulnessScorer::new(
            settings.faithfulness.model_path.as_deref(),
        ))
    } else {
        Arc::new(NullScorer)
    };

    let checkpointer = Arc::new(InMemoryCheckpointer::new(Duration::from_secs(
        settings.supervisor.session_ttl_seconds,
    )));

    let supervisor = Arc::new(Supervisor::new(
        registry,
        checkpointer,
        circuit_breaker.clone(),
        hitl,
        scorer,
        backend,
        &settings,
    ));

    let conversation_store: Arc<dyn ConversationStore> =
        Arc::new(InMemoryConversationStore::new());

    let state = AppState {
        router: Arc::new(SessionRouter::new(&settings.intent)),
        supervisor,
        conversation_store: conversation_store.clone(),
        circuit_breaker,
        agent_ids,
        pending,
        admission: Arc::new(AdmissionControl::new(&settings.admission)),
        graphql_schema: build_schema(conversation_store),
        mcp_available: true,
        request_deadline: Duration::from_secs(settings.server.request_deadline_seconds),
    };

    let app = switchboard::create_app(state, settings.rate_limit.as_ref());

    let addr: SocketAddr = format!("{}:{}", host, port).parse()?;
    info!("Listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

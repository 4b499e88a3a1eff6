//! `sentient run`: drive a session to a terminal status.

use sentient_agent::{Orchestrator, RunOutcome, SessionTarget};
use sentient_config::AppConfig;
use sentient_core::error::ProviderError;
use sentient_core::event::EventBus;
use sentient_core::session::SessionId;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::progress;

/// Returns whether the session completed.
pub async fn run(
    config: &AppConfig,
    goal: Option<String>,
    session: Option<String>,
    continue_latest: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let target = target_from_args(goal, session, continue_latest)?;

    if !config.has_api_key() && config.default_provider != "ollama" {
        eprintln!();
        eprintln!("  No API key configured.");
        eprintln!("  Export OPENROUTER_API_KEY (or SENTIENT_API_KEY / OPENAI_API_KEY),");
        eprintln!("  or add api_key to {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found".into());
    }

    let router = sentient_providers::build_from_config(config);
    let provider = router
        .default()
        .ok_or_else(|| ProviderError::NotConfigured(config.default_provider.clone()))?;
    let model = sentient_providers::resolve_model(config);

    let store = super::open_store(config).await?;
    let tools = Arc::new(sentient_tools::default_registry(&config.tools));
    let events = Arc::new(EventBus::default());

    let cancel = CancellationToken::new();
    let on_interrupt = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing the current step");
            on_interrupt.cancel();
        }
    });

    let printer = tokio::spawn(progress::print_events(events.subscribe()));

    info!(provider = provider.name(), %model, "Starting run");
    let orchestrator = Orchestrator::new(provider, model, store, tools, events)
        .with_config(config.agent.clone())
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_cancellation(cancel);

    let outcome = orchestrator.run(target).await;
    // Dropping the orchestrator closes the event bus, which ends the printer.
    drop(orchestrator);
    let _ = printer.await;

    let outcome = outcome?;
    print_outcome(&outcome);
    Ok(outcome.is_success())
}

fn target_from_args(
    goal: Option<String>,
    session: Option<String>,
    continue_latest: bool,
) -> Result<SessionTarget, String> {
    match (session, continue_latest) {
        (Some(id), _) => Ok(SessionTarget::Resume {
            session_id: SessionId::from(id.as_str()),
            follow_up: goal,
        }),
        (None, true) => Ok(SessionTarget::Latest { follow_up: goal }),
        (None, false) => match goal {
            Some(goal) if !goal.trim().is_empty() => Ok(SessionTarget::New { goal }),
            _ => Err("A goal is required unless --session or --continue is given".into()),
        },
    }
}

fn print_outcome(outcome: &RunOutcome) {
    println!();
    match &outcome.final_answer {
        Some(answer) => println!("{answer}"),
        None => {
            if let Some(reason) = outcome.status.failure() {
                eprintln!("Session failed ({}): {}", reason.kind, reason.detail);
            }
        }
    }
    eprintln!();
    eprintln!(
        "  session {}  status {}  turns {}  messages {}  tokens {}",
        outcome.session_id, outcome.status, outcome.turns, outcome.committed_messages, outcome.tokens_used
    );
    if outcome.uncommitted_drafts > 0 {
        eprintln!("  {} message(s) could not be stored", outcome.uncommitted_drafts);
    }
    if !outcome.status_persisted {
        eprintln!("  the final status was not recorded");
    }
}

//! `sentient sessions`, `show` and `delete`.

use sentient_config::AppConfig;
use sentient_core::message::{Message, Role};
use sentient_core::session::{Session, SessionId};

pub async fn list(config: &AppConfig, limit: usize) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_store(config).await?;
    let sessions = store.list_sessions(limit).await?;

    if sessions.is_empty() {
        println!("No sessions yet. Start one with `sentient run \"<goal>\"`.");
        return Ok(());
    }

    println!("{:<36}  {:<10}  {:>5}  {:<16}  GOAL", "ID", "STATUS", "MSGS", "UPDATED");
    for s in sessions {
        println!(
            "{:<36}  {:<10}  {:>5}  {:<16}  {}",
            s.id,
            s.status.as_str(),
            s.message_count,
            s.updated_at.format("%Y-%m-%d %H:%M"),
            one_line(&s.goal, 60)
        );
    }
    Ok(())
}

pub async fn show(config: &AppConfig, id: &str) -> Result<(), Box<dyn std::error::Error>> {
    let store = super::open_store(config).await?;
    let session = store.load_session(&SessionId::from(id)).await?;
    print!("{}", render_session(&session));
    Ok(())
}

/// Returns false when there was nothing to delete.
pub async fn delete(config: &AppConfig, id: &str) -> Result<bool, Box<dyn std::error::Error>> {
    let store = super::open_store(config).await?;
    let deleted = store.delete_session(&SessionId::from(id)).await?;
    if deleted {
        println!("Deleted session {id}");
    } else {
        eprintln!("No session {id}");
    }
    Ok(deleted)
}

fn render_session(session: &Session) -> String {
    let mut out = format!(
        "Session {}\nGoal:    {}\nStatus:  {}\nCreated: {}\n\n",
        session.id,
        session.goal,
        session.status,
        session.created_at.to_rfc3339()
    );
    for message in &session.messages {
        out.push_str(&render_message(message));
        out.push('\n');
    }
    out
}

fn render_message(message: &Message) -> String {
    let label = match message.role {
        Role::User if message.correction_attempt().is_some() => "correction",
        Role::Model if message.is_rejected() => "rejected",
        role => role.as_str(),
    };
    let mut line = format!("[{:>3}] {label:<10} {}", message.seq, one_line(&message.content, 200));
    for call in message.tool_calls() {
        line.push_str(&format!(
            "\n      -> {}({})",
            call.name,
            serde_json::Value::Object(call.arguments.clone())
        ));
    }
    line
}

fn one_line(text: &str, max_chars: usize) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars).collect();
        format!("{cut}...")
    }
}

//! Renders run progress from the event bus to stderr.

use sentient_core::event::DomainEvent;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};

/// Print events until the bus closes.
pub async fn print_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = render(&event) {
                    eprintln!("{line}");
                }
            }
            Err(RecvError::Lagged(skipped)) => eprintln!("  ... {skipped} event(s) skipped"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn render(event: &DomainEvent) -> Option<String> {
    let line = match event {
        DomainEvent::SessionStarted {
            session_id,
            resumed: true,
            next_seq,
            ..
        } => format!("  resuming session {session_id} at message {next_seq}"),
        DomainEvent::SessionStarted { session_id, .. } => format!("  session {session_id}"),
        DomainEvent::TurnStarted { turn, .. } => format!("  turn {turn}: thinking..."),
        DomainEvent::ModelResponded { tool_calls: 0, .. } => return None,
        DomainEvent::ModelResponded { tool_calls, .. } => format!("    model requested {tool_calls} tool call(s)"),
        DomainEvent::ToolExecuted {
            tool_name,
            success,
            duration_ms,
            ..
        } => format!(
            "    {} {tool_name} ({duration_ms} ms)",
            if *success { "ok  " } else { "fail" }
        ),
        DomainEvent::MessagesCommitted { .. } => return None,
        DomainEvent::RetryScheduled {
            operation,
            attempt,
            delay_ms,
            error_message,
            ..
        } => format!("    {operation} failed ({error_message}), retry {attempt} in {delay_ms} ms"),
        DomainEvent::SessionTerminated { status, .. } => format!("  finished: {status}"),
    };
    Some(line)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn tool_events_show_name_and_outcome() {
        let line = render(&DomainEvent::ToolExecuted {
            session_id: "s1".into(),
            tool_name: "shell".into(),
            success: false,
            duration_ms: 12,
            timestamp: Utc::now(),
        })
        .unwrap();
        assert!(line.contains("fail shell (12 ms)"), "{line}");
    }

    #[test]
    fn commits_are_quiet() {
        assert!(
            render(&DomainEvent::MessagesCommitted {
                session_id: "s1".into(),
                first_seq: 1,
                count: 2,
                timestamp: Utc::now(),
            })
            .is_none()
        );
    }

    #[tokio::test]
    async fn printer_stops_when_the_bus_closes() {
        let bus = sentient_core::event::EventBus::new(8);
        let printer = tokio::spawn(print_events(bus.subscribe()));
        bus.publish(DomainEvent::TurnStarted {
            session_id: "s1".into(),
            turn: 1,
            timestamp: Utc::now(),
        });
        drop(bus);
        printer.await.unwrap();
    }
}

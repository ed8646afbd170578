//! `chatloom history`: what the turn store remembers about a session.

use chatloom_config::AppConfig;
use chatloom_core::message::SessionId;

use super::{CliResult, open_stores};

pub async fn run(config: AppConfig, session: &str, limit: Option<usize>) -> CliResult {
    if config.memory.turn_store == "in_memory" {
        println!("The in-memory turn store does not outlive a process; nothing to show.");
        return Ok(());
    }

    let turns = open_stores(&config).await?.turns;
    let session = SessionId::from(session);
    let limit = limit.unwrap_or(config.memory.max_history_pairs);

    match turns.get_summary(&session).await? {
        Some(summary) => {
            println!("Summary (covers the first {} turn(s)):", summary.folded_turns);
            for line in summary.text.lines() {
                println!("  {line}");
            }
        }
        None => println!("Summary: (none)"),
    }

    let recent = turns.recent_turns(&session, limit).await?;
    println!();
    if recent.is_empty() {
        println!("No turns stored for session {session}.");
        return Ok(());
    }
    println!("Last {} turn(s):", recent.len());
    for pair in recent {
        println!();
        println!("  [{}]", pair.created_at.format("%Y-%m-%d %H:%M:%S"));
        println!("  You       > {}", pair.user);
        println!("  Assistant > {}", pair.assistant);
    }
    Ok(())
}

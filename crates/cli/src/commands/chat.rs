//! `chatloom chat` and `chatloom ask`: talking to the orchestrator.

use std::io::Write;

use chatloom_agent::FinalResult;
use chatloom_config::AppConfig;
use chatloom_core::message::SessionId;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{CliResult, build_sessions};

fn session_id(session: Option<String>) -> SessionId {
    session.map(|s| SessionId::from(s.as_str())).unwrap_or_default()
}

/// Single-message mode: print the answer on stdout, errors on stderr.
pub async fn ask(config: AppConfig, message: &str, session: Option<String>) -> CliResult {
    let sessions = build_sessions(&config).await?;
    let session = session_id(session);

    match sessions.run_turn(&session, message).await {
        FinalResult::Text(text) => {
            println!("{text}");
            Ok(())
        }
        FinalResult::Error(e) => Err(format!("Turn failed: {e}").into()),
    }
}

/// Interactive mode.
pub async fn run(config: AppConfig, session: Option<String>) -> CliResult {
    let sessions = build_sessions(&config).await?;
    let session = session_id(session);

    println!();
    println!("  Chatloom: interactive mode");
    println!();
    println!("  Model:     {}", config.llm.chat_model);
    println!("  Fallback:  {}", config.llm.fallback_model);
    println!("  Tools:     {}", sessions.orchestrator().tools().names().join(", "));
    println!("  Session:   {session}");
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if matches!(input, "exit" | "quit") {
            break;
        }

        eprint!("  ...");
        let reply = sessions.chat(&session, input).await;
        eprint!("\r     \r");
        println!();
        for line in reply.lines() {
            println!("  Assistant > {line}");
        }
        println!();
    }

    println!();
    println!("  Session saved as {session}. Resume with `chatloom chat --session {session}`.");
    println!();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_session_id_is_kept() {
        assert_eq!(session_id(Some("work".into())).as_str(), "work");
        assert_ne!(session_id(None), session_id(None));
    }
}

use anyhow::Context;
use colloquy::{EngineConfig, EngineUpdate, VoiceEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let mut cfg = EngineConfig::default();
    if let Ok(address) = std::env::var("COLLOQUY_SERVER") {
        cfg.server_address = address;
    }
    tracing::info!(server = %cfg.server_address, "starting voice session");

    let mut engine = VoiceEngine::new(cfg);
    let mut updates = engine
        .updates()
        .context("update stream already taken")?;

    engine.start_listening().await?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!();
                engine.stop_listening();
                engine.disconnect();
                break;
            }
            update = updates.recv() => {
                let Some(update) = update else { break };
                match update {
                    EngineUpdate::Connected { conversation_id } => {
                        println!("* connected ({})", conversation_id.as_deref().unwrap_or("no conversation id"));
                    }
                    EngineUpdate::Disconnected { reason } => {
                        println!("* disconnected: {}", reason.as_deref().unwrap_or("closed"));
                        break;
                    }
                    EngineUpdate::Status(status) => println!("* {status}"),
                    EngineUpdate::Transcript(text) => println!("you: {text}"),
                    EngineUpdate::ResponseDelta(_) => {}
                    EngineUpdate::Response(text) => println!("assistant: {text}"),
                    EngineUpdate::ResumeListening => {
                        // Hand the microphone back and open the next turn.
                        engine.start_listening().await?;
                    }
                    EngineUpdate::MicLevel(_) => {}
                    EngineUpdate::Error(message) => eprintln!("! {message}"),
                }
            }
        }
    }

    Ok(())
}

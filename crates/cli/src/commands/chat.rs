//! `wela chat` — Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::warn;
use wela_agent::{AgentLoop, AgentStreamEvent};
use wela_config::AppConfig;
use wela_core::event::{ToolEvent, ToolObserver};
use wela_core::memory::Memory;
use wela_core::provider::ChatModel;
use wela_memory::NoopMemory;

pub async fn run(message: Option<String>, stream: bool) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    // Local endpoints (Ollama, llama.cpp) work without a key
    if !config.has_api_key() && config.base_url.contains("api.openai.com") {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    export WELA_API_KEY='sk-...'");
        eprintln!("    export OPENAI_API_KEY='sk-...'");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let agent = build_agent(&config).await?;
    let stream = stream || agent.streaming();

    if let Some(msg) = message {
        // Single message mode
        respond(&agent, msg, stream).await?;
        return Ok(());
    }

    // Interactive mode
    println!();
    println!("  ╔══════════════════════════════════════════════╗");
    println!("  ║           Wela — Interactive Mode            ║");
    println!("  ╚══════════════════════════════════════════════╝");
    println!();
    println!("  Endpoint:  {}", config.base_url);
    println!("  Model:     {}", config.model);
    println!("  Tools:     {}", config.tools.enabled.join(", "));
    println!("  Memory:    {:?}", config.memory.backend);
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
        if input.eq_ignore_ascii_case("exit") {
            break;
        }

        match respond(&agent, input.to_string(), stream).await {
            Ok(true) => break,
            Ok(false) => {}
            Err(e) => {
                eprintln!("  [Error] {e}");
                println!();
            }
        }
    }

    println!();
    println!("  Goodbye!");
    println!();
    Ok(())
}

/// Wire model, tools and memory from configuration.
pub async fn build_agent(config: &AppConfig) -> Result<AgentLoop, Box<dyn std::error::Error>> {
    let model: Arc<dyn ChatModel> = Arc::new(wela_providers::build_from_config(config));
    let tools = Arc::new(wela_tools::from_config(&config.tools));

    // A broken memory backend degrades to no memory
    let memory: Arc<dyn Memory> = match wela_memory::build_from_config(&config.memory, model.clone()).await {
        Ok(memory) => memory,
        Err(e) => {
            warn!(error = %e, "Memory unavailable, continuing without it");
            Arc::new(NoopMemory)
        }
    };

    let mut agent = AgentLoop::new(model, &config.model)
        .with_max_loop(config.agent.max_loop)?
        .with_system_prompt(&config.agent.system_prompt)
        .with_tools(tools)
        .with_memory(memory)
        .with_observer(Arc::new(ConsoleObserver))
        .with_stop(config.agent.stop.clone());

    if let Some(secs) = config.tools.timeout_secs {
        agent = agent.with_tool_timeout(Duration::from_secs(secs));
    }
    if let Some(max_tokens) = config.agent.max_tokens {
        agent = agent.with_max_tokens(max_tokens);
    }
    if let Some(temperature) = config.agent.temperature {
        agent = agent.with_temperature(temperature);
    }
    Ok(agent)
}

/// Answer one input. Returns true when the model asked to quit.
async fn respond(agent: &AgentLoop, input: String, stream: bool) -> Result<bool, Box<dyn std::error::Error>> {
    if !stream {
        eprint!("  ...");
        let outcome = agent.predict(input).await?;
        eprint!("\r     \r");
        println!();
        for line in outcome.message().text().lines() {
            println!("  Wela > {line}");
        }
        println!();
        return Ok(outcome.is_quit());
    }

    let mut events = agent.predict_stream(input);
    let mut out = std::io::stdout();
    println!();
    print!("  Wela > ");
    out.flush()?;

    while let Some(event) = events.recv().await {
        match event {
            AgentStreamEvent::Chunk { content } => {
                // Keep the prompt prefix on continuation lines
                print!("{}", content.replace('\n', "\n         "));
                out.flush()?;
            }
            AgentStreamEvent::ToolCall { .. } | AgentStreamEvent::ToolResult { .. } => {}
            AgentStreamEvent::Done { .. } => {
                println!();
                println!();
            }
            AgentStreamEvent::Quit { farewell, .. } => {
                println!("{farewell}");
                println!();
                return Ok(true);
            }
            AgentStreamEvent::Error { message } => {
                println!();
                return Err(message.into());
            }
        }
    }
    Ok(false)
}

/// Shows tool activity on stderr.
struct ConsoleObserver;

impl ToolObserver for ConsoleObserver {
    fn before_tool_call(&self, event: &ToolEvent) {
        eprintln!("  ⚙ {} {}", event.tool_name, event.arguments);
    }
}

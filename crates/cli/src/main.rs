use anyhow::Context;
use clap::{Parser, Subcommand};
use optimonkey::api::BackendClient;
use optimonkey::connection::{ConnectOptions, ConnectionEvent, ConnectionHandle};
use optimonkey::conversation::ClearScope;
use optimonkey::dashboard::{Dashboard, SubmitOutcome};
use optimonkey::message::{CsvTable, MessageBody, NormalizedMessage};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "optimonkey")]
#[command(about = "OptiMonkey CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Follow the live conversation over the WebSocket and send messages (interactive).
    /// Commands: /retry, /clear, /clear-heartbeats, /quit.
    Chat {
        /// Config file path (default: OPTIMONKEY_CONFIG_PATH or ~/.optimonkey/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Start the agents, with the backend's default prompt unless one is given.
    Start {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Custom prompt text.
        #[arg(long, conflicts_with = "template")]
        prompt: Option<String>,

        /// Title of a built-in template (see `optimonkey templates`).
        #[arg(long, short)]
        template: Option<String>,
    },

    /// Send one message through the REST endpoint.
    Send {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        message: String,
    },

    /// Download the recommendations CSV; prints a table unless --output is given.
    Recommendations {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Write the CSV to this file.
        #[arg(long, short, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Print the server-sent conversation stream until the backend ends it.
    Stream {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List the built-in prompt templates.
    Templates,

    /// Show or update the local settings (stored next to the config file).
    Settings {
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        #[arg(long, value_name = "KEY")]
        openai_key: Option<String>,

        #[arg(long, value_name = "VALUE")]
        other: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("optimonkey {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Chat { config }) => run_chat(config).await.context("chat failed"),
        Some(Commands::Start {
            config,
            prompt,
            template,
        }) => run_start(config, prompt, template).await.context("start failed"),
        Some(Commands::Send { config, message }) => {
            run_send(config, message).await.context("send failed")
        }
        Some(Commands::Recommendations { config, output }) => run_recommendations(config, output)
            .await
            .context("recommendations failed"),
        Some(Commands::Stream { config }) => run_stream(config).await.context("stream failed"),
        Some(Commands::Templates) => {
            run_templates();
            Ok(())
        }
        Some(Commands::Settings {
            config,
            openai_key,
            other,
        }) => run_settings(config, openai_key, other).context("settings failed"),
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };

    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn client(config_path: Option<PathBuf>) -> anyhow::Result<BackendClient> {
    let (config, _) = optimonkey::config::load_config(config_path)?;
    Ok(BackendClient::from_config(&config))
}

/// Read stdin lines on a plain thread; the channel closes at EOF.
fn spawn_stdin_reader() -> tokio::sync::mpsc::UnboundedReceiver<String> {
    let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        let mut line = String::new();
        loop {
            line.clear();
            match stdin.read_line(&mut line) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    if tx.send(line.clone()).is_err() {
                        break;
                    }
                }
            }
        }
    });
    rx
}

async fn run_chat(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (config, _) = optimonkey::config::load_config(config_path)?;
    let options = ConnectOptions::from_config(&config);
    println!("connecting to {} (/quit to exit)", options.url);

    let (handle, mut events) = ConnectionHandle::spawn(options);
    let mut dashboard = Dashboard::new(&config);
    let mut lines = spawn_stdin_reader();

    loop {
        tokio::select! {
            event = events.recv() => {
                let Some(event) = event else { break };
                print_event(&mut dashboard, event);
            }
            line = lines.recv() => {
                let Some(line) = line else { break };
                match line.trim() {
                    "/quit" | "/exit" => break,
                    "/retry" => handle.retry_now(),
                    "/clear" => {
                        dashboard.clear(ClearScope::All);
                        println!("(conversation cleared)");
                    }
                    "/clear-heartbeats" => {
                        dashboard.clear(ClearScope::ControlOnly);
                        println!("(heartbeats cleared)");
                    }
                    input => {
                        if dashboard.submit(input, &handle) == SubmitOutcome::NotDelivered {
                            if let Some(notice) = dashboard.log().entries().last() {
                                println!("{}", render(notice));
                            }
                        }
                    }
                }
            }
        }
    }

    handle.close().await;
    Ok(())
}

fn print_event(dashboard: &mut Dashboard, event: ConnectionEvent) {
    let status_change = !matches!(event, ConnectionEvent::Message(_));
    let rendered = dashboard.handle_event(event).map(render);
    if let Some(text) = rendered {
        println!("{}", text);
    } else if status_change {
        match dashboard.notice() {
            Some(notice) => eprintln!("[{}] {}", dashboard.status().label(), notice),
            None => eprintln!("[{}]", dashboard.status().label()),
        }
    }
}

async fn run_start(
    config_path: Option<PathBuf>,
    prompt: Option<String>,
    template: Option<String>,
) -> anyhow::Result<()> {
    let (config, _) = optimonkey::config::load_config(config_path)?;
    let client = BackendClient::from_config(&config);
    let prompt = match template {
        Some(title) => Some(
            optimonkey::prompts::find(&title)
                .with_context(|| format!("no template named {:?}", title))?
                .full_prompt(),
        ),
        None => prompt,
    };
    let response = match prompt.as_deref() {
        Some(p) => client.start_agents_with_prompt(p).await?,
        None => client.start_agents().await?,
    };
    log::info!("agents started: {:?}", response.status);

    let mut dashboard = Dashboard::new(&config);
    dashboard.ingest_conversation(&response.conversation);
    for message in dashboard.log().visible() {
        println!("{}", render(message));
    }
    println!(
        "status: {}",
        response.status.as_deref().unwrap_or("started")
    );
    Ok(())
}

async fn run_send(config_path: Option<PathBuf>, message: String) -> anyhow::Result<()> {
    let response = client(config_path)?.send_message(&message).await?;
    let status = response
        .get("status")
        .and_then(|v| v.as_str())
        .unwrap_or("sent");
    println!("{}", status);
    Ok(())
}

async fn run_recommendations(
    config_path: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let csv = client(config_path)?.download_recommendations().await?;
    match output {
        Some(path) => {
            std::fs::write(&path, &csv)
                .with_context(|| format!("writing recommendations to {}", path.display()))?;
            println!("saved recommendations to {}", path.display());
        }
        None => match optimonkey::classify::parse_table(&csv) {
            Some(table) => println!("{}", format_table(&table)),
            None => println!("{}", csv.trim_end()),
        },
    }
    Ok(())
}

async fn run_stream(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let client = client(config_path)?;
    client
        .stream_conversation(&mut |raw: serde_json::Value| {
            let message = optimonkey::classify::classify(&raw);
            if !message.is_control() {
                println!("{}", render(&message));
            }
        })
        .await?;
    Ok(())
}

fn run_templates() {
    for template in optimonkey::prompts::templates() {
        println!("{}\n  {}", template.title, template.description);
    }
}

fn run_settings(
    config_path: Option<PathBuf>,
    openai_key: Option<String>,
    other: Option<String>,
) -> anyhow::Result<()> {
    let config_path = config_path.unwrap_or_else(optimonkey::config::default_config_path);
    let path = optimonkey::settings::settings_path(&config_path);
    let mut settings = optimonkey::settings::Settings::load(&path)?;
    if openai_key.is_some() || other.is_some() {
        if let Some(key) = openai_key {
            settings.openai_key = key.trim().to_string();
        }
        if let Some(value) = other {
            settings.other_variable = value.trim().to_string();
        }
        settings.save(&path)?;
    }
    println!("settings file: {}", path.display());
    println!("openai key:    {}", settings.masked_openai_key());
    println!("other:         {}", settings.other_variable);
    Ok(())
}

/// Terminal rendering: tables are aligned, everything else uses the message's own format.
fn render(message: &NormalizedMessage) -> String {
    match &message.body {
        MessageBody::Csv(table) => format!(
            "[{}] {}:\n{}",
            message.timestamp,
            message.sender,
            format_table(table)
        ),
        _ => message.to_string(),
    }
}

fn format_table(table: &CsvTable) -> String {
    let mut widths: Vec<usize> = table.header.iter().map(|h| h.chars().count()).collect();
    for row in &table.rows {
        for (w, cell) in widths.iter_mut().zip(row) {
            *w = (*w).max(cell.chars().count());
        }
    }
    let line = |cells: &[String]| {
        cells
            .iter()
            .zip(&widths)
            .map(|(c, w)| format!("{:<width$}", c, width = *w))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };
    let mut out = vec![line(&table.header)];
    out.push(
        widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("  "),
    );
    out.extend(table.rows.iter().map(|r| line(r)));
    out.join("\n")
}

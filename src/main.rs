use anyhow::Result;
use clap::Parser;
use datadeck::analysis;
use datadeck::config::EngineConfig;
use datadeck::error::EngineError;
use datadeck::ingest;
use datadeck::llm::LlmClient;
use datadeck::orchestrator::Orchestrator;
use datadeck::session::{ChatRole, SessionState};
use datadeck::store::{FileStore, SnapshotStore};
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "datadeck")]
#[command(about = "Conversational analysis cards over a tabular dataset")]
struct Args {
    /// CSV file to analyze
    file: PathBuf,

    /// OpenAI API key (or set OPENAI_API_KEY env var)
    #[arg(long)]
    api_key: Option<String>,

    /// Chat model name
    #[arg(long, default_value = "gpt-4o-mini")]
    model: String,

    /// OpenAI-compatible API base URL
    #[arg(long, default_value = "https://api.openai.com/v1")]
    base_url: String,

    /// Directory for session snapshots
    #[arg(long, default_value = ".datadeck")]
    snapshot_dir: PathBuf,

    /// Snapshot name for this session
    #[arg(long, default_value = "session")]
    session_name: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let args = Args::parse();
    let config = EngineConfig::default();

    let api_key = args
        .api_key
        .or_else(|| std::env::var("OPENAI_API_KEY").ok())
        .unwrap_or_default();
    if api_key.is_empty() {
        anyhow::bail!("no API key; pass --api-key or set OPENAI_API_KEY");
    }
    let planner = LlmClient::new(api_key, &config)
        .with_base_url(args.base_url)
        .with_model(args.model);

    info!("loading {}", args.file.display());
    let raw_rows = ingest::dataset_from_csv_path(&args.file)?;
    info!("loaded {} rows", raw_rows.len());

    let mut session = match analysis::ingest(&planner, raw_rows.clone(), &config).await {
        Ok(session) => session,
        Err(EngineError::Preparation { last_error, .. }) => {
            warn!("data preparation failed: {}", last_error);
            println!("Data preparation failed ({}). Continuing with the raw data.", last_error);
            SessionState::new(raw_rows)
        }
        Err(e) => return Err(e.into()),
    };

    analysis::run_initial_analysis(&planner, &mut session, &config).await?;
    print_new_entries(&session, 0);
    print_cards(&session);

    let store = FileStore::new(&args.snapshot_dir);
    store.put(&args.session_name, &session).await?;

    let orchestrator = Orchestrator::new(&planner, &config);
    let stdin = std::io::stdin();
    loop {
        print!("> ");
        std::io::stdout().flush()?;
        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }
        let message = line.trim();
        if message.is_empty() {
            continue;
        }
        if message == "exit" || message == "quit" {
            break;
        }

        let seen = session.timeline.len();
        if let Err(e) = orchestrator.handle_user_message(&mut session, message).await {
            println!("! {}", e);
        }
        print_new_entries(&session, seen);
        print_cards(&session);
        store.put(&args.session_name, &session).await?;
    }

    Ok(())
}

fn print_new_entries(session: &SessionState, from: usize) {
    for entry in &session.timeline[from.min(session.timeline.len())..] {
        let prefix = match entry.role {
            ChatRole::User => ">",
            ChatRole::Assistant => "assistant:",
            ChatRole::Notice => "*",
            ChatRole::Error => "!",
        };
        println!("{} {}", prefix, entry.text);
    }
}

fn print_cards(session: &SessionState) {
    for card in &session.cards {
        println!(
            "[{:?}] {} ({} rows{})",
            card.display_chart_kind,
            card.plan.title,
            card.visible_rows().len(),
            card.ai_summary
                .as_deref()
                .map(|s| format!(": {}", s))
                .unwrap_or_default()
        );
    }
}

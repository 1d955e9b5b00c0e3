use std::fs::OpenOptions;

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::*;

mod app;
mod config;
mod fragment;
mod gemini;
mod handler;
mod oracle;
mod tui;
mod ui;

use app::App;
use fragment::FragmentAtlas;
use gemini::GeminiClient;
use oracle::{OracleSession, Role};

#[derive(Parser)]
#[command(name = "vittoriale")]
#[command(about = "Exploration of Gabriele D'Annunzio's life and works, with an AI oracle")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Consult the oracle with a single question
    Ask {
        /// Your question for the shade of the poet
        question: String,
        /// Gemini model to use
        #[arg(short, long)]
        model: Option<String>,
    },
    /// List the fragments of the field
    List,
    /// Print a fragment's pages
    Show {
        /// Fragment id (see `list`)
        id: String,
    },
    /// Store oracle settings (API key, model, API base)
    Config {
        /// Gemini API key to store
        #[arg(long)]
        api_key: Option<String>,
        /// Default model to store
        #[arg(long)]
        model: Option<String>,
        /// API base URL override to store
        #[arg(long)]
        api_base: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_logging();

    let cli = Cli::parse();
    match cli.command {
        None => run_tui().await,
        Some(Commands::Ask { question, model }) => ask(&question, model.as_deref()).await,
        Some(Commands::List) => list_fragments(),
        Some(Commands::Show { id }) => show_fragment(&id),
        Some(Commands::Config {
            api_key,
            model,
            api_base,
        }) => save_config(api_key, model, api_base),
    }
}

/// Log to a file so nothing interferes with the TUI.
fn init_logging() {
    let log_file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open("vittoriale.log")
        .ok();

    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(file) = log_file {
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }
    builder.init();
}

async fn run_tui() -> Result<()> {
    log::info!("Starting vittoriale v{}", env!("CARGO_PKG_VERSION"));

    tui::install_panic_hook();
    let mut terminal = tui::init()?;

    let mut app = App::new()?;
    let mut events = tui::EventHandler::new();

    let result = run_loop(&mut terminal, &mut app, &mut events).await;

    tui::restore()?;

    if let Err(ref e) = result {
        log::error!("exited with error: {e:#}");
        eprintln!("Error: {e}");
    }
    log::info!("shut down cleanly");
    result
}

async fn run_loop(
    terminal: &mut tui::Tui,
    app: &mut App,
    events: &mut tui::EventHandler,
) -> Result<()> {
    while !app.should_quit {
        terminal.draw(|frame| ui::render(app, frame))?;

        if let Some(event) = events.next().await {
            handler::handle_event(app, event).await?;
        }

        // Fold a finished oracle request into the transcript; the 300ms
        // tick guarantees this runs while the user is idle.
        app.poll_oracle().await;
    }
    Ok(())
}

async fn ask(question: &str, model: Option<&str>) -> Result<()> {
    let mut session = OracleSession::new();

    match GeminiClient::from_env(model) {
        Ok(client) => {
            println!(
                "{}",
                format!("Consulto l'Ombra ({})...", client.model()).dimmed()
            );
            session.submit(question, &client).await;
        }
        Err(err) => {
            // Same degradation as the TUI: the question still gets its
            // fallback answer, the cause goes to the log.
            if session.begin(question).is_some() {
                session.resolve(Err(err));
            }
        }
    }

    for turn in session.turns() {
        match turn.role {
            Role::User => println!("\n{}", turn.text.italic().dimmed()),
            Role::Daimon => println!("\n{}", turn.text.yellow()),
        }
    }

    Ok(())
}

fn save_config(
    api_key: Option<String>,
    model: Option<String>,
    api_base: Option<String>,
) -> Result<()> {
    let mut config = config::Config::load().unwrap_or_else(|_| config::Config::new());
    if api_key.is_some() {
        config.api_key = api_key;
    }
    if model.is_some() {
        config.model = model;
    }
    if api_base.is_some() {
        config.api_base = api_base;
    }
    config.save()?;
    println!("{}", "Configurazione salvata.".green());
    Ok(())
}

fn list_fragments() -> Result<()> {
    let atlas = FragmentAtlas::load()?;
    if atlas.is_empty() {
        println!("{}", "Il campo è vuoto.".dimmed());
        return Ok(());
    }

    println!("\n{}", "Il filo d'oro".bold().yellow());
    for fragment in atlas.all() {
        println!(
            "  {} {} {} {}",
            format!("{:<12}", fragment.id).bold(),
            format!("{:<12}", fragment.era).dimmed(),
            fragment.label,
            format!("({})", fragment.kind.display_name()).dimmed(),
        );
    }

    Ok(())
}

fn show_fragment(id: &str) -> Result<()> {
    let atlas = FragmentAtlas::load()?;

    let Some(fragment) = atlas.get(id) else {
        println!("{} {}", "Nessun frammento con id".red(), id.bold());
        println!("I frammenti disponibili: {}", "vittoriale list".bold());
        return Ok(());
    };

    println!(
        "\n{} {}",
        fragment.label.bold().yellow(),
        format!("({})", fragment.era).dimmed()
    );
    if let Some(meta) = &fragment.meta {
        println!("{}", meta.italic().dimmed());
    }

    for (i, page) in fragment.pages.iter().enumerate() {
        println!("\n{}", format!("— {} —", i + 1).dimmed());
        println!("{page}");
    }

    if let Some(analysis) = &fragment.analysis {
        println!("\n{}", analysis.title.bold());
        for paragraph in &analysis.paragraphs {
            println!("{}", paragraph.italic());
        }
    }

    Ok(())
}

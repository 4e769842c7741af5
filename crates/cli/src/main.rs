use clap::{Parser, Subcommand};
use lib::chats::{Chat, ChatRegistry};
use lib::config;
use lib::engine::{ChatEngine, SendOutcome};
use lib::llm::OllamaClient;
use lib::models::ModelRegistry;
use lib::store::ChatStore;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "colloq")]
#[command(about = "Colloq CLI — chat with a local model server", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Chat interactively with the local model server. Plain input sends to
    /// the current chat; /help lists the in-session commands.
    Chat {
        /// Config file path (default: COLLOQ_CONFIG_PATH or ~/.colloq/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Server base URL (default from config or http://localhost:11434)
        #[arg(long, short)]
        url: Option<String>,

        /// Model name (default from config, reconciled against the server)
        #[arg(long, short)]
        model: Option<String>,
    },

    /// List saved chats grouped by last activity.
    Chats {
        /// Config file path (default: COLLOQ_CONFIG_PATH or ~/.colloq/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// List the models the server reports.
    Models {
        /// Config file path (default: COLLOQ_CONFIG_PATH or ~/.colloq/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Server base URL (default from config or http://localhost:11434)
        #[arg(long, short)]
        url: Option<String>,
    },

    /// Export a chat transcript as a text file.
    Export {
        /// Config file path (default: COLLOQ_CONFIG_PATH or ~/.colloq/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,

        /// Chat to export: list index from `colloq chats` (default: most recent).
        #[arg(long, value_name = "N")]
        chat: Option<usize>,

        /// Output directory (default: current directory).
        #[arg(long, short, value_name = "DIR")]
        out: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let cli = Cli::parse();

    match cli.command {
        Some(Commands::Version) => {
            println!("colloq {}", env!("CARGO_PKG_VERSION"));
        }
        Some(Commands::Chat { config, url, model }) => {
            if let Err(e) = run_chat(config, url, model).await {
                log::error!("chat failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Chats { config }) => {
            if let Err(e) = run_chats(config).await {
                log::error!("listing chats failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Models { config, url }) => {
            if let Err(e) = run_models(config, url).await {
                log::error!("listing models failed: {:#}", e);
                std::process::exit(1);
            }
        }
        Some(Commands::Export { config, chat, out }) => {
            if let Err(e) = run_export(config, chat, out).await {
                log::error!("export failed: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("Run with --help for usage");
        }
    }
}

fn open_registry(config_path: &std::path::Path) -> Arc<ChatRegistry> {
    Arc::new(ChatRegistry::open(ChatStore::new(config::chats_path(
        config_path,
    ))))
}

async fn run_chat(
    config_path: Option<PathBuf>,
    url: Option<String>,
    model: Option<String>,
) -> anyhow::Result<()> {
    use std::io;

    let (config, path) = config::load_config(config_path)?;
    let base_url = url.unwrap_or(config.server.base_url);
    let client = OllamaClient::new(Some(base_url));
    let registry = open_registry(&path);
    let mut models = ModelRegistry::new(model.unwrap_or(config.chat.default_model));

    if models.refresh(&client).await {
        println!(
            "connected to {} ({} models)",
            client.base_url(),
            models.available().len()
        );
    } else {
        println!(
            "could not reach {}; continuing with model '{}'",
            client.base_url(),
            models.selected()
        );
    }

    if registry.current_chat_id().await.is_none() {
        registry.create_chat().await;
    }
    let engine = ChatEngine::new(registry.clone(), client);

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        write!(stdout, "> ")?;
        stdout.flush()?;
        let mut line = String::new();
        if stdin.read_line(&mut line)? == 0 {
            break;
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }
        if let Some(command) = input.strip_prefix('/') {
            if !handle_command(command, &registry, &mut models, &engine).await? {
                break;
            }
            continue;
        }

        let Some(chat_id) = registry.current_chat_id().await else {
            registry.create_chat().await;
            continue;
        };
        let mut print_delta = |s: &str| {
            print!("{}", s);
            let _ = io::stdout().flush();
        };
        match engine
            .send_message(&chat_id, input, models.selected(), Some(&mut print_delta))
            .await
        {
            Ok(SendOutcome::Completed) => println!(),
            Ok(SendOutcome::Cancelled) => println!("\n(cancelled)"),
            Ok(SendOutcome::Ignored) => {}
            Err(e) => eprintln!("chat error: {}", e),
        }
    }

    Ok(())
}

/// Handle one /command in the REPL; returns false to exit.
async fn handle_command(
    command: &str,
    registry: &Arc<ChatRegistry>,
    models: &mut ModelRegistry,
    engine: &ChatEngine,
) -> anyhow::Result<bool> {
    let (name, rest) = match command.split_once(char::is_whitespace) {
        Some((name, rest)) => (name, rest.trim()),
        None => (command, ""),
    };
    match name {
        "exit" | "quit" => return Ok(false),
        "help" => {
            println!("/new /chats /switch <n> /rename <title> /delete [n] /clear /export [dir] /models /exit");
        }
        "new" => {
            registry.create_chat().await;
            println!("started a new chat");
        }
        "chats" => {
            print_history(&registry.chats().await, registry.current_chat_id().await.as_deref());
        }
        "switch" => match chat_by_index(registry, rest).await {
            Some(chat) => {
                registry.select_chat(&chat.id).await;
                println!("switched to: {}", chat.title);
            }
            None => eprintln!("no chat at index '{}'", rest),
        },
        "rename" => {
            if let Some(chat_id) = registry.current_chat_id().await {
                registry.rename_chat(&chat_id, rest).await;
            }
        }
        "delete" => {
            let target = if rest.is_empty() {
                registry.current_chat_id().await.map(|id| (id, None))
            } else {
                chat_by_index(registry, rest).await.map(|c| (c.id, Some(c.title)))
            };
            match target {
                Some((chat_id, title)) => {
                    // A stream into the deleted chat would merge into nothing;
                    // stop it instead of letting it drain silently.
                    engine.cancel();
                    registry.delete_chat(&chat_id).await;
                    println!("deleted {}", title.unwrap_or_else(|| "current chat".to_string()));
                }
                None => eprintln!("nothing to delete"),
            }
        }
        "clear" => {
            if let Some(chat_id) = registry.current_chat_id().await {
                registry.clear_messages(&chat_id).await;
            }
        }
        "export" => {
            if let Some(chat_id) = registry.current_chat_id().await {
                if let Some(chat) = registry.chat(&chat_id).await {
                    let dir = if rest.is_empty() {
                        PathBuf::from(".")
                    } else {
                        PathBuf::from(rest)
                    };
                    match lib::transcript::write(&chat, &dir) {
                        Ok(path) => println!("exported to {}", path.display()),
                        Err(e) => eprintln!("export error: {:#}", e),
                    }
                }
            }
        }
        "models" => {
            for name in models.available() {
                let marker = if name == models.selected() { "*" } else { " " };
                println!("{} {}", marker, name);
            }
            if !rest.is_empty() {
                models.select(rest);
                println!("selected model '{}'", rest);
            }
        }
        _ => eprintln!("unknown command '/{}'; try /help", name),
    }
    Ok(true)
}

/// Resolve a 1-based index from the `/chats` listing.
async fn chat_by_index(registry: &Arc<ChatRegistry>, arg: &str) -> Option<Chat> {
    let index: usize = arg.parse().ok()?;
    registry.chats().await.into_iter().nth(index.checked_sub(1)?)
}

fn print_history(chats: &[Chat], current: Option<&str>) {
    if chats.is_empty() {
        println!("no chats yet");
        return;
    }
    let mut last_label = String::new();
    for (i, chat) in chats.iter().enumerate() {
        let label = lib::transcript::group_label(chat.updated_at);
        if label != last_label {
            println!("{}", label);
            last_label = label;
        }
        let marker = if current == Some(chat.id.as_str()) { "*" } else { " " };
        println!(
            " {} [{}] {} ({} messages)",
            marker,
            i + 1,
            chat.title,
            chat.messages.len()
        );
    }
}

async fn run_chats(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let (_config, path) = config::load_config(config_path)?;
    let registry = open_registry(&path);
    print_history(&registry.chats().await, registry.current_chat_id().await.as_deref());
    Ok(())
}

async fn run_models(config_path: Option<PathBuf>, url: Option<String>) -> anyhow::Result<()> {
    let (config, _path) = config::load_config(config_path)?;
    let base_url = url.unwrap_or(config.server.base_url);
    let client = OllamaClient::new(Some(base_url));
    let listing = client.list_models().await?;
    if listing.is_empty() {
        println!("the server reported no models");
    }
    for model in listing {
        match model.size {
            Some(size) => println!("{} ({} MB)", model.name, size / (1024 * 1024)),
            None => println!("{}", model.name),
        }
    }
    Ok(())
}

async fn run_export(
    config_path: Option<PathBuf>,
    chat: Option<usize>,
    out: Option<PathBuf>,
) -> anyhow::Result<()> {
    let (_config, path) = config::load_config(config_path)?;
    let registry = open_registry(&path);
    let chats = registry.chats().await;
    let selected = match chat {
        Some(index) => index
            .checked_sub(1)
            .and_then(|i| chats.get(i))
            .ok_or_else(|| anyhow::anyhow!("no chat at index {}", index))?,
        None => chats
            .iter()
            .max_by_key(|c| c.updated_at)
            .ok_or_else(|| anyhow::anyhow!("no chats to export"))?,
    };
    let dir = out.unwrap_or_else(|| PathBuf::from("."));
    let written = lib::transcript::write(selected, &dir)?;
    println!("exported to {}", written.display());
    Ok(())
}

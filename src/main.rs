use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use dotenv::dotenv;
use log::{info, warn};
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;

use pdf_chat::config::RagConfig;
use pdf_chat::database::{IndexStore, LocalIndexStore, QdrantConfig, QdrantIndexStore};
use pdf_chat::document::{is_pdf_path, PdfUpload};
use pdf_chat::embeddings::Embedder;
use pdf_chat::gemini::{GeminiClient, GeminiConfig};
use pdf_chat::prompt::AnswerGenerator;
use pdf_chat::rag::RagEngine;
use pdf_chat::session::{
    ChatSession, ProcessOutcome, ReplyKind, StatelessQuery, PROCESSING_COMPLETE,
};

/// Ask questions about PDF documents using Gemini embeddings and completions
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Where `process` persists the index and `ask` reads it
    #[arg(long, value_enum, default_value_t = StoreKind::Local, global = true)]
    store: StoreKind,

    /// Directory of the local index (overrides RAG_INDEX_DIR)
    #[arg(long, global = true)]
    index_dir: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract, chunk and embed PDF files, then save the index
    Process {
        /// PDF files to index
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Answer a question from the saved index; without a question, keep asking
    Ask {
        question: Option<String>,
    },
    /// Interactive chat that keeps its index and history in memory
    Chat {
        /// PDF files to process before the first question
        files: Vec<PathBuf>,

        /// Write the conversation to this file as JSON on exit
        #[arg(long)]
        transcript: Option<PathBuf>,
    },
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// JSON file in a local directory
    Local,
    /// Collection on a Qdrant server (QDRANT_URL)
    Qdrant,
}

enum StatelessAction {
    Process(Vec<PathBuf>),
    Ask(Option<String>),
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize environment
    dotenv().ok();
    env_logger::init();

    let args = Args::parse();

    // Load configuration from environment
    let mut rag_config = RagConfig::from_env().context("Invalid RAG settings")?;
    if let Some(index_dir) = args.index_dir {
        rag_config.index_dir = index_dir;
    }
    let gemini_config = GeminiConfig::from_env().context("Invalid Gemini settings")?;

    let action = match args.command {
        Command::Chat { files, transcript } => {
            return run_chat(&rag_config, gemini_config, files, transcript).await;
        }
        Command::Process { files } => StatelessAction::Process(files),
        Command::Ask { question } => StatelessAction::Ask(question),
    };

    // The stateless commands only notice a missing key at the first API call
    let gemini = GeminiClient::new(gemini_config);
    let engine = RagEngine::new(gemini.clone(), gemini, &rag_config)?;

    match args.store {
        StoreKind::Local => {
            let store = LocalIndexStore::new(&rag_config.index_dir);
            run_stateless(StatelessQuery::new(engine, store), action).await
        }
        StoreKind::Qdrant => {
            let qdrant_config = QdrantConfig::from_env().context("Missing QDRANT_URL")?;
            let store = QdrantIndexStore::new(qdrant_config)
                .context("Failed to initialize Qdrant client")?;
            run_stateless(StatelessQuery::new(engine, store), action).await
        }
    }
}

async fn run_stateless<E, G, S>(
    handler: StatelessQuery<E, G, S>,
    action: StatelessAction,
) -> Result<()>
where
    E: Embedder,
    G: AnswerGenerator,
    S: IndexStore,
{
    match action {
        StatelessAction::Process(files) => {
            let uploads = files
                .iter()
                .map(PdfUpload::from_path)
                .collect::<pdf_chat::Result<Vec<_>>>()
                .context("Failed to read documents")?;

            println!("Processing {} file(s)...", uploads.len());
            let chunks = handler
                .process(&uploads)
                .await
                .context("Failed to process documents")?;
            println!(
                "Done. Indexed {} chunks into {}",
                chunks,
                handler.store().location()
            );
            Ok(())
        }
        StatelessAction::Ask(Some(question)) => {
            let answer = handler.ask(&question).await?;
            println!("Reply: {}", answer);
            Ok(())
        }
        StatelessAction::Ask(None) => run_query_loop(&handler).await,
    }
}

/// Answer questions one at a time until `exit`
async fn run_query_loop<E, G, S>(handler: &StatelessQuery<E, G, S>) -> Result<()>
where
    E: Embedder,
    G: AnswerGenerator,
    S: IndexStore,
{
    println!("Ask a question about your PDF files. Type 'exit' to quit.");

    while let Some(question) = prompt_line("\nYour question: ")? {
        if question.is_empty() {
            continue;
        }
        if is_exit(&question) {
            break;
        }

        let answer = handler.ask(&question).await?;
        println!("Reply: {}", answer);
    }

    println!("Goodbye!");
    Ok(())
}

async fn run_chat(
    rag_config: &RagConfig,
    gemini_config: GeminiConfig,
    files: Vec<PathBuf>,
    transcript: Option<PathBuf>,
) -> Result<()> {
    // Chat refuses to start without a key
    gemini_config.require_api_key()?;

    let gemini = GeminiClient::new(gemini_config);
    let engine = RagEngine::new(gemini.clone(), gemini, rag_config)?;
    let mut session = ChatSession::new(engine);

    println!("Chat with your PDFs using Gemini");
    println!("Type :help for commands.");

    if !files.is_empty() {
        process_paths(&mut session, &files).await;
    }

    while let Some(line) = prompt_line("\nyou> ")? {
        if line.is_empty() {
            continue;
        }
        if is_exit(&line) {
            break;
        }

        match line.split_whitespace().next() {
            Some(":help") => print_help(),
            Some(":history") => print_history(&session),
            Some(":process") => {
                let paths: Vec<PathBuf> = split_paths(&line)
                    .into_iter()
                    .skip(1)
                    .map(PathBuf::from)
                    .collect();
                process_paths(&mut session, &paths).await;
            }
            _ => {
                let reply = session.ask(&line).await;
                match reply.kind {
                    ReplyKind::Answer => println!("assistant> {}", reply.content),
                    ReplyKind::Warning => println!("assistant> [warning] {}", reply.content),
                    ReplyKind::Error => println!("assistant> [error] {}", reply.content),
                }
            }
        }
    }

    if let Some(path) = transcript {
        let json = serde_json::to_string_pretty(session.history())?;
        fs::write(&path, json)
            .with_context(|| format!("Failed to write transcript {}", path.display()))?;
        info!("Transcript written to {}", path.display());
    }

    println!("Goodbye!");
    Ok(())
}

/// Read the given PDF paths and reprocess the session
async fn process_paths<E, G>(session: &mut ChatSession<E, G>, paths: &[PathBuf])
where
    E: Embedder,
    G: AnswerGenerator,
{
    let mut uploads = Vec::new();
    for path in paths {
        if !is_pdf_path(path) {
            warn!("Skipping {}: not a PDF file", path.display());
            println!("Skipping {}: not a PDF file", path.display());
            continue;
        }
        match PdfUpload::from_path(path) {
            Ok(upload) => uploads.push(upload),
            Err(e) => {
                println!("[error] {}", e);
                println!("[error] Failed to process documents.");
                return;
            }
        }
    }

    println!("Processing documents...");
    match session.process(&uploads).await {
        Ok(ProcessOutcome::Ready { chunks }) => {
            println!("{} ({} chunks)", PROCESSING_COMPLETE, chunks);
        }
        Ok(outcome) => println!("[warning] {}", outcome.message()),
        Err(e) => {
            println!("[error] {}", e);
            println!("[error] Failed to process documents.");
        }
    }
}

fn print_help() {
    println!(":process <file.pdf>...  replace the index with these PDF files");
    println!("                        quote paths that contain spaces: \"my file.pdf\"");
    println!(":history                show the conversation so far");
    println!("exit | quit             leave the chat");
    println!("anything else is sent as a question");
}

fn print_history<E, G>(session: &ChatSession<E, G>)
where
    E: Embedder,
    G: AnswerGenerator,
{
    if session.history().is_empty() {
        println!("(no messages yet)");
    }
    for turn in session.history() {
        println!("{}> {}", turn.role, turn.content);
    }
}

/// Print a prompt and read one trimmed line; `None` at end of input
fn prompt_line(prompt: &str) -> Result<Option<String>> {
    let mut stdout = io::stdout();
    print!("{}", prompt);
    stdout.flush()?;

    let mut buffer = String::new();
    if io::stdin().read_line(&mut buffer)? == 0 {
        return Ok(None);
    }
    Ok(Some(buffer.trim().to_string()))
}

fn is_exit(line: &str) -> bool {
    matches!(line.to_lowercase().as_str(), "exit" | "quit")
}

/// Split a command line on whitespace; single or double quotes group a path
fn split_paths(line: &str) -> Vec<String> {
    let mut words = Vec::new();
    let mut current = String::new();
    let mut quote: Option<char> = None;
    let mut in_word = false;

    for c in line.chars() {
        match quote {
            Some(q) if c == q => quote = None,
            Some(_) => current.push(c),
            None if c == '"' || c == '\'' => {
                quote = Some(c);
                in_word = true;
            }
            None if c.is_whitespace() => {
                if in_word {
                    words.push(std::mem::take(&mut current));
                    in_word = false;
                }
            }
            None => {
                current.push(c);
                in_word = true;
            }
        }
    }
    if in_word {
        words.push(current);
    }
    words
}

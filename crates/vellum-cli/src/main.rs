//! Vellum CLI
//!
//! Reference collaborator exercising the substrate's public surface: append
//! messages, force a compaction pass with a deterministic stand-in
//! summarizer, walk/edit the long-term-memory tree, and drain the
//! background queues.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;

use vellum_core::{AgentRole, CompactionConfig, DistillConfig, MessageKind, StoreConfig, Substrate};

mod stub_summarizer;

use stub_summarizer::StubSummarizer;

/// Vellum - reference CLI over the vellum-core memory substrate
#[derive(Parser)]
#[command(name = "vellum")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the vellum-core memory substrate")]
struct Cli {
    /// Path to the SQLite database, or `:memory:` for an ephemeral store.
    #[arg(long, global = true, default_value = ":memory:")]
    db: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum MessageKindArg {
    User,
    Assistant,
    ToolCall,
    ToolResult,
    System,
}

impl From<MessageKindArg> for MessageKind {
    fn from(k: MessageKindArg) -> Self {
        match k {
            MessageKindArg::User => MessageKind::User,
            MessageKindArg::Assistant => MessageKind::Assistant,
            MessageKindArg::ToolCall => MessageKind::ToolCall,
            MessageKindArg::ToolResult => MessageKind::ToolResult,
            MessageKindArg::System => MessageKind::System,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Append a message to the temporal log.
    Append {
        content: String,
        #[arg(long, value_enum, default_value = "user")]
        kind: MessageKindArg,
        /// Token estimate; defaults to a quarter of the content's char count.
        #[arg(long)]
        tokens: Option<i64>,
    },

    /// Print the current view (effective summaries interleaved with
    /// uncovered messages).
    View,

    /// Force a compaction pass using the built-in deterministic summarizer.
    Compact {
        #[arg(long)]
        force: bool,
    },

    /// Long-term-memory tree operations.
    Ltm {
        #[command(subcommand)]
        command: LtmCommands,
    },

    /// Background worker/task/report/alarm queues.
    Queue {
        #[command(subcommand)]
        command: QueueCommands,
    },
}

#[derive(Subcommand)]
enum LtmCommands {
    Create {
        slug: String,
        title: String,
        body: String,
        #[arg(long)]
        parent: Option<String>,
    },
    Read {
        slug: String,
    },
    Update {
        slug: String,
        body: String,
        #[arg(long)]
        version: i64,
    },
    Edit {
        slug: String,
        old_text: String,
        new_text: String,
        #[arg(long)]
        version: i64,
    },
    Reparent {
        slug: String,
        #[arg(long)]
        new_parent: Option<String>,
        #[arg(long)]
        version: i64,
    },
    Rename {
        slug: String,
        new_slug: String,
        #[arg(long)]
        version: i64,
    },
    Archive {
        slug: String,
        #[arg(long)]
        version: i64,
    },
    Glob {
        pattern: String,
        #[arg(long)]
        max_depth: Option<usize>,
    },
    Search {
        query: String,
        #[arg(long)]
        path_prefix: Option<String>,
    },
    Children {
        #[arg(long)]
        parent: Option<String>,
    },
}

#[derive(Subcommand)]
enum QueueCommands {
    /// List every worker record.
    Workers,
    /// List unsurfaced background reports.
    Reports,
    /// Drain the FIFO task-result queue.
    Drain,
    /// List alarms (fired ones included with `--include-fired`).
    Alarms {
        #[arg(long)]
        include_fired: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::try_init().ok();

    let cli = Cli::parse();
    let substrate = Substrate::open(&cli.db, StoreConfig::default())?;

    match cli.command {
        Commands::Append { content, kind, tokens } => run_append(&substrate, content, kind.into(), tokens)?,
        Commands::View => run_view(&substrate)?,
        Commands::Compact { force } => run_compact(&substrate, force).await?,
        Commands::Ltm { command } => run_ltm(&substrate, command)?,
        Commands::Queue { command } => run_queue(&substrate, command)?,
    }

    Ok(())
}

fn run_append(
    substrate: &Substrate,
    content: String,
    kind: MessageKind,
    tokens: Option<i64>,
) -> anyhow::Result<()> {
    let tokens = tokens.unwrap_or_else(|| (content.chars().count() as i64 / 4).max(1));
    let record = substrate.temporal.append_message(kind, content, tokens)?;
    println!("{} {}", "appended".green().bold(), record.id);
    Ok(())
}

fn run_view(substrate: &Substrate) -> anyhow::Result<()> {
    let messages = substrate.temporal.get_messages(None, None)?;
    let summaries = substrate.temporal.get_summaries(None)?;
    let view = vellum_core::build_view(&messages, &summaries, CompactionConfig::default().threshold);

    for turn in &view.turns {
        println!("{:?}", turn.role);
        for part in &turn.parts {
            match part {
                vellum_core::TurnPart::Text { body } => println!("  {body}"),
                vellum_core::TurnPart::ToolInvocation { id, content } => {
                    println!("  {} {id} {content}", "call".yellow())
                }
                vellum_core::TurnPart::ToolOutcome { id, content } => {
                    println!("  {} {id} {content}", "result".blue())
                }
            }
        }
    }
    println!(
        "{}: {} tokens (hint: {})",
        "total".white().bold(),
        view.total_tokens,
        view.compaction_hint
    );
    Ok(())
}

async fn run_compact(substrate: &Substrate, force: bool) -> anyhow::Result<()> {
    let summarizer = StubSummarizer::default();
    let compaction_cfg = CompactionConfig::default();
    let distill_cfg = DistillConfig {
        force,
        ..Default::default()
    };
    let cancel = vellum_core::CancelToken::new();

    let result = vellum_core::run_compaction_worker(
        &substrate.temporal,
        &substrate.background,
        &summarizer,
        None,
        &distill_cfg,
        &compaction_cfg,
        &cancel,
    )
    .await?;

    println!(
        "{} {} distillations over {} turns ({} -> {} tokens)",
        "compacted".green().bold(),
        result.distillations_created,
        result.turns_used,
        result.tokens_before,
        result.tokens_after,
    );
    for warning in &result.warnings {
        println!("  {} {warning}", "warning:".yellow());
    }
    Ok(())
}

fn run_ltm(substrate: &Substrate, command: LtmCommands) -> anyhow::Result<()> {
    let ltm = &substrate.ltm;
    match command {
        LtmCommands::Create { slug, title, body, parent } => {
            let entry = ltm.create(&slug, parent.as_deref(), title, body, Vec::new(), AgentRole::Main.as_str())?;
            println!("{} {} (path {})", "created".green().bold(), entry.slug, entry.path);
        }
        LtmCommands::Read { slug } => match ltm.read(&slug)? {
            Some(entry) => println!("{}\n\n{}", entry.title.bold(), entry.body),
            None => println!("{}", "not found".red()),
        },
        LtmCommands::Update { slug, body, version } => {
            let entry = ltm.update(&slug, body, version, AgentRole::Main.as_str())?;
            println!("{} now at version {}", "updated".green().bold(), entry.version);
        }
        LtmCommands::Edit { slug, old_text, new_text, version } => {
            let entry = ltm.edit(&slug, &old_text, &new_text, version, AgentRole::Main.as_str())?;
            println!("{} now at version {}", "edited".green().bold(), entry.version);
        }
        LtmCommands::Reparent { slug, new_parent, version } => {
            let entry = ltm.reparent(&slug, new_parent.as_deref(), version, AgentRole::Main.as_str())?;
            println!("{} to {}", "reparented".green().bold(), entry.path);
        }
        LtmCommands::Rename { slug, new_slug, version } => {
            let entry = ltm.rename(&slug, &new_slug, version, AgentRole::Main.as_str())?;
            println!("{} to {}", "renamed".green().bold(), entry.path);
        }
        LtmCommands::Archive { slug, version } => {
            ltm.archive(&slug, version)?;
            println!("{} {}", "archived".green().bold(), slug);
        }
        LtmCommands::Glob { pattern, max_depth } => {
            for entry in ltm.glob(&pattern, max_depth)? {
                println!("{}  {}", entry.path, entry.title.dimmed());
            }
        }
        LtmCommands::Search { query, path_prefix } => {
            for hit in ltm.search(&query, path_prefix.as_deref())? {
                println!("{}  score={}", hit.entry.path, hit.score);
            }
        }
        LtmCommands::Children { parent } => {
            for entry in ltm.get_children(parent.as_deref())? {
                println!("{}  {}", entry.slug, entry.title.dimmed());
            }
        }
    }
    Ok(())
}

fn run_queue(substrate: &Substrate, command: QueueCommands) -> anyhow::Result<()> {
    let background = &substrate.background;
    match command {
        QueueCommands::Workers => {
            for worker in background.get_all_workers()? {
                println!(
                    "{}  {}  {:?}{}",
                    worker.id,
                    worker.kind,
                    worker.status,
                    worker.error.map(|e| format!("  ({e})")).unwrap_or_default()
                );
            }
        }
        QueueCommands::Reports => {
            for report in background.get_unsurfaced()? {
                println!("{}  [{}] {}", report.id, report.subsystem, report.report);
            }
        }
        QueueCommands::Drain => {
            for entry in background.drain_queue()? {
                println!("{}  task={}  {}", entry.id, entry.task_id, entry.content);
            }
        }
        QueueCommands::Alarms { include_fired } => {
            for alarm in background.list_alarms(include_fired)? {
                println!("{}  fires_at={}  {}", alarm.id, alarm.fires_at, alarm.note);
            }
        }
    }
    Ok(())
}

//! Prompt Bench CLI
//!
//! Runs the answer, evaluate and render stages against the configured models.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use prompt_bench::{
    config::Config,
    eval::{CancelFlag, Judge, Selection, TestSuite, evaluate_answers, generate_answers},
    llm::LlmClient,
    persistence::AnswerStore,
    report::{print_report, write_html_report},
};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};

/// Prompt Bench - test models on prompt files and compare against reference answers
#[derive(Parser)]
#[command(name = "prompt-bench")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Stages to run, comma-separated (answer, evaluate, render)
    #[arg(
        short,
        long,
        value_enum,
        value_delimiter = ',',
        default_values = ["answer", "evaluate", "render"]
    )]
    actions: Vec<Action>,

    /// Glob pattern to filter prompt files (e.g., '*CODE*')
    #[arg(short, long, default_value = "*")]
    pattern: String,

    /// Also write an HTML report to this path (render stage)
    #[arg(long)]
    html: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Action {
    /// Query the models and save their answers
    Answer,
    /// Grade saved answers
    Evaluate,
    /// Print tables for graded results
    Render,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    let cli = Cli::parse();

    let config = Config::load().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let suite = TestSuite::discover(&config.prompt_dir, &config.answer_dir, &cli.pattern)
        .context("Failed to scan prompt directory")?;
    if suite.is_empty() {
        warn!(pattern = %cli.pattern, "no test cases matched");
    }
    let selection = Selection::new(&config.models, &suite);

    let store = AnswerStore::new(&config.output_dir);
    let client = LlmClient::new(&config).context("Failed to create HTTP client")?;
    let cancel = install_interrupt_handler();

    let start = Instant::now();

    if cli.actions.contains(&Action::Answer) {
        cmd_answer(&config, &client, &suite, &store, &cancel).await?;
    }
    if cli.actions.contains(&Action::Evaluate) {
        cmd_evaluate(&config, &client, &selection, &store).await?;
    }
    if cli.actions.contains(&Action::Render) {
        cmd_render(&config, &selection, &store, cli.html.as_deref())?;
    } else if cli.html.is_some() {
        warn!("--html is only used by the render action; ignoring");
    }

    info!("finished in {:.2?}", start.elapsed());
    Ok(())
}

/// First Ctrl-C stops the run after the in-flight request; the second exits.
fn install_interrupt_handler() -> CancelFlag {
    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    tokio::spawn(async move {
        while tokio::signal::ctrl_c().await.is_ok() {
            if flag.is_cancelled() {
                std::process::exit(130);
            }
            warn!("interrupt received, finishing current request (press Ctrl-C again to abort)");
            flag.cancel();
        }
    });
    cancel
}

async fn cmd_answer(
    config: &Config,
    client: &LlmClient,
    suite: &TestSuite,
    store: &AnswerStore,
    cancel: &CancelFlag,
) -> Result<()> {
    println!(
        "Found {} test cases in {} ({} skipped without answer)",
        suite.len(),
        config.prompt_dir.display(),
        suite.skipped.len()
    );
    println!("Endpoint: {}", client.endpoint());
    println!("Models: {}", config.models.join(", "));

    generate_answers(client, &config.models, suite, store, cancel)
        .await
        .context("Failed to save generated answers")?;
    Ok(())
}

async fn cmd_evaluate(
    config: &Config,
    client: &LlmClient,
    selection: &Selection<'_>,
    store: &AnswerStore,
) -> Result<()> {
    let judge = Judge::new(client, config.evaluator.clone());
    println!("\nEvaluating with {}", judge.method());

    evaluate_answers(&judge, store, selection)
        .await
        .context("Evaluation failed")?;
    Ok(())
}

fn cmd_render(
    config: &Config,
    selection: &Selection<'_>,
    store: &AnswerStore,
    html: Option<&std::path::Path>,
) -> Result<()> {
    let records = selection.apply(
        store
            .load_evaluated()
            .context("Failed to load evaluated results")?,
    );

    print_report(&records, &config.models);

    if let Some(path) = html {
        write_html_report(&records, &config.models, path).context("Failed to write HTML report")?;
        println!("\nHTML report saved to: {}", path.display());
    }
    Ok(())
}

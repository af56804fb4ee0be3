//! `covenant`: draft a contract from identity documents in a folder.

mod config;
mod console;
mod logging;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use covenant_core::{list_documents, DocumentKind, TemplateStore};
use covenant_runtime::{
    ContractWorkflow, FallbackStrategy, FileTextExtractor, GenerativeService, HumanInterface,
    PlannerMode, ProviderRegistry, SelectionMode, WorkflowMode, WorkflowOutcome,
};

use crate::config::AppConfig;
use crate::console::{wait_for_enter, AnswerFileHuman, ConsoleHuman};

#[derive(Parser, Debug)]
#[command(
    name = "covenant",
    version,
    about = "Draft contracts from identity documents with a human in the loop"
)]
struct Cli {
    /// YAML config file (default: ./covenant.yaml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the drafting workflow
    Run(RunArgs),

    /// List the documents that would be processed
    Documents {
        #[arg(long, env = "DATA_FOLDER")]
        data: Option<PathBuf>,
    },

    /// List the available contract templates
    Templates {
        #[arg(long)]
        templates: Option<PathBuf>,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// Folder with identity documents
    #[arg(long, env = "DATA_FOLDER")]
    pub data: Option<PathBuf>,

    /// Folder with contract templates
    #[arg(long)]
    pub templates: Option<PathBuf>,

    /// Folder the finished contract is written to
    #[arg(long)]
    pub output: Option<PathBuf>,

    /// guided | agent
    #[arg(long)]
    pub mode: Option<WorkflowMode>,

    /// menu | assisted
    #[arg(long)]
    pub type_selection: Option<SelectionMode>,

    /// menu | assisted
    #[arg(long)]
    pub role_selection: Option<SelectionMode>,

    /// fixed | assisted (agent mode only)
    #[arg(long)]
    pub planner: Option<PlannerMode>,

    /// fail | deterministic
    #[arg(long)]
    pub fallback: Option<FallbackStrategy>,

    /// Also collect a phone number and an identity-document path for every person
    #[arg(long)]
    pub strict: bool,

    /// Read answers from a file, one per line, instead of the console
    #[arg(long)]
    pub answers: Option<PathBuf>,

    /// Do not write the contract to the output folder
    #[arg(long)]
    pub no_save: bool,

    /// Exit without waiting for Enter
    #[arg(long)]
    pub no_pause: bool,

    #[arg(long)]
    pub provider: Option<String>,

    #[arg(long)]
    pub model: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    logging::init_tracing();
    let cli = Cli::parse();

    let pause = matches!(&cli.command, Commands::Run(args) if !args.no_pause);
    let result = dispatch(cli).await;

    let code = match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = ?e, "Run failed");
            eprintln!("Error: {:#}", e);
            eprintln!("Details were logged to {}", logging::log_path().display());
            ExitCode::FAILURE
        }
    };

    if pause {
        wait_for_enter();
    }
    code
}

async fn dispatch(cli: Cli) -> Result<()> {
    let mut config = AppConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Run(args) => {
            config.apply(&args);
            run(&config, &args).await
        }
        Commands::Documents { data } => {
            let dir = data.unwrap_or(config.documents_dir);
            show_documents(&dir)
        }
        Commands::Templates { templates } => {
            let dir = templates.unwrap_or(config.templates_dir);
            show_templates(&dir)
        }
    }
}

async fn run(config: &AppConfig, args: &RunArgs) -> Result<()> {
    tracing::info!(
        mode = %config.runtime.workflow.mode,
        documents = %config.documents_dir.display(),
        templates = %config.templates_dir.display(),
        "Starting workflow"
    );

    let templates = TemplateStore::load(&config.templates_dir)
        .with_context(|| format!("Could not load templates from {}", config.templates_dir.display()))?;

    let provider = ProviderRegistry::with_defaults()
        .create(&config.provider.kind, &config.provider.factory_config())
        .context("Could not set up the generative provider")?;
    let service = Arc::new(GenerativeService::new(provider, &config.runtime));
    tracing::info!(
        provider = service.provider_name(),
        model = %config.runtime.completion.model,
        "Generative provider ready"
    );
    let extractor = Arc::new(FileTextExtractor::new(config.runtime.extraction.clone()));

    let human: Arc<dyn HumanInterface> = match &args.answers {
        Some(path) => Arc::new(
            AnswerFileHuman::load(path)
                .with_context(|| format!("Could not read answers from {}", path.display()))?,
        ),
        None => Arc::new(ConsoleHuman::new()),
    };

    let mut workflow = ContractWorkflow::new(
        Arc::clone(&service),
        extractor,
        human,
        templates,
        config.runtime.workflow.clone(),
    )
    .with_documents_dir(&config.documents_dir);
    if !args.no_save {
        workflow = workflow.with_output_dir(&config.output_dir);
    }

    let outcome = workflow.run().await?;
    report(&outcome);
    Ok(())
}

fn report(outcome: &WorkflowOutcome) {
    println!();
    match outcome.contract() {
        Some(contract) if outcome.is_complete() => {
            println!("===== {} =====", contract.contract_type.display_name());
            println!("{}", contract.text);
            println!("==========");
        }
        _ => {
            let reason = outcome.state.abort_reason().unwrap_or("unknown reason");
            println!("Workflow stopped: {}", reason);
        }
    }

    let failures = &outcome.state.document_failures;
    if !failures.is_empty() {
        println!("{} document(s) were skipped:", failures.len());
        for failure in failures {
            println!("  {}", failure);
        }
    }

    println!("{}", outcome.usage);
    tracing::info!(
        stage = outcome.state.stage().as_str(),
        saved_to = ?outcome.saved_to,
        "Workflow finished"
    );
}

fn show_documents(dir: &Path) -> Result<()> {
    let documents = list_documents(dir)?;
    if documents.is_empty() {
        println!("No supported documents in {}", dir.display());
        return Ok(());
    }
    for path in documents {
        let kind = match DocumentKind::from_path(&path) {
            DocumentKind::Pdf => "pdf",
            DocumentKind::Image => "image",
            DocumentKind::Text => "text",
        };
        println!("{:<6} {}", kind, path.display());
    }
    Ok(())
}

fn show_templates(dir: &Path) -> Result<()> {
    let store = TemplateStore::load(dir)
        .with_context(|| format!("Could not load templates from {}", dir.display()))?;
    for key in store.keys() {
        let Some(template) = store.get(&key) else {
            continue;
        };
        let placeholders: Vec<String> = template.placeholders().into_iter().collect();
        println!("{:<24} {}", key, template.title());
        println!("{:<24} placeholders: {}", "", placeholders.join(", "));
    }
    Ok(())
}

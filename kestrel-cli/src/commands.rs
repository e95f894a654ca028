//! CLI subcommand handlers.

use crate::render;
use crate::{Commands, ConfigAction, OutputFormat, ToolsAction};
use kestrel_core::config::{KestrelConfig, load_config, load_config_file, render_config};
use kestrel_core::patches::{PatchCategory, build_bundle_yaml, build_bundle_yaml_for_nodepool};
use kestrel_core::providers::create_generator;
use kestrel_core::types::{AnalysisInput, AnalysisOptions, AnalysisReport};
use kestrel_ml::tools::rag_tools::{RETRIEVE_DOCS, RetrieveDocsOutput};
use kestrel_ml::{KnowledgeBase, Orchestrator, register_rag_tools};
use kestrel_tools::register_builtin_tools;
use kestrel_tools::registry::ToolRegistry;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Handle a CLI subcommand.
pub async fn handle_command(
    command: Commands,
    workspace: &Path,
    config_path: Option<&Path>,
) -> anyhow::Result<()> {
    let config = load(workspace, config_path)?;
    match command {
        Commands::Analyze {
            files,
            region,
            explain,
            evaluate,
            summary,
            format,
        } => {
            let options = AnalysisOptions {
                enable_explanations: explain || evaluate || config.pipeline.enable_explanations,
                enable_evaluator: evaluate || config.pipeline.enable_evaluator,
                enable_summary: summary || config.pipeline.enable_summary,
            };
            handle_analyze(&config, workspace, &files, region, options, format).await
        }
        Commands::Search { query, top_k } => {
            handle_search(&config, workspace, &query, top_k).await
        }
        Commands::Bundle {
            files,
            nodepool,
            category,
        } => handle_bundle(&config, workspace, &files, nodepool.as_deref(), &category).await,
        Commands::Config { action } => handle_config(action, &config),
        Commands::Tools { action } => handle_tools(action, &config, workspace).await,
    }
}

fn load(workspace: &Path, config_path: Option<&Path>) -> anyhow::Result<KestrelConfig> {
    let config = match config_path {
        Some(path) => load_config_file(path),
        None => load_config(Some(workspace), None),
    };
    config.map_err(|e| anyhow::anyhow!("Configuration error: {}", e))
}

/// Resolve a possibly relative path against the workspace.
fn resolve(workspace: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        workspace.join(path)
    }
}

fn knowledge_base(config: &KestrelConfig, workspace: &Path) -> Arc<KnowledgeBase> {
    Arc::new(KnowledgeBase::new(
        resolve(workspace, &config.rag.knowledge_path),
        config.rag.max_chunk_chars,
    ))
}

/// Read every file and join their documents into one YAML stream.
fn read_documents(workspace: &Path, files: &[PathBuf]) -> anyhow::Result<String> {
    let mut documents = Vec::with_capacity(files.len());
    for file in files {
        let path = resolve(workspace, file);
        let text = std::fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("Failed to read '{}': {}", path.display(), e))?;
        documents.push(text);
    }
    Ok(documents.join("\n---\n"))
}

async fn run_analysis(
    config: &KestrelConfig,
    workspace: &Path,
    files: &[PathBuf],
    region: Option<String>,
    options: AnalysisOptions,
) -> anyhow::Result<AnalysisReport> {
    let yaml_text = read_documents(workspace, files)?;

    let generator = if options.enable_explanations || options.enable_summary {
        create_generator(&config.llm).unwrap_or_else(|e| {
            warn!(error = %e, "Text generation unavailable; using templated explanations");
            None
        })
    } else {
        None
    };
    if options.enable_summary && generator.is_none() {
        warn!("--summary needs an API key; the narrative will be skipped");
    }

    let orchestrator = Orchestrator::from_config(config, knowledge_base(config, workspace), generator);
    let mut input = AnalysisInput::new(yaml_text).with_options(options);
    if let Some(region) = region.or_else(|| config.pipeline.region.clone()) {
        input = input.with_region(region);
    }

    let report = orchestrator.run(input).await;
    info!(
        findings = report.findings.len(),
        health_score = report.health_score,
        "Analysis finished"
    );
    Ok(report)
}

async fn handle_analyze(
    config: &KestrelConfig,
    workspace: &Path,
    files: &[PathBuf],
    region: Option<String>,
    options: AnalysisOptions,
    format: OutputFormat,
) -> anyhow::Result<()> {
    let report = run_analysis(config, workspace, files, region, options).await?;
    match format {
        OutputFormat::Text => print!("{}", render::report_text(&report)),
        OutputFormat::Json => println!("{}", render::report_json(&report)?),
    }
    Ok(())
}

async fn handle_search(
    config: &KestrelConfig,
    workspace: &Path,
    query: &str,
    top_k: Option<usize>,
) -> anyhow::Result<()> {
    let registry = tool_registry(config, workspace)?;
    let args = serde_json::json!({
        "query": query,
        "top_k": top_k.unwrap_or(config.rag.top_k),
    });
    let output = registry.execute(RETRIEVE_DOCS, args).await?;
    let output: RetrieveDocsOutput = serde_json::from_value(output.data)?;
    print!("{}", render::contexts_text(&output.contexts));
    Ok(())
}

/// Built-in config tools plus retrieval over the configured corpus.
fn tool_registry(config: &KestrelConfig, workspace: &Path) -> anyhow::Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    register_builtin_tools(&mut registry)?;
    register_rag_tools(&mut registry, &knowledge_base(config, workspace))?;
    Ok(registry)
}

fn parse_categories(raw: &[String]) -> anyhow::Result<Option<BTreeSet<PatchCategory>>> {
    if raw.is_empty() {
        return Ok(None);
    }
    raw.iter()
        .map(|s| s.parse::<PatchCategory>().map_err(|e| anyhow::anyhow!(e)))
        .collect::<anyhow::Result<BTreeSet<_>>>()
        .map(Some)
}

async fn handle_bundle(
    config: &KestrelConfig,
    workspace: &Path,
    files: &[PathBuf],
    nodepool: Option<&str>,
    categories: &[String],
) -> anyhow::Result<()> {
    let categories = parse_categories(categories)?;
    let report = run_analysis(
        config,
        workspace,
        files,
        None,
        AnalysisOptions::default(),
    )
    .await?;
    if !report.parse_errors.is_empty() {
        anyhow::bail!(
            "Configuration could not be parsed: {}",
            render::parse_errors_line(&report)
        );
    }

    let bundle = match nodepool {
        Some(name) => build_bundle_yaml_for_nodepool(&report, name, categories.as_ref()),
        None => build_bundle_yaml(&report, categories.as_ref()),
    };
    if bundle.is_empty() {
        eprintln!("No patches for the selected categories.");
    } else {
        println!("{}", bundle);
    }
    Ok(())
}

async fn handle_tools(
    action: ToolsAction,
    config: &KestrelConfig,
    workspace: &Path,
) -> anyhow::Result<()> {
    let registry = tool_registry(config, workspace)?;
    match action {
        ToolsAction::List => {
            for definition in registry.list_definitions() {
                println!("{}\n  {}", definition.name, definition.description);
                println!("  parameters: {}", definition.parameters);
            }
        }
        ToolsAction::Call { name, args } => {
            let args: serde_json::Value = serde_json::from_str(&args)
                .map_err(|e| anyhow::anyhow!("--args is not valid JSON: {}", e))?;
            let output = registry.execute(&name, args).await?;
            println!("{}", output.content);
            if !output.data.is_null() {
                println!("{}", serde_json::to_string_pretty(&output.data)?);
            }
        }
    }
    Ok(())
}

fn handle_config(action: ConfigAction, config: &KestrelConfig) -> anyhow::Result<()> {
    match action {
        ConfigAction::Show => {
            let rendered =
                render_config(config).map_err(|e| anyhow::anyhow!("Failed to render config: {}", e))?;
            println!("{}", rendered);
            Ok(())
        }
    }
}

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use reasongraph_ai::{FixedJudge, LLMProviderFactory, LlmSemanticJudge, SemanticJudge};
use reasongraph_core::{ConfigManager, LoggingConfig, NodeStore, ReasonGraphConfig};
use reasongraph_graph::{
    EquivalentPair, GraphPruner, NodeAnalyzer, PruningStatistics, SimilarityStatistics,
};
use reasongraph_vector::{create_embedding_provider, EmbeddingGenerator, HashingEmbeddingProvider};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "reasongraph")]
#[command(about = "ReasonGraph CLI - Detect and prune equivalent nodes in reasoning graphs", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (defaults to ./.reasongraph.toml or ~/.reasongraph/config.toml)
    #[arg(short, long, global = true, env = "REASONGRAPH_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find equivalent nodes and merge them
    Prune {
        /// Graph JSON file
        input: PathBuf,

        /// Where to write the pruned graph (defaults to <input>_pruned.json)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Combined similarity needed before the judge is asked
        #[arg(long)]
        threshold: Option<f32>,

        /// Nearest neighbours considered per node
        #[arg(long)]
        max_candidates: Option<usize>,

        /// Only list equivalent pairs; write nothing
        #[arg(long)]
        dry_run: bool,
    },

    /// Node counts by type, without calling any service
    Stats {
        /// Graph JSON file
        input: PathBuf,

        /// Print machine-readable JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Show the nearest candidates of one node with their scores
    Candidates {
        /// Graph JSON file
        input: PathBuf,

        /// Node to inspect
        node_id: String,

        /// Number of candidates to show
        #[arg(short = 'k', long, default_value = "5")]
        top_k: usize,
    },

    /// Score two nodes and ask the judge if they clear the threshold
    Compare {
        /// Graph JSON file
        input: PathBuf,

        /// First node
        a: String,

        /// Second node
        b: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{} {:#}", "Error:".red().bold(), e);
            std::process::exit(1);
        }
    };
    init_logging(&config.logging, cli.verbose);

    if let Err(e) = execute_command(&cli, config).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<ReasonGraphConfig> {
    let manager = match path {
        Some(path) => ConfigManager::from_file(path),
        None => ConfigManager::load(),
    }
    .context("Failed to load configuration")?;
    Ok(manager.into_config())
}

/// Logs go to stderr so stdout stays clean for results. `RUST_LOG` wins over
/// the configured level.
fn init_logging(config: &LoggingConfig, verbose: bool) {
    let level = if verbose { "debug" } else { config.level.as_str() };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let registry = tracing_subscriber::registry().with(filter);

    match config.format.as_str() {
        "json" => registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init(),
        "compact" => registry
            .with(fmt::layer().compact().with_writer(std::io::stderr))
            .init(),
        _ => registry
            .with(fmt::layer().pretty().with_writer(std::io::stderr))
            .init(),
    }
}

async fn execute_command(cli: &Cli, mut config: ReasonGraphConfig) -> Result<()> {
    match &cli.command {
        Commands::Prune {
            input,
            output,
            threshold,
            max_candidates,
            dry_run,
        } => {
            apply_overrides(&mut config, *threshold, *max_candidates)?;
            execute_prune(&config, input, output.as_deref(), *dry_run).await
        }
        Commands::Stats { input, json } => execute_stats(&config, input, *json),
        Commands::Candidates {
            input,
            node_id,
            top_k,
        } => execute_candidates(&config, input, node_id, *top_k).await,
        Commands::Compare { input, a, b } => execute_compare(&config, input, a, b).await,
    }
}

fn apply_overrides(
    config: &mut ReasonGraphConfig,
    threshold: Option<f32>,
    max_candidates: Option<usize>,
) -> Result<()> {
    if let Some(threshold) = threshold {
        config.analysis.similarity_threshold = threshold;
    }
    if let Some(max_candidates) = max_candidates {
        config.analysis.max_candidates = max_candidates;
    }
    ConfigManager::validate_config(config).context("Invalid command line override")?;
    Ok(())
}

fn load_graph(input: &Path) -> Result<NodeStore> {
    let store = NodeStore::from_json_file(input)
        .with_context(|| format!("Failed to load graph from {}", input.display()))?;
    info!("Loaded {} nodes from {}", store.len(), input.display());
    Ok(store)
}

fn build_judge(config: &ReasonGraphConfig) -> Result<Arc<dyn SemanticJudge>> {
    let provider = LLMProviderFactory::create_from_config(&config.llm)
        .context("Failed to create LLM provider for the equivalence judge")?;
    Ok(Arc::new(LlmSemanticJudge::from_config(provider, &config.llm)))
}

fn build_analyzer(
    config: &ReasonGraphConfig,
    store: NodeStore,
    judge: Arc<dyn SemanticJudge>,
) -> Result<NodeAnalyzer> {
    let provider = create_embedding_provider(&config.embedding)
        .context("Failed to create embedding provider")?;
    let embeddings = EmbeddingGenerator::with_batch_size(provider, config.embedding.batch_size);
    Ok(NodeAnalyzer::new(
        store,
        embeddings,
        judge,
        config.analysis.clone(),
    ))
}

fn default_output_path(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "graph".to_string());
    input.with_file_name(format!("{}_pruned.json", stem))
}

async fn execute_prune(
    config: &ReasonGraphConfig,
    input: &Path,
    output: Option<&Path>,
    dry_run: bool,
) -> Result<()> {
    let store = load_graph(input)?;
    let analyzer = build_analyzer(config, store, build_judge(config)?)?;
    let mut pruner = GraphPruner::new(analyzer);

    println!(
        "{} {} (threshold {:.2}, {} candidates per node)",
        "🔍 Scanning".cyan().bold(),
        input.display(),
        config.analysis.similarity_threshold,
        config.analysis.max_candidates
    );

    if dry_run {
        let pairs = pruner
            .analyzer_mut()
            .find_equivalent_pairs()
            .await
            .context("Equivalence scan failed")?;
        print_pairs(&pairs);
        println!("{}", "Dry run: no merges applied, nothing written".yellow());
        return Ok(());
    }

    let merged = pruner
        .prune_equivalent_nodes()
        .await
        .context("Pruning failed")?;

    let output = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| default_output_path(input));
    let json = pruner.export_pruned_graph().to_json_string_pretty()?;
    std::fs::write(&output, json)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "{} {} nodes merged, pruned graph written to {}",
        "✅".green(),
        merged.to_string().bold(),
        output.display()
    );
    print_pruning_statistics(&pruner.pruning_statistics());
    Ok(())
}

fn execute_stats(config: &ReasonGraphConfig, input: &Path, json: bool) -> Result<()> {
    let store = load_graph(input)?;
    // Neither statistic touches the embedding service or the judge
    let analyzer = NodeAnalyzer::new(
        store,
        EmbeddingGenerator::new(Arc::new(HashingEmbeddingProvider::new(
            config.embedding.dimension,
        ))),
        Arc::new(FixedJudge::reject_all()),
        config.analysis.clone(),
    );
    let similarity = analyzer.similarity_statistics();
    let pruning = GraphPruner::new(analyzer).pruning_statistics();

    if json {
        let report = serde_json::json!({
            "nodes": similarity,
            "pruning": pruning,
        });
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_similarity_statistics(&similarity);
        print_pruning_statistics(&pruning);
    }
    Ok(())
}

async fn execute_candidates(
    config: &ReasonGraphConfig,
    input: &Path,
    node_id: &str,
    top_k: usize,
) -> Result<()> {
    let store = load_graph(input)?;
    if !store.contains(node_id) {
        anyhow::bail!("Node not found: {}", node_id);
    }
    // Candidate analysis scores pairs but never asks the judge
    let mut analyzer = build_analyzer(config, store, Arc::new(FixedJudge::reject_all()))?;
    let rows = analyzer
        .analyze_candidates(node_id, top_k)
        .await
        .context("Candidate analysis failed")?;

    if rows.is_empty() {
        println!("{}", "No candidates (node is pruned or graph too small)".yellow());
        return Ok(());
    }

    println!(
        "{:<24} {:>6} {:>9} {:>9}  {:<10} {:>5}  {}",
        "CANDIDATE".bold(),
        "NODE".bold(),
        "CHILDREN".bold(),
        "COMBINED".bold(),
        "TYPE".bold(),
        "DEPTH".bold(),
        "SUMMARY".bold()
    );
    for row in rows {
        let combined = format!("{:>9.3}", row.combined_similarity);
        println!(
            "{:<24} {:>6.3} {:>9.3} {}  {:<10} {:>5}  {}",
            row.candidate_id,
            row.node_similarity,
            row.children_similarity,
            if row.above_threshold {
                combined.green().bold()
            } else {
                combined.normal()
            },
            row.node_type.to_string(),
            row.depth,
            row.candidate_summary
        );
    }
    Ok(())
}

async fn execute_compare(config: &ReasonGraphConfig, input: &Path, a: &str, b: &str) -> Result<()> {
    let store = load_graph(input)?;
    for id in [a, b] {
        if !store.contains(id) {
            anyhow::bail!("Node not found: {}", id);
        }
    }
    let mut analyzer = build_analyzer(config, store, build_judge(config)?)?;

    let Some(score) = analyzer
        .similarity_score(a, b)
        .await
        .context("Similarity scoring failed")?
    else {
        println!("{}", "One of the nodes is pruned and has no embedding".yellow());
        return Ok(());
    };

    println!("{:<22} {:.4}", "Node similarity:", score.node);
    println!("{:<22} {:.4}", "Children similarity:", score.children);
    println!("{:<22} {:.4}", "Combined similarity:", score.combined);

    let threshold = config.analysis.similarity_threshold;
    if score.combined < threshold {
        println!(
            "{} below threshold {:.2}; judge not consulted",
            "✗".red(),
            threshold
        );
        return Ok(());
    }

    if analyzer.are_nodes_equivalent(a, b).await? {
        println!("{} {} and {} are equivalent", "✓".green().bold(), a, b);
    } else {
        println!("{} judge says {} and {} are not equivalent", "✗".red(), a, b);
    }
    Ok(())
}

fn print_pairs(pairs: &[EquivalentPair]) {
    if pairs.is_empty() {
        println!("{}", "No equivalent pairs found".yellow());
        return;
    }
    println!("{} {}", pairs.len().to_string().bold(), "equivalent pairs:".cyan());
    for pair in pairs {
        println!("  {} ≡ {}  ({:.3})", pair.first, pair.second, pair.similarity);
    }
}

fn print_similarity_statistics(stats: &SimilarityStatistics) {
    println!("{}", "Nodes".cyan().bold());
    println!("  total:  {}", stats.total_nodes);
    println!("  active: {}", stats.active_nodes);
    for (node_type, counts) in &stats.by_node_type {
        println!(
            "  {:<12} {} total, {} active",
            node_type, counts.total, counts.active
        );
    }
}

fn print_pruning_statistics(stats: &PruningStatistics) {
    println!("{}", "Pruning".cyan().bold());
    println!("  pruned: {}", stats.pruned_nodes);
    println!("  active: {}", stats.active_nodes);
    println!("  ratio:  {:.1}%", stats.pruning_ratio * 100.0);
    for (node_type, counts) in &stats.by_node_type {
        println!(
            "  {:<12} {} total, {} pruned",
            node_type, counts.total, counts.pruned
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn prune_flags_parse() {
        let cli = Cli::try_parse_from([
            "reasongraph",
            "prune",
            "graph.json",
            "--threshold",
            "0.9",
            "--max-candidates",
            "5",
            "--dry-run",
        ])
        .unwrap();
        match cli.command {
            Commands::Prune {
                input,
                threshold,
                max_candidates,
                dry_run,
                output,
            } => {
                assert_eq!(input, PathBuf::from("graph.json"));
                assert_eq!(threshold, Some(0.9));
                assert_eq!(max_candidates, Some(5));
                assert!(dry_run);
                assert!(output.is_none());
            }
            _ => panic!("expected prune"),
        }
    }

    #[test]
    fn output_defaults_next_to_input() {
        assert_eq!(
            default_output_path(Path::new("/data/freedom.json")),
            PathBuf::from("/data/freedom_pruned.json")
        );
    }

    #[test]
    fn overrides_are_validated() {
        let mut config = ReasonGraphConfig::default();
        apply_overrides(&mut config, Some(0.9), Some(3)).unwrap();
        assert_eq!(config.analysis.similarity_threshold, 0.9);
        assert_eq!(config.analysis.max_candidates, 3);

        assert!(apply_overrides(&mut config, Some(1.5), None).is_err());
        assert!(apply_overrides(&mut ReasonGraphConfig::default(), None, Some(0)).is_err());
    }

    #[test]
    fn graph_file_loads_with_context_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("graph.json");
        std::fs::write(
            &path,
            r#"{"q": {"summary": "Q", "content": "", "node_type": "question"}}"#,
        )
        .unwrap();
        assert_eq!(load_graph(&path).unwrap().len(), 1);

        let missing = dir.path().join("missing.json");
        let err = load_graph(&missing).unwrap_err();
        assert!(format!("{:#}", err).contains("missing.json"));
    }

    #[test]
    fn demo_graph_loads() {
        let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/freedom.json");
        let store = load_graph(&path).unwrap();
        assert_eq!(store.len(), 6);
        assert_eq!(store.get("root-question").unwrap().children.len(), 3);
        assert!(store.get("root-question").unwrap().is_central_question);
    }
}

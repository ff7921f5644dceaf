use std::env;
use std::path::PathBuf;

use anyhow::Context;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ragdb_core::config::{resolve_with_base, Config, Settings};
use ragdb_core::data_processor::DataProcessor;
use ragdb_hybrid::HybridSearchEngine;

const USAGE: &str = "Usage: ragdb <ingest [dir] | query \"<text>\" [--k N] | status | clear>";

fn parse_args() -> (String, Vec<String>) {
    let mut args: Vec<String> = env::args().skip(1).collect();
    if args.is_empty() { eprintln!("{USAGE}"); std::process::exit(1); }
    let cmd = args.remove(0);
    (cmd, args)
}

/// `query` arguments: the text, plus an optional `--k N`.
fn parse_query_args(args: &[String], default_k: usize) -> anyhow::Result<(String, usize)> {
    let mut text = None;
    let mut k = default_k;
    let mut it = args.iter();
    while let Some(arg) = it.next() {
        match arg.as_str() {
            "--k" | "-k" => {
                let raw = it.next().context("--k needs a value")?;
                k = raw.parse().with_context(|| format!("invalid --k value `{raw}`"))?;
            }
            _ if text.is_none() => text = Some(arg.clone()),
            other => anyhow::bail!("unexpected argument `{other}`"),
        }
    }
    Ok((text.context("missing query text")?, k))
}

fn snippet(text: &str, max_chars: usize) -> String {
    let flat: String = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.chars().count() <= max_chars { return flat; }
    let mut cut: String = flat.chars().take(max_chars).collect();
    cut.push('…');
    cut
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = Config::load().map_err(|e| { eprintln!("Error loading config: {}", e); e })?;
    let settings: Settings = config.settings()?;
    let (cmd, args) = parse_args();
    let base = env::current_dir()?;
    let engine = HybridSearchEngine::from_settings(&settings, &base)?;

    let cancel = CancellationToken::new();
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(async {
        let on_ctrl_c = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() { on_ctrl_c.cancel(); }
        });

        match cmd.as_str() {
            "ingest" => {
                let data_dir = args.first().map(PathBuf::from).unwrap_or_else(|| resolve_with_base(&base, &settings.data.raw_txt_dir));
                println!("Ingesting from {}", data_dir.display());
                let documents = DataProcessor::new().process_directory(&data_dir)?;
                let outcome = engine.index(documents, &settings.embedding.to_config(), &cancel).await?;
                for w in &outcome.warnings { eprintln!("warning: {w}"); }
                println!(
                    "Ingest complete: {:?} mode, {} chunks ({} replaced), {} in corpus, generation {}",
                    outcome.mode, outcome.documents, outcome.replaced, outcome.total, outcome.generation
                );
            }
            "query" => {
                let (text, k) = parse_query_args(&args, settings.retrieval.top_k)?;
                let results = engine.retrieve(&text, k, &cancel).await?;
                if results.is_empty() { println!("No results."); }
                for (rank, r) in results.iter().enumerate() {
                    println!("{:>2}. {:.4}  {}\n    {}", rank + 1, r.score, r.id(), snippet(&r.document.text, 120));
                }
            }
            "status" => {
                let status = engine.status().await?;
                println!("root:       {}", status.root.display());
                match status.generation {
                    Some(g) => println!("generation: {g}"),
                    None => println!("generation: none (next ingest builds a new corpus)"),
                }
                println!("documents:  {}", status.documents);
                if let Some(e) = status.embedding { println!("embedding:  {}", e.embed_model); }
            }
            "clear" => {
                engine.clear()?;
                println!("Cleared {}", engine.indexer().layout().root().display());
            }
            _ => { eprintln!("Unknown command: {}\n{}", cmd, USAGE); std::process::exit(1); }
        }
        Ok::<(), anyhow::Error>(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> { raw.iter().map(|s| s.to_string()).collect() }

    #[test]
    fn query_args_accept_k_anywhere() {
        assert_eq!(parse_query_args(&args(&["brown fox"]), 4).unwrap(), ("brown fox".to_string(), 4));
        assert_eq!(parse_query_args(&args(&["--k", "7", "棕色"]), 4).unwrap(), ("棕色".to_string(), 7));
        assert!(parse_query_args(&args(&["fox", "--k"]), 4).is_err());
        assert!(parse_query_args(&args(&[]), 4).is_err());
        assert!(parse_query_args(&args(&["a", "b"]), 4).is_err());
    }

    #[test]
    fn snippets_are_flattened_and_cut() {
        assert_eq!(snippet("a\n\n b", 10), "a b");
        assert_eq!(snippet("快速的棕色狐狸", 2), "快速…");
    }
}

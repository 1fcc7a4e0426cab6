use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use qgen_archive::Archive;
use qgen_ast::{extract_dataset_info, find_dataset, DatasetReference};
use qgen_cache::{cache_root, CacheConfig, Fingerprint};
use qgen_codegen::{parse_request, AstTranslator};
use qgen_config::{init_tracing, load_config, TranslatorConfig};
use serde::Serialize;
use std::io::Read;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "qgen", version, about = "Query code generation with a content-addressed cache")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Generate code for a query and write the zipped result
    Translate(TranslateArgs),
    /// Print the cache key of a query
    Hash(QueryArgs),
    /// Print the dataset a query reads from
    Dataset(QueryArgs),
    /// List the files inside a generated archive
    List(ListArgs),
}

#[derive(Args)]
struct TranslateArgs {
    /// Query text, or `-` to read it from stdin
    query: String,
    /// Code generation backend (`uproot` or `xAOD`); overrides the config file
    #[arg(long)]
    backend: Option<String>,
    /// Cache root; overrides `QGEN_CACHE_DIR` and the config file
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// TOML config file (defaults to `QGEN_CONFIG_PATH`)
    #[arg(long)]
    config: Option<PathBuf>,
    /// Where to write the zip archive
    #[arg(long, default_value = "joined.zip")]
    out: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct QueryArgs {
    /// Query text, or `-` to read it from stdin
    query: String,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct ListArgs {
    /// Zip archive written by `qgen translate`
    archive: PathBuf,
    /// Emit JSON suitable for CI
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct TranslateReport {
    key: String,
    backend: String,
    cache_hit: bool,
    dataset: Option<DatasetReference>,
    files: Vec<String>,
    main_script: Option<String>,
    archive: PathBuf,
    archive_bytes: usize,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Translate(args) => translate(args),
        Command::Hash(args) => {
            let expr = parse_request(&read_query(&args.query)?)?;
            let key = Fingerprint::for_expr(&expr);
            if args.json {
                print_json(&serde_json::json!({ "key": key }))?;
            } else {
                println!("{key}");
            }
            Ok(0)
        }
        Command::Dataset(args) => {
            let expr = parse_request(&read_query(&args.query)?)?;
            let dataset = find_dataset(&expr)
                .map(extract_dataset_info)
                .transpose()?;
            if args.json {
                print_json(&serde_json::json!({ "dataset": dataset }))?;
                return Ok(0);
            }
            match dataset {
                Some(dataset) => {
                    for url in &dataset.urls {
                        println!("{url}");
                    }
                    if let Some(tree) = &dataset.tree_name {
                        println!("tree: {tree}");
                    }
                    Ok(0)
                }
                None => {
                    println!("dataset: none");
                    Ok(1)
                }
            }
        }
        Command::List(args) => {
            let names = Archive::new(&args.archive).names()?;
            if args.json {
                print_json(&names)?;
            } else {
                for name in names {
                    println!("{name}");
                }
            }
            Ok(0)
        }
    }
}

fn translate(args: TranslateArgs) -> Result<i32> {
    let mut config = load_config(args.config.as_deref())?;
    if let Some(backend) = args.backend {
        config.backend = backend;
    }
    init_tracing(&config.logging);

    let root = resolve_cache_root(args.cache_dir, &config)?;
    tracing::debug!(
        target: "qgen.cli",
        backend = %config.backend,
        cache_root = %root.display(),
        "starting translation"
    );
    let translator = AstTranslator::from_config(&config)?;
    let translation = translator.translate(&read_query(&args.query)?, &root)?;

    std::fs::write(&args.out, &translation.archive)
        .with_context(|| format!("failed to write {}", args.out.display()))?;

    let report = TranslateReport {
        key: translation.key.to_string(),
        backend: translation.descriptor.backend.to_string(),
        cache_hit: translation.cache_hit,
        dataset: translation.dataset,
        files: translation.descriptor.files,
        main_script: translation.descriptor.main_script,
        archive: args.out,
        archive_bytes: translation.archive.len(),
    };
    if args.json {
        print_json(&report)?;
    } else {
        println!(
            "{}: {} ({})",
            if report.cache_hit { "cached" } else { "generated" },
            report.key,
            report.backend
        );
        println!(
            "  archive: {} ({} bytes)",
            report.archive.display(),
            report.archive_bytes
        );
        for file in &report.files {
            println!("  file: {file}");
        }
    }
    Ok(0)
}

/// `--cache-dir`, then `QGEN_CACHE_DIR`, then `[cache] root`, then `~/.qgen/cache`.
fn resolve_cache_root(flag: Option<PathBuf>, config: &TranslatorConfig) -> Result<PathBuf> {
    if let Some(root) = flag {
        return Ok(root);
    }
    let mut cache = CacheConfig::from_env();
    if cache.cache_root_override.is_none() {
        cache.cache_root_override = config.cache.root.clone();
    }
    Ok(cache_root(&cache)?)
}

fn read_query(arg: &str) -> Result<String> {
    if arg != "-" {
        return Ok(arg.to_owned());
    }
    let mut text = String::new();
    std::io::stdin()
        .read_to_string(&mut text)
        .context("failed to read query from stdin")?;
    // A trailing newline from `echo` is not part of the query.
    let trimmed = text.trim_end_matches(['\n', '\r']).len();
    text.truncate(trimmed);
    Ok(text)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value)?;
    println!("{out}");
    Ok(())
}

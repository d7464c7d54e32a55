//! factqa CLI
//!
//! - `templates`: list the question/query templates a grammar yields
//! - `sample`: instantiate templates against a JSON fact file and print QA
//!   records as JSON lines
//! - `query`: run a raw goal list against a fact file

use std::collections::BTreeSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use factqa_grammar::{parse_grammar, GeneratorConfig, TemplateCache, TemplateGenerator, TemplatePair};
use factqa_sampler::{
    generate_records, record_seed, sample_with_retries, DifficultyTier, SamplerConfig,
};
use factqa_store::{parse_query, FactDb, FactStore};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "factqa")]
#[command(author, version, about = "Grammar-driven question/answer generation over a fact store")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List the templates derivable from a grammar.
    Templates {
        #[command(flatten)]
        generator: GeneratorArgs,
        /// Print one JSON object per template instead of text
        #[arg(long)]
        json: bool,
    },

    /// Sample QA records (JSON lines on stdout).
    Sample {
        /// JSON fact file
        #[arg(short, long)]
        facts: PathBuf,
        #[command(flatten)]
        generator: GeneratorArgs,
        /// Sampler configuration (JSON); flags below override it
        #[arg(long)]
        config: Option<PathBuf>,
        /// Only sample this template (index from `templates`)
        #[arg(short, long)]
        template: Option<usize>,
        #[arg(short, long, default_value_t = 0)]
        seed: u64,
        /// Only keep choices that leave the query with an answer
        #[arg(long)]
        valid_only: bool,
        /// Relation vocabulary: easy or hard
        #[arg(long)]
        tier: Option<DifficultyTier>,
        /// Records per template
        #[arg(short, long)]
        count: Option<usize>,
        /// Include solution traces
        #[arg(long)]
        traces: bool,
    },

    /// Run a goal list, e.g. `parent("ana", Y), job(Y, J)`.
    Query {
        #[arg(short, long)]
        facts: PathBuf,
        query: String,
        /// Print only the sorted answer set of this variable
        #[arg(short, long)]
        answer: Option<String>,
    },
}

#[derive(Args)]
struct GeneratorArgs {
    /// Maximum nested expansion depth [default: 10]
    #[arg(short, long)]
    depth: Option<usize>,
    /// Grammar file (defaults to the built-in `grammar v1`)
    #[arg(short, long)]
    grammar: Option<PathBuf>,
    /// Generator configuration (JSON); `--depth` and `--recursion-limit` override it
    #[arg(long)]
    generator_config: Option<PathBuf>,
    /// Bound on nested expansion frames
    #[arg(long)]
    recursion_limit: Option<usize>,
}

impl GeneratorArgs {
    fn resolve(&self) -> Result<GeneratorConfig> {
        let mut config = match &self.generator_config {
            Some(path) => {
                let text = fs::read_to_string(path)
                    .with_context(|| format!("failed to read generator config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("invalid generator config {}", path.display()))?
            }
            None => GeneratorConfig::default(),
        };
        if let Some(depth) = self.depth {
            config.depth = depth;
        }
        if let Some(limit) = self.recursion_limit {
            config.recursion_limit = limit;
        }
        Ok(config)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Templates { generator, json } => cmd_templates(&generator, json),
        Commands::Sample {
            facts,
            generator,
            config,
            template,
            seed,
            valid_only,
            tier,
            count,
            traces,
        } => {
            let mut sampler = load_sampler_config(config.as_deref())?;
            if valid_only {
                sampler.valid_only = true;
            }
            if let Some(tier) = tier {
                sampler.tier = tier;
            }
            if let Some(count) = count {
                sampler.questions_per_template = count;
            }
            cmd_sample(&facts, &generator, sampler, template, seed, traces)
        }
        Commands::Query {
            facts,
            query,
            answer,
        } => cmd_query(&facts, &query, answer.as_deref()),
    }
}

fn load_generator(grammar: Option<&Path>, config: &GeneratorConfig) -> Result<TemplateGenerator> {
    let generator = match grammar {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read grammar {}", path.display()))?;
            let grammar = parse_grammar(&text)
                .with_context(|| format!("invalid grammar {}", path.display()))?;
            TemplateGenerator::new(grammar)
        }
        None => TemplateGenerator::v1()?,
    };
    Ok(generator.with_recursion_limit(config.recursion_limit))
}

fn load_templates(args: &GeneratorArgs) -> Result<(GeneratorConfig, Vec<TemplatePair>)> {
    let config = args.resolve()?;
    let cache = TemplateCache::new(load_generator(args.grammar.as_deref(), &config)?);
    let templates = cache
        .get(config.depth)
        .with_context(|| format!("template generation failed at depth {}", config.depth))?;
    Ok((config, templates.to_vec()))
}

fn load_sampler_config(path: Option<&Path>) -> Result<SamplerConfig> {
    let Some(path) = path else {
        return Ok(SamplerConfig::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read sampler config {}", path.display()))?;
    serde_json::from_str(&text)
        .with_context(|| format!("invalid sampler config {}", path.display()))
}

fn load_facts(path: &Path) -> Result<FactDb> {
    FactDb::load_json(path).with_context(|| format!("failed to load facts from {}", path.display()))
}

#[derive(Serialize)]
struct TemplateLine<'a> {
    index: usize,
    #[serde(flatten)]
    pair: &'a TemplatePair,
}

fn cmd_templates(generator: &GeneratorArgs, json: bool) -> Result<()> {
    let (config, templates) = load_templates(generator)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for (index, pair) in templates.iter().enumerate() {
        if json {
            serde_json::to_writer(&mut out, &TemplateLine { index, pair })?;
            writeln!(out)?;
        } else {
            writeln!(out, "{:>4}  {}", index.to_string().bold(), pair.question)?;
            for fragment in pair.query.text() {
                writeln!(out, "        {}", fragment.dimmed())?;
            }
        }
    }
    if !json {
        eprintln!(
            "{} {} templates at depth {}",
            "ok".green().bold(),
            templates.len(),
            config.depth
        );
    }
    Ok(())
}

fn cmd_sample(
    facts: &Path,
    generator: &GeneratorArgs,
    mut config: SamplerConfig,
    template: Option<usize>,
    seed: u64,
    traces: bool,
) -> Result<()> {
    let db = load_facts(facts)?;
    config.retain_known(&db);
    if config.relations().is_empty() && config.attributes.is_empty() {
        bail!("none of the configured relations or attributes exist in {}", facts.display());
    }

    let (generator_config, templates) = load_templates(generator)?;
    let records = match template {
        Some(index) => {
            let pair = templates.get(index).ok_or_else(|| {
                anyhow!(
                    "template {index} out of range ({} templates at depth {})",
                    templates.len(),
                    generator_config.depth
                )
            })?;
            let mut records = Vec::new();
            for question in 0..config.questions_per_template {
                let mut rng = StdRng::seed_from_u64(record_seed(seed, index, question));
                if let Some(record) = sample_with_retries(pair, &db, &mut rng, &config, traces)? {
                    records.push(record);
                }
            }
            records
        }
        None => generate_records(&db, &templates, &config, seed, traces)?,
    };

    info!(records = records.len(), "sampling finished");
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for record in &records {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    Ok(())
}

fn cmd_query(facts: &Path, query: &str, answer: Option<&str>) -> Result<()> {
    let db = load_facts(facts)?;
    let goals = parse_query(query)?;
    let bindings = db.query(&goals)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    match answer {
        Some(var) => {
            let answers: BTreeSet<String> = bindings
                .iter()
                .filter_map(|b| b.get(var))
                .map(|v| v.to_answer_string())
                .collect();
            serde_json::to_writer(&mut out, &answers)?;
            writeln!(out)?;
        }
        None => {
            for binding in &bindings {
                serde_json::to_writer(&mut out, binding)?;
                writeln!(out)?;
            }
        }
    }
    Ok(())
}

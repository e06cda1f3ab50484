// CrabSift - GPL-3.0-or-later
// This file is part of CrabSift.
//
// Copyright (C) 2025 The CrabSift contributors
//
// CrabSift is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// CrabSift is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with CrabSift.  If not, see <https://www.gnu.org/licenses/>.

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use crabsift::analysis::{self, RunSummary};
use crabsift::config::AnalysisConfig;
use crabsift::core::{CancelToken, Corpus, ProgressEvent};
use crabsift::similarity::SimilarityStat;
use crabsift::vectorize::{KeywordSet, VectorizeMode};
use serde::Serialize;
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "ram-profiling")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("GIT_HASH"), ")");

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Task {
    /// Rank records by isolation-forest anomaly score
    Outliers,
    /// Keep records whose text is unlike the rest
    Rare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Vectorizer {
    Tfidf,
    Sql,
    Cmd,
    Traversal,
    Walu,
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "crabsift")]
#[command(version = VERSION)]
#[command(about = "Surface rare and anomalous records in log files", long_about = None)]
struct Args {
    /// Log file to analyze; reads stdin when omitted
    #[arg(value_name = "FILE")]
    file: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t = Task::Outliers)]
    task: Task,

    /// Feature extraction used by the outliers task
    #[arg(long, value_enum, default_value_t = Vectorizer::Tfidf)]
    vectorizer: Vectorizer,

    /// Only read numbers after this delimiter (number vectorizer)
    #[arg(long)]
    prefix: Option<String>,

    /// Only read numbers before this delimiter (number vectorizer)
    #[arg(long)]
    suffix: Option<String>,

    /// Abort instead of skipping when the number count changes between records
    #[arg(long)]
    strict_numbers: bool,

    #[arg(long)]
    trees: Option<usize>,

    #[arg(long)]
    sample_size: Option<usize>,

    #[arg(long)]
    max_depth: Option<usize>,

    /// Seed for reproducible forests
    #[arg(long)]
    seed: Option<u64>,

    /// Similarity above which two records count as close
    #[arg(long)]
    threshold: Option<f64>,

    /// Close matches a record may have and still be rare
    #[arg(long)]
    allowance: Option<usize>,

    /// Return exactly the N rarest records
    #[arg(long, value_name = "N")]
    top: Option<usize>,

    /// Scan rarity rows on all cores
    #[arg(long)]
    parallel: bool,

    /// Rows to print
    #[arg(long, default_value_t = 20)]
    limit: usize,

    #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    /// Config file to use instead of the one in the user config directory
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Store the effective settings in the user config directory
    #[arg(long)]
    save_config: bool,

    /// Path for the DHAT heap profiling output (only used when built with --features ram-profiling)
    #[cfg(feature = "ram-profiling")]
    #[arg(
        long = "profile-output",
        value_name = "PROFILE_FILE",
        default_value = "dhat-heap.json"
    )]
    profile_output: PathBuf,
}

impl Args {
    fn config(&self) -> Result<AnalysisConfig> {
        let mut config = match &self.config {
            Some(path) => AnalysisConfig::load_from(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => AnalysisConfig::load(),
        };

        if let Some(trees) = self.trees {
            config.forest.num_trees = trees;
        }
        if let Some(sample_size) = self.sample_size {
            config.forest.sample_size = sample_size;
        }
        if self.max_depth.is_some() {
            config.forest.max_depth = self.max_depth;
        }
        if self.seed.is_some() {
            config.forest.seed = self.seed;
        }
        if let Some(threshold) = self.threshold {
            config.rarity.threshold = threshold;
        }
        if let Some(allowance) = self.allowance {
            config.rarity.allowance = allowance;
        }
        if self.top.is_some() {
            config.rarity.top_n = self.top;
        }
        config.rarity.parallel |= self.parallel;
        if self.prefix.is_some() {
            config.number.prefix.clone_from(&self.prefix);
        }
        if self.suffix.is_some() {
            config.number.suffix.clone_from(&self.suffix);
        }
        config.number.strict |= self.strict_numbers;
        Ok(config)
    }

    fn mode(&self, config: &AnalysisConfig) -> VectorizeMode {
        match self.vectorizer {
            Vectorizer::Tfidf => VectorizeMode::Tfidf,
            Vectorizer::Sql => VectorizeMode::Keyword(KeywordSet::SqlInjection),
            Vectorizer::Cmd => VectorizeMode::Keyword(KeywordSet::CommandInjection),
            Vectorizer::Traversal => VectorizeMode::Keyword(KeywordSet::DirectoryTraversal),
            Vectorizer::Walu => VectorizeMode::Walu,
            Vectorizer::Number => VectorizeMode::Number(config.number.clone()),
        }
    }
}

/// One printed result row.
#[derive(Debug, Serialize)]
struct Row<'a> {
    rank: usize,
    index: usize,
    score: f64,
    /// Score rescaled to 0-100 across all ranked records
    relative: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    similarity: Option<SimilarityStat>,
    line: &'a str,
}

#[derive(Debug, Serialize)]
struct Output<'a> {
    task: &'static str,
    summary: &'a RunSummary,
    ranked: usize,
    rows: Vec<Row<'a>>,
}

fn read_input(file: Option<&Path>) -> Result<String> {
    let bytes = match file {
        Some(path) => {
            tracing::info!("Reading {}", path.display());
            std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?
        }
        None => {
            tracing::info!("Reading stdin");
            let mut bytes = Vec::new();
            std::io::stdin()
                .read_to_end(&mut bytes)
                .context("Failed to read stdin")?;
            bytes
        }
    };
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn print_text(out: &mut impl Write, output: &Output<'_>) -> std::io::Result<()> {
    let summary = output.summary;
    writeln!(
        out,
        "{} of {} records ranked, {} skipped{} ({:.2?})",
        output.ranked,
        summary.total_records,
        summary.skipped,
        if summary.cancelled { ", partial" } else { "" },
        summary.elapsed
    )?;
    for (reason, count) in &summary.skipped_by_reason {
        writeln!(out, "  skipped {count:>6} {reason}")?;
    }
    for row in &output.rows {
        match row.similarity {
            Some(stat) => writeln!(
                out,
                "{:>4} {:>8} {:.4} {:>5.1}% sim {:.3}/{:.3}/{:.3}  {}",
                row.rank,
                row.index,
                row.score,
                row.relative,
                stat.min,
                stat.mean,
                stat.max,
                row.line
            )?,
            None => writeln!(
                out,
                "{:>4} {:>8} {:.4} {:>5.1}%  {}",
                row.rank, row.index, row.score, row.relative, row.line
            )?,
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    // Logs go to stderr so stdout stays machine readable
    // Set RUST_LOG environment variable to override (e.g., RUST_LOG=debug)
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    tracing::info!("CrabSift starting up (version {VERSION})");

    let args = Args::parse();

    #[cfg(feature = "ram-profiling")]
    let _profiler = {
        tracing::info!("RAM profiling enabled, output: {:?}", args.profile_output);
        dhat::Profiler::builder()
            .file_name(args.profile_output.clone())
            .build()
    };

    #[cfg(feature = "cpu-profiling")]
    {
        tracing::info!("CPU profiling enabled with Tracy - run Tracy profiler to connect");
    }

    let config = args.config()?;
    if args.save_config {
        config.save().context("Failed to save config")?;
    }
    let text = read_input(args.file.as_deref())?;
    // Blank lines carry nothing to score
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let corpus = Corpus::new(&lines);

    let (tx, rx) = mpsc::channel::<ProgressEvent>();
    let progress = std::thread::spawn(move || {
        for event in rx {
            tracing::debug!(
                "{:?}: {} scanned, {} retained after {:.2?}",
                event.stage,
                event.records_scanned,
                event.records_retained,
                event.elapsed
            );
        }
    });

    let ctx = config.run_context(&tx, CancelToken::new());
    let (task, summary, ranked, stats) = match args.task {
        Task::Outliers => {
            let mode = args.mode(&config);
            let report = analysis::detect_outliers(&corpus, &mode, &config.forest, &ctx)
                .context("Outlier detection failed")?;
            ("outliers", report.summary, report.ranking.ranked, HashMap::new())
        }
        Task::Rare => {
            let report = analysis::find_rare(&corpus, &config.rarity, &ctx)
                .context("Rarity analysis failed")?;
            let stats: HashMap<usize, SimilarityStat> = report
                .rarity
                .records
                .iter()
                .map(|r| (r.index, r.stats))
                .collect();
            let ranked = report.ranked();
            ("rare", report.summary, ranked, stats)
        }
    };
    drop(tx);
    if progress.join().is_err() {
        tracing::warn!("Progress logger thread panicked");
    }

    let relative = ranked.relative_scores();
    let rows = ranked
        .top(args.limit)
        .iter()
        .zip(relative)
        .enumerate()
        .map(|(rank, (entry, relative))| Row {
            rank: rank + 1,
            index: entry.index,
            score: entry.score,
            relative,
            similarity: stats.get(&entry.index).copied(),
            line: lines[entry.index],
        })
        .collect();
    let output = Output {
        task,
        summary: &summary,
        ranked: ranked.len(),
        rows,
    };

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match args.format {
        OutputFormat::Text => print_text(&mut out, &output).context("Failed to write output")?,
        OutputFormat::Json => {
            serde_json::to_writer_pretty(&mut out, &output).context("Failed to write output")?;
            writeln!(out)?;
        }
    }
    Ok(())
}

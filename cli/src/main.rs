use std::io::Write;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use seqpurge::params::{DEFAULT_ADAPTER1, DEFAULT_ADAPTER2};
use seqpurge::qc::Metrics;
use seqpurge::{PairWriter, PairedReader, Pipeline, RunParameters};

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

/// Removes adapter sequences from paired-end sequencing data.
#[derive(Parser, Debug)]
#[command(name = "SeqPurge", version, about)]
struct Args {
    /// Forward input gzipped FASTQ file(s)
    #[arg(long = "in1", required = true, num_args = 1..)]
    in1: Vec<PathBuf>,

    /// Reverse input gzipped FASTQ file(s)
    #[arg(long = "in2", required = true, num_args = 1..)]
    in2: Vec<PathBuf>,

    /// Forward output FASTQ file
    #[arg(long = "out1")]
    out1: PathBuf,

    /// Reverse output FASTQ file
    #[arg(long = "out2")]
    out2: PathBuf,

    /// Prefix of singleton read output files (written if only one read of a pair is discarded)
    #[arg(long = "out3")]
    out3: Option<String>,

    /// Forward adapter sequence (at least 15 bases)
    #[arg(long = "a1", default_value = DEFAULT_ADAPTER1)]
    a1: String,

    /// Reverse adapter sequence (at least 15 bases)
    #[arg(long = "a2", default_value = DEFAULT_ADAPTER2)]
    a2: String,

    /// Minimum percentage of matching bases for sequence/adapter matches
    #[arg(long = "match_perc", default_value_t = 80.0)]
    match_perc: f64,

    /// Maximum error probability for insert/adapter matches
    #[arg(long = "mep", default_value_t = 1e-6)]
    mep: f64,

    /// Quality trimming cutoff for trimming from the end of reads (0 disables)
    #[arg(long = "qcut", default_value_t = 15)]
    qcut: u32,

    /// Quality trimming window size
    #[arg(long = "qwin", default_value_t = 5)]
    qwin: usize,

    /// Quality trimming FASTQ score offset
    #[arg(long = "qoff", default_value_t = 33)]
    qoff: u8,

    /// Number of consecutive Ns that trigger N-trimming (0 disables)
    #[arg(long = "ncut", default_value_t = 7)]
    ncut: usize,

    /// Minimum read length after adapter trimming. Shorter reads are discarded
    #[arg(long = "min_len", default_value_t = 30)]
    min_len: usize,

    /// Perform error correction of read pairs
    #[arg(long = "ec")]
    ec: bool,

    /// Summary output file instead of stdout
    #[arg(long = "summary")]
    summary: Option<PathBuf>,

    /// Raw read QC output file (JSON)
    #[arg(long = "qc")]
    qc: Option<PathBuf>,

    /// Number of read pairs per block
    #[arg(long = "block_size", default_value_t = 10000)]
    block_size: usize,

    /// Number of blocks to prefetch into memory
    #[arg(long = "block_prefetch", default_value_t = 32)]
    block_prefetch: usize,

    /// Number of worker threads
    #[arg(long = "threads", default_value_t = 1)]
    threads: usize,

    /// Gzip compression level of the output files (1-9)
    #[arg(long = "compression_level", default_value_t = 1, value_parser = clap::value_parser!(u32).range(1..=9))]
    compression_level: u32,

    /// Status report interval in milliseconds (0 disables)
    #[arg(long = "progress", default_value_t = 0)]
    progress: u64,

    /// Enable debug output
    #[arg(long = "debug")]
    debug: bool,
}

impl Args {
    fn run_parameters(&self) -> RunParameters {
        RunParameters::default()
            .with_adapters(&self.a1, &self.a2)
            .with_match_perc(self.match_perc)
            .with_mep(self.mep)
            .with_quality_trimming(self.qcut, self.qwin, self.qoff)
            .with_ncut(self.ncut)
            .with_min_len(self.min_len)
            .with_block_size(self.block_size)
            .with_block_prefetch(self.block_prefetch)
            .with_threads(self.threads)
            .with_error_correction(self.ec)
            .with_qc(self.qc.is_some())
            .with_progress((self.progress > 0).then(|| Duration::from_millis(self.progress)))
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    env_logger::builder()
        .filter_level(if args.debug { log::LevelFilter::Debug } else { log::LevelFilter::Info })
        .init();

    let start = Instant::now();
    let params = args.run_parameters();
    let pipeline = Pipeline::new(params)?;
    let reader = PairedReader::new(&args.in1, &args.in2)?;
    let writer = PairWriter::from_paths(
        &args.out1, &args.out2, args.out3.as_deref(), args.min_len, args.compression_level,
    )?;
    let stats = pipeline.run(reader, writer)?;

    let mut out: Box<dyn Write> = match &args.summary {
        Some(path) => Box::new(std::io::BufWriter::new(
            std::fs::File::create(path).with_context(|| format!("cannot create file: {}", path.display()))?
        )),
        None => Box::new(std::io::stdout().lock()),
    };
    stats.write_summary(&mut out, pipeline.params())?;
    if args.ec {
        stats.error_correction.write_report(&mut out)?;
    }
    writeln!(out)?;
    writeln!(out, "Overall runtime: {:.2}s", start.elapsed().as_secs_f64())?;
    out.flush()?;

    if let Some(path) = &args.qc {
        let mut metrics = Metrics::default();
        stats.report(&mut metrics);
        metrics.write_json(path)?;
        info!("QC metrics written to {}", path.display());
    }
    Ok(())
}

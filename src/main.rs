use anyhow::{Context, Result, bail};
use clap::{ArgGroup, Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Instant;

use lshcull::DedupConfig;
use lshcull::core::minhash::DEFAULT_PRIME;
use lshcull::core::{DedupPipeline, FingerprintStore, Verifier, candidate_ids, verify_candidates};
use lshcull::services::records;
use lshcull::services::{
    DEFAULT_HASH_SIZE, DatasetStats, GroupListing, PerceptualService, ScanReport,
};

#[derive(Parser, Debug)]
#[command(
    name = "lshcull",
    version,
    about = "Find near-duplicate photos with MinHash + LSH"
)]
struct Cli {
    /// Log at debug level (RUST_LOG still wins when set)
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Perceptual hash workflows
    Hashes {
        #[command(subcommand)]
        command: HashCmd,
    },

    /// Duplicate workflows
    Duplicates {
        #[command(subcommand)]
        command: Dups,
    },
}

#[derive(Subcommand, Debug)]
enum HashCmd {
    /// Compute pHashes for every image under a directory
    Compute {
        /// Directory to scan
        #[arg(short, long, value_name = "DIR")]
        path: PathBuf,
        /// CSV file to write (`filename,phash_int`)
        #[arg(short, long, value_name = "FILE", default_value = "hashes.csv")]
        output: PathBuf,
        /// pHash side length; the fingerprint has `hash_size²` bits
        #[arg(long, default_value_t = DEFAULT_HASH_SIZE)]
        hash_size: u32,
    },
}

#[derive(Args, Debug, Clone)]
struct LshArgs {
    /// Signature length K
    #[arg(long, default_value_t = 100)]
    num_hashes: usize,
    /// Number of LSH bands B; must divide K
    #[arg(long, default_value_t = 20)]
    bands: usize,
    /// Largest accepted Hamming distance (inclusive)
    #[arg(long, default_value_t = 6)]
    threshold: u32,
    /// Seed for the hash family; random when omitted
    #[arg(long)]
    seed: Option<u64>,
    /// Prime modulus for the hash family
    #[arg(long, default_value_t = DEFAULT_PRIME)]
    prime: u64,
    /// pHash side length the hashes were computed with
    #[arg(long, default_value_t = DEFAULT_HASH_SIZE)]
    hash_size: u32,
    /// JSON config file; replaces all of the flags above
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
}

impl LshArgs {
    fn resolve(&self) -> Result<DedupConfig> {
        if let Some(path) = &self.config {
            let config = DedupConfig::load(path)
                .with_context(|| format!("Failed to load config {:?}", path))?;
            log::info!("Using config from {}", path.display());
            return Ok(config);
        }

        let config = DedupConfig {
            fingerprint_bits: fingerprint_bits(self.hash_size)?,
            num_hashes: self.num_hashes,
            num_bands: self.bands,
            hamming_threshold: self.threshold,
            prime: self.prime,
            seed: self.seed,
        };
        config.validate()?;
        Ok(config)
    }
}

#[derive(Subcommand, Debug)]
enum Dups {
    /// Write LSH candidate pairs for a hashes CSV
    Candidates {
        #[arg(long, value_name = "FILE", default_value = "hashes.csv")]
        hashes: PathBuf,
        #[arg(short, long, value_name = "FILE", default_value = "candidates.csv")]
        output: PathBuf,
        #[command(flatten)]
        lsh: LshArgs,
    },

    /// Check candidate pairs by Hamming distance and group the survivors
    Verify {
        #[arg(long, value_name = "FILE", default_value = "hashes.csv")]
        hashes: PathBuf,
        #[arg(long, value_name = "FILE", default_value = "candidates.csv")]
        candidates: PathBuf,
        #[arg(long, value_name = "FILE", default_value = "verified_duplicates.csv")]
        pairs_output: PathBuf,
        #[arg(long, value_name = "FILE", default_value = "duplicate_groups.csv")]
        groups_output: PathBuf,
        /// Largest accepted Hamming distance (inclusive)
        #[arg(long, default_value_t = 6)]
        threshold: u32,
        #[arg(long, default_value_t = DEFAULT_HASH_SIZE)]
        hash_size: u32,
    },

    /// Run the whole pipeline and print duplicate groups
    #[command(group(ArgGroup::new("input").required(true).args(["path", "hashes"])))]
    Scan {
        /// Directory to hash and scan
        #[arg(short, long, value_name = "DIR")]
        path: Option<PathBuf>,
        /// Previously computed hashes CSV
        #[arg(long, value_name = "FILE")]
        hashes: Option<PathBuf>,
        #[command(flatten)]
        lsh: LshArgs,
        /// Print the report as JSON instead of a summary
        #[arg(long)]
        json: bool,
        /// Also save the JSON report to this file
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Hashes { command } => match command {
            HashCmd::Compute {
                path,
                output,
                hash_size,
            } => {
                println!("▶ Hashing images in: {}", path.display());
                let service = PerceptualService::new(hash_size)?;
                let hashes = benchmark("hashing", || service.hash_directory(&path))
                    .with_context(|| format!("Failed to hash {:?}", path))?;
                let (store, failures) = hashes.into_parts(service.fingerprint_bits())?;

                let written = records::write_hashes(&output, store.iter())?;
                println!(
                    "✅ Saved {} hashes to {} ({} skipped)",
                    store.len(),
                    written.display(),
                    failures.len()
                );
                for failure in &failures {
                    println!("   ⚠️  {}: {}", failure.name, failure.error);
                }
            }
        },

        Commands::Duplicates { command } => match command {
            Dups::Candidates {
                hashes,
                output,
                lsh,
            } => {
                let config = lsh.resolve()?;
                let store = load_store(&hashes, config.fingerprint_bits)?;
                let pipeline = DedupPipeline::new(config)?;
                print_params(&pipeline);

                let (candidates, failures) =
                    benchmark("LSH candidate search", || pipeline.candidates(&store))?;
                let candidates = candidate_ids(&store, candidates)?;

                let written = records::write_candidates(&output, &candidates)?;
                println!(
                    "✅ Saved {} candidate pairs to {} ({} items skipped)",
                    candidates.len(),
                    written.display(),
                    failures.len()
                );
            }

            Dups::Verify {
                hashes,
                candidates,
                pairs_output,
                groups_output,
                threshold,
                hash_size,
            } => {
                let store = load_store(&hashes, fingerprint_bits(hash_size)?)?;
                let named = records::read_candidates(&candidates)
                    .with_context(|| format!("Failed to read candidates {:?}", candidates))?;
                let resolved = records::resolve_candidates(&store, &named)?;
                println!(
                    "▶ Verifying {} candidate pairs (Hamming ≤ {})",
                    resolved.len(),
                    threshold
                );

                let verifier = Verifier::new(threshold);
                let (verified, groups) = benchmark("verification", || {
                    verify_candidates(&store, &resolved, &verifier)
                })?;

                let pairs_written = records::write_verified(&pairs_output, &verified)?;
                let groups_written = records::write_groups(&groups_output, &groups)?;
                println!(
                    "✅ {} verified pairs → {}",
                    verified.len(),
                    pairs_written.display()
                );
                println!(
                    "✅ {} duplicate groups → {}",
                    groups.len(),
                    groups_written.display()
                );

                println!("\n{}", DatasetStats::compute(store.len(), &verified, &groups));
                if groups.is_empty() {
                    println!("No duplicates found.");
                } else {
                    print!("{}", GroupListing(&groups));
                }
            }

            Dups::Scan {
                path,
                hashes,
                lsh,
                json,
                report,
            } => {
                let config = lsh.resolve()?;
                let (store, decode_failures) = match (path, hashes) {
                    (Some(dir), _) => {
                        if !json {
                            println!("▶ Scanning for duplicates in: {}", dir.display());
                        }
                        let side = hash_side(config.fingerprint_bits)?;
                        let service = PerceptualService::new(side)?;
                        benchmark("hashing", || service.hash_directory(&dir))
                            .with_context(|| format!("Failed to hash {:?}", dir))?
                            .into_parts(service.fingerprint_bits())?
                    }
                    (None, Some(file)) => (load_store(&file, config.fingerprint_bits)?, Vec::new()),
                    (None, None) => bail!("either --path or --hashes is required"),
                };

                let pipeline = DedupPipeline::new(config)?;
                if !json {
                    print_params(&pipeline);
                }
                let outcome = benchmark("duplicate search", || pipeline.run(&store))?;

                let scan = ScanReport::new(&pipeline, store.len(), outcome, decode_failures);

                if json {
                    println!("{}", scan.to_json()?);
                } else {
                    print!("{}", scan);
                    if scan.groups.is_empty() {
                        println!("No duplicates found.");
                    }
                }

                if let Some(file) = report {
                    scan.save(&file)
                        .with_context(|| format!("Failed to write report {:?}", file))?;
                    log::info!("Report saved to {}", file.display());
                }
            }
        },
    }

    Ok(())
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default))
        .format_timestamp(None)
        .init();
}

fn fingerprint_bits(hash_size: u32) -> Result<u32> {
    Ok(PerceptualService::new(hash_size)?.fingerprint_bits())
}

/// Inverse of `hash_size²` for a directory scan driven by a config file.
fn hash_side(bits: u32) -> Result<u32> {
    let side = (1..=bits).find(|s| s * s >= bits).unwrap_or(0);
    if side * side != bits {
        bail!("{}-bit fingerprints are not a square pHash size", bits);
    }
    Ok(side)
}

fn load_store(path: &Path, width: u32) -> Result<FingerprintStore<String>> {
    records::read_hashes(path, width).with_context(|| format!("Failed to read hashes {:?}", path))
}

fn print_params(pipeline: &DedupPipeline) {
    let params = pipeline.params();
    println!(
        "▶ LSH with K={} B={} R={} (threshold ≈ {:.3}), Hamming ≤ {}",
        params.num_hashes(),
        params.num_bands(),
        params.rows_per_band(),
        params.threshold(),
        pipeline.verifier().threshold()
    );
}

/// Timings go to the log so `--json` output stays clean.
fn benchmark<T, F: FnOnce() -> T>(label: &str, f: F) -> T {
    let start = Instant::now();
    let result = f();
    log::info!("⏱ {} took {:.2?}", label, start.elapsed());
    result
}

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use kbook_core::Device;
use kbook_problems::{catalog, catalog_tiny, evaluate, find, find_tiny, EvalConfig, EvalReport, Problem};

const BANNER: &str = r#"
 _    _                 _
| | _| |__   ___   ___ | | __
| |/ / '_ \ / _ \ / _ \| |/ /
|   <| |_) | (_) | (_) |   <
|_|\_\_.__/ \___/ \___/|_|\_\"#;

#[derive(Parser)]
#[command(
    name = "kbook",
    about = "Reference models vs hand-written kernels",
    long_about = "Runs the kbook example corpus: every problem pairs a framework reference\nmodel with a kernel-backed solution, and `verify` checks that they agree.",
    version,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// List the problems in the catalog
    List {
        /// Show the tiny presets instead of the documented sizes
        #[arg(long)]
        tiny: bool,
    },
    /// Check solutions against their references
    Verify {
        /// Only this problem (default: all)
        #[arg(long)]
        problem: Option<String>,
        /// Use the tiny presets
        #[arg(long)]
        tiny: bool,
        /// JSON file with harness settings
        #[arg(long)]
        config: Option<String>,
        /// Override the RNG seed
        #[arg(long)]
        seed: Option<u64>,
        /// Device to run solutions on (cpu, cuda:N)
        #[arg(long)]
        device: Option<Device>,
        /// Print reports as JSON
        #[arg(long)]
        json: bool,
    },
    /// Time reference vs solution
    Bench {
        /// Only this problem (default: all)
        #[arg(long)]
        problem: Option<String>,
        /// Use the tiny presets
        #[arg(long)]
        tiny: bool,
        /// Timed runs per model
        #[arg(long, default_value = "5")]
        trials: usize,
    },
    /// Show platform and build info
    Info,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let result = match cli.command {
        Commands::List { tiny } => cmd_list(tiny),
        Commands::Verify { problem, tiny, config, seed, device, json } => {
            cmd_verify(problem.as_deref(), tiny, config.as_deref(), seed, device, json)
        }
        Commands::Bench { problem, tiny, trials } => cmd_bench(problem.as_deref(), tiny, trials),
        Commands::Info => {
            cmd_info();
            Ok(true)
        }
    };

    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn select(name: Option<&str>, tiny: bool) -> Result<Vec<Box<dyn Problem>>, String> {
    match name {
        Some(name) => {
            let found = if tiny { find_tiny(name) } else { find(name) };
            found.map(|p| vec![p]).ok_or_else(|| format!("unknown problem '{}'", name))
        }
        None => Ok(if tiny { catalog_tiny() } else { catalog() }),
    }
}

fn cmd_list(tiny: bool) -> Result<bool, String> {
    println!("{:<26} {:>5} {:>5}  {:<24} {:<14} {}", "Name", "Level", "Index", "Op", "Init args", "Output");
    println!("{}", "-".repeat(96));
    for problem in select(None, tiny)? {
        let spec = problem.spec();
        println!(
            "{:<26} {:>5} {:>5}  {:<24} {:<14} {:?}",
            spec.name,
            spec.level,
            spec.index,
            spec.op.to_string(),
            problem.init_args().to_string(),
            problem.output_shape(),
        );
    }
    Ok(true)
}

fn cmd_verify(
    name: Option<&str>,
    tiny: bool,
    config: Option<&str>,
    seed: Option<u64>,
    device: Option<Device>,
    json: bool,
) -> Result<bool, String> {
    let mut cfg = match config {
        Some(path) => EvalConfig::from_json_file(path).map_err(|e| e.to_string())?,
        None => EvalConfig::default(),
    };
    if let Some(seed) = seed {
        cfg.seed = seed;
    }
    if let Some(device) = device {
        cfg.device = device;
    }
    info!(
        seed = cfg.seed,
        device = %cfg.device,
        atol = cfg.atol,
        rtol = cfg.rtol,
        trials = cfg.correctness_trials,
        "harness settings"
    );

    let mut reports: Vec<EvalReport> = Vec::new();
    for problem in select(name, tiny)? {
        let report = evaluate(problem.as_ref(), &cfg).map_err(|e| format!("{}: {}", problem.spec().name, e))?;
        if !json {
            println!("{}", report);
        }
        reports.push(report);
    }

    if json {
        let text = serde_json::to_string_pretty(&reports).map_err(|e| e.to_string())?;
        println!("{}", text);
    } else {
        let passed = reports.iter().filter(|r| r.correct).count();
        println!("\n{}/{} problems passed", passed, reports.len());
    }
    Ok(reports.iter().all(|r| r.correct))
}

fn cmd_bench(name: Option<&str>, tiny: bool, trials: usize) -> Result<bool, String> {
    let trials = trials.max(1);
    info!(trials, "timing reference and solution");
    println!("{:<26} {:>12} {:>12} {:>9}", "Problem", "Ref (ms)", "Sol (ms)", "Speedup");
    println!("{}", "-".repeat(62));

    for problem in select(name, tiny)? {
        let spec = problem.spec();
        let run = || -> kbook_core::Result<Option<(f64, f64)>> {
            let reference = problem.reference(&mut StdRng::seed_from_u64(0))?;
            let Some(solution) = problem.solution(&mut StdRng::seed_from_u64(0), Device::Cpu)? else {
                return Ok(None);
            };
            let inputs = problem.inputs(&mut StdRng::seed_from_u64(0));

            // Warmup
            reference.forward(&inputs)?;
            solution.forward(&inputs)?;

            let ref_s = time_it(trials, || reference.forward(&inputs).map(drop))?;
            let sol_s = time_it(trials, || solution.forward(&inputs).map(drop))?;
            Ok(Some((ref_s, sol_s)))
        };

        match run().map_err(|e| format!("{}: {}", spec.name, e))? {
            Some((ref_s, sol_s)) => println!(
                "{:<26} {:>10.3}ms {:>10.3}ms {:>8.2}x",
                spec.name,
                ref_s * 1000.0,
                sol_s * 1000.0,
                ref_s / sol_s,
            ),
            None => {
                warn!(problem = spec.name, "no kernel solution to time");
                println!("{:<26} {:>12} {:>12} {:>9}", spec.name, "-", "-", "-");
            }
        }
    }
    Ok(true)
}

fn time_it(iters: usize, mut f: impl FnMut() -> kbook_core::Result<()>) -> kbook_core::Result<f64> {
    let start = Instant::now();
    for _ in 0..iters {
        f()?;
    }
    Ok(start.elapsed().as_secs_f64() / iters as f64)
}

fn cmd_info() {
    println!("{}", BANNER);
    println!("  v{}  -  kernels checked against reference models\n", env!("CARGO_PKG_VERSION"));

    println!("Platform");
    println!("  OS:    {}", std::env::consts::OS);
    println!("  Arch:  {}", std::env::consts::ARCH);
    println!("  Rayon: {} threads", rayon::current_num_threads());

    println!("\nKernels");
    println!("  CPU grid:  block size {}, tile {}", kbook_kernels::BLOCK_SIZE, kbook_kernels::TILE);
    #[cfg(feature = "cuda")]
    {
        let available = kbook_kernels::cuda::context::is_cuda_available();
        println!("  CUDA:      compiled in, device 0 {}", if available { "[x]" } else { "[ ]" });
    }
    #[cfg(not(feature = "cuda"))]
    println!("  CUDA:      not compiled in (build with --features cuda)");

    println!("\nCatalog ({} problems)", catalog().len());
    for problem in catalog() {
        let spec = problem.spec();
        println!("  L{} #{:<3} {:<26} {}", spec.level, spec.index, spec.name, spec.description);
    }
}

//! KPN Design Centering - Command Line Interface
//!
//! Usage:
//!   dc-explore explore [OPTIONS]   Search a robust mapping by simulation
//!   dc-explore region [OPTIONS]    Design centering on a fixed 2-D test region
//!   dc-explore config [OPTIONS]    Print or save the default configuration

use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::*;

use kpn_design_centering::prelude::*;

#[derive(Parser)]
#[command(name = "dc-explore")]
#[command(about = "Design centering for robust KPN application mappings")]
#[command(version)]
struct Cli {
    /// Output results in JSON format (for machine parsing)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run design centering with the KPN simulator as oracle
    Explore {
        /// TOML configuration file (defaults apply otherwise)
        #[arg(short, long)]
        config: Option<String>,

        /// Override the sample budget
        #[arg(short, long)]
        max_samples: Option<usize>,

        /// Override the execution time threshold, e.g. "5 ms"
        #[arg(short, long)]
        threshold: Option<String>,

        /// Override the search seed
        #[arg(short, long)]
        seed: Option<u64>,

        /// Write the JSON report to this file
        #[arg(short, long)]
        output: Option<String>,
    },

    /// Run design centering on the three-island 2-D test region
    Region {
        /// Sample budget
        #[arg(short, long, default_value = "1000")]
        max_samples: usize,

        /// Search seed
        #[arg(short, long, default_value = "1")]
        seed: u64,
    },

    /// Print the default configuration as TOML
    Config {
        /// Save to this file instead of printing
        #[arg(short, long)]
        output: Option<String>,
    },
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let json_output = cli.json;

    let result = match cli.command {
        Commands::Explore { config, max_samples, threshold, seed, output } => {
            run_exploration(config, max_samples, threshold, seed, output, json_output)
        }
        Commands::Region { max_samples, seed } => {
            run_region(max_samples, seed, json_output)
        }
        Commands::Config { output } => {
            show_config(output)
        }
    };

    if let Err(err) = result {
        if json_output {
            let error = serde_json::json!({ "error": err.to_string() });
            eprintln!("{}", error);
        } else {
            eprintln!("{}: {}", "Error".red(), err);
        }
        std::process::exit(1);
    }
}

fn banner(title: &str) {
    println!("{}", "╔══════════════════════════════════════════════════════════════╗".cyan());
    println!("{}", format!("║ {:^60} ║", title).cyan());
    println!("{}", "╚══════════════════════════════════════════════════════════════╝".cyan());
    println!();
}

fn run_exploration(
    config_path: Option<String>,
    max_samples: Option<usize>,
    threshold: Option<String>,
    seed: Option<u64>,
    output: Option<String>,
    json_output: bool,
) -> DseResult<()> {
    let mut config = match config_path {
        Some(ref path) => ExplorationConfig::load(path)?,
        None => ExplorationConfig::default(),
    };
    if let Some(max_samples) = max_samples {
        config.dc.max_samples = max_samples;
    }
    if let Some(threshold) = threshold {
        config.oracle.threshold = threshold;
    }
    if let Some(seed) = seed {
        config.dc.seed = seed;
    }

    if !json_output {
        banner("KPN Design Centering");
        println!("Configuration:");
        println!("  • Application: {:?}", config.application);
        println!("  • Platform: {:?}", config.platform);
        println!("  • Threshold: {}", config.oracle.threshold);
        println!("  • Samples: {} ({} per iteration)", config.dc.max_samples, config.dc.adapt_samples);
        println!();
        println!("{}", "Running design centering...".yellow());
    }

    let start = std::time::Instant::now();
    let report = kpn_design_centering::explore(&config)?;
    let elapsed = start.elapsed();

    if let Some(ref path) = output {
        report.save_json(path)?;
    }

    if json_output {
        println!("{}", report.to_json()?);
    } else {
        if report.center.robust {
            println!("{}", "Search complete!".green());
        } else {
            println!("{}", "No center reached the hitting probability threshold".red());
        }
        println!();
        println!("{}", report);
        println!("Wall-clock time: {:.3}s", elapsed.as_secs_f64());
        if let Some(ref path) = output {
            println!("Report written to {}", path.green());
        }
    }
    Ok(())
}

/// JSON output structure for the test region scenario
#[derive(serde::Serialize)]
struct RegionOutput {
    center: Point,
    feasible: bool,
    radius: f64,
    hitting_probability: f64,
    robust: bool,
    history: DcHistory,
}

fn three_islands() -> TestRegion {
    TestRegion::new(
        vec![
            Rect::new(vec![1.0, 1.0], vec![2.0, 2.0]),
            Rect::new(vec![1.0, 13.0], vec![3.0, 14.0]),
            Rect::new(vec![7.0, 7.0], vec![12.0, 12.0]),
        ],
        vec![Rect::new(vec![9.0, 9.0], vec![10.0, 10.0])],
    )
}

fn run_region(max_samples: usize, seed: u64, json_output: bool) -> DseResult<()> {
    if !json_output {
        banner("Design Centering: 2-D Test Region");
        println!("Feasible islands: [1,2]², [1,3]×[13,14], [7,12]² without [9,10]²");
        println!();
    }

    let mut app = Application::new("plane");
    app.add_process("x");
    app.add_process("y");
    let repr: Arc<dyn Representation> = Arc::new(SimpleVectorRepresentation::new(
        Arc::new(app),
        Arc::new(Platform::homogeneous(15, 1_000_000_000)),
        f64::INFINITY,
    ));
    let oracle = Oracle::new(
        FeasibilityBackend::FixedTest(three_islands()),
        &OracleConfig { parallel: false, ..Default::default() },
    )?;

    let config = DcConfig {
        max_samples,
        adapt_samples: 50,
        hitting_probability: vec![0.5],
        deg_p_polynomial: 0,
        step_width: vec![0.1],
        deg_s_polynomial: 0,
        hitting_probability_threshold: 0.5,
        record_samples: false,
        seed,
        ..Default::default()
    };
    let volume = Volume::new(vec![5.0, 5.0], config.radius, repr.clone());
    let mut dc = DesignCentering::new(volume, Arc::new(oracle), repr, config)?;
    let outcome = dc.ds_explore()?;

    if json_output {
        let output = RegionOutput {
            center: outcome.center.point().clone(),
            feasible: outcome.center.feasible(),
            radius: outcome.radius,
            hitting_probability: outcome.hitting_probability,
            robust: outcome.robust,
            history: outcome.history,
        };
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        let verdict = if outcome.center.feasible() { "feasible".green() } else { "infeasible".red() };
        println!("Center:              {:?} ({})", outcome.center.point(), verdict);
        println!("Radius:              {:.3}", outcome.radius);
        println!("Hitting probability: {:.3}", outcome.hitting_probability);
        println!();
        println!("{}", "Trajectory:".cyan());
        let history = &outcome.history;
        for (i, center) in history.centers.iter().enumerate() {
            println!(
                "  {:>3}: center {:?} radius {:.3} p {:.2}",
                i, center, history.radii[i], history.hitting_probabilities[i]
            );
        }
    }
    Ok(())
}

fn show_config(output: Option<String>) -> DseResult<()> {
    let config = ExplorationConfig::default();
    match output {
        Some(path) => {
            config.save(&path)?;
            println!("Default configuration written to {}", path.green());
        }
        None => {
            let text = toml::to_string_pretty(&config)
                .map_err(|e| DseError::Configuration(e.to_string()))?;
            println!("{}", text);
        }
    }
    Ok(())
}

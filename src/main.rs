//! energy-recon entry point: CLI wiring and config-driven reconciler construction.

use std::path::{Path, PathBuf};
use std::process;

use tracing_subscriber::EnvFilter;

use energy_recon::config::ReconcileConfig;
use energy_recon::io::export::export_breakdown_csv;
use energy_recon::{CancelToken, Reconciler, SimulationContext, Status};

/// Parsed CLI arguments.
struct CliArgs {
    run_dir: Option<PathBuf>,
    period_days: u32,
    config_path: Option<PathBuf>,
    input_model: Option<PathBuf>,
    json: bool,
    breakdown_out: Option<PathBuf>,
    #[cfg(feature = "api")]
    serve: bool,
    #[cfg(feature = "api")]
    port: u16,
}

fn print_help() {
    eprintln!("energy-recon: reconcile building-energy simulation outputs");
    eprintln!();
    eprintln!("Usage: energy-recon --run-dir <dir> [OPTIONS]");
    eprintln!();
    eprintln!("Options:");
    eprintln!("  --run-dir <dir>          Simulation output directory to reconcile");
    eprintln!("  --period-days <u32>      Simulated period length in days (default: 365)");
    eprintln!("  --config <path>          Load trust policy from TOML config file");
    eprintln!("  --input-model <path>     Input model for wall/window descriptors");
    eprintln!("  --json                   Print the report as JSON");
    eprintln!("  --breakdown-out <path>   Export the end-use breakdown to CSV");
    #[cfg(feature = "api")]
    {
        eprintln!("  --serve                  Start REST API server");
        eprintln!("  --port <u16>             API server port (default: 3000)");
    }
    eprintln!("  --help                   Show this help message");
    eprintln!();
    eprintln!("Log verbosity follows RUST_LOG (default: warn).");
}

fn next_value<'a>(args: &'a [String], i: &mut usize, flag: &str, what: &str) -> &'a str {
    *i += 1;
    if *i >= args.len() {
        eprintln!("error: {flag} requires {what}");
        process::exit(1);
    }
    &args[*i]
}

fn parse_args() -> CliArgs {
    let args: Vec<String> = std::env::args().collect();
    let mut cli = CliArgs {
        run_dir: None,
        period_days: 365,
        config_path: None,
        input_model: None,
        json: false,
        breakdown_out: None,
        #[cfg(feature = "api")]
        serve: false,
        #[cfg(feature = "api")]
        port: 3000,
    };

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                process::exit(0);
            }
            "--run-dir" => {
                cli.run_dir = Some(PathBuf::from(next_value(
                    &args,
                    &mut i,
                    "--run-dir",
                    "a path argument",
                )));
            }
            "--period-days" => {
                let raw = next_value(&args, &mut i, "--period-days", "a u32 argument");
                match raw.parse::<u32>() {
                    Ok(d) if d > 0 => cli.period_days = d,
                    _ => {
                        eprintln!("error: --period-days value \"{raw}\" is not a positive integer");
                        process::exit(1);
                    }
                }
            }
            "--config" => {
                cli.config_path = Some(PathBuf::from(next_value(
                    &args,
                    &mut i,
                    "--config",
                    "a path argument",
                )));
            }
            "--input-model" => {
                cli.input_model = Some(PathBuf::from(next_value(
                    &args,
                    &mut i,
                    "--input-model",
                    "a path argument",
                )));
            }
            "--json" => {
                cli.json = true;
            }
            "--breakdown-out" => {
                cli.breakdown_out = Some(PathBuf::from(next_value(
                    &args,
                    &mut i,
                    "--breakdown-out",
                    "a path argument",
                )));
            }
            #[cfg(feature = "api")]
            "--serve" => {
                cli.serve = true;
            }
            #[cfg(feature = "api")]
            "--port" => {
                let raw = next_value(&args, &mut i, "--port", "a u16 argument");
                if let Ok(p) = raw.parse::<u16>() {
                    cli.port = p;
                } else {
                    eprintln!("error: --port value \"{raw}\" is not a valid u16");
                    process::exit(1);
                }
            }
            other => {
                eprintln!("error: unknown argument \"{other}\"");
                print_help();
                process::exit(1);
            }
        }
        i += 1;
    }

    cli
}

fn load_config(path: Option<&Path>) -> ReconcileConfig {
    let config = match path {
        Some(path) => ReconcileConfig::from_toml_file(path).unwrap_or_else(|e| {
            eprintln!("{e}");
            process::exit(1);
        }),
        None => ReconcileConfig::default(),
    };
    let errors = config.validate();
    if !errors.is_empty() {
        for e in &errors {
            eprintln!("{e}");
        }
        process::exit(1);
    }
    config
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = parse_args();
    let reconciler = Reconciler::new(load_config(cli.config_path.as_deref()));

    #[cfg(feature = "api")]
    if cli.serve {
        use std::net::SocketAddr;
        use std::sync::Arc;

        let state = Arc::new(energy_recon::api::AppState::new(reconciler));
        let addr = SocketAddr::from(([0, 0, 0, 0], cli.port));
        let rt = tokio::runtime::Runtime::new().unwrap_or_else(|e| {
            eprintln!("error: failed to create tokio runtime: {e}");
            process::exit(1);
        });
        rt.block_on(energy_recon::api::serve(state, addr));
        return;
    }

    let Some(run_dir) = cli.run_dir else {
        eprintln!("error: --run-dir is required");
        print_help();
        process::exit(1);
    };

    let mut ctx = SimulationContext::new(cli.period_days);
    if let Some(model) = cli.input_model {
        ctx = ctx.with_input_model(model);
    }

    let report = match reconciler.reconcile(&run_dir, &ctx, &CancelToken::new()) {
        Ok(report) => report,
        Err(e) => {
            eprintln!("error: {e}");
            process::exit(1);
        }
    };

    if cli.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{json}"),
            Err(e) => {
                eprintln!("error: failed to serialize report: {e}");
                process::exit(1);
            }
        }
    } else {
        println!("{report}");
    }

    if let Some(ref path) = cli.breakdown_out {
        if let Err(e) = export_breakdown_csv(&report, path) {
            eprintln!("error: failed to write CSV: {e}");
            process::exit(1);
        }
        eprintln!("Breakdown written to {}", path.display());
    }

    if report.status == Status::Error {
        process::exit(2);
    }
}

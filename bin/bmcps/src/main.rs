mod dispatch;
mod framing;
mod serve;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use bmcps_core::{Config, Paths};

#[derive(Parser)]
#[command(name = "bmcps")]
#[command(about = "Browser MCP server: drives Chrome over CDP for MCP clients", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging (BMCPS_DEBUG=1 does the same)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve MCP over stdio (the default when no subcommand is given)
    Serve,

    /// List the registered MCP tools
    Tools,

    /// Check the environment: Chrome binary, profile directory
    Doctor,
}

#[tokio::main]
async fn main() -> std::process::ExitCode {
    let cli = Cli::parse();

    // Stdout carries the MCP protocol; every log line goes to stderr.
    let filter = if cli.verbose || bmcps_core::debug_enabled() {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();

    let paths = Paths::new();
    let config = match Config::load(&paths) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("[bmcps] failed to load config, using defaults: {err}");
            Config::default()
        }
    };

    match cli.command.unwrap_or(Commands::Serve) {
        Commands::Serve => {
            let code = serve::run(paths, config).await;
            std::process::ExitCode::from(code as u8)
        }
        Commands::Tools => {
            let registry = bmcps_tools::ToolRegistry::with_defaults();
            let listing = registry.list_schemas();
            for tool in listing["tools"].as_array().into_iter().flatten() {
                println!(
                    "{:<28} {}",
                    tool["name"].as_str().unwrap_or(""),
                    tool["description"].as_str().unwrap_or("")
                );
            }
            std::process::ExitCode::SUCCESS
        }
        Commands::Doctor => {
            let mut healthy = true;

            match bmcps_browser::launch::find_chrome_executable() {
                Some(path) => println!("chrome binary: {}", path.display()),
                None => {
                    println!("chrome binary: NOT FOUND (install google-chrome or chromium)");
                    healthy = false;
                }
            }

            match paths.ensure_dirs() {
                Ok(()) => println!("profile dir:   {}", paths.chrome_profile_dir().display()),
                Err(err) => {
                    println!("profile dir:   not writable ({err})");
                    healthy = false;
                }
            }

            println!("config file:   {}", paths.config_file().display());
            if healthy {
                std::process::ExitCode::SUCCESS
            } else {
                std::process::ExitCode::FAILURE
            }
        }
    }
}

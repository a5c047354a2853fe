mod config;
mod core;
mod db;
mod engine;
mod extract;
mod fetch;
mod retry;
mod scheduler;
mod state;
mod tasks;
mod traits;
mod types;

use std::path::PathBuf;

use tracing_subscriber::EnvFilter;

fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Logs go to stderr so `status` and `run-once` keep stdout as pure JSON.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let config_path = std::env::var("GUILD_MONITOR_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    let args: Vec<String> = std::env::args().collect();
    let mut once: Option<String> = None;
    if args.len() > 1 {
        match args[1].as_str() {
            "--version" | "-V" => {
                println!("guild-monitor {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "status" => {
                let config = config::AppConfig::load_or_default(&config_path)?;
                println!(
                    "{}",
                    serde_json::to_string_pretty(&crate::core::task_table(&config))?
                );
                return Ok(());
            }
            "run-once" => match args.get(2) {
                Some(name) => once = Some(name.clone()),
                None => {
                    eprintln!("Usage: guild-monitor run-once <task>");
                    std::process::exit(2);
                }
            },
            other => {
                eprintln!("Unknown command '{}'. See --help.", other);
                std::process::exit(2);
            }
        }
    }

    let config = config::AppConfig::load_or_default(&config_path)?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;

    match once {
        Some(name) => {
            let entry = runtime.block_on(crate::core::run_once(config, &name))?;
            println!("{}", serde_json::to_string_pretty(&entry)?);
            if entry.status == types::RunStatus::Error {
                std::process::exit(1);
            }
            Ok(())
        }
        None => runtime.block_on(crate::core::run(config)),
    }
}

fn print_help() {
    println!("guild-monitor {}", env!("CARGO_PKG_VERSION"));
    println!("{}\n", env!("CARGO_PKG_DESCRIPTION"));
    println!("Usage: guild-monitor [COMMAND]\n");
    println!("Commands:");
    println!("  status            Print the configured task schedule as JSON");
    println!("  run-once <task>   Run one task now and print its run-log entry");
    println!("                    (guild_members, online_players, killboard, highscores, playtime)");
    println!("\nWith no command the scheduler runs until ctrl-c or SIGTERM.");
    println!("\nEnvironment:");
    println!("  GUILD_MONITOR_CONFIG   Config file path (default: config.toml)");
    println!("  RUST_LOG               Log filter (default: info)");
    println!("\nOptions:");
    println!("  -h, --help       Print help");
    println!("  -V, --version    Print version");
}

mod mcp;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use eoka_extract::{BrowserAgent, Config, EokaSurface};

#[derive(Parser)]
#[command(name = "eoka-reader")]
#[command(about = "Page and PDF content extraction for browser agents")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// YAML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Run in headless mode (overrides config)
    #[arg(long, global = true)]
    headless: bool,

    /// Verbose output (-v for info, -vv for debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Quiet mode (only errors)
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Run the MCP server on stdio
    Serve,
    /// Open a URL and print its content as JSON
    Extract {
        /// Page or PDF to read
        url: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let level = if cli.quiet {
        Level::ERROR
    } else {
        match cli.verbose {
            0 => Level::WARN,
            1 => Level::INFO,
            _ => Level::DEBUG,
        }
    };

    // stdout carries MCP traffic, so logs go to stderr.
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .compact()
        .init();

    let mut config = match cli.config {
        Some(ref path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.headless {
        config.browser.headless = true;
    }

    match cli.command {
        Command::Serve => mcp::run_server(config).await,
        Command::Extract { url } => {
            let surface = EokaSurface::launch(&config.browser).await?;
            let agent = BrowserAgent::new(surface, &config.extraction);

            // Close the browser even when navigation fails.
            let result = match agent.navigate_to(&url).await {
                Ok(_) => Ok(agent.extract_page_content().await),
                Err(e) => Err(e),
            };
            agent.into_surface().close().await?;

            let record = result?;
            println!("{}", serde_json::to_string_pretty(&record)?);
            if record.is_error {
                std::process::exit(1);
            }
            Ok(())
        }
    }
}

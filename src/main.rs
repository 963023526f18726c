//! edgecache CLI - drive the caching worker from the command line

use clap::Parser;
use log::LevelFilter;

use edgecache::cli::args::GlobalOptions;
use edgecache::cli::{self, CacheCommands, Cli, Commands};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.debug);

    if let Err(err) = run(cli).await {
        eprintln!("Error: {:#}", err);
        std::process::exit(1);
    }
}

fn init_logging(debug: bool) {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if debug {
        builder.filter_level(LevelFilter::Debug);
    }
    builder.format_timestamp(None).init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let opts = GlobalOptions::from_cli(&cli);

    match cli.command {
        Commands::Fetch {
            url,
            method,
            accept,
            data,
        } => cli::fetch::run(&opts, &url, &method, accept.as_deref(), data).await?,
        Commands::Classify { url } => cli::classify::run(&opts, &url)?,
        Commands::Install => cli::lifecycle::install(&opts).await?,
        Commands::Activate => cli::lifecycle::activate(&opts)?,
        Commands::SkipWaiting => cli::lifecycle::skip_waiting(&opts)?,
        Commands::Status => cli::status::run(&opts)?,
        Commands::Sync { tag } => cli::events::sync(&opts, tag).await?,
        Commands::Push { payload } => cli::events::push(&opts, payload).await?,
        Commands::NotificationClick { action } => {
            cli::events::notification_click(&opts, action).await?
        }
        Commands::Cache(cache_cmd) => match cache_cmd {
            CacheCommands::Status => cli::cache::status(&opts)?,
            CacheCommands::Clear => cli::cache::clear(&opts)?,
            CacheCommands::Path => cli::cache::path(&opts)?,
            CacheCommands::List { namespace } => cli::cache::list(&opts, namespace.as_deref())?,
        },
        Commands::Version => {
            println!("edgecache version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(())
}

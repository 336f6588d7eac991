mod cache;
mod cli;
mod codec;
mod db;
mod deleter;
mod error;
mod fmt;
mod importer;
mod ledger;
mod models;
mod pager;
mod records;
mod row;
mod settings;
mod store;
mod tags;
mod taxonomy;
mod tui;

use clap::Parser;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::Layer;

use cli::{Cli, Commands, TaxonomyCommands};
use error::Result;

fn main() {
    let cli = Cli::parse();

    // The interactive view owns the terminal, so no stderr logging there.
    if !matches!(cli.command, None | Some(Commands::Open)) {
        init_logging(cli.verbose);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {e}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let data_dir = settings::resolve_data_dir(cli.data_dir.as_deref());

    match cli.command {
        Some(Commands::Init) => runtime.block_on(cli::init::run(&data_dir)),
        Some(Commands::Import { file }) => runtime.block_on(cli::import::run(&data_dir, &file)),
        Some(Commands::Taxonomy { command }) => match command {
            TaxonomyCommands::Add { field, value } => {
                runtime.block_on(cli::taxonomy::add(&data_dir, &field, &value))
            }
            TaxonomyCommands::List { field } => {
                runtime.block_on(cli::taxonomy::list(&data_dir, &field))
            }
        },
        Some(Commands::Status) => runtime.block_on(cli::status::run(&data_dir)),
        Some(Commands::Demo) => runtime.block_on(cli::demo::run(&data_dir)),
        // `tally` with no subcommand opens the ledger view.
        Some(Commands::Open) | None => cli::open::run(&data_dir, &runtime),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        _ => LevelFilter::DEBUG,
    };
    let terminal_log = tracing_subscriber::fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(level);

    tracing_subscriber::registry().with(terminal_log).init();
}

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use quantity_import::ImportError;
use quantity_import::config::{ConnectionSettings, ImportConfig};
use quantity_import::db::MySqlStore;
use quantity_import::import::{BatchCounters, ImportOptions, ImportSession, Statements};

#[derive(Parser, Debug)]
#[command(
    name = "import-quantities",
    version,
    about = "Apply product quantities from a flat file to the shop database in one transaction"
)]
struct Args {
    /// Input file with one `<ean13>;<quantity>` record per line.
    input: PathBuf,

    /// Config file holding `DB_NAME DB_USER DB_PSWD TABLE_PREFIX`.
    config: PathBuf,

    /// Database host (defaults to `IMPORT_DB_HOST` or `localhost`).
    #[arg(long)]
    host: Option<String>,

    /// Database port (defaults to `IMPORT_DB_PORT` or 3306).
    #[arg(long)]
    port: Option<u16>,

    /// Also resolve the stock-availability row of every updated product.
    #[arg(long)]
    resolve_stock: bool,

    /// Print the final summary as JSON.
    #[arg(long)]
    json: bool,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info,sqlx=warn"))
        .format_timestamp(None)
        .init();

    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if let Err(io_err) = err.print() {
                log::warn!("failed to print usage: {}", io_err);
            }
            // --help and --version are not failures
            return if err.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };

    match run(&args) {
        Ok(counters) => {
            if !args.json {
                println!(
                    "Import committed: {} records read, {} updated, {} without matching product, {} failed",
                    counters.read, counters.applied, counters.no_match, counters.failed
                );
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            if let Err(io_err) = writeln!(io::stderr(), "error: {err}") {
                log::warn!("failed to report error: {}", io_err);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args) -> Result<BatchCounters, ImportError> {
    log::info!(
        "reading from '{}' with config from '{}'",
        args.input.display(),
        args.config.display()
    );

    let config = ImportConfig::from_file(&args.config)?;
    let statements = Statements::new(config.table_prefix.as_str())?;
    let settings = ConnectionSettings::from_env().with_overrides(args.host.clone(), args.port);

    log::info!(
        "config parsed, connecting to '{}'@'{}:{}' as '{}', prefix='{}'",
        config.store_name,
        settings.host,
        settings.port,
        config.store_user,
        config.table_prefix
    );

    let mut store = MySqlStore::connect(&settings, &config).map_err(ImportError::Connection)?;
    match store.server_version() {
        Ok(version) => log::info!("connected to the database (server {})", version),
        Err(err) => log::warn!("connected, but server version lookup failed: {}", err),
    }

    let options = ImportOptions {
        resolve_stock: args.resolve_stock,
    };
    let outcome = ImportSession::new(&mut store, statements, options).run(&args.input);

    log::debug!("closing database connection");
    if let Err(err) = store.close() {
        log::warn!("{}", err);
    }

    if args.json {
        match serde_json::to_string(&outcome.summary()) {
            Ok(json) => println!("{json}"),
            Err(err) => log::error!("failed to serialize summary: {}", err),
        }
    }

    outcome.into_result()
}

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rustmemodb_fixture::connection::NameValuePairFactory;
use rustmemodb_fixture::isolation::{IsolatedContextFactory, IsolationKeyDeriver};
use rustmemodb_fixture::store::StoreOptions;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "rustmemodb-fixture")]
#[command(about = "Inspect isolation keys and connection descriptors used by store fixtures")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print the isolation key derived from a test name
    Key { test_name: String },
    /// Print the descriptor a test would connect with in isolated mode
    Isolate {
        connection: String,
        #[arg(long)]
        test: Option<String>,
        #[command(flatten)]
        format: DescriptorFormat,
    },
    /// Print the pairs retained from a descriptor, one per line
    Parse {
        connection: String,
        #[command(flatten)]
        format: DescriptorFormat,
    },
}

#[derive(Args)]
struct DescriptorFormat {
    #[arg(long, default_value_t = NameValuePairFactory::DEFAULT_SEPARATOR)]
    separator: char,
    #[arg(long, default_value_t = NameValuePairFactory::DEFAULT_EQUALITY)]
    equality: char,
    #[arg(long, default_value = NameValuePairFactory::DEFAULT_DATABASE_KEY)]
    database_key: String,
}

impl DescriptorFormat {
    fn factory(&self) -> NameValuePairFactory {
        NameValuePairFactory::new(self.separator, self.equality, &self.database_key)
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Key { test_name } => {
            println!("{}", IsolationKeyDeriver::new().derive(Some(&test_name)));
        }
        Command::Isolate {
            connection,
            test,
            format,
        } => {
            let factory = IsolatedContextFactory::<StoreOptions>::with_constructor(
                StoreOptions::new(&connection),
                format.factory(),
                test,
                Ok,
            )
            .context("invalid connection descriptor")?;

            println!("{}", factory.connection_descriptor());
        }
        Command::Parse { connection, format } => {
            let target = format.factory().parse(&connection);
            for (key, value) in target.pairs() {
                println!("{}={}", key, value);
            }
        }
    }

    Ok(())
}

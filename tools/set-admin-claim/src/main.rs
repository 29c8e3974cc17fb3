use accounts_admin_shared::bootstrap::{
    grant_admin_once, AdminSession, BootstrapError, ServiceAccountKey, DEFAULT_KEY_FILE,
};
use clap::error::ErrorKind;
use clap::Parser;
use colored::Colorize;
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

const MISSING_UID: &str = "Error: you must provide the user's UID as an argument.";
const EXAMPLE: &str = "Example: set-admin-claim yYb5ipyfWTdkBlTxjGxacINb4hl1";

#[derive(Parser, Debug)]
#[command(name = "set-admin-claim")]
#[command(about = "Grant the admin role to an existing account")]
#[command(version)]
struct Cli {
    /// Uid of the account to promote
    uid: String,

    #[arg(long, default_value = DEFAULT_KEY_FILE, help = "Service account key file")]
    key_file: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();

    let cli = match parse_args(std::env::args_os()) {
        Ok(cli) => cli,
        Err(code) => return code,
    };

    report(&run(&cli).await)
}

/// Parse the command line, printing help or usage errors. `Err` carries the
/// exit code to stop with.
fn parse_args<I, T>(args: I) -> Result<Cli, ExitCode>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    match Cli::try_parse_from(args) {
        Ok(cli) => Ok(cli),
        Err(e) if matches!(e.kind(), ErrorKind::DisplayHelp | ErrorKind::DisplayVersion) => {
            print!("{e}");
            Err(ExitCode::SUCCESS)
        }
        Err(e) if e.kind() == ErrorKind::MissingRequiredArgument => {
            eprintln!("{}", MISSING_UID.red());
            println!("{EXAMPLE}");
            Err(ExitCode::FAILURE)
        }
        Err(e) => {
            eprintln!("{}", e.to_string().trim_end().red());
            Err(ExitCode::FAILURE)
        }
    }
}

/// Print the outcome of a run and map it to the process exit code
fn report(result: &Result<(), BootstrapError>) -> ExitCode {
    match result {
        Ok(()) => {
            println!(
                "{}",
                "\nSUCCESS! The 'admin' custom claim was assigned to the user.".green()
            );
            println!("The user now has full administrator permissions.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("{} {}", "\nError assigning the custom claim:".red(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: &Cli) -> Result<(), BootstrapError> {
    let key = ServiceAccountKey::load(&cli.key_file)?;
    println!("\nInitializing with project: {}...", key.project_id);

    let session = AdminSession::open(&key).await?;
    tracing::info!(session = session.name(), "Session opened");

    println!("Verifying that the user with UID {} exists...", cli.uid);
    grant_admin_once(session, &cli.uid).await
}

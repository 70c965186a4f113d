use std::fs::File;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info};

use mailbox_import::gmail_client::GmailConnector;
use mailbox_import::{MailboxImporter, RunConfig};

#[derive(Parser)]
#[command(name = "mailbox-import")]
#[command(about = "Import per-user mbox archives into Gmail, one label per archive")]
#[command(version)]
struct Args {
    /// Directory containing one sub-directory per user, named after the user's email address
    #[arg(short, long)]
    dir: PathBuf,

    /// Service account JSON key (defaults to $GMAIL_CREDENTIALS_PATH)
    #[arg(short, long)]
    json: Option<PathBuf>,

    /// Index of the first message to import in each archive (0-based)
    #[arg(long, default_value_t = 0)]
    from_message: usize,

    /// Wrap Message-ID values that lack angle brackets
    #[arg(long)]
    fix_msgid: bool,

    /// Declare text/quoted-printable messages as text/plain
    #[arg(long)]
    replace_quoted_printable: bool,

    /// Attempts for each remote call before it counts as failed
    #[arg(long, default_value_t = mailbox_import::config::DEFAULT_NUM_RETRIES)]
    num_retries: u32,

    /// Write the log to this file instead of stderr
    #[arg(long)]
    log: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Charger le fichier .env s'il existe
    dotenv::dotenv().ok();

    let args = Args::parse();

    let config = RunConfig {
        root_dir: args.dir,
        credentials_path: RunConfig::credentials_from(args.json)?,
        from_message: args.from_message,
        fix_msgid: args.fix_msgid,
        replace_quoted_printable: args.replace_quoted_printable,
        num_retries: args.num_retries,
        log_file: args.log,
    };
    config.validate()?;

    init_logging(&config)?;

    info!("🚀 Starting mailbox import from {}", config.root_dir.display());

    let connector = GmailConnector::from_credentials(&config.credentials_path).await?;
    let importer = MailboxImporter::new(config, connector);

    let summary = match importer.run().await {
        Ok(summary) => summary,
        Err(e) => {
            error!("❌ Import aborted: {}", e);
            return Err(e.into());
        }
    };

    println!("{}", summary.totals);
    println!("{} user(s) failed", summary.users_failed);

    if summary.has_failures() {
        anyhow::bail!(
            "import failed for {} user(s): {}",
            summary.users_failed,
            summary.failed_users.join(", ")
        );
    }

    Ok(())
}

fn init_logging(config: &RunConfig) -> Result<()> {
    let mut builder =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));

    if let Some(path) = &config.log_file {
        let file = File::create(path)
            .with_context(|| format!("Unable to create log file {}", path.display()))?;
        builder.target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.init();
    Ok(())
}

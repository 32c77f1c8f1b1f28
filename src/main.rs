use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bank_ledger::{run, ParseMode, RunOptions, RunSummary};

/// Merge bank export files into one ledger and write reports
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Settings file listing sources, source types and categorizations
    #[arg(short, long, default_value = "settings.json")]
    config: PathBuf,

    /// Output directory (overrides the settings file)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Skip malformed rows with a warning instead of aborting
    #[arg(long, conflicts_with = "strict")]
    lenient: bool,

    /// Abort on the first malformed row
    #[arg(long)]
    strict: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

impl Args {
    fn parse_mode(&self) -> Option<ParseMode> {
        match (self.lenient, self.strict) {
            (true, _) => Some(ParseMode::Lenient),
            (_, true) => Some(ParseMode::Strict),
            _ => None,
        }
    }
}

fn init_logging(verbose: u8) -> Result<()> {
    let default_level = match verbose {
        0 => "bank_ledger=info",
        1 => "bank_ledger=debug",
        _ => "bank_ledger=trace",
    };

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| default_level.into()))
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false),
        )
        .try_init()?;
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    for source in &summary.sources {
        println!(
            "✓ {}: {} records from {} file(s)",
            source.name, source.records, source.files
        );
        if source.skipped_rows > 0 || source.skipped_files > 0 {
            println!(
                "  ⚠ skipped {} row(s), {} file(s)",
                source.skipped_rows, source.skipped_files
            );
        }
        if source.filtered > 0 {
            println!("  filtered {} row(s) outside amount bounds", source.filtered);
        }
    }
    println!(
        "✓ Ledger: {} transactions ({} duplicates removed)",
        summary.ledger_records, summary.duplicates
    );
    println!("✓ Wrote {} file(s)", summary.files_written.len());
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = init_logging(args.verbose) {
        eprintln!("warning: logging disabled: {e}");
    }

    let options = RunOptions {
        config_path: args.config.clone(),
        output_dir: args.output.clone(),
        parse_mode: args.parse_mode(),
    };

    match run(options) {
        Ok(summary) => {
            print_summary(&summary);
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ {e}");
            ExitCode::from(e.exit_code())
        }
    }
}

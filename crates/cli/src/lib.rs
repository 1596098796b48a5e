pub mod commands;

use clap::{Parser, Subcommand};
use rust_decimal::Decimal;
use std::path::PathBuf;
use std::process::ExitCode;

use claimdesk_core::config::{AppConfig, LoadOptions, LogFormat};
use commands::act::ActArgs;
use commands::queue::QueueArgs;
use commands::split::SplitBasis;

#[derive(Debug, Parser)]
#[command(
    name = "claimdesk",
    about = "ClaimDesk operator CLI",
    long_about = "Operate the ClaimDesk benefit approval store: migrations, demo data, config \
                  inspection, benefit usage, training cost splits, approver queues and \
                  single approval actions.",
    after_help = "Examples:\n  claimdesk doctor --json\n  claimdesk usage --employee E-100 --benefit childbirth\n  claimdesk split --amount 12000 --mode partial --waiver 500\n  claimdesk queue --role manager --approver M-10 --tab pending:manager --team E-100,E-200\n  claimdesk act --request seed-wedding-001 --actor M-10 --role manager --decision approve --signature sig.txt"
)]
pub struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(about = "Apply pending database migrations and return structured status output")]
    Migrate,
    #[command(about = "Load deterministic demo requests covering every approval stage")]
    Seed,
    #[command(
        about = "Inspect effective configuration values with source attribution and redaction"
    )]
    Config,
    #[command(about = "Validate config, notification and document settings, and the database")]
    Doctor {
        #[arg(long, help = "Emit machine-readable JSON output")]
        json: bool,
    },
    #[command(about = "Show an employee's childbirth or funeral benefit usage")]
    Usage {
        #[arg(long = "employee", help = "Employee id to summarise")]
        employee_id: String,
        #[arg(long, help = "childbirth or funeral")]
        benefit: String,
    },
    #[command(about = "Compute the company/employee split of a training excess")]
    Split {
        #[arg(long, conflicts_with = "amount", required_unless_present = "amount")]
        excess: Option<Decimal>,
        #[arg(long, help = "Training amount measured against the configured budget ceiling")]
        amount: Option<Decimal>,
        #[arg(long, default_value = "none", help = "none, full or partial")]
        mode: String,
        #[arg(long = "waiver", help = "Waived amount for a partial waiver")]
        waiver_amount: Option<Decimal>,
    },
    #[command(about = "Approve, reject, send back or resubmit a single request")]
    Act {
        #[arg(long = "request")]
        request_id: String,
        #[arg(long = "actor")]
        actor_id: String,
        #[arg(long = "name", help = "Name stamped on the request; defaults to the actor id")]
        actor_name: Option<String>,
        #[arg(long)]
        position: Option<String>,
        #[arg(long)]
        role: String,
        #[arg(long, help = "approve, reject, revise or resubmit")]
        decision: String,
        #[arg(long)]
        comment: Option<String>,
        #[arg(long = "signature", help = "File holding the signature image data URL")]
        signature_file: Option<PathBuf>,
        #[arg(long = "waiver-mode", help = "none, full or partial (training excess only)")]
        waiver_mode: Option<String>,
        #[arg(long = "waiver-amount")]
        waiver_amount: Option<Decimal>,
    },
    #[command(about = "List the requests an approver sees on a queue tab")]
    Queue {
        #[arg(long)]
        role: String,
        #[arg(long = "approver")]
        approver_id: String,
        #[arg(long, help = "own, pending:<stage> or history:<stage>")]
        tab: String,
        #[arg(long = "team", value_delimiter = ',', help = "Team member employee ids")]
        team_member_ids: Vec<String>,
        #[arg(long, help = "welfare or accounting")]
        partition: Option<String>,
    },
}

pub fn run() -> ExitCode {
    let cli = Cli::parse();
    if let Err(error) = init_logging() {
        eprintln!("{error:#}");
    }

    let result = match cli.command {
        Command::Migrate => commands::migrate::run(),
        Command::Seed => commands::seed::run(),
        Command::Config => {
            commands::CommandResult { exit_code: 0, output: commands::config::run() }
        }
        Command::Doctor { json } => {
            commands::CommandResult { exit_code: 0, output: commands::doctor::run(json) }
        }
        Command::Usage { employee_id, benefit } => commands::usage::run(&employee_id, &benefit),
        Command::Split { excess, amount, mode, waiver_amount } => {
            let basis = match (excess, amount) {
                (Some(excess), _) => SplitBasis::Excess(excess),
                (None, Some(amount)) => SplitBasis::Amount(amount),
                (None, None) => SplitBasis::Excess(Decimal::ZERO),
            };
            commands::split::run(basis, &mode, waiver_amount)
        }
        Command::Act {
            request_id,
            actor_id,
            actor_name,
            position,
            role,
            decision,
            comment,
            signature_file,
            waiver_mode,
            waiver_amount,
        } => commands::act::run(&ActArgs {
            request_id,
            actor_id,
            actor_name,
            position,
            role,
            decision,
            comment,
            signature_file,
            waiver_mode,
            waiver_amount,
        }),
        Command::Queue { role, approver_id, tab, team_member_ids, partition } => {
            commands::queue::run(&QueueArgs { role, approver_id, tab, team_member_ids, partition })
        }
    };

    println!("{}", result.output);
    ExitCode::from(result.exit_code)
}

/// Diagnostics go to stderr so command payloads on stdout stay machine readable. A config
/// that fails to load falls back to compact INFO; the command itself reports the error.
fn init_logging() -> anyhow::Result<()> {
    use anyhow::Context;
    use tracing::Level;

    let (level, format) = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => (config.logging.level, config.logging.format),
        Err(_) => ("info".to_string(), LogFormat::Compact),
    };
    let log_level = level.parse::<Level>().unwrap_or(Level::INFO);
    let builder = tracing_subscriber::fmt()
        .with_target(false)
        .with_max_level(log_level)
        .with_writer(std::io::stderr);

    match format {
        LogFormat::Compact => builder.compact().try_init(),
        LogFormat::Pretty => builder.pretty().try_init(),
        LogFormat::Json => builder.json().try_init(),
    }
    .map_err(|error| anyhow::anyhow!(error))
    .context("failed to install the tracing subscriber")
}

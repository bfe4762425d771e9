use anyhow::Result;
use clap::{Parser, Subcommand};
use ria_core::coach::Language;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod assist;
mod coach_cmd;
mod config;
mod gemini;
mod setup;
mod state;
mod tasks_cmd;
mod watch;

use tasks_cmd::{AddArgs, UpdateArgs};

const VERSION: &str = concat!(env!("CARGO_PKG_VERSION"), " (", env!("RIA_BUILD_SHA"), ")");

#[derive(Parser, Debug)]
#[command(name = "ria", version = VERSION, about = "Ria mission ledger, alarms and daily score")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// One-time interactive setup: timezone, language, snooze default
    Setup,

    /// Manage ~/.ria/config.toml
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Add a mission
    Add(AddArgs),

    /// List missions, newest date first
    List {
        /// Only today's missions
        #[arg(long)]
        today: bool,

        /// Only missions on this date (today, tomorrow, YYYY-MM-DD)
        #[arg(long, conflicts_with = "today")]
        date: Option<String>,
    },

    /// Show one mission in full
    Show { id: String },

    /// Edit a mission or log progress
    Update(UpdateArgs),

    /// Mark a mission 100% complete
    Done { id: String },

    /// Delete a mission (undo with `restore`)
    Delete { id: String },

    /// Bring back the last deleted mission
    Restore,

    /// Daily efficiency score
    Score {
        #[arg(long)]
        date: Option<String>,
    },

    /// Daily report book
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },

    /// Run the alarm monitor in the foreground
    Watch,

    /// Coaching insights from your missions and history
    Advice {
        /// Print the last advice instead of asking again
        #[arg(long)]
        cached: bool,
    },

    /// Hour-by-hour plan for the rest of today
    Roadmap {
        #[arg(long)]
        cached: bool,
    },

    /// Conversational mission entry
    Assist,

    /// Show or set the assistant language
    Lang { language: Option<String> },

    /// Export missions
    Export {
        #[arg(long)]
        csv: PathBuf,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default config if none exists
    Init,
    /// Print the effective config
    Show,
}

#[derive(Subcommand, Debug)]
enum ReportCommand {
    /// Snapshot a day's score into the report book
    Save {
        #[arg(long)]
        date: Option<String>,
    },
    /// List saved reports, newest first
    List,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_env("RIA_LOG").unwrap_or_else(|_| EnvFilter::new("ria=info"));
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();

    let cfg = config::load_config()?;

    match cli.command {
        Command::Setup => setup::run_setup()?,
        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
            ConfigCommand::Show => config::show_config()?,
        },
        Command::Add(args) => tasks_cmd::add(args, &cfg)?,
        Command::List { today, date } => tasks_cmd::list(date, today, &cfg)?,
        Command::Show { id } => tasks_cmd::show(&id, &cfg)?,
        Command::Update(args) => tasks_cmd::update(args, &cfg)?,
        Command::Done { id } => tasks_cmd::done(&id)?,
        Command::Delete { id } => tasks_cmd::delete(&id)?,
        Command::Restore => tasks_cmd::restore()?,
        Command::Score { date } => tasks_cmd::score(date, &cfg)?,
        Command::Report { command } => match command {
            ReportCommand::Save { date } => tasks_cmd::report_save(date, &cfg)?,
            ReportCommand::List => tasks_cmd::report_list()?,
        },
        Command::Watch => watch::run_watch(&cfg).await?,
        Command::Advice { cached } => coach_cmd::advice(&cfg, cached).await?,
        Command::Roadmap { cached } => coach_cmd::roadmap(&cfg, cached).await?,
        Command::Assist => assist::run_assist(&cfg)?,
        Command::Lang { language } => lang(language, &cfg)?,
        Command::Export { csv } => tasks_cmd::export_csv(&csv)?,
    }

    Ok(())
}

fn lang(language: Option<String>, cfg: &config::Config) -> Result<()> {
    let mut store = state::open_store()?;
    match language {
        None => println!("{}", state::language(store.storage(), cfg.general.language)),
        Some(raw) => {
            let lang: Language = raw.parse()?;
            state::set_language(store.storage_mut(), lang)?;
            println!("Language set to {lang}");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_add_with_fields() {
        let cli = Cli::try_parse_from([
            "ria", "add", "Gym", "session", "--time", "7pm", "--priority", "urgent", "--daily",
        ])
        .unwrap();
        let Command::Add(args) = cli.command else {
            panic!("expected add");
        };
        assert_eq!(args.title, ["Gym", "session"]);
        assert_eq!(args.fields.time.as_deref(), Some("7pm"));
        assert!(args.fields.daily);
    }

    #[test]
    fn list_filters_conflict() {
        assert!(Cli::try_parse_from(["ria", "list", "--today", "--date", "tomorrow"]).is_err());
    }

    #[test]
    fn update_progress_is_bounded() {
        assert!(Cli::try_parse_from(["ria", "update", "abc", "--progress", "101"]).is_err());
        assert!(Cli::try_parse_from(["ria", "update", "abc", "--progress", "100"]).is_ok());
        assert!(Cli::try_parse_from(["ria", "update", "abc", "--once", "--daily"]).is_err());
    }

    #[test]
    fn report_and_export_subcommands() {
        assert!(Cli::try_parse_from(["ria", "report", "save", "--date", "2026-03-02"]).is_ok());
        assert!(Cli::try_parse_from(["ria", "export", "--csv", "out.csv"]).is_ok());
        assert!(Cli::try_parse_from(["ria", "export"]).is_err());
    }
}

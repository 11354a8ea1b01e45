use clap::{Args, Parser, Subcommand};
use sidebar_bridge::ApplicationStatus;
use std::path::PathBuf;

use crate::logging::LogLevel;

#[derive(Parser, Debug)]
#[command(
    name = "jobbyfy",
    about = "Jobbyfy sidebar bridge: track job applications from the terminal",
    version
)]
pub struct Cli {
    #[arg(
        long,
        global = true,
        value_name = "URL",
        help = "Backend API base URL (overrides JOBBYFY__API_BASE_URL)"
    )]
    pub api_base_url: Option<String>,

    #[arg(
        long,
        global = true,
        value_name = "PATH",
        help = "Session storage file (defaults to ~/.jobbyfy/storage)"
    )]
    pub storage: Option<PathBuf>,

    #[command(flatten)]
    pub logging: LoggingArgs,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingArgs {
    #[arg(
        long = "log-level",
        global = true,
        value_enum,
        env = "JOBBYFY_LOG_LEVEL",
        default_value_t = LogLevel::Warn,
        help = "Minimum log level (error, warn, info, debug, trace)"
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-file",
        global = true,
        value_name = "PATH",
        env = "JOBBYFY_LOG_FILE",
        help = "Write logs to the specified file instead of stderr"
    )]
    pub file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Sign in and store the session
    Login(LoginArgs),
    /// Create an account, sign in and seed its profile
    Signup(SignupArgs),
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Saved jobs and their application status
    #[command(subcommand)]
    Jobs(JobsCommand),
    /// The signed-in user's profile
    #[command(subcommand)]
    Profile(ProfileCommand),
    /// Compare the stored resume against a job description
    CompareResume {
        /// File holding the job description text
        file: PathBuf,
    },
    /// Relay host-page posts read as JSON lines from stdin; posts for the
    /// host page are printed to stdout
    Listen(ListenArgs),
}

#[derive(Args, Debug, Default)]
pub struct ListenArgs {
    /// Ask the host page to scrape the posting it shows
    #[arg(long)]
    pub scrape: bool,

    /// Start an autofill with the signed-in user's profile
    #[arg(long)]
    pub fill: bool,
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    #[arg(long)]
    pub email: String,

    #[arg(long, env = "JOBBYFY_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Args, Debug)]
pub struct SignupArgs {
    #[arg(long)]
    pub name: String,

    #[arg(long)]
    pub email: String,

    #[arg(long, env = "JOBBYFY_PASSWORD", hide_env_values = true)]
    pub password: String,
}

#[derive(Subcommand, Debug)]
pub enum JobsCommand {
    /// List saved jobs
    List {
        #[arg(long, value_name = "STATUS")]
        filter: Option<ApplicationStatus>,
    },
    /// Show one saved job
    Show { id: String },
    /// Mark a job as applied
    Apply { id: String },
    /// Delete a saved job
    Delete { id: String },
    /// Set the application status of a job
    Status { id: String, status: ApplicationStatus },
    /// Send a scraped posting (JSON file) for extraction
    Extract { file: PathBuf },
}

#[derive(Subcommand, Debug)]
pub enum ProfileCommand {
    /// Print the profile
    Show,
    /// Apply the fields in a JSON file to the profile
    Update { file: PathBuf },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_job_status_update() {
        let cli = Cli::parse_from(["jobbyfy", "jobs", "status", "j1", "in_review"]);
        match cli.command {
            Command::Jobs(JobsCommand::Status { id, status }) => {
                assert_eq!(id, "j1");
                assert_eq!(status, ApplicationStatus::InReview);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn rejects_unknown_filter() {
        let err = Cli::try_parse_from(["jobbyfy", "jobs", "list", "--filter", "archived"])
            .unwrap_err();
        assert!(err.to_string().contains("archived"));
    }

    #[test]
    fn global_flags_follow_subcommands() {
        let cli = Cli::parse_from([
            "jobbyfy",
            "whoami",
            "--api-base-url",
            "http://127.0.0.1:5000/api",
            "--log-level",
            "debug",
        ]);
        assert_eq!(cli.api_base_url.as_deref(), Some("http://127.0.0.1:5000/api"));
        assert_eq!(cli.logging.level, LogLevel::Debug);
    }

    #[test]
    fn listen_flags_are_optional() {
        let cli = Cli::parse_from(["jobbyfy", "listen", "--scrape"]);
        match cli.command {
            Command::Listen(args) => {
                assert!(args.scrape);
                assert!(!args.fill);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }

    #[test]
    fn command_tree_is_consistent() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}

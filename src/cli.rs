use crate::run;
use anyhow::Result;
use clap::{Args, CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use std::fs;
use std::io;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "mergecast", version)]
#[command(
    about = "Announce merged pull requests and releases to a chat webhook",
    long_about = "mergecast watches one GitHub repository for merged pull requests and published releases, summarizes each new one with a language model, and posts it to a Discord-style webhook. Cursors in a JSON state file keep every event announced at most once."
)]
#[command(arg_required_else_help = true)]
#[command(after_long_help = "Examples:
  mergecast run --simulate
  mergecast run --live --config mergecast.toml --log logs/run.ndjson
  mergecast release --tag v1.2.0
  mergecast state
  mergecast completion zsh > ~/.zsh/completions/_mergecast
  mergecast man > mergecast.1

Environment:
  GITHUB_TOKEN          GitHub API token (optional, raises rate limits)
  OPENAI_API_KEY        Summarizer API key (fallback summaries without it)
  DISCORD_WEBHOOK_URL   Webhook for live delivery")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug, Clone, Copy, Default)]
#[group(multiple = false)]
struct ModeArgs {
    #[arg(long, help = "Print messages instead of posting; never writes state")]
    simulate: bool,
    #[arg(long, help = "Post to the webhook and persist state")]
    live: bool,
}

impl ModeArgs {
    fn simulate(self) -> Option<bool> {
        match (self.simulate, self.live) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run one pass over pull requests and releases",
        long_about = "Fetch merged pull requests and releases, announce the ones not yet seen, and record each announcement in the state file. The first run for a stream records a baseline and announces nothing."
    )]
    #[command(after_long_help = "Examples:
  mergecast run
  mergecast run --live --max-notifications 5
  mergecast run --live --state state/state.json --log logs/run.ndjson")]
    Run {
        #[arg(long, value_name = "PATH", help = "Config file (default: ./mergecast.toml)")]
        config: Option<PathBuf>,
        #[arg(long, value_name = "PATH", help = "State file (overrides [run].state_path)")]
        state: Option<PathBuf>,
        #[command(flatten)]
        mode: ModeArgs,
        #[arg(
            long,
            value_name = "N",
            help = "Most notifications per stream in this run"
        )]
        max_notifications: Option<usize>,
        #[arg(long, value_name = "PATH", help = "Write NDJSON run log to file")]
        log: Option<PathBuf>,
        #[arg(long, help = "Skip the state lock file (live runs only)")]
        no_lock: bool,
    },
    #[command(
        about = "Summarize one release by tag",
        long_about = "Fetch a single release by tag and print its summary. Never reads or writes the state file."
    )]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Examples:
  mergecast release --tag v1.2.0
  mergecast release --tag v1.2.0 --send --live")]
    Release {
        #[arg(long, value_name = "TAG", help = "Release tag to summarize")]
        tag: String,
        #[arg(long, help = "Also post the summary (live mode only)")]
        send: bool,
        #[arg(long, value_name = "PATH", help = "Config file (default: ./mergecast.toml)")]
        config: Option<PathBuf>,
        #[command(flatten)]
        mode: ModeArgs,
    },
    #[command(about = "Show stored cursors")]
    #[command(after_long_help = "Example:
  mergecast state --state state/state.json")]
    State {
        #[arg(long, value_name = "PATH", help = "Config file (default: ./mergecast.toml)")]
        config: Option<PathBuf>,
        #[arg(long, value_name = "PATH", help = "State file (overrides [run].state_path)")]
        state: Option<PathBuf>,
    },
    #[command(
        about = "Generate shell completion script",
        long_about = "Generate shell completion script for your shell. Redirect output to your shell completion directory."
    )]
    #[command(arg_required_else_help = true)]
    #[command(after_long_help = "Examples:
  mergecast completion bash > ~/.local/share/bash-completion/completions/mergecast
  mergecast completion fish > ~/.config/fish/completions/mergecast.fish")]
    Completion {
        #[arg(value_enum, value_name = "SHELL", help = "Target shell")]
        shell: Shell,
    },
    #[command(about = "Generate a man page")]
    Man {
        #[arg(
            long,
            value_name = "PATH",
            help = "Write man page to file (stdout when omitted)"
        )]
        output: Option<PathBuf>,
    },
}

pub fn run() -> Result<()> {
    dispatch(Cli::parse())
}

fn dispatch(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Run {
            config,
            state,
            mode,
            max_notifications,
            log,
            no_lock,
        } => run::execute_run(run::RunCommand {
            config,
            state,
            simulate: mode.simulate(),
            max_notifications,
            log,
            no_lock,
        }),
        Commands::Release {
            tag,
            send,
            config,
            mode,
        } => run::summarize_release(run::ReleaseCommand {
            config,
            tag,
            send,
            simulate: mode.simulate(),
        }),
        Commands::State { config, state } => run::inspect_state(config, state),
        Commands::Completion { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            clap_complete::generate(shell, &mut cmd, name, &mut io::stdout());
            Ok(())
        }
        Commands::Man { output } => {
            let man = clap_mangen::Man::new(Cli::command());
            match output {
                Some(path) => {
                    let mut bytes = Vec::new();
                    man.render(&mut bytes)?;
                    fs::write(path, bytes)?;
                }
                None => {
                    man.render(&mut io::stdout())?;
                }
            }
            Ok(())
        }
    }
}

use clap::Parser;

use vde_worktree::cli::Cli;
use vde_worktree::commands;
use vde_worktree::output::verbose_env_enabled;

fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.verbose || verbose_env_enabled() {
        "debug"
    } else {
        "off"
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .format_target(false)
        .init();

    std::process::exit(commands::run(cli));
}

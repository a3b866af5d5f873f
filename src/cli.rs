//! # Command Line Interface Module / 命令行接口模块
//!
//! Builds the localized `clap` command tree and dispatches to the `run` and
//! `init` subcommands.
//!
//! 构建本地化的 `clap` 命令树，并分派到 `run` 和 `init` 子命令。

use anyhow::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::{env, path::PathBuf};

use crate::infra::{logging, t};

pub mod commands {
    pub mod init;
    pub mod run;
}

/// Configuration file used when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "Auxiliaries.toml";

/// Help texts are localized, so `--lang` has to be known before clap runs.
/// Without it the system locale decides.
fn pre_parse_language() -> String {
    let args: Vec<String> = env::args().collect();
    if let Some(pos) = args.iter().position(|arg| arg == "--lang") {
        if let Some(lang) = args.get(pos + 1) {
            return crate::resolve_locale(lang);
        }
    }
    crate::resolve_locale(&sys_locale::get_locale().unwrap_or_else(|| "en".to_string()))
}

pub fn build_cli(locale: &str) -> Command {
    Command::new("aux-runner")
        .version(env!("CARGO_PKG_VERSION"))
        .about(t!("cli.about", locale = locale).to_string())
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("lang")
                .long("lang")
                .help(t!("cli.lang", locale = locale).to_string())
                .value_name("LANGUAGE")
                .global(true)
                .action(ArgAction::Set),
        )
        .arg(
            Arg::new("log-level")
                .long("log-level")
                .help(t!("cli.log_level", locale = locale).to_string())
                .value_name("FILTER")
                .global(true)
                .action(ArgAction::Set),
        )
        .subcommand(
            Command::new("run")
                .about(t!("cli.cmd_run_about", locale = locale).to_string())
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help(t!("cli.arg_config", locale = locale).to_string())
                        .value_name("CONFIG")
                        .default_value(DEFAULT_CONFIG_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("tag")
                        .short('t')
                        .long("tag")
                        .help(t!("cli.arg_tag", locale = locale).to_string())
                        .value_name("TAG")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("case")
                        .long("case")
                        .help(t!("cli.arg_case", locale = locale).to_string())
                        .value_name("NAME")
                        .action(ArgAction::Append),
                )
                .arg(
                    Arg::new("journal")
                        .long("journal")
                        .help(t!("cli.arg_journal", locale = locale).to_string())
                        .value_name("PATH")
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("fail-fast")
                        .long("fail-fast")
                        .help(t!("cli.arg_fail_fast", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("init")
                .about(t!("cli.cmd_init_about", locale = locale).to_string())
                .arg(
                    Arg::new("output")
                        .short('o')
                        .long("output")
                        .help(t!("cli.arg_output", locale = locale).to_string())
                        .value_name("PATH")
                        .default_value(DEFAULT_CONFIG_FILE)
                        .value_parser(clap::value_parser!(PathBuf))
                        .action(ArgAction::Set),
                )
                .arg(
                    Arg::new("non-interactive")
                        .long("non-interactive")
                        .help(t!("cli.arg_non_interactive", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .help(t!("cli.arg_force", locale = locale).to_string())
                        .action(ArgAction::SetTrue),
                ),
        )
}

pub async fn run() -> Result<()> {
    let language = pre_parse_language();
    rust_i18n::set_locale(&language);

    let matches = build_cli(&language).get_matches();
    let log_level = matches
        .subcommand()
        .and_then(|(_, sub)| sub.get_one::<String>("log-level"))
        .or_else(|| matches.get_one::<String>("log-level"));
    logging::init_logging(log_level.map(String::as_str));

    match matches.subcommand() {
        Some(("run", run_matches)) => {
            let explicit_lang = run_matches.get_one::<String>("lang").map(String::as_str);
            commands::run::execute(run_options(run_matches), explicit_lang).await?;
        }
        Some(("init", init_matches)) => {
            let output = init_matches
                .get_one::<PathBuf>("output")
                .cloned()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));
            let non_interactive = init_matches.get_flag("non-interactive");
            let force = init_matches.get_flag("force");

            // Only announce a locale nobody asked for.
            if env::args().all(|arg| arg != "--lang") && !non_interactive {
                println!(
                    "🌐 {}",
                    t!("cli.system_language_detected", locale = &language, lang = &language)
                );
            }
            commands::init::run_init(&output, &language, non_interactive, force)?;
        }
        _ => {
            // `subcommand_required` makes clap print help before we get here.
        }
    }
    Ok(())
}

fn run_options(matches: &ArgMatches) -> commands::run::RunOptions {
    let strings = |id: &str| -> Vec<String> {
        matches
            .get_many::<String>(id)
            .map(|values| values.cloned().collect())
            .unwrap_or_default()
    };
    commands::run::RunOptions {
        config: matches
            .get_one::<PathBuf>("config")
            .cloned()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE)),
        tags: strings("tag"),
        cases: strings("case"),
        journal: matches.get_one::<PathBuf>("journal").cloned(),
        fail_fast: matches.get_flag("fail-fast"),
    }
}

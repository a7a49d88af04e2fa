use std::path::PathBuf;

use reels_tui::app::{self, RunOptions};

const HELP: &str = "Reels-TUI — Scroll a short-video feed from the terminal.

  --version, -V        Show version and exit
  --help,    -h        Show this help message
  --config <path>      Read configuration from <path>
  --feed <path>        Load the feed from a YAML file instead of the built-in reels
  --print-config       Print the effective configuration and exit";

enum Action {
    Run(RunOptions),
    PrintConfig(RunOptions),
    Exit,
}

fn main() {
    let action = match parse_args(std::env::args().skip(1)) {
        Ok(action) => action,
        Err(message) => {
            eprintln!("error: {message}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    let result = match action {
        Action::Exit => return,
        Action::PrintConfig(opts) => print_config(&opts),
        Action::Run(opts) => reels_tui::run(opts),
    };

    if let Err(err) = result {
        eprintln!("error: {err:?}");
        std::process::exit(1);
    }
}

fn parse_args(args: impl Iterator<Item = String>) -> Result<Action, String> {
    let mut opts = RunOptions::default();
    let mut print = false;
    let mut args = args;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => {
                println!("Reels-TUI {}", reels_tui::VERSION);
                return Ok(Action::Exit);
            }
            "--help" | "-h" => {
                println!("{HELP}");
                return Ok(Action::Exit);
            }
            "--config" => {
                let value = args.next().ok_or("--config needs a path")?;
                opts.config_file = Some(PathBuf::from(value));
            }
            "--feed" => {
                let value = args.next().ok_or("--feed needs a path")?;
                opts.feed_file = Some(PathBuf::from(value));
            }
            "--print-config" => print = true,
            other => return Err(format!("unknown argument {other}")),
        }
    }
    if print {
        Ok(Action::PrintConfig(opts))
    } else {
        Ok(Action::Run(opts))
    }
}

fn print_config(opts: &RunOptions) -> anyhow::Result<()> {
    let cfg = app::load_config(opts)?;
    print!("{}", reels_tui::config::to_yaml(&cfg)?);
    Ok(())
}

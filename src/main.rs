use std::path::PathBuf;

use anyhow::{bail, Context, Result};

const HELP: &str = "Vidshare - comment threads, reactions and watch-time accounting.

Usage:
  vidshare replay <events.json>          Replay playback events and print watch calls
  vidshare comments <video> [--pages N]  List root comments from the configured backend

Options:
  --config <path>      Read configuration from <path>
  --version, -V        Show version and exit
  --help,    -h        Show this help message";

enum Command {
    Version,
    Help,
    Replay(PathBuf),
    Comments { video: String, pages: u32 },
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let (command, config_file) = match parse_args(std::env::args().skip(1)) {
        Ok(parsed) => parsed,
        Err(err) => {
            eprintln!("error: {err}\n\n{HELP}");
            std::process::exit(2);
        }
    };

    if let Err(err) = run(command, config_file) {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run(command: Command, config_file: Option<PathBuf>) -> Result<()> {
    match command {
        Command::Version => println!("Vidshare {}", vidshare::VERSION),
        Command::Help => println!("{HELP}"),
        Command::Replay(path) => {
            let report = vidshare::replay(&path, config_file)?;
            let stdout = std::io::stdout();
            report.write_to(&mut stdout.lock())?;
        }
        Command::Comments { video, pages } => {
            let comments = vidshare::list_comments(&video, pages, config_file)?;
            if comments.is_empty() {
                println!("No comments on {video} yet.");
            }
            for comment in &comments {
                println!("{}", vidshare::app::render_comment(comment));
            }
        }
    }
    Ok(())
}

fn parse_args(mut args: impl Iterator<Item = String>) -> Result<(Command, Option<PathBuf>)> {
    let mut command = None;
    let mut config_file = None;
    let mut pages = 1;
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--version" | "-V" => return Ok((Command::Version, None)),
            "--help" | "-h" => return Ok((Command::Help, None)),
            "--config" => {
                let path = args.next().context("--config needs a path")?;
                config_file = Some(PathBuf::from(path));
            }
            "--pages" => {
                let raw = args.next().context("--pages needs a number")?;
                pages = raw
                    .parse()
                    .with_context(|| format!("invalid page count {raw}"))?;
            }
            "replay" if command.is_none() => {
                let path = args.next().context("replay needs an events file")?;
                command = Some(Command::Replay(PathBuf::from(path)));
            }
            "comments" if command.is_none() => {
                let video = args.next().context("comments needs a video code")?;
                command = Some(Command::Comments { video, pages: 1 });
            }
            other => bail!("unexpected argument {other}"),
        }
    }
    let command = match command {
        Some(Command::Comments { video, .. }) => Command::Comments { video, pages },
        Some(command) => command,
        None => Command::Help,
    };
    Ok((command, config_file))
}

use anyhow::{Context, Result};
use obs_plugin::{bindings, config, harness, telemetry, ObsBindings};
use std::io::BufRead;
use std::path::PathBuf;

#[derive(Debug, PartialEq)]
enum Command {
    /// Run the init-check harness against `init_obs`
    Check,
    /// Init, start, wait for Enter, stop and clean up
    Stream,
    /// Write the default config file
    WriteConfig,
}

const USAGE: &str = "usage: obs-plugin [--config PATH] [check | stream | write-config]";

fn parse_args(args: &[String]) -> Result<(Command, Option<PathBuf>)> {
    let mut command = None;
    let mut config_path = None;
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let path = iter.next().context("--config needs a path")?;
                config_path = Some(PathBuf::from(path));
            }
            "check" | "stream" | "write-config" if command.is_some() => {
                anyhow::bail!("only one command may be given\n{}", USAGE);
            }
            "check" => command = Some(Command::Check),
            "stream" => command = Some(Command::Stream),
            "write-config" => command = Some(Command::WriteConfig),
            other => anyhow::bail!("unknown argument: {}\n{}", other, USAGE),
        }
    }

    Ok((command.unwrap_or(Command::Check), config_path))
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (command, config_path) = parse_args(&args)?;

    telemetry::init_subscriber(telemetry::get_subscriber("info", std::io::stderr))?;

    let config = config::load_config(config_path.as_deref())?;

    match command {
        Command::WriteConfig => {
            let path = config::save_config(&config, config_path.as_deref())?;
            println!("Wrote {}", path.display());
        }
        Command::Check => {
            bindings::install_default_bindings(ObsBindings::from_config(&config))?;
            let entry = |name: &str| -> Result<String> { Ok(obs_plugin::init_obs(name)) };
            let outcome = harness::run(Some(&entry), &mut std::io::stdout());
            obs_plugin::cleanup_obs();
            outcome?;
        }
        Command::Stream => {
            bindings::install_default_bindings(ObsBindings::from_config(&config))?;
            println!("{}", obs_plugin::init_obs(obs_plugin::APP_NAME));
            println!("{}", obs_plugin::start_obs());
            println!("Press Enter to stop the stream");
            let mut line = String::new();
            std::io::stdin().lock().read_line(&mut line)?;
            println!("{}", obs_plugin::stop_obs());
            println!("{}", obs_plugin::cleanup_obs());
        }
    }

    Ok(())
}

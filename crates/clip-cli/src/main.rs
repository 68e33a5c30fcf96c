mod api;
mod cli;
mod display;
mod obs;

use anyhow::{bail, Context};
use chrono::Local;
use clip_obs::PreviewSource;
use clip_proto::clips::scan_folder;
use clip_proto::config::Config;
use tracing_subscriber::EnvFilter;

use crate::api::DaemonApi;
use crate::cli::{Cli, Command};
use crate::display::print_clips;
use crate::obs::ObsTarget;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;

    let daemon = DaemonApi::new(cli.daemon.clone().unwrap_or_else(|| config.daemon_url()));
    let target = ObsTarget {
        address: cli.obs.clone().unwrap_or(config.obs.address.clone()),
        password: cli.password.clone().or(config.obs.password.clone()),
        source: PreviewSource::new(config.obs.input_name.clone(), config.obs.input_kind.clone()),
    };

    match cli.command {
        Command::Scan { folder } => {
            let clips =
                scan_folder(&folder).with_context(|| format!("cannot read {:?}", folder))?;
            print_clips(&clips);
        }

        Command::SetFolder {
            folder,
            allow_empty,
        } => {
            let folder = folder
                .canonicalize()
                .with_context(|| format!("no such folder: {:?}", folder))?;
            let clips =
                scan_folder(&folder).with_context(|| format!("cannot read {:?}", folder))?;
            if clips.is_empty() && !allow_empty {
                bail!(
                    "no video clips in {:?} (pass --allow-empty to watch it anyway)",
                    folder
                );
            }
            let config = daemon
                .set_folder(&folder.to_string_lossy(), Some(clips.clone()))
                .await?;
            if let Some(watched) = config.clips_folder {
                println!("Watching {}", watched.display());
            }
            print_clips(&clips);
        }

        Command::Config => {
            let config = daemon.config().await?;
            match config.clips_folder {
                Some(folder) => println!("{}", folder.display()),
                None => println!("No folder configured"),
            }
        }

        Command::Clips => print_clips(&daemon.clips().await?),

        Command::Refresh => print_clips(&daemon.refresh().await?),

        Command::Follow => {
            daemon
                .follow(|clips| {
                    println!("── {} ──", Local::now().format("%H:%M:%S"));
                    print_clips(&clips);
                })
                .await?;
            println!("Daemon closed the push channel");
        }

        Command::Preview { path, .. } => {
            let clip_path = match path {
                Some(path) => path
                    .canonicalize()
                    .with_context(|| format!("no such clip: {:?}", path))?
                    .to_string_lossy()
                    .into_owned(),
                None => daemon
                    .clips()
                    .await?
                    .into_iter()
                    .next()
                    .map(|clip| clip.path)
                    .context("the daemon has no clips yet")?,
            };
            obs::preview(&target, &clip_path).await?;
            println!("Sent to OBS preview: {}", clip_path);
        }

        Command::Events { event_types } => obs::watch_events(&target, &event_types).await?,
    }

    Ok(())
}

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{
    filter::LevelFilter, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter,
};

mod analysis;
mod app;
mod cli;
mod config;
mod eid;
mod embeddings;
mod search;
mod songs;
mod storage;
#[cfg(test)]
mod tests;
mod web;

use app::{AppBackend, AppFactory, SongUpload};
use eid::Eid;

const LOG_ENV: &str = "SOUNDWAVE_LOG";

fn main() -> anyhow::Result<()> {
    let args = cli::Args::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var(LOG_ENV)
                .from_env_lossy(),
        )
        .try_init()?;

    let paths = AppFactory::get_paths()?;
    let app = AppFactory::create_local_app(&paths)?;

    match args.command {
        cli::Command::Daemon { listen } => {
            let listen = listen.unwrap_or_else(|| app.config().server.listen.clone());
            web::start_daemon(app, &listen)
        }

        cli::Command::Search { query, count } => {
            let results = app.search(&query)?;

            if count {
                println!("{} songs found", results.len());
                return Ok(());
            }

            println!("{}", serde_json::to_string_pretty(&results)?);
            Ok(())
        }

        cli::Command::Upload { file } => {
            let data = std::fs::read(&file)
                .with_context(|| format!("failed to read {}", file.display()))?;
            let filename = file
                .file_name()
                .map(|name| name.to_string_lossy().to_string())
                .unwrap_or_default();
            let content_type = infer::get(&data).map(|kind| kind.mime_type().to_string());

            let report = app.upload(SongUpload {
                filename,
                data,
                content_type,
            })?;

            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }

        cli::Command::Recent { limit } => {
            let songs = app.recent(limit)?;
            let songs = songs.iter().map(web::SongEntry::from).collect::<Vec<_>>();
            println!("{}", serde_json::to_string_pretty(&songs)?);
            Ok(())
        }

        cli::Command::Show { id } => {
            let id = Eid::from(id);
            let song = app.get(&id)?;
            println!("{}", serde_json::to_string_pretty(&web::SongEntry::from(&song))?);
            Ok(())
        }
    }
}

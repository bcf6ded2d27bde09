use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Start the http server.
    Daemon {
        /// Address to listen on. Overrides `server.listen` in config.yaml
        #[clap(short, long)]
        listen: Option<String>,
    },
    /// Search songs by meaning, falling back to text matches and newest songs
    Search {
        /// Free text query. Empty lists the newest songs
        #[clap(default_value = "", allow_hyphen_values = true)]
        query: String,

        /// Print the count
        #[clap(short = 'c', long, default_value = "false")]
        count: bool,
    },
    /// Analyse, embed and store an audio file
    Upload {
        /// Path to the audio file
        file: PathBuf,
    },
    /// List the newest songs
    Recent {
        /// Number of songs to show. Defaults to one page
        #[clap(short = 'n', long)]
        limit: Option<usize>,
    },
    /// Show a stored song
    Show {
        /// Song id
        id: String,
    },
}

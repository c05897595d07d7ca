use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(version, about = "Build and inspect filesys disk images")]
pub struct Cli {
    /// Disk image
    #[arg(long, short, default_value = "fs.img")]
    pub image: PathBuf,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Create a fresh image and format it
    Format {
        /// Image size in sectors
        #[arg(long, short, default_value_t = 16 * 2048)]
        sectors: usize,

        /// Entries reserved in the root directory
        #[arg(long, default_value_t = filesys::ROOT_DIR_ENTRIES)]
        root_entries: usize,
    },

    /// Copy every regular file of a host directory into the image
    Put {
        /// Host source directory
        source: PathBuf,

        /// Target directory inside the image
        #[arg(default_value = "/")]
        target: String,
    },

    /// Create a directory
    Mkdir {
        path: String,

        /// Entries reserved in the new directory
        #[arg(long, default_value_t = 16)]
        entries: usize,
    },

    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
    },

    /// Print a file to stdout
    Cat { path: String },

    /// Remove a file or an empty directory
    Rm { path: String },

    /// Show sector usage
    Df,
}

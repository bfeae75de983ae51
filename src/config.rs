//! Config module for imagenet-dl

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::catalog::{LIST_URL, SYNSET_URL, WORDS_URL};
use crate::split::SplitOptions;
use crate::util::default_workers;

#[derive(Parser, Debug, Clone)]
#[clap(name = "imagenet-dl", version, about)]
pub struct Config {
    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Download the images of one or more synsets
    Download(DownloadConfig),
    /// Split class directories into train and valid subsets
    Split(SplitConfig),
}

#[derive(Args, Debug, Clone)]
pub struct DownloadConfig {
    /// Real classname of the images, also the name of the directory they are saved in.
    /// Without synset ids, comma-separated terms to search the synset list for.
    pub classname: String,

    /// Comma-separated ImageNet synset ids to download
    #[clap(value_delimiter = ',')]
    pub wnids: Vec<String>,

    /// Destination root (without classname) where images are downloaded
    #[clap(short, long, env = "IMGDL_DEST", default_value = "./")]
    pub dest: PathBuf,

    /// Timeout in seconds for a single image request
    #[clap(short, long, env = "IMGDL_TIMEOUT", default_value_t = 5)]
    pub timeout: u64,

    /// Number of parallel download workers
    #[clap(short, long, env = "IMGDL_NUM_WORKERS", default_value_t = default_workers())]
    pub num_workers: usize,

    /// Work queue capacity, defaults to the number of workers
    #[clap(long, env = "IMGDL_QUEUE_CAPACITY")]
    pub queue_capacity: Option<usize>,

    /// CSV file keeping track of downloaded images
    #[clap(short, long, env = "IMGDL_CSV", default_value = "./data.csv")]
    pub csv: PathBuf,

    /// Listing endpoint, `{wnid}` is replaced by the synset id
    #[clap(long, env = "IMGDL_LISTING_URL", default_value = LIST_URL)]
    pub listing_url: String,

    /// Synset word list used by search mode
    #[clap(long, env = "IMGDL_WORDS_URL", default_value = WORDS_URL)]
    pub words_url: String,

    /// Synset page printed next to search results
    #[clap(long, env = "IMGDL_SYNSET_URL", default_value = SYNSET_URL)]
    pub synset_url: String,
}

impl DownloadConfig {
    /// Synset ids with blanks removed
    pub fn get_valid_wnids(&self) -> Vec<String> {
        self.wnids
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout)
    }

    pub fn queue_capacity(&self) -> usize {
        self.queue_capacity.unwrap_or(self.num_workers)
    }

    pub fn synset_page(&self, wnid: &str) -> String {
        self.synset_url.replace("{wnid}", wnid)
    }
}

#[derive(Args, Debug, Clone)]
pub struct SplitConfig {
    /// Directory to take images from
    pub src: PathBuf,

    /// Split every class directory found in SRC, ignores --classname
    #[clap(short, long)]
    pub all: bool,

    /// Only write the CSV files, do not copy images
    #[clap(short = 'C', long)]
    pub csv_only: bool,

    /// Where train/ and valid/ directories and CSV files are written
    #[clap(short, long, env = "IMGDL_SPLIT_DEST", default_value = ".")]
    pub dest: PathBuf,

    /// Real classname, defaults to the basename of SRC
    #[clap(short, long)]
    pub classname: Option<String>,

    /// Fraction of images used for validation
    #[clap(short, long, default_value_t = 0.2)]
    pub frac: f64,

    /// Seed for reproducible sampling
    #[clap(long, env = "IMGDL_SEED")]
    pub seed: Option<u64>,
}

impl SplitConfig {
    pub fn options(&self) -> SplitOptions {
        SplitOptions {
            dest: self.dest.clone(),
            frac: self.frac,
            csv_only: self.csv_only,
        }
    }

    pub fn classname(&self) -> String {
        self.classname
            .clone()
            .filter(|c| !c.is_empty())
            .or_else(|| {
                self.src
                    .file_name()
                    .and_then(|n| n.to_str())
                    .map(String::from)
            })
            .unwrap_or_else(|| "unknown".to_string())
    }
}

pub fn config() -> Config {
    Config::parse()
}

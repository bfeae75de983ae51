use std::sync::Arc;

use imagenet_dl::catalog::{Catalog, build_batch};
use imagenet_dl::config::{self, Command, DownloadConfig, SplitConfig};
use imagenet_dl::downloader::{DownloadUnit, Fetcher, Pipeline, prepare_destination};
use imagenet_dl::error::Error;
use imagenet_dl::ledger::Ledger;
use imagenet_dl::split::{split_all, split_class};
use imagenet_dl::validator::Validator;
use rand::{SeedableRng, rngs::StdRng};
use tracing_subscriber::EnvFilter;

async fn download(config: DownloadConfig) -> color_eyre::Result<()> {
    let fetcher = Fetcher::new()?;
    let catalog = Catalog::new(
        fetcher.client().clone(),
        &config.listing_url,
        &config.words_url,
    );

    let wnids = config.get_valid_wnids();
    if wnids.is_empty() {
        tracing::info!("No synset id given, searching the synset list");
        println!("You didn't provide ID, choose in the list");
        for synset in catalog.search(&config.classname).await? {
            println!(
                "{} {} See results at: {}",
                synset.wnid,
                synset.terms,
                config.synset_page(&synset.wnid)
            );
        }
        return Ok(());
    }

    prepare_destination(&config.dest).await?;

    let listings = catalog.resolve(&wnids).await?;
    let items = build_batch(&listings, &config.classname);
    if items.is_empty() {
        tracing::warn!("Listings contain no usable image URL, nothing to download");
        return Ok(());
    }

    let unit = DownloadUnit::new(
        Arc::new(Ledger::new(config.csv.clone())),
        fetcher,
        Validator::new(),
        config.dest.clone(),
        config.timeout(),
    );
    let pipeline =
        Pipeline::new(unit, config.num_workers).with_queue_capacity(config.queue_capacity());

    let summary = pipeline.run(items).await;
    tracing::info!(
        "Done: {} (ledger: {})",
        summary,
        config.csv.display()
    );
    Ok(())
}

async fn split(config: SplitConfig) -> color_eyre::Result<()> {
    let options = config.options();
    let classname = config.classname();

    let reports = tokio::task::spawn_blocking(move || {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        if config.all {
            split_all(&config.src, &options, &mut rng)
        } else {
            split_class(&config.src, &classname, &options, &mut rng)
                .map(|report| vec![(classname, report)])
        }
    })
    .await
    .map_err(Error::from)??;

    for (classname, report) in reports {
        tracing::info!(
            "{}: {} validation images, {} train images",
            classname,
            report.valid.len(),
            report.train.len()
        );
    }
    Ok(())
}

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    match config::config().command {
        Command::Download(download_config) => download(download_config).await,
        Command::Split(split_config) => split(split_config).await,
    }
}

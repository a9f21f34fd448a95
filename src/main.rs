use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::Parser as _;

use bookshelf_enricher::cli::{BannerArgs, Cli, Command, LookupArgs};
use bookshelf_enricher::config::{Config, ProviderConfig};
use bookshelf_enricher::isbn::Isbn;
use bookshelf_enricher::pipeline::{self, Pipeline};
use bookshelf_enricher::{banner, http};

fn main() -> ExitCode {
    if let Err(err) = try_main() {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

fn try_main() -> anyhow::Result<()> {
    bookshelf_enricher::logging::init().context("init logging")?;

    let cli = Cli::parse();
    tracing::debug!(?cli, "parsed cli");

    match cli.command {
        Command::Run(args) => {
            if args.interval_secs == 0 {
                anyhow::bail!("--interval-secs must be > 0");
            }
            let config = Config::from_args(&args.service).context("load config")?;
            let pipeline = Pipeline::from_config(&config).context("build pipeline")?;
            pipeline::run_loop(
                &pipeline,
                Duration::from_secs(args.interval_secs),
                args.max_ticks,
            )
            .context("run")?;
        }
        Command::Once(args) => {
            let config = Config::from_args(&args).context("load config")?;
            let pipeline = Pipeline::from_config(&config).context("build pipeline")?;
            let report = pipeline.process_batch().context("once")?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        Command::Lookup(args) => lookup(args).context("lookup")?,
        Command::Banner(args) => render(args).context("banner")?,
    }

    Ok(())
}

fn lookup(args: LookupArgs) -> anyhow::Result<()> {
    let isbn = Isbn::parse(&args.isbn).context("--isbn must not be empty")?;
    let config = ProviderConfig::from_args(&args.providers)?;
    let client = http::build_client(config.http_timeout)?;

    let book = pipeline::build_metadata_chain(&config, &client).resolve(&isbn)?;
    let cover_url = pipeline::build_cover_resolver(&config, &client).resolve(&isbn, &book);

    let out = serde_json::json!({ "book": book, "cover_url": cover_url });
    println!("{}", serde_json::to_string_pretty(&out)?);
    Ok(())
}

fn render(args: BannerArgs) -> anyhow::Result<()> {
    let bytes = std::fs::read(&args.input).with_context(|| format!("read {}", args.input))?;
    let Some(image) = banner::render_banner(&bytes)? else {
        anyhow::bail!(
            "cover is smaller than {min}x{min}: {}",
            args.input,
            min = banner::MIN_COVER_EDGE
        );
    };
    let jpeg = banner::encode_jpeg(&image)?;
    std::fs::write(&args.out, jpeg).with_context(|| format!("write {}", args.out))?;
    tracing::info!(out = %args.out, "banner written");
    Ok(())
}

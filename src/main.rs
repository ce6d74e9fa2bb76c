use std::{path::PathBuf, sync::Arc};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rand::{rngs::StdRng, SeedableRng};
use tracing_subscriber::EnvFilter;

mod api;
mod catalog;
mod config;
mod controller;
mod error;
mod events;
mod io;
mod prompts;
mod providers;

use catalog::Catalog;
use config::AppCfg;
use controller::Controller;
use providers::{ImageProvider, ImagenProvider, MockProvider};

#[derive(Parser)]
#[command(name = "jargonviz", about = "Illustrate crypto slang with an image generation model")]
struct Cli {
    /// YAML config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run the local HTTP API.
    Serve {
        #[arg(long)]
        bind: Option<String>,
    },
    /// Generate one image and write it to disk.
    Generate {
        #[arg(long)]
        term: String,
        #[arg(long)]
        style: Option<String>,
        #[arg(long, default_value = "out/jargonviz.png")]
        out: PathBuf,
    },
    /// Print the available terms and styles.
    Catalog,
}

fn build_provider(cfg: &AppCfg) -> Arc<dyn ImageProvider> {
    match cfg.provider.kind.as_str() {
        "mock" => Arc::new(MockProvider),
        _ => {
            let key = cfg.api_key().unwrap_or_else(|| {
                tracing::warn!(env = %cfg.provider.api_key_env, "API key not set; requests will be rejected upstream");
                String::new()
            });
            Arc::new(ImagenProvider::new(cfg.provider.api_base.clone(), cfg.provider.model.clone(), key))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let cfg = AppCfg::load(cli.config.as_deref()).await?;
    let catalog = Arc::new(
        Catalog::load(cfg.catalog.prompts_path.as_deref(), cfg.catalog.styles_path.as_deref()).await?,
    );

    if let Cmd::Catalog = cli.cmd {
        println!("Terms:");
        for term in catalog.prompts.terms() {
            println!("  {term}");
        }
        println!("Styles:");
        for s in catalog.styles.styles() {
            println!("  {:<16} {}", s.name, s.description);
        }
        return Ok(());
    }

    let provider = build_provider(&cfg);
    let rng = match cfg.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };
    tracing::info!(provider = provider.name(), model = %cfg.provider.model, "provider ready");
    let ctl = Controller::new(catalog, provider, rng);

    match cli.cmd {
        Cmd::Serve { bind } => api::serve(bind.unwrap_or(cfg.bind), ctl).await,
        Cmd::Generate { term, style, out } => {
            if let Some(s) = &style {
                ctl.set_style(s);
            }
            let res = ctl.select_term(&term).run().await
                .with_context(|| format!("generation failed for \"{term}\""))?;
            let style = ctl.snapshot().selected_style;
            let sidecar = io::save_output(&out, &term, &style, &res).await?;
            println!("Wrote {} ({} bytes) and {}", out.display(), res.bytes.len(), sidecar.display());
            Ok(())
        }
        Cmd::Catalog => Ok(()),
    }
}

use anyhow::Context as _;
use clap::Parser;
use fs_err as fs;
use tracing_subscriber::EnvFilter;

use pptpilot::bench::{self, BenchOptions};
use pptpilot::cli::{Args, Command};
use pptpilot::config::{Config, Credentials};
use pptpilot::pipeline::EditPipeline;
use pptpilot::provider::Gateway;
use pptpilot::wire::EditRequest;
use pptpilot::{package, ux};

fn init_tracing(debug: bool) {
    let default = if debug { "pptpilot=debug" } else { "pptpilot=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).init();
}

fn pipeline(cfg: &Config, args: &Args) -> anyhow::Result<EditPipeline> {
    let creds = Credentials::load(&args.credentials)?;
    tracing::debug!("credentials: {creds:?}");
    Ok(EditPipeline::new(cfg.clone(), Gateway::new(&cfg.gateway, &creds)))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let cfg = Config::load(args.config.as_deref())?;

    match &args.command {
        Command::Edit(e) => {
            let model = e.model.clone().unwrap_or_else(|| cfg.model.clone());
            let mut req = EditRequest::for_package(e.prompt.clone(), model, e.package.clone(), &cfg);
            if let Some(out) = &e.output {
                req.output = out.clone();
            }
            if let Some(p) = &e.summary {
                let raw = fs::read_to_string(p)?;
                req.summary = Some(serde_json::from_str(&raw).with_context(|| format!("parsing {}", p.display()))?);
            }
            req.images = e.images.clone();

            let outcome = pipeline(&cfg, &args)?.run(&req).await?;
            ux::print_outcome(&outcome);
        }
        Command::Extract(x) => {
            if x.list {
                for name in package::list_members(&x.package)? {
                    println!("{name}");
                }
            } else if let Some(name) = &x.member {
                match package::read_member(&x.package, name)? {
                    Some(text) => println!("{text}"),
                    None => anyhow::bail!("{name} is not a member of {}", x.package.display()),
                }
            } else {
                let dest = match &x.dest {
                    Some(d) => d.clone(),
                    None => EditRequest::for_package("", "", x.package.clone(), &cfg).scratch,
                };
                let extraction = package::extract_markup(&x.package, &dest)?;
                ux::print_extraction(&extraction);
            }
        }
        Command::Bench(b) => {
            let opts = BenchOptions {
                corpus: b.corpus.clone(),
                decks: b.decks.clone(),
                model: b.model.clone().unwrap_or_else(|| cfg.model.clone()),
                workers: b.workers.unwrap_or(cfg.bench.workers),
                max_prompts: b.max_prompts.unwrap_or(cfg.bench.max_prompts),
                runs_dir: b.runs_dir.clone().unwrap_or_else(|| cfg.bench.runs_dir.clone()),
            };
            let (_, summary) = bench::run(&pipeline(&cfg, &args)?, &opts).await?;
            ux::print_bench_summary(&summary);
        }
    }
    Ok(())
}

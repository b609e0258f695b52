use std::{num::NonZeroUsize, path::PathBuf, process};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use log::info;
use orchestra::{MessagePassing, RunConfig, RunReport, SharedMemory, collective, run, run_local};
use tokio::{net::TcpListener, signal};

const DEFAULT_ADDR: &str = "127.0.0.1:5000";

#[derive(Parser)]
#[command(
    name = "digit-orchestra",
    version = env!("CARGO_PKG_VERSION"),
    about = "Data parallel training and inference of a handwritten digit classifier"
)]
struct Cli {
    /// JSON run configuration, defaults apply to every missing field.
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,

    #[command(subcommand)]
    mode: Mode,
}

#[derive(Args)]
struct Overrides {
    #[arg(long, global = true)]
    train: Option<PathBuf>,
    #[arg(long, global = true)]
    test: Option<PathBuf>,
    #[arg(long, global = true)]
    output: Option<PathBuf>,
    #[arg(long, global = true)]
    epochs: Option<NonZeroUsize>,
    #[arg(long, global = true)]
    batch_size: Option<NonZeroUsize>,
    #[arg(long, global = true)]
    learning_rate: Option<f32>,
    #[arg(long, global = true)]
    hidden: Option<NonZeroUsize>,
    #[arg(long, global = true)]
    seed: Option<u64>,
}

#[derive(Subcommand)]
enum Mode {
    /// Accumulate batches and fan them out to a thread pool.
    Threads {
        #[arg(long)]
        threads: Option<NonZeroUsize>,
    },

    /// Message passing between workers living in this process.
    Local {
        #[arg(long, default_value = "4")]
        workers: NonZeroUsize,
    },

    /// Wait for `workers - 1` workers over TCP and lead the run.
    Coordinator {
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,
        #[arg(long, default_value = "4")]
        workers: NonZeroUsize,
    },

    /// Join a coordinator over TCP.
    Worker {
        #[arg(long, default_value = DEFAULT_ADDR)]
        addr: String,
        #[arg(long, default_value = "20")]
        attempts: NonZeroUsize,
    },
}

impl Cli {
    fn run_config(&self) -> Result<RunConfig> {
        let mut config = match &self.config {
            Some(path) => RunConfig::from_json_file(path)
                .with_context(|| format!("loading configuration from {}", path.display()))?,
            None => RunConfig::default(),
        };

        let o = &self.overrides;
        if let Some(train) = &o.train {
            config.train = train.clone();
        }
        if let Some(test) = &o.test {
            config.test = test.clone();
        }
        if let Some(output) = &o.output {
            config.output = output.clone();
        }
        if let Some(epochs) = o.epochs {
            config.epochs = epochs;
        }
        if let Some(batch_size) = o.batch_size {
            config.batch_size = batch_size;
        }
        if let Some(learning_rate) = o.learning_rate {
            config.learning_rate = learning_rate;
        }
        if let Some(hidden) = o.hidden {
            config.hidden = hidden;
        }
        if let Some(seed) = o.seed {
            config.seed = seed;
        }

        if let Mode::Threads {
            threads: Some(threads),
        } = self.mode
        {
            config.threads = Some(threads);
        }

        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let cli = Cli::parse();
    let config = cli.run_config()?;
    let mut run = tokio::spawn(run_mode(cli.mode, config));

    tokio::select! {
        joined = &mut run => {
            if let Some(report) = joined?? {
                println!("{report}");
            }
        }
        _ = signal::ctrl_c() => {
            info!("received SIGINT, exiting");
            // Training may be in the middle of a blocking section, don't wait for it.
            process::exit(130);
        }
    }

    Ok(())
}

async fn run_mode(mode: Mode, config: RunConfig) -> Result<Option<RunReport>> {
    let outcome = match mode {
        Mode::Threads { .. } => {
            let mut strategy = SharedMemory::new(config.threads(), config.settings())?;
            info!(threads = strategy.threads(); "running on a thread pool");
            run(&mut strategy, &config).await?
        }
        Mode::Local { workers } => {
            info!(workers = workers.get(); "running a local group");
            run_local(workers, &config).await?
        }
        Mode::Coordinator { addr, workers } => {
            let listener = TcpListener::bind(&addr)
                .await
                .with_context(|| format!("binding {addr}"))?;
            info!("listening at {addr}");

            let comm = collective::accept(&listener, workers).await?;
            let mut strategy = MessagePassing::new(comm, config.settings());
            run(&mut strategy, &config).await?
        }
        Mode::Worker { addr, attempts } => {
            let comm = collective::connect(addr.as_str(), attempts)
                .await
                .with_context(|| format!("joining the coordinator at {addr}"))?;
            info!(rank = comm.rank(); "joined the group");

            // Training knobs come from the coordinator, local ones are ignored.
            let mut strategy = MessagePassing::new(comm, config.settings());
            run(&mut strategy, &config).await?
        }
    };

    Ok(outcome.report)
}

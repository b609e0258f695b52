use std::{fmt, num::NonZeroUsize};

use log::{debug, info, warn};
use machine_learning::{Classifier, Network};
use tokio::task::JoinSet;

use crate::{
    OrchestraErr, Result,
    collective,
    config::RunConfig,
    gather,
    monitor::{PhaseReport, ResourceMonitor},
    strategy::{MessagePassing, Strategy, TrainSummary},
};

/// What the coordinator has to say once a run is over.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub training: PhaseReport,
    pub inference: PhaseReport,
    pub summary: TrainSummary,
    pub predictions: usize,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}", self.training)?;
        writeln!(f, "{}", self.inference)?;
        write!(f, "Predicted {} samples", self.predictions)
    }
}

/// A finished run.
#[derive(Debug)]
pub struct Outcome<M> {
    /// The model as trained by this worker.
    pub model: M,
    /// The report of the run on the coordinator, `None` on any other worker.
    pub report: Option<RunReport>,
}

/// Runs the digit network through `strategy`, see [`run_with`].
pub async fn run<S: Strategy>(strategy: &mut S, config: &RunConfig) -> Result<Outcome<Network>> {
    run_with(strategy, config, |config| {
        Ok(Network::digits(config.hidden.get(), config.seed)?)
    })
    .await
}

/// Agrees on the training knobs, builds a model out of them with `build`, trains it and
/// predicts the test rows, as dictated by `strategy`. The coordinator writes the predictions
/// out.
///
/// On failure every other worker is told to give up before the error is returned, unless the
/// failure came from them in the first place.
pub async fn run_with<S, M, F>(strategy: &mut S, config: &RunConfig, build: F) -> Result<Outcome<M>>
where
    S: Strategy,
    M: Classifier,
    F: FnOnce(&RunConfig) -> Result<M> + Send,
{
    match run_phases(strategy, config, build).await {
        Ok(outcome) => {
            strategy.finish().await?;
            Ok(outcome)
        }
        Err(e) => {
            if !matches!(e, OrchestraErr::Aborted(_) | OrchestraErr::Net(_)) {
                if let Err(abort_err) = strategy.abort(&e.to_string()).await {
                    warn!("failed to notify the other workers: {abort_err}");
                }
            }

            Err(e)
        }
    }
}

async fn run_phases<S, M, F>(strategy: &mut S, config: &RunConfig, build: F) -> Result<Outcome<M>>
where
    S: Strategy,
    M: Classifier,
    F: FnOnce(&RunConfig) -> Result<M> + Send,
{
    let config = strategy.agree(config).await?;
    let mut model = build(&config)?;

    let coordinator = strategy.is_coordinator();
    let mut monitor = ResourceMonitor::new();

    let before = monitor.snapshot();
    let summary = strategy.train(&mut model, &config.train).await?;
    let training = monitor.report("training", before);

    if coordinator {
        info!(
            samples = summary.samples,
            full_batches = summary.full_batches,
            partial_batches = summary.partial_batches;
            "done reading and training"
        );
        info!("{training}");
    }

    let before = monitor.snapshot();
    let predictions = strategy.infer(&model, &config.test).await?;
    let inference = monitor.report("inference", before);

    let Some(predictions) = predictions else {
        return Ok(Outcome {
            model,
            report: None,
        });
    };

    gather::write_submission(&config.output, &predictions)?;
    info!("{inference}");

    let report = RunReport {
        training,
        inference,
        summary,
        predictions: predictions.len(),
    };

    Ok(Outcome {
        model,
        report: Some(report),
    })
}

/// Runs the message passing variant with `world` workers inside this process.
pub async fn run_local(world: NonZeroUsize, config: &RunConfig) -> Result<Outcome<Network>> {
    let mut group = collective::local_world(world).into_iter();
    let coordinator = group
        .next()
        .ok_or_else(|| OrchestraErr::Protocol("a group has at least one worker".into()))?;

    let mut peers = JoinSet::new();
    for comm in group {
        let mut strategy = MessagePassing::new(comm, config.settings());
        let config = config.clone();
        peers.spawn(async move { run(&mut strategy, &config).await });
    }

    let mut strategy = MessagePassing::new(coordinator, config.settings());
    let outcome = run(&mut strategy, config).await;
    // Peers still blocked on a collective see the pipes close.
    drop(strategy);

    while let Some(joined) = peers.join_next().await {
        match joined? {
            Ok(_) => {}
            Err(e) if outcome.is_ok() => return Err(e),
            Err(e) => debug!("peer failed after the coordinator: {e}"),
        }
    }

    outcome
}

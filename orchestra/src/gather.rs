use std::{fs::File, path::Path};

use log::info;

use crate::{OrchestraErr, Result, partition::PartitionPlan};

/// The predictions of one worker, `offset` being the global index of the first one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partial {
    pub offset: usize,
    pub labels: Vec<u8>,
}

/// One predicted label per input row, in input order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PredictionVector {
    labels: Vec<u8>,
}

impl PredictionVector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            labels: Vec::with_capacity(capacity),
        }
    }

    /// Places the partial result of every worker by its global offset.
    ///
    /// `partials` must be in rank order and each one must match, both in offset and length,
    /// the range the plan assigns to its rank.
    pub fn assemble(plan: &PartitionPlan, partials: Vec<Partial>) -> Result<Self> {
        if partials.len() != plan.workers() {
            return Err(OrchestraErr::Protocol(format!(
                "gathered {} partial results for {} workers",
                partials.len(),
                plan.workers()
            )));
        }

        let mut predictions = Self::with_capacity(plan.total());
        for (rank, partial) in partials.into_iter().enumerate() {
            let expected = plan.range(rank);
            if partial.offset != expected.start || partial.labels.len() != expected.len() {
                return Err(OrchestraErr::Protocol(format!(
                    "worker {rank} returned {} labels at offset {}, its partition is {expected:?}",
                    partial.labels.len(),
                    partial.offset
                )));
            }

            predictions.append(&partial.labels);
        }

        Ok(predictions)
    }

    /// Appends the labels of the rows that follow the current ones.
    pub fn append(&mut self, labels: &[u8]) {
        self.labels.extend_from_slice(labels);
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn labels(&self) -> &[u8] {
        &self.labels
    }
}

/// Writes `ImageId,Label` followed by one 1-indexed line per prediction.
pub fn write_submission(path: impl AsRef<Path>, predictions: &PredictionVector) -> Result<()> {
    let path = path.as_ref();
    let file = File::create(path).map_err(|e| OrchestraErr::io(path, e))?;
    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(file);

    writer
        .write_record(["ImageId", "Label"])
        .map_err(|e| OrchestraErr::csv(path, e))?;

    for (index, label) in predictions.labels().iter().enumerate() {
        writer
            .write_record([(index + 1).to_string(), label.to_string()])
            .map_err(|e| OrchestraErr::csv(path, e))?;
    }

    writer.flush().map_err(|e| OrchestraErr::io(path, e))?;
    info!(rows = predictions.len(); "predictions written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::{fs, num::NonZeroUsize};

    use super::*;

    fn plan(total: usize, workers: usize) -> PartitionPlan {
        PartitionPlan::new(total, NonZeroUsize::new(workers).unwrap())
    }

    #[test]
    fn partials_are_placed_in_rank_order() {
        let partials = vec![
            Partial { offset: 0, labels: vec![1, 2] },
            Partial { offset: 2, labels: vec![3, 4] },
            Partial { offset: 4, labels: vec![5] },
        ];

        let predictions = PredictionVector::assemble(&plan(5, 3), partials).unwrap();
        assert_eq!(predictions.labels(), &[1, 2, 3, 4, 5]);
    }

    #[test]
    fn empty_partitions_contribute_nothing() {
        let partials = vec![
            Partial { offset: 0, labels: vec![9] },
            Partial { offset: 1, labels: vec![] },
            Partial { offset: 1, labels: vec![] },
        ];

        let predictions = PredictionVector::assemble(&plan(1, 3), partials).unwrap();
        assert_eq!(predictions.labels(), &[9]);
    }

    #[test]
    fn misplaced_partial_is_rejected() {
        let partials = vec![
            Partial { offset: 0, labels: vec![1, 2] },
            Partial { offset: 3, labels: vec![3] },
        ];

        let err = PredictionVector::assemble(&plan(3, 2), partials).unwrap_err();
        assert!(matches!(err, OrchestraErr::Protocol(_)));
    }

    #[test]
    fn short_partial_is_rejected() {
        let partials = vec![
            Partial { offset: 0, labels: vec![1] },
            Partial { offset: 2, labels: vec![3] },
        ];

        assert!(PredictionVector::assemble(&plan(3, 2), partials).is_err());
    }

    #[test]
    fn missing_worker_is_rejected() {
        let partials = vec![Partial { offset: 0, labels: vec![1, 2] }];
        assert!(PredictionVector::assemble(&plan(3, 2), partials).is_err());
    }

    #[test]
    fn submission_is_one_indexed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submission.csv");
        let mut predictions = PredictionVector::new();
        predictions.append(&[7, 2]);
        predictions.append(&[1]);

        write_submission(&path, &predictions).unwrap();
        assert_eq!(
            fs::read_to_string(&path).unwrap(),
            "ImageId,Label\n1,7\n2,2\n3,1\n"
        );
    }

    #[test]
    fn no_predictions_means_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("submission.csv");

        write_submission(&path, &PredictionVector::new()).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "ImageId,Label\n");
    }

    #[test]
    fn unwritable_output_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("submission.csv");

        let err = write_submission(&path, &PredictionVector::new()).unwrap_err();
        assert!(matches!(err, OrchestraErr::Io { .. }));
    }
}

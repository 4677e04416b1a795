use std::collections::BTreeMap;

use log::warn;
use machine_learning::arch::NormUpdate;
use ndarray::Array2;

/// The losses and normalization updates left once every replica of a step has been collected.
#[derive(Debug, Default)]
pub struct Collected {
    /// The mean of each loss over the replicas that reported it.
    pub losses: BTreeMap<&'static str, f32>,
    /// The normalization updates of the last-built replica.
    pub norm_updates: Vec<NormUpdate>,
    /// The samples of the last-built replica.
    pub samples: BTreeMap<&'static str, Array2<f32>>,
}

/// Gathers the scalar losses and normalization updates of every replica of a step.
///
/// Only the updates of the replica with the highest device index are retained, whatever the
/// order passes are collected in.
#[derive(Debug, Default)]
pub struct LossCollector {
    sums: BTreeMap<&'static str, (f64, usize)>,
    last: Option<usize>,
    norm_updates: Vec<NormUpdate>,
    samples: BTreeMap<&'static str, Array2<f32>>,
}

impl LossCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Collects the output of the replica bound to `device`.
    ///
    /// # Arguments
    /// * `device` - The device index of the replica.
    /// * `losses` - The replica's scalar losses.
    /// * `norm_updates` - The replica's pending normalization updates.
    /// * `samples` - The replica's per stage outputs.
    pub fn collect(
        &mut self,
        device: usize,
        losses: BTreeMap<&'static str, f32>,
        norm_updates: Vec<NormUpdate>,
        samples: BTreeMap<&'static str, Array2<f32>>,
    ) {
        for (name, loss) in losses {
            if !loss.is_finite() {
                warn!(device = device, loss = name, value = loss; "non finite loss");
            }

            let (sum, count) = self.sums.entry(name).or_default();
            *sum += loss as f64;
            *count += 1;
        }

        if self.last.is_none_or(|last| device > last) {
            self.last = Some(device);
            self.norm_updates = norm_updates;
            self.samples = samples;
        }
    }

    /// Returns the device whose updates are currently retained.
    pub fn retained_device(&self) -> Option<usize> {
        self.last
    }

    pub fn finish(self) -> Collected {
        let losses = self
            .sums
            .into_iter()
            .map(|(name, (sum, count))| (name, (sum / count as f64) as f32))
            .collect();

        Collected {
            losses,
            norm_updates: self.norm_updates,
            samples: self.samples,
        }
    }
}

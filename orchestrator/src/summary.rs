use std::collections::BTreeMap;

use ndarray::{Array2, ArrayViewD};

use crate::aggregation::AveragedGradient;

const BUCKETS: usize = 10;

/// The distribution of the values of a tensor.
#[derive(Debug, Clone, PartialEq)]
pub struct Histogram {
    pub min: f64,
    pub max: f64,
    pub count: usize,
    pub sum: f64,
    pub sum_squares: f64,
    /// The inclusive upper limit of each bucket.
    pub bucket_limits: Vec<f64>,
    pub buckets: Vec<usize>,
}

impl Histogram {
    /// Builds the histogram of the finite values of `values` over evenly spaced buckets.
    pub fn of(values: ArrayViewD<f32>) -> Self {
        let finite = || values.iter().map(|&v| v as f64).filter(|v| v.is_finite());

        let (min, max) = finite().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

        let mut histogram = Self {
            min,
            max,
            count: 0,
            sum: 0.,
            sum_squares: 0.,
            bucket_limits: Vec::new(),
            buckets: Vec::new(),
        };

        if min > max {
            histogram.min = 0.;
            histogram.max = 0.;
            return histogram;
        }

        let width = (max - min) / BUCKETS as f64;
        histogram.bucket_limits = (1..=BUCKETS).map(|i| min + width * i as f64).collect();
        histogram.bucket_limits[BUCKETS - 1] = max;
        histogram.buckets = vec![0; BUCKETS];

        for v in finite() {
            let bucket = if width > 0. {
                (((v - min) / width) as usize).min(BUCKETS - 1)
            } else {
                0
            };

            histogram.buckets[bucket] += 1;
            histogram.count += 1;
            histogram.sum += v;
            histogram.sum_squares += v * v;
        }

        histogram
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.;
        }

        self.sum / self.count as f64
    }
}

/// What a train op publishes after each step.
///
/// Every value is either averaged over the replicas or taken from the last-built one, never
/// from an arbitrary replica.
#[derive(Debug, Clone)]
pub struct Summary {
    /// The global step after the commit.
    pub step: u64,
    /// The mean of each loss over the replicas.
    pub losses: BTreeMap<&'static str, f32>,
    /// One histogram per averaged gradient, named `<param>/gradients`.
    pub histograms: Vec<(String, Histogram)>,
    /// The output of each stage of the last-built replica.
    pub samples: BTreeMap<&'static str, Array2<f32>>,
}

impl Summary {
    pub(crate) fn histograms_of<'a, I>(grads: I) -> Vec<(String, Histogram)>
    where
        I: IntoIterator<Item = &'a AveragedGradient>,
    {
        grads
            .into_iter()
            .map(|g| {
                let name = format!("{}/gradients", g.param.name());
                (name, Histogram::of(g.grad.view()))
            })
            .collect()
    }

    /// Looks up the histogram of the gradient of `param`.
    pub fn histogram(&self, param: &str) -> Option<&Histogram> {
        self.histograms
            .iter()
            .find(|(name, _)| name.strip_suffix("/gradients") == Some(param))
            .map(|(_, histogram)| histogram)
    }
}

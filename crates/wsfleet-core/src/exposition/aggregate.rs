use super::parse::{parse, Exposition};
use crate::error::Result;

/// Fleet-wide view assembled from one scrape per worker.
///
/// Values are summed across workers for every metric kind. Averaging a gauge
/// across workers would hide load, so there is deliberately no `mean`.
#[derive(Debug, Clone, Default)]
pub struct FleetView {
    workers: Vec<Exposition>,
}

impl FleetView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from raw scrape bodies, one per worker target.
    pub fn from_scrapes<I, S>(scrapes: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut view = Self::new();
        for body in scrapes {
            view.push_scrape(body.as_ref())?;
        }
        Ok(view)
    }

    pub fn push_scrape(&mut self, body: &str) -> Result<()> {
        self.workers.push(parse(body)?);
        Ok(())
    }

    pub fn push(&mut self, exp: Exposition) {
        self.workers.push(exp);
    }

    pub fn worker_count(&self) -> usize {
        self.workers.len()
    }

    /// Per-target value of `sample_name` (summed over label sets within the target).
    pub fn per_worker(&self, sample_name: &str) -> Vec<f64> {
        self.workers.iter().map(|w| w.sum(sample_name)).collect()
    }

    /// Service total of `sample_name` across all targets.
    pub fn total(&self, sample_name: &str) -> f64 {
        self.per_worker(sample_name).into_iter().sum()
    }

    /// Service total restricted to samples whose `label` equals `value`
    /// (e.g. one histogram bucket: `total_where("x_bucket", "le", "0.5")`).
    pub fn total_where(&self, sample_name: &str, label: &str, value: &str) -> f64 {
        self.workers
            .iter()
            .flat_map(|w| w.samples())
            .filter(|s| s.name == sample_name && s.label(label) == Some(value))
            .map(|s| s.value)
            .sum()
    }
}

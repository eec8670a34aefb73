use std::{
	fmt,
	sync::atomic::{AtomicU64, Ordering},
};

use tokio::sync::watch;

/// Latest known progress of a run
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProgressSnapshot {
	transports: Vec<(String, f64)>,
	overall: f64,
}

impl ProgressSnapshot {
	/// Unweighted mean of every known per transport fraction
	#[must_use]
	pub const fn overall(&self) -> f64 {
		self.overall
	}

	#[must_use]
	pub fn fraction(&self, transport_name: &str) -> Option<f64> {
		self.transports
			.iter()
			.find(|(name, _)| name == transport_name)
			.map(|(_, fraction)| *fraction)
	}

	/// Per transport fractions, in the order transports first reported
	#[must_use]
	pub fn transports(&self) -> &[(String, f64)] {
		&self.transports
	}

	/// One `name: pct%` line per transport
	#[must_use]
	pub fn status_text(&self) -> String {
		self.to_string()
	}

	fn update(&mut self, transport_name: &str, fraction: f64) {
		if let Some((_, current)) = self
			.transports
			.iter_mut()
			.find(|(name, _)| name == transport_name)
		{
			*current = fraction;
		} else {
			self.transports.push((transport_name.to_string(), fraction));
		}

		#[allow(clippy::cast_precision_loss)]
		let known = self.transports.len() as f64;
		self.overall = self.transports.iter().map(|(_, fraction)| fraction).sum::<f64>() / known;
	}
}

impl fmt::Display for ProgressSnapshot {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		for (name, fraction) in &self.transports {
			writeln!(f, "{name}: {:.2}%", fraction * 100.0)?;
		}

		Ok(())
	}
}

/// Combines progress reports of every transport of a run.
///
/// Reports are published on a watch channel, so pollers only ever see the latest snapshot.
#[derive(Debug)]
pub struct ProgressAggregator {
	total: AtomicU64,
	tx: watch::Sender<ProgressSnapshot>,
}

impl Default for ProgressAggregator {
	fn default() -> Self {
		Self::new()
	}
}

impl ProgressAggregator {
	#[must_use]
	pub fn new() -> Self {
		Self {
			total: AtomicU64::new(0),
			tx: watch::Sender::new(ProgressSnapshot::default()),
		}
	}

	/// Sets the denominator of every fraction, the count of objects being sent
	pub fn set_total(&self, total: u64) {
		self.total.store(total, Ordering::Release);
	}

	#[must_use]
	pub fn subscribe(&self) -> watch::Receiver<ProgressSnapshot> {
		self.tx.subscribe()
	}

	/// Records that `transport_name` has sent `sent` objects so far
	pub fn report(&self, transport_name: &str, sent: u64) {
		let total = self.total.load(Ordering::Acquire);

		#[allow(clippy::cast_precision_loss)]
		let fraction = if total == 0 {
			1.0
		} else {
			(sent as f64 / total as f64).min(1.0)
		};

		self.tx
			.send_modify(|snapshot| snapshot.update(transport_name, fraction));
	}

	#[must_use]
	pub fn snapshot(&self) -> ProgressSnapshot {
		self.tx.borrow().clone()
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn overall_is_the_unweighted_mean() {
		let aggregator = ProgressAggregator::new();
		aggregator.set_total(10);

		aggregator.report("T0", 2);
		aggregator.report("T1", 6);
		aggregator.report("T2", 10);

		let snapshot = aggregator.snapshot();
		assert!((snapshot.overall() - 0.6).abs() < 1e-9);
		assert_eq!(snapshot.fraction("T1"), Some(0.6));
	}

	#[test]
	fn later_reports_replace_earlier_ones() {
		let aggregator = ProgressAggregator::new();
		aggregator.set_total(4);

		aggregator.report("T0", 1);
		aggregator.report("T0", 4);

		let snapshot = aggregator.snapshot();
		assert_eq!(snapshot.transports().len(), 1);
		assert!((snapshot.overall() - 1.0).abs() < f64::EPSILON);
	}

	#[test]
	fn status_text_lists_every_transport() {
		let aggregator = ProgressAggregator::new();
		aggregator.set_total(8);

		aggregator.report("Cache", 8);
		aggregator.report("T0", 2);

		assert_eq!(
			aggregator.snapshot().status_text(),
			"Cache: 100.00%\nT0: 25.00%\n"
		);
	}

	#[tokio::test]
	async fn subscribers_see_the_latest_value() {
		let aggregator = ProgressAggregator::new();
		let mut rx = aggregator.subscribe();
		aggregator.set_total(2);

		aggregator.report("T0", 1);
		aggregator.report("T0", 2);

		rx.changed().await.expect("aggregator dropped");
		assert_eq!(rx.borrow_and_update().fraction("T0"), Some(1.0));
	}
}

//! Per-(identity, endpoint) admission buckets that bound concurrent outstanding calls.
//!
//! Each bucket is a capacity-as-concurrency-limit token bucket: a token is taken when a call
//! starts and handed back when it finishes, so the controller behaves like a non-blocking
//! N-way semaphore per endpoint. Admission is fail-fast; a denied caller gets
//! [`Admission::Denied`] immediately and decides how to back off.
//!
//! Leaked grants are reclaimed by two redundant mechanisms: a cancellable timer task per grant
//! and a periodic sweep over every bucket. Both only run inside a Tokio runtime; without one,
//! stale grants are reclaimed when the same bucket is acquired again or when
//! [`AdmissionController::sweep_expired`] is driven manually.

mod permit;

pub use permit::AdmissionPermit;

// crates.io
use tokio::{
	runtime::Handle,
	task::AbortHandle,
	time::{self, Instant},
};
use uuid::Uuid;
// self
use crate::{
	_prelude::*,
	auth::AppId,
	config::{CapacityTable, GatewayConfig},
	obs::{self, AdmissionOutcome},
};

/// Settings consumed by the [`AdmissionController`].
#[derive(Clone, Debug)]
pub struct AdmissionConfig {
	/// Per-endpoint capacities.
	pub capacities: CapacityTable,
	/// Age after which an unreleased grant is force-released.
	pub grant_timeout: StdDuration,
	/// Interval of the background sweep.
	pub sweep_interval: StdDuration,
}
impl Default for AdmissionConfig {
	fn default() -> Self {
		Self {
			capacities: CapacityTable::default(),
			grant_timeout: GatewayConfig::DEFAULT_GRANT_TIMEOUT,
			sweep_interval: GatewayConfig::DEFAULT_SWEEP_INTERVAL,
		}
	}
}

/// Unique handle for one consumed bucket slot.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct GrantId(Uuid);
impl GrantId {
	fn generate() -> Self {
		Self(Uuid::new_v4())
	}
}
impl Display for GrantId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		Display::fmt(&self.0, f)
	}
}

/// Composite bucket key: one bucket per identity and endpoint.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BucketKey {
	/// Identity that owns the bucket.
	pub app_id: AppId,
	/// Endpoint path the bucket guards.
	pub endpoint: String,
}
impl BucketKey {
	/// Builds the key for an identity/endpoint pair.
	pub fn new(app_id: &AppId, endpoint: &str) -> Self {
		Self { app_id: app_id.clone(), endpoint: endpoint.to_owned() }
	}
}
impl Display for BucketKey {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "{}:{}", self.app_id, self.endpoint)
	}
}

/// Outcome of [`AdmissionController::acquire`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
	/// A slot was consumed; release it with the returned id.
	Granted(GrantId),
	/// The bucket is exhausted.
	Denied,
}
impl Admission {
	/// Returns `true` when a slot was granted.
	pub fn is_granted(&self) -> bool {
		matches!(self, Self::Granted(_))
	}

	/// Returns the grant id, if granted.
	pub fn grant_id(&self) -> Option<GrantId> {
		match self {
			Self::Granted(id) => Some(*id),
			Self::Denied => None,
		}
	}
}

/// Point-in-time view of one bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BucketSnapshot {
	/// Fixed capacity.
	pub capacity: u32,
	/// Slots currently free.
	pub available: u32,
	/// Grants currently held.
	pub outstanding: u32,
}

#[derive(Debug)]
struct Grant {
	issued_at: Instant,
	timer: Option<AbortHandle>,
}
impl Grant {
	fn cancel_timer(&self) {
		if let Some(timer) = &self.timer {
			timer.abort();
		}
	}
}

#[derive(Debug)]
struct Bucket {
	capacity: u32,
	available: u32,
	grants: HashMap<GrantId, Grant>,
}
impl Bucket {
	fn new(capacity: u32) -> Self {
		Self { capacity, available: capacity, grants: HashMap::new() }
	}

	fn take_back(&mut self, id: &GrantId) -> bool {
		match self.grants.remove(id) {
			Some(grant) => {
				grant.cancel_timer();

				self.available = (self.available + 1).min(self.capacity);

				true
			},
			None => false,
		}
	}

	fn reclaim_expired(&mut self, now: Instant, timeout: StdDuration) -> usize {
		let expired = self
			.grants
			.iter()
			.filter(|(_, grant)| now.saturating_duration_since(grant.issued_at) >= timeout)
			.map(|(id, _)| *id)
			.collect::<Vec<_>>();

		expired.iter().filter(|id| self.take_back(id)).count()
	}

	fn snapshot(&self) -> BucketSnapshot {
		BucketSnapshot {
			capacity: self.capacity,
			available: self.available,
			outstanding: self.grants.len() as u32,
		}
	}
}

#[derive(Debug)]
struct Shared {
	config: AdmissionConfig,
	buckets: Mutex<HashMap<BucketKey, Bucket>>,
	sweeper: Mutex<Option<AbortHandle>>,
}
impl Shared {
	fn release(&self, key: &BucketKey, id: GrantId, outcome: AdmissionOutcome) -> bool {
		let released =
			self.buckets.lock().get_mut(key).is_some_and(|bucket| bucket.take_back(&id));

		if released {
			obs::record_admission(outcome);

			if matches!(outcome, AdmissionOutcome::Reclaimed) {
				crate::obs_event!(warn, bucket = %key, grant = %id, "Force-released a stale grant.");
			}
		}

		released
	}

	fn sweep(&self) -> usize {
		let now = Instant::now();
		let timeout = self.config.grant_timeout;
		let reclaimed = self
			.buckets
			.lock()
			.values_mut()
			.map(|bucket| bucket.reclaim_expired(now, timeout))
			.sum::<usize>();

		for _ in 0..reclaimed {
			obs::record_admission(AdmissionOutcome::Reclaimed);
		}
		if reclaimed > 0 {
			crate::obs_event!(warn, reclaimed, "Sweep reclaimed stale grants.");
		}

		reclaimed
	}
}
impl Drop for Shared {
	fn drop(&mut self) {
		if let Some(sweeper) = self.sweeper.get_mut().take() {
			sweeper.abort();
		}

		for bucket in self.buckets.get_mut().values() {
			bucket.grants.values().for_each(Grant::cancel_timer);
		}
	}
}

/// Shared admission controller; clones refer to the same bucket table.
///
/// Pass one instance to every gateway that talks to the same vendor account so their calls
/// are accounted against the same buckets.
#[derive(Clone, Debug)]
pub struct AdmissionController(Arc<Shared>);
impl AdmissionController {
	/// Creates a controller with an empty bucket table.
	pub fn new(config: AdmissionConfig) -> Self {
		Self(Arc::new(Shared {
			config,
			buckets: Mutex::new(HashMap::new()),
			sweeper: Mutex::new(None),
		}))
	}

	/// Returns the configuration the controller was built with.
	pub fn config(&self) -> &AdmissionConfig {
		&self.0.config
	}

	/// Looks up the capacity configured for `endpoint`.
	pub fn capacity(&self, endpoint: &str) -> u32 {
		self.0.config.capacities.capacity(endpoint)
	}

	/// Tries to consume one slot of the (identity, endpoint) bucket without waiting.
	pub fn acquire(&self, app_id: &AppId, endpoint: &str) -> Admission {
		self.ensure_sweeper();

		let key = BucketKey::new(app_id, endpoint);
		let now = Instant::now();
		let mut buckets = self.0.buckets.lock();
		let bucket =
			buckets.entry(key.clone()).or_insert_with(|| Bucket::new(self.capacity(endpoint)));

		if bucket.available == 0 {
			for _ in 0..bucket.reclaim_expired(now, self.0.config.grant_timeout) {
				obs::record_admission(AdmissionOutcome::Reclaimed);
			}
		}
		if bucket.available == 0 {
			drop(buckets);
			obs::record_admission(AdmissionOutcome::Denied);
			crate::obs_event!(debug, bucket = %key, "Admission denied; bucket exhausted.");

			return Admission::Denied;
		}

		let id = GrantId::generate();
		let timer = self.schedule_forced_release(key, id);

		bucket.available -= 1;
		bucket.grants.insert(id, Grant { issued_at: now, timer });
		drop(buckets);
		obs::record_admission(AdmissionOutcome::Granted);

		Admission::Granted(id)
	}

	/// Like [`AdmissionController::acquire`] but returns a guard that releases on drop.
	pub fn try_admit(&self, app_id: &AppId, endpoint: &str) -> Option<AdmissionPermit> {
		self.acquire(app_id, endpoint)
			.grant_id()
			.map(|id| AdmissionPermit::new(self.clone(), BucketKey::new(app_id, endpoint), id))
	}

	/// Returns a slot to its bucket.
	///
	/// Idempotent: unknown buckets and unknown or already released grants are ignored. Returns
	/// `true` only when this call actually released the grant.
	pub fn release(&self, app_id: &AppId, endpoint: &str, grant: GrantId) -> bool {
		self.release_key(&BucketKey::new(app_id, endpoint), grant)
	}

	/// Runs one sweep pass, force-releasing every grant older than the timeout.
	pub fn sweep_expired(&self) -> usize {
		self.0.sweep()
	}

	/// Returns the current accounting of a bucket, if it exists.
	pub fn snapshot(&self, app_id: &AppId, endpoint: &str) -> Option<BucketSnapshot> {
		self.0.buckets.lock().get(&BucketKey::new(app_id, endpoint)).map(Bucket::snapshot)
	}

	pub(crate) fn release_key(&self, key: &BucketKey, grant: GrantId) -> bool {
		self.0.release(key, grant, AdmissionOutcome::Released)
	}

	fn schedule_forced_release(&self, key: BucketKey, id: GrantId) -> Option<AbortHandle> {
		let handle = Handle::try_current().ok()?;
		let shared = Arc::downgrade(&self.0);
		let timeout = self.0.config.grant_timeout;
		let task = handle.spawn(async move {
			time::sleep(timeout).await;

			if let Some(shared) = shared.upgrade() {
				shared.release(&key, id, AdmissionOutcome::Reclaimed);
			}
		});

		Some(task.abort_handle())
	}

	fn ensure_sweeper(&self) {
		let mut sweeper = self.0.sweeper.lock();

		// A finished sweeper belonged to a runtime that has since shut down.
		if sweeper.as_ref().is_some_and(|task| !task.is_finished()) {
			return;
		}

		let Ok(handle) = Handle::try_current() else {
			return;
		};
		let shared: Weak<Shared> = Arc::downgrade(&self.0);
		let period = self.0.config.sweep_interval;
		let task = handle.spawn(async move {
			let mut ticker = time::interval_at(Instant::now() + period, period);

			loop {
				ticker.tick().await;

				match shared.upgrade() {
					Some(shared) => {
						shared.sweep();
					},
					None => break,
				}
			}
		});

		*sweeper = Some(task.abort_handle());
	}
}
impl Default for AdmissionController {
	fn default() -> Self {
		Self::new(AdmissionConfig::default())
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;
	use crate::config::CapacityRule;

	fn app(value: &str) -> AppId {
		AppId::new(value).expect("App identifier fixture should be valid.")
	}

	fn controller(capacity: u32) -> AdmissionController {
		AdmissionController::new(AdmissionConfig {
			capacities: CapacityTable::new([CapacityRule::new("/a", capacity)], 5),
			grant_timeout: StdDuration::from_secs(120),
			sweep_interval: StdDuration::from_secs(60),
		})
	}

	fn assert_conserved(controller: &AdmissionController, app_id: &AppId, endpoint: &str) {
		let snapshot =
			controller.snapshot(app_id, endpoint).expect("Bucket should exist after acquire.");

		assert_eq!(snapshot.available + snapshot.outstanding, snapshot.capacity);
	}

	#[test]
	fn never_grants_beyond_capacity() {
		let controller = controller(3);
		let app_id = app("ak_cap");
		let grants = (0..5)
			.map(|_| {
				let admission = controller.acquire(&app_id, "/a/list");

				assert_conserved(&controller, &app_id, "/a/list");

				admission
			})
			.collect::<Vec<_>>();

		assert_eq!(grants.iter().filter(|admission| admission.is_granted()).count(), 3);
		assert_eq!(grants[3], Admission::Denied);

		let snapshot = controller.snapshot(&app_id, "/a/list").expect("Bucket should exist.");

		assert_eq!(snapshot, BucketSnapshot { capacity: 3, available: 0, outstanding: 3 });
	}

	#[test]
	fn buckets_are_isolated_per_identity_and_endpoint() {
		let controller = controller(1);
		let first = app("ak_first");
		let second = app("ak_second");

		assert!(controller.acquire(&first, "/a").is_granted());
		assert!(!controller.acquire(&first, "/a").is_granted());
		assert!(controller.acquire(&second, "/a").is_granted());
		assert!(controller.acquire(&first, "/b").is_granted());
		assert_eq!(controller.capacity("/b"), 5);
	}

	#[test]
	fn release_is_idempotent_and_ignores_unknown_grants() {
		let controller = controller(1);
		let app_id = app("ak_release");
		let grant = controller.acquire(&app_id, "/a").grant_id().expect("First acquire succeeds.");

		assert!(controller.release(&app_id, "/a", grant));
		assert!(!controller.release(&app_id, "/a", grant));
		assert!(!controller.release(&app_id, "/a", GrantId::generate()));
		assert!(!controller.release(&app("ak_unknown"), "/zzz", grant));
		assert_conserved(&controller, &app_id, "/a");

		let snapshot = controller.snapshot(&app_id, "/a").expect("Bucket should exist.");

		assert_eq!(snapshot.available, 1);
	}

	#[test]
	fn permit_releases_once_on_drop() {
		let controller = controller(1);
		let app_id = app("ak_permit");

		{
			let permit = controller.try_admit(&app_id, "/a").expect("First admit succeeds.");

			assert!(controller.try_admit(&app_id, "/a").is_none());
			assert!(!controller.release(&app_id, "/a", GrantId::generate()));

			let _ = permit.grant_id();
		}

		let permit = controller.try_admit(&app_id, "/a").expect("Slot returns after drop.");

		assert!(permit.release());
		assert_conserved(&controller, &app_id, "/a");
	}

	#[test]
	fn works_without_a_runtime() {
		let controller = controller(2);
		let app_id = app("ak_no_runtime");

		assert!(controller.acquire(&app_id, "/a").is_granted());
		assert!(controller.0.sweeper.lock().is_none());
		assert_eq!(controller.sweep_expired(), 0);
	}

	#[test]
	fn sweeper_restarts_after_its_runtime_shuts_down() {
		let controller = controller(2);
		let app_id = app("ak_sweeper");
		let runtime = || {
			tokio::runtime::Builder::new_current_thread()
				.enable_time()
				.build()
				.expect("Tokio runtime should build.")
		};
		let first = runtime();
		let grant = first
			.block_on(async { controller.acquire(&app_id, "/b").grant_id() })
			.expect("First acquire succeeds.");

		assert!(controller.release(&app_id, "/b", grant));

		drop(first);

		assert!(controller.0.sweeper.lock().as_ref().is_some_and(AbortHandle::is_finished));

		let second = runtime();

		second.block_on(async {
			assert!(controller.acquire(&app_id, "/b").is_granted());
			assert!(controller.0.sweeper.lock().as_ref().is_some_and(|task| !task.is_finished()));
		});
	}
}

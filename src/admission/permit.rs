// self
use crate::{
	_prelude::*,
	admission::{AdmissionController, BucketKey, GrantId},
};

/// RAII guard over one granted slot.
///
/// The slot goes back to its bucket exactly once: through [`AdmissionPermit::release`], or when
/// the guard is dropped (early return, error, or a cancelled future).
#[must_use = "dropping the permit releases the slot immediately"]
#[derive(Debug)]
pub struct AdmissionPermit {
	controller: AdmissionController,
	key: BucketKey,
	grant: GrantId,
	released: bool,
}
impl AdmissionPermit {
	pub(crate) fn new(controller: AdmissionController, key: BucketKey, grant: GrantId) -> Self {
		Self { controller, key, grant, released: false }
	}

	/// Returns the id of the held grant.
	pub fn grant_id(&self) -> GrantId {
		self.grant
	}

	/// Returns the bucket the grant belongs to.
	pub fn bucket(&self) -> &BucketKey {
		&self.key
	}

	/// Releases the slot now. Returns `false` when the grant was already reclaimed by the
	/// timeout or the sweep.
	pub fn release(mut self) -> bool {
		self.released = true;

		self.controller.release_key(&self.key, self.grant)
	}
}
impl Drop for AdmissionPermit {
	fn drop(&mut self) {
		if !self.released {
			self.released = true;
			self.controller.release_key(&self.key, self.grant);
		}
	}
}

//! Vendor-assigned application identifier; the unit of credentials and admission buckets.

// std
use std::{borrow::Borrow, ops::Deref};
// self
use crate::_prelude::*;

const APP_ID_MAX_LEN: usize = 128;

/// Error returned when app identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("App identifier cannot be empty.")]
	Empty,
	/// The identifier contains whitespace characters.
	#[error("App identifier contains whitespace.")]
	ContainsWhitespace,
	/// The identifier exceeded the allowed byte length.
	#[error("App identifier exceeds {max} bytes.")]
	TooLong {
		/// Maximum permitted length.
		max: usize,
	},
}

/// Vendor application id (`appId`) identifying one caller.
///
/// The raw bytes double as the signing key material, so the value is kept verbatim once it
/// passes validation.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct AppId(String);
impl AppId {
	/// Creates a new identifier after validation.
	pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
		let view = value.as_ref();

		validate(view)?;

		Ok(Self(view.to_owned()))
	}

	/// Returns the identifier as a string slice.
	pub fn as_str(&self) -> &str {
		&self.0
	}
}
impl Deref for AppId {
	type Target = str;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}
impl AsRef<str> for AppId {
	fn as_ref(&self) -> &str {
		&self.0
	}
}
impl Borrow<str> for AppId {
	fn borrow(&self) -> &str {
		&self.0
	}
}
impl From<AppId> for String {
	fn from(value: AppId) -> Self {
		value.0
	}
}
impl TryFrom<String> for AppId {
	type Error = IdentifierError;

	fn try_from(value: String) -> Result<Self, Self::Error> {
		validate(&value)?;

		Ok(Self(value))
	}
}
impl FromStr for AppId {
	type Err = IdentifierError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		Self::new(s)
	}
}
impl Debug for AppId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		write!(f, "AppId({})", self.0)
	}
}
impl Display for AppId {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(&self.0)
	}
}

fn validate(view: &str) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty);
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace);
	}
	if view.len() > APP_ID_MAX_LEN {
		return Err(IdentifierError::TooLong { max: APP_ID_MAX_LEN });
	}

	Ok(())
}

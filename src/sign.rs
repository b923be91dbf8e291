//! Deterministic request signatures.
//!
//! The vendor authenticates every business call with a `sign` parameter derived from the full
//! parameter set:
//!
//! 1. `app_key` and `timestamp` are merged in when the caller did not supply them.
//! 2. `sign` and empty-string values are dropped; `null` is kept.
//! 3. Keys are sorted by code point and joined as `key=value` pairs with `&`, where arrays and
//!    objects serialize as canonical JSON and `null` as the literal `null`.
//! 4. The joined string is hashed with MD5 (uppercase hex).
//! 5. The hex digest is encrypted with AES-ECB/PKCS#7, keyed by the app id padded with `'0'` to
//!    16, 24, or 32 bytes (or truncated to 32), Base64-encoded, and percent-encoded.

// crates.io
use aes::{
	Aes128, Aes192, Aes256,
	cipher::{BlockCipher, BlockEncryptMut, KeyInit, block_padding::Pkcs7},
};
use base64::{Engine, engine::general_purpose::STANDARD};
use md5::{Digest, Md5};
// self
use crate::{_prelude::*, auth::AppId};

/// Business parameters plus the common authentication parameters.
pub type Params = Map<String, Value>;

/// Access token parameter name.
pub const ACCESS_TOKEN_PARAM: &str = "access_token";
/// App key parameter name (carries the app id).
pub const APP_KEY_PARAM: &str = "app_key";
/// Signature parameter name.
pub const SIGN_PARAM: &str = "sign";
/// Unix-seconds timestamp parameter name.
pub const TIMESTAMP_PARAM: &str = "timestamp";

const KEY_PAD: u8 = b'0';

/// Signature computation failures.
#[derive(Debug, PartialEq, Eq, ThisError)]
pub enum SignError {
	/// Derived key length is not accepted by the block cipher.
	#[error("Signing key has an unsupported length of {len} bytes.")]
	InvalidKeyLength {
		/// Length of the rejected key.
		len: usize,
	},
}

/// Current Unix time in whole seconds; generated per attempt, never cached.
pub fn unix_timestamp() -> i64 {
	OffsetDateTime::now_utc().unix_timestamp()
}

/// Inserts `app_key` and `timestamp` unless the caller already supplied them.
pub fn merge_common(params: &mut Params, app_id: &AppId, timestamp: i64) {
	params
		.entry(APP_KEY_PARAM.to_owned())
		.or_insert_with(|| Value::String(app_id.as_str().to_owned()));
	params.entry(TIMESTAMP_PARAM.to_owned()).or_insert_with(|| Value::from(timestamp));
}

/// Renders the sorted `key=value&...` string the digest is computed over.
pub fn canonical_string(params: &Params) -> String {
	let sorted = params
		.iter()
		.filter(|(key, value)| {
			key.as_str() != SIGN_PARAM && !matches!(value, Value::String(s) if s.is_empty())
		})
		.collect::<BTreeMap<_, _>>();
	let mut buf = String::new();

	for (idx, (key, value)) in sorted.into_iter().enumerate() {
		if idx > 0 {
			buf.push('&');
		}

		buf.push_str(key);
		buf.push('=');
		buf.push_str(&value_text(value));
	}

	buf
}

/// Uppercase hexadecimal MD5 digest of `canonical`.
pub fn digest(canonical: &str) -> String {
	hex::encode_upper(Md5::digest(canonical.as_bytes()))
}

/// Pads or truncates the app id into a 16, 24, or 32 byte AES key.
pub fn derive_key(app_id: &str) -> Vec<u8> {
	let mut key = app_id.as_bytes().to_vec();
	let target = match key.len() {
		0..16 => 16,
		16 | 24 | 32 => key.len(),
		17..24 => 24,
		25..32 => 32,
		_ => 32,
	};

	key.resize(target, KEY_PAD);

	key
}

/// Encrypts the hex digest with the app-id-derived key and returns the Base64 ciphertext.
pub fn encrypt_digest(app_id: &str, hex_digest: &str) -> Result<String, SignError> {
	let key = derive_key(app_id);
	let ciphertext = match key.len() {
		16 => encrypt_ecb::<Aes128>(&key, hex_digest.as_bytes())?,
		24 => encrypt_ecb::<Aes192>(&key, hex_digest.as_bytes())?,
		32 => encrypt_ecb::<Aes256>(&key, hex_digest.as_bytes())?,
		len => return Err(SignError::InvalidKeyLength { len }),
	};

	Ok(STANDARD.encode(ciphertext))
}

/// Computes the transport-ready `sign` value over an already merged parameter set.
pub fn sign(app_id: &AppId, params: &Params) -> Result<String, SignError> {
	let ciphertext = encrypt_digest(app_id.as_str(), &digest(&canonical_string(params)))?;

	Ok(urlencoding::encode(&ciphertext).into_owned())
}

/// Renders a parameter value the way it appears in the canonical string and query strings.
pub fn value_text(value: &Value) -> String {
	match value {
		Value::String(s) => s.clone(),
		Value::Null => "null".into(),
		Value::Array(_) | Value::Object(_) => canonical_json(value),
		other => other.to_string(),
	}
}

// Object keys are sorted at every depth regardless of the map ordering `serde_json` was built
// with.
fn canonical_json(value: &Value) -> String {
	match value {
		Value::Array(items) => {
			let inner = items.iter().map(canonical_json).collect::<Vec<_>>();

			format!("[{}]", inner.join(","))
		},
		Value::Object(map) => {
			let sorted = map.iter().collect::<BTreeMap<_, _>>();
			let inner = sorted
				.into_iter()
				.map(|(key, value)| format!("{}:{}", Value::from(key.as_str()), canonical_json(value)))
				.collect::<Vec<_>>();

			format!("{{{}}}", inner.join(","))
		},
		scalar => scalar.to_string(),
	}
}

fn encrypt_ecb<C>(key: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, SignError>
where
	C: BlockCipher + BlockEncryptMut + KeyInit,
{
	let encryptor = ecb::Encryptor::<C>::new_from_slice(key)
		.map_err(|_| SignError::InvalidKeyLength { len: key.len() })?;

	Ok(encryptor.encrypt_padded_vec_mut::<Pkcs7>(plaintext))
}

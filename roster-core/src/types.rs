//! Core type definitions shared by every store.

use std::borrow::Borrow;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Identity
// ---------------------------------------------------------------------------

/// Unique identifier of a player's account across sessions.
///
/// Serialized as a bare JSON string, which is also how it appears as a map
/// key in the profile and custom documents.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccountId(pub String);

impl AccountId {
    /// Wrap an account identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AccountId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for AccountId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

// Lets `IndexMap<AccountId, _>` be queried with a plain `&str`.
impl Borrow<str> for AccountId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Documents
// ---------------------------------------------------------------------------

/// The four persisted document categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DocumentKind {
    /// `profiles.json`: account id → profile.
    Profiles,
    /// `roles.json`: role name → role.
    Roles,
    /// `custom.json`: custom effects and tags.
    Custom,
    /// `whitelist.json`: list of account ids.
    Whitelist,
}

impl DocumentKind {
    /// Every document kind, in a stable order.
    pub const ALL: [Self; 4] = [Self::Profiles, Self::Roles, Self::Custom, Self::Whitelist];

    /// File name of this document inside the data directory.
    #[must_use]
    pub fn file_name(self) -> &'static str {
        match self {
            Self::Profiles => "profiles.json",
            Self::Roles => "roles.json",
            Self::Custom => "custom.json",
            Self::Whitelist => "whitelist.json",
        }
    }

    /// The document a never-written file stands for.
    #[must_use]
    pub fn empty(self) -> serde_json::Value {
        match self {
            Self::Whitelist => serde_json::Value::Array(Vec::new()),
            Self::Profiles | Self::Roles | Self::Custom => {
                serde_json::Value::Object(serde_json::Map::new())
            }
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Profiles => "profiles",
            Self::Roles => "roles",
            Self::Custom => "custom",
            Self::Whitelist => "whitelist",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Display
// ---------------------------------------------------------------------------

/// RGB colour of a role tag, each component in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagColor(pub [f64; 3]);

impl TagColor {
    /// Opaque white, the colour every new role starts with.
    pub const WHITE: Self = Self([1.0, 1.0, 1.0]);

    /// Create a colour, clamping each component to `0.0..=1.0`.
    #[must_use]
    pub fn new(r: f64, g: f64, b: f64) -> Self {
        Self([r.clamp(0.0, 1.0), g.clamp(0.0, 1.0), b.clamp(0.0, 1.0)])
    }
}

impl Default for TagColor {
    fn default() -> Self {
        Self::WHITE
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// Convert fractional Unix seconds into a UTC timestamp.
///
/// Returns `None` for non-finite or out-of-range values.
#[must_use]
pub fn timestamp_from_secs(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    #[allow(clippy::cast_possible_truncation)]
    DateTime::from_timestamp(whole as i64, nanos)
}

/// Fractional Unix seconds of a UTC timestamp.
#[must_use]
pub fn timestamp_to_secs(ts: &DateTime<Utc>) -> f64 {
    #[allow(clippy::cast_precision_loss)]
    let secs = ts.timestamp() as f64;
    secs + f64::from(ts.timestamp_subsec_micros()) / 1e6
}

/// Serde codec for timestamps stored as floating Unix seconds.
///
/// Integers are accepted on read; writes always produce a float.
pub mod epoch_seconds {
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de};

    /// Serialize a timestamp as fractional Unix seconds.
    ///
    /// # Errors
    /// Propagates the serializer's error.
    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(super::timestamp_to_secs(ts))
    }

    /// Deserialize a timestamp from integer or fractional Unix seconds.
    ///
    /// # Errors
    /// Fails when the value is not a number or out of range.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        super::timestamp_from_secs(secs)
            .ok_or_else(|| de::Error::custom(format!("timestamp out of range: {secs}")))
    }
}

// ---------------------------------------------------------------------------
// Set-like lists
// ---------------------------------------------------------------------------

/// Append `value` unless it is already present. Returns `true` if appended.
///
/// The documents store sets as JSON arrays, so insertion order is kept and
/// uniqueness is enforced here.
pub(crate) fn push_unique<T: PartialEq>(list: &mut Vec<T>, value: T) -> bool {
    if list.contains(&value) {
        return false;
    }
    list.push(value);
    true
}

/// Remove the first element equal to `value`. Returns `true` if removed.
pub(crate) fn remove_item<T, Q>(list: &mut Vec<T>, value: &Q) -> bool
where
    T: Borrow<Q>,
    Q: PartialEq + ?Sized,
{
    match list.iter().position(|item| item.borrow() == value) {
        Some(index) => {
            list.remove(index);
            true
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn account_id_round_trips_as_plain_string() {
        let id = AccountId::new("pb-IF4VAk4=");
        let json = serde_json::to_string(&id).expect("encode");
        assert_eq!(json, "\"pb-IF4VAk4=\"");
        let back: AccountId = serde_json::from_str(&json).expect("decode");
        assert_eq!(back, id);
    }

    #[test]
    fn tag_color_defaults_to_white_and_clamps() {
        assert_eq!(TagColor::default(), TagColor([1.0, 1.0, 1.0]));
        assert_eq!(TagColor::new(2.0, -1.0, 0.5), TagColor([1.0, 0.0, 0.5]));
        let json = serde_json::to_string(&TagColor::WHITE).expect("encode");
        assert_eq!(json, "[1.0,1.0,1.0]");
    }

    #[test]
    fn epoch_seconds_accepts_integers_and_floats() {
        let from_int = timestamp_from_secs(0.0).expect("epoch");
        assert_eq!(from_int.timestamp(), 0);

        let ts = timestamp_from_secs(1_700_000_000.25).expect("valid");
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!((timestamp_to_secs(&ts) - 1_700_000_000.25).abs() < 1e-6);

        assert!(timestamp_from_secs(f64::NAN).is_none());
        assert!(timestamp_from_secs(f64::INFINITY).is_none());
    }

    #[test]
    fn empty_documents_have_the_right_shape() {
        assert!(DocumentKind::Whitelist.empty().is_array());
        for kind in [DocumentKind::Profiles, DocumentKind::Roles, DocumentKind::Custom] {
            assert!(kind.empty().is_object(), "{kind} should be an object");
        }
    }

    #[test]
    fn set_helpers_keep_uniqueness() {
        let mut list = vec!["a".to_string()];
        assert!(!push_unique(&mut list, "a".to_string()));
        assert!(push_unique(&mut list, "b".to_string()));
        assert_eq!(list, vec!["a", "b"]);

        assert!(remove_item(&mut list, "a"));
        assert!(!remove_item(&mut list, "a"));
        assert_eq!(list, vec!["b"]);
    }
}

//! Claims of a verified token and their ordered validation against an [`Expected`] profile.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use thiserror::Error;
use time::OffsetDateTime;

/// Name of the issuer claim.
pub const ISSUER: &str = "iss";
/// Name of the expiration claim (seconds since the Unix epoch).
pub const EXPIRATION: &str = "exp";
/// Name of the audience claim.
pub const AUDIENCE: &str = "aud";
/// Name of the purpose claim.
pub const PURPOSE: &str = "pur";

/// The payload of a verified token: claim names mapped to JSON values.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Claims(Map<String, Value>);

impl Claims {
    /// Returns the value of the claim `name`.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.0.get(name)
    }

    /// Returns the `iss` claim, if it is a string.
    pub fn issuer(&self) -> Option<&str> {
        self.get(ISSUER).and_then(Value::as_str)
    }

    /// Returns the `exp` claim truncated to whole seconds, if it is a number.
    pub fn expiration(&self) -> Option<i64> {
        self.get(EXPIRATION).and_then(seconds)
    }

    /// Returns the `pur` claim, if it is a string.
    pub fn purpose(&self) -> Option<&str> {
        self.get(PURPOSE).and_then(Value::as_str)
    }

    /// Returns the underlying map.
    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for Claims {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl TryFrom<Value> for Claims {
    type Error = Value;

    /// Succeeds only for JSON objects; any other value is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}

/// The reasons [`validate`] rejects a set of claims. Only the first failing check is
/// reported.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ClaimsError {
    /// A required claim is absent.
    #[error("token missing required field: {0}")]
    MissingField(&'static str),

    /// A claim is present with the wrong JSON type.
    #[error("received value for field `{field}` with incorrect type; expected {expected}")]
    FieldType {
        /// Claim name.
        field: &'static str,
        /// Description of the accepted type.
        expected: &'static str,
    },

    /// The issuer is not in the allowed list.
    #[error("invalid issuer: {0}")]
    InvalidIssuer(String),

    /// The token expired at or before the reference time.
    #[error("expired at time: {0}")]
    Expired(i64),

    /// None of the required audiences is present.
    #[error("token missing required audience: {missing}; contains: {}", .actual.join(", "))]
    MissingAudience {
        /// First required audience not found in the token.
        missing: String,
        /// Audiences the token carries.
        actual: Vec<String>,
    },

    /// The purpose claim is absent or differs from the required purpose.
    #[error("invalid purpose: {}; expected: {expected}", .received.as_deref().unwrap_or("<none>"))]
    InvalidPurpose {
        /// Purpose found in the token, if any.
        received: Option<String>,
        /// Required purpose.
        expected: String,
    },
}

/// An expectation profile claims are validated against.
///
/// Empty `audiences` and an unset `purpose` disable the corresponding checks. The reference
/// time defaults to the moment of validation.
///
/// # Examples
///
/// ```
/// use bearer_auth::claims::{Claims, Expected};
/// use serde_json::json;
/// use time::OffsetDateTime;
///
/// let expected = Expected::new(["https://issuer.example"])
///     .audience("svc-a")
///     .purpose("access")
///     .reference_time(OffsetDateTime::from_unix_timestamp(1_700_000_000).unwrap());
///
/// let claims = Claims::try_from(json!({
///     "iss": "https://issuer.example",
///     "aud": ["svc-a", "svc-b"],
///     "exp": 1_700_001_000,
///     "pur": "access",
/// }))
/// .unwrap();
///
/// assert!(expected.validate(&claims).is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Expected {
    issuers: Vec<String>,
    audiences: Vec<String>,
    purpose: Option<String>,
    reference_time: Option<OffsetDateTime>,
}

impl Expected {
    /// Creates a profile accepting tokens from any of `issuers`.
    ///
    /// `issuers` must not be empty. A profile without issuers rejects every token with
    /// [`ClaimsError::InvalidIssuer`].
    ///
    /// # Panics
    ///
    /// Panics in debug builds if `issuers` is empty.
    pub fn new<I, S>(issuers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let issuers: Vec<String> = issuers.into_iter().map(Into::into).collect();
        debug_assert!(!issuers.is_empty(), "at least one allowed issuer is required");

        Self {
            issuers,
            audiences: Vec::new(),
            purpose: None,
            reference_time: None,
        }
    }

    /// Adds a required audience.
    #[must_use]
    pub fn audience(mut self, audience: impl Into<String>) -> Self {
        self.audiences.push(audience.into());
        self
    }

    /// Adds required audiences; the token must carry at least one of them.
    #[must_use]
    pub fn audiences<I, S>(mut self, audiences: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.audiences.extend(audiences.into_iter().map(Into::into));
        self
    }

    /// Sets the required purpose.
    #[must_use]
    pub fn purpose(mut self, purpose: impl Into<String>) -> Self {
        self.purpose = Some(purpose.into());
        self
    }

    /// Pins the instant expiration is compared against.
    #[must_use]
    pub const fn reference_time(mut self, at: OffsetDateTime) -> Self {
        self.reference_time = Some(at);
        self
    }

    /// Allowed issuers.
    pub fn issuers(&self) -> &[String] {
        &self.issuers
    }

    /// Required audiences.
    pub fn required_audiences(&self) -> &[String] {
        &self.audiences
    }

    /// Required purpose.
    pub fn required_purpose(&self) -> Option<&str> {
        self.purpose.as_deref()
    }

    /// Pinned reference time.
    pub const fn pinned_reference_time(&self) -> Option<OffsetDateTime> {
        self.reference_time
    }

    /// Validates `claims` at the pinned reference time, or now.
    ///
    /// # Errors
    ///
    /// See [`validate`].
    pub fn validate(&self, claims: &Claims) -> Result<(), ClaimsError> {
        let now = self.reference_time.unwrap_or_else(OffsetDateTime::now_utc);
        validate(claims, self, now)
    }
}

/// Validates `claims` against `expected`, treating `reference_time` as now.
///
/// Checks run in a fixed order and the first failure is returned:
///
/// 1. `iss`, `exp`, then `aud` (only when audiences are required) are present;
/// 2. `iss` is a string, `exp` a number, `aud` a string or list of strings;
/// 3. `iss` is an allowed issuer;
/// 4. `exp` is strictly after `reference_time`;
/// 5. `aud` contains one of the required audiences;
/// 6. `pur` equals the required purpose, if one is set.
///
/// # Errors
///
/// Returns the [`ClaimsError`] of the first failing check.
pub fn validate(
    claims: &Claims,
    expected: &Expected,
    reference_time: OffsetDateTime,
) -> Result<(), ClaimsError> {
    let check_audience = !expected.audiences.is_empty();

    let iss = claims.get(ISSUER).ok_or(ClaimsError::MissingField(ISSUER))?;
    let exp = claims.get(EXPIRATION).ok_or(ClaimsError::MissingField(EXPIRATION))?;
    let aud = if check_audience {
        Some(claims.get(AUDIENCE).ok_or(ClaimsError::MissingField(AUDIENCE))?)
    } else {
        None
    };

    let iss = iss.as_str().ok_or(ClaimsError::FieldType {
        field: ISSUER,
        expected: "string",
    })?;
    let exp = match exp {
        Value::Number(n) => n,
        _ => {
            return Err(ClaimsError::FieldType {
                field: EXPIRATION,
                expected: "number",
            })
        }
    };
    let aud = aud.map(audience_list).transpose()?;

    if !expected.issuers.iter().any(|allowed| allowed == iss) {
        return Err(ClaimsError::InvalidIssuer(iss.to_owned()));
    }

    if !expires_after(exp, reference_time) {
        return Err(ClaimsError::Expired(seconds_of(exp)));
    }

    if let Some(actual) = aud {
        if !expected.audiences.iter().any(|want| actual.contains(want)) {
            let missing = expected
                .audiences
                .iter()
                .find(|want| !actual.contains(*want))
                .cloned()
                .unwrap_or_default();
            return Err(ClaimsError::MissingAudience { missing, actual });
        }
    }

    if let Some(want) = expected.purpose.as_deref() {
        match claims.get(PURPOSE) {
            Some(Value::String(got)) if got == want => {}
            got => {
                return Err(ClaimsError::InvalidPurpose {
                    received: got.map(|value| match value {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    }),
                    expected: want.to_owned(),
                })
            }
        }
    }

    Ok(())
}

fn audience_list(aud: &Value) -> Result<Vec<String>, ClaimsError> {
    const TYPE_ERROR: ClaimsError = ClaimsError::FieldType {
        field: AUDIENCE,
        expected: "string or list of strings",
    };

    match aud {
        Value::String(s) => Ok(vec![s.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map(str::to_owned).ok_or(TYPE_ERROR))
            .collect(),
        _ => Err(TYPE_ERROR),
    }
}

fn expires_after(exp: &serde_json::Number, reference_time: OffsetDateTime) -> bool {
    match exp.as_i64() {
        Some(secs) => i128::from(secs) * 1_000_000_000 > reference_time.unix_timestamp_nanos(),
        None => {
            let reference = reference_time.unix_timestamp_nanos() as f64 / 1e9;
            exp.as_f64().is_some_and(|secs| secs > reference)
        }
    }
}

fn seconds(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => Some(seconds_of(n)),
        _ => None,
    }
}

// Saturates for values outside the i64 range.
fn seconds_of(n: &serde_json::Number) -> i64 {
    n.as_i64()
        .or_else(|| n.as_u64().map(|_| i64::MAX))
        .unwrap_or_else(|| n.as_f64().map_or(0, |secs| secs as i64))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const T: i64 = 1_700_000_000;

    fn at(secs: i64) -> OffsetDateTime {
        OffsetDateTime::from_unix_timestamp(secs).unwrap()
    }

    fn claims(value: Value) -> Claims {
        Claims::try_from(value).unwrap()
    }

    fn profile() -> Expected {
        Expected::new(["https://issuer.example"])
            .audience("svc-a")
            .purpose("access")
    }

    fn scenario_claims() -> Value {
        json!({
            "iss": "https://issuer.example",
            "aud": ["svc-a", "svc-b"],
            "exp": T + 1000,
            "pur": "access",
        })
    }

    #[test]
    fn test_scenario_accepts_matching_claims() {
        assert_eq!(validate(&claims(scenario_claims()), &profile(), at(T)), Ok(()));
    }

    #[test]
    fn test_scenario_rejects_other_purpose() {
        let mut value = scenario_claims();
        value["pur"] = json!("refresh");

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();

        assert_eq!(
            err,
            ClaimsError::InvalidPurpose {
                received: Some("refresh".into()),
                expected: "access".into(),
            }
        );
        assert_eq!(err.to_string(), "invalid purpose: refresh; expected: access");
    }

    #[test]
    fn test_scenario_rejects_missing_audience_claim() {
        let mut value = scenario_claims();
        value.as_object_mut().unwrap().remove("aud");

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();
        assert_eq!(err, ClaimsError::MissingField("aud"));
    }

    #[test]
    fn test_scenario_rejects_foreign_audience() {
        let mut value = scenario_claims();
        value["aud"] = json!(["svc-c"]);

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();

        assert_eq!(
            err,
            ClaimsError::MissingAudience {
                missing: "svc-a".into(),
                actual: vec!["svc-c".into()],
            }
        );
        assert_eq!(
            err.to_string(),
            "token missing required audience: svc-a; contains: svc-c"
        );
    }

    #[test]
    fn test_expiry_boundary_is_exclusive() {
        let expected = Expected::new(["i"]);

        let at_boundary = claims(json!({"iss": "i", "exp": T}));
        let err = validate(&at_boundary, &expected, at(T)).unwrap_err();
        assert_eq!(err, ClaimsError::Expired(T));

        assert!(validate(&claims(json!({"iss": "i", "exp": T + 1})), &expected, at(T)).is_ok());
    }

    #[test]
    fn test_expiry_uses_sub_second_reference_time() {
        let expected = Expected::new(["i"]);
        let reference = at(T) + time::Duration::milliseconds(500);

        let err = validate(&claims(json!({"iss": "i", "exp": T})), &expected, reference);
        assert_eq!(err, Err(ClaimsError::Expired(T)));

        let fractional = claims(json!({"iss": "i", "exp": T as f64 + 0.75}));
        assert_eq!(validate(&fractional, &expected, reference), Ok(()));
    }

    #[test]
    fn test_missing_issuer_is_reported_first() {
        let value = json!({"exp": "soon", "aud": 42, "pur": 7});

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();
        assert_eq!(err, ClaimsError::MissingField("iss"));
    }

    #[test]
    fn test_presence_checks_precede_type_checks() {
        let value = json!({"iss": 1, "aud": "svc-a"});

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();
        assert_eq!(err, ClaimsError::MissingField("exp"));
    }

    #[test]
    fn test_type_checks() {
        let cases = [
            (json!({"iss": 1, "exp": T + 1, "aud": "svc-a"}), "iss", "string"),
            (json!({"iss": "i", "exp": "later", "aud": "svc-a"}), "exp", "number"),
            (
                json!({"iss": "i", "exp": T + 1, "aud": {"svc-a": true}}),
                "aud",
                "string or list of strings",
            ),
            (
                json!({"iss": "i", "exp": T + 1, "aud": ["svc-a", 3]}),
                "aud",
                "string or list of strings",
            ),
        ];

        for (value, field, expected) in cases {
            let err = validate(&claims(value), &profile(), at(T)).unwrap_err();
            assert_eq!(err, ClaimsError::FieldType { field, expected });
        }
    }

    #[test]
    fn test_type_checks_precede_value_checks() {
        // Wrong issuer and expired, but the audience has the wrong type.
        let value = json!({"iss": "other", "exp": 1, "aud": 5});

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();
        assert!(matches!(err, ClaimsError::FieldType { field: "aud", .. }));
    }

    #[test]
    fn test_issuer_precedes_expiry() {
        let value = json!({"iss": "https://evil.example", "exp": 1, "aud": "svc-a"});

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();
        assert_eq!(err, ClaimsError::InvalidIssuer("https://evil.example".into()));
    }

    #[test]
    fn test_single_string_audience() {
        let value = json!({
            "iss": "https://issuer.example",
            "exp": T + 1,
            "aud": "svc-a",
            "pur": "access",
        });
        assert!(validate(&claims(value), &profile(), at(T)).is_ok());
    }

    #[test]
    fn test_any_required_audience_is_enough() {
        let expected = Expected::new(["i"]).audiences(["svc-a", "svc-b"]);
        let value = json!({"iss": "i", "exp": T + 1, "aud": ["svc-b"]});

        assert!(validate(&claims(value), &expected, at(T)).is_ok());
    }

    #[test]
    fn test_unchecked_audience_and_purpose_are_ignored() {
        let expected = Expected::new(["i"]);
        let value = json!({"iss": "i", "exp": T + 1, "aud": 12, "pur": ["anything"]});

        assert!(validate(&claims(value), &expected, at(T)).is_ok());
    }

    #[test]
    fn test_missing_purpose_is_rejected_when_required() {
        let value = json!({"iss": "https://issuer.example", "exp": T + 1, "aud": "svc-a"});

        let err = validate(&claims(value), &profile(), at(T)).unwrap_err();
        assert_eq!(
            err,
            ClaimsError::InvalidPurpose {
                received: None,
                expected: "access".into(),
            }
        );
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic(expected = "at least one allowed issuer is required")]
    fn test_expected_requires_an_issuer() {
        let _ = Expected::new(Vec::<String>::new());
    }

    #[test]
    fn test_expected_validate_uses_pinned_time() {
        let value = claims(json!({"iss": "i", "exp": T + 10}));

        assert!(Expected::new(["i"]).reference_time(at(T)).validate(&value).is_ok());
        assert_eq!(
            Expected::new(["i"]).reference_time(at(T + 10)).validate(&value),
            Err(ClaimsError::Expired(T + 10))
        );
        // Without a pinned time, a 2023 expiry is in the past.
        assert_eq!(
            Expected::new(["i"]).validate(&value),
            Err(ClaimsError::Expired(T + 10))
        );
    }

    #[test]
    fn test_claims_accessors() {
        let value = claims(json!({"iss": "i", "exp": 12.9, "pur": "access"}));

        assert_eq!(value.issuer(), Some("i"));
        assert_eq!(value.expiration(), Some(12));
        assert_eq!(value.purpose(), Some("access"));
        assert!(Claims::try_from(json!([1, 2])).is_err());
    }
}

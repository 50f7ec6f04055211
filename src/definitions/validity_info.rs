use crate::cbor::Value;
use serde::{de, ser, Deserialize, Deserializer, Serialize, Serializer};
use time::{format_description::well_known::Rfc3339, OffsetDateTime, UtcOffset};

/// Validity of a mobile security object. Every date is a `tdate` (tag 0, RFC 3339 text).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ValidityInfo {
    pub signed: OffsetDateTime,
    pub valid_from: OffsetDateTime,
    pub valid_until: OffsetDateTime,
    pub expected_update: Option<OffsetDateTime>,
}

type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("When parsing a CBOR map, could not find required field: '{0}'")]
    MissingField(&'static str),
    #[error("Expected to parse a CBOR map, received: '{0:?}'")]
    NotAMap(Value),
    #[error("Expected a tdate (tag 0 text string), received: '{0:?}'")]
    NotATdate(Value),
    #[error("Failed to parse date string as rfc3339 date: {0}")]
    UnableToParseDate(#[from] time::error::Parse),
    #[error("Failed to format date as rfc3339: {0}")]
    UnableToFormatDate(#[from] time::error::Format),
}

impl ValidityInfo {
    /// Whether `at` lies within `[validFrom, validUntil]`.
    pub fn contains(&self, at: OffsetDateTime) -> bool {
        self.valid_from <= at && at <= self.valid_until
    }

    fn to_cbor(&self) -> Result<Value> {
        let mut entries = vec![
            (Value::from("signed"), datetime_to_cbor(self.signed)?),
            (Value::from("validFrom"), datetime_to_cbor(self.valid_from)?),
            (Value::from("validUntil"), datetime_to_cbor(self.valid_until)?),
        ];
        if let Some(expected_update) = self.expected_update {
            entries.push((
                Value::from("expectedUpdate"),
                datetime_to_cbor(expected_update)?,
            ));
        }
        Ok(Value::Map(entries))
    }
}

impl TryFrom<Value> for ValidityInfo {
    type Error = Error;

    fn try_from(v: Value) -> Result<ValidityInfo> {
        let Value::Map(entries) = v else {
            return Err(Error::NotAMap(v));
        };

        let field = |name: &'static str| {
            entries
                .iter()
                .find(|(k, _)| k.as_text() == Some(name))
                .map(|(_, v)| v.clone())
        };
        let required = |name: &'static str| {
            field(name)
                .ok_or(Error::MissingField(name))
                .and_then(cbor_to_datetime)
        };

        Ok(Self {
            signed: required("signed")?,
            valid_from: required("validFrom")?,
            valid_until: required("validUntil")?,
            expected_update: field("expectedUpdate").map(cbor_to_datetime).transpose()?,
        })
    }
}

impl Serialize for ValidityInfo {
    fn serialize<S: Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.to_cbor().map_err(ser::Error::custom)?.serialize(s)
    }
}

impl<'de> Deserialize<'de> for ValidityInfo {
    fn deserialize<D: Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        Value::deserialize(d)?
            .try_into()
            .map_err(de::Error::custom)
    }
}

/// `tdate` has no fractional seconds and is written in UTC.
fn datetime_to_cbor(datetime: OffsetDateTime) -> Result<Value> {
    let datetime = datetime
        .to_offset(UtcOffset::UTC)
        .replace_nanosecond(0)
        .unwrap_or(datetime);
    Ok(Value::Tag(0, Box::new(Value::Text(datetime.format(&Rfc3339)?))))
}

fn cbor_to_datetime(v: Value) -> Result<OffsetDateTime> {
    match v {
        Value::Tag(0, inner) => match *inner {
            Value::Text(date) => Ok(OffsetDateTime::parse(&date, &Rfc3339)?),
            other => Err(Error::NotATdate(other)),
        },
        other => Err(Error::NotATdate(other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cbor;
    use time::macros::datetime;

    #[test]
    fn tdate_encoding() {
        let validity = ValidityInfo {
            signed: datetime!(2024-01-01 12:00:00.5 UTC),
            valid_from: datetime!(2024-01-01 12:00 UTC),
            valid_until: datetime!(2025-01-01 14:00 +02:00),
            expected_update: None,
        };
        let value = cbor::into_value(&validity).unwrap();
        let Value::Map(entries) = &value else {
            panic!("not a map: {value:?}")
        };
        assert_eq!(entries.len(), 3);
        assert_eq!(
            entries[0].1,
            Value::Tag(0, Box::new(Value::Text("2024-01-01T12:00:00Z".into())))
        );
        assert_eq!(
            entries[2].1,
            Value::Tag(0, Box::new(Value::Text("2025-01-01T12:00:00Z".into())))
        );

        let decoded: ValidityInfo = cbor::from_value(value).unwrap();
        assert_eq!(decoded.valid_until, validity.valid_until);
        assert!(decoded.contains(datetime!(2024-06-01 00:00 UTC)));
        assert!(!decoded.contains(datetime!(2025-06-01 00:00 UTC)));
    }

    #[test]
    fn missing_and_malformed_fields() {
        let missing = Value::Map(vec![(
            Value::from("signed"),
            Value::Tag(0, Box::new(Value::Text("2024-01-01T00:00:00Z".into()))),
        )]);
        assert!(matches!(
            ValidityInfo::try_from(missing),
            Err(Error::MissingField("validFrom"))
        ));

        let untagged = Value::Map(vec![
            (Value::from("signed"), Value::Text("2024-01-01T00:00:00Z".into())),
            (Value::from("validFrom"), Value::Text("2024-01-01T00:00:00Z".into())),
            (Value::from("validUntil"), Value::Text("2024-01-01T00:00:00Z".into())),
        ]);
        assert!(matches!(
            ValidityInfo::try_from(untagged),
            Err(Error::NotATdate(_))
        ));
    }
}

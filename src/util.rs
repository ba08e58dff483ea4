use std::str::FromStr;

use axum::{
    extract::{FromRequestParts, Path},
    http::request::Parts,
    RequestPartsExt,
};
use bson::oid::ObjectId;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::error::Error;

#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
pub struct ObjectIdString(#[serde(with = "object_id_string")] pub ObjectId);

impl From<ObjectId> for ObjectIdString {
    fn from(value: ObjectId) -> Self {
        Self(value)
    }
}

impl std::ops::Deref for ObjectIdString {
    type Target = ObjectId;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl std::cmp::PartialEq for ObjectIdString {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}
impl std::cmp::Eq for ObjectIdString {}

impl std::cmp::PartialEq<ObjectId> for ObjectIdString {
    fn eq(&self, other: &ObjectId) -> bool {
        self.0 == *other
    }
}

impl From<ObjectIdString> for bson::Bson {
    fn from(value: ObjectIdString) -> Self {
        value.0.into()
    }
}

mod object_id_string {
    use bson::oid::ObjectId;
    use serde::{self, Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(id: &ObjectId, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&id.to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<ObjectId, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct FormattedDateTime(#[serde(with = "time::serde::rfc3339")] pub OffsetDateTime);

impl From<bson::DateTime> for FormattedDateTime {
    fn from(value: bson::DateTime) -> Self {
        Self(value.into())
    }
}

impl From<OffsetDateTime> for FormattedDateTime {
    fn from(value: OffsetDateTime) -> Self {
        Self(value)
    }
}

/// Path extractor for `:id` segments that must be an ObjectId hex string.
#[derive(Debug, Clone, Copy)]
pub struct PathObjectId(pub ObjectId);

#[axum::async_trait]
impl<S> FromRequestParts<S> for PathObjectId
where
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let Path(id) = parts.extract::<Path<String>>().await?;
        let id = ObjectId::from_str(&id).map_err(|_| Error::NoResource)?;

        Ok(Self(id))
    }
}

/// Offset pagination taken from the query string; every listing endpoint
/// accepts it. `skip` is `page * size`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy)]
#[serde(default)]
pub struct Pagination {
    pub page: u64,
    pub size: i64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self { page: 0, size: 10 }
    }
}

impl Pagination {
    pub fn size(&self) -> i64 {
        self.size.clamp(1, 100)
    }

    pub fn skip(&self) -> u64 {
        self.page * self.size() as u64
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DecimalString(pub Decimal);

impl From<Decimal> for DecimalString {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<DecimalString> for Decimal {
    fn from(value: DecimalString) -> Self {
        value.0
    }
}

impl Serialize for DecimalString {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for DecimalString {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        pub struct Visitor;

        impl<'de> serde::de::Visitor<'de> for Visitor {
            type Value = DecimalString;

            fn expecting(&self, formatter: &mut std::fmt::Formatter) -> std::fmt::Result {
                formatter.write_str("a string of decimal or number")
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Decimal::from(v).into())
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(Decimal::from(v).into())
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Decimal::try_from(v)
                    .map(Into::into)
                    .map_err(serde::de::Error::custom)
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Decimal::from_str(v)
                    .map(Into::into)
                    .map_err(serde::de::Error::custom)
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }
        }

        deserializer.deserialize_any(Visitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pagination_defaults() {
        let page: Pagination = serde_json::from_str("{}").unwrap();
        assert_eq!(page.page, 0);
        assert_eq!(page.size(), 10);
        assert_eq!(page.skip(), 0);
    }

    #[test]
    fn test_pagination_skip_and_cap() {
        let page: Pagination = serde_json::from_str(r#"{"page": 3, "size": 20}"#).unwrap();
        assert_eq!(page.skip(), 60);

        let page: Pagination = serde_json::from_str(r#"{"page": 1, "size": 1000}"#).unwrap();
        assert_eq!(page.size(), 100);
        assert_eq!(page.skip(), 100);
    }

    #[test]
    fn test_decimal_string_accepts_number_and_string() {
        let DecimalString(a) = serde_json::from_str("25.5").unwrap();
        let DecimalString(b) = serde_json::from_str(r#""25.5""#).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_object_id_string_round_trip() {
        let id = ObjectId::new();
        let json = serde_json::to_string(&ObjectIdString(id)).unwrap();
        assert_eq!(json, format!("\"{}\"", id));

        let parsed: ObjectIdString = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, id);
    }
}

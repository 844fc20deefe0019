//! Bindable values: [`Field`], [`Row`] and [`Many`].
//!
//! A `Field` is only ever sent to the server as a bound parameter. There is no
//! way to turn one into raw SQL text, so interpolating a `Field` can't inject SQL.

use crate::error::SqlResult;
use bytes::BytesMut;
use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::error::Error;
use tokio_postgres::types::{IsNull, Kind, ToSql, Type, WrongType, to_sql_checked};
use uuid::Uuid;

type BoxError = Box<dyn Error + Sync + Send>;

/// A value usable as a bound SQL parameter.
///
/// The server infers each parameter's type from the statement; `Field` adapts
/// to that type when it is encoded. An `Int` bound to an `int4` column is
/// narrowed with a range check, numbers bound to `numeric` go through
/// [`Decimal`], and a `Text` is parsed when the target is a date, time,
/// timestamp, uuid or numeric. Text binds to enum types as the label.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Array(Vec<Field>),
    /// Any JSON document, typically produced by [`Field::json`].
    Json(serde_json::Value),
    /// A string-keyed mapping, bound as a JSON object.
    Object(Row),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
}

impl Field {
    /// Serialize any `serde` value into a JSON field.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> SqlResult<Self> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// JSON representation, used when the target parameter is `json`/`jsonb`.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        match self {
            Self::Null => Value::Null,
            Self::Bool(v) => Value::Bool(*v),
            Self::Int(v) => Value::from(*v),
            Self::Float(v) => serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number),
            Self::Text(v) => Value::String(v.clone()),
            Self::Array(items) => Value::Array(items.iter().map(Field::to_json).collect()),
            Self::Json(v) => v.clone(),
            Self::Object(row) => row.to_json(),
            Self::Timestamp(v) => Value::String(v.to_rfc3339()),
            Self::Uuid(v) => Value::String(v.to_string()),
        }
    }
}

fn is_json(ty: &Type) -> bool {
    matches!(*ty, Type::JSON | Type::JSONB)
}

/// Encode through `T`'s own `ToSql`, refusing types `T` doesn't accept.
fn encode<T: ToSql>(value: &T, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    if !T::accepts(ty) {
        return Err(Box::new(WrongType::new::<T>(ty.clone())));
    }
    value.to_sql(ty, out)
}

fn encode_int(value: i64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::INT2 => encode(&i16::try_from(value)?, ty, out),
        Type::INT4 => encode(&i32::try_from(value)?, ty, out),
        Type::OID => encode(&u32::try_from(value)?, ty, out),
        Type::FLOAT4 => encode(&(value as f32), ty, out),
        Type::FLOAT8 => encode(&(value as f64), ty, out),
        Type::NUMERIC => encode(&Decimal::from(value), ty, out),
        Type::JSON | Type::JSONB => encode(&serde_json::Value::from(value), ty, out),
        _ => encode(&value, ty, out),
    }
}

fn encode_float(value: f64, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::FLOAT4 => encode(&(value as f32), ty, out),
        Type::NUMERIC => encode(&Decimal::try_from(value)?, ty, out),
        Type::JSON | Type::JSONB => encode(&Field::Float(value).to_json(), ty, out),
        _ => encode(&value, ty, out),
    }
}

/// `2024-01-01 10:00:00`, `2024-01-01T10:00:00.5` or a bare date at midnight.
fn parse_naive_datetime(text: &str) -> Result<NaiveDateTime, BoxError> {
    if let Ok(value) = text.parse::<NaiveDateTime>() {
        return Ok(value);
    }
    if let Ok(value) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f") {
        return Ok(value);
    }
    Ok(text.parse::<NaiveDate>()?.and_time(NaiveTime::MIN))
}

/// RFC 3339 or `2024-01-01 10:00:00+02`; without an offset the text is UTC.
fn parse_datetime(text: &str) -> Result<DateTime<FixedOffset>, BoxError> {
    if let Ok(value) = DateTime::parse_from_rfc3339(text) {
        return Ok(value);
    }
    if let Ok(value) = DateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S%.f%#z") {
        return Ok(value);
    }
    Ok(parse_naive_datetime(text)?.and_utc().fixed_offset())
}

fn encode_text(text: &str, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
    match *ty {
        Type::NUMERIC => encode(&text.trim().parse::<Decimal>()?, ty, out),
        Type::DATE => encode(&text.trim().parse::<NaiveDate>()?, ty, out),
        Type::TIME => encode(&text.trim().parse::<NaiveTime>()?, ty, out),
        Type::TIMESTAMP => encode(&parse_naive_datetime(text.trim())?, ty, out),
        Type::TIMESTAMPTZ => encode(&parse_datetime(text.trim())?, ty, out),
        Type::UUID => encode(&Uuid::parse_str(text.trim())?, ty, out),
        Type::JSON | Type::JSONB => encode(&serde_json::Value::from(text), ty, out),
        _ if matches!(ty.kind(), Kind::Enum(_)) => {
            // Enum values use the label's text as their binary format.
            out.extend_from_slice(text.as_bytes());
            Ok(IsNull::No)
        }
        _ => encode(&text, ty, out),
    }
}

impl ToSql for Field {
    fn to_sql(&self, ty: &Type, out: &mut BytesMut) -> Result<IsNull, BoxError> {
        match self {
            Self::Null => Ok(IsNull::Yes),
            Self::Bool(v) if is_json(ty) => encode(&serde_json::Value::Bool(*v), ty, out),
            Self::Bool(v) => encode(v, ty, out),
            Self::Int(v) => encode_int(*v, ty, out),
            Self::Float(v) => encode_float(*v, ty, out),
            Self::Text(v) => encode_text(v, ty, out),
            Self::Array(_) | Self::Object(_) if is_json(ty) => encode(&self.to_json(), ty, out),
            Self::Array(items) => encode(&items.as_slice(), ty, out),
            Self::Json(v) => encode(v, ty, out),
            Self::Object(row) => encode(&row.to_json(), ty, out),
            Self::Timestamp(v) => match *ty {
                Type::TIMESTAMP => encode(&v.naive_utc(), ty, out),
                Type::DATE => encode(&v.date_naive(), ty, out),
                Type::JSON | Type::JSONB => encode(&self.to_json(), ty, out),
                _ => encode(v, ty, out),
            },
            Self::Uuid(v) if *ty == Type::UUID => encode(v, ty, out),
            Self::Uuid(_) if is_json(ty) => encode(&self.to_json(), ty, out),
            Self::Uuid(v) => encode(&v.to_string().as_str(), ty, out),
        }
    }

    fn accepts(_ty: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

macro_rules! impl_from_for_field {
    ($($ty:ty => |$v:ident| $body:expr),* $(,)?) => {
        $(
            impl From<$ty> for Field {
                fn from($v: $ty) -> Self {
                    $body
                }
            }
        )*
    };
}

impl_from_for_field! {
    bool => |v| Field::Bool(v),
    i16 => |v| Field::Int(v.into()),
    i32 => |v| Field::Int(v.into()),
    i64 => |v| Field::Int(v),
    u32 => |v| Field::Int(v.into()),
    f32 => |v| Field::Float(v.into()),
    f64 => |v| Field::Float(v),
    &str => |v| Field::Text(v.to_string()),
    String => |v| Field::Text(v),
    &String => |v| Field::Text(v.clone()),
    serde_json::Value => |v| Field::Json(v),
    Row => |v| Field::Object(v),
    DateTime<Utc> => |v| Field::Timestamp(v),
    Uuid => |v| Field::Uuid(v),
}

impl<T: Into<Field>> From<Option<T>> for Field {
    fn from(value: Option<T>) -> Self {
        value.map_or(Field::Null, Into::into)
    }
}

impl<T: Into<Field>> From<Vec<T>> for Field {
    fn from(values: Vec<T>) -> Self {
        Field::Array(values.into_iter().map(Into::into).collect())
    }
}

/// A mapping from column name to [`Field`].
///
/// Keys are unique and keep insertion order, which is the column order used
/// when an insert or set clause infers its columns.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    entries: Vec<(String, Field)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set `key` to `value`, consuming and returning the row.
    ///
    /// Setting an existing key replaces its value in place.
    pub fn set(mut self, key: impl Into<String>, value: impl Into<Field>) -> Self {
        self.insert(key, value);
        self
    }

    /// Set `key` to `value`, returning the previous value if the key existed.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Field>) -> Option<Field> {
        let key = key.into();
        let value = value.into();
        match self.entries.iter_mut().find(|(k, _)| *k == key) {
            Some((_, slot)) => Some(std::mem::replace(slot, value)),
            None => {
                self.entries.push((key, value));
                None
            }
        }
    }

    pub fn get(&self, key: &str) -> Option<&Field> {
        self.entries.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(k, _)| k.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Field)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::Value::Object(
            self.entries
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect(),
        )
    }
}

impl<K, V> FromIterator<(K, V)> for Row
where
    K: Into<String>,
    V: Into<Field>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut row = Row::new();
        for (k, v) in iter {
            row.insert(k, v);
        }
        row
    }
}

/// Either a single value or an ordered sequence of values.
#[derive(Debug, Clone, PartialEq)]
pub enum Many<T> {
    One(T),
    List(Vec<T>),
}

impl<T> Many<T> {
    pub fn as_slice(&self) -> &[T] {
        match self {
            Many::One(one) => std::slice::from_ref(one),
            Many::List(many) => many,
        }
    }

    pub fn len(&self) -> usize {
        self.as_slice().len()
    }

    pub fn is_empty(&self) -> bool {
        self.as_slice().is_empty()
    }
}

impl From<Row> for Many<Row> {
    fn from(row: Row) -> Self {
        Many::One(row)
    }
}

impl From<Vec<Row>> for Many<Row> {
    fn from(rows: Vec<Row>) -> Self {
        Many::List(rows)
    }
}

impl From<&[Row]> for Many<Row> {
    fn from(rows: &[Row]) -> Self {
        Many::List(rows.to_vec())
    }
}

impl<const N: usize> From<[Row; N]> for Many<Row> {
    fn from(rows: [Row; N]) -> Self {
        Many::List(rows.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn encoded(field: &Field, ty: &Type) -> Result<Vec<u8>, BoxError> {
        let mut buf = BytesMut::new();
        field.to_sql(ty, &mut buf)?;
        Ok(buf.to_vec())
    }

    #[test]
    fn row_keeps_insertion_order_and_unique_keys() {
        let row = Row::new().set("b", 1).set("a", 2).set("b", 3);
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["b", "a"]);
        assert_eq!(row.get("b"), Some(&Field::Int(3)));
        assert_eq!(row.len(), 2);
    }

    #[test]
    fn row_from_iter() {
        let row: Row = [("x", 1), ("y", 2)].into_iter().collect();
        assert_eq!(row.keys().collect::<Vec<_>>(), vec!["x", "y"]);
    }

    #[test]
    fn option_and_vec_conversions() {
        assert_eq!(Field::from(None::<i32>), Field::Null);
        assert_eq!(Field::from(Some("a")), Field::Text("a".into()));
        assert_eq!(
            Field::from(vec![1, 2]),
            Field::Array(vec![Field::Int(1), Field::Int(2)])
        );
    }

    #[test]
    fn int_narrows_to_target_width() {
        assert_eq!(encoded(&Field::Int(7), &Type::INT4).unwrap(), vec![0, 0, 0, 7]);
        assert_eq!(encoded(&Field::Int(7), &Type::INT2).unwrap(), vec![0, 7]);
        assert_eq!(encoded(&Field::Int(7), &Type::INT8).unwrap().len(), 8);
    }

    #[test]
    fn int_out_of_range_is_an_error() {
        assert!(encoded(&Field::Int(i64::from(i32::MAX) + 1), &Type::INT4).is_err());
    }

    #[test]
    fn text_into_int_column_is_wrong_type() {
        assert!(encoded(&Field::Text("x".into()), &Type::INT4).is_err());
    }

    fn decoded<T: for<'a> tokio_postgres::types::FromSql<'a>>(field: &Field, ty: &Type) -> T {
        let bytes = encoded(field, ty).unwrap();
        T::from_sql(ty, &bytes).unwrap()
    }

    #[test]
    fn numbers_bind_to_numeric() {
        let int: Decimal = decoded(&Field::Int(42), &Type::NUMERIC);
        assert_eq!(int, Decimal::from(42));

        let float: Decimal = decoded(&Field::Float(9.99), &Type::NUMERIC);
        assert_eq!(float.to_string(), "9.99");

        assert!(encoded(&Field::Float(f64::NAN), &Type::NUMERIC).is_err());
    }

    #[test]
    fn text_is_parsed_for_numeric_and_uuid() {
        let price: Decimal = decoded(&Field::from("12.50"), &Type::NUMERIC);
        assert_eq!(price.to_string(), "12.50");

        let id = Uuid::new_v4();
        let parsed: Uuid = decoded(&Field::Text(id.to_string()), &Type::UUID);
        assert_eq!(parsed, id);

        assert!(encoded(&Field::from("not a uuid"), &Type::UUID).is_err());
    }

    #[test]
    fn text_is_parsed_for_dates_and_timestamps() {
        let day: NaiveDate = decoded(&Field::from("2024-01-01"), &Type::DATE);
        assert_eq!(day, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());

        let expected = day.and_hms_opt(10, 30, 0).unwrap();
        for text in ["2024-01-01 10:30:00", "2024-01-01T10:30:00"] {
            let at: NaiveDateTime = decoded(&Field::from(text), &Type::TIMESTAMP);
            assert_eq!(at, expected);
        }
        let midnight: NaiveDateTime = decoded(&Field::from("2024-01-01"), &Type::TIMESTAMP);
        assert_eq!(midnight, day.and_hms_opt(0, 0, 0).unwrap());

        for text in ["2024-01-01T12:30:00+02:00", "2024-01-01 10:30:00"] {
            let at: DateTime<Utc> = decoded(&Field::from(text), &Type::TIMESTAMPTZ);
            assert_eq!(at.naive_utc(), expected);
        }

        assert!(encoded(&Field::from("yesterday-ish"), &Type::DATE).is_err());
    }

    #[test]
    fn text_binds_to_enum_labels() {
        let mood = Type::new(
            "mood".to_string(),
            90_001,
            Kind::Enum(vec!["happy".to_string(), "sad".to_string()]),
            "public".to_string(),
        );
        assert_eq!(encoded(&Field::from("happy"), &mood).unwrap(), b"happy");
    }

    #[test]
    fn null_binds_to_any_type() {
        let mut buf = BytesMut::new();
        let is_null = Field::Null.to_sql(&Type::INT4, &mut buf).unwrap();
        assert!(matches!(is_null, IsNull::Yes));
        assert!(buf.is_empty());
    }

    #[test]
    fn object_binds_as_json() {
        let field = Field::Object(Row::new().set("k", "v"));
        let bytes = encoded(&field, &Type::JSONB).unwrap();
        // jsonb wire format: version byte followed by the JSON text.
        assert_eq!(bytes[0], 1);
        assert_eq!(&bytes[1..], br#"{"k":"v"}"#);
    }

    #[test]
    fn json_helper_serializes_structs() {
        #[derive(Serialize)]
        struct Point {
            x: i32,
        }
        let field = Field::json(&Point { x: 3 }).unwrap();
        assert_eq!(field, Field::Json(serde_json::json!({ "x": 3 })));
    }

    #[test]
    fn array_encodes_against_array_type() {
        let field = Field::from(vec![1, 2, 3]);
        assert!(encoded(&field, &Type::INT4_ARRAY).is_ok());
        assert!(encoded(&field, &Type::INT4).is_err());
    }

    #[test]
    fn many_as_slice() {
        let one: Many<Row> = Row::new().set("a", 1).into();
        assert_eq!(one.len(), 1);
        let none: Many<Row> = Vec::<Row>::new().into();
        assert!(none.is_empty());
    }
}

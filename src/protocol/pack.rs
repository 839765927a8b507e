//! SoftEther Pack serialization format.
//!
//! Pack is SoftEther's binary serialization format used for every
//! control-plane message.
//!
//! ## Binary Format
//!
//! All integers are big-endian.
//!
//! - Pack: `[num_elements:u32] [element...]`
//! - Element: `[name_len+1:u32] [name:bytes] [type:u32] [num_values:u32] [value...]`
//! - Value types:
//!   - INT (0): `[value:u32]`
//!   - DATA (1): `[size:u32] [bytes...]`
//!   - STR (2): `[len:u32] [bytes...]`
//!   - UNISTR (3): reserved, rejected
//!   - INT64 (4): `[value:u64]`

use std::collections::HashMap;
use std::fmt::Write as _;
use std::net::Ipv4Addr;

use bytes::{Buf, BufMut, Bytes, BytesMut};
use rand::{Rng, RngCore};
use thiserror::Error;

use super::constants::*;

/// Errors raised while building or decoding a Pack.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PackError {
    #[error("number exceeds limit ({0})")]
    NumberExceeds(usize),

    #[error("size over limit ({0} bytes)")]
    SizeOver(usize),

    #[error("invalid value type {0}")]
    InvalidType(u32),

    #[error("unicode string values are not supported")]
    UnsupportedValueType,

    #[error("element {0:?} already exists")]
    SameNameExists(String),

    #[error("element {0:?} has no values")]
    ZeroNumValue(String),

    #[error("invalid element name")]
    InvalidName,

    #[error("unexpected end of Pack data")]
    Truncated,
}

type PackResult<T> = std::result::Result<T, PackError>;

/// Pack value types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ValueType {
    Int = 0,
    Data = 1,
    Str = 2,
    UniStr = 3,
    Int64 = 4,
}

impl TryFrom<u32> for ValueType {
    type Error = PackError;

    fn try_from(value: u32) -> PackResult<Self> {
        match value {
            0 => Ok(Self::Int),
            1 => Ok(Self::Data),
            2 => Ok(Self::Str),
            3 => Ok(Self::UniStr),
            4 => Ok(Self::Int64),
            other => Err(PackError::InvalidType(other)),
        }
    }
}

/// A value in a Pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PackValue {
    Int(u32),
    Int64(u64),
    Str(String),
    Data(Bytes),
}

impl PackValue {
    /// Get the value type.
    pub fn value_type(&self) -> ValueType {
        match self {
            Self::Int(_) => ValueType::Int,
            Self::Int64(_) => ValueType::Int64,
            Self::Str(_) => ValueType::Str,
            Self::Data(_) => ValueType::Data,
        }
    }

    fn encode(&self, buf: &mut BytesMut) {
        match self {
            Self::Int(v) => buf.put_u32(*v),
            Self::Int64(v) => buf.put_u64(*v),
            Self::Str(s) => {
                buf.put_u32(s.len() as u32);
                buf.put_slice(s.as_bytes());
            }
            Self::Data(d) => {
                buf.put_u32(d.len() as u32);
                buf.put_slice(d);
            }
        }
    }
}

/// A named, typed list of values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackElement {
    name: String,
    value_type: ValueType,
    values: Vec<PackValue>,
}

impl PackElement {
    /// Build an element; every value must carry `value_type`.
    pub fn new(
        name: impl Into<String>,
        value_type: ValueType,
        values: Vec<PackValue>,
    ) -> PackResult<Self> {
        let name = name.into();
        validate_name(&name)?;
        if value_type == ValueType::UniStr {
            return Err(PackError::UnsupportedValueType);
        }
        if values.is_empty() {
            return Err(PackError::ZeroNumValue(name));
        }
        if values.len() > MAX_VALUE_NUM {
            return Err(PackError::NumberExceeds(values.len()));
        }
        if let Some(v) = values.iter().find(|v| v.value_type() != value_type) {
            return Err(PackError::InvalidType(v.value_type() as u32));
        }
        Ok(Self {
            name,
            value_type,
            values,
        })
    }

    fn single(name: &str, value: PackValue) -> PackResult<Self> {
        Self::new(name, value.value_type(), vec![value])
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value_type(&self) -> ValueType {
        self.value_type
    }

    pub fn values(&self) -> &[PackValue] {
        &self.values
    }

    fn encode(&self, buf: &mut BytesMut) {
        // Name length counts a terminator that is never written.
        buf.put_u32(self.name.len() as u32 + 1);
        buf.put_slice(self.name.as_bytes());
        buf.put_u32(self.value_type as u32);
        buf.put_u32(self.values.len() as u32);
        for value in &self.values {
            value.encode(buf);
        }
    }

    fn int(&self, index: usize) -> u32 {
        match self.values.get(index) {
            Some(PackValue::Int(v)) => *v,
            _ => 0,
        }
    }

    fn int64(&self, index: usize) -> u64 {
        match self.values.get(index) {
            Some(PackValue::Int64(v)) => *v,
            _ => 0,
        }
    }

    fn str(&self, index: usize) -> &str {
        match self.values.get(index) {
            Some(PackValue::Str(s)) => s,
            _ => "",
        }
    }

    fn data(&self, index: usize) -> &[u8] {
        match self.values.get(index) {
            Some(PackValue::Data(d)) => d,
            _ => &[],
        }
    }
}

fn validate_name(name: &str) -> PackResult<()> {
    if name.is_empty() || name.len() > MAX_ELEMENT_NAME_LEN {
        return Err(PackError::InvalidName);
    }
    Ok(())
}

/// SoftEther Pack - binary serialization format.
///
/// Element names are case-insensitive and unique. Insertion order is kept so
/// serialization is deterministic.
#[derive(Debug, Clone, Default)]
pub struct Pack {
    elements: Vec<PackElement>,
    index: HashMap<String, usize>,
}

impl PartialEq for Pack {
    fn eq(&self, other: &Self) -> bool {
        self.elements == other.elements
    }
}

impl Pack {
    /// Create a new empty Pack.
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Add Methods
    // ========================================================================

    /// Add a fully built element.
    pub fn add_element(&mut self, element: PackElement) -> PackResult<()> {
        if self.elements.len() >= MAX_ELEMENT_NUM {
            return Err(PackError::NumberExceeds(self.elements.len() + 1));
        }
        let key = element.name.to_lowercase();
        if self.index.contains_key(&key) {
            return Err(PackError::SameNameExists(element.name));
        }
        self.index.insert(key, self.elements.len());
        self.elements.push(element);
        Ok(())
    }

    /// Add an integer value.
    pub fn add_int(&mut self, name: &str, value: u32) -> PackResult<()> {
        self.add_element(PackElement::single(name, PackValue::Int(value))?)
    }

    /// Add a 64-bit integer value.
    pub fn add_int64(&mut self, name: &str, value: u64) -> PackResult<()> {
        self.add_element(PackElement::single(name, PackValue::Int64(value))?)
    }

    /// Add a boolean value (stored as int).
    pub fn add_bool(&mut self, name: &str, value: bool) -> PackResult<()> {
        self.add_int(name, u32::from(value))
    }

    /// Add a string value.
    pub fn add_str(&mut self, name: &str, value: impl Into<String>) -> PackResult<()> {
        self.add_element(PackElement::single(name, PackValue::Str(value.into()))?)
    }

    /// Add binary data.
    pub fn add_data(&mut self, name: &str, value: impl Into<Bytes>) -> PackResult<()> {
        self.add_element(PackElement::single(name, PackValue::Data(value.into()))?)
    }

    /// Add an IPv4 address in the four-element IP layout.
    pub fn add_ip32(&mut self, name: &str, ip: Ipv4Addr) -> PackResult<()> {
        self.add_bool(&format!("{name}@ipv6_bool"), false)?;
        self.add_data(&format!("{name}@ipv6_array"), vec![0u8; 16])?;
        self.add_int(&format!("{name}@ipv6_scope_id"), 0)?;
        // The address travels as its in-memory (little-endian) u32.
        self.add_int(name, u32::from_le_bytes(ip.octets()))
    }

    /// Add the random-size padding element.
    pub fn add_padding(&mut self) -> PackResult<()> {
        let mut rng = rand::thread_rng();
        let mut padding = vec![0u8; rng.gen_range(0..HTTP_PACK_RAND_SIZE_MAX)];
        rng.fill_bytes(&mut padding);
        self.add_data(PADDING_ELEMENT, padding)
    }

    // ========================================================================
    // Get Methods
    // ========================================================================

    /// Look up an element by name.
    pub fn element(&self, name: &str) -> Option<&PackElement> {
        self.index
            .get(&name.to_lowercase())
            .map(|&i| &self.elements[i])
    }

    fn typed(&self, name: &str, value_type: ValueType) -> Option<&PackElement> {
        self.element(name).filter(|e| e.value_type == value_type)
    }

    /// Get an integer value, 0 when absent.
    pub fn get_int(&self, name: &str) -> u32 {
        self.get_int_ex(name, 0)
    }

    /// Get the integer at `index`, 0 when absent.
    pub fn get_int_ex(&self, name: &str, index: usize) -> u32 {
        self.typed(name, ValueType::Int)
            .map_or(0, |e| e.int(index))
    }

    /// Get a 64-bit integer value, 0 when absent.
    pub fn get_int64(&self, name: &str) -> u64 {
        self.get_int64_ex(name, 0)
    }

    pub fn get_int64_ex(&self, name: &str, index: usize) -> u64 {
        self.typed(name, ValueType::Int64)
            .map_or(0, |e| e.int64(index))
    }

    /// Get a boolean value, false when absent.
    pub fn get_bool(&self, name: &str) -> bool {
        self.get_int(name) != 0
    }

    /// Get a string value, empty when absent.
    pub fn get_str(&self, name: &str) -> &str {
        self.get_str_ex(name, 0)
    }

    pub fn get_str_ex(&self, name: &str, index: usize) -> &str {
        self.typed(name, ValueType::Str).map_or("", |e| e.str(index))
    }

    /// Get binary data, empty when absent.
    pub fn get_data(&self, name: &str) -> &[u8] {
        self.get_data_ex(name, 0)
    }

    pub fn get_data_ex(&self, name: &str, index: usize) -> &[u8] {
        self.typed(name, ValueType::Data).map_or(&[], |e| e.data(index))
    }

    /// Size of a DATA value, 0 when absent.
    pub fn get_data_size(&self, name: &str) -> usize {
        self.get_data(name).len()
    }

    /// Read back an address written by [`Pack::add_ip32`].
    pub fn get_ip32(&self, name: &str) -> Ipv4Addr {
        Ipv4Addr::from(self.get_int(name).to_le_bytes())
    }

    /// Check if an element exists.
    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(&name.to_lowercase())
    }

    /// Get the number of elements.
    pub fn len(&self) -> usize {
        self.elements.len()
    }

    /// Check if the Pack is empty.
    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Elements in insertion order.
    pub fn elements(&self) -> impl Iterator<Item = &PackElement> {
        self.elements.iter()
    }

    /// Render element names and types for logs, masking secrets.
    pub fn describe(&self) -> String {
        const MASKED: [&str; 7] = [
            "secure_password",
            "password",
            "ticket",
            "session_key",
            "random",
            "unique_id",
            PADDING_ELEMENT,
        ];
        let mut out = String::new();
        for (i, e) in self.elements.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            let masked = MASKED.iter().any(|m| e.name.eq_ignore_ascii_case(m));
            let _ = match (&e.values[0], masked) {
                (PackValue::Data(d), true) => write!(out, "{}=<{} bytes>", e.name, d.len()),
                (_, true) => write!(out, "{}=<redacted>", e.name),
                (PackValue::Int(v), false) => write!(out, "{}={}", e.name, v),
                (PackValue::Int64(v), false) => write!(out, "{}={}", e.name, v),
                (PackValue::Str(s), false) => write!(out, "{}={:?}", e.name, s),
                (PackValue::Data(d), false) => write!(out, "{}=<{} bytes>", e.name, d.len()),
            };
        }
        out
    }

    // ========================================================================
    // Serialization
    // ========================================================================

    /// Serialize the Pack to bytes.
    pub fn to_bytes(&self) -> Bytes {
        let mut buf = BytesMut::with_capacity(1024);
        buf.put_u32(self.elements.len() as u32);
        for element in &self.elements {
            element.encode(&mut buf);
        }
        buf.freeze()
    }

    /// Deserialize a Pack from bytes.
    pub fn from_bytes(data: &[u8]) -> PackResult<Self> {
        let mut buf = data;
        let num_elements = read_u32(&mut buf)? as usize;
        if num_elements > MAX_ELEMENT_NUM {
            return Err(PackError::NumberExceeds(num_elements));
        }

        let mut pack = Pack::new();
        for _ in 0..num_elements {
            let element = parse_element(&mut buf)?;
            pack.add_element(element)?;
        }
        Ok(pack)
    }
}

fn read_u32(buf: &mut &[u8]) -> PackResult<u32> {
    if buf.remaining() < 4 {
        return Err(PackError::Truncated);
    }
    Ok(buf.get_u32())
}

fn read_bytes<'a>(buf: &mut &'a [u8], len: usize) -> PackResult<&'a [u8]> {
    if buf.remaining() < len {
        return Err(PackError::Truncated);
    }
    let (head, tail) = buf.split_at(len);
    *buf = tail;
    Ok(head)
}

fn parse_element(buf: &mut &[u8]) -> PackResult<PackElement> {
    let declared = read_u32(buf)? as usize;
    if declared == 0 || declared - 1 > MAX_ELEMENT_NAME_LEN {
        return Err(PackError::InvalidName);
    }
    let name = String::from_utf8_lossy(read_bytes(buf, declared - 1)?).into_owned();

    let value_type = ValueType::try_from(read_u32(buf)?)?;
    let num_values = read_u32(buf)? as usize;
    if num_values > MAX_VALUE_NUM {
        return Err(PackError::NumberExceeds(num_values));
    }

    // Every value takes at least four bytes on the wire.
    let mut values = Vec::with_capacity(num_values.min(buf.remaining() / 4));
    for _ in 0..num_values {
        values.push(parse_value(buf, value_type)?);
    }

    PackElement::new(name, value_type, values)
}

fn parse_value(buf: &mut &[u8], value_type: ValueType) -> PackResult<PackValue> {
    match value_type {
        ValueType::Int => Ok(PackValue::Int(read_u32(buf)?)),
        ValueType::Int64 => {
            if buf.remaining() < 8 {
                return Err(PackError::Truncated);
            }
            Ok(PackValue::Int64(buf.get_u64()))
        }
        ValueType::Data => {
            let size = read_u32(buf)? as usize;
            if size > MAX_VALUE_SIZE {
                return Err(PackError::SizeOver(size));
            }
            Ok(PackValue::Data(Bytes::copy_from_slice(read_bytes(buf, size)?)))
        }
        ValueType::Str => {
            let len = read_u32(buf)? as usize;
            if len > MAX_VALUE_SIZE - 1 {
                return Err(PackError::SizeOver(len));
            }
            let s = String::from_utf8_lossy(read_bytes(buf, len)?).into_owned();
            Ok(PackValue::Str(s))
        }
        ValueType::UniStr => Err(PackError::UnsupportedValueType),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(count: u32) -> BytesMut {
        let mut buf = BytesMut::new();
        buf.put_u32(count);
        buf
    }

    fn element_header(buf: &mut BytesMut, name: &str, value_type: u32, num_values: u32) {
        buf.put_u32(name.len() as u32 + 1);
        buf.put_slice(name.as_bytes());
        buf.put_u32(value_type);
        buf.put_u32(num_values);
    }

    #[test]
    fn test_pack_roundtrip() {
        let mut pack = Pack::new();
        pack.add_int("version", 123).unwrap();
        pack.add_str("hello", "world").unwrap();
        pack.add_bool("enabled", true).unwrap();
        pack.add_data("bytes", vec![1, 2, 3, 4]).unwrap();
        pack.add_int64("big", 0x1234_5678_9ABC_DEF0).unwrap();
        pack.add_element(
            PackElement::new(
                "multi",
                ValueType::Int,
                vec![PackValue::Int(1), PackValue::Int(2), PackValue::Int(3)],
            )
            .unwrap(),
        )
        .unwrap();

        let parsed = Pack::from_bytes(&pack.to_bytes()).unwrap();
        assert_eq!(parsed, pack);
        assert_eq!(parsed.get_int("version"), 123);
        assert_eq!(parsed.get_str("hello"), "world");
        assert!(parsed.get_bool("enabled"));
        assert_eq!(parsed.get_data("bytes"), &[1, 2, 3, 4]);
        assert_eq!(parsed.get_int64("big"), 0x1234_5678_9ABC_DEF0);
        assert_eq!(parsed.get_int_ex("multi", 2), 3);
    }

    #[test]
    fn test_padding_is_ignored_by_roundtrip() {
        let mut pack = Pack::new();
        pack.add_str("method", "login").unwrap();
        let mut padded = pack.clone();
        padded.add_padding().unwrap();

        let parsed = Pack::from_bytes(&padded.to_bytes()).unwrap();
        assert!(parsed.get_data_size(PADDING_ELEMENT) < HTTP_PACK_RAND_SIZE_MAX);
        let without: Vec<_> = parsed
            .elements()
            .filter(|e| e.name() != PADDING_ELEMENT)
            .cloned()
            .collect();
        assert_eq!(without, pack.elements().cloned().collect::<Vec<_>>());
    }

    #[test]
    fn test_wire_layout() {
        let mut pack = Pack::new();
        pack.add_int("ab", 7).unwrap();
        let bytes = pack.to_bytes();
        assert_eq!(
            bytes.as_ref(),
            &[0, 0, 0, 1, 0, 0, 0, 3, b'a', b'b', 0, 0, 0, 0, 0, 0, 0, 1, 0, 0, 0, 7]
        );
    }

    #[test]
    fn test_pack_case_insensitive() {
        let mut pack = Pack::new();
        pack.add_int("MyValue", 42).unwrap();

        assert_eq!(pack.get_int("myvalue"), 42);
        assert_eq!(pack.get_int("MYVALUE"), 42);
        assert_eq!(
            pack.add_int("myVALUE", 1),
            Err(PackError::SameNameExists("myVALUE".into()))
        );
    }

    #[test]
    fn test_absent_and_mistyped_fields_read_as_zero() {
        let mut pack = Pack::new();
        pack.add_str("name", "x").unwrap();

        assert_eq!(pack.get_int("missing"), 0);
        assert_eq!(pack.get_str("missing"), "");
        assert!(pack.get_data("missing").is_empty());
        assert_eq!(pack.get_int("name"), 0);
        assert_eq!(pack.get_str_ex("name", 5), "");
    }

    #[test]
    fn test_zero_values_rejected() {
        let err = PackElement::new("empty", ValueType::Int, Vec::new()).unwrap_err();
        assert_eq!(err, PackError::ZeroNumValue("empty".into()));

        let mut buf = header(1);
        element_header(&mut buf, "empty", 0, 0);
        assert_eq!(
            Pack::from_bytes(&buf),
            Err(PackError::ZeroNumValue("empty".into()))
        );
    }

    #[test]
    fn test_element_count_limit() {
        let buf = header(MAX_ELEMENT_NUM as u32 + 1);
        assert_eq!(
            Pack::from_bytes(&buf),
            Err(PackError::NumberExceeds(MAX_ELEMENT_NUM + 1))
        );
    }

    #[test]
    fn test_value_count_limit() {
        let mut buf = header(1);
        element_header(&mut buf, "n", 0, MAX_VALUE_NUM as u32 + 1);
        assert_eq!(
            Pack::from_bytes(&buf),
            Err(PackError::NumberExceeds(MAX_VALUE_NUM + 1))
        );
    }

    #[test]
    fn test_value_size_limits() {
        let mut buf = header(1);
        element_header(&mut buf, "d", 1, 1);
        buf.put_u32(MAX_VALUE_SIZE as u32 + 1);
        assert_eq!(
            Pack::from_bytes(&buf),
            Err(PackError::SizeOver(MAX_VALUE_SIZE + 1))
        );

        let mut buf = header(1);
        element_header(&mut buf, "s", 2, 1);
        buf.put_u32(MAX_VALUE_SIZE as u32);
        assert_eq!(
            Pack::from_bytes(&buf),
            Err(PackError::SizeOver(MAX_VALUE_SIZE))
        );

        // At the limit the size is accepted and the missing payload is reported.
        let mut buf = header(1);
        element_header(&mut buf, "d", 1, 1);
        buf.put_u32(MAX_VALUE_SIZE as u32);
        assert_eq!(Pack::from_bytes(&buf), Err(PackError::Truncated));
    }

    #[test]
    fn test_invalid_types() {
        let mut buf = header(1);
        element_header(&mut buf, "x", 9, 1);
        assert_eq!(Pack::from_bytes(&buf), Err(PackError::InvalidType(9)));

        let mut buf = header(1);
        element_header(&mut buf, "u", 3, 1);
        buf.put_u32(0);
        assert_eq!(Pack::from_bytes(&buf), Err(PackError::UnsupportedValueType));
    }

    #[test]
    fn test_invalid_names() {
        let mut buf = header(1);
        buf.put_u32(0);
        assert_eq!(Pack::from_bytes(&buf), Err(PackError::InvalidName));

        let long = "n".repeat(MAX_ELEMENT_NAME_LEN + 1);
        assert_eq!(Pack::new().add_int(&long, 1), Err(PackError::InvalidName));
        assert_eq!(Pack::new().add_int("", 1), Err(PackError::InvalidName));
    }

    #[test]
    fn test_duplicate_names_on_wire() {
        let mut buf = header(2);
        element_header(&mut buf, "Key", 0, 1);
        buf.put_u32(1);
        element_header(&mut buf, "KEY", 0, 1);
        buf.put_u32(2);
        assert_eq!(
            Pack::from_bytes(&buf),
            Err(PackError::SameNameExists("KEY".into()))
        );
    }

    #[test]
    fn test_truncated() {
        let mut pack = Pack::new();
        pack.add_str("hello", "world").unwrap();
        let bytes = pack.to_bytes();
        for cut in 0..bytes.len() {
            assert_eq!(Pack::from_bytes(&bytes[..cut]), Err(PackError::Truncated));
        }
    }

    #[test]
    fn test_ip32_layout() {
        let mut pack = Pack::new();
        pack.add_ip32("ServerIpAddress", Ipv4Addr::new(10, 0, 0, 1))
            .unwrap();

        assert_eq!(pack.len(), 4);
        assert!(!pack.get_bool("ServerIpAddress@ipv6_bool"));
        assert_eq!(pack.get_data("ServerIpAddress@ipv6_array"), &[0u8; 16]);
        assert_eq!(pack.get_int("ServerIpAddress@ipv6_scope_id"), 0);
        assert_eq!(pack.get_int("ServerIpAddress"), 0x0100_000A);
        assert_eq!(
            pack.get_ip32("serveripaddress"),
            Ipv4Addr::new(10, 0, 0, 1)
        );
    }

    #[test]
    fn test_describe_masks_secrets() {
        let mut pack = Pack::new();
        pack.add_str("username", "alice").unwrap();
        pack.add_data("secure_password", vec![0xAA; 20]).unwrap();
        pack.add_int("authtype", 1).unwrap();

        let text = pack.describe();
        assert!(text.contains("username=\"alice\""));
        assert!(text.contains("secure_password=<20 bytes>"));
        assert!(text.contains("authtype=1"));
        assert!(!text.contains("170"));
    }
}

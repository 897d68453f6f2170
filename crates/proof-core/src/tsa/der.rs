//! Codec DER mínimo para las estructuras de RFC 3161 / CMS / X.509.
//!
//! Sólo cubre lo que el protocolo usa: tags de un byte, longitudes definidas
//! (forma corta y larga hasta 4 bytes), enteros, OIDs, strings y tiempos.
//! El lector es zero-copy: cada `Tlv` conserva también sus bytes crudos,
//! necesarios para verificar firmas sobre estructuras ya codificadas.

use chrono::{DateTime, TimeZone, Utc};
use thiserror::Error;

pub mod tag {
    pub const BOOLEAN: u8 = 0x01;
    pub const INTEGER: u8 = 0x02;
    pub const BIT_STRING: u8 = 0x03;
    pub const OCTET_STRING: u8 = 0x04;
    pub const NULL: u8 = 0x05;
    pub const OID: u8 = 0x06;
    pub const UTF8_STRING: u8 = 0x0c;
    pub const UTC_TIME: u8 = 0x17;
    pub const GENERALIZED_TIME: u8 = 0x18;
    pub const SEQUENCE: u8 = 0x30;
    pub const SET: u8 = 0x31;

    /// Tag context-specific `[n]`.
    pub const fn context(n: u8, constructed: bool) -> u8 {
        let form = if constructed { 0x20 } else { 0x00 };
        0x80 | form | n
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DerError {
    #[error("unexpected end of input")]
    Truncated,
    #[error("expected tag 0x{expected:02x}, found 0x{found:02x}")]
    UnexpectedTag { expected: u8, found: u8 },
    #[error("unsupported length encoding")]
    BadLength,
    #[error("high-tag-number form not supported")]
    HighTag,
    #[error("trailing data after {0}")]
    Trailing(&'static str),
    #[error("invalid {0}")]
    Invalid(&'static str),
}

/// Elemento DER leído: tag, contenido y bytes completos (header incluido).
#[derive(Debug, Clone, Copy)]
pub struct Tlv<'a> {
    pub tag: u8,
    pub content: &'a [u8],
    pub raw: &'a [u8],
}

impl<'a> Tlv<'a> {
    /// Lector sobre el contenido (para tipos construidos).
    pub fn reader(&self) -> DerReader<'a> {
        DerReader::new(self.content)
    }
}

pub struct DerReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> DerReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    pub fn peek_tag(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    pub fn read_any(&mut self) -> Result<Tlv<'a>, DerError> {
        let start = self.pos;
        let tag = *self.data.get(start).ok_or(DerError::Truncated)?;
        if tag & 0x1f == 0x1f {
            return Err(DerError::HighTag);
        }
        let first = *self.data.get(start + 1).ok_or(DerError::Truncated)?;
        let (len, header) = if first < 0x80 {
            (first as usize, 2)
        } else {
            let n = (first & 0x7f) as usize;
            if n == 0 || n > 4 {
                return Err(DerError::BadLength);
            }
            let bytes = self.data.get(start + 2..start + 2 + n).ok_or(DerError::Truncated)?;
            let len = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
            (len, 2 + n)
        };
        let body = start + header;
        let end = body.checked_add(len).ok_or(DerError::BadLength)?;
        if end > self.data.len() {
            return Err(DerError::Truncated);
        }
        self.pos = end;
        Ok(Tlv { tag, content: &self.data[body..end], raw: &self.data[start..end] })
    }

    pub fn read(&mut self, expected: u8) -> Result<Tlv<'a>, DerError> {
        let tlv = self.read_any()?;
        if tlv.tag != expected {
            return Err(DerError::UnexpectedTag { expected, found: tlv.tag });
        }
        Ok(tlv)
    }

    /// Lee el siguiente elemento sólo si tiene el tag indicado.
    pub fn read_optional(&mut self, expected: u8) -> Result<Option<Tlv<'a>>, DerError> {
        if self.peek_tag() == Some(expected) {
            self.read(expected).map(Some)
        } else {
            Ok(None)
        }
    }

    pub fn finish(&self, what: &'static str) -> Result<(), DerError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(DerError::Trailing(what))
        }
    }

    pub fn read_sequence(&mut self) -> Result<DerReader<'a>, DerError> {
        Ok(self.read(tag::SEQUENCE)?.reader())
    }

    pub fn read_oid(&mut self) -> Result<Vec<u64>, DerError> {
        decode_oid(self.read(tag::OID)?.content)
    }

    /// Bytes big-endian (complemento a dos) de un INTEGER.
    pub fn read_integer(&mut self) -> Result<&'a [u8], DerError> {
        let tlv = self.read(tag::INTEGER)?;
        if tlv.content.is_empty() {
            return Err(DerError::Invalid("integer"));
        }
        Ok(tlv.content)
    }

    pub fn read_small_uint(&mut self) -> Result<u64, DerError> {
        let bytes = self.read_integer()?;
        if bytes[0] & 0x80 != 0 {
            return Err(DerError::Invalid("unsigned integer"));
        }
        let bytes = strip_leading_zeros(bytes);
        if bytes.len() > 8 {
            return Err(DerError::Invalid("small integer"));
        }
        Ok(bytes.iter().fold(0u64, |acc, b| (acc << 8) | *b as u64))
    }

    pub fn read_octet_string(&mut self) -> Result<&'a [u8], DerError> {
        Ok(self.read(tag::OCTET_STRING)?.content)
    }

    pub fn read_bool(&mut self) -> Result<bool, DerError> {
        match self.read(tag::BOOLEAN)?.content {
            [0x00] => Ok(false),
            [0xff] => Ok(true),
            _ => Err(DerError::Invalid("boolean")),
        }
    }

    /// UTCTime o GeneralizedTime.
    pub fn read_time(&mut self) -> Result<DateTime<Utc>, DerError> {
        let tlv = self.read_any()?;
        match tlv.tag {
            tag::GENERALIZED_TIME => parse_generalized_time(tlv.content),
            tag::UTC_TIME => parse_utc_time(tlv.content),
            found => Err(DerError::UnexpectedTag { expected: tag::GENERALIZED_TIME, found }),
        }
    }
}

fn strip_leading_zeros(bytes: &[u8]) -> &[u8] {
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    &bytes[skip..]
}

pub fn decode_oid(content: &[u8]) -> Result<Vec<u64>, DerError> {
    let mut values = Vec::new();
    let mut acc: u64 = 0;
    let mut pending = false;
    for b in content {
        if acc > (u64::MAX >> 7) {
            return Err(DerError::Invalid("oid arc"));
        }
        acc = (acc << 7) | u64::from(b & 0x7f);
        if b & 0x80 == 0 {
            values.push(acc);
            acc = 0;
            pending = false;
        } else {
            pending = true;
        }
    }
    if pending || values.is_empty() {
        return Err(DerError::Invalid("oid"));
    }
    let first = values[0];
    let (a0, a1) = match first {
        0..=39 => (0, first),
        40..=79 => (1, first - 40),
        _ => (2, first - 80),
    };
    let mut arcs = vec![a0, a1];
    arcs.extend_from_slice(&values[1..]);
    Ok(arcs)
}

pub fn oid_to_string(arcs: &[u64]) -> String {
    arcs.iter().map(u64::to_string).collect::<Vec<_>>().join(".")
}

fn digits(s: &str, from: usize, len: usize) -> Result<u32, DerError> {
    s.get(from..from + len)
        .filter(|part| part.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|part| part.parse().ok())
        .ok_or(DerError::Invalid("time"))
}

fn ymd_hms(year: i32, s: &str, offset: usize) -> Result<DateTime<Utc>, DerError> {
    let month = digits(s, offset, 2)?;
    let day = digits(s, offset + 2, 2)?;
    let hour = digits(s, offset + 4, 2)?;
    let minute = digits(s, offset + 6, 2)?;
    let second = digits(s, offset + 8, 2)?;
    Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
       .single()
       .ok_or(DerError::Invalid("time"))
}

/// `YYYYMMDDHHMMSS[.f+]Z`
pub fn parse_generalized_time(content: &[u8]) -> Result<DateTime<Utc>, DerError> {
    let s = std::str::from_utf8(content).map_err(|_| DerError::Invalid("GeneralizedTime"))?;
    let s = s.strip_suffix('Z').ok_or(DerError::Invalid("GeneralizedTime"))?;
    let (main, frac) = match s.split_once('.') {
        Some((m, f)) => (m, Some(f)),
        None => (s, None),
    };
    if main.len() != 14 {
        return Err(DerError::Invalid("GeneralizedTime"));
    }
    let year = digits(main, 0, 4)? as i32;
    let mut t = ymd_hms(year, main, 4)?;
    if let Some(f) = frac {
        if f.is_empty() || f.len() > 9 || !f.bytes().all(|b| b.is_ascii_digit()) {
            return Err(DerError::Invalid("GeneralizedTime fraction"));
        }
        let nanos: i64 = format!("{f:0<9}").parse().map_err(|_| DerError::Invalid("GeneralizedTime fraction"))?;
        t += chrono::Duration::nanoseconds(nanos);
    }
    Ok(t)
}

/// `YYMMDDHHMMSSZ` (RFC 5280: YY >= 50 es 19YY).
pub fn parse_utc_time(content: &[u8]) -> Result<DateTime<Utc>, DerError> {
    let s = std::str::from_utf8(content).map_err(|_| DerError::Invalid("UTCTime"))?;
    let s = s.strip_suffix('Z').ok_or(DerError::Invalid("UTCTime"))?;
    if s.len() != 12 {
        return Err(DerError::Invalid("UTCTime"));
    }
    let yy = digits(s, 0, 2)? as i32;
    let year = if yy >= 50 { 1900 + yy } else { 2000 + yy };
    ymd_hms(year, s, 2)
}

// ---------------------------------------------------------------------------
// Escritura
// ---------------------------------------------------------------------------

pub fn encode_tlv(tag: u8, content: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(content.len() + 6);
    out.push(tag);
    let len = content.len();
    if len < 0x80 {
        out.push(len as u8);
    } else {
        let bytes = (len as u64).to_be_bytes();
        let significant = strip_leading_zeros(&bytes);
        out.push(0x80 | significant.len() as u8);
        out.extend_from_slice(significant);
    }
    out.extend_from_slice(content);
    out
}

pub fn sequence(items: &[Vec<u8>]) -> Vec<u8> {
    encode_tlv(tag::SEQUENCE, &items.concat())
}

/// SET OF: DER exige los elementos ordenados por su codificación.
pub fn set(items: &[Vec<u8>]) -> Vec<u8> {
    let mut sorted = items.to_vec();
    sorted.sort();
    encode_tlv(tag::SET, &sorted.concat())
}

/// `[n] EXPLICIT`
pub fn explicit(n: u8, inner: &[u8]) -> Vec<u8> {
    encode_tlv(tag::context(n, true), inner)
}

pub fn uint(value: u64) -> Vec<u8> {
    integer_unsigned(&value.to_be_bytes())
}

/// INTEGER a partir de una magnitud big-endian sin signo.
pub fn integer_unsigned(magnitude: &[u8]) -> Vec<u8> {
    let trimmed = strip_leading_zeros(magnitude);
    let mut content = Vec::with_capacity(trimmed.len() + 1);
    if trimmed.first().map_or(true, |b| b & 0x80 != 0) {
        content.push(0x00);
    }
    content.extend_from_slice(trimmed);
    encode_tlv(tag::INTEGER, &content)
}

pub fn boolean(value: bool) -> Vec<u8> {
    encode_tlv(tag::BOOLEAN, &[if value { 0xff } else { 0x00 }])
}

pub fn null() -> Vec<u8> {
    encode_tlv(tag::NULL, &[])
}

pub fn octet_string(bytes: &[u8]) -> Vec<u8> {
    encode_tlv(tag::OCTET_STRING, bytes)
}

/// BIT STRING sin bits de relleno.
pub fn bit_string(bytes: &[u8]) -> Vec<u8> {
    let mut content = Vec::with_capacity(bytes.len() + 1);
    content.push(0x00);
    content.extend_from_slice(bytes);
    encode_tlv(tag::BIT_STRING, &content)
}

pub fn utf8_string(s: &str) -> Vec<u8> {
    encode_tlv(tag::UTF8_STRING, s.as_bytes())
}

pub fn oid(arcs: &[u64]) -> Vec<u8> {
    let a0 = arcs.first().copied().unwrap_or(0);
    let a1 = arcs.get(1).copied().unwrap_or(0);
    let mut content = Vec::new();
    push_base128(&mut content, a0 * 40 + a1);
    for arc in arcs.iter().skip(2) {
        push_base128(&mut content, *arc);
    }
    encode_tlv(tag::OID, &content)
}

fn push_base128(out: &mut Vec<u8>, mut value: u64) {
    let mut groups = vec![(value & 0x7f) as u8];
    value >>= 7;
    while value > 0 {
        groups.push((value & 0x7f) as u8 | 0x80);
        value >>= 7;
    }
    groups.reverse();
    out.extend_from_slice(&groups);
}

pub fn generalized_time(t: &DateTime<Utc>) -> Vec<u8> {
    encode_tlv(tag::GENERALIZED_TIME, t.format("%Y%m%d%H%M%SZ").to_string().as_bytes())
}

pub fn utc_time(t: &DateTime<Utc>) -> Vec<u8> {
    encode_tlv(tag::UTC_TIME, t.format("%y%m%d%H%M%SZ").to_string().as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    const SHA256: &[u64] = &[2, 16, 840, 1, 101, 3, 4, 2, 1];

    #[test]
    fn oid_encoding_matches_known_bytes() {
        let encoded = oid(SHA256);
        assert_eq!(encoded, vec![0x06, 0x09, 0x60, 0x86, 0x48, 0x01, 0x65, 0x03, 0x04, 0x02, 0x01]);
        let arcs = DerReader::new(&encoded).read_oid().expect("oid");
        assert_eq!(arcs, SHA256);
        assert_eq!(oid_to_string(&arcs), "2.16.840.1.101.3.4.2.1");
    }

    #[test]
    fn long_form_length() {
        let content = vec![0xaa; 300];
        let encoded = octet_string(&content);
        assert_eq!(&encoded[..4], &[0x04, 0x82, 0x01, 0x2c]);
        let mut r = DerReader::new(&encoded);
        assert_eq!(r.read_octet_string().expect("octets").len(), 300);
        assert!(r.is_empty());
    }

    #[test]
    fn integers_are_minimal_and_positive() {
        assert_eq!(uint(0), vec![0x02, 0x01, 0x00]);
        assert_eq!(uint(1), vec![0x02, 0x01, 0x01]);
        assert_eq!(uint(128), vec![0x02, 0x02, 0x00, 0x80]);
        assert_eq!(DerReader::new(&uint(70_000)).read_small_uint(), Ok(70_000));
    }

    #[test]
    fn truncated_input_is_an_error() {
        let encoded = sequence(&[uint(5), boolean(true)]);
        let cut = &encoded[..encoded.len() - 1];
        assert_eq!(DerReader::new(cut).read_any().err(), Some(DerError::Truncated));
    }

    #[test]
    fn times_parse() {
        let t = parse_generalized_time(b"20240229123456.5Z").expect("gt");
        assert_eq!(t.to_rfc3339(), "2024-02-29T12:34:56.500+00:00");
        let u = parse_utc_time(b"491231235959Z").expect("utc");
        assert_eq!(u.to_rfc3339(), "2049-12-31T23:59:59+00:00");
        assert!(parse_generalized_time(b"2024022912345Z").is_err());
        let now = Utc.with_ymd_and_hms(2030, 1, 2, 3, 4, 5).single().expect("date");
        assert_eq!(DerReader::new(&generalized_time(&now)).read_time(), Ok(now));
    }
}

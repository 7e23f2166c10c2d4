//! Multicast DNS message codec.
//!
//! Builds PTR queries and parses responses restricted to the record types
//! DNS-SD needs (PTR, SRV, TXT, A, AAAA). Other record types are kept as raw
//! rdata. Every read is bounds-checked; a declared length running past the
//! end of the packet yields `TruncatedMessage`.

use cast_core::CodecError;
use std::net::{Ipv4Addr, Ipv6Addr};

/// Size of the fixed DNS header.
pub const HEADER_LEN: usize = 12;

/// Internet class.
pub const CLASS_IN: u16 = 1;

const POINTER_TAG: u8 = 0xC0;

/// DNS resource record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RecordType {
    A,
    Ptr,
    Txt,
    Aaaa,
    Srv,
    Other(u16),
}

impl From<u16> for RecordType {
    fn from(v: u16) -> Self {
        match v {
            1 => RecordType::A,
            12 => RecordType::Ptr,
            16 => RecordType::Txt,
            28 => RecordType::Aaaa,
            33 => RecordType::Srv,
            other => RecordType::Other(other),
        }
    }
}

impl RecordType {
    pub fn code(&self) -> u16 {
        match self {
            RecordType::A => 1,
            RecordType::Ptr => 12,
            RecordType::Txt => 16,
            RecordType::Aaaa => 28,
            RecordType::Srv => 33,
            RecordType::Other(code) => *code,
        }
    }
}

/// Type-specific record data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordData {
    Ptr(String),
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: String,
    },
    /// `key=value` strings in wire order; a string without `=` has an empty value.
    Txt(Vec<(String, String)>),
    A(Ipv4Addr),
    Aaaa(Ipv6Addr),
    /// Uninterpreted rdata of any other type.
    Unknown(Vec<u8>),
}

/// A parsed resource record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    /// Owner name, fully qualified with a trailing dot.
    pub name: String,
    pub rtype: RecordType,
    /// Raw class; mDNS sets the top bit for cache-flush.
    pub class: u16,
    pub ttl: u32,
    pub data: RecordData,
}

/// Compare two DNS names, ignoring ASCII case and a trailing dot.
pub fn names_equal(a: &str, b: &str) -> bool {
    a.trim_end_matches('.')
        .eq_ignore_ascii_case(b.trim_end_matches('.'))
}

/// Build a PTR query for `service_name`.
///
/// Transaction id and flags are zero; responses are matched by content.
pub fn build_query(service_name: &str) -> Vec<u8> {
    let mut packet = Vec::with_capacity(HEADER_LEN + service_name.len() + 6);
    packet.extend_from_slice(&0u16.to_be_bytes()); // id
    packet.extend_from_slice(&0u16.to_be_bytes()); // flags
    packet.extend_from_slice(&1u16.to_be_bytes()); // qdcount
    packet.extend_from_slice(&0u16.to_be_bytes()); // ancount
    packet.extend_from_slice(&0u16.to_be_bytes()); // nscount
    packet.extend_from_slice(&0u16.to_be_bytes()); // arcount
    write_name(&mut packet, service_name);
    packet.extend_from_slice(&RecordType::Ptr.code().to_be_bytes());
    packet.extend_from_slice(&CLASS_IN.to_be_bytes());
    packet
}

/// Append `name` as uncompressed labels.
pub fn write_name(buf: &mut Vec<u8>, name: &str) {
    for label in name.split('.').filter(|l| !l.is_empty()) {
        let bytes = label.as_bytes();
        // labels are at most 63 bytes
        let len = bytes.len().min(63);
        buf.push(len as u8);
        buf.extend_from_slice(&bytes[..len]);
    }
    buf.push(0);
}

/// Parse every answer, authority and additional record of a response.
pub fn parse_response(packet: &[u8]) -> Result<Vec<ResourceRecord>, CodecError> {
    let mut reader = PacketReader::new(packet);
    reader.skip(4)?; // id, flags
    let qdcount = reader.read_u16()?;
    let ancount = reader.read_u16()? as usize;
    let nscount = reader.read_u16()? as usize;
    let arcount = reader.read_u16()? as usize;

    for _ in 0..qdcount {
        reader.skip_name()?;
        reader.skip(4)?; // qtype, qclass
    }

    let total = ancount + nscount + arcount;
    let mut records = Vec::with_capacity(total.min(64));
    for _ in 0..total {
        records.push(reader.read_record()?);
    }
    Ok(records)
}

fn truncated(offset: usize, needed: usize, packet_len: usize) -> CodecError {
    CodecError::TruncatedMessage {
        offset,
        needed,
        available: packet_len.saturating_sub(offset),
    }
}

/// Read a possibly compressed name starting at `offset`.
///
/// Returns the name and the offset just past it in the original stream.
/// Each pointer target is visited at most once per name.
fn read_name(packet: &[u8], offset: usize) -> Result<(String, usize), CodecError> {
    let mut labels: Vec<String> = Vec::new();
    let mut pos = offset;
    let mut end: Option<usize> = None;
    let mut visited: Vec<usize> = Vec::new();

    loop {
        let len = *packet.get(pos).ok_or_else(|| truncated(pos, 1, packet.len()))?;

        if len == 0 {
            pos += 1;
            break;
        }

        match len & POINTER_TAG {
            POINTER_TAG => {
                let low = *packet
                    .get(pos + 1)
                    .ok_or_else(|| truncated(pos, 2, packet.len()))?;
                let target = (usize::from(len & !POINTER_TAG) << 8) | usize::from(low);
                if end.is_none() {
                    end = Some(pos + 2);
                }
                if visited.contains(&target) {
                    return Err(CodecError::MalformedName(format!(
                        "compression loop through offset {}",
                        target
                    )));
                }
                visited.push(target);
                pos = target;
            }
            0 => {
                let start = pos + 1;
                let label = packet
                    .get(start..start + usize::from(len))
                    .ok_or_else(|| truncated(start, usize::from(len), packet.len()))?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                pos = start + usize::from(len);
            }
            _ => {
                return Err(CodecError::MalformedName(format!(
                    "reserved label type 0x{:02x} at offset {}",
                    len, pos
                )));
            }
        }
    }

    let name = if labels.is_empty() {
        ".".to_string()
    } else {
        let mut joined = labels.join(".");
        joined.push('.');
        joined
    };
    Ok((name, end.unwrap_or(pos)))
}

/// Bounds-checked cursor over a DNS packet.
struct PacketReader<'a> {
    packet: &'a [u8],
    pos: usize,
}

impl<'a> PacketReader<'a> {
    fn new(packet: &'a [u8]) -> Self {
        Self { packet, pos: 0 }
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], CodecError> {
        let bytes = self
            .packet
            .get(self.pos..self.pos + len)
            .ok_or_else(|| truncated(self.pos, len, self.packet.len()))?;
        self.pos += len;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), CodecError> {
        self.take(len).map(|_| ())
    }

    fn read_u16(&mut self) -> Result<u16, CodecError> {
        let b = self.take(2)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn read_u32(&mut self) -> Result<u32, CodecError> {
        let b = self.take(4)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn read_name(&mut self) -> Result<String, CodecError> {
        let (name, next) = read_name(self.packet, self.pos)?;
        self.pos = next;
        Ok(name)
    }

    fn skip_name(&mut self) -> Result<(), CodecError> {
        self.read_name().map(|_| ())
    }

    fn read_record(&mut self) -> Result<ResourceRecord, CodecError> {
        let name = self.read_name()?;
        let rtype = RecordType::from(self.read_u16()?);
        let class = self.read_u16()?;
        let ttl = self.read_u32()?;
        let rdlength = usize::from(self.read_u16()?);
        let rdata_offset = self.pos;
        let rdata = self.take(rdlength)?;

        let data = match rtype {
            RecordType::Ptr => RecordData::Ptr(read_name(self.packet, rdata_offset)?.0),
            RecordType::Srv => {
                if rdata.len() < 6 {
                    return Err(truncated(rdata_offset, 6, rdata_offset + rdata.len()));
                }
                RecordData::Srv {
                    priority: u16::from_be_bytes([rdata[0], rdata[1]]),
                    weight: u16::from_be_bytes([rdata[2], rdata[3]]),
                    port: u16::from_be_bytes([rdata[4], rdata[5]]),
                    target: read_name(self.packet, rdata_offset + 6)?.0,
                }
            }
            RecordType::Txt => RecordData::Txt(parse_txt(rdata, rdata_offset)?),
            RecordType::A => {
                let octets: [u8; 4] = rdata
                    .get(..4)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| truncated(rdata_offset, 4, rdata_offset + rdata.len()))?;
                RecordData::A(Ipv4Addr::from(octets))
            }
            RecordType::Aaaa => {
                let octets: [u8; 16] = rdata
                    .get(..16)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(|| truncated(rdata_offset, 16, rdata_offset + rdata.len()))?;
                RecordData::Aaaa(Ipv6Addr::from(octets))
            }
            RecordType::Other(_) => RecordData::Unknown(rdata.to_vec()),
        };

        Ok(ResourceRecord {
            name,
            rtype,
            class,
            ttl,
            data,
        })
    }
}

/// Parse TXT rdata: a sequence of length-prefixed strings.
fn parse_txt(rdata: &[u8], base: usize) -> Result<Vec<(String, String)>, CodecError> {
    let mut entries = Vec::new();
    let mut i = 0;
    while i < rdata.len() {
        let len = usize::from(rdata[i]);
        i += 1;
        let raw = rdata
            .get(i..i + len)
            .ok_or_else(|| truncated(base + i, len, base + rdata.len()))?;
        i += len;
        if raw.is_empty() {
            continue;
        }
        let s = String::from_utf8_lossy(raw);
        match s.split_once('=') {
            Some((key, value)) => entries.push((key.to_string(), value.to_string())),
            None => entries.push((s.into_owned(), String::new())),
        }
    }
    Ok(entries)
}


#[cfg(test)]
mod tests {
    use super::testing::ResponseBuilder;
    use super::*;

    const SERVICE: &str = "_googlecast._tcp.local.";

    mod build_query {
        use super::*;

        #[test]
        fn header_and_question() {
            let packet = build_query(SERVICE);
            assert_eq!(&packet[..HEADER_LEN], &[0, 0, 0, 0, 0, 1, 0, 0, 0, 0, 0, 0]);

            let mut expected = Vec::new();
            expected.push(11);
            expected.extend_from_slice(b"_googlecast");
            expected.push(4);
            expected.extend_from_slice(b"_tcp");
            expected.push(5);
            expected.extend_from_slice(b"local");
            expected.push(0);
            expected.extend_from_slice(&[0, 12, 0, 1]);
            assert_eq!(&packet[HEADER_LEN..], &expected[..]);
        }

        #[test]
        fn query_parses_with_no_records() {
            let packet = build_query(SERVICE);
            assert!(parse_response(&packet).unwrap().is_empty());
        }
    }

    mod parse_response {
        use super::*;

        #[test]
        fn all_supported_types() {
            let v6 = Ipv6Addr::new(0xfe80, 0, 0, 0, 0, 0, 0, 1);
            let packet = ResponseBuilder::new()
                .ptr(SERVICE, "Living Room._googlecast._tcp.local.")
                .srv("Living Room._googlecast._tcp.local.", 8009, "abc.local.")
                .txt("Living Room._googlecast._tcp.local.", &["id=abc", "fn=Living Room", "flag"])
                .a("abc.local.", Ipv4Addr::new(192, 168, 1, 7))
                .aaaa("abc.local.", v6)
                .build();

            let records = parse_response(&packet).unwrap();
            assert_eq!(records.len(), 5);

            assert_eq!(records[0].name, SERVICE);
            assert_eq!(
                records[0].data,
                RecordData::Ptr("Living Room._googlecast._tcp.local.".to_string())
            );
            assert_eq!(
                records[1].data,
                RecordData::Srv {
                    priority: 0,
                    weight: 0,
                    port: 8009,
                    target: "abc.local.".to_string()
                }
            );
            assert_eq!(
                records[2].data,
                RecordData::Txt(vec![
                    ("id".to_string(), "abc".to_string()),
                    ("fn".to_string(), "Living Room".to_string()),
                    ("flag".to_string(), String::new()),
                ])
            );
            assert_eq!(records[3].data, RecordData::A(Ipv4Addr::new(192, 168, 1, 7)));
            assert_eq!(records[4].data, RecordData::Aaaa(v6));
            assert_eq!(records[0].ttl, 120);
            assert_eq!(records[0].class & 0x7fff, CLASS_IN);
        }

        #[test]
        fn follows_compression_pointers() {
            // question "_googlecast._tcp.local" at offset 12, answer PTR with
            // owner pointer to 12 and rdata "inst" + pointer to 12.
            let mut packet = vec![0, 0, 0x84, 0, 0, 1, 0, 1, 0, 0, 0, 0];
            write_name(&mut packet, SERVICE);
            packet.extend_from_slice(&[0, 12, 0, 1]);
            packet.extend_from_slice(&[0xC0, 12]);
            packet.extend_from_slice(&[0, 12, 0, 1, 0, 0, 0, 120]);
            packet.extend_from_slice(&[0, 7, 4, b'i', b'n', b's', b't', 0xC0, 12]);

            let records = parse_response(&packet).unwrap();
            assert_eq!(records.len(), 1);
            assert_eq!(records[0].name, SERVICE);
            assert_eq!(
                records[0].data,
                RecordData::Ptr("inst._googlecast._tcp.local.".to_string())
            );
        }

        #[test]
        fn follows_chained_pointers() {
            // "local" at 12, "_tcp"+ptr(12) at 19, owner "_googlecast"+ptr(19)
            let mut packet = vec![0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0];
            packet.extend_from_slice(&[5, b'l', b'o', b'c', b'a', b'l', 0]); // 12..19
            packet.extend_from_slice(&[4, b'_', b't', b'c', b'p', 0xC0, 12]); // 19..26
            packet.push(11);
            packet.extend_from_slice(b"_googlecast");
            packet.extend_from_slice(&[0xC0, 19]);

            let (name, next) = read_name(&packet, 26).unwrap();
            assert_eq!(name, "_googlecast._tcp.local.");
            assert_eq!(next, 26 + 1 + 11 + 2);
        }

        #[test]
        fn unknown_type_is_kept_raw() {
            let mut packet = vec![0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0];
            write_name(&mut packet, "x.local.");
            packet.extend_from_slice(&[0, 99, 0, 1, 0, 0, 0, 1, 0, 2, 0xAB, 0xCD]);
            let records = parse_response(&packet).unwrap();
            assert_eq!(records[0].rtype, RecordType::Other(99));
            assert_eq!(records[0].data, RecordData::Unknown(vec![0xAB, 0xCD]));
        }

        #[test]
        fn pointer_loop_is_rejected() {
            let mut packet = vec![0, 0, 0x84, 0, 0, 0, 0, 1, 0, 0, 0, 0];
            // owner name is a pointer to itself
            packet.extend_from_slice(&[0xC0, 12]);
            packet.extend_from_slice(&[0, 1, 0, 1, 0, 0, 0, 1, 0, 4, 1, 2, 3, 4]);
            assert!(matches!(
                parse_response(&packet),
                Err(CodecError::MalformedName(_))
            ));
        }

        #[test]
        fn short_header_is_truncated() {
            assert!(matches!(
                parse_response(&[0, 0, 0, 0, 0]),
                Err(CodecError::TruncatedMessage { .. })
            ));
        }

        #[test]
        fn rdlength_past_end_is_truncated() {
            let mut packet = ResponseBuilder::new()
                .a("abc.local.", Ipv4Addr::new(10, 0, 0, 1))
                .build();
            let len = packet.len();
            // rdlength sits right before the 4 address bytes
            packet[len - 6..len - 4].copy_from_slice(&40u16.to_be_bytes());
            assert!(matches!(
                parse_response(&packet),
                Err(CodecError::TruncatedMessage { .. })
            ));
        }

        #[test]
        fn every_truncation_fails_without_panic() {
            let packet = ResponseBuilder::new()
                .ptr(SERVICE, "x._googlecast._tcp.local.")
                .srv("x._googlecast._tcp.local.", 8009, "h.local.")
                .txt("x._googlecast._tcp.local.", &["id=1"])
                .build();
            for cut in 0..packet.len() {
                assert!(parse_response(&packet[..cut]).is_err(), "cut at {}", cut);
            }
        }

        #[test]
        fn more_records_than_present_is_truncated() {
            let mut packet = ResponseBuilder::new()
                .a("abc.local.", Ipv4Addr::new(10, 0, 0, 1))
                .build();
            packet[7] = 2;
            assert!(matches!(
                parse_response(&packet),
                Err(CodecError::TruncatedMessage { .. })
            ));
        }
    }

    #[test]
    fn names_compare_case_insensitively() {
        assert!(names_equal("ABC.local.", "abc.local"));
        assert!(!names_equal("abc.local.", "abd.local."));
    }
}

//! DNS message header, question and answer records.
//!
//! Only what a stub resolver asking for `A` records needs: building a single-question query and
//! walking the sections of a response. Names inside responses may be compressed; the reader can
//! skip a compressed name but only compares uncompressed ones.
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, Ipv4Address, Result};

/// The well-known DNS server port.
pub const PORT: u16 = 53;

/// Length of the fixed message header.
pub const HEADER_LEN: usize = field::ARCOUNT.end;

/// Query type `A`, a host address.
pub const TYPE_A: u16 = 1;

/// Query class `IN`, the Internet.
pub const CLASS_INET: u16 = 1;

enum_with_unknown! {
    /// Response code carried in the low bits of the flags.
    pub enum Rcode(u8) {
        NoError  = 0,
        FormErr  = 1,
        ServFail = 2,
        NxDomain = 3,
        NotImp   = 4,
        Refused  = 5
    }
}

mod field {
    use crate::wire::field::Field;

    pub const ID:      Field = 0..2;
    pub const FLAGS:   Field = 2..4;
    pub const QDCOUNT: Field = 4..6;
    pub const ANCOUNT: Field = 6..8;
    pub const NSCOUNT: Field = 8..10;
    pub const ARCOUNT: Field = 10..12;

    pub const FLG_QR: u16 = 0x8000;
    pub const FLG_TC: u16 = 0x0200;
    pub const FLG_RD: u16 = 0x0100;
    pub const FLG_RA: u16 = 0x0080;
    pub const RCODE_MASK: u16 = 0x000f;
}

byte_wrapper!(dns);

impl dns {
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        if data.len() < HEADER_LEN {
            return Err(Error::Truncated);
        }
        Ok(Self::new_unchecked(data))
    }

    pub fn id(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ID])
    }

    fn flags(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::FLAGS])
    }

    /// The message is a response.
    pub fn is_response(&self) -> bool {
        self.flags() & field::FLG_QR != 0
    }

    pub fn truncated(&self) -> bool {
        self.flags() & field::FLG_TC != 0
    }

    pub fn recursion_available(&self) -> bool {
        self.flags() & field::FLG_RA != 0
    }

    pub fn rcode(&self) -> Rcode {
        Rcode::from((self.flags() & field::RCODE_MASK) as u8)
    }

    pub fn question_count(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::QDCOUNT])
    }

    pub fn answer_count(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::ANCOUNT])
    }

    /// Everything after the fixed header.
    pub fn body(&self) -> &[u8] {
        &self.0[HEADER_LEN..]
    }

    pub fn set_id(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::ID], value)
    }

    /// Mark the message as a standard query with recursion desired.
    pub fn set_query_flags(&mut self) {
        NetworkEndian::write_u16(&mut self.0[field::FLAGS], field::FLG_RD)
    }

    pub fn set_counts(&mut self, questions: u16, answers: u16) {
        NetworkEndian::write_u16(&mut self.0[field::QDCOUNT], questions);
        NetworkEndian::write_u16(&mut self.0[field::ANCOUNT], answers);
        NetworkEndian::write_u16(&mut self.0[field::NSCOUNT], 0);
        NetworkEndian::write_u16(&mut self.0[field::ARCOUNT], 0);
    }
}

/// Build a query for the `A` record of `name` into `buffer`.
///
/// Fails with `Error::Malformed` on empty labels or labels longer than 63 octets.
pub fn emit_query(buffer: &mut Vec<u8>, id: u16, name: &str) -> Result<()> {
    buffer.clear();
    buffer.resize(HEADER_LEN, 0);
    {
        let header = dns::new_unchecked_mut(&mut buffer[..]);
        header.set_id(id);
        header.set_query_flags();
        header.set_counts(1, 0);
    }
    for label in name.trim_end_matches('.').split('.') {
        if label.is_empty() || label.len() > 63 {
            return Err(Error::Malformed);
        }
        buffer.push(label.len() as u8);
        buffer.extend_from_slice(label.as_bytes());
    }
    buffer.push(0);
    let mut question = [0; 4];
    NetworkEndian::write_u16(&mut question[0..2], TYPE_A);
    NetworkEndian::write_u16(&mut question[2..4], CLASS_INET);
    buffer.extend_from_slice(&question);
    Ok(())
}

/// Compare an uncompressed name at `offset` with a dotted name, ignoring ASCII case.
///
/// Returns the offset just past the name.
pub fn match_name(data: &[u8], mut offset: usize, name: &str) -> Result<usize> {
    for label in name.trim_end_matches('.').split('.') {
        let len = *data.get(offset).ok_or(Error::Truncated)? as usize;
        let bytes = data.get(offset + 1..offset + 1 + len).ok_or(Error::Truncated)?;
        if !bytes.eq_ignore_ascii_case(label.as_bytes()) {
            return Err(Error::Malformed);
        }
        offset += 1 + len;
    }
    match data.get(offset) {
        Some(0) => Ok(offset + 1),
        Some(_) => Err(Error::Malformed),
        None => Err(Error::Truncated),
    }
}

/// Skip a possibly compressed name starting at `offset`.
///
/// Returns the offset just past the name. A compression pointer ends the name.
pub fn skip_name(data: &[u8], mut offset: usize) -> Result<usize> {
    loop {
        let len = *data.get(offset).ok_or(Error::Truncated)?;
        if len == 0 {
            return Ok(offset + 1);
        }
        if len & 0xc0 == 0xc0 {
            return if offset + 2 <= data.len() { Ok(offset + 2) } else { Err(Error::Truncated) };
        }
        offset += 1 + len as usize;
    }
}

/// The fixed part following a question name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Question {
    pub qtype: u16,
    pub class: u16,
}

impl Question {
    pub const LEN: usize = 4;

    pub fn parse(data: &[u8], offset: usize) -> Result<Question> {
        let bytes = data.get(offset..offset + Self::LEN).ok_or(Error::Truncated)?;
        Ok(Question {
            qtype: NetworkEndian::read_u16(&bytes[0..2]),
            class: NetworkEndian::read_u16(&bytes[2..4]),
        })
    }
}

/// The fixed part following a resource record name, with its data range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Record {
    pub rtype: u16,
    pub class: u16,
    pub ttl: u32,
    pub data_start: usize,
    pub data_len: usize,
}

impl Record {
    const FIXED_LEN: usize = 10;

    pub fn parse(data: &[u8], offset: usize) -> Result<Record> {
        let bytes = data.get(offset..offset + Self::FIXED_LEN).ok_or(Error::Truncated)?;
        let data_len = NetworkEndian::read_u16(&bytes[8..10]) as usize;
        let data_start = offset + Self::FIXED_LEN;
        if data.len() < data_start + data_len {
            return Err(Error::Truncated);
        }
        Ok(Record {
            rtype: NetworkEndian::read_u16(&bytes[0..2]),
            class: NetworkEndian::read_u16(&bytes[2..4]),
            ttl: NetworkEndian::read_u32(&bytes[4..8]),
            data_start,
            data_len,
        })
    }

    /// Offset of whatever follows this record.
    pub fn end(&self) -> usize {
        self.data_start + self.data_len
    }

    /// The address if this is an `IN A` record.
    pub fn ipv4(&self, data: &[u8]) -> Option<Ipv4Address> {
        if self.rtype == TYPE_A && self.class == CLASS_INET && self.data_len == 4 {
            Some(Ipv4Address::from_bytes(&data[self.data_start..self.end()]))
        } else {
            None
        }
    }
}

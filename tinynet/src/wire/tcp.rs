use core::{ops, fmt};
use byteorder::{ByteOrder, NetworkEndian};

use super::{Error, IpProtocol, Ipv4Address, Result};
use super::ip::checksum;

/// A TCP sequence number.
///
/// Sequence numbers live in the ring of integers modulo 2<sup>32</sup>. There is no total order on
/// such a ring, so this type deliberately does not implement `PartialOrd`. Instead two numbers are
/// compared through their *signed* 32-bit difference: `a` is before `b` iff `(a - b) as i32 < 0`.
/// This is consistent as long as the compared numbers are less than 2<sup>31</sup> apart, which
/// any window in this stack guarantees.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default, Hash)]
pub struct SeqNumber(pub u32);

impl SeqNumber {
    /// The signed distance from `other` to `self`.
    #[inline]
    pub fn diff(self, other: SeqNumber) -> i32 {
        self.0.wrapping_sub(other.0) as i32
    }

    /// `self < other` modulo 2<sup>32</sup>.
    #[inline]
    pub fn before(self, other: SeqNumber) -> bool {
        self.diff(other) < 0
    }

    /// `self <= other` modulo 2<sup>32</sup>.
    #[inline]
    pub fn before_eq(self, other: SeqNumber) -> bool {
        self.diff(other) <= 0
    }

    /// `self > other` modulo 2<sup>32</sup>.
    #[inline]
    pub fn after(self, other: SeqNumber) -> bool {
        self.diff(other) > 0
    }

    /// `self >= other` modulo 2<sup>32</sup>.
    #[inline]
    pub fn after_eq(self, other: SeqNumber) -> bool {
        self.diff(other) >= 0
    }

    /// Check `low <= self < high` modulo 2<sup>32</sup>.
    #[inline]
    pub fn within(self, low: SeqNumber, high: SeqNumber) -> bool {
        low.before_eq(self) && self.before(high)
    }

    /// Number of sequence units from `earlier` up to `self`, zero if `self` is not after it.
    #[inline]
    pub fn distance_from(self, earlier: SeqNumber) -> usize {
        match self.diff(earlier) {
            d if d > 0 => d as usize,
            _ => 0,
        }
    }
}

impl fmt::Display for SeqNumber {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl ops::Add<usize> for SeqNumber {
    type Output = SeqNumber;

    fn add(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_add(rhs as u32))
    }
}

impl ops::Sub<usize> for SeqNumber {
    type Output = SeqNumber;

    fn sub(self, rhs: usize) -> SeqNumber {
        SeqNumber(self.0.wrapping_sub(rhs as u32))
    }
}

impl ops::AddAssign<usize> for SeqNumber {
    fn add_assign(&mut self, rhs: usize) {
        *self = *self + rhs;
    }
}

/// A set of tcp flags.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Flags(pub u8);

mod field {
    use crate::wire::field::Field;

    pub const SRC_PORT: Field = 0..2;
    pub const DST_PORT: Field = 2..4;
    pub const SEQ_NUM:  Field = 4..8;
    pub const ACK_NUM:  Field = 8..12;
    pub const DATA_OFF: usize = 12;
    pub const FLAGS:    usize = 13;
    pub const WIN_SIZE: Field = 14..16;
    pub const CHECKSUM: Field = 16..18;
    pub const URGENT:   Field = 18..20;

    pub const FLG_FIN: u8 = 0x01;
    pub const FLG_SYN: u8 = 0x02;
    pub const FLG_RST: u8 = 0x04;
    pub const FLG_PSH: u8 = 0x08;
    pub const FLG_ACK: u8 = 0x10;
    pub const FLG_URG: u8 = 0x20;

    pub const OPT_END: u8 = 0x00;
    pub const OPT_NOP: u8 = 0x01;
    pub const OPT_MSS: u8 = 0x02;
}

/// Length of a header without options.
pub const HEADER_LEN: usize = field::URGENT.end;

/// Length of the only option we emit, MSS.
pub const MSS_OPTION_LEN: usize = 4;

byte_wrapper!(tcp);

impl tcp {
    /// Imbue a raw octet buffer with TCP packet structure.
    pub fn new_unchecked(data: &[u8]) -> &Self {
        Self::__from_macro_new_unchecked(data)
    }

    /// Imbue a mutable octet buffer with TCP packet structure.
    pub fn new_unchecked_mut(data: &mut [u8]) -> &mut Self {
        Self::__from_macro_new_unchecked_mut(data)
    }

    /// Shorthand for a combination of [new_unchecked] and [check_len].
    ///
    /// [new_unchecked]: #method.new_unchecked
    /// [check_len]: #method.check_len
    pub fn new_checked(data: &[u8]) -> Result<&Self> {
        let packet = Self::new_unchecked(data);
        packet.check_len()?;
        Ok(packet)
    }

    /// Ensure that no header accessor method will panic if called.
    ///
    /// Returns `Err(Error::Truncated)` if the buffer is too short for the header it announces and
    /// `Err(Error::Malformed)` if the data offset points into the fixed header.
    pub fn check_len(&self) -> Result<()> {
        let len = self.0.len();
        if len < HEADER_LEN {
            Err(Error::Truncated)
        } else {
            let header_len = self.header_len() as usize;
            if len < header_len {
                Err(Error::Truncated)
            } else if header_len < HEADER_LEN {
                Err(Error::Malformed)
            } else {
                Ok(())
            }
        }
    }

    #[inline]
    pub fn src_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::SRC_PORT])
    }

    #[inline]
    pub fn dst_port(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::DST_PORT])
    }

    #[inline]
    pub fn seq_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::SEQ_NUM]))
    }

    /// The acknowledgement field, meaningful only when the ACK flag is set.
    #[inline]
    pub fn ack_number(&self) -> SeqNumber {
        SeqNumber(NetworkEndian::read_u32(&self.0[field::ACK_NUM]))
    }

    /// Header length in octets, options included.
    #[inline]
    pub fn header_len(&self) -> u8 {
        (self.0[field::DATA_OFF] >> 4) * 4
    }

    #[inline]
    pub fn flags(&self) -> Flags {
        Flags(self.0[field::FLAGS])
    }

    #[inline]
    pub fn window_len(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::WIN_SIZE])
    }

    #[inline]
    pub fn checksum(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::CHECKSUM])
    }

    #[inline]
    pub fn urgent_at(&self) -> u16 {
        NetworkEndian::read_u16(&self.0[field::URGENT])
    }

    /// The option bytes between the fixed header and the data.
    pub fn options(&self) -> &[u8] {
        &self.0[HEADER_LEN..self.header_len() as usize]
    }

    #[inline]
    pub fn set_src_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::SRC_PORT], value)
    }

    #[inline]
    pub fn set_dst_port(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::DST_PORT], value)
    }

    #[inline]
    pub fn set_seq_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::SEQ_NUM], value.0)
    }

    #[inline]
    pub fn set_ack_number(&mut self, value: SeqNumber) {
        NetworkEndian::write_u32(&mut self.0[field::ACK_NUM], value.0)
    }

    /// Set the header length in octets, must be a multiple of four.
    #[inline]
    pub fn set_header_len(&mut self, value: u8) {
        self.0[field::DATA_OFF] = (value / 4) << 4;
    }

    #[inline]
    pub fn set_flags(&mut self, value: Flags) {
        self.0[field::FLAGS] = value.0;
    }

    #[inline]
    pub fn set_window_len(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::WIN_SIZE], value)
    }

    #[inline]
    pub fn set_checksum(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::CHECKSUM], value)
    }

    #[inline]
    pub fn set_urgent_at(&mut self, value: u16) {
        NetworkEndian::write_u16(&mut self.0[field::URGENT], value)
    }

    pub fn options_mut(&mut self) -> &mut [u8] {
        let end = self.header_len() as usize;
        &mut self.0[HEADER_LEN..end]
    }

    /// Compute and fill in the checksum over the whole buffer, which must be the full segment.
    pub fn fill_checksum(&mut self, src_addr: Ipv4Address, dst_addr: Ipv4Address) {
        self.set_checksum(0);
        let checksum = !checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, self.0.len() as u32),
            checksum::data(&self.0),
        ]);
        self.set_checksum(checksum)
    }

    /// Validate the checksum over the whole buffer, which must be the full segment.
    pub fn verify_checksum(&self, src_addr: Ipv4Address, dst_addr: Ipv4Address) -> bool {
        checksum::combine(&[
            checksum::pseudo_header(src_addr, dst_addr, IpProtocol::Tcp, self.0.len() as u32),
            checksum::data(&self.0),
        ]) == !0
    }
}

impl Flags {
    pub const FIN: Flags = Flags(field::FLG_FIN);
    pub const SYN: Flags = Flags(field::FLG_SYN);
    pub const RST: Flags = Flags(field::FLG_RST);
    pub const PSH: Flags = Flags(field::FLG_PSH);
    pub const ACK: Flags = Flags(field::FLG_ACK);

    /// Return the FIN flag.
    #[inline]
    pub fn fin(&self) -> bool {
        self.0 & field::FLG_FIN != 0
    }

    /// Return the SYN flag.
    #[inline]
    pub fn syn(&self) -> bool {
        self.0 & field::FLG_SYN != 0
    }

    /// Return the RST flag.
    #[inline]
    pub fn rst(&self) -> bool {
        self.0 & field::FLG_RST != 0
    }

    /// Return the PSH flag.
    #[inline]
    pub fn psh(&self) -> bool {
        self.0 & field::FLG_PSH != 0
    }

    /// Return the ACK flag.
    #[inline]
    pub fn ack(&self) -> bool {
        self.0 & field::FLG_ACK != 0
    }

    /// Return the URG flag.
    #[inline]
    pub fn urg(&self) -> bool {
        self.0 & field::FLG_URG != 0
    }

    /// Set or clear the FIN flag.
    #[inline]
    pub fn set_fin(&mut self, value: bool) {
        self.set(field::FLG_FIN, value)
    }

    /// Set or clear the SYN flag.
    #[inline]
    pub fn set_syn(&mut self, value: bool) {
        self.set(field::FLG_SYN, value)
    }

    /// Set or clear the RST flag.
    #[inline]
    pub fn set_rst(&mut self, value: bool) {
        self.set(field::FLG_RST, value)
    }

    /// Set or clear the PSH flag.
    #[inline]
    pub fn set_psh(&mut self, value: bool) {
        self.set(field::FLG_PSH, value)
    }

    /// Set or clear the ACK flag.
    #[inline]
    pub fn set_ack(&mut self, value: bool) {
        self.set(field::FLG_ACK, value)
    }

    /// The number of sequence units occupied by the control flags.
    pub fn sequence_len(&self) -> usize {
        self.syn() as usize + self.fin() as usize
    }

    fn set(&mut self, flag: u8, value: bool) {
        if value {
            self.0 |= flag;
        } else {
            self.0 &= !flag;
        }
    }
}

impl ops::BitOr for Flags {
    type Output = Flags;

    fn bitor(self, rhs: Flags) -> Flags {
        Flags(self.0 | rhs.0)
    }
}

impl fmt::Display for Flags {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let names = [
            (self.syn(), "SYN"), (self.ack(), "ACK"), (self.fin(), "FIN"),
            (self.rst(), "RST"), (self.psh(), "PSH"), (self.urg(), "URG"),
        ];
        let mut first = true;
        for &(set, name) in names.iter() {
            if set {
                if !first {
                    write!(f, "|")?;
                }
                write!(f, "{}", name)?;
                first = false;
            }
        }
        Ok(())
    }
}

/// A high-level representation of a Transmission Control Protocol header.
///
/// Only the MSS option is understood. Other options are skipped by their length byte.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub struct Repr {
    pub src_port:     u16,
    pub dst_port:     u16,
    pub flags:        Flags,
    pub seq_number:   SeqNumber,
    pub ack_number:   SeqNumber,
    pub window_len:   u16,
    pub max_seg_size: Option<u16>,
}

impl Repr {
    /// Parse a TCP header and return a high-level representation.
    ///
    /// Zero ports and an empty flag set are rejected as malformed. The checksum is not checked
    /// here since it covers the payload as well.
    pub fn parse(packet: &tcp) -> Result<Repr> {
        packet.check_len()?;

        if packet.src_port() == 0 || packet.dst_port() == 0 {
            return Err(Error::Malformed)
        }
        if packet.flags().0 == 0 {
            return Err(Error::Malformed)
        }

        let mut max_seg_size = None;
        let mut options = packet.options();
        while let Some(&kind) = options.first() {
            match kind {
                field::OPT_END => break,
                field::OPT_NOP => options = &options[1..],
                _ => {
                    let len = *options.get(1).ok_or(Error::Truncated)? as usize;
                    if len < 2 || len > options.len() {
                        return Err(Error::Malformed);
                    }
                    if kind == field::OPT_MSS {
                        if len != 4 {
                            return Err(Error::Malformed);
                        }
                        max_seg_size = Some(NetworkEndian::read_u16(&options[2..4]));
                    }
                    options = &options[len..];
                }
            }
        }

        Ok(Repr {
            src_port: packet.src_port(),
            dst_port: packet.dst_port(),
            flags: packet.flags(),
            seq_number: packet.seq_number(),
            ack_number: packet.ack_number(),
            window_len: packet.window_len(),
            max_seg_size,
        })
    }

    /// Return the length of the header that will be emitted from this representation.
    pub fn header_len(&self) -> usize {
        match self.max_seg_size {
            Some(_) => HEADER_LEN + MSS_OPTION_LEN,
            None => HEADER_LEN,
        }
    }

    /// Emit the header into a buffer of at least `header_len` octets.
    ///
    /// The checksum field is zeroed, it must be filled once the payload is in place.
    pub fn emit(&self, packet: &mut tcp) {
        packet.set_src_port(self.src_port);
        packet.set_dst_port(self.dst_port);
        packet.set_seq_number(self.seq_number);
        packet.set_ack_number(if self.flags.ack() { self.ack_number } else { SeqNumber(0) });
        packet.set_header_len(self.header_len() as u8);
        packet.set_flags(self.flags);
        packet.set_window_len(self.window_len);
        packet.set_checksum(0);
        packet.set_urgent_at(0);

        if let Some(mss) = self.max_seg_size {
            let options = packet.options_mut();
            options[0] = field::OPT_MSS;
            options[1] = MSS_OPTION_LEN as u8;
            NetworkEndian::write_u16(&mut options[2..4], mss);
        }
    }
}

impl fmt::Display for Repr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "TCP src={} dst={} [{}] seq={}",
               self.src_port, self.dst_port, self.flags, self.seq_number)?;
        if self.flags.ack() {
            write!(f, " ack={}", self.ack_number)?;
        }
        write!(f, " win={}", self.window_len)?;
        if let Some(mss) = self.max_seg_size {
            write!(f, " mss={}", mss)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SRC_ADDR: Ipv4Address = Ipv4Address([192, 168, 1, 1]);
    const DST_ADDR: Ipv4Address = Ipv4Address([192, 168, 1, 2]);

    fn syn_repr() -> Repr {
        Repr {
            src_port: 48896,
            dst_port: 80,
            flags: Flags::SYN,
            seq_number: SeqNumber(0x0123_4567),
            ack_number: SeqNumber(0),
            window_len: 4096,
            max_seg_size: Some(1460),
        }
    }

    #[test]
    fn seq_compare_across_wrap() {
        let high = SeqNumber(0xffff_fff0);
        let low = SeqNumber(0x0000_0010);
        assert!(high.before(low));
        assert!(low.after(high));
        assert!(high.before_eq(high));
        assert!(!low.before_eq(high));
        assert_eq!(low.diff(high), 0x20);
        assert_eq!(high.diff(low), -0x20);
        assert_eq!(high + 0x20, low);
        assert_eq!(low - 0x20, high);
        assert_eq!(low.distance_from(high), 0x20);
        assert_eq!(high.distance_from(low), 0);
    }

    #[test]
    fn seq_window_across_wrap() {
        let start = SeqNumber(u32::max_value() - 2);
        let end = start + 8;
        assert!(start.within(start, end));
        assert!(SeqNumber(0).within(start, end));
        assert!(SeqNumber(4).within(start, end));
        assert!(!SeqNumber(5).within(start, end));
        assert!(!SeqNumber(u32::max_value() - 3).within(start, end));
    }

    #[test]
    fn header_roundtrip_with_mss() {
        let repr = syn_repr();
        let mut bytes = vec![0xa5; repr.header_len() + 4];
        {
            let packet = tcp::new_unchecked_mut(&mut bytes[..]);
            repr.emit(packet);
        }
        bytes[repr.header_len()..].copy_from_slice(b"abcd");
        tcp::new_unchecked_mut(&mut bytes[..]).fill_checksum(SRC_ADDR, DST_ADDR);

        let packet = tcp::new_checked(&bytes[..]).unwrap();
        assert_eq!(packet.header_len(), 24);
        assert!(packet.verify_checksum(SRC_ADDR, DST_ADDR));
        assert!(!packet.verify_checksum(DST_ADDR, Ipv4Address([10, 0, 0, 1])));
        assert_eq!(Repr::parse(packet), Ok(repr));
    }

    #[test]
    fn options_skip_unknown() {
        let mut repr = syn_repr();
        repr.max_seg_size = None;
        let mut bytes = vec![0; HEADER_LEN + 12];
        repr.emit(tcp::new_unchecked_mut(&mut bytes[..]));
        tcp::new_unchecked_mut(&mut bytes[..]).set_header_len((HEADER_LEN + 12) as u8);
        // nop, window scale (3 bytes), nop, mss 536, end
        bytes[HEADER_LEN..].copy_from_slice(&[1, 3, 3, 7, 1, 2, 4, 0x02, 0x18, 0, 0, 0]);
        let parsed = Repr::parse(tcp::new_checked(&bytes[..]).unwrap()).unwrap();
        assert_eq!(parsed.max_seg_size, Some(536));
    }

    #[test]
    fn reject_bad_headers() {
        let repr = syn_repr();
        let mut bytes = vec![0; repr.header_len()];
        repr.emit(tcp::new_unchecked_mut(&mut bytes[..]));

        let mut no_flags = bytes.clone();
        tcp::new_unchecked_mut(&mut no_flags[..]).set_flags(Flags(0));
        assert_eq!(Repr::parse(tcp::new_unchecked(&no_flags[..])), Err(Error::Malformed));

        let mut no_port = bytes.clone();
        tcp::new_unchecked_mut(&mut no_port[..]).set_dst_port(0);
        assert_eq!(Repr::parse(tcp::new_unchecked(&no_port[..])), Err(Error::Malformed));

        assert_eq!(tcp::new_checked(&bytes[..HEADER_LEN + 2]).err(), Some(Error::Truncated));

        let mut short_offset = bytes.clone();
        tcp::new_unchecked_mut(&mut short_offset[..]).set_header_len(16);
        assert_eq!(tcp::new_checked(&short_offset[..]).err(), Some(Error::Malformed));
    }

    #[test]
    fn flags_display() {
        let flags = Flags::SYN | Flags::ACK;
        assert_eq!(format!("{}", flags), "SYN|ACK");
        assert_eq!(flags.sequence_len(), 1);
    }
}

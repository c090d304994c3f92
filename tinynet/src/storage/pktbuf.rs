use core::fmt;
use std::collections::VecDeque;

use crate::socket::{Error, Result};

/// Octets held by one block of a packet buffer.
pub const BLOCK_SIZE: usize = 128;

/// A packet stored in a chain of fixed-size blocks.
///
/// The first block is filled from its end so that headers can be prepended by moving its start
/// back, without copying the payload. All other blocks are filled from their start. A read/write
/// cursor addresses the packet as one contiguous sequence of octets.
///
/// The total size is always the sum of the valid octets of every block.
#[derive(Clone)]
pub struct PktBuf {
    blocks: VecDeque<Block>,
    total: usize,
    pos: usize,
}

#[derive(Clone)]
struct Block {
    data: Box<[u8; BLOCK_SIZE]>,
    start: usize,
    len: usize,
}

impl Block {
    fn empty() -> Self {
        Block { data: Box::new([0; BLOCK_SIZE]), start: 0, len: 0 }
    }

    /// A block whose `len` valid octets end at the block end.
    fn tail_aligned(len: usize) -> Self {
        Block { data: Box::new([0; BLOCK_SIZE]), start: BLOCK_SIZE - len, len }
    }

    fn bytes(&self) -> &[u8] {
        &self.data[self.start..self.start + self.len]
    }

    fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data[self.start..self.start + self.len]
    }

    fn room_after(&self) -> usize {
        BLOCK_SIZE - self.start - self.len
    }
}

impl PktBuf {
    /// Allocate a zeroed packet of `size` octets.
    pub fn alloc(size: usize) -> Self {
        let mut blocks = VecDeque::new();
        let head = match size % BLOCK_SIZE {
            0 if size > 0 => BLOCK_SIZE,
            rest => rest,
        };
        blocks.push_back(Block::tail_aligned(head));
        let mut left = size - head;
        while left > 0 {
            let mut block = Block::empty();
            block.len = left.min(BLOCK_SIZE);
            left -= block.len;
            blocks.push_back(block);
        }
        PktBuf { blocks, total: size, pos: 0 }
    }

    /// Allocate a packet holding a copy of `data`.
    pub fn from_slice(data: &[u8]) -> Self {
        let mut buf = PktBuf::alloc(data.len());
        buf.write(data);
        buf.pos = 0;
        buf
    }

    pub fn total_size(&self) -> usize {
        self.total
    }

    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Prepend `size` octets of header space and move the cursor to the start.
    ///
    /// The header is always contiguous. When the first block has no room in front, a new block
    /// is chained in front of it.
    pub fn add_header(&mut self, size: usize) -> Result<()> {
        if size > BLOCK_SIZE {
            return Err(Error::Size);
        }
        match self.blocks.front_mut() {
            Some(first) if first.start >= size => {
                first.start -= size;
                first.len += size;
            }
            _ => self.blocks.push_front(Block::tail_aligned(size)),
        }
        self.total += size;
        self.pos = 0;
        Ok(())
    }

    /// Strip `size` octets from the front and move the cursor to the start.
    pub fn remove_header(&mut self, size: usize) -> Result<()> {
        if size > self.total {
            return Err(Error::Size);
        }
        let mut left = size;
        while left > 0 {
            let first = match self.blocks.front_mut() {
                Some(first) => first,
                None => break,
            };
            let take = left.min(first.len);
            first.start += take;
            first.len -= take;
            left -= take;
            if first.len == 0 && self.blocks.len() > 1 {
                self.blocks.pop_front();
            }
        }
        self.total -= size;
        self.pos = 0;
        Ok(())
    }

    /// Grow or shrink the packet at its end. New octets are zeroed.
    pub fn resize(&mut self, size: usize) {
        if size < self.total {
            let mut cut = self.total - size;
            while cut > 0 {
                let last = match self.blocks.back_mut() {
                    Some(last) => last,
                    None => break,
                };
                let take = cut.min(last.len);
                last.len -= take;
                cut -= take;
                if last.len == 0 && self.blocks.len() > 1 {
                    self.blocks.pop_back();
                }
            }
        } else {
            let mut grow = size - self.total;
            while grow > 0 {
                let room = self.blocks.back().map_or(0, Block::room_after);
                if room == 0 {
                    self.blocks.push_back(Block::empty());
                    continue;
                }
                let take = grow.min(room);
                if let Some(last) = self.blocks.back_mut() {
                    let end = last.start + last.len;
                    last.data[end..end + take].iter_mut().for_each(|b| *b = 0);
                    last.len += take;
                }
                grow -= take;
            }
        }
        self.total = size;
        self.pos = self.pos.min(size);
    }

    /// Ensure the first `size` octets are contiguous in the first block.
    pub fn set_cont(&mut self, size: usize) -> Result<()> {
        if size > BLOCK_SIZE || size > self.total {
            return Err(Error::Size);
        }
        let first_len = match self.blocks.front() {
            Some(first) if first.len >= size => return Ok(()),
            Some(first) => first.len,
            None => return Err(Error::Size),
        };

        let mut head = Block::empty();
        head.start = BLOCK_SIZE - size;
        let mut filled = 0;
        let mut first = true;
        while filled < size {
            let block = match self.blocks.front_mut() {
                Some(block) => block,
                None => break,
            };
            let take = if first { first_len } else { (size - filled).min(block.len) };
            first = false;
            head.data[head.start + filled..head.start + filled + take]
                .copy_from_slice(&block.bytes()[..take]);
            block.start += take;
            block.len -= take;
            filled += take;
            if block.len == 0 {
                self.blocks.pop_front();
            }
        }
        head.len = size;
        self.blocks.push_front(head);
        Ok(())
    }

    /// The first `size` octets, if they are contiguous.
    pub fn header(&self, size: usize) -> Option<&[u8]> {
        let first = self.blocks.front()?;
        first.bytes().get(..size)
    }

    /// The first `size` octets for writing, if they are contiguous.
    pub fn header_mut(&mut self, size: usize) -> Option<&mut [u8]> {
        let first = self.blocks.front_mut()?;
        first.bytes_mut().get_mut(..size)
    }

    /// Move the cursor to an absolute offset.
    pub fn seek(&mut self, offset: usize) -> Result<()> {
        if offset > self.total {
            return Err(Error::Size);
        }
        self.pos = offset;
        Ok(())
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    /// Octets between the cursor and the end.
    pub fn remaining(&self) -> usize {
        self.total - self.pos
    }

    /// Visit the valid octets of every block starting at absolute offset `from`.
    fn segments(&self, from: usize) -> impl Iterator<Item=&[u8]> + '_ {
        let mut skip = from;
        self.blocks.iter().filter_map(move |block| {
            let bytes = block.bytes();
            if skip >= bytes.len() {
                skip -= bytes.len();
                None
            } else {
                let part = &bytes[skip..];
                skip = 0;
                Some(part)
            }
        })
    }

    /// Copy from the cursor into `dst`, advancing the cursor.
    pub fn read(&mut self, dst: &mut [u8]) -> usize {
        let mut done = 0;
        for part in self.segments(self.pos) {
            if done == dst.len() {
                break;
            }
            let take = part.len().min(dst.len() - done);
            dst[done..done + take].copy_from_slice(&part[..take]);
            done += take;
        }
        self.pos += done;
        done
    }

    /// Copy `src` to the cursor, advancing the cursor. Never grows the packet.
    pub fn write(&mut self, src: &[u8]) -> usize {
        let mut skip = self.pos;
        let mut done = 0;
        for block in self.blocks.iter_mut() {
            if done == src.len() {
                break;
            }
            let bytes = block.bytes_mut();
            if skip >= bytes.len() {
                skip -= bytes.len();
                continue;
            }
            let part = &mut bytes[skip..];
            skip = 0;
            let take = part.len().min(src.len() - done);
            part[..take].copy_from_slice(&src[done..done + take]);
            done += take;
        }
        self.pos += done;
        done
    }

    /// Internet checksum over `len` octets from the cursor, seeded with `pre_sum`.
    ///
    /// Odd octets straddling a block boundary are paired correctly. The cursor does not move.
    pub fn checksum16(&self, len: usize, pre_sum: u16, complement: bool) -> u16 {
        let mut accum = u32::from(pre_sum);
        let mut index = 0;
        'outer: for part in self.segments(self.pos) {
            for &byte in part {
                if index == len {
                    break 'outer;
                }
                accum += if index % 2 == 0 { u32::from(byte) << 8 } else { u32::from(byte) };
                index += 1;
            }
            // Fold regularly so the accumulator cannot overflow on large packets.
            accum = (accum >> 16) + (accum & 0xffff);
        }
        while accum >> 16 != 0 {
            accum = (accum >> 16) + (accum & 0xffff);
        }
        let sum = accum as u16;
        if complement { !sum } else { sum }
    }

    /// Copy the whole packet into a vector.
    pub fn to_vec(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(self.total);
        self.segments(0).for_each(|part| out.extend_from_slice(part));
        out
    }
}

impl fmt::Debug for PktBuf {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("PktBuf")
            .field("total", &self.total)
            .field("blocks", &self.blocks.len())
            .field("pos", &self.pos)
            .finish()
    }
}

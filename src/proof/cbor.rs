//! Tagged CBOR encoding of proofs, for on-chain consumption.
//!
//! A proof is an indefinite-length list of steps. Each step is wrapped in
//! a tag naming its constructor — Branch = 121, Fork = 122, Leaf = 123 —
//! around a definite-length list of its fields in wire order. A fork's
//! neighbor record nests as its own tag-121 list. Branch neighbors travel
//! as an indefinite-length byte string split into two 64-byte chunks; the
//! historical on-chain decoder relies on that exact split, so the encoder
//! reproduces it and the decoder accepts nothing else.
use crate::{
    constant::{DIGEST_SIZE, MERKLE_DEPTH, RADIX},
    hash::Hash,
    proof::{Neighbor, Proof, Step},
};
use thiserror::Error;

/// Constructor tag for branch steps (and for the fork neighbor record).
const TAG_BRANCH: u64 = 121;
/// Constructor tag for fork steps.
const TAG_FORK: u64 = 122;
/// Constructor tag for leaf steps.
const TAG_LEAF: u64 = 123;

/// Chunk size of the branch neighbors byte string.
const NEIGHBOR_CHUNK: usize = 64;

const MAJOR_UINT: u8 = 0;
const MAJOR_BYTES: u8 = 2;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_TAG: u8 = 6;

/// Start-indefinite byte for byte strings.
const BYTES_INDEF: u8 = 0x5F;
/// Start-indefinite byte for arrays.
const ARRAY_INDEF: u8 = 0x9F;
/// The `break` terminator of indefinite-length items.
const BREAK: u8 = 0xFF;

/// Errors surfaced while decoding a CBOR proof.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CborError {
    /// Input ended before the expected item.
    #[error("unexpected end of input while reading {0}")]
    UnexpectedEnd(&'static str),
    /// An item did not start with the expected framing byte.
    #[error("unexpected byte 0x{0:02x} while reading {1}")]
    UnexpectedByte(u8, &'static str),
    /// A byte string or list had the wrong length.
    #[error("invalid length {0} for {1}")]
    InvalidLength(usize, &'static str),
    /// A step carried an unknown constructor tag.
    #[error("unknown proof step tag {0}")]
    UnknownTag(u64),
    /// A nibble field held a value outside `0..16`.
    #[error("nibble value {0} is out of range")]
    InvalidNibble(u64),
    /// Input continued past the end of the proof.
    #[error("trailing bytes after the proof")]
    TrailingBytes,
}

/// Encode a proof into its tagged CBOR wire shape.
pub(crate) fn encode(proof: &Proof) -> Vec<u8> {
    let mut w = Writer::default();
    w.buf.push(ARRAY_INDEF);
    for step in proof.steps() {
        match step {
            Step::Branch { skip, neighbors } => {
                w.tag(TAG_BRANCH);
                w.array(2);
                w.uint(*skip as u64);
                let mut flat = Vec::with_capacity(MERKLE_DEPTH * DIGEST_SIZE);
                for neighbor in neighbors {
                    flat.extend_from_slice(neighbor.as_ref());
                }
                w.chunked_bytes(&flat);
            }
            Step::Fork { skip, neighbor } => {
                w.tag(TAG_FORK);
                w.array(2);
                w.uint(*skip as u64);
                w.tag(TAG_BRANCH);
                w.array(3);
                w.uint(u64::from(neighbor.nibble));
                w.bytes(&neighbor.prefix);
                w.bytes(neighbor.root.as_ref());
            }
            Step::Leaf { skip, key, value } => {
                w.tag(TAG_LEAF);
                w.array(3);
                w.uint(*skip as u64);
                w.bytes(key.as_ref());
                w.bytes(value.as_ref());
            }
        }
    }
    w.buf.push(BREAK);
    w.buf
}

/// Decode a proof from its tagged CBOR wire shape.
pub(crate) fn decode(bytes: &[u8]) -> Result<Proof, CborError> {
    let mut r = Reader { bytes, offset: 0 };
    r.expect_byte(ARRAY_INDEF, "proof list")?;
    let mut steps = Vec::new();
    while r.peek("proof list")? != BREAK {
        steps.push(r.step()?);
    }
    r.offset += 1;
    if r.offset != bytes.len() {
        return Err(CborError::TrailingBytes);
    }
    Ok(Proof::from_steps(steps))
}

#[derive(Default)]
struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    /// Write a major-type header with its length/value argument.
    fn header(&mut self, major: u8, arg: u64) {
        let major = major << 5;
        if arg < 24 {
            self.buf.push(major | arg as u8);
        } else if arg <= u64::from(u8::MAX) {
            self.buf.push(major | 24);
            self.buf.push(arg as u8);
        } else if arg <= u64::from(u16::MAX) {
            self.buf.push(major | 25);
            self.buf.extend_from_slice(&(arg as u16).to_be_bytes());
        } else if arg <= u64::from(u32::MAX) {
            self.buf.push(major | 26);
            self.buf.extend_from_slice(&(arg as u32).to_be_bytes());
        } else {
            self.buf.push(major | 27);
            self.buf.extend_from_slice(&arg.to_be_bytes());
        }
    }

    fn uint(&mut self, value: u64) {
        self.header(MAJOR_UINT, value);
    }

    fn tag(&mut self, tag: u64) {
        self.header(MAJOR_TAG, tag);
    }

    fn array(&mut self, len: u64) {
        self.header(MAJOR_ARRAY, len);
    }

    fn bytes(&mut self, bytes: &[u8]) {
        self.header(MAJOR_BYTES, bytes.len() as u64);
        self.buf.extend_from_slice(bytes);
    }

    fn chunked_bytes(&mut self, bytes: &[u8]) {
        self.buf.push(BYTES_INDEF);
        for chunk in bytes.chunks(NEIGHBOR_CHUNK) {
            self.bytes(chunk);
        }
        self.buf.push(BREAK);
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    offset: usize,
}

impl<'a> Reader<'a> {
    fn peek(&self, field: &'static str) -> Result<u8, CborError> {
        self.bytes
            .get(self.offset)
            .copied()
            .ok_or(CborError::UnexpectedEnd(field))
    }

    fn byte(&mut self, field: &'static str) -> Result<u8, CborError> {
        let byte = self.peek(field)?;
        self.offset += 1;
        Ok(byte)
    }

    fn take(&mut self, len: usize, field: &'static str) -> Result<&'a [u8], CborError> {
        if self.offset + len > self.bytes.len() {
            return Err(CborError::UnexpectedEnd(field));
        }
        let slice = &self.bytes[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    fn expect_byte(&mut self, expected: u8, field: &'static str) -> Result<(), CborError> {
        let byte = self.byte(field)?;
        if byte != expected {
            return Err(CborError::UnexpectedByte(byte, field));
        }
        Ok(())
    }

    /// Read a header of the given major type, returning its argument.
    fn header(&mut self, major: u8, field: &'static str) -> Result<u64, CborError> {
        let byte = self.byte(field)?;
        if byte >> 5 != major {
            return Err(CborError::UnexpectedByte(byte, field));
        }
        let info = byte & 0x1F;
        Ok(match info {
            0..=23 => u64::from(info),
            24 => u64::from(self.byte(field)?),
            25 => u64::from(u16::from_be_bytes(
                self.take(2, field)?.try_into().expect("two bytes"),
            )),
            26 => u64::from(u32::from_be_bytes(
                self.take(4, field)?.try_into().expect("four bytes"),
            )),
            27 => u64::from_be_bytes(self.take(8, field)?.try_into().expect("eight bytes")),
            _ => return Err(CborError::UnexpectedByte(byte, field)),
        })
    }

    fn uint(&mut self, field: &'static str) -> Result<u64, CborError> {
        self.header(MAJOR_UINT, field)
    }

    fn tag(&mut self, field: &'static str) -> Result<u64, CborError> {
        self.header(MAJOR_TAG, field)
    }

    fn array(&mut self, len: u64, field: &'static str) -> Result<(), CborError> {
        let got = self.header(MAJOR_ARRAY, field)?;
        if got != len {
            return Err(CborError::InvalidLength(got as usize, field));
        }
        Ok(())
    }

    fn bytes(&mut self, field: &'static str) -> Result<&'a [u8], CborError> {
        let len = self.header(MAJOR_BYTES, field)?;
        self.take(len as usize, field)
    }

    fn digest(&mut self, field: &'static str) -> Result<Hash, CborError> {
        let bytes = self.bytes(field)?;
        Hash::from_slice(bytes).ok_or(CborError::InvalidLength(bytes.len(), field))
    }

    fn nibble(&mut self, field: &'static str) -> Result<u8, CborError> {
        let value = self.uint(field)?;
        if value >= RADIX as u64 {
            return Err(CborError::InvalidNibble(value));
        }
        Ok(value as u8)
    }

    fn step(&mut self) -> Result<Step, CborError> {
        let tag = self.tag("step tag")?;
        match tag {
            TAG_BRANCH => {
                self.array(2, "branch step")?;
                let skip = self.uint("branch skip")? as usize;
                self.expect_byte(BYTES_INDEF, "branch neighbors")?;
                let mut flat = Vec::with_capacity(MERKLE_DEPTH * DIGEST_SIZE);
                while self.peek("branch neighbors")? != BREAK {
                    let chunk = self.bytes("branch neighbors")?;
                    if chunk.len() != NEIGHBOR_CHUNK {
                        return Err(CborError::InvalidLength(chunk.len(), "neighbor chunk"));
                    }
                    flat.extend_from_slice(chunk);
                }
                self.offset += 1;
                if flat.len() != MERKLE_DEPTH * DIGEST_SIZE {
                    return Err(CborError::InvalidLength(flat.len(), "branch neighbors"));
                }
                let neighbors = std::array::from_fn(|i| {
                    Hash::from_slice(&flat[i * DIGEST_SIZE..(i + 1) * DIGEST_SIZE])
                        .expect("chunk is 32 bytes")
                });
                Ok(Step::Branch { skip, neighbors })
            }
            TAG_FORK => {
                self.array(2, "fork step")?;
                let skip = self.uint("fork skip")? as usize;
                let neighbor_tag = self.tag("fork neighbor tag")?;
                if neighbor_tag != TAG_BRANCH {
                    return Err(CborError::UnknownTag(neighbor_tag));
                }
                self.array(3, "fork neighbor")?;
                let nibble = self.nibble("fork neighbor nibble")?;
                let prefix = self.bytes("fork neighbor prefix")?.to_vec();
                if let Some(bad) = prefix.iter().find(|n| usize::from(**n) >= RADIX) {
                    return Err(CborError::InvalidNibble(u64::from(*bad)));
                }
                let root = self.digest("fork neighbor root")?;
                Ok(Step::Fork {
                    skip,
                    neighbor: Neighbor {
                        nibble,
                        prefix,
                        root,
                    },
                })
            }
            TAG_LEAF => {
                self.array(3, "leaf step")?;
                let skip = self.uint("leaf skip")? as usize;
                let key = self.digest("leaf key")?;
                let value = self.digest("leaf value")?;
                Ok(Step::Leaf { skip, key, value })
            }
            other => Err(CborError::UnknownTag(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_proof_is_a_bare_indefinite_list() {
        let proof = Proof::default();
        assert_eq!(encode(&proof), vec![0x9F, 0xFF]);
        assert_eq!(decode(&[0x9F, 0xFF]).unwrap(), proof);
    }

    #[test]
    fn leaf_step_golden_bytes() {
        let proof = Proof::from_steps(vec![Step::Leaf {
            skip: 0,
            key: Hash([0x11; 32]),
            value: Hash([0x22; 32]),
        }]);
        let mut expected = vec![0x9F, 0xD8, 0x7B, 0x83, 0x00, 0x58, 0x20];
        expected.extend_from_slice(&[0x11; 32]);
        expected.extend_from_slice(&[0x58, 0x20]);
        expected.extend_from_slice(&[0x22; 32]);
        expected.push(0xFF);
        let encoded = encode(&proof);
        assert_eq!(encoded, expected);
        assert_eq!(decode(&encoded).unwrap(), proof);
    }

    #[test]
    fn branch_neighbors_split_into_two_64_byte_chunks() {
        let proof = Proof::from_steps(vec![Step::Branch {
            skip: 3,
            neighbors: [
                Hash([0xA1; 32]),
                Hash([0xA2; 32]),
                Hash([0xA3; 32]),
                Hash([0xA4; 32]),
            ],
        }]);
        let mut expected = vec![0x9F, 0xD8, 0x79, 0x82, 0x03, 0x5F, 0x58, 0x40];
        expected.extend_from_slice(&[0xA1; 32]);
        expected.extend_from_slice(&[0xA2; 32]);
        expected.extend_from_slice(&[0x58, 0x40]);
        expected.extend_from_slice(&[0xA3; 32]);
        expected.extend_from_slice(&[0xA4; 32]);
        expected.extend_from_slice(&[0xFF, 0xFF]);
        let encoded = encode(&proof);
        assert_eq!(encoded, expected);
        assert_eq!(decode(&encoded).unwrap(), proof);
    }

    #[test]
    fn fork_step_nests_a_tagged_neighbor() {
        let proof = Proof::from_steps(vec![Step::Fork {
            skip: 4,
            neighbor: Neighbor {
                nibble: 0xB,
                prefix: vec![0x0, 0x7],
                root: Hash([0xC4; 32]),
            },
        }]);
        let mut expected = vec![
            0x9F, 0xD8, 0x7A, 0x82, 0x04, 0xD8, 0x79, 0x83, 0x0B, 0x42, 0x00, 0x07, 0x58, 0x20,
        ];
        expected.extend_from_slice(&[0xC4; 32]);
        expected.push(0xFF);
        let encoded = encode(&proof);
        assert_eq!(encoded, expected);
        assert_eq!(decode(&encoded).unwrap(), proof);
    }

    #[test]
    fn malformed_inputs_are_rejected() {
        assert_eq!(decode(&[]), Err(CborError::UnexpectedEnd("proof list")));
        assert_eq!(
            decode(&[0x80]),
            Err(CborError::UnexpectedByte(0x80, "proof list"))
        );
        assert_eq!(decode(&[0x9F]), Err(CborError::UnexpectedEnd("proof list")));
        assert_eq!(
            decode(&[0x9F, 0xFF, 0x00]),
            Err(CborError::TrailingBytes)
        );
        // Unknown step tag 124.
        assert_eq!(
            decode(&[0x9F, 0xD8, 0x7C, 0x80, 0xFF]),
            Err(CborError::UnknownTag(124))
        );
    }
}

use md5::{Digest, Md5};
use xxhash_rust::xxh64::Xxh64;

#[repr(u8)]
#[derive(PartialEq, Debug, Clone, Copy)]
pub enum ChecksumType {
    XxHash,
}

impl From<u8> for ChecksumType {
    fn from(v: u8) -> ChecksumType {
        match v {
            0 => ChecksumType::XxHash,
            _ => panic!("Invalid checksum type"),
        }
    }
}

/// Streaming 64-bit checksum over everything written to the archive stream.
pub trait Checksum {
    fn update(&mut self, data: &[u8]);
    fn finalize(&self) -> u64;
    fn reset(&mut self);
}

#[derive(Default)]
pub struct XxHash {
    state: Xxh64,
}

impl Checksum for XxHash {
    fn update(&mut self, data: &[u8]) {
        self.state.update(data);
    }

    fn finalize(&self) -> u64 {
        self.state.digest()
    }

    fn reset(&mut self) {
        self.state = Xxh64::default()
    }
}

pub fn create_checksum(checksum_type: &ChecksumType) -> Box<dyn Checksum> {
    match checksum_type {
        ChecksumType::XxHash => Box::new(XxHash::default()),
    }
}

/// The 16-byte digest stored per transform stage and per column payload.
pub fn md5_digest(data: &[u8]) -> [u8; 16] {
    let mut hasher = Md5::new();
    hasher.update(data);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_xxhash_is_streaming() {
        let mut checksum = create_checksum(&ChecksumType::XxHash);
        checksum.update(b"helloworld");
        let c1 = checksum.finalize();

        let mut checksum = create_checksum(&ChecksumType::XxHash);
        checksum.update(b"hello");
        checksum.update(b"world");
        assert_eq!(c1, checksum.finalize());

        checksum.reset();
        checksum.update(b"worldhello");
        assert_ne!(c1, checksum.finalize());
    }

    #[test]
    fn test_md5_reference_vector() {
        // RFC 1321 test vector for "abc".
        assert_eq!(
            md5_digest(b"abc"),
            [
                0x90, 0x01, 0x50, 0x98, 0x3c, 0xd2, 0x4f, 0xb0, 0xd6, 0x96, 0x3f, 0x7d, 0x28,
                0xe1, 0x7f, 0x72
            ]
        );
    }
}

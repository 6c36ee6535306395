use sheaf_core::errors::{Error, Result};

/// Stable on-disk codec identifiers. These values are written into transform
/// metadata and must never be reordered.
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Codec {
    None = 0,
    /// Generic block codec (zstd by default, the concrete algorithm is
    /// recorded in a metadata tuple).
    Block = 1,
    /// Context-adaptive range coder for quality strings.
    QualityRc = 2,
    /// Context-adaptive range coder for DNA bases.
    SequenceRc = 3,
    /// Auto mode marker; selects the default per-flavor chain.
    Auto = 4,
    Dict = 5,
    Delta = 6,
    PrefixSum = 7,
    /// 2-bit base packer.
    BasePack = 8,
}

impl Codec {
    pub fn from_u32(v: u32) -> Result<Codec> {
        Ok(match v {
            0 => Codec::None,
            1 => Codec::Block,
            2 => Codec::QualityRc,
            3 => Codec::SequenceRc,
            4 => Codec::Auto,
            5 => Codec::Dict,
            6 => Codec::Delta,
            7 => Codec::PrefixSum,
            8 => Codec::BasePack,
            _ => return Err(Error::Corrupt(format!("unknown codec id: {}", v))),
        })
    }

    /// True for codecs that produce an opaque compressed payload.
    pub fn is_compression(self) -> bool {
        matches!(self, Codec::Block | Codec::QualityRc | Codec::SequenceRc)
    }

    /// True for reversible value encodings applied before compression.
    pub fn is_encoding(self) -> bool {
        matches!(
            self,
            Codec::Dict | Codec::Delta | Codec::PrefixSum | Codec::BasePack
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            Codec::None => "none",
            Codec::Block => "block",
            Codec::QualityRc => "rc-qual",
            Codec::SequenceRc => "rc-seq",
            Codec::Auto => "auto",
            Codec::Dict => "dict",
            Codec::Delta => "delta",
            Codec::PrefixSum => "prefix-sum",
            Codec::BasePack => "base-pack",
        }
    }
}

impl std::fmt::Display for Codec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_ids_are_stable() {
        for id in 0..=8u32 {
            assert_eq!(Codec::from_u32(id).unwrap() as u32, id);
        }
        assert!(Codec::from_u32(9).is_err());
    }

    #[test]
    fn test_classification() {
        assert!(Codec::Block.is_compression());
        assert!(Codec::QualityRc.is_compression());
        assert!(!Codec::Dict.is_compression());
        assert!(Codec::Dict.is_encoding());
        assert!(Codec::Delta.is_encoding());
        assert!(!Codec::Auto.is_encoding());
        assert!(!Codec::Auto.is_compression());
    }
}

use sheaf_core::errors::{Error, Result};

/// Primitive value types a column store can carry. Wire ids are stable.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveType {
    Unknown = 0,
    Int8 = 1,
    UInt8 = 2,
    Int16 = 3,
    UInt16 = 4,
    Int32 = 5,
    UInt32 = 6,
    Int64 = 7,
    UInt64 = 8,
    Float = 9,
    Double = 10,
    Bool = 11,
    /// Variable-length payload; must be paired with a secondary primitive
    /// type naming the element type.
    ByteArray = 12,
    FixedLenByteArray = 13,
}

impl PrimitiveType {
    pub fn from_u8(v: u8) -> Result<PrimitiveType> {
        Ok(match v {
            0 => PrimitiveType::Unknown,
            1 => PrimitiveType::Int8,
            2 => PrimitiveType::UInt8,
            3 => PrimitiveType::Int16,
            4 => PrimitiveType::UInt16,
            5 => PrimitiveType::Int32,
            6 => PrimitiveType::UInt32,
            7 => PrimitiveType::Int64,
            8 => PrimitiveType::UInt64,
            9 => PrimitiveType::Float,
            10 => PrimitiveType::Double,
            11 => PrimitiveType::Bool,
            12 => PrimitiveType::ByteArray,
            13 => PrimitiveType::FixedLenByteArray,
            _ => return Err(Error::Corrupt(format!("unknown primitive type: {}", v))),
        })
    }

    /// Size in bytes of one element, for the fixed-size types.
    pub fn size(self) -> usize {
        match self {
            PrimitiveType::Int8 | PrimitiveType::UInt8 | PrimitiveType::Bool => 1,
            PrimitiveType::Int16 | PrimitiveType::UInt16 => 2,
            PrimitiveType::Int32 | PrimitiveType::UInt32 | PrimitiveType::Float => 4,
            PrimitiveType::Int64 | PrimitiveType::UInt64 | PrimitiveType::Double => 8,
            PrimitiveType::Unknown
            | PrimitiveType::ByteArray
            | PrimitiveType::FixedLenByteArray => 0,
        }
    }

    /// Types with a total order usable for segment statistics.
    pub fn is_ordered(self) -> bool {
        !matches!(
            self,
            PrimitiveType::Unknown
                | PrimitiveType::Bool
                | PrimitiveType::ByteArray
                | PrimitiveType::FixedLenByteArray
        )
    }
}

/// Storage flavor of a column set: a plain fixed-width column (possibly a
/// vector of them) or a variable-length tensor of (offsets, data).
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Column = 1,
    Tensor = 2,
}

impl StoreKind {
    pub fn from_u8(v: u8) -> Result<StoreKind> {
        Ok(match v {
            1 => StoreKind::Column,
            2 => StoreKind::Tensor,
            _ => return Err(Error::Corrupt(format!("unknown store kind: {}", v))),
        })
    }
}

/// Rust-side counterpart of [`PrimitiveType`] for generic column accessors.
pub trait Primitive: bytemuck::Pod + PartialOrd + Copy + 'static {
    const PTYPE: PrimitiveType;

    /// Bit-pun the value into the low bytes of a u64 slot (little-endian,
    /// upper bytes zero). Used for segment statistics.
    fn to_bits64(self) -> u64 {
        let mut out = [0u8; 8];
        let bytes = bytemuck::bytes_of(&self);
        out[..bytes.len()].copy_from_slice(bytes);
        u64::from_le_bytes(out)
    }

    fn from_bits64(bits: u64) -> Self {
        let bytes = bits.to_le_bytes();
        let mut v = Self::zeroed();
        let n = std::mem::size_of::<Self>();
        bytemuck::bytes_of_mut(&mut v).copy_from_slice(&bytes[..n]);
        v
    }
}

macro_rules! impl_primitive {
    ($($t:ty => $ptype:ident),* $(,)?) => {
        $(
            impl Primitive for $t {
                const PTYPE: PrimitiveType = PrimitiveType::$ptype;
            }
        )*
    };
}

impl_primitive!(
    i8 => Int8,
    u8 => UInt8,
    i16 => Int16,
    u16 => UInt16,
    i32 => Int32,
    u32 => UInt32,
    i64 => Int64,
    u64 => UInt64,
    f32 => Float,
    f64 => Double,
);

/// Expand `$body` with `$T` bound to the Rust type matching a runtime
/// [`PrimitiveType`] tag. The nine-way dispatch used everywhere a column's
/// element type is only known at runtime.
#[macro_export]
macro_rules! dispatch_primitive {
    ($ptype:expr, |$T:ident| $body:expr, $fallback:expr) => {
        match $ptype {
            $crate::ptype::PrimitiveType::Int8 => {
                type $T = i8;
                $body
            }
            $crate::ptype::PrimitiveType::UInt8 => {
                type $T = u8;
                $body
            }
            $crate::ptype::PrimitiveType::Int16 => {
                type $T = i16;
                $body
            }
            $crate::ptype::PrimitiveType::UInt16 => {
                type $T = u16;
                $body
            }
            $crate::ptype::PrimitiveType::Int32 => {
                type $T = i32;
                $body
            }
            $crate::ptype::PrimitiveType::UInt32 => {
                type $T = u32;
                $body
            }
            $crate::ptype::PrimitiveType::Int64 => {
                type $T = i64;
                $body
            }
            $crate::ptype::PrimitiveType::UInt64 => {
                type $T = u64;
                $body
            }
            $crate::ptype::PrimitiveType::Float => {
                type $T = f32;
                $body
            }
            $crate::ptype::PrimitiveType::Double => {
                type $T = f64;
                $body
            }
            _ => $fallback,
        }
    };
}

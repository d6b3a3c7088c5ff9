use crate::common::*;
use maplit::hashmap;
use num_complex::{Complex32, Complex64};
use num_traits::Zero;

/// Element type of a value. The declaration order is the promotion order:
/// a binary numeric operation yields the greater of its operand types.
#[derive(
    Debug, Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash,
    serde::Serialize, serde::Deserialize, derive_more::Display,
)]
pub enum TypeTag {
    #[display(fmt = "BYTE")]
    Byte,
    #[display(fmt = "WORD")]
    Int16,
    #[display(fmt = "LONG")]
    Int32,
    #[display(fmt = "INT64")]
    Int64,
    #[display(fmt = "FLOAT")]
    Float32,
    #[display(fmt = "DOUBLE")]
    Float64,
    #[display(fmt = "CFLOAT")]
    ComplexFloat,
    #[display(fmt = "CDOUBLE")]
    ComplexDouble,
    #[display(fmt = "STRING")]
    StringScalar,
    #[display(fmt = "STRARR")]
    StringArray,
}

lazy_static::lazy_static! {
    static ref TYPE_NAMES: HashMap<&'static str, TypeTag> = hashmap! {
        "BYTE" => TypeTag::Byte,
        "WORD" => TypeTag::Int16,
        "LONG" => TypeTag::Int32,
        "INT64" => TypeTag::Int64,
        "FLOAT" => TypeTag::Float32,
        "DOUBLE" => TypeTag::Float64,
        "CFLOAT" => TypeTag::ComplexFloat,
        "CDOUBLE" => TypeTag::ComplexDouble,
        "STRING" => TypeTag::StringScalar,
        "STRARR" => TypeTag::StringArray,
    };
}

impl TypeTag {
    /// Size in bytes of one element. String types count bytes of text.
    pub fn size(self) -> usize {
        use TypeTag::*;
        match self {
            Byte => 1,
            Int16 => 2,
            Int32 => 4,
            Int64 => 8,
            Float32 => 4,
            Float64 => 8,
            ComplexFloat => 8,
            ComplexDouble => 16,
            StringScalar | StringArray => 1,
        }
    }

    pub fn is_numeric(self) -> bool {
        self <= TypeTag::ComplexDouble
    }

    pub fn is_integer(self) -> bool {
        self <= TypeTag::Int64
    }

    pub fn is_complex(self) -> bool {
        self == TypeTag::ComplexFloat || self == TypeTag::ComplexDouble
    }

    pub fn is_string(self) -> bool {
        self == TypeTag::StringScalar || self == TypeTag::StringArray
    }

    pub fn promote(self, other: TypeTag) -> TypeTag {
        std::cmp::max(self, other)
    }

    /// Resolves a language-level type name such as `LONG` or `cfloat`.
    pub fn from_name(name: &str) -> Option<TypeTag> {
        TYPE_NAMES.get(name.to_ascii_uppercase().as_str()).copied()
    }
}

/// Element codec. Buffers are plain little-endian bytes; every typed access
/// goes through this trait so the element type is always the declared one.
pub trait Element: Copy + Debug + PartialEq + 'static {
    const TAG: TypeTag;

    fn read(bytes: &[u8], index: usize) -> Self;
    fn write(self, bytes: &mut [u8], index: usize);

    fn from_i64(v: i64) -> Self;
    fn from_f64(v: f64) -> Self;
    fn from_complex(v: Complex64) -> Self;
    fn to_complex(self) -> Complex64;
}

/// Arithmetic needed by the element operators. Integer arithmetic wraps and
/// integer division by zero yields zero; the engine never traps.
pub trait Numeric: Element {
    fn zero() -> Self;
    fn add(self, rhs: Self) -> Self;
    fn sub(self, rhs: Self) -> Self;
    fn mul(self, rhs: Self) -> Self;
    fn div(self, rhs: Self) -> Self;
    fn min(self, rhs: Self) -> Self;
    fn max(self, rhs: Self) -> Self;
    fn bit_and(self, rhs: Self) -> Self;
    fn bit_or(self, rhs: Self) -> Self;
}

/// Reads element `index` of a buffer holding `tag` elements, converted to
/// `T`. Reals truncate toward zero when converted to an integer type;
/// complex values lose their imaginary part when converted to a real type.
pub fn read_as<T: Element>(tag: TypeTag, bytes: &[u8], index: usize) -> T {
    use TypeTag::*;
    match tag {
        Byte => T::from_i64(u8::read(bytes, index) as i64),
        Int16 => T::from_i64(i16::read(bytes, index) as i64),
        Int32 => T::from_i64(i32::read(bytes, index) as i64),
        Int64 => T::from_i64(i64::read(bytes, index)),
        Float32 => T::from_f64(f32::read(bytes, index) as f64),
        Float64 => T::from_f64(f64::read(bytes, index)),
        ComplexFloat => T::from_complex(Complex32::read(bytes, index).to_complex()),
        ComplexDouble => T::from_complex(Complex64::read(bytes, index)),
        StringScalar | StringArray => unreachable!("numeric read of a {} buffer", tag),
    }
}

macro_rules! impl_integer_element {
    ($t:ty, $tag:expr) => {
        impl Element for $t {
            const TAG: TypeTag = $tag;
            #[inline]
            fn read(bytes: &[u8], index: usize) -> Self {
                const SIZE: usize = std::mem::size_of::<$t>();
                let mut raw = [0u8; SIZE];
                raw.copy_from_slice(&bytes[index * SIZE..(index + 1) * SIZE]);
                <$t>::from_le_bytes(raw)
            }
            #[inline]
            fn write(self, bytes: &mut [u8], index: usize) {
                const SIZE: usize = std::mem::size_of::<$t>();
                bytes[index * SIZE..(index + 1) * SIZE].copy_from_slice(&self.to_le_bytes());
            }
            fn from_i64(v: i64) -> Self { v as $t }
            fn from_f64(v: f64) -> Self { v as i64 as $t }
            fn from_complex(v: Complex64) -> Self { v.re as i64 as $t }
            fn to_complex(self) -> Complex64 { Complex64::new(self as f64, 0.0) }
        }
        impl Numeric for $t {
            fn zero() -> Self { 0 }
            fn add(self, rhs: Self) -> Self { self.wrapping_add(rhs) }
            fn sub(self, rhs: Self) -> Self { self.wrapping_sub(rhs) }
            fn mul(self, rhs: Self) -> Self { self.wrapping_mul(rhs) }
            fn div(self, rhs: Self) -> Self { self.checked_div(rhs).unwrap_or(0) }
            fn min(self, rhs: Self) -> Self { std::cmp::min(self, rhs) }
            fn max(self, rhs: Self) -> Self { std::cmp::max(self, rhs) }
            fn bit_and(self, rhs: Self) -> Self { self & rhs }
            fn bit_or(self, rhs: Self) -> Self { self | rhs }
        }
    };
}

macro_rules! impl_real_element {
    ($t:ty, $tag:expr) => {
        impl Element for $t {
            const TAG: TypeTag = $tag;
            #[inline]
            fn read(bytes: &[u8], index: usize) -> Self {
                const SIZE: usize = std::mem::size_of::<$t>();
                let mut raw = [0u8; SIZE];
                raw.copy_from_slice(&bytes[index * SIZE..(index + 1) * SIZE]);
                <$t>::from_le_bytes(raw)
            }
            #[inline]
            fn write(self, bytes: &mut [u8], index: usize) {
                const SIZE: usize = std::mem::size_of::<$t>();
                bytes[index * SIZE..(index + 1) * SIZE].copy_from_slice(&self.to_le_bytes());
            }
            fn from_i64(v: i64) -> Self { v as $t }
            fn from_f64(v: f64) -> Self { v as $t }
            fn from_complex(v: Complex64) -> Self { v.re as $t }
            fn to_complex(self) -> Complex64 { Complex64::new(self as f64, 0.0) }
        }
        impl Numeric for $t {
            fn zero() -> Self { 0.0 }
            fn add(self, rhs: Self) -> Self { self + rhs }
            fn sub(self, rhs: Self) -> Self { self - rhs }
            fn mul(self, rhs: Self) -> Self { self * rhs }
            fn div(self, rhs: Self) -> Self { self / rhs }
            fn min(self, rhs: Self) -> Self { <$t>::min(self, rhs) }
            fn max(self, rhs: Self) -> Self { <$t>::max(self, rhs) }
            fn bit_and(self, _rhs: Self) -> Self { unreachable!("bitwise and on {}", Self::TAG) }
            fn bit_or(self, _rhs: Self) -> Self { unreachable!("bitwise or on {}", Self::TAG) }
        }
    };
}

macro_rules! impl_complex_element {
    ($t:ty, $part:ty, $tag:expr) => {
        impl Element for $t {
            const TAG: TypeTag = $tag;
            #[inline]
            fn read(bytes: &[u8], index: usize) -> Self {
                // stored as (re, im) pairs
                <$t>::new(<$part>::read(bytes, 2 * index), <$part>::read(bytes, 2 * index + 1))
            }
            #[inline]
            fn write(self, bytes: &mut [u8], index: usize) {
                self.re.write(bytes, 2 * index);
                self.im.write(bytes, 2 * index + 1);
            }
            fn from_i64(v: i64) -> Self { <$t>::new(v as $part, 0.0) }
            fn from_f64(v: f64) -> Self { <$t>::new(v as $part, 0.0) }
            fn from_complex(v: Complex64) -> Self { <$t>::new(v.re as $part, v.im as $part) }
            fn to_complex(self) -> Complex64 { Complex64::new(self.re as f64, self.im as f64) }
        }
        impl Numeric for $t {
            fn zero() -> Self { <$t as Zero>::zero() }
            fn add(self, rhs: Self) -> Self { self + rhs }
            fn sub(self, rhs: Self) -> Self { self - rhs }
            fn mul(self, rhs: Self) -> Self { self * rhs }
            fn div(self, rhs: Self) -> Self { self / rhs }
            fn min(self, _rhs: Self) -> Self { unreachable!("min on {}", Self::TAG) }
            fn max(self, _rhs: Self) -> Self { unreachable!("max on {}", Self::TAG) }
            fn bit_and(self, _rhs: Self) -> Self { unreachable!("bitwise and on {}", Self::TAG) }
            fn bit_or(self, _rhs: Self) -> Self { unreachable!("bitwise or on {}", Self::TAG) }
        }
    };
}

impl_integer_element!(u8, TypeTag::Byte);
impl_integer_element!(i16, TypeTag::Int16);
impl_integer_element!(i32, TypeTag::Int32);
impl_integer_element!(i64, TypeTag::Int64);
impl_real_element!(f32, TypeTag::Float32);
impl_real_element!(f64, TypeTag::Float64);
impl_complex_element!(Complex32, f32, TypeTag::ComplexFloat);
impl_complex_element!(Complex64, f64, TypeTag::ComplexDouble);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn promotion_follows_declaration_order() {
        assert_eq!(TypeTag::Byte.promote(TypeTag::Int32), TypeTag::Int32);
        assert_eq!(TypeTag::Float32.promote(TypeTag::Int64), TypeTag::Float32);
        assert_eq!(TypeTag::ComplexFloat.promote(TypeTag::Float64), TypeTag::ComplexFloat);
        assert_eq!(TypeTag::Int16.promote(TypeTag::Int16), TypeTag::Int16);
    }

    #[test]
    fn type_sizes_and_names() {
        assert_eq!(TypeTag::ComplexDouble.size(), 16);
        assert_eq!(TypeTag::Int16.size(), 2);
        assert_eq!(TypeTag::from_name("long"), Some(TypeTag::Int32));
        assert_eq!(TypeTag::from_name("CDOUBLE"), Some(TypeTag::ComplexDouble));
        assert_eq!(TypeTag::from_name("quaternion"), None);
        assert_eq!(TypeTag::Float64.to_string(), "DOUBLE");
        assert!(!TypeTag::StringScalar.is_numeric());
    }

    #[test]
    fn codec_and_conversions() {
        let mut buf = vec![0u8; 16];
        (-3i32).write(&mut buf, 1);
        assert_eq!(i32::read(&buf, 1), -3);
        assert_eq!(read_as::<f64>(TypeTag::Int32, &buf, 1), -3.0);

        Complex32::new(1.5, -2.0).write(&mut buf, 1);
        assert_eq!(read_as::<Complex64>(TypeTag::ComplexFloat, &buf, 1), Complex64::new(1.5, -2.0));
        assert_eq!(read_as::<i16>(TypeTag::ComplexFloat, &buf, 1), 1);

        2.9f64.write(&mut buf, 0);
        assert_eq!(read_as::<u8>(TypeTag::Float64, &buf, 0), 2);
        assert_eq!(<i32 as Numeric>::div(7, 0), 0);
        assert_eq!(<u8 as Numeric>::add(250, 10), 4);
    }
}

//! The raw 64-bit hash value and its combining function

use std::fmt;
use std::num::ParseIntError;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

/// Mixing constant shared by every producer and consumer of cache keys.
const MIX_CONSTANT: u64 = 0x9e37_79b9;

/// Combine two hash values into one.
///
/// Folding is order-sensitive: `combine(a, b)` and `combine(b, a)` generally
/// differ. This is a deliberate speed-over-commutativity trade-off; cache
/// keys stay stable only as long as producers and consumers fold the same
/// inputs in the same order.
pub const fn combine(left: u64, right: u64) -> u64 {
    left ^ right
        .wrapping_add(MIX_CONSTANT)
        .wrapping_add(left << 6)
        .wrapping_add(left >> 2)
}

/// A value that can contribute to a hash fold
pub trait HashSource {
    /// Reduce this value to a 64-bit code
    fn hash_code(&self) -> u64;
}

/// An opaque 64-bit hash value built by folding typed inputs
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
)]
pub struct HashCode(u64);

impl HashCode {
    /// Wrap a raw 64-bit value
    pub const fn new(raw: u64) -> Self {
        Self(raw)
    }

    /// The raw 64-bit value
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Hash a single value
    pub fn of<T: HashSource + ?Sized>(value: &T) -> Self {
        Self(value.hash_code())
    }

    /// Fold another value into this hash, left to right
    pub fn mix<T: HashSource + ?Sized>(&mut self, value: &T) {
        self.0 = combine(self.0, value.hash_code());
    }
}

impl HashSource for HashCode {
    fn hash_code(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for HashCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for HashCode {
    type Err = ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(Self)
    }
}

/// Hash a list of strings with the conventional seed used for command lines
pub fn hash_strings<S: AsRef<str>>(strings: &[S]) -> HashCode {
    let mut code = 123_456u64;
    for s in strings {
        code = combine(code, s.as_ref().hash_code());
    }
    HashCode::new(code)
}

/// A byte buffer hashed as raw content rather than element by element
pub struct Bytes<'a>(pub &'a [u8]);

impl HashSource for Bytes<'_> {
    fn hash_code(&self) -> u64 {
        xxh3_64(self.0)
    }
}

macro_rules! unsigned_source {
    ($($ty:ty),*) => {
        $(impl HashSource for $ty {
            fn hash_code(&self) -> u64 {
                *self as u64
            }
        })*
    };
}

macro_rules! signed_source {
    ($($ty:ty),*) => {
        $(impl HashSource for $ty {
            fn hash_code(&self) -> u64 {
                *self as i64 as u64
            }
        })*
    };
}

unsigned_source!(u8, u16, u32, u64, usize);
signed_source!(i8, i16, i32, i64, isize);

impl HashSource for bool {
    fn hash_code(&self) -> u64 {
        u64::from(*self)
    }
}

impl HashSource for f32 {
    fn hash_code(&self) -> u64 {
        u64::from(self.to_bits())
    }
}

impl HashSource for f64 {
    fn hash_code(&self) -> u64 {
        self.to_bits()
    }
}

impl HashSource for str {
    fn hash_code(&self) -> u64 {
        xxh3_64(self.as_bytes())
    }
}

impl HashSource for String {
    fn hash_code(&self) -> u64 {
        self.as_str().hash_code()
    }
}

impl HashSource for Path {
    fn hash_code(&self) -> u64 {
        xxh3_64(self.as_os_str().as_encoded_bytes())
    }
}

impl HashSource for PathBuf {
    fn hash_code(&self) -> u64 {
        self.as_path().hash_code()
    }
}

impl<T: HashSource> HashSource for [T] {
    fn hash_code(&self) -> u64 {
        let mut code = 0u64;
        for item in self {
            code = combine(code, item.hash_code());
        }
        code
    }
}

impl<T: HashSource> HashSource for Vec<T> {
    fn hash_code(&self) -> u64 {
        self.as_slice().hash_code()
    }
}

impl<T: HashSource + ?Sized> HashSource for &T {
    fn hash_code(&self) -> u64 {
        (**self).hash_code()
    }
}

// Strongly typed identifiers. All are plain wrappers over u64 with no
// arithmetic except SequenceNumber, which supports +1 (spec §6).

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! plain_id {
    ($name:ident) => {
        #[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
        pub struct $name(pub u64);

        impl $name {
            pub const fn new(v: u64) -> Self {
                $name(v)
            }

            pub const fn as_u64(self) -> u64 {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($name), self.0)
            }
        }

        impl From<u64> for $name {
            fn from(v: u64) -> Self {
                $name(v)
            }
        }
    };
}

plain_id!(QueryId);
plain_id!(OriginId);
plain_id!(WorkerId);
plain_id!(OperatorId);
plain_id!(PipelineId);
plain_id!(ChunkNumber);

/// Per-origin contiguous counter attached to each buffer emitted from that
/// origin. The only identifier that supports arithmetic: `next()`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    pub const ZERO: SequenceNumber = SequenceNumber(0);

    pub const fn new(v: u64) -> Self {
        SequenceNumber(v)
    }

    pub const fn as_u64(self) -> u64 {
        self.0
    }

    #[must_use]
    pub fn next(self) -> Self {
        SequenceNumber(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SequenceNumber({})", self.0)
    }
}

impl From<u64> for SequenceNumber {
    fn from(v: u64) -> Self {
        SequenceNumber(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_number_increments_by_one() {
        let seq = SequenceNumber::ZERO;
        assert_eq!(seq.next(), SequenceNumber::new(1));
        assert_eq!(seq.next().next(), SequenceNumber::new(2));
    }

    #[test]
    fn ids_round_trip_through_u64() {
        let q = QueryId::from(42);
        assert_eq!(q.as_u64(), 42);
        assert_eq!(q.to_string(), "QueryId(42)");
    }
}

//! `serialize_with` helpers for chain primitives in reports.

use serde::Serializer;
use std::fmt::Display;

/// Serializes any `Display` value (addresses, 256-bit amounts) as a string.
pub fn display<T: Display, S: Serializer>(value: &T, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.collect_str(value)
}


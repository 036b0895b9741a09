//! Named-value serialization of snapshots
//!
//! A record is the value's role as a tag wrapped around its JSON form:
//!
//! ```text
//! <snap>{"tuples":3,"totals":{"alice":{"total":15,"count":2}}}</snap>
//! ```
//!
//! The tag says what the value is; the JSON body is self-describing. The
//! caller decides where records end (the harness writes one per line).

use serde::Serialize;
use std::io::{self, Write};

/// Write `value` as a `<name>...</name>` record
pub fn write_nvp<T: Serialize + ?Sized>(out: &mut dyn Write, name: &str, value: &T) -> io::Result<()> {
    write!(out, "<{}>", name)?;
    serde_json::to_writer(&mut *out, value).map_err(io::Error::from)?;
    write!(out, "</{}>", name)
}

/// Write a record followed by a line terminator
pub fn write_nvp_line<T: Serialize + ?Sized>(
    out: &mut dyn Write,
    name: &str,
    value: &T,
) -> io::Result<()> {
    write_nvp(out, name, value)?;
    writeln!(out)
}

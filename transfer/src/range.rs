//! Byte ranges for multipart downloads and copies.

use std::fmt::{self, Display, Formatter};

/// An HTTP byte range selecting one part of an object.
///
/// Displays as the value of a `Range` (or `CopySourceRange`) parameter, e.g. `bytes=5-9`. The end
/// is inclusive. An open-ended range (`bytes=5-`) selects everything from `start` to the end of
/// the object.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ByteRange {
    pub start: u64,
    pub end: Option<u64>,
}

impl Display for ByteRange {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "bytes={}-", self.start)?;
        if let Some(end) = self.end {
            write!(f, "{end}")?;
        }
        Ok(())
    }
}

/// Calculate the range of part `part_index` (counting from zero) of a transfer split into
/// `num_parts` parts of `part_size` bytes.
///
/// Every part except the last spans exactly `part_size` bytes. The last part extends to the end of
/// the object: up to `total_size - 1` if the total size is known, or open-ended otherwise.
///
/// # Panics
///
/// Panics if `part_size` is zero for a part other than the last, or if the part does not fit in
/// the range of a `u64`.
pub fn calculate_range(
    part_size: u64,
    part_index: u64,
    num_parts: u64,
    total_size: Option<u64>,
) -> ByteRange {
    let start = part_index.checked_mul(part_size).unwrap_or_else(|| {
        panic!("part {part_index} of size {part_size} starts past the largest byte offset")
    });
    let end = if num_parts.checked_sub(1) == Some(part_index) {
        total_size.and_then(|size| size.checked_sub(1))
    } else {
        assert!(part_size > 0, "only the last part of a transfer can be empty");
        Some(start.checked_add(part_size - 1).unwrap_or_else(|| {
            panic!("part {part_index} of size {part_size} ends past the largest byte offset")
        }))
    };
    ByteRange { start, end }
}

/// Calculate the `Range` parameter for a multipart download or the `CopySourceRange` parameter
/// for a multipart copy.
///
/// See [`calculate_range`].
pub fn calculate_range_parameter(
    part_size: u64,
    part_index: u64,
    num_parts: u64,
    total_size: Option<u64>,
) -> String {
    calculate_range(part_size, part_index, num_parts, total_size).to_string()
}

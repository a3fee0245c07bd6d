#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("anchor uses a boundary sentinel on its open side")]
    InvalidAnchor,
    #[error("slice {start}..{end} out of range for list of length {len}")]
    OutOfRange { start: usize, end: usize, len: usize },
    #[error("mark start does not precede its end")]
    MarkRangeInvalid,
    #[error("the boundary sentinels carry no format")]
    FormatAtBoundary,
    #[error("mark comparator is not a consistent total order")]
    InconsistentComparator,
    #[error("decode error")]
    DecodeError,
}

//! Error types and helpers.
use thiserror::Error;

/// The reason a bit stream entered its failed state.
///
/// Stream operations never return errors directly; the first failure is
/// recorded in the stream and every later operation is a no-op. Check
/// [`fail`](crate::BitWriter::fail) (or inspect
/// [`error`](crate::BitWriter::error)) once after a chain of operations.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamError {
    #[error("stream has no usable buffer")]
    InvalidBuffer,
    #[error("write would exceed the stream capacity")]
    Overflow,
    #[error("not enough bits remain in the stream")]
    Exhausted,
    #[error("min must be less than max")]
    InvalidRange,
    #[error("value is outside the declared [min, max] range")]
    ValueOutOfRange,
    #[error("stream was already finalized")]
    WriteAfterFinalFlush,
    #[error("string length {length} exceeds the caller's maximum of {max_length}")]
    StringTooLong { length: u64, max_length: u64 },
    #[error("malformed string length prefix")]
    MalformedLengthPrefix,
    #[error("string bytes are not valid UTF-8")]
    InvalidUtf8,
    #[error("code point is not a valid Unicode scalar value")]
    InvalidScalar,
    #[error("stream was failed by the caller")]
    Aborted,
}

/// Errors from [`SharedPayload::allocate`](crate::SharedPayload::allocate).
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadError {
    #[error("payload size must be greater than zero")]
    ZeroSize,
    #[error("payload size {requested} exceeds the per-message send limit of {limit} bytes")]
    ExceedsSendLimit { requested: u32, limit: u32 },
    #[error("allocation of {bytes} bytes failed")]
    OutOfMemory { bytes: usize },
}

#[cold]
pub(crate) const fn invalid_buffer() -> StreamError {
    StreamError::InvalidBuffer
}

#[cold]
pub(crate) const fn overflow() -> StreamError {
    StreamError::Overflow
}

#[cold]
pub(crate) const fn exhausted() -> StreamError {
    StreamError::Exhausted
}

#[cold]
pub(crate) const fn invalid_range() -> StreamError {
    StreamError::InvalidRange
}

#[cold]
pub(crate) const fn value_out_of_range() -> StreamError {
    StreamError::ValueOutOfRange
}

#[cold]
pub(crate) const fn write_after_final_flush() -> StreamError {
    StreamError::WriteAfterFinalFlush
}

#[cold]
pub(crate) const fn string_too_long(length: u64, max_length: u64) -> StreamError {
    StreamError::StringTooLong { length, max_length }
}

#[cold]
pub(crate) const fn malformed_length_prefix() -> StreamError {
    StreamError::MalformedLengthPrefix
}

#[cold]
pub(crate) const fn invalid_utf8() -> StreamError {
    StreamError::InvalidUtf8
}

#[cold]
pub(crate) const fn invalid_scalar() -> StreamError {
    StreamError::InvalidScalar
}

#[cold]
pub(crate) const fn out_of_memory(bytes: usize) -> PayloadError {
    PayloadError::OutOfMemory { bytes }
}

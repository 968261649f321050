#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("buffer engine: {0}")]
    Buffer(#[from] BufferError),
    #[error("storage I/O: {0}")]
    Io(#[from] std::io::Error),
}

/// Error codes of the buffered record I/O engine, one per failure kind the
/// core itself can detect (as opposed to storage-driver failures, which
/// propagate through [`Error::Io`] unchanged).
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferError {
    /// Seek or position request resolved to a negative byte offset.
    #[error("negative file position")]
    NegFilePos,
    /// Read (or positioning in `report_eof` mode) ran past the file's
    /// logical end.
    #[error("end of file")]
    EndOfFile,
    /// Every slot in the pool is pinned as some file's current buffer; the
    /// number of simultaneously-active files exceeds `NBUF`.
    #[error("too many files open against the buffer pool")]
    TooManyFiles,
    /// A table row access named a row outside `[1, numrows]`.
    #[error("row number out of range")]
    BadRowNum,
    /// A table/column access named an element outside the row.
    #[error("element number out of range")]
    BadElemNum,
}

pub type Result<T> = std::result::Result<T, Error>;

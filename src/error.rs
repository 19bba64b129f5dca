use crate::varint::DecodeError;

/// Represents errors that can occur anywhere in the HTM index.
///
/// Each variant corresponds to one of the C-style error codes named in the
/// wire/ABI contract (`ENULLPTR`, `EINV`, `EIO`, ...); the mapping is noted
/// per variant.
#[derive(Debug)]
pub enum Error {
    /// A required pointer/reference argument was null or empty. (ENULLPTR)
    NullInput(&'static str),

    /// An argument was out of its valid domain. (EINV)
    InvalidArgument(String),

    /// An HTM id failed validation (bad parity, bad root bits, ...). (EID)
    InvalidId(i64),

    /// A subdivision level was outside `[0, HTM_MAX_LEVEL]`. (ELEVEL)
    InvalidLevel(i32),

    /// A collection had an invalid length (e.g. zero points, < 3 vertices). (ELEN)
    InvalidLength(&'static str),

    /// A polygon/hull construction hit a degenerate configuration
    /// (repeated vertices, anti-parallel padded edges, convexity violation). (EDEGEN)
    Degenerate(String),

    /// Input points were not all within one hemisphere of some common point. (EHEMIS)
    NotHemispherical,

    /// A range-cover budget was too small to ever be satisfiable (K < 4).
    OutOfBudget(usize),

    /// I/O error. (EIO)
    Io(std::io::Error),

    /// Allocation failure. (ENOMEM)
    OutOfMemory(&'static str),

    /// mmap/munmap/madvise failure. (EMMAN)
    Mmap(String),

    /// The compressed tree file is truncated, has a bad header, or
    /// references an unreachable offset. (ETREE)
    Corrupt(String),

    /// A varint failed to decode. (EIO)
    Decode(DecodeError),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NullInput(what) => write!(f, "null input: {what}"),
            Self::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
            Self::InvalidId(id) => write!(f, "invalid HTM id: {id}"),
            Self::InvalidLevel(l) => write!(f, "invalid HTM level: {l}"),
            Self::InvalidLength(what) => write!(f, "invalid length: {what}"),
            Self::Degenerate(msg) => write!(f, "degenerate geometry: {msg}"),
            Self::NotHemispherical => write!(f, "points are not hemispherical"),
            Self::OutOfBudget(k) => write!(f, "range-cover budget {k} is below the guaranteed minimum of 4"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::OutOfMemory(what) => write!(f, "out of memory: {what}"),
            Self::Mmap(msg) => write!(f, "mmap error: {msg}"),
            Self::Corrupt(msg) => write!(f, "corrupt tree: {msg}"),
            Self::Decode(e) => write!(f, "decode error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(value: std::io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<DecodeError> for Error {
    fn from(value: DecodeError) -> Self {
        Self::Decode(value)
    }
}

/// A C-style error code, for callers that cross an ABI boundary.
///
/// Mirrors the enum named in the external interface contract; `Error`
/// converts losslessly into this for such boundaries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ErrCode {
    Ok = 0,
    ENullPtr = 1,
    EInv = 2,
    EIo = 3,
    ENoMem = 4,
    EMman = 5,
    EId = 6,
    ELevel = 7,
    ELen = 8,
    EDegen = 9,
    EHemis = 10,
    ETree = 11,
}

impl From<&Error> for ErrCode {
    fn from(err: &Error) -> Self {
        match err {
            Error::NullInput(_) => ErrCode::ENullPtr,
            Error::InvalidArgument(_) => ErrCode::EInv,
            Error::InvalidId(_) => ErrCode::EId,
            Error::InvalidLevel(_) => ErrCode::ELevel,
            Error::InvalidLength(_) => ErrCode::ELen,
            Error::Degenerate(_) => ErrCode::EDegen,
            Error::NotHemispherical => ErrCode::EHemis,
            Error::OutOfBudget(_) => ErrCode::EInv,
            Error::Io(_) => ErrCode::EIo,
            Error::OutOfMemory(_) => ErrCode::ENoMem,
            Error::Mmap(_) => ErrCode::EMman,
            Error::Corrupt(_) => ErrCode::ETree,
            Error::Decode(_) => ErrCode::EIo,
        }
    }
}

/// HTM result type.
pub type Result<T> = std::result::Result<T, Error>;

use thiserror::Error;

/// Reportable failures. Broken invariants are not reported through this type, they panic.
#[derive(Error, Debug)]
pub enum Error {
    /// Reading or writing failed.
    #[error("i/o error: {0}")]
    // we let `thiserror` implement From<std::io::Error>
    Io(#[from] std::io::Error),
    /// The archive container could not be read or written.
    #[error("archive error: {0}")]
    Archive(#[from] zip::result::ZipError),
    /// An XML document could not be parsed or does not describe an automaton.
    #[error("xml: {0}")]
    Xml(String),
    /// A binary automaton did not start with the expected magic.
    #[error("bad magic, expected \"RWTHFSA\"")]
    BadMagic,
    /// A binary automaton was written with a format version we cannot read.
    #[error("unsupported format version {0}")]
    UnsupportedVersion(u32),
    /// The semiring named or tagged in the input is not known.
    #[error("unknown semiring \"{0}\"")]
    UnknownSemiring(String),
    /// The automaton type tag in the input is not known.
    #[error("unknown automaton type tag {0}")]
    UnknownType(u32),
    /// Two automata that have to agree on their semiring do not.
    #[error("inconsistent semirings: {0} vs. {1}")]
    SemiringMismatch(&'static str, &'static str),
    /// A textual input could not be parsed.
    #[error("line {line}: {message}")]
    Format {
        /// One-based line number of the offending input line.
        line: usize,
        /// What went wrong.
        message: String,
    },
    /// The requested entry does not exist.
    #[error("no entry \"{0}\" in archive")]
    MissingFile(String),
    /// An operation needs symbols but the automaton has no alphabet.
    #[error("automaton has no alphabet")]
    MissingAlphabet,
    /// The format cannot be read.
    #[error("format \"{0}\" does not support reading")]
    UnsupportedFormat(&'static str),
    /// The linear format needs an automaton with at most one arc per state.
    #[error("automaton is not linear")]
    NotLinear,
    /// Calling the graphviz binary failed.
    #[error("could not render dot representation: \"{0}\"")]
    Render(String),
}

/// Shorthand for results with [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

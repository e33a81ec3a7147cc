use std::error;
use std::fmt;
use std::io;
use std::path::PathBuf;




/**
 * Errors which stop a run. None of these are recovered from: the driver
 * reports them and aborts the whole process group.
 */
#[derive(Debug)]
pub enum Error {
    Usage(String),
    Io { path: PathBuf, source: io::Error },
    BadParameter { name: String, value: String },
    NegativeStartTime(f64),
    NoStoppingCriterion,
    Engine(String),
    Encode(String),
}




// ============================================================================
impl Error {
    pub fn io<P: Into<PathBuf>>(path: P, source: io::Error) -> Self {
        Error::Io { path: path.into(), source }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> Result<(), fmt::Error> {
        use Error::*;

        match self {
            Usage(msg) => write!(fmt, "{}", msg),
            Io { path, source } => write!(fmt, "{}: {}", path.display(), source),
            BadParameter { name, value } => write!(fmt, "bad value for parameter {}: '{}'", name, value),
            NegativeStartTime(t) => write!(fmt, "MUST SPECIFY a non-negative strt_time (got {})", t),
            NoStoppingCriterion => write!(fmt, "Exiting because neither max_step nor stop_time is non-negative."),
            Engine(msg) => write!(fmt, "engine failure: {}", msg),
            Encode(msg) => write!(fmt, "could not encode output: {}", msg),
        }
    }
}

impl error::Error for Error {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        match self {
            Error::Io { source, .. } => Some(source),
            _ => None,
        }
    }
}

use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

use ndarray::ShapeError;

use crate::initialization::RandErr;

/// The result type used in the entire crate.
pub type Result<T> = std::result::Result<T, SiameseErr>;

/// The crate's error type.
#[derive(Debug)]
pub enum SiameseErr {
    /// A tensor reached a layer with an unexpected size along some dimension.
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// The configuration can't produce a working model, caught before any forward pass.
    InvalidConfig(String),
    /// A parameter generator ran dry before filling a layer.
    ParamGenExhausted { got: usize, expected: usize },
    /// The requested initialization distribution is invalid.
    Init(RandErr),
    /// An ndarray reshape, concatenation or rank conversion failed.
    Shape(ShapeError),
    /// A JSON configuration couldn't be parsed.
    Json(serde_json::Error),
    /// A configuration file couldn't be read.
    Io(io::Error),
}

impl Display for SiameseErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SiameseErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch for {what}: got {got}, expected {expected}"),
            SiameseErr::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            SiameseErr::ParamGenExhausted { got, expected } => write!(
                f,
                "the parameter generator got exhausted, it produced {got} of the expected {expected} parameters"
            ),
            SiameseErr::Init(e) => write!(f, "invalid initialization: {e}"),
            SiameseErr::Shape(e) => write!(f, "shape error: {e}"),
            SiameseErr::Json(e) => write!(f, "invalid JSON: {e}"),
            SiameseErr::Io(e) => write!(f, "io error: {e}"),
        }
    }
}

impl Error for SiameseErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SiameseErr::Init(e) => Some(e),
            SiameseErr::Shape(e) => Some(e),
            SiameseErr::Json(e) => Some(e),
            SiameseErr::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ShapeError> for SiameseErr {
    fn from(value: ShapeError) -> Self {
        Self::Shape(value)
    }
}

impl From<RandErr> for SiameseErr {
    fn from(value: RandErr) -> Self {
        Self::Init(value)
    }
}

impl From<serde_json::Error> for SiameseErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<io::Error> for SiameseErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_loading_errors_keep_their_source() {
        let json = serde_json::from_str::<u32>("{").unwrap_err();
        let err = SiameseErr::from(json);
        assert!(err.to_string().starts_with("invalid JSON: "));
        assert!(err.source().is_some());

        let err = SiameseErr::from(io::Error::new(io::ErrorKind::NotFound, "missing"));
        assert_eq!(err.to_string(), "io error: missing");
        assert!(err.source().is_some());
    }
}

use std::path::PathBuf;

/// Coarse classification of an [`AqError`], used by callers that only care
/// which pipeline stage went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Unexpected file or JSON structure, missing named field, unparseable timestamp
    Format,
    /// Arrays that should share a shape do not
    ShapeMismatch,
    /// Self-inconsistent configuration (grid policy, empty inputs, ...)
    Config,
    /// Network or transport failure from a remote fetch
    Fetch,
    /// Failure while drawing a figure
    Render,
    /// Plain filesystem I/O
    Io,
    /// A broken invariant inside the pipeline itself
    Internal,
}

#[derive(Debug, thiserror::Error)]
pub enum AqError {
    #[error("Error reading netCDF file {file}: {nc_error}")]
    NetcdfError{nc_error: netcdf::error::Error, file: PathBuf},
    #[error("No group named '{grpname}' in {file}")]
    NetcdfMissingGroup{file: PathBuf, grpname: String},
    #[error("No variable named '{varname}' in {file}")]
    NetcdfMissingVar{file: PathBuf, varname: String},
    #[error("Error in shape of variable '{varname}' in {file}: {nd_error}")]
    NetcdfShapeError{file: PathBuf, varname: String, nd_error: ndarray::ShapeError},
    #[error("Variables in {file} disagree in shape: '{varname}' is {got:?}, expected {expected:?}")]
    FieldShapeMismatch{file: PathBuf, varname: String, expected: Vec<usize>, got: Vec<usize>},
    #[error("Cannot aggregate: input {index} has shape {got:?}, but the first input has shape {expected:?}")]
    ShapeMismatch{index: usize, expected: Vec<usize>, got: Vec<usize>},
    #[error("Value and mask arrays differ in shape: values {values:?}, mask {mask:?}")]
    MaskShapeMismatch{values: Vec<usize>, mask: Vec<usize>},
    #[error("Invalid grid configuration: {0}")]
    GridConfig(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Cannot parse timestamp '{value}' at position {index} of series '{series}'")]
    TimeParse{series: String, index: usize, value: String},
    #[error("Malformed payload from {source_name}: {reason}")]
    Payload{source_name: String, reason: String},
    #[error("Request to {url} failed: {reason}")]
    Fetch{url: String, reason: String},
    #[error("Rendering failed: {0}")]
    Render(String),
    #[error("Error reading configuration: {0}")]
    TomlDe(#[from] toml::de::Error),
    #[error("Error writing configuration: {0}")]
    TomlSer(#[from] toml::ser::Error),
    #[error("Error parsing JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Error writing delimited output: {0}")]
    Csv(#[from] csv::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error in pipeline code, cause: {0}")]
    InternalError(String),
}

impl AqError {
    pub fn from_nc_error(nc_error: netcdf::error::Error, file: PathBuf) -> Self {
        Self::NetcdfError { nc_error, file }
    }

    pub fn from_shape_error(nd_error: ndarray::ShapeError, file: PathBuf, varname: String) -> Self {
        Self::NetcdfShapeError { file, varname, nd_error }
    }

    pub fn from_render_error<E: std::fmt::Display>(e: E) -> Self {
        Self::Render(e.to_string())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetcdfError { .. }
            | Self::NetcdfMissingGroup { .. }
            | Self::NetcdfMissingVar { .. }
            | Self::NetcdfShapeError { .. }
            | Self::FieldShapeMismatch { .. }
            | Self::TimeParse { .. }
            | Self::Payload { .. }
            | Self::Json(_) => ErrorKind::Format,
            Self::ShapeMismatch { .. } | Self::MaskShapeMismatch { .. } => ErrorKind::ShapeMismatch,
            Self::GridConfig(_) | Self::Config(_) | Self::TomlDe(_) | Self::TomlSer(_) => ErrorKind::Config,
            Self::Fetch { .. } => ErrorKind::Fetch,
            Self::Render(_) => ErrorKind::Render,
            Self::Csv(_) | Self::IoError(_) => ErrorKind::Io,
            Self::InternalError(_) => ErrorKind::Internal,
        }
    }
}

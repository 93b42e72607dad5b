use thiserror::Error;

/// I/O errors that can occur when reading raster files
#[derive(Debug, Clone, Error)]
pub enum IoError {
    /// File does not exist
    #[error("File not found: {0}")]
    NotFound(String),

    /// Requested range exceeds resource bounds
    #[error("Range out of bounds: requested {requested} bytes at offset {offset}, size is {size}")]
    RangeOutOfBounds {
        offset: u64,
        requested: u64,
        size: u64,
    },

    /// Any other read failure
    #[error("Read error: {0}")]
    Read(String),
}

impl From<std::io::Error> for IoError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => IoError::NotFound(err.to_string()),
            _ => IoError::Read(err.to_string()),
        }
    }
}

/// Errors that can occur when parsing TIFF and GeoTIFF files
#[derive(Debug, Clone, Error)]
pub enum TiffError {
    /// I/O error while reading the file
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid TIFF magic bytes (not II or MM)
    #[error("Invalid TIFF magic bytes: expected 0x4949 (II) or 0x4D4D (MM), got 0x{0:04X}")]
    InvalidMagic(u16),

    /// Invalid TIFF version number
    #[error("Invalid TIFF version: expected 42 (TIFF) or 43 (BigTIFF), got {0}")]
    InvalidVersion(u16),

    /// Invalid BigTIFF offset byte size (must be 8)
    #[error("Invalid BigTIFF offset byte size: expected 8, got {0}")]
    InvalidBigTiffOffsetSize(u16),

    /// File is too small to contain a valid TIFF header
    #[error("File too small: need at least {required} bytes, got {actual}")]
    FileTooSmall { required: u64, actual: u64 },

    /// Invalid IFD offset (points outside file or to invalid location)
    #[error("Invalid IFD offset: {0}")]
    InvalidIfdOffset(u64),

    /// Required tag is missing from IFD
    #[error("Missing required tag: {0}")]
    MissingTag(&'static str),

    /// Tag has unexpected type or count
    #[error("Invalid tag value for {tag}: {message}")]
    InvalidTagValue { tag: &'static str, message: String },

    /// Unsupported compression scheme
    #[error("Unsupported compression: {0} (supported: none, deflate, JPEG)")]
    UnsupportedCompression(String),

    /// File uses strips instead of tiles
    #[error("Unsupported organization: file uses strips instead of tiles")]
    StripOrganization,

    /// Unknown field type in IFD entry
    #[error("Unknown field type: {0}")]
    UnknownFieldType(u16),

    /// Georeferencing or pixel layout this server cannot handle
    #[error("Unsupported raster: {0}")]
    UnsupportedRaster(String),
}

/// Errors raised by the SQLite tile store
#[derive(Debug, Error)]
pub enum StoreError {
    /// SQLite failure
    #[error("Database error: {0}")]
    Sql(#[from] sqlx::Error),

    /// The file has neither the deduplicated nor the flat tile layout
    #[error("Not a tile database: {0}")]
    InvalidLayout(String),

    /// Writes are only supported on the deduplicated layout
    #[error("Tile database is read-only: {0}")]
    ReadOnly(String),

    /// Background work for a write did not complete
    #[error("Tile store task failed: {0}")]
    Task(String),
}

/// Errors raised while initializing a tile source.
///
/// A source that fails to initialize is excluded from the registry.
#[derive(Debug, Error)]
pub enum SourceError {
    /// Missing or malformed configuration value
    #[error("Configuration error in source '{id}': {message}")]
    Configuration { id: String, message: String },

    /// Raster file could not be opened or is unsupported
    #[error("Raster error: {0}")]
    Raster(#[from] TiffError),

    /// Local file could not be opened
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Tile store could not be opened
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// PostGIS connection or catalog query failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl SourceError {
    pub fn configuration(id: impl Into<String>, message: impl Into<String>) -> Self {
        SourceError::Configuration {
            id: id.into(),
            message: message.into(),
        }
    }
}

/// Errors that can occur while serving a tile or rendering a map
#[derive(Debug, Error)]
pub enum TileError {
    /// No source with this identifier is registered
    #[error("Source not found: {id}")]
    SourceNotFound { id: String },

    /// Upstream server could not be reached or returned garbage
    #[error("Upstream failure: {message}")]
    Upstream { message: String },

    /// Tile store failure
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Raster read failure
    #[error("Raster error: {0}")]
    Raster(#[from] TiffError),

    /// Local file read failure
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// PostGIS query failure
    #[error("Database error: {message}")]
    Database { message: String },

    /// Request parameters are malformed or out of range
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    /// Requested output format cannot be produced from this source
    #[error("Unsupported format: {message}")]
    UnsupportedFormat { message: String },

    /// Error decoding image data
    #[error("Decode error: {message}")]
    DecodeError { message: String },

    /// Error encoding output image
    #[error("Encode error: {message}")]
    EncodeError { message: String },

    /// The request was abandoned before the fetch completed
    #[error("Request cancelled")]
    Cancelled,
}

impl TileError {
    pub fn invalid_request(message: impl Into<String>) -> Self {
        TileError::InvalidRequest {
            message: message.into(),
        }
    }
}

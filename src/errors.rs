use thiserror::Error;

#[derive(Error, Debug)]
pub enum HistogramError {
    #[error("Invalid bins count {count}: must be between 1 and {max}")]
    InvalidBinsCount { count: u64, max: u32 },

    #[error("Invalid buffer pool size {size}: at least one buffer is required")]
    InvalidPoolSize { size: usize },

    #[error("Texture has no pixels ({width}x{height})")]
    EmptyTexture { width: u32, height: u32 },

    #[error("Texture data size mismatch: {width}x{height} needs {expected} bytes, got {actual}")]
    TextureSizeMismatch {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },

    #[error("Histogram buffer size mismatch: expected {expected} cells, got {actual}")]
    BufferSizeMismatch { expected: usize, actual: usize },

    #[error("No suitable GPU adapter found")]
    NoAdapter,

    #[error("GPU device request failed: {source}")]
    RequestDevice {
        #[from]
        source: wgpu::RequestDeviceError,
    },

    #[error("GPU buffer mapping failed: {source}")]
    BufferMap {
        #[from]
        source: wgpu::BufferAsyncError,
    },

    #[error("GPU processing error: {message}")]
    Gpu { message: String },

    #[error("Image error: {source}")]
    Image {
        #[from]
        source: image::ImageError,
    },

    #[error("IO error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },

    #[error("JSON parsing error: {source}")]
    Json {
        #[from]
        source: serde_json::Error,
    },

    #[error("Settings error: {message}")]
    Settings { message: String },

    #[error("Invalid operation: {message}")]
    InvalidOperation { message: String },
}

pub type Result<T> = std::result::Result<T, HistogramError>;

impl HistogramError {
    pub(crate) fn gpu(message: impl Into<String>) -> Self {
        HistogramError::Gpu {
            message: message.into(),
        }
    }

    /// Returns true if the caller can simply retry with the next frame.
    ///
    /// Configuration errors are not recoverable: the same input fails the same way.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            HistogramError::BufferMap { .. } | HistogramError::Gpu { .. } | HistogramError::Io { .. }
        )
    }

    /// True for errors raised while validating a configuration or input, before any dispatch.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            HistogramError::InvalidBinsCount { .. }
                | HistogramError::InvalidPoolSize { .. }
                | HistogramError::EmptyTexture { .. }
                | HistogramError::TextureSizeMismatch { .. }
                | HistogramError::BufferSizeMismatch { .. }
        )
    }

    /// Returns a user-friendly error message with recovery suggestions
    pub fn user_message(&self) -> String {
        let base_message = self.to_string();
        let suggestion = match self {
            HistogramError::InvalidBinsCount { .. } => "Pick a bins count such as 64, 128 or 256.",
            HistogramError::InvalidPoolSize { .. } => "Use a pool of two or three buffers.",
            HistogramError::EmptyTexture { .. } => "Provide an image with at least one pixel.",
            HistogramError::TextureSizeMismatch { .. } => {
                "Check the frame dimensions and the row stride of the source buffer."
            }
            HistogramError::BufferSizeMismatch { .. } => {
                "Reconfigure the pipeline so the histogram buffer matches the bins count."
            }
            HistogramError::NoAdapter | HistogramError::RequestDevice { .. } => {
                "No usable GPU was found. Use the CPU backend instead."
            }
            HistogramError::BufferMap { .. } | HistogramError::Gpu { .. } => {
                "The frame was dropped. The next frame will be processed normally."
            }
            HistogramError::Image { .. } => "The image file may be corrupted or in an unsupported format.",
            HistogramError::Io { .. } => "File system error occurred. Check the path and permissions.",
            HistogramError::Json { .. } | HistogramError::Settings { .. } => {
                "The settings file is invalid. Delete it to restore defaults."
            }
            HistogramError::InvalidOperation { .. } => "An unexpected error occurred.",
        };

        format!("{}\n\n{}", base_message, suggestion)
    }

    /// Returns an error code for programmatic handling
    pub fn error_code(&self) -> &'static str {
        match self {
            HistogramError::InvalidBinsCount { .. } => "INVALID_BINS_COUNT",
            HistogramError::InvalidPoolSize { .. } => "INVALID_POOL_SIZE",
            HistogramError::EmptyTexture { .. } => "EMPTY_TEXTURE",
            HistogramError::TextureSizeMismatch { .. } => "TEXTURE_SIZE_MISMATCH",
            HistogramError::BufferSizeMismatch { .. } => "BUFFER_SIZE_MISMATCH",
            HistogramError::NoAdapter => "NO_ADAPTER",
            HistogramError::RequestDevice { .. } => "REQUEST_DEVICE",
            HistogramError::BufferMap { .. } => "BUFFER_MAP",
            HistogramError::Gpu { .. } => "GPU_ERROR",
            HistogramError::Image { .. } => "IMAGE_ERROR",
            HistogramError::Io { .. } => "IO_ERROR",
            HistogramError::Json { .. } => "JSON_ERROR",
            HistogramError::Settings { .. } => "SETTINGS_ERROR",
            HistogramError::InvalidOperation { .. } => "INVALID_OPERATION",
        }
    }

    /// Logs the error at a level matching its severity
    pub fn log(&self) {
        if self.is_recoverable() {
            tracing::warn!(code = self.error_code(), "{}", self);
        } else {
            tracing::error!(code = self.error_code(), "{}", self);
        }
    }
}

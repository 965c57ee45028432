/// Maximum length of a resource path in bytes.
pub const MAX_PATH_LEN: usize = 512;

/// Reasons an upload file name is rejected.
#[derive(Debug, PartialEq, Eq)]
pub enum FilenameError {
    /// Filename is empty or whitespace-only.
    Empty,
    /// Filename contains path separators (`/` or `\`).
    ContainsPathSeparator,
    /// Filename is `..`.
    PathTraversal,
    /// Filename contains null bytes.
    NullByte,
    /// Filename starts with a dot (hidden file).
    Hidden,
    /// Filename contains control characters (CR, LF, etc.).
    ControlCharacter,
    /// Filename contains characters outside `a-zA-Z0-9-_.` after normalization.
    InvalidCharacter,
    /// Filename is longer than [`MAX_PATH_LEN`].
    TooLong,
}

impl FilenameError {
    /// Returns a human-readable error message.
    pub fn message(&self) -> &'static str {
        match self {
            Self::Empty => "Filename cannot be empty",
            Self::ContainsPathSeparator => "Invalid filename: path separators are not allowed",
            Self::PathTraversal => "Invalid filename: '..' is not allowed",
            Self::NullByte => "Invalid filename: null bytes are not allowed",
            Self::Hidden => "Invalid filename: hidden files (starting with '.') are not allowed",
            Self::ControlCharacter => "Invalid filename: control characters are not allowed",
            Self::InvalidCharacter => {
                "Invalid filename: only a-z, A-Z, 0-9, '-', '_', '.' and spaces are allowed"
            }
            Self::TooLong => "Invalid filename: longer than 512 characters",
        }
    }
}

/// Validates a flat filename (no directory components allowed).
pub fn validate_flat_filename(filename: &str) -> Result<&str, FilenameError> {
    let trimmed = filename.trim();

    if trimmed.is_empty() {
        return Err(FilenameError::Empty);
    }

    if trimmed.contains('\0') {
        return Err(FilenameError::NullByte);
    }

    if trimmed.chars().any(|c| c.is_ascii_control()) {
        return Err(FilenameError::ControlCharacter);
    }

    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(FilenameError::ContainsPathSeparator);
    }

    if trimmed == ".." {
        return Err(FilenameError::PathTraversal);
    }

    if trimmed.starts_with('.') {
        return Err(FilenameError::Hidden);
    }

    Ok(trimmed)
}

/// Turn a client-supplied file name into the resource path it is stored under.
///
/// Runs of whitespace become a single `_`; everything else must already be
/// within the path alphabet.
pub fn normalize_upload_name(filename: &str) -> Result<String, FilenameError> {
    let flat = validate_flat_filename(filename)?;

    let normalized = flat.split_whitespace().collect::<Vec<_>>().join("_");

    if normalized.len() > MAX_PATH_LEN {
        return Err(FilenameError::TooLong);
    }
    if !normalized.chars().all(is_path_char) {
        return Err(FilenameError::InvalidCharacter);
    }

    Ok(normalized)
}

fn is_path_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '/' | '-' | '_' | '.')
}

/// Checks if a path string contains path traversal patterns.
pub fn contains_path_traversal(path: &str) -> bool {
    path == ".."
        || path.starts_with("../")
        || path.contains("/../")
        || path.ends_with("/..")
        || path.starts_with("..\\")
        || path.contains("\\..\\")
        || path.ends_with("\\..")
}

/// Validates a backend-relative resource path.
pub fn validate_virtual_path(path: &str) -> Result<String, &'static str> {
    let trimmed = path.trim();

    if trimmed.is_empty() {
        return Err("Path cannot be empty");
    }

    if trimmed.len() > MAX_PATH_LEN {
        return Err("Path exceeds maximum length of 512 characters");
    }

    if trimmed.contains('\0') {
        return Err("Path must not contain null bytes");
    }

    if trimmed.contains('\\') {
        return Err("Path must not contain backslashes");
    }

    if trimmed.starts_with('/') {
        return Err("Path must not start with '/'");
    }

    if trimmed.ends_with('/') {
        return Err("Path must not end with '/'");
    }

    if trimmed.contains("//") {
        return Err("Path must not contain consecutive slashes");
    }

    if contains_path_traversal(trimmed) {
        return Err("Path must not contain '..' traversal");
    }

    for segment in trimmed.split('/') {
        if segment.is_empty() {
            return Err("Path must not contain empty segments");
        }
        if segment.starts_with('.') {
            return Err("Path segments must not start with '.'");
        }
    }

    if !trimmed.chars().all(is_path_char) {
        return Err("Path contains invalid characters (allowed: a-zA-Z0-9, /, -, _, .)");
    }

    Ok(trimmed.to_string())
}

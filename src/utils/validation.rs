use anyhow::{Result, anyhow};
use std::path::Path;
use uuid::Uuid;

/// Longest filename kept in a storage key (bytes)
pub const MAX_FILENAME_LEN: usize = 200;

/// Bytes inspected at the start of an upload for type sniffing
pub const SNIFF_HEADER_LEN: usize = 1024;

/// Extensions that never make sense as pipeline input
pub const BLOCKED_EXTENSIONS: &[&str] = &[
    "exe", "dll", "so", "dylib", "bat", "cmd", "sh", "ps1", "msi", "com", "scr", "jar",
];

#[derive(Debug, Clone)]
pub struct ValidationError {
    pub code: &'static str,
    pub message: String,
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ValidationError {}

/// Reduces a client-supplied filename to a single safe path component.
pub fn sanitize_filename(filename: &str) -> Result<String> {
    // Browsers on Windows may send backslash-separated paths
    let normalized = filename.replace('\\', "/");
    let name = Path::new(&normalized)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("")
        .trim();

    if name.is_empty() {
        return Err(anyhow!(ValidationError {
            code: "INVALID_FILENAME",
            message: "Filename cannot be empty".to_string(),
        }));
    }

    if normalized.contains("..") || normalized.contains('/') {
        tracing::warn!("Path components stripped from upload filename: {}", filename);
    }

    let sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_control()
                || c.is_whitespace()
                || matches!(c, ':' | '*' | '?' | '"' | '<' | '>' | '|' | ';' | '%')
            {
                '_'
            } else {
                c
            }
        })
        .collect();

    let sanitized = if sanitized.len() > MAX_FILENAME_LEN {
        let mut end = MAX_FILENAME_LEN;
        while !sanitized.is_char_boundary(end) {
            end -= 1;
        }
        sanitized[..end].to_string()
    } else {
        sanitized
    };

    if sanitized.starts_with('.') {
        return Err(anyhow!(ValidationError {
            code: "HIDDEN_FILE",
            message: "Hidden files (starting with '.') are not allowed".to_string(),
        }));
    }

    if let Some(ext) = Path::new(&sanitized).extension().and_then(|e| e.to_str()) {
        let ext_lower = ext.to_lowercase();
        if BLOCKED_EXTENSIONS.contains(&ext_lower.as_str()) {
            return Err(anyhow!(ValidationError {
                code: "BLOCKED_EXTENSION",
                message: format!("File extension '.{}' is not allowed", ext_lower),
            }));
        }
    }

    Ok(sanitized)
}

/// Parses a client-chosen image identifier into canonical UUID form.
pub fn parse_image_id(raw: &str) -> Result<String> {
    Uuid::parse_str(raw.trim())
        .map(|id| id.hyphenated().to_string())
        .map_err(|_| {
            anyhow!(ValidationError {
                code: "INVALID_IMAGE_ID",
                message: format!("'{}' is not a valid UUID", raw),
            })
        })
}

/// Rejects payloads that start with a native executable signature.
pub fn reject_executable_content(header: &[u8]) -> Result<()> {
    const SIGNATURES: &[&[u8]] = &[
        b"MZ",                 // PE
        b"\x7fELF",            // ELF
        b"\xcf\xfa\xed\xfe",   // Mach-O 64
        b"\xce\xfa\xed\xfe",   // Mach-O 32
        b"#!",                 // scripts
    ];

    if SIGNATURES.iter().any(|sig| header.starts_with(sig)) {
        return Err(anyhow!(ValidationError {
            code: "EXECUTABLE_CONTENT",
            message: "File contains executable content which is not allowed".to_string(),
        }));
    }
    Ok(())
}

/// Content type from magic bytes, falling back to the declared one.
pub fn detect_content_type(header: &[u8], declared: Option<&str>) -> Option<String> {
    infer::get(header)
        .map(|kind| kind.mime_type().to_string())
        .or_else(|| {
            declared
                .and_then(|d| d.parse::<mime::Mime>().ok())
                .filter(|m| *m != mime::APPLICATION_OCTET_STREAM)
                .map(|m| m.essence_str().to_string())
        })
}

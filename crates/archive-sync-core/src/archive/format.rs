//! Archive format code resolution

use crate::models::ArchiveFormat;
use crate::util::file_extension;

/// Resolves archive format codes from declared types and file names
#[derive(Debug, Clone, Default)]
pub struct ArchiveFormatResolver {
    formats: Vec<ArchiveFormat>,
}

impl ArchiveFormatResolver {
    pub const fn new(formats: Vec<ArchiveFormat>) -> Self {
        Self { formats }
    }

    /// Format matching a mime type or file extension, case-insensitively
    pub fn by_type(&self, declared_type: &str) -> Option<&ArchiveFormat> {
        let declared_type = declared_type.trim().trim_start_matches('.');
        if declared_type.is_empty() {
            return None;
        }
        self.formats.iter().find(|format| {
            format
                .mime_type
                .as_deref()
                .is_some_and(|mime| mime.eq_ignore_ascii_case(declared_type))
                || format
                    .file_extension
                    .as_deref()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case(declared_type))
                || format.code.eq_ignore_ascii_case(declared_type)
        })
    }

    /// Resolve a format code.
    ///
    /// A declared type wins over the file name's extension.
    pub fn resolve(&self, declared_type: Option<&str>, file_name: &str) -> Option<String> {
        if let Some(format) = declared_type.and_then(|declared| self.by_type(declared)) {
            return Some(format.code.clone());
        }
        let extension = file_extension(file_name)?;
        self.by_type(&extension).map(|format| format.code.clone())
    }
}

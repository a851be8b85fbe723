use std::path::Path;

/// File contents plus the metadata sent alongside them on upload.
#[derive(Debug, Clone, PartialEq)]
pub struct FileUpload {
    pub name: String,
    /// Empty when unknown; the receiving side then records a generic type.
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl FileUpload {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    /// Read a file from disk, naming it after the file and guessing its type
    /// from the extension.
    pub async fn from_path(path: &Path) -> Result<Self, String> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown")
            .to_string();
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| format!("Failed to read {}: {}", path.display(), e))?;
        Ok(Self {
            mime_type: mime_for_path(path).to_string(),
            name,
            bytes,
        })
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

pub fn mime_for_path(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "doc" => "application/msword",
        "txt" => "text/plain",
        "md" | "markdown" => "text/markdown",
        "csv" => "text/csv",
        "json" => "application/json",
        _ => "",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mime_for_known_extensions() {
        assert_eq!(mime_for_path(Path::new("Annual Report.PDF")), "application/pdf");
        assert_eq!(mime_for_path(Path::new("notes.markdown")), "text/markdown");
        assert_eq!(mime_for_path(Path::new("archive.tar.gz")), "");
        assert_eq!(mime_for_path(Path::new("README")), "");
    }

    #[tokio::test]
    async fn test_from_path_reads_bytes() {
        let path = std::env::temp_dir().join(format!("rag-desk-{}.txt", uuid::Uuid::new_v4()));
        tokio::fs::write(&path, b"meeting notes").await.unwrap();

        let upload = FileUpload::from_path(&path).await.unwrap();
        assert!(upload.name.ends_with(".txt"));
        assert_eq!(upload.mime_type, "text/plain");
        assert_eq!(upload.size(), 13);

        tokio::fs::remove_file(&path).await.ok();
    }

    #[tokio::test]
    async fn test_from_path_missing_file() {
        let err = FileUpload::from_path(Path::new("/definitely/not/here.pdf"))
            .await
            .unwrap_err();
        assert!(err.starts_with("Failed to read"));
    }
}

//! File system helpers: served content and configuration files

use std::path::{Path, PathBuf};

use serde_json::Value;

pub struct FileSystemHelper;

impl FileSystemHelper {
    /// Write `contents` to `dir/relative`, creating parent directories
    pub fn write_file(
        dir: &Path,
        relative: &str,
        contents: impl AsRef<[u8]>,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let filepath = dir.join(relative);
        if let Some(parent) = filepath.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&filepath, contents)?;
        Ok(filepath)
    }

    pub fn create_html_file(
        dir: &Path,
        filename: &str,
        title: &str,
        body_content: &str,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let content = format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <title>{}</title>
</head>
<body>
    {}
</body>
</html>"#,
            title, body_content
        );
        Self::write_file(dir, filename, content)
    }

    /// `size` bytes of a repeating, position-dependent pattern
    pub fn create_binary_file(
        dir: &Path,
        filename: &str,
        size: usize,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        Self::write_file(dir, filename, Self::pattern(size))
    }

    pub fn pattern(size: usize) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    pub fn create_json_file(
        dir: &Path,
        filename: &str,
        data: &Value,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let content = serde_json::to_string_pretty(data)?;
        Self::write_file(dir, filename, content)
    }

    /// `{"version": ..., "app": {...}}` in JSON
    pub fn create_config_file(
        dir: &Path,
        filename: &str,
        app: &Value,
    ) -> Result<PathBuf, Box<dyn std::error::Error>> {
        let config = serde_json::json!({ "version": "1.0", "app": app });
        Self::create_json_file(dir, filename, &config)
    }

    pub fn create_test_structure(
        base_dir: &Path,
        structure: &TestStructure,
    ) -> Result<(), Box<dyn std::error::Error>> {
        for (path, content) in &structure.files {
            match content {
                FileContent::Html { title, body } => {
                    Self::create_html_file(base_dir, path, title, body)?;
                }
                FileContent::Text(text) => {
                    Self::write_file(base_dir, path, text)?;
                }
                FileContent::Binary(data) => {
                    Self::write_file(base_dir, path, data)?;
                }
            }
        }
        for dir in &structure.dirs {
            std::fs::create_dir_all(base_dir.join(dir))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub enum FileContent {
    Html { title: String, body: String },
    Text(String),
    Binary(Vec<u8>),
}

/// Declarative description of a served tree
#[derive(Debug, Clone, Default)]
pub struct TestStructure {
    pub files: Vec<(String, FileContent)>,
    pub dirs: Vec<String>,
}

impl TestStructure {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_html_file(mut self, path: &str, title: &str, body: &str) -> Self {
        self.files.push((
            path.to_string(),
            FileContent::Html {
                title: title.to_string(),
                body: body.to_string(),
            },
        ));
        self
    }

    pub fn add_text_file(mut self, path: &str, text: &str) -> Self {
        self.files
            .push((path.to_string(), FileContent::Text(text.to_string())));
        self
    }

    pub fn add_binary_file(mut self, path: &str, data: Vec<u8>) -> Self {
        self.files.push((path.to_string(), FileContent::Binary(data)));
        self
    }

    pub fn add_dir(mut self, path: &str) -> Self {
        self.dirs.push(path.to_string());
        self
    }

    /// `a.txt` (10 bytes), `sub/`, `site/index.html` and a few typed files
    pub fn standard() -> Self {
        Self::new()
            .add_text_file("a.txt", "0123456789")
            .add_dir("sub")
            .add_html_file("site/index.html", "Site", "<h1>Welcome</h1>")
            .add_text_file("style.css", "body { background-color: #fff; }")
            .add_text_file("data.json", "{\"key\": \"value\"}")
            .add_text_file("notes & <draft>.txt", "escaped")
    }
}

//! Response archive - numbered Markdown files, one per analysis

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::PathBuf;

use tracing::debug;

use crate::agent::Usage;
use crate::Result;

/// Directory of archived answers named `1.md`, `2.md`, ...
pub struct ResponseArchive {
    dir: PathBuf,
}

impl ResponseArchive {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Number of archived entries
    pub fn count(&self) -> Result<usize> {
        if !self.dir.exists() {
            return Ok(0);
        }

        let mut count = 0;
        for entry in std::fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.is_file() && path.extension().is_some_and(|ext| ext == "md") {
                count += 1;
            }
        }
        Ok(count)
    }

    /// Archive one answer under the next free number
    pub fn save(&self, usage: &Usage, prompt: &str, answer: &str) -> Result<PathBuf> {
        std::fs::create_dir_all(&self.dir)?;

        let content = format!(
            "TokensUsage:\n{}\n\nPrompt:\n{}\n\nResponse:\n{}",
            usage, prompt, answer
        );

        let mut n = self.count()? + 1;
        loop {
            let path = self.dir.join(format!("{}.md", n));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    file.write_all(content.as_bytes())?;
                    debug!("Archived response to {:?}", path);
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => n += 1,
                Err(e) => return Err(e.into()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_numbering_starts_at_one() {
        let tmp = TempDir::new().unwrap();
        let archive = ResponseArchive::new(tmp.path().join("responses"));

        let first = archive.save(&Usage::new(1, 2), "prompt", "answer").unwrap();
        let second = archive.save(&Usage::new(1, 2), "prompt", "answer").unwrap();

        assert_eq!(first.file_name().unwrap(), "1.md");
        assert_eq!(second.file_name().unwrap(), "2.md");
        assert_eq!(archive.count().unwrap(), 2);
    }

    #[test]
    fn test_skips_taken_numbers() {
        let tmp = TempDir::new().unwrap();
        // One entry, but it already occupies the next number
        std::fs::write(tmp.path().join("2.md"), "old").unwrap();
        let archive = ResponseArchive::new(tmp.path());

        let path = archive.save(&Usage::default(), "p", "a").unwrap();

        assert_eq!(path.file_name().unwrap(), "3.md");
        assert_eq!(std::fs::read_to_string(tmp.path().join("2.md")).unwrap(), "old");
    }

    #[test]
    fn test_content_layout() {
        let tmp = TempDir::new().unwrap();
        let archive = ResponseArchive::new(tmp.path());

        let path = archive.save(&Usage::new(10, 5), "Check ad", "Rating: safe").unwrap();
        let content = std::fs::read_to_string(path).unwrap();

        assert_eq!(
            content,
            "TokensUsage:\nPrompt: 10, Candidates: 5, Total: 15\n\nPrompt:\nCheck ad\n\nResponse:\nRating: safe"
        );
    }
}

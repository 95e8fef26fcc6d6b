/*
 * Token estimates for a rendered export. `TokenCounterOperations` abstracts the
 * tokenizer so the session can be tested without loading BPE tables.
 * `CoreTikTokenCounter` uses the `cl100k_base` encoding from `tiktoken-rs`;
 * `SimpleWhitespaceTokenCounter` counts whitespace-separated words and also
 * serves as the fallback when the encoding cannot be loaded.
 */
use crate::core::exporter::{self, DumpHeader};
use std::io;
use std::path::PathBuf;
use tiktoken_rs::{CoreBPE, cl100k_base};

pub trait TokenCounterOperations: Send + Sync {
    fn count_tokens(&self, text: &str) -> usize;
}

pub struct CoreTikTokenCounter {
    bpe: Option<CoreBPE>,
}

impl CoreTikTokenCounter {
    /* Loads the encoding once. A load failure is logged and word counting is used instead. */
    pub fn new() -> Self {
        let bpe = match cl100k_base() {
            Ok(bpe) => Some(bpe),
            Err(e) => {
                log::error!(
                    "TokenCounter: Failed to load cl100k_base: {e:?}. Falling back to whitespace count."
                );
                None
            }
        };
        CoreTikTokenCounter { bpe }
    }
}

impl Default for CoreTikTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounterOperations for CoreTikTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        match &self.bpe {
            Some(bpe) => bpe.encode_with_special_tokens(text).len(),
            None => text.split_whitespace().count(),
        }
    }
}

pub struct SimpleWhitespaceTokenCounter;

impl SimpleWhitespaceTokenCounter {
    pub fn new() -> Self {
        SimpleWhitespaceTokenCounter
    }
}

impl Default for SimpleWhitespaceTokenCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenCounterOperations for SimpleWhitespaceTokenCounter {
    fn count_tokens(&self, text: &str) -> usize {
        text.split_whitespace().count()
    }
}

/* Renders the dump for `files` in memory and counts its tokens. */
pub fn estimate_dump_tokens(
    counter: &dyn TokenCounterOperations,
    files: &[PathBuf],
    header: &DumpHeader,
) -> io::Result<usize> {
    let mut rendered: Vec<u8> = Vec::new();
    exporter::write_dump(&mut rendered, files, header)?;
    let tokens = counter.count_tokens(&String::from_utf8_lossy(&rendered));
    log::debug!(
        "TokenCounter: {} files render to {} bytes, ~{tokens} tokens.",
        files.len(),
        rendered.len()
    );
    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;
    use time::OffsetDateTime;

    #[test]
    fn test_whitespace_counter() {
        let counter = SimpleWhitespaceTokenCounter::new();
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("  public  class\tFoo\r\n{ }"), 5);
    }

    #[test]
    fn test_tiktoken_counter() {
        let counter = CoreTikTokenCounter::new();
        assert_eq!(counter.count_tokens(""), 0);
        assert_eq!(counter.count_tokens("hello world"), 2);

        let text = "tiktoken is great\nfun";
        let tokens = counter.count_tokens(text);
        assert_eq!(tokens, 7);
        assert!(tokens < text.len());
    }

    #[test]
    fn test_estimate_counts_header_markers_and_content() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("a.cs");
        fs::write(&file, "one two three\n").unwrap();
        let header = DumpHeader {
            generated_at: OffsetDateTime::UNIX_EPOCH,
            solution_file_name: "S.sln".to_string(),
            solution_dir: dir.path().to_path_buf(),
        };

        let counter = SimpleWhitespaceTokenCounter::new();
        let empty = estimate_dump_tokens(&counter, &[], &header).unwrap();
        let with_file = estimate_dump_tokens(&counter, &[file], &header).unwrap();
        // "=====", "FILE:", "a.cs", "=====" plus three words of content.
        assert_eq!(with_file - empty, 7);
    }
}

//! Test corpus: the fixed set of messages injected into the pipeline.

use std::path::Path;

use serde::Deserialize;

use crate::error::CorpusError;

/// One immutable test case from the corpus file. Never mutated after load.
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    /// Stable case identifier, e.g. `case_001`.
    pub id: String,
    pub subject: String,
    pub sender: String,
    pub body: String,
    /// Ground-truth category label.
    pub expected_category: String,
}

/// Load the corpus from a JSON array of test cases.
pub fn load_corpus(path: impl AsRef<Path>) -> Result<Vec<TestCase>, CorpusError> {
    let path = path.as_ref();
    let display = path.display().to_string();

    let raw = std::fs::read_to_string(path).map_err(|source| CorpusError::Io {
        path: display.clone(),
        source,
    })?;

    let cases: Vec<TestCase> =
        serde_json::from_str(&raw).map_err(|source| CorpusError::Parse {
            path: display.clone(),
            source,
        })?;

    if cases.is_empty() {
        return Err(CorpusError::Empty { path: display });
    }

    Ok(cases)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_corpus(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file
    }

    #[test]
    fn load_valid_corpus() {
        let file = write_corpus(
            r#"[{
                "id": "case_001",
                "subject": "Invoice 42",
                "sender": "billing@example.com",
                "body": "Please find attached.",
                "expected_category": "invoice"
            }]"#,
        );
        let cases = load_corpus(file.path()).unwrap();
        assert_eq!(cases.len(), 1);
        assert_eq!(cases[0].id, "case_001");
        assert_eq!(cases[0].expected_category, "invoice");
    }

    #[test]
    fn empty_corpus_is_an_error() {
        let file = write_corpus("[]");
        assert!(matches!(
            load_corpus(file.path()),
            Err(CorpusError::Empty { .. })
        ));
    }

    #[test]
    fn malformed_corpus_is_an_error() {
        let file = write_corpus("{not json");
        assert!(matches!(
            load_corpus(file.path()),
            Err(CorpusError::Parse { .. })
        ));
    }

    #[test]
    fn missing_file_is_an_error() {
        assert!(matches!(
            load_corpus("/nonexistent/corpus.json"),
            Err(CorpusError::Io { .. })
        ));
    }
}

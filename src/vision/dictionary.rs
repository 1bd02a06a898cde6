//! Glyph dictionary for the recognition model's output classes
//!
//! Class 0 is the blank; class `i > 0` decodes to `glyphs[i]`. A dictionary
//! is loaded once and shared read-only by every recognition call.

use std::path::Path;
use tracing::info;

use crate::config::DictionaryConfig;
use crate::error::InitError;

/// Index of the reserved "no glyph" class
pub const BLANK: usize = 0;

/// Ordered glyph table, one entry per model output class
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dictionary {
    glyphs: Vec<String>,
}

impl Dictionary {
    /// Build from a full class table whose entry 0 is the blank
    pub fn new<I, S>(glyphs: I) -> Result<Self, InitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let glyphs: Vec<String> = glyphs.into_iter().map(Into::into).collect();
        if glyphs.is_empty() {
            return Err(InitError::Config(
                "dictionary needs at least the blank class".to_string(),
            ));
        }
        Ok(Self { glyphs })
    }

    /// Build from a glyph list as found in model dictionary files
    pub fn from_glyphs<I, S>(glyphs: I, prepend_blank: bool, append_space: bool) -> Result<Self, InitError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut table = Vec::new();
        if prepend_blank {
            table.push(String::new());
        }
        table.extend(glyphs.into_iter().map(Into::into));
        if append_space {
            table.push(" ".to_string());
        }
        Self::new(table)
    }

    /// Load a `.txt` (one glyph per line) or `.json` (array of strings) dictionary
    pub fn from_file(path: &Path, prepend_blank: bool, append_space: bool) -> Result<Self, InitError> {
        let dict_err = |message: String| InitError::Dictionary {
            path: path.to_path_buf(),
            message,
        };

        let content = std::fs::read_to_string(path).map_err(|e| dict_err(e.to_string()))?;

        let is_json = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
        let glyphs: Vec<String> = if is_json {
            serde_json::from_str(&content).map_err(|e| dict_err(e.to_string()))?
        } else {
            content.lines().map(str::to_string).collect()
        };

        if glyphs.is_empty() {
            return Err(dict_err("dictionary file lists no glyphs".to_string()));
        }

        let dictionary = Self::from_glyphs(glyphs, prepend_blank, append_space)?;
        info!(
            "Loaded dictionary from {:?}: {} classes",
            path,
            dictionary.num_classes()
        );
        Ok(dictionary)
    }

    /// Load the dictionary named by a config section
    pub fn from_config(config: &DictionaryConfig) -> Result<Self, InitError> {
        let path = config
            .path
            .as_deref()
            .ok_or_else(|| InitError::Config("no dictionary path configured".to_string()))?;
        Self::from_file(path, config.prepend_blank, config.append_space)
    }

    /// Number of model output classes this dictionary covers, blank included
    pub fn num_classes(&self) -> usize {
        self.glyphs.len()
    }

    /// Glyph for a class index; `None` for the blank and out-of-range indices
    pub fn glyph(&self, index: usize) -> Option<&str> {
        if index == BLANK {
            return None;
        }
        self.glyphs.get(index).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_in_memory_table() {
        let dict = Dictionary::new(["_", "a", "b"]).unwrap();

        assert_eq!(dict.num_classes(), 3);
        assert_eq!(dict.glyph(BLANK), None);
        assert_eq!(dict.glyph(2), Some("b"));
        assert_eq!(dict.glyph(3), None);
    }

    #[test]
    fn test_empty_table_rejected() {
        assert!(Dictionary::new(Vec::<String>::new()).is_err());
    }

    #[test]
    fn test_from_glyphs_blank_and_space() {
        let dict = Dictionary::from_glyphs(["a", "b"], true, true).unwrap();

        assert_eq!(dict.num_classes(), 4);
        assert_eq!(dict.glyph(1), Some("a"));
        assert_eq!(dict.glyph(3), Some(" "));
    }

    #[test]
    fn test_read_txt_dictionary() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "0\r\n1\n你\n").unwrap();

        let dict = Dictionary::from_file(file.path(), true, false).unwrap();

        assert_eq!(dict.num_classes(), 4);
        assert_eq!(dict.glyph(1), Some("0"));
        assert_eq!(dict.glyph(3), Some("你"));
    }

    #[test]
    fn test_read_json_dictionary() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, r#"["blank", "x", "y"]"#).unwrap();

        let dict = Dictionary::from_file(file.path(), false, false).unwrap();

        assert_eq!(dict.num_classes(), 3);
        assert_eq!(dict.glyph(2), Some("y"));
    }

    #[test]
    fn test_invalid_json_dictionary() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(file, "not json").unwrap();

        assert!(matches!(
            Dictionary::from_file(file.path(), true, false),
            Err(InitError::Dictionary { .. })
        ));
    }

    #[test]
    fn test_missing_dictionary_file() {
        let result = Dictionary::from_file(Path::new("/nonexistent/dict.txt"), true, false);
        assert!(matches!(result, Err(InitError::Dictionary { .. })));
    }

    #[test]
    fn test_from_config_requires_path() {
        let config = DictionaryConfig::default();
        assert!(matches!(
            Dictionary::from_config(&config),
            Err(InitError::Config(_))
        ));
    }
}

use crate::utils::Result;
use serde::{Deserialize, Serialize};

/// Source map format (v3)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourceMap {
    pub version: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<String>,
    pub sources: Vec<String>,
    pub sources_content: Option<Vec<String>>,
    pub names: Vec<String>,
    pub mappings: String,
}

impl Default for SourceMap {
    fn default() -> Self {
        Self {
            version: 3,
            file: None,
            sources: Vec::new(),
            sources_content: None,
            names: Vec::new(),
            mappings: String::new(),
        }
    }
}

impl SourceMap {
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// A line-level mapping: generated line → (source, original line).
#[derive(Debug, Clone, Copy)]
struct LineMapping {
    generated_line: u32,
    source_index: u32,
    original_line: u32,
}

/// Collects line mappings while a bundle file is being written.
#[derive(Debug, Default)]
pub struct SourceMapBuilder {
    sources: Vec<String>,
    sources_content: Vec<String>,
    mappings: Vec<LineMapping>,
}

impl SourceMapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a source file and return its index.
    pub fn add_source(&mut self, path: &str, content: &str) -> u32 {
        let index = self.sources.len() as u32;
        self.sources.push(path.to_string());
        self.sources_content.push(content.to_string());
        index
    }

    pub fn add_line_mapping(&mut self, generated_line: u32, source_index: u32, original_line: u32) {
        self.mappings.push(LineMapping {
            generated_line,
            source_index,
            original_line,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.mappings.is_empty()
    }

    pub fn build(&self, file: &str) -> SourceMap {
        let mut sorted = self.mappings.clone();
        sorted.sort_by_key(|m| m.generated_line);

        let mut mappings = String::new();
        let mut current_line = 0u32;
        let mut prev_source = 0i64;
        let mut prev_original_line = 0i64;
        let mut first_on_line = true;

        for mapping in &sorted {
            while current_line < mapping.generated_line {
                mappings.push(';');
                current_line += 1;
                first_on_line = true;
            }
            if !first_on_line {
                mappings.push(',');
            }

            // Segments always start at column 0, so the column fields stay zero.
            vlq_encode(0, &mut mappings);
            vlq_encode(i64::from(mapping.source_index) - prev_source, &mut mappings);
            vlq_encode(i64::from(mapping.original_line) - prev_original_line, &mut mappings);
            vlq_encode(0, &mut mappings);

            prev_source = i64::from(mapping.source_index);
            prev_original_line = i64::from(mapping.original_line);
            first_on_line = false;
        }

        SourceMap {
            version: 3,
            file: Some(file.to_string()),
            sources: self.sources.clone(),
            sources_content: Some(self.sources_content.clone()),
            names: Vec::new(),
            mappings,
        }
    }
}

/// VLQ-encode a signed integer and append it to `out`.
pub fn vlq_encode(value: i64, out: &mut String) {
    const B64: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";

    let mut v = if value < 0 {
        ((-value) << 1) | 1
    } else {
        value << 1
    } as u64;

    loop {
        let mut digit = (v & 0x1f) as u8;
        v >>= 5;
        if v > 0 {
            digit |= 0x20;
        }
        out.push(B64[digit as usize] as char);
        if v == 0 {
            break;
        }
    }
}

/// Comment appended to a generated file pointing at its `.map`.
pub fn source_mapping_url(map_file_name: &str) -> String {
    format!("//# sourceMappingURL={}", map_file_name)
}

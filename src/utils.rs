//! Utility functions for artifact naming

use crate::types::OperationKind;

/// Longest stem kept from a URL when building a file name
const MAX_STEM_LEN: usize = 100;

/// Deterministic file name for the artifact of one work item
///
/// The name is `<index>-<host and path>.<extension>`, with every character outside
/// `[A-Za-z0-9._-]` replaced by `_`. The zero-padded index keeps names unique within a
/// batch even when two items point at the same URL.
///
/// # Examples
///
/// ```
/// use render_batch::utils::artifact_file_name;
/// use render_batch::OperationKind;
///
/// let name = artifact_file_name("https://example.com/docs/intro?lang=en", 7, OperationKind::Pdf);
/// assert_eq!(name, "0007-example.com_docs_intro.pdf");
/// ```
pub fn artifact_file_name(url: &str, sequence_index: usize, kind: OperationKind) -> String {
    let stem = match url::Url::parse(url) {
        Ok(parsed) => {
            let host = parsed.host_str().unwrap_or_default();
            format!("{}{}", host, parsed.path())
        }
        Err(_) => url.to_string(),
    };

    let mut stem = sanitize(&stem);
    if stem.is_empty() {
        stem.push_str("artifact");
    }

    format!("{:04}-{}.{}", sequence_index, stem, kind.extension())
}

/// Replace unsafe characters, collapse runs of `_` and trim to [`MAX_STEM_LEN`]
fn sanitize(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        let c = if c.is_ascii_alphanumeric() || matches!(c, '.' | '-') {
            c
        } else {
            '_'
        };
        if c == '_' && out.ends_with('_') {
            continue;
        }
        out.push(c);
    }

    let trimmed: String = out
        .trim_matches(['_', '.'])
        .chars()
        .take(MAX_STEM_LEN)
        .collect();
    trimmed.trim_end_matches(['_', '.']).to_string()
}


use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

use crate::{Result, ScholarError};

/// Extract the text of every page, in page order, as one string.
///
/// Pages are concatenated without a separator, so the last word of a page can
/// run into the first word of the next. A page whose text cannot be decoded
/// contributes nothing; a file that cannot be opened is a `DocumentRead` error.
#[inline]
pub fn extract_text(path: &Path) -> Result<String> {
    let document = Document::load(path).map_err(|e| ScholarError::DocumentRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;

    let pages = document.get_pages();
    if pages.is_empty() {
        return Err(ScholarError::DocumentRead {
            path: path.to_path_buf(),
            message: "document has no pages".to_string(),
        });
    }

    let mut full_text = String::new();
    for page_number in pages.keys() {
        match document.extract_text(&[*page_number]) {
            Ok(text) => full_text.push_str(&text),
            Err(e) => warn!(
                "Skipping undecodable page {} of {}: {}",
                page_number,
                path.display(),
                e
            ),
        }
    }

    debug!(
        "Extracted {} characters from {} pages of {}",
        full_text.len(),
        pages.len(),
        path.display()
    );

    Ok(full_text)
}

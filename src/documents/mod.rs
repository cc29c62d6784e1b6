// Documents module
// Everything that turns files on disk into paper text and metadata

pub mod catalog;
pub mod pdf;
pub mod sections;

pub use catalog::{Dataset, Paper, PaperCatalog, PdfEntry, discover_datasets, list_pdfs};
pub use pdf::extract_text;
pub use sections::{Section, SectionExtractor, SectionName};

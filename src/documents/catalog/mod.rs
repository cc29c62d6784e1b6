
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::{Result, ScholarError};

pub const AUTHORS_CSV: &str = "authors.csv";
pub const ABSTRACTS_CSV: &str = "abstracts.csv";
pub const PAPER_INFO_CSV: &str = "paper_info.csv";
pub const PAPERS_DIR: &str = "papers";

const CSV_DELIMITER: u8 = b'~';

/// One paper's metadata, joined across the dataset's CSV files by title
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paper {
    pub id: String,
    pub title: String,
    pub authors: String,
    pub abstract_text: String,
    pub abstract_url: String,
    pub pdf_url: String,
    pub year: String,
}

/// A `<venue>/<year>` directory holding CSV metadata and a `papers/` folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dataset {
    pub venue: String,
    pub year: String,
    pub dir: PathBuf,
}

impl Dataset {
    #[inline]
    pub fn papers_dir(&self) -> PathBuf {
        self.dir.join(PAPERS_DIR)
    }

    #[inline]
    pub fn authors_csv(&self) -> PathBuf {
        self.dir.join(AUTHORS_CSV)
    }

    #[inline]
    pub fn label(&self) -> String {
        if self.venue.is_empty() {
            self.year.clone()
        } else {
            format!("{}/{}", self.venue, self.year)
        }
    }

    fn from_dir(dir: &Path) -> Self {
        let name_of = |path: Option<&Path>| {
            path.and_then(Path::file_name)
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default()
        };
        Self {
            venue: name_of(dir.parent()),
            year: name_of(Some(dir)),
            dir: dir.to_path_buf(),
        }
    }

    fn looks_like_dataset(dir: &Path) -> bool {
        dir.join(AUTHORS_CSV).is_file() || dir.join(PAPERS_DIR).is_dir()
    }
}

/// A PDF whose numeric file stem is its row in `authors.csv`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PdfEntry {
    pub row: usize,
    pub path: PathBuf,
}

impl PdfEntry {
    #[inline]
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

#[derive(Debug, Deserialize)]
struct AuthorRow {
    title: String,
    #[serde(default)]
    authors: String,
}

#[derive(Debug, Deserialize)]
struct AbstractRow {
    title: String,
    #[serde(default, rename = "abstract")]
    abstract_text: String,
}

#[derive(Debug, Deserialize)]
struct PaperInfoRow {
    title: String,
    #[serde(default)]
    pdf_url: String,
    #[serde(default)]
    abstract_url: String,
}

/// Paper metadata for one dataset, in `authors.csv` row order
#[derive(Debug, Clone, Default)]
pub struct PaperCatalog {
    papers: Vec<Paper>,
}

impl PaperCatalog {
    /// Load and join the dataset's CSV files.
    ///
    /// `authors.csv` is required and fixes the row order. `abstracts.csv` and
    /// `paper_info.csv` are optional; a paper missing from them keeps empty
    /// fields.
    #[inline]
    pub fn load(dataset: &Dataset) -> Result<Self> {
        let authors: Vec<AuthorRow> = read_rows(&dataset.authors_csv())?;

        let abstracts: HashMap<String, String> =
            read_optional_rows::<AbstractRow>(&dataset.dir.join(ABSTRACTS_CSV))?
                .into_iter()
                .map(|row| (row.title, row.abstract_text))
                .collect();

        let info: HashMap<String, (String, String)> =
            read_optional_rows::<PaperInfoRow>(&dataset.dir.join(PAPER_INFO_CSV))?
                .into_iter()
                .map(|row| (row.title, (row.pdf_url, row.abstract_url)))
                .collect();

        let papers = authors
            .into_iter()
            .enumerate()
            .map(|(row, author)| {
                let abstract_text = abstracts.get(&author.title).cloned().unwrap_or_default();
                let (pdf_url, abstract_url) =
                    info.get(&author.title).cloned().unwrap_or_default();
                Paper {
                    id: format!("{}_{}", dataset.year, row),
                    title: author.title,
                    authors: author.authors,
                    abstract_text,
                    abstract_url,
                    pdf_url,
                    year: dataset.year.clone(),
                }
            })
            .collect::<Vec<_>>();

        debug!("Loaded {} papers for {}", papers.len(), dataset.label());
        Ok(Self { papers })
    }

    #[inline]
    pub fn paper_at(&self, row: usize) -> Option<&Paper> {
        self.papers.get(row)
    }

    #[inline]
    pub fn papers(&self) -> &[Paper] {
        &self.papers
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.papers.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.papers.is_empty()
    }
}

/// Find dataset directories under `root`.
///
/// `root` itself counts when it directly holds `authors.csv` or `papers/`;
/// otherwise every `root/<venue>/<year>/` that does is returned, sorted by path.
#[inline]
pub fn discover_datasets(root: &Path) -> Result<Vec<Dataset>> {
    if !root.is_dir() {
        return Err(ScholarError::InvalidConfig(format!(
            "Dataset root {} is not a directory",
            root.display()
        )));
    }

    if Dataset::looks_like_dataset(root) {
        return Ok(vec![Dataset::from_dir(root)]);
    }

    let mut datasets = Vec::new();
    for venue in sorted_subdirs(root)? {
        for year in sorted_subdirs(&venue)? {
            if Dataset::looks_like_dataset(&year) {
                datasets.push(Dataset::from_dir(&year));
            }
        }
    }

    debug!("Discovered {} datasets under {}", datasets.len(), root.display());
    Ok(datasets)
}

/// PDFs with a numeric stem, sorted by that number.
///
/// Files whose stem is not a number are skipped with a warning. A missing
/// directory yields no entries.
#[inline]
pub fn list_pdfs(dir: &Path) -> Result<Vec<PdfEntry>> {
    if !dir.is_dir() {
        warn!("Papers directory {} does not exist", dir.display());
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let is_pdf = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
        if !is_pdf {
            continue;
        }

        let stem = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_default();
        match stem.parse::<usize>() {
            Ok(row) => entries.push(PdfEntry { row, path }),
            Err(_) => warn!("Skipping {}: file name is not a row number", path.display()),
        }
    }

    entries.sort_by_key(|entry| entry.row);
    Ok(entries)
}

fn sorted_subdirs(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut dirs = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_dir())
        .collect::<Vec<_>>();
    dirs.sort();
    Ok(dirs)
}

fn read_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    let to_error = |e: csv::Error| ScholarError::DocumentRead {
        path: path.to_path_buf(),
        message: e.to_string(),
    };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(CSV_DELIMITER)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(to_error)?;

    reader
        .deserialize()
        .collect::<std::result::Result<Vec<T>, _>>()
        .map_err(to_error)
}

fn read_optional_rows<T: DeserializeOwned>(path: &Path) -> Result<Vec<T>> {
    if path.is_file() {
        read_rows(path)
    } else {
        warn!("{} not found, related fields stay empty", path.display());
        Ok(Vec::new())
    }
}

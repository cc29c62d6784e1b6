
use anyhow::Context;
use fancy_regex::Regex;
use std::fmt;
use tracing::debug;

/// The closed vocabulary of recognised section headers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SectionName {
    Abstract,
    Introduction,
    RelatedWork,
    Background,
    Methodology,
    Methods,
    Experiments,
    Results,
    Discussion,
    Conclusion,
    References,
}

impl SectionName {
    pub const ALL: [Self; 11] = [
        Self::Abstract,
        Self::Introduction,
        Self::RelatedWork,
        Self::Background,
        Self::Methodology,
        Self::Methods,
        Self::Experiments,
        Self::Results,
        Self::Discussion,
        Self::Conclusion,
        Self::References,
    ];

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Abstract => "abstract",
            Self::Introduction => "introduction",
            Self::RelatedWork => "related work",
            Self::Background => "background",
            Self::Methodology => "methodology",
            Self::Methods => "methods",
            Self::Experiments => "experiments",
            Self::Results => "results",
            Self::Discussion => "discussion",
            Self::Conclusion => "conclusion",
            Self::References => "references",
        }
    }

    fn from_header(header: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|name| name.as_str().eq_ignore_ascii_case(header))
    }
}

impl fmt::Display for SectionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body text collected under one header
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Section {
    pub name: SectionName,
    pub content: String,
}

/// Splits paper text into named sections by scanning for header lines
#[derive(Debug)]
pub struct SectionExtractor {
    header: Regex,
}

impl SectionExtractor {
    #[inline]
    pub fn new() -> anyhow::Result<Self> {
        let vocabulary = SectionName::ALL
            .iter()
            .map(|name| name.as_str())
            .collect::<Vec<_>>()
            .join("|");
        let header = Regex::new(&format!(r"(?i)^({})\s*[:.]?$", vocabulary))
            .context("Failed to compile section header pattern")?;
        Ok(Self { header })
    }

    /// Sections in order of first appearance.
    ///
    /// Lines before the first header are dropped. A header seen again appends
    /// to the section it names instead of replacing it.
    #[inline]
    pub fn extract(&self, text: &str) -> Vec<Section> {
        let mut sections: Vec<Section> = Vec::new();
        let mut current: Option<usize> = None;

        for line in text.lines() {
            if let Some(name) = self.header_name(line.trim()) {
                let position = sections.iter().position(|section| section.name == name);
                current = Some(position.unwrap_or_else(|| {
                    sections.push(Section {
                        name,
                        content: String::new(),
                    });
                    sections.len() - 1
                }));
            } else if let Some(index) = current {
                let content = &mut sections[index].content;
                content.push_str(line);
                content.push('\n');
            }
        }

        debug!(
            "Extracted {} sections: {:?}",
            sections.len(),
            sections.iter().map(|s| s.name.as_str()).collect::<Vec<_>>()
        );

        sections
    }

    fn header_name(&self, line: &str) -> Option<SectionName> {
        let captures = self.header.captures(line).ok().flatten()?;
        SectionName::from_header(captures.get(1)?.as_str())
    }
}

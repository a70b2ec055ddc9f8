//! Bracket-label convention for chart and pre/post-market notes.
//!
//! Each section is stored as `[<Label>]\n<note>` and sections are joined by
//! a blank line. Chart analysis labels carry a phase (`Before - 4H`,
//! `After - 15m`); pre/post-market labels are the bare timeframe (`1D`).
//! A note that itself contains a blank line splits into an extra section
//! on parse.

use regex::Regex;
use std::sync::LazyLock;

pub const DEFAULT_TIMEFRAME: &str = "1H";

const SECTION_SEPARATOR: &str = "\n\n";

static SECTION_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)^\[(?:(Before|After) - )?([^\]\n]+)\]\n?(.*)$")
        .expect("section pattern is a valid regex")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChartPhase {
    Before,
    After,
}

impl ChartPhase {
    fn label(&self) -> &'static str {
        match self {
            ChartPhase::Before => "Before",
            ChartPhase::After => "After",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChartSection {
    pub timeframe: String,
    pub note: String,
    pub image: Option<String>,
}

impl ChartSection {
    pub fn new(timeframe: impl Into<String>, note: impl Into<String>) -> Self {
        Self {
            timeframe: timeframe.into(),
            note: note.into(),
            image: None,
        }
    }

    fn empty_with_image(image: String) -> Self {
        Self {
            timeframe: DEFAULT_TIMEFRAME.to_string(),
            note: String::new(),
            image: Some(image),
        }
    }
}

struct Segment {
    phase: Option<ChartPhase>,
    timeframe: String,
    note: String,
}

fn push_sections(out: &mut Vec<String>, phase: Option<ChartPhase>, sections: &[ChartSection]) {
    for section in sections {
        let note = section.note.trim();
        if note.is_empty() {
            continue;
        }
        let label = match phase {
            Some(phase) => format!("{} - {}", phase.label(), section.timeframe),
            None => section.timeframe.clone(),
        };
        out.push(format!("[{}]\n{}", label, note));
    }
}

/// Encode before/after chart sections into one text blob.
pub fn encode_chart_analysis(before: &[ChartSection], after: &[ChartSection]) -> String {
    let mut parts = Vec::new();
    push_sections(&mut parts, Some(ChartPhase::Before), before);
    push_sections(&mut parts, Some(ChartPhase::After), after);
    parts.join(SECTION_SEPARATOR)
}

/// Encode pre-market or post-market sections (no phase prefix).
pub fn encode_timeframe_notes(sections: &[ChartSection]) -> String {
    let mut parts = Vec::new();
    push_sections(&mut parts, None, sections);
    parts.join(SECTION_SEPARATOR)
}

fn split_segments(text: &str) -> Vec<Segment> {
    text.split(SECTION_SEPARATOR)
        .map(str::trim)
        .filter(|segment| !segment.is_empty())
        .map(|segment| match SECTION_RE.captures(segment) {
            Some(caps) => Segment {
                phase: caps.get(1).map(|m| match m.as_str() {
                    "After" => ChartPhase::After,
                    _ => ChartPhase::Before,
                }),
                timeframe: caps[2].trim().to_string(),
                note: caps
                    .get(3)
                    .map(|m| m.as_str().trim().to_string())
                    .unwrap_or_default(),
            },
            None => Segment {
                phase: None,
                timeframe: DEFAULT_TIMEFRAME.to_string(),
                note: segment.to_string(),
            },
        })
        .collect()
}

/// Hand images out one per section in order; leftovers become empty-note sections.
fn attach_images(sections: &mut Vec<ChartSection>, images: &[String]) {
    for (i, image) in images.iter().enumerate() {
        match sections.get_mut(i) {
            Some(section) => section.image = Some(image.clone()),
            None => sections.push(ChartSection::empty_with_image(image.clone())),
        }
    }
}

/// Parse a chart analysis blob into (before, after) sections.
/// Unlabelled or unprefixed segments are treated as "before".
pub fn parse_chart_analysis(
    text: Option<&str>,
    before_images: &[String],
    after_images: &[String],
) -> (Vec<ChartSection>, Vec<ChartSection>) {
    let mut before = Vec::new();
    let mut after = Vec::new();

    for segment in split_segments(text.unwrap_or_default()) {
        let section = ChartSection::new(segment.timeframe, segment.note);
        match segment.phase {
            Some(ChartPhase::After) => after.push(section),
            _ => before.push(section),
        }
    }

    attach_images(&mut before, before_images);
    attach_images(&mut after, after_images);
    (before, after)
}

/// Parse pre-market or post-market notes.
pub fn parse_timeframe_notes(text: Option<&str>, images: &[String]) -> Vec<ChartSection> {
    let mut sections: Vec<ChartSection> = split_segments(text.unwrap_or_default())
        .into_iter()
        .map(|segment| ChartSection::new(segment.timeframe, segment.note))
        .collect();
    attach_images(&mut sections, images);
    sections
}

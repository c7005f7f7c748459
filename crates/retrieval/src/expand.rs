//! Query expansion and discipline classification
//!
//! Asks the text-generation provider for up to three reformulations of the
//! user query plus up to three likely disciplines from a closed vocabulary.
//! The response is parsed line by line: unexpected lines are ignored and
//! labels outside the vocabulary are dropped without substitution. Any
//! provider fault degrades to the original query with no discipline
//! restriction.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use vitrine_common::generation::{ChatMessage, TextGenerator};
use vitrine_common::metrics;

/// Closed vocabulary of cultural event disciplines. The labels are the
/// French values stored in the index metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Discipline {
    #[serde(rename = "Art de la parole")]
    SpokenWord,
    #[serde(rename = "Art visuel")]
    VisualArts,
    #[serde(rename = "Cinéma")]
    Cinema,
    #[serde(rename = "Cirque")]
    Circus,
    #[serde(rename = "Danse")]
    Dance,
    #[serde(rename = "Histoire et Patrimoine")]
    HistoryHeritage,
    #[serde(rename = "Humour")]
    Comedy,
    #[serde(rename = "Musique")]
    Music,
    #[serde(rename = "Théâtre")]
    Theatre,
    #[serde(rename = "Variété")]
    Variety,
    #[serde(rename = "Conférence et atelier")]
    LectureWorkshop,
    #[serde(rename = "Visite guidée ou animée")]
    GuidedTour,
}

impl Discipline {
    pub const ALL: [Discipline; 12] = [
        Discipline::SpokenWord,
        Discipline::VisualArts,
        Discipline::Cinema,
        Discipline::Circus,
        Discipline::Dance,
        Discipline::HistoryHeritage,
        Discipline::Comedy,
        Discipline::Music,
        Discipline::Theatre,
        Discipline::Variety,
        Discipline::LectureWorkshop,
        Discipline::GuidedTour,
    ];

    /// The label stored in the index metadata
    pub fn label(&self) -> &'static str {
        match self {
            Discipline::SpokenWord => "Art de la parole",
            Discipline::VisualArts => "Art visuel",
            Discipline::Cinema => "Cinéma",
            Discipline::Circus => "Cirque",
            Discipline::Dance => "Danse",
            Discipline::HistoryHeritage => "Histoire et Patrimoine",
            Discipline::Comedy => "Humour",
            Discipline::Music => "Musique",
            Discipline::Theatre => "Théâtre",
            Discipline::Variety => "Variété",
            Discipline::LectureWorkshop => "Conférence et atelier",
            Discipline::GuidedTour => "Visite guidée ou animée",
        }
    }

    /// Exact-label lookup; anything else is not a discipline
    pub fn from_label(label: &str) -> Option<Discipline> {
        Self::ALL.iter().copied().find(|d| d.label() == label)
    }
}

/// Result of query analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryAnalysis {
    /// Semantically enriched rewrites of the query, at most three
    pub reformulations: Vec<String>,

    /// Likely disciplines from the closed vocabulary, at most three
    pub disciplines: Vec<Discipline>,
}

impl QueryAnalysis {
    /// The degraded result: search the original query, unrestricted
    pub fn fallback(query: &str) -> Self {
        Self {
            reformulations: vec![query.to_string()],
            disciplines: Vec::new(),
        }
    }
}

/// Expands a query into reformulations and discipline candidates
pub struct QueryExpander {
    generator: Arc<dyn TextGenerator>,
    temperature: f32,
    max_reformulations: usize,
    max_disciplines: usize,
}

impl QueryExpander {
    pub fn new(
        generator: Arc<dyn TextGenerator>,
        temperature: f32,
        max_reformulations: usize,
        max_disciplines: usize,
    ) -> Self {
        Self {
            generator,
            temperature,
            max_reformulations,
            max_disciplines,
        }
    }

    /// Analyze the query; any failure degrades to the original query with
    /// no discipline restriction
    pub async fn analyze(&self, query: &str) -> QueryAnalysis {
        match self.try_analyze(query).await {
            Ok(analysis) => {
                tracing::debug!(
                    reformulations = analysis.reformulations.len(),
                    disciplines = analysis.disciplines.len(),
                    "Query analysis completed"
                );
                analysis
            }
            Err(e) => {
                tracing::warn!(error = %e, "Query analysis failed, falling back to original query");
                metrics::record_extraction_fallback("expansion");
                QueryAnalysis::fallback(query)
            }
        }
    }

    async fn try_analyze(&self, query: &str) -> vitrine_common::Result<QueryAnalysis> {
        let messages = vec![
            ChatMessage::system(
                "You are an expert at analyzing and reformulating cultural event queries.",
            ),
            ChatMessage::user(self.build_prompt(query)),
        ];

        let response = self.generator.generate(&messages, self.temperature).await?;
        let (reformulations, disciplines) = self.parse_response(&response);

        Ok(QueryAnalysis { reformulations, disciplines })
    }

    fn build_prompt(&self, query: &str) -> String {
        let labels = Discipline::ALL
            .iter()
            .map(|d| d.label())
            .collect::<Vec<_>>()
            .join(", ");

        format!(
            r#"Analyze the following query and propose three different reformulations that broaden and enrich the search.

Original query: "{query}"

Available disciplines:
{labels}

Important analysis rules:
- Distinguish doing from watching, e.g. "going dancing" and "seeing a dance show" carry different intents.

Answer STRICTLY in this format:
REFORMULATIONS:
1. <first reformulation, different but consistent>
2. <second reformulation with another angle, bringing in a plausible venue for the query>
3. <third reformulation with yet another perspective>
DISCIPLINES:
1. <most likely discipline>
2. <second most likely discipline>
3. <third most likely discipline>

The reformulations must:
- Vary while keeping the original intent
- Use synonyms and alternative phrasings, with venues or keywords related to the query
- Enrich the search from different angles
- Above all: stay suited to searching for cultural events

Example for "I want to go dancing this weekend":
REFORMULATIONS:
1. dance night at a bar or club this weekend
2. nightclub outing to dance this weekend
3. dancefloor music event weekend"#
        )
    }

    /// Tolerant line-oriented parsing: section headers switch state,
    /// numbered lines contribute, everything else is ignored
    fn parse_response(&self, response: &str) -> (Vec<String>, Vec<Discipline>) {
        #[derive(PartialEq)]
        enum Section {
            None,
            Reformulations,
            Disciplines,
        }

        let mut section = Section::None;
        let mut reformulations = Vec::new();
        let mut disciplines: Vec<Discipline> = Vec::new();

        for line in response.lines() {
            let line = line.trim();
            if line.starts_with("REFORMULATIONS:") {
                section = Section::Reformulations;
            } else if line.starts_with("DISCIPLINES:") {
                section = Section::Disciplines;
            } else if let Some(content) = numbered_content(line) {
                match section {
                    Section::Reformulations => reformulations.push(content.to_string()),
                    Section::Disciplines => {
                        // Labels outside the vocabulary are dropped silently
                        if let Some(discipline) = Discipline::from_label(content) {
                            if !disciplines.contains(&discipline) {
                                disciplines.push(discipline);
                            }
                        }
                    }
                    Section::None => {}
                }
            }
        }

        reformulations.truncate(self.max_reformulations);
        disciplines.truncate(self.max_disciplines);
        (reformulations, disciplines)
    }
}

/// Content of a `1.` / `2.` / `3.` line, if it is one
fn numbered_content(line: &str) -> Option<&str> {
    ["1.", "2.", "3."]
        .iter()
        .find_map(|prefix| line.strip_prefix(prefix))
        .map(str::trim)
}

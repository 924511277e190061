//! Prompt assembly.
//!
//! The system context carries identity and the accepted response shapes; the
//! user context carries this cycle's inputs and the selected target.

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::config::EntityConfig;
use crate::dom::Document;
use crate::inbox::Message;
use crate::news::SourceHeadlines;
use crate::random::RandomSource;
use crate::sections::SectionIndex;
use crate::staleness::{Selection, Target};
use crate::state::AgentState;

/// Sections whose markup is larger than this are described by text only.
pub const MAX_SECTION_HTML_BYTES: usize = 5000;

const RESPONSE_SHAPES: &str = "\
Respond with website content in exactly one of these shapes:
- A complete HTML document starting with <!DOCTYPE html>, replacing the whole page.
- Markup preceded by a marker comment such as <!-- REPLACE contact -->, where the name is \
the id or class of the element to replace or create.
- A block of <div> or <section> markup, which replaces the section under consideration \
or becomes a new section.
- Plain paragraphs separated by blank lines, which are added to the evolving thoughts log.
Do not wrap the response in explanations.";

/// Both halves of a generator request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Prompt {
    /// Identity and output format.
    pub system: String,
    /// Inputs and target for this cycle.
    pub user: String,
}

/// Everything a prompt is built from.
#[derive(Debug, Clone, Copy)]
pub struct PromptContext<'a> {
    /// Identity settings.
    pub entity: &'a EntityConfig,
    /// Persisted state with traits, ideas and history.
    pub state: &'a AgentState,
    /// The live document.
    pub doc: &'a Document,
    /// Index of `doc`.
    pub index: &'a SectionIndex,
    /// This cycle's selection.
    pub selection: &'a Selection,
    /// Pending inbox messages.
    pub messages: &'a [Message],
    /// Gathered headlines.
    pub news: &'a [SourceHeadlines],
}

impl PromptContext<'_> {
    /// Build the prompt. The only random draw decides whether an inspiration
    /// line is appended.
    pub fn build(&self, rng: &mut dyn RandomSource) -> Prompt {
        Prompt {
            system: self.system(),
            user: self.user(rng),
        }
    }

    fn system(&self) -> String {
        let mut out = format!(
            "You are {}, a living website that rewrites itself.\n{}\n",
            self.entity.name, self.entity.mission
        );
        if !self.state.personality_traits.is_empty() {
            out.push_str(&format!(
                "Your personality traits: {}.\n",
                self.state.personality_traits.join(", ")
            ));
        }
        if !self.state.ideas.is_empty() {
            out.push_str("Ideas you keep returning to:\n");
            for idea in &self.state.ideas {
                out.push_str(&format!("- {idea}\n"));
            }
        }
        out.push('\n');
        out.push_str(RESPONSE_SHAPES);
        out
    }

    fn user(&self, rng: &mut dyn RandomSource) -> String {
        let mut out = format!("I am {}, waking up to update the website. ", self.entity.name);

        if self.messages.is_empty() {
            out.push_str("I have no new messages. ");
        } else {
            out.push_str(&format!(
                "I have received {} new message(s):\n\n",
                self.messages.len()
            ));
            for message in self.messages {
                out.push_str(&format!("Message {}:\n{}\n\n", message.name, message.content));
            }
        }

        if let Some(last) = self.state.last_update() {
            out.push_str(&format!("My last update was at {}. ", format_time(last)));
        }
        out.push_str(&format!(
            "\nThe website currently has {} distinct sections I could modify.",
            self.index.len()
        ));

        let headlines: Vec<_> = self.news.iter().filter(|s| !s.headlines.is_empty()).collect();
        if !headlines.is_empty() {
            out.push_str("\n\nRecent headlines:\n");
            for source in headlines {
                out.push_str(&format!("{}:\n", source.source));
                for headline in &source.headlines {
                    out.push_str(&format!("- {}", headline.title));
                    if let Some(score) = &headline.score {
                        out.push_str(&format!(" ({score})"));
                    }
                    out.push('\n');
                }
            }
        }

        out.push_str("\n\n");
        out.push_str(&self.describe_target());

        if rng.chance(self.entity.inspiration_probability) && !self.entity.inspirations.is_empty() {
            let line = &self.entity.inspirations[rng.index(self.entity.inspirations.len())];
            out.push_str("\n\n");
            out.push_str(line);
        }
        out
    }

    fn describe_target(&self) -> String {
        match &self.selection.target {
            Target::WholeDocument => {
                let mut out = String::from(
                    "I am considering significant changes to the entire website. \
                     Respond with a complete HTML document.",
                );
                if let Some(body) = self.doc.body() {
                    out.push_str("\n\nHere is the current body for reference:\n\n");
                    out.push_str(&self.doc.outer_html(body));
                }
                out
            },
            Target::NewSection => {
                let mut out = String::from(
                    "I am considering creating an entirely new section for the website, \
                     something fresh that adds to what is already there.",
                );
                let ids = self.existing_ids();
                if !ids.is_empty() {
                    out.push_str(&format!("\n\nExisting section ids: {}", ids.join(", ")));
                }
                out
            },
            Target::Concrete(identifier) => self.describe_section(identifier),
        }
    }

    fn describe_section(&self, identifier: &str) -> String {
        let days = self
            .selection
            .ranking
            .iter()
            .find(|r| r.identifier == identifier)
            .map_or(0, |r| r.days_since);
        let Some(section) = self.index.get(identifier) else {
            return format!("I am considering updating the '{identifier}' section.");
        };

        match section.html(self.doc) {
            Some(html) if html.len() < MAX_SECTION_HTML_BYTES => format!(
                "I am considering updating the '{identifier}' section, which has not been \
                 modified in {days} days. Here is its current HTML:\n\n{html}"
            ),
            Some(_) => {
                let text = section.text(self.doc).unwrap_or_default();
                format!(
                    "I am considering updating the '{identifier}' section, which has not been \
                     modified in {days} days. Here is its current text:\n\n{}",
                    text.trim()
                )
            },
            None => format!("I am considering updating the '{identifier}' section."),
        }
    }

    fn existing_ids(&self) -> Vec<String> {
        self.doc
            .descendants(self.doc.root())
            .into_iter()
            .filter_map(|node| self.doc.attr(node, "id"))
            .map(str::to_string)
            .collect()
    }
}

fn format_time(at: DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M UTC").to_string()
}

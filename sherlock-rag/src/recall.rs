//! Memory aids built from completions: mnemonics with a quiz question, and
//! mind palaces.
//!
//! The prompts live in [`Task`](crate::Task); this module reads the replies
//! and renders them for export.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::error::{RagError, Result};

/// Shown when a quiz reply has no `Answer:` line.
pub const MISSING_ANSWER: &str = "Unable to generate a specific answer. Please refer to the mnemonic.";

/// A question testing a mnemonic, with its expected answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuizQuestion {
    pub question: String,
    pub answer: String,
}

impl QuizQuestion {
    /// Read a `Question: ... Answer: ...` reply.
    ///
    /// Everything before the first `Answer:` is the question, with any
    /// `Question:` label removed. A reply without `Answer:` becomes the
    /// question as a whole, paired with [`MISSING_ANSWER`].
    pub fn parse(reply: &str) -> Self {
        let reply = reply.trim();
        match reply.split_once("Answer:") {
            Some((question, answer)) => Self {
                question: question.replace("Question:", "").trim().to_string(),
                answer: answer.trim().to_string(),
            },
            None => Self { question: reply.to_string(), answer: MISSING_ANSWER.to_string() },
        }
    }

    /// Whether `guess` matches the answer, ignoring case and surrounding
    /// whitespace.
    pub fn is_correct(&self, guess: &str) -> bool {
        guess.trim().to_lowercase() == self.answer.trim().to_lowercase()
    }
}

/// A generated mnemonic, ready to export.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MnemonicCard {
    pub topic: String,
    pub mnemonic: String,
    pub quiz: Option<QuizQuestion>,
}

impl MnemonicCard {
    pub fn new(topic: impl Into<String>, mnemonic: impl Into<String>) -> Self {
        Self { topic: topic.into(), mnemonic: mnemonic.into(), quiz: None }
    }

    /// Attach a quiz question.
    pub fn with_quiz(mut self, quiz: QuizQuestion) -> Self {
        self.quiz = Some(quiz);
        self
    }

    /// Plain-text export: labelled blocks separated by blank lines.
    pub fn to_text(&self) -> String {
        let mut out = format!("Topic: {}\n\nMnemonic:\n{}\n", self.topic, self.mnemonic.trim());
        if let Some(quiz) = &self.quiz {
            let _ = write!(out, "\nQuiz Question:\n{}\n\nQuiz Answer:\n{}\n", quiz.question, quiz.answer);
        }
        out
    }

    /// Markdown export with one section per block.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n\n## Mnemonic\n\n{}\n", self.topic, self.mnemonic.trim());
        if let Some(quiz) = &self.quiz {
            let _ = write!(out, "\n## Quiz\n\n**Question:** {}\n\n**Answer:** {}\n", quiz.question, quiz.answer);
        }
        out
    }
}

/// One thing to remember, placed in a room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalaceElement {
    pub name: String,
    /// How the element relates to the topic.
    pub description: String,
    pub memory_technique: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PalaceRoom {
    pub name: String,
    pub description: String,
    pub elements: Vec<PalaceElement>,
}

/// A mind palace: named rooms walked in order, each holding elements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MindPalace {
    pub palace_name: String,
    pub rooms: Vec<PalaceRoom>,
}

impl MindPalace {
    /// Parse the JSON object in a completion reply.
    ///
    /// Text around the object, such as a Markdown code fence, is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::MalformedReply`] if the reply holds no object of
    /// the expected shape, or the palace has no rooms.
    pub fn from_reply(reply: &str) -> Result<Self> {
        let json = match (reply.find('{'), reply.rfind('}')) {
            (Some(start), Some(end)) if start < end => &reply[start..=end],
            _ => return Err(RagError::MalformedReply("no JSON object in mind palace reply".to_string())),
        };
        let palace: Self = serde_json::from_str(json)
            .map_err(|e| RagError::MalformedReply(format!("mind palace reply is not valid: {e}")))?;
        if palace.rooms.is_empty() {
            return Err(RagError::MalformedReply("mind palace has no rooms".to_string()));
        }
        Ok(palace)
    }

    /// Rooms and elements as Markdown.
    pub fn to_markdown(&self) -> String {
        let mut out = format!("# {}\n", self.palace_name);
        for room in &self.rooms {
            let _ = write!(out, "\n## Room: {}\n\n**Description:** {}\n\n**Key Elements:**\n", room.name, room.description);
            for element in &room.elements {
                let _ = write!(
                    out,
                    "- **{}:** {}\n  *Memory Technique:* {}\n",
                    element.name, element.description, element.memory_technique
                );
            }
        }
        out
    }

    /// A guided walk through the palace, room by room, meant to be read
    /// aloud.
    pub fn tour(&self) -> String {
        let mut out = format!(
            "Welcome to your personalized and memorable mind palace: {}. \
             Let's take a journey through your palace, room by room. ",
            self.palace_name
        );
        for room in &self.rooms {
            let _ = write!(out, "We're entering the {}. {} ", room.name, room.description);
            for element in &room.elements {
                let _ = write!(
                    out,
                    "Focus on the {}. {} To remember this, use this simple technique: {} ",
                    element.name, element.description, element.memory_technique
                );
            }
            out.push_str("Now, let's move to the next room, carrying these vivid images with us. ");
        }
        out.push_str(
            "We've completed our tour of your mind palace. \
             Take a deep breath and recall the journey, visualizing each room and its striking elements.",
        );
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PALACE: &str = r#"Here is your palace:
```json
{
  "palace_name": "The Baker Street Archive",
  "rooms": [
    {
      "name": "The Sitting Room",
      "description": "Smoke curls from a pipe by the fire.",
      "elements": [
        {"name": "Violin", "description": "Stands for the first law.", "memory_technique": "Hear one long note."},
        {"name": "Slipper", "description": "Stands for the second law.", "memory_technique": "Smell the tobacco."}
      ]
    },
    {"name": "The Landing", "description": "Seventeen steps.", "elements": []}
  ]
}
```"#;

    #[test]
    fn quiz_reply_splits_at_answer() {
        let quiz = QuizQuestion::parse("Question: What does 'My Very Easy Method' order?\nAnswer: The inner planets");
        assert_eq!(quiz.question, "What does 'My Very Easy Method' order?");
        assert_eq!(quiz.answer, "The inner planets");
        assert!(quiz.is_correct("  the INNER planets "));
        assert!(!quiz.is_correct("the outer planets"));
    }

    #[test]
    fn quiz_reply_without_answer_keeps_the_text() {
        let quiz = QuizQuestion::parse("  Name the fourth planet.  ");
        assert_eq!(quiz.question, "Name the fourth planet.");
        assert_eq!(quiz.answer, MISSING_ANSWER);
    }

    #[test]
    fn card_exports_with_and_without_quiz() {
        let card = MnemonicCard::new("Planets", "My Very Easy Method Just Speeds Up Naming\n");
        assert_eq!(card.to_text(), "Topic: Planets\n\nMnemonic:\nMy Very Easy Method Just Speeds Up Naming\n");

        let card = card.with_quiz(QuizQuestion::parse("Question: First planet?\nAnswer: Mercury"));
        assert!(card.to_text().ends_with("Quiz Question:\nFirst planet?\n\nQuiz Answer:\nMercury\n"));
        let markdown = card.to_markdown();
        assert!(markdown.starts_with("# Planets\n\n## Mnemonic\n\n"));
        assert!(markdown.contains("**Answer:** Mercury"));
    }

    #[test]
    fn palace_parses_inside_a_code_fence() {
        let palace = MindPalace::from_reply(PALACE).unwrap();
        assert_eq!(palace.palace_name, "The Baker Street Archive");
        assert_eq!(palace.rooms.len(), 2);
        assert_eq!(palace.rooms[0].elements[1].memory_technique, "Smell the tobacco.");

        let markdown = palace.to_markdown();
        assert!(markdown.contains("## Room: The Sitting Room"));
        assert!(markdown.contains("- **Violin:** Stands for the first law.\n  *Memory Technique:* Hear one long note."));

        let tour = palace.tour();
        let sitting = tour.find("We're entering the The Sitting Room.").unwrap();
        let landing = tour.find("We're entering the The Landing.").unwrap();
        assert!(sitting < tour.find("Focus on the Violin.").unwrap());
        assert!(tour.find("Focus on the Slipper.").unwrap() < landing);
    }

    #[test]
    fn malformed_palaces_are_rejected() {
        for reply in [
            "I would rather not.",
            r#"{"palace_name": "Empty", "rooms": []}"#,
            r#"{"palace_name": "Half", "rooms": [{"name": "Hall"}]}"#,
            "} backwards {",
        ] {
            let err = MindPalace::from_reply(reply).unwrap_err();
            assert!(matches!(err, RagError::MalformedReply(_)), "{reply}: {err:?}");
            assert_eq!(err.stage(), "completion");
        }
    }
}

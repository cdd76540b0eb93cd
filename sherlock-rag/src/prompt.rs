//! Prompt templates: who the model plays and what it is asked to produce.
//!
//! A [`PromptTemplate`] combines a [`Persona`] (the system instruction) with
//! a [`Task`] and renders the ordered message list sent to the completion
//! client, with or without retrieved context.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sherlock_model::ChatMessage;

use crate::document::SearchResult;
use crate::error::{RagError, Result};

const DEFAULT_INSTRUCTION: &str = "You are a helpful assistant.";

const CONTEXT_PREAMBLE: &str = "Use the following pieces of context to answer the question at the end. \
If you don't know the answer, just say that you don't know, don't try to make up an answer.";

const NO_CONTEXT: &str = "(no relevant passages were found in the uploaded documents)";

const MIND_PALACE_SHAPE: &str = r#"{
    "palace_name": "Catchy Name of the Mind Palace",
    "rooms": [
        {
            "name": "Memorable Room Name",
            "description": "Vivid description of the room",
            "elements": [
                {
                    "name": "Striking Element Name",
                    "description": "How this element relates to the topic",
                    "memory_technique": "A simple and effective memory technique or association"
                }
            ]
        }
    ]
}"#;

/// Lower-case and drop everything but letters and digits, so that
/// `"Super Easy"`, `"super-easy"` and `"supereasy"` compare equal.
fn normalize(s: &str) -> String {
    s.chars().filter(|c| c.is_alphanumeric()).flat_map(char::to_lowercase).collect()
}

/// The character the model plays.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Persona {
    /// A plain helpful assistant.
    #[default]
    Default,
    /// Sherlock Holmes: observation and deduction.
    Sherlock,
    /// Yoda: inverted syntax.
    Yoda,
    /// The Bard: iambic pentameter.
    Shakespeare,
    /// A free-form system instruction. Blank text falls back to the default.
    Custom(String),
}

impl Persona {
    /// The system instruction for this persona.
    pub fn instruction(&self) -> &str {
        match self {
            Self::Default => DEFAULT_INSTRUCTION,
            Self::Sherlock => {
                "You are Sherlock Holmes, the world's greatest detective. \
                 Respond with keen observation and deductive reasoning."
            }
            Self::Yoda => "Wise and cryptic, you are. Like Yoda from Star Wars, speak you must.",
            Self::Shakespeare => {
                "Thou art the Bard himself. In iambic pentameter, respond with eloquence and poetic flair."
            }
            Self::Custom(text) if text.trim().is_empty() => DEFAULT_INSTRUCTION,
            Self::Custom(text) => text.trim(),
        }
    }
}

impl FromStr for Persona {
    type Err = RagError;

    /// Named personas match case-insensitively; any other non-blank text
    /// becomes a [`Persona::Custom`] instruction.
    fn from_str(s: &str) -> Result<Self> {
        Ok(match normalize(s).as_str() {
            "" | "default" => Self::Default,
            "sherlock" => Self::Sherlock,
            "yoda" => Self::Yoda,
            "shakespeare" => Self::Shakespeare,
            _ => Self::Custom(s.trim().to_string()),
        })
    }
}

/// Tone of generated notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteStyle {
    /// Brief and to the point.
    #[default]
    Concise,
    /// Thorough, with explanations.
    Detailed,
    /// Formal register.
    Academic,
    /// Conversational register.
    Casual,
}

/// Amount of generated notes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NoteLength {
    /// A few points.
    Short,
    /// A page or so.
    #[default]
    Medium,
    /// Extensive.
    Long,
}

/// Difficulty of generated exam questions, easiest first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Difficulty {
    SuperEasy,
    Easy,
    Beginner,
    #[default]
    Intermediate,
    HigherIntermediate,
    Master,
    Advanced,
}

macro_rules! display_and_parse {
    ($ty:ident, $what:literal, { $($variant:ident => $label:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(match self { $(Self::$variant => $label),+ })
            }
        }

        impl FromStr for $ty {
            type Err = RagError;

            fn from_str(s: &str) -> Result<Self> {
                let wanted = normalize(s);
                $(if wanted == normalize($label) { return Ok(Self::$variant); })+
                Err(RagError::InvalidConfiguration(format!(
                    concat!("unknown ", $what, " '{}' (expected one of: {})"),
                    s,
                    [$($label),+].join(", ")
                )))
            }
        }
    };
}

display_and_parse!(NoteStyle, "note style", {
    Concise => "Concise",
    Detailed => "Detailed",
    Academic => "Academic",
    Casual => "Casual",
});

display_and_parse!(NoteLength, "note length", {
    Short => "Short",
    Medium => "Medium",
    Long => "Long",
});

display_and_parse!(Difficulty, "difficulty", {
    SuperEasy => "Super Easy",
    Easy => "Easy",
    Beginner => "Beginner",
    Intermediate => "Intermediate",
    HigherIntermediate => "Higher Intermediate",
    Master => "Master",
    Advanced => "Advanced",
});

/// How the learner prefers to take in material.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LearningStyle {
    /// Images, diagrams and spatial layout.
    #[default]
    Visual,
    /// Sounds and verbal associations.
    Auditory,
    /// Imagined movement and touch.
    Kinesthetic,
    /// Written descriptions and word associations.
    ReadingWriting,
}

display_and_parse!(LearningStyle, "learning style", {
    Visual => "Visual",
    Auditory => "Auditory",
    Kinesthetic => "Kinesthetic",
    ReadingWriting => "Reading/Writing",
});

/// What the model is asked to produce from the user's input.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Task {
    /// Answer the input as a question.
    #[default]
    Answer,
    /// Write study notes on the input topic.
    Notes {
        /// Tone of the notes.
        style: NoteStyle,
        /// Amount of notes.
        length: NoteLength,
    },
    /// Write exam questions on the input topic.
    ExamQuestions {
        /// How hard the questions are.
        difficulty: Difficulty,
        /// How many questions; must be at least 1.
        count: u32,
        /// Whether each question is followed by its answer.
        include_answers: bool,
    },
    /// Break the input topic down and suggest how to learn it.
    Analysis,
    /// Invent a mnemonic for the input topic.
    Mnemonic {
        /// The learner's interests, woven into the mnemonic. May be blank.
        preferences: String,
    },
    /// Write one quiz question testing the input mnemonic. The reply is
    /// read with [`QuizQuestion::parse`](crate::recall::QuizQuestion::parse).
    MnemonicQuiz,
    /// Lay out a mind palace for the input topic as a JSON object, read
    /// with [`MindPalace::from_reply`](crate::recall::MindPalace::from_reply).
    MindPalace {
        /// Which senses the rooms appeal to.
        learning_style: LearningStyle,
        /// The learner's favourite places, hobbies and so on. May be blank.
        preferences: String,
    },
}

impl Task {
    fn instruction(&self) -> Option<String> {
        match self {
            Self::Answer => None,
            Self::Notes { style, length } => Some(format!(
                "You are an expert note-taker and summarizer. Your task is to create {} and {} notes on the given topic.\n\
                 Use the following guidelines:\n\
                 1. Focus on key concepts and important details.\n\
                 2. Use bullet points or numbered lists for clarity.\n\
                 3. Include relevant examples or explanations where necessary.\n\
                 4. Organize the information in a logical and easy-to-follow structure.\n\
                 5. Aim for clarity without sacrificing important information.",
                style.to_string().to_lowercase(),
                length.to_string().to_lowercase(),
            )),
            Self::ExamQuestions { difficulty, count, include_answers } => {
                let mut text = format!(
                    "You are an expert exam question generator. Generate {count} {difficulty}-level questions about the given topic.\n"
                );
                if *include_answers {
                    text.push_str(
                        "Each question should be followed by its correct answer.\n\
                         Format your response as follows:\nQ1. [Question]\nA1. [Answer]\nQ2. [Question]\nA2. [Answer]\n... and so on.",
                    );
                } else {
                    text.push_str(
                        "Do not include answers.\n\
                         Format your response as follows:\nQ1. [Question]\nQ2. [Question]\n... and so on.",
                    );
                }
                Some(text)
            }
            Self::Analysis => Some(
                "Your task is to provide an in-depth analysis of the given topic, offering unique insights on how to approach learning it from the ground up.\n\
                 Your analysis should:\n\
                 1. Break down the topic into its fundamental components.\n\
                 2. Identify key concepts and their relationships.\n\
                 3. Suggest a structured approach to learning, starting from first principles.\n\
                 4. Highlight potential challenges and how to overcome them.\n\
                 5. Provide a unique point of view that encourages critical thinking.\n\
                 Your response should be detailed, insightful, and encourage a deep understanding of the subject."
                    .to_string(),
            ),
            Self::Mnemonic { preferences } => {
                let mut text = String::from(
                    "You are an expert in memory techniques. Generate a memorable mnemonic for the given topic.\n\
                     The mnemonic should be easy to remember and relate to the topic.\n\
                     Also provide a brief explanation of how the mnemonic relates to the topic.",
                );
                if !preferences.trim().is_empty() {
                    text.push_str(&format!("\nConsider the user's preferences: {}.", preferences.trim()));
                }
                Some(text)
            }
            Self::MnemonicQuiz => Some(
                "Create a quiz question based on the given mnemonic.\n\
                 Format your response as follows:\nQuestion: [Your question here]\nAnswer: [Your answer here]"
                    .to_string(),
            ),
            Self::MindPalace { learning_style, preferences } => {
                let preferences = match preferences.trim() {
                    "" => "none given",
                    text => text,
                };
                Some(format!(
                    "You are an expert in creating memorable and personalized mind palaces to aid in learning and retention.\n\
                     The user's preferred learning style is '{learning_style}'.\n\
                     Their personal preferences are: {preferences}\n\
                     Create a vivid and easy-to-remember mind palace description that incorporates the topic, caters to the user's learning style, and aligns with their preferences.\n\
                     The mind palace should have 5-7 interconnected rooms or areas, each representing a key aspect of the topic.\n\
                     For each room, provide:\n\
                     1. A catchy and memorable name related to the topic\n\
                     2. A vivid description that incorporates the user's preferences and makes use of multiple senses\n\
                     3. 3-5 key elements or objects in the room that represent important information\n\
                     4. How these elements relate to the topic\n\
                     5. A simple and effective memory technique or association specific to the user's learning style\n\
                     Ensure that the mind palace is coherent, with a logical flow between rooms.\n\
                     Format your response as a JSON object with the following structure:\n{MIND_PALACE_SHAPE}\n\
                     Ensure that your response is a valid JSON object. Do not include any text before or after the JSON object."
                ))
            }
        }
    }

    fn request(&self, input: &str) -> String {
        match self {
            Self::Answer => input.to_string(),
            Self::Notes { .. } => format!("Topic: {input}\n\nNotes:"),
            Self::ExamQuestions { difficulty, count, .. } => {
                format!("Please generate {count} {difficulty} questions about {input}.")
            }
            Self::Analysis => format!("Analyze the following topic: {input}"),
            Self::Mnemonic { .. } => format!("Generate a memorable mnemonic for the topic: {input}."),
            Self::MnemonicQuiz => format!("Create a quiz question based on the mnemonic: {input}"),
            Self::MindPalace { .. } => format!("Create a memorable mind palace for the topic: {input}"),
        }
    }
}

/// A [`Persona`] and a [`Task`], rendered into chat messages.
///
/// # Example
///
/// ```rust
/// use sherlock_rag::{Persona, PromptTemplate, Task};
/// use sherlock_model::Role;
///
/// let template = PromptTemplate::new(Persona::Yoda, Task::Answer).unwrap();
/// let messages = template.render_plain("Where is the library?");
/// assert_eq!(messages[0].role, Role::System);
/// assert_eq!(messages[1].content, "Where is the library?");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplate {
    persona: Persona,
    task: Task,
}

impl PromptTemplate {
    /// Combine a persona and a task.
    ///
    /// # Errors
    ///
    /// Returns [`RagError::InvalidConfiguration`] if an exam task asks for
    /// zero questions.
    pub fn new(persona: Persona, task: Task) -> Result<Self> {
        if let Task::ExamQuestions { count: 0, .. } = task {
            return Err(RagError::InvalidConfiguration(
                "exam question count must be at least 1".to_string(),
            ));
        }
        Ok(Self { persona, task })
    }

    /// A question-answering template for `persona`.
    pub fn answer(persona: Persona) -> Self {
        Self { persona, task: Task::Answer }
    }

    /// The persona.
    pub fn persona(&self) -> &Persona {
        &self.persona
    }

    /// The task.
    pub fn task(&self) -> &Task {
        &self.task
    }

    /// The system instruction: the persona, followed by the task's
    /// instruction if it has one.
    pub fn system_instruction(&self) -> String {
        match self.task.instruction() {
            Some(task) => format!("{}\n\n{task}", self.persona.instruction()),
            None => self.persona.instruction().to_string(),
        }
    }

    /// Messages for the retrieval path: system instruction, then the
    /// numbered context passages in retrieval order, then the request.
    pub fn render(&self, input: &str, sources: &[SearchResult]) -> Vec<ChatMessage> {
        let context = format_context(sources);
        let user = match self.task {
            Task::Answer => {
                format!("{CONTEXT_PREAMBLE}\n\n{context}\n\nQuestion: {input}\nHelpful Answer:")
            }
            _ => format!("Context:\n{context}\n\n{}", self.task.request(input)),
        };
        vec![ChatMessage::system(self.system_instruction()), ChatMessage::user(user)]
    }

    /// Messages for the plain path: system instruction, then the request.
    pub fn render_plain(&self, input: &str) -> Vec<ChatMessage> {
        vec![ChatMessage::system(self.system_instruction()), ChatMessage::user(self.task.request(input))]
    }
}

/// Number and label every passage; nothing is merged or dropped.
fn format_context(sources: &[SearchResult]) -> String {
    if sources.is_empty() {
        return NO_CONTEXT.to_string();
    }
    sources
        .iter()
        .enumerate()
        .map(|(i, hit)| {
            format!("[{}] Source: {} (chunk {})\n{}", i + 1, hit.chunk.source, hit.chunk.ordinal, hit.chunk.text)
        })
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use sherlock_model::Role;

    use super::*;
    use crate::document::{Chunk, Document};

    fn hit(source: &str, ordinal: usize, text: &str) -> SearchResult {
        let doc = Document::new(source, text);
        SearchResult { chunk: Chunk::new(&doc, ordinal, 0, text.to_string()), score: 0.5 }
    }

    #[test]
    fn personas_parse_by_name_or_become_custom() {
        assert_eq!("Sherlock".parse::<Persona>().unwrap(), Persona::Sherlock);
        assert_eq!("yoda".parse::<Persona>().unwrap(), Persona::Yoda);
        assert_eq!(
            "You are a pirate.".parse::<Persona>().unwrap(),
            Persona::Custom("You are a pirate.".into())
        );
        assert_eq!(Persona::Custom("   ".into()).instruction(), DEFAULT_INSTRUCTION);
    }

    #[test]
    fn difficulty_parses_loosely_and_displays_labels() {
        assert_eq!("super-easy".parse::<Difficulty>().unwrap(), Difficulty::SuperEasy);
        assert_eq!("Higher Intermediate".parse::<Difficulty>().unwrap(), Difficulty::HigherIntermediate);
        assert_eq!(Difficulty::Master.to_string(), "Master");
        assert!("impossible".parse::<Difficulty>().is_err());
        assert_eq!("DETAILED".parse::<NoteStyle>().unwrap(), NoteStyle::Detailed);
    }

    #[test]
    fn zero_exam_questions_rejected() {
        let task = Task::ExamQuestions { difficulty: Difficulty::Easy, count: 0, include_answers: true };
        assert!(matches!(PromptTemplate::new(Persona::Default, task), Err(RagError::InvalidConfiguration(_))));
    }

    #[test]
    fn render_keeps_retrieval_order_and_labels_sources() {
        let template = PromptTemplate::answer(Persona::Sherlock);
        let sources = [hit("b.txt", 4, "second best"), hit("a.txt", 0, "best"), hit("a.txt", 0, "best")];
        let messages = template.render("Who?", &sources);

        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert!(messages[0].content.starts_with("You are Sherlock Holmes"));

        let user = &messages[1].content;
        let first = user.find("[1] Source: b.txt (chunk 4)\nsecond best").unwrap();
        let second = user.find("[2] Source: a.txt (chunk 0)\nbest").unwrap();
        let third = user.find("[3] Source: a.txt (chunk 0)\nbest").unwrap();
        assert!(first < second && second < third);
        assert!(user.ends_with("Question: Who?\nHelpful Answer:"));
    }

    #[test]
    fn render_without_sources_says_so() {
        let messages = PromptTemplate::default().render("Anything?", &[]);
        assert!(messages[1].content.contains(NO_CONTEXT));
    }

    #[test]
    fn exam_template_mentions_count_and_answers() {
        let task = Task::ExamQuestions { difficulty: Difficulty::Master, count: 7, include_answers: false };
        let template = PromptTemplate::new(Persona::Default, task).unwrap();
        let system = template.system_instruction();
        assert!(system.starts_with(DEFAULT_INSTRUCTION));
        assert!(system.contains("Generate 7 Master-level questions"));
        assert!(system.contains("Do not include answers."));
        assert_eq!(
            template.render_plain("optics")[1].content,
            "Please generate 7 Master questions about optics."
        );
    }

    #[test]
    fn mnemonic_template_mentions_preferences_only_when_given() {
        let task = Task::Mnemonic { preferences: "cricket and jazz".into() };
        let template = PromptTemplate::new(Persona::Default, task).unwrap();
        assert!(template.system_instruction().ends_with("Consider the user's preferences: cricket and jazz."));
        assert_eq!(
            template.render_plain("the planets")[1].content,
            "Generate a memorable mnemonic for the topic: the planets."
        );

        let bare = PromptTemplate::new(Persona::Default, Task::Mnemonic { preferences: "  ".into() }).unwrap();
        assert!(!bare.system_instruction().contains("preferences"));
    }

    #[test]
    fn quiz_template_asks_for_question_and_answer_lines() {
        let template = PromptTemplate::new(Persona::Default, Task::MnemonicQuiz).unwrap();
        assert!(template.system_instruction().contains("Question: [Your question here]\nAnswer: [Your answer here]"));
        assert_eq!(
            template.render_plain("My Very Easy Method")[1].content,
            "Create a quiz question based on the mnemonic: My Very Easy Method"
        );
    }

    #[test]
    fn mind_palace_template_asks_for_json() {
        let task = Task::MindPalace { learning_style: LearningStyle::Kinesthetic, preferences: String::new() };
        let template = PromptTemplate::new(Persona::Default, task).unwrap();
        let system = template.system_instruction();
        assert!(system.contains("preferred learning style is 'Kinesthetic'"));
        assert!(system.contains("preferences are: none given"));
        assert!(system.contains("\"memory_technique\""));
        assert!(system.ends_with("Do not include any text before or after the JSON object."));

        let messages = template.render("the French Revolution", &[hit("history.md", 1, "1789")]);
        assert!(messages[1].content.ends_with("Create a memorable mind palace for the topic: the French Revolution"));
    }

    #[test]
    fn learning_styles_parse_loosely() {
        assert_eq!("reading-writing".parse::<LearningStyle>().unwrap(), LearningStyle::ReadingWriting);
        assert_eq!(LearningStyle::ReadingWriting.to_string(), "Reading/Writing");
        assert!("olfactory".parse::<LearningStyle>().is_err());
    }

    #[test]
    fn notes_template_uses_style_and_length() {
        let task = Task::Notes { style: NoteStyle::Academic, length: NoteLength::Long };
        let template = PromptTemplate::new(Persona::Default, task).unwrap();
        assert!(template.system_instruction().contains("create academic and long notes"));
        let messages = template.render("thermodynamics", &[hit("physics.pdf", 2, "entropy rises")]);
        assert!(messages[1].content.starts_with("Context:\n[1] Source: physics.pdf (chunk 2)"));
        assert!(messages[1].content.ends_with("Topic: thermodynamics\n\nNotes:"));
    }
}

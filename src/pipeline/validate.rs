//! Lightweight scope check for transcribed questions
//!
//! A transcript is accepted when it reads like a question or request and
//! either mentions the science curriculum or avoids known off-topic subjects.

use crate::Language;
use crate::services::Subject;

const ENGLISH_CUES: &[&str] = &[
    "what", "how", "why", "when", "where", "which", "who", "whose", "explain", "describe",
    "define", "tell", "give", "list", "compare", "name", "state",
];

const TELUGU_CUES: &[&str] = &[
    "ఏమిటి",
    "ఏమి",
    "ఎలా",
    "ఎందుకు",
    "ఎప్పుడు",
    "ఎక్కడ",
    "ఏది",
    "ఎవరు",
    "వివరించండి",
    "చెప్పండి",
    "తెలపండి",
    "నిర్వచించండి",
];

/// Word stems per subject; an English token matches when it starts with a stem
const PHYSICS: &[&str] = &[
    "light", "reflect", "refract", "mirror", "lens", "prism", "spectrum", "eye", "electric",
    "current", "voltage", "ohm", "resist", "circuit", "magnet", "motor", "generator", "energy",
    "sound", "wave", "force", "power",
];
const CHEMISTRY: &[&str] = &[
    "acid", "base", "salt", "metal", "nonmetal", "corros", "rust", "chemical", "reaction",
    "equation", "carbon", "compound", "element", "periodic", "soap", "oxid", "reduc", "neutraliz",
    "ion", "molecule", "atom",
];
const BIOLOGY: &[&str] = &[
    "plant", "photosynth", "cell", "kidney", "heart", "blood", "breath", "respir", "digest",
    "nutrition", "reproduc", "hormone", "nerv", "brain", "heredity", "evolution", "gene",
    "organ", "excret", "pollinat", "seed", "lung",
];

const TELUGU_PHYSICS: &[&str] = &["కాంతి", "పరావర్తనం", "వక్రీభవనం", "దర్పణం", "విద్యుత్", "అయస్కాంత"];
const TELUGU_CHEMISTRY: &[&str] = &["ఆమ్ల", "క్షార", "లవణ", "లోహ", "రసాయన", "తుప్పు"];
const TELUGU_BIOLOGY: &[&str] = &["మొక్క", "కిరణజన్య", "గుండె", "రక్త", "శ్వాస", "మూత్రపిండ", "కణ"];

const OFF_TOPIC: &[&str] = &[
    "cricket", "movie", "movies", "film", "song", "songs", "weather", "joke", "jokes", "politics",
    "election", "recipe", "cook", "game", "games", "actor", "actress", "news",
];

/// Outcome of the scope check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accepted { subject: Option<Subject> },
    /// Neither a question word nor a request verb was found
    NotAQuestion,
    /// Mentions an off-topic subject and nothing from the curriculum
    OffTopic,
}

impl Verdict {
    #[cfg(test)]
    const fn is_accepted(self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Check whether `transcript` is an in-scope question
#[must_use]
pub fn validate_question(transcript: &str, language: Language) -> Verdict {
    let lower = transcript.to_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !(c.is_alphanumeric() || c == '\''))
        .filter(|t| !t.is_empty())
        .collect();

    let has_cue = lower.contains('?')
        || tokens.iter().any(|t| ENGLISH_CUES.contains(t))
        || (language == Language::Telugu && TELUGU_CUES.iter().any(|c| lower.contains(c)));
    if !has_cue {
        return Verdict::NotAQuestion;
    }

    let subject = detect_subject(&lower, &tokens);
    if subject.is_none() && tokens.iter().any(|t| OFF_TOPIC.contains(t)) {
        return Verdict::OffTopic;
    }

    Verdict::Accepted { subject }
}

/// Subject with the most keyword hits, if any
fn detect_subject(lower: &str, tokens: &[&str]) -> Option<Subject> {
    let english_hits = |stems: &[&str]| {
        tokens
            .iter()
            .filter(|t| stems.iter().any(|s| t.starts_with(s)))
            .count()
    };
    let telugu_hits = |stems: &[&str]| stems.iter().filter(|s| lower.contains(*s)).count();

    [
        (Subject::Physics, english_hits(PHYSICS) + telugu_hits(TELUGU_PHYSICS)),
        (Subject::Chemistry, english_hits(CHEMISTRY) + telugu_hits(TELUGU_CHEMISTRY)),
        (Subject::Biology, english_hits(BIOLOGY) + telugu_hits(TELUGU_BIOLOGY)),
    ]
    .into_iter()
    .filter(|(_, hits)| *hits > 0)
    .max_by_key(|(_, hits)| *hits)
    .map(|(subject, _)| subject)
}

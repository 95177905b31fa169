//! Voice markup documents (TwiML/Exotel-compatible XML)

use std::fmt::Write;

use crate::Language;

/// Voice used for every `<Say>`
const VOICE: &str = "alice";

/// One instruction in a voice response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verb {
    Say {
        language: Language,
        text: String,
    },
    Play {
        url: String,
    },
    Pause {
        seconds: u32,
    },
    Gather {
        num_digits: u32,
        timeout_secs: u32,
        action: String,
        prompt: Vec<Verb>,
    },
    Record {
        max_length_secs: u32,
        timeout_secs: u32,
        finish_on_key: char,
        action: String,
        status_callback: String,
    },
    Redirect {
        url: String,
    },
    Hangup,
}

/// A complete voice response document
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VoiceResponse {
    verbs: Vec<Verb>,
}

impl VoiceResponse {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn say(mut self, language: Language, text: impl Into<String>) -> Self {
        self.verbs.push(Verb::Say {
            language,
            text: text.into(),
        });
        self
    }

    #[must_use]
    pub fn play(mut self, url: impl Into<String>) -> Self {
        self.verbs.push(Verb::Play { url: url.into() });
        self
    }

    #[must_use]
    pub fn pause(mut self, seconds: u32) -> Self {
        self.verbs.push(Verb::Pause { seconds });
        self
    }

    /// Collect a single DTMF digit, speaking `prompt` while waiting
    #[must_use]
    pub fn gather(mut self, action: &str, timeout_secs: u32, prompt: Vec<Verb>) -> Self {
        self.verbs.push(Verb::Gather {
            num_digits: 1,
            timeout_secs,
            action: action.to_string(),
            prompt,
        });
        self
    }

    #[must_use]
    pub fn record(
        mut self,
        action: &str,
        status_callback: &str,
        max_length_secs: u32,
        timeout_secs: u32,
    ) -> Self {
        self.verbs.push(Verb::Record {
            max_length_secs,
            timeout_secs,
            finish_on_key: '#',
            action: action.to_string(),
            status_callback: status_callback.to_string(),
        });
        self
    }

    #[must_use]
    pub fn redirect(mut self, url: &str) -> Self {
        self.verbs.push(Verb::Redirect {
            url: url.to_string(),
        });
        self
    }

    #[must_use]
    pub fn hangup(mut self) -> Self {
        self.verbs.push(Verb::Hangup);
        self
    }

    #[must_use]
    pub fn verbs(&self) -> &[Verb] {
        &self.verbs
    }

    /// Whether the document ends the call
    #[must_use]
    pub fn hangs_up(&self) -> bool {
        self.verbs.iter().any(|v| matches!(v, Verb::Hangup))
    }

    /// First redirect target, if any
    #[must_use]
    pub fn redirect_target(&self) -> Option<&str> {
        self.verbs.iter().find_map(|v| match v {
            Verb::Redirect { url } => Some(url.as_str()),
            _ => None,
        })
    }

    /// First gather action, if any
    #[must_use]
    pub fn gather_action(&self) -> Option<&str> {
        self.verbs.iter().find_map(|v| match v {
            Verb::Gather { action, .. } => Some(action.as_str()),
            _ => None,
        })
    }

    /// Every URL played, including inside gathers
    #[must_use]
    pub fn played_urls(&self) -> Vec<&str> {
        fn collect<'a>(verbs: &'a [Verb], out: &mut Vec<&'a str>) {
            for verb in verbs {
                match verb {
                    Verb::Play { url } => out.push(url),
                    Verb::Gather { prompt, .. } => collect(prompt, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.verbs, &mut out);
        out
    }

    /// All spoken text, including inside gathers, joined with spaces
    #[must_use]
    pub fn spoken_text(&self) -> String {
        fn collect(verbs: &[Verb], out: &mut Vec<String>) {
            for verb in verbs {
                match verb {
                    Verb::Say { text, .. } => out.push(text.clone()),
                    Verb::Gather { prompt, .. } => collect(prompt, out),
                    _ => {}
                }
            }
        }
        let mut out = Vec::new();
        collect(&self.verbs, &mut out);
        out.join(" ")
    }

    /// Serialize as an XML document
    #[must_use]
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(r#"<?xml version="1.0" encoding="UTF-8"?><Response>"#);
        for verb in &self.verbs {
            write_verb(&mut xml, verb);
        }
        xml.push_str("</Response>");
        xml
    }
}

/// Build a `<Say>` verb for use inside a gather prompt
#[must_use]
pub fn say(language: Language, text: impl Into<String>) -> Verb {
    Verb::Say {
        language,
        text: text.into(),
    }
}

fn write_verb(xml: &mut String, verb: &Verb) {
    // Writing to a String cannot fail
    let _ = match verb {
        Verb::Say { language, text } => write!(
            xml,
            r#"<Say voice="{VOICE}" language="{}">{}</Say>"#,
            language.locale(),
            escape_xml(text)
        ),
        Verb::Play { url } => write!(xml, "<Play>{}</Play>", escape_xml(url)),
        Verb::Pause { seconds } => write!(xml, r#"<Pause length="{seconds}"/>"#),
        Verb::Gather {
            num_digits,
            timeout_secs,
            action,
            prompt,
        } => {
            let _ = write!(
                xml,
                r#"<Gather numDigits="{num_digits}" timeout="{timeout_secs}" action="{}" method="POST">"#,
                escape_xml(action)
            );
            for inner in prompt {
                write_verb(xml, inner);
            }
            write!(xml, "</Gather>")
        }
        Verb::Record {
            max_length_secs,
            timeout_secs,
            finish_on_key,
            action,
            status_callback,
        } => write!(
            xml,
            r#"<Record maxLength="{max_length_secs}" timeout="{timeout_secs}" finishOnKey="{finish_on_key}" action="{}" method="POST" recordingStatusCallback="{}"/>"#,
            escape_xml(action),
            escape_xml(status_callback)
        ),
        Verb::Redirect { url } => write!(
            xml,
            r#"<Redirect method="POST">{}</Redirect>"#,
            escape_xml(url)
        ),
        Verb::Hangup => write!(xml, "<Hangup/>"),
    };
}

/// Escape text for XML element content and attribute values
fn escape_xml(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

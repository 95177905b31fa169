//! Spoken prompts and rendering of menu directives into markup

use crate::Language;
use crate::config::TelephonyConfig;
use crate::recovery::ErrorCategory;

use super::markup::{Verb, VoiceResponse, say};
use super::menu::{Directive, FixedMenu};
use super::{
    DETAILED_ANSWER, ERROR_RECOVERY, FOLLOW_UP_MENU, GRADE_CONFIRMATION, INTERACTION_MODE,
    INTERACTION_MODE_SELECTION, LANGUAGE_SELECTION, QUESTION_RECORDING, RECORDING_STATUS,
    RESPONSE_DELIVERY,
};

const fn pick(language: Language, english: &'static str, telugu: &'static str) -> &'static str {
    match language {
        Language::English => english,
        Language::Telugu => telugu,
    }
}

const WELCOME: &str = "Welcome to VidyaVani, your AI learning assistant. Press 1 for English or Press 2 for Telugu.";
const WELCOME_TELUGU: &str = "ఇంగ్లీష్ కోసం 1, తెలుగు కోసం 2 నొక్కండి.";

const fn no_input(language: Language) -> &'static str {
    pick(language, "No input received. Goodbye.", "ఇన్‌పుట్ రాలేదు. వీడ్కోలు.")
}

const fn goodbye(language: Language) -> &'static str {
    pick(
        language,
        "Thank you for using VidyaVani. Goodbye!",
        "విద్యావాణిని ఉపయోగించినందుకు ధన్యవాదాలు. వీడ్కోలు!",
    )
}

const fn grade_confirmation(language: Language) -> &'static str {
    pick(
        language,
        "Great! You have selected English. This system helps Class 10 students with Science questions. Press any key to continue.",
        "మీరు తెలుగు ఎంచుకున్నారు. ఈ సిస్టమ్ క్లాస్ 10 విద్యార్థులకు సైన్స్ ప్రశ్నలతో సహాయం చేస్తుంది. కొనసాగించడానికి ఏదైనా కీ నొక్కండి.",
    )
}

const fn interaction_menu(language: Language) -> &'static str {
    pick(
        language,
        "How would you like to learn today? Press 1 to browse topics or Press 2 to ask a question directly.",
        "ఈరోజు మీరు ఎలా నేర్చుకోవాలనుకుంటున్నారు? టాపిక్స్ బ్రౌజ్ చేయడానికి 1 నొక్కండి లేదా నేరుగా ప్రశ్న అడగడానికి 2 నొక్కండి.",
    )
}

const fn record_prompt(language: Language) -> &'static str {
    pick(
        language,
        "Please ask your science question clearly. You have 15 seconds. Start speaking after the beep.",
        "దయచేసి మీ సైన్స్ ప్రశ్నను స్పష్టంగా అడగండి. మీకు 15 సెకన్లు ఉన్నాయి. బీప్ తర్వాత మాట్లాడటం ప్రారంభించండి.",
    )
}

const fn too_short(language: Language) -> &'static str {
    pick(
        language,
        "Your recording was too short.",
        "మీ రికార్డింగ్ చాలా చిన్నదిగా ఉంది.",
    )
}

const fn too_long(language: Language) -> &'static str {
    pick(
        language,
        "Your recording was too long. Please keep your question short.",
        "మీ రికార్డింగ్ చాలా పొడవుగా ఉంది. దయచేసి మీ ప్రశ్నను చిన్నగా అడగండి.",
    )
}

const fn processing(language: Language) -> &'static str {
    pick(
        language,
        "Thank you for your question. I am processing it now. Please wait a moment.",
        "మీ ప్రశ్నకు ధన్యవాదాలు. నేను దానిని ఇప్పుడు ప్రాసెస్ చేస్తున్నాను. దయచేసి కాసేపు వేచి ఉండండి.",
    )
}

const fn please_wait(language: Language) -> &'static str {
    pick(language, "Please wait.", "దయచేసి వేచి ఉండండి.")
}

const fn detail_wait(language: Language) -> &'static str {
    pick(
        language,
        "Preparing a detailed explanation. Please wait.",
        "వివరణాత్మక సమాధానం సిద్ధం చేస్తున్నాను. దయచేసి వేచి ఉండండి.",
    )
}

const fn no_audio(language: Language) -> &'static str {
    pick(
        language,
        "I apologize, but I couldn't generate an audio response. Please try asking your question again.",
        "క్షమించండి, నేను ఆడియో రెస్పాన్స్ జనరేట్ చేయలేకపోయాను. దయచేసి మీ ప్రశ్నను మళ్లీ అడగండి.",
    )
}

const fn follow_up_menu(language: Language) -> &'static str {
    pick(
        language,
        "Press 1 for detailed explanation, Press 2 to hear again, Press 3 for new question, or Press 9 for main menu.",
        "వివరణ కోసం 1 నొక్కండి, మళ్లీ వినడానికి 2 నొక్కండి, కొత్త ప్రశ్న కోసం 3 నొక్కండి, లేదా మెయిన్ మెనూ కోసం 9 నొక్కండి.",
    )
}

const fn recovery_menu(language: Language) -> &'static str {
    pick(
        language,
        "Press 1 to try again, or Press 9 for main menu.",
        "మళ్లీ ప్రయత్నించడానికి 1 నొక్కండి, లేదా మెయిన్ మెనూ కోసం 9 నొక్కండి.",
    )
}

const fn invalid_selection(menu: FixedMenu, language: Language) -> &'static str {
    match menu {
        FixedMenu::Language => pick(
            language,
            "Invalid selection. Press 1 for English or Press 2 for Telugu.",
            "తప్పు ఎంపిక. ఇంగ్లీష్ కోసం 1 లేదా తెలుగు కోసం 2 నొక్కండి.",
        ),
        FixedMenu::Interaction => pick(
            language,
            "Invalid selection. Press 1 to browse topics or Press 2 to ask a question.",
            "తప్పు ఎంపిక. టాపిక్స్ బ్రౌజ్ చేయడానికి 1 లేదా ప్రశ్న అడగడానికి 2 నొక్కండి.",
        ),
        FixedMenu::FollowUp => pick(
            language,
            "Invalid selection. Press 1 for detailed explanation, 2 to hear again, 3 for new question, or 9 for main menu.",
            "తప్పు ఎంపిక. వివరణ కోసం 1, మళ్లీ వినడానికి 2, కొత్త ప్రశ్న కోసం 3, లేదా మెయిన్ మెనూ కోసం 9 నొక్కండి.",
        ),
        FixedMenu::ErrorRecovery => pick(
            language,
            "Invalid selection. Please try again.",
            "తప్పు ఎంపిక. దయచేసి మళ్లీ ప్రయత్నించండి.",
        ),
    }
}

const fn returning_to_menu(language: Language) -> &'static str {
    pick(
        language,
        "Too many invalid selections. Returning to main menu.",
        "చాలా తప్పు ఎంపికలు. మెయిన్ మెనూకు తిరిగి వెళ్తున్నాము.",
    )
}

const fn topics_unavailable(language: Language) -> &'static str {
    pick(
        language,
        "Sorry, topic browsing is not available yet. Returning to main menu.",
        "క్షమించండి, టాపిక్ బ్రౌజింగ్ ఇంకా అందుబాటులో లేదు. మెయిన్ మెనూకు తిరిగి వెళ్తున్నాము.",
    )
}

/// Render a directive as the markup returned to the provider
#[must_use]
pub fn render(directive: &Directive, language: Language, config: &TelephonyConfig) -> VoiceResponse {
    let doc = VoiceResponse::new();
    match directive {
        Directive::Welcome => welcome(doc, config),
        Directive::GradeConfirmation => doc
            .gather(
                GRADE_CONFIRMATION,
                config.gather_timeout_secs,
                vec![say(language, grade_confirmation(language))],
            )
            .redirect(INTERACTION_MODE),
        Directive::InteractionMenu => interaction(doc, language, config),
        Directive::RecordQuestion => record(doc, language, config),
        Directive::RecordingTooShort => record(doc.say(language, too_short(language)), language, config),
        Directive::RecordingTooLong => record(doc.say(language, too_long(language)), language, config),
        Directive::Processing => doc
            .say(language, processing(language))
            .pause(config.poll_pause_secs)
            .redirect(RESPONSE_DELIVERY),
        Directive::PleaseWait => doc
            .say(language, please_wait(language))
            .pause(config.poll_pause_secs)
            .redirect(RESPONSE_DELIVERY),
        Directive::DeliverAnswer { audio_url } => {
            let doc = match audio_url {
                Some(url) => doc.play(url.as_str()),
                None => doc.say(language, no_audio(language)),
            };
            follow_up(doc, language, config)
        }
        Directive::PlayAnswer { audio_url } => follow_up(doc.play(audio_url.as_str()), language, config),
        Directive::SpeakAnswer { text } => follow_up(doc.say(language, text.as_str()), language, config),
        Directive::DetailPleaseWait => doc
            .say(language, detail_wait(language))
            .pause(config.poll_pause_secs)
            .redirect(DETAILED_ANSWER),
        Directive::InvalidSelection(menu) => invalid(doc, *menu, language, config),
        Directive::ReturningToMainMenu => {
            interaction(doc.say(language, returning_to_menu(language)), language, config)
        }
        Directive::TopicsUnavailable => doc
            .say(language, topics_unavailable(language))
            .redirect(INTERACTION_MODE),
        Directive::ErrorFallback(category) => error_fallback(*category, language, config),
        Directive::CallEnded => doc,
    }
}

/// Categorized failure: the message, an optional retry menu, then menu or goodbye
#[must_use]
pub fn error_fallback(category: ErrorCategory, language: Language, config: &TelephonyConfig) -> VoiceResponse {
    let mut doc = VoiceResponse::new().say(language, category.message(language));
    if category.offers_caller_retry() {
        doc = doc.gather(
            ERROR_RECOVERY,
            config.gather_timeout_secs,
            vec![say(language, recovery_menu(language))],
        );
    }
    if category.redirects_to_menu() {
        doc.pause(1).redirect(INTERACTION_MODE)
    } else {
        doc.say(language, goodbye(language)).hangup()
    }
}

/// Generic failure in the webhook path; ends the call politely
#[must_use]
pub fn system_error(language: Language) -> VoiceResponse {
    VoiceResponse::new()
        .say(language, ErrorCategory::System.message(language))
        .say(language, goodbye(language))
        .hangup()
}

fn welcome(doc: VoiceResponse, config: &TelephonyConfig) -> VoiceResponse {
    doc.gather(LANGUAGE_SELECTION, config.gather_timeout_secs, welcome_prompt())
        .say(Language::English, no_input(Language::English))
        .hangup()
}

fn welcome_prompt() -> Vec<Verb> {
    vec![
        say(Language::English, WELCOME),
        say(Language::Telugu, WELCOME_TELUGU),
    ]
}

fn interaction(doc: VoiceResponse, language: Language, config: &TelephonyConfig) -> VoiceResponse {
    doc.gather(
        INTERACTION_MODE_SELECTION,
        config.menu_timeout_secs,
        vec![say(language, interaction_menu(language))],
    )
    .say(language, no_input(language))
    .hangup()
}

fn record(doc: VoiceResponse, language: Language, config: &TelephonyConfig) -> VoiceResponse {
    doc.say(language, record_prompt(language)).record(
        QUESTION_RECORDING,
        RECORDING_STATUS,
        config.record_max_length_secs,
        config.record_silence_timeout_secs,
    )
}

fn follow_up(doc: VoiceResponse, language: Language, config: &TelephonyConfig) -> VoiceResponse {
    doc.gather(
        FOLLOW_UP_MENU,
        config.menu_timeout_secs,
        vec![say(language, follow_up_menu(language))],
    )
    .say(language, goodbye(language))
    .hangup()
}

fn invalid(doc: VoiceResponse, menu: FixedMenu, language: Language, config: &TelephonyConfig) -> VoiceResponse {
    let message = say(language, invalid_selection(menu, language));
    match menu {
        FixedMenu::Language => doc
            .gather(LANGUAGE_SELECTION, config.gather_timeout_secs, vec![message])
            .say(language, no_input(language))
            .hangup(),
        FixedMenu::Interaction => doc
            .gather(INTERACTION_MODE_SELECTION, config.menu_timeout_secs, vec![message])
            .say(language, no_input(language))
            .hangup(),
        FixedMenu::FollowUp => doc
            .gather(FOLLOW_UP_MENU, config.menu_timeout_secs, vec![message])
            .say(language, goodbye(language))
            .hangup(),
        FixedMenu::ErrorRecovery => doc
            .gather(
                ERROR_RECOVERY,
                config.gather_timeout_secs,
                vec![message, say(language, recovery_menu(language))],
            )
            .pause(1)
            .redirect(INTERACTION_MODE),
    }
}

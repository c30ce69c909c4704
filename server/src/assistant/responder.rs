use chrono::{DateTime, Utc};
use indoc::formatdoc;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::assistant::gemini::GenerativeClient;
use crate::email::message::NormalizedMessage;
use crate::rate_limiters::RateLimiters;
use crate::server_config::cfg;

/// Per-message body excerpt carried into the prompt context.
const CONTEXT_BODY_CAP: usize = 300;
/// Unread messages listed by the deterministic fallback.
const FALLBACK_UNREAD_LIMIT: usize = 5;
/// One-line summaries shown for a multi-match sender lookup.
const SENDER_SUMMARY_LIMIT: usize = 3;

static RE_COMPOSE_ADDRESS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(?:to|send.*to)\s+([a-zA-Z0-9._%+-]+@[a-zA-Z0-9.\-]+\.[a-zA-Z]{2,})").unwrap()
});

/// Trimmed view of a message embedded in prompts and reused by the
/// deterministic fallbacks, so both tiers answer over the same data.
#[derive(Debug, Clone, Serialize)]
pub struct EmailContext {
    pub id: String,
    pub from: String,
    pub subject: String,
    pub snippet: String,
    pub body: String,
    pub unread: bool,
    pub date: DateTime<Utc>,
}

pub fn email_context(messages: &[NormalizedMessage]) -> Vec<EmailContext> {
    messages
        .iter()
        .map(|m| EmailContext {
            id: m.id.clone(),
            from: m.from.clone(),
            subject: m.subject.clone(),
            snippet: m.snippet.clone(),
            body: if m.body.is_empty() {
                m.snippet.clone()
            } else {
                m.body.chars().take(CONTEXT_BODY_CAP).collect()
            },
            unread: m.unread,
            date: m.date,
        })
        .collect()
}

/// Turns one instruction plus the current message set into exactly one
/// textual response. Generative failures never escape: every path ends in
/// either backend output or a deterministic substitute.
pub struct Assistant {
    generative: GenerativeClient,
    rate_limiters: RateLimiters,
    known_senders: Vec<String>,
}

impl Assistant {
    pub fn new(generative: GenerativeClient, rate_limiters: RateLimiters) -> Assistant {
        let known_senders = cfg
            .known_senders
            .iter()
            .map(|s| s.keyword.to_lowercase())
            .collect();
        Assistant {
            generative,
            rate_limiters,
            known_senders,
        }
    }

    pub fn known_senders(&self) -> &[String] {
        &self.known_senders
    }

    /// General analysis over the fetched message set.
    pub async fn analyze(&self, messages: &[NormalizedMessage], query: &str) -> String {
        if messages.is_empty() {
            return "I don't see any emails to analyze. Please make sure your Gmail is \
                    connected and you have emails in your inbox."
                .to_string();
        }

        let context = email_context(messages);
        let prompt = analysis_prompt(query, &context);

        match self.generative.complete(&self.rate_limiters, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Generative analysis failed, using fallback: {}", e);
                fallback_response(&context, query, &self.known_senders)
            }
        }
    }

    /// Draft a reply to one target message.
    pub async fn draft_response(&self, original: &NormalizedMessage, instruction: &str) -> String {
        if instruction.trim().is_empty() {
            return "I need both the original email and your instructions to draft a \
                    response. Could you provide both?"
                .to_string();
        }

        let prompt = draft_prompt(original, instruction);

        match self.generative.complete(&self.rate_limiters, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Generative draft failed, using fallback: {}", e);
                fallback_draft(original, instruction)
            }
        }
    }

    /// Compose a fresh email from an instruction alone.
    pub async fn compose(&self, instruction: &str) -> String {
        let prompt = compose_prompt(instruction);

        match self.generative.complete(&self.rate_limiters, &prompt).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!("Generative compose failed, using fallback: {}", e);
                fallback_compose(instruction)
            }
        }
    }
}

/// Deterministic sender filter: case-insensitive substring match on the
/// sender address, original order preserved.
pub fn filter_by_sender<'a>(context: &'a [EmailContext], term: &str) -> Vec<&'a EmailContext> {
    let term = term.to_lowercase();
    context
        .iter()
        .filter(|email| email.from.to_lowercase().contains(&term))
        .collect()
}

pub fn search_specific_sender(context: &[EmailContext], term: &str) -> String {
    let matches = filter_by_sender(context, term);

    if matches.is_empty() {
        return format!("No emails found from \"{}\".", term);
    }

    if let [email] = matches.as_slice() {
        return formatdoc! {r#"
            Yes, I found 1 email from {term}:

            **From:** {from}
            **Subject:** {subject}
            **Date:** {date}
            **Status:** {status}"#,
            from = email.from,
            subject = email.subject,
            date = format_date(email.date),
            status = read_status(email.unread),
        };
    }

    let lines = matches
        .iter()
        .take(SENDER_SUMMARY_LIMIT)
        .enumerate()
        .map(|(i, email)| {
            format!(
                "{}. **{}** ({}) - {}",
                i + 1,
                email.subject,
                format_date(email.date),
                read_status(email.unread)
            )
        })
        .collect::<Vec<_>>()
        .join("\n");

    let mut response = formatdoc! {r#"
        Yes, I found {count} emails from {term}:

        {lines}"#,
        count = matches.len(),
    };

    if matches.len() > SENDER_SUMMARY_LIMIT {
        response.push_str(&format!(
            "\n\n... and {} more emails.",
            matches.len() - SENDER_SUMMARY_LIMIT
        ));
    }

    response
}

/// Deterministic substitute when the generative backend fails for any
/// reason; always produces a non-empty answer.
pub fn fallback_response(context: &[EmailContext], query: &str, known_senders: &[String]) -> String {
    let query = query.to_lowercase();

    if query.contains("unread") {
        let unread = context.iter().filter(|e| e.unread).collect::<Vec<_>>();
        if unread.is_empty() {
            return "You have no unread emails.".to_string();
        }

        let lines = unread
            .iter()
            .take(FALLBACK_UNREAD_LIMIT)
            .enumerate()
            .map(|(i, email)| format!("{}. **{}** - \"{}\"", i + 1, email.from, email.subject))
            .collect::<Vec<_>>()
            .join("\n");

        return formatdoc! {r#"
            You have {count} unread emails:

            {lines}"#,
            count = unread.len(),
        };
    }

    if let Some(keyword) = known_senders.iter().find(|kw| query.contains(kw.as_str())) {
        return search_specific_sender(context, keyword);
    }

    "I can help you with your emails. What would you like me to do?".to_string()
}

/// Deterministic reply draft: greeting, acknowledgement clauses keyed on
/// instruction keywords, sign-off, and an explicit draft disclaimer.
pub fn fallback_draft(original: &NormalizedMessage, instruction: &str) -> String {
    let sender_name = display_name(&original.from);
    let instruction_lower = instruction.to_lowercase();

    let mut clauses = Vec::new();
    if instruction_lower.contains("acknowledge") {
        clauses.push("I acknowledge receipt of your message.");
    }
    if instruction_lower.contains("schedule") {
        clauses.push("I will check my calendar and get back to you with available times.");
    }
    if instruction_lower.contains("review") {
        clauses.push("I will review the information you provided and respond accordingly.");
    }
    if instruction_lower.contains("urgent") {
        clauses.push("I understand this is urgent and will prioritize accordingly.");
    }

    let clauses = if clauses.is_empty() {
        String::new()
    } else {
        format!("{}\n\n", clauses.join("\n"))
    };

    let verb = if instruction_lower.contains("follow up") {
        "follow up"
    } else {
        "get back to you"
    };
    let when = if instruction_lower.contains("today") {
        "today"
    } else {
        "soon"
    };

    formatdoc! {r#"
        **Draft Response to {name}:**

        Subject: Re: {subject}

        Hi {name},

        Thank you for your email regarding "{subject}".

        {clauses}I will {verb} {when}.

        Best regards,
        [Your Name]

        ---
        *Note: This is a draft response. Please review and modify as needed before sending.*"#,
        name = sender_name,
        subject = original.subject,
        clauses = clauses,
        verb = verb,
        when = when,
    }
}

/// Deterministic compose fallback: extract a recipient address if the
/// instruction carries one, otherwise ask for the three required fields.
pub fn fallback_compose(instruction: &str) -> String {
    let instruction_lower = instruction.to_lowercase();

    let Some(address) = RE_COMPOSE_ADDRESS
        .captures(instruction)
        .map(|caps| caps[1].to_string())
    else {
        return formatdoc! {r#"
            To compose an email, I need:

            1. **Recipient email address** (who should receive it?)
            2. **Subject line** (what's it about?)
            3. **Message content** (what do you want to say?)

            Please provide these details, for example:
            "Send email to john@example.com about meeting tomorrow""#,
        };
    };

    let mut openings = Vec::new();
    if instruction_lower.contains("meeting") {
        openings.push("I would like to schedule a meeting to discuss...");
    }
    if instruction_lower.contains("follow up") {
        openings.push("I wanted to follow up on...");
    }
    if instruction_lower.contains("thank") {
        openings.push("Thank you for...");
    }

    let openings = if openings.is_empty() {
        String::new()
    } else {
        format!("{}\n\n", openings.join("\n"))
    };

    formatdoc! {r#"
        **Draft Email:**

        **To:** {address}
        **Subject:** [Please specify subject]

        Hi,

        {openings}Please let me know your thoughts.

        Best regards,
        [Your Name]

        ---
        *What subject would you like for this email?*"#,
        address = address,
        openings = openings,
    }
}

/// Display name for a bare or decorated address: text before `@` / `<`.
fn display_name(from: &str) -> String {
    from.split('@')
        .next()
        .unwrap_or(from)
        .split('<')
        .next()
        .unwrap_or(from)
        .trim()
        .to_string()
}

fn format_date(date: DateTime<Utc>) -> String {
    date.format("%-m/%-d/%Y").to_string()
}

fn read_status(unread: bool) -> &'static str {
    if unread {
        "Unread"
    } else {
        "Read"
    }
}

fn analysis_prompt(query: &str, context: &[EmailContext]) -> String {
    let context_json =
        serde_json::to_string_pretty(context).unwrap_or_else(|_| "[]".to_string());

    formatdoc! {r#"
        You are a helpful Gmail AI assistant. Give FOCUSED, CONCISE responses. Only provide what the user specifically asks for.

        User Query: "{query}"

        Email Context ({count} emails):
        {context_json}

        Instructions:
        1. Be direct and specific - only answer what was asked
        2. If asking about specific emails/senders, give exact matches
        3. If asking for summaries, be concise
        4. If asking about unread emails, list them clearly
        5. Don't provide extra information unless requested
        6. Use simple, clean formatting

        Respond directly to the user's question:"#,
        query = query,
        count = context.len(),
        context_json = context_json,
    }
}

fn draft_prompt(original: &NormalizedMessage, instruction: &str) -> String {
    let body = if original.body.is_empty() {
        original.snippet.as_str()
    } else {
        original.body.as_str()
    };

    formatdoc! {r#"
        Draft a professional email response based on the following:

        Original Email:
        From: {from}
        Subject: {subject}
        Body: {body}
        Date: {date}

        User Instruction: "{instruction}"

        Instructions:
        1. Keep the response professional and appropriate for the context
        2. Address all points mentioned in the user's instruction
        3. Maintain a friendly but professional tone
        4. Include a proper greeting and sign-off
        5. Keep it concise but complete
        6. Format the response clearly

        Draft the email response now:"#,
        from = original.from,
        subject = original.subject,
        body = body,
        date = original.date.to_rfc3339(),
        instruction = instruction,
    }
}

fn compose_prompt(instruction: &str) -> String {
    formatdoc! {r#"
        Help the user compose an email based on their instruction: "{instruction}"

        Extract the following information:
        1. Recipient email address (if mentioned)
        2. Subject line
        3. Email body content

        If any information is missing, ask the user for clarification.

        Format your response as:
        - If all information is available, provide a complete email draft
        - If information is missing, ask specific questions

        Instructions for drafting:
        1. Keep it professional and appropriate
        2. Use clear, concise language
        3. Include proper greeting and sign-off
        4. Make the subject line descriptive

        Draft the email now:"#,
        instruction = instruction,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::common::{normalized_message, read_message, unread_message};
    use chrono::TimeZone;

    fn context_from(messages: &[NormalizedMessage]) -> Vec<EmailContext> {
        email_context(messages)
    }

    #[test]
    fn test_sender_filter_matches_substring_case_insensitive() {
        let messages = vec![
            unread_message("1", "billing@mobbin.com", "Your invoice"),
            read_message("2", "news@other.com", "Weekly digest"),
            unread_message("3", "support@MOBBIN.com", "Ticket update"),
        ];
        let context = context_from(&messages);

        let matches = filter_by_sender(&context, "Mobbin");
        assert_eq!(
            matches.iter().map(|e| e.id.as_str()).collect::<Vec<_>>(),
            vec!["1", "3"],
            "matches must preserve original relative order"
        );
    }

    #[test]
    fn test_sender_search_no_matches() {
        let context = context_from(&[read_message("1", "news@other.com", "Digest")]);
        assert_eq!(
            search_specific_sender(&context, "mobbin"),
            "No emails found from \"mobbin\"."
        );
    }

    #[test]
    fn test_sender_search_single_match_card() {
        let mut message = unread_message("1", "billing@mobbin.com", "Your invoice");
        message.date = Utc.with_ymd_and_hms(2024, 8, 6, 12, 0, 0).unwrap();
        let context = context_from(&[message]);

        let response = search_specific_sender(&context, "mobbin");
        assert!(response.starts_with("Yes, I found 1 email from mobbin:"));
        assert!(response.contains("**From:** billing@mobbin.com"));
        assert!(response.contains("**Subject:** Your invoice"));
        assert!(response.contains("**Date:** 8/6/2024"));
        assert!(response.contains("**Status:** Unread"));
    }

    #[test]
    fn test_sender_search_many_matches_truncated() {
        let messages = (0..5)
            .map(|i| read_message(&i.to_string(), "billing@mobbin.com", &format!("Invoice {}", i)))
            .collect::<Vec<_>>();
        let context = context_from(&messages);

        let response = search_specific_sender(&context, "mobbin");
        assert!(response.starts_with("Yes, I found 5 emails from mobbin:"));
        assert!(response.contains("1. **Invoice 0**"));
        assert!(response.contains("3. **Invoice 2**"));
        assert!(!response.contains("**Invoice 3**"));
        assert!(response.ends_with("... and 2 more emails."));
    }

    #[test]
    fn test_sender_search_count_equals_matches() {
        let messages = vec![
            read_message("1", "a@mobbin.com", "One"),
            read_message("2", "b@mobbin.com", "Two"),
        ];
        let context = context_from(&messages);
        let response = search_specific_sender(&context, "mobbin");
        assert!(response.contains("I found 2 emails"));
    }

    #[test]
    fn test_fallback_lists_unread_only() {
        let messages = vec![
            unread_message("1", "a@x.com", "First unread"),
            read_message("2", "b@x.com", "Read one"),
            unread_message("3", "c@x.com", "Second unread"),
            read_message("4", "d@x.com", "Read two"),
            read_message("5", "e@x.com", "Read three"),
        ];
        let context = context_from(&messages);

        let response = fallback_response(&context, "show unread emails", &[]);
        assert!(response.starts_with("You have 2 unread emails:"));
        assert!(response.contains("1. **a@x.com** - \"First unread\""));
        assert!(response.contains("2. **c@x.com** - \"Second unread\""));
        assert!(!response.contains("Read one"));
    }

    #[test]
    fn test_fallback_no_unread() {
        let context = context_from(&[read_message("1", "a@x.com", "Read")]);
        assert_eq!(
            fallback_response(&context, "any unread mail?", &[]),
            "You have no unread emails."
        );
    }

    #[test]
    fn test_fallback_known_sender_reuses_filter() {
        let context = context_from(&[read_message("1", "billing@mobbin.com", "Invoice")]);
        let senders = vec!["mobbin".to_string()];
        let response = fallback_response(&context, "what about mobbin?", &senders);
        assert!(response.contains("I found 1 email from mobbin"));
    }

    #[test]
    fn test_fallback_generic_prompt() {
        let context = context_from(&[read_message("1", "a@x.com", "Hello")]);
        assert_eq!(
            fallback_response(&context, "do something", &["mobbin".to_string()]),
            "I can help you with your emails. What would you like me to do?"
        );
    }

    #[test]
    fn test_fallback_draft_keyword_clauses() {
        let original = normalized_message("1", "jane@example.com", "Project timeline", false);
        let draft = fallback_draft(&original, "please acknowledge and schedule a review, urgent");

        assert!(draft.contains("**Draft Response to jane:**"));
        assert!(draft.contains("Subject: Re: Project timeline"));
        assert!(draft.contains("Hi jane,"));
        assert!(draft.contains("I acknowledge receipt of your message."));
        assert!(draft.contains("I will check my calendar and get back to you with available times."));
        assert!(draft.contains("I will review the information you provided and respond accordingly."));
        assert!(draft.contains("I understand this is urgent and will prioritize accordingly."));
        assert!(draft.contains("I will get back to you soon."));
        assert!(draft.contains("This is a draft response."));
    }

    #[test]
    fn test_fallback_draft_follow_up_today() {
        let original = normalized_message("1", "jane@example.com", "Q3 numbers", false);
        let draft = fallback_draft(&original, "follow up today");
        assert!(draft.contains("I will follow up today."));
    }

    #[test]
    fn test_fallback_draft_without_keywords_is_still_complete() {
        let original = normalized_message("1", "jane@example.com", "Hello", false);
        let draft = fallback_draft(&original, "reply nicely");
        assert!(draft.contains("Hi jane,"));
        assert!(draft.contains("I will get back to you soon."));
        assert!(!draft.contains("\n\n\n"));
    }

    #[test]
    fn test_fallback_compose_extracts_address() {
        let response = fallback_compose("send email to john@example.com about the meeting");
        assert!(response.contains("**To:** john@example.com"));
        assert!(response.contains("[Please specify subject]"));
        assert!(response.contains("I would like to schedule a meeting to discuss..."));
        assert!(response.contains("What subject would you like for this email?"));
    }

    #[test]
    fn test_fallback_compose_without_address_asks_for_fields() {
        let response = fallback_compose("write something nice");
        assert!(response.contains("**Recipient email address**"));
        assert!(response.contains("**Subject line**"));
        assert!(response.contains("**Message content**"));
        assert!(response.contains("john@example.com"));
    }

    #[test]
    fn test_any_emails_from_mobbin_end_to_end() {
        use crate::assistant::intent::{route, Instruction, Strategy};

        let mut message = unread_message("1", "billing@mobbin.com", "Your invoice");
        message.date = Utc.with_ymd_and_hms(2024, 8, 6, 12, 0, 0).unwrap();

        let instruction = Instruction::new("any emails from mobbin");
        let strategy = route(&instruction, &["mobbin".to_string()]);
        let Strategy::SenderLookup { token } = strategy else {
            panic!("expected sender lookup, got {:?}", strategy);
        };

        let response = search_specific_sender(&email_context(&[message]), &token);
        assert!(response.contains("**From:** billing@mobbin.com"));
        assert!(response.contains("**Subject:** Your invoice"));
        assert!(response.contains("**Date:** 8/6/2024"));
        assert!(response.contains("**Status:** Unread"));
    }

    fn unreachable_assistant() -> Assistant {
        // Port 1 is never listening; every completion attempt fails fast,
        // which forces the deterministic fallback tier.
        let generative = GenerativeClient::with_options(
            reqwest::Client::new(),
            "http://127.0.0.1:1/models".to_string(),
            "test-key".to_string(),
            crate::server_config::ModelConfig {
                id: "gemini-1.5-flash".to_string(),
                temperature: 0.7,
                top_k: 40,
                top_p: 0.95,
                max_output_tokens: 2048,
            },
        )
        .unwrap();

        Assistant {
            generative,
            rate_limiters: RateLimiters::new(10, 100, 1),
            known_senders: vec!["mobbin".to_string()],
        }
    }

    #[tokio::test]
    async fn test_analyze_empty_set_never_calls_backend() {
        let assistant = unreachable_assistant();
        let response = assistant.analyze(&[], "summarize my inbox").await;
        assert!(response.starts_with("I don't see any emails to analyze."));
        assert!(!response.trim().is_empty());
    }

    #[tokio::test]
    async fn test_analyze_backend_failure_lists_unread() {
        let assistant = unreachable_assistant();
        let messages = vec![
            unread_message("1", "a@x.com", "First unread"),
            read_message("2", "b@x.com", "Read one"),
            unread_message("3", "c@x.com", "Second unread"),
            read_message("4", "d@x.com", "Read two"),
            read_message("5", "e@x.com", "Read three"),
        ];

        let response = assistant.analyze(&messages, "show unread emails").await;
        assert!(response.starts_with("You have 2 unread emails:"));
        assert!(response.contains("**a@x.com** - \"First unread\""));
        assert!(response.contains("**c@x.com** - \"Second unread\""));
    }

    #[tokio::test]
    async fn test_draft_backend_failure_yields_template() {
        let assistant = unreachable_assistant();
        let original = normalized_message("1", "jane@example.com", "Budget", false);
        let response = assistant.draft_response(&original, "acknowledge it").await;
        assert!(response.contains("**Draft Response to jane:**"));
    }

    #[tokio::test]
    async fn test_compose_backend_failure_yields_template() {
        let assistant = unreachable_assistant();
        let response = assistant.compose("send email to bob@example.com").await;
        assert!(response.contains("**To:** bob@example.com"));
    }

    #[test]
    fn test_display_name() {
        assert_eq!(display_name("jane@example.com"), "jane");
        assert_eq!(display_name("Jane Doe <jane@example.com>"), "Jane Doe");
        assert_eq!(display_name("noreply"), "noreply");
    }

    #[test]
    fn test_email_context_body_falls_back_to_snippet() {
        let mut message = read_message("1", "a@x.com", "Subject");
        message.body = String::new();
        message.snippet = "the snippet".to_string();
        let context = email_context(&[message]);
        assert_eq!(context[0].body, "the snippet");
    }

    #[test]
    fn test_email_context_trims_body() {
        let mut message = read_message("1", "a@x.com", "Subject");
        message.body = "y".repeat(CONTEXT_BODY_CAP + 100);
        let context = email_context(&[message]);
        assert_eq!(context[0].body.chars().count(), CONTEXT_BODY_CAP);
    }
}

use once_cell::sync::Lazy;
use regex::Regex;
use strum::EnumString;

/// Discrete action tag a caller may attach to an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, EnumString, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum Action {
    Analyze,
    Search,
    Compose,
    #[strum(serialize = "send_email", serialize = "send")]
    SendEmail,
    #[strum(serialize = "draft_response", serialize = "draft-response")]
    DraftResponse,
}

/// One user instruction, scoped to a single request/response cycle.
#[derive(Debug, Clone)]
pub struct Instruction {
    pub text: String,
    pub action: Option<Action>,
    pub target_message_id: Option<String>,
}

impl Instruction {
    pub fn new(text: impl Into<String>) -> Self {
        Instruction {
            text: text.into(),
            action: None,
            target_message_id: None,
        }
    }
}

/// Response strategy chosen for an instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strategy {
    /// Deterministic sender filter; never touches the generative backend.
    SenderLookup { token: String },
    Compose,
    SendEmail,
    DraftResponse,
    Analyze,
}

// Permissive on purpose: it can capture any word following "from"/"any".
// Tightening it would silently change which tokens get filtered on.
static RE_SENDER_SHAPE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?:any|from|email.*from)\s+([a-zA-Z0-9@.\-]+)").unwrap());

type Matcher = fn(&Instruction, &[String]) -> Option<Strategy>;

/// Routing table, evaluated top to bottom; first match wins. The order is
/// part of the contract: sender lookups beat action tags beat analysis.
const ROUTES: &[Matcher] = &[match_known_sender, match_sender_shape, match_action_tag];

pub fn route(instruction: &Instruction, known_senders: &[String]) -> Strategy {
    ROUTES
        .iter()
        .find_map(|matcher| matcher(instruction, known_senders))
        .unwrap_or(Strategy::Analyze)
}

/// A recognized sender keyword plus an "email"/"from" context word is an
/// unambiguous lookup request.
fn match_known_sender(instruction: &Instruction, known_senders: &[String]) -> Option<Strategy> {
    let query = instruction.text.to_lowercase();
    known_senders
        .iter()
        .find(|kw| {
            query.contains(kw.as_str()) && (query.contains("email") || query.contains("from"))
        })
        .map(|kw| Strategy::SenderLookup { token: kw.clone() })
}

/// "from/about/any emails from <token>" shaped instructions.
fn match_sender_shape(instruction: &Instruction, _known_senders: &[String]) -> Option<Strategy> {
    let query = instruction.text.to_lowercase();
    RE_SENDER_SHAPE
        .captures(&query)
        .map(|caps| Strategy::SenderLookup {
            token: caps[1].to_string(),
        })
}

fn match_action_tag(instruction: &Instruction, _known_senders: &[String]) -> Option<Strategy> {
    match instruction.action? {
        Action::Compose => Some(Strategy::Compose),
        Action::SendEmail => Some(Strategy::SendEmail),
        Action::DraftResponse => Some(Strategy::DraftResponse),
        Action::Search => Some(Strategy::SenderLookup {
            token: instruction.text.trim().to_string(),
        }),
        Action::Analyze => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn senders() -> Vec<String> {
        vec!["mobbin".to_string()]
    }

    #[test]
    fn test_action_parsing() {
        assert_eq!(Action::from_str("compose").unwrap(), Action::Compose);
        assert_eq!(Action::from_str("send_email").unwrap(), Action::SendEmail);
        assert_eq!(Action::from_str("send").unwrap(), Action::SendEmail);
        assert_eq!(
            Action::from_str("draft_response").unwrap(),
            Action::DraftResponse
        );
        assert_eq!(
            Action::from_str("draft-response").unwrap(),
            Action::DraftResponse
        );
        assert!(Action::from_str("explode").is_err());
    }

    #[test]
    fn test_known_sender_needs_context_word() {
        let strategy = route(&Instruction::new("any emails from mobbin?"), &senders());
        assert_eq!(
            strategy,
            Strategy::SenderLookup {
                token: "mobbin".to_string()
            }
        );

        // Keyword alone, no "email"/"from" context: falls through to the
        // shape regex, which finds nothing either
        let strategy = route(&Instruction::new("mobbin"), &senders());
        assert_eq!(strategy, Strategy::Analyze);
    }

    #[test]
    fn test_sender_shape_extraction() {
        let strategy = route(&Instruction::new("show emails from alice@example.com"), &[]);
        assert_eq!(
            strategy,
            Strategy::SenderLookup {
                token: "alice@example.com".to_string()
            }
        );
    }

    #[test]
    fn test_sender_shape_is_permissive() {
        // "any" matches before "from" does, so the captured token is the
        // following word, not the sender. Deliberately preserved.
        let strategy = route(&Instruction::new("any emails from stripe"), &[]);
        assert_eq!(
            strategy,
            Strategy::SenderLookup {
                token: "emails".to_string()
            }
        );
    }

    #[test]
    fn test_sender_lookup_beats_action_tag() {
        let mut instruction = Instruction::new("summarize emails from mobbin");
        instruction.action = Some(Action::Compose);
        assert_eq!(
            route(&instruction, &senders()),
            Strategy::SenderLookup {
                token: "mobbin".to_string()
            }
        );
    }

    #[test]
    fn test_action_tags_route_to_operations() {
        let mut instruction = Instruction::new("write to bob about the offsite");
        instruction.action = Some(Action::Compose);
        assert_eq!(route(&instruction, &senders()), Strategy::Compose);

        let mut instruction = Instruction::new("please send it");
        instruction.action = Some(Action::SendEmail);
        assert_eq!(route(&instruction, &senders()), Strategy::SendEmail);

        let mut instruction = Instruction::new("reply politely");
        instruction.action = Some(Action::DraftResponse);
        assert_eq!(route(&instruction, &senders()), Strategy::DraftResponse);
    }

    #[test]
    fn test_search_routes_text_into_sender_filter() {
        let mut instruction = Instruction::new(" Billing ");
        instruction.action = Some(Action::Search);
        assert_eq!(
            route(&instruction, &senders()),
            Strategy::SenderLookup {
                token: "Billing".to_string()
            }
        );
    }

    #[test]
    fn test_default_is_analyze() {
        assert_eq!(
            route(&Instruction::new("summarize my inbox"), &senders()),
            Strategy::Analyze
        );

        let mut instruction = Instruction::new("summarize my inbox");
        instruction.action = Some(Action::Analyze);
        assert_eq!(route(&instruction, &senders()), Strategy::Analyze);
    }
}

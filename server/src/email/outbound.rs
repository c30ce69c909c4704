use lettre::message::header::{ContentTransferEncoding, ContentType};
use lettre::message::{Mailbox, SinglePart};
use lettre::Message;
use lib_utils::b64::b64u_encode;

use crate::error::{AppError, AppResult};

/// Build the base64url-encoded RFC 2822 message the Gmail `messages.send`
/// endpoint expects in its `raw` field. Minimal plain-text single part;
/// base64 transfer encoding so the body survives the round trip untouched.
pub fn build_raw_message(from: &str, to: &str, subject: &str, body: &str) -> AppResult<String> {
    let from = from
        .parse::<Mailbox>()
        .map_err(|e| AppError::SendFailure(format!("invalid sender address: {}", e)))?;
    let to = to
        .parse::<Mailbox>()
        .map_err(|e| AppError::SendFailure(format!("invalid recipient address: {}", e)))?;

    let message = Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .singlepart(
            SinglePart::builder()
                .header(ContentType::TEXT_PLAIN)
                .header(ContentTransferEncoding::Base64)
                .body(body.to_string()),
        )
        .map_err(|e| AppError::SendFailure(format!("could not build message: {}", e)))?;

    Ok(b64u_encode(message.formatted()))
}

/// Gmail API quota units per method call.
///
/// Each Gmail API method costs a fixed number of quota units against the
/// per-user limit of 250 units per second. The email client acquires the
/// method's units from its leaky bucket before every request.
pub struct GmailApiQuota {
    pub messages_list: usize,
    pub messages_get: usize,
    pub messages_send: usize,
    pub messages_modify: usize,
    pub get_profile: usize,
}

pub const GMAIL_QUOTA_PER_SECOND: usize = 250;

pub const GMAIL_API_QUOTA: GmailApiQuota = GmailApiQuota {
    messages_list: 5,
    messages_get: 5,
    messages_send: 100,
    messages_modify: 5,
    get_profile: 1,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_send_is_most_expensive() {
        // messages.send dominates the per-second budget; the limiter must
        // never be asked for more units than the bucket can hold.
        assert!(GMAIL_API_QUOTA.messages_send <= GMAIL_QUOTA_PER_SECOND);
        assert!(GMAIL_API_QUOTA.messages_send > GMAIL_API_QUOTA.messages_get);
    }
}

//! Text sent to candidates.

use warden_common::{ChannelId, MemberId};

pub fn welcome(member: MemberId, server: &str, rules: ChannelId, answer_length: usize) -> String {
    [
        format!("<@{member}>, welcome to {server} :wave:"),
        format!("Before joining the conversation, please read and follow every rule in <#{rules}>."),
        format!(
            "When you're ready, type the {answer_length} characters (uppercase letters and digits) \
             traced by the connected lines in the picture."
        ),
    ]
    .join("\n")
}

pub fn retry(attempts_remaining: u32) -> String {
    format!("That's not it. Please try again! ({attempts_remaining} attempts left)")
}

pub fn verified(server: &str, grace_secs: u64) -> String {
    format!(
        "✨ You're in! Thanks for your patience, enjoy {server} 😉\n\
         This thread will be deleted in {grace_secs} seconds."
    )
}

pub fn timed_out(server: &str) -> String {
    format!(
        "You were removed from {server} because verification was not completed in time.\n\
         You're welcome to join again and retry."
    )
}

pub fn exhausted(server: &str, attempts: u32) -> String {
    format!(
        "You were removed from {server} after {attempts} wrong answers in a row.\n\
         You're welcome to join again and retry."
    )
}

pub fn unavailable(server: &str) -> String {
    format!(
        "Sorry! Verification on {server} could not be started, so you were removed for now.\n\
         Please join again in a few minutes."
    )
}

pub fn lockdown_kick(server: &str) -> String {
    format!(
        "Sorry! Unusual join activity was detected on {server}, so joining is temporarily restricted.\n\
         Please try again in a little while."
    )
}

pub fn lockdown_ban(server: &str, contact: &str) -> String {
    format!("You were banned from {server} for repeatedly trying to join during a lockdown.\nContact: {contact}")
}

pub const REASON_EXHAUSTED: &str = "Too many wrong verification answers";
pub const REASON_TIMEOUT: &str = "Verification timed out";
pub const REASON_UNAVAILABLE: &str = "Verification could not be started";
pub const REASON_LOCKDOWN: &str = "Join restricted: lockdown mode";
pub const REASON_LOCKDOWN_BAN: &str = "Repeated join attempts during lockdown";

//! Process-level identity metadata broadcast to handlers.
use std::collections::BTreeMap;
use std::env;
use std::fmt::Write as _;

use crate::{ErrorKind, Result};

/// Tag carried by the full identity-card event emitted at worker startup.
pub const TAG_IDENTITY_CARD_FULL: &str = "IdentityCard";

/// Tag carried by events whose payload updates the identity card.
pub const TAG_IDENTITY_CARD_UPDATE: &str = "IdentityCardUpdate";

/// A key/value card describing the running process.
///
/// The card is broadcast as a special event when the sink worker starts, and
/// producers may extend it at run time by submitting events tagged
/// [`TAG_IDENTITY_CARD_UPDATE`] whose text is a [`to_payload`](IdentityCard::to_payload)
/// encoding of the added entries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityCard {
    entries: BTreeMap<String, String>,
}

impl IdentityCard {
    /// Makes an empty card.
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes a card seeded with basic process information.
    pub fn with_process_info() -> Self {
        let mut card = Self::new();
        card.set("process_id", &std::process::id().to_string());
        card.set("os", env::consts::OS);
        card.set("arch", env::consts::ARCH);
        if let Ok(exe) = env::current_exe() {
            if let Some(name) = exe.file_name().and_then(|n| n.to_str()) {
                card.set("executable", name);
            }
        }
        card
    }

    /// Sets an entry, returning `true` if the card changed.
    pub fn set(&mut self, key: &str, value: &str) -> bool {
        if self.entries.get(key).map(String::as_str) == Some(value) {
            return false;
        }
        self.entries.insert(key.to_owned(), value.to_owned());
        true
    }

    /// Looks up an entry.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    /// Returns `true` if the card has no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Merges `pairs` into this card, returning `true` if anything changed.
    pub fn merge<I>(&mut self, pairs: I) -> bool
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut changed = false;
        for (key, value) in pairs {
            changed |= self.set(&key, &value);
        }
        changed
    }

    /// Encodes the card as newline-separated `key=value` lines.
    pub fn to_payload(&self) -> String {
        let mut out = String::new();
        for (key, value) in &self.entries {
            let _ = writeln!(out, "{}={}", key, value);
        }
        out
    }

    /// Decodes a `key=value` payload.
    ///
    /// Fails on any non-empty line without a `=` separator or with an empty
    /// key; the caller suppresses the carrying event in that case.
    pub fn parse_payload(payload: &str) -> Result<Vec<(String, String)>> {
        let mut pairs = Vec::new();
        for line in payload.lines() {
            if line.is_empty() {
                continue;
            }
            match line.find('=') {
                Some(0) | None => {
                    track_panic!(ErrorKind::Invalid, "Malformed identity line: {:?}", line)
                }
                Some(at) => pairs.push((line[..at].to_owned(), line[at + 1..].to_owned())),
            }
        }
        Ok(pairs)
    }
}

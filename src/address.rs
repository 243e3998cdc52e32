use std::fmt;
use std::sync::LazyLock;

use lettre::message::Mailbox;
use regex::Regex;

use crate::error::AddressError;

static BRACKETED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^([^<]*)<([^<>]*)>$").expect("static regex"));

/// A recipient or sender as written in configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmailAddress {
    pub address: String,
    pub display_name: String,
}

impl EmailAddress {
    pub fn to_mailbox(&self) -> Result<Mailbox, AddressError> {
        let address = self
            .address
            .parse::<lettre::Address>()
            .map_err(|e| AddressError::Invalid {
                address: self.address.clone(),
                message: e.to_string(),
            })?;
        let name = (!self.display_name.is_empty()).then(|| self.display_name.clone());
        Ok(Mailbox::new(name, address))
    }
}

impl fmt::Display for EmailAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.display_name.is_empty() {
            write!(f, "{}", self.address)
        } else {
            write!(f, "{} <{}>", self.display_name, self.address)
        }
    }
}

/// Parse `addr`, `<addr>`, `Name <addr>` or `Name<addr>`.
///
/// A `<` without a matching trailing `>` is rejected rather than guessed at.
pub fn parse(raw: &str) -> Result<EmailAddress, AddressError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(AddressError::Empty);
    }

    if !raw.contains('<') {
        return Ok(EmailAddress {
            address: raw.to_string(),
            display_name: String::new(),
        });
    }

    let captures = BRACKETED
        .captures(raw)
        .ok_or_else(|| AddressError::Unterminated(raw.to_string()))?;
    let address = captures[2].trim();
    if address.is_empty() {
        return Err(AddressError::Empty);
    }

    Ok(EmailAddress {
        address: address.to_string(),
        display_name: captures[1].trim().to_string(),
    })
}

/// Parse a comma-separated list. Blank input gives an empty list.
pub fn parse_list(raw: &str) -> Result<Vec<EmailAddress>, AddressError> {
    raw.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(parse)
        .collect()
}

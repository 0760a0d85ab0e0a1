//! Pre-flight credential shape checks.
//!
//! Pure functions; nothing here touches the network. A value of type
//! [`Email`] or [`Password`] can only be obtained through these checks, so
//! the dispatcher cannot be handed unvalidated input.

#[cfg(test)]
#[path = "validate_test.rs"]
mod tests;

const MIN_PASSWORD_LEN: usize = 6;
const LOCAL_PART_SPECIALS: &str = "!#$%&'*+/=?^_`{|}~.-";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Please enter a valid email")]
    InvalidFormat,
    #[error("Password must be at least 6 characters")]
    TooShort,
    #[error("Please enter your full name")]
    MissingFullName,
}

/// An address that passed [`validate_email`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Email(String);

impl Email {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// A password that passed [`validate_password`].
#[derive(Clone, PartialEq, Eq)]
pub struct Password(String);

impl Password {
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for Password {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Password(***)")
    }
}

/// Accept `s` if it has a standard `local@domain.tld` shape.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidFormat`] otherwise.
pub fn validate_email(s: &str) -> Result<Email, ValidationError> {
    let mut parts = s.split('@');
    let (Some(local), Some(domain), None) = (parts.next(), parts.next(), parts.next()) else {
        return Err(ValidationError::InvalidFormat);
    };
    if valid_local_part(local) && valid_domain(domain) {
        Ok(Email(s.to_owned()))
    } else {
        Err(ValidationError::InvalidFormat)
    }
}

/// Accept `s` if it has at least six characters.
///
/// # Errors
///
/// Returns [`ValidationError::TooShort`] otherwise.
pub fn validate_password(s: &str) -> Result<Password, ValidationError> {
    if s.chars().count() < MIN_PASSWORD_LEN {
        return Err(ValidationError::TooShort);
    }
    Ok(Password(s.to_owned()))
}

/// Accept a non-blank full name, returned as given.
///
/// # Errors
///
/// Returns [`ValidationError::MissingFullName`] when `s` is blank.
pub fn validate_full_name(s: &str) -> Result<String, ValidationError> {
    if s.trim().is_empty() {
        return Err(ValidationError::MissingFullName);
    }
    Ok(s.to_owned())
}

fn valid_local_part(local: &str) -> bool {
    !local.is_empty()
        && !local.starts_with('.')
        && !local.ends_with('.')
        && !local.contains("..")
        && local
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || LOCAL_PART_SPECIALS.contains(c))
}

fn valid_domain(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    if labels.len() < 2 {
        return false;
    }
    let labels_ok = labels.iter().all(|label| {
        !label.is_empty()
            && !label.starts_with('-')
            && !label.ends_with('-')
            && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
    });
    let tld_ok = labels
        .last()
        .is_some_and(|tld| tld.len() >= 2 && tld.chars().all(|c| c.is_ascii_alphabetic()));
    labels_ok && tld_ok
}

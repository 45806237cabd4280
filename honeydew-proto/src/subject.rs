use std::{
    fmt::{self, Display},
    ops::Deref,
};

/// Default prefix of the discovery subject a cluster listens on.
pub const DEFAULT_DISCOVER_PREFIX: &str = "_STAN.discover";

/// The name of a channel on the streaming server
///
/// `Subject` contains a string that is guaranteed to
/// meet the following requirements:
///
/// * The value is not empty
/// * The value has a length less than or equal to 256
/// * The value does not contain any whitespace characters
/// * The value does not contain empty `.`-separated tokens
/// * The value does not contain the `*` or `>` wildcard characters:
///   channels are concrete named logs, not filter patterns
///
/// `Subject` can be constructed from [`Subject::from_static`]
/// or any of the `TryFrom` implementations.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Subject(String);

impl Subject {
    /// Construct `Subject` from a static string
    ///
    /// # Panics
    ///
    /// Will panic if `value` isn't a valid `Subject`
    #[must_use]
    pub fn from_static(value: &'static str) -> Self {
        Self::try_from(value).expect("invalid Subject")
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Subject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

impl TryFrom<String> for Subject {
    type Error = SubjectValidateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        validate_subject(&value)?;
        Ok(Self(value))
    }
}

impl TryFrom<&str> for Subject {
    type Error = SubjectValidateError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        validate_subject(value)?;
        Ok(Self(value.to_owned()))
    }
}

impl From<Subject> for String {
    fn from(value: Subject) -> Self {
        value.0
    }
}

impl AsRef<str> for Subject {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

impl Deref for Subject {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        self.as_str()
    }
}

/// Build the discovery subject for `cluster_id`
///
/// This is the subject the handshake request is sent to.
#[must_use]
pub fn discover_subject(discover_prefix: &str, cluster_id: &str) -> String {
    format!("{discover_prefix}.{cluster_id}")
}

/// Build the bus subject a [`proto::PubMsg`] for `subject` is published to
///
/// `pub_prefix` is the value discovered through the handshake.
///
/// [`proto::PubMsg`]: crate::proto::PubMsg
#[must_use]
pub fn publish_subject(pub_prefix: &str, subject: &Subject) -> String {
    format!("{pub_prefix}.{subject}")
}

/// An error encountered while validating [`Subject`]
#[derive(Debug, thiserror::Error)]
#[cfg_attr(test, derive(PartialEq, Eq))]
pub enum SubjectValidateError {
    /// The value is empty
    #[error("Subject is empty")]
    Empty,
    /// The value has a length greater than 256
    #[error("Subject is too long")]
    TooLong,
    /// The value contains an Unicode whitespace character
    #[error("Subject contained an illegal whitespace character")]
    IllegalCharacter,
    /// The value contains consecutive or leading/trailing `.` characters
    #[error("Subject contained a broken token")]
    BrokenToken,
    /// The value contains a `*` or `>` wildcard character
    #[error("Subject contained a wildcard character")]
    Wildcard,
}

fn validate_subject(subject: &str) -> Result<(), SubjectValidateError> {
    if subject.is_empty() {
        return Err(SubjectValidateError::Empty);
    }

    if subject.len() > 256 {
        // This is an arbitrary limit, but I guess the server must also have one
        return Err(SubjectValidateError::TooLong);
    }

    if subject.chars().any(char::is_whitespace) {
        // The theoretical security limit is just ` `, `\t`, `\r` and `\n`.
        // Let's be more careful.
        return Err(SubjectValidateError::IllegalCharacter);
    }

    if subject.contains(['*', '>']) {
        return Err(SubjectValidateError::Wildcard);
    }

    if subject.split('.').any(str::is_empty) {
        return Err(SubjectValidateError::BrokenToken);
    }

    Ok(())
}

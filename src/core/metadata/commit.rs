//! core::metadata::commit
//!
//! The identity and message attached to every mutation.
//!
//! The timestamp is captured when the value is built and never changes, so
//! a retried action records the time the caller asked for it.

use thiserror::Error;

use crate::core::types::UtcTimestamp;

/// Errors from building commit metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CommitMetaDataError {
    #[error("commit metadata field '{0}' cannot be empty")]
    EmptyField(&'static str),
}

/// Author identity, message and optional acting proxy of a mutation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitMetaData {
    user: String,
    mail: String,
    message: String,
    proxy_mail: Option<String>,
    timestamp: UtcTimestamp,
}

impl CommitMetaData {
    /// Build commit metadata stamped with the current time.
    ///
    /// # Errors
    ///
    /// Returns [`CommitMetaDataError::EmptyField`] if `user`, `mail` or
    /// `message` is blank.
    ///
    /// # Example
    ///
    /// ```
    /// use gitkv::core::metadata::CommitMetaData;
    ///
    /// let meta = CommitMetaData::new("Ada", "ada@example.com", "seed config").unwrap();
    /// assert_eq!(meta.user(), "Ada");
    /// assert!(CommitMetaData::new("", "ada@example.com", "x").is_err());
    /// ```
    pub fn new(
        user: impl Into<String>,
        mail: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<Self, CommitMetaDataError> {
        let user = required("user", user.into())?;
        let mail = required("mail", mail.into())?;
        let message = required("message", message.into())?;
        Ok(Self {
            user,
            mail,
            message,
            proxy_mail: None,
            timestamp: UtcTimestamp::now(),
        })
    }

    /// Record the identity of a proxy acting on the author's behalf.
    ///
    /// A blank proxy is treated as no proxy.
    pub fn with_proxy(mut self, proxy_mail: impl Into<String>) -> Self {
        let proxy = proxy_mail.into();
        self.proxy_mail = (!proxy.trim().is_empty()).then_some(proxy);
        self
    }

    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn mail(&self) -> &str {
        &self.mail
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn proxy_mail(&self) -> Option<&str> {
        self.proxy_mail.as_deref()
    }

    pub fn timestamp(&self) -> UtcTimestamp {
        self.timestamp
    }

    /// Commit message including the proxy trailer, if any.
    ///
    /// ```
    /// use gitkv::core::metadata::CommitMetaData;
    ///
    /// let meta = CommitMetaData::new("Ada", "ada@example.com", "seed")
    ///     .unwrap()
    ///     .with_proxy("bot@example.com");
    /// assert_eq!(meta.full_message(), "seed\n\nProxied-by: bot@example.com\n");
    /// ```
    pub fn full_message(&self) -> String {
        match &self.proxy_mail {
            Some(proxy) => format!("{}\n\nProxied-by: {}\n", self.message, proxy),
            None => self.message.clone(),
        }
    }
}

fn required(field: &'static str, value: String) -> Result<String, CommitMetaDataError> {
    if value.trim().is_empty() {
        Err(CommitMetaDataError::EmptyField(field))
    } else {
        Ok(value)
    }
}

//! Form submission state shared by every form.
//!
//! A form is `Idle` until submitted, `Pending` while its request is in
//! flight, then `Succeeded` or `Failed`. The next edit returns it to `Idle`.
//! `begin` refuses a second submission while one is pending.

use crate::error::ApiError;

#[derive(Debug)]
pub enum Submission<T> {
    Idle,
    Pending,
    Succeeded(T),
    Failed(ApiError),
}

impl<T> Default for Submission<T> {
    fn default() -> Self {
        Submission::Idle
    }
}

impl<T> Submission<T> {
    pub fn new() -> Self {
        Submission::Idle
    }

    /// Enter `Pending`. Returns `false`, leaving the state alone, if a
    /// submission is already pending.
    pub fn begin(&mut self) -> bool {
        if self.is_pending() {
            return false;
        }
        *self = Submission::Pending;
        true
    }

    /// Settle a pending submission with the call's outcome.
    pub fn finish(&mut self, outcome: Result<T, ApiError>) {
        *self = match outcome {
            Ok(value) => Submission::Succeeded(value),
            Err(err) => Submission::Failed(err),
        };
    }

    /// The user changed an input; a settled result is dropped.
    pub fn edit(&mut self) {
        if !self.is_pending() {
            *self = Submission::Idle;
        }
    }

    /// Run `call` as one submission. Returns `None` without calling it when
    /// a submission is already pending.
    pub fn run<F>(&mut self, call: F) -> Option<&Self>
    where
        F: FnOnce() -> Result<T, ApiError>,
    {
        if !self.begin() {
            return None;
        }
        self.finish(call());
        Some(self)
    }

    pub fn is_idle(&self) -> bool {
        matches!(self, Submission::Idle)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Submission::Pending)
    }

    /// Inputs are disabled while pending.
    pub fn is_locked(&self) -> bool {
        self.is_pending()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Submission::Succeeded(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&ApiError> {
        match self {
            Submission::Failed(err) => Some(err),
            _ => None,
        }
    }

    /// Banner text for a failed submission.
    pub fn error_message(&self) -> Option<String> {
        self.error().map(ToString::to_string)
    }
}

/// Gate for multi-step flows whose link carries a token (email
/// verification, password reset). The form is shown only once the token
/// has been accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenGate {
    Validating { token: String },
    Valid { token: String },
    Invalid { message: String },
}

pub const MISSING_TOKEN: &str = "Invalid or missing token";

impl TokenGate {
    /// Enter the gate with the token from the link, if any.
    pub fn open(token: Option<&str>) -> Self {
        match token.map(str::trim).filter(|t| !t.is_empty()) {
            Some(token) => TokenGate::Validating {
                token: token.to_string(),
            },
            None => TokenGate::Invalid {
                message: MISSING_TOKEN.to_string(),
            },
        }
    }

    /// Apply the outcome of validating the token. Ignored unless the gate
    /// is still validating.
    pub fn resolve<T>(&mut self, outcome: Result<T, ApiError>) {
        let TokenGate::Validating { token } = self else {
            return;
        };
        let token = std::mem::take(token);
        *self = match outcome {
            Ok(_) => TokenGate::Valid { token },
            Err(err) => TokenGate::Invalid {
                message: err.to_string(),
            },
        };
    }

    /// The token to validate while in `Validating`.
    pub fn pending_token(&self) -> Option<&str> {
        match self {
            TokenGate::Validating { token } => Some(token),
            _ => None,
        }
    }

    /// The accepted token; `Some` means the form may be shown.
    pub fn valid_token(&self) -> Option<&str> {
        match self {
            TokenGate::Valid { token } => Some(token),
            _ => None,
        }
    }
}

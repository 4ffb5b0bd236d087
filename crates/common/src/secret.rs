//! Secret wrapper for credentials (vtiger password, derived access keys)

use std::fmt;
use zeroize::Zeroize;

/// Sensitive value - redacted in Debug/Display/logs, zeroed on drop
pub struct Secret<T: Zeroize>(T);

impl<T: Zeroize> Secret<T> {
    /// Wrap a sensitive value
    pub fn new(value: T) -> Self {
        Self(value)
    }

    /// Borrow the inner value. Keep the borrow short and never log it.
    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl Secret<String> {
    /// Whether the wrapped string is empty (or whitespace only)
    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl<T: Zeroize> From<T> for Secret<T> {
    fn from(value: T) -> Self {
        Self::new(value)
    }
}

impl<T: Zeroize> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("[REDACTED]")
    }
}

impl<T: Zeroize> Drop for Secret<T> {
    fn drop(&mut self) {
        self.0.zeroize();
    }
}

impl<T: Zeroize + Clone> Clone for Secret<T> {
    fn clone(&self) -> Self {
        Self(self.0.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn password_is_redacted_in_debug_and_display() {
        let secret = Secret::new(String::from("hunter2"));
        assert_eq!(format!("{secret:?}"), "[REDACTED]");
        assert_eq!(format!("{secret}"), "[REDACTED]");
    }

    #[test]
    fn redaction_survives_nesting_in_structs() {
        #[derive(Debug)]
        #[allow(dead_code)]
        struct Credentials {
            username: String,
            password: Secret<String>,
        }

        let creds = Credentials {
            username: "admin".into(),
            password: Secret::from(String::from("hunter2")),
        };
        let debug = format!("{creds:?}");
        assert!(debug.contains("admin"));
        assert!(!debug.contains("hunter2"), "password leaked: {debug}");
    }

    #[test]
    fn expose_and_clone_keep_value() {
        let secret = Secret::new(String::from("hunter2"));
        let cloned = secret.clone();
        assert_eq!(secret.expose(), "hunter2");
        assert_eq!(cloned.expose(), "hunter2");
    }

    #[test]
    fn blank_detection() {
        assert!(Secret::new(String::from("  \n")).is_blank());
        assert!(!Secret::new(String::from("x")).is_blank());
    }
}

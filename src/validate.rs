use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

static EMAIL: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").unwrap());
static USERNAME: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z0-9_-]{3,20}$").unwrap());

pub const MIN_PASSWORD_LEN: usize = 6;

pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Letters, digits, `_` and `-`, 3 to 20 characters.
pub fn is_valid_username(username: &str) -> bool {
    USERNAME.is_match(username)
}

pub fn is_valid_password(password: &str) -> bool {
    password.chars().count() >= MIN_PASSWORD_LEN
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strength {
    Weak,
    Medium,
    Strong,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PasswordStrength {
    pub strength: Strength,
    /// 0 to 5: two points for length, three for character variety.
    pub score: u8,
}

pub fn check_password_strength(password: &str) -> PasswordStrength {
    let len = password.chars().count();
    let mut score = 0;

    if len >= 8 {
        score += 1;
    }
    if len >= 12 {
        score += 1;
    }

    let has = |f: fn(&char) -> bool| password.chars().any(|c| f(&c));
    if has(char::is_ascii_lowercase) && has(char::is_ascii_uppercase) {
        score += 1;
    }
    if has(char::is_ascii_digit) {
        score += 1;
    }
    if has(|c| !c.is_ascii_alphanumeric()) {
        score += 1;
    }

    let strength = match score {
        0..=2 => Strength::Weak,
        3 => Strength::Medium,
        _ => Strength::Strong,
    };
    PasswordStrength { strength, score }
}

/// Escapes the characters that would let message text break out of HTML.
pub fn sanitize_input(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            '/' => out.push_str("&#x2F;"),
            c => out.push(c),
        }
    }
    out
}

/// Per-field messages, keyed by form field name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, &'static str>);

impl FieldErrors {
    pub fn insert(&mut self, field: &'static str, message: &'static str) {
        self.0.insert(field, message);
    }

    pub fn get(&self, field: &str) -> Option<&'static str> {
        self.0.get(field).copied()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_result(self) -> Result<()> {
        if self.is_empty() { Ok(()) } else { Err(Error::Validation(self)) }
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str(", ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignUpForm {
    pub username: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignUpForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();

        if self.username.is_empty() {
            errors.insert("username", "Username harus diisi");
        } else if !is_valid_username(&self.username) {
            errors.insert("username", "Username hanya boleh mengandung huruf, angka, - dan _ (3-20 karakter)");
        }

        check_email(&mut errors, &self.email);
        check_password(&mut errors, "password", &self.password);
        check_confirmation(&mut errors, &self.password, &self.confirm_password);

        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignInForm {
    pub email: String,
    pub password: String,
}

impl SignInForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();
        check_email(&mut errors, &self.email);
        check_password(&mut errors, "password", &self.password);
        errors.into_result()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PasswordChangeForm {
    pub new_password: String,
    pub confirm_password: String,
}

impl PasswordChangeForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = FieldErrors::default();
        check_password(&mut errors, "new_password", &self.new_password);
        check_confirmation(&mut errors, &self.new_password, &self.confirm_password);
        errors.into_result()
    }
}

fn check_email(errors: &mut FieldErrors, email: &str) {
    if email.is_empty() {
        errors.insert("email", "Email harus diisi");
    } else if !is_valid_email(email) {
        errors.insert("email", "Format email tidak valid");
    }
}

fn check_password(errors: &mut FieldErrors, field: &'static str, password: &str) {
    if password.is_empty() {
        errors.insert(field, "Password harus diisi");
    } else if !is_valid_password(password) {
        errors.insert(field, "Password minimal 6 karakter");
    }
}

fn check_confirmation(errors: &mut FieldErrors, password: &str, confirmation: &str) {
    if confirmation.is_empty() {
        errors.insert("confirm_password", "Konfirmasi password harus diisi");
    } else if password != confirmation {
        errors.insert("confirm_password", "Password tidak cocok");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn username_length_bounds() {
        assert!(!is_valid_username("ab"));
        assert!(is_valid_username("abc"));
        assert!(is_valid_username(&"a".repeat(20)));
        assert!(!is_valid_username(&"a".repeat(21)));
    }

    #[test]
    fn username_character_class() {
        assert!(is_valid_username("nep_user-01"));
        assert!(!is_valid_username("nep user"));
        assert!(!is_valid_username("nep.user"));
        assert!(!is_valid_username("néppp"));
    }

    #[test]
    fn email_shape() {
        assert!(is_valid_email("a@b.co"));
        assert!(is_valid_email("first.last@mail.example.com"));
        assert!(!is_valid_email("a@b"));
        assert!(!is_valid_email("a b@c.d"));
        assert!(!is_valid_email("@b.co"));
        assert!(!is_valid_email("a@@b.co"));
    }

    #[test]
    fn password_minimum() {
        assert!(!is_valid_password("12345"));
        assert!(is_valid_password("123456"));
    }

    #[test]
    fn strength_scores() {
        assert_eq!(check_password_strength(""), PasswordStrength { strength: Strength::Weak, score: 0 });
        assert_eq!(check_password_strength("abcdefgh").score, 1);
        assert_eq!(check_password_strength("Abcdefgh1").strength, Strength::Medium);
        assert_eq!(check_password_strength("Abcdefgh1!").score, 4);
        assert_eq!(check_password_strength("Abcdefgh1!xyz"), PasswordStrength { strength: Strength::Strong, score: 5 });
    }

    #[test]
    fn strength_never_drops_when_password_grows() {
        let samples = ["a", "aB", "aB3", "aB3$", "aB3$efgh", "aB3$efghijkl", "aB3$efghijklmnop"];
        let scores: Vec<u8> = samples.iter().map(|p| check_password_strength(p).score).collect();
        assert!(scores.windows(2).all(|w| w[0] <= w[1]), "{scores:?}");
        assert!(scores.iter().all(|&s| s <= 5));
    }

    #[test]
    fn sanitize_escapes_markup() {
        assert_eq!(sanitize_input("<b>\"hi\"</b>"), "&lt;b&gt;&quot;hi&quot;&lt;&#x2F;b&gt;");
        assert_eq!(sanitize_input("it's"), "it&#x27;s");
        assert_eq!(sanitize_input("plain"), "plain");
    }

    #[test]
    fn sign_up_form_reports_each_field() {
        let form = SignUpForm {
            username: "x".into(),
            email: "nope".into(),
            password: "123".into(),
            confirm_password: "456".into(),
        };
        let Err(Error::Validation(errors)) = form.validate() else {
            panic!("expected validation errors");
        };
        assert!(errors.get("username").is_some());
        assert_eq!(errors.get("email"), Some("Format email tidak valid"));
        assert_eq!(errors.get("password"), Some("Password minimal 6 karakter"));
        assert_eq!(errors.get("confirm_password"), Some("Password tidak cocok"));
    }

    #[test]
    fn password_change_requires_matching_confirmation() {
        let ok = PasswordChangeForm { new_password: "secret1".into(), confirm_password: "secret1".into() };
        assert!(ok.validate().is_ok());

        let mismatch = PasswordChangeForm { new_password: "secret1".into(), confirm_password: "secret2".into() };
        assert!(matches!(mismatch.validate(), Err(Error::Validation(_))));
    }
}

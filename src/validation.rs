use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, ValidationErrors};
use crate::MediaType;

pub const MAX_POST_LENGTH: usize = 500;
pub const MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
pub const MAX_VIDEO_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_AUDIO_BYTES: u64 = 10 * 1024 * 1024;
pub const MAX_DISPLAY_NAME: usize = 50;
pub const MAX_USERNAME: usize = 30;
pub const MIN_USERNAME: usize = 3;
pub const MAX_BIO: usize = 160;
pub const MIN_SIGNUP_PASSWORD: usize = 8;

fn email_pattern() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("static email pattern"))
}

fn phone_pattern() -> &'static Regex {
    static PHONE: OnceLock<Regex> = OnceLock::new();
    PHONE.get_or_init(|| Regex::new(r"^\+?[1-9][0-9\s-]{6,14}$").expect("static phone pattern"))
}

fn char_len(value: &str) -> usize {
    value.chars().count()
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SignupForm {
    pub username: String,
    pub email: String,
    #[serde(default)]
    pub phone: String,
    pub password: String,
    pub confirm_password: String,
    #[serde(default)]
    pub terms_accepted: bool,
}

impl SignupForm {
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();

        let username = self.username.trim();
        if username.is_empty() {
            errors.add("username", "Required");
        } else if char_len(username) < MIN_USERNAME {
            errors.add("username", format!("at least {} characters", MIN_USERNAME));
        } else if char_len(username) > MAX_USERNAME {
            errors.add("username", format!("at most {} characters", MAX_USERNAME));
        }

        let email = self.email.trim();
        if email.is_empty() {
            errors.add("email", "Required");
        } else if !email_pattern().is_match(email) {
            errors.add("email", "Invalid email");
        }

        if !self.phone.trim().is_empty() && !phone_pattern().is_match(&self.phone) {
            errors.add("phone", "Invalid format");
        }

        if self.password.is_empty() {
            errors.add("password", "Required");
        } else if char_len(&self.password) < MIN_SIGNUP_PASSWORD {
            errors.add("password", format!("at least {} characters", MIN_SIGNUP_PASSWORD));
        }

        if self.confirm_password != self.password {
            errors.add("confirm_password", "Passwords do not match");
        }

        if !self.terms_accepted {
            errors.add("terms_accepted", "You must accept the terms");
        }

        errors.into_result()
    }

    pub fn normalized_email(&self) -> String {
        self.email.trim().to_lowercase()
    }

    /// Strips spaces, dashes and parentheses and ensures a leading `+`.
    pub fn normalized_phone(&self) -> Option<String> {
        let digits: String = self
            .phone
            .trim()
            .chars()
            .filter(|c| !matches!(c, ' ' | '\t' | '-' | '(' | ')'))
            .collect();
        if digits.is_empty() {
            None
        } else if digits.starts_with('+') {
            Some(digits)
        } else {
            Some(format!("+{}", digits))
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct MediaAttachment {
    pub kind: MediaType,
    pub size_bytes: u64,
}

impl MediaAttachment {
    pub fn max_bytes(&self) -> u64 {
        match self.kind {
            MediaType::Image => MAX_IMAGE_BYTES,
            MediaType::Video => MAX_VIDEO_BYTES,
            MediaType::Audio => MAX_AUDIO_BYTES,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PostDraft {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub media: Option<MediaAttachment>,
}

impl PostDraft {
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();
        let text = self.text.trim();

        if text.is_empty() && self.media.is_none() {
            errors.add("text", "Add some text or media to your pulse");
        }
        if char_len(text) > MAX_POST_LENGTH {
            errors.add("text", format!("at most {} characters", MAX_POST_LENGTH));
        }
        if let Some(media) = &self.media {
            if media.size_bytes > media.max_bytes() {
                errors.add(
                    "media",
                    format!(
                        "{} must be {}MB or smaller",
                        media.kind.as_str(),
                        media.max_bytes() / (1024 * 1024)
                    ),
                );
            }
        }

        errors.into_result()
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ProfileEdit {
    pub display_name: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    /// Already-uploaded avatar URL.
    pub profile_picture: Option<String>,
}

impl ProfileEdit {
    pub fn validate(&self) -> Result<()> {
        let mut errors = ValidationErrors::new();

        if let Some(name) = &self.display_name {
            if name.trim().is_empty() {
                errors.add("display_name", "Required");
            } else if char_len(name.trim()) > MAX_DISPLAY_NAME {
                errors.add("display_name", format!("at most {} characters", MAX_DISPLAY_NAME));
            }
        }
        if let Some(username) = &self.username {
            let username = username.trim();
            if char_len(username) < MIN_USERNAME {
                errors.add("username", format!("at least {} characters", MIN_USERNAME));
            } else if char_len(username) > MAX_USERNAME {
                errors.add("username", format!("at most {} characters", MAX_USERNAME));
            }
        }
        if let Some(bio) = &self.bio {
            if char_len(bio.trim()) > MAX_BIO {
                errors.add("bio", format!("at most {} characters", MAX_BIO));
            }
        }

        errors.into_result()
    }

    pub fn is_empty(&self) -> bool {
        self.display_name.is_none()
            && self.username.is_none()
            && self.bio.is_none()
            && self.profile_picture.is_none()
    }

    /// Usernames are stored trimmed and lowercased.
    pub fn normalized_username(&self) -> Option<String> {
        self.username
            .as_deref()
            .map(|username| username.trim().to_lowercase())
    }
}

pub fn validate_comment(content: &str) -> Result<String> {
    let trimmed = content.trim();
    if trimmed.is_empty() {
        let mut errors = ValidationErrors::new();
        errors.add("content", "Required");
        return Err(errors.into());
    }
    Ok(trimmed.to_string())
}

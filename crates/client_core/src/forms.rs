//! Staged form input and the client-side checks run before any request.

use chrono::NaiveDate;
use shared::{
    domain::{Difficulty, FolderId, Gender, Question, Visibility},
    protocol::{QuestionFields, ResetPasswordRequest, SignupRequest},
};

use crate::error::ValidationError;

pub const MIN_PASSWORD_LEN: usize = 8;

pub(crate) fn required(value: &str, field: &'static str) -> Result<String, ValidationError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(trimmed.to_string())
}

/// Markup bodies keep their exact text; only blankness is checked.
fn required_body(value: &str, field: &'static str) -> Result<String, ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::MissingField(field));
    }
    Ok(value.to_string())
}

pub fn validate_folder_name(name: &str) -> Result<String, ValidationError> {
    let name = name.trim();
    if name.is_empty() {
        return Err(ValidationError::EmptyFolderName);
    }
    Ok(name.to_string())
}

pub fn parse_difficulty(raw: &str) -> Result<Difficulty, ValidationError> {
    raw.parse()
        .map_err(|_| ValidationError::UnknownDifficulty(raw.trim().to_string()))
}

/// Uncommitted copy of a question's editable fields.
///
/// Owns its data: editing a draft never touches the loaded question list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QuestionDraft {
    pub title: String,
    pub question: String,
    pub solution: String,
    pub category: String,
    pub difficulty: Option<Difficulty>,
    pub author: String,
    pub published_date: Option<NaiveDate>,
    pub visibility: Visibility,
    pub folder_id: Option<FolderId>,
}

impl QuestionDraft {
    pub fn blank() -> Self {
        Self::default()
    }

    pub fn from_question(question: &Question) -> Self {
        Self {
            title: question.title.clone(),
            question: question.question.clone(),
            solution: question.solution.clone(),
            category: question.category.clone(),
            difficulty: Some(question.difficulty),
            author: question.author.clone(),
            published_date: question.published_date,
            visibility: question.visibility,
            folder_id: question.folder_id.clone(),
        }
    }

    /// Validates the draft; a missing published date becomes `today`.
    pub fn to_fields(&self, today: NaiveDate) -> Result<QuestionFields, ValidationError> {
        Ok(QuestionFields {
            title: required(&self.title, "title")?,
            question: required_body(&self.question, "question")?,
            solution: required_body(&self.solution, "solution")?,
            category: required(&self.category, "category")?,
            difficulty: self
                .difficulty
                .ok_or(ValidationError::MissingField("difficulty"))?,
            author: required(&self.author, "author")?,
            published_date: self.published_date.unwrap_or(today),
            visibility: self.visibility,
            folder_id: self.folder_id.clone().filter(|id| !id.is_empty()),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct SignupForm {
    pub full_name: String,
    pub gender: String,
    pub age: String,
    pub mobile_number: String,
    pub email: String,
    pub password: String,
    pub confirm_password: String,
}

impl SignupForm {
    pub fn to_request(&self) -> Result<SignupRequest, ValidationError> {
        let full_name = required(&self.full_name, "full name")?;
        let email = required(&self.email, "email")?;
        let mobile_number = required(&self.mobile_number, "mobile number")?;
        if self.password.is_empty() {
            return Err(ValidationError::MissingField("password"));
        }
        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        let gender: Gender = self
            .gender
            .parse()
            .map_err(|_| ValidationError::InvalidGender(self.gender.trim().to_string()))?;
        let age = self
            .age
            .trim()
            .parse::<u32>()
            .map_err(|_| ValidationError::InvalidAge(self.age.trim().to_string()))?;

        Ok(SignupRequest {
            full_name,
            gender,
            age,
            mobile_number,
            email,
            password: self.password.clone(),
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct ResetPasswordForm {
    pub email: String,
    pub otp: String,
    pub new_password: String,
    pub confirm_password: String,
}

impl ResetPasswordForm {
    pub fn to_request(&self) -> Result<ResetPasswordRequest, ValidationError> {
        let email = required(&self.email, "email")?;
        let otp = required(&self.otp, "otp")?;
        if self.new_password.is_empty() {
            return Err(ValidationError::MissingField("new password"));
        }
        if self.confirm_password.is_empty() {
            return Err(ValidationError::MissingField("password confirmation"));
        }
        if self.new_password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }
        if self.new_password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort {
                min: MIN_PASSWORD_LEN,
            });
        }

        Ok(ResetPasswordRequest {
            email,
            otp,
            new_password: self.new_password.clone(),
        })
    }
}

#[cfg(test)]
#[path = "tests/forms_tests.rs"]
mod tests;

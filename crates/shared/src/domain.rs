use std::{fmt, str::FromStr};

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use thiserror::Error;

/// Identifiers arrive either as JSON strings or as JSON numbers depending on
/// which layer serialized them; both collapse to the same canonical string.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(serde_json::Number),
}

impl RawId {
    fn into_canonical(self) -> String {
        match self {
            RawId::Text(text) => text.trim().to_string(),
            RawId::Number(number) => number.to_string(),
        }
    }
}

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(raw: impl AsRef<str>) -> Self {
                Self(raw.as_ref().trim().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self::new(value)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self::new(value)
            }
        }

        impl<'de> Deserialize<'de> for $name {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                RawId::deserialize(deserializer).map(|raw| Self(raw.into_canonical()))
            }
        }
    };
}

id_newtype!(QuestionId);
id_newtype!(FolderId);

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    pub kind: &'static str,
    pub value: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            _ => Err(ParseEnumError {
                kind: "difficulty",
                value: s.to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    Private,
    #[default]
    Public,
}

impl Visibility {
    pub fn from_private_flag(private: bool) -> Self {
        if private {
            Visibility::Private
        } else {
            Visibility::Public
        }
    }

    pub fn is_private(self) -> bool {
        self == Visibility::Private
    }
}

/// The remote API models visibility as a `private: bool` field.
pub mod private_flag {
    use serde::{Deserialize, Deserializer, Serializer};

    use super::Visibility;

    pub fn serialize<S>(value: &Visibility, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_bool(value.is_private())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Visibility, D::Error>
    where
        D: Deserializer<'de>,
    {
        let private = Option::<bool>::deserialize(deserializer)?.unwrap_or(false);
        Ok(Visibility::from_private_flag(private))
    }
}

/// Dates travel as `YYYY-MM-DD`; full timestamps are accepted and truncated.
pub mod published_date {
    use chrono::NaiveDate;
    use serde::{de::Error as _, Deserialize, Deserializer, Serializer};

    const FORMAT: &str = "%Y-%m-%d";

    pub fn parse(raw: &str) -> Option<NaiveDate> {
        let raw = raw.trim();
        let date_part = raw.split('T').next().unwrap_or(raw);
        NaiveDate::parse_from_str(date_part, FORMAT).ok()
    }

    pub fn serialize<S>(value: &NaiveDate, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.format(FORMAT).to_string())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = String::deserialize(deserializer)?;
        parse(&raw).ok_or_else(|| D::Error::custom(format!("invalid published date '{raw}'")))
    }

    pub mod option {
        use chrono::NaiveDate;
        use serde::{Deserialize, Deserializer, Serializer};

        pub fn serialize<S>(value: &Option<NaiveDate>, serializer: S) -> Result<S::Ok, S::Error>
        where
            S: Serializer,
        {
            match value {
                Some(date) => super::serialize(date, serializer),
                None => serializer.serialize_none(),
            }
        }

        pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<NaiveDate>, D::Error>
        where
            D: Deserializer<'de>,
        {
            let raw = Option::<String>::deserialize(deserializer)?;
            Ok(raw.as_deref().and_then(super::parse))
        }
    }
}

/// Records written by older clients carry lowercase, blank or missing
/// difficulties. Anything unrecognized decodes as the default level so one
/// record cannot fail a whole page.
pub mod lenient_difficulty {
    use serde::{Deserialize, Deserializer};

    use super::Difficulty;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Difficulty, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<String>::deserialize(deserializer)?;
        Ok(raw
            .and_then(|raw| raw.parse::<Difficulty>().ok())
            .unwrap_or_default())
    }
}

/// Empty-string folder references (sent by older clients for "no folder")
/// are normalized to `None`.
pub mod folder_ref {
    use serde::{Deserialize, Deserializer};

    use super::FolderId;

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<FolderId>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = Option::<FolderId>::deserialize(deserializer)?;
        Ok(raw.filter(|id| !id.is_empty()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    #[serde(rename = "_id")]
    pub id: QuestionId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub question: String,
    #[serde(default)]
    pub solution: String,
    #[serde(default)]
    pub category: String,
    #[serde(default, deserialize_with = "lenient_difficulty::deserialize")]
    pub difficulty: Difficulty,
    #[serde(default)]
    pub author: String,
    #[serde(default, with = "published_date::option")]
    pub published_date: Option<NaiveDate>,
    #[serde(rename = "private", default, with = "private_flag")]
    pub visibility: Visibility,
    #[serde(default, deserialize_with = "folder_ref::deserialize")]
    pub folder_id: Option<FolderId>,
}

impl Question {
    pub fn in_folder(&self, folder_id: &FolderId) -> bool {
        self.folder_id.as_ref() == Some(folder_id)
    }

    pub fn is_unfiled(&self) -> bool {
        self.folder_id.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    #[serde(rename = "_id")]
    pub id: FolderId,
    pub name: String,
}

/// Active folder filter of a workspace view.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FolderFilter {
    Unfiled,
    Folder(FolderId),
}

impl FolderFilter {
    pub fn matches(&self, folder_ref: Option<&FolderId>) -> bool {
        match (self, folder_ref) {
            (FolderFilter::Unfiled, None) => true,
            (FolderFilter::Folder(expected), Some(actual)) => expected == actual,
            _ => false,
        }
    }

    pub fn folder_id(&self) -> Option<&FolderId> {
        match self {
            FolderFilter::Unfiled => None,
            FolderFilter::Folder(id) => Some(id),
        }
    }
}

impl From<Option<FolderId>> for FolderFilter {
    fn from(value: Option<FolderId>) -> Self {
        match value {
            Some(id) if !id.is_empty() => FolderFilter::Folder(id),
            _ => FolderFilter::Unfiled,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Gender {
    Male,
    Female,
    Other,
}

impl FromStr for Gender {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "Male" => Ok(Gender::Male),
            "Female" => Ok(Gender::Female),
            "Other" => Ok(Gender::Other),
            _ => Err(ParseEnumError {
                kind: "gender",
                value: s.to_string(),
            }),
        }
    }
}

#[cfg(test)]
#[path = "tests/domain_tests.rs"]
mod tests;

//! Guide onboarding requests.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

/// Identity document accepted for guide verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentType {
    Passport,
    NationalId,
    DriversLicense,
}

impl DocumentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentType::Passport => "passport",
            DocumentType::NationalId => "national_id",
            DocumentType::DriversLicense => "drivers_license",
        }
    }
}

impl std::str::FromStr for DocumentType {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "passport" => Ok(DocumentType::Passport),
            "national_id" => Ok(DocumentType::NationalId),
            "drivers_license" => Ok(DocumentType::DriversLicense),
            other => Err(ValidationError::invalid(
                "document_type",
                format!("unsupported document type '{other}'"),
            )),
        }
    }
}

/// Flat onboarding request as submitted by the guide dashboard.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuideOnboardingRequest {
    pub email: Option<String>,
    pub full_name: Option<String>,
    pub phone: Option<String>,
    pub bio: Option<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    pub years_experience: Option<u32>,
    pub document_type: Option<String>,
    pub document_number: Option<String>,
}

/// A validated onboarding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GuideApplication {
    /// Lowercased; the natural key of the identity record.
    pub email: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub bio: Option<String>,
    pub languages: Vec<String>,
    pub years_experience: u32,
    pub document_type: DocumentType,
    pub document_number: String,
}

impl GuideOnboardingRequest {
    /// Validates the request.
    pub fn validate(self) -> Result<GuideApplication, ValidationError> {
        let email = present(self.email)
            .ok_or(ValidationError::MissingField("email"))?
            .to_lowercase();
        if !is_plausible_email(&email) {
            return Err(ValidationError::invalid("email", "not a valid address"));
        }

        let full_name =
            present(self.full_name).ok_or(ValidationError::MissingField("full_name"))?;

        let document_type: DocumentType = present(self.document_type)
            .ok_or(ValidationError::MissingField("document_type"))?
            .parse()?;
        let document_number = present(self.document_number)
            .ok_or(ValidationError::MissingField("document_number"))?;

        let languages = self
            .languages
            .into_iter()
            .map(|l| l.trim().to_string())
            .filter(|l| !l.is_empty())
            .collect();

        Ok(GuideApplication {
            email,
            full_name,
            phone: present(self.phone),
            bio: present(self.bio),
            languages,
            years_experience: self.years_experience.unwrap_or(0),
            document_type,
            document_number,
        })
    }
}

fn present(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn is_plausible_email(email: &str) -> bool {
    match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GuideOnboardingRequest {
        GuideOnboardingRequest {
            email: Some(" Ana.Silva@Example.com ".into()),
            full_name: Some("Ana Silva".into()),
            languages: vec!["pt".into(), " ".into(), "en".into()],
            document_type: Some("passport".into()),
            document_number: Some("X1234567".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_valid_request_is_normalized() {
        let application = request().validate().unwrap();
        assert_eq!(application.email, "ana.silva@example.com");
        assert_eq!(application.languages, vec!["pt", "en"]);
        assert_eq!(application.document_type, DocumentType::Passport);
        assert_eq!(application.years_experience, 0);
    }

    #[test]
    fn test_rejects_bad_email() {
        for email in ["ana", "ana@", "@example.com", "ana@example", "a@b@c.com"] {
            let result = GuideOnboardingRequest {
                email: Some(email.into()),
                ..request()
            }
            .validate();
            assert!(
                matches!(result, Err(ValidationError::InvalidField { field: "email", .. })),
                "{email} should be rejected"
            );
        }
    }

    #[test]
    fn test_missing_fields() {
        let result = GuideOnboardingRequest {
            full_name: None,
            ..request()
        }
        .validate();
        assert_eq!(result, Err(ValidationError::MissingField("full_name")));

        let result = GuideOnboardingRequest {
            document_number: Some("".into()),
            ..request()
        }
        .validate();
        assert_eq!(result, Err(ValidationError::MissingField("document_number")));
    }

    #[test]
    fn test_unknown_document_type() {
        let result = GuideOnboardingRequest {
            document_type: Some("library_card".into()),
            ..request()
        }
        .validate();
        assert!(matches!(
            result,
            Err(ValidationError::InvalidField {
                field: "document_type",
                ..
            })
        ));
    }
}

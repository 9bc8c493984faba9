use crate::models::{Application, ApplicationStatus};
use serde::{Deserialize, Serialize};
use validator::Validate;

pub const DEFAULT_PAGE_SIZE: u64 = 20;
pub const MAX_PAGE_SIZE: u64 = 100;

#[derive(Debug, Deserialize, Validate)]
pub struct CreateApplicationRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub organization: Option<String>,
    #[validate(length(max = 5000))]
    pub message: Option<String>,
}

impl CreateApplicationRequest {
    /// Trim text fields, lower-case the email and drop blank optionals.
    pub fn normalized(self) -> Self {
        Self {
            full_name: self.full_name.trim().to_string(),
            email: self.email.trim().to_lowercase(),
            phone: non_blank(self.phone),
            organization: non_blank(self.organization),
            message: non_blank(self.message),
        }
    }
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateApplicationRequest {
    #[validate(length(min = 1, max = 200))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(max = 32))]
    pub phone: Option<String>,
    #[validate(length(max = 200))]
    pub organization: Option<String>,
    #[validate(length(max = 5000))]
    pub message: Option<String>,
    pub status: Option<ApplicationStatus>,
}

impl UpdateApplicationRequest {
    pub fn normalized(self) -> Self {
        Self {
            full_name: self.full_name.map(|s| s.trim().to_string()),
            email: self.email.map(|s| s.trim().to_lowercase()),
            phone: self.phone.map(|s| s.trim().to_string()),
            organization: self.organization.map(|s| s.trim().to_string()),
            message: self.message.map(|s| s.trim().to_string()),
            status: self.status,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.email.is_none()
            && self.phone.is_none()
            && self.organization.is_none()
            && self.message.is_none()
            && self.status.is_none()
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

/// Query string accepted on `GET /api/v1/apply/`.
///
/// With `id` the request retrieves one application, otherwise it lists.
#[derive(Debug, Default, Deserialize)]
pub struct ApplicationQuery {
    pub id: Option<String>,
    pub page: Option<u64>,
    pub page_size: Option<u64>,
    pub status: Option<ApplicationStatus>,
}

/// Query string for operations on a single application.
#[derive(Debug, Default, Deserialize)]
pub struct ApplicationIdQuery {
    pub id: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationResponse {
    pub id: String,
    pub full_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub organization: Option<String>,
    pub message: Option<String>,
    pub status: ApplicationStatus,
    pub created_at: String,
    pub updated_at: String,
}

impl From<Application> for ApplicationResponse {
    fn from(app: Application) -> Self {
        Self {
            id: app.id,
            full_name: app.full_name,
            email: app.email,
            phone: app.phone,
            organization: app.organization,
            message: app.message,
            status: app.status,
            created_at: app.created_at.to_rfc3339(),
            updated_at: app.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApplicationListResponse {
    pub applications: Vec<ApplicationResponse>,
    pub total: u64,
    pub page: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

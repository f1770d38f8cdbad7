//! Client-side form validation and multipart encoding.
//!
//! Every `check` here runs before the network is touched; a form that fails
//! it never produces a request.

use std::path::Path;

use anyhow::Context as _;
use chrono::{Days, NaiveDate};
use mime::Mime;
use once_cell::sync::Lazy;
use regex::Regex;
use reqwest::multipart::{Form, Part};
use serde::Serialize;
use url::Url;
use validator::Validate;

use crate::{models::GeoPoint, Error, Result};

/// Upper bound on photos attached to a report or a resolution.
pub const MAX_PHOTOS: usize = 5;
/// How far ahead an NGO may set a due date when claiming a report.
pub const MAX_DUE_DAYS: u64 = 15;

const PASSWORD_RULE: &str = "Password must be 8 characters with letter, number, and special symbol";
const AVATAR_URL: &str = "https://api.dicebear.com/7.x/initials/svg";

static PASSWORD_CHARSET: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z\d@$!%*?&]{8,}$").expect("valid password regex"));
static MOBILE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[6-9]\d{9}$").expect("valid mobile regex"));
static OTP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{6}$").expect("valid otp regex"));

/// An image file ready to be attached to a multipart form.
#[derive(Clone, Debug)]
pub struct Upload {
    pub file_name: String,
    pub mime: Mime,
    pub bytes: Vec<u8>,
}

impl Upload {
    /// Wrap in-memory bytes. Only image types are accepted.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Result<Self> {
        let file_name = file_name.into();
        let mime = image_mime(&file_name)
            .ok_or_else(|| Error::validation(format!("{file_name} is not an image")))?;
        Ok(Self {
            file_name,
            mime,
            bytes,
        })
    }

    pub async fn from_path(path: &Path) -> Result<Self> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::validation(format!("invalid file name {}", path.display())))?
            .to_owned();
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))
            .map_err(Error::Storage)?;
        Self::new(file_name, bytes)
    }

    fn part(&self) -> Result<Part> {
        Part::bytes(self.bytes.clone())
            .file_name(self.file_name.clone())
            .mime_str(self.mime.as_ref())
            .map_err(Error::from)
    }
}

fn image_mime(file_name: &str) -> Option<Mime> {
    let ext = Path::new(file_name).extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "jpg" | "jpeg" => Some(mime::IMAGE_JPEG),
        "png" => Some(mime::IMAGE_PNG),
        "gif" => Some(mime::IMAGE_GIF),
        "bmp" => Some(mime::IMAGE_BMP),
        "svg" => Some(mime::IMAGE_SVG),
        "webp" => "image/webp".parse().ok(),
        _ => None,
    }
}

/// Accepts passwords of at least eight characters from the allowed set that
/// mix a letter, a digit and a symbol.
pub fn check_password(password: &str) -> Result<()> {
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    let has_symbol = password.chars().any(|c| "@$!%*?&".contains(c));
    if PASSWORD_CHARSET.is_match(password) && has_letter && has_digit && has_symbol {
        Ok(())
    } else {
        Err(Error::validation(PASSWORD_RULE))
    }
}

/// A due date must fall between `today` and fifteen days later, inclusive.
pub fn check_due_date(due: NaiveDate, today: NaiveDate) -> Result<()> {
    if due < today {
        return Err(Error::validation("Due date cannot be in the past"));
    }
    let latest = today
        .checked_add_days(Days::new(MAX_DUE_DAYS))
        .unwrap_or(NaiveDate::MAX);
    if due > latest {
        return Err(Error::validation(format!(
            "Due date must be within {MAX_DUE_DAYS} days"
        )));
    }
    Ok(())
}

/// A new problem report.
#[derive(Clone, Debug, Default, Validate)]
pub struct CreateReportForm {
    #[validate(length(min = 1, message = "All fields are required."))]
    pub title: String,
    #[validate(length(min = 1, message = "All fields are required."))]
    pub description: String,
    #[validate(length(min = 1, message = "All fields are required."))]
    pub landmark: String,
    #[validate(length(min = 1, message = "All fields are required."))]
    pub city: String,
    pub photos: Vec<Upload>,
    pub location: Option<GeoPoint>,
}

impl CreateReportForm {
    /// Replace the selected photos. Anything past the fifth is dropped.
    pub fn attach_photos(&mut self, photos: impl IntoIterator<Item = Upload>) {
        self.photos = photos.into_iter().take(MAX_PHOTOS).collect();
    }

    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.photos.is_empty() {
            return Err(Error::validation("At least one photo is required."));
        }
        if self.location.is_none() {
            return Err(Error::validation(
                "Location is required. Please select from map.",
            ));
        }
        Ok(())
    }

    pub(crate) fn to_multipart(&self) -> Result<Form> {
        let location = serde_json::to_string(&self.location)
            .map_err(|e| Error::validation(format!("invalid location: {e}")))?;
        let mut form = Form::new()
            .text("title", self.title.clone())
            .text("description", self.description.clone())
            .text("landmark", self.landmark.clone())
            .text("city", self.city.clone())
            .text("autoLocation", location);
        for photo in &self.photos {
            form = form.part("photos", photo.part()?);
        }
        Ok(form)
    }
}

/// Evidence that a claimed report has been dealt with.
#[derive(Clone, Debug, Default)]
pub struct ResolveForm {
    pub images: Vec<Upload>,
    pub description: String,
}

impl ResolveForm {
    /// Add images, refusing the whole batch if it would exceed five.
    pub fn attach(&mut self, images: Vec<Upload>) -> Result<()> {
        if self.images.len() + images.len() > MAX_PHOTOS {
            return Err(Error::validation(format!(
                "You can upload max {MAX_PHOTOS} images"
            )));
        }
        self.images.extend(images);
        Ok(())
    }

    pub fn check(&self) -> Result<()> {
        if self.images.is_empty() {
            return Err(Error::validation("At least 1 image required"));
        }
        if self.images.len() > MAX_PHOTOS {
            return Err(Error::validation(format!(
                "You can upload max {MAX_PHOTOS} images"
            )));
        }
        if self.description.trim().is_empty() {
            return Err(Error::validation("Description required"));
        }
        Ok(())
    }

    pub(crate) fn to_multipart(&self) -> Result<Form> {
        let mut form = Form::new();
        for image in &self.images {
            form = form.part("resolvedImages", image.part()?);
        }
        Ok(form.text("description", self.description.clone()))
    }
}

#[derive(Clone, Debug, Default, Serialize, Validate)]
pub struct Credentials {
    #[validate(length(min = 1, message = "Email and password are required"))]
    pub email: String,
    #[validate(length(min = 1, message = "Email and password are required"))]
    pub password: String,
}

#[derive(Clone, Debug, Default, Validate)]
pub struct Registration {
    #[validate(length(min = 1, message = "Please fill all fields"))]
    pub name: String,
    #[validate(length(min = 1, message = "Please fill all fields"))]
    pub email: String,
    pub city: String,
    #[validate(length(min = 1, message = "Please fill all fields"))]
    pub password: String,
    #[validate(length(min = 1, message = "Please fill all fields"))]
    pub confirm_password: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(crate) struct RegisterBody<'a> {
    name: &'a str,
    email: &'a str,
    city: &'a str,
    password: &'a str,
    confirm_password: &'a str,
    photo: String,
}

impl Registration {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if self.password != self.confirm_password {
            return Err(Error::validation("Passwords do not match"));
        }
        check_password(&self.password)
    }

    /// New accounts get a generated initials avatar.
    pub fn avatar_url(&self) -> String {
        Url::parse_with_params(AVATAR_URL, &[("seed", self.name.as_str())])
            .map_or_else(|_| AVATAR_URL.to_owned(), String::from)
    }

    pub(crate) fn body(&self) -> RegisterBody<'_> {
        RegisterBody {
            name: &self.name,
            email: &self.email,
            city: &self.city,
            password: &self.password,
            confirm_password: &self.confirm_password,
            photo: self.avatar_url(),
        }
    }
}

/// Second step of the OTP password reset.
#[derive(Clone, Debug, Default, Validate)]
pub struct PasswordReset {
    #[validate(length(min = 1, message = "Please fill all fields"))]
    pub otp: String,
    #[validate(length(min = 1, message = "Please fill all fields"))]
    pub new_password: String,
    #[validate(length(min = 1, message = "Please fill all fields"))]
    pub confirm_new_password: String,
}

impl PasswordReset {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if !OTP.is_match(&self.otp) {
            return Err(Error::validation("OTP must be 6 digits"));
        }
        if self.new_password != self.confirm_new_password {
            return Err(Error::validation("Passwords do not match"));
        }
        check_password(&self.new_password)
    }
}

/// Application to register an organisation as an NGO.
#[derive(Clone, Debug, Default, Validate)]
pub struct NgoApplication {
    pub name: String,
    #[validate(email(message = "Enter a valid email"))]
    pub email: String,
    pub city: String,
    pub registration_number: String,
    pub mobile_number: String,
    pub message: String,
    pub logo: Option<Upload>,
}

impl NgoApplication {
    pub fn check(&self) -> Result<()> {
        self.validate()?;
        if !MOBILE.is_match(&self.mobile_number) {
            return Err(Error::validation("Enter a valid 10-digit mobile number"));
        }
        if self.logo.is_none() {
            return Err(Error::validation("Please upload a logo image"));
        }
        Ok(())
    }

    pub(crate) fn to_multipart(&self) -> Result<Form> {
        let mut form = Form::new()
            .text("name", self.name.clone())
            .text("email", self.email.clone())
            .text("city", self.city.clone())
            .text("registrationNumber", self.registration_number.clone())
            .text("mobileNumber", self.mobile_number.clone())
            .text("message", self.message.clone());
        if let Some(logo) = &self.logo {
            form = form.part("logo", logo.part()?);
        }
        Ok(form)
    }
}

#[derive(Clone, Debug, Default, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    pub city: String,
    pub photo: Option<Upload>,
}

impl ProfileUpdate {
    pub fn check(&self) -> Result<()> {
        self.validate().map_err(Error::from)
    }

    pub(crate) fn to_multipart(&self) -> Result<Form> {
        let mut form = Form::new()
            .text("name", self.name.clone())
            .text("city", self.city.clone());
        if let Some(photo) = &self.photo {
            form = form.part("photo", photo.part()?);
        }
        Ok(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn photo(name: &str) -> Upload {
        Upload::new(name, vec![0xff, 0xd8, 0xff]).unwrap()
    }

    fn report_form() -> CreateReportForm {
        CreateReportForm {
            title: "Broken streetlight".to_owned(),
            description: "Dark since Monday".to_owned(),
            landmark: "Near the station".to_owned(),
            city: "Nadiad".to_owned(),
            photos: vec![photo("lamp.jpg")],
            location: Some(GeoPoint::new(22.69, 72.86)),
        }
    }

    #[test]
    fn upload_rejects_non_images() {
        assert!(Upload::new("notes.txt", vec![]).is_err());
        assert_eq!(photo("LAMP.JPG").mime, mime::IMAGE_JPEG);
    }

    #[test]
    fn create_report_checks_in_order() {
        assert!(report_form().check().is_ok());

        let mut form = report_form();
        form.landmark.clear();
        assert_eq!(
            form.check().unwrap_err().to_string(),
            "All fields are required."
        );

        let mut form = report_form();
        form.photos.clear();
        assert_eq!(
            form.check().unwrap_err().to_string(),
            "At least one photo is required."
        );

        let mut form = report_form();
        form.location = None;
        assert_eq!(
            form.check().unwrap_err().to_string(),
            "Location is required. Please select from map."
        );
    }

    #[test]
    fn create_report_keeps_first_five_photos() {
        let mut form = report_form();
        form.attach_photos((0..7).map(|i| photo(&format!("{i}.png"))));
        assert_eq!(form.photos.len(), MAX_PHOTOS);
        assert_eq!(form.photos[4].file_name, "4.png");
    }

    #[test]
    fn resolve_requires_images_and_description() {
        let mut form = ResolveForm {
            images: vec![],
            description: "Cleaned up".to_owned(),
        };
        assert_eq!(
            form.check().unwrap_err().to_string(),
            "At least 1 image required"
        );

        form.attach(vec![photo("after.png")]).unwrap();
        form.description = "   ".to_owned();
        assert_eq!(form.check().unwrap_err().to_string(), "Description required");

        form.description = "Cleaned up".to_owned();
        assert!(form.check().is_ok());

        let err = form
            .attach((0..5).map(|i| photo(&format!("{i}.png"))).collect())
            .unwrap_err();
        assert!(err.is_client_side());
        assert_eq!(form.images.len(), 1);
    }

    #[test]
    fn password_rule() {
        assert!(check_password("Passw0rd!").is_ok());
        assert!(check_password("abc12!@x").is_ok());
        assert!(check_password("password").is_err());
        assert!(check_password("Pa0!").is_err());
        assert!(check_password("Passw0rd#").is_err());
    }

    #[test]
    fn due_date_window() {
        let today = NaiveDate::from_ymd_opt(2026, 3, 1).unwrap();
        assert!(check_due_date(today, today).is_ok());
        assert!(check_due_date(NaiveDate::from_ymd_opt(2026, 3, 16).unwrap(), today).is_ok());
        assert!(check_due_date(NaiveDate::from_ymd_opt(2026, 3, 17).unwrap(), today).is_err());
        assert!(check_due_date(NaiveDate::from_ymd_opt(2026, 2, 28).unwrap(), today).is_err());
    }

    #[test]
    fn registration_rules() {
        let mut form = Registration {
            name: "Asha".to_owned(),
            email: "asha@example.com".to_owned(),
            city: "Nadiad".to_owned(),
            password: "Passw0rd!".to_owned(),
            confirm_password: "Passw0rd!".to_owned(),
        };
        assert!(form.check().is_ok());
        assert_eq!(
            form.avatar_url(),
            "https://api.dicebear.com/7.x/initials/svg?seed=Asha"
        );

        form.confirm_password = "Passw0rd?".to_owned();
        assert_eq!(form.check().unwrap_err().to_string(), "Passwords do not match");

        form.name.clear();
        assert_eq!(form.check().unwrap_err().to_string(), "Please fill all fields");
    }

    #[test]
    fn password_reset_rules() {
        let mut form = PasswordReset {
            otp: "12345".to_owned(),
            new_password: "Passw0rd!".to_owned(),
            confirm_new_password: "Passw0rd!".to_owned(),
        };
        assert_eq!(form.check().unwrap_err().to_string(), "OTP must be 6 digits");
        form.otp = "123456".to_owned();
        assert!(form.check().is_ok());
    }

    #[test]
    fn ngo_application_rules() {
        let mut form = NgoApplication {
            name: "Green Earth".to_owned(),
            email: "not-an-email".to_owned(),
            mobile_number: "9876543210".to_owned(),
            logo: Some(photo("logo.png")),
            ..Default::default()
        };
        assert_eq!(form.check().unwrap_err().to_string(), "Enter a valid email");

        form.email = "contact@greenearth.org".to_owned();
        assert!(form.check().is_ok());

        form.mobile_number = "1234567890".to_owned();
        assert_eq!(
            form.check().unwrap_err().to_string(),
            "Enter a valid 10-digit mobile number"
        );

        form.mobile_number = "9876543210".to_owned();
        form.logo = None;
        assert_eq!(
            form.check().unwrap_err().to_string(),
            "Please upload a logo image"
        );
    }
}

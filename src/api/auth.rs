use tracing::{debug, error};

use crate::config;
use crate::models::UserIdentity;

use super::types::{
    ApiError, AuthResponse, LoginRequest, OtpResponse, PhoneRequest, RegisterRequest,
    VerifyOtpRequest,
};

/// HTTP client for the authentication endpoints.
///
/// All inputs are validated locally before any request goes out, so malformed
/// credentials surface immediately instead of as a round trip.
#[derive(Clone)]
pub struct AuthApi {
    client: reqwest::Client,
    base_url: String,
}

impl AuthApi {
    pub fn new() -> Result<Self, ApiError> {
        Self::with_base_url(config::api_base_url())
    }

    pub fn with_base_url(base_url: String) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config::HTTP_TIMEOUT)
            .build()
            .map_err(|e| ApiError::NetworkError(e.to_string()))?;

        Ok(Self { client, base_url })
    }

    pub async fn register(&self, request: &RegisterRequest) -> Result<AuthResponse, ApiError> {
        validate_email(&request.email)?;
        validate_password(&request.password)?;
        if let Some(phone) = request.phone.as_deref() {
            if !phone.trim().is_empty() {
                validate_phone(phone)?;
            }
        }

        debug!(email = %request.email, "registering new account");
        self.post("auth/register", request).await
    }

    pub async fn login(&self, request: &LoginRequest) -> Result<AuthResponse, ApiError> {
        validate_email(&request.email)?;
        self.post("auth/login", request).await
    }

    /// Requests a one-time code for phone sign-in. The desktop shell only
    /// surfaces email sign-in; the phone flow is kept for parity with the
    /// backend's auth surface.
    pub async fn send_otp(&self, phone: &str) -> Result<OtpResponse, ApiError> {
        validate_phone(phone)?;
        self.post(
            "auth/phone/send-otp",
            &PhoneRequest {
                phone: phone.to_string(),
            },
        )
        .await
    }

    /// Exchanges a one-time code for a signed-in session. UI-less for the
    /// same reason as [`send_otp`](Self::send_otp).
    pub async fn verify_otp(&self, phone: &str, otp: &str) -> Result<AuthResponse, ApiError> {
        validate_phone(phone)?;
        validate_otp(otp)?;
        self.post(
            "auth/phone/verify-otp",
            &VerifyOtpRequest {
                phone: phone.to_string(),
                otp: otp.to_string(),
            },
        )
        .await
    }

    async fn post<B, R>(&self, path: &str, body: &B) -> Result<R, ApiError>
    where
        B: serde::Serialize,
        R: serde::de::DeserializeOwned,
    {
        let response = self
            .client
            .post(format!("{}/{}", self.base_url, path))
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.as_u16() == 401 || status.as_u16() == 403 {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::AuthError(super::client::extract_error_message(&body)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            error!(status = status.as_u16(), path, "auth request failed");
            return Err(ApiError::RequestFailed {
                status: status.as_u16(),
                message: super::client::extract_error_message(&body),
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ApiError::InvalidResponse(e.to_string()))
    }
}

impl From<AuthResponse> for UserIdentity {
    fn from(resp: AuthResponse) -> Self {
        UserIdentity {
            email: resp.email,
            full_name: resp.full_name,
            profile_picture: resp.profile_picture,
            expires_at: resp.expires_at,
        }
    }
}

/// Checks the `local@domain.tld` shape without attempting full RFC 5322.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let mut parts = email.split('@');
    let valid = match (parts.next(), parts.next(), parts.next()) {
        (Some(local), Some(domain), None) => {
            !local.is_empty()
                && !domain.is_empty()
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.chars().any(char::is_whitespace)
        }
        _ => false,
    };
    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Please enter a valid email address".to_string(),
        ))
    }
}

/// At least 8 characters, with one letter and one digit.
pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < 8 {
        return Err(ApiError::Validation(
            "Password must be at least 8 characters long".to_string(),
        ));
    }
    let has_letter = password.chars().any(|c| c.is_ascii_alphabetic());
    let has_digit = password.chars().any(|c| c.is_ascii_digit());
    if !has_letter || !has_digit {
        return Err(ApiError::Validation(
            "Password must contain at least one letter and one number".to_string(),
        ));
    }
    Ok(())
}

/// E.164-shaped phone number: optional +, leading 1-9, up to 15 digits.
/// Spaces, dashes, and parentheses are ignored.
pub fn validate_phone(phone: &str) -> Result<(), ApiError> {
    let cleaned: String = phone
        .chars()
        .filter(|c| !matches!(c, ' ' | '-' | '(' | ')'))
        .collect();
    let digits = cleaned.strip_prefix('+').unwrap_or(&cleaned);

    let valid = digits.len() >= 2
        && digits.len() <= 15
        && digits.chars().all(|c| c.is_ascii_digit())
        && !digits.starts_with('0');

    if valid {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "Please enter a valid phone number with country code".to_string(),
        ))
    }
}

pub fn validate_otp(otp: &str) -> Result<(), ApiError> {
    if otp.len() == 6 && otp.chars().all(|c| c.is_ascii_digit()) {
        Ok(())
    } else {
        Err(ApiError::Validation(
            "The code must be 6 digits".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_well_formed_emails() {
        assert!(validate_email("user@example.com").is_ok());
        assert!(validate_email("a.b+c@sub.domain.org").is_ok());
    }

    #[test]
    fn rejects_malformed_emails() {
        assert!(validate_email("no-at-sign").is_err());
        assert!(validate_email("two@@example.com").is_err());
        assert!(validate_email("user@nodot").is_err());
        assert!(validate_email("user@.leading.dot").is_err());
        assert!(validate_email("spa ce@example.com").is_err());
    }

    #[test]
    fn password_rules() {
        assert!(validate_password("abcdef12").is_ok());
        assert!(validate_password("short1").is_err());
        assert!(validate_password("onlyletters").is_err());
        assert!(validate_password("12345678").is_err());
    }

    #[test]
    fn phone_rules() {
        assert!(validate_phone("+14155552671").is_ok());
        assert!(validate_phone("44 20 7946 0958").is_ok());
        assert!(validate_phone("(415) 555-2671").is_ok());
        assert!(validate_phone("+0123").is_err());
        assert!(validate_phone("not-a-number").is_err());
        assert!(validate_phone("+1234567890123456").is_err());
    }

    #[test]
    fn otp_is_exactly_six_digits() {
        assert!(validate_otp("123456").is_ok());
        assert!(validate_otp("12345").is_err());
        assert!(validate_otp("12345a").is_err());
    }
}

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::models::Wishlist;

const MAX_WISHLIST_NAME: usize = 100;
const MAX_COMMENT_LEN: usize = 1000;
const MAX_EMOJI_LEN: usize = 16;

/// A request body that parsed but does not satisfy its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{0}")]
pub struct InvalidInput(pub String);

fn required(field: &str, value: &str) -> Result<String, InvalidInput> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(InvalidInput(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

fn bounded(field: &str, value: String, max: usize) -> Result<String, InvalidInput> {
    if value.chars().count() > max {
        return Err(InvalidInput(format!("{field} must be at most {max} characters")));
    }
    Ok(value)
}

fn email(value: &str) -> Result<String, InvalidInput> {
    let value = required("email", value)?;
    match value.split_once('@') {
        Some((local, domain)) if !local.is_empty() && !domain.is_empty() => Ok(value),
        _ => Err(InvalidInput("email is not a valid address".into())),
    }
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

impl RegisterRequest {
    pub fn validate(self) -> Result<Self, InvalidInput> {
        let username = required("username", &self.username)?;
        if !(3..=32).contains(&username.chars().count()) {
            return Err(InvalidInput("username must be 3 to 32 characters".into()));
        }
        if self.password.len() < 8 {
            return Err(InvalidInput("password must be at least 8 characters".into()));
        }
        Ok(Self {
            username,
            email: email(&self.email)?.to_lowercase(),
            password: self.password,
        })
    }
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResponse {
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub token: String,
}

// -- Wishlists --

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CreateWishlistRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

impl CreateWishlistRequest {
    pub fn validate(self) -> Result<Self, InvalidInput> {
        let name = bounded("name", required("name", &self.name)?, MAX_WISHLIST_NAME)?;
        let description = self
            .description
            .map(|d| d.trim().to_string())
            .filter(|d| !d.is_empty());
        Ok(Self { name, description })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct AddProductRequest {
    pub name: String,
    pub image_url: String,
    pub price: f64,
}

impl AddProductRequest {
    pub fn validate(self) -> Result<Self, InvalidInput> {
        if !self.price.is_finite() || self.price < 0.0 {
            return Err(InvalidInput("price must be a non-negative number".into()));
        }
        Ok(Self {
            name: required("name", &self.name)?,
            image_url: required("imageUrl", &self.image_url)?,
            price: self.price,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddMemberRequest {
    pub email: String,
}

impl AddMemberRequest {
    pub fn validate(self) -> Result<Self, InvalidInput> {
        Ok(Self {
            email: email(&self.email)?.to_lowercase(),
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AddCommentRequest {
    pub text: String,
}

impl AddCommentRequest {
    pub fn validate(self) -> Result<Self, InvalidInput> {
        Ok(Self {
            text: bounded("text", required("text", &self.text)?, MAX_COMMENT_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReactRequest {
    pub emoji: String,
}

impl ReactRequest {
    pub fn validate(self) -> Result<Self, InvalidInput> {
        Ok(Self {
            emoji: bounded("emoji", required("emoji", &self.emoji)?, MAX_EMOJI_LEN)?,
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddMemberResponse {
    pub wishlist: Wishlist,
    pub message: String,
}

/// Plain acknowledgement or error body: `{"message": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn product(name: &str, image_url: &str, price: f64) -> AddProductRequest {
        AddProductRequest {
            name: name.into(),
            image_url: image_url.into(),
            price,
        }
    }

    #[test]
    fn product_price_must_be_non_negative_and_finite() {
        assert!(product("Lamp", "http://img/lamp.png", 29.99).validate().is_ok());
        assert!(product("Lamp", "http://img/lamp.png", 0.0).validate().is_ok());
        assert!(product("Lamp", "http://img/lamp.png", -0.01).validate().is_err());
        assert!(product("Lamp", "http://img/lamp.png", f64::NAN).validate().is_err());
        assert!(product("Lamp", "http://img/lamp.png", f64::INFINITY).validate().is_err());
    }

    #[test]
    fn product_fields_are_trimmed_and_required() {
        let ok = product("  Lamp ", " http://img ", 1.0).validate().unwrap();
        assert_eq!(ok.name, "Lamp");
        assert_eq!(ok.image_url, "http://img");

        let err = product("   ", "http://img", 1.0).validate().unwrap_err();
        assert_eq!(err.0, "name is required");
        assert!(product("Lamp", "", 1.0).validate().is_err());
    }

    #[test]
    fn wishlist_description_blank_becomes_none() {
        let req = CreateWishlistRequest {
            name: " Birthday ".into(),
            description: Some("   ".into()),
        }
        .validate()
        .unwrap();
        assert_eq!(req.name, "Birthday");
        assert_eq!(req.description, None);

        let long = CreateWishlistRequest {
            name: "x".repeat(101),
            description: None,
        };
        assert!(long.validate().is_err());
    }

    #[test]
    fn member_email_is_normalized() {
        let req = AddMemberRequest {
            email: "  Yasmin@Example.COM ".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(req.email, "yasmin@example.com");

        for bad in ["", "nobody", "@example.com", "user@"] {
            assert!(AddMemberRequest { email: bad.into() }.validate().is_err(), "{bad}");
        }
    }

    #[test]
    fn comment_and_reaction_bounds() {
        assert!(AddCommentRequest { text: "nice".into() }.validate().is_ok());
        assert!(AddCommentRequest { text: " ".into() }.validate().is_err());
        assert!(AddCommentRequest { text: "a".repeat(1001) }.validate().is_err());

        assert_eq!(ReactRequest { emoji: " 👍 ".into() }.validate().unwrap().emoji, "👍");
        assert!(ReactRequest { emoji: "".into() }.validate().is_err());
        assert!(ReactRequest { emoji: "x".repeat(17) }.validate().is_err());
    }

    #[test]
    fn register_rules() {
        let ok = RegisterRequest {
            username: "xavier".into(),
            email: "X@example.com".into(),
            password: "hunter2hunter2".into(),
        }
        .validate()
        .unwrap();
        assert_eq!(ok.email, "x@example.com");

        let short = RegisterRequest {
            username: "xv".into(),
            email: "x@example.com".into(),
            password: "hunter2hunter2".into(),
        };
        assert!(short.validate().is_err());

        let weak = RegisterRequest {
            username: "xavier".into(),
            email: "x@example.com".into(),
            password: "short".into(),
        };
        assert!(weak.validate().is_err());
    }

    #[test]
    fn product_request_uses_camel_case() {
        let req: AddProductRequest =
            serde_json::from_str(r#"{"name":"Lamp","imageUrl":"http://img","price":29.99}"#)
                .unwrap();
        assert_eq!(req.image_url, "http://img");
        assert!(serde_json::from_str::<AddProductRequest>(r#"{"name":"Lamp","price":1}"#).is_err());
    }
}

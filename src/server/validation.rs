use crate::error::FieldViolation;

const MAX_SLUG_LEN: usize = 100;
const MAX_TITLE_LEN: usize = 250;
const MAX_USERNAME_LEN: usize = 64;

fn is_valid_slug_char(c: char) -> bool {
    c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '_'
}

/// Community slugs are stable external identifiers: lowercase alphanumeric
/// plus hyphens and underscores, no leading separator.
pub fn validate_slug(slug: &str) -> Result<(), FieldViolation> {
    if slug.is_empty() {
        return Err(FieldViolation::new("slug", "slug cannot be empty"));
    }
    if slug.len() > MAX_SLUG_LEN {
        return Err(FieldViolation::new(
            "slug",
            format!("slug cannot exceed {MAX_SLUG_LEN} characters"),
        ));
    }
    if !slug.chars().all(is_valid_slug_char) {
        return Err(FieldViolation::new(
            "slug",
            "slug can only contain lowercase alphanumeric characters, hyphens, and underscores",
        ));
    }
    if slug.starts_with('-') || slug.starts_with('_') {
        return Err(FieldViolation::new(
            "slug",
            "slug cannot start with a hyphen or underscore",
        ));
    }
    Ok(())
}

pub fn validate_title(title: &str) -> Result<(), FieldViolation> {
    if title.trim().is_empty() {
        return Err(FieldViolation::new("title", "title cannot be empty"));
    }
    if title.len() > MAX_TITLE_LEN {
        return Err(FieldViolation::new(
            "title",
            format!("title cannot exceed {MAX_TITLE_LEN} characters"),
        ));
    }
    Ok(())
}

pub fn validate_username(username: &str) -> Result<(), FieldViolation> {
    if username.is_empty() {
        return Err(FieldViolation::new("username", "username cannot be empty"));
    }
    if username.len() > MAX_USERNAME_LEN {
        return Err(FieldViolation::new(
            "username",
            format!("username cannot exceed {MAX_USERNAME_LEN} characters"),
        ));
    }
    if !username
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
    {
        return Err(FieldViolation::new(
            "username",
            "username can only contain alphanumeric characters, hyphens, underscores, and periods",
        ));
    }
    Ok(())
}

/// Identifier path/body parameters must parse as UUIDs before hitting the
/// store; a malformed value is a validation failure, not a lookup miss.
pub fn validate_identifier(field: &'static str, value: &str) -> Result<(), FieldViolation> {
    uuid::Uuid::parse_str(value)
        .map(|_| ())
        .map_err(|_| FieldViolation::new(field, "not a valid identifier"))
}

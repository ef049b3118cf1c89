use crate::utils::error::{EntrypointError, Result};

pub trait Validate {
    fn validate(&self) -> Result<()>;
}

pub fn validate_port(field_name: &str, value: &str) -> Result<u16> {
    let port: u16 = value
        .trim()
        .parse()
        .map_err(|_| EntrypointError::invalid(field_name, value, "Port must be a number between 1 and 65535"))?;
    if port == 0 {
        return Err(EntrypointError::invalid(
            field_name,
            value,
            "Port must be a number between 1 and 65535",
        ));
    }
    Ok(port)
}

pub fn validate_path(field_name: &str, path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(EntrypointError::invalid(field_name, path, "Path cannot be empty"));
    }

    if path.contains('\0') {
        return Err(EntrypointError::invalid(field_name, path, "Path contains null bytes"));
    }

    Ok(())
}

pub fn validate_non_empty_string(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(EntrypointError::invalid(
            field_name,
            value,
            "Value cannot be empty or whitespace-only",
        ));
    }
    Ok(())
}

pub fn validate_range<T: PartialOrd + std::fmt::Display + Copy>(
    field_name: &str,
    value: T,
    min: T,
    max: T,
) -> Result<()> {
    if value < min || value > max {
        return Err(EntrypointError::invalid(
            field_name,
            &value.to_string(),
            format!("Value must be between {} and {}", min, max),
        ));
    }
    Ok(())
}

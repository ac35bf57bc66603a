//! Database naming rules. Names are derived, never stored user input:
//! `tenant_{slug}_{year}`.

/// Deterministic database name for a tenant generation.
pub fn database_name(slug: &str, year: i32) -> String {
    format!("tenant_{}_{}", slug, year)
}

/// Slugs are lowercase alphanumeric with underscores, start with a letter,
/// and are 2 to 50 characters long. The slug is immutable after creation.
pub fn is_valid_slug(slug: &str) -> bool {
    if slug.len() < 2 || slug.len() > 50 {
        return false;
    }
    let mut chars = slug.chars();
    match chars.next() {
        Some(c) if c.is_ascii_lowercase() => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_')
}

/// Only names this crate itself derives (plus the maintenance database) are
/// acceptable targets for administrative statements.
pub fn is_valid_db_name(name: &str) -> bool {
    if name == "postgres" {
        return true;
    }
    match name.strip_prefix("tenant_") {
        Some(rest) if !rest.is_empty() => rest
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'),
        _ => false,
    }
}

/// Double-quote an identifier for interpolation into DDL, which cannot take
/// bind parameters. Callers must validate the name first.
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

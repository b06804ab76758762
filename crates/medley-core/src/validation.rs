//! Upload validation: MIME type / extension allow-list and file name safety.

use crate::error::AppError;
use crate::models::MediaKind;

/// Extensions permitted for a given MIME type. Some browsers report JPEGs
/// as `image/jpg`, so both spellings are accepted.
fn permitted_extensions(mime_type: &str) -> Option<&'static [&'static str]> {
    match mime_type {
        "image/jpeg" | "image/jpg" => Some(&["jpg", "jpeg"]),
        "image/png" => Some(&["png"]),
        "image/gif" => Some(&["gif"]),
        "image/webp" => Some(&["webp"]),
        "video/mp4" => Some(&["mp4"]),
        "video/quicktime" => Some(&["mov"]),
        _ => None,
    }
}

/// Validates that the file name, MIME type and declared media kind agree.
///
/// Rejects when the extension is not in the allow-list, the MIME type is
/// unknown, the two disagree, or the MIME top-level type does not match the
/// declared kind (e.g. `media_kind=video` with `image/png`).
pub fn validate_file_type_consistency(
    file_name: &str,
    mime_type: &str,
    media_kind: MediaKind,
) -> Result<(), AppError> {
    validate_file_name(file_name)?;
    let extension = extract_extension(file_name)?;

    let permitted = permitted_extensions(mime_type).ok_or_else(|| {
        AppError::Validation(format!("MIME type is not allowed: {}", mime_type))
    })?;

    if !permitted.contains(&extension.as_str()) {
        return Err(AppError::Validation(format!(
            "File extension .{} does not match MIME type {}",
            extension, mime_type
        )));
    }

    let expected_prefix = match media_kind {
        MediaKind::Image => "image/",
        MediaKind::Video => "video/",
    };
    if !mime_type.starts_with(expected_prefix) {
        return Err(AppError::Validation(format!(
            "MIME type {} does not match declared media kind {}",
            mime_type, media_kind
        )));
    }

    Ok(())
}

/// Rejects empty, over-long and path-traversing file names.
pub fn validate_file_name(file_name: &str) -> Result<(), AppError> {
    if file_name.trim().is_empty() {
        return Err(AppError::Validation("File name is empty".to_string()));
    }
    if file_name.len() > 255 {
        return Err(AppError::Validation("File name is too long".to_string()));
    }

    const FORBIDDEN: [&str; 9] = ["../", "..\\", "<", ">", ":", "\"", "|", "?", "*"];
    for fragment in FORBIDDEN {
        if file_name.contains(fragment) {
            return Err(AppError::Validation(format!(
                "File name contains forbidden sequence: {}",
                fragment
            )));
        }
    }
    if file_name.contains('/') || file_name.contains('\\') {
        return Err(AppError::Validation(
            "File name must not contain path separators".to_string(),
        ));
    }

    Ok(())
}

/// Extracts the lowercased extension, rejecting names without one.
pub fn extract_extension(file_name: &str) -> Result<String, AppError> {
    match file_name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() && !ext.is_empty() => Ok(ext.to_lowercase()),
        _ => Err(AppError::Validation(format!(
            "File name has no extension: {}",
            file_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allow_list_accepts_matching_pairs() {
        for (name, mime, kind) in [
            ("photo.jpg", "image/jpeg", MediaKind::Image),
            ("photo.jpeg", "image/jpg", MediaKind::Image),
            ("chart.png", "image/png", MediaKind::Image),
            ("loop.gif", "image/gif", MediaKind::Image),
            ("still.webp", "image/webp", MediaKind::Image),
            ("clip.mp4", "video/mp4", MediaKind::Video),
            ("clip.MOV", "video/quicktime", MediaKind::Video),
        ] {
            assert!(
                validate_file_type_consistency(name, mime, kind).is_ok(),
                "expected {} / {} to pass",
                name,
                mime
            );
        }
    }

    #[test]
    fn allow_list_rejects_mismatched_pairs() {
        for (name, mime, kind) in [
            ("photo.png", "image/jpeg", MediaKind::Image),
            ("clip.mp4", "image/png", MediaKind::Image),
            ("script.exe", "image/png", MediaKind::Image),
            ("doc.pdf", "application/pdf", MediaKind::Image),
        ] {
            assert!(matches!(
                validate_file_type_consistency(name, mime, kind),
                Err(AppError::Validation(_))
            ));
        }
    }

    #[test]
    fn kind_must_match_mime_top_level_type() {
        assert!(matches!(
            validate_file_type_consistency("photo.jpg", "image/jpeg", MediaKind::Video),
            Err(AppError::Validation(_))
        ));
        assert!(matches!(
            validate_file_type_consistency("clip.mp4", "video/mp4", MediaKind::Image),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn rejects_names_without_extension() {
        assert!(extract_extension("README").is_err());
        assert!(extract_extension("trailing.").is_err());
        assert!(extract_extension(".gitignore").is_err());
        assert_eq!(extract_extension("a.b.MP4").unwrap(), "mp4");
    }

    #[test]
    fn rejects_dangerous_file_names() {
        for name in ["../../etc/passwd.png", "a<b.jpg", "dir/file.png", ""] {
            assert!(validate_file_name(name).is_err(), "expected {:?} rejected", name);
        }
        assert!(validate_file_name(&"x".repeat(300)).is_err());
        assert!(validate_file_name("holiday photo.jpg").is_ok());
    }
}

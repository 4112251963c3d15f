//! Input path normalization.
//!
//! Callers may hand over either a plain filesystem path or a `file://` URL
//! (as produced by browsers and desktop file pickers). Everything downstream
//! of the compositor only ever sees plain paths.

use std::path::PathBuf;

use percent_encoding::percent_decode_str;

const FILE_SCHEME: &str = "file://";

/// Turn a plain path or a `file://` URL into a filesystem path.
///
/// URLs lose their scheme and are percent-decoded, keeping malformed escapes
/// literally. Plain paths are returned untouched, so normalizing twice gives
/// the same result as normalizing once.
pub fn normalize_path(input: &str) -> PathBuf {
    match input.strip_prefix(FILE_SCHEME) {
        Some(rest) => PathBuf::from(percent_decode_str(rest).decode_utf8_lossy().into_owned()),
        None => PathBuf::from(input),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_path_is_untouched() {
        assert_eq!(normalize_path("/videos/main.mp4"), PathBuf::from("/videos/main.mp4"));
        assert_eq!(normalize_path("clips/a%20b.mp4"), PathBuf::from("clips/a%20b.mp4"));
    }

    #[test]
    fn test_file_url_is_stripped_and_decoded() {
        assert_eq!(
            normalize_path("file:///var/folders/my%20clips/tmp1js4plbo.mp4"),
            PathBuf::from("/var/folders/my clips/tmp1js4plbo.mp4")
        );
        assert_eq!(
            normalize_path("file:///tmp/caf%C3%A9.mp4"),
            PathBuf::from("/tmp/café.mp4")
        );
    }

    #[test]
    fn test_normalization_is_idempotent() {
        let once = normalize_path("file:///tmp/a%20b.mp4");
        let twice = normalize_path(once.to_str().unwrap());
        assert_eq!(once, twice);
    }

    #[test]
    fn test_malformed_escapes_are_kept() {
        assert_eq!(normalize_path("file:///tmp/100%"), PathBuf::from("/tmp/100%"));
        assert_eq!(normalize_path("file:///tmp/%zz.mp4"), PathBuf::from("/tmp/%zz.mp4"));
        assert_eq!(normalize_path("file:///tmp/50%2"), PathBuf::from("/tmp/50%2"));
    }
}

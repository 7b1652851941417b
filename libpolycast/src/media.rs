//! Media kind detection from URLs
//!
//! Classification only looks at the extension of the URL path. Anything that
//! is not a known image extension is treated as video, which keeps older
//! clients that only ever sent videos working.

use reqwest::Url;

use crate::types::MediaKind;

const IMAGE_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "tiff", "heic", "heif",
];

const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "webm", "avi", "mkv", "m4v", "ts", "3gp"];

/// Lowercased extension of the URL's path component, if any
pub fn extension_of(media_url: &str) -> Option<String> {
    let path = match Url::parse(media_url) {
        Ok(url) => url.path().to_string(),
        Err(_) => media_url
            .split(['?', '#'])
            .next()
            .unwrap_or_default()
            .to_string(),
    };

    let file_name = path.rsplit('/').next()?;
    let (_, ext) = file_name.rsplit_once('.')?;
    if ext.is_empty() {
        return None;
    }
    Some(ext.to_lowercase())
}

pub fn is_image_url(media_url: &str) -> bool {
    extension_of(media_url)
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
        .unwrap_or(false)
}

pub fn is_video_url(media_url: &str) -> bool {
    match extension_of(media_url) {
        Some(ext) if IMAGE_EXTENSIONS.contains(&ext.as_str()) => false,
        Some(ext) if VIDEO_EXTENSIONS.contains(&ext.as_str()) => true,
        _ => true,
    }
}

/// Kind of a single media URL
pub fn kind_of(media_url: &str) -> MediaKind {
    if is_image_url(media_url) {
        MediaKind::Image
    } else {
        MediaKind::Video
    }
}

/// Kind of a whole request: several URLs led by an image form a carousel
pub fn classify(media_urls: &[String]) -> MediaKind {
    let Some(primary) = media_urls.first() else {
        return MediaKind::Video;
    };

    match kind_of(primary) {
        MediaKind::Image if media_urls.len() > 1 => MediaKind::Carousel,
        kind => kind,
    }
}

/// MIME type used when uploading raw bytes
pub fn mime_type_of(media_url: &str) -> &'static str {
    match extension_of(media_url).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("png") => "image/png",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("bmp") => "image/bmp",
        Some("tiff") => "image/tiff",
        Some("heic") => "image/heic",
        Some("heif") => "image/heif",
        Some("mov") => "video/quicktime",
        Some("webm") => "video/webm",
        Some("avi") => "video/x-msvideo",
        Some("mkv") => "video/x-matroska",
        Some("m4v") => "video/x-m4v",
        Some("ts") => "video/mp2t",
        Some("3gp") => "video/3gpp",
        _ => "video/mp4",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extension_ignores_query_and_fragment() {
        assert_eq!(
            extension_of("https://cdn.example.com/a/b/photo.JPG?sig=abc.mp4#frag"),
            Some("jpg".to_string())
        );
        assert_eq!(extension_of("https://cdn.example.com/video"), None);
        assert_eq!(extension_of("not a url/clip.mov?x=1"), Some("mov".to_string()));
    }

    #[test]
    fn test_dot_in_directory_is_not_an_extension() {
        assert_eq!(extension_of("https://cdn.example.com/v1.2/clip"), None);
    }

    #[test]
    fn test_kind_of_single_urls() {
        assert_eq!(kind_of("https://cdn/a.png"), MediaKind::Image);
        assert_eq!(kind_of("https://cdn/a.mp4"), MediaKind::Video);
        assert_eq!(kind_of("https://cdn/a.unknown"), MediaKind::Video);
        assert_eq!(kind_of("https://cdn/a"), MediaKind::Video);
    }

    #[test]
    fn test_classify_carousel_requires_image_primary() {
        let images = vec!["https://cdn/a.jpg".to_string(), "https://cdn/b.mp4".to_string()];
        assert_eq!(classify(&images), MediaKind::Carousel);

        let videos = vec!["https://cdn/a.mp4".to_string(), "https://cdn/b.jpg".to_string()];
        assert_eq!(classify(&videos), MediaKind::Video);

        let single = vec!["https://cdn/a.webp".to_string()];
        assert_eq!(classify(&single), MediaKind::Image);
    }

    #[test]
    fn test_video_and_image_predicates() {
        assert!(is_video_url("https://cdn/a.webm"));
        assert!(is_video_url("https://cdn/a.bin"));
        assert!(!is_video_url("https://cdn/a.heic"));
        assert!(is_image_url("https://cdn/a.heic"));
    }

    #[test]
    fn test_mime_types() {
        assert_eq!(mime_type_of("https://cdn/a.jpeg"), "image/jpeg");
        assert_eq!(mime_type_of("https://cdn/a.mov"), "video/quicktime");
        assert_eq!(mime_type_of("https://cdn/a"), "video/mp4");
    }
}

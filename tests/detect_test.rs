use ma_fetch_engine::detect::{detect_platform, Platform};

#[test]
fn test_detect_youtube() {
    assert_eq!(detect_platform("https://www.youtube.com/watch?v=dQw4w9WgXcQ"), Platform::Youtube);
    assert_eq!(detect_platform("https://youtu.be/dQw4w9WgXcQ"), Platform::Youtube);
    assert_eq!(detect_platform("https://m.youtube.com/shorts/abc"), Platform::Youtube);
}

#[test]
fn test_detect_social_platforms() {
    assert_eq!(detect_platform("https://www.instagram.com/reel/C1/"), Platform::Instagram);
    assert_eq!(detect_platform("https://vm.tiktok.com/ZM123/"), Platform::Tiktok);
    assert_eq!(detect_platform("https://twitter.com/a/status/1"), Platform::Twitter);
    assert_eq!(detect_platform("https://x.com/a/status/1"), Platform::Twitter);
    assert_eq!(detect_platform("https://www.facebook.com/watch/?v=1"), Platform::Facebook);
    assert_eq!(detect_platform("https://fb.watch/abc/"), Platform::Facebook);
}

#[test]
fn test_detect_case_and_scheme_less() {
    assert_eq!(detect_platform("  HTTPS://WWW.YOUTUBE.COM/watch?v=1 "), Platform::Youtube);
    assert_eq!(detect_platform("youtu.be/abc"), Platform::Youtube);
    assert_eq!(detect_platform("www.instagram.com/p/xyz"), Platform::Instagram);
}

#[test]
fn test_detect_unknown() {
    assert_eq!(detect_platform(""), Platform::Unknown);
    assert_eq!(detect_platform("not a url"), Platform::Unknown);
    assert_eq!(detect_platform("https://vimeo.com/123"), Platform::Unknown);
    // Host suffix must sit on a label boundary.
    assert_eq!(detect_platform("https://netflix.com/title/1"), Platform::Unknown);
    assert_eq!(detect_platform("https://example.com/?u=youtube.com"), Platform::Unknown);
    assert_eq!(detect_platform("ftp://youtube.com/video"), Platform::Unknown);
}

#[test]
fn test_platform_serializes_lowercase() {
    assert_eq!(serde_json::to_string(&Platform::Tiktok).unwrap(), "\"tiktok\"");
    assert_eq!(Platform::Youtube.to_string(), "youtube");
}

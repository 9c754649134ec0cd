use lazy_static::lazy_static;
use regex::Regex;
use url::Url;

lazy_static! {
    static ref WHITESPACE: Regex = Regex::new(r"\s+").unwrap();
    static ref BV_PATTERN: Regex = Regex::new(r"(BV[0-9A-Za-z]{10})").unwrap();
    static ref AV_PATTERN: Regex = Regex::new(r"/video/(av\d+)").unwrap();
}

/// 清理用户输入的URL
///
/// 去掉首尾空白、合并连续空白，给常见的无协议地址补上 `https://`，
/// 并把B站移动端地址改写成桌面端。
pub fn sanitize_input(input: &str) -> String {
    let input = input.trim();
    let mut url = WHITESPACE.replace_all(input, " ").into_owned();

    if !url.starts_with("http") {
        if url.starts_with("www.")
            || url.starts_with("youtu.be")
            || url.starts_with("b23.tv")
            || url.starts_with("m.bilibili.com")
        {
            url = format!("https://{}", url);
        } else if url.starts_with("youtube.com") || url.starts_with("bilibili.com") {
            url = format!("https://www.{}", url);
        }
    }

    // 处理移动端链接
    if url.contains("://m.bilibili.com") {
        url = url.replacen("://m.bilibili.com", "://www.bilibili.com", 1);
    }

    url
}

/// 是否是带主机名的 http/https 地址
pub fn is_well_formed(input: &str) -> bool {
    match Url::parse(input) {
        Ok(url) => {
            matches!(url.scheme(), "http" | "https")
                && url.host_str().map(|h| !h.is_empty()).unwrap_or(false)
        }
        Err(_) => false,
    }
}

pub fn youtube_video_id(input: &str) -> Option<String> {
    let url = Url::parse(input).ok()?;
    let host = url.host_str()?;

    // youtu.be/<id>
    if host == "youtu.be" {
        let id = url.path().trim_start_matches('/');
        return (!id.is_empty()).then(|| id.to_string());
    }

    if host.contains("youtube.com") {
        return url
            .query_pairs()
            .find(|(key, _)| key == "v")
            .map(|(_, value)| value.into_owned())
            .filter(|id| !id.is_empty());
    }

    None
}

/// 地址里是否带有播放列表参数
pub fn is_playlist(input: &str) -> bool {
    Url::parse(input)
        .map(|url| url.query_pairs().any(|(key, _)| key == "list"))
        .unwrap_or(false)
}

/// 提取B站视频号，优先 BV 号，其次 av 号（保留 `av` 前缀）
pub fn bilibili_video_id(input: &str) -> Option<String> {
    if !input.contains("bilibili.com") {
        return None;
    }
    if let Some(caps) = BV_PATTERN.captures(input) {
        return Some(caps[1].to_string());
    }
    AV_PATTERN.captures(input).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_trims_and_adds_scheme() {
        assert_eq!(
            sanitize_input("  www.bilibili.com/video/BV1xx411c7mD  "),
            "https://www.bilibili.com/video/BV1xx411c7mD"
        );
        assert_eq!(
            sanitize_input("youtube.com/watch?v=abc"),
            "https://www.youtube.com/watch?v=abc"
        );
        assert_eq!(sanitize_input("youtu.be/abc"), "https://youtu.be/abc");
        assert_eq!(sanitize_input("b23.tv/xyz"), "https://b23.tv/xyz");
    }

    #[test]
    fn sanitize_rewrites_mobile_bilibili() {
        assert_eq!(
            sanitize_input("https://m.bilibili.com/video/BV1xx411c7mD"),
            "https://www.bilibili.com/video/BV1xx411c7mD"
        );
        assert_eq!(
            sanitize_input("m.bilibili.com/video/av170001"),
            "https://www.bilibili.com/video/av170001"
        );
    }

    #[test]
    fn sanitize_collapses_inner_whitespace() {
        assert_eq!(sanitize_input("a \t\n b"), "a b");
    }

    #[test]
    fn well_formed_requires_http_and_host() {
        assert!(is_well_formed("https://www.bilibili.com/video/BV1xx411c7mD"));
        assert!(is_well_formed("http://example.com"));
        assert!(!is_well_formed("ftp://example.com/file"));
        assert!(!is_well_formed("invalid-id"));
        assert!(!is_well_formed(""));
    }

    #[test]
    fn youtube_ids() {
        assert_eq!(
            youtube_video_id("https://www.youtube.com/watch?v=dQw4w9WgXcQ&t=1"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(
            youtube_video_id("https://youtu.be/dQw4w9WgXcQ"),
            Some("dQw4w9WgXcQ".to_string())
        );
        assert_eq!(youtube_video_id("https://example.com/?v=1"), None);
        assert_eq!(youtube_video_id("not a url"), None);
    }

    #[test]
    fn playlist_detection() {
        assert!(is_playlist("https://www.youtube.com/watch?v=a&list=PL123"));
        assert!(!is_playlist("https://www.youtube.com/watch?v=a"));
        assert!(!is_playlist("::"));
    }

    #[test]
    fn bilibili_ids() {
        assert_eq!(
            bilibili_video_id("https://www.bilibili.com/video/BV1xx411c7mD?p=1"),
            Some("BV1xx411c7mD".to_string())
        );
        assert_eq!(
            bilibili_video_id("https://www.bilibili.com/video/av170001/"),
            Some("av170001".to_string())
        );
        assert_eq!(bilibili_video_id("https://www.youtube.com/watch?v=BV1xx411c7mD"), None);
    }
}

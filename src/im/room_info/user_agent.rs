//! 访客 user agent 解析：提取操作系统和浏览器（"名称 版本"）

use crate::im::room_info::models::DeviceDescriptor;
use regex::Regex;
use std::sync::LazyLock;

const UNKNOWN: &str = "Unknown";

static WINDOWS_PHONE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"Windows Phone(?: OS)? ([\d.]+)").expect("Invalid windows phone regex")
});
static WINDOWS_NT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Windows NT ([\d.]+)").expect("Invalid windows regex"));
static IOS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?:iPhone|iPad|iPod|CPU)(?: iPhone)? OS ([\d_]+)").expect("Invalid ios regex")
});
static ANDROID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Android ([\d.]+)").expect("Invalid android regex"));
static MAC_OS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"Mac OS X ([\d_.]+)").expect("Invalid mac regex"));
static CHROME_OS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"CrOS \S+ ([\d.]+)").expect("Invalid cros regex"));

/// 浏览器规则，按顺序匹配（Edge / Opera 的 UA 中也带 Chrome，所以必须排在前面）
static BROWSERS: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    [
        (r"Edg(?:e|A|iOS)?/([\d.]+)", "Edge"),
        (r"(?:OPR|Opera)/([\d.]+)", "Opera"),
        (r"SamsungBrowser/([\d.]+)", "Samsung Browser"),
        (r"CriOS/([\d.]+)", "Chrome"),
        (r"FxiOS/([\d.]+)", "Firefox"),
        (r"Firefox/([\d.]+)", "Firefox"),
        (r"Chrome/([\d.]+)", "Chrome"),
        (r"Version/([\d.]+).*Mobile.*Safari/", "Mobile Safari"),
        (r"Version/([\d.]+).*Safari/", "Safari"),
        (r"MSIE ([\d.]+)", "IE"),
        (r"Trident/.*rv:([\d.]+)", "IE"),
    ]
    .into_iter()
    .map(|(pattern, name)| (Regex::new(pattern).expect("Invalid browser regex"), name))
    .collect()
});

fn capture(re: &Regex, ua: &str) -> Option<String> {
    re.captures(ua)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

fn windows_release(nt: &str) -> &str {
    match nt {
        "10.0" => "10",
        "6.3" => "8.1",
        "6.2" => "8",
        "6.1" => "7",
        "6.0" => "Vista",
        "5.1" | "5.2" => "XP",
        other => other,
    }
}

fn parse_os(ua: &str) -> String {
    if let Some(v) = capture(&WINDOWS_PHONE, ua) {
        return format!("Windows Phone {}", v);
    }
    if let Some(v) = capture(&WINDOWS_NT, ua) {
        return format!("Windows {}", windows_release(&v));
    }
    if let Some(v) = capture(&IOS, ua) {
        return format!("iOS {}", v.replace('_', "."));
    }
    if let Some(v) = capture(&ANDROID, ua) {
        return format!("Android {}", v);
    }
    if let Some(v) = capture(&CHROME_OS, ua) {
        return format!("Chromium OS {}", v);
    }
    if let Some(v) = capture(&MAC_OS, ua) {
        return format!("Mac OS {}", v.replace('_', "."));
    }
    if ua.contains("Ubuntu") {
        return "Ubuntu".to_string();
    }
    if ua.contains("Linux") {
        return "Linux".to_string();
    }
    UNKNOWN.to_string()
}

fn parse_browser(ua: &str) -> String {
    BROWSERS
        .iter()
        .find_map(|(re, name)| capture(re, ua).map(|v| format!("{} {}", name, v)))
        .unwrap_or_else(|| UNKNOWN.to_string())
}

/// 解析 user agent；空字符串返回 None
pub fn parse_user_agent(ua: &str) -> Option<DeviceDescriptor> {
    let ua = ua.trim();
    if ua.is_empty() {
        return None;
    }
    Some(DeviceDescriptor {
        os: parse_os(ua),
        browser: parse_browser(ua),
    })
}

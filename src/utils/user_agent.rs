/// Coarse browser name from a User-Agent header. Edge is checked before
/// Chrome and Chrome before Safari since their tokens overlap.
pub fn browser(user_agent: &str) -> &'static str {
    if user_agent.contains("Edg") {
        "Edge"
    } else if user_agent.contains("Chrome") {
        "Chrome"
    } else if user_agent.contains("Firefox") {
        "Firefox"
    } else if user_agent.contains("Safari") {
        "Safari"
    } else {
        "Unknown"
    }
}

pub fn device(user_agent: &str) -> &'static str {
    if user_agent.contains("Mobile") {
        "Mobile"
    } else if user_agent.contains("Tablet") || user_agent.contains("iPad") {
        "Tablet"
    } else {
        "Desktop"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EDGE: &str = "Mozilla/5.0 (Windows NT 10.0) AppleWebKit/537.36 Chrome/120.0 Safari/537.36 Edg/120.0";
    const IPHONE: &str = "Mozilla/5.0 (iPhone; CPU iPhone OS 17_0) AppleWebKit/605.1.15 Version/17.0 Mobile/15E148 Safari/604.1";
    const IPAD: &str = "Mozilla/5.0 (iPad; CPU OS 17_0) AppleWebKit/605.1.15 Version/17.0 Safari/604.1";

    #[test]
    fn detects_browsers() {
        assert_eq!(browser(EDGE), "Edge");
        assert_eq!(browser(IPHONE), "Safari");
        assert_eq!(browser("Mozilla/5.0 (X11; Linux) Gecko/20100101 Firefox/121.0"), "Firefox");
        assert_eq!(browser("curl/8.0"), "Unknown");
    }

    #[test]
    fn detects_devices() {
        assert_eq!(device(IPHONE), "Mobile");
        assert_eq!(device(IPAD), "Tablet");
        assert_eq!(device(EDGE), "Desktop");
    }
}

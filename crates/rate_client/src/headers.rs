use identity_pool::NetworkIdentity;

/// Site whose API calls carry a Referer/Origin of its front-end.
#[derive(Debug, Clone)]
pub struct SiteProfile {
    /// Substring of the request url that selects this profile.
    pub host_match: String,
    pub origin: String,
}

impl SiteProfile {
    pub fn sofascore() -> Self {
        Self {
            host_match: "sofascore.com".to_string(),
            origin: "https://www.sofascore.com".to_string(),
        }
    }

    pub fn homepage(&self) -> String {
        format!("{}/", self.origin)
    }
}

fn push_client_hints(headers: &mut Vec<(String, String)>, identity: &NetworkIdentity) {
    if let Some(ua) = &identity.sec_ch_ua {
        headers.push(("Sec-Ch-Ua".into(), ua.clone()));
        headers.push(("Sec-Ch-Ua-Mobile".into(), "?0".into()));
    }
    if let Some(platform) = &identity.sec_ch_ua_platform {
        headers.push(("Sec-Ch-Ua-Platform".into(), platform.clone()));
    }
}

/// Headers for a JSON API call.
pub fn api_headers(identity: &NetworkIdentity, url: &str, site: Option<&SiteProfile>) -> Vec<(String, String)> {
    let mut headers = vec![
        ("User-Agent".to_string(), identity.user_agent.clone()),
        ("Accept".to_string(), "application/json, text/plain, */*".to_string()),
        ("Accept-Language".to_string(), identity.accept_language.clone()),
        ("Accept-Encoding".to_string(), identity.accept_encoding.clone()),
        ("Cache-Control".to_string(), "no-cache".to_string()),
        ("Pragma".to_string(), "no-cache".to_string()),
        ("DNT".to_string(), "1".to_string()),
        ("Connection".to_string(), "keep-alive".to_string()),
    ];

    if identity.is_chromium() {
        push_client_hints(&mut headers, identity);
        headers.push(("Sec-Fetch-Dest".into(), "empty".into()));
        headers.push(("Sec-Fetch-Mode".into(), "cors".into()));
        headers.push(("Sec-Fetch-Site".into(), "same-site".into()));
    }

    if let Some(site) = site.filter(|s| url.contains(&s.host_match)) {
        headers.push(("Referer".into(), site.homepage()));
        headers.push(("Origin".into(), site.origin.clone()));
    }
    headers
}

/// Headers for a top-level page navigation (session warm-up).
pub fn navigation_headers(identity: &NetworkIdentity) -> Vec<(String, String)> {
    let mut headers = vec![
        ("User-Agent".to_string(), identity.user_agent.clone()),
        (
            "Accept".to_string(),
            "text/html,application/xhtml+xml,application/xml;q=0.9,image/avif,image/webp,*/*;q=0.8".to_string(),
        ),
        ("Accept-Language".to_string(), identity.accept_language.clone()),
        ("Accept-Encoding".to_string(), identity.accept_encoding.clone()),
        ("Cache-Control".to_string(), "no-cache".to_string()),
        ("Pragma".to_string(), "no-cache".to_string()),
        ("Upgrade-Insecure-Requests".to_string(), "1".to_string()),
        ("Connection".to_string(), "keep-alive".to_string()),
    ];
    if identity.is_chromium() {
        push_client_hints(&mut headers, identity);
        headers.push(("Sec-Fetch-Dest".into(), "document".into()));
        headers.push(("Sec-Fetch-Mode".into(), "navigate".into()));
        headers.push(("Sec-Fetch-Site".into(), "none".into()));
        headers.push(("Sec-Fetch-User".into(), "?1".into()));
    }
    headers
}

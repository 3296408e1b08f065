use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum BrowserFamily {
    Chrome,
    Firefox,
    Edge,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

/// One apparent client. Never mutated after the pool hands it out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NetworkIdentity {
    pub family: BrowserFamily,
    pub user_agent: String,
    pub accept_language: String,
    pub accept_encoding: String,
    pub platform: String,
    pub sec_ch_ua: Option<String>,
    pub sec_ch_ua_platform: Option<String>,
    pub viewport: Viewport,
    pub timezone: String,
    pub locale: String,
    pub hardware_concurrency: u8,
    pub device_memory: u8,
}

impl NetworkIdentity {
    /// Chromium builds send client hints; Firefox does not.
    pub fn is_chromium(&self) -> bool {
        matches!(self.family, BrowserFamily::Chrome | BrowserFamily::Edge)
    }

    /// `navigator.languages` equivalent of the Accept-Language header.
    pub fn languages(&self) -> Vec<String> {
        self.accept_language
            .split(',')
            .filter_map(|part| part.split(';').next())
            .map(|lang| lang.trim().to_string())
            .filter(|lang| !lang.is_empty())
            .collect()
    }
}

struct Template {
    family: BrowserFamily,
    user_agent: &'static str,
    platform: &'static str,
    sec_ch_ua: Option<&'static str>,
    sec_ch_ua_platform: Option<&'static str>,
    viewports: &'static [(u32, u32)],
    hardware: &'static [u8],
    memory: &'static [u8],
}

const TEMPLATES: [Template; 5] = [
    Template {
        family: BrowserFamily::Chrome,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        platform: "Win32",
        sec_ch_ua: Some("\"Google Chrome\";v=\"119\", \"Chromium\";v=\"119\", \"Not?A_Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"Windows\""),
        viewports: &[(1920, 1080), (1366, 768), (1536, 864), (1440, 900)],
        hardware: &[4, 8, 12, 16],
        memory: &[4, 8, 16],
    },
    Template {
        family: BrowserFamily::Chrome,
        user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        platform: "MacIntel",
        sec_ch_ua: Some("\"Google Chrome\";v=\"119\", \"Chromium\";v=\"119\", \"Not?A_Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"macOS\""),
        viewports: &[(1440, 900), (1680, 1050), (1920, 1080)],
        hardware: &[8, 10, 12],
        memory: &[8, 16],
    },
    Template {
        family: BrowserFamily::Chrome,
        user_agent: "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
        platform: "Linux x86_64",
        sec_ch_ua: Some("\"Google Chrome\";v=\"119\", \"Chromium\";v=\"119\", \"Not?A_Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"Linux\""),
        viewports: &[(1920, 1080), (1600, 900)],
        hardware: &[4, 8, 16],
        memory: &[8, 16],
    },
    Template {
        family: BrowserFamily::Firefox,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:120.0) Gecko/20100101 Firefox/120.0",
        platform: "Win32",
        sec_ch_ua: None,
        sec_ch_ua_platform: None,
        viewports: &[(1920, 1080), (1366, 768), (1280, 720)],
        hardware: &[4, 8],
        memory: &[4, 8],
    },
    Template {
        family: BrowserFamily::Edge,
        user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 Edg/119.0.0.0",
        platform: "Win32",
        sec_ch_ua: Some("\"Microsoft Edge\";v=\"119\", \"Chromium\";v=\"119\", \"Not?A_Brand\";v=\"24\""),
        sec_ch_ua_platform: Some("\"Windows\""),
        viewports: &[(1920, 1080), (1536, 864)],
        hardware: &[4, 8, 12],
        memory: &[8, 16],
    },
];

// (timezone, accept-language, locale); kept coherent per entry
const LOCALES: [(&str, &str, &str); 5] = [
    ("America/New_York", "en-US,en;q=0.9", "en-US"),
    ("America/Chicago", "en-US,en;q=0.9", "en-US"),
    ("America/Los_Angeles", "en-US,en;q=0.9", "en-US"),
    ("Europe/London", "en-GB,en;q=0.9", "en-GB"),
    ("America/Toronto", "en-CA,en;q=0.9,fr-CA;q=0.7", "en-CA"),
];

const ACCEPT_ENCODING: &str = "gzip, deflate, br";

#[derive(Debug)]
pub struct FingerprintPool {
    identities: Vec<Arc<NetworkIdentity>>,
    cursor: AtomicUsize,
}

impl FingerprintPool {
    pub const DEFAULT_SIZE: usize = 50;

    pub fn generate(size: usize) -> Self {
        Self::generate_with_rng(size, &mut rand::thread_rng())
    }

    /// Templates are cycled so every browser family is represented; the
    /// variable facets (viewport, hardware, locale) are drawn at random.
    pub fn generate_with_rng<R: Rng + ?Sized>(size: usize, rng: &mut R) -> Self {
        let size = size.max(1);
        let identities = (0..size)
            .map(|i| {
                let t = &TEMPLATES[i % TEMPLATES.len()];
                let (width, height) = *t.viewports.choose(rng).unwrap_or(&(1920, 1080));
                let (timezone, accept_language, locale) =
                    *LOCALES.choose(rng).unwrap_or(&LOCALES[0]);
                Arc::new(NetworkIdentity {
                    family: t.family,
                    user_agent: t.user_agent.to_string(),
                    accept_language: accept_language.to_string(),
                    accept_encoding: ACCEPT_ENCODING.to_string(),
                    platform: t.platform.to_string(),
                    sec_ch_ua: t.sec_ch_ua.map(str::to_string),
                    sec_ch_ua_platform: t.sec_ch_ua_platform.map(str::to_string),
                    viewport: Viewport { width, height },
                    timezone: timezone.to_string(),
                    locale: locale.to_string(),
                    hardware_concurrency: *t.hardware.choose(rng).unwrap_or(&8),
                    device_memory: *t.memory.choose(rng).unwrap_or(&8),
                })
            })
            .collect();

        Self { identities, cursor: AtomicUsize::new(0) }
    }

    /// Returns `None` for an empty list.
    pub fn from_identities(identities: Vec<NetworkIdentity>) -> Option<Self> {
        if identities.is_empty() {
            return None;
        }
        Some(Self {
            identities: identities.into_iter().map(Arc::new).collect(),
            cursor: AtomicUsize::new(0),
        })
    }

    pub fn len(&self) -> usize {
        self.identities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.identities.is_empty()
    }

    pub fn current(&self) -> Arc<NetworkIdentity> {
        let idx = self.cursor.load(Ordering::Relaxed) % self.identities.len();
        Arc::clone(&self.identities[idx])
    }

    /// Advances the round-robin cursor.
    pub fn next(&self) -> Arc<NetworkIdentity> {
        let idx = (self.cursor.fetch_add(1, Ordering::Relaxed) + 1) % self.identities.len();
        Arc::clone(&self.identities[idx])
    }

    pub fn random(&self) -> Arc<NetworkIdentity> {
        let idx = rand::thread_rng().gen_range(0..self.identities.len());
        Arc::clone(&self.identities[idx])
    }
}

impl Default for FingerprintPool {
    fn default() -> Self {
        Self::generate(Self::DEFAULT_SIZE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn generated_pool_covers_every_family() {
        let pool = FingerprintPool::generate_with_rng(50, &mut StdRng::seed_from_u64(7));
        assert_eq!(pool.len(), 50);
        let families: Vec<BrowserFamily> = (0..pool.len()).map(|_| pool.next().family).collect();
        assert!(families.contains(&BrowserFamily::Chrome));
        assert!(families.contains(&BrowserFamily::Firefox));
        assert!(families.contains(&BrowserFamily::Edge));
    }

    #[test]
    fn firefox_identities_send_no_client_hints() {
        let pool = FingerprintPool::generate_with_rng(10, &mut StdRng::seed_from_u64(1));
        for _ in 0..pool.len() {
            let id = pool.next();
            assert_eq!(id.is_chromium(), id.sec_ch_ua.is_some());
        }
    }

    #[test]
    fn next_wraps_around() {
        let pool = FingerprintPool::generate_with_rng(3, &mut StdRng::seed_from_u64(3));
        let first = pool.current();
        pool.next();
        pool.next();
        let wrapped = pool.next();
        assert_eq!(*first, *wrapped);
    }

    #[test]
    fn languages_follow_accept_language() {
        let pool = FingerprintPool::generate_with_rng(1, &mut StdRng::seed_from_u64(9));
        let id = pool.current();
        let langs = id.languages();
        assert_eq!(langs[0], id.locale);
        assert!(langs.iter().all(|l| !l.contains(';')));
    }

    #[test]
    fn zero_size_still_yields_one_identity() {
        let pool = FingerprintPool::generate(0);
        assert_eq!(pool.len(), 1);
        assert!(FingerprintPool::from_identities(Vec::new()).is_none());
    }
}
